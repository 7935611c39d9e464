//! Core of the auction appraiser: turning a model reply into appraisal
//! fields, and tracking the request/response/cancel history of a chat.

pub mod defs;
pub mod extract;
pub mod render;
pub mod session;

pub use defs::*;
pub use extract::{LabeledSegment, classify_label, extract, segment};
pub use render::{NO_RESPONSE, NOT_AVAILABLE, displayable, render_appraisal, render_card};
pub use session::Session;
