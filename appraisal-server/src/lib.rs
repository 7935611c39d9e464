pub mod types;
pub mod endpoint;
pub mod prompt;
pub mod auth;
pub mod client;
pub mod llm_adapter;
pub mod conversation;
pub mod server;

pub use types::*;
pub use endpoint::{generate_content_url, resolve_target, ModelTarget};
pub use prompt::{build_generate_request, load_image, AppraisalRequest, ImagePayload, PromptTemplate};
pub use auth::{provider_from_env, StaticTokenProvider, TokenProvider};
pub use client::VertexClient;
pub use llm_adapter::{MockModelAdapter, ModelAdapter, VertexAdapter};
pub use conversation::Conversation;
pub use server::{router, start_server, AppState};
