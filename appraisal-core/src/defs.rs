use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Text placed on an assistant turn when the user stops the request.
pub const CANCELLED_PLACEHOLDER: &str = "Stopped.";

/// Display text for a user turn that carries only an image.
pub const IMAGE_ONLY_PROMPT: &str = "Analyze this item.";

/// One of the ten appraisal attributes the extractor recognizes.
///
/// Declaration order is display order, so a `BTreeMap<FieldKey, _>` iterates
/// the fields the way an appraisal card lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKey {
    ItemName,
    Condition,
    Materials,
    Dimensions,
    Age,
    Maker,
    Details,
    Damage,
    MarketNotes,
    Price,
}

impl FieldKey {
    pub const ALL: [FieldKey; 10] = [
        FieldKey::ItemName,
        FieldKey::Condition,
        FieldKey::Materials,
        FieldKey::Dimensions,
        FieldKey::Age,
        FieldKey::Maker,
        FieldKey::Details,
        FieldKey::Damage,
        FieldKey::MarketNotes,
        FieldKey::Price,
    ];

    /// The camelCase key used in JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::ItemName => "itemName",
            FieldKey::Condition => "condition",
            FieldKey::Materials => "materials",
            FieldKey::Dimensions => "dimensions",
            FieldKey::Age => "age",
            FieldKey::Maker => "maker",
            FieldKey::Details => "details",
            FieldKey::Damage => "damage",
            FieldKey::MarketNotes => "marketNotes",
            FieldKey::Price => "price",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running the extractor over a model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParsedAppraisal {
    /// No recognizable label was found; the trimmed reply, unchanged.
    Raw { text: String },
    /// At least one labeled field was classified. Never empty.
    Structured { fields: BTreeMap<FieldKey, String> },
}

impl ParsedAppraisal {
    pub fn is_structured(&self) -> bool {
        matches!(self, ParsedAppraisal::Structured { .. })
    }

    /// Field value, if this is a structured result and the field was extracted.
    pub fn field(&self, key: FieldKey) -> Option<&str> {
        match self {
            ParsedAppraisal::Structured { fields } => fields.get(&key).map(String::as_str),
            ParsedAppraisal::Raw { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TurnStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TurnStatus::Pending)
    }
}

/// Reference to an image attached to a user turn (a file path or data URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub uri: String,
    pub mime_type: String,
}

impl ImageRef {
    pub fn new(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: mime_type.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    /// `None` only while an assistant turn is pending.
    pub text: Option<String>,
    pub image: Option<ImageRef>,
    pub status: TurnStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Turn {
    pub(crate) fn user(text: String, image: Option<ImageRef>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            text: Some(text),
            image,
            status: TurnStatus::Completed,
            created_at: now,
            finished_at: Some(now),
        }
    }

    pub(crate) fn pending_assistant() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            text: None,
            image: None,
            status: TurnStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn handle(&self) -> TurnHandle {
        TurnHandle(self.id)
    }

    pub fn is_pending(&self) -> bool {
        self.status == TurnStatus::Pending
    }
}

/// Opaque reference to a turn inside a [`crate::Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnHandle(pub(crate) Uuid);

impl TurnHandle {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TurnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppraisalError {
    #[error("Add an image or type a message to chat.")]
    InvalidInput,

    #[error("No response.")]
    NoContent,

    #[error("Turn {handle} is no longer pending; resolution dropped")]
    StaleResolution { handle: TurnHandle },

    #[error("Turn {handle} is not pending")]
    NotPending { handle: TurnHandle },

    #[error("A request is already in progress")]
    Busy,
}

pub type Result<T> = std::result::Result<T, AppraisalError>;
