use appraisal_core::AppraisalError;
use std::net::SocketAddr;

/// Environment lookup used by the config loaders; `std::env::var` in production.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Read a variable, treating empty and all-whitespace values as unset.
pub(crate) fn non_empty(lookup: EnvLookup<'_>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Which Vertex AI model to call, as given by the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexConfig {
    pub project_id: Option<String>,
    pub location: Option<String>,
    pub endpoint_id: Option<String>,
    /// Full resource name: `projects/{p}/locations/{l}/models/{m}`.
    pub vertex_model: Option<String>,
    pub gemini_model: Option<String>,
}

impl VertexConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(lookup: EnvLookup<'_>) -> Self {
        Self {
            project_id: non_empty(lookup, "PROJECT_ID"),
            location: non_empty(lookup, "VERTEX_LOCATION"),
            endpoint_id: non_empty(lookup, "VERTEX_ENDPOINT_ID"),
            vertex_model: non_empty(lookup, "VERTEX_MODEL"),
            gemini_model: non_empty(lookup, "GEMINI_MODEL"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            user_agent: "Auction-Appraiser/1.0".to_string(),
            timeout_seconds: 120,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(bind) = non_empty(lookup, "APPRAISER_BIND") {
            config.bind_addr = bind
                .parse()
                .map_err(|_| AppraiserError::General(format!("Invalid APPRAISER_BIND address: {}", bind)))?;
        }
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppraiserError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Missing model config: set VERTEX_MODEL (full resource name) or PROJECT_ID, VERTEX_LOCATION, and GEMINI_MODEL")]
    MissingModelConfig,

    #[error("Invalid GCP_SERVICE_ACCOUNT_KEY JSON.")]
    InvalidServiceAccountKey(#[source] serde_json::Error),

    #[error("Could not get Google access token. Check GOOGLE_APPLICATION_CREDENTIALS.")]
    MissingAccessToken,

    #[error("Token signing failed: {0}")]
    TokenSigning(#[from] jsonwebtoken::errors::Error),

    #[error("Vertex AI returned non-JSON. Status: {status}")]
    NonJsonResponse { status: u16 },

    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("Unsupported image file: {path}")]
    UnsupportedImage { path: String },

    #[error("Invalid multipart body")]
    InvalidMultipart,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Appraisal(#[from] AppraisalError),

    #[error("General error: {0}")]
    General(String),
}

impl AppraiserError {
    /// HTTP status the backend answers with when this error ends a request.
    pub fn http_status(&self) -> u16 {
        match self {
            AppraiserError::NonJsonResponse { status } | AppraiserError::Upstream { status, .. } => {
                if *status >= 500 {
                    502
                } else {
                    400
                }
            }
            AppraiserError::InvalidMultipart
            | AppraiserError::UnsupportedImage { .. }
            | AppraiserError::Appraisal(_) => 400,
            _ => 500,
        }
    }

    /// Upstream status to echo back to the client, when there is one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            AppraiserError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppraiserError>;
