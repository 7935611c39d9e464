use crate::auth::TokenProvider;
use crate::prompt::GenerateContentRequest;
use crate::types::{AppraiserError, Result, ServerConfig};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use url::Url;

#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate; empty when there is none.
    pub fn text(&self) -> String {
        self.candidates
            .as_ref()
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.content.as_ref())
            .and_then(|content| content.parts.as_ref())
            .map(|parts| {
                parts
                    .iter()
                    .map(|part| part.text.as_deref().unwrap_or(""))
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Human-readable message for a failed call.
    pub fn error_message(&self) -> String {
        let error = self.error.as_ref();
        let mut message = error
            .and_then(|e| e.message.clone().filter(|m| !m.is_empty()))
            .or_else(|| error.and_then(|e| e.status.clone().filter(|s| !s.is_empty())))
            .unwrap_or_else(|| "Vertex AI request failed".to_string());

        if let Some(details) = error.and_then(|e| e.details.as_ref()) {
            message.push(' ');
            message.push_str(&details.to_string());
        }
        message
    }
}

/// HTTP client for the Vertex AI `generateContent` method.
pub struct VertexClient {
    client: Client,
    url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl VertexClient {
    pub fn new(config: &ServerConfig, url: Url, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        Ok(Self::with_client(build_http_client(config)?, url, tokens))
    }

    pub fn with_client(client: Client, url: Url, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { client, url, tokens }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn generate_content(&self, body: &GenerateContentRequest) -> Result<String> {
        let start_time = Instant::now();
        let token = self.tokens.access_token().await?;

        debug!("Calling generateContent: {}", self.url);
        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|_| AppraiserError::NonJsonResponse { status: status.as_u16() })?;
        let parsed: GenerateContentResponse = serde_json::from_value(value).unwrap_or_default();

        if !status.is_success() {
            error!("Vertex AI error: HTTP {} {:?}", status, parsed.error);
            return Err(AppraiserError::Upstream {
                status: status.as_u16(),
                message: parsed.error_message(),
            });
        }

        let text = parsed.text();
        info!(
            "Vertex AI replied with {} characters in {}ms",
            text.len(),
            start_time.elapsed().as_millis()
        );
        Ok(text)
    }
}

pub fn build_http_client(config: &ServerConfig) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .gzip(true)
        .deflate(true)
        .brotli(true)
        .build()?)
}
