use crate::client::VertexClient;
use crate::prompt::{build_generate_request, AppraisalRequest};
use crate::types::{AppraiserError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Trait for model backends that answer appraisal requests
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Get the name of this adapter
    fn adapter_name(&self) -> String;

    /// Send the request to the model and return its reply text
    async fn generate(&self, request: &AppraisalRequest) -> Result<String>;
}

/// Adapter backed by a Vertex AI Gemini model
pub struct VertexAdapter {
    client: VertexClient,
}

impl VertexAdapter {
    pub fn new(client: VertexClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ModelAdapter for VertexAdapter {
    fn adapter_name(&self) -> String {
        format!("Vertex AI ({})", self.client.url())
    }

    async fn generate(&self, request: &AppraisalRequest) -> Result<String> {
        let body = build_generate_request(request);
        info!(
            "Requesting appraisal (image: {}, note: {} chars)",
            request.has_image(),
            request.text.len()
        );
        self.client.generate_content(&body).await
    }
}

/// Mock adapter for development and testing
pub struct MockModelAdapter {
    name: String,
    reply: String,
    failure: Option<(u16, String)>,
    response_delay_ms: u64,
    calls: AtomicUsize,
}

impl MockModelAdapter {
    pub fn new(name: String) -> Self {
        Self {
            name,
            reply: "**Item name:** Sample item\n**Condition:** Good\n**Price:** $10-$20".to_string(),
            failure: None,
            response_delay_ms: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }

    /// Fail every call as if the model endpoint answered with `status`.
    pub fn failing(mut self, status: u16, message: impl Into<String>) -> Self {
        self.failure = Some((status, message.into()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn simulate_processing(&self) {
        if self.response_delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.response_delay_ms)).await;
        }
    }
}

#[async_trait]
impl ModelAdapter for MockModelAdapter {
    fn adapter_name(&self) -> String {
        format!("Mock Model Adapter ({})", self.name)
    }

    async fn generate(&self, request: &AppraisalRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_processing().await;

        debug!("Mock adapter answering request (image: {})", request.has_image());
        match &self.failure {
            Some((status, message)) => Err(AppraiserError::Upstream {
                status: *status,
                message: message.clone(),
            }),
            None => Ok(self.reply.clone()),
        }
    }
}
