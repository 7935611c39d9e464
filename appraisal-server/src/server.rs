//! HTTP backend for the appraisal chat.

use crate::llm_adapter::ModelAdapter;
use crate::prompt::{AppraisalRequest, ImagePayload, PROMPT_TEMPLATES};
use crate::types::{AppraiserError, Result, ServerConfig};
use appraisal_core::{extract, ParsedAppraisal};
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

pub const NO_INPUT_MESSAGE: &str = "Send an image and/or a message (text required for chat-only).";

#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<dyn ModelAdapter>,
}

#[derive(Debug, Serialize)]
pub struct AppraiseResponse {
    pub text: String,
    /// `None` when the model returned no text.
    pub appraisal: Option<ParsedAppraisal>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

fn error_response(status: StatusCode, error: impl Into<String>, upstream: Option<u16>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            status: upstream,
        }),
    )
        .into_response()
}

impl IntoResponse for AppraiserError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        error_response(status, self.to_string(), self.upstream_status())
    }
}

pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/api/appraise", post(appraise))
        .route("/api/templates", get(templates))
        .route("/api/health", get(|| async { "OK" }))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: ServerConfig, state: AppState) -> Result<()> {
    let app = router(state, &config);

    info!("Appraisal server listening on {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Read the `image` and `text` fields; anything else is ignored.
async fn read_form(mut multipart: Multipart) -> Result<(String, Option<ImagePayload>)> {
    let mut text = String::new();
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(|_| AppraiserError::InvalidMultipart)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "text" => {
                text = field.text().await.map_err(|_| AppraiserError::InvalidMultipart)?;
            }
            "image" => {
                let mime_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|_| AppraiserError::InvalidMultipart)?;
                image = Some(ImagePayload::new(bytes.to_vec(), mime_type.as_deref()));
            }
            _ => {}
        }
    }

    Ok((text, image))
}

async fn appraise(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = Uuid::new_v4();

    let form = match multipart {
        Ok(multipart) => read_form(multipart).await,
        Err(_) => Err(AppraiserError::InvalidMultipart),
    };
    let (text, image) = match form {
        Ok(form) => form,
        Err(e) => {
            warn!("[{}] {}", request_id, e);
            return e.into_response();
        }
    };

    let request = match AppraisalRequest::new(&text, image) {
        Ok(request) => request,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, NO_INPUT_MESSAGE, None),
    };

    info!(
        "[{}] Appraisal request via {} (image: {})",
        request_id,
        state.adapter.adapter_name(),
        request.has_image()
    );

    match state.adapter.generate(&request).await {
        Ok(text) => {
            let appraisal = extract(&text).ok();
            (StatusCode::OK, Json(AppraiseResponse { text, appraisal })).into_response()
        }
        Err(e) => {
            warn!("[{}] Appraisal failed: {}", request_id, e);
            e.into_response()
        }
    }
}

async fn templates() -> impl IntoResponse {
    Json(PROMPT_TEMPLATES)
}
