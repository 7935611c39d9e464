mod common;

use appraisal_server::prompt::{build_generate_request, AppraisalRequest};
use appraisal_server::{AppraiserError, ServerConfig, StaticTokenProvider, VertexClient};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use common::{init_tracing, spawn_stub};
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

/// Serve a fixed status and body at `/generate` and return a client pointed at it
async fn client_for(status: StatusCode, body: &'static str) -> VertexClient {
    let app = Router::new().route(
        "/generate",
        post(move |headers: HeaderMap| async move {
            if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer test-token") {
                return (StatusCode::UNAUTHORIZED, r#"{"error":{"message":"bad token"}}"#);
            }
            (status, body)
        }),
    );
    let addr = spawn_stub(app).await;
    let url = Url::parse(&format!("http://{}/generate", addr)).unwrap();

    VertexClient::new(
        &ServerConfig::default(),
        url,
        Arc::new(StaticTokenProvider::new("test-token")),
    )
    .unwrap()
}

fn text_request() -> appraisal_server::prompt::GenerateContentRequest {
    build_generate_request(&AppraisalRequest::new("What is this?", None).unwrap())
}

#[tokio::test]
async fn test_concatenates_candidate_parts() {
    init_tracing();
    let client = client_for(
        StatusCode::OK,
        r#"{"candidates":[{"content":{"parts":[{"text":"**Item name:** Vase"},{"text":"\n**Price:** $100"}]}},{"content":{"parts":[{"text":"ignored"}]}}]}"#,
    )
    .await;

    let text = client.generate_content(&text_request()).await.unwrap();
    assert_eq!(text, "**Item name:** Vase\n**Price:** $100");
}

#[tokio::test]
async fn test_empty_candidates_give_empty_text() {
    init_tracing();
    let client = client_for(StatusCode::OK, r#"{"candidates":[]}"#).await;

    let text = client.generate_content(&text_request()).await.unwrap();
    assert_eq!(text, "", "no candidates means an empty reply, not an error");
}

#[tokio::test]
async fn test_request_body_reaches_server() {
    init_tracing();
    let app = Router::new().route(
        "/generate",
        post(|Json(body): Json<Value>| async move {
            let text = body["contents"][0]["parts"][0]["text"].clone();
            Json(json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }))
        }),
    );
    let addr = spawn_stub(app).await;
    let client = VertexClient::new(
        &ServerConfig::default(),
        Url::parse(&format!("http://{}/generate", addr)).unwrap(),
        Arc::new(StaticTokenProvider::new("test-token")),
    )
    .unwrap();

    let text = client.generate_content(&text_request()).await.unwrap();
    assert_eq!(text, "What is this?");
}

#[tokio::test]
async fn test_client_error_keeps_upstream_status() {
    init_tracing();
    let client = client_for(
        StatusCode::FORBIDDEN,
        r#"{"error":{"code":403,"message":"Permission denied","status":"PERMISSION_DENIED"}}"#,
    )
    .await;

    let err = client.generate_content(&text_request()).await.unwrap_err();
    match &err {
        AppraiserError::Upstream { status, message } => {
            assert_eq!(*status, 403);
            assert_eq!(message, "Permission denied");
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
    assert_eq!(err.http_status(), 400);
    assert_eq!(err.upstream_status(), Some(403));
}

#[tokio::test]
async fn test_server_error_appends_details() {
    init_tracing();
    let client = client_for(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"error":{"status":"INTERNAL","details":[{"reason":"overloaded"}]}}"#,
    )
    .await;

    let err = client.generate_content(&text_request()).await.unwrap_err();
    assert_eq!(err.to_string(), r#"INTERNAL [{"reason":"overloaded"}]"#);
    assert_eq!(err.http_status(), 502);
}

#[tokio::test]
async fn test_error_without_message_uses_fallback() {
    init_tracing();
    let client = client_for(StatusCode::NOT_FOUND, "{}").await;

    let err = client.generate_content(&text_request()).await.unwrap_err();
    assert_eq!(err.to_string(), "Vertex AI request failed");
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn test_non_json_response() {
    init_tracing();
    let client = client_for(StatusCode::SERVICE_UNAVAILABLE, "<html>Service Unavailable</html>").await;

    let err = client.generate_content(&text_request()).await.unwrap_err();
    assert!(matches!(err, AppraiserError::NonJsonResponse { status: 503 }));
    assert_eq!(err.to_string(), "Vertex AI returned non-JSON. Status: 503");
    assert_eq!(err.http_status(), 502);
}

#[tokio::test]
async fn test_missing_token_stops_before_request() {
    init_tracing();
    let client = VertexClient::new(
        &ServerConfig::default(),
        Url::parse("http://127.0.0.1:9/generate").unwrap(),
        Arc::new(StaticTokenProvider::new("")),
    )
    .unwrap();

    let err = client.generate_content(&text_request()).await.unwrap_err();
    assert!(matches!(err, AppraiserError::MissingAccessToken));
    assert_eq!(err.http_status(), 500);
}
