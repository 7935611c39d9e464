mod common;

use appraisal_core::{AppraisalError, ImageRef, Role, TurnStatus, CANCELLED_PLACEHOLDER};
use appraisal_server::conversation::INLINE_IMAGE_URI;
use appraisal_server::prompt::{AppraisalRequest, ImagePayload};
use appraisal_server::{AppraiserError, Conversation, MockModelAdapter};
use common::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn text_request(text: &str) -> AppraisalRequest {
    AppraisalRequest::new(text, None).unwrap()
}

#[tokio::test]
async fn test_send_completes_turn() {
    init_tracing();
    let adapter = Arc::new(MockModelAdapter::new("conversation".to_string()));
    let conversation = Conversation::new(adapter.clone());

    let turn = conversation
        .send(text_request("What is this?"), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(turn.role, Role::Assistant);
    assert_eq!(turn.status, TurnStatus::Completed);
    assert!(turn.text.as_deref().unwrap().contains("**Item name:** Sample item"));
    assert_eq!(adapter.call_count(), 1);

    let session = conversation.session();
    let session = session.lock().await;
    assert_eq!(session.len(), 2, "one user turn and one assistant turn");
    assert_eq!(session.turns()[0].text.as_deref(), Some("What is this?"));
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_image_only_send_records_image() {
    init_tracing();
    let conversation = Conversation::new(Arc::new(MockModelAdapter::new("image".to_string())));
    let request = AppraisalRequest::new("", Some(ImagePayload::new(vec![0xff, 0xd8, 0xff], None))).unwrap();

    conversation
        .send(request, Some(ImageRef::new("lot-7.jpg", "image/jpeg")), CancellationToken::new())
        .await
        .unwrap();

    let session = conversation.session();
    let session = session.lock().await;
    let user_turn = &session.turns()[0];
    assert_eq!(user_turn.text.as_deref(), Some("Analyze this item."));
    assert_eq!(user_turn.image.as_ref().map(|i| i.uri.as_str()), Some("lot-7.jpg"));
}

#[tokio::test]
async fn test_image_only_send_without_image_ref() {
    init_tracing();
    let conversation = Conversation::new(Arc::new(MockModelAdapter::new("image".to_string())));
    let request = AppraisalRequest::new("", Some(ImagePayload::new(vec![1, 2, 3], Some("image/png")))).unwrap();

    let turn = conversation
        .send(request, None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(turn.status, TurnStatus::Completed);

    let session = conversation.session();
    let session = session.lock().await;
    let image = session.turns()[0].image.as_ref().expect("the attached photo is recorded");
    assert_eq!(image.uri, INLINE_IMAGE_URI);
    assert_eq!(image.mime_type, "image/png");
}

#[tokio::test]
async fn test_image_ref_without_image_is_not_recorded() {
    init_tracing();
    let conversation = Conversation::new(Arc::new(MockModelAdapter::new("text".to_string())));

    conversation
        .send(
            text_request("Just text"),
            Some(ImageRef::new("stale.jpg", "image/jpeg")),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let session = conversation.session();
    let session = session.lock().await;
    assert!(session.turns()[0].image.is_none(), "no photo was sent to the model");
}

#[tokio::test]
async fn test_model_failure_becomes_turn_text() {
    init_tracing();
    let adapter = MockModelAdapter::new("failing".to_string()).failing(403, "Permission denied");
    let conversation = Conversation::new(Arc::new(adapter));

    let turn = conversation
        .send(text_request("Hello"), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(turn.status, TurnStatus::Completed);
    assert_eq!(turn.text.as_deref(), Some("Error: Permission denied"));
    assert_eq!(
        conversation.last_assistant_text().await.as_deref(),
        Some("Error: Permission denied")
    );
}

#[tokio::test]
async fn test_cancel_token_stops_waiting() {
    init_tracing();
    let adapter = MockModelAdapter::new("slow".to_string()).with_delay(5_000);
    let conversation = Conversation::new(Arc::new(adapter));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let turn = tokio::time::timeout(
        Duration::from_secs(2),
        conversation.send(text_request("Take your time"), None, cancel),
    )
    .await
    .expect("cancellation should end the wait early")
    .unwrap();

    assert_eq!(turn.status, TurnStatus::Cancelled);
    assert_eq!(turn.text.as_deref(), Some(CANCELLED_PLACEHOLDER));
    assert_eq!(conversation.last_assistant_text().await.as_deref(), Some("Stopped."));
}

#[tokio::test]
async fn test_cancel_pending_stops_model_call() {
    init_tracing();
    let adapter = Arc::new(MockModelAdapter::new("slow".to_string()).with_delay(10_000));
    let conversation = Arc::new(Conversation::new(adapter.clone()));

    let sender = {
        let conversation = conversation.clone();
        tokio::spawn(async move {
            conversation
                .send(text_request("Slow question"), None, CancellationToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(conversation.cancel_pending().await, "a turn should be pending");

    let turn = tokio::time::timeout(Duration::from_secs(2), sender)
        .await
        .expect("send should return long before the model replies")
        .unwrap()
        .unwrap();
    assert_eq!(turn.status, TurnStatus::Cancelled);
    assert_eq!(turn.text.as_deref(), Some(CANCELLED_PLACEHOLDER));
    assert!(!conversation.cancel_pending().await, "nothing left to cancel");
    assert_eq!(adapter.call_count(), 1);
}

#[tokio::test]
async fn test_send_after_cancel_pending_completes() {
    init_tracing();
    let adapter = Arc::new(MockModelAdapter::new("slow".to_string()).with_delay(200));
    let conversation = Arc::new(Conversation::new(adapter.clone()));

    let first = {
        let conversation = conversation.clone();
        tokio::spawn(async move {
            conversation
                .send(text_request("First"), None, CancellationToken::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(conversation.cancel_pending().await);
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status, TurnStatus::Cancelled);

    let second = conversation
        .send(text_request("Second"), None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.status, TurnStatus::Completed);
    assert_eq!(
        conversation.last_assistant_text().await.as_deref(),
        second.text.as_deref()
    );
}

#[tokio::test]
async fn test_second_send_while_pending_is_busy() {
    init_tracing();
    let adapter = Arc::new(MockModelAdapter::new("slow".to_string()).with_delay(200));
    let conversation = Arc::new(Conversation::new(adapter.clone()));

    let first = {
        let conversation = conversation.clone();
        tokio::spawn(async move {
            conversation
                .send(text_request("First"), None, CancellationToken::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = conversation
        .send(text_request("Second"), None, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppraiserError::Appraisal(AppraisalError::Busy)));

    assert!(conversation.clear().await.is_err(), "cannot clear while a turn is pending");

    let turn = first.await.unwrap().unwrap();
    assert_eq!(turn.status, TurnStatus::Completed);
    assert_eq!(adapter.call_count(), 1, "the rejected send never reached the model");

    conversation.clear().await.unwrap();
    assert_eq!(conversation.last_assistant_text().await, None);
}
