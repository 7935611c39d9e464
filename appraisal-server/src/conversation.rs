use crate::llm_adapter::ModelAdapter;
use crate::prompt::AppraisalRequest;
use crate::types::Result;
use appraisal_core::{AppraisalError, ImageRef, Session, Turn, TurnHandle};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Source shown for an attached photo that arrived without a name.
pub const INLINE_IMAGE_URI: &str = "inline";

/// Drives a chat session against a model, one request at a time.
pub struct Conversation {
    session: Arc<Mutex<Session>>,
    adapter: Arc<dyn ModelAdapter>,
    /// Cancels the model call of the pending turn, if any.
    in_flight: Mutex<Option<(TurnHandle, CancellationToken)>>,
}

impl Conversation {
    pub fn new(adapter: Arc<dyn ModelAdapter>) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            adapter,
            in_flight: Mutex::new(None),
        }
    }

    pub fn session(&self) -> Arc<Mutex<Session>> {
        self.session.clone()
    }

    /// Submit a request and wait for its assistant turn to finish.
    ///
    /// The session records an image exactly when the request carries one;
    /// `image_ref` only names it and defaults to [`INLINE_IMAGE_URI`].
    ///
    /// Cancelling `cancel`, or calling [`Conversation::cancel_pending`], drops
    /// the model call and marks the turn cancelled. Model errors become the
    /// turn's text as `Error: <message>`. Returns the finished assistant turn.
    pub async fn send(
        &self,
        request: AppraisalRequest,
        image_ref: Option<ImageRef>,
        cancel: CancellationToken,
    ) -> Result<Turn> {
        let image_ref = request.image.as_ref().map(|image| {
            image_ref.unwrap_or_else(|| ImageRef::new(INLINE_IMAGE_URI, image.mime_type.clone()))
        });
        let call = cancel.child_token();

        let handle = {
            let mut session = self.session.lock().await;
            let handle = session.submit(&request.text, image_ref)?;
            *self.in_flight.lock().await = Some((handle, call.clone()));
            handle
        };

        let reply = tokio::select! {
            _ = call.cancelled() => None,
            result = self.adapter.generate(&request) => Some(result),
        };

        let mut session = self.session.lock().await;
        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.as_ref().is_some_and(|(pending, _)| *pending == handle) {
                in_flight.take();
            }
        }
        match reply {
            None => {
                if let Err(e) = session.cancel(handle) {
                    debug!("Cancel after completion ignored: {}", e);
                }
            }
            Some(result) => {
                let text = match result {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Model request failed: {}", e);
                        format!("Error: {}", e)
                    }
                };
                match session.resolve(handle, text) {
                    Ok(()) | Err(AppraisalError::StaleResolution { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        session
            .turn(handle)
            .cloned()
            .ok_or_else(|| AppraisalError::StaleResolution { handle }.into())
    }

    /// Cancel whatever request is outstanding and stop its model call.
    /// Returns false when idle.
    pub async fn cancel_pending(&self) -> bool {
        let mut session = self.session.lock().await;
        let Some(handle) = session.pending() else {
            return false;
        };
        if let Some((_, call)) = self.in_flight.lock().await.take() {
            call.cancel();
        }
        session.cancel(handle).is_ok()
    }

    pub async fn last_assistant_text(&self) -> Option<String> {
        self.session.lock().await.last_assistant_text().map(str::to_string)
    }

    pub async fn clear(&self) -> Result<()> {
        Ok(self.session.lock().await.clear()?)
    }
}
