use crate::defs::{
    AppraisalError, CANCELLED_PLACEHOLDER, IMAGE_ONLY_PROMPT, ImageRef, Result, Role, Turn,
    TurnHandle, TurnStatus,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

/// Ordered history of turns for one interactive user.
///
/// Turns are only ever appended, except that a pending assistant turn is
/// updated in place when it reaches `Completed` or `Cancelled`. At most one
/// turn is pending at any time, and a terminal turn never changes again.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Record a user submission and open a pending assistant turn for it.
    ///
    /// Fails with `InvalidInput` when there is neither text nor an image, and
    /// with `Busy` while another turn is still pending. Nothing is appended
    /// on failure.
    pub fn submit(&mut self, user_text: &str, image: Option<ImageRef>) -> Result<TurnHandle> {
        let user_text = user_text.trim();
        if user_text.is_empty() && image.is_none() {
            return Err(AppraisalError::InvalidInput);
        }
        if self.is_busy() {
            return Err(AppraisalError::Busy);
        }

        let display_text = if user_text.is_empty() {
            IMAGE_ONLY_PROMPT.to_string()
        } else {
            user_text.to_string()
        };

        self.turns.push(Turn::user(display_text, image));
        let assistant = Turn::pending_assistant();
        let handle = assistant.handle();
        self.turns.push(assistant);

        info!("Session {}: submitted turn {}", self.id, handle);
        Ok(handle)
    }

    /// Complete a pending turn with the model's reply (or an error message).
    ///
    /// A turn that is no longer pending, for instance because it was
    /// cancelled, is left untouched and `StaleResolution` is returned.
    pub fn resolve(&mut self, handle: TurnHandle, text: impl Into<String>) -> Result<()> {
        let session_id = self.id;
        let Some(turn) = self.pending_turn_mut(handle) else {
            debug!("Session {}: dropping late resolution for {}", session_id, handle);
            return Err(AppraisalError::StaleResolution { handle });
        };

        turn.text = Some(text.into());
        turn.status = TurnStatus::Completed;
        turn.finished_at = Some(Utc::now());

        info!("Session {}: completed turn {}", session_id, handle);
        Ok(())
    }

    /// Cancel a pending turn, replacing its text with the stop placeholder.
    pub fn cancel(&mut self, handle: TurnHandle) -> Result<()> {
        let session_id = self.id;
        let Some(turn) = self.pending_turn_mut(handle) else {
            return Err(AppraisalError::NotPending { handle });
        };

        turn.text = Some(CANCELLED_PLACEHOLDER.to_string());
        turn.status = TurnStatus::Cancelled;
        turn.finished_at = Some(Utc::now());

        info!("Session {}: cancelled turn {}", session_id, handle);
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn turn(&self, handle: TurnHandle) -> Option<&Turn> {
        self.turns.iter().find(|turn| turn.id == handle.0)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Handle of the pending assistant turn, if a request is outstanding.
    pub fn pending(&self) -> Option<TurnHandle> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.is_pending())
            .map(Turn::handle)
    }

    pub fn is_busy(&self) -> bool {
        self.pending().is_some()
    }

    /// Text of the most recent finished assistant turn with non-empty text.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .filter(|turn| turn.role == Role::Assistant && !turn.is_pending())
            .find_map(|turn| turn.text.as_deref().filter(|text| !text.is_empty()))
    }

    /// Drop the whole history. Refused while a request is outstanding.
    pub fn clear(&mut self) -> Result<()> {
        if self.is_busy() {
            return Err(AppraisalError::Busy);
        }
        self.turns.clear();
        info!("Session {}: cleared", self.id);
        Ok(())
    }

    fn pending_turn_mut(&mut self, handle: TurnHandle) -> Option<&mut Turn> {
        self.turns
            .iter_mut()
            .find(|turn| turn.id == handle.0)
            .filter(|turn| turn.is_pending())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
