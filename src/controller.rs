use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, watch};

use crate::auth::TokenStore;
use crate::client::{ApiError, AssistantApi};
use crate::session::{Message, SessionState};

/// Shown for non-2xx responses. The body is not inspected on failure, so
/// there is nothing more specific to say.
const REQUEST_FAILED: &str = "The assistant is unavailable right now. Please try again.";

/// Precondition failures. These abort before any state mutation; everything
/// that happens after the request is issued lands in `last_error` instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// No stored credential; the caller should route the user to login.
    #[error("not logged in")]
    NotAuthenticated,
    /// A send is already awaiting its reply.
    #[error("another message is still waiting for a reply")]
    Busy,
    #[error("credential store failed: {0}")]
    TokenStore(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The bot replied; the message is already appended to the transcript.
    Replied(Message),
    /// The send failed; the same description is in `last_error`.
    Failed(String),
    /// A reset raced the send and won; the outcome was discarded.
    Cancelled,
}

/// Mediates between user input and the assistant endpoint, and owns the
/// conversation state. Methods take `&self` so one controller can be shared
/// across tasks; sends are strictly serialized by the pending flag.
pub struct SessionController {
    api: Arc<dyn AssistantApi>,
    tokens: Arc<dyn TokenStore>,
    state: RwLock<SessionState>,
    /// Reset epoch. `clear` and `logout` bump it, which cancels the in-flight
    /// send and invalidates any outcome that already settled.
    reset: watch::Sender<u64>,
}

impl SessionController {
    pub fn new(api: Arc<dyn AssistantApi>, tokens: Arc<dyn TokenStore>) -> Self {
        let (reset, _) = watch::channel(0);
        Self {
            api,
            tokens,
            state: RwLock::new(SessionState::default()),
            reset,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// Route guard, evaluated once per session start: ok iff a credential is
    /// stored. Never touches the transcript.
    pub fn initialize(&self) -> Result<(), SendError> {
        self.require_token().map(drop)
    }

    /// Posts `text` to the assistant and applies the outcome. Callers are
    /// responsible for rejecting empty input; the operation itself does not
    /// re-validate. Exactly one network call per invocation, no retries.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, SendError> {
        // Token is re-read on every send, not just at session start.
        let token = self.require_token()?;

        let (epoch, mut reset_rx) = {
            let mut state = self.state.write().await;
            if state.pending {
                return Err(SendError::Busy);
            }
            state.messages.push(Message::user(text));
            state.pending = true;
            state.last_error = None;
            state.related.clear();
            // Subscribe under the lock: resets also bump under it, so no
            // epoch change can slip between snapshot and subscription.
            (*self.reset.borrow(), self.reset.subscribe())
        };

        // Sole suspension point. A reset drops the request future outright.
        let settled = tokio::select! {
            outcome = self.api.send_message(&token, text) => Some(outcome),
            _ = reset_rx.changed() => None,
        };

        let Some(outcome) = settled else {
            tracing::debug!("send cancelled by reset while in flight");
            return Ok(SendOutcome::Cancelled);
        };

        let mut state = self.state.write().await;
        if *self.reset.borrow() != epoch {
            // The request settled, but a reset got the lock first.
            tracing::debug!("discarding reply that settled after a reset");
            return Ok(SendOutcome::Cancelled);
        }

        state.pending = false;
        match outcome {
            Ok(reply) => {
                let message = Message::bot(reply.text);
                state.messages.push(message.clone());
                if let Some(related) = reply.related {
                    state.related = related;
                }
                Ok(SendOutcome::Replied(message))
            }
            Err(err) => {
                let description = describe_failure(&err);
                tracing::debug!("send failed: {err}");
                state.last_error = Some(description.clone());
                Ok(SendOutcome::Failed(description))
            }
        }
    }

    /// Empties the transcript, the error slot, and the suggestion map, and
    /// cancels any in-flight send. The stored credential is untouched.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.messages.clear();
        state.last_error = None;
        state.related.clear();
        state.pending = false;
        // Bump under the lock so a send that already settled cannot apply
        // its outcome between our unlock and the bump.
        self.bump_reset();
    }

    /// Deletes the stored credential and cancels any in-flight send. The
    /// caller routes the user back to login afterwards.
    pub async fn logout(&self) -> anyhow::Result<()> {
        self.tokens.clear()?;
        let mut state = self.state.write().await;
        state.pending = false;
        self.bump_reset();
        Ok(())
    }

    fn require_token(&self) -> Result<String, SendError> {
        match self.tokens.load() {
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(SendError::NotAuthenticated),
            Err(e) => Err(SendError::TokenStore(e.to_string())),
        }
    }

    fn bump_reset(&self) {
        self.reset.send_modify(|epoch| *epoch += 1);
    }
}

fn describe_failure(err: &ApiError) -> String {
    match err {
        // Status failures get the fixed generic text; transport and decode
        // failures surface their own description.
        ApiError::Status { .. } => REQUEST_FAILED.to_string(),
        other => other.to_string(),
    }
}
