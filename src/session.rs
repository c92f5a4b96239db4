use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// Delivery state recorded on a message when it is appended. Entries are
/// immutable afterwards, so the state never changes once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Sent,
    Delivered,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Delivery>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::stamped(text, Sender::User, Some(Delivery::Sent))
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::stamped(text, Sender::Bot, Some(Delivery::Delivered))
    }

    fn stamped(text: impl Into<String>, sender: Sender, status: Option<Delivery>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
            status,
        }
    }
}

/// In-memory conversation state. The transcript is append-only: messages are
/// pushed by the controller and never reordered, edited, or removed except by
/// a full `clear`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub messages: Vec<Message>,
    pub pending: bool,
    pub last_error: Option<String>,
    /// Intent key -> human-readable follow-up question, replaced wholesale
    /// after each reply that carries suggestions.
    pub related: BTreeMap<String, String>,
}

impl SessionState {
    pub fn last_bot_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.sender == Sender::Bot)
    }

    /// Suggestions belong to the most recent bot message only; any other
    /// message gets none regardless of what the session currently holds.
    pub fn suggestions_for(&self, message_id: Uuid) -> Option<&BTreeMap<String, String>> {
        if self.related.is_empty() {
            return None;
        }
        let anchor = self.last_bot_message()?;
        (anchor.id == message_id).then_some(&self.related)
    }
}
