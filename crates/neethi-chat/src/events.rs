//! Session event types

use neethi_api::Message;
use serde::{Deserialize, Serialize};

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Events emitted by a session whenever its state changes.
///
/// Front ends subscribe and re-render from these; they never mutate state
/// themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A conversation was created
    ConversationCreated { conversation_id: String },

    /// The active conversation changed
    ActiveChanged { conversation_id: Option<String> },

    /// A message was appended to a conversation
    MessageAppended {
        conversation_id: String,
        message: Message,
    },

    /// A chunk was appended to a streaming message
    MessageUpdated {
        conversation_id: String,
        message_id: String,
        delta: String,
    },

    /// A message stopped streaming
    StreamEnded {
        conversation_id: String,
        message_id: String,
    },

    /// Messages were removed from the end of a conversation
    MessagesTruncated {
        conversation_id: String,
        remaining: usize,
    },

    /// A conversation was renamed (explicitly or by title derivation)
    ConversationRenamed {
        conversation_id: String,
        title: String,
    },

    /// A conversation was deleted
    ConversationDeleted { conversation_id: String },

    /// Every conversation was removed
    Cleared,

    /// The busy flag changed
    BusyChanged { busy: bool },

    /// A request failed
    Error { message: String },

    /// Transient user-facing notification
    Notice { level: NoticeLevel, message: String },
}

impl SessionEvent {
    /// Check if this event ends an in-flight request
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::BusyChanged { busy: false })
    }
}
