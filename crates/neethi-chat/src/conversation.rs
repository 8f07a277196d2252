//! Conversation state: conversations, the active selection, busy flag and last error.

use chrono::{DateTime, Utc};
use neethi_api::{Message, Role, new_id};
use serde::{Deserialize, Serialize};

use crate::title::{DEFAULT_TITLE, derive_title};

/// An ordered, titled thread of messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation with the default title
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh the last-update timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append a message, deriving the title from the first user message
    /// while the conversation still carries the default title.
    pub fn push(&mut self, message: Message) {
        if self.messages.is_empty() && message.role == Role::User && self.title == DEFAULT_TITLE {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
        self.touch();
    }

    /// Find a message by id
    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// The message currently receiving chunks, if any
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_streaming)
    }

    /// Clear streaming flags left over from an interrupted run.
    /// Returns how many messages were repaired.
    pub fn settle_streaming(&mut self) -> usize {
        let mut repaired = 0;
        for message in self.messages.iter_mut().filter(|m| m.is_streaming) {
            message.is_streaming = false;
            repaired += 1;
        }
        repaired
    }

    /// The prompt of the last exchange, if the conversation ends in an
    /// assistant reply to a user message
    pub fn last_exchange(&self) -> Option<&str> {
        match self.messages.as_slice() {
            [.., prompt, reply] if prompt.role == Role::User && reply.role == Role::Assistant => {
                Some(&prompt.content)
            }
            _ => None,
        }
    }

    /// Remove the last exchange and return its prompt
    pub(crate) fn take_last_exchange(&mut self) -> Option<String> {
        let content = self.last_exchange()?.to_string();
        self.messages.truncate(self.messages.len() - 2);
        self.touch();
        Some(content)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// The full chat session state
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// All conversations in creation order
    pub conversations: Vec<Conversation>,
    /// The conversation targeted by user actions
    pub active_id: Option<String>,
    /// Whether a request is in flight
    pub is_busy: bool,
    /// Last transport error, cleared when the next request starts
    pub last_error: Option<String>,
}

impl SessionState {
    /// Look up a conversation
    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Look up a conversation for mutation
    pub fn conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    /// The active conversation, if any
    pub fn active(&self) -> Option<&Conversation> {
        self.active_id.as_deref().and_then(|id| self.conversation(id))
    }

    /// The active conversation for mutation
    pub fn active_mut(&mut self) -> Option<&mut Conversation> {
        let id = self.active_id.clone()?;
        self.conversation_mut(&id)
    }

    /// Whether a conversation with this id exists
    pub fn contains(&self, id: &str) -> bool {
        self.conversation(id).is_some()
    }

    /// Index of the active conversation, creating and activating a new one
    /// if none is active. The flag reports whether one was created.
    pub(crate) fn ensure_active(&mut self) -> (usize, bool) {
        let existing = self
            .active_id
            .as_deref()
            .and_then(|id| self.conversations.iter().position(|c| c.id == id));
        if let Some(index) = existing {
            return (index, false);
        }
        let conversation = Conversation::new();
        self.active_id = Some(conversation.id.clone());
        self.conversations.push(conversation);
        (self.conversations.len() - 1, true)
    }
}
