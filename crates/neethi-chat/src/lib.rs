//! neethi-chat: conversation state for the neethi chat client
//!
//! This crate owns the conversations, drives streamed replies through a
//! [`Transport`] and persists everything through [`LocalStorage`].

pub mod conversation;
pub mod error;
pub mod events;
pub mod handle;
pub mod session;
pub mod storage;
pub mod title;
pub mod transport;

pub use conversation::{Conversation, SessionState};
pub use error::{Error, Result};
pub use events::{NoticeLevel, SessionEvent};
pub use handle::SessionHandle;
pub use session::ChatSession;
pub use storage::{FileStore, KeyValueStore, LocalStorage, MemoryStore, Preferences, StorageError};
pub use title::{DEFAULT_TITLE, derive_title};
pub use transport::Transport;
