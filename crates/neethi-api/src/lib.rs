//! neethi-api: client for a locally hosted chat-completion backend
//!
//! This crate provides the wire types, a request/response completion call and
//! a streamed completion call that decodes the backend's server-sent events
//! into content fragments, plus the backend's model and prompt endpoints.

pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{ChatClient, DEFAULT_BASE_URL};
pub use error::{Error, Result};
pub use stream::ChunkStream;
pub use types::*;
