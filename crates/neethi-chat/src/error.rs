//! Error types for neethi-chat

use thiserror::Error;

use crate::storage::StorageError;

/// Result type alias using neethi-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during session operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the transport layer
    #[error(transparent)]
    Api(#[from] neethi_api::Error),

    /// Persisting or loading local state failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A request is already in flight for this session
    #[error("A response is already being generated")]
    Busy,

    /// The in-flight request was aborted
    #[error("Request aborted")]
    Aborted,
}
