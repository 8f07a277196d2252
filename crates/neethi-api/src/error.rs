//! Error types for neethi-api

use thiserror::Error;

/// Result type alias using neethi-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the chat backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed (connection refused, reset, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered with a non-2xx status
    #[error("HTTP error! status: {status}")]
    Status { status: u16, body: String },

    /// Backend reported an error inside an otherwise healthy response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// HTTP status code, if the backend answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the backend was never reached
    pub fn is_connection(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_matches_client_wording() {
        let e = Error::Status {
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(e.to_string(), "HTTP error! status: 503");
        assert_eq!(e.status(), Some(503));
    }

    #[test]
    fn test_api_constructor() {
        let e = Error::api("stream_error", "model crashed");
        assert!(matches!(e, Error::Api { ref error_type, .. } if error_type == "stream_error"));
        assert!(e.to_string().contains("model crashed"));
        assert_eq!(e.status(), None);
    }

    #[test]
    fn test_not_connection_for_non_http() {
        assert!(!Error::Sse("boom".into()).is_connection());
        assert!(!Error::api("x", "y").is_connection());
    }
}
