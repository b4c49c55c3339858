//! Error types for the chat-completions transport.

use thiserror::Error;

/// Failure of a single chat-completions call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx HTTP status. `body` is the raw response text.
    #[error("API request failed with status {status}: {body}")]
    Transport { status: u16, body: String },

    /// The provider reported an `error` object, possibly with HTTP 200.
    #[error("API error: {code} - {message}")]
    Api {
        code: String,
        message: String,
        kind: String,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("empty result: {0}")]
    EmptyResult(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("HTTP client error: {0}")]
    Http(#[from] ureq::Error),

    #[error("failed to read response: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }
}
