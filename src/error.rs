//! Error types for the chat client.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors raised while composing, dispatching or committing a chat turn.
#[derive(Debug, Error)]
pub enum ChatError {
    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The completion API answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message reported by the API (or the raw body).
        message: String,
    },

    /// A response body or stream fragment could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response did not carry any assistant content.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The user cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// Input rejected before any state mutation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Local storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parse error.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Whether the pipeline should retry after this error.
    ///
    /// Everything except an explicit user cancellation counts as transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Whether this error represents a user cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
