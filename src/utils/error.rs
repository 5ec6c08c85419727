//! Error Handling
//!
//! Unified error types for the client core.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Core-wide error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Identity could not be resolved and guest synthesis is disabled
    #[error("Identity unavailable")]
    IdentityUnavailable,

    /// Socket-level failures (connect, send, close)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Per-request stream failures
    #[error("Stream error: {0}")]
    Stream(String),

    /// An inbound frame failed schema validation
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Task submission failed at the HTTP level
    #[error("Submit failed: {0}")]
    SubmitFailed(String),

    /// Task cancellation failed at the HTTP level
    #[error("Cancel failed: {0}")]
    CancelFailed(String),

    /// Invalid caller-supplied input (e.g. out-of-range options)
    #[error("Validation error: {0}")]
    Validation(String),

    /// HTTP client errors (auto-converted from reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a protocol violation error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a submit failure
    pub fn submit_failed(msg: impl Into<String>) -> Self {
        Self::SubmitFailed(msg.into())
    }

    /// Create a cancel failure
    pub fn cancel_failed(msg: impl Into<String>) -> Self {
        Self::CancelFailed(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convert CoreError to a string suitable for host-shell responses
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
