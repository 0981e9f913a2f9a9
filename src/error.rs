//! Error types for the subcap pipeline.

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the batch pipeline and live sessions.
///
/// Fatal conditions (missing input, unavailable backend, write failures)
/// propagate and abort the request. Recoverable conditions on the live path
/// (a single frame failing to decode) are reported as values by the session
/// and never surface through this type.
#[derive(Debug, Error)]
pub enum Error {
    /// Source media file does not exist
    #[error("input not found: {0}")]
    InputNotFound(String),

    /// Audio or codec failure on a chunk or whole file
    #[error("decode error: {0}")]
    Decode(String),

    /// Recognition backend failed to initialize
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// A recognition call failed
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Pre-flight or mid-stream budget violation
    #[error("credit exhausted: {0}")]
    CreditExhausted(String),

    /// Unknown user or ledger unreachable
    #[error("credit lookup failed: {0}")]
    CreditLookup(String),

    /// Subtitle or record write failure
    #[error("format write error: {0}")]
    FormatWrite(String),

    /// A session method was called in the wrong state
    #[error("session error: {0}")]
    Session(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
