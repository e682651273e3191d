//! Error types for the analytics SDK.

/// Errors that can occur when using the analytics SDK.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The ingest endpoint answered with a non-success status.
    #[error("Delivery failed with HTTP {status}: {body}")]
    Delivery { status: u16, body: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a [`Storage`](crate::Storage) backend.
///
/// These never reach host code; the identity layer treats any of them as
/// "storage unavailable" and falls back to in-memory values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Storage is disabled (privacy mode, blocked third-party context).
    #[error("storage unavailable")]
    Unavailable,

    /// Storage refused the write.
    #[error("storage quota exceeded")]
    QuotaExceeded,
}
