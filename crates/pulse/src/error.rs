//! Error types for the Pulse SDK.

/// Errors that can occur when using the Pulse SDK.
///
/// Delivery failures never surface through this type: the delivery worker
/// absorbs them and leaves (or drops) the affected request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid or missing configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A caller-supplied argument was rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Persistent storage could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client has been shutdown.
    #[error("Client has been shutdown")]
    Shutdown,
}
