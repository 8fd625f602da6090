use thiserror::Error;

/// Top-level error type for okibot.
#[derive(Debug, Error)]
pub enum OkibotError {
    /// Connection drop, pairing failure, or send failure on the messaging transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// Error from a completion or image provider.
    #[error("provider error: {0}")]
    Provider(String),

    /// Session archive or restore failure.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Malformed command argument.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
