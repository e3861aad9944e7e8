use thiserror::Error;

/// Top-level error type for fanlog
#[derive(Debug, Error)]
pub enum FanlogError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by a sink's `init`, `write`, `flush` or `close`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Sink configuration error: {0}")]
    Config(String),

    #[error("Delivery failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("File write error: {0}")]
    File(String),

    #[error("Console write error: {0}")]
    Console(String),

    #[error("Sink is closed")]
    Closed,

    #[error("Sink is not running")]
    NotRunning,
}

/// Errors raised by the wire clients behind the remote sinks
///
/// Cloneable so the batched sink can latch one and hand it back on every
/// refused flush.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend rejected submission with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for fanlog operations
pub type Result<T> = std::result::Result<T, FanlogError>;
