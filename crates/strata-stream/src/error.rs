//! Error types for strata-stream.

use thiserror::Error;

/// Error type for streaming operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hound error: {0}")]
    Hound(#[from] hound::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Source has zero channels")]
    ZeroChannels,

    #[error("Channel count mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Stream not found: {0}")]
    SourceNotFound(u64),

    #[error("Streaming engine is not running")]
    EngineStopped,

    #[error("Streaming engine command queue is full")]
    QueueFull,

    #[error("Streaming engine did not respond within {0:?}")]
    SyncTimeout(std::time::Duration),

    #[error(transparent)]
    Core(#[from] strata_core::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
