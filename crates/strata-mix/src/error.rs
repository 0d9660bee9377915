//! Error types for strata-mix.

use thiserror::Error;

/// Error type for session and mixing operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Clip has zero length")]
    ZeroLengthClip,

    #[error("Unknown track: {0}")]
    UnknownTrack(u64),

    #[error("Track {0} is not an audio track")]
    NotAudioTrack(u64),

    #[error("Unknown clip: {0}")]
    UnknownClip(u64),

    #[error("Invalid routing: {0}")]
    InvalidRouting(String),

    #[error("Capacity exhausted: at most {max} {what}")]
    CapacityExhausted { what: &'static str, max: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Stream error: {0}")]
    Stream(#[from] strata_stream::Error),

    #[error(transparent)]
    Core(#[from] strata_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
