//! Error types for strata-core.

use thiserror::Error;

/// Error type for strata-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Driver is not set up")]
    DriverNotReady,

    #[error("Event queue saturated (capacity {capacity}) after {retries} retries")]
    EventQueueSaturated { capacity: usize, retries: u32 },

    #[error("Event channel disconnected")]
    Disconnected,

    #[error("Audio thread stalled for {0} watchdog intervals")]
    Stalled(u32),

    #[error("Unknown client: {0}")]
    UnknownClient(u64),

    #[cfg(feature = "cpal")]
    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "cpal")]
    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "cpal")]
    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "cpal")]
    #[error("Failed to pause audio stream")]
    PauseStream(#[from] cpal::PauseStreamError),

    #[cfg(feature = "cpal")]
    #[error("Failed to enumerate devices")]
    DevicesError(#[from] cpal::DevicesError),

    #[cfg(feature = "cpal")]
    #[error("Failed to get device name")]
    DeviceNameError(#[from] cpal::DeviceNameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
