//! Session configuration.

use crate::{Error, Result};
use strata_core::EventConfig;
use strata_stream::StreamConfig;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Channels of every track, bus and the master.
    pub channels: usize,
    /// Track slots reserved on the audio thread.
    pub max_tracks: usize,
    /// Clip slots reserved per track.
    pub max_clips_per_track: usize,
    /// The session's own control/audio event channel.
    pub events: EventConfig,
    /// Rolling cycles between transport position notifications.
    pub position_notify_interval: u32,
    /// Limit applied to the master output; `None` passes overs through.
    pub output_clamp: Option<f32>,
    /// Configuration of the session's streaming worker.
    pub stream: StreamConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            max_tracks: 64,
            max_clips_per_track: 256,
            events: EventConfig::default(),
            position_notify_interval: 8,
            output_clamp: Some(1.0),
            stream: StreamConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_limits(mut self, tracks: usize, clips_per_track: usize) -> Self {
        self.max_tracks = tracks;
        self.max_clips_per_track = clips_per_track;
        self
    }

    pub fn with_events(mut self, events: EventConfig) -> Self {
        self.events = events;
        self
    }

    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_output_clamp(mut self, clamp: Option<f32>) -> Self {
        self.output_clamp = clamp;
        self
    }

    pub fn with_position_interval(mut self, cycles: u32) -> Self {
        self.position_notify_interval = cycles;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(Error::InvalidConfig("channels must be non-zero".into()));
        }
        if self.max_tracks == 0 || self.max_clips_per_track == 0 {
            return Err(Error::InvalidConfig(
                "track and clip limits must be non-zero".into(),
            ));
        }
        if self.position_notify_interval == 0 {
            return Err(Error::InvalidConfig(
                "position_notify_interval must be non-zero".into(),
            ));
        }
        if let Some(clamp) = self.output_clamp {
            if !(clamp.is_finite() && clamp > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "output clamp must be positive, got {clamp}"
                )));
            }
        }
        self.events.validate()?;
        self.stream.validate()?;
        Ok(())
    }
}
