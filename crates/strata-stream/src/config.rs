//! Streaming engine configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sample format written by recording sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleFormat {
    #[default]
    F32,
    I16,
    I24,
}

impl SampleFormat {
    pub fn bits_per_sample(self) -> u16 {
        match self {
            Self::F32 => 32,
            Self::I16 => 16,
            Self::I24 => 24,
        }
    }

    /// Largest positive integer sample, `None` for float.
    pub fn full_scale(self) -> Option<i32> {
        match self {
            Self::F32 => None,
            Self::I16 => Some(i16::MAX as i32),
            Self::I24 => Some((1 << 23) - 1),
        }
    }
}

/// Slot geometry and worker timing shared by every source and sink of one
/// streaming engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    /// Slots per source or sink (default: 8, minimum 2)
    pub slot_count: usize,
    /// Frames per slot (default: 8192)
    pub slot_frames: usize,
    /// Worker wakes on its own after this long without a cycle (default: 50ms)
    pub idle_wake: Duration,
    /// Format for recorded files (default: F32)
    pub write_format: SampleFormat,
    /// TPDF dither when writing integer formats (default: true)
    pub dither: bool,
    /// Pending register/sync commands (default: 256)
    pub command_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            slot_count: 8,
            slot_frames: 8192,
            idle_wake: Duration::from_millis(50),
            write_format: SampleFormat::F32,
            dither: true,
            command_capacity: 256,
        }
    }
}

impl StreamConfig {
    pub fn with_slots(mut self, count: usize, frames: usize) -> Self {
        self.slot_count = count;
        self.slot_frames = frames;
        self
    }

    pub fn with_write_format(mut self, format: SampleFormat) -> Self {
        self.write_format = format;
        self
    }

    pub fn with_dither(mut self, dither: bool) -> Self {
        self.dither = dither;
        self
    }

    pub fn with_idle_wake(mut self, interval: Duration) -> Self {
        self.idle_wake = interval;
        self
    }

    /// Frames buffered ahead per source when every slot is filled.
    pub fn buffered_frames(&self) -> usize {
        self.slot_count.saturating_sub(1) * self.slot_frames
    }

    pub fn validate(&self) -> Result<()> {
        if self.slot_count < 2 {
            return Err(Error::InvalidConfig(format!(
                "slot_count must be at least 2, got {}",
                self.slot_count
            )));
        }
        if self.slot_frames == 0 {
            return Err(Error::InvalidConfig("slot_frames must be non-zero".into()));
        }
        if self.command_capacity == 0 {
            return Err(Error::InvalidConfig(
                "command_capacity must be non-zero".into(),
            ));
        }
        if self.idle_wake.is_zero() {
            return Err(Error::InvalidConfig("idle_wake must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.slot_count, 8);
        assert_eq!(config.slot_frames, 8192);
        assert_eq!(config.write_format, SampleFormat::F32);
        assert!(config.dither);
        assert_eq!(config.buffered_frames(), 7 * 8192);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_slots() {
        assert!(StreamConfig::default().with_slots(1, 64).validate().is_err());
        assert!(StreamConfig::default().with_slots(4, 0).validate().is_err());
        assert!(StreamConfig::default().with_slots(2, 1).validate().is_ok());
    }

    #[test]
    fn test_sample_format() {
        assert_eq!(SampleFormat::I16.bits_per_sample(), 16);
        assert_eq!(SampleFormat::I24.full_scale(), Some(8_388_607));
        assert_eq!(SampleFormat::F32.full_scale(), None);
    }
}
