//! Device and event channel configuration.

use crate::{Error, Result};
use std::time::Duration;

/// Configuration for the cross-thread event channel.
#[derive(Debug, Clone)]
pub struct EventConfig {
    /// Capacity of each direction's queue.
    pub capacity: usize,
    /// Busy retries before a full control→audio queue is reported as fatal.
    pub retry_budget: u32,
    /// Notify thread wait timeout, also the watchdog tick.
    pub watchdog_interval: Duration,
    /// Consecutive stalled ticks before the stall callback fires.
    pub stall_limit: u32,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            retry_budget: 4096,
            watchdog_interval: Duration::from_millis(250),
            stall_limit: 8,
        }
    }
}

impl EventConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig(
                "event queue capacity must be non-zero".into(),
            ));
        }
        if self.stall_limit == 0 {
            return Err(Error::InvalidConfig("stall_limit must be non-zero".into()));
        }
        if self.watchdog_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "watchdog_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for an audio device and its driver.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub sample_rate: u32,
    pub buffer_size: usize,
    pub input_channels: usize,
    pub output_channels: usize,
    /// Hardware device index for drivers that enumerate devices.
    pub device_index: Option<usize>,
    /// Upper bound on registered clients; reserved up front.
    pub max_clients: usize,
    pub events: EventConfig,
    /// Xruns within `xrun_window` cycles that trigger a device fault.
    pub xrun_threshold: u32,
    pub xrun_window: u32,
    /// Number of per-cycle CPU samples kept for telemetry.
    pub telemetry_len: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            buffer_size: 512,
            input_channels: 2,
            output_channels: 2,
            device_index: None,
            max_clients: 64,
            events: EventConfig::default(),
            xrun_threshold: 8,
            xrun_window: 256,
            telemetry_len: 512,
        }
    }
}

impl DeviceConfig {
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_buffer_size(mut self, frames: usize) -> Self {
        self.buffer_size = frames;
        self
    }

    pub fn with_channels(mut self, inputs: usize, outputs: usize) -> Self {
        self.input_channels = inputs;
        self.output_channels = outputs;
        self
    }

    pub fn with_device(mut self, index: usize) -> Self {
        self.device_index = Some(index);
        self
    }

    pub fn with_events(mut self, events: EventConfig) -> Self {
        self.events = events;
        self
    }

    pub fn with_xrun_policy(mut self, threshold: u32, window: u32) -> Self {
        self.xrun_threshold = threshold;
        self.xrun_window = window;
        self
    }

    /// Length of one cycle.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_size as f64 / self.sample_rate as f64)
    }

    pub fn validate(&self) -> Result<()> {
        if !(8_000..=384_000).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.buffer_size == 0 || self.buffer_size > 8192 {
            return Err(Error::InvalidConfig(format!(
                "buffer_size {} out of range (1-8192 frames)",
                self.buffer_size
            )));
        }
        if self.output_channels == 0 {
            return Err(Error::InvalidConfig(
                "at least one output channel is required".into(),
            ));
        }
        if self.xrun_threshold == 0 || self.xrun_window < self.xrun_threshold {
            return Err(Error::InvalidConfig(format!(
                "xrun threshold {} must be non-zero and fit in window {}",
                self.xrun_threshold, self.xrun_window
            )));
        }
        if self.max_clients == 0 {
            return Err(Error::InvalidConfig("max_clients must be non-zero".into()));
        }
        if self.telemetry_len == 0 {
            return Err(Error::InvalidConfig("telemetry_len must be non-zero".into()));
        }
        self.events.validate()
    }
}
