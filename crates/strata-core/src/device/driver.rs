//! Driver capability.

use super::bus::AudioBus;
use super::processor::CycleProcessor;
use crate::config::DeviceConfig;
use crate::Result;

/// Parameters a driver settled on during [`Driver::setup`].
#[derive(Debug, Clone, PartialEq)]
pub struct DriverInfo {
    pub name: String,
    pub long_name: String,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub buffer_size: usize,
    pub capture_channels: Vec<String>,
    pub playback_channels: Vec<String>,
}

impl DriverInfo {
    /// Info for a driver that honours the requested config as-is.
    pub fn from_config(name: &str, long_name: &str, config: &DeviceConfig) -> Self {
        Self {
            name: name.to_string(),
            long_name: long_name.to_string(),
            sample_rate: config.sample_rate,
            bit_depth: 32,
            buffer_size: config.buffer_size,
            capture_channels: channel_names("capture", config.input_channels),
            playback_channels: channel_names("playback", config.output_channels),
        }
    }
}

/// `capture_1`, `capture_2`, ...
pub fn channel_names(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix}_{i}")).collect()
}

/// Control-side handle on a device backend.
///
/// The cycle processor is handed to the driver on [`start`](Driver::start)
/// and handed back on [`stop`](Driver::stop), so exactly one driver runs
/// cycles at a time.
pub trait Driver: Send {
    /// Short backend name, e.g. `"null"`.
    fn name(&self) -> &str;

    /// Negotiate parameters. The returned info may differ from the request.
    fn setup(&mut self, config: &DeviceConfig) -> Result<DriverInfo>;

    /// Open the backend.
    fn attach(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close the backend. Called after stop.
    fn detach(&mut self) {}

    fn start(&mut self, processor: CycleProcessor) -> Result<()>;

    /// Stop running cycles and return the processor. `None` means it was
    /// lost (the cycle thread died).
    fn stop(&mut self) -> Option<CycleProcessor>;

    fn is_running(&self) -> bool;

    /// Info from the last successful setup.
    fn info(&self) -> Option<&DriverInfo>;

    fn device_name(&self) -> Option<&str> {
        self.info().map(|i| i.name.as_str())
    }

    fn device_long_name(&self) -> Option<&str> {
        self.info().map(|i| i.long_name.as_str())
    }

    fn sample_rate(&self) -> Option<u32> {
        self.info().map(|i| i.sample_rate)
    }

    fn bit_depth(&self) -> Option<u16> {
        self.info().map(|i| i.bit_depth)
    }

    fn buffer_size(&self) -> Option<usize> {
        self.info().map(|i| i.buffer_size)
    }

    fn capture_channels(&self) -> &[String] {
        self.info()
            .map(|i| i.capture_channels.as_slice())
            .unwrap_or(&[])
    }

    fn playback_channels(&self) -> &[String] {
        self.info()
            .map(|i| i.playback_channels.as_slice())
            .unwrap_or(&[])
    }
}

/// Realtime half of a driver: moves one cycle of samples between the
/// hardware and the device buses. Never blocks.
pub trait DriverIo {
    fn read(&mut self, frames: usize, capture: &mut AudioBus);
    fn write(&mut self, frames: usize, playback: &AudioBus);
}

/// I/O that reads silence and discards output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentIo;

impl DriverIo for SilentIo {
    fn read(&mut self, _frames: usize, _capture: &mut AudioBus) {}
    fn write(&mut self, _frames: usize, _playback: &AudioBus) {}
}
