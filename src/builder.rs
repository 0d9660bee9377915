//! Builder for configuring and constructing an [`Engine`].

use crate::{Engine, Result};
use strata_core::{AudioDevice, DeviceConfig, Driver, EventConfig};

/// Without an explicit [`driver`](EngineBuilder::driver) the engine opens
/// the default hardware output through CPAL, or a [`NullDriver`] when the
/// `cpal` feature is disabled.
///
/// The device may negotiate a different sample rate or channel count than
/// requested. Query [`Engine::sample_rate`] after building.
///
/// # Example
///
/// ```ignore
/// use strata::prelude::*;
///
/// let (driver, clock) = OfflineDriver::new();
/// let engine = Engine::builder()
///     .buffer_size(256)
///     .driver(Box::new(driver))
///     .build()?;
/// engine.start()?;
/// clock.run_cycle();
/// ```
///
/// [`NullDriver`]: strata_core::NullDriver
#[derive(Default)]
pub struct EngineBuilder {
    config: DeviceConfig,
    driver: Option<Box<dyn Driver>>,
}

impl EngineBuilder {
    /// Replace every device setting at once.
    pub fn config(mut self, config: DeviceConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 48000
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config = self.config.with_sample_rate(rate);
        self
    }

    /// Frames per cycle. Default: 512
    pub fn buffer_size(mut self, frames: usize) -> Self {
        self.config = self.config.with_buffer_size(frames);
        self
    }

    /// Default: 2
    pub fn inputs(mut self, count: usize) -> Self {
        self.config.input_channels = count;
        self
    }

    /// Default: 2
    pub fn outputs(mut self, count: usize) -> Self {
        self.config.output_channels = count;
        self
    }

    pub fn output_device(mut self, index: usize) -> Self {
        self.config = self.config.with_device(index);
        self
    }

    /// Capacity and watchdog settings of the device's event channel.
    pub fn events(mut self, events: EventConfig) -> Self {
        self.config = self.config.with_events(events);
        self
    }

    /// Xruns within `window` cycles that count as a device fault.
    pub fn xrun_policy(mut self, threshold: u32, window: u32) -> Self {
        self.config = self.config.with_xrun_policy(threshold, window);
        self
    }

    pub fn driver(mut self, driver: Box<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set up the driver and create the device. The engine starts stopped.
    pub fn build(self) -> Result<Engine> {
        let driver = match self.driver {
            Some(driver) => driver,
            None => default_driver(&self.config),
        };
        let device = AudioDevice::new(driver, self.config)?;
        Ok(Engine::from_device(device))
    }
}

#[cfg(feature = "cpal")]
fn default_driver(config: &DeviceConfig) -> Box<dyn Driver> {
    Box::new(strata_core::CpalDriver::new(config.device_index))
}

#[cfg(not(feature = "cpal"))]
fn default_driver(_config: &DeviceConfig) -> Box<dyn Driver> {
    Box::new(strata_core::NullDriver::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::OfflineDriver;

    #[test]
    fn test_builder_negotiates_through_driver() {
        let (driver, clock) = OfflineDriver::with_channels(0, 2);
        let engine = Engine::builder()
            .sample_rate(44_100)
            .buffer_size(128)
            .driver(Box::new(driver))
            .build()
            .unwrap();
        assert_eq!(engine.sample_rate(), 44_100);
        assert_eq!(engine.buffer_size(), 128);
        assert_eq!(clock.buffer_size(), 128);
        assert_eq!(engine.driver_name(), "offline");
        assert!(!engine.is_running());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (driver, _clock) = OfflineDriver::new();
        let result = Engine::builder()
            .buffer_size(0)
            .driver(Box::new(driver))
            .build();
        assert!(matches!(result, Err(crate::Error::Core(_))));
    }
}
