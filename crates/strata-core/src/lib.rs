//! Engine kernel: rational time, ring buffers, the cross-thread event
//! channel and the audio device scheduler.
//!
//! # Primary API
//!
//! - [`AudioDevice`]: one active [`Driver`], a list of [`Client`]s, cycle scheduling
//! - [`EventChannel`]: control → audio apply queue and audio → control notify queue
//! - [`RingBuffer`]: single-producer / single-consumer sample transfer
//! - [`FramePosition`]: rational time that converts between sample rates exactly
//!
//! # Drivers
//!
//! - [`NullDriver`]: software timer, discards output; fallback after faults
//! - [`OfflineDriver`]: clocked by the caller through an [`OfflineClock`]
//! - `"cpal"`: [`CpalDriver`] for hardware I/O (enabled by default)
//!
//! # Example
//!
//! ```ignore
//! use strata_core::{AudioDevice, DeviceConfig, NullDriver};
//!
//! let device = AudioDevice::new(Box::new(NullDriver::new()), DeviceConfig::default())?;
//! let id = device.add_client(Box::new(my_client))?;
//! device.start()?;
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{DeviceConfig, EventConfig};

pub mod time;
pub use time::{FramePosition, FrameRange};

pub mod ring_buffer;
pub use ring_buffer::{RingBuffer, RingConsumer, RingProducer};

pub mod lockfree;
pub use lockfree::{AtomicCounter, AtomicFlag, AtomicFloat};

pub mod event;
pub use event::{
    AudioPort, ChannelStats, ControlPort, DrainStatus, Event, EventChannel, EventTarget, Handle,
    NotifyPort, NotifyThread,
};

pub mod notification;
pub use notification::{FaultSeverity, Notification, NotificationHub};

pub mod telemetry;
pub use telemetry::{CpuMeter, CpuMetrics, XrunWindow};

pub mod device;
#[cfg(feature = "cpal")]
pub use device::CpalDriver;
pub use device::{
    AudioBus, AudioChannel, AudioDevice, BusDirection, BusKind, Client, ClientId, CycleContext,
    CycleProcessor, Driver, DriverInfo, DriverIo, HookId, NullDriver, OfflineClock, OfflineDriver,
};
