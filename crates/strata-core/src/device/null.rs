//! Software-timed driver that discards output.

use super::driver::{Driver, DriverInfo, SilentIo};
use super::processor::CycleProcessor;
use crate::config::DeviceConfig;
use crate::lockfree::AtomicFlag;
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thread_priority::ThreadPriority;
use tracing::debug;

/// Runs cycles from a timer thread at the configured period.
///
/// Used when no hardware is available and as the fallback after a fault.
pub struct NullDriver {
    info: Option<DriverInfo>,
    slot: Arc<Mutex<Option<CycleProcessor>>>,
    shutdown: Arc<AtomicFlag>,
    handle: Option<JoinHandle<()>>,
}

impl NullDriver {
    pub const NAME: &'static str = "null";

    pub fn new() -> Self {
        Self {
            info: None,
            slot: Arc::new(Mutex::new(None)),
            shutdown: Arc::new(AtomicFlag::new(false)),
            handle: None,
        }
    }
}

impl Default for NullDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for NullDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&mut self, config: &DeviceConfig) -> Result<DriverInfo> {
        let info = DriverInfo::from_config(Self::NAME, "Null audio driver", config);
        self.info = Some(info.clone());
        Ok(info)
    }

    fn start(&mut self, processor: CycleProcessor) -> Result<()> {
        if self.handle.is_some() {
            self.stop();
        }
        let frames = processor.max_frames();
        let rate = processor.sample_rate().max(1);
        let period = Duration::from_secs_f64(frames as f64 / rate as f64);

        *self.slot.lock() = Some(processor);
        self.shutdown.set(false);
        let slot = Arc::clone(&self.slot);
        let shutdown = Arc::clone(&self.shutdown);

        let handle = thread::Builder::new()
            .name("strata-null".into())
            .spawn(move || {
                let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
                let Some(mut processor) = slot.lock().take() else {
                    return;
                };
                debug!(?period, "null driver running");

                let mut next = Instant::now();
                while !shutdown.get() {
                    processor.run_cycle(&mut SilentIo, frames);
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                *slot.lock() = Some(processor);
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Option<CycleProcessor> {
        self.shutdown.set(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.slot.lock().take()
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn info(&self) -> Option<&DriverInfo> {
        self.info.as_ref()
    }
}

impl Drop for NullDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
