//! Audio device: one active driver, a client list, and the cycle scheduler.
//!
//! [`AudioDevice`] is the control-side object. All structural changes to
//! what the audio thread runs go through its event channel; the audio
//! thread side is the [`CycleProcessor`], which is owned by whichever
//! driver is currently started.

mod bus;
#[cfg(feature = "cpal")]
mod cpal;
mod driver;
mod null;
mod offline;
mod processor;

pub use bus::{AudioBus, AudioChannel, BusDirection, BusKind, BusSet};
#[cfg(feature = "cpal")]
pub use cpal::CpalDriver;
pub use driver::{channel_names, Driver, DriverInfo, DriverIo, SilentIo};
pub use null::NullDriver;
pub use offline::{OfflineClock, OfflineDriver};
pub use processor::{
    Client, ClientId, CycleContext, CycleProcessor, DeviceNote, DeviceOp, XrunReporter,
};

use crate::config::DeviceConfig;
use crate::event::{ChannelStats, ControlPort, EventChannel, NotifyThread, ROOT};
use crate::lockfree::{AtomicCounter, AtomicFlag};
use crate::notification::{FaultSeverity, Notification, NotificationHub};
use crate::telemetry::{cpu_trace, CpuMeter, CpuMetrics, CpuTraceReader, XrunWindow};
use crate::{Error, Result};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// State shared between the control side and the cycle processor.
#[derive(Debug, Default)]
pub struct DeviceShared {
    pub(crate) cycles: AtomicCounter,
    pub(crate) finished_pending: AtomicFlag,
    pub(crate) xrun_signal: AtomicFlag,
    pub(crate) cpu: CpuMeter,
    running: AtomicFlag,
    fault: ArcSwapOption<String>,
}

type CycleHook = Box<dyn Fn(u64) + Send + Sync>;

/// Registration returned by [`AudioDevice::on_cycle_finished`].
pub type HookId = u64;

struct DeviceInner {
    driver: Box<dyn Driver>,
    /// The processor while no driver is running it.
    parked: Option<CycleProcessor>,
    control: ControlPort<DeviceOp, DeviceNote>,
    config: DeviceConfig,
    info: DriverInfo,
    trace: CpuTraceReader,
    restarts: u32,
}

impl DeviceInner {
    /// Stop the driver if it runs and return the processor.
    fn take_processor(&mut self, shared: &DeviceShared) -> Option<CycleProcessor> {
        if shared.running.swap(false) {
            self.driver.stop()
        } else {
            self.parked.take()
        }
    }

    fn start_with(&mut self, processor: CycleProcessor, shared: &DeviceShared) -> Result<()> {
        match self.driver.start(processor) {
            Ok(()) => {
                shared.running.set(true);
                Ok(())
            }
            Err(e) => {
                self.parked = self.driver.stop();
                Err(e)
            }
        }
    }
}

/// Control-side handle on the audio device.
pub struct AudioDevice {
    inner: Mutex<DeviceInner>,
    shared: Arc<DeviceShared>,
    hub: Arc<NotificationHub>,
    hooks: Arc<Mutex<Vec<(HookId, CycleHook)>>>,
    stats: Arc<ChannelStats>,
    notify_thread: Mutex<Option<NotifyThread>>,
    next_client: AtomicU64,
    next_hook: AtomicU64,
}

impl AudioDevice {
    /// Configure `driver` and create the device. The device starts stopped.
    pub fn new(mut driver: Box<dyn Driver>, config: DeviceConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let EventChannel {
            control,
            audio,
            notify,
        } = EventChannel::new(&config.events)?;
        let shared = Arc::new(DeviceShared::default());
        let (trace_writer, trace) = cpu_trace(config.telemetry_len);

        let mut processor = CycleProcessor::new(
            audio,
            config.max_clients,
            trace_writer,
            XrunWindow::new(config.xrun_window, config.xrun_threshold),
            Arc::clone(&shared),
        );

        let info = driver.setup(&config)?;
        driver.attach()?;
        processor.configure(&info);
        info!(
            driver = driver.name(),
            sample_rate = info.sample_rate,
            buffer_size = info.buffer_size,
            "audio device configured"
        );

        let stats = control.stats();
        let device = Arc::new(Self {
            inner: Mutex::new(DeviceInner {
                driver,
                parked: Some(processor),
                control,
                config,
                info,
                trace,
                restarts: 0,
            }),
            shared: Arc::clone(&shared),
            hub: Arc::new(NotificationHub::new(256)),
            hooks: Arc::new(Mutex::new(Vec::new())),
            stats,
            notify_thread: Mutex::new(None),
            next_client: AtomicU64::new(1),
            next_hook: AtomicU64::new(1),
        });

        let weak = Arc::downgrade(&device);
        let stall_weak = Weak::clone(&weak);
        let hub = Arc::clone(&device.hub);
        let hooks = Arc::clone(&device.hooks);
        let thread = notify.spawn_notify_thread(
            "strata-notify",
            move |note| {
                handle_note(note, &weak, &shared, &hub, &hooks);
                None
            },
            move |ticks| {
                if let Some(device) = stall_weak.upgrade() {
                    if device.is_running() {
                        let reason =
                            format!("audio thread stalled for {ticks} watchdog intervals");
                        if let Err(e) = device.fallback_to_null(&reason) {
                            error!("null driver fallback failed: {e}");
                        }
                    }
                }
            },
        )?;
        *device.notify_thread.lock() = Some(thread);

        Ok(device)
    }

    /// Start running cycles on the current driver.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if self.shared.running.get() {
            return Ok(());
        }
        let processor = inner.parked.take().ok_or(Error::DriverNotReady)?;
        inner.start_with(processor, &self.shared)?;
        info!(driver = inner.driver.name(), "audio device started");
        Ok(())
    }

    /// Stop running cycles. Pending events stay queued.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if !self.shared.running.get() {
            return;
        }
        let processor = inner.take_processor(&self.shared);
        if processor.is_none() {
            error!("cycle processor lost while stopping");
        }
        inner.parked = processor;
        info!("audio device stopped");
    }

    /// Swap the active driver: stop, set up the new one, rebuild buses,
    /// restart if it was running. On setup failure the old driver stays.
    pub fn set_driver(&self, mut driver: Box<dyn Driver>) -> Result<()> {
        let mut inner = self.inner.lock();
        let was_running = self.shared.running.get();
        let mut processor = inner
            .take_processor(&self.shared)
            .ok_or_else(|| Error::Driver("cycle processor lost".into()))?;

        let negotiated = driver
            .setup(&inner.config)
            .and_then(|info| driver.attach().map(|_| info));
        let info = match negotiated {
            Ok(info) => info,
            Err(e) => {
                warn!(driver = driver.name(), "driver setup failed: {e}");
                if was_running {
                    inner.start_with(processor, &self.shared)?;
                } else {
                    inner.parked = Some(processor);
                }
                return Err(e);
            }
        };

        inner.driver.detach();
        processor.configure(&info);
        inner.driver = driver;
        inner.info = info.clone();
        inner.restarts = 0;
        self.shared.fault.store(None);

        if was_running {
            inner.start_with(processor, &self.shared)?;
        } else {
            inner.parked = Some(processor);
        }
        drop(inner);

        info!(
            driver = info.name.as_str(),
            sample_rate = info.sample_rate,
            "driver changed"
        );
        self.hub.publish(Notification::DriverChanged {
            name: info.name,
            sample_rate: info.sample_rate,
            buffer_size: info.buffer_size,
        });
        Ok(())
    }

    /// Restart the current driver after a fault.
    fn restart(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut processor = inner
            .take_processor(&self.shared)
            .ok_or_else(|| Error::Driver("cycle processor lost".into()))?;
        let config = inner.config.clone();
        let info = match inner.driver.setup(&config) {
            Ok(info) => info,
            Err(e) => {
                inner.parked = Some(processor);
                return Err(e);
            }
        };
        processor.configure(&info);
        inner.info = info;
        inner.restarts += 1;
        inner.start_with(processor, &self.shared)
    }

    /// Replace the driver with a [`NullDriver`] and keep cycling.
    pub fn fallback_to_null(&self, reason: &str) -> Result<()> {
        warn!(reason, "falling back to null driver");
        self.shared.fault.store(Some(Arc::new(reason.to_string())));
        self.hub.publish(Notification::DeviceFault {
            severity: FaultSeverity::Critical,
            reason: reason.to_string(),
        });

        let mut inner = self.inner.lock();
        let processor = inner.take_processor(&self.shared);
        inner.driver.detach();

        let mut null = NullDriver::new();
        let info = null.setup(&inner.config)?;
        inner.driver = Box::new(null);
        inner.info = info.clone();

        match processor {
            Some(mut processor) => {
                processor.configure(&info);
                inner.start_with(processor, &self.shared)?;
            }
            None => {
                error!("cycle processor lost; device stays silent");
                return Err(Error::Driver("cycle processor lost".into()));
            }
        }
        drop(inner);

        self.hub.publish(Notification::DriverChanged {
            name: info.name,
            sample_rate: info.sample_rate,
            buffer_size: info.buffer_size,
        });
        Ok(())
    }

    fn handle_xrun_fault(&self, in_window: u32, total: u64) {
        let restarts = self.inner.lock().restarts;
        if restarts == 0 {
            warn!(in_window, total, "xrun threshold reached; restarting driver");
            match self.restart() {
                Ok(()) => self.hub.publish(Notification::DeviceFault {
                    severity: FaultSeverity::Warning,
                    reason: format!("{in_window} xruns in window; driver restarted"),
                }),
                Err(e) => {
                    error!("driver restart failed: {e}");
                    let _ = self.fallback_to_null(&format!("driver restart failed: {e}"));
                }
            }
        } else {
            let reason = format!("{in_window} xruns in window after restart ({total} total)");
            if let Err(e) = self.fallback_to_null(&reason) {
                error!("null driver fallback failed: {e}");
            }
        }
    }

    /// Register a client. It starts processing on the next cycle.
    pub fn add_client(&self, client: Box<dyn Client>) -> Result<ClientId> {
        let id = self.next_client.fetch_add(1, Ordering::Relaxed);
        debug!(id, name = client.name(), "adding client");
        self.inner
            .lock()
            .control
            .post(ROOT, DeviceOp::AddClient(id, client))?;
        Ok(id)
    }

    /// Unregister a client. It is dropped on the notify thread.
    pub fn remove_client(&self, id: ClientId) -> Result<()> {
        self.inner
            .lock()
            .control
            .post(ROOT, DeviceOp::RemoveClient(id))
    }

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<Notification> {
        self.hub.subscribe()
    }

    pub fn notifications(&self) -> Arc<NotificationHub> {
        Arc::clone(&self.hub)
    }

    /// Call `hook` from the notify thread after each delivered
    /// cycle-finished note. Runs with the latest cycle count.
    pub fn on_cycle_finished<F>(&self, hook: F) -> HookId
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let id = self.next_hook.fetch_add(1, Ordering::Relaxed);
        self.hooks.lock().push((id, Box::new(hook)));
        id
    }

    /// Drop a hook registered with [`on_cycle_finished`](Self::on_cycle_finished).
    /// Returns false if `id` was not registered.
    pub fn remove_cycle_hook(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|(hook, _)| *hook != id);
        hooks.len() != before
    }

    pub fn cycle_hook_count(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.get()
    }

    pub fn info(&self) -> DriverInfo {
        self.inner.lock().info.clone()
    }

    pub fn driver_name(&self) -> String {
        self.inner.lock().driver.name().to_string()
    }

    pub fn config(&self) -> DeviceConfig {
        self.inner.lock().config.clone()
    }

    /// Cycles run since creation.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.get()
    }

    pub fn cpu_metrics(&self) -> CpuMetrics {
        self.shared.cpu.metrics()
    }

    /// Per-cycle load samples recorded since the last call.
    pub fn cpu_trace(&self) -> Vec<f32> {
        self.inner.lock().trace.drain()
    }

    /// Reason of the last fallback, cleared by [`set_driver`](Self::set_driver).
    pub fn last_fault(&self) -> Option<Arc<String>> {
        self.shared.fault.load_full()
    }

    pub fn event_stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        {
            let mut inner = self.inner.lock();
            if let Some(processor) = inner.take_processor(&self.shared) {
                inner.parked = Some(processor);
            }
            inner.driver.detach();
        }
        if let Some(mut thread) = self.notify_thread.lock().take() {
            thread.stop();
        }
    }
}

fn handle_note(
    note: DeviceNote,
    device: &Weak<AudioDevice>,
    shared: &DeviceShared,
    hub: &NotificationHub,
    hooks: &Mutex<Vec<(HookId, CycleHook)>>,
) {
    match note {
        DeviceNote::Retired(id, client) => {
            debug!(id, name = client.name(), "client retired");
            drop(client);
        }
        DeviceNote::Rejected(id, client) => {
            warn!(id, name = client.name(), "client list full; client dropped");
        }
        DeviceNote::CycleFinished { .. } => {
            shared.finished_pending.set(false);
            let cycle = shared.cycles.get();
            for (_, hook) in hooks.lock().iter() {
                hook(cycle);
            }
            hub.publish(Notification::CycleFinished { cycle });
        }
        DeviceNote::XrunFault { in_window, total } => {
            if let Some(device) = device.upgrade() {
                device.handle_xrun_fault(in_window, total);
            }
        }
    }
}
