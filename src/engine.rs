//! Engine context that ties the audio device to the sessions it renders.

use crate::{EngineBuilder, Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use strata_core::{
    AudioDevice, ChannelStats, ClientId, CpuMetrics, DriverInfo, Driver, HookId, Notification,
};
use strata_mix::{Session, SessionConfig};
use tracing::{debug, info, warn};

/// Owns the audio device and keeps track of which sessions it runs.
///
/// Every session gets its own event channel and disk streamer. The engine
/// registers the session's processor as a device client and wakes the
/// session's streamer after each cycle.
///
/// # Example
///
/// ```ignore
/// use strata::prelude::*;
///
/// let engine = Engine::builder().build()?;
/// let mut session = engine.create_session(SessionConfig::default())?;
/// let track = session.add_track("drums", TrackKind::Audio)?;
/// session.add_clip(track, ClipSpec::frames("drums.wav", 0, 96_000, engine.sample_rate()))?;
/// engine.start()?;
/// session.play()?;
/// ```
pub struct Engine {
    device: Arc<AudioDevice>,
    sessions: Mutex<Vec<Attached>>,
}

struct Attached {
    session: u64,
    client: ClientId,
    hook: HookId,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub(crate) fn from_device(device: Arc<AudioDevice>) -> Self {
        Self {
            device,
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// The underlying device, for driver and client level control.
    pub fn device(&self) -> &Arc<AudioDevice> {
        &self.device
    }

    pub fn sample_rate(&self) -> u32 {
        self.device.info().sample_rate
    }

    pub fn buffer_size(&self) -> usize {
        self.device.info().buffer_size
    }

    pub fn info(&self) -> DriverInfo {
        self.device.info()
    }

    pub fn driver_name(&self) -> String {
        self.device.driver_name()
    }

    pub fn start(&self) -> Result<()> {
        self.device.start()?;
        Ok(())
    }

    pub fn stop(&self) {
        self.device.stop();
    }

    pub fn is_running(&self) -> bool {
        self.device.is_running()
    }

    /// Swap the active driver. Sessions keep running on the new one.
    pub fn set_driver(&self, driver: Box<dyn Driver>) -> Result<()> {
        self.device.set_driver(driver)?;
        Ok(())
    }

    #[cfg(feature = "cpal")]
    pub fn list_output_devices() -> Result<Vec<String>> {
        Ok(strata_core::CpalDriver::list_devices()?)
    }

    /// Device, transport and streaming notifications of every session.
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<Notification> {
        self.device.subscribe()
    }

    pub fn cpu_metrics(&self) -> CpuMetrics {
        self.device.cpu_metrics()
    }

    /// Reason of the last fallback to the null driver.
    pub fn last_fault(&self) -> Option<Arc<String>> {
        self.device.last_fault()
    }

    pub fn event_stats(&self) -> Arc<ChannelStats> {
        self.device.event_stats()
    }

    /// Create a session rendering into this engine's device. Its processor
    /// joins the device on the next cycle.
    pub fn create_session(&self, config: SessionConfig) -> Result<Session> {
        let info = self.device.info();
        if config.channels > info.playback_channels.len() {
            warn!(
                session_channels = config.channels,
                device_channels = info.playback_channels.len(),
                "session has more channels than the device plays"
            );
        }

        let (session, processor) = Session::new(
            config,
            info.sample_rate,
            info.buffer_size,
            self.device.notifications(),
        )?;
        let waker = session.waker();
        let hook = self.device.on_cycle_finished(move |_| waker.wake());
        let client = match self.device.add_client(Box::new(processor)) {
            Ok(client) => client,
            Err(e) => {
                self.device.remove_cycle_hook(hook);
                return Err(e.into());
            }
        };

        self.sessions.lock().push(Attached {
            session: session.id(),
            client,
            hook,
        });
        info!(session = session.id(), client, "session attached");
        Ok(session)
    }

    /// Detach a session from the device and shut down its threads.
    pub fn close_session(&self, session: Session) -> Result<()> {
        let id = session.id();
        let Attached { client, hook, .. } = {
            let mut sessions = self.sessions.lock();
            let index = sessions
                .iter()
                .position(|a| a.session == id)
                .ok_or(Error::UnknownSession(id))?;
            sessions.remove(index)
        };
        self.device.remove_cycle_hook(hook);
        self.device.remove_client(client)?;
        drop(session);
        debug!(session = id, client, "session closed");
        Ok(())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::OfflineDriver;

    #[test]
    fn test_sessions_register_as_clients() {
        let (driver, clock) = OfflineDriver::new();
        let engine = Engine::builder()
            .buffer_size(64)
            .driver(Box::new(driver))
            .build()
            .unwrap();
        engine.start().unwrap();

        let a = engine.create_session(SessionConfig::default()).unwrap();
        let b = engine.create_session(SessionConfig::default()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(engine.session_count(), 2);

        clock.run_cycle();
        assert_eq!(clock.client_count(), Some(2));

        engine.close_session(a).unwrap();
        clock.run_cycle();
        assert_eq!(clock.client_count(), Some(1));
        assert_eq!(engine.session_count(), 1);
    }

    #[test]
    fn test_closed_sessions_release_cycle_hooks() {
        let (driver, clock) = OfflineDriver::new();
        let engine = Engine::builder()
            .buffer_size(64)
            .driver(Box::new(driver))
            .build()
            .unwrap();
        engine.start().unwrap();

        let keep = engine.create_session(SessionConfig::default()).unwrap();
        for _ in 0..20 {
            let session = engine.create_session(SessionConfig::default()).unwrap();
            engine.close_session(session).unwrap();
        }
        clock.run_cycle();
        assert_eq!(engine.session_count(), 1);
        assert_eq!(engine.device().cycle_hook_count(), 1);

        engine.close_session(keep).unwrap();
        assert_eq!(engine.device().cycle_hook_count(), 0);
    }

    #[test]
    fn test_foreign_session_rejected() {
        let (driver, _clock) = OfflineDriver::new();
        let engine = Engine::builder().driver(Box::new(driver)).build().unwrap();
        let (other, _clock) = OfflineDriver::new();
        let other = Engine::builder().driver(Box::new(other)).build().unwrap();

        let session = other.create_session(SessionConfig::default()).unwrap();
        assert!(matches!(
            engine.close_session(session),
            Err(Error::UnknownSession(_))
        ));
    }
}
