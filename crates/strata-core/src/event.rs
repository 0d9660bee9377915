//! Cross-thread event channel between the control thread and the audio thread.
//!
//! Two bounded queues run in opposite directions:
//!
//! - control → audio carries [`Event`]s. The audio thread applies every
//!   pending event at the top of each cycle, before any mixing.
//! - audio → control carries notes. A low-priority consumer delivers them in
//!   enqueue order and may answer with a follow-up event.
//!
//! ```text
//! ControlPort ──events──► AudioPort::drain_apply ──notes──► NotifyPort
//!      ▲                                                       │
//!      └──────────────── follow-up events ◄────────────────────┘
//! ```
//!
//! Objects removed from the realtime graph travel back through the note
//! queue so they are dropped on the control side.

use crate::config::EventConfig;
use crate::lockfree::{AtomicCounter, AtomicFlag};
use crate::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Identifies the object an event is addressed to.
pub type Handle = u64;

/// Handle for events addressed to the receiver as a whole.
pub const ROOT: Handle = 0;

/// A single mutation travelling from the control thread to the audio thread.
///
/// Consumed exactly once: the op is moved into [`EventTarget::apply`] and
/// the notify payload is moved into the note queue.
#[derive(Debug)]
pub struct Event<O, N> {
    pub target: Handle,
    pub op: O,
    pub notify: Option<N>,
}

impl<O, N> Event<O, N> {
    pub fn new(target: Handle, op: O) -> Self {
        Self {
            target,
            op,
            notify: None,
        }
    }

    pub fn with_notify(mut self, note: N) -> Self {
        self.notify = Some(note);
        self
    }
}

/// Receiver of applied events on the audio thread.
pub trait EventTarget {
    type Op: Send;
    type Note: Send;

    /// Apply one op. Anything returned is shipped back to the control side.
    fn apply(&mut self, target: Handle, op: Self::Op) -> Option<Self::Note>;
}

/// Counters shared by the three ports.
#[derive(Debug, Default)]
pub struct ChannelStats {
    pending_apply: AtomicCounter,
    in_flight_notify: AtomicCounter,
    applied: AtomicCounter,
    notified: AtomicCounter,
    overflows: AtomicCounter,
    cycles: AtomicCounter,
}

impl ChannelStats {
    /// Events posted but not yet applied.
    pub fn pending_apply(&self) -> u64 {
        self.pending_apply.get()
    }

    /// Notes posted but not yet delivered.
    pub fn in_flight_notify(&self) -> u64 {
        self.in_flight_notify.get()
    }

    pub fn applied(&self) -> u64 {
        self.applied.get()
    }

    pub fn notified(&self) -> u64 {
        self.notified.get()
    }

    /// Notes lost to a full audio → control queue.
    pub fn overflows(&self) -> u64 {
        self.overflows.get()
    }

    /// Number of `drain_apply` passes, one per audio cycle.
    pub fn cycles(&self) -> u64 {
        self.cycles.get()
    }
}

/// The three ends of an event channel.
pub struct EventChannel<O, N> {
    pub control: ControlPort<O, N>,
    pub audio: AudioPort<O, N>,
    pub notify: NotifyPort<O, N>,
}

impl<O: Send, N: Send> EventChannel<O, N> {
    pub fn new(config: &EventConfig) -> Result<Self> {
        config.validate()?;
        let (event_tx, event_rx) = crossbeam_channel::bounded(config.capacity);
        let (note_tx, note_rx) = crossbeam_channel::bounded(config.capacity);
        let stats = Arc::new(ChannelStats::default());

        Ok(Self {
            control: ControlPort {
                tx: event_tx.clone(),
                stats: Arc::clone(&stats),
                capacity: config.capacity,
                retry_budget: config.retry_budget,
            },
            audio: AudioPort {
                rx: event_rx,
                notes: note_tx,
                stats: Arc::clone(&stats),
                capacity: config.capacity,
            },
            notify: NotifyPort {
                rx: note_rx,
                repost: event_tx,
                stats,
                capacity: config.capacity,
                retry_budget: config.retry_budget,
                interval: config.watchdog_interval,
                stall_limit: config.stall_limit,
                stalled_ticks: 0,
                last_cycle: 0,
            },
        })
    }
}

/// Busy-retry a send without ever blocking in the OS.
/// On failure returns the value and whether the receiver is gone.
fn send_with_retry<T>(
    tx: &Sender<T>,
    mut value: T,
    retry_budget: u32,
) -> std::result::Result<(), (T, bool)> {
    for attempt in 0..=retry_budget {
        match tx.try_send(value) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(v)) => {
                value = v;
                if attempt % 64 == 63 {
                    std::thread::yield_now();
                } else {
                    std::hint::spin_loop();
                }
            }
            Err(TrySendError::Disconnected(v)) => return Err((v, true)),
        }
    }
    Err((value, false))
}

/// Control-thread end. Not `Clone`: there is one control producer.
pub struct ControlPort<O, N> {
    tx: Sender<Event<O, N>>,
    stats: Arc<ChannelStats>,
    capacity: usize,
    retry_budget: u32,
}

impl<O, N> ControlPort<O, N> {
    /// Enqueue an event for the audio thread.
    ///
    /// Retries a full queue up to the retry budget. Running out of budget
    /// means the queue is sized too small for the event rate and is
    /// reported as [`Error::EventQueueSaturated`].
    pub fn post_from_control(&mut self, event: Event<O, N>) -> Result<()> {
        self.stats.pending_apply.incr();
        match send_with_retry(&self.tx, event, self.retry_budget) {
            Ok(()) => Ok(()),
            Err((_, true)) => {
                self.stats.pending_apply.decr();
                Err(Error::Disconnected)
            }
            Err((_, false)) => {
                self.stats.pending_apply.decr();
                error!(
                    capacity = self.capacity,
                    retries = self.retry_budget,
                    "event queue saturated; capacity too small for event rate"
                );
                Err(Error::EventQueueSaturated {
                    capacity: self.capacity,
                    retries: self.retry_budget,
                })
            }
        }
    }

    /// Convenience for [`post_from_control`](Self::post_from_control).
    pub fn post(&mut self, target: Handle, op: O) -> Result<()> {
        self.post_from_control(Event::new(target, op))
    }

    pub fn stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.stats)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Audio-thread end.
pub struct AudioPort<O, N> {
    rx: Receiver<Event<O, N>>,
    notes: Sender<N>,
    stats: Arc<ChannelStats>,
    capacity: usize,
}

impl<O, N> AudioPort<O, N> {
    /// Apply every pending event to `target`. Call once per cycle before
    /// mixing. Bounded to `capacity` events so one pass cannot run away.
    pub fn drain_apply<T>(&mut self, target: &mut T) -> usize
    where
        T: EventTarget<Op = O, Note = N>,
    {
        self.stats.cycles.incr();
        let mut applied = 0;
        while applied < self.capacity {
            let event = match self.rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            self.stats.pending_apply.decr();

            let Event {
                target: handle,
                op,
                notify,
            } = event;
            if let Some(note) = target.apply(handle, op) {
                self.post_from_audio(note);
            }
            if let Some(note) = notify {
                self.post_from_audio(note);
            }
            applied += 1;
        }
        if applied > 0 {
            self.stats.applied.add(applied as u64);
        }
        applied
    }

    /// Non-blocking post towards the control side.
    ///
    /// The note queue only carries structural changes and coalesced
    /// status, so a full queue is a bug; it is counted and asserted in
    /// debug builds.
    pub fn post_from_audio(&self, note: N) -> bool {
        match self.notes.try_send(note) {
            Ok(()) => {
                self.stats.in_flight_notify.incr();
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.overflows.incr();
                debug_assert!(false, "audio to control queue overflow");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}

/// Result of one [`NotifyPort::drain_notify`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// Delivered this many notes.
    Delivered(usize),
    /// Nothing arrived within the watchdog interval.
    Idle,
    /// Events are pending but the audio thread has not cycled for
    /// `stall_limit` consecutive intervals.
    Stalled(u32),
    /// The audio end has been dropped.
    Closed,
}

/// Background-consumer end.
pub struct NotifyPort<O, N> {
    rx: Receiver<N>,
    repost: Sender<Event<O, N>>,
    stats: Arc<ChannelStats>,
    capacity: usize,
    retry_budget: u32,
    interval: Duration,
    stall_limit: u32,
    stalled_ticks: u32,
    last_cycle: u64,
}

impl<O, N> NotifyPort<O, N> {
    /// Wait up to one watchdog interval for notes, then deliver everything
    /// available to `handler` in enqueue order. A follow-up event returned
    /// by the handler is re-posted towards the audio thread.
    pub fn drain_notify<F>(&mut self, mut handler: F) -> DrainStatus
    where
        F: FnMut(N) -> Option<Event<O, N>>,
    {
        let first = match self.rx.recv_timeout(self.interval) {
            Ok(note) => note,
            Err(RecvTimeoutError::Timeout) => return self.watchdog_tick(),
            Err(RecvTimeoutError::Disconnected) => return DrainStatus::Closed,
        };

        let mut delivered = 0;
        let mut next = Some(first);
        while let Some(note) = next.take() {
            self.stats.in_flight_notify.decr();
            self.stats.notified.incr();
            if let Some(follow_up) = handler(note) {
                self.repost(follow_up);
            }
            delivered += 1;
            next = self.rx.try_recv().ok();
        }
        self.stalled_ticks = 0;
        self.last_cycle = self.stats.cycles();
        DrainStatus::Delivered(delivered)
    }

    /// Deliver whatever is queued right now without waiting.
    pub fn try_drain_notify<F>(&mut self, mut handler: F) -> usize
    where
        F: FnMut(N) -> Option<Event<O, N>>,
    {
        let mut delivered = 0;
        while let Ok(note) = self.rx.try_recv() {
            self.stats.in_flight_notify.decr();
            self.stats.notified.incr();
            if let Some(follow_up) = handler(note) {
                self.repost(follow_up);
            }
            delivered += 1;
        }
        delivered
    }

    fn repost(&self, event: Event<O, N>) {
        self.stats.pending_apply.incr();
        if send_with_retry(&self.repost, event, self.retry_budget).is_err() {
            self.stats.pending_apply.decr();
            error!(capacity = self.capacity, "dropped follow-up event; queue saturated");
        }
    }

    fn watchdog_tick(&mut self) -> DrainStatus {
        let cycle = self.stats.cycles();
        if self.stats.pending_apply() > 0 && cycle == self.last_cycle {
            self.stalled_ticks += 1;
            debug!(ticks = self.stalled_ticks, "audio thread has not cycled");
            if self.stalled_ticks >= self.stall_limit {
                let ticks = self.stalled_ticks;
                self.stalled_ticks = 0;
                return DrainStatus::Stalled(ticks);
            }
        } else {
            self.stalled_ticks = 0;
        }
        self.last_cycle = cycle;
        DrainStatus::Idle
    }

    pub fn stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.stats)
    }
}

impl<O, N> NotifyPort<O, N>
where
    O: Send + 'static,
    N: Send + 'static,
{
    /// Run the notify consumer on its own thread until the audio end is
    /// dropped or the returned handle is stopped.
    pub fn spawn_notify_thread<F, S>(
        mut self,
        name: &str,
        mut handler: F,
        mut on_stall: S,
    ) -> Result<NotifyThread>
    where
        F: FnMut(N) -> Option<Event<O, N>> + Send + 'static,
        S: FnMut(u32) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicFlag::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!("notify thread started");
                while !flag.get() {
                    match self.drain_notify(&mut handler) {
                        DrainStatus::Delivered(_) | DrainStatus::Idle => {}
                        DrainStatus::Stalled(ticks) => {
                            warn!(ticks, "audio thread stalled with pending events");
                            on_stall(ticks);
                        }
                        DrainStatus::Closed => break,
                    }
                }
                debug!("notify thread stopped");
            })?;

        Ok(NotifyThread {
            handle: Some(handle),
            shutdown,
        })
    }
}

/// Handle to a running notify consumer thread.
pub struct NotifyThread {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicFlag>,
}

impl NotifyThread {
    /// Signal shutdown and join. Returns within one watchdog interval.
    pub fn stop(&mut self) {
        self.shutdown.set(true);
        if let Some(handle) = self.handle.take() {
            // The owner may be dropped from inside the handler.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for NotifyThread {
    fn drop(&mut self) {
        self.stop();
    }
}
