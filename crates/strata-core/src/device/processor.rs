//! The per-cycle scheduler that runs on the audio thread.

use super::bus::{AudioBus, BusSet};
use super::driver::{DriverInfo, DriverIo};
use super::DeviceShared;
use crate::event::{AudioPort, EventTarget, Handle};
use crate::telemetry::{CpuTraceWriter, XrunWindow};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifies a client registered with a device.
pub type ClientId = Handle;

/// Everything a client sees during one cycle.
pub struct CycleContext<'a> {
    pub cycle: u64,
    pub frames: usize,
    pub sample_rate: u32,
    pub capture: &'a AudioBus,
    pub playback: &'a mut AudioBus,
}

impl CycleContext<'_> {
    /// Capture samples of channel `index` for this cycle.
    #[inline]
    pub fn input(&self, index: usize) -> Option<&[f32]> {
        self.capture
            .channel(index)
            .map(|c| &c.buffer()[..self.frames.min(c.buffer().len())])
    }

    /// Playback buffer of channel `index` for this cycle.
    #[inline]
    pub fn output(&mut self, index: usize) -> Option<&mut [f32]> {
        let frames = self.frames;
        self.playback
            .channel_mut(index)
            .map(|c| &mut c.buffer_mut()[..frames])
    }

    pub fn output_channels(&self) -> usize {
        self.playback.len()
    }
}

/// Something the device runs once per cycle.
///
/// Clients apply their own pending events in [`drain_apply`](Client::drain_apply),
/// which runs for every client before any client's [`process`](Client::process).
pub trait Client: Send {
    fn name(&self) -> &str;

    fn drain_apply(&mut self) {}

    fn process(&mut self, cx: &mut CycleContext<'_>);
}

/// Structural changes to the client list.
pub enum DeviceOp {
    AddClient(ClientId, Box<dyn Client>),
    RemoveClient(ClientId),
}

impl fmt::Debug for DeviceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddClient(id, client) => f
                .debug_tuple("AddClient")
                .field(id)
                .field(&client.name())
                .finish(),
            Self::RemoveClient(id) => f.debug_tuple("RemoveClient").field(id).finish(),
        }
    }
}

/// Notes from the audio thread to the device's notify consumer.
pub enum DeviceNote {
    /// A removed client, to be dropped off the audio thread.
    Retired(ClientId, Box<dyn Client>),
    /// The client list was full.
    Rejected(ClientId, Box<dyn Client>),
    CycleFinished { cycle: u64 },
    XrunFault { in_window: u32, total: u64 },
}

impl fmt::Debug for DeviceNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retired(id, _) => f.debug_tuple("Retired").field(id).finish(),
            Self::Rejected(id, _) => f.debug_tuple("Rejected").field(id).finish(),
            Self::CycleFinished { cycle } => {
                f.debug_struct("CycleFinished").field("cycle", cycle).finish()
            }
            Self::XrunFault { in_window, total } => f
                .debug_struct("XrunFault")
                .field("in_window", in_window)
                .field("total", total)
                .finish(),
        }
    }
}

/// Client list in insertion order. Capacity is reserved up front so adding
/// and removing never allocates on the audio thread.
pub(crate) struct ClientGraph {
    clients: Vec<(ClientId, Box<dyn Client>)>,
    max: usize,
}

impl ClientGraph {
    pub(crate) fn with_capacity(max: usize) -> Self {
        Self {
            clients: Vec::with_capacity(max),
            max,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.clients.len()
    }
}

impl EventTarget for ClientGraph {
    type Op = DeviceOp;
    type Note = DeviceNote;

    fn apply(&mut self, _target: Handle, op: DeviceOp) -> Option<DeviceNote> {
        match op {
            DeviceOp::AddClient(id, client) => {
                if self.clients.len() >= self.max {
                    return Some(DeviceNote::Rejected(id, client));
                }
                self.clients.push((id, client));
                None
            }
            DeviceOp::RemoveClient(id) => {
                let index = self.clients.iter().position(|(cid, _)| *cid == id)?;
                let (id, client) = self.clients.remove(index);
                Some(DeviceNote::Retired(id, client))
            }
        }
    }
}

/// Reports xruns detected outside the cycle, e.g. by a stream error
/// callback. Counted on the next cycle.
#[derive(Clone)]
pub struct XrunReporter {
    shared: Arc<DeviceShared>,
}

impl XrunReporter {
    pub fn report(&self) {
        self.shared.xrun_signal.set(true);
    }
}

/// Runs device cycles. Owned by whichever driver is currently started.
pub struct CycleProcessor {
    audio: AudioPort<DeviceOp, DeviceNote>,
    graph: ClientGraph,
    buses: BusSet,
    sample_rate: u32,
    cycle: u64,
    trace: CpuTraceWriter,
    xruns: XrunWindow,
    shared: Arc<DeviceShared>,
}

impl CycleProcessor {
    pub(crate) fn new(
        audio: AudioPort<DeviceOp, DeviceNote>,
        max_clients: usize,
        trace: CpuTraceWriter,
        xruns: XrunWindow,
        shared: Arc<DeviceShared>,
    ) -> Self {
        Self {
            audio,
            graph: ClientGraph::with_capacity(max_clients),
            buses: BusSet::new(&[], &[], 0),
            sample_rate: 0,
            cycle: 0,
            trace,
            xruns,
            shared,
        }
    }

    /// Rebuild buses for a new driver configuration. Control thread only,
    /// while no driver owns the processor.
    pub(crate) fn configure(&mut self, info: &DriverInfo) {
        self.buses = BusSet::new(
            &info.capture_channels,
            &info.playback_channels,
            info.buffer_size,
        );
        self.sample_rate = info.sample_rate;
        self.xruns.clear();
    }

    /// Largest cycle the buses hold. Drivers split longer callbacks.
    pub fn max_frames(&self) -> usize {
        self.buses.max_frames()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn client_count(&self) -> usize {
        self.graph.len()
    }

    /// Run one cycle: read, apply, process, write, report.
    pub fn run_cycle(&mut self, io: &mut dyn DriverIo, frames: usize) {
        let started = Instant::now();
        let frames = frames.min(self.buses.max_frames());

        self.buses.capture.clear();
        io.read(frames, &mut self.buses.capture);
        self.buses.playback.clear();

        self.audio.drain_apply(&mut self.graph);
        for (_, client) in self.graph.clients.iter_mut() {
            client.drain_apply();
        }

        let mut cx = CycleContext {
            cycle: self.cycle,
            frames,
            sample_rate: self.sample_rate,
            capture: &self.buses.capture,
            playback: &mut self.buses.playback,
        };
        for (_, client) in self.graph.clients.iter_mut() {
            client.process(&mut cx);
        }

        io.write(frames, &self.buses.playback);

        self.cycle += 1;
        self.shared.cycles.incr();
        // Coalesced: at most one in flight, cleared by the consumer.
        if !self.shared.finished_pending.swap(true) {
            self.audio
                .post_from_audio(DeviceNote::CycleFinished { cycle: self.cycle });
        }

        let period = if self.sample_rate > 0 {
            Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
        } else {
            Duration::ZERO
        };
        let (load, overrun) = self.shared.cpu.record(period, started.elapsed());
        self.trace.push(load);

        let xrun = self.shared.xrun_signal.swap(false) | overrun;
        if self.xruns.record(xrun) {
            self.audio.post_from_audio(DeviceNote::XrunFault {
                in_window: self.xruns.in_window(),
                total: self.xruns.total(),
            });
        }
    }

    /// Cycles run by this processor.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Handle drivers use to report backend xruns from any thread.
    pub fn xrun_reporter(&self) -> XrunReporter {
        XrunReporter {
            shared: Arc::clone(&self.shared),
        }
    }
}
