//! The streaming worker thread.
//!
//! One [`DiskStreamer`] serves one session graph. Each wake-up processes
//! pending commands, then gives every source one refill and every sink one
//! flush, starting from a rotating index so no stream is always last.
//! Wake-ups come from [`StreamWaker::wake`], normally called once per
//! finished audio cycle, or from the idle timeout.

use crate::codec::{self, CodecReader, CodecWriter};
use crate::config::StreamConfig;
use crate::metrics::IOMetrics;
use crate::sink::{sink_pair, SinkDrain, SinkWriter};
use crate::source::{source_pair, SourceFeeder, SourceReader};
use crate::status::BufferStatus;
use crate::{Error, Result, StreamId};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use strata_core::AtomicFlag;
use thread_priority::ThreadPriority;
use tracing::{debug, error, warn};

/// Command sent to the streaming worker.
pub(crate) enum StreamCommand {
    AddSource(SourceFeeder),
    AddSink(SinkDrain),
    /// Acknowledged after the next full pass.
    Sync(Sender<()>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Source,
    Sink,
}

/// Control-side view of a registered stream.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub kind: StreamKind,
    pub channels: usize,
    pub sample_rate: u32,
    pub status: Arc<BufferStatus>,
}

/// Wakes the worker. Wake-ups coalesce: any number of calls between two
/// passes cause one pass.
#[derive(Debug, Clone)]
pub struct StreamWaker {
    tx: Sender<()>,
}

impl StreamWaker {
    #[inline]
    pub fn wake(&self) {
        let _ = self.tx.try_send(());
    }
}

pub struct DiskStreamer {
    config: StreamConfig,
    command_tx: Sender<StreamCommand>,
    command_rx: Option<Receiver<StreamCommand>>,
    wake_tx: Sender<()>,
    wake_rx: Option<Receiver<()>>,
    registry: Arc<DashMap<StreamId, StreamInfo>>,
    metrics: Arc<IOMetrics>,
    shutdown: Arc<AtomicFlag>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DiskStreamer {
    pub fn new(config: StreamConfig) -> Result<Self> {
        config.validate()?;
        let (command_tx, command_rx) = bounded(config.command_capacity);
        let (wake_tx, wake_rx) = bounded(1);
        Ok(Self {
            config,
            command_tx,
            command_rx: Some(command_rx),
            wake_tx,
            wake_rx: Some(wake_rx),
            registry: Arc::new(DashMap::new()),
            metrics: Arc::new(IOMetrics::new()),
            shutdown: Arc::new(AtomicFlag::new(false)),
            thread_handle: None,
        })
    }

    /// Spawn the worker. Streams opened before this are served once it runs.
    pub fn start(&mut self) -> Result<()> {
        if self.thread_handle.is_some() {
            return Ok(());
        }
        let (Some(commands), Some(wake)) = (self.command_rx.take(), self.wake_rx.take()) else {
            return Err(Error::EngineStopped);
        };
        let registry = Arc::clone(&self.registry);
        let shutdown = Arc::clone(&self.shutdown);
        let idle = self.config.idle_wake;

        let handle = thread::Builder::new()
            .name("strata-disk".into())
            .spawn(move || {
                let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
                disk_loop(commands, wake, registry, shutdown, idle);
            })?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Finish every sink and join the worker. A stopped streamer cannot be
    /// restarted.
    pub fn stop(&mut self) {
        self.shutdown.set(true);
        let _ = self.command_tx.try_send(StreamCommand::Shutdown);
        self.waker().wake();

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    pub fn waker(&self) -> StreamWaker {
        StreamWaker {
            tx: self.wake_tx.clone(),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<IOMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Stream from `codec`, starting at frame 0.
    pub fn open_source(&self, codec: Box<dyn CodecReader>) -> Result<SourceReader> {
        let (reader, feeder) = source_pair(codec, &self.config, Arc::clone(&self.metrics))?;
        let info = StreamInfo {
            kind: StreamKind::Source,
            channels: feeder.channel_count(),
            sample_rate: feeder.sample_rate(),
            status: feeder.status_handle(),
        };
        self.register(reader.id(), info, StreamCommand::AddSource(feeder))?;
        Ok(reader)
    }

    /// Stream an audio file.
    pub fn open_file(&self, path: impl AsRef<Path>) -> Result<SourceReader> {
        self.open_source(codec::open_reader(path)?)
    }

    /// Record into `codec`.
    pub fn create_sink(&self, codec: Box<dyn CodecWriter>) -> Result<SinkWriter> {
        let (writer, drain) = sink_pair(codec, &self.config, Arc::clone(&self.metrics))?;
        let info = StreamInfo {
            kind: StreamKind::Sink,
            channels: drain.channel_count(),
            sample_rate: drain.sample_rate(),
            status: drain.status_handle(),
        };
        self.register(writer.id(), info, StreamCommand::AddSink(drain))?;
        Ok(writer)
    }

    /// Record into a new file in the configured write format.
    pub fn record_file(
        &self,
        path: impl AsRef<Path>,
        channels: usize,
        sample_rate: u32,
    ) -> Result<SinkWriter> {
        let codec = codec::create_writer(path, channels, sample_rate, self.config.write_format)?;
        self.create_sink(codec)
    }

    /// Block until the worker has completed a pass that started after this
    /// call.
    pub fn sync(&self, timeout: Duration) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.send(StreamCommand::Sync(tx))?;
        rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => Error::SyncTimeout(timeout),
            RecvTimeoutError::Disconnected => Error::EngineStopped,
        })
    }

    pub fn stream_info(&self, id: StreamId) -> Option<StreamInfo> {
        self.registry.get(&id).map(|entry| entry.value().clone())
    }

    pub fn stream_count(&self) -> usize {
        self.registry.len()
    }

    fn register(&self, id: StreamId, info: StreamInfo, command: StreamCommand) -> Result<()> {
        self.registry.insert(id, info);
        if let Err(e) = self.send(command) {
            self.registry.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    fn send(&self, command: StreamCommand) -> Result<()> {
        if self.shutdown.get() {
            return Err(Error::EngineStopped);
        }
        match self.command_tx.try_send(command) {
            Ok(()) => {
                self.waker().wake();
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(Error::EngineStopped),
        }
    }
}

impl Drop for DiskStreamer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn disk_loop(
    commands: Receiver<StreamCommand>,
    wake: Receiver<()>,
    registry: Arc<DashMap<StreamId, StreamInfo>>,
    shutdown: Arc<AtomicFlag>,
    idle: Duration,
) {
    let mut sources: Vec<SourceFeeder> = Vec::new();
    let mut sinks: Vec<SinkDrain> = Vec::new();
    let mut acks: Vec<Sender<()>> = Vec::new();
    let mut turn = 0usize;
    debug!("streaming worker running");

    loop {
        let running = process_commands(&commands, &mut sources, &mut sinks, &mut acks);
        if !running || shutdown.get() {
            finish_sinks(&mut sinks, &registry);
            break;
        }

        run_pass(&mut sources, &mut sinks, turn);
        turn = turn.wrapping_add(1);
        retire(&mut sources, &mut sinks, &registry);

        for ack in acks.drain(..) {
            let _ = ack.send(());
        }

        match wake.recv_timeout(idle) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(idle),
        }
    }

    sources.clear();
    registry.clear();
    debug!("streaming worker stopped");
}

/// Returns `false` on shutdown.
fn process_commands(
    commands: &Receiver<StreamCommand>,
    sources: &mut Vec<SourceFeeder>,
    sinks: &mut Vec<SinkDrain>,
    acks: &mut Vec<Sender<()>>,
) -> bool {
    while let Ok(command) = commands.try_recv() {
        match command {
            StreamCommand::AddSource(feeder) => sources.push(feeder),
            StreamCommand::AddSink(drain) => sinks.push(drain),
            StreamCommand::Sync(ack) => acks.push(ack),
            StreamCommand::Shutdown => return false,
        }
    }
    true
}

fn run_pass(sources: &mut [SourceFeeder], sinks: &mut [SinkDrain], turn: usize) {
    let len = sources.len();
    for i in 0..len {
        let feeder = &mut sources[(turn + i) % len];
        if feeder.failed || feeder.is_detached() {
            continue;
        }
        if let Err(e) = feeder.refill() {
            error!(source = feeder.id().0, "refill failed, source muted: {e}");
            feeder.failed = true;
        }
    }

    let len = sinks.len();
    for i in 0..len {
        let drain = &mut sinks[(turn + i) % len];
        if let Err(e) = drain.flush() {
            warn!(sink = drain.id().0, "flush failed: {e}");
        }
    }
}

/// Drop detached or failed sources and finalized sinks on this thread.
fn retire(
    sources: &mut Vec<SourceFeeder>,
    sinks: &mut Vec<SinkDrain>,
    registry: &DashMap<StreamId, StreamInfo>,
) {
    sources.retain(|feeder| {
        let keep = !feeder.failed && !feeder.is_detached();
        if !keep {
            registry.remove(&feeder.id());
        }
        keep
    });
    sinks.retain(|drain| {
        let keep = !drain.is_finalized();
        if !keep {
            registry.remove(&drain.id());
        }
        keep
    });
}

fn finish_sinks(sinks: &mut Vec<SinkDrain>, registry: &DashMap<StreamId, StreamInfo>) {
    for mut drain in sinks.drain(..) {
        if let Err(e) = drain.finish() {
            warn!(sink = drain.id().0, "finalize on shutdown failed: {e}");
        }
        registry.remove(&drain.id());
    }
}
