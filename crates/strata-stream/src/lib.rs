//! Disk streaming for the strata engine.
//!
//! Storage is only ever touched by the streaming worker. The audio thread
//! reads and writes fixed-size slots that move between a free and a ready
//! queue per stream, so playback and recording never wait on I/O.
//!
//! # Primary API
//!
//! - [`DiskStreamer`]: worker thread, source/sink factory, [`StreamWaker`]
//! - [`SourceReader`]: audio-thread playback from a file, with seek
//! - [`SinkWriter`]: audio-thread recording into a file
//! - [`BufferStatus`]: fill percentage and [`SyncState`] per stream
//! - [`CodecReader`] / [`CodecWriter`]: format capability, WAV and memory built in
//!
//! # Example
//!
//! ```ignore
//! use strata_stream::{DiskStreamer, StreamConfig};
//!
//! let mut streamer = DiskStreamer::new(StreamConfig::default())?;
//! streamer.start()?;
//! let mut reader = streamer.open_file("drums.wav")?;
//! // audio thread:
//! let served = reader.read(position, frames, &mut buffers);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{SampleFormat, StreamConfig};

pub mod codec;
pub use codec::{
    create_writer, open_reader, CodecReader, CodecWriter, MemoryReader, MemoryWriter,
    RecordedAudio, SampleBlock, WavFileReader, WavFileWriter,
};

pub mod slot;
pub use slot::{slot_queues, QueueBufferSlot, SlotCensus, SlotDrainer, SlotFiller};

pub mod status;
pub use status::{BufferStatus, SyncState};

pub mod metrics;
pub use metrics::{IOMetrics, IOMetricsSnapshot};

pub mod source;
pub use source::{source_pair, SourceFault, SourceFeeder, SourceReader};

pub mod sink;
pub use sink::{sink_pair, Dither, SampleConverter, SinkDrain, SinkWriter};

pub mod engine;
pub use engine::{DiskStreamer, StreamInfo, StreamKind, StreamWaker};

/// Identifies a source or sink within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl StreamId {
    pub fn generate() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
