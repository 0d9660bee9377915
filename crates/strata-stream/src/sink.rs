//! Write path: captured audio moved to storage through slot queues.
//!
//! The [`SinkWriter`] runs on the audio thread and fills free slots; the
//! [`SinkDrain`] runs on the streaming worker, converts each ready slot to
//! the file's sample format and writes it.

use crate::codec::{CodecWriter, SampleBlock};
use crate::config::{SampleFormat, StreamConfig};
use crate::metrics::IOMetrics;
use crate::slot::{slot_queues, QueueBufferSlot, SlotCensus, SlotDrainer, SlotFiller};
use crate::status::{BufferStatus, SyncState};
use crate::{Error, Result, StreamId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::AtomicFlag;

#[derive(Debug)]
pub(crate) struct SinkShared {
    id: StreamId,
    status: Arc<BufferStatus>,
    closed: AtomicFlag,
    finalized: AtomicFlag,
    frames_written: AtomicU64,
    channels: usize,
    sample_rate: u32,
}

/// Build both halves of a recording sink.
pub fn sink_pair(
    codec: Box<dyn CodecWriter>,
    config: &StreamConfig,
    metrics: Arc<IOMetrics>,
) -> Result<(SinkWriter, SinkDrain)> {
    config.validate()?;
    let channels = codec.channel_count();
    if channels == 0 {
        return Err(Error::ZeroChannels);
    }

    let shared = Arc::new(SinkShared {
        id: StreamId::generate(),
        status: Arc::new(BufferStatus::new()),
        closed: AtomicFlag::new(false),
        finalized: AtomicFlag::new(false),
        frames_written: AtomicU64::new(0),
        channels,
        sample_rate: codec.sample_rate(),
    });
    shared.status.set_sync_state(SyncState::InSync);
    let (filler, drainer) = slot_queues(config.slot_count, channels, config.slot_frames);
    let converter = SampleConverter::new(codec.format(), config.dither);
    let block = config.slot_frames * channels;

    let writer = SinkWriter {
        shared: Arc::clone(&shared),
        slots: filler,
        current: None,
        position: 0,
        metrics: Arc::clone(&metrics),
    };
    let drain = SinkDrain {
        shared,
        codec,
        slots: drainer,
        metrics,
        converter,
        interleaved: vec![0.0; block],
        quantized: vec![0; block],
    };
    Ok((writer, drain))
}

/// Audio-thread half of a sink.
pub struct SinkWriter {
    shared: Arc<SinkShared>,
    slots: SlotFiller,
    current: Option<QueueBufferSlot>,
    position: u64,
    metrics: Arc<IOMetrics>,
}

impl SinkWriter {
    pub fn id(&self) -> StreamId {
        self.shared.id
    }

    pub fn channel_count(&self) -> usize {
        self.shared.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    pub fn status(&self) -> &BufferStatus {
        &self.shared.status
    }

    pub fn census(&self) -> SlotCensus {
        self.slots.census()
    }

    /// Frames accepted so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Frames the worker has written to the file.
    pub fn frames_written(&self) -> u64 {
        self.shared.frames_written.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.get()
    }

    /// The file is complete on storage.
    pub fn is_finalized(&self) -> bool {
        self.shared.finalized.get()
    }

    /// Queue `frames` frames, one input buffer per channel. Missing channels
    /// and short buffers record silence.
    ///
    /// Returns the frames accepted. When no free slot is left the rest of
    /// the block is dropped and the sink reports `EnqueueFailure`.
    pub fn write<B: AsRef<[f32]>>(&mut self, input: &[B], frames: usize) -> usize {
        if self.shared.closed.get() {
            return 0;
        }

        let mut done = 0;
        while done < frames {
            let mut slot = match self.current.take() {
                Some(slot) => slot,
                None => match self.slots.acquire() {
                    Some(mut slot) => {
                        slot.reset(self.position, 0);
                        slot
                    }
                    None => {
                        self.metrics.record_enqueue_failure();
                        self.shared.status.record_fault(SyncState::EnqueueFailure);
                        break;
                    }
                },
            };

            let offset = slot.frames();
            let n = (slot.capacity() - offset).min(frames - done);
            for ch in 0..slot.channel_count() {
                let dst = &mut slot.channel_mut(ch)[offset..offset + n];
                let src = input
                    .get(ch)
                    .and_then(|b| b.as_ref().get(done..))
                    .unwrap_or(&[]);
                let avail = src.len().min(n);
                dst[..avail].copy_from_slice(&src[..avail]);
                dst[avail..].fill(0.0);
            }
            slot.set_frames(offset + n);
            done += n;
            self.position += n as u64;

            if slot.is_full() {
                self.slots.commit(slot);
            } else {
                self.current = Some(slot);
            }
        }

        self.shared
            .status
            .set_fill(self.slots.census().fill_percent());
        done
    }

    /// Hand over the partial slot and let the worker finalize the file.
    pub fn close(&mut self) {
        if self.shared.closed.get() {
            return;
        }
        if let Some(slot) = self.current.take() {
            if slot.frames() > 0 {
                self.slots.commit(slot);
            } else {
                self.slots.discard(slot);
            }
        }
        self.shared.closed.set(true);
    }
}

impl Drop for SinkWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Worker half of a sink.
pub struct SinkDrain {
    shared: Arc<SinkShared>,
    codec: Box<dyn CodecWriter>,
    slots: SlotDrainer,
    metrics: Arc<IOMetrics>,
    converter: SampleConverter,
    interleaved: Vec<f32>,
    quantized: Vec<i32>,
}

impl SinkDrain {
    pub fn id(&self) -> StreamId {
        self.shared.id
    }

    pub fn status(&self) -> &BufferStatus {
        &self.shared.status
    }

    pub(crate) fn status_handle(&self) -> Arc<BufferStatus> {
        Arc::clone(&self.shared.status)
    }

    pub fn channel_count(&self) -> usize {
        self.shared.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    pub fn census(&self) -> SlotCensus {
        self.slots.census()
    }

    pub fn is_finalized(&self) -> bool {
        self.shared.finalized.get()
    }

    /// Write every ready slot. Once the writer has closed and everything is
    /// written, finalize the file. Returns the frames written.
    pub fn flush(&mut self) -> Result<usize> {
        if self.is_finalized() {
            return Ok(0);
        }
        let closing = self.shared.closed.get();
        let written = self.drain_ready()?;
        if closing {
            self.finalize()?;
        }
        Ok(written)
    }

    /// Write what is queued and finalize regardless of the writer.
    pub fn finish(&mut self) -> Result<usize> {
        if self.is_finalized() {
            return Ok(0);
        }
        let written = self.drain_ready()?;
        self.finalize()?;
        Ok(written)
    }

    fn drain_ready(&mut self) -> Result<usize> {
        let mut written = 0;
        while let Some(slot) = self.slots.take() {
            let result = self.write_slot(&slot);
            self.slots.release(slot);
            written += result?;
        }
        self.shared
            .status
            .set_fill(self.slots.census().fill_percent());
        Ok(written)
    }

    fn finalize(&mut self) -> Result<()> {
        self.codec.finalize()?;
        self.shared.finalized.set(true);
        self.shared.status.set_sync_state(SyncState::Idle);
        Ok(())
    }

    fn write_slot(&mut self, slot: &QueueBufferSlot) -> Result<usize> {
        let frames = slot.frames();
        if frames == 0 {
            return Ok(0);
        }
        let channels = self.shared.channels;
        let samples = frames * channels;
        for ch in 0..channels {
            let data = (ch < slot.channel_count()).then(|| slot.channel(ch));
            for f in 0..frames {
                self.interleaved[f * channels + ch] = data.map_or(0.0, |d| d[f]);
            }
        }

        let written = match self.codec.format() {
            SampleFormat::F32 => self
                .codec
                .write_frames(SampleBlock::Float(&self.interleaved[..samples]), frames)?,
            SampleFormat::I16 | SampleFormat::I24 => {
                for (dst, &s) in self.quantized[..samples]
                    .iter_mut()
                    .zip(&self.interleaved[..samples])
                {
                    *dst = self.converter.convert(s);
                }
                self.codec
                    .write_frames(SampleBlock::Int(&self.quantized[..samples]), frames)?
            }
        };

        let bytes = written * channels * (self.codec.format().bits_per_sample() as usize / 8);
        self.metrics.record_write(bytes as u64);
        self.shared
            .frames_written
            .fetch_add(written as u64, Ordering::AcqRel);
        Ok(written)
    }
}

/// Triangular-PDF dither from two uniform draws of a linear congruential
/// generator.
#[derive(Debug, Clone)]
pub struct Dither {
    state: u32,
}

impl Dither {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    #[inline]
    fn uniform(&mut self) -> f32 {
        self.state = self.state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (self.state >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Noise in (-1, 1) LSB.
    #[inline]
    pub fn tpdf(&mut self) -> f32 {
        self.uniform() - self.uniform()
    }
}

/// Float to integer conversion at a sink's bit depth.
#[derive(Debug, Clone)]
pub struct SampleConverter {
    full_scale: i32,
    dither: Option<Dither>,
}

impl SampleConverter {
    pub fn new(format: SampleFormat, dither: bool) -> Self {
        let full_scale = format.full_scale();
        Self {
            full_scale: full_scale.unwrap_or(i32::MAX),
            dither: (dither && full_scale.is_some()).then(|| Dither::new(0x5eed_1234)),
        }
    }

    /// Scale, dither, round and clamp one sample.
    #[inline]
    pub fn convert(&mut self, sample: f32) -> i32 {
        let noise = self.dither.as_mut().map_or(0.0, Dither::tpdf);
        let full = self.full_scale as f64;
        let scaled = sample.clamp(-1.0, 1.0) as f64 * full + noise as f64;
        scaled.round().clamp(-full - 1.0, full) as i32
    }
}
