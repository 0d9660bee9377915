//! Read path: one file streamed through a free/ready slot queue pair.
//!
//! The [`SourceFeeder`] lives on the streaming worker and fills slots from
//! the codec. The [`SourceReader`] lives with the mixing graph and copies
//! from ready slots without touching storage, locks or the allocator.
//!
//! Seeks are generation-tagged: the reader bumps the generation and flushes
//! its ready slots, the feeder notices on its next refill and repositions
//! the codec. Slots filled for an older generation are recycled unread.

use crate::codec::CodecReader;
use crate::config::StreamConfig;
use crate::metrics::{IOMetrics, LOW_BUFFER_PERCENT};
use crate::slot::{slot_queues, QueueBufferSlot, SlotCensus, SlotDrainer, SlotFiller};
use crate::status::{BufferStatus, SyncState};
use crate::{Error, Result, StreamId};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::{AtomicFlag, FramePosition};

#[derive(Debug)]
pub(crate) struct SourceShared {
    id: StreamId,
    status: Arc<BufferStatus>,
    generation: AtomicU32,
    /// Last generation the feeder has queued material for.
    served: AtomicU32,
    seek_target: AtomicU64,
    detached: AtomicFlag,
    channels: usize,
    sample_rate: u32,
    length: u64,
}

/// A fault the reader detected and already asked the feeder to recover from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFault {
    pub state: SyncState,
    /// File frame the source was resynced to.
    pub resync_at: u64,
}

/// Build both halves of a streamed source. The feeder starts at frame 0.
pub fn source_pair(
    codec: Box<dyn CodecReader>,
    config: &StreamConfig,
    metrics: Arc<IOMetrics>,
) -> Result<(SourceReader, SourceFeeder)> {
    config.validate()?;
    let channels = codec.channel_count();
    if channels == 0 {
        return Err(Error::ZeroChannels);
    }

    let shared = Arc::new(SourceShared {
        id: StreamId::generate(),
        status: Arc::new(BufferStatus::new()),
        generation: AtomicU32::new(0),
        served: AtomicU32::new(0),
        seek_target: AtomicU64::new(0),
        detached: AtomicFlag::new(false),
        channels,
        sample_rate: codec.sample_rate(),
        length: codec.length(),
    });
    let (filler, drainer) = slot_queues(config.slot_count, channels, config.slot_frames);

    let reader = SourceReader {
        shared: Arc::clone(&shared),
        slots: drainer,
        current: None,
        generation: 0,
        last_position: None,
        fault: None,
        metrics: Arc::clone(&metrics),
    };
    let feeder = SourceFeeder {
        shared,
        codec,
        slots: filler,
        metrics,
        generation: 0,
        next_frame: 0,
        eof: false,
        failed: false,
        slot_frames: config.slot_frames,
        scratch: vec![0.0; config.buffered_frames() * channels],
    };
    Ok((reader, feeder))
}

/// Consumer half of a source. Safe to call from the audio thread.
pub struct SourceReader {
    shared: Arc<SourceShared>,
    slots: SlotDrainer,
    current: Option<QueueBufferSlot>,
    generation: u32,
    last_position: Option<u64>,
    fault: Option<SourceFault>,
    metrics: Arc<IOMetrics>,
}

impl SourceReader {
    pub fn id(&self) -> StreamId {
        self.shared.id
    }

    pub fn channel_count(&self) -> usize {
        self.shared.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// Length in frames.
    pub fn length(&self) -> u64 {
        self.shared.length
    }

    pub fn status(&self) -> &BufferStatus {
        &self.shared.status
    }

    pub fn census(&self) -> SlotCensus {
        self.slots.census()
    }

    /// Position of the last slot data was served from, since the last seek.
    pub fn last_slot_position(&self) -> Option<u64> {
        self.last_position
    }

    /// Drop queued material and restart streaming at `frame`.
    pub fn seek_to(&mut self, frame: u64) {
        self.reposition(frame);
        self.shared.status.set_sync_state(SyncState::Seeking);
        self.metrics.record_seek();
        self.update_fill();
    }

    /// [`seek_to`](Self::seek_to) with a rational position, converted at the
    /// file's own rate.
    pub fn seek_to_time(&mut self, position: FramePosition) {
        self.seek_to(position.to_frames(self.shared.sample_rate));
    }

    /// Copy `frames` frames starting at file frame `position` into `out`,
    /// one buffer per channel.
    ///
    /// Returns the frames served from the file. Everything else in
    /// `out[..][..frames]` is zero: frames past end of file, and the rest of
    /// the block after a fault. A return of 0 before end of file means the
    /// block must be treated as muted; the fault is available from
    /// [`take_fault`](Self::take_fault).
    pub fn read<B: AsMut<[f32]>>(&mut self, position: u64, frames: usize, out: &mut [B]) -> usize {
        for buf in out.iter_mut() {
            let buf = buf.as_mut();
            let n = frames.min(buf.len());
            buf[..n].fill(0.0);
        }
        if self.is_pending() {
            return 0;
        }

        let end = position + frames as u64;
        let mut cursor = position;
        let mut served = 0;
        let mut skipped = false;

        while cursor < end {
            let slot = match self.current.take().or_else(|| self.slots.take()) {
                Some(slot) => slot,
                None => {
                    // Everything queued lay before the block: the position is
                    // past the window, not merely ahead of the feeder.
                    let state = if skipped && served == 0 {
                        SyncState::OutOfSync
                    } else {
                        SyncState::DequeueFailure
                    };
                    self.fault(state, end);
                    break;
                }
            };

            // Stale generation or a slot the feeder gave back empty.
            if slot.generation() != self.generation || (slot.frames() == 0 && !slot.is_eof()) {
                self.slots.release(slot);
                continue;
            }

            if cursor < slot.position() {
                self.current = Some(slot);
                self.fault(SyncState::OutOfSync, end);
                break;
            }

            if cursor >= slot.end() {
                if slot.is_eof() {
                    // Past end of file: the rest stays zero.
                    self.current = Some(slot);
                    break;
                }
                // Catch-up: drop material the caller has already moved past.
                self.slots.release(slot);
                skipped = true;
                continue;
            }

            let offset = (cursor - slot.position()) as usize;
            let n = (slot.end().min(end) - cursor) as usize;
            let dst = (cursor - position) as usize;
            for (ch, buf) in out.iter_mut().enumerate().take(slot.channel_count()) {
                let buf = buf.as_mut();
                if dst >= buf.len() {
                    continue;
                }
                let m = n.min(buf.len() - dst);
                buf[dst..dst + m].copy_from_slice(&slot.channel(ch)[offset..offset + m]);
            }

            debug_assert!(self.last_position.map_or(true, |p| p <= slot.position()));
            self.last_position = Some(slot.position());
            cursor += n as u64;
            served += n;

            if cursor >= slot.end() && !slot.is_eof() {
                self.slots.release(slot);
            } else {
                self.current = Some(slot);
            }
        }

        self.update_fill();
        served
    }

    /// A seek or resync has not been served by the feeder yet. Reads are
    /// silent, without a fault, until it has.
    pub fn is_pending(&self) -> bool {
        self.shared.served.load(Ordering::Acquire) != self.generation
    }

    /// The last fault since this was called.
    pub fn take_fault(&mut self) -> Option<SourceFault> {
        self.fault.take()
    }

    fn fault(&mut self, state: SyncState, resync_at: u64) {
        if state == SyncState::DequeueFailure {
            self.metrics.record_dequeue_failure();
        }
        self.reposition(resync_at);
        self.shared.status.record_fault(state);
        self.fault = Some(SourceFault { state, resync_at });
    }

    fn reposition(&mut self, frame: u64) {
        if let Some(slot) = self.current.take() {
            self.slots.release(slot);
        }
        self.slots.flush();
        self.last_position = None;
        self.shared.seek_target.store(frame, Ordering::Release);
        self.generation = self.generation.wrapping_add(1);
        self.shared
            .generation
            .store(self.generation, Ordering::Release);
    }

    fn update_fill(&self) {
        self.shared
            .status
            .set_fill(self.slots.census().fill_percent());
    }
}

impl Drop for SourceReader {
    fn drop(&mut self) {
        self.shared.detached.set(true);
    }
}

/// Producer half of a source, driven by the streaming worker.
pub struct SourceFeeder {
    shared: Arc<SourceShared>,
    codec: Box<dyn CodecReader>,
    slots: SlotFiller,
    metrics: Arc<IOMetrics>,
    generation: u32,
    next_frame: u64,
    eof: bool,
    pub(crate) failed: bool,
    slot_frames: usize,
    scratch: Vec<f32>,
}

impl SourceFeeder {
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

    /// The reader was dropped.
    pub fn is_detached(&self) -> bool {
        self.shared.detached.get()
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Serve a pending seek, then fill every free slot but one with the next
    /// file-contiguous batch. Returns the frames queued.
    pub fn refill(&mut self) -> Result<usize> {
        let generation = self.shared.generation.load(Ordering::Acquire);
        if generation != self.generation {
            let target = self.shared.seek_target.load(Ordering::Acquire);
            self.codec.seek(target)?;
            self.generation = generation;
            self.next_frame = target;
            self.eof = false;
            self.shared.status.set_sync_state(SyncState::SeekComplete);
        }

        let free = self.slots.free_len();
        if self.eof || free <= 1 {
            self.settle();
            return Ok(0);
        }

        if self.slots.census().fill_percent() < LOW_BUFFER_PERCENT
            && self.shared.status.sync_state() == SyncState::InSync
        {
            self.metrics.record_low_buffer();
        }
        self.shared.status.transition(
            &[SyncState::Idle, SyncState::SeekComplete],
            SyncState::Filling,
        );

        let channels = self.shared.channels;
        let want = (free - 1) * self.slot_frames;
        let got = self.codec.read_frames(
            &mut self.scratch[..want * channels],
            self.next_frame,
            want,
        )?;
        self.metrics
            .record_read((got * channels * std::mem::size_of::<f32>()) as u64);
        if got < want {
            self.eof = true;
        }

        let chunks = if got == 0 {
            usize::from(self.eof)
        } else {
            got.div_ceil(self.slot_frames)
        };
        for i in 0..chunks {
            let Some(mut slot) = self.slots.acquire() else {
                break;
            };
            let start = i * self.slot_frames;
            let n = self.slot_frames.min(got - start);
            slot.reset(self.next_frame + start as u64, self.generation);
            for ch in 0..channels {
                let dst = slot.channel_mut(ch);
                for (f, sample) in dst[..n].iter_mut().enumerate() {
                    *sample = self.scratch[(start + f) * channels + ch];
                }
            }
            slot.set_frames(n);
            slot.set_eof(self.eof && i + 1 == chunks);
            self.slots.commit(slot);
        }
        self.next_frame += got as u64;

        self.settle();
        Ok(got)
    }

    fn settle(&self) {
        if self.shared.generation.load(Ordering::Acquire) == self.generation {
            self.shared.status.transition(
                &[SyncState::Filling, SyncState::SeekComplete, SyncState::Idle],
                SyncState::InSync,
            );
            self.shared.served.store(self.generation, Ordering::Release);
        }
        self.shared
            .status
            .set_fill(self.slots.census().fill_percent());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MemoryReader;
    use proptest::prelude::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    fn ramp_source(len: usize, slots: usize, frames: usize) -> (SourceReader, SourceFeeder) {
        let codec = MemoryReader::new(vec![ramp(len), ramp(len)], 48000).unwrap();
        let config = StreamConfig::default().with_slots(slots, frames);
        source_pair(Box::new(codec), &config, Arc::new(IOMetrics::new())).unwrap()
    }

    #[test]
    fn test_short_file_two_reads() {
        let (mut reader, mut feeder) = ramp_source(100, 4, 64);
        assert_eq!(reader.status().sync_state(), SyncState::Idle);

        assert_eq!(feeder.refill().unwrap(), 100);
        assert!(feeder.is_eof());
        assert_eq!(reader.status().sync_state(), SyncState::InSync);
        assert_eq!(reader.status().fill_status(), 50.0);

        let mut out = vec![vec![0.0; 64]; 2];
        assert_eq!(reader.read(0, 64, &mut out), 64);
        assert_eq!(out[1][63], 63.0);
        assert_eq!(reader.status().fill_status(), 25.0);

        out[0].fill(-1.0);
        assert_eq!(reader.read(64, 64, &mut out), 36);
        assert_eq!(out[0][0], 64.0);
        assert_eq!(out[0][35], 99.0);
        assert!(out[0][36..].iter().all(|&s| s == 0.0));
        assert_eq!(reader.status().fill_status(), 25.0);
        assert!(reader.take_fault().is_none());
        assert!(reader.census().is_conserved());
    }

    #[test]
    fn test_reads_across_slots() {
        let (mut reader, mut feeder) = ramp_source(1000, 4, 16);
        feeder.refill().unwrap();
        let mut out = vec![vec![0.0; 40]; 2];
        assert_eq!(reader.read(0, 40, &mut out), 40);
        assert_eq!(out[0], ramp(40));
    }

    #[test]
    fn test_empty_queue_is_dequeue_failure() {
        let (mut reader, mut feeder) = ramp_source(1000, 4, 16);
        let mut out = vec![vec![1.0; 8]; 2];
        assert_eq!(reader.read(0, 8, &mut out), 0);
        assert!(out.iter().all(|c| c.iter().all(|&s| s == 0.0)));
        assert_eq!(
            reader.take_fault(),
            Some(SourceFault {
                state: SyncState::DequeueFailure,
                resync_at: 8
            })
        );
        assert_eq!(reader.status().dequeue_failures(), 1);

        // The feeder resumes where the next block starts.
        feeder.refill().unwrap();
        assert_eq!(reader.status().sync_state(), SyncState::InSync);
        assert_eq!(reader.read(8, 8, &mut out), 8);
        assert_eq!(out[0][0], 8.0);
    }

    #[test]
    fn test_position_before_window_is_out_of_sync() {
        let (mut reader, mut feeder) = ramp_source(1000, 4, 16);
        reader.seek_to(100);
        feeder.refill().unwrap();
        let mut out = vec![vec![0.0; 8]; 2];
        assert_eq!(reader.read(50, 8, &mut out), 0);
        assert_eq!(reader.status().sync_state(), SyncState::OutOfSync);
        assert_eq!(reader.take_fault().map(|f| f.resync_at), Some(58));
        assert!(reader.census().is_conserved());
    }

    #[test]
    fn test_position_past_window_is_out_of_sync() {
        let (mut reader, mut feeder) = ramp_source(1000, 4, 16);
        feeder.refill().unwrap();
        assert_eq!(reader.census().ready, 3);

        let mut out = vec![vec![1.0; 8]; 2];
        assert_eq!(reader.read(500, 8, &mut out), 0);
        assert!(out.iter().all(|c| c.iter().all(|&s| s == 0.0)));
        assert_eq!(reader.status().sync_state(), SyncState::OutOfSync);
        assert_eq!(
            reader.take_fault(),
            Some(SourceFault {
                state: SyncState::OutOfSync,
                resync_at: 508
            })
        );
        assert_eq!(reader.status().dequeue_failures(), 0);
        assert!(reader.census().is_conserved());

        feeder.refill().unwrap();
        assert_eq!(reader.read(508, 8, &mut out), 8);
        assert_eq!(out[0][0], 508.0);
    }

    #[test]
    fn test_catch_up_skips_old_slots() {
        let (mut reader, mut feeder) = ramp_source(1000, 8, 16);
        feeder.refill().unwrap();
        let mut out = vec![vec![0.0; 8]; 2];
        assert_eq!(reader.read(40, 8, &mut out), 8);
        assert_eq!(out[0][0], 40.0);
        assert_eq!(reader.last_slot_position(), Some(32));
        assert!(reader.take_fault().is_none());
    }

    #[test]
    fn test_seek_discards_stale_fill() {
        let (mut reader, mut feeder) = ramp_source(1000, 4, 16);
        feeder.refill().unwrap();
        reader.seek_to(500);
        assert_eq!(reader.status().sync_state(), SyncState::Seeking);
        assert_eq!(reader.census().free, 4);

        feeder.refill().unwrap();
        assert_eq!(reader.status().sync_state(), SyncState::InSync);
        let mut out = vec![vec![0.0; 4]; 2];
        assert_eq!(reader.read(500, 4, &mut out), 4);
        assert_eq!(out[1], vec![500.0, 501.0, 502.0, 503.0]);
    }

    #[test]
    fn test_pending_seek_reads_silence_without_fault() {
        let (mut reader, mut feeder) = ramp_source(1000, 4, 16);
        feeder.refill().unwrap();
        reader.seek_to(200);
        assert!(reader.is_pending());

        let mut out = vec![vec![1.0; 8]; 2];
        assert_eq!(reader.read(200, 8, &mut out), 0);
        assert!(reader.take_fault().is_none());
        assert!(out[0].iter().all(|&s| s == 0.0));

        feeder.refill().unwrap();
        assert!(!reader.is_pending());
        assert_eq!(reader.read(200, 8, &mut out), 8);
        assert_eq!(out[0][0], 200.0);
    }

    #[test]
    fn test_fault_waits_for_resync() {
        let (mut reader, mut feeder) = ramp_source(1000, 4, 16);
        let mut out = vec![vec![0.0; 8]; 2];
        reader.read(0, 8, &mut out);
        assert!(reader.take_fault().is_some());
        // the resync is pending, so the next block does not fault again
        reader.read(8, 8, &mut out);
        assert!(reader.take_fault().is_none());
        assert_eq!(reader.status().dequeue_failures(), 1);

        feeder.refill().unwrap();
        assert_eq!(reader.read(8, 8, &mut out), 8);
    }

    #[test]
    fn test_seek_past_end_reads_silence() {
        let (mut reader, mut feeder) = ramp_source(100, 4, 16);
        reader.seek_to(5000);
        feeder.refill().unwrap();
        let mut out = vec![vec![1.0; 8]; 2];
        assert_eq!(reader.read(5000, 8, &mut out), 0);
        assert!(reader.take_fault().is_none());
        assert!(out[0].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_idempotent_seek() {
        let mut results = Vec::new();
        for seeks in 1..=2 {
            let (mut reader, mut feeder) = ramp_source(1000, 4, 16);
            feeder.refill().unwrap();
            for _ in 0..seeks {
                reader.seek_to(123);
            }
            let mut sequence = Vec::new();
            for block in 0..6u64 {
                feeder.refill().unwrap();
                let mut out = vec![vec![0.0; 10]; 2];
                let n = reader.read(123 + block * 10, 10, &mut out);
                sequence.push((n, out));
            }
            results.push(sequence);
        }
        assert_eq!(results[0], results[1]);
    }

    #[test]
    fn test_detach_on_drop() {
        let (reader, feeder) = ramp_source(10, 2, 4);
        assert!(!feeder.is_detached());
        drop(reader);
        assert!(feeder.is_detached());
    }

    #[test]
    fn test_zero_channel_codec_rejected() {
        struct Empty;
        impl CodecReader for Empty {
            fn channel_count(&self) -> usize {
                0
            }
            fn sample_rate(&self) -> u32 {
                48000
            }
            fn length(&self) -> u64 {
                0
            }
            fn seek(&mut self, _: u64) -> Result<()> {
                Ok(())
            }
            fn read_frames(&mut self, _: &mut [f32], _: u64, _: usize) -> Result<usize> {
                Ok(0)
            }
        }
        let result = source_pair(
            Box::new(Empty),
            &StreamConfig::default(),
            Arc::new(IOMetrics::new()),
        );
        assert!(matches!(result, Err(Error::ZeroChannels)));
    }

    proptest! {
        #[test]
        fn prop_monotonic_delivery(sizes in prop::collection::vec(1usize..=16, 1..60)) {
            let len = 400;
            let (mut reader, mut feeder) = ramp_source(len, 4, 16);
            let mut position = 0u64;
            let mut last = None;
            for n in sizes {
                feeder.refill().unwrap();
                let mut out = vec![vec![0.0; n]; 2];
                let served = reader.read(position, n, &mut out);
                let expected = n.min(len.saturating_sub(position as usize));
                prop_assert_eq!(served, expected);
                for (i, &s) in out[0][..served].iter().enumerate() {
                    prop_assert_eq!(s, (position as usize + i) as f32);
                }
                let slot = reader.last_slot_position();
                prop_assert!(last <= slot);
                last = slot;
                prop_assert!(reader.census().is_conserved());
                position += n as u64;
            }
        }
    }
}
