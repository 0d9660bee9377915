//! Fixed-size slots and the free/ready queues that move them.
//!
//! A slot has exactly one owner at any instant: the free queue, the ready
//! queue, or the side that popped it. Slots are moved, never shared, so a
//! reader cannot observe a slot the engine is still writing.
//!
//! The side that fills slots pops from `free` and pushes to `ready`
//! ([`SlotFiller`]); the side that consumes them does the opposite
//! ([`SlotDrainer`]). For playback the engine fills and the audio thread
//! drains; for recording the roles swap.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A fixed frames × channels buffer tagged with the file position it holds.
#[derive(Debug)]
pub struct QueueBufferSlot {
    index: usize,
    position: u64,
    frames: usize,
    generation: u32,
    eof: bool,
    data: Vec<Vec<f32>>,
}

impl QueueBufferSlot {
    pub fn new(index: usize, channels: usize, capacity: usize) -> Self {
        Self {
            index,
            position: 0,
            frames: 0,
            generation: 0,
            eof: false,
            data: vec![vec![0.0; capacity]; channels],
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// File frame of the first valid sample.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// One past the last valid frame.
    pub fn end(&self) -> u64 {
        self.position + self.frames as u64
    }

    /// Valid frames.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn capacity(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn is_full(&self) -> bool {
        self.frames == self.capacity()
    }

    pub fn channel_count(&self) -> usize {
        self.data.len()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Last slot before end of file.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn contains(&self, frame: u64) -> bool {
        frame >= self.position && frame < self.end()
    }

    /// Valid samples of `channel`.
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.data[channel][..self.frames]
    }

    /// Whole backing buffer of `channel`.
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.data[channel]
    }

    /// Re-tag for new content. Clears valid frames and the EOF mark.
    pub fn reset(&mut self, position: u64, generation: u32) {
        self.position = position;
        self.generation = generation;
        self.frames = 0;
        self.eof = false;
    }

    pub fn set_frames(&mut self, frames: usize) {
        debug_assert!(frames <= self.capacity());
        self.frames = frames.min(self.capacity());
    }

    pub fn set_eof(&mut self, eof: bool) {
        self.eof = eof;
    }
}

/// Where every slot of one queue pair is at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCensus {
    pub free: usize,
    pub ready: usize,
    pub checked_out: usize,
    pub total: usize,
}

impl SlotCensus {
    /// Every slot accounted for exactly once.
    pub fn is_conserved(&self) -> bool {
        self.free + self.ready + self.checked_out == self.total
    }

    /// Non-free slots as a percentage of the total.
    pub fn fill_percent(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * (self.total - self.free.min(self.total)) as f32 / self.total as f32
    }
}

#[derive(Debug, Default)]
struct Held {
    filler: AtomicUsize,
    drainer: AtomicUsize,
}

/// Pops free slots, pushes filled ones to ready.
pub struct SlotFiller {
    free: HeapCons<QueueBufferSlot>,
    ready: HeapProd<QueueBufferSlot>,
    held: Arc<Held>,
    total: usize,
}

/// Pops ready slots, returns consumed ones to free.
pub struct SlotDrainer {
    ready: HeapCons<QueueBufferSlot>,
    free: HeapProd<QueueBufferSlot>,
    held: Arc<Held>,
    total: usize,
}

/// Allocate `count` slots, all starting in the free queue.
pub fn slot_queues(count: usize, channels: usize, frames: usize) -> (SlotFiller, SlotDrainer) {
    assert!(count > 0, "slot count must be non-zero");
    let (mut free_prod, free_cons) = HeapRb::<QueueBufferSlot>::new(count).split();
    let (ready_prod, ready_cons) = HeapRb::<QueueBufferSlot>::new(count).split();

    for index in 0..count {
        if free_prod
            .try_push(QueueBufferSlot::new(index, channels, frames))
            .is_err()
        {
            unreachable!("free queue sized for every slot");
        }
    }

    let held = Arc::new(Held::default());
    (
        SlotFiller {
            free: free_cons,
            ready: ready_prod,
            held: Arc::clone(&held),
            total: count,
        },
        SlotDrainer {
            ready: ready_cons,
            free: free_prod,
            held,
            total: count,
        },
    )
}

fn census(free: usize, ready: usize, held: &Held, total: usize) -> SlotCensus {
    SlotCensus {
        free,
        ready,
        checked_out: held.filler.load(Ordering::Acquire) + held.drainer.load(Ordering::Acquire),
        total,
    }
}

impl SlotFiller {
    /// Take a free slot.
    #[inline]
    pub fn acquire(&mut self) -> Option<QueueBufferSlot> {
        let slot = self.free.try_pop()?;
        self.held.filler.fetch_add(1, Ordering::AcqRel);
        Some(slot)
    }

    /// Hand a filled slot to the drainer.
    ///
    /// # Panics
    ///
    /// If the ready queue is full, which means a slot was duplicated.
    #[inline]
    pub fn commit(&mut self, slot: QueueBufferSlot) {
        if self.ready.try_push(slot).is_err() {
            panic!("ready queue overflow: slot owned twice");
        }
        self.held.filler.fetch_sub(1, Ordering::AcqRel);
    }

    /// Return a slot unfilled. Goes through the ready queue so the drainer
    /// recycles it; an empty slot is skipped by every reader.
    #[inline]
    pub fn discard(&mut self, mut slot: QueueBufferSlot) {
        slot.set_frames(0);
        slot.set_eof(false);
        self.commit(slot);
    }

    pub fn free_len(&self) -> usize {
        self.free.occupied_len()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.occupied_len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn census(&self) -> SlotCensus {
        census(self.free_len(), self.ready_len(), &self.held, self.total)
    }
}

impl SlotDrainer {
    /// Take the oldest ready slot.
    #[inline]
    pub fn take(&mut self) -> Option<QueueBufferSlot> {
        let slot = self.ready.try_pop()?;
        self.held.drainer.fetch_add(1, Ordering::AcqRel);
        Some(slot)
    }

    /// Recycle a consumed slot.
    ///
    /// # Panics
    ///
    /// If the free queue is full, which means a slot was duplicated.
    #[inline]
    pub fn release(&mut self, slot: QueueBufferSlot) {
        if self.free.try_push(slot).is_err() {
            panic!("free queue overflow: slot owned twice");
        }
        self.held.drainer.fetch_sub(1, Ordering::AcqRel);
    }

    /// Recycle every ready slot. Returns how many moved.
    pub fn flush(&mut self) -> usize {
        let mut moved = 0;
        while let Some(slot) = self.take() {
            self.release(slot);
            moved += 1;
        }
        moved
    }

    pub fn free_len(&self) -> usize {
        self.free.occupied_len()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.occupied_len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn census(&self) -> SlotCensus {
        census(self.free_len(), self.ready_len(), &self.held, self.total)
    }
}
