//! Per-stream buffer status shared between the engine and the audio thread.

use std::sync::atomic::{AtomicU8, Ordering};
use strata_core::{AtomicCounter, AtomicFloat};

/// Sync state of a source or sink.
///
/// Read path: `Idle → Filling → InSync ⇄ Seeking → SeekComplete → Filling`,
/// with `OutOfSync` and `DequeueFailure` reachable from any state.
/// `EnqueueFailure` belongs to the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SyncState {
    Idle = 0,
    Filling = 1,
    InSync = 2,
    Seeking = 3,
    SeekComplete = 4,
    OutOfSync = 5,
    DequeueFailure = 6,
    EnqueueFailure = 7,
}

impl SyncState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Filling,
            2 => Self::InSync,
            3 => Self::Seeking,
            4 => Self::SeekComplete,
            5 => Self::OutOfSync,
            6 => Self::DequeueFailure,
            7 => Self::EnqueueFailure,
            _ => Self::Idle,
        }
    }

    pub fn is_fault(self) -> bool {
        matches!(
            self,
            Self::OutOfSync | Self::DequeueFailure | Self::EnqueueFailure
        )
    }
}

#[derive(Debug)]
pub struct BufferStatus {
    fill: AtomicFloat,
    state: AtomicU8,
    dequeue_failures: AtomicCounter,
    enqueue_failures: AtomicCounter,
    out_of_sync: AtomicCounter,
}

impl Default for BufferStatus {
    fn default() -> Self {
        Self {
            fill: AtomicFloat::new(0.0),
            state: AtomicU8::new(SyncState::Idle as u8),
            dequeue_failures: AtomicCounter::new(0),
            enqueue_failures: AtomicCounter::new(0),
            out_of_sync: AtomicCounter::new(0),
        }
    }
}

impl BufferStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentage of slots not in the free queue.
    #[inline]
    pub fn fill_status(&self) -> f32 {
        self.fill.get()
    }

    #[inline]
    pub fn set_fill(&self, percent: f32) {
        self.fill.set(percent.clamp(0.0, 100.0));
    }

    #[inline]
    pub fn sync_state(&self) -> SyncState {
        SyncState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_sync_state(&self, state: SyncState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move to `to` only from one of `from`. Returns whether it moved.
    pub fn transition(&self, from: &[SyncState], to: SyncState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                from.contains(&SyncState::from_u8(current))
                    .then_some(to as u8)
            })
            .is_ok()
    }

    /// Flag a fault and count it.
    #[inline]
    pub fn record_fault(&self, state: SyncState) {
        match state {
            SyncState::DequeueFailure => {
                self.dequeue_failures.incr();
            }
            SyncState::EnqueueFailure => {
                self.enqueue_failures.incr();
            }
            SyncState::OutOfSync => {
                self.out_of_sync.incr();
            }
            _ => {}
        }
        self.set_sync_state(state);
    }

    pub fn dequeue_failures(&self) -> u64 {
        self.dequeue_failures.get()
    }

    pub fn enqueue_failures(&self) -> u64 {
        self.enqueue_failures.get()
    }

    pub fn out_of_sync_count(&self) -> u64 {
        self.out_of_sync.get()
    }
}
