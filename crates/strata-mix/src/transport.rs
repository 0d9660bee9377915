//! Session playhead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::{AtomicFlag, FramePosition};

/// Transport state published for the control side.
#[derive(Debug, Default)]
pub struct TransportState {
    frame: AtomicU64,
    rolling: AtomicFlag,
}

impl TransportState {
    /// Playhead in frames at the session rate.
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    pub fn is_rolling(&self) -> bool {
        self.rolling.get()
    }
}

/// Audio-thread transport.
///
/// The playhead is kept as a rational position and advanced by the frames
/// of each cycle, so a rate change does not move it.
pub struct Transport {
    position: FramePosition,
    frame: u64,
    rate: u32,
    rolling: bool,
    interval: u32,
    since_notify: u32,
    notify_due: bool,
    shared: Arc<TransportState>,
}

impl Transport {
    /// `interval` is the number of rolling cycles between position notes.
    pub fn new(sample_rate: u32, interval: u32) -> Self {
        Self {
            position: FramePosition::ZERO,
            frame: 0,
            rate: sample_rate.max(1),
            rolling: false,
            interval: interval.max(1),
            since_notify: 0,
            notify_due: false,
            shared: Arc::new(TransportState::default()),
        }
    }

    pub fn shared(&self) -> Arc<TransportState> {
        Arc::clone(&self.shared)
    }

    pub fn position(&self) -> FramePosition {
        self.position
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn sample_rate(&self) -> u32 {
        self.rate
    }

    pub fn is_rolling(&self) -> bool {
        self.rolling
    }

    pub fn set_sample_rate(&mut self, rate: u32) {
        if rate > 0 && rate != self.rate {
            self.rate = rate;
            self.sync_frame();
        }
    }

    pub fn play(&mut self) {
        if !self.rolling {
            self.rolling = true;
            self.shared.rolling.set(true);
            self.notify_due = true;
        }
    }

    pub fn stop(&mut self) {
        if self.rolling {
            self.rolling = false;
            self.shared.rolling.set(false);
            self.notify_due = true;
        }
    }

    /// Move the playhead. Returns the new frame.
    pub fn locate(&mut self, position: FramePosition) -> u64 {
        self.position = position;
        self.sync_frame();
        self.since_notify = 0;
        self.notify_due = true;
        self.frame
    }

    /// Advance by one block while rolling.
    pub fn advance(&mut self, frames: usize) {
        if !self.rolling || frames == 0 {
            return;
        }
        self.position = self.position.advanced(frames as u64, self.rate);
        self.sync_frame();
    }

    /// Count a finished cycle. Returns whether a position note is due.
    pub fn end_cycle(&mut self) -> bool {
        if self.rolling {
            self.since_notify += 1;
            if self.since_notify >= self.interval {
                self.notify_due = true;
            }
        }
        if std::mem::take(&mut self.notify_due) {
            self.since_notify = 0;
            true
        } else {
            false
        }
    }

    /// Ask for another note on the next cycle, used when a note could not
    /// be sent.
    pub fn defer_notify(&mut self) {
        self.notify_due = true;
    }

    fn sync_frame(&mut self) {
        self.frame = self.position.to_frames(self.rate);
        self.shared.frame.store(self.frame, Ordering::Release);
    }
}
