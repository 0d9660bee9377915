//! I/O statistics for the streaming engine.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the worker (reads, writes) and by the audio thread
/// (queue failures). All relaxed; read through [`IOMetrics::snapshot`].
#[derive(Debug, Default)]
pub struct IOMetrics {
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    read_ops: AtomicU64,
    write_ops: AtomicU64,
    /// Refills that started below [`LOW_BUFFER_PERCENT`]
    low_buffer_events: AtomicU64,
    dequeue_failures: AtomicU64,
    enqueue_failures: AtomicU64,
    seeks: AtomicU64,
}

/// Fill percentage under which a refill counts as a low-buffer event.
pub const LOW_BUFFER_PERCENT: f32 = 10.0;

impl IOMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        self.read_ops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_write(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.write_ops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_low_buffer(&self) {
        self.low_buffer_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dequeue_failure(&self) {
        self.dequeue_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enqueue_failure(&self) {
        self.enqueue_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_seek(&self) {
        self.seeks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IOMetricsSnapshot {
        IOMetricsSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            read_ops: self.read_ops.load(Ordering::Relaxed),
            write_ops: self.write_ops.load(Ordering::Relaxed),
            low_buffer_events: self.low_buffer_events.load(Ordering::Relaxed),
            dequeue_failures: self.dequeue_failures.load(Ordering::Relaxed),
            enqueue_failures: self.enqueue_failures.load(Ordering::Relaxed),
            seeks: self.seeks.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.bytes_read,
            &self.bytes_written,
            &self.read_ops,
            &self.write_ops,
            &self.low_buffer_events,
            &self.dequeue_failures,
            &self.enqueue_failures,
            &self.seeks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of [`IOMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IOMetricsSnapshot {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub read_ops: u64,
    pub write_ops: u64,
    pub low_buffer_events: u64,
    pub dequeue_failures: u64,
    pub enqueue_failures: u64,
    pub seeks: u64,
}

impl IOMetricsSnapshot {
    pub fn avg_read_size(&self) -> u64 {
        if self.read_ops == 0 {
            0
        } else {
            self.bytes_read / self.read_ops
        }
    }

    pub fn avg_write_size(&self) -> u64 {
        if self.write_ops == 0 {
            0
        } else {
            self.bytes_written / self.write_ops
        }
    }

    /// Queue failures of either direction.
    pub fn queue_failures(&self) -> u64 {
        self.dequeue_failures + self.enqueue_failures
    }
}
