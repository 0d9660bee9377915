//! CPU load and xrun tracking for the audio cycle.

use crate::lockfree::{AtomicCounter, AtomicFloat};
use crate::ring_buffer::{RingBuffer, RingConsumer, RingProducer};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// CPU metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuMetrics {
    pub average: f32,
    pub peak: f32,
    pub current: f32,
    pub overruns: u64,
}

/// Load meter fed once per cycle from the audio thread.
///
/// Load is the fraction of the cycle period spent processing.
#[derive(Debug, Default)]
pub struct CpuMeter {
    current: AtomicFloat,
    peak: AtomicFloat,
    average: AtomicFloat,
    overruns: AtomicCounter,
    samples: AtomicU32,
}

impl CpuMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one cycle. Returns the load and whether the cycle overran its
    /// period.
    pub fn record(&self, period: Duration, elapsed: Duration) -> (f32, bool) {
        let period = period.as_secs_f64();
        if period <= 0.0 {
            return (0.0, false);
        }
        let load = (elapsed.as_secs_f64() / period) as f32;
        self.current.set(load);
        self.peak.fetch_max(load);

        // Exponential moving average
        let count = self.samples.fetch_add(1, Ordering::Relaxed);
        let alpha = 1.0 / (count.min(100) + 1) as f32;
        let avg = self.average.get();
        self.average.set(avg * (1.0 - alpha) + load * alpha);

        let overrun = load > 1.0;
        if overrun {
            self.overruns.incr();
        }
        (load, overrun)
    }

    pub fn metrics(&self) -> CpuMetrics {
        CpuMetrics {
            average: self.average.get() * 100.0,
            peak: self.peak.get() * 100.0,
            current: self.current.get() * 100.0,
            overruns: self.overruns.get(),
        }
    }

    pub fn reset(&self) {
        self.current.set(0.0);
        self.peak.set(0.0);
        self.average.set(0.0);
        self.overruns.reset();
        self.samples.store(0, Ordering::Relaxed);
    }
}

/// Create the per-cycle load trace: the audio thread writes, the control
/// side reads.
pub fn cpu_trace(len: usize) -> (CpuTraceWriter, CpuTraceReader) {
    let (prod, cons) = RingBuffer::<f32>::new(len).split();
    (CpuTraceWriter { prod }, CpuTraceReader { cons })
}

pub struct CpuTraceWriter {
    prod: RingProducer<f32>,
}

impl CpuTraceWriter {
    /// Push a load sample. Dropped when the reader has fallen behind.
    #[inline]
    pub fn push(&mut self, load: f32) -> bool {
        self.prod.push(load)
    }
}

pub struct CpuTraceReader {
    cons: RingConsumer<f32>,
}

impl CpuTraceReader {
    /// Take every sample recorded since the last call.
    pub fn drain(&mut self) -> Vec<f32> {
        let mut out = vec![0.0; self.cons.read_space()];
        let n = self.cons.read(&mut out);
        out.truncate(n);
        out
    }

    pub fn pending(&self) -> usize {
        self.cons.read_space()
    }
}

/// Rolling count of xruns over the last `window` cycles.
///
/// Preallocated; safe to update on the audio thread.
#[derive(Debug)]
pub struct XrunWindow {
    history: Box<[bool]>,
    pos: usize,
    count: u32,
    threshold: u32,
    total: u64,
    tripped: bool,
}

impl XrunWindow {
    pub fn new(window: u32, threshold: u32) -> Self {
        Self {
            history: vec![false; window.max(1) as usize].into_boxed_slice(),
            pos: 0,
            count: 0,
            threshold: threshold.max(1),
            total: 0,
            tripped: false,
        }
    }

    /// Record one cycle. Returns `true` exactly once when the xrun count
    /// within the window first reaches the threshold.
    pub fn record(&mut self, xrun: bool) -> bool {
        if self.history[self.pos] {
            self.count -= 1;
        }
        self.history[self.pos] = xrun;
        if xrun {
            self.count += 1;
            self.total += 1;
        }
        self.pos = (self.pos + 1) % self.history.len();

        if self.count >= self.threshold && !self.tripped {
            self.tripped = true;
            return true;
        }
        if self.count == 0 {
            self.tripped = false;
        }
        false
    }

    pub fn in_window(&self) -> u32 {
        self.count
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn clear(&mut self) {
        self.history.iter_mut().for_each(|x| *x = false);
        self.count = 0;
        self.tripped = false;
    }
}
