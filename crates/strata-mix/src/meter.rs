//! Peak metering shared with the control side.

use strata_core::{AtomicCounter, AtomicFloat};

/// Per-channel peak hold, written by the audio thread and collected by the
/// control side.
#[derive(Debug)]
pub struct PeakMeter {
    peaks: Vec<AtomicFloat>,
    clipped: AtomicCounter,
}

impl PeakMeter {
    pub fn new(channels: usize) -> Self {
        Self {
            peaks: (0..channels).map(|_| AtomicFloat::new(0.0)).collect(),
            clipped: AtomicCounter::new(0),
        }
    }

    pub fn channels(&self) -> usize {
        self.peaks.len()
    }

    #[inline]
    pub fn update(&self, channel: usize, samples: &[f32]) {
        if let Some(peak) = self.peaks.get(channel) {
            let max = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            peak.fetch_max(max);
        }
    }

    /// Peak since the last [`take_peaks`](Self::take_peaks).
    pub fn peak(&self, channel: usize) -> f32 {
        self.peaks.get(channel).map_or(0.0, AtomicFloat::get)
    }

    /// Read and reset every channel's peak.
    pub fn take_peaks(&self) -> Vec<f32> {
        self.peaks.iter().map(|p| p.swap(0.0)).collect()
    }

    #[inline]
    pub fn record_clipped(&self, samples: u64) {
        if samples > 0 {
            self.clipped.add(samples);
        }
    }

    /// Samples limited by the output clamp.
    pub fn clipped(&self) -> u64 {
        self.clipped.get()
    }
}
