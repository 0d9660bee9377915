//! Per-sample gain: a constant or an automation lane.

use serde::{Deserialize, Serialize};

/// One automation breakpoint on the session timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    pub frame: u64,
    pub gain: f32,
}

impl AutomationPoint {
    pub fn new(frame: u64, gain: f32) -> Self {
        Self { frame, gain }
    }
}

/// Breakpoints sorted by frame, linearly interpolated.
///
/// Before the first point the first gain holds, after the last point the
/// last gain holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationLane {
    points: Vec<AutomationPoint>,
}

impl AutomationLane {
    pub fn new(mut points: Vec<AutomationPoint>) -> Self {
        points.sort_by_key(|p| p.frame);
        points.dedup_by_key(|p| p.frame);
        Self { points }
    }

    pub fn points(&self) -> &[AutomationPoint] {
        &self.points
    }

    pub fn value_at(&self, frame: u64) -> f32 {
        let Some(first) = self.points.first() else {
            return 1.0;
        };
        let idx = self.points.partition_point(|p| p.frame <= frame);
        if idx == 0 {
            return first.gain;
        }
        let a = self.points[idx - 1];
        match self.points.get(idx) {
            None => a.gain,
            Some(b) => {
                let t = (frame - a.frame) as f32 / (b.frame - a.frame) as f32;
                a.gain + (b.gain - a.gain) * t
            }
        }
    }

    /// Write the gain of `out.len()` consecutive frames from `start`.
    pub fn fill(&self, start: u64, out: &mut [f32]) {
        let Some(first) = self.points.first() else {
            out.fill(1.0);
            return;
        };
        let mut idx = self.points.partition_point(|p| p.frame <= start);
        for (i, gain) in out.iter_mut().enumerate() {
            let frame = start + i as u64;
            while idx < self.points.len() && self.points[idx].frame <= frame {
                idx += 1;
            }
            *gain = if idx == 0 {
                first.gain
            } else {
                let a = self.points[idx - 1];
                match self.points.get(idx) {
                    None => a.gain,
                    Some(b) => {
                        let t = (frame - a.frame) as f32 / (b.frame - a.frame) as f32;
                        a.gain + (b.gain - a.gain) * t
                    }
                }
            };
        }
    }
}

/// Gain applied to a track or the master bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GainEnvelope {
    Constant(f32),
    Automation(AutomationLane),
}

impl Default for GainEnvelope {
    fn default() -> Self {
        GainEnvelope::Constant(1.0)
    }
}

impl GainEnvelope {
    pub fn automation(points: Vec<AutomationPoint>) -> Self {
        GainEnvelope::Automation(AutomationLane::new(points))
    }

    pub fn value_at(&self, frame: u64) -> f32 {
        match self {
            GainEnvelope::Constant(g) => *g,
            GainEnvelope::Automation(lane) => lane.value_at(frame),
        }
    }

    /// Multiply `frames` samples of every buffer by the gain at each frame.
    /// `scratch` must hold at least `frames` values.
    pub fn apply<B: AsMut<[f32]>>(
        &self,
        start: u64,
        buffers: &mut [B],
        frames: usize,
        scratch: &mut [f32],
    ) {
        match self {
            GainEnvelope::Constant(g) if *g == 1.0 => {}
            GainEnvelope::Constant(g) => {
                for buf in buffers.iter_mut() {
                    buf.as_mut()[..frames].iter_mut().for_each(|s| *s *= g);
                }
            }
            GainEnvelope::Automation(lane) => {
                let gains = &mut scratch[..frames];
                lane.fill(start, gains);
                for buf in buffers.iter_mut() {
                    for (s, g) in buf.as_mut()[..frames].iter_mut().zip(gains.iter()) {
                        *s *= g;
                    }
                }
            }
        }
    }
}
