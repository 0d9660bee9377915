//! Clip fade-in and fade-out ramps.

use crate::curve::CubicCurve;
use serde::{Deserialize, Serialize};
use strata_core::FramePosition;

/// Shape of a fade, as a gain curve over `0..=1` of the fade length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum FadeShape {
    #[default]
    Linear,
    /// Rises quickly, approximating equal power.
    Fast,
    /// Rises late.
    Slow,
    SCurve,
    Custom(Vec<(f32, f32)>),
}

impl FadeShape {
    pub fn points(&self) -> Vec<(f32, f32)> {
        match self {
            FadeShape::Linear => vec![(0.0, 0.0), (1.0, 1.0)],
            FadeShape::Fast => vec![(0.0, 0.0), (0.25, 0.38), (0.5, 0.707), (0.75, 0.92), (1.0, 1.0)],
            FadeShape::Slow => vec![(0.0, 0.0), (0.25, 0.08), (0.5, 0.29), (0.75, 0.62), (1.0, 1.0)],
            FadeShape::SCurve => vec![(0.0, 0.0), (0.25, 0.1), (0.5, 0.5), (0.75, 0.9), (1.0, 1.0)],
            FadeShape::Custom(points) => points.clone(),
        }
    }
}

/// Document form of a fade: length in rational time plus a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FadeSpec {
    pub length: FramePosition,
    pub shape: FadeShape,
}

impl FadeSpec {
    pub fn new(length: FramePosition, shape: FadeShape) -> Self {
        Self { length, shape }
    }

    pub fn frames(frames: u64, sample_rate: u32, shape: FadeShape) -> Self {
        Self::new(FramePosition::from_frames(frames, sample_rate), shape)
    }
}

/// A fade resolved to frames at the session rate.
#[derive(Debug, Clone)]
pub struct Fade {
    frames: u64,
    curve: CubicCurve,
}

impl Fade {
    pub fn none() -> Self {
        Self {
            frames: 0,
            curve: CubicCurve::linear(),
        }
    }

    pub fn from_spec(spec: &FadeSpec, sample_rate: u32) -> Self {
        Self {
            frames: spec.length.to_frames(sample_rate),
            curve: CubicCurve::new(spec.shape.points()),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Gain `offset` frames into the ramp; 1 once the ramp is over.
    #[inline]
    pub fn gain(&mut self, offset: u64) -> f32 {
        if offset >= self.frames {
            return 1.0;
        }
        self.curve.value_at(offset as f32 / self.frames as f32)
    }
}

/// Both fades of one clip.
#[derive(Debug, Clone)]
pub struct ClipFades {
    pub fade_in: Fade,
    pub fade_out: Fade,
}

impl ClipFades {
    pub fn none() -> Self {
        Self {
            fade_in: Fade::none(),
            fade_out: Fade::none(),
        }
    }

    pub fn from_specs(fade_in: &FadeSpec, fade_out: &FadeSpec, sample_rate: u32) -> Self {
        Self {
            fade_in: Fade::from_spec(fade_in, sample_rate),
            fade_out: Fade::from_spec(fade_out, sample_rate),
        }
    }

    /// Combined gain at `offset` frames into a clip of `length` frames.
    #[inline]
    pub fn gain(&mut self, offset: u64, length: u64) -> f32 {
        let remaining = length.saturating_sub(offset + 1);
        self.fade_in.gain(offset) * self.fade_out.gain(remaining)
    }
}
