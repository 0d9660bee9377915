//! Rational frame positions.
//!
//! Positions are stored as exact rational seconds so a value created at one
//! sample rate converts to another rate without accumulating rounding drift.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A point in time, expressed as `frames / rate` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FramePosition {
    value: Rational64,
}

impl Default for FramePosition {
    fn default() -> Self {
        Self::ZERO
    }
}

impl FramePosition {
    pub const ZERO: Self = Self {
        value: Rational64::new_raw(0, 1),
    };

    /// Position of `frames` samples at `rate` Hz. Frame counts beyond
    /// `i64::MAX` saturate.
    #[inline]
    pub fn from_frames(frames: u64, rate: u32) -> Self {
        debug_assert!(rate > 0, "sample rate must be non-zero");
        let frames = i64::try_from(frames).unwrap_or(i64::MAX);
        Self {
            value: Rational64::new(frames, rate as i64),
        }
    }

    /// Exact seconds as a fraction.
    #[inline]
    pub fn from_ratio(numer: i64, denom: i64) -> Self {
        Self {
            value: Rational64::new(numer, denom),
        }
    }

    /// Frame index at `rate`, rounded towards zero. Negative positions
    /// map to 0 and results past `u64::MAX` saturate.
    #[inline]
    pub fn to_frames(self, rate: u32) -> u64 {
        let numer = *self.value.numer() as i128 * rate as i128;
        let frames = numer / *self.value.denom() as i128;
        u64::try_from(frames.max(0)).unwrap_or(u64::MAX)
    }

    #[inline]
    pub fn to_seconds_f64(self) -> f64 {
        *self.value.numer() as f64 / *self.value.denom() as f64
    }

    /// Advance by `frames` at `rate`.
    #[inline]
    pub fn advanced(self, frames: u64, rate: u32) -> Self {
        self + Self::from_frames(frames, rate)
    }

    /// Difference clamped to zero.
    #[inline]
    pub fn saturating_sub(self, rhs: Self) -> Self {
        if rhs >= self {
            Self::ZERO
        } else {
            self - rhs
        }
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        *self.value.numer() == 0
    }
}

impl Add for FramePosition {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
        }
    }
}

impl AddAssign for FramePosition {
    fn add_assign(&mut self, rhs: Self) {
        self.value = self.value + rhs.value;
    }
}

impl Sub for FramePosition {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
        }
    }
}

impl fmt::Display for FramePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.to_seconds_f64())
    }
}

/// Half-open frame range `[start, end)` at a single sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: u64,
    pub end: u64,
}

impl FrameRange {
    #[inline]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[inline]
    pub const fn with_len(start: u64, len: u64) -> Self {
        Self {
            start,
            end: start + len,
        }
    }

    #[inline]
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub const fn contains(&self, frame: u64) -> bool {
        frame >= self.start && frame < self.end
    }

    /// Overlapping part of two ranges, if any.
    #[inline]
    pub fn intersect(&self, other: &FrameRange) -> Option<FrameRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(FrameRange { start, end })
    }
}
