//! Monotone cubic curves with a cached lookup table.
//!
//! Control points are interpolated with Fritsch-Carlson tangents so the
//! curve never overshoots between points. Evaluation reads from a
//! preallocated table which is rebuilt in place the first time the curve is
//! evaluated after its points change, so the audio thread can evaluate
//! without allocating.

use serde::{Deserialize, Serialize};

/// Entries in the cached table, spanning the first to the last control point.
pub const TABLE_LEN: usize = 257;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<(f32, f32)>", into = "Vec<(f32, f32)>")]
pub struct CubicCurve {
    points: Vec<(f32, f32)>,
    tangents: Vec<f32>,
    table: Vec<f32>,
    dirty: bool,
}

impl CubicCurve {
    /// Build from `(x, y)` points. Points are sorted by `x`; duplicates of
    /// the same `x` keep the last one.
    pub fn new(points: impl Into<Vec<(f32, f32)>>) -> Self {
        let mut curve = Self {
            points: Vec::new(),
            tangents: Vec::new(),
            table: vec![0.0; TABLE_LEN],
            dirty: true,
        };
        curve.set_points(points);
        curve
    }

    /// Straight line from `(0, 0)` to `(1, 1)`.
    pub fn linear() -> Self {
        Self::new(vec![(0.0, 0.0), (1.0, 1.0)])
    }

    /// Replace the control points. Allocates; call off the audio thread.
    pub fn set_points(&mut self, points: impl Into<Vec<(f32, f32)>>) {
        let mut points: Vec<(f32, f32)> = points
            .into()
            .into_iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points.dedup_by(|later, earlier| {
            if later.0 == earlier.0 {
                earlier.1 = later.1;
                true
            } else {
                false
            }
        });
        self.tangents = vec![0.0; points.len()];
        self.points = points;
        self.dirty = true;
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    /// Whether the table will be rebuilt on the next evaluation.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Value at `x`, clamped to the end points. A curve without points is 1.
    #[inline]
    pub fn value_at(&mut self, x: f32) -> f32 {
        match self.points.len() {
            0 => return 1.0,
            1 => return self.points[0].1,
            _ => {}
        }
        if self.dirty {
            self.rebuild();
        }
        let (x0, _) = self.points[0];
        let (xn, _) = self.points[self.points.len() - 1];
        let t = ((x - x0) / (xn - x0)).clamp(0.0, 1.0) * (TABLE_LEN - 1) as f32;
        let i = (t as usize).min(TABLE_LEN - 2);
        let frac = t - i as f32;
        self.table[i] + (self.table[i + 1] - self.table[i]) * frac
    }

    /// Evaluate the spline directly, without the table.
    pub fn evaluate(&mut self, x: f32) -> f32 {
        match self.points.len() {
            0 => return 1.0,
            1 => return self.points[0].1,
            _ => {}
        }
        if self.dirty {
            self.rebuild();
        }
        self.hermite(x)
    }

    fn rebuild(&mut self) {
        self.compute_tangents();
        let (x0, _) = self.points[0];
        let (xn, _) = self.points[self.points.len() - 1];
        for i in 0..TABLE_LEN {
            let x = x0 + (xn - x0) * i as f32 / (TABLE_LEN - 1) as f32;
            self.table[i] = self.hermite(x);
        }
        self.dirty = false;
    }

    fn compute_tangents(&mut self) {
        let n = self.points.len();
        let p = &self.points;
        let slope = |k: usize| (p[k + 1].1 - p[k].1) / (p[k + 1].0 - p[k].0);

        self.tangents[0] = slope(0);
        self.tangents[n - 1] = slope(n - 2);
        for k in 1..n - 1 {
            let (a, b) = (slope(k - 1), slope(k));
            self.tangents[k] = if a * b <= 0.0 { 0.0 } else { (a + b) * 0.5 };
        }

        for k in 0..n - 1 {
            let delta = slope(k);
            if delta == 0.0 {
                self.tangents[k] = 0.0;
                self.tangents[k + 1] = 0.0;
                continue;
            }
            let a = self.tangents[k] / delta;
            let b = self.tangents[k + 1] / delta;
            let s = a * a + b * b;
            if s > 9.0 {
                let t = 3.0 / s.sqrt();
                self.tangents[k] = t * a * delta;
                self.tangents[k + 1] = t * b * delta;
            }
        }
    }

    fn hermite(&self, x: f32) -> f32 {
        let p = &self.points;
        let last = p.len() - 1;
        if x <= p[0].0 {
            return p[0].1;
        }
        if x >= p[last].0 {
            return p[last].1;
        }
        let k = p.partition_point(|pt| pt.0 <= x).saturating_sub(1).min(last - 1);
        let (x0, y0) = p[k];
        let (x1, y1) = p[k + 1];
        let h = x1 - x0;
        let t = (x - x0) / h;
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        h00 * y0 + h10 * h * self.tangents[k] + h01 * y1 + h11 * h * self.tangents[k + 1]
    }
}

impl PartialEq for CubicCurve {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points
    }
}

impl From<Vec<(f32, f32)>> for CubicCurve {
    fn from(points: Vec<(f32, f32)>) -> Self {
        Self::new(points)
    }
}

impl From<CubicCurve> for Vec<(f32, f32)> {
    fn from(curve: CubicCurve) -> Self {
        curve.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_curve() {
        let mut curve = CubicCurve::linear();
        assert_relative_eq!(curve.value_at(0.0), 0.0);
        assert_relative_eq!(curve.value_at(0.5), 0.5, epsilon = 1e-5);
        assert_relative_eq!(curve.value_at(1.0), 1.0);
        assert_relative_eq!(curve.value_at(2.0), 1.0);
        assert_relative_eq!(curve.value_at(-1.0), 0.0);
    }

    #[test]
    fn test_passes_through_points() {
        let mut curve = CubicCurve::new(vec![(0.0, 0.0), (0.3, 0.8), (1.0, 1.0)]);
        assert_relative_eq!(curve.evaluate(0.3), 0.8, epsilon = 1e-6);
        assert_relative_eq!(curve.value_at(0.3), 0.8, epsilon = 1e-2);
    }

    #[test]
    fn test_monotone_without_overshoot() {
        let mut curve = CubicCurve::new(vec![(0.0, 0.0), (0.1, 0.9), (0.2, 1.0), (1.0, 1.0)]);
        let mut prev = 0.0;
        for i in 0..=1000 {
            let v = curve.evaluate(i as f32 / 1000.0);
            assert!(v >= prev - 1e-6, "not monotone at {i}");
            assert!(v <= 1.0 + 1e-6, "overshoot at {i}: {v}");
            prev = v;
        }
    }

    #[test]
    fn test_table_rebuilt_after_change() {
        let mut curve = CubicCurve::linear();
        curve.value_at(0.5);
        assert!(!curve.is_dirty());

        curve.set_points(vec![(0.0, 1.0), (1.0, 0.0)]);
        assert!(curve.is_dirty());
        assert_relative_eq!(curve.value_at(0.25), 0.75, epsilon = 1e-5);
        assert!(!curve.is_dirty());
    }

    #[test]
    fn test_degenerate_curves() {
        assert_eq!(CubicCurve::new(Vec::new()).value_at(0.3), 1.0);
        assert_eq!(CubicCurve::new(vec![(0.5, 0.25)]).value_at(0.9), 0.25);

        let curve = CubicCurve::new(vec![(1.0, 1.0), (0.0, 0.0), (1.0, 0.5)]);
        assert_eq!(curve.points(), &[(0.0, 0.0), (1.0, 0.5)]);
    }

    #[test]
    fn test_serde_keeps_points() {
        let curve = CubicCurve::new(vec![(0.0, 0.0), (0.5, 0.7), (1.0, 1.0)]);
        let json = serde_json::to_string(&curve).unwrap();
        let back: CubicCurve = serde_json::from_str(&json).unwrap();
        assert_eq!(back, curve);
    }
}
