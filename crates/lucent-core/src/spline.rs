//! One-dimensional splines used by grid interpolation.
//!
//! Grids are resampled in index space: a line of `L` samples is treated as a
//! function on the knots `0, 1, …, L−1`, so the same machinery resamples
//! value rows, value columns and the axis coordinates themselves.

use serde::{Deserialize, Serialize};

/// Polynomial order of the interpolating spline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplineOrder {
    /// Piecewise linear (order 1).
    Linear,
    /// Natural cubic spline (order 3).
    #[default]
    Cubic,
}

/// A natural cubic spline interpolator for real-valued data.
///
/// Given $n$ data points $(x_i, y_i)$, constructs piecewise cubic polynomials
/// with continuous first and second derivatives and zero curvature at the
/// ends. Linear data is reproduced exactly.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    /// Sorted x values (knots).
    xs: Vec<f64>,
    /// Corresponding y values.
    ys: Vec<f64>,
    /// Second derivatives at each knot (computed during construction).
    y2s: Vec<f64>,
}

impl CubicSpline {
    /// Construct a natural cubic spline from data points.
    ///
    /// # Panics
    /// Panics if `xs` and `ys` have different lengths, or if `xs` is not
    /// strictly increasing, or if fewer than 2 points are provided.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Self {
        assert_eq!(xs.len(), ys.len(), "xs and ys must have equal length");
        assert!(xs.len() >= 2, "Need at least 2 data points");
        for i in 1..xs.len() {
            assert!(
                xs[i] > xs[i - 1],
                "xs must be strictly increasing at index {}",
                i
            );
        }

        let n = xs.len();
        let mut y2s = vec![0.0; n];
        let mut u = vec![0.0; n - 1];

        // Forward sweep of the tridiagonal system
        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            let p = sig * y2s[i - 1] + 2.0;
            y2s[i] = (sig - 1.0) / p;
            u[i] = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
                - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
            u[i] = (6.0 * u[i] / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
        }

        // Back substitution
        for k in (0..n - 2).rev() {
            y2s[k + 1] = y2s[k + 1] * y2s[k + 2] + u[k + 1];
        }

        Self { xs, ys, y2s }
    }

    /// Spline through `ys` on the integer knots `0..ys.len()`.
    pub fn on_index_knots(ys: &[f64]) -> Self {
        let xs = (0..ys.len()).map(|i| i as f64).collect();
        Self::new(xs, ys.to_vec())
    }

    /// Evaluate the spline at a given x value.
    ///
    /// Callers keep `x` inside the knot range; outside it the boundary
    /// polynomial is extended.
    pub fn evaluate(&self, x: f64) -> f64 {
        let (lo, hi) = bracket(&self.xs, x);

        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;

        a * self.ys[lo]
            + b * self.ys[hi]
            + ((a * a * a - a) * self.y2s[lo] + (b * b * b - b) * self.y2s[hi]) * h * h / 6.0
    }
}

/// Indices `(lo, lo + 1)` of the knot interval containing `x`.
fn bracket(xs: &[f64], x: f64) -> (usize, usize) {
    let mut lo = 0;
    let mut hi = xs.len() - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if xs[mid] > x {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    (lo, hi)
}

/// Linear interpolation of `ys` on integer knots at index coordinate `t`.
pub fn linear_on_index_knots(ys: &[f64], t: f64) -> f64 {
    let last = ys.len() - 1;
    let t = t.clamp(0.0, last as f64);
    let lo = (t.floor() as usize).min(last.saturating_sub(1));
    let frac = t - lo as f64;
    ys[lo] + frac * (ys[lo + 1] - ys[lo])
}

/// Resample a line of samples at the given index coordinates.
pub fn resample(ys: &[f64], targets: &[f64], order: SplineOrder) -> Vec<f64> {
    match order {
        SplineOrder::Linear => targets.iter().map(|&t| linear_on_index_knots(ys, t)).collect(),
        SplineOrder::Cubic => {
            let spline = CubicSpline::on_index_knots(ys);
            targets.iter().map(|&t| spline.evaluate(t)).collect()
        }
    }
}
