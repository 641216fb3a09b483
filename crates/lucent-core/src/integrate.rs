//! Trapezoidal integration of sampled curves.
//!
//! Integrals are taken over the existing samples only; nothing is resampled
//! or interpolated at the range end points. A coordinate range therefore
//! integrates between the first and last samples that fall inside it.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Curve;

/// Errors from sub-range integration.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Invalid integration range: {0}")]
    InvalidRange(String),
}

/// The part of a [`Curve`] to integrate over.
#[derive(Debug, Clone, PartialEq)]
pub enum SubRange {
    /// Half-open sample index range, as in slice indexing.
    Indices(Range<usize>),
    /// Closed abscissa interval `[start, end]`.
    Coordinates { start: f64, end: f64 },
}

/// Trapezoidal rule over paired samples.
///
/// Slices of unequal length are integrated over their common prefix.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]))
        .sum()
}

/// Quadrature weights such that `Σ wᵢ·yᵢ` equals [`trapezoid`]`(x, y)`.
pub fn trapezoid_weights(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mut w = vec![0.0; n];
    for i in 0..n - 1 {
        let half = 0.5 * (x[i + 1] - x[i]);
        w[i] += half;
        w[i + 1] += half;
    }
    w
}

/// Integrate a curve over a sub-range of its samples.
///
/// # Errors
/// [`IntegrationError::InvalidRange`] if the range is empty or reversed,
/// lies outside the curve's domain, or selects fewer than two samples.
pub fn integrate(curve: &Curve, range: &SubRange) -> Result<f64, IntegrationError> {
    let samples = select(curve, range)?;
    Ok(trapezoid(&curve.x()[samples.clone()], &curve.y()[samples]))
}

/// Integrate over the whole curve.
pub fn integrate_full(curve: &Curve) -> f64 {
    trapezoid(curve.x(), curve.y())
}

/// A named angular acceptance window of a detector, in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorWindow {
    pub name: String,
    pub start_deg: f64,
    pub end_deg: f64,
}

/// The integrated intensity seen through a [`DetectorWindow`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowIntensity {
    pub name: String,
    pub start_deg: f64,
    pub end_deg: f64,
    pub intensity: f64,
}

impl DetectorWindow {
    pub fn new(name: impl Into<String>, start_deg: f64, end_deg: f64) -> Self {
        Self {
            name: name.into(),
            start_deg,
            end_deg,
        }
    }

    /// The window as a coordinate range on a θ (radian) abscissa.
    pub fn range(&self) -> SubRange {
        SubRange::Coordinates {
            start: self.start_deg.to_radians(),
            end: self.end_deg.to_radians(),
        }
    }

    /// Integrate an intensity curve over θ (radians) within the window.
    pub fn integrate(&self, curve: &Curve) -> Result<WindowIntensity, IntegrationError> {
        let intensity = integrate(curve, &self.range())?;
        Ok(WindowIntensity {
            name: self.name.clone(),
            start_deg: self.start_deg,
            end_deg: self.end_deg,
            intensity,
        })
    }
}

fn select(curve: &Curve, range: &SubRange) -> Result<Range<usize>, IntegrationError> {
    let len = curve.len();
    let samples = match range {
        SubRange::Indices(r) => {
            if r.start >= r.end {
                return Err(IntegrationError::InvalidRange(format!(
                    "start index {} is not before end index {}",
                    r.start, r.end
                )));
            }
            if r.end > len {
                return Err(IntegrationError::InvalidRange(format!(
                    "end index {} exceeds curve length {}",
                    r.end, len
                )));
            }
            r.clone()
        }
        SubRange::Coordinates { start, end } => {
            if !(start < end) {
                return Err(IntegrationError::InvalidRange(format!(
                    "start {} is not below end {}",
                    start, end
                )));
            }
            let (lo, hi) = curve.domain();
            if *start < lo || *end > hi {
                return Err(IntegrationError::InvalidRange(format!(
                    "[{}, {}] lies outside the curve domain [{}, {}]",
                    start, end, lo, hi
                )));
            }
            let x = curve.x();
            let first = x.partition_point(|&v| v < *start);
            let last = x.partition_point(|&v| v <= *end);
            first..last
        }
    };

    if samples.len() < 2 {
        return Err(IntegrationError::InvalidRange(format!(
            "range selects {} sample(s); at least 2 are needed",
            samples.len()
        )));
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle() -> Curve {
        Curve::from_points(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]).unwrap()
    }

    #[test]
    fn test_triangle_area() {
        let c = triangle();
        let area = integrate(&c, &SubRange::Coordinates { start: 0.0, end: 2.0 }).unwrap();
        assert_relative_eq!(area, 1.0, epsilon = 1e-12);

        let by_index = integrate(&c, &SubRange::Indices(0..3)).unwrap();
        assert_relative_eq!(by_index, 1.0, epsilon = 1e-12);
        assert_relative_eq!(integrate_full(&c), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reversed_or_empty_range_is_rejected() {
        let c = triangle();
        for range in [
            SubRange::Coordinates { start: 1.5, end: 0.5 },
            SubRange::Coordinates { start: 1.0, end: 1.0 },
            SubRange::Indices(2..2),
            SubRange::Indices(2..1),
        ] {
            assert!(
                matches!(integrate(&c, &range), Err(IntegrationError::InvalidRange(_))),
                "{:?} should be rejected",
                range
            );
        }
    }

    #[test]
    fn test_range_outside_domain_is_rejected() {
        let c = triangle();
        assert!(integrate(&c, &SubRange::Coordinates { start: -0.5, end: 1.0 }).is_err());
        assert!(integrate(&c, &SubRange::Coordinates { start: 1.0, end: 2.5 }).is_err());
        assert!(integrate(&c, &SubRange::Indices(1..4)).is_err());
    }

    #[test]
    fn test_single_sample_selection_is_rejected() {
        let c = triangle();
        // Only x = 1.0 falls in [0.5, 1.5].
        assert!(integrate(&c, &SubRange::Coordinates { start: 0.5, end: 1.5 }).is_err());
        assert!(integrate(&c, &SubRange::Indices(1..2)).is_err());
    }

    #[test]
    fn test_sub_range_uses_existing_samples_only() {
        let x: Vec<f64> = (0..=10).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let c = Curve::new(x, y).unwrap();

        // Samples 0.3..=0.7 are selected; the integral of 2x between them is 0.4.
        let area = integrate(&c, &SubRange::Coordinates { start: 0.25, end: 0.75 }).unwrap();
        assert_relative_eq!(area, 0.4, epsilon = 1e-12);

        let sliced = integrate(&c, &SubRange::Indices(3..8)).unwrap();
        assert_relative_eq!(sliced, area, epsilon = 1e-12);
    }

    #[test]
    fn test_weights_reproduce_trapezoid() {
        let x = [0.0, 0.5, 2.0, 2.5];
        let y = [1.0, 3.0, -1.0, 4.0];
        let w = trapezoid_weights(&x);
        let weighted: f64 = w.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
        assert_relative_eq!(weighted, trapezoid(&x, &y), epsilon = 1e-12);
    }

    #[test]
    fn test_detector_window_in_degrees() {
        let theta: Vec<f64> = (0..=180).map(|d| (d as f64).to_radians()).collect();
        let ones = vec![1.0; theta.len()];
        let c = Curve::new(theta, ones).unwrap();

        let window = DetectorWindow::new("side", 80.0, 100.0);
        let result = window.integrate(&c).unwrap();
        assert_eq!(result.name, "side");
        assert_relative_eq!(result.intensity, 20f64.to_radians(), max_relative = 1e-9);

        let outside = DetectorWindow::new("bad", 170.0, 190.0);
        assert!(outside.integrate(&c).is_err());
    }
}
