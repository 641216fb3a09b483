//! Core types shared across the Lucent toolkit.
//!
//! This module defines the data model the numerical pipeline passes around:
//! sampled grids over the complex refractive-index plane, measured target
//! bands, and sampled 1D curves.

use ndarray::Array2;
use serde::Serialize;
use thiserror::Error;

/// Violations of the data-model invariants.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Invalid axis '{axis}': {reason}")]
    InvalidAxis { axis: &'static str, reason: String },

    #[error("Grid shape {actual:?} does not match axis lengths {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Grid value at ({row}, {col}) is not finite")]
    NonFiniteValue { row: usize, col: usize },

    #[error("Invalid target band: {0}")]
    InvalidBand(String),

    #[error("Invalid curve: {0}")]
    InvalidCurve(String),
}

/// `count` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count)
                .map(|i| if i == count - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// `count` logarithmically spaced values from `start` to `end` inclusive.
///
/// Both bounds must be positive.
pub fn logspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    linspace(start.ln(), end.ln(), count)
        .into_iter()
        .map(f64::exp)
        .collect()
}

fn check_axis(axis: &'static str, values: &[f64]) -> Result<(), DataError> {
    if values.len() < 2 {
        return Err(DataError::InvalidAxis {
            axis,
            reason: format!("need at least 2 points, got {}", values.len()),
        });
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(DataError::InvalidAxis {
            axis,
            reason: format!("value at index {} is not finite", i),
        });
    }
    let increasing = values[1] > values[0];
    for i in 1..values.len() {
        let ok = if increasing {
            values[i] > values[i - 1]
        } else {
            values[i] < values[i - 1]
        };
        if !ok {
            return Err(DataError::InvalidAxis {
                axis,
                reason: format!("not strictly monotonic at index {}", i),
            });
        }
    }
    Ok(())
}

/// A scalar field sampled over the (n, k) refractive-index plane.
///
/// Columns follow the real-index axis `n`, rows the imaginary-index axis `k`,
/// so `values[[row, col]]` is the sample at `n_axis[col] + i·k_axis[row]`.
/// Both axes are strictly monotonic and every value is finite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grid {
    n_axis: Vec<f64>,
    k_axis: Vec<f64>,
    values: Array2<f64>,
}

impl Grid {
    /// Build a grid, checking the axis and shape invariants.
    pub fn new(n_axis: Vec<f64>, k_axis: Vec<f64>, values: Array2<f64>) -> Result<Self, DataError> {
        check_axis("n", &n_axis)?;
        check_axis("k", &k_axis)?;

        let expected = (k_axis.len(), n_axis.len());
        if values.dim() != expected {
            return Err(DataError::ShapeMismatch {
                expected,
                actual: values.dim(),
            });
        }
        if let Some(((row, col), _)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(DataError::NonFiniteValue { row, col });
        }

        Ok(Self {
            n_axis,
            k_axis,
            values,
        })
    }

    /// Sample `f(n, k)` at every node of the given axes.
    pub fn from_fn(
        n_axis: Vec<f64>,
        k_axis: Vec<f64>,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, DataError> {
        let values = Array2::from_shape_fn((k_axis.len(), n_axis.len()), |(row, col)| {
            f(n_axis[col], k_axis[row])
        });
        Self::new(n_axis, k_axis, values)
    }

    pub fn n_axis(&self) -> &[f64] {
        &self.n_axis
    }

    pub fn k_axis(&self) -> &[f64] {
        &self.k_axis
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// `(rows, cols)`, i.e. `(k_axis.len(), n_axis.len())`.
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// The `(n, k)` coordinate of a node.
    pub fn coordinate(&self, row: usize, col: usize) -> (f64, f64) {
        (self.n_axis[col], self.k_axis[row])
    }

    /// Whether `other` is sampled on exactly the same axes.
    pub fn same_axes(&self, other: &Grid) -> bool {
        self.n_axis == other.n_axis && self.k_axis == other.k_axis
    }

    /// Mean node spacing `(dn, dk)` along each axis.
    pub fn resolution(&self) -> (f64, f64) {
        let span = |axis: &[f64]| (axis[axis.len() - 1] - axis[0]).abs() / (axis.len() - 1) as f64;
        (span(&self.n_axis), span(&self.k_axis))
    }

    /// Minimum and maximum sample value.
    pub fn value_range(&self) -> (f64, f64) {
        self.values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}

/// A measured value with a relative tolerance.
///
/// The acceptance interval is `[value·(1−tol), value·(1+tol)]`, reordered so
/// that `lower() <= upper()` when `value` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetBand {
    value: f64,
    tolerance: f64,
}

impl TargetBand {
    pub fn new(value: f64, tolerance: f64) -> Result<Self, DataError> {
        if !value.is_finite() {
            return Err(DataError::InvalidBand(format!("value {} is not finite", value)));
        }
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(DataError::InvalidBand(format!(
                "tolerance must be finite and non-negative, got {}",
                tolerance
            )));
        }
        Ok(Self { value, tolerance })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn lower(&self) -> f64 {
        let a = self.value * (1.0 - self.tolerance);
        let b = self.value * (1.0 + self.tolerance);
        a.min(b)
    }

    pub fn upper(&self) -> f64 {
        let a = self.value * (1.0 - self.tolerance);
        let b = self.value * (1.0 + self.tolerance);
        a.max(b)
    }

    /// Whether `v` lies inside the closed acceptance interval.
    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower() && v <= self.upper()
    }

    /// Relative deviation of `v` from the target value.
    ///
    /// Falls back to the absolute deviation when the target is zero.
    pub fn misfit(&self, v: f64) -> f64 {
        if self.value == 0.0 {
            v.abs()
        } else {
            ((v - self.value) / self.value).abs()
        }
    }
}

/// A sampled 1D function with strictly increasing abscissa.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Curve {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Curve {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, DataError> {
        if x.len() != y.len() {
            return Err(DataError::InvalidCurve(format!(
                "x has {} samples but y has {}",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(DataError::InvalidCurve(format!(
                "need at least 2 samples, got {}",
                x.len()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(DataError::InvalidCurve("samples must be finite".into()));
        }
        if let Some(i) = (1..x.len()).find(|&i| x[i] <= x[i - 1]) {
            return Err(DataError::InvalidCurve(format!(
                "x must be strictly increasing (index {})",
                i
            )));
        }
        Ok(Self { x, y })
    }

    pub fn from_points(points: &[(f64, f64)]) -> Result<Self, DataError> {
        let (x, y): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
        Self::new(x, y)
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Domain `(x_first, x_last)`.
    pub fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }
}
