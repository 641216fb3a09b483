//! Grid upsampling by separable spline interpolation.
//!
//! A grid with `L` samples along an axis is upsampled to `f·L` samples whose
//! index coordinates are `i·(L−1)/(f·L−1)`. The first and last samples
//! therefore coincide with the original end points: extents are preserved and
//! nothing is extrapolated. Values and axis coordinates go through the same
//! index-space resampling, so interpolated grids stay consistent with their
//! axes.

use ndarray::{Array2, Axis};
use thiserror::Error;

use crate::spline::{linear_on_index_knots, resample, CubicSpline, SplineOrder};
use crate::types::{DataError, Grid};

/// Errors from grid interpolation.
#[derive(Debug, Error)]
pub enum InterpolationError {
    #[error("Upsampling factor must be at least 1, got {0}")]
    InvalidFactor(usize),

    #[error("Point (n = {n}, k = {k}) lies outside the grid extents")]
    OutOfBounds { n: f64, k: f64 },

    #[error(transparent)]
    Grid(#[from] DataError),
}

/// Index coordinates of `factor·len` samples spanning `0..=len−1`.
pub fn upsampled_index_coordinates(len: usize, factor: usize) -> Vec<f64> {
    let out = len * factor;
    if out <= 1 || len <= 1 {
        return vec![0.0; out];
    }
    let scale = (len - 1) as f64 / (out - 1) as f64;
    (0..out)
        .map(|i| if i == out - 1 { (len - 1) as f64 } else { i as f64 * scale })
        .collect()
}

/// Upsample an axis coordinate sequence.
pub fn upsample_axis(axis: &[f64], factor: usize, order: SplineOrder) -> Vec<f64> {
    let targets = upsampled_index_coordinates(axis.len(), factor);
    let mut out = resample(axis, &targets, order);
    // Pin the end points so extents survive rounding.
    if let (Some(dst), Some(src)) = (out.first_mut(), axis.first()) {
        *dst = *src;
    }
    if let (Some(dst), Some(src)) = (out.last_mut(), axis.last()) {
        *dst = *src;
    }
    out
}

/// Upsample a grid by an integer factor along both axes.
///
/// `factor == 1` returns an identical copy.
pub fn upsample(grid: &Grid, factor: usize, order: SplineOrder) -> Result<Grid, InterpolationError> {
    if factor == 0 {
        return Err(InterpolationError::InvalidFactor(factor));
    }
    if factor == 1 {
        return Ok(grid.clone());
    }

    let (rows, cols) = grid.shape();
    let col_targets = upsampled_index_coordinates(cols, factor);
    let row_targets = upsampled_index_coordinates(rows, factor);

    // Along n (within each row) first, then along k (within each column).
    let mut wide = Array2::<f64>::zeros((rows, col_targets.len()));
    for (src, mut dst) in grid.values().axis_iter(Axis(0)).zip(wide.axis_iter_mut(Axis(0))) {
        let line = src.to_vec();
        for (d, v) in dst.iter_mut().zip(resample(&line, &col_targets, order)) {
            *d = v;
        }
    }

    let mut fine = Array2::<f64>::zeros((row_targets.len(), col_targets.len()));
    for (src, mut dst) in wide.axis_iter(Axis(1)).zip(fine.axis_iter_mut(Axis(1))) {
        let line = src.to_vec();
        for (d, v) in dst.iter_mut().zip(resample(&line, &row_targets, order)) {
            *d = v;
        }
    }

    let n_axis = upsample_axis(grid.n_axis(), factor, order);
    let k_axis = upsample_axis(grid.k_axis(), factor, order);
    log::debug!(
        "Upsampled grid {}x{} -> {}x{} ({:?})",
        rows,
        cols,
        k_axis.len(),
        n_axis.len(),
        order
    );
    Ok(Grid::new(n_axis, k_axis, fine)?)
}

/// The interpolant of a grid, evaluable at arbitrary in-bounds coordinates.
///
/// Coordinates are mapped to index space by piecewise-linear inversion of
/// each axis, which is exact for evenly spaced axes.
pub struct SplineSurface {
    grid: Grid,
    order: SplineOrder,
    row_splines: Vec<CubicSpline>,
}

impl SplineSurface {
    pub fn new(grid: &Grid, order: SplineOrder) -> Self {
        let row_splines = match order {
            SplineOrder::Cubic => grid
                .values()
                .axis_iter(Axis(0))
                .map(|row| CubicSpline::on_index_knots(&row.to_vec()))
                .collect(),
            SplineOrder::Linear => Vec::new(),
        };
        Self {
            grid: grid.clone(),
            order,
            row_splines,
        }
    }

    /// Interpolated value at `(n, k)`.
    pub fn evaluate(&self, n: f64, k: f64) -> Result<f64, InterpolationError> {
        let (tc, tr) = match (index_of(self.grid.n_axis(), n), index_of(self.grid.k_axis(), k)) {
            (Some(tc), Some(tr)) => (tc, tr),
            _ => return Err(InterpolationError::OutOfBounds { n, k }),
        };

        let column: Vec<f64> = match self.order {
            SplineOrder::Cubic => self.row_splines.iter().map(|s| s.evaluate(tc)).collect(),
            SplineOrder::Linear => self
                .grid
                .values()
                .axis_iter(Axis(0))
                .map(|row| linear_on_index_knots(&row.to_vec(), tc))
                .collect(),
        };

        Ok(match self.order {
            SplineOrder::Cubic => CubicSpline::on_index_knots(&column).evaluate(tr),
            SplineOrder::Linear => linear_on_index_knots(&column, tr),
        })
    }
}

/// Fractional index of `x` on a strictly monotonic axis, or `None` outside it.
fn index_of(axis: &[f64], x: f64) -> Option<f64> {
    let last = axis.len() - 1;
    let (lo_v, hi_v) = (axis[0].min(axis[last]), axis[0].max(axis[last]));
    if !(x >= lo_v && x <= hi_v) {
        return None;
    }
    let increasing = axis[last] > axis[0];
    // First index whose coordinate is past x in the axis direction.
    let hi = axis
        .partition_point(|&v| if increasing { v < x } else { v > x })
        .clamp(1, last);
    let lo = hi - 1;
    let frac = (x - axis[lo]) / (axis[hi] - axis[lo]);
    Some(lo as f64 + frac)
}
