//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution environments so that
//! the sweep code in `lucent-core` stays device-agnostic. A backend only has
//! to know how to fill a `(rows, cols, channels)` block of `f64` cells, each
//! cell produced independently by a caller-supplied closure.

use ndarray::Array3;
use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Device error: {0}")]
    DeviceError(String),

    /// A cell closure reported a failure. The whole fill is abandoned.
    #[error("Cell ({row}, {col}) failed: {message}")]
    CellFailed {
        row: usize,
        col: usize,
        message: String,
    },
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Cpu,
}

/// Per-cell fill function: receives `(row, col)` and the `channels`-long
/// output slot for that cell.
///
/// Returning `Err(message)` aborts the fill with [`ComputeError::CellFailed`].
pub type CellFn<'a> = dyn Fn(usize, usize, &mut [f64]) -> Result<(), String> + Send + Sync + 'a;

/// Abstraction over compute backends.
///
/// Implementations must call `fill_fn` exactly once per cell and must never
/// hand the same output slot to two invocations.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Fill a `(rows, cols, channels)` array cell by cell.
    ///
    /// This is the entry point for parameter sweeps: every `(row, col)` node
    /// is independent, so the order of evaluation is unspecified.
    fn parallel_grid_fill(
        &self,
        rows: usize,
        cols: usize,
        channels: usize,
        fill_fn: &CellFn<'_>,
    ) -> Result<Array3<f64>, ComputeError>;
}
