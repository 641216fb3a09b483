//! CPU compute backend using Rayon for shared-memory parallelism.

use ndarray::Array3;
use rayon::prelude::*;

use crate::backend::{BackendType, CellFn, ComputeBackend, ComputeError, DeviceInfo};

/// CPU backend that parallelises work across threads via Rayon.
///
/// By default work runs on the global Rayon pool. [`CpuBackend::with_threads`]
/// builds a dedicated pool instead.
pub struct CpuBackend {
    num_threads: usize,
    pool: Option<rayon::ThreadPool>,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
        }
    }

    /// Create a CPU backend with a dedicated pool of `num_threads` threads.
    ///
    /// `num_threads == 0` falls back to the global pool.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        if num_threads == 0 {
            return Ok(Self::new());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| ComputeError::Unavailable(e.to_string()))?;
        Ok(Self {
            num_threads,
            pool: Some(pool),
        })
    }

    fn fill(
        rows: usize,
        cols: usize,
        channels: usize,
        fill_fn: &CellFn<'_>,
    ) -> Result<Vec<f64>, ComputeError> {
        let mut data = vec![0.0; rows * cols * channels];
        if channels == 0 {
            return Ok(data);
        }

        data.par_chunks_mut(channels)
            .enumerate()
            .try_for_each(|(idx, slot)| {
                let row = idx / cols;
                let col = idx % cols;
                fill_fn(row, col, slot).map_err(|message| ComputeError::CellFailed {
                    row,
                    col,
                    message,
                })
            })?;

        Ok(data)
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            compute_units: Some(self.num_threads),
        }
    }

    fn parallel_grid_fill(
        &self,
        rows: usize,
        cols: usize,
        channels: usize,
        fill_fn: &CellFn<'_>,
    ) -> Result<Array3<f64>, ComputeError> {
        log::trace!(
            "CPU grid fill: {}x{}x{} on {} threads",
            rows,
            cols,
            channels,
            self.num_threads
        );

        let data = match &self.pool {
            Some(pool) => pool.install(|| Self::fill(rows, cols, channels, fill_fn))?,
            None => Self::fill(rows, cols, channels, fill_fn)?,
        };

        Array3::from_shape_vec((rows, cols, channels), data)
            .map_err(|e| ComputeError::DeviceError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_writes_every_cell_in_row_major_layout() {
        let backend = CpuBackend::new();
        let out = backend
            .parallel_grid_fill(3, 4, 2, &|i, j, slot| {
                slot[0] = i as f64;
                slot[1] = j as f64;
                Ok(())
            })
            .unwrap();

        assert_eq!(out.dim(), (3, 4, 2));
        for i in 0..3 {
            for j in 0..4 {
                assert_eq!(out[[i, j, 0]], i as f64);
                assert_eq!(out[[i, j, 1]], j as f64);
            }
        }
    }

    #[test]
    fn test_failed_cell_aborts_fill() {
        let backend = CpuBackend::with_threads(2).unwrap();
        let result = backend.parallel_grid_fill(5, 5, 1, &|i, j, slot| {
            if i == 2 && j == 3 {
                return Err("bad cell".into());
            }
            slot[0] = 1.0;
            Ok(())
        });

        match result {
            Err(ComputeError::CellFailed { row, col, message }) => {
                assert_eq!((row, col), (2, 3));
                assert_eq!(message, "bad cell");
            }
            other => panic!("expected CellFailed, got {:?}", other.map(|a| a.dim())),
        }
    }

    #[test]
    fn test_dedicated_pool_reports_thread_count() {
        let backend = CpuBackend::with_threads(3).unwrap();
        let info = backend.device_info();
        assert_eq!(info.backend_type, BackendType::Cpu);
        assert_eq!(info.compute_units, Some(3));
    }
}
