//! Efficiency sweeps over the complex refractive-index plane.
//!
//! [`GridEvaluator`] evaluates a [`ScatteringModel`] at every node of an
//! `(n, k)` grid for a fixed wavelength and diameter and returns the Qsca,
//! Qabs and Qback grids. Nodes are independent and are filled in parallel by
//! a [`ComputeBackend`]; any failing or non-finite node fails the whole sweep.

use std::sync::Arc;
use std::time::Instant;

use lucent_compute::{ComputeBackend, ComputeError, CpuBackend};
use ndarray::s;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interpolate::{upsample, InterpolationError};
use crate::model::ScatteringModel;
use crate::spline::SplineOrder;
use crate::types::{linspace, DataError, Grid};

/// Errors that can occur during a sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Invalid sweep configuration: {0}")]
    InvalidConfig(String),

    #[error("Model evaluation failed at m = {n} + {k}i: {reason}")]
    ModelEvaluation { n: f64, k: f64, reason: String },

    #[error("Compute backend error: {0}")]
    Compute(ComputeError),

    #[error(transparent)]
    Grid(#[from] DataError),
}

/// An evenly sampled closed interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
    pub points: usize,
}

impl AxisRange {
    pub fn new(min: f64, max: f64, points: usize) -> Self {
        Self { min, max, points }
    }

    pub fn coordinates(&self) -> Vec<f64> {
        linspace(self.min, self.max, self.points)
    }

    fn validate(&self, name: &str) -> Result<(), SweepError> {
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(SweepError::InvalidConfig(format!("{} range must be finite", name)));
        }
        if self.max <= self.min {
            return Err(SweepError::InvalidConfig(format!(
                "{}_max ({}) must exceed {}_min ({})",
                name, self.max, name, self.min
            )));
        }
        if self.points < 2 {
            return Err(SweepError::InvalidConfig(format!(
                "{} axis needs at least 2 points, got {}",
                name, self.points
            )));
        }
        Ok(())
    }
}

/// Parameters of an efficiency sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Incident wavelength (nm).
    pub wavelength_nm: f64,
    /// Particle diameter (nm).
    pub diameter_nm: f64,
    /// Real part of the refractive index.
    pub n_axis: AxisRange,
    /// Imaginary part of the refractive index.
    pub k_axis: AxisRange,
}

impl SweepConfig {
    /// A square `points × points` sweep.
    pub fn square(
        wavelength_nm: f64,
        diameter_nm: f64,
        n_range: (f64, f64),
        k_range: (f64, f64),
        points: usize,
    ) -> Self {
        Self {
            wavelength_nm,
            diameter_nm,
            n_axis: AxisRange::new(n_range.0, n_range.1, points),
            k_axis: AxisRange::new(k_range.0, k_range.1, points),
        }
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        if !(self.wavelength_nm.is_finite() && self.wavelength_nm > 0.0) {
            return Err(SweepError::InvalidConfig(format!(
                "wavelength must be positive, got {}",
                self.wavelength_nm
            )));
        }
        if !(self.diameter_nm.is_finite() && self.diameter_nm > 0.0) {
            return Err(SweepError::InvalidConfig(format!(
                "diameter must be positive, got {}",
                self.diameter_nm
            )));
        }
        self.n_axis.validate("n")?;
        self.k_axis.validate("k")?;
        if self.k_axis.min < 0.0 {
            return Err(SweepError::InvalidConfig(format!(
                "k_min must be non-negative, got {}",
                self.k_axis.min
            )));
        }
        Ok(())
    }
}

/// The three efficiency grids of one sweep, on shared axes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyGrids {
    pub qsca: Grid,
    pub qabs: Grid,
    pub qback: Grid,
}

impl EfficiencyGrids {
    /// Upsample all three grids.
    pub fn upsample(&self, factor: usize, order: SplineOrder) -> Result<Self, InterpolationError> {
        Ok(Self {
            qsca: upsample(&self.qsca, factor, order)?,
            qabs: upsample(&self.qabs, factor, order)?,
            qback: upsample(&self.qback, factor, order)?,
        })
    }

    /// `(label, grid)` pairs in Qsca, Qabs, Qback order.
    pub fn labelled(&self) -> [(&'static str, &Grid); 3] {
        [("Qsca", &self.qsca), ("Qabs", &self.qabs), ("Qback", &self.qback)]
    }
}

/// Evaluates a scattering model over an `(n, k)` grid.
pub struct GridEvaluator {
    pub model: Arc<dyn ScatteringModel>,
    pub backend: Arc<dyn ComputeBackend>,
}

impl GridEvaluator {
    /// Evaluator on the default CPU backend.
    pub fn new(model: Arc<dyn ScatteringModel>) -> Self {
        Self {
            model,
            backend: Arc::new(CpuBackend::new()),
        }
    }

    pub fn with_backend(model: Arc<dyn ScatteringModel>, backend: Arc<dyn ComputeBackend>) -> Self {
        Self { model, backend }
    }

    /// Sweep the grid described by `config`.
    ///
    /// # Errors
    /// [`SweepError::InvalidConfig`] for an invalid configuration and
    /// [`SweepError::ModelEvaluation`] if the model fails or returns a
    /// non-finite efficiency at any node. No partial grids are returned.
    pub fn evaluate(&self, config: &SweepConfig) -> Result<EfficiencyGrids, SweepError> {
        config.validate()?;

        let n_axis = config.n_axis.coordinates();
        let k_axis = config.k_axis.coordinates();
        let rows = k_axis.len();
        let cols = n_axis.len();

        log::info!(
            "Sweeping {}x{} grid with {} on {} (λ = {} nm, d = {} nm)",
            rows,
            cols,
            self.model.name(),
            self.backend.device_info().name,
            config.wavelength_nm,
            config.diameter_nm
        );
        let start = Instant::now();

        let model = self.model.as_ref();
        let fill = |row: usize, col: usize, slot: &mut [f64]| -> Result<(), String> {
            let m = Complex64::new(n_axis[col], k_axis[row]);
            let q = model
                .efficiencies(m, config.wavelength_nm, config.diameter_nm)
                .map_err(|e| e.to_string())?;
            let triple = q.triple();
            if let Some(bad) = triple.iter().find(|v| !v.is_finite()) {
                return Err(format!("model returned non-finite efficiency {}", bad));
            }
            slot.copy_from_slice(&triple);
            Ok(())
        };

        let cells = self
            .backend
            .parallel_grid_fill(rows, cols, 3, &fill)
            .map_err(|e| match e {
                ComputeError::CellFailed { row, col, message } => SweepError::ModelEvaluation {
                    n: n_axis[col],
                    k: k_axis[row],
                    reason: message,
                },
                other => SweepError::Compute(other),
            })?;

        let grid = |channel: usize| {
            Grid::new(
                n_axis.clone(),
                k_axis.clone(),
                cells.slice(s![.., .., channel]).to_owned(),
            )
        };
        let grids = EfficiencyGrids {
            qsca: grid(0)?,
            qabs: grid(1)?,
            qback: grid(2)?,
        };

        log::debug!("Sweep finished in {:.2?}", start.elapsed());
        Ok(grids)
    }
}
