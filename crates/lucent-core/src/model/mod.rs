//! Scattering model abstraction.
//!
//! The [`ScatteringModel`] trait is the only route by which the rest of the
//! toolkit reaches electromagnetic physics. Sweeps, inversions and angular
//! analyses are written against the trait; [`LorenzMie`] is the bundled
//! implementation for homogeneous spheres.

pub mod distribution;
pub mod mie;

pub use mie::LorenzMie;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::integrate::trapezoid;
use crate::types::{linspace, Curve, DataError};

/// Errors that can occur while evaluating a scattering model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid model input: {0}")]
    InvalidInput(String),

    #[error("Non-finite {quantity} for m = {m}, λ = {wavelength_nm} nm, d = {diameter_nm} nm")]
    NonFinite {
        quantity: &'static str,
        m: Complex64,
        wavelength_nm: f64,
        diameter_nm: f64,
    },

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Dimensionless efficiency factors of a single particle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Efficiencies {
    /// Extinction efficiency.
    pub qext: f64,
    /// Scattering efficiency.
    pub qsca: f64,
    /// Absorption efficiency, `qext - qsca`.
    pub qabs: f64,
    /// Asymmetry parameter ⟨cos θ⟩.
    pub g: f64,
    /// Radiation-pressure efficiency, `qext - g·qsca`.
    pub qpr: f64,
    /// Backscatter efficiency.
    pub qback: f64,
    /// `qback / qsca`.
    pub qratio: f64,
}

impl Efficiencies {
    /// The `(Qsca, Qabs, Qback)` triple used by refractive-index inversion.
    pub fn triple(&self) -> [f64; 3] {
        [self.qsca, self.qabs, self.qback]
    }

    pub fn is_finite(&self) -> bool {
        [self.qext, self.qsca, self.qabs, self.g, self.qpr, self.qback, self.qratio]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Abscissa of an angle-resolved intensity function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngularSpace {
    /// Scattering angle θ in radians.
    #[default]
    Theta,
    /// Dimensionless `qR = (4π/λ)·sin(θ/2)·(d/2)`.
    QSpace,
}

/// Post-processing applied to intensity functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalisation {
    #[default]
    None,
    /// Divide each curve by its maximum.
    Max,
    /// Divide each curve by its trapezoidal integral over the abscissa.
    Total,
}

/// Upper bound on the number of samples in an [`AngularGrid`].
pub const MAX_ANGULAR_SAMPLES: usize = 1_000_000;

/// Angular sampling for intensity functions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngularGrid {
    pub min_angle_deg: f64,
    pub max_angle_deg: f64,
    pub resolution_deg: f64,
    #[serde(default)]
    pub space: AngularSpace,
    #[serde(default)]
    pub normalisation: Normalisation,
}

impl Default for AngularGrid {
    fn default() -> Self {
        Self {
            min_angle_deg: 0.0,
            max_angle_deg: 180.0,
            resolution_deg: 0.5,
            space: AngularSpace::Theta,
            normalisation: Normalisation::None,
        }
    }
}

impl AngularGrid {
    pub fn validate(&self) -> Result<(), ModelError> {
        let ok = self.min_angle_deg.is_finite()
            && self.max_angle_deg.is_finite()
            && self.min_angle_deg >= 0.0
            && self.max_angle_deg <= 180.0
            && self.min_angle_deg < self.max_angle_deg;
        if !ok {
            return Err(ModelError::InvalidInput(format!(
                "angular range must satisfy 0 <= min < max <= 180, got [{}, {}]",
                self.min_angle_deg, self.max_angle_deg
            )));
        }
        if !(self.resolution_deg > 0.0 && self.resolution_deg.is_finite()) {
            return Err(ModelError::InvalidInput(format!(
                "angular resolution must be positive, got {}",
                self.resolution_deg
            )));
        }
        let steps = ((self.max_angle_deg - self.min_angle_deg) / self.resolution_deg).round();
        if steps + 1.0 > MAX_ANGULAR_SAMPLES as f64 {
            return Err(ModelError::InvalidInput(format!(
                "angular resolution {} gives more than {} samples",
                self.resolution_deg, MAX_ANGULAR_SAMPLES
            )));
        }
        Ok(())
    }

    /// Number of samples: the range divided by the resolution, plus one,
    /// kept within `2..=MAX_ANGULAR_SAMPLES`.
    pub fn len(&self) -> usize {
        let steps = ((self.max_angle_deg - self.min_angle_deg) / self.resolution_deg)
            .round()
            .max(1.0)
            .min((MAX_ANGULAR_SAMPLES - 1) as f64);
        steps as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample angles in radians, end points included.
    pub fn angles_rad(&self) -> Vec<f64> {
        linspace(
            self.min_angle_deg.to_radians(),
            self.max_angle_deg.to_radians(),
            self.len(),
        )
    }

    /// Map angles to the configured abscissa.
    pub fn abscissa(&self, angles_rad: &[f64], wavelength_nm: f64, diameter_nm: f64) -> Vec<f64> {
        match self.space {
            AngularSpace::Theta => angles_rad.to_vec(),
            AngularSpace::QSpace => {
                let scale = 4.0 * std::f64::consts::PI / wavelength_nm * (diameter_nm / 2.0);
                angles_rad.iter().map(|t| scale * (t / 2.0).sin()).collect()
            }
        }
    }
}

/// Angle-resolved intensity functions |S|².
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatteringFunctions {
    pub space: AngularSpace,
    /// θ (radians) or qR, depending on `space`.
    pub abscissa: Vec<f64>,
    /// Polarisation parallel to the scattering plane, |S₂|².
    pub parallel: Vec<f64>,
    /// Polarisation perpendicular to the scattering plane, |S₁|².
    pub perpendicular: Vec<f64>,
    /// Mean of the two polarisations.
    pub unpolarised: Vec<f64>,
}

impl ScatteringFunctions {
    /// The unpolarised intensity as a [`Curve`] over the abscissa.
    pub fn unpolarised_curve(&self) -> Result<Curve, DataError> {
        Curve::new(self.abscissa.clone(), self.unpolarised.clone())
    }

    pub fn parallel_curve(&self) -> Result<Curve, DataError> {
        Curve::new(self.abscissa.clone(), self.parallel.clone())
    }

    pub fn perpendicular_curve(&self) -> Result<Curve, DataError> {
        Curve::new(self.abscissa.clone(), self.perpendicular.clone())
    }

    /// Apply a normalisation to all three curves in place.
    pub fn normalise(&mut self, normalisation: Normalisation) -> Result<(), ModelError> {
        let abscissa = &self.abscissa;
        for curve in [
            &mut self.parallel,
            &mut self.perpendicular,
            &mut self.unpolarised,
        ] {
            let divisor = match normalisation {
                Normalisation::None => return Ok(()),
                Normalisation::Max => curve.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                Normalisation::Total => trapezoid(abscissa, curve),
            };
            if !(divisor.is_finite() && divisor > 0.0) {
                return Err(ModelError::InvalidInput(format!(
                    "cannot apply {:?} normalisation with divisor {}",
                    normalisation, divisor
                )));
            }
            curve.iter_mut().for_each(|v| *v /= divisor);
        }
        Ok(())
    }
}

/// A deterministic model of light scattering by a single particle.
///
/// Sweeps evaluate the model concurrently from several threads, hence the
/// `Send + Sync` bound.
pub trait ScatteringModel: Send + Sync {
    /// Efficiency factors for a sphere of complex refractive index `m`.
    fn efficiencies(
        &self,
        m: Complex64,
        wavelength_nm: f64,
        diameter_nm: f64,
    ) -> Result<Efficiencies, ModelError>;

    /// Angle-resolved intensity functions sampled on `grid`.
    fn scattering_functions(
        &self,
        m: Complex64,
        wavelength_nm: f64,
        diameter_nm: f64,
        grid: &AngularGrid,
    ) -> Result<ScatteringFunctions, ModelError>;

    /// Human-readable name of the model.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_has_half_degree_steps() {
        let grid = AngularGrid::default();
        let angles = grid.angles_rad();
        assert_eq!(angles.len(), 361);
        assert!((angles[120] - 60f64.to_radians()).abs() < 1e-12);
        assert!((angles[360] - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn test_grid_validation() {
        let bad = AngularGrid {
            min_angle_deg: 90.0,
            max_angle_deg: 45.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad_res = AngularGrid {
            resolution_deg: 0.0,
            ..Default::default()
        };
        assert!(bad_res.validate().is_err());
        assert!(AngularGrid::default().validate().is_ok());
    }

    #[test]
    fn test_sample_count_is_bounded() {
        let tiny = AngularGrid {
            resolution_deg: 1e-300,
            ..Default::default()
        };
        assert!(tiny.validate().is_err());
        assert_eq!(tiny.len(), MAX_ANGULAR_SAMPLES);

        let limit = AngularGrid {
            resolution_deg: 180.0 / (MAX_ANGULAR_SAMPLES - 1) as f64,
            ..Default::default()
        };
        assert!(limit.validate().is_ok());

        // A resolution wider than the range still gives both end points.
        let coarse = AngularGrid {
            min_angle_deg: 10.0,
            max_angle_deg: 20.0,
            resolution_deg: 50.0,
            ..Default::default()
        };
        assert_eq!(coarse.len(), 2);
        assert_eq!(coarse.len(), coarse.angles_rad().len());
        assert_eq!(AngularGrid::default().len(), AngularGrid::default().angles_rad().len());
    }

    #[test]
    fn test_qspace_abscissa_is_increasing() {
        let grid = AngularGrid {
            space: AngularSpace::QSpace,
            ..Default::default()
        };
        let q = grid.abscissa(&grid.angles_rad(), 532.0, 5000.0);
        assert_eq!(q[0], 0.0);
        assert!(q.windows(2).all(|w| w[1] > w[0]));
        // qR at backscatter is 4π/λ · d/2.
        let expected = 4.0 * std::f64::consts::PI / 532.0 * 2500.0;
        assert!((q[q.len() - 1] - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn test_max_normalisation() {
        let mut sf = ScatteringFunctions {
            space: AngularSpace::Theta,
            abscissa: vec![0.0, 1.0, 2.0],
            parallel: vec![1.0, 4.0, 2.0],
            perpendicular: vec![2.0, 2.0, 2.0],
            unpolarised: vec![1.5, 3.0, 2.0],
        };
        sf.normalise(Normalisation::Max).unwrap();
        assert_eq!(sf.parallel, vec![0.25, 1.0, 0.5]);
        assert_eq!(sf.perpendicular, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_total_normalisation_gives_unit_area() {
        let mut sf = ScatteringFunctions {
            space: AngularSpace::Theta,
            abscissa: vec![0.0, 1.0, 2.0],
            parallel: vec![0.0, 2.0, 0.0],
            perpendicular: vec![1.0, 1.0, 1.0],
            unpolarised: vec![0.5, 1.5, 0.5],
        };
        sf.normalise(Normalisation::Total).unwrap();
        assert!((trapezoid(&sf.abscissa, &sf.parallel) - 1.0).abs() < 1e-12);
        assert!((trapezoid(&sf.abscissa, &sf.unpolarised) - 1.0).abs() < 1e-12);
    }
}
