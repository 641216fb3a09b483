//! Polydisperse ensembles: lognormal size distributions.
//!
//! Optical properties of an aerosol are obtained by integrating
//! single-particle results over the number size distribution $dN/dd$ with
//! the trapezoidal rule on a log-spaced diameter grid.

use std::f64::consts::PI;

use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{AngularGrid, AngularSpace, ModelError, Normalisation, ScatteringFunctions, ScatteringModel};
use crate::integrate::trapezoid_weights;
use crate::types::logspace;

/// Diameters per parallel work unit. Partial sums are combined in order,
/// so results do not depend on the thread count.
const CHUNK: usize = 64;

/// Log-spaced diameter sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiameterBins {
    pub lower_nm: f64,
    pub upper_nm: f64,
    pub count: usize,
}

impl Default for DiameterBins {
    fn default() -> Self {
        Self {
            lower_nm: 1.0,
            upper_nm: 1000.0,
            count: 10_000,
        }
    }
}

/// A lognormal number size distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LognormalDistribution {
    /// Geometric mean diameter (nm).
    pub geometric_mean_nm: f64,
    /// Geometric standard deviation σg (dimensionless, > 1).
    pub geometric_std_dev: f64,
    /// Total number concentration (cm⁻³).
    pub total_number: f64,
}

impl LognormalDistribution {
    pub fn new(geometric_mean_nm: f64, geometric_std_dev: f64, total_number: f64) -> Result<Self, ModelError> {
        let dist = Self {
            geometric_mean_nm,
            geometric_std_dev,
            total_number,
        };
        dist.validate()?;
        Ok(dist)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !(self.geometric_mean_nm.is_finite() && self.geometric_mean_nm > 0.0) {
            return Err(ModelError::InvalidInput(format!(
                "geometric mean diameter must be positive, got {}",
                self.geometric_mean_nm
            )));
        }
        if !(self.geometric_std_dev.is_finite() && self.geometric_std_dev > 1.0) {
            return Err(ModelError::InvalidInput(format!(
                "geometric standard deviation must exceed 1, got {}",
                self.geometric_std_dev
            )));
        }
        if !(self.total_number.is_finite() && self.total_number >= 0.0) {
            return Err(ModelError::InvalidInput(format!(
                "total number must be non-negative, got {}",
                self.total_number
            )));
        }
        Ok(())
    }

    /// $dN/dd$ at diameter `d` (cm⁻³ nm⁻¹).
    pub fn number_density(&self, diameter_nm: f64) -> f64 {
        let ln_sigma = self.geometric_std_dev.ln();
        let z = diameter_nm.ln() - self.geometric_mean_nm.ln();
        self.total_number / ((2.0 * PI).sqrt() * ln_sigma * diameter_nm)
            * (-z * z / (2.0 * ln_sigma * ln_sigma)).exp()
    }

    /// Sample the distribution on log-spaced bins.
    pub fn sample(&self, bins: &DiameterBins) -> Result<SizeDistribution, ModelError> {
        self.validate()?;
        if !(bins.lower_nm > 0.0 && bins.upper_nm > bins.lower_nm && bins.count >= 2) {
            return Err(ModelError::InvalidInput(format!(
                "diameter bins need 0 < lower < upper and count >= 2, got {:?}",
                bins
            )));
        }
        let diameters_nm = logspace(bins.lower_nm, bins.upper_nm, bins.count);
        let number_density = diameters_nm.iter().map(|&d| self.number_density(d)).collect();
        Ok(SizeDistribution {
            diameters_nm,
            number_density,
        })
    }
}

/// A sampled size distribution: diameters and $dN/dd$ at each diameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeDistribution {
    pub diameters_nm: Vec<f64>,
    pub number_density: Vec<f64>,
}

impl SizeDistribution {
    /// Total number concentration by trapezoidal integration.
    pub fn total_number(&self) -> f64 {
        trapezoid_weights(&self.diameters_nm)
            .iter()
            .zip(self.number_density.iter())
            .map(|(w, n)| w * n)
            .sum()
    }

    fn check(&self) -> Result<(), ModelError> {
        if self.diameters_nm.len() != self.number_density.len() {
            return Err(ModelError::InvalidInput(format!(
                "{} diameters but {} number densities",
                self.diameters_nm.len(),
                self.number_density.len()
            )));
        }
        Ok(())
    }

    /// Trapezoid weight times number density, per diameter.
    fn weighted_counts(&self) -> Vec<f64> {
        trapezoid_weights(&self.diameters_nm)
            .iter()
            .zip(self.number_density.iter())
            .map(|(w, n)| w * n)
            .collect()
    }
}

/// Ensemble optical coefficients (Mm⁻¹) of a size distribution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DistributionCoefficients {
    pub bext: f64,
    pub bsca: f64,
    pub babs: f64,
    /// Scattering-weighted asymmetry parameter.
    pub g: f64,
    pub bpr: f64,
    pub bback: f64,
    pub bratio: f64,
}

/// Integrate single-particle efficiencies over a size distribution.
///
/// Each diameter contributes $Q \cdot \pi (d/2)^2 \cdot dN/dd \cdot 10^{-6}$,
/// giving coefficients in Mm⁻¹ for diameters in nm and concentrations in cm⁻³.
pub fn size_distribution_coefficients(
    model: &dyn ScatteringModel,
    m: Complex64,
    wavelength_nm: f64,
    distribution: &SizeDistribution,
) -> Result<DistributionCoefficients, ModelError> {
    distribution.check()?;
    let counts = distribution.weighted_counts();
    let d = &distribution.diameters_nm;

    let partials = (0..d.len())
        .collect::<Vec<_>>()
        .par_chunks(CHUNK)
        .map(|idx| -> Result<[f64; 5], ModelError> {
            let mut acc = [0.0; 5];
            for &i in idx {
                let q = model.efficiencies(m, wavelength_nm, d[i])?;
                let area = PI * (d[i] / 2.0).powi(2) * counts[i] * 1e-6;
                acc[0] += q.qext * area;
                acc[1] += q.qsca * area;
                acc[2] += q.qabs * area;
                acc[3] += q.g * q.qsca * area;
                acc[4] += q.qback * area;
            }
            Ok(acc)
        })
        .collect::<Result<Vec<_>, ModelError>>()?;

    let mut total = [0.0; 5];
    for p in &partials {
        for (t, v) in total.iter_mut().zip(p.iter()) {
            *t += v;
        }
    }
    let [bext, bsca, babs, g_weighted, bback] = total;
    let (g, bratio) = if bsca > 0.0 {
        (g_weighted / bsca, bback / bsca)
    } else {
        (0.0, 0.0)
    };

    Ok(DistributionCoefficients {
        bext,
        bsca,
        babs,
        g,
        bpr: bext - g * bsca,
        bback,
        bratio,
    })
}

/// Intensity functions of a size distribution.
///
/// Single-particle |S|² are weighted by $dN/dd$ and integrated over diameter
/// with the trapezoid rule, so each diameter contributes $Δd · dN/dd · |S|²$
/// and the result has units of |S|² per unit volume. Codes that instead sum
/// $dN/dd · |S|²$ over the diameter samples without the bin width $Δd$ give
/// curves of the same shape on a different absolute scale; detector window
/// integrals agree with theirs only after `Max` or `Total` normalisation.
///
/// Only the θ abscissa is meaningful for an ensemble; q-space grids are
/// rejected. Normalisation is applied to the ensemble result.
pub fn size_distribution_scattering_functions(
    model: &dyn ScatteringModel,
    m: Complex64,
    wavelength_nm: f64,
    distribution: &SizeDistribution,
    grid: &AngularGrid,
) -> Result<ScatteringFunctions, ModelError> {
    if grid.space == AngularSpace::QSpace {
        return Err(ModelError::InvalidInput(
            "q-space abscissa depends on diameter and is undefined for a size distribution".into(),
        ));
    }
    grid.validate()?;
    distribution.check()?;

    let single = AngularGrid {
        normalisation: Normalisation::None,
        ..*grid
    };
    let counts = distribution.weighted_counts();
    let d = &distribution.diameters_nm;
    let len = grid.angles_rad().len();

    let partials = (0..d.len())
        .collect::<Vec<_>>()
        .par_chunks(CHUNK)
        .map(|idx| -> Result<(Vec<f64>, Vec<f64>), ModelError> {
            let mut par = vec![0.0; len];
            let mut perp = vec![0.0; len];
            for &i in idx {
                let sf = model.scattering_functions(m, wavelength_nm, d[i], &single)?;
                for j in 0..len {
                    par[j] += counts[i] * sf.parallel[j];
                    perp[j] += counts[i] * sf.perpendicular[j];
                }
            }
            Ok((par, perp))
        })
        .collect::<Result<Vec<_>, ModelError>>()?;

    let mut parallel = vec![0.0; len];
    let mut perpendicular = vec![0.0; len];
    for (par, perp) in &partials {
        for j in 0..len {
            parallel[j] += par[j];
            perpendicular[j] += perp[j];
        }
    }
    let unpolarised = parallel
        .iter()
        .zip(perpendicular.iter())
        .map(|(a, b)| 0.5 * (a + b))
        .collect();

    let mut functions = ScatteringFunctions {
        space: AngularSpace::Theta,
        abscissa: grid.angles_rad(),
        parallel,
        perpendicular,
        unpolarised,
    };
    functions.normalise(grid.normalisation)?;
    log::debug!(
        "Size-distribution scattering functions: {} diameters, {} angles",
        d.len(),
        len
    );
    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LorenzMie;
    use approx::assert_relative_eq;

    fn nacl() -> LognormalDistribution {
        LognormalDistribution::new(85.0, 1.5, 1e5).unwrap()
    }

    #[test]
    fn test_lognormal_integrates_to_total_number() {
        let sd = nacl()
            .sample(&DiameterBins {
                lower_nm: 1.0,
                upper_nm: 1000.0,
                count: 2000,
            })
            .unwrap();
        assert_relative_eq!(sd.total_number(), 1e5, max_relative = 1e-3);
    }

    #[test]
    fn test_lognormal_peaks_below_geometric_mean() {
        // dN/dd of a lognormal peaks at dg·exp(-ln²σg), below the geometric mean.
        let dist = nacl();
        let mode = 85.0 * (-(1.5f64.ln()).powi(2)).exp();
        assert!(dist.number_density(mode) > dist.number_density(85.0));
        assert!(dist.number_density(mode) > dist.number_density(mode * 0.95));
    }

    #[test]
    fn test_rejects_unit_std_dev() {
        assert!(LognormalDistribution::new(85.0, 1.0, 1e5).is_err());
    }

    #[test]
    fn test_monodisperse_limit_matches_single_particle() {
        // A narrow distribution behaves like N particles of the mean diameter.
        let mie = LorenzMie::default();
        let m = Complex64::new(1.536, 0.0);
        let dist = LognormalDistribution::new(100.0, 1.01, 1000.0).unwrap();
        let sd = dist
            .sample(&DiameterBins {
                lower_nm: 90.0,
                upper_nm: 110.0,
                count: 400,
            })
            .unwrap();

        let coeffs = size_distribution_coefficients(&mie, m, 405.0, &sd).unwrap();
        let q = mie.efficiencies(m, 405.0, 100.0).unwrap();
        let expected = q.qsca * PI * 50.0 * 50.0 * 1000.0 * 1e-6;
        assert_relative_eq!(coeffs.bsca, expected, max_relative = 1e-2);
        assert!(coeffs.babs.abs() < 1e-8 * coeffs.bsca);
    }

    #[test]
    fn test_distribution_functions_do_not_scale_with_bin_count() {
        // Weights carry the bin width, so refining the diameter grid leaves
        // the ensemble intensity unchanged.
        let mie = LorenzMie::default();
        let m = Complex64::new(1.536, 0.0);
        let grid = AngularGrid {
            resolution_deg: 10.0,
            ..Default::default()
        };
        let functions = |count| {
            let sd = nacl()
                .sample(&DiameterBins {
                    lower_nm: 1.0,
                    upper_nm: 1000.0,
                    count,
                })
                .unwrap();
            size_distribution_scattering_functions(&mie, m, 405.0, &sd, &grid).unwrap()
        };

        let coarse = functions(500);
        let fine = functions(1000);
        for (a, b) in coarse.unpolarised.iter().zip(&fine.unpolarised) {
            assert_relative_eq!(*a, *b, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_distribution_functions_reject_qspace() {
        let mie = LorenzMie::default();
        let sd = nacl()
            .sample(&DiameterBins {
                lower_nm: 10.0,
                upper_nm: 500.0,
                count: 20,
            })
            .unwrap();
        let grid = AngularGrid {
            space: AngularSpace::QSpace,
            ..Default::default()
        };
        assert!(size_distribution_scattering_functions(&mie, Complex64::new(1.536, 0.0), 405.0, &sd, &grid).is_err());
    }

    #[test]
    fn test_distribution_functions_are_thread_count_independent() {
        let mie = LorenzMie::default();
        let m = Complex64::new(1.536, 0.0);
        let sd = nacl()
            .sample(&DiameterBins {
                lower_nm: 10.0,
                upper_nm: 500.0,
                count: 300,
            })
            .unwrap();
        let grid = AngularGrid {
            resolution_deg: 5.0,
            ..Default::default()
        };

        let a = size_distribution_scattering_functions(&mie, m, 405.0, &sd, &grid).unwrap();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let b = pool
            .install(|| size_distribution_scattering_functions(&mie, m, 405.0, &sd, &grid))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.abscissa.len(), 37);
    }
}
