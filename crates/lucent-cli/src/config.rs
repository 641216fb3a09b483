//! TOML configuration deserialisation for analysis jobs.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use lucent_core::integrate::DetectorWindow;
use lucent_core::model::distribution::{DiameterBins, LognormalDistribution};
use lucent_core::model::{AngularGrid, AngularSpace, Normalisation};
use lucent_core::spline::SplineOrder;
use lucent_core::sweep::SweepConfig;
use lucent_core::types::TargetBand;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub model: ModelConfig,
    pub inversion: Option<InversionConfig>,
    pub angular: Option<AngularConfig>,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Scattering model parameters.
#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    /// Refractive index of the surrounding medium (default: 1.0).
    #[serde(default = "default_n_medium")]
    pub n_medium: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_medium: default_n_medium(),
        }
    }
}

fn default_n_medium() -> f64 {
    1.0
}

/// Refractive-index inversion from measured efficiencies.
#[derive(Debug, Deserialize)]
pub struct InversionConfig {
    pub wavelength_nm: f64,
    pub diameter_nm: f64,
    /// Real-index sweep range `[min, max]`.
    pub n_range: [f64; 2],
    /// Imaginary-index sweep range `[min, max]`.
    pub k_range: [f64; 2],
    /// Points per axis (default: 200).
    #[serde(default = "default_points")]
    pub points: usize,
    /// Relative tolerance of every target band (default: 0.01).
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Grid upsampling factor before contouring (default: 2).
    #[serde(default = "default_interpolation_factor")]
    pub interpolation_factor: usize,
    /// Spline used for upsampling: "linear" or "cubic" (default).
    #[serde(default)]
    pub spline: SplineOrder,
    #[serde(flatten)]
    pub targets: TargetSpec,
}

fn default_points() -> usize {
    200
}
fn default_tolerance() -> f64 {
    0.01
}
fn default_interpolation_factor() -> usize {
    2
}

/// Target efficiencies: measured directly or derived from a known index.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Measured { measured: MeasuredEfficiencies },
    Reference { reference_index: [f64; 2] },
}

/// Measured efficiency values.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MeasuredEfficiencies {
    pub qsca: f64,
    pub qabs: f64,
    pub qback: f64,
}

impl InversionConfig {
    pub fn sweep(&self) -> SweepConfig {
        SweepConfig::square(
            self.wavelength_nm,
            self.diameter_nm,
            (self.n_range[0], self.n_range[1]),
            (self.k_range[0], self.k_range[1]),
            self.points,
        )
    }
}

/// Angle-resolved scattering of a single sphere or a size distribution.
#[derive(Debug, Deserialize)]
pub struct AngularConfig {
    /// Particle refractive index `[n, k]`.
    pub refractive_index: [f64; 2],
    pub wavelength_nm: f64,
    #[serde(flatten)]
    pub particles: ParticleSpec,
    #[serde(default = "default_min_angle")]
    pub min_angle_deg: f64,
    #[serde(default = "default_max_angle")]
    pub max_angle_deg: f64,
    #[serde(default = "default_resolution")]
    pub resolution_deg: f64,
    /// Abscissa: "theta" (default) or "qspace".
    #[serde(default)]
    pub space: AngularSpace,
    /// "none" (default), "max" or "total".
    #[serde(default)]
    pub normalisation: Normalisation,
    /// Detector windows integrated over the unpolarised intensity.
    #[serde(default)]
    pub windows: Vec<DetectorWindow>,
}

fn default_min_angle() -> f64 {
    0.0
}
fn default_max_angle() -> f64 {
    180.0
}
fn default_resolution() -> f64 {
    0.5
}

/// Particle specification: one diameter or a lognormal ensemble.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ParticleSpec {
    Single { diameter_nm: f64 },
    Lognormal { lognormal: LognormalConfig },
}

/// Lognormal size distribution parameters.
#[derive(Debug, Deserialize)]
pub struct LognormalConfig {
    pub geometric_mean_nm: f64,
    pub geometric_std_dev: f64,
    /// Number concentration (cm⁻³).
    pub total_number: f64,
    /// Diameter sampling (default: 1–1000 nm, 10000 bins).
    #[serde(default)]
    pub bins: DiameterBins,
}

impl LognormalConfig {
    pub fn distribution(&self) -> LognormalDistribution {
        LognormalDistribution {
            geometric_mean_nm: self.geometric_mean_nm,
            geometric_std_dev: self.geometric_std_dev,
            total_number: self.total_number,
        }
    }
}

impl AngularConfig {
    pub fn grid(&self) -> AngularGrid {
        AngularGrid {
            min_angle_deg: self.min_angle_deg,
            max_angle_deg: self.max_angle_deg,
            resolution_deg: self.resolution_deg,
            space: self.space,
            normalisation: self.normalisation,
        }
    }
}

/// Compute resources.
#[derive(Debug, Default, Deserialize)]
pub struct ComputeConfig {
    /// Worker threads for sweeps; 0 uses the global pool (default: 0).
    #[serde(default)]
    pub threads: usize,
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save grids, contours and curves as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_csv: bool,
    /// Whether to also save solutions and window integrals as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_csv: true,
            save_json: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

impl JobConfig {
    /// Check every section without running any computation.
    pub fn validate(&self) -> Result<()> {
        if self.inversion.is_none() && self.angular.is_none() {
            bail!("Job defines neither an [inversion] nor an [angular] section");
        }
        if !(self.model.n_medium.is_finite() && self.model.n_medium > 0.0) {
            bail!("model.n_medium must be positive, got {}", self.model.n_medium);
        }

        if let Some(inv) = &self.inversion {
            inv.sweep().validate().context("Invalid [inversion] sweep")?;
            TargetBand::new(1.0, inv.tolerance).context("Invalid [inversion] tolerance")?;
            if inv.interpolation_factor == 0 {
                bail!("inversion.interpolation_factor must be at least 1");
            }
            match &inv.targets {
                TargetSpec::Measured { measured } => {
                    for (name, v) in [("qsca", measured.qsca), ("qabs", measured.qabs), ("qback", measured.qback)] {
                        if !v.is_finite() {
                            bail!("inversion.measured.{} is not finite", name);
                        }
                    }
                }
                TargetSpec::Reference { reference_index } => {
                    if !reference_index.iter().all(|v| v.is_finite()) {
                        bail!("inversion.reference_index must be finite");
                    }
                }
            }
        }

        if let Some(ang) = &self.angular {
            ang.grid().validate().context("Invalid [angular] grid")?;
            if !(ang.wavelength_nm.is_finite() && ang.wavelength_nm > 0.0) {
                bail!("angular.wavelength_nm must be positive, got {}", ang.wavelength_nm);
            }
            match &ang.particles {
                ParticleSpec::Single { diameter_nm } => {
                    if !(diameter_nm.is_finite() && *diameter_nm > 0.0) {
                        bail!("angular.diameter_nm must be positive, got {}", diameter_nm);
                    }
                }
                ParticleSpec::Lognormal { lognormal } => {
                    lognormal
                        .distribution()
                        .validate()
                        .context("Invalid [angular.lognormal]")?;
                    let bins = &lognormal.bins;
                    if !(bins.lower_nm > 0.0 && bins.upper_nm > bins.lower_nm && bins.count >= 2) {
                        bail!("angular.lognormal.bins must satisfy 0 < lower_nm < upper_nm and count >= 2");
                    }
                    if ang.space == AngularSpace::QSpace {
                        bail!("q-space output is not available for size distributions");
                    }
                }
            }
            if !ang.windows.is_empty() && ang.space == AngularSpace::QSpace {
                bail!("detector windows are defined in degrees and need space = \"theta\"");
            }
            for w in &ang.windows {
                if !(w.start_deg < w.end_deg) {
                    bail!("window '{}': start_deg must be below end_deg", w.name);
                }
                if w.start_deg < ang.min_angle_deg || w.end_deg > ang.max_angle_deg {
                    bail!(
                        "window '{}' [{}, {}] lies outside the angular range [{}, {}]",
                        w.name,
                        w.start_deg,
                        w.end_deg,
                        ang.min_angle_deg,
                        ang.max_angle_deg
                    );
                }
            }
        }
        Ok(())
    }
}

/// Parse a TOML job configuration.
pub fn parse_config(content: &str) -> Result<JobConfig> {
    let config: JobConfig = toml::from_str(content)?;
    Ok(config)
}

/// Load, parse and validate a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let config = parse_config(&content).with_context(|| format!("Cannot parse {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVERSION: &str = r#"
        [inversion]
        wavelength_nm = 375.0
        diameter_nm = 300.0
        n_range = [1.33, 3.0]
        k_range = [0.001, 1.0]
        reference_index = [1.77, 0.63]
    "#;

    #[test]
    fn test_inversion_defaults() {
        let job = parse_config(INVERSION).unwrap();
        job.validate().unwrap();
        let inv = job.inversion.as_ref().unwrap();
        assert_eq!(inv.points, 200);
        assert_eq!(inv.tolerance, 0.01);
        assert_eq!(inv.interpolation_factor, 2);
        assert_eq!(inv.spline, SplineOrder::Cubic);
        assert!(matches!(inv.targets, TargetSpec::Reference { reference_index } if reference_index == [1.77, 0.63]));
        assert_eq!(job.model.n_medium, 1.0);
        assert_eq!(job.output.directory, "./output");
        assert!(job.output.save_csv);
        assert!(job.angular.is_none());
    }

    #[test]
    fn test_measured_targets() {
        let toml = r#"
            [inversion]
            wavelength_nm = 375.0
            diameter_nm = 300.0
            n_range = [1.33, 3.0]
            k_range = [0.001, 1.0]
            points = 50
            spline = "linear"
            measured = { qsca = 1.31, qabs = 1.54, qback = 0.20 }
        "#;
        let job = parse_config(toml).unwrap();
        job.validate().unwrap();
        let inv = job.inversion.unwrap();
        assert_eq!(inv.spline, SplineOrder::Linear);
        match inv.targets {
            TargetSpec::Measured { measured } => assert_eq!(measured.qabs, 1.54),
            other => panic!("expected measured targets, got {:?}", other),
        }
    }

    #[test]
    fn test_lognormal_angular_section() {
        let toml = r#"
            [angular]
            refractive_index = [1.536, 0.0]
            wavelength_nm = 405.0
            normalisation = "max"

            [angular.lognormal]
            geometric_mean_nm = 85.0
            geometric_std_dev = 1.5
            total_number = 1e5

            [[angular.windows]]
            name = "60deg"
            start_deg = 55.0
            end_deg = 65.0
        "#;
        let job = parse_config(toml).unwrap();
        job.validate().unwrap();
        let ang = job.angular.unwrap();
        assert_eq!(ang.normalisation, Normalisation::Max);
        assert_eq!(ang.grid().len(), 361);
        assert_eq!(ang.windows.len(), 1);
        match ang.particles {
            ParticleSpec::Lognormal { lognormal } => assert_eq!(lognormal.bins, DiameterBins::default()),
            other => panic!("expected lognormal particles, got {:?}", other),
        }
    }

    #[test]
    fn test_bundled_jobs_validate() {
        for (name, content) in [
            ("inversion", include_str!("../../../jobs/inversion.toml")),
            ("single_sphere", include_str!("../../../jobs/single_sphere.toml")),
            ("nacl_aerosol", include_str!("../../../jobs/nacl_aerosol.toml")),
        ] {
            let job = parse_config(content).unwrap_or_else(|e| panic!("{}: {:#}", name, e));
            job.validate().unwrap_or_else(|e| panic!("{}: {:#}", name, e));
        }
    }

    #[test]
    fn test_validation_rejects_bad_sections() {
        let empty = parse_config("[output]\ndirectory = \"out\"\n").unwrap();
        assert!(empty.validate().is_err());

        let reversed = INVERSION.replace("n_range = [1.33, 3.0]", "n_range = [3.0, 1.33]");
        assert!(parse_config(&reversed).unwrap().validate().is_err());

        let negative_k = INVERSION.replace("k_range = [0.001, 1.0]", "k_range = [-0.1, 1.0]");
        assert!(parse_config(&negative_k).unwrap().validate().is_err());

        let window_outside = r#"
            [angular]
            refractive_index = [1.7, 0.5]
            wavelength_nm = 532.0
            diameter_nm = 5000.0
            max_angle_deg = 90.0

            [[angular.windows]]
            name = "side"
            start_deg = 85.0
            end_deg = 95.0
        "#;
        assert!(parse_config(window_outside).unwrap().validate().is_err());
    }
}
