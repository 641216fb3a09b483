//! Job runner: ties together the sweep, interpolation, contour and angular
//! stages, and writes their results.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use num_complex::Complex64;

use lucent_compute::{ComputeBackend, CpuBackend};
use lucent_core::contour::{BandRegion, ContourError, ContourIntersection, ContourSolver, Solution};
use lucent_core::integrate::WindowIntensity;
use lucent_core::model::distribution::{
    size_distribution_coefficients, size_distribution_scattering_functions, DistributionCoefficients,
};
use lucent_core::model::{AngularSpace, Efficiencies, LorenzMie, ScatteringFunctions, ScatteringModel};
use lucent_core::sweep::{EfficiencyGrids, GridEvaluator, SweepConfig};
use lucent_core::types::TargetBand;

use crate::config::{AngularConfig, InversionConfig, JobConfig, ParticleSpec, TargetSpec};

/// Results from a job run.
pub struct JobOutput {
    pub inversion: Option<InversionOutput>,
    pub angular: Option<AngularOutput>,
}

/// Results of the refractive-index inversion.
pub struct InversionOutput {
    pub sweep: SweepConfig,
    /// `(Qsca, Qabs, Qback)` the bands are centred on.
    pub measured: [f64; 3],
    /// Grids after upsampling.
    pub grids: EfficiencyGrids,
    /// `None` when the bands do not intersect.
    pub intersection: Option<ContourIntersection>,
}

/// Results of the angular analysis.
pub struct AngularOutput {
    pub functions: ScatteringFunctions,
    pub windows: Vec<WindowIntensity>,
    /// Single-sphere efficiencies.
    pub efficiencies: Option<Efficiencies>,
    /// Ensemble coefficients for a size distribution.
    pub coefficients: Option<DistributionCoefficients>,
}

/// Run every section of a validated job.
pub fn run_job(job: &JobConfig) -> Result<JobOutput> {
    let model: Arc<dyn ScatteringModel> = Arc::new(LorenzMie::new(job.model.n_medium));
    let backend = create_backend(job.compute.threads)?;

    let inversion = job
        .inversion
        .as_ref()
        .map(|inv| run_inversion(inv, model.clone(), backend.clone()))
        .transpose()?;
    let angular = job
        .angular
        .as_ref()
        .map(|ang| run_angular(ang, model.as_ref()))
        .transpose()?;

    Ok(JobOutput { inversion, angular })
}

/// Sweep, upsample and intersect the efficiency bands.
pub fn run_inversion(
    inv: &InversionConfig,
    model: Arc<dyn ScatteringModel>,
    backend: Arc<dyn ComputeBackend>,
) -> Result<InversionOutput> {
    let measured = match &inv.targets {
        TargetSpec::Measured { measured } => [measured.qsca, measured.qabs, measured.qback],
        TargetSpec::Reference { reference_index } => {
            let m = Complex64::new(reference_index[0], reference_index[1]);
            let q = model
                .efficiencies(m, inv.wavelength_nm, inv.diameter_nm)
                .with_context(|| format!("Reference evaluation at m = {} failed", m))?;
            println!(
                "Reference m = {}: Qsca = {:.6}, Qabs = {:.6}, Qback = {:.6}",
                m, q.qsca, q.qabs, q.qback
            );
            q.triple()
        }
    };

    let sweep = inv.sweep();
    println!(
        "Sweeping {}x{} grid: n in [{}, {}], k in [{}, {}]",
        sweep.k_axis.points, sweep.n_axis.points, sweep.n_axis.min, sweep.n_axis.max, sweep.k_axis.min, sweep.k_axis.max
    );
    let coarse = GridEvaluator::with_backend(model, backend)
        .evaluate(&sweep)
        .context("Efficiency sweep failed")?;

    let grids = coarse
        .upsample(inv.interpolation_factor, inv.spline)
        .context("Grid interpolation failed")?;
    if inv.interpolation_factor > 1 {
        let (rows, cols) = grids.qsca.shape();
        println!("Upsampled x{} to {}x{} ({:?} spline)", inv.interpolation_factor, rows, cols, inv.spline);
    }

    let solved = {
        let mut solver = ContourSolver::new();
        for ((label, grid), value) in grids.labelled().into_iter().zip(measured) {
            let band = TargetBand::new(value, inv.tolerance)
                .with_context(|| format!("Invalid {} target {}", label, value))?;
            solver.add(label, grid, band)?;
        }
        solver.solve()
    };

    let intersection = match solved {
        Ok(result) => {
            report_solutions(&result);
            Some(result)
        }
        Err(e @ ContourError::NoIntersectionFound { .. }) => {
            println!("{}", e);
            println!("Widen the tolerance or the sweep range and retry.");
            None
        }
        Err(e) => return Err(e.into()),
    };

    Ok(InversionOutput {
        sweep,
        measured,
        grids,
        intersection,
    })
}

fn report_solutions(result: &ContourIntersection) {
    if result.is_ambiguous() {
        println!(
            "Ambiguous: {} disjoint regions satisfy all bands",
            result.solutions.len()
        );
    }
    for (i, s) in result.solutions.iter().enumerate() {
        println!(
            "  [{}] m = {:.4} + {:.4}i ({} cells, area {:.2e}, best fit {:.4} + {:.4}i, misfit {:.2e})",
            i + 1,
            s.centroid[0],
            s.centroid[1],
            s.cell_count,
            s.area,
            s.best_fit[0],
            s.best_fit[1],
            s.best_fit_misfit
        );
    }
}

/// Compute intensity functions and detector window integrals.
pub fn run_angular(ang: &AngularConfig, model: &dyn ScatteringModel) -> Result<AngularOutput> {
    let m = Complex64::new(ang.refractive_index[0], ang.refractive_index[1]);
    let grid = ang.grid();

    let (functions, efficiencies, coefficients) = match &ang.particles {
        ParticleSpec::Single { diameter_nm } => {
            let functions = model
                .scattering_functions(m, ang.wavelength_nm, *diameter_nm, &grid)
                .context("Scattering functions failed")?;
            let q = model
                .efficiencies(m, ang.wavelength_nm, *diameter_nm)
                .context("Efficiencies failed")?;
            println!(
                "Single sphere d = {} nm: Qext = {:.6}, Qsca = {:.6}, Qabs = {:.6}, g = {:.4}",
                diameter_nm, q.qext, q.qsca, q.qabs, q.g
            );
            (functions, Some(q), None)
        }
        ParticleSpec::Lognormal { lognormal } => {
            let distribution = lognormal
                .distribution()
                .sample(&lognormal.bins)
                .context("Invalid size distribution")?;
            println!(
                "Lognormal: dg = {} nm, sigma_g = {}, N = {:.3e} cm^-3 over {} bins",
                lognormal.geometric_mean_nm,
                lognormal.geometric_std_dev,
                distribution.total_number(),
                lognormal.bins.count
            );
            let functions =
                size_distribution_scattering_functions(model, m, ang.wavelength_nm, &distribution, &grid)
                    .context("Size-distribution scattering functions failed")?;
            let b = size_distribution_coefficients(model, m, ang.wavelength_nm, &distribution)
                .context("Size-distribution coefficients failed")?;
            println!(
                "Bext = {:.4} Mm^-1, Bsca = {:.4} Mm^-1, Babs = {:.4} Mm^-1, G = {:.4}",
                b.bext, b.bsca, b.babs, b.g
            );
            (functions, None, Some(b))
        }
    };

    let mut windows = Vec::with_capacity(ang.windows.len());
    if !ang.windows.is_empty() {
        if functions.space != AngularSpace::Theta {
            bail!("Detector windows need a theta abscissa");
        }
        let curve = functions.unpolarised_curve()?;
        for w in &ang.windows {
            let result = w
                .integrate(&curve)
                .with_context(|| format!("Window '{}' failed", w.name))?;
            println!(
                "  Window '{}' [{}°, {}°]: {:.6e}",
                result.name, result.start_deg, result.end_deg, result.intensity
            );
            windows.push(result);
        }
    }

    Ok(AngularOutput {
        functions,
        windows,
        efficiencies,
        coefficients,
    })
}

/// Write all outputs requested by the job into `out_dir`.
pub fn write_outputs(output: &JobOutput, job: &JobConfig, out_dir: &Path) -> Result<()> {
    if let Some(inv) = &output.inversion {
        if job.output.save_csv {
            write_grids_csv(&inv.grids, &out_dir.join("efficiency_grids.csv"), inv)?;
        }
        if let Some(result) = &inv.intersection {
            if job.output.save_csv {
                write_contours_csv(&result.regions, &out_dir.join("contours.csv"))?;
            }
            write_solutions_csv(&result.solutions, &out_dir.join("solutions.csv"))?;
            if job.output.save_json {
                write_json(&result.solutions, &out_dir.join("solutions.json"), "Solutions")?;
            }
        }
    }

    if let Some(ang) = &output.angular {
        if job.output.save_csv {
            write_scattering_csv(&ang.functions, &out_dir.join("scattering_functions.csv"), job)?;
        }
        if job.output.save_json {
            let summary = serde_json::json!({
                "windows": ang.windows,
                "efficiencies": ang.efficiencies,
                "coefficients": ang.coefficients,
            });
            write_json(&summary, &out_dir.join("angular.json"), "Angular summary")?;
        }
    }
    Ok(())
}

fn create_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::File::create(path).with_context(|| format!("Cannot create {}", path.display()))
}

/// Write the (upsampled) efficiency grids in long format.
pub fn write_grids_csv(grids: &EfficiencyGrids, path: &Path, inv: &InversionOutput) -> Result<()> {
    let mut file = create_file(path)?;

    writeln!(file, "# Lucent efficiency grids")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(
        file,
        "# wavelength_nm: {}, diameter_nm: {}",
        inv.sweep.wavelength_nm, inv.sweep.diameter_nm
    )?;
    writeln!(
        file,
        "# measured: qsca={}, qabs={}, qback={}",
        inv.measured[0], inv.measured[1], inv.measured[2]
    )?;
    writeln!(file, "#")?;
    writeln!(file, "n,k,qsca,qabs,qback")?;

    for ((row, col), qsca) in grids.qsca.values().indexed_iter() {
        let (n, k) = grids.qsca.coordinate(row, col);
        writeln!(
            file,
            "{:.6},{:.6},{:.8e},{:.8e},{:.8e}",
            n,
            k,
            qsca,
            grids.qabs.values()[[row, col]],
            grids.qback.values()[[row, col]]
        )?;
    }

    println!("Grids written to: {}", path.display());
    Ok(())
}

/// Write band contours as one row per vertex.
pub fn write_contours_csv(regions: &[BandRegion], path: &Path) -> Result<()> {
    let mut file = create_file(path)?;

    writeln!(file, "# Lucent band contours")?;
    for r in regions {
        writeln!(
            file,
            "# {}: value={}, band=[{}, {}], accepted_cells={}, area={:.6e}",
            r.label,
            r.band.value(),
            r.band.lower(),
            r.band.upper(),
            r.accepted_cells,
            r.area
        )?;
    }
    writeln!(file, "#")?;
    writeln!(file, "quantity,level,line,closed,n,k")?;

    for r in regions {
        for (level, lines) in [
            ("lower", &r.lower_contours),
            ("target", &r.target_contours),
            ("upper", &r.upper_contours),
        ] {
            for (i, line) in lines.iter().enumerate() {
                for p in &line.points {
                    writeln!(file, "{},{},{},{},{:.8},{:.8}", r.label, level, i, line.closed, p[0], p[1])?;
                }
            }
        }
    }

    println!("Contours written to: {}", path.display());
    Ok(())
}

/// Write candidate solutions, one row each.
pub fn write_solutions_csv(solutions: &[Solution], path: &Path) -> Result<()> {
    let mut file = create_file(path)?;

    writeln!(file, "# Lucent inversion candidates ({} found)", solutions.len())?;
    writeln!(file, "#")?;
    writeln!(
        file,
        "rank,n,k,area,cells,n_min,n_max,k_min,k_max,best_fit_n,best_fit_k,best_fit_misfit"
    )?;
    for (i, s) in solutions.iter().enumerate() {
        writeln!(
            file,
            "{},{:.6},{:.6},{:.6e},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6e}",
            i + 1,
            s.centroid[0],
            s.centroid[1],
            s.area,
            s.cell_count,
            s.bounds[0],
            s.bounds[1],
            s.bounds[2],
            s.bounds[3],
            s.best_fit[0],
            s.best_fit[1],
            s.best_fit_misfit
        )?;
    }

    println!("Solutions written to: {}", path.display());
    Ok(())
}

/// Write intensity functions with a metadata header.
pub fn write_scattering_csv(functions: &ScatteringFunctions, path: &Path, job: &JobConfig) -> Result<()> {
    let mut file = create_file(path)?;

    writeln!(file, "# Lucent scattering functions")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# n_medium: {}", job.model.n_medium)?;
    if let Some(ang) = &job.angular {
        writeln!(
            file,
            "# m: {} + {}i, wavelength_nm: {}, normalisation: {:?}",
            ang.refractive_index[0], ang.refractive_index[1], ang.wavelength_nm, ang.normalisation
        )?;
    }
    writeln!(file, "#")?;
    let abscissa = match functions.space {
        AngularSpace::Theta => "theta_rad",
        AngularSpace::QSpace => "qR",
    };
    writeln!(file, "{},parallel,perpendicular,unpolarised", abscissa)?;

    for i in 0..functions.abscissa.len() {
        writeln!(
            file,
            "{:.8},{:.8e},{:.8e},{:.8e}",
            functions.abscissa[i], functions.parallel[i], functions.perpendicular[i], functions.unpolarised[i]
        )?;
    }

    println!("Scattering functions written to: {}", path.display());
    Ok(())
}

fn write_json<T: serde::Serialize + ?Sized>(value: &T, path: &Path, what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("{} (JSON) written to: {}", what, path.display());
    Ok(())
}

/// Create the CPU backend, on a dedicated pool when `threads > 0`.
pub fn create_backend(threads: usize) -> Result<Arc<dyn ComputeBackend>> {
    let backend = if threads == 0 {
        CpuBackend::new()
    } else {
        CpuBackend::with_threads(threads).context("Cannot build the worker pool")?
    };
    println!("Backend: {}", backend.device_info().name);
    Ok(Arc::new(backend))
}
