//! Lucent command-line interface.
//!
//! Run analyses from TOML configuration files:
//! ```sh
//! lucent-cli run job.toml
//! lucent-cli validate job.toml
//! lucent-cli efficiencies --n 1.77 --k 0.63 --wavelength 375 --diameter 300
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use num_complex::Complex64;
use std::path::PathBuf;

use lucent_core::model::{LorenzMie, ScatteringModel};

#[derive(Parser)]
#[command(name = "lucent-cli")]
#[command(about = "Lucent: Mie scattering sweeps, refractive-index inversion and angular analysis")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an analysis from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without running the analysis.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Print the efficiency factors of a single sphere.
    Efficiencies {
        /// Real part of the refractive index.
        #[arg(long)]
        n: f64,
        /// Imaginary part of the refractive index.
        #[arg(long, default_value_t = 0.0)]
        k: f64,
        /// Wavelength in nm.
        #[arg(long)]
        wavelength: f64,
        /// Diameter in nm.
        #[arg(long)]
        diameter: f64,
        /// Refractive index of the medium.
        #[arg(long, default_value_t = 1.0)]
        n_medium: f64,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Lucent");
            println!("======");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_job(&job)?;

            // Determine output directory
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            runner::write_outputs(&result, &job, &out_dir)?;

            println!("Analysis complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            println!("Configuration is valid: {}", config.display());
            if job.inversion.is_some() {
                println!("  [inversion] present");
            }
            if job.angular.is_some() {
                println!("  [angular] present");
            }
            Ok(())
        }
        Commands::Efficiencies {
            n,
            k,
            wavelength,
            diameter,
            n_medium,
        } => {
            let mie = LorenzMie::new(n_medium);
            let m = Complex64::new(n, k);
            let q = mie.efficiencies(m, wavelength, diameter)?;
            println!(
                "m = {}, λ = {} nm, d = {} nm, n_medium = {} (x = {:.4})",
                m,
                wavelength,
                diameter,
                n_medium,
                mie.size_parameter(wavelength, diameter)
            );
            println!("  Qext   = {:.6}", q.qext);
            println!("  Qsca   = {:.6}", q.qsca);
            println!("  Qabs   = {:.6}", q.qabs);
            println!("  g      = {:.6}", q.g);
            println!("  Qpr    = {:.6}", q.qpr);
            println!("  Qback  = {:.6}", q.qback);
            println!("  Qratio = {:.6}", q.qratio);
            Ok(())
        }
    }
}
