//! Command-line smoothing of a microstructure stored as `.npy`
//!
//! Usage: mcr-smooth ms.npy --strength 1.5 --info run2
//! writes ms_run2_smoothed.npy next to the input.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;

use mcr_smooth::npy_io::{smoothed_filename, validate_input_path};
use mcr_smooth::{smooth_with, Microstructure, Rounding, SmoothParams, SmoothingMethod};

#[derive(Parser)]
#[command(name = "mcr-smooth")]
#[command(about = "Volume-conserving smoothing of multiphase microstructures", long_about = None)]
struct Cli {
    /// Microstructure label field (.npy or .npy.gz)
    microstructure_filename: PathBuf,

    /// Smoothing method
    #[arg(long, default_value = "gaussian")]
    method: String,

    /// Filter strength (Gaussian standard deviation in voxels)
    #[arg(long, default_value_t = 1.0)]
    strength: f64,

    /// Tag inserted into the output filename
    #[arg(long)]
    info: Option<String>,

    /// Gaussian kernel radius in units of the strength
    #[arg(long, default_value_t = 4.0)]
    truncate: f64,

    /// Keep continuous filter output instead of rounding to integers
    #[arg(long, default_value_t = false)]
    no_round: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    validate_input_path(&cli.microstructure_filename)?;
    let method: SmoothingMethod = cli.method.parse()?;
    let params = SmoothParams {
        method,
        strength: cli.strength,
        truncate: cli.truncate,
        rounding: if cli.no_round { Rounding::None } else { Rounding::NearestEven },
    };

    let start = Instant::now();
    let mut ms = Microstructure::from_npy(&cli.microstructure_filename, true)
        .with_context(|| format!("loading {}", cli.microstructure_filename.display()))?;
    log::info!(
        "loaded {:?} microstructure with {} phases",
        ms.spatial_shape(),
        ms.n_phases()
    );

    smooth_with(&mut ms, &params).context("smoothing failed")?;

    let output = smoothed_filename(&cli.microstructure_filename, cli.info.as_deref())?;
    ms.to_npy(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    log::info!("wrote {} in {:.2?}", output.display(), start.elapsed());
    Ok(())
}
