//! LRO NAC Mosaic Pipeline CLI
//!
//! Turns raw LRO NAC EDR images into normalized left/right mosaics.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lronac_mosaic::{build_runtime, pipeline, run_pipeline, Config, PipelineOutcome};

const LONG_ABOUT: &str = "\
Run the LRO NAC EDR images through the ISIS pipeline to produce left/right mosaics.

Stages, in order:
  lronac2isis   convert each EDR image to an ISIS cube
  spiceinit     attach SPICE kernels (web=false), then spicefit
  lronaccal     radiometric calibration
  lronacecho    echo correction
  noproj        remove projection, both CCDs matched to the left cube
  lronacjitreg  measure left/right jitter offsets
  handmos       merge the right CCD onto the left using the offsets
  cubenorm      normalize each mosaic

Outputs that already exist are not recomputed, so an interrupted run can be
restarted with the same arguments.";

#[derive(Parser, Debug)]
#[command(name = "lronac-mosaic", version)]
#[command(about = "Process LRO NAC EDR images into left/right mosaics", long_about = LONG_ABOUT)]
struct Cli {
    /// Path to configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of external tools to run at once
    #[arg(short, long)]
    threads: Option<usize>,

    /// Stop after noproj, before jitter measurement
    #[arg(long = "stop-at-no-proj")]
    stop_at_no_proj: bool,

    /// Keep intermediate files
    #[arg(short, long)]
    keep: bool,

    /// Delete each stage's inputs once its outputs exist
    #[arg(long, conflicts_with = "keep")]
    delete: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,

    /// Raw NAC EDR images (.IMG)
    #[arg(value_name = "IMG", required_unless_present = "print_config")]
    files: Vec<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => Config::default(),
        };

        // Apply overrides
        if let Some(threads) = self.threads {
            config.processing.threads = threads;
        }
        if self.stop_at_no_proj {
            config.processing.stop_after_noproj = true;
        }
        if self.keep {
            config.processing.delete_intermediate = false;
        }
        if self.delete {
            config.processing.delete_intermediate = true;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    config.validate()?;

    if let Err(e) = pipeline::validate_inputs(&cli.files) {
        Cli::command().error(ErrorKind::ValueValidation, e).exit();
    }

    let runtime = build_runtime(None)?;
    let report = runtime.block_on(run_pipeline(config, cli.files))?;

    match &report.outcome {
        PipelineOutcome::StoppedAfterNoproj { pairs } => {
            tracing::info!("Stopped after noproj with {} pairs", pairs.len());
        }
        PipelineOutcome::Completed { normalized } => {
            for (id, path) in normalized {
                tracing::info!("{}: {}", id, path.display());
            }
        }
    }

    Ok(())
}
