//! LRO NAC Mosaic Pipeline
//!
//! Batch pipeline that turns raw LRO Narrow Angle Camera EDR images into
//! calibrated, echo-corrected, jitter-registered, normalized left/right NAC
//! mosaics by driving the ISIS command-line programs.
//!
//! # Architecture
//!
//! The pipeline consists of:
//!
//! - **Index**: Acquisition ids parsed from NAC filenames and left/right pairing
//! - **I/O**: Stage output paths, intermediate cleanup and jitter log parsing
//! - **ISIS**: Environment and version detection
//! - **Pipeline**: Bounded job pool, one function per stage, and the driver
//!
//! # Usage
//!
//! ```no_run
//! use lronac_mosaic::{run_pipeline, Config};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(&PathBuf::from("config.yaml"))?;
//!     let images = vec![PathBuf::from("M104318871LE.IMG"), PathBuf::from("M104318871RE.IMG")];
//!     run_pipeline(config, images).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod isis;
pub mod pipeline;

pub use config::Config;
pub use error::PipelineError;
pub use index::{build_pairs, AcquisitionId, CubePair, PairManifest, Side};
pub use io::Offsets;
pub use pipeline::{JobPool, Pipeline, PipelineOutcome, PipelineReport, RunStats, StageContext};

use anyhow::Result;
use std::path::PathBuf;

/// Run the full NAC pipeline on `images` with the given configuration.
pub async fn run_pipeline(config: Config, images: Vec<PathBuf>) -> Result<PipelineReport> {
    config.validate()?;
    pipeline::validate_inputs(&images)?;

    tracing::info!("Starting LRO NAC Mosaic Pipeline");

    if config.processing.check_environment {
        let version = isis::detect_version()?;
        tracing::info!("ISIS version {}", version);
    }

    let mut pipeline = Pipeline::new(&config);
    let report = pipeline.run(&images).await?;

    tracing::info!("Pipeline complete: {}", report.stats);

    Ok(report)
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}
