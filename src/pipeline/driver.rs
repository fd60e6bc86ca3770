//! End-to-end sequencing of the stages.
//!
//! The driver is a straight line: every stage is a barrier, and the output
//! manifest of one stage is the input of the next. Calibration and echo
//! correction are two independent branches over the same converted cubes;
//! only the echo-corrected branch continues to pairing and mosaicking.

use super::stages::{self, CubeList, MosaicManifest, StageContext};
use super::stats::RunStats;
use crate::config::Config;
use crate::index::{build_pairs, incomplete_pairs, PairManifest};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Instant;

/// Where a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Run was asked to stop once noproj finished.
    StoppedAfterNoproj { pairs: PairManifest },

    /// Every stage ran.
    Completed { normalized: MosaicManifest },
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Radiometrically calibrated cubes (the calibration branch)
    pub calibrated: CubeList,

    pub outcome: PipelineOutcome,

    pub stats: RunStats,
}

/// Fail unless `images` is non-empty and every entry is an existing file.
pub fn validate_inputs(images: &[PathBuf]) -> Result<()> {
    if images.is_empty() {
        anyhow::bail!("need .IMG files");
    }
    for image in images {
        if !image.is_file() {
            anyhow::bail!("Input file not found: {}", image.display());
        }
    }
    Ok(())
}

/// Runs the stage sequence for one set of raw images.
pub struct Pipeline {
    ctx: StageContext,
    delete: bool,
    stop_after_noproj: bool,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        Self::with_context(StageContext::from_config(config), config)
    }

    /// Use a prepared stage context (own pool, own toolchain).
    pub fn with_context(ctx: StageContext, config: &Config) -> Self {
        Self {
            ctx,
            delete: config.processing.delete_intermediate,
            stop_after_noproj: config.processing.stop_after_noproj,
        }
    }

    /// Run every stage on `images`.
    pub async fn run(&mut self, images: &[PathBuf]) -> Result<PipelineReport> {
        let start = Instant::now();
        let delete = self.delete;
        let ctx = &mut self.ctx;

        tracing::info!(
            "Beginning processing of {} images ({} concurrent jobs)",
            images.len(),
            ctx.pool().capacity()
        );

        tracing::info!("lronac2isis");
        let cubes = ctx.convert(images).await?;

        tracing::info!("spice");
        ctx.attach_spice(&cubes).await?;

        tracing::info!("lronaccal");
        let calibrated = ctx.calibrate(&cubes).await?;

        tracing::info!("lronacecho");
        let echoed = ctx.echo_correct(&cubes).await?;

        // Both branches read the converted cubes, so they go only after both ran.
        if delete {
            ctx.remove_cubes_and_logs(&cubes, stages::CALIBRATE_LOG_SUFFIX)?;
        }

        tracing::info!("build_cube_pairs");
        let pairs = build_pairs(&echoed).context("Failed to pair echo-corrected cubes")?;
        for (id, side) in incomplete_pairs(&pairs) {
            tracing::warn!("Acquisition {} has no {} cube", id, side);
        }

        tracing::info!("noproj");
        let noprojed = ctx.noproj(&pairs, delete).await?;

        if self.stop_after_noproj {
            tracing::info!("Stopping after noproj as requested");
            let outcome = PipelineOutcome::StoppedAfterNoproj { pairs: noprojed };
            return Ok(self.report(calibrated, outcome, start));
        }

        tracing::info!("lronacjitreg");
        let offsets = ctx.measure_jitter(&noprojed).await?;

        tracing::info!("mosaic");
        let mosaics = ctx.mosaic(&noprojed, &offsets).await?;

        if delete {
            ctx.remove_intermediate(stages::pair_paths(&noprojed))?;
        }

        tracing::info!("cubenorm");
        let normalized = ctx.normalize(&mosaics, delete).await?;

        tracing::info!("Finished");
        Ok(self.report(calibrated, PipelineOutcome::Completed { normalized }, start))
    }

    fn report(
        &self,
        calibrated: CubeList,
        outcome: PipelineOutcome,
        start: Instant,
    ) -> PipelineReport {
        let mut stats = self.ctx.stats();
        stats.elapsed = start.elapsed();
        PipelineReport {
            calibrated,
            outcome,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_inputs_rejects_empty() {
        assert!(validate_inputs(&[]).is_err());
    }

    #[test]
    fn test_validate_inputs_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("M000000100LE.IMG");
        std::fs::write(&present, b"edr").unwrap();
        let missing = dir.path().join("M000000100RE.IMG");

        assert!(validate_inputs(&[present.clone()]).is_ok());
        let err = validate_inputs(&[present, missing]).unwrap_err();
        assert!(err.to_string().contains("M000000100RE.IMG"));
    }

    #[test]
    fn test_validate_inputs_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_inputs(&[dir.path().to_path_buf()]).is_err());
    }
}
