//! Stage functions.
//!
//! Each stage maps a manifest of input cubes to a manifest of output cubes:
//!
//! ```text
//! IMG ─▶ lronac2isis ─▶ spiceinit/spicefit ─┬─▶ lronaccal
//!                                            └─▶ lronacecho ─▶ pairs ─▶ noproj
//!        ─▶ lronacjitreg ─▶ handmos ─▶ cubenorm
//! ```
//!
//! Every stage follows the same shape:
//! 1. Derive one output path per input (suffix substitution, checked unique).
//! 2. Skip inputs whose output already exists, so an interrupted run resumes.
//! 3. Submit the rest to the job pool, then drain it. Stages never overlap.
//! 4. Confirm every output is on disk before touching the inputs.
//!
//! If any job fails, the outputs launched by that stage are removed so the
//! next run does not mistake a partial cube for a finished one.

use super::job_pool::JobPool;
use super::stats::RunStats;
use super::tools::{Placement, ToolCommand, Toolchain};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::index::{AcquisitionId, CubePair, PairManifest};
use crate::io::{files, read_offsets, Offsets};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONVERT: &str = "lronac2isis";
pub const SPICEINIT: &str = "spiceinit";
pub const SPICEFIT: &str = "spicefit";
pub const CALIBRATE: &str = "lronaccal";
pub const ECHO: &str = "lronacecho";
pub const NOPROJ: &str = "noproj";
pub const JITTER: &str = "lronacjitreg";
pub const MOSAIC: &str = "handmos";
pub const NORMALIZE: &str = "cubenorm";

/// Output tags appended before `.cub`.
const CALIBRATE_TAG: &str = "lronaccal";
const ECHO_TAG: &str = "lronacecho";
const NOPROJ_TAG: &str = "noproj";
const MOSAIC_TAG: &str = "mosaic";
const NORMALIZE_TAG: &str = "norm";

/// Log files lronaccal leaves beside its inputs.
pub const CALIBRATE_LOG_SUFFIX: &str = ".lronaccal.log";

/// Ordered list of cubes, one per input image.
pub type CubeList = Vec<PathBuf>;

/// Measured right-vs-left shift per acquisition.
pub type OffsetManifest = BTreeMap<AcquisitionId, Offsets>;

/// One cube per acquisition (mosaics and their normalized versions).
pub type MosaicManifest = BTreeMap<AcquisitionId, PathBuf>;

/// A job a stage decided to run.
struct PlannedJob {
    /// File the job creates; `None` for tools that update their input in place.
    output: Option<PathBuf>,

    /// Copied to `output` right before launch; the tool then edits the copy.
    seed: Option<PathBuf>,

    command: ToolCommand,
}

impl PlannedJob {
    fn creating(output: PathBuf, command: ToolCommand) -> Self {
        Self {
            output: Some(output),
            seed: None,
            command,
        }
    }

    fn in_place(command: ToolCommand) -> Self {
        Self {
            output: None,
            seed: None,
            command,
        }
    }
}

/// Everything a stage needs: the job pool, the command builder and the run's counters.
pub struct StageContext {
    pool: JobPool,
    toolchain: Toolchain,
    stats: RunStats,
}

impl StageContext {
    pub fn new(toolchain: Toolchain, pool: JobPool) -> Self {
        Self {
            pool,
            toolchain,
            stats: RunStats::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Toolchain::new(config), JobPool::new(config.processing.threads))
    }

    pub fn pool(&self) -> &JobPool {
        &self.pool
    }

    /// Counters so far, including the pool's.
    pub fn stats(&self) -> RunStats {
        let mut stats = self.stats.clone();
        stats.absorb_pool(self.pool.stats());
        stats
    }

    /// lronac2isis: raw EDR image → ISIS cube.
    pub async fn convert(&mut self, images: &[PathBuf]) -> Result<CubeList> {
        self.one_to_one(CONVERT, images, "", Toolchain::lronac2isis).await
    }

    /// spiceinit then spicefit on every cube, in place.
    pub async fn attach_spice(&mut self, cubes: &[PathBuf]) -> Result<()> {
        let init = cubes
            .iter()
            .map(|c| PlannedJob::in_place(self.toolchain.spiceinit(c)))
            .collect();
        self.run_batch(SPICEINIT, init).await?;
        self.stats.stages_completed += 1;

        let fit = cubes
            .iter()
            .map(|c| PlannedJob::in_place(self.toolchain.spicefit(c)))
            .collect();
        self.run_batch(SPICEFIT, fit).await?;
        self.stats.stages_completed += 1;
        Ok(())
    }

    /// lronaccal: radiometric calibration.
    ///
    /// Inputs are left in place: echo correction reads the same cubes, so the
    /// driver removes them (and the `*.lronaccal.log` files) with
    /// [`Self::remove_cubes_and_logs`] once both have run.
    pub async fn calibrate(&mut self, cubes: &[PathBuf]) -> Result<CubeList> {
        self.one_to_one(CALIBRATE, cubes, CALIBRATE_TAG, Toolchain::lronaccal)
            .await
    }

    /// lronacecho: echo correction. Inputs are left in place, as for [`Self::calibrate`].
    pub async fn echo_correct(&mut self, cubes: &[PathBuf]) -> Result<CubeList> {
        self.one_to_one(ECHO, cubes, ECHO_TAG, Toolchain::lronacecho).await
    }

    /// noproj: remove camera distortion from both CCDs of every pair.
    ///
    /// The left cube is the geometric reference for both sides, including itself.
    pub async fn noproj(&mut self, pairs: &PairManifest, delete: bool) -> Result<PairManifest> {
        let mut outputs = PairManifest::new();
        for (id, pair) in pairs {
            let (left, right) = pair.complete(*id)?;
            outputs.insert(
                *id,
                CubePair::new(
                    files::stage_output(left, NOPROJ_TAG),
                    files::stage_output(right, NOPROJ_TAG),
                ),
            );
        }
        files::ensure_unique(pair_paths(&outputs))?;

        let mut jobs = Vec::new();
        for (id, pair) in pairs {
            let (left, right) = pair.complete(*id)?;
            let (left_out, right_out) = outputs[id].complete(*id)?;
            for (from, to) in [(left, left_out), (right, right_out)] {
                if self.already_done(NOPROJ, to) {
                    continue;
                }
                let command = self.toolchain.noproj(from, to, left);
                jobs.push(PlannedJob::creating(to.to_path_buf(), command));
            }
        }

        self.run_batch(NOPROJ, jobs).await?;
        files::verify_outputs(NOPROJ, pair_paths(&outputs))?;
        self.stats.stages_completed += 1;

        if delete {
            self.remove_intermediate(pair_paths(pairs))?;
        }
        Ok(outputs)
    }

    /// lronacjitreg: measure the mean shift between each pair's CCDs.
    pub async fn measure_jitter(&mut self, pairs: &PairManifest) -> Result<OffsetManifest> {
        if let Some(dir) = &self.toolchain.jitter().log_dir {
            std::fs::create_dir_all(dir)?;
        }

        let mut logs = Vec::with_capacity(pairs.len());
        for (id, pair) in pairs {
            let (left, right) = pair.complete(*id)?;
            let log = self.toolchain.jitter().log_path(left, id);
            logs.push((*id, log, left, right));
        }
        files::ensure_unique(logs.iter().map(|(_, log, _, _)| log.as_path()))?;

        let mut jobs = Vec::new();
        for (_, log, left, right) in &logs {
            if self.already_done(JITTER, log) {
                continue;
            }
            let command = self.toolchain.lronacjitreg(log, left, right);
            jobs.push(PlannedJob::creating(log.clone(), command));
        }

        self.run_batch(JITTER, jobs).await?;
        files::verify_outputs(JITTER, logs.iter().map(|(_, log, _, _)| log.as_path()))?;
        self.stats.stages_completed += 1;

        let mut offsets = OffsetManifest::new();
        for (id, log, _, _) in &logs {
            tracing::info!("Reading log file {}", log.display());
            let measured = read_offsets(log)?;
            tracing::info!(
                "{}: sample offset {:.3}, line offset {:.3}",
                id,
                measured.sample,
                measured.line
            );
            offsets.insert(*id, measured);
        }
        Ok(offsets)
    }

    /// handmos: copy the left cube to the mosaic path, then merge the right
    /// cube on top of it at the measured offset.
    pub async fn mosaic(
        &mut self,
        pairs: &PairManifest,
        offsets: &OffsetManifest,
    ) -> Result<MosaicManifest> {
        let mut mosaics = MosaicManifest::new();
        for (id, pair) in pairs {
            let (left, _) = pair.complete(*id)?;
            mosaics.insert(*id, files::stage_output(left, MOSAIC_TAG));
        }
        files::ensure_unique(mosaics.values().map(PathBuf::as_path))?;

        let reference_sample = self.toolchain.mosaic().reference_sample;
        let mut jobs = Vec::new();
        for (id, pair) in pairs {
            let (left, right) = pair.complete(*id)?;
            let mosaic = &mosaics[id];
            if self.already_done(MOSAIC, mosaic) {
                continue;
            }

            let measured = offsets
                .get(id)
                .copied()
                .ok_or(PipelineError::MissingOffsets { id: *id })?;
            let placement = Placement::from_offsets(measured, reference_sample)?;
            tracing::info!(
                "{}: placing right CCD at sample {}, line {}",
                id,
                placement.out_sample,
                placement.out_line
            );

            jobs.push(PlannedJob {
                output: Some(mosaic.clone()),
                seed: Some(left.to_path_buf()),
                command: self.toolchain.handmos(right, mosaic, placement),
            });
        }

        self.run_batch(MOSAIC, jobs).await?;
        files::verify_outputs(MOSAIC, mosaics.values().map(PathBuf::as_path))?;
        self.stats.stages_completed += 1;
        Ok(mosaics)
    }

    /// cubenorm: statistical normalization of each mosaic.
    pub async fn normalize(
        &mut self,
        mosaics: &MosaicManifest,
        delete: bool,
    ) -> Result<MosaicManifest> {
        let inputs: CubeList = mosaics.values().cloned().collect();
        let outputs = self
            .one_to_one(NORMALIZE, &inputs, NORMALIZE_TAG, Toolchain::cubenorm)
            .await?;
        if delete {
            self.remove_intermediate(inputs.iter().map(PathBuf::as_path))?;
        }
        Ok(mosaics.keys().copied().zip(outputs).collect())
    }

    /// Remove files no later stage needs, counting them in the run stats.
    pub fn remove_intermediate<'a, I>(&mut self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        self.stats.files_removed += files::remove_files(paths)?;
        Ok(())
    }

    /// Remove cubes plus the logs sharing their prefix and ending in `log_suffix`.
    pub fn remove_cubes_and_logs(&mut self, cubes: &[PathBuf], log_suffix: &str) -> Result<()> {
        self.remove_intermediate(cubes.iter().map(PathBuf::as_path))?;
        self.stats.files_removed += files::remove_companion_logs(cubes, log_suffix)?;
        Ok(())
    }

    /// Shared body of the 1:1 stages.
    async fn one_to_one<F>(
        &mut self,
        stage: &str,
        inputs: &[PathBuf],
        tag: &str,
        build: F,
    ) -> Result<CubeList>
    where
        F: Fn(&Toolchain, &Path, &Path) -> ToolCommand,
    {
        let outputs: CubeList = inputs.iter().map(|i| files::stage_output(i, tag)).collect();
        files::ensure_unique(outputs.iter().map(PathBuf::as_path))?;

        let mut jobs = Vec::new();
        for (input, output) in inputs.iter().zip(&outputs) {
            if self.already_done(stage, output) {
                continue;
            }
            let command = build(&self.toolchain, input, output);
            jobs.push(PlannedJob::creating(output.clone(), command));
        }

        self.run_batch(stage, jobs).await?;
        files::verify_outputs(stage, outputs.iter().map(PathBuf::as_path))?;
        self.stats.stages_completed += 1;
        Ok(outputs)
    }

    fn already_done(&mut self, stage: &str, output: &Path) -> bool {
        if output.exists() {
            tracing::info!("{} exists, skipping {}", output.display(), stage);
            self.stats.outputs_skipped += 1;
            true
        } else {
            false
        }
    }

    /// Submit every job, then wait for all of them.
    async fn run_batch(&mut self, stage: &str, jobs: Vec<PlannedJob>) -> Result<()> {
        let mut launched: Vec<PathBuf> = Vec::with_capacity(jobs.len());
        let mut outcome: Result<()> = Ok(());

        for job in jobs {
            if let Some(output) = &job.output {
                launched.push(output.clone());
                if let Some(seed) = &job.seed {
                    if let Err(e) = tokio::fs::copy(seed, output).await {
                        outcome = Err(e.into());
                        break;
                    }
                }
            }
            if let Err(e) = self.pool.submit(stage, job.command).await {
                outcome = Err(e);
                break;
            }
        }

        if outcome.is_ok() {
            outcome = self.pool.drain().await;
        }

        if let Err(e) = outcome {
            self.pool.abort_all().await;
            if !launched.is_empty() {
                tracing::warn!("{}: removing {} unfinished outputs", stage, launched.len());
                if let Err(rm) = files::remove_files(launched.iter().map(PathBuf::as_path)) {
                    tracing::warn!("{}: cleanup failed: {}", stage, rm);
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Every populated slot of every pair.
pub fn pair_paths(pairs: &PairManifest) -> impl Iterator<Item = &Path> {
    pairs.values().flat_map(CubePair::paths)
}
