//! Command lines for the external ISIS / ASP programs.
//!
//! Programs are launched directly (no shell), with ISIS-style `key=value`
//! arguments. [`ToolCommand`]'s `Display` renders the line as it would be
//! typed, which is what gets logged for every submitted job.

use crate::config::{Config, JitterConfig, MosaicConfig, ToolsConfig};
use crate::error::{PipelineError, Result};
use crate::io::Offsets;
use std::fmt;
use std::path::{Path, PathBuf};

/// One external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    /// Append `key=value`.
    pub fn kv(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.args.push(format!("{key}={value}"));
        self
    }

    /// Append `key=<path>`.
    pub fn path(self, key: &str, path: &Path) -> Self {
        let value = path.display().to_string();
        self.kv(key, value)
    }

    /// Append a bare argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Value of the first `key=value` argument, if any.
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|a| {
            a.split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Where handmos puts the right CCD inside the mosaic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub out_sample: i64,
    pub in_sample: i64,
    pub out_line: i64,
}

impl Placement {
    /// Shift the reference column by the rounded mean offsets.
    ///
    /// Rounding is half away from zero. Offsets that are not finite, or that
    /// move the placement outside the `i32` range, are rejected.
    pub fn from_offsets(offsets: Offsets, reference_sample: i64) -> Result<Self> {
        let out_of_range = || PipelineError::PlacementOutOfRange {
            sample: offsets.sample,
            line: offsets.line,
            reference_sample,
        };

        let sample = pixel_shift(offsets.sample).ok_or_else(out_of_range)?;
        let line = pixel_shift(offsets.line).ok_or_else(out_of_range)?;
        let out_sample = reference_sample
            .checked_add(sample)
            .filter(|s| i32::try_from(*s).is_ok())
            .ok_or_else(out_of_range)?;

        Ok(Self {
            out_sample,
            in_sample: reference_sample,
            out_line: line,
        })
    }
}

/// Round to whole pixels; `None` unless the result fits in an `i32`.
fn pixel_shift(offset: f64) -> Option<i64> {
    let rounded = offset.round();
    let limit = f64::from(i32::MAX);
    // NaN fails this comparison too.
    (rounded.abs() <= limit).then_some(rounded as i64)
}

/// Builds every command the pipeline runs from the loaded configuration.
#[derive(Debug, Clone)]
pub struct Toolchain {
    tools: ToolsConfig,
    jitter: JitterConfig,
    mosaic: MosaicConfig,
}

impl Toolchain {
    pub fn new(config: &Config) -> Self {
        Self {
            tools: config.tools.clone(),
            jitter: config.jitter.clone(),
            mosaic: config.mosaic.clone(),
        }
    }

    pub fn jitter(&self) -> &JitterConfig {
        &self.jitter
    }

    pub fn mosaic(&self) -> &MosaicConfig {
        &self.mosaic
    }

    fn program(&self, name: &str) -> ToolCommand {
        ToolCommand::new(self.tools.program(name))
    }

    pub fn lronac2isis(&self, from: &Path, to: &Path) -> ToolCommand {
        self.program(&self.tools.lronac2isis).path("from", from).path("to", to)
    }

    pub fn spiceinit(&self, cube: &Path) -> ToolCommand {
        self.program(&self.tools.spiceinit)
            .kv("web", isis_bool(self.tools.spiceinit_web))
            .path("from", cube)
    }

    pub fn spicefit(&self, cube: &Path) -> ToolCommand {
        self.program(&self.tools.spicefit).path("from", cube)
    }

    pub fn lronaccal(&self, from: &Path, to: &Path) -> ToolCommand {
        self.program(&self.tools.lronaccal).path("from", from).path("to", to)
    }

    pub fn lronacecho(&self, from: &Path, to: &Path) -> ToolCommand {
        self.program(&self.tools.lronacecho).path("from", from).path("to", to)
    }

    /// Remove camera distortion from `from`, matching the geometry of `reference`.
    pub fn noproj(&self, from: &Path, to: &Path, reference: &Path) -> ToolCommand {
        self.program(&self.tools.noproj)
            .path("from", from)
            .path("to", to)
            .path("match", reference)
    }

    pub fn lronacjitreg(&self, row_log: &Path, left: &Path, right: &Path) -> ToolCommand {
        let j = &self.jitter;
        let mut cmd = self
            .program(&self.tools.lronacjitreg)
            .arg("--correlator-type")
            .arg(j.correlator_type.to_string())
            .arg("--xkernel")
            .arg(j.x_kernel.to_string())
            .arg("--ykernel")
            .arg(j.y_kernel.to_string());
        if j.pyramid {
            cmd = cmd.arg("--pyramid");
        }
        cmd.arg("--h-corr-min")
            .arg(j.h_corr[0].to_string())
            .arg("--h-corr-max")
            .arg(j.h_corr[1].to_string())
            .arg("--v-corr-min")
            .arg(j.v_corr[0].to_string())
            .arg("--v-corr-max")
            .arg(j.v_corr[1].to_string())
            .arg("--cropWidth")
            .arg(j.crop_width.to_string())
            .arg("--rowLog")
            .arg(row_log.display().to_string())
            .arg(left.display().to_string())
            .arg(right.display().to_string())
    }

    /// Merge `from` into an existing `mosaic` at `placement`.
    pub fn handmos(&self, from: &Path, mosaic: &Path, placement: Placement) -> ToolCommand {
        self.program(&self.tools.handmos)
            .path("from", from)
            .path("mosaic", mosaic)
            .kv("outsample", placement.out_sample)
            .kv("insample", placement.in_sample)
            .kv("outline", placement.out_line)
            .kv("matchbandbin", isis_bool(self.mosaic.match_band_bin))
            .kv("priority", &self.mosaic.priority)
    }

    pub fn cubenorm(&self, from: &Path, to: &Path) -> ToolCommand {
        self.program(&self.tools.cubenorm).path("from", from).path("to", to)
    }
}

fn isis_bool(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}
