//! Reader for the row log written by `lronacjitreg`.
//!
//! The log is free text. The two lines of interest look like:
//!
//! ```text
//! Average Sample Offset: 3.25  StdDev: 0.10
//! Average Line Offset: -1.75  StdDev: 0.05
//! ```
//!
//! Everything else is ignored.

use crate::error::{PipelineError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const SAMPLE_LABEL: &str = "Average Sample Offset:";
const LINE_LABEL: &str = "Average Line Offset:";
const VALUE_START: &str = "Offset:";
const VALUE_END: &str = "StdDev:";

/// Mean shift of the right CCD relative to the left, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Offsets {
    pub sample: f64,
    pub line: f64,
}

/// Read the offsets from a log file on disk.
pub fn read_offsets(path: &Path) -> Result<Offsets> {
    let file = File::open(path)?;
    parse_offsets(BufReader::new(file), path)
}

/// Scan `reader` line by line for the two average-offset fields.
///
/// A field that never appears stays at 0.0. `path` is only used in errors.
pub fn parse_offsets<R: BufRead>(reader: R, path: &Path) -> Result<Offsets> {
    let mut offsets = Offsets::default();
    let mut found = (false, false);

    for line in reader.lines() {
        let line = line?;
        if line.contains(SAMPLE_LABEL) {
            offsets.sample = field_value(&line, path)?;
            found.0 = true;
        } else if line.contains(LINE_LABEL) {
            offsets.line = field_value(&line, path)?;
            found.1 = true;
        }
    }

    if !found.0 {
        tracing::warn!("{}: no sample offset, using 0.0", path.display());
    }
    if !found.1 {
        tracing::warn!("{}: no line offset, using 0.0", path.display());
    }

    Ok(offsets)
}

/// The number between the last `Offset:` and the following `StdDev:`.
///
/// `nan` and `inf` parse as floats but are what the correlator prints when it
/// found no match, so they are rejected like any other unreadable value.
fn field_value(line: &str, path: &Path) -> Result<f64> {
    let bad = || PipelineError::OffsetParse {
        path: path.to_path_buf(),
        line: line.to_string(),
    };

    let start = line.rfind(VALUE_START).ok_or_else(bad)? + VALUE_START.len();
    let rest = &line[start..];
    let value = match rest.find(VALUE_END) {
        Some(end) => &rest[..end],
        None => rest,
    };

    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(bad()),
    }
}
