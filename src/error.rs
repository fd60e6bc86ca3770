//! Errors the pipeline detects and refuses to continue past.

use std::path::PathBuf;

use thiserror::Error;

use crate::index::{AcquisitionId, Side};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "{} does not match the NAC filename pattern <letter><9-digit id><side>",
        path.display()
    )]
    FilenameMismatch { path: PathBuf },

    #[error("acquisition {id} has two {side} cubes: {} and {}", first.display(), second.display())]
    DuplicateSide {
        id: AcquisitionId,
        side: Side,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("acquisition {id} is missing its {missing} cube")]
    IncompletePair { id: AcquisitionId, missing: Side },

    #[error("no jitter offsets were measured for acquisition {id}")]
    MissingOffsets { id: AcquisitionId },

    #[error("two inputs derive the same output {}", path.display())]
    DuplicateOutput { path: PathBuf },

    #[error("{stage}: `{command}` exited with {}: {stderr}", exit_description(*code))]
    JobFailed {
        stage: String,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{stage}: failed to launch {program}: {source}")]
    JobSpawn {
        stage: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage}: expected output {} was not produced", path.display())]
    MissingOutput { stage: String, path: PathBuf },

    #[error("ISIS environment error: {0}")]
    Environment(String),

    #[error("{}: unreadable offset in line {line:?}", path.display())]
    OffsetParse { path: PathBuf, line: String },

    #[error("offsets ({sample}, {line}) give no valid placement from sample {reference_sample}")]
    PlacementOutOfRange {
        sample: f64,
        line: f64,
        reference_sample: i64,
    },
}

fn exit_description(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
