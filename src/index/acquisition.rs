//! Acquisition identifiers parsed from NAC cube filenames.
//!
//! NAC products are named `<letter><9-digit acquisition number><side>...`,
//! e.g. `M104318871LE.IMG`. Everything after the side letter (the trailing
//! `E`, the extension, and any stage suffixes appended by the pipeline) is
//! ignored, so the same parser works at every stage.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{PipelineError, Result};

static NAC_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z](?P<id>\d{9})(?P<side>[A-Z])").expect("NAC filename pattern is valid")
});

/// Acquisition number shared by the left and right CCD of one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AcquisitionId(pub u64);

impl fmt::Display for AcquisitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:09}", self.0)
    }
}

/// CCD half an image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Identity of one cube: which acquisition and which CCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubeName {
    pub id: AcquisitionId,
    pub side: Side,
}

impl CubeName {
    /// Parse the file name component of `path`.
    ///
    /// `L` selects the left CCD; any other capital letter in the side
    /// position is treated as the right CCD.
    pub fn parse(path: &Path) -> Result<Self> {
        let mismatch = || PipelineError::FilenameMismatch {
            path: path.to_path_buf(),
        };

        let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(mismatch)?;
        let caps = NAC_FILENAME.captures(name).ok_or_else(mismatch)?;

        let id = caps["id"].parse::<u64>().map_err(|_| mismatch())?;
        let side = if &caps["side"] == "L" { Side::Left } else { Side::Right };

        Ok(Self {
            id: AcquisitionId(id),
            side,
        })
    }
}
