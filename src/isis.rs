//! ISIS environment detection.
//!
//! The pipeline shells out to ISIS programs, which only work inside a
//! configured ISIS environment. We check for `$ISISROOT` and a readable
//! version marker before any processing starts.

use crate::error::{PipelineError, Result};
use std::fmt;
use std::path::Path;

/// Environment variable pointing at the ISIS installation.
pub const ISISROOT: &str = "ISISROOT";

const VERSION_DECL: &str = "std::string version(";

/// A parsed ISIS version such as `3.4.1b`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IsisVersion {
    /// Dotted numeric components, most significant first
    pub numbers: Vec<u32>,

    /// Trailing non-numeric qualifier, e.g. `b` or `beta`
    pub suffix: Option<String>,
}

impl IsisVersion {
    /// Parse a leading dotted version number plus an optional qualifier.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let numeric_len = text
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(text.len());
        let (numeric, rest) = text.split_at(numeric_len);

        let numbers = numeric
            .trim_end_matches('.')
            .split('.')
            .map(str::parse::<u32>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .ok()?;

        let suffix = rest.trim();
        Some(Self {
            numbers,
            suffix: (!suffix.is_empty()).then(|| suffix.to_string()),
        })
    }
}

impl fmt::Display for IsisVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numbers: Vec<String> = self.numbers.iter().map(u32::to_string).collect();
        write!(f, "{}", numbers.join("."))?;
        if let Some(suffix) = &self.suffix {
            write!(f, "{suffix}")?;
        }
        Ok(())
    }
}

/// Detect the ISIS version of the installation named by `$ISISROOT`.
pub fn detect_version() -> Result<IsisVersion> {
    let root = std::env::var_os(ISISROOT).ok_or_else(|| {
        PipelineError::Environment(format!(
            "The ISIS environment does not seem to be enabled. \
             The {ISISROOT} environment variable must be set."
        ))
    })?;
    detect_version_in(Path::new(&root))
}

/// Detect the ISIS version installed under `root`.
///
/// `<root>/version` is read first; a version declared in
/// `<root>/inc/Constants.h` takes precedence when present.
pub fn detect_version_in(root: &Path) -> Result<IsisVersion> {
    let mut raw = std::fs::read_to_string(root.join("version"))
        .ok()
        .and_then(|text| text.lines().next().map(|l| l.trim().to_string()))
        .filter(|v| !v.is_empty());

    if let Ok(header) = std::fs::read_to_string(root.join("inc").join("Constants.h")) {
        if let Some(declared) = header.lines().find_map(version_declaration) {
            raw = Some(declared);
        }
    }

    let raw = raw.ok_or_else(|| {
        PipelineError::Environment(format!(
            "Could not find an ISIS version string under {}",
            root.display()
        ))
    })?;

    IsisVersion::parse(&raw).ok_or_else(|| {
        PipelineError::Environment(format!(
            "Unparseable ISIS version {raw:?} under {}",
            root.display()
        ))
    })
}

/// Version text from a line like `std::string version("3.4.1 | 2012-03-27");`.
fn version_declaration(line: &str) -> Option<String> {
    if !line.contains(VERSION_DECL) {
        return None;
    }
    let start = line.find("version(\"")? + "version(\"".len();
    let rest = &line[start..];
    let end = rest.rfind('|').or_else(|| rest.find('"'))?;
    Some(rest[..end].trim_end().to_string())
}
