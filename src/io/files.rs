//! Output path derivation and intermediate-file housekeeping.
//!
//! Every stage writes next to its input: the last extension is dropped and a
//! stage tag plus `.cub` is appended, so `M104318871LE.IMG` becomes
//! `M104318871LE.cub`, then `M104318871LE.lronaccal.cub`, and so on.

use crate::error::{PipelineError, Result};
use std::collections::HashSet;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const CUBE_EXTENSION: &str = "cub";

/// Derive the output path of a stage from its input.
///
/// An empty `tag` yields a plain `.cub` (format conversion).
pub fn stage_output(input: &Path, tag: &str) -> PathBuf {
    let mut name: OsString = input.with_extension("").into_os_string();
    if !tag.is_empty() {
        name.push(".");
        name.push(tag);
    }
    name.push(".");
    name.push(CUBE_EXTENSION);
    PathBuf::from(name)
}

/// Fail if any two paths are equal.
pub fn ensure_unique<'a, I>(paths: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut seen = HashSet::new();
    for path in paths {
        if !seen.insert(path) {
            return Err(PipelineError::DuplicateOutput {
                path: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

/// Fail with `MissingOutput` for the first path that is not on disk.
pub fn verify_outputs<'a, I>(stage: &str, paths: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Path>,
{
    for path in paths {
        if !path.exists() {
            return Err(PipelineError::MissingOutput {
                stage: stage.to_string(),
                path: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

/// Remove files, ignoring ones that are already gone. Returns how many were removed.
pub fn remove_files<'a, I>(paths: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!("Removed {}", path.display());
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(removed)
}

/// Longest common string prefix of the given paths.
pub fn common_prefix<P: AsRef<Path>>(paths: &[P]) -> String {
    let mut iter = paths.iter().map(|p| p.as_ref().to_string_lossy().into_owned());
    let Some(mut prefix) = iter.next() else {
        return String::new();
    };

    for path in iter {
        let len = prefix
            .char_indices()
            .zip(path.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map_or(0, |((i, a), _)| i + a.len_utf8());
        prefix.truncate(len);
    }
    prefix
}

/// Remove every file matching `<common prefix of inputs>*<suffix>`.
///
/// This is how the toolchain's per-cube log files are found: they share the
/// input cubes' prefix and end with a tool-specific suffix.
pub fn remove_companion_logs<P: AsRef<Path>>(inputs: &[P], suffix: &str) -> Result<usize> {
    if inputs.is_empty() {
        return Ok(0);
    }

    let prefix = common_prefix(inputs);
    let (dir, name_prefix) = if prefix.is_empty() || prefix.ends_with(std::path::MAIN_SEPARATOR) {
        let dir = if prefix.is_empty() { "." } else { prefix.as_str() };
        (PathBuf::from(dir), String::new())
    } else {
        let path = Path::new(&prefix);
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (dir, name)
    };

    let mut matches = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&name_prefix)
            && name.ends_with(suffix)
            && entry.file_type()?.is_file()
        {
            matches.push(entry.path());
        }
    }

    remove_files(matches.iter().map(PathBuf::as_path))
}
