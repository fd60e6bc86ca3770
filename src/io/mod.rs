//! File-level I/O: output path derivation, cleanup and jitter log parsing.

pub mod files;
mod jitter_log;

pub use jitter_log::{parse_offsets, read_offsets, Offsets};
