//! Cube naming and left/right pairing.

mod acquisition;
mod pairs;

pub use acquisition::{AcquisitionId, CubeName, Side};
pub use pairs::{build_pairs, incomplete_pairs, CubePair, PairManifest};
