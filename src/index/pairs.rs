//! Left/right CCD pairing.

use super::{AcquisitionId, CubeName, Side};
use crate::error::{PipelineError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The two CCD cubes of one acquisition. A slot stays `None` until a file
/// for that side is seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CubePair {
    pub left: Option<PathBuf>,
    pub right: Option<PathBuf>,
}

impl CubePair {
    pub fn new(left: PathBuf, right: PathBuf) -> Self {
        Self {
            left: Some(left),
            right: Some(right),
        }
    }

    /// Populated slots, left first.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        [self.left.as_deref(), self.right.as_deref()].into_iter().flatten()
    }

    fn slot_mut(&mut self, side: Side) -> &mut Option<PathBuf> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Both paths, or `IncompletePair` naming the first empty slot.
    pub fn complete(&self, id: AcquisitionId) -> Result<(&Path, &Path)> {
        match (self.left.as_deref(), self.right.as_deref()) {
            (Some(left), Some(right)) => Ok((left, right)),
            (None, _) => Err(PipelineError::IncompletePair {
                id,
                missing: Side::Left,
            }),
            (_, None) => Err(PipelineError::IncompletePair {
                id,
                missing: Side::Right,
            }),
        }
    }
}

/// Pairs keyed by acquisition, iterated in ascending id order.
pub type PairManifest = BTreeMap<AcquisitionId, CubePair>;

/// Sort cubes into left/right pairs by the acquisition number in their names.
///
/// Fails on the first name that does not match the NAC pattern, and when two
/// files land in the same slot. Pairs with a missing side are returned as-is;
/// stages that need both sides reject them via [`CubePair::complete`].
pub fn build_pairs<P: AsRef<Path>>(cubes: &[P]) -> Result<PairManifest> {
    let mut pairs = PairManifest::new();

    for cube in cubes {
        let cube = cube.as_ref();
        let name = CubeName::parse(cube)?;
        let slot = pairs.entry(name.id).or_default().slot_mut(name.side);

        if let Some(existing) = slot {
            return Err(PipelineError::DuplicateSide {
                id: name.id,
                side: name.side,
                first: existing.clone(),
                second: cube.to_path_buf(),
            });
        }

        tracing::debug!("{} {} --> {}", name.id, name.side, cube.display());
        *slot = Some(cube.to_path_buf());
    }

    Ok(pairs)
}

/// Acquisitions whose pair is missing a side.
pub fn incomplete_pairs(pairs: &PairManifest) -> Vec<(AcquisitionId, Side)> {
    pairs
        .iter()
        .filter_map(|(id, pair)| match pair.complete(*id) {
            Err(PipelineError::IncompletePair { missing, .. }) => Some((*id, missing)),
            _ => None,
        })
        .collect()
}
