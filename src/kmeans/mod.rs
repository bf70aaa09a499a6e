//! The k-means engine (spec §2 "K-means engine", §4.2-§4.7): the
//! partitioning core. Submodules map onto the spec sections one-to-one:
//! [`centers`] (§4.2), [`influence`] and [`assign`] (§4.3), [`sampling`]
//! (§4.4), [`recompute`] (§4.5), [`hierarchical`] (§4.6), [`rebalance`]
//! (§4.7).
//!
//! Centers are grouped by previous block (spec §3 "Centers are a
//! collection indexed by (previousBlock, withinBlock)", §9's "tagged
//! variant with a flat withinBlock index + prefix sum"): [`Centers`]
//! stores every new block's center in one flat array, with a prefix-sum
//! array recording which contiguous range of new blocks belongs to each
//! previous block.

pub mod assign;
pub mod centers;
pub mod hierarchical;
pub mod influence;
pub mod recompute;
pub mod rebalance;
pub mod sampling;

use crate::geometry::Center;

/// Centers indexed by `(previousBlock, withinBlock)`, stored as one flat
/// array of new-block centers plus a prefix-sum over previous blocks.
#[derive(Debug, Clone)]
pub struct Centers {
    points: Vec<Center>,
    /// Length `num_old_blocks + 1`; old block `b`'s new blocks are
    /// `old_block_starts[b]..old_block_starts[b+1]`.
    old_block_starts: Vec<usize>,
}

impl Centers {
    pub fn new(points: Vec<Center>, old_block_starts: Vec<usize>) -> Self {
        debug_assert_eq!(*old_block_starts.last().unwrap(), points.len());
        Centers {
            points,
            old_block_starts,
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.points.len()
    }

    pub fn num_old_blocks(&self) -> usize {
        self.old_block_starts.len() - 1
    }

    pub fn center(&self, new_block: usize) -> &Center {
        &self.points[new_block]
    }

    pub fn set_center(&mut self, new_block: usize, value: Center) {
        self.points[new_block] = value;
    }

    /// The range of new-block ids belonging to `old_block`.
    pub fn new_blocks_of_old(&self, old_block: usize) -> std::ops::Range<usize> {
        self.old_block_starts[old_block]..self.old_block_starts[old_block + 1]
    }

    /// Which previous block a new block belongs to.
    pub fn old_block_of(&self, new_block: usize) -> usize {
        match self.old_block_starts.binary_search(&new_block) {
            Ok(b) => b,
            Err(b) => b - 1,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Center> {
        self.points.iter()
    }
}
