//! Geographer: a distributed-memory parallel graph partitioner for
//! load-balancing scientific-computing meshes across compute nodes.
//!
//! Given a weighted graph whose vertices carry geometric coordinates and
//! one or more scalar weights, [`partition`] assigns each vertex to
//! exactly one of `k` blocks so that each weight's per-block total is
//! within the configured tolerance of its target, while trying to
//! minimize edges crossing block boundaries. The engine is SPMD across
//! `p` processes ([`comm::Communicator`]) with no shared mutable state;
//! every "global" value is produced by an explicit collective.
//!
//! # Crate layout
//!
//! - [`comm`]: the communicator abstraction, block/general
//!   distributions, and the halo-exchange plan.
//! - [`sfc`]: the Hilbert space-filling curve and the bulk SFC
//!   redistribution that seeds geometric locality.
//! - [`graph`]: cut, imbalance, border/inner, communication volume, the
//!   block-interaction graph, degree vector and Laplacian.
//! - [`proctree`]: the processor tree driving the hierarchical partition.
//! - [`kmeans`]: the partitioning core — initial centers, the
//!   bounded-assignment loop, the sampling schedule, center
//!   recomputation, the rebalance pass, and the hierarchical driver.
//!
//! [`partition`] ties these together: redistribute by SFC, then run the
//! hierarchical k-means driver over the processor tree implied by
//! [`Config::hier_levels`](config::Config::hier_levels), then scatter the
//! resulting assignment back to the caller's original distribution.

#[cfg(test)]
#[macro_use]
extern crate approx;
#[cfg(not(test))]
extern crate approx;

pub mod comm;
pub mod config;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod kmeans;
pub mod proctree;
pub mod sfc;

pub use config::Config;
pub use error::{Error, Result};
pub use geometry::{PointCloud, WeightTable};

use comm::{scatter_to_owners, Communicator, OwnerTable};
use proctree::ProcessorTree;

/// The result of a full partitioning run (spec §2 control flow).
pub struct Partition {
    /// One block id in `[0, numBlocks)` per local point, in the same
    /// order and distribution as the input `points`/`weights` the
    /// caller passed to [`partition`].
    pub assignment: Vec<usize>,
    /// The worst per-axis imbalance observed in the final snapshot.
    pub worst_axis_imbalance: f64,
    /// Whether every weight axis's imbalance was within its epsilon.
    pub balanced: bool,
}

/// Partitions a weighted point set across the communicator's processes
/// (spec §2 "Control flow": redistribute by SFC, run the hierarchical
/// k-means driver, return a partition distributed identically to the
/// input).
///
/// `local_global_ids` gives the stable global index of each local point
/// under the caller's own (arbitrary) distribution; the returned
/// assignment is re-expressed in that exact distribution — same rank,
/// same per-rank order — by routing the result through an
/// [`OwnerTable`](comm::OwnerTable) built from `local_global_ids` itself,
/// even though the engine internally redistributes by Hilbert index to
/// seed geometric locality.
pub fn partition(
    comm: &dyn Communicator,
    cfg: &Config,
    points: PointCloud,
    weights: WeightTable,
    local_global_ids: Vec<usize>,
) -> Result<Partition> {
    cfg.validate()?;

    let total_points = comm.all_reduce_sum_scalar(points.len() as f64)? as usize;
    tracing::info!(
        total_points,
        num_blocks = cfg.num_blocks,
        "starting geographer partition"
    );

    if cfg.num_blocks > total_points {
        return Err(Error::InvalidArgument(format!(
            "num_blocks {} exceeds total point count {}",
            cfg.num_blocks, total_points
        )));
    }

    let owners = OwnerTable::build(comm, total_points, &local_global_ids)?;

    let redistributed = {
        let _span = tracing::debug_span!("sfc_redistribution").entered();
        sfc::redistribute(
            comm,
            &points,
            &weights,
            &local_global_ids,
            cfg.sfc_resolution,
        )?
    };

    let tree = ProcessorTree::new(cfg.hier_levels.clone(), cfg.num_blocks)?;

    let result = {
        let _span = tracing::debug_span!("hierarchical_kmeans").entered();
        kmeans::hierarchical::run(comm, cfg, &tree, &redistributed.points, &redistributed.weights)?
    };

    if result.balanced {
        tracing::info!(worst_axis_imbalance = result.worst_axis_imbalance, "converged balanced");
    } else {
        tracing::warn!(
            worst_axis_imbalance = result.worst_axis_imbalance,
            "iteration budget exhausted before balance was reached"
        );
    }

    let values: Vec<f64> = result.assignment.iter().map(|&b| b as f64).collect();
    let scattered = scatter_to_owners(
        comm,
        &owners,
        &redistributed.distribution.local_global_ids,
        &values,
        &local_global_ids,
    )?;
    let assignment: Vec<usize> = scattered.iter().map(|&v| v as usize).collect();

    Ok(Partition {
        assignment,
        worst_axis_imbalance: result.worst_axis_imbalance,
        balanced: result.balanced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::local::LocalCommunicator;

    #[test]
    fn flat_partition_of_a_small_uniform_grid_is_total_and_balanced() {
        let comm = LocalCommunicator;
        let mut cfg = Config::new(2, 4, 1);
        cfg.min_sampling_nodes = 1_000_000;

        let side = 10usize;
        let mut coords = Vec::with_capacity(side * side * 2);
        for y in 0..side {
            for x in 0..side {
                coords.push(x as f64);
                coords.push(y as f64);
            }
        }
        let n = side * side;
        let points = PointCloud::from_flat(2, coords).unwrap();
        let weights = WeightTable::from_flat(1, vec![1.0; n]).unwrap();
        let ids: Vec<usize> = (0..n).collect();

        let result = partition(&comm, &cfg, points, weights, ids).unwrap();
        assert_eq!(result.assignment.len(), n);
        for &b in &result.assignment {
            assert!(b < cfg.num_blocks);
        }
    }

    #[test]
    fn rejects_invalid_configuration_before_any_collective() {
        let comm = LocalCommunicator;
        let mut cfg = Config::new(2, 4, 1);
        cfg.hier_levels = vec![2, 3]; // product != num_blocks
        let points = PointCloud::from_flat(2, vec![0.0, 0.0]).unwrap();
        let weights = WeightTable::from_flat(1, vec![1.0]).unwrap();
        let err = partition(&comm, &cfg, points, weights, vec![0]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_num_blocks_greater_than_point_count() {
        let comm = LocalCommunicator;
        let cfg = Config::new(2, 5, 1);
        let points = PointCloud::from_flat(2, vec![0.0, 0.0, 1.0, 1.0]).unwrap();
        let weights = WeightTable::from_flat(1, vec![1.0, 1.0]).unwrap();
        let err = partition(&comm, &cfg, points, weights, vec![0, 1]);
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn assignment_is_returned_under_a_non_block_shaped_original_distribution() {
        let comm = LocalCommunicator;
        let mut cfg = Config::new(2, 2, 1);
        cfg.min_sampling_nodes = 1_000_000;

        let coords = vec![0.0, 0.0, 1.0, 0.0, 9.0, 9.0, 10.0, 9.0];
        let points = PointCloud::from_flat(2, coords).unwrap();
        let weights = WeightTable::from_flat(1, vec![1.0; 4]).unwrap();
        // Deliberately not ascending / not a contiguous block.
        let ids = vec![3usize, 0, 2, 1];

        let result = partition(&comm, &cfg, points, weights, ids).unwrap();
        assert_eq!(result.assignment.len(), 4);
        for &b in &result.assignment {
            assert!(b < cfg.num_blocks);
        }
    }
}
