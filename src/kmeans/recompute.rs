//! Center recomputation (spec §4.5): at iteration end, each block's
//! center becomes the weighted centroid of its currently assigned
//! points, averaged across weight axes.
//!
//! Grounded on the teacher's `geometry::Point2D`/`Point3D` centroid
//! arithmetic used in `k_means.rs`'s `into_group_map`-style per-cluster
//! averaging, generalized to `w` weight axes and a distributed reduction
//! in place of the teacher's single-process fold.

use crate::comm::{Communicator, ReduceOp};
use crate::error::Result;
use crate::geometry::{center_from_slice, Center, PointCloud, WeightTable};
use crate::kmeans::Centers;

/// Recomputes every new block's center as the average, across weight
/// axes, of that axis's weighted centroid (spec §4.5). A block with zero
/// total weight on every axis retains its previous center position
/// (spec "Empty blocks... retain their previous center position"). A
/// center that comes out non-finite is likewise replaced by the
/// previous one (spec §7 "any center becoming non-finite is replaced by
/// the previous center for that block").
pub fn recompute_centers(
    comm: &dyn Communicator,
    points: &PointCloud,
    weights: &WeightTable,
    assignment: &[usize],
    centers: &Centers,
) -> Result<Vec<Center>> {
    let dims = points.dimensions();
    let num_axes = weights.num_axes();
    let num_blocks = centers.num_blocks();

    // Per (block, axis): Σ w_a(x)·x and Σ w_a(x), flattened as
    // [block][axis][dims] and [block][axis].
    let mut local_weighted_sum = vec![0.0f64; num_blocks * num_axes * dims];
    let mut local_weight_sum = vec![0.0f64; num_blocks * num_axes];

    for (i, &block) in assignment.iter().enumerate() {
        let p = points.point(i);
        let w = weights.weights(i);
        for axis in 0..num_axes {
            local_weight_sum[block * num_axes + axis] += w[axis];
            let base = (block * num_axes + axis) * dims;
            for a in 0..dims {
                local_weighted_sum[base + a] += w[axis] * p[a];
            }
        }
    }

    let global_weighted_sum = comm.all_reduce(&local_weighted_sum, ReduceOp::Sum)?;
    let global_weight_sum = comm.all_reduce(&local_weight_sum, ReduceOp::Sum)?;

    let mut new_centers = Vec::with_capacity(num_blocks);
    for block in 0..num_blocks {
        let mut acc = vec![0.0f64; dims];
        let mut axes_with_weight = 0usize;
        for axis in 0..num_axes {
            let total = global_weight_sum[block * num_axes + axis];
            if total > 0.0 {
                axes_with_weight += 1;
                let base = (block * num_axes + axis) * dims;
                for a in 0..dims {
                    acc[a] += global_weighted_sum[base + a] / total;
                }
            }
        }

        let candidate = if axes_with_weight == 0 {
            None
        } else {
            for a in acc.iter_mut() {
                *a /= axes_with_weight as f64;
            }
            if acc.iter().all(|v| v.is_finite()) {
                Some(center_from_slice(&acc))
            } else {
                None
            }
        };

        new_centers.push(candidate.unwrap_or_else(|| centers.center(block).clone()));
    }

    Ok(new_centers)
}

/// The maximum per-block center shift `δ` between two iterations (spec
/// §4.4 "geometric movement δ"), used to detect convergence.
pub fn max_center_shift(old: &[Center], new: &[Center]) -> f64 {
    old.iter()
        .zip(new)
        .map(|(o, n)| (o - n).norm())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::local::LocalCommunicator;
    use crate::geometry::center_from_slice;

    #[test]
    fn centroid_of_two_points() {
        let comm = LocalCommunicator;
        let points = PointCloud::from_flat(1, vec![0.0, 4.0]).unwrap();
        let weights = WeightTable::from_flat(1, vec![1.0, 1.0]).unwrap();
        let assignment = vec![0, 0];
        let centers = Centers::new(vec![center_from_slice(&[99.0])], vec![0, 1]);

        let new_centers = recompute_centers(&comm, &points, &weights, &assignment, &centers).unwrap();
        assert_eq!(new_centers[0][0], 2.0);
    }

    #[test]
    fn empty_block_keeps_previous_center() {
        let comm = LocalCommunicator;
        let points = PointCloud::from_flat(1, vec![0.0, 4.0]).unwrap();
        let weights = WeightTable::from_flat(1, vec![1.0, 1.0]).unwrap();
        let assignment = vec![0, 0];
        let centers = Centers::new(
            vec![center_from_slice(&[99.0]), center_from_slice(&[42.0])],
            vec![0, 2],
        );

        let new_centers = recompute_centers(&comm, &points, &weights, &assignment, &centers).unwrap();
        assert_eq!(new_centers[1][0], 42.0);
    }

    #[test]
    fn max_shift_is_largest_movement() {
        let old = vec![center_from_slice(&[0.0, 0.0]), center_from_slice(&[10.0, 0.0])];
        let new = vec![center_from_slice(&[0.0, 1.0]), center_from_slice(&[10.0, 5.0])];
        assert_eq!(max_center_shift(&old, &new), 5.0);
    }
}
