//! The bounded-assignment loop (spec §4.3): the hottest path in the
//! engine. Grounded on the teacher's `algorithms/k_means.rs`
//! `assign_and_balance`/`best_values` fold — the teacher already walks
//! a point's candidate centers maintaining a running best/second-best
//! and an early-exit condition; this generalizes that scan to
//! bbox-pruned center ordering, per-axis influence, and a distributed
//! weight reduction in place of the teacher's single-process sum.

use itertools::{FoldWhile, Itertools};

use crate::comm::{Communicator, ReduceOp};
use crate::config::Config;
use crate::geometry::{distance_squared, BoundingBox, PointCloud, WeightTable};
use crate::kmeans::influence::Influences;
use crate::kmeans::Centers;
use crate::error::Result;

/// Per-point upper/lower effective-distance bounds (spec §3 "Bounds").
#[derive(Debug, Clone)]
pub struct Bounds {
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

impl Bounds {
    /// Fresh bounds forcing a full scan on the first iteration: an
    /// infinite upper bound and a `-infinity` lower bound can never
    /// satisfy `lower > upper`, so every point is visited.
    pub fn fresh(n: usize) -> Self {
        Bounds {
            upper: vec![f64::INFINITY; n],
            lower: vec![f64::NEG_INFINITY; n],
        }
    }
}

/// The small guard added before bound comparisons to absorb round-off
/// (spec §4.3 "Tie-breaks and numerics"): `1e-6` scaled by dimension.
fn epsilon_guard(dims: usize) -> f64 {
    1e-6 * dims as f64
}

/// For each old block, the new blocks under it ordered ascending by the
/// pruning key `eff(j) = dmin(j)² · min_w influence[w][j]` (spec §4.3
/// step 1), tie-broken by block id. Returns `None` keys unsorted (raw id
/// order) when the local bounding box is degenerate or the process owns
/// no points, per DESIGN.md's Open Question 2 fallback.
fn sorted_centers_by_old_block(
    points: &PointCloud,
    centers: &Centers,
    influences: &Influences,
) -> Vec<Vec<(usize, f64)>> {
    let bbox = BoundingBox::of_local(points);
    (0..centers.num_old_blocks())
        .map(|old_block| {
            let mut candidates: Vec<(usize, f64)> = centers
                .new_blocks_of_old(old_block)
                .map(|j| {
                    let eff = match &bbox {
                        Some(b) if !b.is_degenerate() => {
                            let d_min = b.distance_to_point(centers.center(j).as_slice());
                            d_min * d_min * influences.min_over_axes(j)
                        }
                        _ => j as f64, // fallback: stable raw-id order.
                    };
                    (j, eff)
                })
                .collect();
            candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
            candidates
        })
        .collect()
}

/// Outcome of one call to [`run_iteration`].
pub struct IterationOutcome {
    pub balanced: bool,
    pub max_imbalance_per_axis: Vec<f64>,
}

/// Runs one full iteration of spec §4.3's steps 1-6 over `active_indices`
/// (the full local point set, or a sampled prefix per §4.4). Mutates
/// `assignment`, `bounds` and `influences` in place, and accumulates
/// weight into `global_weight` (returned, one row per new block).
#[allow(clippy::too_many_arguments)]
pub fn run_iteration(
    comm: &dyn Communicator,
    points: &PointCloud,
    weights: &WeightTable,
    active_indices: &[usize],
    prev_assignment: &[usize],
    centers: &Centers,
    target_weights: &[Vec<f64>],
    influences: &mut Influences,
    assignment: &mut [usize],
    bounds: &mut Bounds,
    cfg: &Config,
) -> Result<(IterationOutcome, Vec<Vec<f64>>)> {
    let dims = points.dimensions();
    let num_axes = weights.num_axes();
    let num_new_blocks = centers.num_blocks();
    let guard = epsilon_guard(dims);

    let sorted = sorted_centers_by_old_block(points, centers, influences);

    let mut local_weight = vec![vec![0.0f64; num_axes]; num_new_blocks];

    for &i in active_indices {
        let old_block = prev_assignment[i];
        let candidates = &sorted[old_block];

        if bounds.lower[i] > bounds.upper[i] + guard {
            // Cannot improve; assignment is unchanged.
        } else {
            let normalized = weights.normalized_weights(i);
            let point = points.point(i);
            let current = assignment[i];
            let current_eff = influences.effective_distance(
                distance_squared(point, centers.center(current)),
                current,
                &normalized,
            );
            bounds.upper[i] = current_eff;

            if bounds.lower[i] > bounds.upper[i] + guard {
                // Re-test after refreshing the upper bound.
            } else {
                let seed = (usize::MAX, f64::INFINITY, usize::MAX, f64::INFINITY);
                let (best, best_eff, _second, second_eff) = candidates
                    .iter()
                    .fold_while(seed, |(best, best_eff, second, second_eff), &(j, prune_key)| {
                        if second_eff <= prune_key {
                            return FoldWhile::Done((best, best_eff, second, second_eff));
                        }
                        let d2 = distance_squared(point, centers.center(j));
                        let eff = influences.effective_distance(d2, j, &normalized);
                        let (new_best, new_best_eff, new_second, new_second_eff) = if eff < best_eff {
                            (j, eff, best, best_eff)
                        } else if eff < second_eff {
                            (best, best_eff, j, eff)
                        } else {
                            (best, best_eff, second, second_eff)
                        };
                        FoldWhile::Continue((new_best, new_best_eff, new_second, new_second_eff))
                    })
                    .into_inner();

                assignment[i] = best;
                bounds.upper[i] = best_eff;
                bounds.lower[i] = second_eff;
            }
        }

        let block = assignment[i];
        let point_weights = weights.weights(i);
        for (axis, w) in point_weights.iter().enumerate() {
            local_weight[block][axis] += w;
        }
    }

    let flat_local: Vec<f64> = local_weight.iter().flatten().copied().collect();
    let flat_global = comm.all_reduce(&flat_local, ReduceOp::Sum)?;
    let global_weight: Vec<Vec<f64>> = flat_global
        .chunks_exact(num_axes)
        .map(|c| c.to_vec())
        .collect();

    let mut max_imbalance_per_axis = vec![f64::NEG_INFINITY; num_axes];
    for j in 0..num_new_blocks {
        for w in 0..num_axes {
            let target = target_weights[j][w];
            if target > 0.0 {
                let imb = (global_weight[j][w] - target) / target;
                if imb > max_imbalance_per_axis[w] {
                    max_imbalance_per_axis[w] = imb;
                }
            }
        }
    }

    let balanced = (0..num_axes).all(|w| max_imbalance_per_axis[w] <= cfg.epsilon_for_axis(w));

    // Step 5: update influence per (block, axis); capture the
    // pre-update per-block influence sum to drive step 6.
    let old_effect: Vec<f64> = (0..num_new_blocks)
        .map(|j| (0..num_axes).map(|w| influences.get(j, w)).sum())
        .collect();

    for j in 0..num_new_blocks {
        for w in 0..num_axes {
            influences.update(
                j,
                w,
                global_weight[j][w],
                target_weights[j][w],
                cfg.influence_exponent,
                cfg.tighten_bounds,
                if cfg.freeze_balanced_influence {
                    Some(cfg.epsilon_for_axis(w))
                } else {
                    None
                },
            );
        }
        if cfg.erode_influence && max_imbalance_per_axis.iter().all(|&i| i.abs() < 1e-9) {
            for w in 0..num_axes {
                influences.erode(j, w, 0.05);
            }
        }
    }

    // Step 6: bound maintenance for touched points.
    let new_effect: Vec<f64> = (0..num_new_blocks)
        .map(|j| (0..num_axes).map(|w| influences.get(j, w)).sum())
        .collect();
    let global_min_influence = influences.global_min_influence();

    for &i in active_indices {
        let c = assignment[i];
        let ratio = if old_effect[c] > 0.0 {
            new_effect[c] / old_effect[c]
        } else {
            1.0
        };
        bounds.upper[i] *= ratio + guard;
        bounds.lower[i] *= global_min_influence - guard;
    }

    Ok((
        IterationOutcome {
            balanced,
            max_imbalance_per_axis,
        },
        global_weight,
    ))
}
