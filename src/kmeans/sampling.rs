//! The sampling schedule (spec §4.4): early iterations run on a growing
//! prefix of a pseudo-randomly reordered local index array so that
//! convergence on very large local sets doesn't pay full-scan cost every
//! round.
//!
//! The teacher never samples (`k_means.rs` always scans the full local
//! set), so this module has no direct teacher analogue. The "Cantor
//! interleaving" reorder is implemented as a seeded Fisher-Yates shuffle
//! over `rand_pcg`'s deterministic generator — the same reproducible
//! shuffling idiom `tools/Cargo.toml` pulls `rand_pcg` in for — rather
//! than literally implementing Cantor's pairing function, since spec
//! §4.4 only requires *some* fixed pseudo-random reorder consistent
//! across processes' round counts, not a specific one (noted in
//! DESIGN.md).

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::geometry::WeightTable;

/// A deterministic pseudo-random permutation of `0..n`, seeded so that
/// repeated calls with the same `(n, seed)` reproduce the same order
/// (spec §8 "Determinism under fixed seed").
pub fn shuffled_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = Pcg64::seed_from_u64(seed);
    order.shuffle(&mut rng);
    order
}

/// The schedule of sample sizes for one k-means invocation (spec §4.4):
/// starts at `minSamplingNodes · (k/p)`, doubles each round, and always
/// ends with a final round over the full local set `local_n` so the
/// terminating global sum sees complete weight (spec §5 "the last round
/// always includes the full local set").
pub fn sampling_schedule(local_n: usize, num_blocks: usize, nprocs: usize, min_sampling_nodes: usize) -> Vec<usize> {
    let floor = (min_sampling_nodes * num_blocks) / nprocs.max(1);
    if floor == 0 || floor >= local_n {
        return vec![local_n];
    }
    let mut sizes = Vec::new();
    let mut s = floor;
    while s < local_n {
        sizes.push(s);
        s = s.saturating_mul(2);
    }
    sizes.push(local_n);
    sizes
}

/// Scales each new block's per-axis target weight by the ratio of
/// sampled to full local weight on that axis (spec §9 Open Question,
/// resolved per-axis: "a consistent implementation should use the
/// per-axis sampled total weight over the per-axis global total
/// weight").
pub fn scale_targets_for_sample(
    target_weights: &[Vec<f64>],
    sampled_total_per_axis: &[f64],
    full_total_per_axis: &[f64],
) -> Vec<Vec<f64>> {
    let num_axes = full_total_per_axis.len();
    let ratios: Vec<f64> = (0..num_axes)
        .map(|w| {
            if full_total_per_axis[w] > 0.0 {
                sampled_total_per_axis[w] / full_total_per_axis[w]
            } else {
                1.0
            }
        })
        .collect();
    target_weights
        .iter()
        .map(|block_targets| {
            block_targets
                .iter()
                .zip(&ratios)
                .map(|(t, r)| t * r)
                .collect()
        })
        .collect()
}

/// Per-axis local weight totals over a subset of local points, used to
/// compute the ratio fed to [`scale_targets_for_sample`].
pub fn local_weight_totals(weights: &WeightTable, indices: &[usize]) -> Vec<f64> {
    let mut totals = vec![0.0; weights.num_axes()];
    for &i in indices {
        for (w, v) in weights.weights(i).iter().enumerate() {
            totals[w] += v;
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffled_indices_are_a_permutation() {
        let order = shuffled_indices(20, 42);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn shuffled_indices_are_deterministic() {
        assert_eq!(shuffled_indices(50, 7), shuffled_indices(50, 7));
    }

    #[test]
    fn schedule_doubles_and_ends_at_full_set() {
        let sched = sampling_schedule(10_000, 4, 1, 1000);
        assert_eq!(*sched.last().unwrap(), 10_000);
        for w in sched.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn schedule_is_trivial_when_below_floor() {
        let sched = sampling_schedule(100, 4, 1, 1000);
        assert_eq!(sched, vec![100]);
    }

    #[test]
    fn target_scaling_is_proportional_per_axis() {
        let targets = vec![vec![100.0, 50.0]];
        let scaled = scale_targets_for_sample(&targets, &[10.0, 25.0], &[100.0, 50.0]);
        assert_eq!(scaled[0][0], 10.0);
        assert_eq!(scaled[0][1], 25.0);
    }
}
