//! Per-`(axis, block)` influence: a Lagrange-style multiplier that
//! inflates a block's effective distance when it is overloaded (spec §3
//! "Center", §4.3 step 5).
//!
//! Grounded on the teacher's influence-ratio clamp in
//! `algorithms/k_means.rs`'s `assign_and_balance` (`ratio.powf(...).
//! clamp(...)`), generalized from one weight axis to `w` axes stored as
//! a flat block-major array, matching [`crate::kmeans::Centers`]'s
//! flat-array idiom (spec §9).

/// Influence values and their oscillation history, one entry per
/// `(block, axis)` pair.
#[derive(Debug, Clone)]
pub struct Influences {
    num_axes: usize,
    values: Vec<f64>,
    /// Sign of `(ratio - 1)` at the previous update, per `(block,
    /// axis)`; `0` before the first update. Used to detect oscillation
    /// (spec §4.3 step 5 "when ratio oscillates... shrink Δ").
    prev_sign: Vec<i8>,
    change_cap: f64,
}

impl Influences {
    /// All influences start at `1.0` (spec §3 implies an initially
    /// neutral multiplier; the first balance iteration establishes real
    /// values).
    pub fn new(num_blocks: usize, num_axes: usize, initial_change_cap: f64) -> Self {
        Influences {
            num_axes,
            values: vec![1.0; num_blocks * num_axes],
            prev_sign: vec![0; num_blocks * num_axes],
            change_cap: initial_change_cap,
        }
    }

    fn idx(&self, block: usize, axis: usize) -> usize {
        block * self.num_axes + axis
    }

    pub fn get(&self, block: usize, axis: usize) -> f64 {
        self.values[self.idx(block, axis)]
    }

    /// `min_w influence[w][j]`, used by the pruning step's `eff(j)`
    /// (spec §4.3 step 1).
    pub fn min_over_axes(&self, block: usize) -> f64 {
        (0..self.num_axes)
            .map(|w| self.get(block, w))
            .fold(f64::INFINITY, f64::min)
    }

    /// The smallest influence ratio present anywhere, used by the bound
    /// maintenance step's `globalMinInfluenceRatio` (spec §4.3 step 6).
    /// Here "ratio" is the influence value itself, since influence is
    /// already the multiplicative factor applied to distance.
    pub fn global_min_influence(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// The effective distance of spec §4.3 "Definitions":
    /// `d²(x,c_j) · Σ_w influence[w][j] · normalizedWeight[w][x]`.
    pub fn effective_distance(&self, d_squared: f64, block: usize, normalized_weights: &[f64]) -> f64 {
        let factor: f64 = (0..self.num_axes)
            .map(|w| self.get(block, w) * normalized_weights[w])
            .sum();
        d_squared * factor
    }

    /// Applies spec §4.3 step 5's update for one `(block, axis)` pair,
    /// given that block's current weight and target on that axis.
    /// `exponent` is `η`; `freeze_epsilon`, if set, skips the update for
    /// blocks already within that tolerance of target (spec "Optionally
    /// freeze influence of blocks whose |ratio−1| < ε").
    pub fn update(
        &mut self,
        block: usize,
        axis: usize,
        weight: f64,
        target: f64,
        exponent: f64,
        tighten_bounds: bool,
        freeze_epsilon: Option<f64>,
    ) {
        if target <= 0.0 {
            return;
        }
        let ratio = weight / target;
        if let Some(eps) = freeze_epsilon {
            if (ratio - 1.0).abs() < eps {
                return;
            }
        }

        let idx = self.idx(block, axis);
        let sign: i8 = if ratio > 1.0 {
            1
        } else if ratio < 1.0 {
            -1
        } else {
            0
        };
        if tighten_bounds && sign != 0 && self.prev_sign[idx] != 0 && sign != self.prev_sign[idx] {
            self.change_cap = 0.1 + 0.9 * self.change_cap;
        }
        self.prev_sign[idx] = sign;

        let mult = ratio
            .powf(exponent)
            .clamp(1.0 - self.change_cap, 1.0 + self.change_cap);
        self.values[idx] *= mult;
    }

    /// Lets influence erode back toward `1.0` for a block/axis that has
    /// stayed balanced (spec §6 `erodeInfluence`); a small geometric
    /// pull rather than an instantaneous reset.
    pub fn erode(&mut self, block: usize, axis: usize, rate: f64) {
        let idx = self.idx(block, axis);
        self.values[idx] = 1.0 + (self.values[idx] - 1.0) * (1.0 - rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_neutral() {
        let inf = Influences::new(3, 2, 0.2);
        assert_eq!(inf.get(0, 0), 1.0);
        assert_eq!(inf.min_over_axes(1), 1.0);
    }

    #[test]
    fn overloaded_block_gets_inflated() {
        let mut inf = Influences::new(1, 1, 0.5);
        inf.update(0, 0, 120.0, 100.0, 1.0, false, None);
        assert!(inf.get(0, 0) > 1.0);
    }

    #[test]
    fn underloaded_block_gets_deflated() {
        let mut inf = Influences::new(1, 1, 0.5);
        inf.update(0, 0, 80.0, 100.0, 1.0, false, None);
        assert!(inf.get(0, 0) < 1.0);
    }

    #[test]
    fn change_is_capped() {
        let mut inf = Influences::new(1, 1, 0.1);
        inf.update(0, 0, 1000.0, 1.0, 1.0, false, None);
        assert!(inf.get(0, 0) <= 1.1 + 1e-9);
    }

    #[test]
    fn freeze_epsilon_skips_update() {
        let mut inf = Influences::new(1, 1, 0.5);
        inf.update(0, 0, 100.5, 100.0, 1.0, false, Some(0.01));
        assert_eq!(inf.get(0, 0), 1.0);
    }

    #[test]
    fn oscillation_shrinks_change_cap() {
        let mut inf = Influences::new(1, 1, 0.5);
        inf.update(0, 0, 150.0, 100.0, 1.0, true, None);
        inf.update(0, 0, 50.0, 100.0, 1.0, true, None);
        assert!(inf.change_cap < 0.5);
    }
}
