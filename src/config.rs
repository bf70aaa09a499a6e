//! The core configuration object (spec §6: "CLI surface as consumed by
//! the core configuration struct"). Parsing command-line arguments into
//! this struct is an out-of-scope collaborator; the core only validates
//! and consumes it.

use crate::error::{Error, Result};

/// Balance strategy used by the rebalance/repartition pass (spec §4.7,
/// §6 `KMBalanceMethod`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceMethod {
    /// Full repartition pass driven by membership scores.
    Repart,
    /// Lexicographic rebalance: improve the single most imbalanced axis
    /// first.
    RebLex,
    /// Rebalance scored by sum-of-squares membership (spec §9's `Σ_j (m_j
    /// − 1/c)²` form).
    RebSq,
}

/// All tunables the engine reads, mirroring spec §6 one field at a time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Geometric dimension of the point set; 2 or 3.
    pub dimensions: usize,
    /// Number of target blocks `k`.
    pub num_blocks: usize,
    /// Default imbalance tolerance applied to every weight axis unless
    /// overridden by `epsilon_per_axis`.
    pub epsilon: f64,
    /// Optional per-weight-axis imbalance tolerance, overriding
    /// `epsilon` when present. Length must equal `num_node_weights`.
    pub epsilon_per_axis: Option<Vec<f64>>,
    /// Number of scalar weights carried per point, `w ≥ 1`.
    pub num_node_weights: usize,
    /// Sampling schedule floor: `localN ≥ minSamplingNodes·(k/p)`
    /// triggers sampled early iterations (spec §4.4).
    pub min_sampling_nodes: usize,
    /// Outer k-means iteration cap.
    pub max_k_means_iterations: usize,
    /// Inner balance-loop iteration cap (spec §4.3).
    pub balance_iterations: usize,
    /// Exponent `η` in the influence update `ratio^η` (spec §4.3 step 5).
    /// Defaults to `1 / dimensions`.
    pub influence_exponent: f64,
    /// Cap `Δ` on the per-iteration multiplicative influence change.
    pub influence_change_cap: f64,
    /// Enable oscillation-driven shrinkage of `influence_change_cap`.
    pub tighten_bounds: bool,
    /// Freeze the influence of blocks already within epsilon of target.
    pub freeze_balanced_influence: bool,
    /// Allow influence to erode back toward 1 for long-balanced blocks.
    pub erode_influence: bool,
    /// Track and return the best-seen (lowest worst-axis imbalance)
    /// snapshot instead of the last one, when iteration caps are hit.
    pub keep_most_balanced: bool,
    /// Rebalance strategy (spec §4.7).
    pub balance_method: BalanceMethod,
    /// When set, the loop prioritizes balance over cut quality.
    pub focus_on_balance: bool,
    /// Per-level branching factors of the processor tree; the product
    /// must equal `num_blocks` (spec §6, §7).
    pub hier_levels: Vec<usize>,
    /// Hilbert-curve resolution in bits per dimension.
    pub sfc_resolution: u32,
}

impl Config {
    /// Builds a `Config` with the spec's stated defaults plus the
    /// required shape parameters.
    pub fn new(dimensions: usize, num_blocks: usize, num_node_weights: usize) -> Self {
        Config {
            dimensions,
            num_blocks,
            epsilon: 0.03,
            epsilon_per_axis: None,
            num_node_weights,
            min_sampling_nodes: 1000,
            max_k_means_iterations: 100,
            balance_iterations: 20,
            influence_exponent: 1.0 / dimensions.max(1) as f64,
            influence_change_cap: 0.2,
            tighten_bounds: true,
            freeze_balanced_influence: false,
            erode_influence: false,
            keep_most_balanced: true,
            balance_method: BalanceMethod::Repart,
            focus_on_balance: false,
            hier_levels: vec![num_blocks],
            sfc_resolution: 16,
        }
    }

    /// Per-axis epsilon accessor, falling back to the scalar `epsilon`
    /// when no per-axis override is present.
    pub fn epsilon_for_axis(&self, axis: usize) -> f64 {
        match &self.epsilon_per_axis {
            Some(v) => v[axis],
            None => self.epsilon,
        }
    }

    /// Performs every input-shape check of spec §7 eagerly, so that a
    /// malformed configuration fails identically and immediately on
    /// every process, before any collective runs.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions != 2 && self.dimensions != 3 {
            return Err(Error::InvalidArgument(format!(
                "dimensions must be 2 or 3, got {}",
                self.dimensions
            )));
        }
        if self.num_blocks == 0 {
            return Err(Error::InvalidArgument("num_blocks must be > 0".into()));
        }
        if self.num_node_weights == 0 {
            return Err(Error::InvalidArgument(
                "num_node_weights must be >= 1".into(),
            ));
        }
        if self.epsilon < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "epsilon must be >= 0, got {}",
                self.epsilon
            )));
        }
        if let Some(eps) = &self.epsilon_per_axis {
            if eps.len() != self.num_node_weights {
                return Err(Error::InvalidArgument(format!(
                    "epsilon_per_axis has {} entries, expected {}",
                    eps.len(),
                    self.num_node_weights
                )));
            }
            if eps.iter().any(|e| *e < 0.0) {
                return Err(Error::InvalidArgument(
                    "epsilon_per_axis entries must be >= 0".into(),
                ));
            }
        }
        let hier_product: usize = self.hier_levels.iter().product();
        if hier_product != self.num_blocks {
            return Err(Error::InvalidArgument(format!(
                "hierLevels product {} does not equal numBlocks {}",
                hier_product, self.num_blocks
            )));
        }
        if self.sfc_resolution == 0 {
            return Err(Error::InvalidArgument(
                "sfc_resolution must be >= 1".into(),
            ));
        }
        if !(self.influence_change_cap > 0.0 && self.influence_change_cap <= 1.0) {
            return Err(Error::InvalidArgument(
                "influence_change_cap must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = Config::new(2, 4, 1);
        cfg.validate().unwrap();
    }

    #[test]
    fn bad_dimension_rejected() {
        let cfg = Config::new(5, 4, 1);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn hier_levels_product_mismatch_rejected() {
        let mut cfg = Config::new(2, 8, 1);
        cfg.hier_levels = vec![2, 3];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn epsilon_per_axis_length_mismatch_rejected() {
        let mut cfg = Config::new(2, 4, 2);
        cfg.epsilon_per_axis = Some(vec![0.03]);
        assert!(cfg.validate().is_err());
    }
}
