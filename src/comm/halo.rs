//! Halo exchange: the only place one process reads another process's
//! partition label (spec §4.8, §5, §9).
//!
//! The abstraction is specified as a pair `(required-indices,
//! communication-plan)`: the caller supplies the global indices it
//! needs values for (its graph neighbors that live on other processes),
//! and the resulting [`HaloPlan`] is an immutable value, computed once
//! per distribution, that can be reused across every graph utility that
//! needs a halo of the same shape (cut, border/inner, communication
//! volume, block graph).

use super::distribution::BlockDistribution;
use super::{exchange_counts, Communicator};
use crate::error::Result;

/// An immutable communication plan answering "for these required global
/// indices, which rank do I ask, and which local indices do I need to
/// answer for others". Built once, reused by every halo-dependent graph
/// utility (spec §9: "the core must not hold shared ownership of the
/// plan; treat it as an immutable value co-owned by its issuer and the
/// caller that uses it").
#[derive(Debug, Clone)]
pub struct HaloPlan {
    send_counts: Vec<usize>,
    recv_counts: Vec<usize>,
    /// Local indices (on this rank) that other ranks have requested,
    /// grouped in rank order matching `recv_counts`.
    requested_local_indices: Vec<usize>,
    /// `perm[k]` is the position in the caller's original `required`
    /// list that the `k`-th rank-grouped request corresponds to; used
    /// to un-permute the exchange reply back to the caller's order.
    perm: Vec<usize>,
}

impl HaloPlan {
    /// Builds a halo plan for the global indices in `required` (may
    /// contain duplicates and locally-owned indices; local indices are
    /// resolved without any communication).
    pub fn build(
        comm: &dyn Communicator,
        distribution: &BlockDistribution,
        required: &[usize],
    ) -> Result<Self> {
        let p = comm.size();
        let my_rank = comm.rank();

        // Stable sort of positions by owner rank: groups `required` by
        // destination while recording how to invert the permutation.
        let mut order: Vec<usize> = (0..required.len()).collect();
        order.sort_by_key(|&k| distribution.owner(required[k]));

        let mut send_counts = vec![0usize; p];
        for &k in &order {
            send_counts[distribution.owner(required[k])] += 1;
        }

        let request_values: Vec<f64> = order.iter().map(|&k| required[k] as f64).collect();

        let recv_counts = exchange_counts(comm, &send_counts)?;

        let incoming = comm.all_to_all_varcount(&request_values, &send_counts, &recv_counts)?;
        let requested_local_indices: Vec<usize> = incoming
            .iter()
            .map(|&g| (g as usize) - distribution.local_range(my_rank).start)
            .collect();

        Ok(HaloPlan {
            send_counts,
            recv_counts,
            requested_local_indices,
            perm: order,
        })
    }

    /// Exchanges `local_values` (indexed by local index, on the owning
    /// rank) to produce the values for the `required` global indices
    /// this plan was built from, in the caller's original order.
    pub fn exchange(&self, comm: &dyn Communicator, local_values: &[f64]) -> Result<Vec<f64>> {
        let answer_buf: Vec<f64> = self
            .requested_local_indices
            .iter()
            .map(|&i| local_values[i])
            .collect();

        // Roles reverse for the reply: what I received requests for
        // (`recv_counts`) is now what I send back, and vice versa.
        let reply = comm.all_to_all_varcount(&answer_buf, &self.recv_counts, &self.send_counts)?;

        let mut out = vec![0.0; self.perm.len()];
        for (k, &orig_pos) in self.perm.iter().enumerate() {
            out[orig_pos] = reply[k];
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::local::LocalCommunicator;

    #[test]
    fn single_rank_halo_is_a_local_lookup() {
        let comm = LocalCommunicator;
        let dist = BlockDistribution::new(5, 1);
        let required = vec![3usize, 0, 4, 0];
        let plan = HaloPlan::build(&comm, &dist, &required).unwrap();
        let local_values = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let got = plan.exchange(&comm, &local_values).unwrap();
        assert_eq!(got, vec![13.0, 10.0, 14.0, 10.0]);
    }
}
