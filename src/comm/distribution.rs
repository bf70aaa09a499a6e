//! Distribution: the mapping from a global vertex index to its owner
//! process (spec §3 "Distribution"). Two shapes are needed: a *block*
//! distribution (contiguous ranges sized by total count / process
//! count, used before the SFC step) and a *general* distribution (an
//! explicit permutation, produced by the SFC redistribution so that
//! every process owns a contiguous range of the space-filling curve).
//!
//! The block-splitting arithmetic is grounded on
//! `preiter93-pencil_decomp/src/distribution.rs`'s `Distribution::split`:
//! the first `n_global % nprocs` ranks get one extra element so sizes
//! differ by at most one.

/// A contiguous block distribution of `n_global` items across `nprocs`
/// processes.
#[derive(Debug, Clone)]
pub struct BlockDistribution {
    /// Start offset of each rank's range (inclusive), length `nprocs + 1`
    /// so that rank `r`'s range is `starts[r]..starts[r+1]`.
    starts: Vec<usize>,
}

impl BlockDistribution {
    /// Builds the block distribution of `n_global` items over `nprocs`
    /// processes. The first `n_global % nprocs` ranks get
    /// `n_global / nprocs + 1` items; the rest get `n_global / nprocs`.
    pub fn new(n_global: usize, nprocs: usize) -> Self {
        assert!(nprocs > 0);
        let base = n_global / nprocs;
        let remainder = n_global % nprocs;
        let mut starts = Vec::with_capacity(nprocs + 1);
        let mut acc = 0usize;
        starts.push(0);
        for r in 0..nprocs {
            let size = if r < remainder { base + 1 } else { base };
            acc += size;
            starts.push(acc);
        }
        BlockDistribution { starts }
    }

    pub fn local_range(&self, rank: usize) -> std::ops::Range<usize> {
        self.starts[rank]..self.starts[rank + 1]
    }

    pub fn local_count(&self, rank: usize) -> usize {
        self.starts[rank + 1] - self.starts[rank]
    }

    /// The rank that owns global index `i` under this block
    /// distribution.
    pub fn owner(&self, i: usize) -> usize {
        match self.starts.binary_search(&i) {
            Ok(r) => r,
            Err(r) => r - 1,
        }
    }

    pub fn nprocs(&self) -> usize {
        self.starts.len() - 1
    }

    pub fn total(&self) -> usize {
        *self.starts.last().unwrap()
    }
}

/// Scatters `values` (one per entry of `owned_global_ids`, currently
/// held locally under whatever distribution produced them) to the
/// ranks that own those global indices under `target` — the inverse of
/// an SFC or other non-block redistribution, used to hand a computed
/// result back in the caller's original distribution (spec §2 "return a
/// partition distributed identically to the input").
pub fn scatter_to_block_distribution(
    comm: &dyn super::Communicator,
    target: &BlockDistribution,
    owned_global_ids: &[usize],
    values: &[f64],
) -> crate::error::Result<Vec<f64>> {
    let p = comm.size();
    let mut order: Vec<usize> = (0..owned_global_ids.len()).collect();
    order.sort_by_key(|&i| target.owner(owned_global_ids[i]));

    let mut send_counts = vec![0usize; p];
    for &i in &order {
        send_counts[target.owner(owned_global_ids[i])] += 1;
    }

    let ids_sorted: Vec<f64> = order.iter().map(|&i| owned_global_ids[i] as f64).collect();
    let values_sorted: Vec<f64> = order.iter().map(|&i| values[i]).collect();

    let recv_counts = super::exchange_counts(comm, &send_counts)?;
    let ids_recv = comm.all_to_all_varcount(&ids_sorted, &send_counts, &recv_counts)?;
    let values_recv = comm.all_to_all_varcount(&values_sorted, &send_counts, &recv_counts)?;

    let my_range = target.local_range(comm.rank());
    let mut out = vec![0.0f64; my_range.len()];
    for (g, v) in ids_recv.iter().zip(&values_recv) {
        out[(*g as usize) - my_range.start] = *v;
    }
    Ok(out)
}

/// A global-id → owner-rank table built from every process's own
/// (arbitrary) list of owned ids, rather than assumed from an arithmetic
/// block split (spec §3 "Distribution": the caller's original
/// distribution need not be block-shaped at all). Used to route a
/// computed result back to the exact rank that originally owned each
/// point.
#[derive(Debug, Clone)]
pub struct OwnerTable {
    owner_of: Vec<usize>,
}

impl OwnerTable {
    /// Builds the table by all-gathering every rank's own global ids
    /// tagged with its rank — one counts exchange plus one varcount
    /// gather, paid once per distribution, the same shape of collective
    /// pair [`exchange_counts`] uses.
    pub fn build(
        comm: &dyn super::Communicator,
        total: usize,
        owned_global_ids: &[usize],
    ) -> crate::error::Result<Self> {
        let counts = comm.all_gather_counts(owned_global_ids.len())?;
        let local: Vec<f64> = owned_global_ids.iter().map(|&g| g as f64).collect();
        let gathered = comm.all_gather_varcount(&local)?;

        let mut owner_of = vec![usize::MAX; total];
        let mut offset = 0usize;
        for (rank, &count) in counts.iter().enumerate() {
            for &g in &gathered[offset..offset + count] {
                owner_of[g as usize] = rank;
            }
            offset += count;
        }
        Ok(OwnerTable { owner_of })
    }

    /// The rank that originally owned global id `global_id`.
    pub fn owner(&self, global_id: usize) -> usize {
        self.owner_of[global_id]
    }
}

/// Scatters computed `values` (one per entry of `current_global_ids`,
/// the distribution the caller's points currently sit under, e.g. after
/// SFC redistribution) back to each process's own original ids, in that
/// process's own original order (spec §2 "return a partition distributed
/// identically to the input", §3's arbitrary-distribution guarantee).
/// Unlike [`scatter_to_block_distribution`], this makes no assumption
/// that the target distribution is an arithmetic block split or that a
/// rank's original ids are contiguous or ascending.
pub fn scatter_to_owners(
    comm: &dyn super::Communicator,
    owners: &OwnerTable,
    current_global_ids: &[usize],
    values: &[f64],
    original_local_global_ids: &[usize],
) -> crate::error::Result<Vec<f64>> {
    let p = comm.size();
    let mut order: Vec<usize> = (0..current_global_ids.len()).collect();
    order.sort_by_key(|&i| owners.owner(current_global_ids[i]));

    let mut send_counts = vec![0usize; p];
    for &i in &order {
        send_counts[owners.owner(current_global_ids[i])] += 1;
    }

    let ids_sorted: Vec<f64> = order.iter().map(|&i| current_global_ids[i] as f64).collect();
    let values_sorted: Vec<f64> = order.iter().map(|&i| values[i]).collect();

    let recv_counts = super::exchange_counts(comm, &send_counts)?;
    let ids_recv = comm.all_to_all_varcount(&ids_sorted, &send_counts, &recv_counts)?;
    let values_recv = comm.all_to_all_varcount(&values_sorted, &send_counts, &recv_counts)?;

    let mut by_id: std::collections::HashMap<usize, f64> = ids_recv
        .iter()
        .zip(&values_recv)
        .map(|(g, v)| (*g as usize, *v))
        .collect();

    original_local_global_ids
        .iter()
        .map(|g| {
            by_id.remove(g).ok_or_else(|| {
                crate::error::Error::Communication(format!(
                    "scatter_to_owners: no value received for original global id {}",
                    g
                ))
            })
        })
        .collect()
}

/// A general distribution produced by the SFC redistribution (spec
/// §4.1): an explicit list of the global indices each process now owns,
/// ordered by Hilbert index (ties broken by original global id).
#[derive(Debug, Clone)]
pub struct GeneralDistribution {
    /// Global indices owned locally, in their new (post-sort) order.
    pub local_global_ids: Vec<usize>,
}

impl GeneralDistribution {
    pub fn new(local_global_ids: Vec<usize>) -> Self {
        GeneralDistribution { local_global_ids }
    }

    pub fn local_count(&self) -> usize {
        self.local_global_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::local::LocalCommunicator;

    #[test]
    fn scatter_to_block_distribution_is_identity_on_one_rank() {
        let comm = LocalCommunicator;
        let target = BlockDistribution::new(5, 1);
        let owned_global_ids = vec![3usize, 0, 4, 1, 2];
        let values = vec![30.0, 0.0, 40.0, 10.0, 20.0];
        let out = scatter_to_block_distribution(&comm, &target, &owned_global_ids, &values).unwrap();
        assert_eq!(out, vec![0.0, 10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn block_distribution_sizes_differ_by_at_most_one() {
        let dist = BlockDistribution::new(10, 3);
        let sizes: Vec<usize> = (0..3).map(|r| dist.local_count(r)).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 10);
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
    }

    #[test]
    fn block_distribution_owner_is_consistent_with_ranges() {
        let dist = BlockDistribution::new(17, 4);
        for r in 0..4 {
            for i in dist.local_range(r) {
                assert_eq!(dist.owner(i), r);
            }
        }
    }

    #[test]
    fn empty_local_range_is_permitted() {
        // More processes than items: some ranks own nothing.
        let dist = BlockDistribution::new(2, 5);
        assert_eq!(dist.local_count(4), 0);
        assert_eq!(dist.local_range(4), 2..2);
    }

    #[test]
    fn scatter_to_owners_restores_arbitrary_non_block_order() {
        let comm = LocalCommunicator;
        // A caller distribution that is neither sorted nor block-shaped.
        let original_ids = vec![4usize, 1, 3, 0, 2];
        let owners = OwnerTable::build(&comm, 5, &original_ids).unwrap();

        // Pretend the values now live under a totally different (e.g.
        // Hilbert-sorted) id order.
        let current_ids = vec![0usize, 1, 2, 3, 4];
        let values: Vec<f64> = current_ids.iter().map(|&g| g as f64 * 10.0).collect();

        let out = scatter_to_owners(&comm, &owners, &current_ids, &values, &original_ids).unwrap();
        // Output must be in the caller's original order, not ascending id.
        assert_eq!(out, vec![40.0, 10.0, 30.0, 0.0, 20.0]);
    }
}
