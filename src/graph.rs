//! Graph utilities (spec §2 "Graph utilities", §4.8): cut, imbalance,
//! border/inner node counts, communication volume, the block-interaction
//! graph, degree vector and Laplacian. Consumed read-only by the k-means
//! engine and by external metric reporters; every utility here that
//! needs a neighbor's partition label goes through a [`HaloPlan`], since
//! the engine never assumes a vertex's neighbors are locally owned
//! (spec §4.8 "the engine does not assume neighbor-local ownership").

use itertools::Itertools;
use sprs::{CsMat, TriMat};

use crate::comm::distribution::BlockDistribution;
use crate::comm::{Communicator, HaloPlan, ReduceOp};
use crate::error::{Error, Result};

/// A local shard of a graph in CSR form: vertex `i`'s neighbors are the
/// **global** ids `adjncy[xadj[i]..xadj[i+1]]`. Mirrors the adjacency
/// layout of the METIS/binary graph formats documented in spec §6 (which
/// this crate does not parse — file I/O is an out-of-scope collaborator
/// — but whose in-memory shape this struct matches).
#[derive(Debug, Clone)]
pub struct Graph {
    xadj: Vec<usize>,
    adjncy: Vec<usize>,
    edge_weights: Option<Vec<f64>>,
}

impl Graph {
    /// Builds a graph shard from CSR arrays. `edge_weights`, if given,
    /// must have the same length as `adjncy`.
    pub fn new(xadj: Vec<usize>, adjncy: Vec<usize>, edge_weights: Option<Vec<f64>>) -> Result<Self> {
        if xadj.is_empty() {
            return Err(Error::InvalidArgument("xadj must have at least one entry".into()));
        }
        if *xadj.last().unwrap() != adjncy.len() {
            return Err(Error::InvalidArgument(
                "xadj's last entry must equal adjncy's length".into(),
            ));
        }
        if let Some(ew) = &edge_weights {
            if ew.len() != adjncy.len() {
                return Err(Error::InvalidArgument(
                    "edge_weights must have the same length as adjncy".into(),
                ));
            }
        }
        Ok(Graph {
            xadj,
            adjncy,
            edge_weights,
        })
    }

    pub fn local_vertex_count(&self) -> usize {
        self.xadj.len() - 1
    }

    pub fn neighbors(&self, local_vertex: usize) -> &[usize] {
        &self.adjncy[self.xadj[local_vertex]..self.xadj[local_vertex + 1]]
    }

    fn edge_weight(&self, edge_index: usize) -> f64 {
        self.edge_weights.as_ref().map_or(1.0, |w| w[edge_index])
    }

    /// Unweighted or weighted degree of a local vertex (spec §4.8
    /// "degree vector").
    pub fn degree(&self, local_vertex: usize) -> f64 {
        let start = self.xadj[local_vertex];
        let end = self.xadj[local_vertex + 1];
        match &self.edge_weights {
            Some(w) => w[start..end].iter().sum(),
            None => (end - start) as f64,
        }
    }

    /// The degree vector over every local vertex.
    pub fn degree_vector(&self) -> Vec<f64> {
        (0..self.local_vertex_count()).map(|i| self.degree(i)).collect()
    }
}

/// For every adjacency-list entry (both locally- and foreign-owned
/// neighbors), the block id of that neighbor, aligned 1:1 with `adjncy`.
/// This is the single halo exchange every other utility in this module
/// is built from (spec §4.8 "All utilities require a halo exchange of
/// the partition labels referenced by local vertices' neighbor lists").
fn neighbor_blocks(
    comm: &dyn Communicator,
    distribution: &BlockDistribution,
    graph: &Graph,
    assignment: &[usize],
) -> Result<Vec<usize>> {
    let my_range = distribution.local_range(comm.rank());

    let mut foreign_ids = Vec::new();
    let mut is_foreign = Vec::with_capacity(graph.adjncy_len());
    for &g in graph.adjncy_iter() {
        if my_range.contains(&g) {
            is_foreign.push(false);
        } else {
            is_foreign.push(true);
            foreign_ids.push(g);
        }
    }

    let plan = HaloPlan::build(comm, distribution, &foreign_ids)?;
    let assignment_f64: Vec<f64> = assignment.iter().map(|&b| b as f64).collect();
    let foreign_values = plan.exchange(comm, &assignment_f64)?;

    let mut result = Vec::with_capacity(is_foreign.len());
    let mut foreign_cursor = 0usize;
    for (k, &g) in graph.adjncy_iter().enumerate() {
        if is_foreign[k] {
            result.push(foreign_values[foreign_cursor] as usize);
            foreign_cursor += 1;
        } else {
            result.push(assignment[g - my_range.start]);
        }
    }
    Ok(result)
}

impl Graph {
    fn adjncy_len(&self) -> usize {
        self.adjncy.len()
    }
    fn adjncy_iter(&self) -> impl Iterator<Item = &usize> {
        self.adjncy.iter()
    }
}

/// Global edge cut (spec §4.8 "Cut"): the weighted count of edges whose
/// endpoints lie in different blocks, halved because an undirected edge
/// is stored from both endpoints (once in each endpoint's adjacency
/// list, possibly on two different processes).
pub fn cut(
    comm: &dyn Communicator,
    distribution: &BlockDistribution,
    graph: &Graph,
    assignment: &[usize],
) -> Result<f64> {
    let nbr_blocks = neighbor_blocks(comm, distribution, graph, assignment)?;
    let mut local_sum = 0.0;
    let mut edge_index = 0usize;
    for v in 0..graph.local_vertex_count() {
        for _ in graph.neighbors(v) {
            if nbr_blocks[edge_index] != assignment[v] {
                local_sum += graph.edge_weight(edge_index);
            }
            edge_index += 1;
        }
    }
    let global = comm.all_reduce_sum_scalar(local_sum)?;
    Ok(global / 2.0)
}

/// Per-axis imbalance (spec §4.3 step 4, §4.8): `(weight[j] -
/// target[j]) / target[j]`, maximized over blocks. `weights` and
/// `target` are both already-global per-block totals (the caller is
/// expected to have reduced them, e.g. via [`crate::kmeans`]'s weight
/// accumulation).
pub fn imbalance(weights: &[f64], target: &[f64]) -> f64 {
    weights
        .iter()
        .zip(target)
        .map(|(w, t)| if *t > 0.0 { (w - t) / t } else { 0.0 })
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Counts of border and inner local vertices (spec §4.8 "Border /
/// inner"): a vertex is a border vertex if any neighbor's block differs
/// from its own.
pub fn border_inner_counts(
    comm: &dyn Communicator,
    distribution: &BlockDistribution,
    graph: &Graph,
    assignment: &[usize],
) -> Result<(usize, usize)> {
    let nbr_blocks = neighbor_blocks(comm, distribution, graph, assignment)?;
    let mut border = 0usize;
    let mut edge_index = 0usize;
    for v in 0..graph.local_vertex_count() {
        let own = assignment[v];
        let mut is_border = false;
        for _ in graph.neighbors(v) {
            if nbr_blocks[edge_index] != own {
                is_border = true;
            }
            edge_index += 1;
        }
        if is_border {
            border += 1;
        }
    }
    let inner = graph.local_vertex_count() - border;
    let global_border = comm.all_reduce_sum_scalar(border as f64)? as usize;
    let global_inner = comm.all_reduce_sum_scalar(inner as f64)? as usize;
    Ok((global_border, global_inner))
}

/// Communication volume per block (spec §4.8): for every local vertex,
/// the number of *distinct* neighbor blocks other than its own
/// contributes to its own block's volume.
pub fn communication_volume(
    comm: &dyn Communicator,
    distribution: &BlockDistribution,
    graph: &Graph,
    assignment: &[usize],
    num_blocks: usize,
) -> Result<Vec<f64>> {
    let nbr_blocks = neighbor_blocks(comm, distribution, graph, assignment)?;
    let mut local_volume = vec![0.0; num_blocks];
    let mut edge_index = 0usize;
    for v in 0..graph.local_vertex_count() {
        let own = assignment[v];
        let start = edge_index;
        edge_index += graph.neighbors(v).len();
        let distinct_foreign = nbr_blocks[start..edge_index]
            .iter()
            .copied()
            .filter(|&b| b != own)
            .unique()
            .count();
        local_volume[own] += distinct_foreign as f64;
    }
    comm.all_reduce(&local_volume, ReduceOp::Sum)
}

/// The block-interaction graph (spec §4.8 "Block graph"): a `k×k`
/// adjacency aggregating edges whose endpoints lie in different blocks.
/// Spec describes building this via a ring-shift of a `k²` bitmap
/// across processes; an all-reduce sum over the same `k²`-sized
/// accumulator is the algebraic equivalent and is what this crate's
/// [`Communicator`] already exposes (noted in DESIGN.md).
pub fn block_interaction_graph(
    comm: &dyn Communicator,
    distribution: &BlockDistribution,
    graph: &Graph,
    assignment: &[usize],
    num_blocks: usize,
) -> Result<CsMat<f64>> {
    let nbr_blocks = neighbor_blocks(comm, distribution, graph, assignment)?;
    let mut local = vec![0.0; num_blocks * num_blocks];
    let mut edge_index = 0usize;
    for v in 0..graph.local_vertex_count() {
        let own = assignment[v];
        for _ in graph.neighbors(v) {
            let nb = nbr_blocks[edge_index];
            if nb != own {
                local[own * num_blocks + nb] += graph.edge_weight(edge_index);
            }
            edge_index += 1;
        }
    }
    let global = comm.all_reduce(&local, ReduceOp::Sum)?;

    let mut tri = TriMat::new((num_blocks, num_blocks));
    for i in 0..num_blocks {
        for j in 0..num_blocks {
            let v = global[i * num_blocks + j];
            if v != 0.0 {
                tri.add_triplet(i, j, v);
            }
        }
    }
    Ok(tri.to_csr())
}

/// The local row-block of the graph Laplacian `L = D - A`, in global
/// column indices (spec §4.8 "Laplacian"). Only the rows owned locally
/// are materialized, matching the engine's general policy of never
/// assembling a full global structure on one process.
pub fn local_laplacian_rows(
    distribution: &BlockDistribution,
    rank: usize,
    graph: &Graph,
) -> CsMat<f64> {
    let my_range = distribution.local_range(rank);
    let n = my_range.len();
    let total_cols = distribution.total();
    let mut tri = TriMat::new((n, total_cols));
    for v in 0..n {
        tri.add_triplet(v, my_range.start + v, graph.degree(v));
        let start = graph.xadj_at(v);
        let end = graph.xadj_at(v + 1);
        for e in start..end {
            let nb = graph.adjncy_at(e);
            let w = graph.edge_weight(e);
            tri.add_triplet(v, nb, -w);
        }
    }
    tri.to_csr()
}

impl Graph {
    fn xadj_at(&self, i: usize) -> usize {
        self.xadj[i]
    }
    fn adjncy_at(&self, i: usize) -> usize {
        self.adjncy[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::local::LocalCommunicator;

    // A 4-cycle 0-1-2-3-0 split into two blocks {0,1} and {2,3}.
    fn cycle4() -> Graph {
        Graph::new(
            vec![0, 2, 4, 6, 8],
            vec![1, 3, 0, 2, 1, 3, 2, 0],
            None,
        )
        .unwrap()
    }

    #[test]
    fn cut_of_two_way_split_cycle() {
        let comm = LocalCommunicator;
        let dist = BlockDistribution::new(4, 1);
        let graph = cycle4();
        let assignment = vec![0, 0, 1, 1];
        let c = cut(&comm, &dist, &graph, &assignment).unwrap();
        assert_ulps_eq!(c, 2.0);
    }

    #[test]
    fn border_inner_counts_match_cut_topology() {
        let comm = LocalCommunicator;
        let dist = BlockDistribution::new(4, 1);
        let graph = cycle4();
        let assignment = vec![0, 0, 1, 1];
        let (border, inner) = border_inner_counts(&comm, &dist, &graph, &assignment).unwrap();
        assert_eq!(border, 4);
        assert_eq!(inner, 0);
    }

    #[test]
    fn imbalance_zero_when_balanced() {
        assert_ulps_eq!(imbalance(&[10.0, 10.0], &[10.0, 10.0]), 0.0);
    }

    #[test]
    fn imbalance_positive_when_overloaded() {
        let imb = imbalance(&[12.0, 8.0], &[10.0, 10.0]);
        assert_ulps_eq!(imb, 0.2);
    }

    #[test]
    fn communication_volume_matches_cut_for_simple_cycle() {
        let comm = LocalCommunicator;
        let dist = BlockDistribution::new(4, 1);
        let graph = cycle4();
        let assignment = vec![0, 0, 1, 1];
        let vol = communication_volume(&comm, &dist, &graph, &assignment, 2).unwrap();
        assert_ulps_eq!(vol[0], 2.0);
        assert_ulps_eq!(vol[1], 2.0);
    }

    #[test]
    fn block_graph_has_symmetric_nonzero_pattern() {
        let comm = LocalCommunicator;
        let dist = BlockDistribution::new(4, 1);
        let graph = cycle4();
        let assignment = vec![0, 0, 1, 1];
        let bg = block_interaction_graph(&comm, &dist, &graph, &assignment, 2).unwrap();
        assert_ulps_eq!(bg.get(0, 1).copied().unwrap_or(0.0), 2.0);
        assert_ulps_eq!(bg.get(1, 0).copied().unwrap_or(0.0), 2.0);
    }

    #[test]
    fn degree_vector_counts_neighbors() {
        let graph = cycle4();
        assert_eq!(graph.degree_vector(), vec![2.0, 2.0, 2.0, 2.0]);
    }
}
