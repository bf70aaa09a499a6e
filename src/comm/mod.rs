//! Distributed primitives (spec §2 "Distributed primitives", §5
//! "Concurrency & resource model").
//!
//! The engine is SPMD across `p` processes with explicit message
//! passing; there is no shared mutable state between processes, and
//! every "global" value is produced by an explicit collective. Every
//! collective is a synchronous barrier: all processes must enter it in
//! the same order (spec §5 "Ordering guarantees").
//!
//! [`Communicator`] is the seam between the algorithmic core and the
//! transport. [`mpi_world::MpiWorld`] is the production implementation
//! over real MPI; [`local::LocalCommunicator`] is a single-rank
//! loop-back implementation used by tests and doctests so the crate's
//! algorithms can be exercised without an MPI runtime.

pub mod distribution;
pub mod halo;
pub mod local;
pub mod mpi_world;

pub use distribution::{
    scatter_to_block_distribution, scatter_to_owners, BlockDistribution, GeneralDistribution,
    OwnerTable,
};
pub use halo::HaloPlan;

use crate::error::Result;

/// Reduction operators supported by the collective primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

/// A communicator abstraction providing the collectives the engine needs
/// over typed arrays: sum/min/max reduction, broadcast, gather, scatter,
/// and ring shift, plus a variable-count all-to-all used by the SFC
/// redistribution and the halo exchange.
///
/// All methods are collective: every process in the communicator must
/// call the same method, in the same order, with data describing the
/// same logical operation, or behavior is undefined (spec §5). Any
/// failure is fatal and is never retried by the core (spec §7).
pub trait Communicator: Sync {
    /// This process's rank, in `0..size()`.
    fn rank(&self) -> usize;

    /// Total number of processes taking part.
    fn size(&self) -> usize;

    /// Element-wise reduction of `local` across all processes, result
    /// replicated on every process (an "all-reduce").
    fn all_reduce(&self, local: &[f64], op: ReduceOp) -> Result<Vec<f64>>;

    /// Sum of a single scalar across all processes, replicated.
    fn all_reduce_sum_scalar(&self, local: f64) -> Result<f64> {
        Ok(self.all_reduce(&[local], ReduceOp::Sum)?[0])
    }

    /// Broadcasts `data` from `root` to every process. On non-root
    /// processes `data`'s contents are ignored on input and overwritten
    /// on output; all processes must pass a buffer of the size the root
    /// is sending.
    fn broadcast(&self, data: &mut Vec<f64>, root: usize) -> Result<()>;

    /// Gathers variable-length `local` chunks from every process onto
    /// every process (an "all-gather"), preserving rank order.
    fn all_gather_varcount(&self, local: &[f64]) -> Result<Vec<f64>>;

    /// Gathers one `usize` per process onto every process, in rank
    /// order. Used to agree on send/receive counts before a variable
    /// all-to-all.
    fn all_gather_counts(&self, local_count: usize) -> Result<Vec<usize>>;

    /// All-to-all exchange with per-destination variable counts.
    /// `send_counts[r]` elements of `send_buf` (contiguous, in rank
    /// order) go to rank `r`; the result is `recv_counts[r]` elements
    /// received from rank `r`, concatenated in rank order.
    fn all_to_all_varcount(
        &self,
        send_buf: &[f64],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Result<Vec<f64>>;

    /// A synchronous barrier with no data exchanged.
    fn barrier(&self);
}

/// Send/recv displacement helper: converts per-rank counts into
/// contiguous byte/element offsets, the way `mpi::datatype::Partition`
/// expects. Shared by the MPI and local communicators and by the SFC
/// redistribution and halo-exchange all-to-alls.
pub fn displacements(counts: &[usize]) -> Vec<usize> {
    let mut displs = Vec::with_capacity(counts.len());
    let mut acc = 0usize;
    for &c in counts {
        displs.push(acc);
        acc += c;
    }
    displs
}

/// Learns, for a variable all-to-all whose per-destination send counts
/// are only known locally, how many elements each other rank will send
/// *to me*. Every process contributes its own `nprocs`-long
/// `send_counts` row; the rows are all-gathered and each process reads
/// back its own column. One extra collective, paid once per
/// communication plan (spec §9: "the plan is computed once per
/// distribution and reused").
pub fn exchange_counts(comm: &dyn Communicator, send_counts: &[usize]) -> Result<Vec<usize>> {
    let p = comm.size();
    debug_assert_eq!(send_counts.len(), p);
    let local: Vec<f64> = send_counts.iter().map(|&c| c as f64).collect();
    let gathered = comm.all_gather_varcount(&local)?;
    let my_rank = comm.rank();
    Ok((0..p).map(|r| gathered[r * p + my_rank] as usize).collect())
}
