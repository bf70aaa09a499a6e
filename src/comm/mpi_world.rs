//! The production [`Communicator`](super::Communicator) implementation,
//! built on real MPI via the `mpi` crate (grounded on
//! `preiter93-pencil_decomp/src/global.rs`'s collective wrappers and
//! `src/main.rs`'s `all_to_all_varcount_into` usage).

use super::{displacements, Communicator, ReduceOp};
use crate::error::{Error, Result};

use mpi::collective::{CommunicatorCollectives, SystemOperation};
use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::topology::{Communicator as MpiTopologyCommunicator, SystemCommunicator};
use mpi::traits::Root;

/// Wraps the MPI `COMM_WORLD` communicator. Construction calls
/// `mpi::initialize()`, matching the pattern every pack repo that uses
/// the `mpi` crate follows at process startup.
pub struct MpiWorld {
    /// Kept alive for the duration of the run: dropping it finalizes
    /// MPI, so it must outlive every collective call.
    _universe: Universe,
    world: SystemCommunicator,
}

impl MpiWorld {
    /// Initializes MPI and wraps `COMM_WORLD`.
    pub fn new() -> Result<Self> {
        let universe = mpi::initialize().ok_or_else(|| {
            Error::Communication("mpi::initialize() failed (already initialized?)".into())
        })?;
        let world = universe.world();
        Ok(MpiWorld {
            _universe: universe,
            world,
        })
    }

    fn op(op: ReduceOp) -> SystemOperation {
        match op {
            ReduceOp::Sum => SystemOperation::sum(),
            ReduceOp::Min => SystemOperation::min(),
            ReduceOp::Max => SystemOperation::max(),
        }
    }
}

impl Communicator for MpiWorld {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn all_reduce(&self, local: &[f64], op: ReduceOp) -> Result<Vec<f64>> {
        let mut recv = vec![0.0f64; local.len()];
        self.world
            .all_reduce_into(local, &mut recv[..], Self::op(op));
        Ok(recv)
    }

    fn broadcast(&self, data: &mut Vec<f64>, root: usize) -> Result<()> {
        let root_process = self.world.process_at_rank(root as i32);
        root_process.broadcast_into(&mut data[..]);
        Ok(())
    }

    fn all_gather_counts(&self, local_count: usize) -> Result<Vec<usize>> {
        let local = local_count as i32;
        let mut recv = vec![0i32; self.size()];
        self.world.all_gather_into(&local, &mut recv[..]);
        Ok(recv.into_iter().map(|c| c as usize).collect())
    }

    fn all_gather_varcount(&self, local: &[f64]) -> Result<Vec<f64>> {
        let counts = self.all_gather_counts(local.len())?;
        let counts_i32: Vec<i32> = counts.iter().map(|&c| c as i32).collect();
        let displs = displacements(&counts);
        let displs_i32: Vec<i32> = displs.iter().map(|&d| d as i32).collect();
        let total: usize = counts.iter().sum();
        let mut recv = vec![0.0f64; total];
        {
            let mut partition = PartitionMut::new(&mut recv[..], counts_i32, &displs_i32[..]);
            self.world.all_gather_varcount_into(local, &mut partition);
        }
        Ok(recv)
    }

    fn all_to_all_varcount(
        &self,
        send_buf: &[f64],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Result<Vec<f64>> {
        let send_counts_i32: Vec<i32> = send_counts.iter().map(|&c| c as i32).collect();
        let send_displs: Vec<i32> = displacements(send_counts)
            .iter()
            .map(|&d| d as i32)
            .collect();
        let recv_counts_i32: Vec<i32> = recv_counts.iter().map(|&c| c as i32).collect();
        let recv_displs: Vec<i32> = displacements(recv_counts)
            .iter()
            .map(|&d| d as i32)
            .collect();
        let total_recv: usize = recv_counts.iter().sum();
        let mut recv = vec![0.0f64; total_recv];
        {
            let send_partition = Partition::new(send_buf, send_counts_i32, &send_displs[..]);
            let mut recv_partition =
                PartitionMut::new(&mut recv[..], recv_counts_i32, &recv_displs[..]);
            self.world
                .all_to_all_varcount_into(&send_partition, &mut recv_partition);
        }
        Ok(recv)
    }

    fn barrier(&self) {
        self.world.barrier();
    }
}
