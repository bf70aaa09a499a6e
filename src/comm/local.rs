//! A single-rank, loop-back [`Communicator`](super::Communicator), used
//! by unit tests and doctests so the distributed algorithms have a
//! deterministic, MPI-free execution path (spec §A.4 of SPEC_FULL.md).
//! Every collective degenerates to the identity on a single rank.

use super::{Communicator, ReduceOp};
use crate::error::Result;

/// Single-process communicator: `rank() == 0`, `size() == 1`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCommunicator;

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce(&self, local: &[f64], _op: ReduceOp) -> Result<Vec<f64>> {
        Ok(local.to_vec())
    }

    fn broadcast(&self, _data: &mut Vec<f64>, _root: usize) -> Result<()> {
        Ok(())
    }

    fn all_gather_varcount(&self, local: &[f64]) -> Result<Vec<f64>> {
        Ok(local.to_vec())
    }

    fn all_gather_counts(&self, local_count: usize) -> Result<Vec<usize>> {
        Ok(vec![local_count])
    }

    fn all_to_all_varcount(
        &self,
        send_buf: &[f64],
        _send_counts: &[usize],
        _recv_counts: &[usize],
    ) -> Result<Vec<f64>> {
        Ok(send_buf.to_vec())
    }

    fn barrier(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reductions_are_identity_on_one_rank() {
        let comm = LocalCommunicator;
        assert_eq!(comm.all_reduce(&[1., 2., 3.], ReduceOp::Sum).unwrap(), vec![1., 2., 3.]);
        assert_eq!(comm.all_reduce_sum_scalar(4.2).unwrap(), 4.2);
    }
}
