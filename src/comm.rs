//! Inter-process reductions and gathers used by the collision diagnostics.
//!
//! A pass only ever needs a handful of collective operations: element-wise
//! sums, minima and maxima over small arrays, and gathers of per-cell samples
//! to rank 0. `SingleRank` serves one process; `LocalWorld` wires several
//! in-process ranks together over crossbeam channels so the multi-rank paths
//! can be driven from threads.

use crate::{Error, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};

pub const ROOT: usize = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    fn f64(self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
        }
    }

    fn u64(self, a: u64, b: u64) -> u64 {
        match self {
            ReduceOp::Sum => a.wrapping_add(b),
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
        }
    }
}

pub trait Communicator: Send {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Element-wise reduction; every rank ends up with the result.
    fn allreduce_f64(&self, values: &mut [f64], op: ReduceOp) -> Result<()>;
    fn allreduce_u64(&self, values: &mut [u64], op: ReduceOp) -> Result<()>;

    /// Concatenate every rank's values in rank order. Only rank 0 gets `Some`.
    fn gather_f64(&self, local: &[f64]) -> Result<Option<Vec<f64>>>;
    fn gather_u32(&self, local: &[u32]) -> Result<Option<Vec<u32>>>;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    fn sum_f64(&self, values: &mut [f64]) -> Result<()> {
        self.allreduce_f64(values, ReduceOp::Sum)
    }

    fn sum_u64(&self, values: &mut [u64]) -> Result<()> {
        self.allreduce_u64(values, ReduceOp::Sum)
    }

    fn min_f64(&self, values: &mut [f64]) -> Result<()> {
        self.allreduce_f64(values, ReduceOp::Min)
    }

    fn max_f64(&self, values: &mut [f64]) -> Result<()> {
        self.allreduce_f64(values, ReduceOp::Max)
    }
}

/// The whole world is this process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleRank;

impl Communicator for SingleRank {
    fn rank(&self) -> usize {
        ROOT
    }

    fn size(&self) -> usize {
        1
    }

    fn allreduce_f64(&self, _values: &mut [f64], _op: ReduceOp) -> Result<()> {
        Ok(())
    }

    fn allreduce_u64(&self, _values: &mut [u64], _op: ReduceOp) -> Result<()> {
        Ok(())
    }

    fn gather_f64(&self, local: &[f64]) -> Result<Option<Vec<f64>>> {
        Ok(Some(local.to_vec()))
    }

    fn gather_u32(&self, local: &[u32]) -> Result<Option<Vec<u32>>> {
        Ok(Some(local.to_vec()))
    }
}

#[derive(Debug)]
enum Payload {
    F64(Vec<f64>),
    U64(Vec<u64>),
    U32(Vec<u32>),
}

/// One rank of an in-process world. Each ordered pair of ranks has its own
/// channel, so messages between two ranks arrive in the order they were sent.
pub struct ChannelComm {
    rank: usize,
    senders: Vec<Sender<Payload>>,
    receivers: Vec<Receiver<Payload>>,
}

pub struct LocalWorld;

impl LocalWorld {
    /// Build `size` fully connected ranks.
    pub fn new(size: usize) -> Vec<ChannelComm> {
        let size = size.max(1);
        // links[from][to]
        let mut links: Vec<Vec<Option<(Sender<Payload>, Receiver<Payload>)>>> = (0..size)
            .map(|_| (0..size).map(|_| Some(unbounded())).collect())
            .collect();

        let mut senders: Vec<Vec<Sender<Payload>>> = vec![Vec::with_capacity(size); size];
        let mut receivers: Vec<Vec<Option<Receiver<Payload>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for from in 0..size {
            for to in 0..size {
                if let Some((tx, rx)) = links[from][to].take() {
                    senders[from].push(tx);
                    receivers[to][from] = Some(rx);
                }
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| ChannelComm {
                rank,
                senders,
                receivers: receivers.into_iter().flatten().collect(),
            })
            .collect()
    }
}

impl ChannelComm {
    fn send(&self, to: usize, payload: Payload) -> Result<()> {
        self.senders[to].send(payload).map_err(|_| Error::Comm {
            rank: self.rank,
            reason: format!("rank {to} hung up"),
        })
    }

    fn recv(&self, from: usize) -> Result<Payload> {
        self.receivers[from].recv().map_err(|_| Error::Comm {
            rank: self.rank,
            reason: format!("rank {from} hung up"),
        })
    }

    fn mismatch(&self, from: usize) -> Error {
        Error::Comm {
            rank: self.rank,
            reason: format!("unexpected message type from rank {from}"),
        }
    }

    fn size_mismatch(&self, from: usize, got: usize, want: usize) -> Error {
        Error::Comm {
            rank: self.rank,
            reason: format!("rank {from} sent {got} values, expected {want}"),
        }
    }
}

impl Communicator for ChannelComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn allreduce_f64(&self, values: &mut [f64], op: ReduceOp) -> Result<()> {
        if self.rank == ROOT {
            for from in 1..self.size() {
                let Payload::F64(other) = self.recv(from)? else {
                    return Err(self.mismatch(from));
                };
                if other.len() != values.len() {
                    return Err(self.size_mismatch(from, other.len(), values.len()));
                }
                for (v, o) in values.iter_mut().zip(other) {
                    *v = op.f64(*v, o);
                }
            }
            for to in 1..self.size() {
                self.send(to, Payload::F64(values.to_vec()))?;
            }
        } else {
            self.send(ROOT, Payload::F64(values.to_vec()))?;
            let Payload::F64(result) = self.recv(ROOT)? else {
                return Err(self.mismatch(ROOT));
            };
            if result.len() != values.len() {
                return Err(self.size_mismatch(ROOT, result.len(), values.len()));
            }
            values.copy_from_slice(&result);
        }
        Ok(())
    }

    fn allreduce_u64(&self, values: &mut [u64], op: ReduceOp) -> Result<()> {
        if self.rank == ROOT {
            for from in 1..self.size() {
                let Payload::U64(other) = self.recv(from)? else {
                    return Err(self.mismatch(from));
                };
                if other.len() != values.len() {
                    return Err(self.size_mismatch(from, other.len(), values.len()));
                }
                for (v, o) in values.iter_mut().zip(other) {
                    *v = op.u64(*v, o);
                }
            }
            for to in 1..self.size() {
                self.send(to, Payload::U64(values.to_vec()))?;
            }
        } else {
            self.send(ROOT, Payload::U64(values.to_vec()))?;
            let Payload::U64(result) = self.recv(ROOT)? else {
                return Err(self.mismatch(ROOT));
            };
            if result.len() != values.len() {
                return Err(self.size_mismatch(ROOT, result.len(), values.len()));
            }
            values.copy_from_slice(&result);
        }
        Ok(())
    }

    fn gather_f64(&self, local: &[f64]) -> Result<Option<Vec<f64>>> {
        if self.rank != ROOT {
            self.send(ROOT, Payload::F64(local.to_vec()))?;
            return Ok(None);
        }
        let mut all = local.to_vec();
        for from in 1..self.size() {
            let Payload::F64(other) = self.recv(from)? else {
                return Err(self.mismatch(from));
            };
            all.extend(other);
        }
        Ok(Some(all))
    }

    fn gather_u32(&self, local: &[u32]) -> Result<Option<Vec<u32>>> {
        if self.rank != ROOT {
            self.send(ROOT, Payload::U32(local.to_vec()))?;
            return Ok(None);
        }
        let mut all = local.to_vec();
        for from in 1..self.size() {
            let Payload::U32(other) = self.recv(from)? else {
                return Err(self.mismatch(from));
            };
            all.extend(other);
        }
        Ok(Some(all))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn run_world<T, F>(size: usize, f: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(ChannelComm) -> T + Send + Sync + Copy + 'static,
    {
        let handles: Vec<_> = LocalWorld::new(size)
            .into_iter()
            .map(|comm| thread::spawn(move || f(comm)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn single_rank_is_identity() {
        let comm = SingleRank;
        let mut v = [1.0, 2.0];
        comm.sum_f64(&mut v).unwrap();
        assert_eq!(v, [1.0, 2.0]);
        assert_eq!(comm.gather_u32(&[3, 4]).unwrap(), Some(vec![3, 4]));
        assert!(comm.is_root());
    }

    #[test]
    fn sums_reach_every_rank() {
        let results = run_world(4, |comm| {
            let r = comm.rank() as u64;
            let mut v = [r, 1];
            comm.sum_u64(&mut v).unwrap();
            v
        });
        for v in results {
            assert_eq!(v, [6, 4]);
        }
    }

    #[test]
    fn min_and_max_are_elementwise() {
        let results = run_world(3, |comm| {
            let r = comm.rank() as f64;
            let mut lo = [r, -r];
            let mut hi = [r, -r];
            comm.min_f64(&mut lo).unwrap();
            comm.max_f64(&mut hi).unwrap();
            (lo, hi)
        });
        for (lo, hi) in results {
            assert_eq!(lo, [0.0, -2.0]);
            assert_eq!(hi, [2.0, 0.0]);
        }
    }

    #[test]
    fn gather_is_rank_ordered_and_root_only() {
        let results = run_world(3, |comm| {
            let r = comm.rank() as u32;
            let local: Vec<u32> = (0..=r).map(|i| 10 * r + i).collect();
            (comm.rank(), comm.gather_u32(&local).unwrap())
        });
        for (rank, gathered) in results {
            if rank == ROOT {
                assert_eq!(gathered, Some(vec![0, 10, 11, 20, 21, 22]));
            } else {
                assert!(gathered.is_none());
            }
        }
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let results = run_world(2, |comm| {
            let mut v = vec![1.0; comm.rank() + 1];
            comm.sum_f64(&mut v).is_err()
        });
        assert!(results[0]);
    }
}
