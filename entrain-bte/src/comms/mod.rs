//! Collective operations over the cooperating worker ranks.
//!
//! The solver runs in a lockstep SPMD pattern: before each sweep the
//! irreducible states are block-partitioned across ranks, each rank
//! accumulates its own contribution into a zeroed tensor, and an element-wise
//! all-reduce merges the partials. The collectives live behind the
//! [`Communicator`] trait so the whole solver can run single-process in unit
//! tests, with a rank-per-thread implementation exercising the true
//! partition and merge semantics.

use nalgebra::RealField;
use std::ops::Range;
use std::sync::{Arc, Barrier, Mutex};

/// The collective operations required by the solver. Every method is a
/// synchronisation point: all ranks must call it, in the same order, with
/// buffers of the same length.
pub trait Communicator<T>: Send + Sync
where
    T: Copy + RealField,
{
    /// This rank's index, in `0..size`
    fn rank(&self) -> usize;
    /// The number of cooperating ranks
    fn size(&self) -> usize;
    /// Block until every rank has arrived
    fn barrier(&self);
    /// Element-wise sum across all ranks, the result visible to every rank
    fn all_reduce_sum(&self, buffer: &mut [T]);
    /// Replicate the root rank's buffer onto every rank
    fn broadcast(&self, buffer: &mut [T], root: usize);
    /// Terminate the whole run. Collective failure is not recoverable: the
    /// remaining ranks would deadlock at the next synchronisation point.
    fn abort(&self, message: &str) -> !;
}

/// The statically block-partitioned index range owned by one rank. The
/// ranges are disjoint and contiguous, with the remainder states overflowing
/// onto the leading ranks.
pub fn local_range(total: usize, size: usize, rank: usize) -> Range<usize> {
    let chunk = total / size;
    let remainder = total % size;
    let start = rank * chunk + rank.min(remainder);
    let length = chunk + usize::from(rank < remainder);
    start..start + length
}

/// A single-rank communicator for which every collective is the identity
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCommunicator;

impl<T> Communicator<T> for SerialCommunicator
where
    T: Copy + RealField,
{
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn all_reduce_sum(&self, _buffer: &mut [T]) {}

    fn broadcast(&self, _buffer: &mut [T], _root: usize) {}

    fn abort(&self, message: &str) -> ! {
        tracing::error!("run aborted: {message}");
        std::process::abort()
    }
}

struct SharedStage<T> {
    buffer: Mutex<Vec<T>>,
    barrier: Barrier,
}

/// A rank-per-thread communicator over shared memory. Handles are created as
/// a pool and one is moved onto each worker thread.
pub struct ThreadCommunicator<T> {
    rank: usize,
    size: usize,
    stage: Arc<SharedStage<T>>,
}

impl<T: Copy + RealField> ThreadCommunicator<T> {
    /// Create one handle per rank. All handles share a single staging buffer
    /// and barrier.
    pub fn pool(size: usize) -> Vec<Self> {
        assert!(size > 0, "a communicator needs at least one rank");
        let stage = Arc::new(SharedStage {
            buffer: Mutex::new(Vec::new()),
            barrier: Barrier::new(size),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                stage: Arc::clone(&stage),
            })
            .collect()
    }
}

impl<T> Communicator<T> for ThreadCommunicator<T>
where
    T: Copy + RealField + Send + Sync,
{
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.stage.barrier.wait();
    }

    fn all_reduce_sum(&self, buffer: &mut [T]) {
        // Leader zeroes the staging buffer, everyone accumulates under the
        // lock, then everyone copies the merged result back out. The extra
        // barriers order the three phases.
        if self.stage.barrier.wait().is_leader() {
            let mut stage = self.stage.buffer.lock().unwrap();
            stage.clear();
            stage.resize(buffer.len(), T::zero());
        }
        self.stage.barrier.wait();
        {
            let mut stage = self.stage.buffer.lock().unwrap();
            assert_eq!(
                stage.len(),
                buffer.len(),
                "all ranks must reduce buffers of the same length"
            );
            for (merged, local) in stage.iter_mut().zip(buffer.iter()) {
                *merged += *local;
            }
        }
        self.stage.barrier.wait();
        {
            let stage = self.stage.buffer.lock().unwrap();
            buffer.copy_from_slice(&stage);
        }
        self.stage.barrier.wait();
    }

    fn broadcast(&self, buffer: &mut [T], root: usize) {
        if self.rank == root {
            let mut stage = self.stage.buffer.lock().unwrap();
            stage.clear();
            stage.extend_from_slice(buffer);
        }
        self.stage.barrier.wait();
        if self.rank != root {
            let stage = self.stage.buffer.lock().unwrap();
            assert_eq!(
                stage.len(),
                buffer.len(),
                "all ranks must broadcast buffers of the same length"
            );
            buffer.copy_from_slice(&stage);
        }
        self.stage.barrier.wait();
    }

    fn abort(&self, message: &str) -> ! {
        tracing::error!("rank {} aborted: {message}", self.rank);
        std::process::abort()
    }
}
