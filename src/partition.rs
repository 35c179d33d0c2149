//! Division of work between processes, streams and memory-limited blocks.
//!
//! Orientations are striped across processes: orientation `r` belongs to
//! process `r % num_procs`. Frames are never divided between processes, but
//! are processed in contiguous blocks, small enough for the probabilities of
//! one block (every owned orientation × every frame of the block) to fit in
//! the memory budget.

use std::ops::Range;

use crate::error::{EmcError, Result};

/// Bytes per probability matrix element
const ELEMENT: usize = std::mem::size_of::<f64>();

/// The process responsible for orientation `r`
#[inline]
pub fn owner(r: usize, num_procs: usize) -> usize { r % num_procs }

/// Orientations owned by `rank`, in increasing order
pub fn owned_orientations(num_rot: usize, rank: usize, num_procs: usize) -> Vec<usize> {
    (rank..num_rot).step_by(num_procs).collect()
}

/// The largest number of orientations owned by any process. Every process
/// sizes its blocks for this many, so that all of them agree on the schedule.
pub fn max_owned(num_rot: usize, num_procs: usize) -> usize {
    num_rot.div_ceil(num_procs).max(1)
}

/// The stream which processes the `position`th owned orientation
#[inline]
pub fn stream_of(position: usize, num_streams: usize) -> usize { position % num_streams }

/// Device memory available for probabilities
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemoryBudget {
    /// Total memory of the device, in bytes
    pub available: usize,
    /// Bytes already taken by the dataset
    pub reserved: usize,
    /// Fraction of the unreserved memory that probabilities may occupy
    pub threshold: f64,
}

impl MemoryBudget {
    /// Bytes which the probability matrix may occupy
    pub fn bytes(&self) -> usize {
        (self.threshold * self.available.saturating_sub(self.reserved) as f64).floor() as usize
    }

    /// The largest number of frames whose probabilities under `orientations`
    /// orientations fit in the budget
    pub fn frame_capacity(&self, orientations: usize) -> Result<usize> {
        let row = ELEMENT * orientations.max(1);
        let budget = self.bytes();
        match budget / row {
            0 => Err(EmcError::InsufficientMemory { required: row, budget }),
            n => Ok(n),
        }
    }
}

/// Split `num_data` frames into as few contiguous blocks of at most
/// `capacity` frames as possible. Sizes differ by at most one, larger blocks
/// first.
pub fn blocks(num_data: usize, capacity: usize) -> Vec<Range<usize>> {
    if num_data == 0 || capacity == 0 { return vec![] }
    let n_blocks = num_data.div_ceil(capacity);
    let (base, extra) = (num_data / n_blocks, num_data % n_blocks);
    let mut start = 0;
    (0..n_blocks)
        .map(|b| {
            let len = base + usize::from(b < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}
