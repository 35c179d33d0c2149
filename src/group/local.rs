//! A group whose members are threads of a single OS process.
//!
//! Each collective has two phases: every member deposits a copy of its buffer
//! in its slot of a shared table and waits for all the others; then every
//! member reads whatever slots it needs and waits again, so that no slot is
//! overwritten by the next collective while someone is still reading it.
//! Contributions are always combined in rank order, so all members see
//! identical bits.

use std::any::Any;
use std::sync::{Arc, Barrier, Mutex, MutexGuard};

use super::{GroupChannel, Reducible, ROOT};
use crate::error::{EmcError, Result};

type Slot = Option<Box<dyn Any + Send>>;

struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Slot>>,
}

/// One member's handle on the group. Move each handle into its own thread.
pub struct LocalGroup {
    rank: usize,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LocalGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LocalGroup {{ rank: {}, size: {} }}", self.rank, self.shared.size)
    }
}

impl LocalGroup {

    /// Handles for all `size` members, in rank order
    pub fn new(size: usize) -> Vec<Self> {
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
        });
        (0..size).map(|rank| Self { rank, shared: Arc::clone(&shared) }).collect()
    }

    fn slots(&self) -> Result<MutexGuard<'_, Vec<Slot>>> {
        self.shared.slots.lock()
            .map_err(|_| EmcError::collective(format!("rank {}: another member panicked during a collective", self.rank)))
    }

    /// Deposit `buffer`, then let `combine` read the contributions of all
    /// members (indexed by rank) and update `buffer`.
    fn exchange<T, F>(&self, buffer: &mut [T], combine: F) -> Result<()>
    where
        T: Reducible,
        F: FnOnce(&[&[T]], &mut [T]),
    {
        let deposited = self.slots().map(|mut slots| {
            slots[self.rank] = Some(Box::new(buffer.to_vec()));
        });
        self.shared.barrier.wait();
        // Every member must reach the second barrier, even after a failure
        let combined = deposited.and_then(|()| {
            let slots = self.slots()?;
            let contributions = slots.iter().enumerate()
                .map(|(rank, slot)| slot.as_ref()
                     .and_then(|s| s.downcast_ref::<Vec<T>>())
                     .map(Vec::as_slice)
                     .ok_or_else(|| EmcError::collective(format!("rank {rank} contributed a different element type"))))
                .collect::<Result<Vec<&[T]>>>()?;
            if let Some((rank, c)) = contributions.iter().enumerate().find(|(_, c)| c.len() != buffer.len()) {
                return Err(EmcError::collective(format!(
                    "rank {rank} contributed {} elements, rank {} expected {}", c.len(), self.rank, buffer.len())))
            }
            combine(&contributions, buffer);
            Ok(())
        });
        self.shared.barrier.wait();
        combined
    }

    /// Fold all contributions into `buffer`, in rank order
    fn fold<T: Reducible>(contributions: &[&[T]], buffer: &mut [T], op: impl Fn(T, T) -> T) {
        buffer.copy_from_slice(contributions[0]);
        for c in &contributions[1..] {
            for (b, &x) in buffer.iter_mut().zip(c.iter()) { *b = op(*b, x) }
        }
    }
}

impl GroupChannel for LocalGroup {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.shared.size }

    fn all_reduce_max<T: Reducible>(&self, buffer: &mut [T]) -> Result<()> {
        self.exchange(buffer, |c, b| Self::fold(c, b, T::larger))
    }

    fn all_reduce_sum<T: Reducible>(&self, buffer: &mut [T]) -> Result<()> {
        self.exchange(buffer, |c, b| Self::fold(c, b, |x, y| x + y))
    }

    fn reduce_to_root<T: Reducible>(&self, buffer: &mut [T]) -> Result<()> {
        let is_root = self.is_root();
        self.exchange(buffer, |c, b| if is_root { Self::fold(c, b, |x, y| x + y) })
    }

    fn broadcast<T: Reducible>(&self, buffer: &mut [T]) -> Result<()> {
        self.exchange(buffer, |c, b| b.copy_from_slice(c[ROOT]))
    }
}
