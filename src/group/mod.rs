//! Collective communication between the cooperating processes of a
//! reconstruction.
//!
//! Every collective must be entered by every member of the group, in the same
//! order, with buffers of the same length; each call blocks until all members
//! have contributed. A member which fails to show up stalls the whole group,
//! and there is no recovery from that.

pub mod local;

pub use local::LocalGroup;

use std::ops::Add;

use crate::error::{EmcError, Result};

/// Rank of the process which owns the authoritative model
pub const ROOT: usize = 0;

/// Element types which can take part in reductions
pub trait Reducible: Copy + Send + Sync + PartialOrd + Add<Output = Self> + 'static {
    #[inline]
    fn larger(self, other: Self) -> Self { if other > self { other } else { self } }
}

impl Reducible for f64 {}
impl Reducible for i64 {}

pub trait GroupChannel {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn is_root(&self) -> bool { self.rank() == ROOT }

    /// Replace every element with its maximum across the group
    fn all_reduce_max<T: Reducible>(&self, buffer: &mut [T]) -> Result<()>;

    /// Replace every element with its sum across the group
    fn all_reduce_sum<T: Reducible>(&self, buffer: &mut [T]) -> Result<()>;

    /// Sum across the group, stored on the root only. Other members' buffers
    /// are left as they were.
    fn reduce_to_root<T: Reducible>(&self, buffer: &mut [T]) -> Result<()>;

    /// Overwrite every member's buffer with the root's
    fn broadcast<T: Reducible>(&self, buffer: &mut [T]) -> Result<()>;
}

/// Share the outcome of work which only some members perform, such as the
/// root writing its output, so that the whole group stops together when any
/// member fails. Members which succeeded report a `Collective` error.
pub fn agree_on_outcome<G, T, E>(group: &G, outcome: std::result::Result<T, E>) -> Result<T>
where
    G: GroupChannel,
    E: Into<EmcError>,
{
    let mut failed = [i64::from(outcome.is_err())];
    group.all_reduce_max(&mut failed)?;
    match (outcome, failed[0]) {
        (Err(e), _)    => Err(e.into()),
        (Ok(value), 0) => Ok(value),
        (Ok(_), _)     => Err(EmcError::collective(format!("another member failed; stopping rank {}", group.rank()))),
    }
}

/// A group of one: every collective is the identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Solo;

impl GroupChannel for Solo {
    fn rank(&self) -> usize { ROOT }
    fn size(&self) -> usize { 1 }
    fn all_reduce_max<T: Reducible>(&self, _: &mut [T]) -> Result<()> { Ok(()) }
    fn all_reduce_sum<T: Reducible>(&self, _: &mut [T]) -> Result<()> { Ok(()) }
    fn reduce_to_root<T: Reducible>(&self, _: &mut [T]) -> Result<()> { Ok(()) }
    fn broadcast     <T: Reducible>(&self, _: &mut [T]) -> Result<()> { Ok(()) }
}
