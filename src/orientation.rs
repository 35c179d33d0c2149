//! The candidate orientations against which every frame is compared.

use std::ops::Index;

use geometry::SpatialRotation;
use units::{Angle, turn};

use crate::error::{EmcError, Result};

/// Anything that can be reported as a single rotation angle
pub trait Orientation: Clone + Send + Sync {
    fn angle(&self) -> Angle;
}

impl Orientation for Angle {
    fn angle(&self) -> Angle { *self }
}

impl Orientation for SpatialRotation {
    fn angle(&self) -> Angle { SpatialRotation::angle(self) }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrientationTable<O> {
    orientations: Vec<O>,
}

impl OrientationTable<Angle> {
    /// `num_rot` angles evenly spaced around a full turn, starting at zero
    pub fn in_plane(num_rot: usize) -> Self {
        let n = num_rot as f64;
        Self { orientations: (0..num_rot).map(|r| turn(r as f64 / n)).collect() }
    }
}

impl OrientationTable<SpatialRotation> {
    /// Quaternions stored as `[w, x, y, z]`; each is normalized on the way in.
    pub fn from_quaternions(quaternions: &[[f64; 4]]) -> Result<Self> {
        let orientations = quaternions.iter().enumerate()
            .map(|(i, &q)| SpatialRotation::from_wxyz(q)
                 .ok_or_else(|| EmcError::dataset(format!("quaternion {i} {q:?} cannot be normalized"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { orientations })
    }
}

impl<O: Orientation> OrientationTable<O> {
    pub fn new(orientations: Vec<O>) -> Self { Self { orientations } }
    pub fn len(&self) -> usize { self.orientations.len() }
    pub fn is_empty(&self) -> bool { self.orientations.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = &O> { self.orientations.iter() }
}

impl<O> Index<usize> for OrientationTable<O> {
    type Output = O;
    fn index(&self, r: usize) -> &O { &self.orientations[r] }
}
