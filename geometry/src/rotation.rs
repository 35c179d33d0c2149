use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use units::{Angle, radian, radian_, todo::Voxelf64};

/// Rotation of the model plane about its centre cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InPlaneRotation {
    cos: f64,
    sin: f64,
    centre: Voxelf64,
}

impl InPlaneRotation {

    pub fn new(angle: Angle, centre: Voxelf64) -> Self {
        let a = radian_(angle);
        Self { cos: a.cos(), sin: a.sin(), centre }
    }

    /// Model coordinates sampled by detector pixel `(x, y)`
    #[inline]
    pub fn apply(&self, x: Voxelf64, y: Voxelf64) -> (Voxelf64, Voxelf64) {
        let Self { cos, sin, centre } = *self;
        let (dx, dy) = (x - centre, y - centre);
        (dx * cos - dy * sin + centre,
         dx * sin + dy * cos + centre)
    }
}

/// Rotation of 3-D reciprocal-space vectors, described by a unit quaternion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialRotation(UnitQuaternion<f64>);

impl SpatialRotation {

    /// Normalizes `(w, x, y, z)`; `None` if the quaternion has (near) zero norm
    pub fn from_wxyz([w, x, y, z]: [f64; 4]) -> Option<Self> {
        UnitQuaternion::try_new(Quaternion::new(w, x, y, z), 1e-12).map(Self)
    }

    pub fn identity() -> Self { Self(UnitQuaternion::identity()) }

    #[inline]
    pub fn apply(&self, [x, y, z]: [f64; 3]) -> [f64; 3] {
        let v = self.0.transform_vector(&Vector3::new(x, y, z));
        [v.x, v.y, v.z]
    }

    /// Magnitude of the rotation, in `[0, π]`
    pub fn angle(&self) -> Angle { radian(self.0.angle()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;
    use units::{turn, TWOPI};

    // A pixel two cells from the centre, under each quarter turn
    #[rstest(/**/ quarter, expected,
             case(0, (12.0, 10.0)),
             case(1, (10.0, 12.0)),
             case(2, ( 8.0, 10.0)),
             case(3, (10.0,  8.0)),
    )]
    fn quarter_turns_in_plane(quarter: u8, expected: (f64, f64)) {
        let rot = InPlaneRotation::new(turn(quarter as f64 / 4.0), 10.0);
        let (x, y) = rot.apply(12.0, 10.0);
        assert_float_eq!([x, y], [expected.0, expected.1], abs <= [1e-12; 2]);
    }

    #[test]
    fn centre_is_fixed() {
        let rot = InPlaneRotation::new(radian(1.234), 7.0);
        let (x, y) = rot.apply(7.0, 7.0);
        assert_float_eq!([x, y], [7.0, 7.0], abs <= [1e-12; 2]);
    }

    #[test]
    fn half_turn_about_z() {
        let rot = SpatialRotation::from_wxyz([0.0, 0.0, 0.0, 2.0]).unwrap();
        let [x, y, z] = rot.apply([1.0, 2.0, 3.0]);
        assert_float_eq!([x, y, z], [-1.0, -2.0, 3.0], abs <= [1e-12; 3]);
        assert_float_eq!(radian_(rot.angle()), TWOPI / 2.0, abs <= 1e-12);
    }

    #[test]
    fn zero_quaternion_is_rejected() {
        assert!(SpatialRotation::from_wxyz([0.0; 4]).is_none());
    }

    #[test]
    fn identity_preserves_vectors() {
        let v = [0.3, -4.0, 2.5];
        assert_eq!(SpatialRotation::identity().apply(v), v);
    }
}
