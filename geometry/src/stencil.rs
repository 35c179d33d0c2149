//! Linear interpolation stencils on a cubic (or square) grid of edge `size`.
//!
//! A stencil lists the flat indices of the cells surrounding a fractional
//! coordinate, together with their interpolation weights. Forward projection
//! reads `Σ weight * model[index]`; back-projection scatters into the same
//! cells with the same weights.

use units::todo::{Voxelf64, Weightf64};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stencil<const N: usize> {
    pub index:  [usize;     N],
    pub weight: [Weightf64; N],
}

impl<const N: usize> Stencil<N> {
    pub fn iter(&self) -> impl Iterator<Item = (usize, Weightf64)> + '_ {
        self.index.iter().copied().zip(self.weight.iter().copied())
    }
}

/// Integer part of `t`, provided that both `t` and `t + 1` land on the grid.
/// NaNs are rejected along with everything else that misses.
#[inline]
fn lower_corner(t: Voxelf64, size: usize) -> Option<usize> {
    let i = t.floor();
    let max = size as f64 - 2.0;
    if i >= 0.0 && i <= max { Some(i as usize) } else { None }
}

/// Stencil of the four cells surrounding `(tx, ty)` on a `size × size` grid,
/// stored row-major (`x * size + y`).
#[inline]
pub fn bilinear(tx: Voxelf64, ty: Voxelf64, size: usize) -> Option<Stencil<4>> {
    let ix = lower_corner(tx, size)?;
    let iy = lower_corner(ty, size)?;
    let (fx, fy) = (tx - ix as f64, ty - iy as f64);
    let (cx, cy) = (1.0 - fx, 1.0 - fy);
    let i = |x, y| x * size + y;
    Some(Stencil {
        index:  [i(ix, iy), i(ix+1, iy), i(ix, iy+1), i(ix+1, iy+1)],
        weight: [   cx * cy,    fx * cy,    cx * fy,      fx * fy   ],
    })
}

/// Stencil of the eight cells surrounding `t` on a `size³` grid, stored
/// row-major (`(x * size + y) * size + z`).
#[inline]
pub fn trilinear([tx, ty, tz]: [Voxelf64; 3], size: usize) -> Option<Stencil<8>> {
    let ix = lower_corner(tx, size)?;
    let iy = lower_corner(ty, size)?;
    let iz = lower_corner(tz, size)?;
    let (fx, fy, fz) = (tx - ix as f64, ty - iy as f64, tz - iz as f64);
    let (cx, cy, cz) = (1.0 - fx, 1.0 - fy, 1.0 - fz);
    let i = |x, y, z| (x * size + y) * size + z;
    Some(Stencil {
        index: [
            i(ix  , iy  , iz  ), i(ix+1, iy  , iz  ),
            i(ix  , iy+1, iz  ), i(ix+1, iy+1, iz  ),
            i(ix  , iy  , iz+1), i(ix+1, iy  , iz+1),
            i(ix  , iy+1, iz+1), i(ix+1, iy+1, iz+1),
        ],
        weight: [
            cx * cy * cz, fx * cy * cz,
            cx * fy * cz, fx * fy * cz,
            cx * cy * fz, fx * cy * fz,
            cx * fy * fz, fx * fy * fz,
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use rstest::rstest;

    #[test]
    fn on_grid_point() {
        let s = bilinear(2.0, 3.0, 5).unwrap();
        assert_eq!(s.index, [13, 18, 14, 19]);
        assert_eq!(s.weight, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn midway_between_four_cells() {
        let s = bilinear(1.5, 1.5, 4).unwrap();
        assert_eq!(s.index, [5, 9, 6, 10]);
        assert_float_eq!(s.weight, [0.25; 4], ulps <= [0; 4]);
    }

    // The upper corner must also be on the grid
    #[rstest(/**/  tx ,  ty , size,
             case(-0.1,  1.0,   5),
             case( 1.0, -1e-9,  5),
             case( 3.0,  1.0,   4),
             case( 1.0,  3.5,   4),
             case( 0.0,  0.0,   1),
             case( f64::NAN, 1.0, 5),
    )]
    fn off_grid(tx: f64, ty: f64, size: usize) {
        assert!(bilinear(tx, ty, size).is_none());
    }

    #[test]
    fn last_interior_cell() {
        let s = bilinear(2.99, 2.0, 4).unwrap();
        assert_eq!(s.index[3], 15);
    }

    #[test]
    fn trilinear_on_grid_point() {
        let s = trilinear([1.0, 2.0, 0.0], 4).unwrap();
        assert_eq!(s.index[0], (1 * 4 + 2) * 4);
        assert_eq!(s.weight[0], 1.0);
        assert_eq!(s.weight.iter().sum::<f64>(), 1.0);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn bilinear_weights_partition_unity(
            size in 2_usize..40,
            fx in 0.0..1.0_f64,
            fy in 0.0..1.0_f64,
        ) {
            let max = (size - 1) as f64;
            let s = bilinear(fx * max, fy * max, size);
            // The far edge itself has no upper neighbour
            if let Some(s) = s {
                let total: f64 = s.weight.iter().sum();
                assert_float_eq!(total, 1.0, abs <= 1e-12);
                assert!(s.index.iter().all(|&i| i < size * size));
                assert!(s.weight.iter().all(|&w| w >= 0.0));
            }
        }

        #[test]
        fn trilinear_weights_partition_unity(
            size in 2_usize..20,
            f in [0.0..1.0_f64, 0.0..1.0_f64, 0.0..1.0_f64],
        ) {
            let max = (size - 1) as f64;
            if let Some(s) = trilinear([f[0] * max, f[1] * max, f[2] * max], size) {
                let total: f64 = s.iter().map(|(_, w)| w).sum();
                assert_float_eq!(total, 1.0, abs <= 1e-12);
                assert!(s.index.iter().all(|&i| i < size * size * size));
            }
        }
    }
}
