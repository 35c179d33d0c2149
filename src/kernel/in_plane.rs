//! Two-dimensional reconstruction: the detector is a `size × size` image
//! which sees the model rotated about its centre, in the detector plane.

use super::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InPlane {
    size: usize,
}

impl InPlane {
    pub fn new(size: usize) -> Self { Self { size } }

    /// Rotation about the central cell (integer division, as for the cell
    /// indices themselves)
    fn rotation(&self, angle: Angle) -> InPlaneRotation {
        InPlaneRotation::new(angle, (self.size / 2) as f64)
    }

    /// Each detector pixel `t = x * size + y`, with the model stencil it samples
    fn stencils(&self, angle: Angle) -> impl Iterator<Item = (usize, Option<Stencil<4>>)> + '_ {
        let rot = self.rotation(angle);
        let n = self.size;
        (0..n).flat_map(move |x| (0..n).map(move |y| {
            let (tx, ty) = rot.apply(x as f64, y as f64);
            (x * n + y, bilinear(tx, ty, n))
        }))
    }
}

impl CompatKernel for InPlane {
    type Orientation = Angle;

    fn num_pix(&self) -> usize { self.size * self.size }
    fn shape  (&self) -> ModelShape { ModelShape::Plane(self.size) }

    fn render(&self, model: &[Intensityf64], angle: &Angle, scale: Scalef64,
              background: Option<&[Intensityf64]>, log: bool, view: &mut [Intensityf64]) {
        for (t, stencil) in self.stencils(*angle) {
            let interpolated = stencil.map(|s| s.iter().map(|(i, w)| model[i] * w).sum());
            let bg = background.map_or(0.0, |b| b[t]);
            view[t] = pixel_value(interpolated, scale, bg, log);
        }
    }

    fn back_project(&self, view: &[Intensityf64], angle: &Angle,
                    model: &mut [Intensityf64], weights: &mut [Weightf64]) {
        for (t, stencil) in self.stencils(*angle) {
            let Some(stencil) = stencil else { continue };
            for (i, w) in stencil.iter() {
                model  [i] += view[t] * w;
                weights[i] += w;
            }
        }
    }
}


// ----- Imports ------------------------------------------------------------------------------------------
use geometry::{InPlaneRotation, Stencil, bilinear};
use units::Angle;
