//! Three-dimensional reconstruction: each detector pixel samples the model
//! volume at its (rotated) reciprocal-space coordinate.

use super::*;

#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    size: usize,
    /// Per-pixel q-vectors, in voxels, relative to the centre of the volume
    qvals: Vec<[f64; 3]>,
}

impl Volume {
    pub fn new(size: usize, qvals: Vec<[f64; 3]>) -> Self { Self { size, qvals } }

    fn stencils<'s>(&'s self, rotation: &'s SpatialRotation) -> impl Iterator<Item = (usize, Option<Stencil<8>>)> + 's {
        let centre = (self.size / 2) as f64;
        self.qvals.iter().enumerate().map(move |(t, &q)| {
            let [x, y, z] = rotation.apply(q);
            (t, trilinear([x + centre, y + centre, z + centre], self.size))
        })
    }
}

impl CompatKernel for Volume {
    type Orientation = SpatialRotation;

    fn num_pix(&self) -> usize { self.qvals.len() }
    fn shape  (&self) -> ModelShape { ModelShape::Volume(self.size) }

    fn render(&self, model: &[Intensityf64], rotation: &SpatialRotation, scale: Scalef64,
              background: Option<&[Intensityf64]>, log: bool, view: &mut [Intensityf64]) {
        for (t, stencil) in self.stencils(rotation) {
            let interpolated = stencil.map(|s| s.iter().map(|(i, w)| model[i] * w).sum());
            let bg = background.map_or(0.0, |b| b[t]);
            view[t] = pixel_value(interpolated, scale, bg, log);
        }
    }

    fn back_project(&self, view: &[Intensityf64], rotation: &SpatialRotation,
                    model: &mut [Intensityf64], weights: &mut [Weightf64]) {
        for (t, stencil) in self.stencils(rotation) {
            let Some(stencil) = stencil else { continue };
            for (i, w) in stencil.iter() {
                model  [i] += view[t] * w;
                weights[i] += w;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn idx(size: usize, [x, y, z]: [usize; 3]) -> usize { (x * size + y) * size + z }

    #[test]
    fn half_turn_about_z_flips_x_and_y() {
        let size = 5;
        let kernel = Volume::new(size, vec![[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 3.0]]);
        let mut model = vec![0.0; 125];
        model[idx(size, [3, 2, 2])] = 4.0;
        model[idx(size, [2, 2, 3])] = 9.0;
        let mut view = vec![0.0; 4];

        kernel.render(&model, &SpatialRotation::identity(), 1.0, None, false, &mut view);
        assert_float_eq!(view, vec![4.0, 0.0, 9.0, 0.0], abs_all <= 1e-12);

        let half_turn = SpatialRotation::from_wxyz([0.0, 0.0, 0.0, 1.0]).unwrap();
        kernel.render(&model, &half_turn, 1.0, None, false, &mut view);
        assert_float_eq!(view, vec![0.0, 4.0, 9.0, 0.0], abs_all <= 1e-12);

        kernel.render(&model, &half_turn, 1.0, None, true, &mut view);
        assert_eq!(view[0], LOG_FLOOR);
        assert_eq!(view[3], LOG_FLOOR);
        assert_float_eq!(view[1], 4.0_f64.ln(), abs <= 1e-12);
    }

    #[test]
    fn back_projection_lands_where_render_samples() {
        let size = 5;
        let kernel = Volume::new(size, vec![[1.0, -1.0, 0.0]]);
        let mut model   = vec![0.0; 125];
        let mut weights = vec![0.0; 125];
        kernel.back_project(&[3.0], &SpatialRotation::identity(), &mut model, &mut weights);
        let i = idx(size, [3, 1, 2]);
        assert_float_eq!(weights[i], 1.0, abs <= 1e-12);
        assert_float_eq!(model[i], 3.0, abs <= 1e-12);
        assert_float_eq!(weights.iter().sum::<f64>(), 1.0, abs <= 1e-12);
    }
}

// ----- Imports ------------------------------------------------------------------------------------------
use geometry::{SpatialRotation, Stencil, trilinear};
