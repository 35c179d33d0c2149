//! Forward and backward projection between model and detector.
//!
//! A `CompatKernel` knows how to
//!
//! + `render` the model as seen from one orientation (a *view*: one value per
//!   detector pixel),
//!
//! + `back_project` a view into model-space accumulators,
//!
//! + compute the `log_likelihood` of every frame in a block, given the
//!   logarithm of a view,
//!
//! + `merge` a block of frames, weighted by their probabilities, into a view.
//!
//! The last two only depend on the sparse frame encoding, so they come with
//! default implementations; geometries differ only in `render` and
//! `back_project`.

pub mod in_plane;
pub mod volume;

pub use in_plane::InPlane;
pub use volume::Volume;

/// What a log-view holds for pixels which see no (or vanishing) intensity
pub const LOG_FLOOR: f64 = -1000.0;

/// Intensities below this are treated as zero when taking logarithms
const TINY: f64 = 1e-20;

pub trait CompatKernel: Send + Sync {
    type Orientation: Orientation;

    /// Number of detector pixels, i.e. the length of every view
    fn num_pix(&self) -> usize;

    /// Shape of the models this kernel projects
    fn shape(&self) -> ModelShape;

    /// Fill `view` with the model as seen from `orientation`. `background`
    /// (if any) is added to pixels which see the model; with `log` the
    /// natural logarithm of the intensity is stored instead.
    fn render(
        &self,
        model      : &[Intensityf64],
        orientation: &Self::Orientation,
        scale      : Scalef64,
        background : Option<&[Intensityf64]>,
        log        : bool,
        view       : &mut [Intensityf64],
    );

    /// Scatter `view` into `model` and the interpolation weights into `weights`
    fn back_project(
        &self,
        view       : &[Intensityf64],
        orientation: &Self::Orientation,
        model      : &mut [Intensityf64],
        weights    : &mut [Weightf64],
    );

    /// Log-likelihood of each frame of `block` given the log-view `lview`.
    /// `init` is the (negated) total model intensity, weighted by each
    /// frame's scale.
    fn log_likelihood(&self, lview: &[LogProbf64], init: f64, block: &FrameBlock, mut row: ArrayViewMut1<LogProbf64>) {
        for (d, p) in row.iter_mut().enumerate() {
            let (multi, counts) = block.multi(d);
            *p = init * block.scale(d)
                + block.ones(d).iter().map(|&t| lview[t as usize]).sum::<f64>()
                + multi.iter().zip(counts).map(|(&t, &c)| lview[t as usize] * c as f64).sum::<f64>();
        }
    }

    /// Accumulate the frames of `block`, each weighted by its probability,
    /// into `view`
    fn merge(&self, probabilities: ArrayView1<Probabilityf64>, block: &FrameBlock, view: &mut [Intensityf64]) {
        for (d, &p) in probabilities.iter().enumerate() {
            for &t in block.ones(d) { view[t as usize] += p }
            let (multi, counts) = block.multi(d);
            for (&t, &c) in multi.iter().zip(counts) { view[t as usize] += p * c as f64 }
        }
    }
}

/// Value of a rendered pixel, given the interpolated model intensity (`None`
/// if the pixel samples outside the model)
#[inline]
pub(crate) fn pixel_value(interpolated: Option<f64>, scale: f64, background: f64, log: bool) -> f64 {
    match (interpolated, log) {
        (None, false) => 0.0,
        (None, true ) => LOG_FLOOR,
        (Some(v), log) => {
            let v = v * scale + background;
            if !log       { v }
            else if v < TINY { LOG_FLOOR }
            else          { v.ln() }
        }
    }
}


// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{ArrayView1, ArrayViewMut1};

use units::todo::{Intensityf64, LogProbf64, Probabilityf64, Scalef64, Weightf64};

use crate::{
    frames::FrameBlock,
    model::ModelShape,
    orientation::Orientation,
};
