//! Synthetic datasets: frames made by rendering a known model at known
//! orientations.

use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Poisson};

use crate::{
    error::Result,
    frames::{Count, Pixel, SparseFrameSet},
    kernel::CompatKernel,
    model::Model,
    orientation::OrientationTable,
};

/// How rendered intensities become photon counts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Noise {
    /// Intensities rounded to the nearest integer
    Exact,
    /// Poisson-distributed counts, from a seeded generator
    Poisson { seed: u64 },
}

/// One frame for each entry of `truth`, showing `model` at orientation
/// `truth[d]`.
pub fn render_frames<K: CompatKernel>(
    kernel: &K,
    model : &Model,
    table : &OrientationTable<K::Orientation>,
    truth : &[usize],
    noise : Noise,
) -> Result<SparseFrameSet> {
    let mut rng = match noise {
        Noise::Poisson { seed } => Some(StdRng::seed_from_u64(seed)),
        Noise::Exact => None,
    };
    let mut view = vec![0.0; kernel.num_pix()];
    let frames: Vec<Vec<(Pixel, Count)>> = truth.iter()
        .map(|&r| {
            kernel.render(&model.data, &table[r], 1.0, None, false, &mut view);
            view.iter().enumerate()
                .filter_map(|(t, &intensity)| {
                    let count = match rng.as_mut() {
                        None => intensity.round().max(0.0) as Count,
                        Some(rng) => poisson(intensity, rng),
                    };
                    (count > 0).then_some((t as Pixel, count))
                })
                .collect()
        })
        .collect();
    SparseFrameSet::from_frames(kernel.num_pix(), frames)
}

fn poisson(mean: f64, rng: &mut StdRng) -> Count {
    match Poisson::new(mean) {
        Ok(distribution) => distribution.sample(rng) as Count,
        // Zero (or negative, or NaN) mean
        Err(_) => 0,
    }
}
