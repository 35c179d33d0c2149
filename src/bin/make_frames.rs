// ----------------------------------- CLI -----------------------------------
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "make_frames", about = "Generate a synthetic 2-D photons file from a random model")]
pub struct Cli {

    /// Where to write the photons
    #[clap(short, long, default_value = "data/photons.h5")]
    pub out: PathBuf,

    /// Edge length of the model
    #[clap(short, long, default_value = "65")]
    pub size: usize,

    /// Number of in-plane orientations to sample from
    #[clap(short = 'r', long, default_value = "360")]
    pub num_rot: usize,

    /// Number of frames
    #[clap(short = 'n', long, default_value = "1000")]
    pub num_data: usize,

    /// Expected photons per frame
    #[clap(short = 'p', long, default_value = "100")]
    pub photons: f64,

    /// Number of Gaussian blobs making up the model
    #[clap(short, long, default_value = "5")]
    pub blobs: usize,

    /// Read the model from this raw file instead of generating one
    #[clap(short, long)]
    pub model: Option<PathBuf>,

    /// Seed for all random choices
    #[clap(long, default_value = "42")]
    pub seed: u64,

    /// Round intensities instead of sampling Poisson noise
    #[clap(long)]
    pub exact: bool,
}

// --------------------------------------------------------------------------------

fn main() -> Result<(), Box<dyn Error>> {

    let Cli { out, size, num_rot, num_data, photons, blobs, model, seed, exact } = Cli::parse();
    let mut progress = Progress::new();
    let mut rng = StdRng::seed_from_u64(seed);
    let shape = ModelShape::Plane(size);

    let mut model = match model {
        Some(path) => {
            progress.start(&format!("Reading model from {}", path.display()));
            let data = io::raw::read(&path)?.collect::<Result<Vec<_>, _>>()?;
            let model = Model::new(shape, data)
                .ok_or_else(|| format!("{} does not hold a {size}×{size} model", path.display()))?;
            progress.done();
            model
        }
        None => {
            progress.start(&format!("Generating model from {blobs} blobs"));
            let model = blob_model(shape, blobs, &mut rng);
            progress.done();
            model
        }
    };

    // Scale the model so that each frame sees `photons` on average
    let kernel = InPlane::new(size);
    let table = OrientationTable::in_plane(num_rot);
    let mut view = vec![0.0; kernel.num_pix()];
    kernel.render(&model.data, &table[0], 1.0, None, false, &mut view);
    let seen: f64 = view.iter().sum();
    if seen <= 0.0 { return Err("model is invisible to the detector".into()) }
    model.data.iter_mut().for_each(|v| *v *= photons / seen);

    progress.start("Rendering frames");
    let truth: Vec<usize> = (0..num_data).map(|_| rng.gen_range(0..num_rot)).collect();
    let noise = if exact { Noise::Exact } else { Noise::Poisson { seed: rng.gen() } };
    let frames = render_frames(&kernel, &model, &table, &truth, noise)?;
    progress.done_with_message(&format!("{} frames, {:.2} photons per frame", g(frames.num_data()), frames.mean_count()));

    progress.start(&format!("Writing {}", out.display()));
    if let Some(dir) = out.parent() { std::fs::create_dir_all(dir)? }
    io::hdf5::write_photons(&out, &frames)?;
    let truth_degrees: Vec<f64> = truth.iter().map(|&r| degree_(table[r].angle())).collect();
    io::raw::write(truth_degrees.into_iter(), &out.with_extension("truth.raw"))?;
    io::raw::write(model.data.iter().copied(), &out.with_extension("model.raw"))?;
    progress.done();
    Ok(())
}

/// Sum of isotropic Gaussians of random position, width and height, kept
/// away from the edges so that every orientation sees all of them
fn blob_model(shape: ModelShape, blobs: usize, rng: &mut StdRng) -> Model {
    let n = shape.size() as f64;
    let centre = (shape.size() / 2) as f64;
    let reach = n / 4.0;
    let blobs: Vec<_> = (0..blobs)
        .map(|_| {
            let x = centre + rng.gen_range(-reach..=reach);
            let y = centre + rng.gen_range(-reach..=reach);
            let sigma = rng.gen_range(1.0..=(n / 16.0).max(1.5));
            let height = rng.gen_range(0.2..=1.0);
            (x, y, sigma, height)
        })
        .collect();
    let mut model = Model::zeros(shape);
    for i in 0..shape.size() {
        for j in 0..shape.size() {
            let (fi, fj) = (i as f64, j as f64);
            model[i * shape.size() + j] = blobs.iter()
                .map(|&(x, y, s, h)| h * (-((fi - x).powi(2) + (fj - y).powi(2)) / (2.0 * s * s)).exp())
                .sum();
        }
    }
    model
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use rand::{Rng, SeedableRng, rngs::StdRng};

use emc::{
    CompatKernel, InPlane, Model, ModelShape, Orientation, OrientationTable,
    io,
    synthetic::{Noise, render_frames},
    utils::{group_digits as g, timing::Progress},
};
use units::degree_;
