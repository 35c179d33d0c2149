//! The EMC iteration.
//!
//! Every iteration walks through the frames in memory-limited blocks. For
//! each block
//!
//! + E-step: every owned orientation renders a log-view of the model, from
//!   which the log-likelihood of each frame is calculated; the
//!   log-likelihoods are normalized into probabilities across the group.
//!
//! + M-step: every owned orientation merges the frames, weighted by their
//!   probabilities, into a view, which is back-projected into partial model
//!   and weight accumulators.
//!
//! At the end of the iteration the partial accumulators are summed on the
//! root, which divides model by weights and broadcasts the result.

use std::fmt;
use std::ops::Range;
use std::time::{Duration, Instant};

use ndarray::{ArrayView2, ArrayViewMut2};

use units::{bytes_, todo::{Scalef64, Weightf64}};

use crate::{
    config::Config,
    error::{EmcError, Result},
    frames::{FrameBlock, SparseFrameSet},
    group::GroupChannel,
    kernel::CompatKernel,
    model::Model,
    orientation::{Orientation, OrientationTable},
    partition::{MemoryBudget, blocks, max_owned, owned_orientations},
    probability::{ProbabilityMatrix, normalize},
    streams::{StreamState, Streams},
};

/// Engine parameters, as far as they do not describe the dataset
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settings {
    pub need_scaling: bool,
    pub num_streams: usize,
    /// Bytes of memory on each process's device
    pub device_memory: usize,
    pub mem_thresh: f64,
    pub p_min: f64,
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            need_scaling : false,
            num_streams  : 4,
            device_memory: 4 << 30,
            mem_thresh   : 0.8,
            p_min        : 1e-6,
            seed         : None,
        }
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        let engine = &config.engine;
        Self {
            need_scaling : config.emc.need_scaling,
            num_streams  : engine.num_streams,
            device_memory: bytes_(engine.device_memory) as usize,
            mem_thresh   : engine.mem_thresh,
            p_min        : engine.p_min,
            seed         : engine.seed,
        }
    }
}

/// Everything the phases of an iteration read or update. The dataset is
/// shared between all members of a group living in the same process; the
/// model and weights belong to one member.
pub struct ReconstructionContext<'d, K: CompatKernel> {
    pub kernel: &'d K,
    pub frames: &'d SparseFrameSet,
    pub orientations: &'d OrientationTable<K::Orientation>,
    pub scales: Vec<Scalef64>,
    pub model: Model,
    pub weights: Vec<Weightf64>,
    pub settings: Settings,
}

/// The best orientation of every frame, as found in the latest iteration
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    best: Vec<Option<usize>>,
}

impl Assignment {

    pub fn new(num_data: usize) -> Self { Self { best: vec![None; num_data] } }

    /// Record the winners of the frames starting at `start`
    pub fn record(&mut self, start: usize, winners: &[Option<usize>]) {
        self.best[start..start + winners.len()].copy_from_slice(winners);
    }

    pub fn as_slice(&self) -> &[Option<usize>] { &self.best }
    pub fn get(&self, d: usize) -> Option<usize> { self.best[d] }

    /// Angle of each frame's best orientation, in degrees; NaN if none was found
    pub fn degrees<O: Orientation>(&self, table: &OrientationTable<O>) -> Vec<f64> {
        self.best.iter()
            .map(|r| r.map_or(f64::NAN, |r| units::degree_(table[r].angle())))
            .collect()
    }
}

/// What happened in one iteration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationReport {
    pub iteration: usize,
    pub duration: Duration,
    /// Euclidean norm of the change in the model
    pub change: f64,
}

impl IterationReport {
    pub const HEADER: &'static str = "Iter  time(s)  change";
}

impl fmt::Display for IterationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = c_exponent(self.duration.as_secs_f64(), 2);
        write!(f, "{:<6}{:<8} {}", self.iteration, time, c_exponent(self.change, 6))
    }
}

/// `x` in scientific notation with a signed, two-digit exponent: `1.50e+00`
fn c_exponent(x: f64, precision: usize) -> String {
    let s = format!("{x:.precision$e}");
    match s.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None         => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s, // inf, NaN
    }
}

pub struct Emc<'d, K: CompatKernel, G: GroupChannel> {
    ctx: ReconstructionContext<'d, K>,
    group: G,
    streams: Streams,
    probabilities: ProbabilityMatrix,
    assignment: Assignment,
    owned: Vec<usize>,
    schedule: Vec<Range<usize>>,
    iteration: usize,
}

impl<'d, K: CompatKernel, G: GroupChannel> Emc<'d, K, G> {

    /// Prepare to reconstruct from a random starting model, drawn by the root
    pub fn new(
        kernel      : &'d K,
        frames      : &'d SparseFrameSet,
        orientations: &'d OrientationTable<K::Orientation>,
        settings    : Settings,
        group       : G,
    ) -> Result<Self> {
        let shape = kernel.shape();
        let model = if group.is_root() {
            let mean_intensity = frames.mean_count() / kernel.num_pix().max(1) as f64;
            Model::random(shape, mean_intensity, settings.seed)
        } else {
            Model::zeros(shape)
        };
        Self::with_model(kernel, frames, orientations, settings, group, model)
    }

    /// Prepare to reconstruct starting from the root's `model`
    pub fn with_model(
        kernel      : &'d K,
        frames      : &'d SparseFrameSet,
        orientations: &'d OrientationTable<K::Orientation>,
        settings    : Settings,
        group       : G,
        mut model   : Model,
    ) -> Result<Self> {
        if frames.num_pix() != kernel.num_pix() {
            return Err(EmcError::SchemaMismatch { expected: kernel.num_pix(), found: frames.num_pix() })
        }
        if model.shape != kernel.shape() {
            return Err(EmcError::config(format!("model of shape {:?} cannot be used with kernel of shape {:?}",
                                                model.shape, kernel.shape())))
        }
        if orientations.is_empty() {
            return Err(EmcError::config("no orientations to compare the frames with"))
        }
        group.broadcast(&mut model.data)?;

        let (rank, size) = (group.rank(), group.size());
        let num_rot = orientations.len();
        let owned = owned_orientations(num_rot, rank, size);

        // ----- Agree on a block schedule which fits on every device ------------------
        let budget = MemoryBudget {
            available: settings.device_memory,
            reserved : frames.mem_bytes(),
            threshold: settings.mem_thresh,
        };
        let rows = max_owned(num_rot, size);
        let local = budget.frame_capacity(rows);
        let mut agreed = [-local.as_ref().map_or(0, |&c| c as i64)];
        group.all_reduce_max(&mut agreed)?;
        let capacity = match (local, -agreed[0]) {
            (Err(e), _) => return Err(e),
            (Ok(_), 0)  => return Err(EmcError::InsufficientMemory { required: rows * 8, budget: budget.bytes() }),
            (Ok(_), c)  => c as usize,
        };
        let schedule = blocks(frames.num_data(), capacity);
        if group.is_root() {
            log::info!("{} frames, {} orientations, {} processes: {} block(s) of at most {} frames",
                       frames.num_data(), num_rot, size, schedule.len(), capacity);
        }
        log::debug!("rank {rank} owns {} orientations", owned.len());

        let streams = Streams::new(settings.num_streams, kernel.num_pix(), model.len())?;
        let ctx = ReconstructionContext {
            kernel, frames, orientations,
            scales: frames.scales(settings.need_scaling),
            weights: vec![0.0; model.len()],
            model,
            settings,
        };
        Ok(Self {
            ctx, group, streams,
            probabilities: ProbabilityMatrix::new(),
            assignment: Assignment::new(frames.num_data()),
            owned, schedule,
            iteration: 0,
        })
    }

    /// Perform one full EM iteration, updating the model on every member
    pub fn run_iteration(&mut self) -> Result<IterationReport> {
        let start = Instant::now();
        self.iteration += 1;
        let previous = self.ctx.model.clone();

        self.ctx.weights.fill(0.0);
        self.streams.zero_accumulators();

        let ctx = &self.ctx;
        for range in &self.schedule {
            let block = ctx.frames.block(range.clone(), &ctx.scales);
            log::debug!("iteration {}: frames {range:?} with {} photons", self.iteration, block.photons());

            let probabilities = self.probabilities.prepare(self.owned.len(), block.len());
            calculate_prob(ctx, &self.owned, &block, probabilities, &mut self.streams);

            let winners = normalize_prob(ctx, self.probabilities.view_mut(), &self.owned, &self.group)?;
            self.assignment.record(range.start, &winners);

            update_model(ctx, &self.owned, &block, self.probabilities.view(), &mut self.streams);
        }
        normalize_model(&mut self.ctx, &self.group, &self.streams)?;

        Ok(IterationReport {
            iteration: self.iteration,
            duration: start.elapsed(),
            change: self.ctx.model.change(&previous),
        })
    }

    pub fn model     (&self) -> &Model       { &self.ctx.model }
    pub fn weights   (&self) -> &[Weightf64] { &self.ctx.weights }
    pub fn assignment(&self) -> &Assignment  { &self.assignment }
    pub fn schedule  (&self) -> &[Range<usize>] { &self.schedule }
    /// Normalized probabilities of the last block: one row per owned
    /// orientation, one column per frame
    pub fn probabilities(&self) -> ArrayView2<'_, f64> { self.probabilities.view() }
    pub fn owned     (&self) -> &[usize]     { &self.owned }
    pub fn context   (&self) -> &ReconstructionContext<'d, K> { &self.ctx }
    pub fn group     (&self) -> &G           { &self.group }
    pub fn is_root   (&self) -> bool         { self.group.is_root() }
    pub fn iteration (&self) -> usize        { self.iteration }
}

/// E-step, first half: log-likelihood of every frame in `block` under every
/// owned orientation. Row `i` of `probabilities` belongs to `owned[i]`.
pub fn calculate_prob<K: CompatKernel>(
    ctx          : &ReconstructionContext<K>,
    owned        : &[usize],
    block        : &FrameBlock,
    mut probabilities: ArrayViewMut2<f64>,
    streams      : &mut Streams,
) {
    let init = -ctx.model.sum();
    let tasks = probabilities.outer_iter_mut().zip(owned);
    streams.dispatch(tasks, |state, (row, &r)| {
        ctx.kernel.render(&ctx.model.data, &ctx.orientations[r], 1.0, None, true, &mut state.view);
        ctx.kernel.log_likelihood(&state.view, init, block, row);
    });
}

/// E-step, second half: normalize across the group. Returns every frame's
/// winning orientation.
pub fn normalize_prob<K: CompatKernel, G: GroupChannel>(
    ctx          : &ReconstructionContext<K>,
    probabilities: ArrayViewMut2<f64>,
    owned        : &[usize],
    group        : &G,
) -> Result<Vec<Option<usize>>> {
    normalize(probabilities, owned, group, ctx.settings.p_min)
}

/// M-step: merge the frames of `block` into one view per owned orientation,
/// and back-project each view into its stream's accumulators.
pub fn update_model<K: CompatKernel>(
    ctx          : &ReconstructionContext<K>,
    owned        : &[usize],
    block        : &FrameBlock,
    probabilities: ArrayView2<f64>,
    streams      : &mut Streams,
) {
    // A dataset without any photons would add weight but no intensity. Empty
    // frames among lit ones still take part.
    if ctx.frames.mean_count() == 0.0 {
        log::debug!("dataset holds no photons: skipping merge of frames {:?}", block.range());
        return
    }
    let background = ctx.frames.background();
    let tasks = probabilities.outer_iter().zip(owned);
    streams.dispatch(tasks, |state, (row, &r)| {
        let p_norm = row.sum();
        if p_norm == 0.0 {
            log::debug!("orientation {r} has no support in frames {:?}", block.range());
            return
        }
        let StreamState { view, model, weights } = state;
        view.fill(0.0);
        ctx.kernel.merge(row, block, view);
        for (v, &bg) in view.iter_mut().zip(background) {
            *v = *v / p_norm - bg;
        }
        ctx.kernel.back_project(view, &ctx.orientations[r], model, weights);
    });
}

/// End of iteration: sum the accumulators on the root, which keeps the
/// previous intensity wherever nothing was merged, then share the new model.
pub fn normalize_model<K: CompatKernel, G: GroupChannel>(
    ctx    : &mut ReconstructionContext<K>,
    group  : &G,
    streams: &Streams,
) -> Result<()> {
    let mut merged = vec![0.0; ctx.model.len()];
    streams.accumulate_into(&mut merged, &mut ctx.weights);
    group.reduce_to_root(&mut merged)?;
    group.reduce_to_root(&mut ctx.weights)?;
    if group.is_root() {
        for ((m, &sum), &w) in ctx.model.data.iter_mut().zip(&merged).zip(&ctx.weights) {
            if w > 0.0 { *m = sum / w }
        }
    }
    group.broadcast(&mut ctx.model.data)?;
    group.broadcast(&mut ctx.weights)?;
    Ok(())
}
