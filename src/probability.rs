//! Probabilities of frames under orientations, and their normalization across
//! the whole group.
//!
//! Each process holds only the rows of the orientations it owns. A frame's
//! probabilities are normalized over *all* orientations, so normalization is
//! a distributed log-sum-exp:
//!
//! 1. local maximum (and the orientation reaching it) of every frame;
//! 2. global maximum (all-reduce max);
//! 3. members whose local maximum falls short of the global one withdraw
//!    their candidate; the global winner is the all-reduce max of the
//!    remaining candidates;
//! 4. subtract the global maximum and exponentiate;
//! 5. global sum (all-reduce sum);
//! 6. divide by the sum;
//! 7. raise everything below the floor up to it.

use ndarray::{ArrayView2, ArrayViewMut2, ArrayView1, Axis, azip};

use units::todo::Probabilityf64;

use crate::error::Result;
use crate::group::GroupChannel;

/// Index of a frame's winning orientation, while it is being agreed upon
const NO_CANDIDATE: i64 = -1;

/// Reusable storage for a `rows × cols` probability matrix.
#[derive(Clone, Debug, Default)]
pub struct ProbabilityMatrix {
    buffer: Vec<Probabilityf64>,
    rows: usize,
    cols: usize,
}

impl ProbabilityMatrix {

    pub fn new() -> Self { Self::default() }

    /// Make the matrix `rows × cols`, growing the storage if needed. The
    /// region in use is zeroed, so nothing survives from earlier shapes.
    pub fn prepare(&mut self, rows: usize, cols: usize) -> ArrayViewMut2<'_, Probabilityf64> {
        let len = rows * cols;
        if self.buffer.len() < len { self.buffer.resize(len, 0.0) }
        self.buffer[..len].fill(0.0);
        self.rows = rows;
        self.cols = cols;
        self.view_mut()
    }

    pub fn shape(&self) -> (usize, usize) { (self.rows, self.cols) }

    /// Bytes held, whether in use or not
    pub fn capacity_bytes(&self) -> usize { self.buffer.len() * std::mem::size_of::<Probabilityf64>() }

    pub fn view(&self) -> ArrayView2<'_, Probabilityf64> {
        ArrayView2::from_shape((self.rows, self.cols), &self.buffer[..self.rows * self.cols])
            .expect("shape always matches prepared region")
    }

    pub fn view_mut(&mut self) -> ArrayViewMut2<'_, Probabilityf64> {
        let len = self.rows * self.cols;
        ArrayViewMut2::from_shape((self.rows, self.cols), &mut self.buffer[..len])
            .expect("shape always matches prepared region")
    }
}

/// Turn log-likelihoods into probabilities, normalized over the orientations
/// of all members of `group`, and floored at `p_min`.
///
/// `probabilities` has one row per owned orientation (whose global indices
/// are given by `owned`) and one column per frame. Returns, for each frame,
/// the orientation with the highest likelihood, as agreed by all members.
pub fn normalize<G: GroupChannel>(
    mut probabilities: ArrayViewMut2<Probabilityf64>,
    owned            : &[usize],
    group            : &G,
    p_min            : Probabilityf64,
) -> Result<Vec<Option<usize>>> {
    assert_eq!(probabilities.nrows(), owned.len());
    let cols = probabilities.ncols();

    // ----- Local maxima and the orientations reaching them ---------------------
    let mut local_max = vec![f64::NEG_INFINITY; cols];
    let mut candidate = vec![NO_CANDIDATE; cols];
    for (row, &r) in probabilities.outer_iter().zip(owned) {
        for ((&p, max), cand) in row.iter().zip(&mut local_max).zip(&mut candidate) {
            if p > *max { *max = p; *cand = r as i64 }
        }
    }

    // ----- Global maxima --------------------------------------------------------
    let mut global_max = local_max.clone();
    group.all_reduce_max(&mut global_max)?;

    // ----- Agree on the winners -------------------------------------------------
    for ((cand, &local), &global) in candidate.iter_mut().zip(&local_max).zip(&global_max) {
        if local != global { *cand = NO_CANDIDATE }
    }
    group.all_reduce_max(&mut candidate)?;

    // ----- Exponentiate relative to the maximum ---------------------------------
    let global_max = ArrayView1::from(&global_max);
    for mut row in probabilities.rows_mut() {
        azip!((p in &mut row, &max in &global_max) *p = (*p - max).exp());
    }

    // ----- Normalize over the whole group ---------------------------------------
    let mut sums = probabilities.sum_axis(Axis(0)).into_raw_vec();
    group.all_reduce_sum(&mut sums)?;
    let sums = ArrayView1::from(&sums);
    for mut row in probabilities.rows_mut() {
        azip!((p in &mut row, &sum in &sums) *p = (*p / sum).max(p_min));
    }

    Ok(candidate.into_iter()
       .map(|c| (c != NO_CANDIDATE).then_some(c as usize))
       .collect())
}
