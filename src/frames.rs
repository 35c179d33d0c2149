//! Sparse photon-count frames.
//!
//! Most pixels of a frame see no photons, and most of those which do, see
//! exactly one. So each frame is stored as two disjoint lists: the pixels
//! which caught a single photon (`place_ones`) and the pixels which caught
//! more (`place_multi`, with their counts in `count_multi`). The lists of all
//! frames are pooled into flat arrays; `ones_accum[d]` / `multi_accum[d]` give
//! the offset at which frame `d`'s segment starts.

use std::ops::Range;

use units::todo::{Intensityf64, Scalef64};

use crate::error::{EmcError, Result};

pub type Pixel = u32;
pub type Count = u32;

#[derive(Clone, Debug, PartialEq)]
pub struct SparseFrameSet {
    num_pix: usize,
    ones: Vec<u32>,
    multi: Vec<u32>,
    ones_accum: Vec<usize>,
    multi_accum: Vec<usize>,
    place_ones: Vec<Pixel>,
    place_multi: Vec<Pixel>,
    count_multi: Vec<Count>,
    /// Total number of photons in each frame
    counts: Vec<u64>,
    mean_count: f64,
    /// Expected per-pixel background, subtracted from merged views
    background: Vec<Intensityf64>,
}

impl SparseFrameSet {

    /// Build the pooled encoding from one `(pixel, count)` list per frame.
    /// Zero counts are dropped.
    pub fn from_frames<F, P>(num_pix: usize, frames: F) -> Result<Self>
    where
        F: IntoIterator<Item = P>,
        P: IntoIterator<Item = (Pixel, Count)>,
    {
        let mut ones        = vec![];
        let mut multi       = vec![];
        let mut place_ones  = vec![];
        let mut place_multi = vec![];
        let mut count_multi = vec![];
        for frame in frames {
            let (o, m) = (place_ones.len(), place_multi.len());
            for (pixel, count) in frame {
                if pixel as usize >= num_pix {
                    return Err(EmcError::dataset(format!("pixel {pixel} out of range for {num_pix}-pixel detector")))
                }
                match count {
                    0 => {},
                    1 => place_ones.push(pixel),
                    _ => { place_multi.push(pixel); count_multi.push(count) },
                }
            }
            ones .push((place_ones .len() - o) as u32);
            multi.push((place_multi.len() - m) as u32);
        }
        Self::from_parts(num_pix, ones, multi, place_ones, place_multi, count_multi)
    }

    /// Assemble from the pooled arrays, as stored on disk. Offsets are derived
    /// from the per-frame segment lengths.
    pub fn from_parts(
        num_pix    : usize,
        ones       : Vec<u32>,
        multi      : Vec<u32>,
        place_ones : Vec<Pixel>,
        place_multi: Vec<Pixel>,
        count_multi: Vec<Count>,
    ) -> Result<Self> {
        if ones.len() != multi.len() {
            return Err(EmcError::dataset(format!("{} frames of singles but {} frames of multiples", ones.len(), multi.len())))
        }
        if place_multi.len() != count_multi.len() {
            return Err(EmcError::dataset("multi-photon pixels and counts differ in length"))
        }
        let ones_accum  = accumulate(&ones);
        let multi_accum = accumulate(&multi);
        let segments_fill = |lengths: &[u32], pooled: usize| lengths.iter().map(|&n| n as usize).sum::<usize>() == pooled;
        if !segments_fill(&ones, place_ones.len()) || !segments_fill(&multi, place_multi.len()) {
            return Err(EmcError::dataset("frame segment lengths do not add up to pooled array length"))
        }
        if let Some(p) = place_ones.iter().chain(&place_multi).find(|&&p| p as usize >= num_pix) {
            return Err(EmcError::dataset(format!("pixel {p} out of range for {num_pix}-pixel detector")))
        }

        let counts: Vec<u64> = (0..ones.len())
            .map(|d| {
                let m = multi_accum[d]..multi_accum[d] + multi[d] as usize;
                ones[d] as u64 + count_multi[m].iter().map(|&c| c as u64).sum::<u64>()
            })
            .collect();
        let num_data = counts.len();
        let mean_count = if num_data > 0 { counts.iter().sum::<u64>() as f64 / num_data as f64 } else { 0.0 };

        Ok(Self {
            num_pix, ones, multi, ones_accum, multi_accum,
            place_ones, place_multi, count_multi,
            counts, mean_count,
            background: vec![0.0; num_pix],
        })
    }

    /// Replace the (default zero) per-pixel background
    pub fn with_background(mut self, background: Vec<Intensityf64>) -> Result<Self> {
        if background.len() != self.num_pix {
            return Err(EmcError::SchemaMismatch { expected: self.num_pix, found: background.len() })
        }
        self.background = background;
        Ok(self)
    }

    pub fn num_data(&self) -> usize { self.counts.len() }
    pub fn num_pix (&self) -> usize { self.num_pix }
    pub fn mean_count(&self) -> f64 { self.mean_count }
    pub fn counts(&self) -> &[u64] { &self.counts }
    pub fn background(&self) -> &[Intensityf64] { &self.background }

    /// Per-frame incident-flux scale factors: all ones unless `need_scaling`,
    /// in which case each frame's count relative to the mean. A dataset
    /// without any photons has nothing to scale against, and gets ones.
    pub fn scales(&self, need_scaling: bool) -> Vec<Scalef64> {
        if need_scaling && self.mean_count > 0.0 {
            self.counts.iter().map(|&c| c as f64 / self.mean_count).collect()
        } else {
            vec![1.0; self.num_data()]
        }
    }

    /// Bytes occupied by the pooled photon data: what a device would reserve
    /// for the dataset before allocating any probabilities.
    pub fn mem_bytes(&self) -> usize {
        use std::mem::size_of;
        (self.ones.len() + self.multi.len()) * size_of::<u32>() +
        (self.ones_accum.len() + self.multi_accum.len()) * size_of::<usize>() +
        (self.place_ones.len() + self.place_multi.len()) * size_of::<Pixel>() +
        self.count_multi.len() * size_of::<Count>() +
        self.counts.len() * size_of::<u64>() +
        self.background.len() * size_of::<Intensityf64>()
    }

    /// The frames in `range`, with their scale factors
    pub fn block<'a>(&'a self, range: Range<usize>, scales: &'a [Scalef64]) -> FrameBlock<'a> {
        assert!(range.end <= self.num_data(), "block {range:?} exceeds {} frames", self.num_data());
        FrameBlock { set: self, scales: &scales[range.clone()], range }
    }

    /// Pixels of frame `d` holding exactly one photon
    #[inline]
    pub fn ones(&self, d: usize) -> &[Pixel] {
        let start = self.ones_accum[d];
        &self.place_ones[start..start + self.ones[d] as usize]
    }

    /// Pixels of frame `d` holding more than one photon, with their counts
    #[inline]
    pub fn multi(&self, d: usize) -> (&[Pixel], &[Count]) {
        let start = self.multi_accum[d];
        let r = start..start + self.multi[d] as usize;
        (&self.place_multi[r.clone()], &self.count_multi[r])
    }

    /// Reassemble frame `d` as `(pixel, count)` pairs
    pub fn frame(&self, d: usize) -> impl Iterator<Item = (Pixel, Count)> + '_ {
        let (pixels, counts) = self.multi(d);
        self.ones(d).iter().map(|&p| (p, 1))
            .chain(pixels.iter().copied().zip(counts.iter().copied()))
    }

    /// The pooled arrays, in the order accepted by `from_parts`
    pub fn parts(&self) -> (&[u32], &[u32], &[Pixel], &[Pixel], &[Count]) {
        (&self.ones, &self.multi, &self.place_ones, &self.place_multi, &self.count_multi)
    }
}

/// Exclusive prefix sum: the offset at which each segment starts
fn accumulate(lengths: &[u32]) -> Vec<usize> {
    lengths.iter()
        .scan(0, |offset, &n| { let start = *offset; *offset += n as usize; Some(start) })
        .collect()
}

/// A contiguous range of frames, processed together.
#[derive(Clone, Debug)]
pub struct FrameBlock<'a> {
    set: &'a SparseFrameSet,
    range: Range<usize>,
    scales: &'a [Scalef64],
}

impl<'a> FrameBlock<'a> {
    pub fn len(&self) -> usize { self.range.len() }
    pub fn is_empty(&self) -> bool { self.range.is_empty() }
    pub fn range(&self) -> Range<usize> { self.range.clone() }

    /// Scale factor of the `d`th frame *of this block*
    #[inline] pub fn scale(&self, d: usize) -> Scalef64 { self.scales[d] }
    #[inline] pub fn ones (&self, d: usize) -> &'a [Pixel] { self.set.ones(self.range.start + d) }
    #[inline] pub fn multi(&self, d: usize) -> (&'a [Pixel], &'a [Count]) { self.set.multi(self.range.start + d) }

    /// Total photons in all frames of the block
    pub fn photons(&self) -> u64 { self.set.counts[self.range.clone()].iter().sum() }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use proptest::prelude::*;
    use rstest::rstest;

    fn three_frames() -> SparseFrameSet {
        SparseFrameSet::from_frames(10, vec![
            vec![(1, 1), (4, 3), (5, 1)],
            vec![],
            vec![(9, 2), (0, 1), (3, 0)],
        ]).unwrap()
    }

    #[test]
    fn singles_and_multiples_are_separated() {
        let set = three_frames();
        assert_eq!(set.num_data(), 3);
        assert_eq!(set.ones(0), &[1, 5]);
        assert_eq!(set.multi(0), (&[4][..], &[3][..]));
        assert_eq!(set.ones(1), &[] as &[Pixel]);
        assert_eq!(set.ones(2), &[0]);
        assert_eq!(set.multi(2), (&[9][..], &[2][..]));
        assert_eq!(set.counts(), &[5, 0, 3]);
        assert_eq!(set.mean_count(), 8.0 / 3.0);
    }

    #[test]
    fn scales() {
        let set = three_frames();
        assert_eq!(set.scales(false), vec![1.0; 3]);
        let s = set.scales(true);
        assert_eq!(s[1], 0.0);
        assert_eq!(s[0], 5.0 / (8.0 / 3.0));
    }

    #[test]
    fn empty_dataset_scales_are_one() {
        let set = SparseFrameSet::from_frames(4, vec![Vec::new(); 3]).unwrap();
        assert_eq!(set.mean_count(), 0.0);
        assert_eq!(set.scales(true), vec![1.0; 3]);
    }

    #[test]
    fn block_views() {
        let set = three_frames();
        let scales = set.scales(false);
        let block = set.block(1..3, &scales);
        assert_eq!(block.len(), 2);
        assert_eq!(block.ones(1), &[0]);
        assert_eq!(block.photons(), 3);
        assert_eq!(set.block(1..2, &scales).photons(), 0);
    }

    #[rstest(/**/ ones      , multi     , place_ones, place_multi, count_multi,
             case(vec![1, 2], vec![0]   , vec![0, 1, 2], vec![], vec![]),     // frame count mismatch
             case(vec![1, 2], vec![0, 0], vec![0, 1]   , vec![], vec![]),     // singles don't fill
             case(vec![0, 0], vec![1, 0], vec![]       , vec![3], vec![]),    // counts missing
             case(vec![1, 0], vec![0, 0], vec![99]     , vec![], vec![]),     // pixel out of range
    )]
    fn inconsistent_parts(
        ones: Vec<u32>, multi: Vec<u32>,
        place_ones: Vec<Pixel>, place_multi: Vec<Pixel>, count_multi: Vec<Count>,
    ) {
        let set = SparseFrameSet::from_parts(10, ones, multi, place_ones, place_multi, count_multi);
        assert!(matches!(set, Err(EmcError::InvalidDataset(_))));
    }

    #[test]
    fn background_must_cover_detector() {
        let set = three_frames();
        assert!(matches!(set.clone().with_background(vec![0.5; 3]), Err(EmcError::SchemaMismatch { expected: 10, found: 3 })));
        assert_eq!(set.with_background(vec![0.5; 10]).unwrap().background()[7], 0.5);
    }

    fn sparse_frames() -> impl Strategy<Value = Vec<Vec<(Pixel, Count)>>> {
        prop::collection::vec(prop::collection::vec((0..50_u32, 0..5_u32), 0..20), 0..30)
    }

    proptest! {
        // Offsets never decrease and segments exactly tile the pooled arrays
        #[test]
        fn offsets_tile_pooled_arrays(frames in sparse_frames()) {
            let set = SparseFrameSet::from_frames(50, frames.clone()).unwrap();
            let (ones, multi, place_ones, place_multi, _) = set.parts();
            prop_assert!(set.ones_accum.windows(2).all(|w| w[0] <= w[1]));
            prop_assert!(set.multi_accum.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(ones .iter().map(|&n| n as usize).sum::<usize>(), place_ones .len());
            prop_assert_eq!(multi.iter().map(|&n| n as usize).sum::<usize>(), place_multi.len());
            for (d, frame) in frames.iter().enumerate() {
                let expected: Vec<_> = frame.iter().copied().filter(|&(_, c)| c > 0).collect();
                let mut got: Vec<_> = set.frame(d).collect();
                let mut expected_sorted = expected.clone();
                got.sort();
                expected_sorted.sort();
                prop_assert_eq!(got, expected_sorted);
            }
        }
    }
}
