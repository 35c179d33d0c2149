/// Read photons, detectors and orientations from HDF5 files

use std::path::Path;

use hdf5::types::VarLenArray;

use crate::error::{EmcError, Result};
use crate::frames::SparseFrameSet;

/// Ragged per-frame arrays, as stored on disk
type Ragged = ndarray::Array1<VarLenArray<i32>>;

fn read_ragged(file: &hdf5::File, name: &str) -> Result<Ragged> {
    Ok(file.dataset(name)?.read_1d::<VarLenArray<i32>>()?)
}

fn non_negative(name: &str, values: &[i32]) -> Result<Vec<u32>> {
    values.iter()
        .map(|&v| u32::try_from(v)
             .map_err(|_| EmcError::dataset(format!("negative value {v} in `{name}`"))))
        .collect()
}

/// Per-frame lengths stored alongside the ragged arrays must agree with them
fn check_lengths(file: &hdf5::File, name: &str, lengths: &[u32]) -> Result<()> {
    if !file.link_exists(name) { return Ok(()) }
    let stored = file.dataset(name)?.read_raw::<i64>()?;
    let agree = stored.len() == lengths.len()
        && stored.iter().zip(lengths).all(|(&s, &l)| s == l as i64);
    if agree { Ok(()) }
    else     { Err(EmcError::dataset(format!("`{name}` disagrees with the per-frame photon lists"))) }
}

/// Read a sparse photons file, which must have been recorded on a detector
/// with `det_num_pix` pixels.
///
/// Expected datasets: `num_pix` (one integer), and the per-frame variable
/// length arrays `place_ones`, `place_multi` and `count_multi`. The optional
/// per-frame counts `ones` and `multi` are checked when present.
pub fn read_photons(path: impl AsRef<Path>, det_num_pix: usize) -> Result<SparseFrameSet> {
    let file = hdf5::File::open(path)?;
    let num_pix = file.dataset("num_pix")?.read_raw::<i64>()?;
    let num_pix = num_pix.first().copied()
        .ok_or_else(|| EmcError::dataset("`num_pix` is empty"))?;
    if num_pix != det_num_pix as i64 {
        return Err(EmcError::SchemaMismatch { expected: det_num_pix, found: num_pix.max(0) as usize })
    }

    let place_ones  = read_ragged(&file, "place_ones")?;
    let place_multi = read_ragged(&file, "place_multi")?;
    let count_multi = read_ragged(&file, "count_multi")?;
    if place_ones.len() != place_multi.len() || place_multi.len() != count_multi.len() {
        return Err(EmcError::dataset(format!(
            "frame counts disagree: {} (place_ones), {} (place_multi), {} (count_multi)",
            place_ones.len(), place_multi.len(), count_multi.len())))
    }

    let flatten = |name: &str, ragged: &Ragged| -> Result<(Vec<u32>, Vec<u32>)> {
        let lengths = ragged.iter().map(|v| v.len() as u32).collect();
        let flat: Vec<i32> = ragged.iter().flat_map(|v| v.iter().copied()).collect();
        Ok((lengths, non_negative(name, &flat)?))
    };
    let (ones , place_ones ) = flatten("place_ones" , &place_ones )?;
    let (multi, place_multi) = flatten("place_multi", &place_multi)?;
    let (counted, count_multi) = flatten("count_multi", &count_multi)?;
    if let Some(d) = (0..multi.len()).find(|&d| multi[d] != counted[d]) {
        return Err(EmcError::dataset(format!(
            "frame {d}: {} pixels in `place_multi` but {} counts in `count_multi`", multi[d], counted[d])))
    }
    check_lengths(&file, "ones" , &ones )?;
    check_lengths(&file, "multi", &multi)?;
    SparseFrameSet::from_parts(det_num_pix, ones, multi, place_ones, place_multi, count_multi)
}

/// Write `frames` in the layout expected by `read_photons`
pub fn write_photons(path: impl AsRef<Path>, frames: &SparseFrameSet) -> Result<()> {
    let file = hdf5::File::create(path)?;
    let ragged = |select: &dyn Fn(usize) -> Vec<i32>| -> Vec<VarLenArray<i32>> {
        (0..frames.num_data()).map(|d| VarLenArray::from_slice(&select(d))).collect()
    };
    let as_i32 = |xs: &[u32]| xs.iter().map(|&x| x as i32).collect::<Vec<_>>();
    let place_ones  = ragged(&|d| as_i32(frames.ones(d)));
    let place_multi = ragged(&|d| as_i32(frames.multi(d).0));
    let count_multi = ragged(&|d| as_i32(frames.multi(d).1));

    let ones : Vec<i64> = (0..frames.num_data()).map(|d| frames.ones (d)  .len() as i64).collect();
    let multi: Vec<i64> = (0..frames.num_data()).map(|d| frames.multi(d).0.len() as i64).collect();
    file.new_dataset_builder().with_data(&[frames.num_pix() as i64]).create("num_pix")?;
    file.new_dataset_builder().with_data(&ones ).create("ones" )?;
    file.new_dataset_builder().with_data(&multi).create("multi")?;
    file.new_dataset_builder().with_data(&place_ones ).create("place_ones" )?;
    file.new_dataset_builder().with_data(&place_multi).create("place_multi")?;
    file.new_dataset_builder().with_data(&count_multi).create("count_multi")?;
    Ok(())
}

/// Reciprocal-space coordinates of the detector pixels: datasets `qx`, `qy`
/// and `qz`, in voxels relative to the centre of the model.
pub fn read_detector(path: impl AsRef<Path>) -> Result<Vec<[f64; 3]>> {
    let file = hdf5::File::open(path)?;
    let read = |name| -> Result<Vec<f64>> { Ok(file.dataset(name)?.read_raw::<f64>()?) };
    let (qx, qy, qz) = (read("qx")?, read("qy")?, read("qz")?);
    if qx.len() != qy.len() || qy.len() != qz.len() {
        return Err(EmcError::dataset(format!("detector coordinates disagree in length: {} {} {}",
                                             qx.len(), qy.len(), qz.len())))
    }
    Ok(itertools::izip!(qx, qy, qz).map(|(x, y, z)| [x, y, z]).collect())
}

/// Orientation quaternions, stored as rows `[w, x, y, z, ...]` of the
/// dataset `quats`. Any further columns (sampling weights) are ignored.
pub fn read_quaternions(path: impl AsRef<Path>) -> Result<Vec<[f64; 4]>> {
    let file = hdf5::File::open(path)?;
    let quats = file.dataset("quats")?.read_2d::<f64>()?;
    if quats.ncols() < 4 {
        return Err(EmcError::dataset(format!("quaternions need 4 columns, found {}", quats.ncols())))
    }
    Ok(quats.rows().into_iter().map(|q| [q[0], q[1], q[2], q[3]]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn frames() -> SparseFrameSet {
        SparseFrameSet::from_frames(20, vec![
            vec![(3, 1), (7, 4)],
            vec![],
            vec![(19, 2), (0, 1), (1, 1)],
        ]).unwrap()
    }

    #[test]
    fn photons_roundtrip() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("photons.h5");
        let original = frames();
        write_photons(&path, &original)?;
        let reloaded = read_photons(&path, 20)?;
        assert_eq!(reloaded, original);
        Ok(())
    }

    #[test]
    fn photons_from_another_detector() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("photons.h5");
        write_photons(&path, &frames())?;
        let result = read_photons(&path, 21);
        assert!(matches!(result, Err(EmcError::SchemaMismatch { expected: 21, found: 20 })));
        Ok(())
    }

    /// Write a photons file by hand, one ragged array per dataset
    fn write_ragged(path: &Path, place_multi: &[&[i32]], count_multi: &[&[i32]], ones: Option<&[i64]>) -> TestResult {
        let file = hdf5::File::create(path)?;
        let ragged = |rows: &[&[i32]]| rows.iter().map(|r| VarLenArray::from_slice(r)).collect::<Vec<_>>();
        let empty = vec![&[] as &[i32]; place_multi.len()];
        file.new_dataset_builder().with_data(&[20_i64]).create("num_pix")?;
        file.new_dataset_builder().with_data(&ragged(&empty)).create("place_ones")?;
        file.new_dataset_builder().with_data(&ragged(place_multi)).create("place_multi")?;
        file.new_dataset_builder().with_data(&ragged(count_multi)).create("count_multi")?;
        if let Some(ones) = ones { file.new_dataset_builder().with_data(ones).create("ones")?; }
        Ok(())
    }

    #[test]
    fn misaligned_counts_are_rejected() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("photons.h5");
        // Same total number of counts, split differently between the frames
        write_ragged(&path, &[&[1, 2], &[3]], &[&[2], &[2, 2]], None)?;
        assert!(matches!(read_photons(&path, 20), Err(EmcError::InvalidDataset(_))));
        Ok(())
    }

    #[test]
    fn stored_frame_lengths_are_checked() -> TestResult {
        let dir = tempfile::tempdir()?;
        let good = dir.path().join("good.h5");
        write_ragged(&good, &[&[1, 2], &[3]], &[&[2, 5], &[3]], Some(&[0, 0]))?;
        let frames = read_photons(&good, 20)?;
        assert_eq!(frames.multi(0), (&[1, 2][..], &[2, 5][..]));

        let bad = dir.path().join("bad.h5");
        write_ragged(&bad, &[&[1, 2], &[3]], &[&[2, 5], &[3]], Some(&[1, 0]))?;
        assert!(matches!(read_photons(&bad, 20), Err(EmcError::InvalidDataset(_))));
        Ok(())
    }

    #[test]
    fn detector_and_quaternions() -> TestResult {
        let dir = tempfile::tempdir()?;
        let det = dir.path().join("det.h5");
        {
            let file = hdf5::File::create(&det)?;
            file.new_dataset_builder().with_data(&[1.0, 2.0]).create("qx")?;
            file.new_dataset_builder().with_data(&[3.0, 4.0]).create("qy")?;
            file.new_dataset_builder().with_data(&[5.0, 6.0]).create("qz")?;
        }
        assert_eq!(read_detector(&det)?, vec![[1.0, 3.0, 5.0], [2.0, 4.0, 6.0]]);

        let quat = dir.path().join("quat.h5");
        {
            let file = hdf5::File::create(&quat)?;
            let q = ndarray::array![[1.0, 0.0, 0.0, 0.0, 0.5], [0.0, 0.0, 0.0, 1.0, 0.5]];
            file.new_dataset_builder().with_data(&q).create("quats")?;
        }
        assert_eq!(read_quaternions(&quat)?, vec![[1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]]);
        Ok(())
    }
}
