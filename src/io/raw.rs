/// Read / write float arrays as raw binary, and the per-iteration outputs

use std::fs::{self, File};
use std::io::{Write, Read, BufWriter, BufReader};
use std::path::{Path, PathBuf};

pub fn write(data: impl Iterator<Item = f64>, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut buf = BufWriter::new(file);
    for datum in data {
        buf.write_all(&datum.to_le_bytes())?;
    }
    buf.flush()
}

type IORes<T> = std::io::Result<T>;
pub fn read<'a>(path: &Path) -> IORes<impl Iterator<Item = IORes<f64>> + 'a> {
    let file = File::open(path)?;
    let mut buf = BufReader::new(file);
    let mut buffer = [0; 8];

    Ok(std::iter::from_fn(move || {
        use std::io::ErrorKind::UnexpectedEof;
        match buf.read_exact(&mut buffer) {
            Ok(()) => Some(Ok(f64::from_le_bytes(buffer))),
            Err(e) if e.kind() == UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }))
}

/// Write the model after `iteration` (`model_NNN.raw`) and, if known, the
/// angle in degrees of each frame's best orientation (`rmax_NNN.raw`). Without
/// an iteration number the model goes to `model.raw`. Returns the paths
/// written.
pub fn write_iteration(
    folder   : &Path,
    iteration: Option<usize>,
    model    : &[f64],
    degrees  : Option<&[f64]>,
) -> IORes<Vec<PathBuf>> {
    fs::create_dir_all(folder)?;
    let mut written = vec![];
    match iteration {
        None => {
            let path = folder.join("model.raw");
            write(model.iter().copied(), &path)?;
            written.push(path);
        }
        Some(i) => {
            let path = folder.join(format!("model_{i:03}.raw"));
            write(model.iter().copied(), &path)?;
            written.push(path);
            if let Some(degrees) = degrees {
                let path = folder.join(format!("rmax_{i:03}.raw"));
                write(degrees.iter().copied(), &path)?;
                written.push(path);
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn reload(path: &Path) -> IORes<Vec<f64>> { read(path)?.collect() }

    #[test]
    fn raw_io_roundtrip() -> IORes<()> {
        // Harmless temporary location for output file
        let dir = tempdir()?;
        let file_path = dir.path().join("test.raw");

        let original_data = vec![1.23, -4.56e-300, f64::MAX];
        write(original_data.iter().copied(), &file_path)?;
        assert_eq!(fs::metadata(&file_path)?.len(), 3 * 8);
        assert_eq!(reload(&file_path)?, original_data);
        Ok(())
    }

    #[test]
    fn iteration_outputs() -> IORes<()> {
        let dir = tempdir()?;
        let out = dir.path().join("data");
        let written = write_iteration(&out, Some(7), &[1.0, 2.0], Some(&[90.0, f64::NAN]))?;
        assert_eq!(written, vec![out.join("model_007.raw"), out.join("rmax_007.raw")]);
        assert_eq!(reload(&written[0])?, vec![1.0, 2.0]);
        let rmax = reload(&written[1])?;
        assert_eq!(rmax[0], 90.0);
        assert!(rmax[1].is_nan());

        let written = write_iteration(&out, None, &[3.0], None)?;
        assert_eq!(written, vec![out.join("model.raw")]);
        Ok(())
    }
}
