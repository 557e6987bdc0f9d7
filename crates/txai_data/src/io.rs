//! NumPy `.npy` / `.npz` readers and writers.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::{Array, Array2, Array3, Dimension};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpyExt, WriteNpyExt};

use crate::error::{DataError, Result};

fn open(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(DataError::MissingFile(path.to_path_buf()));
    }
    Ok(File::open(path)?)
}

/// Read an `f32` array of any rank from a `.npy` file.
///
/// `f64` files are accepted and narrowed to `f32`.
pub fn read_npy<D, P>(path: P) -> Result<Array<f32, D>>
where
    D: Dimension,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    match Array::<f32, D>::read_npy(BufReader::new(open(path)?)) {
        Ok(arr) => Ok(arr),
        Err(first) => {
            let wide = Array::<f64, D>::read_npy(BufReader::new(open(path)?))
                .map_err(|_| DataError::format(path, first))?;
            Ok(wide.mapv(|v| v as f32))
        }
    }
}

/// Write an `f32` array of any rank to a `.npy` file, creating parent directories.
pub fn write_npy<D, P>(path: P, array: &Array<f32, D>) -> Result<()>
where
    D: Dimension,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    array
        .write_npy(std::io::BufWriter::new(file))
        .map_err(|e| DataError::format(path, e))
}

/// Read series and labels from an `.npz` archive with keys `x` and `y`.
///
/// `x` must be `(N, V, L)`. `y` is optional and may be `(N,)` or `(N, W)`;
/// a 1D label vector becomes a single column.
pub fn read_npz<P: AsRef<Path>>(path: P) -> Result<(Array3<f32>, Option<Array2<f32>>)> {
    let path = path.as_ref();
    let mut npz = NpzReader::new(open(path)?).map_err(|e| DataError::format(path, e))?;

    let x: Array3<f32> = match npz.by_name::<_, ndarray::Ix3>("x") {
        Ok(x) => x,
        Err(_) => npz
            .by_name::<ndarray::OwnedRepr<f64>, ndarray::Ix3>("x")
            .map_err(|e| DataError::format(path, format!("reading 'x': {e}")))?
            .mapv(|v| v as f32),
    };

    let y = if let Ok(y) = npz.by_name::<ndarray::OwnedRepr<f32>, ndarray::Ix2>("y") {
        Some(y)
    } else if let Ok(y) = npz.by_name::<ndarray::OwnedRepr<f32>, ndarray::Ix1>("y") {
        let n = y.len();
        Some(
            y.into_shape_with_order((n, 1))
                .map_err(|e| DataError::format(path, e))?,
        )
    } else if let Ok(y) = npz.by_name::<ndarray::OwnedRepr<f64>, ndarray::Ix2>("y") {
        Some(y.mapv(|v| v as f32))
    } else {
        None
    };

    Ok((x, y))
}

/// Write series and optional labels to an `.npz` archive.
pub fn write_npz<P: AsRef<Path>>(path: P, x: &Array3<f32>, y: Option<&Array2<f32>>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut npz = NpzWriter::new(File::create(path)?);
    npz.add_array("x", x).map_err(|e| DataError::format(path, e))?;
    if let Some(y) = y {
        npz.add_array("y", y).map_err(|e| DataError::format(path, e))?;
    }
    npz.finish().map_err(|e| DataError::format(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Ix3, Ix4};

    #[test]
    fn test_npz_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("train.npz");
        let x = Array3::from_shape_fn((4, 2, 6), |(n, v, l)| (n + v + l) as f32);
        let y = Array2::from_shape_fn((4, 1), |(n, _)| (n % 2) as f32);

        write_npz(&path, &x, Some(&y)).unwrap();
        let (x2, y2) = read_npz(&path).unwrap();
        assert_eq!(x2, x);
        assert_eq!(y2.unwrap(), y);
    }

    #[test]
    fn test_npz_without_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.npz");
        write_npz(&path, &Array3::zeros((1, 1, 2)), None).unwrap();
        let (_, y) = read_npz(&path).unwrap();
        assert!(y.is_none());
    }

    #[test]
    fn test_npy_any_rank() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.npy");
        let scores = ndarray::Array4::<f32>::from_elem((2, 3, 4, 5), 0.5);
        write_npy(&path, &scores).unwrap();
        let back: ndarray::Array4<f32> = read_npy::<Ix4, _>(&path).unwrap();
        assert_eq!(back, scores);
    }

    #[test]
    fn test_missing_file() {
        let err = read_npy::<Ix3, _>("/definitely/not/here.npy").unwrap_err();
        assert!(matches!(err, DataError::MissingFile(_)));
    }
}
