//! Time series tensor types and ndarray bridges.

use burn::prelude::*;
use burn::tensor::TensorData;
use ndarray::{Array2, Array3};

use crate::error::{CoreError, Result};
use crate::shape::TSShape;

/// A `(B, V, L)` Burn tensor carrying its shape metadata.
#[derive(Debug, Clone)]
pub struct TSTensor<B: Backend> {
    inner: Tensor<B, 3>,
    shape: TSShape,
}

impl<B: Backend> TSTensor<B> {
    /// Wrap a 3D Burn tensor laid out as `(batch, vars, len)`.
    pub fn new(tensor: Tensor<B, 3>) -> Self {
        let shape = TSShape::from(tensor.dims());
        Self {
            inner: tensor,
            shape,
        }
    }

    /// Copy an ndarray batch onto `device`.
    pub fn from_array(x: &Array3<f32>, device: &B::Device) -> Self {
        Self::new(array3_to_tensor(x, device))
    }

    /// Shape metadata.
    #[must_use]
    pub const fn shape(&self) -> TSShape {
        self.shape
    }

    /// Batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.shape.batch()
    }

    /// Underlying tensor.
    #[must_use]
    pub const fn inner(&self) -> &Tensor<B, 3> {
        &self.inner
    }

    /// Consume and return the underlying tensor.
    #[must_use]
    pub fn into_inner(self) -> Tensor<B, 3> {
        self.inner
    }

    /// Device the tensor lives on.
    pub fn device(&self) -> B::Device {
        self.inner.device()
    }
}

/// A batch of series with optional labels.
///
/// Labels are `(B, W)` class indices stored as floats, where `W` is 1 for
/// one label per series or `L` for one label per timestep.
#[derive(Debug, Clone)]
pub struct TSBatch<B: Backend> {
    /// Input series `(B, V, L)`.
    pub x: TSTensor<B>,
    /// Optional labels `(B, W)`.
    pub y: Option<Tensor<B, 2>>,
}

impl<B: Backend> TSBatch<B> {
    /// Batch without labels.
    pub fn new(x: TSTensor<B>) -> Self {
        Self { x, y: None }
    }

    /// Batch with labels.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShapeMismatch`] when batch sizes differ or when
    /// the label width is neither 1 nor the sequence length.
    pub fn with_target(x: TSTensor<B>, y: Tensor<B, 2>) -> Result<Self> {
        let [y_batch, y_width] = y.dims();
        if x.batch() != y_batch {
            return Err(CoreError::ShapeMismatch(format!(
                "x batch size {} != y batch size {}",
                x.batch(),
                y_batch
            )));
        }
        if y_width != 1 && y_width != x.shape().len() {
            return Err(CoreError::ShapeMismatch(format!(
                "label width {} must be 1 or the sequence length {}",
                y_width,
                x.shape().len()
            )));
        }
        Ok(Self { x, y: Some(y) })
    }

    /// Batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.x.batch()
    }
}

/// Copy a host array onto a device as a rank-3 tensor.
pub fn array3_to_tensor<B: Backend>(x: &Array3<f32>, device: &B::Device) -> Tensor<B, 3> {
    let (b, v, l) = x.dim();
    let data = TensorData::new(x.iter().copied().collect::<Vec<f32>>(), [b, v, l]);
    Tensor::from_data(data, device)
}

/// Copy a host matrix onto a device as a rank-2 tensor.
pub fn array2_to_tensor<B: Backend>(x: &Array2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let (r, c) = x.dim();
    let data = TensorData::new(x.iter().copied().collect::<Vec<f32>>(), [r, c]);
    Tensor::from_data(data, device)
}

/// Read a rank-3 tensor back into host memory.
///
/// # Errors
///
/// Returns [`CoreError::TensorData`] if the element type cannot be read as `f32`.
pub fn tensor_to_array3<B: Backend>(t: Tensor<B, 3>) -> Result<Array3<f32>> {
    let [b, v, l] = t.dims();
    let values = t
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::TensorData(format!("{e:?}")))?;
    Array3::from_shape_vec((b, v, l), values).map_err(|e| CoreError::TensorData(e.to_string()))
}

/// Read a rank-2 tensor back into host memory.
///
/// # Errors
///
/// Returns [`CoreError::TensorData`] if the element type cannot be read as `f32`.
pub fn tensor_to_array2<B: Backend>(t: Tensor<B, 2>) -> Result<Array2<f32>> {
    let [r, c] = t.dims();
    let values = t
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::TensorData(format!("{e:?}")))?;
    Array2::from_shape_vec((r, c), values).map_err(|e| CoreError::TensorData(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_array_round_trip_keeps_layout() {
        let device = Default::default();
        let x = Array3::from_shape_fn((2, 3, 4), |(b, v, l)| (b * 100 + v * 10 + l) as f32);
        let t = array3_to_tensor::<TestBackend>(&x, &device);
        assert_eq!(t.dims(), [2, 3, 4]);
        let back = tensor_to_array3(t).unwrap();
        assert_eq!(back, x);
    }

    #[test]
    fn test_batch_rejects_bad_label_width() {
        let device = Default::default();
        let x = TSTensor::<TestBackend>::from_array(&Array3::zeros((2, 1, 5)), &device);

        let per_series = array2_to_tensor::<TestBackend>(&Array2::zeros((2, 1)), &device);
        assert!(TSBatch::with_target(x.clone(), per_series).is_ok());

        let per_step = array2_to_tensor::<TestBackend>(&Array2::zeros((2, 5)), &device);
        assert!(TSBatch::with_target(x.clone(), per_step).is_ok());

        let bad = array2_to_tensor::<TestBackend>(&Array2::zeros((2, 3)), &device);
        assert!(TSBatch::with_target(x, bad).is_err());
    }
}
