//! Capability trait a host tensor runtime holds instead of patching
//! construction and cast calls at dispatch time.

use super::device::Device;
use super::dtype::DType;
use super::error::TensorError;
use super::host_tensor::Tensor;
use super::scaling_tensor::ScalingTensor;
use super::shape::Shape;

/// Minimal drop-in-tensor contract: shape, dtype and device reporting,
/// dequantization, reductions, and generic constant construction.
///
/// Both the plain host [`Tensor`] and [`ScalingTensor`] implement it, so the
/// runtime can treat either uniformly through a trait object.
pub trait NumericTensor {
    fn shape(&self) -> &Shape;

    fn device(&self) -> Device;

    /// Storage dtype of the underlying buffer.
    fn dtype(&self) -> DType;

    /// Produces a full-precision-equivalent host tensor in exactly one
    /// supported float dtype.
    fn to(&self, dtypes: &[DType]) -> Result<Tensor, TensorError>;

    fn max(&self) -> f32;

    fn min(&self) -> f32;

    fn has_inf_or_nan(&self) -> bool;

    /// Freshly synthesized constants are plain full-precision tensors of the
    /// same shape and device; the scaled representation is never the default
    /// for them.
    fn zeros_like(&self) -> Tensor {
        Tensor::zeros(self.shape().clone()).with_device(self.device())
    }

    fn ones_like(&self) -> Tensor {
        Tensor::ones(self.shape().clone()).with_device(self.device())
    }
}

impl NumericTensor for Tensor {
    fn shape(&self) -> &Shape {
        Tensor::shape(self)
    }

    fn device(&self) -> Device {
        Tensor::device(self)
    }

    fn dtype(&self) -> DType {
        Tensor::dtype(self)
    }

    fn to(&self, dtypes: &[DType]) -> Result<Tensor, TensorError> {
        if dtypes.len() != 1 {
            return Err(TensorError::DTypeArity(dtypes.len()));
        }
        self.convert(dtypes[0])
    }

    fn max(&self) -> f32 {
        Tensor::max(self)
    }

    fn min(&self) -> f32 {
        Tensor::min(self)
    }

    fn has_inf_or_nan(&self) -> bool {
        Tensor::has_inf_or_nan(self)
    }
}

impl NumericTensor for ScalingTensor {
    fn shape(&self) -> &Shape {
        ScalingTensor::shape(self)
    }

    fn device(&self) -> Device {
        ScalingTensor::device(self)
    }

    fn dtype(&self) -> DType {
        ScalingTensor::dtype(self)
    }

    fn to(&self, dtypes: &[DType]) -> Result<Tensor, TensorError> {
        ScalingTensor::to(self, dtypes)
    }

    fn max(&self) -> f32 {
        ScalingTensor::max(self)
    }

    fn min(&self) -> f32 {
        ScalingTensor::min(self)
    }

    fn has_inf_or_nan(&self) -> bool {
        ScalingTensor::has_inf_or_nan(self)
    }
}
