//! Scaled low-precision tensor core.
//!
//! The tensor module defines the numeric format registry ([`QType`]), the
//! per-tensor scaling metadata ([`ScalingMeta`]) and the scaled tensor itself
//! ([`ScalingTensor`]), together with the plain host tensor ([`Tensor`]) the
//! engine casts from and dequantizes into. It re-exports [`NumericTensor`] so
//! the capability trait a host runtime holds lives next to the tensor types
//! that implement it.

mod cast;
mod device;
pub mod dtype;
mod error;
mod host_tensor;
mod meta;
mod numeric;
pub mod qtype;
mod scaling_tensor;
pub mod shape;

pub use cast::TypeCast;
pub use device::Device;
pub use dtype::DType;
pub use error::TensorError;
pub use host_tensor::Tensor;
pub use meta::{ScalingMeta, SharedMeta, DEFAULT_AMAX_WINDOW};
pub use numeric::NumericTensor;
pub use qtype::QType;
pub use scaling_tensor::{IntoScalar, ScalingTensor};
pub use shape::Shape;
