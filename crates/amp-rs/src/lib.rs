pub mod tensor;

pub use tensor::{
    Device, DType, NumericTensor, QType, ScalingMeta, ScalingTensor, Shape, Tensor, TensorError,
    TypeCast,
};
