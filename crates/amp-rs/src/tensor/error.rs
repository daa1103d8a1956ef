//! Fault types raised by cast and in-place arithmetic operations.

use thiserror::Error;

use super::dtype::DType;
use super::qtype::QType;

/// Errors surfaced by the scaled tensor core.
///
/// Every fault is synchronous and rejects the whole operation: a failed cast
/// or mutator leaves buffer and scale in their prior consistent state.
#[derive(Debug, Error)]
pub enum TensorError {
    #[error("cast from {from} to {to} crosses an illegal lattice edge")]
    CastNotAllowed { from: QType, to: QType },
    #[error("{0} is not a storage format for scaled tensors")]
    UnsupportedQType(QType),
    #[error("dtype {0:?} is not a supported dequantization target")]
    UnsupportedDType(DType),
    #[error("expected exactly one target dtype, got {0}")]
    DTypeArity(usize),
    #[error("in-place division by zero")]
    ZeroDivisor,
    #[error("scalar operand must be finite")]
    NonFiniteScalar,
    #[error("expected a scalar or single-element tensor, got {0} elements")]
    ScalarExpected(usize),
    #[error("tensor data length ({len}) does not match shape {dims:?}")]
    ShapeMismatch { len: usize, dims: Vec<usize> },
    #[error("transpose requires rank >= 2, got rank {0}")]
    RankTooLow(usize),
}
