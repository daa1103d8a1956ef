//! Enumerates the storage element types backing host and scaled tensors.

use serde::{Deserialize, Serialize};

/// Storage dtype identifier shared between host tensors and scaled buffers.
///
/// `U8` is the byte-sized cell holding a float8 bit pattern; it is never a
/// logical value type on its own. `I32` exists so integer conversion targets
/// can be recognised and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 16-bit floating point with full mantissa (fp16).
    F16,
    /// 16-bit bfloat16 precision as used by many accelerators.
    BF16,
    /// 8-bit unsigned cell interpreted bitwise as a float8 layout.
    U8,
    /// 32-bit signed integer, primarily for index buffers and token ids.
    I32,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 | DType::BF16 => 2,
            DType::U8 => 1,
            DType::I32 => 4,
        }
    }

    /// Returns `true` when the dtype carries floating-point values directly.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F16 | DType::BF16)
    }

    /// Returns `true` for integer-kind dtypes (including the float8 cell).
    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// Produces a stable tag used when serializing or crossing FFI boundaries.
    pub fn tag(self) -> u32 {
        match self {
            DType::F32 => 0,
            DType::F16 => 1,
            DType::BF16 => 2,
            DType::U8 => 3,
            DType::I32 => 4,
        }
    }

    /// Reconstructs a `DType` from its serialized tag representation.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(DType::F32),
            1 => Some(DType::F16),
            2 => Some(DType::BF16),
            3 => Some(DType::U8),
            4 => Some(DType::I32),
            _ => None,
        }
    }
}
