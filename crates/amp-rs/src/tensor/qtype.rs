//! Numeric format registry for scaled tensors.
//!
//! `QType` names the quantized target formats a [`ScalingTensor`] can store
//! and fixes the directed cast lattice between them. The lattice is baked
//! into [`QType::can_cast`] and never mutated at runtime.
//!
//! [`ScalingTensor`]: super::ScalingTensor

use std::fmt;

use serde::{Deserialize, Serialize};

use super::dtype::DType;

/// Quantized numeric format of a scaled tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QType {
    /// Float8 with 4 exponent and 3 mantissa bits (bias 7, max 448, no inf).
    Fp8E4M3,
    /// Float8 with 5 exponent and 2 mantissa bits (bias 15, max 57344).
    Fp8E5M2,
    /// IEEE fp16.
    F16,
    /// bfloat16. Legal only as a dequantization target, never as storage.
    Bf16,
    /// IEEE fp32.
    F32,
}

impl QType {
    /// Total bit width of the format.
    pub const fn bits(self) -> u32 {
        match self {
            QType::Fp8E4M3 | QType::Fp8E5M2 => 8,
            QType::F16 | QType::Bf16 => 16,
            QType::F32 => 32,
        }
    }

    /// Exponent field width in bits.
    pub const fn exponent_bits(self) -> u32 {
        match self {
            QType::Fp8E4M3 => 4,
            QType::Fp8E5M2 => 5,
            QType::F16 => 5,
            QType::Bf16 => 8,
            QType::F32 => 8,
        }
    }

    /// Mantissa field width in bits.
    pub const fn mantissa_bits(self) -> u32 {
        match self {
            QType::Fp8E4M3 => 3,
            QType::Fp8E5M2 => 2,
            QType::F16 => 10,
            QType::Bf16 => 7,
            QType::F32 => 23,
        }
    }

    /// Exponent bias of the format.
    pub const fn exponent_bias(self) -> i32 {
        (1 << (self.exponent_bits() - 1)) - 1
    }

    /// Maximum finite magnitude representable in the format.
    pub fn max_value(self) -> f32 {
        match self {
            QType::Fp8E4M3 => 448.0,
            QType::Fp8E5M2 => 57344.0,
            QType::F16 => 65504.0,
            QType::Bf16 => 3.389_531_4e38,
            QType::F32 => f32::MAX,
        }
    }

    /// Returns `true` for the two float8 variants.
    pub const fn is_fp8(self) -> bool {
        matches!(self, QType::Fp8E4M3 | QType::Fp8E5M2)
    }

    /// Returns `true` when the format may back a scaled tensor's buffer.
    ///
    /// bfloat16 is reachable in the lattice but has no storage kernel; it is
    /// only an output dtype of dequantization.
    pub const fn is_storage(self) -> bool {
        !matches!(self, QType::Bf16)
    }

    /// Storage element kind holding one value of this format.
    pub const fn storage_dtype(self) -> DType {
        match self {
            QType::Fp8E4M3 | QType::Fp8E5M2 => DType::U8,
            QType::F16 => DType::F16,
            QType::Bf16 => DType::BF16,
            QType::F32 => DType::F32,
        }
    }

    /// Reports whether a cast from `self` to `to` crosses a legal lattice
    /// edge. Total over the format set; the reflexive case is always legal.
    pub fn can_cast(self, to: QType) -> bool {
        if self == to {
            return true;
        }
        match self {
            // The widest format reaches everything.
            QType::F32 => true,
            QType::F16 => matches!(to, QType::Fp8E4M3 | QType::F32),
            QType::Bf16 => matches!(to, QType::F32),
            // Each float8 variant only widens back to fp32.
            QType::Fp8E4M3 | QType::Fp8E5M2 => matches!(to, QType::F32),
        }
    }
}

impl fmt::Display for QType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QType::Fp8E4M3 => "fp8-e4m3",
            QType::Fp8E5M2 => "fp8-e5m2",
            QType::F16 => "fp16",
            QType::Bf16 => "bf16",
            QType::F32 => "fp32",
        };
        f.write_str(name)
    }
}
