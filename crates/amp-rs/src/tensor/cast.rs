//! Quantization kernels: float8 bit codecs and the scale-aware casts that
//! move values between host precision and scaled storage.

use half::f16;

use super::error::TensorError;
use super::host_tensor::{bytes_as_slice, vec_into_bytes, Tensor};
use super::meta::ScalingMeta;
use super::qtype::QType;

/// Stateless cast entry points.
///
/// Quantization rounds to nearest-even, saturates finite overflow to the
/// format's largest magnitude, and preserves NaN. e4m3 has no infinity
/// encoding, so an infinite input lands on its NaN code; e5m2 keeps the
/// signed infinity.
pub struct TypeCast;

impl TypeCast {
    /// Quantizes a host tensor into the storage format of `meta`, recording
    /// the observed amax and refreshing the scale.
    pub fn cast(src: &Tensor, meta: &mut ScalingMeta) -> Result<Vec<u8>, TensorError> {
        Self::quantize(&src.values(), meta)
    }

    /// [`cast`](TypeCast::cast) restricted to float8 targets.
    pub fn cast_to_fp8(src: &Tensor, meta: &mut ScalingMeta) -> Result<Vec<u8>, TensorError> {
        if !meta.qtype().is_fp8() {
            return Err(TensorError::UnsupportedQType(meta.qtype()));
        }
        Self::cast(src, meta)
    }

    /// [`cast`](TypeCast::cast) restricted to the fp16 target.
    pub fn cast_to_fp16(src: &Tensor, meta: &mut ScalingMeta) -> Result<Vec<u8>, TensorError> {
        if meta.qtype() != QType::F16 {
            return Err(TensorError::UnsupportedQType(meta.qtype()));
        }
        Self::cast(src, meta)
    }

    /// Quantizes raw `f32` values against `meta`, returning the packed
    /// storage buffer.
    pub fn quantize(values: &[f32], meta: &mut ScalingMeta) -> Result<Vec<u8>, TensorError> {
        let qtype = meta.qtype();
        if !qtype.is_storage() {
            return Err(TensorError::UnsupportedQType(qtype));
        }
        let amax = values.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
        meta.record_amax(amax);
        let scale = meta.recompute_scale();
        let raw = match qtype {
            QType::Fp8E4M3 | QType::Fp8E5M2 => values
                .iter()
                .map(|v| Self::encode_fp8(v / scale, qtype))
                .collect(),
            QType::F16 => vec_into_bytes(
                values
                    .iter()
                    .map(|v| f16::from_f32(v / scale))
                    .collect::<Vec<f16>>(),
            ),
            QType::F32 => vec_into_bytes(values.iter().map(|v| v / scale).collect::<Vec<f32>>()),
            QType::Bf16 => unreachable!("rejected by the storage check above"),
        };
        Ok(raw)
    }

    /// Decodes a storage buffer back into logical `f32` values,
    /// multiplying by `scale`.
    pub fn dequantize(raw: &[u8], qtype: QType, scale: f32) -> Vec<f32> {
        match qtype {
            QType::Fp8E4M3 | QType::Fp8E5M2 => raw
                .iter()
                .map(|code| Self::decode_fp8(*code, qtype) * scale)
                .collect(),
            QType::F16 => bytes_as_slice::<f16>(raw)
                .iter()
                .map(|v| v.to_f32() * scale)
                .collect(),
            QType::F32 => bytes_as_slice::<f32>(raw).iter().map(|v| v * scale).collect(),
            QType::Bf16 => panic!("bf16 is not a storage format"),
        }
    }

    /// Encodes one value into a float8 bit pattern.
    pub fn encode_fp8(value: f32, qtype: QType) -> u8 {
        debug_assert!(qtype.is_fp8(), "{qtype} is not a float8 format");
        let mbits = qtype.mantissa_bits() as i32;
        let bias = qtype.exponent_bias();
        let sign = if value.is_sign_negative() { 0x80u8 } else { 0x00 };
        if value.is_nan() {
            return sign | fp8_nan_code(qtype);
        }
        if value.is_infinite() {
            return match qtype {
                QType::Fp8E5M2 => sign | FP8_E5M2_INF,
                _ => sign | fp8_nan_code(qtype),
            };
        }
        let a = value.abs();
        if a >= qtype.max_value() {
            return sign | fp8_max_code(qtype);
        }
        if a == 0.0 {
            return sign;
        }
        let min_norm_exp = 1 - bias;
        // f32 subnormals report a raw exponent of 0 and fall far below the
        // float8 subnormal range, so treating them as exponent -127 lets the
        // subnormal branch round them to zero.
        let e = ((a.to_bits() >> 23) & 0xff) as i32 - 127;
        if e < min_norm_exp {
            let quantum = (a * 2.0f32.powi(mbits - min_norm_exp)).round_ties_even() as u32;
            // quantum == 2^mbits lands exactly on the smallest normal code.
            return sign | quantum as u8;
        }
        let mut mantissa = (a * 2.0f32.powi(mbits - e)).round_ties_even() as u32;
        let mut exp = e;
        if mantissa == 1u32 << (mbits + 1) {
            mantissa >>= 1;
            exp += 1;
        }
        let code = (((exp + bias) as u32) << mbits) | (mantissa - (1u32 << mbits));
        sign | code as u8
    }

    /// Decodes one float8 bit pattern into `f32`.
    pub fn decode_fp8(code: u8, qtype: QType) -> f32 {
        debug_assert!(qtype.is_fp8(), "{qtype} is not a float8 format");
        let mbits = qtype.mantissa_bits();
        let bias = qtype.exponent_bias();
        let sign = if code & 0x80 != 0 { -1.0f32 } else { 1.0 };
        let exp_field = ((code as u32 >> mbits) & ((1u32 << qtype.exponent_bits()) - 1)) as i32;
        let mantissa = code as u32 & ((1u32 << mbits) - 1);
        match qtype {
            QType::Fp8E4M3 => {
                if exp_field == 0xf && mantissa == 0x7 {
                    return f32::NAN;
                }
            }
            QType::Fp8E5M2 => {
                if exp_field == 0x1f {
                    return if mantissa == 0 {
                        sign * f32::INFINITY
                    } else {
                        f32::NAN
                    };
                }
            }
            _ => {}
        }
        let frac = mantissa as f32 / (1u32 << mbits) as f32;
        if exp_field == 0 {
            sign * frac * 2.0f32.powi(1 - bias)
        } else {
            sign * (1.0 + frac) * 2.0f32.powi(exp_field - bias)
        }
    }
}

const FP8_E5M2_INF: u8 = 0x7c;

fn fp8_nan_code(_qtype: QType) -> u8 {
    // All-ones payload in both layouts: S.1111.111 and S.11111.11.
    0x7f
}

fn fp8_max_code(qtype: QType) -> u8 {
    match qtype {
        // S.1111.110 = 448
        QType::Fp8E4M3 => 0x7e,
        // S.11110.11 = 57344
        _ => 0x7b,
    }
}
