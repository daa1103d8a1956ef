use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

use amp_rs::tensor::{DType, QType, ScalingTensor, Shape, Tensor, TensorError};

const ALL_QTYPES: [QType; 5] = [
    QType::Fp8E4M3,
    QType::Fp8E5M2,
    QType::F16,
    QType::Bf16,
    QType::F32,
];

fn randn_4x4() -> Tensor {
    let mut rng = StdRng::seed_from_u64(100);
    Tensor::randn(Shape::new([4, 4]), 1.0, &mut rng)
}

#[test]
fn fp32_cast_reaches_every_storage_format() -> Result<()> {
    let tensor = randn_4x4();
    let expected = [
        (QType::Fp8E4M3, DType::U8),
        (QType::Fp8E5M2, DType::U8),
        (QType::F16, DType::F16),
        (QType::F32, DType::F32),
    ];
    for (qtype, dtype) in expected {
        let scaled = ScalingTensor::cast_from(&tensor, qtype)?;
        assert_eq!(scaled.qtype(), qtype);
        assert_eq!(scaled.dtype(), dtype);
    }
    Ok(())
}

#[test]
fn bf16_storage_qtype_rejected() {
    let tensor = randn_4x4();
    let err = ScalingTensor::cast_from(&tensor, QType::Bf16).unwrap_err();
    assert!(matches!(err, TensorError::UnsupportedQType(QType::Bf16)));
}

#[test]
fn fp32_scaled_tensor_casts_to_any_storage_qtype() -> Result<()> {
    let scaled = ScalingTensor::cast_from(&randn_4x4(), QType::F32)?;
    assert_eq!(scaled.cast(QType::Fp8E4M3)?.qtype(), QType::Fp8E4M3);
    assert_eq!(scaled.cast(QType::Fp8E5M2)?.qtype(), QType::Fp8E5M2);
    assert_eq!(scaled.cast(QType::F16)?.qtype(), QType::F16);
    assert_eq!(scaled.cast(QType::F32)?.qtype(), QType::F32);
    Ok(())
}

#[test]
fn fp16_scaled_tensor_cannot_reach_e5m2() -> Result<()> {
    let scaled = ScalingTensor::cast_from(&randn_4x4(), QType::F16)?;
    assert_eq!(scaled.cast(QType::Fp8E4M3)?.qtype(), QType::Fp8E4M3);
    assert_eq!(scaled.cast(QType::F16)?.qtype(), QType::F16);
    assert_eq!(scaled.cast(QType::F32)?.qtype(), QType::F32);
    let err = scaled.cast(QType::Fp8E5M2).unwrap_err();
    assert!(matches!(
        err,
        TensorError::CastNotAllowed {
            from: QType::F16,
            to: QType::Fp8E5M2
        }
    ));
    Ok(())
}

#[test]
fn e4m3_scaled_tensor_only_widens_to_fp32() -> Result<()> {
    let scaled = ScalingTensor::cast_from(&randn_4x4(), QType::Fp8E4M3)?;
    assert_eq!(scaled.cast(QType::Fp8E4M3)?.qtype(), QType::Fp8E4M3);
    assert_eq!(scaled.cast(QType::F32)?.qtype(), QType::F32);
    assert!(matches!(
        scaled.cast(QType::F16).unwrap_err(),
        TensorError::CastNotAllowed { .. }
    ));
    assert!(matches!(
        scaled.cast(QType::Fp8E5M2).unwrap_err(),
        TensorError::CastNotAllowed { .. }
    ));
    Ok(())
}

#[test]
fn lattice_is_reflexive() {
    for qtype in ALL_QTYPES {
        assert!(qtype.can_cast(qtype), "{qtype} cannot cast to itself");
    }
}

#[test]
fn lattice_edges_match_registry() {
    assert!(QType::F32.can_cast(QType::Fp8E4M3));
    assert!(QType::F32.can_cast(QType::Fp8E5M2));
    assert!(QType::F32.can_cast(QType::F16));
    assert!(QType::F32.can_cast(QType::Bf16));

    assert!(QType::F16.can_cast(QType::Fp8E4M3));
    assert!(!QType::F16.can_cast(QType::Fp8E5M2));
    assert!(!QType::F16.can_cast(QType::Bf16));

    assert!(!QType::Fp8E4M3.can_cast(QType::Fp8E5M2));
    assert!(!QType::Fp8E4M3.can_cast(QType::F16));
    assert!(!QType::Fp8E5M2.can_cast(QType::Fp8E4M3));
    assert!(QType::Fp8E4M3.can_cast(QType::F32));
    assert!(QType::Fp8E5M2.can_cast(QType::F32));

    assert!(QType::Bf16.can_cast(QType::F32));
    assert!(!QType::Bf16.can_cast(QType::F16));
}

#[test]
fn registry_format_parameters() {
    assert_eq!(QType::Fp8E4M3.bits(), 8);
    assert_eq!(QType::Fp8E4M3.exponent_bits(), 4);
    assert_eq!(QType::Fp8E4M3.mantissa_bits(), 3);
    assert_eq!(QType::Fp8E4M3.exponent_bias(), 7);
    assert_eq!(QType::Fp8E4M3.max_value(), 448.0);

    assert_eq!(QType::Fp8E5M2.exponent_bits(), 5);
    assert_eq!(QType::Fp8E5M2.mantissa_bits(), 2);
    assert_eq!(QType::Fp8E5M2.exponent_bias(), 15);
    assert_eq!(QType::Fp8E5M2.max_value(), 57344.0);

    assert_eq!(QType::F16.max_value(), 65504.0);
    assert_eq!(QType::F32.max_value(), f32::MAX);

    assert_eq!(QType::Fp8E4M3.storage_dtype(), DType::U8);
    assert_eq!(QType::Fp8E5M2.storage_dtype(), DType::U8);
    assert_eq!(QType::F16.storage_dtype(), DType::F16);
    assert_eq!(QType::Bf16.storage_dtype(), DType::BF16);
    assert_eq!(QType::F32.storage_dtype(), DType::F32);

    assert!(QType::Fp8E4M3.is_fp8() && QType::Fp8E5M2.is_fp8());
    assert!(!QType::Bf16.is_storage());
}

#[test]
fn dtype_tags_round_trip() {
    for dtype in [DType::F32, DType::F16, DType::BF16, DType::U8, DType::I32] {
        assert_eq!(DType::from_tag(dtype.tag()), Some(dtype));
    }
    assert_eq!(DType::from_tag(99), None);
    assert_eq!(DType::U8.size_in_bytes(), 1);
    assert_eq!(DType::F16.size_in_bytes(), 2);
    assert!(DType::BF16.is_float());
    assert!(DType::U8.is_integer() && DType::I32.is_integer());
}
