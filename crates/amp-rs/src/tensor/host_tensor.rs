//! Host-backed dense tensor used for cast sources, dequantization targets,
//! and tests.

use std::mem::{align_of, size_of, ManuallyDrop};

use half::{bf16, f16};
use rand::Rng;

use super::device::Device;
use super::dtype::DType;
use super::error::TensorError;
use super::shape::{offsets_in_logical_order, Shape};

/// Simple host-backed tensor holding full-precision (or half-precision)
/// values in a contiguous row-major buffer.
#[derive(Debug, Clone)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    device: Device,
    data: Vec<u8>,
    grad: Option<Vec<u8>>,
    requires_grad: bool,
}

impl Tensor {
    /// Constructs an `F32` tensor from raw values, validating the length
    /// against the shape.
    pub fn from_vec(shape: Shape, data: Vec<f32>) -> Result<Self, TensorError> {
        if data.len() != shape.num_elements() {
            return Err(TensorError::ShapeMismatch {
                len: data.len(),
                dims: shape.dims().to_vec(),
            });
        }
        Ok(Tensor {
            shape,
            dtype: DType::F32,
            device: Device::Cpu,
            data: vec_into_bytes(data),
            grad: None,
            requires_grad: false,
        })
    }

    /// Wraps a single value as a one-element `F32` tensor.
    pub fn scalar(value: f32) -> Self {
        Tensor::from_vec(Shape::new([1]), vec![value]).expect("scalar shape is always consistent")
    }

    /// Returns a zero-initialized `F32` tensor of the requested shape.
    pub fn zeros(shape: Shape) -> Self {
        let len = shape.num_elements();
        Tensor {
            shape,
            dtype: DType::F32,
            device: Device::Cpu,
            data: vec_into_bytes(vec![0.0f32; len]),
            grad: None,
            requires_grad: false,
        }
    }

    /// Returns a one-initialized `F32` tensor of the requested shape.
    pub fn ones(shape: Shape) -> Self {
        let len = shape.num_elements();
        Tensor {
            shape,
            dtype: DType::F32,
            device: Device::Cpu,
            data: vec_into_bytes(vec![1.0f32; len]),
            grad: None,
            requires_grad: false,
        }
    }

    /// Samples from a normal distribution (`N(0, std^2)`) using the
    /// Box-Muller transform.
    pub fn randn(shape: Shape, std: f32, rng: &mut impl Rng) -> Self {
        let len = shape.num_elements();
        let mut values = Vec::with_capacity(len);
        while values.len() < len {
            let u1: f32 = rng.gen::<f32>().max(f32::MIN_POSITIVE);
            let u2: f32 = rng.gen::<f32>();
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f32::consts::PI * u2;
            values.push(r * theta.cos() * std);
            if values.len() < len {
                values.push(r * theta.sin() * std);
            }
        }
        Tensor {
            shape,
            dtype: DType::F32,
            device: Device::Cpu,
            data: vec_into_bytes(values),
            grad: None,
            requires_grad: false,
        }
    }

    /// Retags the tensor with a device placement.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Returns the total number of elements stored in the tensor.
    pub fn numel(&self) -> usize {
        self.shape.num_elements()
    }

    /// Reports whether the tensor contains zero elements.
    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    /// Provides access to the tensor shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the scalar dtype of the tensor payload.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the device placement tag.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Borrows the underlying `f32` data slice, panicking if the dtype differs.
    pub fn data(&self) -> &[f32] {
        match self.dtype {
            DType::F32 => bytes_as_slice::<f32>(&self.data),
            _ => panic!("tensor data is not stored as f32"),
        }
    }

    /// Mutably borrows the `f32` data slice, panicking if the dtype differs.
    pub fn data_mut(&mut self) -> &mut [f32] {
        match self.dtype {
            DType::F32 => bytes_as_slice_mut::<f32>(&mut self.data),
            _ => panic!("tensor data is not stored as mutable f32"),
        }
    }

    /// Borrows the underlying `f16` data slice, panicking if the dtype differs.
    pub fn data_f16(&self) -> &[f16] {
        match self.dtype {
            DType::F16 => bytes_as_slice::<f16>(&self.data),
            _ => panic!("tensor data is not stored as f16"),
        }
    }

    /// Borrows the underlying `bf16` data slice, panicking if the dtype differs.
    pub fn data_bf16(&self) -> &[bf16] {
        match self.dtype {
            DType::BF16 => bytes_as_slice::<bf16>(&self.data),
            _ => panic!("tensor data is not stored as bf16"),
        }
    }

    /// Decodes the payload into `f32` values regardless of the float dtype.
    pub fn values(&self) -> Vec<f32> {
        match self.dtype {
            DType::F32 => self.data().to_vec(),
            DType::F16 => self.data_f16().iter().map(|v| v.to_f32()).collect(),
            DType::BF16 => self.data_bf16().iter().map(|v| v.to_f32()).collect(),
            DType::U8 | DType::I32 => {
                panic!("tensor dtype {:?} has no direct value decoding", self.dtype)
            }
        }
    }

    /// Converts the payload into another float storage dtype.
    ///
    /// Integer-backed targets are rejected as a type-mismatch fault.
    pub fn convert(&self, dtype: DType) -> Result<Tensor, TensorError> {
        if !dtype.is_float() {
            return Err(TensorError::UnsupportedDType(dtype));
        }
        let values = self.values();
        let data = match dtype {
            DType::F32 => vec_into_bytes(values),
            DType::F16 => vec_into_bytes(
                values
                    .into_iter()
                    .map(f16::from_f32)
                    .collect::<Vec<f16>>(),
            ),
            DType::BF16 => vec_into_bytes(
                values
                    .into_iter()
                    .map(bf16::from_f32)
                    .collect::<Vec<bf16>>(),
            ),
            DType::U8 | DType::I32 => unreachable!("rejected above"),
        };
        Ok(Tensor {
            shape: self.shape.clone(),
            dtype,
            device: self.device,
            data,
            grad: None,
            requires_grad: false,
        })
    }

    /// Largest absolute magnitude over the payload. Infinities propagate;
    /// NaN entries are skipped.
    pub fn amax(&self) -> f32 {
        self.values().iter().fold(0.0f32, |acc, v| acc.max(v.abs()))
    }

    /// Maximum element value.
    pub fn max(&self) -> f32 {
        self.values()
            .iter()
            .fold(f32::NEG_INFINITY, |acc, v| acc.max(*v))
    }

    /// Minimum element value.
    pub fn min(&self) -> f32 {
        self.values().iter().fold(f32::INFINITY, |acc, v| acc.min(*v))
    }

    /// Returns `true` iff any element is infinite or NaN.
    pub fn has_inf_or_nan(&self) -> bool {
        self.values().iter().any(|v| !v.is_finite())
    }

    /// Returns a materialized tensor with the axis order fully reversed.
    pub fn transpose(&self) -> Result<Tensor, TensorError> {
        if self.shape.rank() < 2 {
            return Err(TensorError::RankTooLow(self.shape.rank()));
        }
        let reversed = self.shape.reversed();
        let mut strides = self.shape.row_major_strides();
        strides.reverse();
        let values = self.values();
        let gathered: Vec<f32> = offsets_in_logical_order(reversed.dims(), &strides)
            .into_iter()
            .map(|offset| values[offset])
            .collect();
        Tensor::from_vec(reversed, gathered).map(|t| t.with_device(self.device))
    }

    /// Toggles gradient tracking and allocates a gradient buffer when
    /// necessary.
    pub fn requires_grad(mut self, flag: bool) -> Self {
        self.requires_grad = flag;
        if flag && self.dtype == DType::F32 {
            if self.grad.is_none() {
                self.grad = Some(vec_into_bytes(vec![0.0f32; self.numel()]));
            }
        } else {
            self.grad = None;
        }
        self
    }

    /// Returns the current gradient tracking flag.
    pub fn requires_grad_flag(&self) -> bool {
        self.requires_grad
    }

    /// Borrows the gradient buffer as `f32` values when gradients are
    /// available.
    pub fn grad(&self) -> Option<&[f32]> {
        match (self.dtype, self.grad.as_ref()) {
            (DType::F32, Some(bytes)) => Some(bytes_as_slice::<f32>(bytes)),
            _ => None,
        }
    }

    /// Fills the tensor with a constant value.
    pub fn fill(&mut self, value: f32) {
        self.data_mut().fill(value);
    }
}

/// Converts an owned vector into a raw byte buffer without copying.
pub(crate) fn vec_into_bytes<T>(data: Vec<T>) -> Vec<u8> {
    let mut data = ManuallyDrop::new(data);
    let ptr = data.as_mut_ptr() as *mut u8;
    let len = data.len() * size_of::<T>();
    let cap = data.capacity() * size_of::<T>();
    unsafe { Vec::from_raw_parts(ptr, len, cap) }
}

/// Views a byte slice as a typed slice, asserting that the layout matches.
///
/// The buffer must come from [`vec_into_bytes`], which preserves the
/// allocation's alignment for the element type.
pub(crate) fn bytes_as_slice<T>(bytes: &[u8]) -> &[T] {
    assert_eq!(
        bytes.len() % size_of::<T>(),
        0,
        "byte length {} is not a multiple of element size {}",
        bytes.len(),
        size_of::<T>()
    );
    debug_assert_eq!(
        bytes.as_ptr() as usize % align_of::<T>(),
        0,
        "byte buffer is not aligned for the element type"
    );
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const T, bytes.len() / size_of::<T>()) }
}

/// Views a mutable byte slice as a typed mutable slice, asserting the layout.
pub(crate) fn bytes_as_slice_mut<T>(bytes: &mut [u8]) -> &mut [T] {
    assert_eq!(
        bytes.len() % size_of::<T>(),
        0,
        "byte length {} is not a multiple of element size {}",
        bytes.len(),
        size_of::<T>()
    );
    debug_assert_eq!(
        bytes.as_mut_ptr() as usize % align_of::<T>(),
        0,
        "byte buffer is not aligned for the element type"
    );
    unsafe {
        std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut T, bytes.len() / size_of::<T>())
    }
}
