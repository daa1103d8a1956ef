//! Scaled tensor wrapper holding shared handles to a narrow-format buffer
//! and its scaling metadata.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::cast::TypeCast;
use super::device::Device;
use super::dtype::DType;
use super::error::TensorError;
use super::host_tensor::{bytes_as_slice, bytes_as_slice_mut, vec_into_bytes, Tensor};
use super::meta::{ScalingMeta, SharedMeta};
use super::qtype::QType;
use super::shape::{offsets_in_logical_order, Shape};

/// Shared handle to the raw storage buffer.
///
/// Views produced by transpose hold the same allocation as their source, so
/// in-place mutation of the stored codes is visible through every alias,
/// mirroring how the scaling metadata is shared.
type SharedBuffer = Arc<RwLock<Vec<u8>>>;

/// Low-precision tensor: a raw buffer physically stored in the format of its
/// metadata's qtype, addressed through row-major strides.
///
/// Invariant: the buffer decoded as the storage dtype, multiplied elementwise
/// by the metadata's scale, equals the logical tensor within the format's
/// rounding error. Buffer and metadata are mutated together, never one
/// without the other, so the invariant holds through every alias.
///
/// Cloning produces another handle over the same storage and scaling state,
/// not an independent copy; use [`contiguous`](ScalingTensor::contiguous) to
/// materialize one.
#[derive(Clone)]
pub struct ScalingTensor {
    raw: SharedBuffer,
    shape: Shape,
    strides: Vec<usize>,
    device: Device,
    meta: SharedMeta,
    grad: Option<Tensor>,
    requires_grad: bool,
}

impl ScalingTensor {
    /// Quantizes a host tensor into `qtype` with freshly constructed
    /// metadata. The result shares no mutable state with the source.
    pub fn cast_from(src: &Tensor, qtype: QType) -> Result<Self, TensorError> {
        if !qtype.is_storage() {
            return Err(TensorError::UnsupportedQType(qtype));
        }
        let mut meta = ScalingMeta::new(qtype);
        let raw = TypeCast::cast(src, &mut meta)?;
        Ok(ScalingTensor::from_parts(
            raw,
            src.shape().clone(),
            src.device(),
            Arc::new(RwLock::new(meta)),
        ))
    }

    /// Wraps an already-quantized buffer with an explicitly shared metadata
    /// handle. This is the aliasing entry point: every view constructed over
    /// the same handle observes scale mutation immediately.
    pub fn from_parts(raw: Vec<u8>, shape: Shape, device: Device, meta: SharedMeta) -> Self {
        let strides = shape.row_major_strides();
        ScalingTensor {
            raw: Arc::new(RwLock::new(raw)),
            shape,
            strides,
            device,
            meta,
            grad: None,
            requires_grad: false,
        }
    }

    /// Re-casts into another format.
    ///
    /// The cast is validated against the format lattice first and rejected
    /// on an illegal edge; formats with no storage kernel are rejected even
    /// when reachable.
    pub fn cast(&self, qtype: QType) -> Result<ScalingTensor, TensorError> {
        let from = self.qtype();
        if !from.can_cast(qtype) {
            return Err(TensorError::CastNotAllowed { from, to: qtype });
        }
        let host = self.float()?;
        ScalingTensor::cast_from(&host, qtype)
    }

    /// Provides access to the tensor shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.num_elements()
    }

    /// Returns the rank (number of axes).
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Size of the leading dimension.
    pub fn len(&self) -> usize {
        self.shape.dims()[0]
    }

    /// Reports whether the tensor contains zero elements.
    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    /// Returns the device placement tag.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Storage dtype of the raw buffer. Always the narrow cell type, never
    /// the logical format.
    pub fn dtype(&self) -> DType {
        self.qtype().storage_dtype()
    }

    /// Quantized format bound through the metadata.
    pub fn qtype(&self) -> QType {
        self.meta_read().qtype()
    }

    /// Current raw-to-real scale factor.
    pub fn scale(&self) -> f32 {
        self.meta_read().scale()
    }

    /// Clones the shared metadata handle, e.g. to build another view over
    /// the same scaling state.
    pub fn meta(&self) -> SharedMeta {
        Arc::clone(&self.meta)
    }

    /// A scaling tensor is always a storage leaf, never a derived
    /// expression node.
    pub fn is_leaf(&self) -> bool {
        true
    }

    pub fn is_sparse(&self) -> bool {
        false
    }

    pub fn is_complex(&self) -> bool {
        false
    }

    /// The logical value is floating point regardless of the storage cell.
    pub fn is_floating_point(&self) -> bool {
        true
    }

    /// Reports whether the strides describe a densely packed row-major
    /// layout.
    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.row_major_strides()
    }

    /// Dequantizes into a host tensor of exactly one supported float dtype.
    ///
    /// Zero targets, multiple targets, and integer-backed targets are all
    /// type-mismatch faults.
    pub fn to(&self, dtypes: &[DType]) -> Result<Tensor, TensorError> {
        if dtypes.len() != 1 {
            return Err(TensorError::DTypeArity(dtypes.len()));
        }
        let target = dtypes[0];
        if !target.is_float() {
            return Err(TensorError::UnsupportedDType(target));
        }
        let host = Tensor::from_vec(self.shape.clone(), self.dequantized_values())?
            .with_device(self.device);
        host.convert(target)
    }

    /// Shorthand for dequantizing to fp32.
    pub fn float(&self) -> Result<Tensor, TensorError> {
        self.to(&[DType::F32])
    }

    /// In-place multiply by a scalar or single-element tensor.
    ///
    /// Implemented as a scale adjustment, so no requantization error accrues.
    /// A negative factor flips the stored sign bits to keep the scale
    /// strictly positive; a zero factor degrades to
    /// [`zero_`](ScalingTensor::zero_). Like every in-place mutator, the
    /// effect reaches all views over the same storage.
    pub fn mul_<S: IntoScalar>(&mut self, factor: S) -> Result<(), TensorError> {
        let factor = factor.into_scalar()?;
        if !factor.is_finite() {
            return Err(TensorError::NonFiniteScalar);
        }
        if factor == 0.0 {
            self.zero_();
            return Ok(());
        }
        if factor < 0.0 {
            self.negate_raw();
        }
        let mut meta = self.meta_write();
        let scale = meta.scale() * factor.abs();
        meta.set_scale(scale);
        Ok(())
    }

    /// In-place divide by a nonzero scalar or single-element tensor.
    pub fn div_<S: IntoScalar>(&mut self, divisor: S) -> Result<(), TensorError> {
        let divisor = divisor.into_scalar()?;
        if divisor == 0.0 {
            return Err(TensorError::ZeroDivisor);
        }
        if !divisor.is_finite() {
            return Err(TensorError::NonFiniteScalar);
        }
        if divisor < 0.0 {
            self.negate_raw();
        }
        let mut meta = self.meta_write();
        let scale = meta.scale() / divisor.abs();
        meta.set_scale(scale);
        Ok(())
    }

    /// Sets the logical value to exactly zero and resets the scale to 1.0,
    /// so a subsequent dequantize yields zero rather than anything derived
    /// from a stale scale. Visible through every view over the same storage.
    pub fn zero_(&mut self) {
        self.raw_write().fill(0);
        self.meta_write().set_scale(1.0);
    }

    /// Returns a view with the axis order reversed, sharing both the storage
    /// buffer and the scaling metadata with `self`. The result may be
    /// non-contiguous.
    pub fn t(&self) -> Result<ScalingTensor, TensorError> {
        if self.rank() < 2 {
            return Err(TensorError::RankTooLow(self.rank()));
        }
        let mut strides = self.strides.clone();
        strides.reverse();
        Ok(ScalingTensor {
            raw: Arc::clone(&self.raw),
            shape: self.shape.reversed(),
            strides,
            device: self.device,
            meta: Arc::clone(&self.meta),
            grad: None,
            requires_grad: false,
        })
    }

    /// Materializes into an independent densely packed tensor, preserving
    /// the logical values exactly.
    ///
    /// Unlike [`t`](ScalingTensor::t), the result is not a view: it owns a
    /// fresh buffer and a snapshot of the scaling state, so later mutation
    /// through `self` does not reach it.
    pub fn contiguous(&self) -> ScalingTensor {
        let dtype = self.dtype();
        let meta = self.meta_read().clone();
        let raw = self.raw_read();
        // Typed copies keep the fresh allocation aligned for the cell type.
        let buffer = match dtype {
            DType::U8 => self.gather_cells(raw.as_slice()),
            DType::F16 => vec_into_bytes(self.gather_cells(bytes_as_slice::<u16>(&raw))),
            DType::F32 => vec_into_bytes(self.gather_cells(bytes_as_slice::<u32>(&raw))),
            DType::BF16 | DType::I32 => unreachable!("not a scaled storage dtype"),
        };
        drop(raw);
        ScalingTensor {
            raw: Arc::new(RwLock::new(buffer)),
            shape: self.shape.clone(),
            strides: self.shape.row_major_strides(),
            device: self.device,
            meta: Arc::new(RwLock::new(meta)),
            grad: None,
            requires_grad: false,
        }
    }

    /// Returns `true` iff any dequantized element is infinite or NaN.
    pub fn has_inf_or_nan(&self) -> bool {
        let (qtype, scale) = {
            let meta = self.meta_read();
            (meta.qtype(), meta.scale())
        };
        TypeCast::dequantize(&self.raw_read(), qtype, scale)
            .iter()
            .any(|v| !v.is_finite())
    }

    /// Maximum of the dequantized logical values.
    pub fn max(&self) -> f32 {
        self.dequantized_values()
            .iter()
            .fold(f32::NEG_INFINITY, |acc, v| acc.max(*v))
    }

    /// Minimum of the dequantized logical values.
    pub fn min(&self) -> f32 {
        self.dequantized_values()
            .iter()
            .fold(f32::INFINITY, |acc, v| acc.min(*v))
    }

    /// Gradient attached by the autograd collaborator, if any.
    pub fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    /// Attaches a gradient tensor. The core stores it; it never computes one.
    pub fn attach_grad(&mut self, grad: Tensor) {
        self.grad = Some(grad);
    }

    /// Detaches and returns the gradient tensor.
    pub fn detach_grad(&mut self) -> Option<Tensor> {
        self.grad.take()
    }

    /// Toggles the gradient-tracking flag.
    pub fn requires_grad(mut self, flag: bool) -> Self {
        self.requires_grad = flag;
        if !flag {
            self.grad = None;
        }
        self
    }

    /// Returns the current gradient tracking flag.
    pub fn requires_grad_flag(&self) -> bool {
        self.requires_grad
    }

    /// Logical values in row-major index order, honoring the strides.
    fn dequantized_values(&self) -> Vec<f32> {
        let (qtype, scale) = {
            let meta = self.meta_read();
            (meta.qtype(), meta.scale())
        };
        let linear = TypeCast::dequantize(&self.raw_read(), qtype, scale);
        if self.is_contiguous() {
            return linear;
        }
        offsets_in_logical_order(self.shape.dims(), &self.strides)
            .into_iter()
            .map(|offset| linear[offset])
            .collect()
    }

    /// Gathers storage cells into logical order, or copies them straight
    /// through when the layout is already dense.
    fn gather_cells<T: Copy>(&self, cells: &[T]) -> Vec<T> {
        if self.is_contiguous() {
            return cells.to_vec();
        }
        offsets_in_logical_order(self.shape.dims(), &self.strides)
            .into_iter()
            .map(|offset| cells[offset])
            .collect()
    }

    fn negate_raw(&mut self) {
        let dtype = self.dtype();
        let mut raw = self.raw_write();
        match dtype {
            DType::U8 => {
                for code in raw.iter_mut() {
                    *code ^= 0x80;
                }
            }
            DType::F16 => {
                for bits in bytes_as_slice_mut::<u16>(&mut raw) {
                    *bits ^= 0x8000;
                }
            }
            DType::F32 => {
                for bits in bytes_as_slice_mut::<u32>(&mut raw) {
                    *bits ^= 0x8000_0000;
                }
            }
            DType::BF16 | DType::I32 => unreachable!("not a scaled storage dtype"),
        }
    }

    fn meta_read(&self) -> RwLockReadGuard<'_, ScalingMeta> {
        self.meta.read().expect("scaling meta lock poisoned")
    }

    fn meta_write(&self) -> RwLockWriteGuard<'_, ScalingMeta> {
        self.meta.write().expect("scaling meta lock poisoned")
    }

    fn raw_read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.raw.read().expect("storage lock poisoned")
    }

    fn raw_write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.raw.write().expect("storage lock poisoned")
    }
}

impl fmt::Debug for ScalingTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalingTensor")
            .field("shape", &self.shape.dims())
            .field("qtype", &self.qtype())
            .field("scale", &self.scale())
            .field("device", &self.device)
            .finish()
    }
}

/// Helper trait lifting scalar operands for in-place arithmetic: plain `f32`
/// values and single-element host tensors are both accepted.
pub trait IntoScalar {
    /// Converts the operand into a scalar value.
    fn into_scalar(self) -> Result<f32, TensorError>;
}

impl IntoScalar for f32 {
    fn into_scalar(self) -> Result<f32, TensorError> {
        Ok(self)
    }
}

impl IntoScalar for &Tensor {
    fn into_scalar(self) -> Result<f32, TensorError> {
        if self.numel() != 1 {
            return Err(TensorError::ScalarExpected(self.numel()));
        }
        Ok(self.values()[0])
    }
}
