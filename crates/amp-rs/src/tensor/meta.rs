//! Per-tensor scaling state: target format, scale factor, and the amax
//! history the scale is recomputed from.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::qtype::QType;

/// Default capacity of the amax history ring.
pub const DEFAULT_AMAX_WINDOW: usize = 16;

/// Shared handle to a [`ScalingMeta`].
///
/// Tensor views produced by transpose alias the same metadata, so scale
/// mutation through any alias is visible to all of them. Writers must be
/// serialized externally; concurrent reads are fine.
pub type SharedMeta = Arc<RwLock<ScalingMeta>>;

/// Fixed-capacity FIFO of recently observed maximum magnitudes.
///
/// Implemented as a preallocated arena with a rotating write cursor so
/// recording is allocation-free and eviction is O(1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmaxHistory {
    slots: Vec<f32>,
    cursor: usize,
    filled: usize,
}

impl AmaxHistory {
    fn with_capacity(window: usize) -> Self {
        assert!(window > 0, "amax window must hold at least one entry");
        AmaxHistory {
            slots: vec![0.0; window],
            cursor: 0,
            filled: 0,
        }
    }

    fn push(&mut self, value: f32) {
        self.slots[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.filled = (self.filled + 1).min(self.slots.len());
    }

    fn max(&self) -> Option<f32> {
        if self.filled == 0 {
            return None;
        }
        Some(
            self.slots[..self.filled]
                .iter()
                .fold(0.0f32, |acc, v| acc.max(*v)),
        )
    }

    fn len(&self) -> usize {
        self.filled
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Mutable per-tensor scaling record.
///
/// Invariant: `scale` is strictly positive and finite at all times. The
/// logical value of a bound tensor is `raw_buffer * scale`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingMeta {
    qtype: QType,
    scale: f32,
    margin: i32,
    amax: AmaxHistory,
}

impl ScalingMeta {
    /// Creates metadata for `qtype` with scale 1.0, an empty history, and
    /// the default window.
    pub fn new(qtype: QType) -> Self {
        ScalingMeta::with_window(qtype, DEFAULT_AMAX_WINDOW)
    }

    /// Creates metadata with an explicit history capacity.
    pub fn with_window(qtype: QType, window: usize) -> Self {
        ScalingMeta {
            qtype,
            scale: 1.0,
            margin: 0,
            amax: AmaxHistory::with_capacity(window),
        }
    }

    /// Sets the power-of-two safety margin applied by [`recompute_scale`].
    ///
    /// A positive margin leaves headroom below the format maximum for
    /// magnitudes that grow between scale updates.
    ///
    /// [`recompute_scale`]: ScalingMeta::recompute_scale
    pub fn with_margin(mut self, margin: i32) -> Self {
        self.margin = margin;
        self
    }

    /// Target numeric format of the bound tensor.
    pub fn qtype(&self) -> QType {
        self.qtype
    }

    /// Current multiplicative factor from raw stored value to real value.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Number of amax entries currently recorded.
    pub fn history_len(&self) -> usize {
        self.amax.len()
    }

    /// History capacity fixed at construction.
    pub fn window(&self) -> usize {
        self.amax.capacity()
    }

    /// Largest recorded amax, if any.
    pub fn amax(&self) -> Option<f32> {
        self.amax.max()
    }

    /// Appends an observed max-abs magnitude, evicting the oldest entry once
    /// the window is full.
    pub fn record_amax(&mut self, value: f32) {
        self.amax.push(value);
    }

    /// Recomputes the scale from the recorded history and returns it.
    ///
    /// The new scale is `amax * 2^margin / qtype.max_value()`, clamped to
    /// positive finite bounds. An empty or all-zero history leaves the scale
    /// unchanged, so a freshly zeroed tensor keeps dequantizing to exact
    /// zero instead of dividing by zero here. A full-width target keeps the
    /// identity scale: rescaling fp32 into fp32 only risks overflow at the
    /// amax element.
    pub fn recompute_scale(&mut self) -> f32 {
        if self.qtype == QType::F32 {
            return self.scale;
        }
        let Some(amax) = self.amax.max() else {
            return self.scale;
        };
        if amax == 0.0 {
            return self.scale;
        }
        let margin = 2.0f32.powi(self.margin);
        let scale = amax * margin / self.qtype.max_value();
        self.scale = clamp_positive_finite(scale);
        self.scale
    }

    /// Replaces the scale, clamping the value into positive finite bounds.
    pub(crate) fn set_scale(&mut self, scale: f32) {
        self.scale = clamp_positive_finite(scale);
    }
}

fn clamp_positive_finite(scale: f32) -> f32 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(f32::MIN_POSITIVE, f32::MAX)
}
