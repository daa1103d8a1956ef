//! Device placement tags.
//!
//! The core tracks where a buffer lives but never moves it; transfers and
//! stream scheduling belong to the host runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placement tag attached to every tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
    /// Accelerator device, identified by ordinal.
    Cuda(usize),
}

impl Device {
    /// Returns `true` when the tensor is tagged as accelerator-resident.
    pub fn is_cuda(self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}
