use std::fmt;

use serde::{Deserialize, Serialize};

/// Device a location's storage lives on. Only the tag is tracked here; moving
/// data between devices is the kernels' business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

/// Address of one arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemLocation {
    index: usize,
    device: Device,
}

impl MemLocation {
    pub const fn new(index: usize, device: Device) -> Self {
        Self { index, device }
    }

    pub const fn cpu(index: usize) -> Self {
        Self::new(index, Device::Cpu)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn device(&self) -> Device {
        self.device
    }
}

impl fmt::Display for MemLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device {
            Device::Cpu => write!(f, "@{}", self.index),
            Device::Gpu => write!(f, "@{}:gpu", self.index),
        }
    }
}
