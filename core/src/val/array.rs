use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::exec::Device;

/// Element type of an [`Array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Bool,
    I8,
    I32,
    I64,
    F32,
    F64,
}

impl Dtype {
    pub fn size_of(self) -> usize {
        match self {
            Dtype::Bool | Dtype::I8 => 1,
            Dtype::I32 | Dtype::F32 => 4,
            Dtype::I64 | Dtype::F64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Dtype::Bool | Dtype::I8 | Dtype::I32 | Dtype::I64)
    }

    pub fn name(self) -> &'static str {
        match self {
            Dtype::Bool => "bool",
            Dtype::I8 => "i8",
            Dtype::I32 => "i32",
            Dtype::I64 => "i64",
            Dtype::F32 => "f32",
            Dtype::F64 => "f64",
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed element storage backing an [`Array`].
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Buffer {
    pub fn zeros(dtype: Dtype, len: usize) -> Self {
        match dtype {
            Dtype::Bool => Buffer::Bool(vec![false; len]),
            Dtype::I8 => Buffer::I8(vec![0; len]),
            Dtype::I32 => Buffer::I32(vec![0; len]),
            Dtype::I64 => Buffer::I64(vec![0; len]),
            Dtype::F32 => Buffer::F32(vec![0.0; len]),
            Dtype::F64 => Buffer::F64(vec![0.0; len]),
        }
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Buffer::Bool(_) => Dtype::Bool,
            Buffer::I8(_) => Dtype::I8,
            Buffer::I32(_) => Dtype::I32,
            Buffer::I64(_) => Dtype::I64,
            Buffer::F32(_) => Dtype::F32,
            Buffer::F64(_) => Dtype::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Buffer::Bool(v) => v.len(),
            Buffer::I8(v) => v.len(),
            Buffer::I32(v) => v.len(),
            Buffer::I64(v) => v.len(),
            Buffer::F32(v) => v.len(),
            Buffer::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        match self {
            Buffer::Bool(v) => v.get(idx).map(|b| if *b { 1.0 } else { 0.0 }),
            Buffer::I8(v) => v.get(idx).map(|x| *x as f64),
            Buffer::I32(v) => v.get(idx).map(|x| *x as f64),
            Buffer::I64(v) => v.get(idx).map(|x| *x as f64),
            Buffer::F32(v) => v.get(idx).map(|x| *x as f64),
            Buffer::F64(v) => v.get(idx).copied(),
        }
    }

    pub fn get_i64(&self, idx: usize) -> Option<i64> {
        match self {
            Buffer::Bool(v) => v.get(idx).map(|b| *b as i64),
            Buffer::I8(v) => v.get(idx).map(|x| *x as i64),
            Buffer::I32(v) => v.get(idx).map(|x| *x as i64),
            Buffer::I64(v) => v.get(idx).copied(),
            Buffer::F32(_) | Buffer::F64(_) => None,
        }
    }

    pub fn set_f64(&mut self, idx: usize, value: f64) -> bool {
        match self {
            Buffer::Bool(v) => v.get_mut(idx).map(|slot| *slot = value != 0.0).is_some(),
            Buffer::I8(v) => v.get_mut(idx).map(|slot| *slot = value as i8).is_some(),
            Buffer::I32(v) => v.get_mut(idx).map(|slot| *slot = value as i32).is_some(),
            Buffer::I64(v) => v.get_mut(idx).map(|slot| *slot = value as i64).is_some(),
            Buffer::F32(v) => v.get_mut(idx).map(|slot| *slot = value as f32).is_some(),
            Buffer::F64(v) => v.get_mut(idx).map(|slot| *slot = value).is_some(),
        }
    }

    /// Exact comparison: floats are compared by bit pattern so NaN payloads
    /// and signed zeros count as differences.
    pub fn bits_eq(&self, other: &Buffer) -> bool {
        match (self, other) {
            (Buffer::F32(a), Buffer::F32(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Buffer::F64(a), Buffer::F64(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            _ => self == other,
        }
    }
}

/// Dense n-dimensional array.
///
/// The buffer sits behind a lock so by-reference kernels can write into an
/// array that several arena slots or tuples alias. A kernel must not hold the
/// read guard of a handle while asking for its write guard.
pub struct Array {
    dtype: Dtype,
    shape: Vec<usize>,
    device: Device,
    data: RwLock<Buffer>,
}

impl Array {
    pub fn zeros(dtype: Dtype, shape: &[usize], device: Device) -> Self {
        let len = shape.iter().product();
        Self {
            dtype,
            shape: shape.to_vec(),
            device,
            data: RwLock::new(Buffer::zeros(dtype, len)),
        }
    }

    pub fn from_buffer(shape: &[usize], device: Device, buffer: Buffer) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if buffer.len() != expected {
            bail!(
                "buffer holds {} elements but shape {:?} needs {}",
                buffer.len(),
                shape,
                expected
            );
        }
        Ok(Self {
            dtype: buffer.dtype(),
            shape: shape.to_vec(),
            device,
            data: RwLock::new(buffer),
        })
    }

    pub fn from_f64(shape: &[usize], values: Vec<f64>) -> Result<Self> {
        Self::from_buffer(shape, Device::Cpu, Buffer::F64(values))
    }

    pub fn from_i64(shape: &[usize], values: Vec<i64>) -> Result<Self> {
        Self::from_buffer(shape, Device::Cpu, Buffer::I64(values))
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn nbytes(&self) -> usize {
        self.size() * self.dtype().size_of()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn read_buffer(&self) -> Result<RwLockReadGuard<'_, Buffer>> {
        self.data.read().map_err(|_| anyhow!("array buffer lock poisoned"))
    }

    /// Exclusive access for in-place kernels. The buffer's dtype and length
    /// must be left unchanged.
    pub fn write_buffer(&self) -> Result<RwLockWriteGuard<'_, Buffer>> {
        self.data.write().map_err(|_| anyhow!("array buffer lock poisoned"))
    }

    pub fn get_f64(&self, idx: usize) -> Result<f64> {
        self.read_buffer()?
            .get_f64(idx)
            .ok_or_else(|| anyhow!("index {} out of range for array of size {}", idx, self.size()))
    }

    /// Integer element `idx`, used when an array stands in for a dimension.
    pub fn get_index(&self, idx: usize) -> Result<i64> {
        let buffer = self.read_buffer()?;
        match buffer.get_i64(idx) {
            Some(v) => Ok(v),
            None if !buffer.dtype().is_integer() => Err(anyhow!("{} array is not integral", buffer.dtype())),
            None => Err(anyhow!("index {} out of range for array of size {}", idx, self.size())),
        }
    }

    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let buffer = self.read_buffer()?;
        Ok((0..buffer.len()).filter_map(|i| buffer.get_f64(i)).collect())
    }

    /// Run `f` over every element as `f64`, writing the result back in place.
    pub fn map_f64_in_place<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(f64) -> f64,
    {
        let mut buffer = self.write_buffer()?;
        for i in 0..buffer.len() {
            if let Some(v) = buffer.get_f64(i) {
                buffer.set_f64(i, f(v));
            }
        }
        Ok(())
    }

    pub fn fill_f64(&self, value: f64) -> Result<()> {
        self.map_f64_in_place(|_| value)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Array");
        dbg.field("dtype", &self.dtype).field("shape", &self.shape).field("device", &self.device);
        match self.data.read() {
            Ok(buffer) => dbg.field("data", &*buffer),
            Err(_) => dbg.field("data", &"<poisoned>"),
        };
        dbg.finish()
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.dtype != other.dtype || self.shape != other.shape || self.device != other.device {
            return false;
        }
        match (self.data.read(), other.data.read()) {
            (Ok(a), Ok(b)) => a.bits_eq(&b),
            _ => false,
        }
    }
}
