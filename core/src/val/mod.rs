//! Values passed between instructions.
//!
//! Every value lives behind an [`Obj`] handle. Arena slots and tuples hold
//! strong references, so a handle shared by several slots is released once,
//! when the last of them lets go.

mod array;

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::exec::ExecError;

pub use array::{Array, Buffer, Dtype};

/// Shared handle to a heap value.
pub type Obj = Arc<Object>;

#[derive(Debug, Clone, Copy)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Object {
    Scalar(Scalar),
    Array(Array),
    Tuple(Tuple),
}

impl Object {
    pub fn int(v: i64) -> Obj {
        Arc::new(Object::Scalar(Scalar::Int(v)))
    }

    pub fn float(v: f64) -> Obj {
        Arc::new(Object::Scalar(Scalar::Float(v)))
    }

    pub fn bool(v: bool) -> Obj {
        Arc::new(Object::Scalar(Scalar::Bool(v)))
    }

    pub fn array(array: Array) -> Obj {
        Arc::new(Object::Array(array))
    }

    pub fn tuple(items: Vec<Obj>) -> Obj {
        Arc::new(Object::Tuple(Tuple::from(items)))
    }

    /// Pointer identity: both handles refer to the same allocation.
    #[inline]
    pub fn same_handle(a: &Obj, b: &Obj) -> bool {
        Arc::ptr_eq(a, b)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Scalar(_) => "scalar",
            Object::Array(_) => "array",
            Object::Tuple(_) => "tuple",
        }
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Object::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Result<&Array> {
        match self {
            Object::Array(a) => Ok(a),
            other => Err(anyhow!("expected array, got {}", other.type_name())),
        }
    }

    pub fn as_tuple(&self) -> Result<&Tuple> {
        match self {
            Object::Tuple(t) => Ok(t),
            other => Err(anyhow!("expected tuple, got {}", other.type_name())),
        }
    }

    /// Numeric view of a scalar or a one-element array.
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Object::Scalar(Scalar::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
            Object::Scalar(Scalar::Int(i)) => Ok(*i as f64),
            Object::Scalar(Scalar::Float(x)) => Ok(*x),
            Object::Array(a) if a.size() == 1 => a.get_f64(0),
            other => Err(anyhow!("{} has no single numeric value", other.type_name())),
        }
    }

    /// Interpret the value as one array dimension.
    pub fn as_dim(&self) -> Result<usize> {
        let raw = match self {
            Object::Scalar(Scalar::Int(i)) => *i,
            Object::Scalar(Scalar::Bool(b)) => *b as i64,
            Object::Array(a) if a.size() == 1 => a.get_index(0).map_err(|e| ExecError::InvalidShape {
                reason: e.to_string(),
            })?,
            other => {
                return Err(ExecError::InvalidShape {
                    reason: format!("{} cannot be used as a dimension", other.type_name()),
                }
                .into());
            }
        };
        usize::try_from(raw).map_err(|_| {
            ExecError::InvalidShape {
                reason: format!("negative dimension {}", raw),
            }
            .into()
        })
    }
}

/// Immutable ordered sequence of handles. Cloning shares the backing slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    items: Arc<[Obj]>,
}

impl Tuple {
    pub fn empty() -> Self {
        Self::from(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Obj> {
        self.items.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Obj> {
        self.items.iter()
    }
}

impl Deref for Tuple {
    type Target = [Obj];

    fn deref(&self) -> &[Obj] {
        &self.items
    }
}

impl From<Vec<Obj>> for Tuple {
    fn from(items: Vec<Obj>) -> Self {
        Self {
            items: Arc::from(items),
        }
    }
}

impl FromIterator<Obj> for Tuple {
    fn from_iter<I: IntoIterator<Item = Obj>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
