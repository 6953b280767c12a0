//! Small element-wise kernels over `f64` views of arrays.

use anyhow::{Result, anyhow, bail};

use crate::exec::{ByRefCallable, ByValCallable};
use crate::val::{Array, Obj, Object};

fn first_array(reads: &[Obj]) -> Result<&Array> {
    reads
        .first()
        .ok_or_else(|| anyhow!("kernel expects at least one operand"))?
        .as_array()
}

/// `out = x * factor`, freshly allocated.
pub fn scale(factor: f64) -> ByValCallable {
    ByValCallable::new(move |reads| {
        let src = first_array(reads)?;
        let values = src.to_f64_vec()?.into_iter().map(|v| v * factor).collect();
        Ok(Object::array(Array::from_f64(src.shape(), values)?))
    })
}

/// `out += delta`, in place.
pub fn add_in_place(delta: f64) -> ByRefCallable {
    ByRefCallable::new(move |_reads, out| out.as_array()?.map_f64_in_place(|v| v + delta))
}

/// Copy the first operand's elements into the output array.
pub fn copy_into() -> ByRefCallable {
    ByRefCallable::new(|reads, out| {
        let values = first_array(reads)?.to_f64_vec()?;
        let dst = out.as_array()?;
        if values.len() != dst.size() {
            bail!("copy of {} elements into array of size {}", values.len(), dst.size());
        }
        let mut idx = 0;
        dst.map_f64_in_place(|_| {
            let v = values[idx];
            idx += 1;
            v
        })
    })
}

/// Element-wise sum of every operand. Tuple operands contribute each of
/// their arrays.
pub fn sum() -> ByValCallable {
    ByValCallable::new(|reads| {
        let mut arrays: Vec<&Array> = Vec::new();
        for obj in reads {
            match &**obj {
                Object::Tuple(items) => {
                    for item in items.iter() {
                        arrays.push(item.as_array()?);
                    }
                }
                other => arrays.push(other.as_array()?),
            }
        }
        let first = arrays.first().ok_or_else(|| anyhow!("sum expects at least one array"))?;
        let shape = first.shape().to_vec();
        let mut acc = vec![0.0; first.size()];
        for array in &arrays {
            if array.shape() != shape.as_slice() {
                bail!("sum operands disagree on shape: {:?} vs {:?}", shape, array.shape());
            }
            for (slot, v) in acc.iter_mut().zip(array.to_f64_vec()?) {
                *slot += v;
            }
        }
        Ok(Object::array(Array::from_f64(&shape, acc)?))
    })
}

/// Sum of every element of an array (or of a scalar), as `f64`.
pub fn checksum(obj: &Object) -> Result<f64> {
    match obj {
        Object::Array(a) => Ok(a.to_f64_vec()?.iter().sum()),
        Object::Tuple(items) => items.iter().map(|item| checksum(item)).sum(),
        Object::Scalar(_) => obj.to_f64(),
    }
}
