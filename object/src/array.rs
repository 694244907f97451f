use std::mem::size_of;

use crate::{ObjectRef, Value};

/// Smallest capacity an array grows to on its first append.
pub const ARRAY_MIN_ALLOC: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayType {
    Int,
    Double,
    Object,
}

/// Script-visible index outside `0..size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutOfBounds {
    pub index: i64,
    pub size: usize,
}

/// Array payload. `size` is the element count, `alloc_size` the capacity.
#[derive(Debug, Clone, PartialEq)]
pub enum DvmArray {
    Int(Vec<i64>),
    Double(Vec<f64>),
    Object(Vec<Option<ObjectRef>>),
}

impl DvmArray {
    pub fn new_int(size: usize) -> Self {
        DvmArray::Int(vec![0; size])
    }

    pub fn new_double(size: usize) -> Self {
        DvmArray::Double(vec![0.0; size])
    }

    /// All elements start out null.
    pub fn new_object(size: usize) -> Self {
        DvmArray::Object(vec![None; size])
    }

    pub fn array_type(&self) -> ArrayType {
        match self {
            DvmArray::Int(_) => ArrayType::Int,
            DvmArray::Double(_) => ArrayType::Double,
            DvmArray::Object(_) => ArrayType::Object,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            DvmArray::Int(v) => v.len(),
            DvmArray::Double(v) => v.len(),
            DvmArray::Object(v) => v.len(),
        }
    }

    pub fn alloc_size(&self) -> usize {
        match self {
            DvmArray::Int(v) => v.capacity(),
            DvmArray::Double(v) => v.capacity(),
            DvmArray::Object(v) => v.capacity(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn element_size(&self) -> usize {
        match self {
            DvmArray::Int(_) => size_of::<i64>(),
            DvmArray::Double(_) => size_of::<f64>(),
            DvmArray::Object(_) => size_of::<Option<ObjectRef>>(),
        }
    }

    pub fn payload_size(&self) -> usize {
        self.alloc_size() * self.element_size()
    }

    #[inline]
    fn check_index(&self, index: i64) -> Result<usize, IndexOutOfBounds> {
        let size = self.size();
        if index < 0 || index as u64 >= size as u64 {
            return Err(IndexOutOfBounds { index, size });
        }
        Ok(index as usize)
    }

    pub fn get(&self, index: i64) -> Result<Value, IndexOutOfBounds> {
        let idx = self.check_index(index)?;
        Ok(match self {
            DvmArray::Int(v) => Value::Int(v[idx]),
            DvmArray::Double(v) => Value::Double(v[idx]),
            DvmArray::Object(v) => Value::Object(v[idx]),
        })
    }

    /// Stores `value` at `index`.
    ///
    /// # Panics
    ///
    /// If the value's variant does not match the array's element type. The
    /// compiler emits typed stores, so a mismatch is a code generation bug.
    pub fn set(&mut self, index: i64, value: Value) -> Result<(), IndexOutOfBounds> {
        let idx = self.check_index(index)?;
        match (self, value) {
            (DvmArray::Int(v), Value::Int(n)) => v[idx] = n,
            (DvmArray::Double(v), Value::Double(d)) => v[idx] = d,
            (DvmArray::Object(v), Value::Object(r)) => v[idx] = r,
            (array, value) => panic!(
                "{:?} array cannot hold {value:?}",
                array.array_type()
            ),
        }
        Ok(())
    }

    /// Appends `value`, growing capacity geometrically.
    ///
    /// # Panics
    ///
    /// Same element type rule as [`DvmArray::set`].
    pub fn push(&mut self, value: Value) {
        match (self, value) {
            (DvmArray::Int(v), Value::Int(n)) => {
                grow_for_push(v);
                v.push(n);
            }
            (DvmArray::Double(v), Value::Double(d)) => {
                grow_for_push(v);
                v.push(d);
            }
            (DvmArray::Object(v), Value::Object(r)) => {
                grow_for_push(v);
                v.push(r);
            }
            (array, value) => panic!(
                "{:?} array cannot hold {value:?}",
                array.array_type()
            ),
        }
    }
}

fn grow_for_push<T>(v: &mut Vec<T>) {
    if v.len() == v.capacity() {
        let extra = v.capacity().max(ARRAY_MIN_ALLOC);
        v.reserve_exact(extra);
    }
}
