//! Checked runtime operations for the dispatch loop.
//!
//! Every operation that creates an object may trigger a collection, so
//! inputs must already be rooted (normally: on the stack).

use object::{DvmArray, DvmString, HeapObject, Value};

use crate::error::{ErrorKind, RuntimeError};
use crate::vm::VirtualMachine;

pub const NULL_STRING: &str = "null";
pub const TRUE_STRING: &str = "true";
pub const FALSE_STRING: &str = "false";

/// Floating point division follows IEEE 754: a zero divisor gives an
/// infinity or NaN, never an error.
#[inline]
pub fn double_div(a: f64, b: f64) -> f64 {
    a / b
}

impl VirtualMachine {
    // ── Arithmetic ────────────────────────────────────────────────────

    pub fn int_div(&self, a: i64, b: i64) -> Result<i64, RuntimeError> {
        if b == 0 {
            return Err(self.error(ErrorKind::DivisionByZero));
        }
        Ok(a.wrapping_div(b))
    }

    pub fn int_rem(&self, a: i64, b: i64) -> Result<i64, RuntimeError> {
        if b == 0 {
            return Err(self.error(ErrorKind::DivisionByZero));
        }
        Ok(a.wrapping_rem(b))
    }

    // ── Strings ───────────────────────────────────────────────────────

    pub fn create_string(&mut self, text: impl Into<String>) -> Value {
        let text: String = text.into();
        Value::from(self.allocate(HeapObject::string(DvmString::new(text))))
    }

    /// Creates a string from raw UTF-8, as read from a file or a native
    /// buffer.
    pub fn create_string_from_bytes(
        &mut self,
        bytes: &[u8],
    ) -> Result<Value, RuntimeError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| self.error(ErrorKind::BadMultibyteCharacter))?;
        Ok(self.create_string(text))
    }

    /// Text of a string value; `None` for null.
    pub fn string_text(&self, value: Value) -> Result<Option<&str>, RuntimeError> {
        if value.is_null() {
            return Ok(None);
        }
        self.object(value)?
            .as_string()
            .map(|s| Some(s.as_str()))
            .ok_or_else(|| self.error(ErrorKind::NullPointer))
    }

    /// Length in characters.
    pub fn string_length(&self, value: Value) -> Result<i64, RuntimeError> {
        match self.string_text(value)? {
            Some(text) => Ok(text.chars().count() as i64),
            None => Err(self.error(ErrorKind::NullPointer)),
        }
    }

    /// Concatenates two strings; a null operand reads as `"null"`.
    pub fn chain_string(
        &mut self,
        a: Value,
        b: Value,
    ) -> Result<Value, RuntimeError> {
        let left = self.string_text(a)?.unwrap_or(NULL_STRING);
        let right = self.string_text(b)?.unwrap_or(NULL_STRING);
        let mut text = String::with_capacity(left.len() + right.len());
        text.push_str(left);
        text.push_str(right);
        Ok(self.create_string(text))
    }

    pub fn int_to_string(&mut self, n: i64) -> Value {
        self.create_string(n.to_string())
    }

    /// Six fractional digits, like C's `%f`.
    pub fn double_to_string(&mut self, d: f64) -> Value {
        self.create_string(format!("{d:.6}"))
    }

    pub fn boolean_to_string(&mut self, b: bool) -> Value {
        self.create_string(if b { TRUE_STRING } else { FALSE_STRING })
    }

    // ── Arrays ────────────────────────────────────────────────────────

    pub fn create_array_int(&mut self, size: usize) -> Value {
        Value::from(self.allocate(HeapObject::array(DvmArray::new_int(size))))
    }

    pub fn create_array_double(&mut self, size: usize) -> Value {
        Value::from(self.allocate(HeapObject::array(DvmArray::new_double(size))))
    }

    pub fn create_array_object(&mut self, size: usize) -> Value {
        Value::from(self.allocate(HeapObject::array(DvmArray::new_object(size))))
    }

    fn array(&self, value: Value) -> Result<&DvmArray, RuntimeError> {
        self.object(value)?
            .as_array()
            .ok_or_else(|| self.error(ErrorKind::NullPointer))
    }

    pub fn array_length(&self, array: Value) -> Result<i64, RuntimeError> {
        Ok(self.array(array)?.size() as i64)
    }

    pub fn array_get(
        &self,
        array: Value,
        index: i64,
    ) -> Result<Value, RuntimeError> {
        self.array(array)?.get(index).map_err(|e| {
            self.error(ErrorKind::IndexOutOfBounds {
                index: e.index,
                size: e.size,
            })
        })
    }

    pub fn array_set(
        &mut self,
        array: Value,
        index: i64,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let stored = array
            .as_object()
            .and_then(|r| self.heap.get_mut(r))
            .and_then(|object| object.as_array_mut())
            .map(|elements| elements.set(index, value));

        match stored {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(self.error(ErrorKind::IndexOutOfBounds {
                index: e.index,
                size: e.size,
            })),
            None => Err(self.error(ErrorKind::NullPointer)),
        }
    }

    /// Appends to an array, keeping heap accounting in step with its
    /// capacity.
    pub fn array_push(
        &mut self,
        array: Value,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let Some(r) = array.as_object() else {
            return Err(self.error(ErrorKind::NullPointer));
        };
        let pushed = self.update_object(r, |object| match object.as_array_mut() {
            Some(elements) => {
                elements.push(value);
                true
            }
            None => false,
        });
        match pushed {
            Some(true) => Ok(()),
            _ => Err(self.error(ErrorKind::NullPointer)),
        }
    }
}
