use std::mem::size_of;

use crate::{DvmArray, DvmString};

/// Stable handle to a heap object.
///
/// `index` addresses the heap's arena slot, `generation` is bumped every
/// time that slot is freed, so a handle that outlived its object never
/// aliases the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    index: u32,
    generation: u32,
}

impl ObjectRef {
    #[inline(always)]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline(always)]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    String,
    Array,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    String(DvmString),
    Array(DvmArray),
}

/// A collector-owned allocation.
///
/// `marked` is only meaningful while a collection is running; between
/// collections every live object has it cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapObject {
    pub marked: bool,
    pub kind: ObjectKind,
}

impl HeapObject {
    /// Bytes charged for the object itself, independent of its payload.
    pub const HEADER_SIZE: usize = size_of::<HeapObject>();

    pub fn new(kind: ObjectKind) -> Self {
        Self {
            marked: false,
            kind,
        }
    }

    pub fn string(string: DvmString) -> Self {
        Self::new(ObjectKind::String(string))
    }

    pub fn array(array: DvmArray) -> Self {
        Self::new(ObjectKind::Array(array))
    }

    pub fn object_type(&self) -> ObjectType {
        match self.kind {
            ObjectKind::String(_) => ObjectType::String,
            ObjectKind::Array(_) => ObjectType::Array,
        }
    }

    pub fn as_string(&self) -> Option<&DvmString> {
        match &self.kind {
            ObjectKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&DvmArray> {
        match &self.kind {
            ObjectKind::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut DvmArray> {
        match &mut self.kind {
            ObjectKind::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Bytes this object contributes to the heap's live size.
    pub fn byte_size(&self) -> usize {
        let payload = match &self.kind {
            ObjectKind::String(s) => s.payload_size(),
            ObjectKind::Array(a) => a.payload_size(),
        };
        Self::HEADER_SIZE + payload
    }
}
