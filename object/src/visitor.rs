use crate::{DvmArray, DvmString, HeapObject, ObjectKind, ObjectRef, Value};

/// Anything that can hold references into the heap.
///
/// Visiting only reports direct edges; the collector is responsible for
/// walking further.
pub trait Visitable {
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjectRef));
}

impl Visitable for Value {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        if let Value::Object(Some(r)) = self {
            visitor(*r);
        }
    }
}

impl Visitable for [Value] {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        self.iter().for_each(|value| value.visit_edges(visitor));
    }
}

// nothing to visit in a string
impl Visitable for DvmString {
    #[inline]
    fn visit_edges(&self, _visitor: &mut dyn FnMut(ObjectRef)) {}
}

impl Visitable for DvmArray {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        if let DvmArray::Object(elements) = self {
            elements.iter().flatten().for_each(|&r| visitor(r));
        }
    }
}

impl Visitable for HeapObject {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        match &self.kind {
            ObjectKind::String(s) => s.visit_edges(visitor),
            ObjectKind::Array(a) => a.visit_edges(visitor),
        }
    }
}
