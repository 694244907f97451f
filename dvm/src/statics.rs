use object::{ObjectRef, Value, Visitable};

use crate::executable::VariableDecl;

/// Global variable slots, sized once from the declaring executable.
///
/// Indices come from the compiler and are never re-validated here, an
/// out-of-range index is a bug in the caller.
#[derive(Debug, Default)]
pub struct Static {
    variables: Vec<Value>,
}

impl Static {
    pub fn new(globals: &[VariableDecl]) -> Self {
        Self {
            variables: globals
                .iter()
                .map(|decl| decl.ty.initial_value())
                .collect(),
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Value {
        self.variables[index]
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: Value) {
        self.variables[index] = value;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn variables(&self) -> &[Value] {
        &self.variables
    }
}

impl Visitable for Static {
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        self.variables.visit_edges(visitor);
    }
}
