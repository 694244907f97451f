//! In-memory form of a compiled program unit.
//!
//! Executables are produced by the compiler or loader and shared with the
//! VM through [`Arc`]; the VM never mutates them.

use std::sync::Arc;

use object::Value;

/// Declared type of a variable or parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Boolean,
    Int,
    Double,
    String,
    Null,
    Array(Box<ValueType>),
}

impl ValueType {
    /// The value a freshly declared variable of this type holds.
    pub fn initial_value(&self) -> Value {
        match self {
            ValueType::Boolean | ValueType::Int => Value::Int(0),
            ValueType::Double => Value::Double(0.0),
            ValueType::String | ValueType::Null | ValueType::Array(_) => {
                Value::NULL
            }
        }
    }

    pub fn is_reference(&self) -> bool {
        self.initial_value().is_pointer()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl {
    pub name: String,
    pub ty: ValueType,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Entry of the constant table. String constants are the literal table.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Double(f64),
    String(Arc<str>),
}

/// Maps a run of bytecode to the source line it was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub line_number: u32,
    pub start_pc: usize,
    pub pc_count: usize,
}

pub fn line_number_for(table: &[LineNumber], pc: usize) -> Option<u32> {
    table
        .iter()
        .find(|entry| {
            pc >= entry.start_pc && pc < entry.start_pc + entry.pc_count
        })
        .map(|entry| entry.line_number)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableFunction {
    pub name: String,
    pub parameters: Vec<VariableDecl>,
    pub local_variables: Vec<VariableDecl>,
    /// `false` for a declaration that must be provided elsewhere, usually
    /// by a native function.
    pub is_implemented: bool,
    pub code: Vec<u8>,
    pub line_numbers: Vec<LineNumber>,
    /// Operand slots the body needs on top of its locals.
    pub need_stack_size: usize,
}

impl ExecutableFunction {
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<VariableDecl>,
        local_variables: Vec<VariableDecl>,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            local_variables,
            is_implemented: true,
            code: Vec::new(),
            line_numbers: Vec::new(),
            need_stack_size: 0,
        }
    }

    pub fn declaration(
        name: impl Into<String>,
        parameters: Vec<VariableDecl>,
    ) -> Self {
        Self {
            is_implemented: false,
            ..Self::new(name, parameters, Vec::new())
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn line_number_for(&self, pc: usize) -> Option<u32> {
        line_number_for(&self.line_numbers, pc)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Executable {
    pub name: String,
    pub functions: Vec<ExecutableFunction>,
    pub constants: Vec<Constant>,
    pub globals: Vec<VariableDecl>,
    /// Top-level code.
    pub code: Vec<u8>,
    pub line_numbers: Vec<LineNumber>,
    pub need_stack_size: usize,
}

impl Executable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn line_number_for(&self, pc: usize) -> Option<u32> {
        line_number_for(&self.line_numbers, pc)
    }

    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_values_follow_type() {
        assert_eq!(ValueType::Int.initial_value(), Value::Int(0));
        assert_eq!(ValueType::Boolean.initial_value(), Value::Int(0));
        assert_eq!(ValueType::Double.initial_value(), Value::Double(0.0));
        assert_eq!(ValueType::String.initial_value(), Value::NULL);
        assert!(ValueType::Array(Box::new(ValueType::Int)).is_reference());
        assert!(!ValueType::Double.is_reference());
    }

    #[test]
    fn line_lookup() {
        let table = [
            LineNumber { line_number: 1, start_pc: 0, pc_count: 4 },
            LineNumber { line_number: 3, start_pc: 4, pc_count: 2 },
        ];
        assert_eq!(line_number_for(&table, 0), Some(1));
        assert_eq!(line_number_for(&table, 5), Some(3));
        assert_eq!(line_number_for(&table, 6), None);
    }

    #[test]
    fn declarations_are_not_implemented() {
        let f = ExecutableFunction::declaration(
            "print",
            vec![VariableDecl::new("s", ValueType::String)],
        );
        assert!(!f.is_implemented);
        assert_eq!(f.parameter_count(), 1);
    }
}
