//! Registry of callable functions, native and compiled alike.
//!
//! Names are resolved once while linking; afterwards everything goes
//! through [`FunctionIndex`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use object::Value;

use crate::error::{ErrorKind, RuntimeError};
use crate::executable::{Executable, ExecutableFunction};
use crate::vm::{ExecutableId, VirtualMachine};

/// Signature of a native function. Arguments are passed bottom first.
pub type NativeProc =
    fn(&mut VirtualMachine, &[Value]) -> Result<Value, RuntimeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionIndex(pub usize);

impl fmt::Display for FunctionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub proc: NativeProc,
    pub arg_count: usize,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("arg_count", &self.arg_count)
            .finish_non_exhaustive()
    }
}

/// A function compiled into some executable.
#[derive(Debug, Clone)]
pub struct DiksamFunction {
    pub executable: Arc<Executable>,
    pub id: ExecutableId,
    /// Index into `executable.functions`.
    pub index: usize,
}

impl DiksamFunction {
    pub fn definition(&self) -> &ExecutableFunction {
        &self.executable.functions[self.index]
    }
}

#[derive(Debug, Clone)]
pub enum FunctionKind {
    Native(NativeFunction),
    Diksam(DiksamFunction),
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
}

impl Function {
    /// Number of arguments the caller pushes.
    pub fn parameter_count(&self) -> usize {
        match &self.kind {
            FunctionKind::Native(native) => native.arg_count,
            FunctionKind::Diksam(diksam) => {
                diksam.definition().parameter_count()
            }
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind, FunctionKind::Native(_))
    }
}

#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: Vec<Function>,
    by_name: HashMap<String, FunctionIndex>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_native(
        &mut self,
        name: &str,
        proc: NativeProc,
        arg_count: usize,
    ) -> Result<FunctionIndex, RuntimeError> {
        log::trace!("register native {name}/{arg_count}");
        self.insert(Function {
            name: name.to_owned(),
            kind: FunctionKind::Native(NativeFunction { proc, arg_count }),
        })
    }

    pub fn register_diksam(
        &mut self,
        executable: &Arc<Executable>,
        id: ExecutableId,
        index: usize,
    ) -> Result<FunctionIndex, RuntimeError> {
        let name = &executable.functions[index].name;
        log::trace!("register {name} from {}", executable.name);
        self.insert(Function {
            name: name.clone(),
            kind: FunctionKind::Diksam(DiksamFunction {
                executable: Arc::clone(executable),
                id,
                index,
            }),
        })
    }

    fn insert(
        &mut self,
        function: Function,
    ) -> Result<FunctionIndex, RuntimeError> {
        if self.by_name.contains_key(&function.name) {
            return Err(ErrorKind::FunctionMultipleDefine {
                name: function.name,
            }
            .into());
        }
        let index = FunctionIndex(self.functions.len());
        self.by_name.insert(function.name.clone(), index);
        self.functions.push(function);
        Ok(index)
    }

    pub fn resolve(&self, name: &str) -> Result<FunctionIndex, RuntimeError> {
        self.by_name.get(name).copied().ok_or_else(|| {
            ErrorKind::FunctionNotFound {
                name: name.to_owned(),
            }
            .into()
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// # Panics
    ///
    /// If `index` was not handed out by this table.
    #[inline]
    pub fn get(&self, index: FunctionIndex) -> &Function {
        &self.functions[index.0]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FunctionIndex, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionIndex(i), f))
    }
}
