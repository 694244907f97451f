//! The virtual machine instance: owner of every runtime structure.

use std::collections::HashMap;
use std::sync::Arc;

use heap::{GcStats, Heap, HeapSettings, RootProvider};
use object::{DvmString, HeapObject, ObjectRef, Value, Visitable};

use crate::error::{ErrorKind, RuntimeError, SourceLocation};
use crate::executable::{Constant, Executable};
use crate::frame::{CallInfo, FrameStack};
use crate::function::{
    Function, FunctionIndex, FunctionKind, FunctionTable, NativeFunction,
    NativeProc,
};
use crate::native;
use crate::stack::{STACK_ALLOC_SIZE, Stack};
use crate::statics::Static;

#[derive(Debug, Clone)]
pub struct VmSettings {
    pub heap: HeapSettings,
    /// Slots added whenever the stack has to grow.
    pub stack_alloc_size: usize,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            heap: HeapSettings::default(),
            stack_alloc_size: STACK_ALLOC_SIZE,
        }
    }
}

impl VmSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.stack_alloc_size == 0 {
            return Err("stack_alloc_size must be > 0");
        }
        self.heap.validate()
    }
}

/// Position of a linked executable inside its VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutableId(pub usize);

/// An executable after linking.
#[derive(Debug)]
pub struct LoadedExecutable {
    pub executable: Arc<Executable>,
    /// Interned literal per constant, `None` for non-string constants.
    literals: Vec<Option<ObjectRef>>,
    /// VM function for each entry of `executable.functions`.
    function_map: Vec<FunctionIndex>,
}

impl LoadedExecutable {
    pub fn literals(&self) -> &[Option<ObjectRef>] {
        &self.literals
    }

    pub fn function_map(&self) -> &[FunctionIndex] {
        &self.function_map
    }
}

/// Where control went after a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTransition {
    Caller(FunctionIndex),
    TopLevel,
}

/// Everything the collector treats as always reachable.
struct Roots<'a> {
    stack: &'a Stack,
    statics: &'a Static,
    executables: &'a [LoadedExecutable],
}

impl RootProvider for Roots<'_> {
    fn visit_roots(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        self.stack.visit_edges(visitor);
        self.statics.visit_edges(visitor);
        for loaded in self.executables {
            loaded.literals.iter().flatten().for_each(|&r| visitor(r));
        }
    }
}

pub struct VirtualMachine {
    pub stack: Stack,
    pub heap: Heap,
    pub statics: Static,
    pub functions: FunctionTable,
    pub frames: FrameStack,
    /// Program counter inside the current function or top-level code.
    pub pc: usize,
    /// Stack index of the current frame's first argument.
    pub base: usize,
    executables: Vec<LoadedExecutable>,
    /// The executable whose globals sized the static pool.
    statics_owner: Option<ExecutableId>,
    entry_executable: Option<ExecutableId>,
    current_executable: Option<ExecutableId>,
    current_function: Option<FunctionIndex>,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self::new(VmSettings::default())
    }
}

impl VirtualMachine {
    pub fn new(settings: VmSettings) -> Self {
        settings.validate().expect("invalid vm settings");
        let mut vm = Self {
            stack: Stack::new(settings.stack_alloc_size),
            heap: Heap::new(settings.heap),
            statics: Static::default(),
            functions: FunctionTable::new(),
            frames: FrameStack::new(),
            pc: 0,
            base: 0,
            executables: Vec::new(),
            statics_owner: None,
            entry_executable: None,
            current_executable: None,
            current_function: None,
        };

        for desc in native::default_natives() {
            let registered =
                vm.functions.register_native(desc.name, desc.func, desc.arity);
            debug_assert!(registered.is_ok(), "duplicate native {}", desc.name);
        }
        vm
    }

    pub fn register_native(
        &mut self,
        name: &str,
        proc: NativeProc,
        arg_count: usize,
    ) -> Result<FunctionIndex, RuntimeError> {
        self.functions.register_native(name, proc, arg_count)
    }

    pub fn resolve(&self, name: &str) -> Result<FunctionIndex, RuntimeError> {
        self.functions.resolve(name)
    }

    // ── Linking ───────────────────────────────────────────────────────

    /// Links an executable into this VM.
    ///
    /// Every implemented function is registered, every declared function
    /// must resolve to something with the same parameter count, and string
    /// constants are interned as literals. All checks run before anything
    /// is registered, so a failed link leaves the VM unchanged.
    ///
    /// The static pool is built once, from the executable that declares
    /// globals.
    ///
    /// # Panics
    ///
    /// If the static pool was already built by another executable and this
    /// one declares globals too.
    pub fn add_executable(
        &mut self,
        executable: Arc<Executable>,
    ) -> Result<ExecutableId, RuntimeError> {
        self.check_link(&executable)?;
        assert!(
            executable.globals.is_empty() || self.statics_owner.is_none(),
            "static pool already built, {} cannot add globals",
            executable.name
        );

        let id = ExecutableId(self.executables.len());

        for (index, function) in executable.functions.iter().enumerate() {
            if function.is_implemented {
                self.functions.register_diksam(&executable, id, index)?;
            }
        }

        let function_map = executable
            .functions
            .iter()
            .map(|declared| self.functions.resolve(&declared.name))
            .collect::<Result<Vec<_>, _>>()?;

        if !executable.globals.is_empty() {
            self.statics = Static::new(&executable.globals);
            self.statics_owner = Some(id);
        }

        self.executables.push(LoadedExecutable {
            executable: Arc::clone(&executable),
            literals: vec![None; executable.constants.len()],
            function_map,
        });

        // interned one at a time; earlier literals are already rooted
        for (index, constant) in executable.constants.iter().enumerate() {
            if let Constant::String(text) = constant {
                let r = self.allocate(HeapObject::string(DvmString::literal(
                    Arc::clone(text),
                )));
                self.executables[id.0].literals[index] = Some(r);
            }
        }

        log::debug!(
            "linked {}: {} functions, {} globals, {} constants",
            executable.name,
            executable.functions.len(),
            executable.globals.len(),
            executable.constants.len()
        );
        Ok(id)
    }

    /// Name clashes, unresolved declarations and parameter count
    /// mismatches, judged against the table plus the functions
    /// `executable` itself implements.
    fn check_link(&self, executable: &Executable) -> Result<(), RuntimeError> {
        let mut implemented: HashMap<&str, usize> = HashMap::new();
        for function in executable.functions.iter().filter(|f| f.is_implemented) {
            if self.functions.contains(&function.name)
                || implemented
                    .insert(&function.name, function.parameter_count())
                    .is_some()
            {
                return Err(ErrorKind::FunctionMultipleDefine {
                    name: function.name.clone(),
                }
                .into());
            }
        }

        for declared in &executable.functions {
            let parameters = match implemented.get(declared.name.as_str()) {
                Some(&count) => count,
                None => {
                    let index = self.functions.resolve(&declared.name)?;
                    self.functions.get(index).parameter_count()
                }
            };
            if parameters != declared.parameter_count() {
                return Err(ErrorKind::FunctionNotFound {
                    name: declared.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn executable(&self, id: ExecutableId) -> &LoadedExecutable {
        &self.executables[id.0]
    }

    pub fn executables(&self) -> &[LoadedExecutable] {
        &self.executables
    }

    /// Value of constant `index` of executable `id`. String constants
    /// yield their interned literal.
    pub fn constant(&self, id: ExecutableId, index: usize) -> Value {
        let loaded = &self.executables[id.0];
        match &loaded.executable.constants[index] {
            Constant::Int(n) => Value::Int(*n),
            Constant::Double(d) => Value::Double(*d),
            Constant::String(_) => Value::Object(loaded.literals[index]),
        }
    }

    /// VM function for function `index` of executable `id`.
    pub fn function_index(&self, id: ExecutableId, index: usize) -> FunctionIndex {
        self.executables[id.0].function_map[index]
    }

    #[inline]
    pub fn global(&self, index: usize) -> Value {
        self.statics.get(index)
    }

    #[inline]
    pub fn set_global(&mut self, index: usize, value: Value) {
        self.statics.set(index, value);
    }

    /// Enters the top-level code of `id`.
    pub fn start(&mut self, id: ExecutableId) {
        let need = self.executables[id.0].executable.need_stack_size;
        self.stack.reserve(need);
        self.entry_executable = Some(id);
        self.current_executable = Some(id);
        self.current_function = None;
        self.pc = 0;
        self.base = 0;
    }

    #[inline]
    pub fn current_executable(&self) -> Option<ExecutableId> {
        self.current_executable
    }

    /// `None` while running top-level code.
    #[inline]
    pub fn current_function(&self) -> Option<FunctionIndex> {
        self.current_function
    }

    // ── Frames ────────────────────────────────────────────────────────

    /// Calls `index` with its arguments already pushed.
    ///
    /// A native runs to completion and leaves its result in place of the
    /// arguments. A compiled function gets a new frame whose base is its
    /// first argument; execution continues at its pc 0.
    pub fn invoke(&mut self, index: FunctionIndex) -> Result<(), RuntimeError> {
        let function = self.functions.get(index);
        let (id, parameters, locals, need) = match &function.kind {
            FunctionKind::Native(native) => {
                let native = *native;
                return self.call_native(native);
            }
            FunctionKind::Diksam(diksam) => {
                let definition = diksam.definition();
                let locals: Vec<Value> = definition
                    .local_variables
                    .iter()
                    .map(|decl| decl.ty.initial_value())
                    .collect();
                (
                    diksam.id,
                    definition.parameter_count(),
                    locals,
                    definition.need_stack_size,
                )
            }
        };
        log::trace!("invoke {} at pc {}", function.name, self.pc);

        let sp = self.stack.stack_pointer();
        assert!(parameters <= sp, "call with missing arguments");
        self.stack.reserve(locals.len() + need);

        self.frames.push(CallInfo {
            caller: self.current_function,
            caller_address: self.pc,
            base: self.base,
        });
        self.base = sp - parameters;
        for value in locals {
            self.stack.push(value);
        }

        self.current_function = Some(index);
        self.current_executable = Some(id);
        self.pc = 0;
        Ok(())
    }

    fn call_native(
        &mut self,
        native: NativeFunction,
    ) -> Result<(), RuntimeError> {
        let sp = self.stack.stack_pointer();
        assert!(native.arg_count <= sp, "call with missing arguments");
        // arguments stay on the stack so they remain rooted
        let args = self.stack.live()[sp - native.arg_count..].to_vec();
        let result = (native.proc)(self, &args)?;
        self.stack.truncate(sp - native.arg_count);
        self.stack.push(result);
        Ok(())
    }

    /// Leaves the current compiled function.
    ///
    /// The value on top of the stack is the result; it replaces the
    /// callee's whole frame, and the caller resumes at its saved address.
    ///
    /// # Panics
    ///
    /// When no interpreted call is active, or when nothing was pushed above
    /// the callee's arguments and locals.
    pub fn return_from_function(&mut self) -> FrameTransition {
        let Some(frame) = self.frames.pop() else {
            panic!("return outside of a function");
        };
        let callee = self.current_function.map(|f| &self.functions.get(f).kind);
        let frame_size = match callee {
            Some(FunctionKind::Diksam(diksam)) => {
                let definition = diksam.definition();
                definition.parameter_count() + definition.local_variables.len()
            }
            _ => 0,
        };
        let sp = self.stack.stack_pointer();
        assert!(sp > self.base + frame_size, "return without a result");
        let result = self.stack.live()[sp - 1];

        self.stack.truncate(self.base);
        self.stack.push(result);

        self.current_function = frame.caller;
        self.current_executable = match frame.caller {
            Some(caller) => match &self.functions.get(caller).kind {
                FunctionKind::Diksam(diksam) => Some(diksam.id),
                FunctionKind::Native(_) => self.entry_executable,
            },
            None => self.entry_executable,
        };
        self.base = frame.base;
        self.pc = frame.caller_address;

        match frame.caller {
            Some(caller) => FrameTransition::Caller(caller),
            None => FrameTransition::TopLevel,
        }
    }

    /// Argument or local `index` of the current frame.
    #[inline]
    pub fn local(&self, index: usize) -> Value {
        self.stack.live()[self.base + index]
    }

    #[inline]
    pub fn set_local(&mut self, index: usize, value: Value) {
        self.stack.set(self.base + index, value);
    }

    // ── Errors ────────────────────────────────────────────────────────

    /// Builds an error attributed to the current position.
    pub fn error(&self, kind: ErrorKind) -> RuntimeError {
        RuntimeError::new(kind, self.location())
    }

    pub fn location(&self) -> Option<SourceLocation> {
        let id = self.current_executable?;
        let current = self.current_function.map(|f| self.functions.get(f));

        Some(match current {
            Some(Function {
                name,
                kind: FunctionKind::Diksam(diksam),
            }) => SourceLocation {
                executable: diksam.executable.name.clone(),
                function: Some(name.clone()),
                pc: self.pc,
                line: diksam.definition().line_number_for(self.pc),
            },
            _ => {
                let executable = &self.executables[id.0].executable;
                SourceLocation {
                    executable: executable.name.clone(),
                    function: None,
                    pc: self.pc,
                    line: executable.line_number_for(self.pc),
                }
            }
        })
    }

    // ── Heap ──────────────────────────────────────────────────────────

    /// Places `object` on the heap, collecting first if the threshold has
    /// been passed.
    ///
    /// Only the stack, statics and literal tables are roots: a reference
    /// held in a Rust local across this call may be invalidated.
    pub fn allocate(&mut self, object: HeapObject) -> ObjectRef {
        let roots = Roots {
            stack: &self.stack,
            statics: &self.statics,
            executables: &self.executables,
        };
        self.heap.allocate(object, &roots)
    }

    /// Mutates the object behind `r` in place. Growth counts against the
    /// threshold like an allocation does, with the same roots.
    pub fn update_object<R>(
        &mut self,
        r: ObjectRef,
        f: impl FnOnce(&mut HeapObject) -> R,
    ) -> Option<R> {
        let roots = Roots {
            stack: &self.stack,
            statics: &self.statics,
            executables: &self.executables,
        };
        self.heap.update(r, &roots, f)
    }

    pub fn garbage_collect(&mut self) -> GcStats {
        let roots = Roots {
            stack: &self.stack,
            statics: &self.statics,
            executables: &self.executables,
        };
        self.heap.collect(&roots)
    }

    /// The object behind `value`, or `NullPointer` for null, scalar and
    /// stale references.
    pub fn object(&self, value: Value) -> Result<&HeapObject, RuntimeError> {
        value
            .as_object()
            .and_then(|r| self.heap.get(r))
            .ok_or_else(|| self.error(ErrorKind::NullPointer))
    }
}
