//! Runtime substrate of the Diksam virtual machine: value stack, static
//! pool, function table, call frames and runtime errors, composed into a
//! [`VirtualMachine`] over the garbage collected [`heap`].

pub mod error;
pub mod executable;
pub mod frame;
pub mod function;
pub mod native;
pub mod ops;
pub mod stack;
pub mod statics;
pub mod vm;

pub use error::{ErrorKind, MessageArgument, RuntimeError, SourceLocation};
pub use executable::{
    Constant, Executable, ExecutableFunction, LineNumber, ValueType,
    VariableDecl,
};
pub use frame::{CallInfo, FrameStack};
pub use function::{
    DiksamFunction, Function, FunctionIndex, FunctionKind, FunctionTable,
    NativeFunction, NativeProc,
};
pub use stack::{STACK_ALLOC_SIZE, Stack};
pub use statics::Static;
pub use vm::{
    ExecutableId, FrameTransition, LoadedExecutable, VirtualMachine,
    VmSettings,
};
