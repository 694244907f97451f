use std::io::{self, Write};

use object::Value;

use crate::error::RuntimeError;
use crate::function::NativeProc;
use crate::ops::NULL_STRING;
use crate::vm::VirtualMachine;

#[derive(Clone, Copy)]
pub struct NativeDesc {
    pub name: &'static str,
    pub arity: usize,
    pub func: NativeProc,
}

impl NativeDesc {
    pub const fn new(name: &'static str, arity: usize, func: NativeProc) -> Self {
        Self { name, arity, func }
    }
}

/// Natives every VM starts with.
pub fn default_natives() -> Vec<NativeDesc> {
    vec![NativeDesc::new("print", 1, print)]
}

/// `void print(string str)`
pub fn print(vm: &mut VirtualMachine, args: &[Value]) -> Result<Value, RuntimeError> {
    let text = vm.string_text(args[0])?.unwrap_or(NULL_STRING);
    let mut stdout = io::stdout().lock();
    // a closed stdout is not a script error
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
    Ok(Value::Int(0))
}
