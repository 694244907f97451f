use clap::Parser as ClapParser;
use std::{process, sync::Arc};

use dvm::{
    Constant, Executable, ExecutableFunction, ExecutableId, LineNumber,
    RuntimeError, ValueType, VariableDecl, VirtualMachine, VmSettings,
};
use heap::HeapSettings;
use object::Value;

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Slots added whenever the value stack grows
    #[arg(long, default_value_t = dvm::STACK_ALLOC_SIZE)]
    stack_alloc_size: usize,

    /// Bytes allocated before the first collection
    #[arg(long, default_value_t = heap::HEAP_THRESHOLD_SIZE)]
    heap_threshold: usize,

    /// Number of unreachable strings to allocate before collecting
    #[arg(long, default_value_t = 1000)]
    garbage: usize,

    /// Log collections and linking at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let settings = VmSettings {
        heap: HeapSettings {
            initial_threshold: cli.heap_threshold,
            min_threshold: cli.heap_threshold,
            ..HeapSettings::default()
        },
        stack_alloc_size: cli.stack_alloc_size,
    };
    if let Err(err) = settings.validate() {
        eprintln!("Invalid settings: {err}");
        process::exit(1);
    }

    if let Err(err) = run(settings, cli.garbage) {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn demo_executable() -> Executable {
    let mut greet = ExecutableFunction::new(
        "greet",
        vec![VariableDecl::new("name", ValueType::String)],
        vec![VariableDecl::new("message", ValueType::String)],
    );
    greet.need_stack_size = 2;
    greet.line_numbers = vec![LineNumber { line_number: 4, start_pc: 0, pc_count: 8 }];

    Executable {
        name: "demo.dkm".into(),
        functions: vec![
            ExecutableFunction::declaration(
                "print",
                vec![VariableDecl::new("str", ValueType::String)],
            ),
            greet,
        ],
        constants: vec![
            Constant::String(Arc::from("hello, ")),
            Constant::String(Arc::from("world\n")),
        ],
        globals: vec![VariableDecl::new("greeting", ValueType::String)],
        line_numbers: vec![LineNumber { line_number: 1, start_pc: 0, pc_count: 16 }],
        need_stack_size: 4,
        ..Executable::default()
    }
}

/// Performs what the compiled `greet` body would: builds the message from
/// the global greeting and its argument, prints it and returns.
fn greet_body(vm: &mut VirtualMachine, id: ExecutableId) -> Result<(), RuntimeError> {
    let name = vm.local(0);
    let greeting = vm.global(0);
    let message = vm.chain_string(greeting, name)?;
    vm.set_local(1, message);

    vm.stack.push(message);
    vm.invoke(vm.function_index(id, 0))?;
    vm.stack.pop();

    vm.stack.push(Value::Int(0));
    vm.return_from_function();
    Ok(())
}

fn run(settings: VmSettings, garbage: usize) -> Result<(), RuntimeError> {
    let mut vm = VirtualMachine::new(settings);
    let id = vm.add_executable(Arc::new(demo_executable()))?;
    vm.start(id);

    let greeting = vm.constant(id, 0);
    vm.set_global(0, greeting);

    let argument = vm.constant(id, 1);
    vm.stack.push(argument);
    vm.pc = 2;
    let sp = vm.stack.stack_pointer();
    vm.invoke(vm.function_index(id, 1))?;
    greet_body(&mut vm, id)?;
    vm.stack.pop();
    debug_assert_eq!(vm.stack.stack_pointer(), sp - 1);

    for n in 0..garbage {
        vm.int_to_string(n as i64);
    }
    let before = vm.heap.object_count();
    let stats = vm.garbage_collect();

    println!("objects before collection: {before}");
    println!("freed objects:             {}", stats.freed_objects);
    println!("freed bytes:               {}", stats.freed_bytes);
    println!("live objects:              {}", stats.live_objects);
    println!("live bytes:                {}", stats.live_bytes);
    println!("next threshold:            {}", stats.threshold);
    println!("collections:               {}", vm.heap.collections());
    Ok(())
}
