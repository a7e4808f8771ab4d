//! Shared helpers for the interpreter test targets

#![allow(dead_code)]

use std::rc::Rc;

use bytecode_system::{Opcode, Script};
use core_types::{ErrorKind, Value};
use interpreter::{VmError, VM};

/// Route `log` output through the test harness; `RUST_LOG` picks the level.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A script made of `ops`, with `locals` frame slots.
pub fn script(name: &str, locals: u32, ops: &[Opcode]) -> Script {
    let mut script = Script::new(name);
    script.local_count = locals;
    script.max_stack_depth = 8;
    for op in ops {
        script.emit(*op);
    }
    script
}

/// Run `script` on a fresh VM.
pub fn run(script: Script) -> Result<Value, VmError> {
    init_logging();
    let mut vm = VM::new();
    vm.execute(Rc::new(script))
}

/// Kind and message of an uncaught error object.
pub fn uncaught(err: &VmError) -> (ErrorKind, String) {
    match err.js_error() {
        Some(error) => (error.kind, error.message.clone()),
        None => panic!("expected an uncaught exception, got {:?}", err),
    }
}

/// `result.value` and `result.done` of an iterator result object.
pub fn iter_result(vm: &mut VM, result: &Value) -> (Value, bool) {
    let value = vm.get_member(result, "value").unwrap();
    let done = vm.get_member(result, "done").unwrap();
    (value, done == Value::Boolean(true))
}

/// A function object for `function` created by a throwaway top-level script.
pub fn make_function(vm: &mut VM, function: Script) -> Value {
    let mut main = Script::new("make");
    let index = main.add_function(function);
    main.emit(Opcode::Lambda(index));
    main.emit(Opcode::Return);
    vm.execute(Rc::new(main)).unwrap()
}

/// `receiver[method](...args)` from the host.
pub fn call_method(vm: &mut VM, receiver: &Value, method: &str, args: &[Value]) -> Result<Value, VmError> {
    let function = vm.get_member(receiver, method)?;
    vm.call_function(&function, receiver, args)
}
