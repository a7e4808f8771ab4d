//! Integration tests for the interpreter
//!
//! Exercises the VM together with its embedder-facing layers: interrupts
//! and time limits, debugger hooks, the compiled-tier bridge, non-syntactic
//! scopes and garbage collection under allocation pressure.

#[path = "../common/mod.rs"]
mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use bytecode_system::{Opcode, Script};
use common::{init_logging, make_function, script};
use core_types::{JsResult, Value};
use interpreter::{
    CallArgs, CompiledTier, DebugHooks, EngineOptions, FrameView, ResumeMode, ResumePoint, TierEntry, VmError, VM,
};

/// `for (;;) {}`
fn spin() -> Rc<Script> {
    Rc::new(script("spin", 0, &[Opcode::LoopHead, Opcode::Goto(0)]))
}

/// Counts slot 0 from 0 to `limit` and returns it.
fn counting_loop(name: &str, limit: i32) -> Script {
    script(
        name,
        1,
        &[
            Opcode::LoadInt(0),     // 0
            Opcode::SetLocal(0),    // 1
            Opcode::Pop,            // 2
            Opcode::LoopHead,       // 3
            Opcode::GetLocal(0),    // 4
            Opcode::Inc,            // 5
            Opcode::SetLocal(0),    // 6
            Opcode::LoadInt(limit), // 7
            Opcode::Lt,             // 8
            Opcode::IfNe(3),        // 9
            Opcode::GetLocal(0),    // 10
            Opcode::Return,         // 11
        ],
    )
}

// ----------------------------------------------------------------------
// Interrupts
// ----------------------------------------------------------------------

#[test]
fn test_termination_from_another_thread() {
    init_logging();
    let mut vm = VM::new();
    let handle = vm.interrupt_handle();
    let watchdog = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.request_termination();
    });
    assert!(matches!(vm.execute(spin()), Err(VmError::Terminated)));
    watchdog.join().unwrap();

    // The VM stays usable after a termination.
    assert_eq!(vm.execute(Rc::new(counting_loop("after", 3))).unwrap(), Value::Int32(3));
    assert_eq!(vm.call_stack_depth(), 0);
}

#[test]
fn test_time_limit_terminates_runaway_script() {
    let mut vm = VM::with_options(EngineOptions::default().with_time_limit_ms(Some(10)));
    assert!(matches!(vm.execute(spin()), Err(VmError::Terminated)));
}

#[test]
fn test_interrupt_callback_decides() {
    let calls = Rc::new(Cell::new(0));
    let mut vm = VM::new();
    let seen = calls.clone();
    vm.set_interrupt_callback(Box::new(move |_vm| {
        seen.set(seen.get() + 1);
        true
    }));
    vm.interrupt_handle().request_interrupt();
    assert_eq!(vm.execute(Rc::new(counting_loop("loop", 5))).unwrap(), Value::Int32(5));
    assert_eq!(calls.get(), 1);

    vm.set_interrupt_callback(Box::new(|_vm| false));
    vm.interrupt_handle().request_interrupt();
    assert!(matches!(vm.execute(spin()), Err(VmError::Terminated)));
}

#[test]
fn test_interrupt_without_callback_continues() {
    let mut vm = VM::new();
    vm.interrupt_handle().request_interrupt();
    assert_eq!(vm.execute(Rc::new(counting_loop("loop", 4))).unwrap(), Value::Int32(4));
    assert!(!vm.interrupt_handle().is_pending());
}

// ----------------------------------------------------------------------
// Debugger hooks
// ----------------------------------------------------------------------

#[derive(Default)]
struct Recorder {
    events: Rc<RefCell<Vec<String>>>,
    stepping: bool,
    breakpoint: Option<(String, usize, ResumeMode)>,
    replace_exception: Option<Value>,
    observed: Option<String>,
}

impl DebugHooks for Recorder {
    fn observes(&self, script_name: &str) -> bool {
        self.observed.as_deref().map_or(true, |name| name == script_name)
    }

    fn is_stepping(&self) -> bool {
        self.stepping
    }

    fn has_breakpoint(&self, script_name: &str, pc: usize) -> bool {
        matches!(&self.breakpoint, Some((name, at, _)) if name == script_name && *at == pc)
    }

    fn on_enter_frame(&mut self, frame: &FrameView) -> ResumeMode {
        self.events.borrow_mut().push(format!("enter {}", frame.script_name));
        ResumeMode::Continue
    }

    fn on_leave_frame(&mut self, frame: &FrameView, completion: &JsResult<Value>) -> ResumeMode {
        let outcome = if completion.is_ok() { "ok" } else { "abrupt" };
        self.events
            .borrow_mut()
            .push(format!("leave {} {}", frame.script_name, outcome));
        ResumeMode::Continue
    }

    fn on_step(&mut self, frame: &FrameView) -> ResumeMode {
        self.events.borrow_mut().push(format!("step {}", frame.pc));
        ResumeMode::Continue
    }

    fn on_breakpoint(&mut self, frame: &FrameView) -> ResumeMode {
        self.events.borrow_mut().push(format!("break {}", frame.pc));
        match &self.breakpoint {
            Some((_, _, mode)) => mode.clone(),
            None => ResumeMode::Continue,
        }
    }

    fn on_exception_unwind(&mut self, _frame: &FrameView, exception: &Value) -> ResumeMode {
        self.events.borrow_mut().push(format!("unwind {}", exception));
        match &self.replace_exception {
            Some(value) => ResumeMode::Throw(value.clone()),
            None => ResumeMode::Continue,
        }
    }

    fn on_native_call(&mut self, name: &str, _constructing: bool) -> ResumeMode {
        self.events.borrow_mut().push(format!("native {}", name));
        ResumeMode::Continue
    }
}

/// Top-level `main` calling `inner`, which returns 1.
fn main_calling_inner() -> Script {
    let inner = script("inner", 0, &[Opcode::LoadInt(1), Opcode::Return]);
    let mut main = Script::new("main");
    let index = main.add_function(inner);
    for op in [
        Opcode::Lambda(index),
        Opcode::LoadUndefined,
        Opcode::Call(0),
        Opcode::Return,
    ] {
        main.emit(op);
    }
    main
}

#[test]
fn test_hooks_see_frame_entry_and_exit() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut vm = VM::new();
    vm.set_debug_hooks(Box::new(Recorder {
        events: events.clone(),
        ..Recorder::default()
    }));
    assert_eq!(vm.execute(Rc::new(main_calling_inner())).unwrap(), Value::Int32(1));
    assert_eq!(
        *events.borrow(),
        vec!["enter main", "enter inner", "leave inner ok", "leave main ok"]
    );
}

#[test]
fn test_unobserved_scripts_are_not_debuggees() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut vm = VM::new();
    vm.set_debug_hooks(Box::new(Recorder {
        events: events.clone(),
        observed: Some("inner".to_string()),
        ..Recorder::default()
    }));
    vm.execute(Rc::new(main_calling_inner())).unwrap();
    assert_eq!(*events.borrow(), vec!["enter inner", "leave inner ok"]);
}

#[test]
fn test_stepping_visits_every_instruction() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut vm = VM::new();
    vm.set_debug_hooks(Box::new(Recorder {
        events: events.clone(),
        stepping: true,
        ..Recorder::default()
    }));
    let s = script(
        "main",
        0,
        &[Opcode::LoadInt(1), Opcode::LoadInt(2), Opcode::Add, Opcode::Return],
    );
    assert_eq!(vm.execute(Rc::new(s)).unwrap(), Value::Int32(3));
    let steps: Vec<String> = events
        .borrow()
        .iter()
        .filter(|e| e.starts_with("step"))
        .cloned()
        .collect();
    assert_eq!(steps, vec!["step 0", "step 1", "step 2", "step 3"]);
}

#[test]
fn test_breakpoint_can_throw() {
    let mut vm = VM::new();
    vm.set_debug_hooks(Box::new(Recorder {
        breakpoint: Some(("main".to_string(), 2, ResumeMode::Throw(Value::Int32(7)))),
        ..Recorder::default()
    }));
    let s = script(
        "main",
        0,
        &[Opcode::LoadInt(1), Opcode::LoadInt(2), Opcode::Add, Opcode::Return],
    );
    let err = vm.execute(Rc::new(s)).unwrap_err();
    assert_eq!(err.thrown_value(), Some(&Value::Int32(7)));
}

#[test]
fn test_breakpoint_can_force_return() {
    let mut vm = VM::new();
    vm.set_debug_hooks(Box::new(Recorder {
        breakpoint: Some(("main".to_string(), 1, ResumeMode::Return(Value::Int32(50)))),
        ..Recorder::default()
    }));
    let s = script(
        "main",
        0,
        &[Opcode::LoadInt(1), Opcode::LoadInt(2), Opcode::Add, Opcode::Return],
    );
    assert_eq!(vm.execute(Rc::new(s)).unwrap(), Value::Int32(50));
}

#[test]
fn test_debugger_statement_can_terminate() {
    // `debugger` reports through `on_breakpoint` without a breakpoint set.
    struct Stop;
    impl DebugHooks for Stop {
        fn on_breakpoint(&mut self, _frame: &FrameView) -> ResumeMode {
            ResumeMode::Terminate
        }
    }
    let mut vm = VM::new();
    vm.set_debug_hooks(Box::new(Stop));
    let s = script("main", 0, &[Opcode::Debugger, Opcode::LoadInt(1), Opcode::Return]);
    assert!(matches!(vm.execute(Rc::new(s)), Err(VmError::Terminated)));
}

#[test]
fn test_exception_unwind_hook_replaces_exception() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut vm = VM::new();
    vm.set_debug_hooks(Box::new(Recorder {
        events: events.clone(),
        replace_exception: Some(Value::Int32(99)),
        ..Recorder::default()
    }));
    let s = script("main", 0, &[Opcode::LoadInt(1), Opcode::Throw]);
    let err = vm.execute(Rc::new(s)).unwrap_err();
    assert_eq!(err.thrown_value(), Some(&Value::Int32(99)));
    assert!(events.borrow().contains(&"unwind 1".to_string()));
}

fn seven(_vm: &mut VM, _args: &CallArgs) -> JsResult<Value> {
    Ok(Value::Int32(7))
}

#[test]
fn test_native_calls_are_reported() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut vm = VM::new();
    let native = vm.new_native_function("seven", seven, 0);
    vm.set_global("seven", native).unwrap();
    vm.set_debug_hooks(Box::new(Recorder {
        events: events.clone(),
        ..Recorder::default()
    }));

    let mut s = Script::new("main");
    let name = s.add_atom("seven");
    for op in [
        Opcode::GetGName(name),
        Opcode::LoadUndefined,
        Opcode::Call(0),
        Opcode::Return,
    ] {
        s.emit(op);
    }
    assert_eq!(vm.execute(Rc::new(s)).unwrap(), Value::Int32(7));
    assert!(events.borrow().contains(&"native seven".to_string()));
}

#[test]
fn test_cleared_hooks_stop_reporting() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut vm = VM::new();
    vm.set_debug_hooks(Box::new(Recorder {
        events: events.clone(),
        ..Recorder::default()
    }));
    assert!(vm.clear_debug_hooks().is_some());
    vm.execute(Rc::new(main_calling_inner())).unwrap();
    assert!(events.borrow().is_empty());
}

// ----------------------------------------------------------------------
// Compiled tier
// ----------------------------------------------------------------------

/// Takes over `name` at function entry and returns 99.
struct ReturnsConstant {
    name: &'static str,
    entered: Rc<Cell<u32>>,
}

impl CompiledTier for ReturnsConstant {
    fn can_enter(&self, script: &Script, entry: TierEntry) -> bool {
        &*script.name == self.name && entry == TierEntry::FunctionEntry
    }

    fn enter(&mut self, _vm: &mut VM, _entry: TierEntry) -> ResumePoint {
        self.entered.set(self.entered.get() + 1);
        ResumePoint::Returned(Value::Int32(99))
    }
}

#[test]
fn test_tier_takes_over_once_warm() {
    let entered = Rc::new(Cell::new(0));
    let mut vm = VM::with_options(EngineOptions::default().with_jit_warmup_threshold(3));
    vm.set_compiled_tier(Box::new(ReturnsConstant {
        name: "hot",
        entered: entered.clone(),
    }));
    let hot = script("hot", 0, &[Opcode::LoadInt(1), Opcode::Return]);
    let id = hot.id;
    let f = make_function(&mut vm, hot);

    let results: Vec<Value> = (0..4)
        .map(|_| vm.call_function(&f, &Value::Undefined, &[]).unwrap())
        .collect();
    assert_eq!(
        results,
        vec![Value::Int32(1), Value::Int32(1), Value::Int32(99), Value::Int32(99)]
    );
    assert_eq!(entered.get(), 2);
    assert_eq!(vm.profile().counters(id).entries, 4);
}

#[test]
fn test_disabled_tier_is_never_consulted() {
    let entered = Rc::new(Cell::new(0));
    let options = EngineOptions::default()
        .with_jit_warmup_threshold(1)
        .with_disable_jit(true);
    let mut vm = VM::with_options(options);
    vm.set_compiled_tier(Box::new(ReturnsConstant {
        name: "hot",
        entered: entered.clone(),
    }));
    let hot = script("hot", 0, &[Opcode::LoadInt(1), Opcode::Return]);
    let f = make_function(&mut vm, hot);
    assert_eq!(vm.call_function(&f, &Value::Undefined, &[]).unwrap(), Value::Int32(1));
    assert_eq!(entered.get(), 0);
}

/// On-stack replacement at a loop head: the first entry fast-forwards the
/// loop counter, every entry hands control straight back.
struct SkipsAhead {
    entered: Rc<Cell<u32>>,
}

impl CompiledTier for SkipsAhead {
    fn can_enter(&self, _script: &Script, entry: TierEntry) -> bool {
        matches!(entry, TierEntry::LoopHead(_))
    }

    fn enter(&mut self, vm: &mut VM, entry: TierEntry) -> ResumePoint {
        let TierEntry::LoopHead(pc) = entry else {
            return ResumePoint::ReenterAt(0);
        };
        if self.entered.get() == 0 {
            assert_eq!(vm.frame_local(0, 0), Some(Value::Int32(4)));
            assert!(vm.set_frame_local(0, 0, Value::Int32(997)));
        }
        self.entered.set(self.entered.get() + 1);
        ResumePoint::ReenterAt(pc + 1)
    }
}

#[test]
fn test_loop_head_osr_resumes_interpreter() {
    let entered = Rc::new(Cell::new(0));
    let mut vm = VM::with_options(EngineOptions::default().with_jit_osr_threshold(5));
    vm.set_compiled_tier(Box::new(SkipsAhead {
        entered: entered.clone(),
    }));
    let result = vm.execute(Rc::new(counting_loop("loop", 1000))).unwrap();
    assert_eq!(result, Value::Int32(1000));
    // Back-edges 5 through 7 reach the tier: 997 -> 998 -> 999 -> 1000.
    assert_eq!(entered.get(), 3);
}

// ----------------------------------------------------------------------
// Non-syntactic scopes and the global object
// ----------------------------------------------------------------------

#[test]
fn test_execute_with_environment_resolves_scope_first() {
    let mut vm = VM::new();
    vm.set_global("x", Value::Int32(1)).unwrap();
    vm.set_global("y", Value::Int32(10)).unwrap();
    let scope = vm.new_object();
    vm.set_member(&scope, "x", Value::Int32(5)).unwrap();

    let mut s = Script::new("scoped");
    let x = s.add_atom("x");
    let y = s.add_atom("y");
    for op in [Opcode::GetName(x), Opcode::GetName(y), Opcode::Add, Opcode::Return] {
        s.emit(op);
    }
    assert_eq!(vm.execute_with_environment(Rc::new(s), &scope).unwrap(), Value::Int32(15));
}

#[test]
fn test_execute_with_environment_rejects_primitive_scope() {
    let mut vm = VM::new();
    let s = script("scoped", 0, &[Opcode::LoadUndefined, Opcode::Return]);
    let result = vm.execute_with_environment(Rc::new(s), &Value::Int32(1));
    assert!(matches!(result, Err(VmError::InvalidArgument(_))));
}

// ----------------------------------------------------------------------
// Garbage collection
// ----------------------------------------------------------------------

#[test]
fn test_collection_keeps_reachable_objects() {
    let mut vm = VM::with_options(EngineOptions::default().with_gc_threshold(64));
    let kept = vm.new_object();
    vm.set_member(&kept, "v", Value::Int32(7)).unwrap();
    vm.set_global("keep", kept).unwrap();

    let mut s = Script::new("churn");
    s.local_count = 1;
    let keep = s.add_atom("keep");
    let v = s.add_atom("v");
    for op in [
        Opcode::LoadInt(0),      // 0
        Opcode::SetLocal(0),     // 1
        Opcode::Pop,             // 2
        Opcode::LoopHead,        // 3
        Opcode::NewObject,       // 4
        Opcode::Pop,             // 5
        Opcode::GetLocal(0),     // 6
        Opcode::Inc,             // 7
        Opcode::SetLocal(0),     // 8
        Opcode::LoadInt(500),    // 9
        Opcode::Lt,              // 10
        Opcode::IfNe(3),         // 11
        Opcode::GetGName(keep),  // 12
        Opcode::GetProp(v),      // 13
        Opcode::Return,          // 14
    ] {
        s.emit(op);
    }
    assert_eq!(vm.execute(Rc::new(s)).unwrap(), Value::Int32(7));
    let stats = vm.gc_stats();
    assert!(stats.collections > 0);
    assert!(stats.total_freed > 0);
}
