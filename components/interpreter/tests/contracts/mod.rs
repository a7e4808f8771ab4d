//! Contract tests for interpreter API
//!
//! These tests pin down the embedder-facing surface: construction,
//! options, error reporting and the handles that cross threads.

#[path = "../common/mod.rs"]
mod common;

use std::rc::Rc;

use bytecode_system::Opcode;
use common::{call_method, script};
use core_types::Value;
use interpreter::options::{DEFAULT_JIT_OSR_THRESHOLD, DEFAULT_MAX_RECURSION_DEPTH};
use interpreter::{EngineOptions, InterruptHandle, VmError, VM};
use memory_manager::SharedArrayRawBuffer;

/// Test VM::default() behaves like VM::new()
#[test]
fn test_vm_default_contract() {
    let mut vm = VM::default();
    assert_eq!(vm.options(), &EngineOptions::default());
    let s = script("main", 0, &[Opcode::LoadInt(42), Opcode::Return]);
    assert_eq!(vm.execute(Rc::new(s)).unwrap(), Value::Int32(42));
}

/// Test execution leaves no frames behind, whatever the outcome
#[test]
fn test_execute_unwinds_frames_contract() {
    let mut vm = VM::new();
    assert_eq!(vm.call_stack_depth(), 0);
    let ok = script("ok", 0, &[Opcode::LoadInt(1), Opcode::Return]);
    vm.execute(Rc::new(ok)).unwrap();
    assert_eq!(vm.call_stack_depth(), 0);
    let bad = script("bad", 0, &[Opcode::LoadNull, Opcode::Throw]);
    vm.execute(Rc::new(bad)).unwrap_err();
    assert_eq!(vm.call_stack_depth(), 0);
}

/// Test frame_local reports nothing without a running frame
#[test]
fn test_frame_local_without_frames_contract() {
    let mut vm = VM::new();
    assert_eq!(vm.frame_local(0, 0), None);
    assert!(!vm.set_frame_local(0, 0, Value::Int32(1)));
}

/// Test get_global returns undefined for a missing name
#[test]
fn test_get_global_missing_contract() {
    let mut vm = VM::new();
    assert_eq!(vm.get_global("nonexistent").unwrap(), Value::Undefined);
}

/// Test set_global is visible to scripts
#[test]
fn test_set_global_contract() {
    let mut vm = VM::new();
    vm.set_global("answer", Value::Int32(100)).unwrap();
    let mut s = bytecode_system::Script::new("main");
    let answer = s.add_atom("answer");
    s.emit(Opcode::GetGName(answer));
    s.emit(Opcode::Return);
    assert_eq!(vm.execute(Rc::new(s)).unwrap(), Value::Int32(100));
}

/// Test options survive a JSON round trip and fill in defaults
#[test]
fn test_options_json_contract() {
    let options = EngineOptions::default()
        .with_strict_mode(true)
        .with_time_limit_ms(Some(250))
        .with_jit_warmup_threshold(7);
    let json = options.to_json().unwrap();
    assert_eq!(EngineOptions::from_json(&json).unwrap(), options);

    let partial = EngineOptions::from_json(r#"{"werror": true}"#).unwrap();
    assert!(partial.werror);
    assert_eq!(partial.max_recursion_depth, DEFAULT_MAX_RECURSION_DEPTH);
    assert_eq!(partial.jit_osr_threshold, DEFAULT_JIT_OSR_THRESHOLD);
}

/// Test unknown option names are rejected
#[test]
fn test_options_reject_unknown_fields_contract() {
    let result = EngineOptions::from_json(r#"{"turbo": true}"#);
    assert!(matches!(result, Err(VmError::Options(_))));
}

/// Test set_options replaces the active options
#[test]
fn test_set_options_contract() {
    let mut vm = VM::new();
    vm.set_options(EngineOptions::default().with_max_recursion_depth(5));
    assert_eq!(vm.options().max_recursion_depth, 5);
}

/// Test VmError renders a readable message
#[test]
fn test_vm_error_display_contract() {
    assert_eq!(VmError::Terminated.to_string(), "script execution terminated");
    assert_eq!(
        VmError::InvalidArgument("scope".to_string()).to_string(),
        "invalid argument: scope"
    );

    let mut vm = VM::new();
    let s = script("main", 0, &[Opcode::LoadInt(3), Opcode::Throw]);
    let err = vm.execute(Rc::new(s)).unwrap_err();
    assert!(err.to_string().contains("uncaught exception: 3"));
}

/// Test InterruptHandle can be sent to other threads
#[test]
fn test_interrupt_handle_is_thread_safe_contract() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<InterruptHandle>();

    let vm = VM::new();
    let handle = vm.interrupt_handle();
    assert!(!handle.is_pending());
    handle.request_interrupt();
    assert!(vm.interrupt_handle().is_pending());
}

/// Test two VMs can wrap the same shared memory
#[test]
fn test_shared_buffer_across_vms_contract() {
    let raw = SharedArrayRawBuffer::allocate(16).unwrap();
    let mut first = VM::new();
    let mut second = VM::new();
    let a = first.wrap_shared_buffer(raw.try_clone().unwrap());
    let b = second.wrap_shared_buffer(raw.try_clone().unwrap());

    assert_eq!(call_method(&mut first, &a, "byteLength", &[]).unwrap(), Value::Int32(16));
    assert_eq!(call_method(&mut second, &b, "byteLength", &[]).unwrap(), Value::Int32(16));
    assert_eq!(raw.refcount(), 3);
}

/// Test host helpers reject values of the wrong kind
#[test]
fn test_invalid_arguments_contract() {
    let mut vm = VM::new();
    let object = vm.new_object();
    assert!(matches!(
        vm.new_proxy(&Value::Int32(1), &object),
        Err(VmError::InvalidArgument(_))
    ));
    assert!(matches!(vm.revoke_proxy(&object), Err(VmError::InvalidArgument(_))));
}

/// Test a revoked proxy throws on use
#[test]
fn test_revoked_proxy_contract() {
    let mut vm = VM::new();
    let target = vm.new_object();
    let handler = vm.new_object();
    let proxy = vm.new_proxy(&target, &handler).unwrap();
    vm.revoke_proxy(&proxy).unwrap();
    let err = vm.get_member(&proxy, "x").unwrap_err();
    assert!(err.js_error().is_some());
}
