//! Tests for the Script container and builder API

use bytecode_system::{
    BindingKind, BindingLocation, Constant, Opcode, ScopeData, ScopeKind, Script,
};
use core_types::{SourcePosition, SourceSpan, Value};
use num_bigint::BigInt;

#[test]
fn test_script_creation() {
    let script = Script::new("main");
    assert_eq!(&*script.name, "main");
    assert_eq!(script.instruction_count(), 0);
    assert!(script.constants.is_empty());
    assert_eq!(script.local_count, 0);
    assert!(!script.flags.strict);
}

#[test]
fn test_emit_returns_instruction_index() {
    let mut script = Script::new("f");
    assert_eq!(script.emit(Opcode::LoadNull), 0);
    assert_eq!(script.emit(Opcode::LoadTrue), 1);
    assert_eq!(script.current_offset(), 2);
}

#[test]
fn test_emit_with_position_is_recorded() {
    let mut script = Script::new("f");
    let pos = SourcePosition::new(3, 7, 40);
    let at = script.emit_with_position(Opcode::Throw, pos);
    assert_eq!(script.position_at(at), Some(pos));
    assert_eq!(script.position_at(at + 1), None);
}

#[test]
fn test_constant_pool_kinds() {
    let mut script = Script::new("f");
    let n = script.add_constant(1.5);
    let s = script.add_constant("hello");
    let b = script.add_constant(BigInt::from(10));
    assert_eq!((n, s, b), (0, 1, 2));
    assert_eq!(script.constants[1].to_value(), Value::from("hello"));
    assert!(matches!(script.constants[2], Constant::BigInt(_)));
}

#[test]
fn test_nested_functions_are_shared() {
    let mut outer = Script::new("outer");
    let mut inner = Script::new("inner");
    inner.arg_count = 2;
    let idx = outer.add_function(inner);
    assert_eq!(outer.functions[idx as usize].arg_count, 2);
}

#[test]
fn test_resume_offsets_and_spans() {
    let mut script = Script::new("f");
    assert_eq!(script.add_resume_offset(12), 0);
    assert_eq!(script.add_resume_offset(20), 1);
    assert_eq!(script.resume_offsets, vec![12, 20]);
    let span = SourceSpan::new(0, 30, 1, 1);
    let idx = script.add_span(span);
    assert_eq!(script.spans[idx as usize], span);
}

#[test]
fn test_constructor_predicate() {
    let mut script = Script::new("f");
    assert!(script.is_constructor());
    script.flags.arrow = true;
    assert!(!script.is_constructor());
    let mut gen = Script::new("g");
    gen.flags.generator = true;
    assert!(!gen.is_constructor());
}

#[test]
fn test_scope_chain_queries() {
    let mut script = Script::new("f");
    let body = script.add_scope(
        ScopeData::new(ScopeKind::Function, None)
            .with_binding("a", BindingKind::FormalParameter, BindingLocation::Argument(0))
            .with_binding("b", BindingKind::Var, BindingLocation::Frame(0)),
    );
    let block = script.add_scope(
        ScopeData::new(ScopeKind::Lexical, Some(body)).with_binding(
            "c",
            BindingKind::Const,
            BindingLocation::Environment(0),
        ),
    );
    let inner = script.add_scope(ScopeData::new(ScopeKind::Catch, Some(block)));
    script.body_scope = Some(body);
    script.add_scope_note(block, 2, 10);
    script.add_scope_note(inner, 5, 2);

    assert_eq!(script.innermost_scope(1), Some(body));
    assert_eq!(script.innermost_scope(3), Some(block));
    assert_eq!(script.innermost_scope(6), Some(inner));
    assert!(script.scope_encloses(body, inner));
    assert!(script.scope_encloses(block, block));
    assert_eq!(script.local_name(0).as_deref(), Some("b"));
}
