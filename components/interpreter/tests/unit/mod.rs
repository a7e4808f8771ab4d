//! Unit tests for interpreter components

#[path = "../common/mod.rs"]
mod common;

use std::rc::Rc;

use bytecode_system::{Opcode, Script};
use common::{run, script, uncaught};
use core_types::{ErrorKind, Value};
use interpreter::{EngineOptions, VM};
use num_bigint::BigInt;

// ============================================================================
// Constants and stack shuffles
// ============================================================================

#[test]
fn test_load_constants() {
    let mut s = Script::new("main");
    let idx = s.add_constant(3.5);
    s.emit(Opcode::LoadConstant(idx));
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::Double(3.5));

    let mut s = Script::new("main");
    let idx = s.add_constant("hello");
    s.emit(Opcode::LoadConstant(idx));
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::from("hello"));
}

#[test]
fn test_load_literals() {
    assert_eq!(run(script("main", 0, &[Opcode::LoadNull, Opcode::Return])).unwrap(), Value::Null);
    assert_eq!(run(script("main", 0, &[Opcode::LoadTrue, Opcode::Return])).unwrap(), Value::Boolean(true));
    assert_eq!(run(script("main", 0, &[Opcode::LoadUndefined, Opcode::Return])).unwrap(), Value::Undefined);
}

#[test]
fn test_dup2_and_swap() {
    // [1, 2] -> [1, 2, 1, 2] -> [1, 2, 2, 1]
    let s = script(
        "main",
        0,
        &[
            Opcode::LoadInt(1),
            Opcode::LoadInt(2),
            Opcode::Dup2,
            Opcode::Swap,
            Opcode::Sub, // 2 - 1
            Opcode::Add, // 2 + 1
            Opcode::Add, // 1 + 3
            Opcode::Return,
        ],
    );
    assert_eq!(run(s).unwrap(), Value::Int32(4));
}

#[test]
fn test_dup_at_and_pop_n() {
    let s = script(
        "main",
        0,
        &[
            Opcode::LoadInt(7),
            Opcode::LoadInt(8),
            Opcode::LoadInt(9),
            Opcode::DupAt(1),
            Opcode::Swap,
            Opcode::PopN(1),
            Opcode::Return,
        ],
    );
    assert_eq!(run(s).unwrap(), Value::Int32(8));
}

// ============================================================================
// Arithmetic and coercion
// ============================================================================

#[test]
fn test_int32_overflow_widens_to_double() {
    let s = script(
        "main",
        0,
        &[Opcode::LoadInt(i32::MAX), Opcode::LoadInt(1), Opcode::Add, Opcode::Return],
    );
    assert_eq!(run(s).unwrap(), Value::Double(2147483648.0));
}

#[test]
fn test_string_concatenation_coerces_numbers() {
    let mut s = Script::new("main");
    let a = s.add_constant("a");
    s.emit(Opcode::LoadConstant(a));
    s.emit(Opcode::LoadInt(1));
    s.emit(Opcode::Add);
    s.emit(Opcode::LoadConstant(a));
    s.emit(Opcode::Add);
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::from("a1a"));
}

#[test]
fn test_division_produces_doubles() {
    let s = script("main", 0, &[Opcode::LoadInt(7), Opcode::LoadInt(2), Opcode::Div, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Double(3.5));

    let s = script("main", 0, &[Opcode::LoadInt(6), Opcode::LoadInt(3), Opcode::Div, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Int32(2));
}

#[test]
fn test_division_by_zero_is_infinite() {
    let s = script("main", 0, &[Opcode::LoadInt(1), Opcode::LoadInt(0), Opcode::Div, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Double(f64::INFINITY));
}

#[test]
fn test_modulo_keeps_dividend_sign() {
    let s = script("main", 0, &[Opcode::LoadInt(-7), Opcode::LoadInt(3), Opcode::Mod, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Int32(-1));
}

#[test]
fn test_bitwise_operators() {
    let cases = [
        (Opcode::BitOr, 12, 10, 14),
        (Opcode::BitAnd, 12, 10, 8),
        (Opcode::BitXor, 12, 10, 6),
        (Opcode::Lsh, 1, 4, 16),
        (Opcode::Rsh, -16, 2, -4),
    ];
    for (op, a, b, expected) in cases {
        let s = script("main", 0, &[Opcode::LoadInt(a), Opcode::LoadInt(b), op, Opcode::Return]);
        assert_eq!(run(s).unwrap(), Value::Int32(expected), "{:?}", op);
    }
}

#[test]
fn test_unsigned_shift_of_negative() {
    let s = script("main", 0, &[Opcode::LoadInt(-1), Opcode::LoadInt(0), Opcode::Ursh, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Double(4294967295.0));
}

#[test]
fn test_negate_zero_is_negative_zero() {
    let s = script("main", 0, &[Opcode::LoadInt(0), Opcode::Neg, Opcode::Return]);
    match run(s).unwrap() {
        Value::Double(n) => assert!(n == 0.0 && n.is_sign_negative()),
        other => panic!("expected -0, got {:?}", other),
    }
}

#[test]
fn test_increment_and_decrement() {
    let s = script("main", 0, &[Opcode::LoadInt(5), Opcode::Inc, Opcode::Inc, Opcode::Dec, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Int32(6));
}

#[test]
fn test_bigint_arithmetic() {
    let mut s = Script::new("main");
    let a = s.add_constant(BigInt::from(1u64 << 40));
    let b = s.add_constant(BigInt::from(3));
    s.emit(Opcode::LoadConstant(a));
    s.emit(Opcode::LoadConstant(b));
    s.emit(Opcode::Mul);
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::bigint(BigInt::from(3u64 << 40)));
}

#[test]
fn test_mixing_bigint_and_number_throws() {
    let mut s = Script::new("main");
    let a = s.add_constant(BigInt::from(1));
    s.emit(Opcode::LoadConstant(a));
    s.emit(Opcode::LoadInt(1));
    s.emit(Opcode::Add);
    s.emit(Opcode::Return);
    let err = run(s).unwrap_err();
    let (kind, message) = uncaught(&err);
    assert_eq!(kind, ErrorKind::TypeError);
    assert!(message.contains("BigInt"), "{}", message);
}

#[test]
fn test_bigint_division_by_zero_throws_range_error() {
    let mut s = Script::new("main");
    let a = s.add_constant(BigInt::from(1));
    let zero = s.add_constant(BigInt::from(0));
    s.emit(Opcode::LoadConstant(a));
    s.emit(Opcode::LoadConstant(zero));
    s.emit(Opcode::Div);
    s.emit(Opcode::Return);
    let err = run(s).unwrap_err();
    assert_eq!(uncaught(&err).0, ErrorKind::RangeError);
}

#[test]
fn test_to_numeric_of_string() {
    let mut s = Script::new("main");
    let text = s.add_constant(" 42 ");
    s.emit(Opcode::LoadConstant(text));
    s.emit(Opcode::Pos);
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::Int32(42));
}

#[test]
fn test_to_string_of_double() {
    let mut s = Script::new("main");
    let n = s.add_constant(1.5);
    s.emit(Opcode::LoadConstant(n));
    s.emit(Opcode::ToString);
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::from("1.5"));
}

#[test]
fn test_typeof() {
    let cases: [(Opcode, &str); 4] = [
        (Opcode::LoadInt(1), "number"),
        (Opcode::LoadUndefined, "undefined"),
        (Opcode::LoadNull, "object"),
        (Opcode::LoadTrue, "boolean"),
    ];
    for (load, expected) in cases {
        let s = script("main", 0, &[load, Opcode::Typeof, Opcode::Return]);
        assert_eq!(run(s).unwrap(), Value::from(expected));
    }

    let s = script("main", 0, &[Opcode::NewObject, Opcode::Typeof, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::from("object"));
}

#[test]
fn test_not_and_void() {
    let s = script("main", 0, &[Opcode::LoadInt(0), Opcode::Not, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Boolean(true));

    let s = script("main", 0, &[Opcode::LoadInt(3), Opcode::Void, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Undefined);
}

// ============================================================================
// Equality and relational operators
// ============================================================================

#[test]
fn test_loose_equality_coerces() {
    let mut s = Script::new("main");
    let one = s.add_constant("1");
    s.emit(Opcode::LoadInt(1));
    s.emit(Opcode::LoadConstant(one));
    s.emit(Opcode::Eq);
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::Boolean(true));

    let s = script("main", 0, &[Opcode::LoadNull, Opcode::LoadUndefined, Opcode::Eq, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Boolean(true));
}

#[test]
fn test_strict_equality_does_not_coerce() {
    let mut s = Script::new("main");
    let one = s.add_constant("1");
    s.emit(Opcode::LoadInt(1));
    s.emit(Opcode::LoadConstant(one));
    s.emit(Opcode::StrictEq);
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::Boolean(false));

    let s = script("main", 0, &[Opcode::LoadNull, Opcode::LoadUndefined, Opcode::StrictNe, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Boolean(true));
}

#[test]
fn test_int_and_double_compare_equal() {
    let mut s = Script::new("main");
    let two = s.add_constant(2.0);
    s.emit(Opcode::LoadInt(2));
    s.emit(Opcode::LoadConstant(two));
    s.emit(Opcode::StrictEq);
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::Boolean(true));
}

#[test]
fn test_distinct_objects_are_not_equal() {
    let s = script("main", 0, &[Opcode::NewObject, Opcode::NewObject, Opcode::StrictEq, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Boolean(false));

    let s = script("main", 0, &[Opcode::NewObject, Opcode::Dup, Opcode::StrictEq, Opcode::Return]);
    assert_eq!(run(s).unwrap(), Value::Boolean(true));
}

#[test]
fn test_string_comparison_is_lexicographic() {
    let mut s = Script::new("main");
    let a = s.add_constant("apple");
    let b = s.add_constant("banana");
    s.emit(Opcode::LoadConstant(a));
    s.emit(Opcode::LoadConstant(b));
    s.emit(Opcode::Lt);
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::Boolean(true));
}

#[test]
fn test_relational_operators() {
    let cases = [
        (Opcode::Lt, 1, 2, true),
        (Opcode::Le, 2, 2, true),
        (Opcode::Gt, 1, 2, false),
        (Opcode::Ge, 3, 2, true),
    ];
    for (op, a, b, expected) in cases {
        let s = script("main", 0, &[Opcode::LoadInt(a), Opcode::LoadInt(b), op, Opcode::Return]);
        assert_eq!(run(s).unwrap(), Value::Boolean(expected), "{:?}", op);
    }
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_short_circuit_operators() {
    // 0 || 5
    let s = script(
        "main",
        0,
        &[Opcode::LoadInt(0), Opcode::Or(4), Opcode::Pop, Opcode::LoadInt(5), Opcode::Return],
    );
    assert_eq!(run(s).unwrap(), Value::Int32(5));

    // 0 && 5
    let s = script(
        "main",
        0,
        &[Opcode::LoadInt(0), Opcode::And(4), Opcode::Pop, Opcode::LoadInt(5), Opcode::Return],
    );
    assert_eq!(run(s).unwrap(), Value::Int32(0));

    // null ?? 5
    let s = script(
        "main",
        0,
        &[Opcode::LoadNull, Opcode::Coalesce(4), Opcode::Pop, Opcode::LoadInt(5), Opcode::Return],
    );
    assert_eq!(run(s).unwrap(), Value::Int32(5));
}

#[test]
fn test_counting_loop() {
    // let i = 0, sum = 0; while (i < 5) { sum += i; i++ } return sum
    let s = script(
        "main",
        2,
        &[
            Opcode::LoadInt(0),  // 0
            Opcode::SetLocal(0), // 1
            Opcode::SetLocal(1), // 2
            Opcode::Pop,         // 3
            Opcode::LoopHead,    // 4
            Opcode::GetLocal(0), // 5
            Opcode::LoadInt(5),  // 6
            Opcode::Lt,          // 7
            Opcode::IfEq(20),    // 8
            Opcode::GetLocal(1), // 9
            Opcode::GetLocal(0), // 10
            Opcode::Add,         // 11
            Opcode::SetLocal(1), // 12
            Opcode::Pop,         // 13
            Opcode::GetLocal(0), // 14
            Opcode::Inc,         // 15
            Opcode::SetLocal(0), // 16
            Opcode::Pop,         // 17
            Opcode::Goto(4),     // 18
            Opcode::Nop,         // 19
            Opcode::GetLocal(1), // 20
            Opcode::Return,      // 21
        ],
    );
    assert_eq!(run(s).unwrap(), Value::Int32(10));
}

#[test]
fn test_ret_rval_returns_slot() {
    let s = script("main", 0, &[Opcode::LoadInt(3), Opcode::SetRval, Opcode::GetRval, Opcode::Pop, Opcode::RetRval]);
    assert_eq!(run(s).unwrap(), Value::Int32(3));
}

// ============================================================================
// Global names
// ============================================================================

#[test]
fn test_unresolvable_global_is_reference_error() {
    let mut s = Script::new("main");
    let x = s.add_atom("missing");
    s.emit(Opcode::GetGName(x));
    s.emit(Opcode::Return);
    let err = run(s).unwrap_err();
    let (kind, message) = uncaught(&err);
    assert_eq!(kind, ErrorKind::ReferenceError);
    assert_eq!(message, "missing is not defined");
}

#[test]
fn test_sloppy_assignment_creates_global() {
    let mut s = Script::new("main");
    let x = s.add_atom("x");
    s.emit(Opcode::BindGName(x));
    s.emit(Opcode::LoadInt(5));
    s.emit(Opcode::SetGName(x));
    s.emit(Opcode::Pop);
    s.emit(Opcode::GetGName(x));
    s.emit(Opcode::Return);

    let mut vm = VM::new();
    assert_eq!(vm.execute(Rc::new(s)).unwrap(), Value::Int32(5));
    assert_eq!(vm.get_global("x").unwrap(), Value::Int32(5));
}

#[test]
fn test_strict_assignment_to_undeclared_throws() {
    let mut s = Script::new("main");
    s.flags.strict = true;
    let x = s.add_atom("x");
    s.emit(Opcode::BindGName(x));
    s.emit(Opcode::LoadInt(5));
    s.emit(Opcode::StrictSetGName(x));
    s.emit(Opcode::Return);
    let err = run(s).unwrap_err();
    assert_eq!(uncaught(&err), (ErrorKind::ReferenceError, "assignment to undeclared variable x".to_string()));
}

#[test]
fn test_strict_mode_option_applies_to_top_level() {
    let mut s = Script::new("main");
    let x = s.add_atom("y");
    s.emit(Opcode::BindGName(x));
    s.emit(Opcode::LoadInt(5));
    s.emit(Opcode::SetGName(x));
    s.emit(Opcode::Return);
    let s = Rc::new(s);

    let mut vm = VM::with_options(EngineOptions::new().with_strict_mode(true));
    let err = vm.execute(s.clone()).unwrap_err();
    assert_eq!(uncaught(&err).0, ErrorKind::ReferenceError);

    let mut vm = VM::new();
    assert_eq!(vm.execute(s).unwrap(), Value::Int32(5));
}

#[test]
fn test_global_let_temporal_dead_zone() {
    let mut s = Script::new("main");
    let x = s.add_atom("x");
    s.emit(Opcode::DefLet(x));
    s.emit(Opcode::GetGName(x));
    s.emit(Opcode::Return);
    let err = run(s).unwrap_err();
    assert_eq!(
        uncaught(&err),
        (
            ErrorKind::ReferenceError,
            "can't access lexical declaration 'x' before initialization".to_string()
        )
    );
}

#[test]
fn test_global_const_assignment_throws() {
    let mut s = Script::new("main");
    let x = s.add_atom("k");
    s.emit(Opcode::DefConst(x));
    s.emit(Opcode::LoadInt(1));
    s.emit(Opcode::InitGLexical(x));
    s.emit(Opcode::Pop);
    s.emit(Opcode::BindGName(x));
    s.emit(Opcode::LoadInt(2));
    s.emit(Opcode::SetGName(x));
    s.emit(Opcode::Return);
    let err = run(s).unwrap_err();
    assert_eq!(uncaught(&err), (ErrorKind::TypeError, "invalid assignment to const 'k'".to_string()));
}

#[test]
fn test_global_let_redeclaration_is_syntax_error() {
    let mut s = Script::new("main");
    let x = s.add_atom("x");
    s.emit(Opcode::DefLet(x));
    s.emit(Opcode::DefVar(x));
    s.emit(Opcode::Return);
    let err = run(s).unwrap_err();
    assert_eq!(uncaught(&err), (ErrorKind::SyntaxError, "redeclaration of let x".to_string()));
}

#[test]
fn test_global_var_is_visible_to_host() {
    let mut s = Script::new("main");
    let x = s.add_atom("counter");
    s.emit(Opcode::DefVar(x));
    s.emit(Opcode::LoadUndefined);
    s.emit(Opcode::Return);

    let mut vm = VM::new();
    vm.execute(Rc::new(s)).unwrap();
    assert_eq!(vm.get_global("counter").unwrap(), Value::Undefined);

    vm.set_global("counter", Value::Int32(3)).unwrap();
    let mut read = Script::new("read");
    let x = read.add_atom("counter");
    read.emit(Opcode::GetGName(x));
    read.emit(Opcode::Return);
    assert_eq!(vm.execute(Rc::new(read)).unwrap(), Value::Int32(3));
}

// ============================================================================
// Objects and properties
// ============================================================================

#[test]
fn test_object_literal_properties() {
    let mut s = Script::new("main");
    let a = s.add_atom("a");
    s.emit(Opcode::NewObject);
    s.emit(Opcode::LoadInt(1));
    s.emit(Opcode::InitProp(a));
    s.emit(Opcode::GetProp(a));
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::Int32(1));
}

#[test]
fn test_missing_property_is_undefined() {
    let mut s = Script::new("main");
    let a = s.add_atom("nope");
    s.emit(Opcode::NewObject);
    s.emit(Opcode::GetProp(a));
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::Undefined);
}

#[test]
fn test_property_of_undefined_is_type_error() {
    let mut s = Script::new("main");
    let a = s.add_atom("x");
    s.emit(Opcode::LoadUndefined);
    s.emit(Opcode::GetProp(a));
    s.emit(Opcode::Return);
    let err = run(s).unwrap_err();
    assert_eq!(uncaught(&err).0, ErrorKind::TypeError);
}

#[test]
fn test_array_elements() {
    let s = script(
        "main",
        0,
        &[
            Opcode::NewArray(2),
            Opcode::LoadInt(10),
            Opcode::InitElemArray(0),
            Opcode::LoadInt(20),
            Opcode::InitElemArray(1),
            Opcode::LoadInt(1),
            Opcode::GetElem,
            Opcode::Return,
        ],
    );
    assert_eq!(run(s).unwrap(), Value::Int32(20));
}

#[test]
fn test_array_length() {
    let mut s = Script::new("main");
    let length = s.add_atom("length");
    s.emit(Opcode::NewArray(3));
    s.emit(Opcode::LoadInt(1));
    s.emit(Opcode::InitElemArray(0));
    s.emit(Opcode::LoadInt(2));
    s.emit(Opcode::InitElemArray(1));
    s.emit(Opcode::GetProp(length));
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::Int32(2));
}

#[test]
fn test_delete_property() {
    let mut s = Script::new("main");
    let a = s.add_atom("a");
    s.emit(Opcode::NewObject);
    s.emit(Opcode::LoadInt(1));
    s.emit(Opcode::InitProp(a));
    s.emit(Opcode::Dup);
    s.emit(Opcode::DelProp(a));
    s.emit(Opcode::Pop);
    s.emit(Opcode::GetProp(a));
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::Undefined);
}

#[test]
fn test_in_operator() {
    let mut s = Script::new("main");
    let a = s.add_atom("a");
    let key = s.add_constant("a");
    s.emit(Opcode::LoadConstant(key));
    s.emit(Opcode::NewObject);
    s.emit(Opcode::LoadInt(1));
    s.emit(Opcode::InitProp(a));
    s.emit(Opcode::In);
    s.emit(Opcode::Return);
    assert_eq!(run(s).unwrap(), Value::Boolean(true));
}

#[test]
fn test_in_on_primitive_is_type_error() {
    let mut s = Script::new("main");
    let key = s.add_constant("a");
    s.emit(Opcode::LoadConstant(key));
    s.emit(Opcode::LoadInt(1));
    s.emit(Opcode::In);
    s.emit(Opcode::Return);
    let err = run(s).unwrap_err();
    assert_eq!(uncaught(&err).0, ErrorKind::TypeError);
}

#[test]
fn test_for_in_enumerates_keys() {
    // for (k in {a: 1, b: 2}) out += k
    let mut s = Script::new("main");
    s.local_count = 1;
    let a = s.add_atom("a");
    let b = s.add_atom("b");
    let empty = s.add_constant("");
    for op in [
        Opcode::LoadConstant(empty), // 0
        Opcode::SetLocal(0),         // 1
        Opcode::Pop,                 // 2
        Opcode::NewObject,           // 3
        Opcode::LoadInt(1),          // 4
        Opcode::InitProp(a),         // 5
        Opcode::LoadInt(2),          // 6
        Opcode::InitProp(b),         // 7
        Opcode::Iter,                // 8
        Opcode::LoopHead,            // 9
        Opcode::MoreIter,            // 10
        Opcode::IsNoIter,            // 11
        Opcode::IfNe(19),            // 12
        Opcode::GetLocal(0),         // 13
        Opcode::Swap,                // 14
        Opcode::Add,                 // 15
        Opcode::SetLocal(0),         // 16
        Opcode::Pop,                 // 17
        Opcode::Goto(9),             // 18
        Opcode::EndIter,             // 19
        Opcode::GetLocal(0),         // 20
        Opcode::Return,              // 21
    ] {
        s.emit(op);
    }
    assert_eq!(run(s).unwrap(), Value::from("ab"));
}
