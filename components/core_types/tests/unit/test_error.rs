//! Unit tests for ErrorKind, JsError and Abrupt

use core_types::{Abrupt, ErrorKind, JsError, Magic, StackFrame, Value};

#[test]
fn test_error_kind_display_uses_constructor_name() {
    assert_eq!(ErrorKind::TypeError.to_string(), "TypeError");
    assert_eq!(ErrorKind::InternalError.to_string(), "InternalError");
    assert_eq!(ErrorKind::Error.name(), "Error");
}

#[test]
fn test_js_error_with_stack_sets_position_from_top_frame() {
    let stack = vec![
        StackFrame {
            function_name: Some("inner".to_string()),
            source_url: None,
            line: 12,
            column: 9,
        },
        StackFrame {
            function_name: Some("outer".to_string()),
            source_url: None,
            line: 30,
            column: 1,
        },
    ];
    let error = JsError::new(ErrorKind::RangeError, "bad length").with_stack(stack);
    assert_eq!(error.stack.len(), 2);
    let pos = error.source_position.unwrap();
    assert_eq!(pos.line, 12);
    assert_eq!(pos.column, 9);
}

#[test]
fn test_js_error_is_std_error() {
    fn takes_error(_: &dyn std::error::Error) {}
    let error = JsError::new(ErrorKind::SyntaxError, "redeclaration of let x");
    takes_error(&error);
    assert_eq!(error.to_string(), "SyntaxError: redeclaration of let x");
}

#[test]
fn test_abrupt_classification() {
    assert!(Abrupt::Throw(Value::Undefined).is_catchable());
    assert!(!Abrupt::GeneratorClosing.is_catchable());
    assert!(!Abrupt::GeneratorClosing.is_uncatchable());
    assert!(Abrupt::ForcedReturn.is_uncatchable());
    assert!(Abrupt::Terminated.is_uncatchable());
}

#[test]
fn test_generator_closing_travels_as_magic_through_finally() {
    let held = Abrupt::GeneratorClosing.to_finally_value().unwrap();
    assert!(held.is_magic(Magic::GeneratorClosing));
    assert_eq!(Abrupt::from_finally_value(held), Abrupt::GeneratorClosing);
}

#[test]
fn test_thrown_value_accessor() {
    let abrupt = Abrupt::Throw(Value::from("boom"));
    assert_eq!(abrupt.thrown_value(), Some(&Value::from("boom")));
    assert_eq!(Abrupt::Terminated.thrown_value(), None);
}
