//! Unit tests for SourcePosition, SourceSpan and StackFrame

use core_types::{SourcePosition, SourceSpan, StackFrame};

#[test]
fn test_source_position_default_is_origin() {
    let pos = SourcePosition::default();
    assert_eq!(pos.line, 0);
    assert_eq!(pos.column, 0);
    assert_eq!(pos.offset, 0);
}

#[test]
fn test_source_position_is_copy() {
    let a = SourcePosition::new(3, 4, 20);
    let b = a;
    assert_eq!(a, b);
}

#[test]
fn test_source_span_fields() {
    let span = SourceSpan::new(10, 42, 2, 5);
    assert_eq!(span.start, 10);
    assert_eq!(span.end, 42);
    assert_eq!(span.line, 2);
    assert_eq!(span.column, 5);
}

#[test]
fn test_stack_frame_display() {
    let frame = StackFrame {
        function_name: Some("outer".to_string()),
        source_url: Some("app.js".to_string()),
        line: 7,
        column: 3,
    };
    assert_eq!(frame.to_string(), "outer@app.js:7:3");
}

#[test]
fn test_stack_frame_equality() {
    let frame = StackFrame {
        function_name: None,
        source_url: None,
        line: 1,
        column: 1,
    };
    assert_eq!(frame.clone(), frame);
}
