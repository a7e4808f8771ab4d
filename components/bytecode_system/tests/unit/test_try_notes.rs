//! Tests for try-note lookup through the Script API

use bytecode_system::{Opcode, Script, TryNote, TryNoteKind};

fn script_with_nested_handlers() -> Script {
    let mut script = Script::new("f");
    for _ in 0..20 {
        script.emit(Opcode::Nop);
    }
    // try { for (k in o) { try { ... } catch {} } } finally {}
    script.add_try_note(TryNote::new(TryNoteKind::Catch, 6, 3, 2));
    script.add_try_note(TryNote::new(TryNoteKind::ForIn, 4, 8, 1));
    script.add_try_note(TryNote::new(TryNoteKind::Finally, 1, 14, 0));
    script
}

#[test]
fn test_notes_outside_pc_are_ignored() {
    let script = script_with_nested_handlers();
    let kinds: Vec<_> = script.try_notes_at(16, 0).map(|n| n.kind).collect();
    assert!(kinds.is_empty());
}

#[test]
fn test_innermost_first_order() {
    let script = script_with_nested_handlers();
    let kinds: Vec<_> = script.try_notes_at(7, 2).map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![TryNoteKind::Catch, TryNoteKind::ForIn, TryNoteKind::Finally]
    );
}

#[test]
fn test_notes_deeper_than_current_stack_are_skipped() {
    let script = script_with_nested_handlers();
    let kinds: Vec<_> = script.try_notes_at(7, 1).map(|n| n.kind).collect();
    assert_eq!(kinds, vec![TryNoteKind::ForIn, TryNoteKind::Finally]);
}

#[test]
fn test_handler_and_scope_pcs() {
    let note = TryNote::new(TryNoteKind::Destructuring, 10, 4, 3);
    assert_eq!(note.handler_pc(), 14);
    assert_eq!(note.unwind_scope_pc(), 9);
    let loop_note = TryNote::new(TryNoteKind::Loop, 10, 4, 0);
    assert_eq!(loop_note.unwind_scope_pc(), 10);
}
