//! Exception-handler table
//!
//! Each [`TryNote`] covers an instruction range and says what the unwinder
//! must do when an exception escapes an instruction in that range. Notes are
//! stored innermost first, so a forward scan visits handlers in the order
//! they must run.

/// Handler kind of a try note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TryNoteKind {
    /// Resume at the catch block
    Catch,
    /// Resume at the finally block with the exception pending
    Finally,
    /// Close the for-in iterator at `stack[depth - 1]`, keep unwinding
    ForIn,
    /// Marks a for-of loop body; the iterator is closed by bytecode
    ForOf,
    /// Region where a for-of iterator is being closed; the matching
    /// [`TryNoteKind::ForOf`] note must not be considered again
    ForOfIterClose,
    /// Close the destructuring iterator at `stack[depth - 2]` unless the
    /// done flag at `stack[depth - 1]` is set
    Destructuring,
    /// Marks a loop; no unwinding action
    Loop,
}

/// One entry of the exception-handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryNote {
    /// Handler kind
    pub kind: TryNoteKind,
    /// First covered instruction (the one after `Try`)
    pub start: u32,
    /// Number of covered instructions
    pub length: u32,
    /// Operand stack depth (above the frame's fixed slots) at `start`
    pub stack_depth: u32,
}

impl TryNote {
    /// Create a note
    pub fn new(kind: TryNoteKind, start: u32, length: u32, stack_depth: u32) -> Self {
        Self {
            kind,
            start,
            length,
            stack_depth,
        }
    }

    /// Whether the note covers `pc`
    pub fn contains(&self, pc: usize) -> bool {
        let start = self.start as usize;
        pc >= start && pc < start + self.length as usize
    }

    /// Instruction where the handler begins
    pub fn handler_pc(&self) -> usize {
        (self.start + self.length) as usize
    }

    /// Instruction whose scope must be restored before the handler runs.
    ///
    /// Catch, finally and destructuring notes start right after their marker
    /// opcode, which may itself be the first instruction of an inner scope;
    /// the marker's own position identifies the right scope.
    pub fn unwind_scope_pc(&self) -> usize {
        match self.kind {
            TryNoteKind::Catch | TryNoteKind::Finally | TryNoteKind::Destructuring => {
                (self.start as usize).saturating_sub(1)
            }
            _ => self.start as usize,
        }
    }
}

/// Iterates the notes covering a pc, innermost first, skipping notes whose
/// recorded depth exceeds the current stack depth and the for-of loops whose
/// iterator is already being closed.
#[derive(Debug, Clone)]
pub struct TryNoteIter<'a> {
    notes: &'a [TryNote],
    index: usize,
    pc: usize,
    stack_depth: usize,
}

impl<'a> TryNoteIter<'a> {
    /// Start iterating `notes` at `pc` with the given operand depth
    pub fn new(notes: &'a [TryNote], pc: usize, stack_depth: usize) -> Self {
        Self {
            notes,
            index: 0,
            pc,
            stack_depth,
        }
    }

    /// Skip past the `ForOf` note matching the `ForOfIterClose` note just
    /// consumed, accounting for nested closes.
    fn skip_closed_for_of(&mut self) {
        let mut depth = 1usize;
        while self.index < self.notes.len() {
            let note = &self.notes[self.index];
            self.index += 1;
            if !note.contains(self.pc) {
                continue;
            }
            match note.kind {
                TryNoteKind::ForOfIterClose => depth += 1,
                TryNoteKind::ForOf => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }
}

impl<'a> Iterator for TryNoteIter<'a> {
    type Item = &'a TryNote;

    fn next(&mut self) -> Option<&'a TryNote> {
        while self.index < self.notes.len() {
            let note = &self.notes[self.index];
            self.index += 1;
            if !note.contains(self.pc) {
                continue;
            }
            if note.kind == TryNoteKind::ForOfIterClose {
                self.skip_closed_for_of();
                continue;
            }
            if note.stack_depth as usize <= self.stack_depth {
                return Some(note);
            }
        }
        None
    }
}
