//! One slot of a script's instruction stream.

use core_types::SourcePosition;

use crate::opcode::Opcode;

/// An opcode plus where it came from in the source, if known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    /// What to execute
    pub opcode: Opcode,
    /// Reported in stack traces and to debugger hooks
    pub position: Option<SourcePosition>,
}

impl Instruction {
    /// An instruction with no source position.
    pub fn new(opcode: Opcode) -> Self {
        opcode.into()
    }

    /// Attach a source position.
    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Whether control can continue at `pc + 1` after this instruction.
    pub fn falls_through(&self) -> bool {
        !self.opcode.is_unconditional_terminator()
    }
}

impl From<Opcode> for Instruction {
    fn from(opcode: Opcode) -> Self {
        Instruction {
            opcode,
            position: None,
        }
    }
}
