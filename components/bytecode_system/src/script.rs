//! Compiled script container
//!
//! A [`Script`] is everything the interpreter needs to run one function body
//! or top-level program: the instruction stream, pools, scope and exception
//! tables, slot counts and flags. Scripts are immutable once handed to the
//! interpreter and shared through `Rc`.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use core_types::{SourcePosition, SourceSpan};

use crate::constant::Constant;
use crate::instruction::Instruction;
use crate::opcode::Opcode;
use crate::scope::{BindingLocation, ScopeData, ScopeNote};
use crate::try_note::{TryNote, TryNoteIter};

static NEXT_SCRIPT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique script identity, used to key per-script profiling data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(u64);

impl ScriptId {
    fn fresh() -> Self {
        ScriptId(NEXT_SCRIPT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Static properties of a script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptFlags {
    /// Strict mode code
    pub strict: bool,
    /// Class constructor (callable only with `new`)
    pub class_constructor: bool,
    /// Derived class constructor (`this` starts uninitialized)
    pub derived_class_constructor: bool,
    /// Generator function
    pub generator: bool,
    /// Async function
    pub is_async: bool,
    /// Arrow function
    pub arrow: bool,
    /// Runs against an embedder-supplied scope chain
    pub has_non_syntactic_scope: bool,
    /// Prologue materializes the arguments object
    pub needs_arguments_object: bool,
    /// Prologue creates an environment record for the function scope
    pub has_call_object: bool,
    /// Engine-internal code, hidden from debuggers
    pub self_hosted: bool,
}

/// A compiled function body or top-level program.
#[derive(Debug, Clone)]
pub struct Script {
    /// Unique id
    pub id: ScriptId,
    /// Function name, empty for top-level code
    pub name: Rc<str>,
    /// Source URL for stack traces
    pub url: Option<Rc<str>>,
    /// Instruction stream
    pub instructions: Vec<Instruction>,
    /// Literal pool
    pub constants: Vec<Constant>,
    /// Name pool
    pub atoms: Vec<Rc<str>>,
    /// Nested function scripts
    pub functions: Vec<Rc<Script>>,
    /// Scope descriptors
    pub scopes: Vec<Rc<ScopeData>>,
    /// pc ranges mapped to their innermost scope
    pub scope_notes: Vec<ScopeNote>,
    /// Exception-handler table, innermost first
    pub try_notes: Vec<TryNote>,
    /// Resume targets for `Retsub` and generator resumption
    pub resume_offsets: Vec<u32>,
    /// Extra source spans referenced by class opcodes
    pub spans: Vec<SourceSpan>,
    /// Function scope, if the prologue may create a call object for it
    pub function_scope: Option<u32>,
    /// Named-lambda scope holding the self binding, if it is aliased
    pub named_lambda_scope: Option<u32>,
    /// Outermost scope of the script
    pub body_scope: Option<u32>,
    /// Number of formal parameters
    pub arg_count: u16,
    /// Number of fixed frame slots
    pub local_count: u32,
    /// Operand stack high-water mark
    pub max_stack_depth: u32,
    /// Static flags
    pub flags: ScriptFlags,
    /// Source extent for introspection
    pub source_span: SourceSpan,
}

impl Script {
    /// Create an empty script
    pub fn new(name: &str) -> Self {
        Self {
            id: ScriptId::fresh(),
            name: Rc::from(name),
            url: None,
            instructions: Vec::new(),
            constants: Vec::new(),
            atoms: Vec::new(),
            functions: Vec::new(),
            scopes: Vec::new(),
            scope_notes: Vec::new(),
            try_notes: Vec::new(),
            resume_offsets: Vec::new(),
            spans: Vec::new(),
            function_scope: None,
            named_lambda_scope: None,
            body_scope: None,
            arg_count: 0,
            local_count: 0,
            max_stack_depth: 0,
            flags: ScriptFlags::default(),
            source_span: SourceSpan::default(),
        }
    }

    /// Emit an instruction without source position, returning its index
    pub fn emit(&mut self, opcode: Opcode) -> usize {
        self.instructions.push(Instruction::new(opcode));
        self.instructions.len() - 1
    }

    /// Emit an instruction with source position, returning its index
    pub fn emit_with_position(&mut self, opcode: Opcode, position: SourcePosition) -> usize {
        self.instructions.push(Instruction::new(opcode).at(position));
        self.instructions.len() - 1
    }

    /// Index the next emitted instruction will get
    pub fn current_offset(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Point the jump at `at` to `target`; returns false if `at` is not a jump
    pub fn patch_jump(&mut self, at: usize, target: u32) -> bool {
        match self.instructions.get_mut(at) {
            Some(inst) => inst.opcode.set_jump_target(target),
            None => false,
        }
    }

    /// Add a constant to the constant pool and return its index
    pub fn add_constant(&mut self, constant: impl Into<Constant>) -> u32 {
        self.constants.push(constant.into());
        (self.constants.len() - 1) as u32
    }

    /// Intern a name, returning its atom index
    pub fn add_atom(&mut self, name: &str) -> u32 {
        if let Some(i) = self.atoms.iter().position(|a| &**a == name) {
            return i as u32;
        }
        self.atoms.push(Rc::from(name));
        (self.atoms.len() - 1) as u32
    }

    /// Add a nested function and return its index
    pub fn add_function(&mut self, script: Script) -> u32 {
        self.functions.push(Rc::new(script));
        (self.functions.len() - 1) as u32
    }

    /// Add a scope descriptor and return its index
    pub fn add_scope(&mut self, scope: ScopeData) -> u32 {
        self.scopes.push(Rc::new(scope));
        (self.scopes.len() - 1) as u32
    }

    /// Record that `scope` is innermost over `[start, start + length)`
    pub fn add_scope_note(&mut self, scope: u32, start: u32, length: u32) {
        self.scope_notes.push(ScopeNote {
            scope,
            start,
            length,
        });
    }

    /// Append an exception-table entry; inner notes must be added first
    pub fn add_try_note(&mut self, note: TryNote) {
        self.try_notes.push(note);
    }

    /// Register a resume target and return its index
    pub fn add_resume_offset(&mut self, offset: u32) -> u32 {
        self.resume_offsets.push(offset);
        (self.resume_offsets.len() - 1) as u32
    }

    /// Register a source span for class opcodes and return its index
    pub fn add_span(&mut self, span: SourceSpan) -> u32 {
        self.spans.push(span);
        (self.spans.len() - 1) as u32
    }

    /// Get the number of instructions
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Name for atom index `i`
    pub fn atom(&self, i: u32) -> Option<&Rc<str>> {
        self.atoms.get(i as usize)
    }

    /// Innermost scope covering `pc`, falling back to the body scope
    pub fn innermost_scope(&self, pc: usize) -> Option<u32> {
        self.scope_notes
            .iter()
            .filter(|note| note.contains(pc))
            .max_by_key(|note| note.start)
            .map(|note| note.scope)
            .or(self.body_scope)
    }

    /// Whether `ancestor` is `scope` or encloses it
    pub fn scope_encloses(&self, ancestor: u32, scope: u32) -> bool {
        let mut current = Some(scope);
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.scopes.get(index as usize).and_then(|s| s.enclosing);
        }
        false
    }

    /// Exception-table entries covering `pc` at the given operand depth
    pub fn try_notes_at(&self, pc: usize, stack_depth: usize) -> TryNoteIter<'_> {
        TryNoteIter::new(&self.try_notes, pc, stack_depth)
    }

    /// Name of the binding stored in frame slot `slot`, for diagnostics
    pub fn local_name(&self, slot: u32) -> Option<Rc<str>> {
        self.scopes
            .iter()
            .flat_map(|scope| scope.bindings.iter())
            .find(|b| b.location == BindingLocation::Frame(slot))
            .map(|b| b.name.clone())
    }

    /// Source position recorded for instruction `pc`
    pub fn position_at(&self, pc: usize) -> Option<SourcePosition> {
        self.instructions.get(pc).and_then(|i| i.position)
    }

    /// Whether instances of this script can be invoked with `new`
    pub fn is_constructor(&self) -> bool {
        !self.flags.arrow && !self.flags.generator && !self.flags.is_async && !self.flags.self_hosted
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::new("")
    }
}
