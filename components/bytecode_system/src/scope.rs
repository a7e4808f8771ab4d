//! Static scope metadata
//!
//! A [`ScopeData`] describes one syntactic scope: the names it declares, where
//! each binding lives, and the enclosing scope. Scope notes map instruction
//! ranges to the innermost scope so the unwinder can pop environments back to
//! the scope that was active when a try block started.
//!
//! [`NameLocation`] is the compile-time binding kind of a reference site. It
//! decides which opcode family the compiler emits; the interpreter never
//! re-derives it except for [`NameLocation::Dynamic`].

use std::rc::Rc;

use crate::opcode::{EnvironmentCoordinate, Opcode};

/// Syntactic kind of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Function parameters and body
    Function,
    /// Separate var scope of a function with parameter expressions
    FunctionBodyVar,
    /// Block scope
    Lexical,
    /// Catch clause scope
    Catch,
    /// Class body scope
    ClassBody,
    /// Self binding of a named function expression (sloppy)
    NamedLambda,
    /// Self binding of a named function expression (strict)
    StrictNamedLambda,
    /// `with` statement
    With,
    /// Sloppy direct eval
    Eval,
    /// Strict direct eval
    StrictEval,
    /// Top level of a script
    Global,
    /// Top level of a script run against an embedder-supplied scope
    NonSyntactic,
    /// Top level of a module
    Module,
}

impl ScopeKind {
    /// Whether block environments of this kind are pushed by
    /// `PushLexicalEnv`.
    pub fn is_lexical(self) -> bool {
        matches!(
            self,
            ScopeKind::Lexical | ScopeKind::Catch | ScopeKind::ClassBody
        )
    }
}

/// Declaration kind of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// `var` or function declaration
    Var,
    /// `let` or `class`
    Let,
    /// `const`
    Const,
    /// Formal parameter
    FormalParameter,
    /// Self binding of a named lambda
    Callee,
    /// Compiler-introduced binding such as `.this` or `.generator`
    Synthetic,
}

impl BindingKind {
    /// Lexical bindings start uninitialized and are TDZ-checked.
    pub fn is_lexical(self) -> bool {
        matches!(self, BindingKind::Let | BindingKind::Const)
    }

    /// Assignments to these bindings are errors (or, for the callee in sloppy
    /// code, ignored).
    pub fn is_const(self) -> bool {
        matches!(self, BindingKind::Const | BindingKind::Callee)
    }
}

/// Where a declared binding is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingLocation {
    /// Argument slot of the frame
    Argument(u16),
    /// Fixed frame slot
    Frame(u32),
    /// Slot of the scope's environment record
    Environment(u32),
    /// Property of the global object or entry of the global lexical scope
    Global,
}

/// A name declared by a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingName {
    /// Declared name
    pub name: Rc<str>,
    /// Declaration kind
    pub kind: BindingKind,
    /// Storage
    pub location: BindingLocation,
}

impl BindingName {
    /// Create a binding description
    pub fn new(name: &str, kind: BindingKind, location: BindingLocation) -> Self {
        Self {
            name: Rc::from(name),
            kind,
            location,
        }
    }
}

/// Static description of a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeData {
    /// Syntactic kind
    pub kind: ScopeKind,
    /// Declared names
    pub bindings: Vec<BindingName>,
    /// Index of the enclosing scope in the same script, if any
    pub enclosing: Option<u32>,
}

impl ScopeData {
    /// Create an empty scope
    pub fn new(kind: ScopeKind, enclosing: Option<u32>) -> Self {
        Self {
            kind,
            bindings: Vec::new(),
            enclosing,
        }
    }

    /// Add a binding, builder style
    pub fn with_binding(mut self, name: &str, kind: BindingKind, location: BindingLocation) -> Self {
        self.bindings.push(BindingName::new(name, kind, location));
        self
    }

    /// Number of environment slots a record for this scope needs
    pub fn environment_slot_count(&self) -> usize {
        self.bindings
            .iter()
            .filter_map(|b| match b.location {
                BindingLocation::Environment(slot) => Some(slot as usize + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Whether any binding lives in an environment record
    pub fn has_environment(&self) -> bool {
        self.environment_slot_count() > 0
    }

    /// Find a binding stored in the given environment slot
    pub fn binding_for_slot(&self, slot: u32) -> Option<&BindingName> {
        self.bindings
            .iter()
            .find(|b| b.location == BindingLocation::Environment(slot))
    }

    /// Find an environment-stored binding by name
    pub fn lookup_environment_slot(&self, name: &str) -> Option<(u32, &BindingName)> {
        self.bindings.iter().find_map(|b| match b.location {
            BindingLocation::Environment(slot) if &*b.name == name => Some((slot, b)),
            _ => None,
        })
    }
}

/// Maps an instruction range to the innermost scope in effect there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeNote {
    /// Index into `Script::scopes`
    pub scope: u32,
    /// First instruction covered
    pub start: u32,
    /// Number of instructions covered
    pub length: u32,
}

impl ScopeNote {
    /// Whether the note covers `pc`
    pub fn contains(&self, pc: usize) -> bool {
        let start = self.start as usize;
        pc >= start && pc < start + self.length as usize
    }
}

/// The compile-time binding kind of one reference site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameLocation {
    /// Argument slot
    ArgumentSlot(u16),
    /// Frame slot
    FrameSlot(u32),
    /// Slot of an environment record some hops out
    EnvironmentCoordinate(EnvironmentCoordinate),
    /// Unknown until run time (`with`, sloppy eval)
    Dynamic,
    /// Global lexical scope or global object
    Global,
    /// Realm intrinsic, not shadowable by user code
    Intrinsic,
    /// Module import
    Import,
    /// Self binding of a named function expression
    NamedLambdaCallee,
}

impl NameLocation {
    /// The opcode reading the name at `atom`.
    pub fn get_op(self, atom: u32) -> Opcode {
        match self {
            NameLocation::ArgumentSlot(n) => Opcode::GetArg(n),
            NameLocation::FrameSlot(n) => Opcode::GetLocal(n),
            NameLocation::EnvironmentCoordinate(ec) => Opcode::GetAliasedVar(ec),
            NameLocation::Dynamic => Opcode::GetName(atom),
            NameLocation::Global => Opcode::GetGName(atom),
            NameLocation::Intrinsic => Opcode::GetIntrinsic(atom),
            NameLocation::Import => Opcode::GetImport(atom),
            NameLocation::NamedLambdaCallee => Opcode::Callee,
        }
    }

    /// The opcode preceding an assignment, if the binding kind needs the
    /// target environment on the stack.
    pub fn bind_op(self, atom: u32) -> Option<Opcode> {
        match self {
            NameLocation::Dynamic => Some(Opcode::BindName(atom)),
            NameLocation::Global => Some(Opcode::BindGName(atom)),
            _ => None,
        }
    }

    /// The opcode storing the top of stack into the name.
    ///
    /// Returns `None` where no store is emitted: imports are immutable, and a
    /// named-lambda callee assignment is a no-op in sloppy code and
    /// `ThrowSetCallee` in strict code.
    pub fn set_op(self, atom: u32, strict: bool) -> Option<Opcode> {
        match self {
            NameLocation::ArgumentSlot(n) => Some(Opcode::SetArg(n)),
            NameLocation::FrameSlot(n) => Some(Opcode::SetLocal(n)),
            NameLocation::EnvironmentCoordinate(ec) => Some(Opcode::SetAliasedVar(ec)),
            NameLocation::Dynamic if strict => Some(Opcode::StrictSetName(atom)),
            NameLocation::Dynamic => Some(Opcode::SetName(atom)),
            NameLocation::Global if strict => Some(Opcode::StrictSetGName(atom)),
            NameLocation::Global => Some(Opcode::SetGName(atom)),
            NameLocation::Intrinsic => Some(Opcode::SetIntrinsic(atom)),
            NameLocation::NamedLambdaCallee if strict => Some(Opcode::ThrowSetCallee),
            NameLocation::NamedLambdaCallee | NameLocation::Import => None,
        }
    }

    /// The opcode initializing a lexical binding.
    pub fn init_op(self, atom: u32) -> Option<Opcode> {
        match self {
            NameLocation::FrameSlot(n) => Some(Opcode::InitLexical(n)),
            NameLocation::EnvironmentCoordinate(ec) => Some(Opcode::InitAliasedLexical(ec)),
            NameLocation::Global => Some(Opcode::InitGLexical(atom)),
            _ => None,
        }
    }

    /// The TDZ check emitted before a lexical read or write.
    pub fn check_lexical_op(self) -> Option<Opcode> {
        match self {
            NameLocation::FrameSlot(n) => Some(Opcode::CheckLexical(n)),
            NameLocation::EnvironmentCoordinate(ec) => Some(Opcode::CheckAliasedLexical(ec)),
            _ => None,
        }
    }

    /// The opcode computing `this` for an unqualified call of the name.
    pub fn implicit_this_op(self, atom: u32) -> Opcode {
        match self {
            NameLocation::Dynamic => Opcode::ImplicitThis(atom),
            NameLocation::Global => Opcode::GImplicitThis(atom),
            _ => Opcode::LoadUndefined,
        }
    }
}
