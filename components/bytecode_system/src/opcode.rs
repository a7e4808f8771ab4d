//! Bytecode opcodes for the stack interpreter
//!
//! Every opcode documents its operand-stack effect as `[before] -> [after]`,
//! top of stack on the right. Jump operands are absolute instruction indices.
//! Index operands refer to the owning [`Script`](crate::Script)'s pools:
//! `atom` indices name entries of `Script::atoms`, `function` indices name
//! entries of `Script::functions`, `scope` indices name entries of
//! `Script::scopes`.

use std::fmt;

/// Address of an aliased binding: walk `hops` environments outward from the
/// current one, then read slot `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvironmentCoordinate {
    /// Number of enclosing environments to skip
    pub hops: u8,
    /// Slot within the target environment
    pub slot: u32,
}

impl EnvironmentCoordinate {
    /// Create a coordinate
    pub fn new(hops: u8, slot: u32) -> Self {
        Self { hops, slot }
    }
}

impl fmt::Display for EnvironmentCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hops {} slot {}", self.hops, self.slot)
    }
}

/// How a suspended generator is being resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorResumeKind {
    /// `next(value)`
    Next,
    /// `throw(value)`
    Throw,
    /// `return(value)`
    Return,
}

impl GeneratorResumeKind {
    /// Encoding used when the kind travels on the operand stack.
    pub fn to_i32(self) -> i32 {
        match self {
            GeneratorResumeKind::Next => 0,
            GeneratorResumeKind::Throw => 1,
            GeneratorResumeKind::Return => 2,
        }
    }

    /// Decode a kind pushed by `ResumeKind` or by a resumption.
    pub fn from_i32(n: i32) -> Option<Self> {
        match n {
            0 => Some(GeneratorResumeKind::Next),
            1 => Some(GeneratorResumeKind::Throw),
            2 => Some(GeneratorResumeKind::Return),
            _ => None,
        }
    }
}

/// Canned errors raised by `ThrowMsg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrowMsgKind {
    /// Assignment to a const binding whose name is not known statically
    AssignToConst,
    /// A `yield*` delegate lacks a `throw` method
    IteratorNoThrow,
    /// Deleting a `super` property
    CantDeleteSuper,
    /// A private field initialized twice on the same object
    PrivateDoubleInit,
}

impl ThrowMsgKind {
    /// The TypeError message for this kind.
    pub fn message(self) -> &'static str {
        match self {
            ThrowMsgKind::AssignToConst => "invalid assignment to const",
            ThrowMsgKind::IteratorNoThrow => "iterator does not have a 'throw' method",
            ThrowMsgKind::CantDeleteSuper => "invalid delete involving 'super'",
            ThrowMsgKind::PrivateDoubleInit => "Initializing an object twice is an error with private fields",
        }
    }
}

/// Bytecode opcodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Opcode {
    // ------------------------------------------------------------------
    // Literals and stack shuffling
    // ------------------------------------------------------------------
    /// `[] -> [constants[idx]]`
    LoadConstant(u32),
    /// `[] -> [int]`
    LoadInt(i32),
    /// `[] -> [undefined]`
    LoadUndefined,
    /// `[] -> [null]`
    LoadNull,
    /// `[] -> [true]`
    LoadTrue,
    /// `[] -> [false]`
    LoadFalse,
    /// `[] -> [uninitialized-lexical sentinel]`
    Uninitialized,
    /// `[v] -> []`
    Pop,
    /// Pop `n` values
    PopN(u16),
    /// `[v] -> [v, v]`
    Dup,
    /// `[a, b] -> [a, b, a, b]`
    Dup2,
    /// Push a copy of the value `n` slots below the top (`DupAt(0)` is `Dup`)
    DupAt(u16),
    /// `[a, b] -> [b, a]`
    Swap,
    /// Move the value `n` slots below the top to the top
    Pick(u8),
    /// Move the top value down `n` slots
    Unpick(u8),

    // ------------------------------------------------------------------
    // Arithmetic and coercion
    // ------------------------------------------------------------------
    /// `[a, b] -> [a + b]`
    Add,
    /// `[a, b] -> [a - b]`
    Sub,
    /// `[a, b] -> [a * b]`
    Mul,
    /// `[a, b] -> [a / b]`
    Div,
    /// `[a, b] -> [a % b]`
    Mod,
    /// `[a, b] -> [a ** b]`
    Pow,
    /// `[a, b] -> [a | b]`
    BitOr,
    /// `[a, b] -> [a ^ b]`
    BitXor,
    /// `[a, b] -> [a & b]`
    BitAnd,
    /// `[a, b] -> [a << b]`
    Lsh,
    /// `[a, b] -> [a >> b]`
    Rsh,
    /// `[a, b] -> [a >>> b]`
    Ursh,
    /// `[v] -> [+v]`
    Pos,
    /// `[v] -> [-v]`
    Neg,
    /// `[v] -> [~v]`
    BitNot,
    /// `[v] -> [!v]`
    Not,
    /// `[n] -> [n + 1]` on an already-numeric operand
    Inc,
    /// `[n] -> [n - 1]` on an already-numeric operand
    Dec,
    /// `[v] -> [ToNumeric(v)]`
    ToNumeric,
    /// `[v] -> [ToString(v)]`
    ToString,
    /// `[v] -> [typeof v]`
    Typeof,
    /// `[v] -> [undefined]`
    Void,

    // ------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------
    /// `[a, b] -> [a == b]`
    Eq,
    /// `[a, b] -> [a != b]`
    Ne,
    /// `[a, b] -> [a === b]`
    StrictEq,
    /// `[a, b] -> [a !== b]`
    StrictNe,
    /// `[a, b] -> [a < b]`
    Lt,
    /// `[a, b] -> [a <= b]`
    Le,
    /// `[a, b] -> [a > b]`
    Gt,
    /// `[a, b] -> [a >= b]`
    Ge,
    /// `[obj, ctor] -> [obj instanceof ctor]`
    Instanceof,
    /// `[key, obj] -> [key in obj]`
    In,

    // ------------------------------------------------------------------
    // Control flow
    // ------------------------------------------------------------------
    /// Unconditional jump
    Goto(u32),
    /// `[v] -> []`, jump if `v` is falsy
    IfEq(u32),
    /// `[v] -> []`, jump if `v` is truthy
    IfNe(u32),
    /// `[v] -> [v]`, jump if `v` is falsy
    And(u32),
    /// `[v] -> [v]`, jump if `v` is truthy
    Or(u32),
    /// `[v] -> [v]`, jump if `v` is neither undefined nor null
    Coalesce(u32),
    /// Loop header; back-edges target it. Interrupt and tier-up point.
    LoopHead,
    /// No operation
    Nop,
    /// `[v] -> []`, return `v` from the frame
    Return,
    /// Return the frame's return-value slot
    RetRval,
    /// `[v] -> []`, store `v` in the return-value slot
    SetRval,
    /// `[] -> [rval]`
    GetRval,

    // ------------------------------------------------------------------
    // Names, one group per binding kind
    // ------------------------------------------------------------------
    /// `[] -> [args[n]]`
    GetArg(u16),
    /// `[v] -> [v]`, `args[n] = v`
    SetArg(u16),
    /// `[] -> [locals[n]]`
    GetLocal(u32),
    /// `[v] -> [v]`, `locals[n] = v`
    SetLocal(u32),
    /// `[v] -> [v]`, initialize a lexical local
    InitLexical(u32),
    /// `[] -> []`, throw if the lexical local is uninitialized
    CheckLexical(u32),
    /// Throw for an assignment to the const local `n`
    ThrowSetConst(u32),
    /// `[] -> [env.slot]`
    GetAliasedVar(EnvironmentCoordinate),
    /// `[v] -> [v]`, `env.slot = v`
    SetAliasedVar(EnvironmentCoordinate),
    /// `[v] -> [v]`, initialize an aliased lexical
    InitAliasedLexical(EnvironmentCoordinate),
    /// `[] -> []`, throw if the aliased lexical is uninitialized
    CheckAliasedLexical(EnvironmentCoordinate),
    /// Throw for an assignment to the aliased const
    ThrowSetAliasedConst(EnvironmentCoordinate),
    /// `[] -> [value]` via a dynamic walk of the environment chain
    GetName(u32),
    /// `[env] -> [value]` reading the name from an environment found by `BindName`
    GetBoundName(u32),
    /// `[] -> [env]`, the environment or object holding the name
    BindName(u32),
    /// `[env, v] -> [v]` in sloppy code
    SetName(u32),
    /// `[env, v] -> [v]` in strict code
    StrictSetName(u32),
    /// `[] -> [succeeded]`, delete an unqualified name
    DelName(u32),
    /// `[] -> [value]` from the global lexical scope or the global object
    GetGName(u32),
    /// `[] -> [env]`, global lexical environment or global object
    BindGName(u32),
    /// `[env, v] -> [v]` in sloppy code
    SetGName(u32),
    /// `[env, v] -> [v]` in strict code
    StrictSetGName(u32),
    /// `[v] -> [v]`, initialize a global lexical binding
    InitGLexical(u32),
    /// Declare a global `var`
    DefVar(u32),
    /// Declare a global `let`
    DefLet(u32),
    /// Declare a global `const`
    DefConst(u32),
    /// `[fun] -> []`, declare a global function
    DefFun,
    /// `[] -> [intrinsic]`
    GetIntrinsic(u32),
    /// `[v] -> [v]`, replace an intrinsic
    SetIntrinsic(u32),
    /// `[] -> [value]` of a module import
    GetImport(u32),
    /// `[] -> [callee]`, the named-lambda self binding
    Callee,
    /// Throw for an assignment to the named-lambda binding in strict code
    ThrowSetCallee,
    /// `[] -> [this]` for an unqualified call of the name
    ImplicitThis(u32),
    /// `[] -> [this]` for an unqualified call of a global name
    GImplicitThis(u32),

    // ------------------------------------------------------------------
    // Environments
    // ------------------------------------------------------------------
    /// Push a block environment for `scopes[n]`
    PushLexicalEnv(u32),
    /// Pop the innermost block environment
    PopLexicalEnv,
    /// Replace the innermost block environment with a copy (per-iteration bindings)
    FreshenLexicalEnv,
    /// Replace the innermost block environment with a fresh, uninitialized one
    RecreateLexicalEnv,
    /// Push a var environment for `scopes[n]`
    PushVarEnv(u32),
    /// `[obj] -> []`, push a `with` environment for `scopes[n]`
    EnterWith(u32),
    /// Pop the innermost `with` environment
    LeaveWith,

    // ------------------------------------------------------------------
    // Objects and properties
    // ------------------------------------------------------------------
    /// `[] -> [obj]`
    NewObject,
    /// `[] -> [arr]` with capacity `n`
    NewArray(u32),
    /// `[proto] -> [obj]`
    ObjWithProto,
    /// `[obj, v] -> [obj]`, define an enumerable data property
    InitProp(u32),
    /// `[obj, v] -> [obj]`, define a non-enumerable data property
    InitHiddenProp(u32),
    /// `[obj, key, v] -> [obj]`
    InitElem,
    /// `[arr, v] -> [arr]`, store at a fixed index
    InitElemArray(u32),
    /// `[fun, homeObject] -> [fun]`
    InitHomeObject,
    /// `[obj] -> [obj.atom]`
    GetProp(u32),
    /// `[obj, v] -> [v]` in sloppy code
    SetProp(u32),
    /// `[obj, v] -> [v]` in strict code
    StrictSetProp(u32),
    /// `[obj, key] -> [obj[key]]`
    GetElem,
    /// `[obj, key, v] -> [v]` in sloppy code
    SetElem,
    /// `[obj, key, v] -> [v]` in strict code
    StrictSetElem,
    /// `[obj] -> [succeeded]` in sloppy code
    DelProp(u32),
    /// `[obj] -> [true]` in strict code
    StrictDelProp(u32),
    /// `[obj, key] -> [succeeded]` in sloppy code
    DelElem,
    /// `[obj, key] -> [true]` in strict code
    StrictDelElem,
    /// `[homeObject] -> [homeObject.[[Prototype]]]`
    SuperBase,
    /// `[receiver, obj] -> [value]`
    GetPropSuper(u32),
    /// `[receiver, obj, v] -> [v]` in sloppy code
    SetPropSuper(u32),
    /// `[receiver, obj, v] -> [v]` in strict code
    StrictSetPropSuper(u32),
    /// `[] -> [homeObject]` of the running method
    HomeObject,

    // ------------------------------------------------------------------
    // Functions, this and classes
    // ------------------------------------------------------------------
    /// `[] -> [fun]` closing over the current environment
    Lambda(u32),
    /// `[newTarget] -> [fun]` for an arrow function
    LambdaArrow(u32),
    /// `[] -> [this]` of the function frame
    FunctionThis,
    /// `[] -> [globalThis]`
    GlobalThis,
    /// `[] -> [new.target]`
    NewTarget,
    /// `[] -> [arguments]`
    Arguments,
    /// `[] -> [rest array]` of the arguments past the formals
    Rest,
    /// `[this] -> [this]`, throw if `this` is uninitialized
    CheckThis,
    /// `[this] -> [this]`, throw if `this` is already initialized
    CheckThisReinit,
    /// `[this] -> []`, validate the return value of a derived constructor
    CheckReturn,
    /// `[callee] -> [superConstructor]`
    SuperFun,
    /// `[] -> [ctor]`, default base-class constructor named `atoms[name]`
    ClassConstructor {
        /// Atom index of the class name
        name: u32,
        /// Index into `Script::spans` of the class source
        span: u32,
    },
    /// `[proto] -> [ctor]`, default derived-class constructor
    DerivedConstructor {
        /// Atom index of the class name
        name: u32,
        /// Index into `Script::spans` of the class source
        span: u32,
    },

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------
    /// `[callee, this, args...] -> [rval]`
    Call(u16),
    /// Like `Call`; the result is unused
    CallIgnoresRv(u16),
    /// `[callee, args..., newTarget] -> [obj]`
    New(u16),
    /// `[callee, args..., newTarget] -> [obj]`, the result initializes `this`
    SuperCall(u16),
    /// `[callee, this, argsArray] -> [rval]`
    SpreadCall,
    /// `[callee, argsArray, newTarget] -> [obj]`
    SpreadNew,
    /// `[callee, argsArray, newTarget] -> [obj]`
    SpreadSuperCall,

    // ------------------------------------------------------------------
    // Exceptions
    // ------------------------------------------------------------------
    /// Marks the start of a try block
    Try,
    /// Marks the start of a destructuring region
    TryDestructuring,
    /// `[] -> [exception]`, take the pending exception
    Exception,
    /// `[v] -> []`, throw `v`
    Throw,
    /// Throw a canned TypeError
    ThrowMsg(ThrowMsgKind),
    /// `[] -> [resumeIndex]`
    ResumeIndex(u32),
    /// `[false, resumeIndex] -> [false, resumeIndex]`, jump into a finally block
    Gosub(u32),
    /// `[flag, value] -> []`, leave a finally block
    Retsub,
    /// Start of a finally block
    Finally,

    // ------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------
    /// `[obj] -> [forInIterator]`
    Iter,
    /// `[iter] -> [iter, key | no-iter-value]`
    MoreIter,
    /// `[v] -> [v, v is no-iter-value]`
    IsNoIter,
    /// `[iter, v] -> []`, close a for-in iterator
    EndIter,
    /// `[obj] -> [iterator, next]`
    GetIterator,
    /// `[iterator, next] -> [iterator, next, result]`
    IteratorNext,
    /// `[iterator] -> []`, normal-completion iterator close
    CloseIter,

    // ------------------------------------------------------------------
    // Generators and async functions
    // ------------------------------------------------------------------
    /// `[] -> [gen]`, create the generator object for this frame
    Generator,
    /// `[gen] -> [value, gen, kind]` after the first resumption
    InitialYield,
    /// `[value, gen] -> [value, gen, kind]` after resumption
    Yield,
    /// `[value, gen] -> [value, gen, kind]` after resumption
    Await,
    /// Resumption landing point
    AfterYield,
    /// `[] -> [kind]`
    ResumeKind(GeneratorResumeKind),
    /// `[value, gen, kind] -> [value]`, throw or close for non-`next` kinds
    CheckResumeKind,
    /// `[gen, value, kind] -> [result]`
    Resume,
    /// `[gen] -> []`, finish the generator with the return-value slot
    FinalYieldRval,
    /// `[v] -> [v, v is generator-closing]`
    IsGenClosing,

    // ------------------------------------------------------------------
    // Debugger
    // ------------------------------------------------------------------
    /// `debugger` statement
    Debugger,
}

impl Opcode {
    /// The jump target, for opcodes that may transfer control.
    pub fn jump_target(&self) -> Option<u32> {
        match *self {
            Opcode::Goto(t)
            | Opcode::IfEq(t)
            | Opcode::IfNe(t)
            | Opcode::And(t)
            | Opcode::Or(t)
            | Opcode::Coalesce(t)
            | Opcode::Gosub(t) => Some(t),
            _ => None,
        }
    }

    /// Redirect the jump target of a jump opcode.
    pub fn set_jump_target(&mut self, target: u32) -> bool {
        match self {
            Opcode::Goto(t)
            | Opcode::IfEq(t)
            | Opcode::IfNe(t)
            | Opcode::And(t)
            | Opcode::Or(t)
            | Opcode::Coalesce(t)
            | Opcode::Gosub(t) => {
                *t = target;
                true
            }
            _ => false,
        }
    }

    /// Check if this opcode ends a basic block unconditionally
    pub fn is_unconditional_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Return
                | Opcode::RetRval
                | Opcode::Goto(_)
                | Opcode::Throw
                | Opcode::ThrowMsg(_)
                | Opcode::Retsub
                | Opcode::FinalYieldRval
        )
    }

    /// Check if this opcode suspends a generator or async function
    pub fn is_suspension(&self) -> bool {
        matches!(self, Opcode::InitialYield | Opcode::Yield | Opcode::Await)
    }

    /// Check if this opcode is a binary arithmetic operation
    pub fn is_binary_arithmetic(&self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::Pow
                | Opcode::BitOr
                | Opcode::BitXor
                | Opcode::BitAnd
                | Opcode::Lsh
                | Opcode::Rsh
                | Opcode::Ursh
        )
    }

    /// Check if this opcode invokes a callable
    pub fn is_call(&self) -> bool {
        matches!(
            self,
            Opcode::Call(_)
                | Opcode::CallIgnoresRv(_)
                | Opcode::New(_)
                | Opcode::SuperCall(_)
                | Opcode::SpreadCall
                | Opcode::SpreadNew
                | Opcode::SpreadSuperCall
        )
    }
}
