//! Environment records
//!
//! Captured bindings live in heap-allocated environment records chained
//! through `parent`. A record's `scope` is the static descriptor from the
//! compiled script, which maps names to slots; the record itself only stores
//! slot values. Records that wrap an object (`with`, non-syntactic scopes,
//! the global object) resolve names through property lookups instead.

use std::rc::Rc;

use bytecode_system::{BindingKind, BindingLocation, ScopeData};
use core_types::{Magic, ObjectId, Value};
use indexmap::IndexMap;
use memory_manager::{Trace, Tracer};

use crate::object::{JsObject, ObjectClass};
use crate::vm::VM;

/// A module import: the binding `name` of the module environment `module`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportBinding {
    /// Environment of the exporting module
    pub module: ObjectId,
    /// Exported binding name
    pub name: Rc<str>,
}

/// A top-level `let`/`const`/`class` binding.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalLexicalBinding {
    /// Current value, uninitialized until `InitGLexical`
    pub value: Value,
    /// Declared with `const`
    pub constant: bool,
}

/// What kind of scope a record implements.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvironmentKind {
    /// Function body with aliased formals and locals
    Call,
    /// Block scope
    Lexical,
    /// Separate var scope
    Var,
    /// Self binding of a named function expression
    NamedLambda,
    /// Module top level
    Module {
        /// Imported names
        imports: IndexMap<Rc<str>, ImportBinding>,
    },
    /// `with (object)` scope
    With {
        /// The scope object
        object: ObjectId,
    },
    /// Embedder-supplied scope object
    NonSyntactic {
        /// The scope object
        object: ObjectId,
    },
    /// Top-level lexical declarations over the global object
    GlobalLexical {
        /// Declared bindings
        bindings: IndexMap<Rc<str>, GlobalLexicalBinding>,
        /// The global object
        global: ObjectId,
    },
    /// Debugger wrapper forwarding every lookup to `target`
    DebugProxy {
        /// Wrapped environment
        target: ObjectId,
    },
}

/// One link of an environment chain.
#[derive(Debug, Clone)]
pub struct EnvironmentRecord {
    /// Scope kind and kind-specific state
    pub kind: EnvironmentKind,
    /// Enclosing environment
    pub parent: Option<ObjectId>,
    /// Static descriptor mapping names to slots
    pub scope: Option<Rc<ScopeData>>,
    /// Slot values
    pub slots: Vec<Value>,
}

impl EnvironmentRecord {
    /// A record for `scope` with fresh slots.
    ///
    /// Lexical bindings start in the temporal dead zone, everything else
    /// starts undefined.
    pub fn for_scope(kind: EnvironmentKind, scope: Rc<ScopeData>, parent: Option<ObjectId>) -> Self {
        let mut slots = vec![Value::Undefined; scope.environment_slot_count()];
        for binding in &scope.bindings {
            if let BindingLocation::Environment(slot) = binding.location {
                if binding.kind.is_lexical() {
                    slots[slot as usize] = Value::Magic(Magic::UninitializedLexical);
                }
            }
        }
        Self {
            kind,
            parent,
            scope: Some(scope),
            slots,
        }
    }

    /// A record without a static scope
    pub fn bare(kind: EnvironmentKind, parent: Option<ObjectId>) -> Self {
        Self {
            kind,
            parent,
            scope: None,
            slots: Vec::new(),
        }
    }

    /// Slot and declaration kind of `name` in this record's scope
    pub fn lookup_slot(&self, name: &str) -> Option<(u32, BindingKind)> {
        self.scope
            .as_ref()
            .and_then(|scope| scope.lookup_environment_slot(name))
            .map(|(slot, binding)| (slot, binding.kind))
    }

    /// Name declared for `slot`, for diagnostics
    pub fn slot_name(&self, slot: u32) -> Option<Rc<str>> {
        self.scope
            .as_ref()
            .and_then(|scope| scope.binding_for_slot(slot))
            .map(|binding| binding.name.clone())
    }

    /// The object supplying bindings, for object-backed records
    pub fn binding_object(&self) -> Option<ObjectId> {
        match &self.kind {
            EnvironmentKind::With { object } | EnvironmentKind::NonSyntactic { object } => Some(*object),
            EnvironmentKind::GlobalLexical { global, .. } => Some(*global),
            _ => None,
        }
    }
}

impl Trace for EnvironmentRecord {
    fn trace(&self, tracer: &mut Tracer) {
        self.parent.trace(tracer);
        tracer.mark_values(&self.slots);
        match &self.kind {
            EnvironmentKind::Module { imports } => {
                for import in imports.values() {
                    tracer.mark(import.module);
                }
            }
            EnvironmentKind::With { object } | EnvironmentKind::NonSyntactic { object } => tracer.mark(*object),
            EnvironmentKind::GlobalLexical { bindings, global } => {
                tracer.mark(*global);
                for binding in bindings.values() {
                    tracer.mark_value(&binding.value);
                }
            }
            EnvironmentKind::DebugProxy { target } => tracer.mark(*target),
            EnvironmentKind::Call | EnvironmentKind::Lexical | EnvironmentKind::Var | EnvironmentKind::NamedLambda => {}
        }
    }
}

impl VM {
    /// Allocate an environment record.
    pub(crate) fn alloc_environment(&mut self, record: EnvironmentRecord) -> ObjectId {
        self.alloc(JsObject::new(None, ObjectClass::Environment(record)))
    }

    /// Resolve an environment handle.
    pub(crate) fn env(&self, id: ObjectId) -> &EnvironmentRecord {
        match self.object(id).environment() {
            Some(env) => env,
            None => crate::fatal!("object {} is not an environment", id),
        }
    }

    /// Resolve an environment handle mutably.
    pub(crate) fn env_mut(&mut self, id: ObjectId) -> &mut EnvironmentRecord {
        match self.object_mut(id).environment_mut() {
            Some(env) => env,
            None => crate::fatal!("object {} is not an environment", id),
        }
    }

    /// Enclosing environment of `id`.
    pub(crate) fn env_parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.env(id).parent
    }

    /// Walk `hops` links outward from `env`.
    pub(crate) fn env_at_hops(&self, env: ObjectId, hops: u8) -> ObjectId {
        let mut current = env;
        for _ in 0..hops {
            current = match self.env_parent(current) {
                Some(parent) => parent,
                None => crate::fatal!("environment chain shorter than {} hops", hops),
            };
        }
        current
    }

    /// Skip debugger proxies, returning the environment they forward to.
    pub(crate) fn unwrap_debug_proxy(&self, mut env: ObjectId) -> ObjectId {
        while let EnvironmentKind::DebugProxy { target } = self.env(env).kind {
            env = target;
        }
        env
    }

    /// Copy of `env` with the same scope, parent and slot values.
    pub(crate) fn clone_environment(&mut self, env: ObjectId) -> ObjectId {
        let record = self.env(env).clone();
        self.alloc_environment(record)
    }

    /// Fresh record for the same scope as `env`, all bindings reset.
    pub(crate) fn recreate_environment(&mut self, env: ObjectId) -> ObjectId {
        let record = self.env(env);
        let record = match &record.scope {
            Some(scope) => EnvironmentRecord::for_scope(record.kind.clone(), scope.clone(), record.parent),
            None => EnvironmentRecord::bare(record.kind.clone(), record.parent),
        };
        self.alloc_environment(record)
    }

    /// Read slot `slot` of `env`, checking the temporal dead zone.
    pub(crate) fn env_slot(&self, env: ObjectId, slot: u32) -> Value {
        match self.env(env).slots.get(slot as usize) {
            Some(value) => value.clone(),
            None => crate::fatal!("environment slot {} out of range", slot),
        }
    }

    /// Write slot `slot` of `env`.
    pub(crate) fn set_env_slot(&mut self, env: ObjectId, slot: u32, value: Value) {
        match self.env_mut(env).slots.get_mut(slot as usize) {
            Some(target) => *target = value,
            None => crate::fatal!("environment slot {} out of range", slot),
        }
    }

    /// Name bound to `slot` of `env`, or `"?"` if unknown.
    pub(crate) fn env_slot_name(&self, env: ObjectId, slot: u32) -> Rc<str> {
        self.env(env).slot_name(slot).unwrap_or_else(|| Rc::from("?"))
    }

    /// The nearest enclosing module environment.
    pub(crate) fn module_environment(&self, mut env: ObjectId) -> Option<ObjectId> {
        loop {
            let record = self.env(env);
            if let EnvironmentKind::Module { .. } = record.kind {
                return Some(env);
            }
            env = match &record.kind {
                EnvironmentKind::DebugProxy { target } => *target,
                _ => record.parent?,
            };
        }
    }
}
