//! Minimal object model
//!
//! Objects live in the VM's traced heap as [`JsObject`] values addressed by
//! [`ObjectId`]. An object is an insertion-ordered property table, a
//! prototype link, an extensibility bit and an [`ObjectClass`] holding the
//! internal state of exotic kinds (arrays, functions, environments,
//! generators, promises and so on).
//!
//! Property operations that can run user code (getters, proxy traps) live on
//! the VM in [`ops`].

pub mod ops;

use std::fmt;
use std::rc::Rc;

use bytecode_system::Script;
use core_types::{ErrorKind, JsResult, ObjectId, SourceSpan, StackFrame, Symbol, Value};
use indexmap::IndexMap;
use memory_manager::{SharedBufferRef, Trace, Tracer};

use crate::environment::EnvironmentRecord;
use crate::generator::GeneratorData;
use crate::promise_integration::PromiseData;
use crate::vm::VM;

/// Largest valid array index plus one.
pub const MAX_ARRAY_LENGTH: u64 = u32::MAX as u64;

/// A property name.
///
/// Canonical array-index strings are normalized to [`PropertyKey::Index`] so
/// that `o[1]` and `o["1"]` address the same property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String-named property
    String(Rc<str>),
    /// Symbol-keyed property
    Symbol(Symbol),
    /// Array index
    Index(u32),
}

impl PropertyKey {
    /// Key for a string, normalizing canonical array indices
    pub fn from_name(s: &str) -> Self {
        match parse_array_index(s) {
            Some(i) => PropertyKey::Index(i),
            None => PropertyKey::String(Rc::from(s)),
        }
    }

    /// Key for an `Rc<str>` without copying when it is not an index
    pub fn from_rc(s: Rc<str>) -> Self {
        match parse_array_index(&s) {
            Some(i) => PropertyKey::Index(i),
            None => PropertyKey::String(s),
        }
    }

    /// Array index, if this key is one
    pub fn as_index(&self) -> Option<u32> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// Whether the key is a symbol
    pub fn is_symbol(&self) -> bool {
        matches!(self, PropertyKey::Symbol(_))
    }

    /// The key as a script value
    pub fn to_value(&self) -> Value {
        match self {
            PropertyKey::String(s) => Value::String(s.clone()),
            PropertyKey::Symbol(sym) => Value::Symbol(sym.clone()),
            PropertyKey::Index(i) => Value::from(i.to_string()),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::from_name(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        PropertyKey::Index(i)
    }
}

impl From<Symbol> for PropertyKey {
    fn from(sym: Symbol) -> Self {
        PropertyKey::Symbol(sym)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => f.write_str(s),
            PropertyKey::Symbol(sym) => write!(f, "Symbol({})", sym.description().unwrap_or("")),
            PropertyKey::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Parse a canonical array index ("0", "17", never "017" or "4294967295").
pub fn parse_array_index(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 10 {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u64 = s.parse().ok()?;
    if n < MAX_ARRAY_LENGTH {
        Some(n as u32)
    } else {
        None
    }
}

/// Storage of one property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertySlot {
    /// Plain value
    Data {
        /// Current value
        value: Value,
        /// Whether assignment may change the value
        writable: bool,
    },
    /// Getter/setter pair
    Accessor {
        /// Getter function
        getter: Option<ObjectId>,
        /// Setter function
        setter: Option<ObjectId>,
    },
}

/// A property with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Value or accessors
    pub slot: PropertySlot,
    /// Visible to for-in
    pub enumerable: bool,
    /// May be deleted or redefined
    pub configurable: bool,
}

impl Property {
    /// Writable, enumerable, configurable data property
    pub fn data(value: Value) -> Self {
        Self {
            slot: PropertySlot::Data {
                value,
                writable: true,
            },
            enumerable: true,
            configurable: true,
        }
    }

    /// Writable, configurable, non-enumerable data property
    pub fn hidden(value: Value) -> Self {
        Self {
            slot: PropertySlot::Data {
                value,
                writable: true,
            },
            enumerable: false,
            configurable: true,
        }
    }

    /// Read-only, non-enumerable, configurable data property
    pub fn readonly(value: Value) -> Self {
        Self {
            slot: PropertySlot::Data {
                value,
                writable: false,
            },
            enumerable: false,
            configurable: true,
        }
    }

    /// Data property with explicit attributes
    pub fn with_attributes(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            slot: PropertySlot::Data { value, writable },
            enumerable,
            configurable,
        }
    }

    /// Accessor property
    pub fn accessor(getter: Option<ObjectId>, setter: Option<ObjectId>) -> Self {
        Self {
            slot: PropertySlot::Accessor { getter, setter },
            enumerable: false,
            configurable: true,
        }
    }

    /// The stored value of a data property
    pub fn value(&self) -> Option<&Value> {
        match &self.slot {
            PropertySlot::Data { value, .. } => Some(value),
            PropertySlot::Accessor { .. } => None,
        }
    }
}

/// Native function signature.
pub type NativeFn = fn(&mut VM, &CallArgs) -> JsResult<Value>;

/// Arguments of a call, as seen by a native function.
#[derive(Debug, Clone)]
pub struct CallArgs {
    /// The function being called
    pub callee: ObjectId,
    /// The `this` value
    pub this: Value,
    /// Actual arguments
    pub args: Vec<Value>,
    /// `new.target`, undefined for plain calls
    pub new_target: Value,
}

impl CallArgs {
    /// Argument `i`, or undefined when absent
    pub fn arg(&self, i: usize) -> Value {
        self.args.get(i).cloned().unwrap_or(Value::Undefined)
    }

    /// Whether the call was a construct call
    pub fn is_construct(&self) -> bool {
        !self.new_target.is_undefined()
    }
}

/// Callable internals of a function object.
#[derive(Debug, Clone)]
pub enum FunctionKind {
    /// Bytecode function closing over an environment
    Interpreted {
        /// Compiled body
        script: Rc<Script>,
        /// Captured environment
        env: ObjectId,
        /// `this` captured by an arrow function
        bound_this: Option<Value>,
        /// `new.target` captured by an arrow function
        bound_new_target: Option<Value>,
        /// Home object for `super` lookups
        home_object: Option<ObjectId>,
        /// Reported source extent, overriding the script's
        source_span: Option<SourceSpan>,
    },
    /// Host function
    Native {
        /// Entry point
        func: NativeFn,
        /// Whether `new` is allowed
        constructor: bool,
    },
}

/// Internal state of a function object.
#[derive(Debug, Clone)]
pub struct FunctionData {
    /// Function name
    pub name: Rc<str>,
    /// Callable internals
    pub kind: FunctionKind,
}

impl FunctionData {
    /// The compiled body of an interpreted function
    pub fn script(&self) -> Option<&Rc<Script>> {
        match &self.kind {
            FunctionKind::Interpreted { script, .. } => Some(script),
            FunctionKind::Native { .. } => None,
        }
    }

    /// Whether the function can be invoked with `new`
    pub fn is_constructor(&self) -> bool {
        match &self.kind {
            FunctionKind::Interpreted { script, .. } => script.is_constructor(),
            FunctionKind::Native { constructor, .. } => *constructor,
        }
    }

    /// Reported source extent
    pub fn source_span(&self) -> Option<SourceSpan> {
        match &self.kind {
            FunctionKind::Interpreted {
                script,
                source_span,
                ..
            } => Some(source_span.unwrap_or(script.source_span)),
            FunctionKind::Native { .. } => None,
        }
    }
}

/// State of a proxy object; both handles are cleared on revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyData {
    /// Wrapped object
    pub target: Option<ObjectId>,
    /// Trap holder
    pub handler: Option<ObjectId>,
    /// Whether the target was callable at creation
    pub callable: bool,
    /// Whether the target was a constructor at creation
    pub constructor: bool,
}

/// Cursor of a for-in enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct ForInIterator {
    /// Object being enumerated
    pub object: Option<ObjectId>,
    /// Keys snapshotted at `Iter`
    pub keys: Vec<Rc<str>>,
    /// Next key to hand out
    pub index: usize,
}

/// Cursor of an array iterator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayIteratorData {
    /// Iterated array, cleared once exhausted
    pub array: Option<ObjectId>,
    /// Next index
    pub index: u32,
}

/// Exotic behaviour and internal slots of an object.
#[derive(Debug)]
pub enum ObjectClass {
    /// Plain object
    Ordinary,
    /// Array with dense elements
    Array(Vec<Value>),
    /// Unmapped arguments object
    Arguments(Vec<Value>),
    /// Function
    Function(FunctionData),
    /// Proxy
    Proxy(ProxyData),
    /// Error object with its stack snapshot
    Error {
        /// Error constructor kind
        kind: ErrorKind,
        /// Stack at creation
        stack: Vec<StackFrame>,
    },
    /// Boolean wrapper
    BooleanWrapper(bool),
    /// Number wrapper
    NumberWrapper(f64),
    /// String wrapper
    StringWrapper(Rc<str>),
    /// Symbol wrapper
    SymbolWrapper(Symbol),
    /// BigInt wrapper
    BigIntWrapper(Value),
    /// Environment record
    Environment(EnvironmentRecord),
    /// Generator or async function state
    Generator(GeneratorData),
    /// Promise
    Promise(PromiseData),
    /// for-in enumeration state
    ForInIterator(ForInIterator),
    /// Array iterator state
    ArrayIterator(ArrayIteratorData),
    /// SharedArrayBuffer over a raw shared buffer
    SharedArrayBuffer(SharedBufferRef),
}

impl ObjectClass {
    /// Class name used by `Object.prototype.toString`
    pub fn class_name(&self) -> &'static str {
        match self {
            ObjectClass::Array(_) => "Array",
            ObjectClass::Arguments(_) => "Arguments",
            ObjectClass::Function(_) => "Function",
            ObjectClass::Error { .. } => "Error",
            ObjectClass::BooleanWrapper(_) => "Boolean",
            ObjectClass::NumberWrapper(_) => "Number",
            ObjectClass::StringWrapper(_) => "String",
            ObjectClass::Generator(_) => "Generator",
            ObjectClass::Promise(_) => "Promise",
            ObjectClass::SharedArrayBuffer(_) => "SharedArrayBuffer",
            _ => "Object",
        }
    }
}

/// A heap object.
#[derive(Debug)]
pub struct JsObject {
    /// `[[Prototype]]`
    pub prototype: Option<ObjectId>,
    /// `[[Extensible]]`
    pub extensible: bool,
    /// Own properties in insertion order (array elements excluded)
    pub properties: IndexMap<PropertyKey, Property>,
    /// Exotic kind
    pub class: ObjectClass,
}

impl JsObject {
    /// Create an object with the given prototype and class
    pub fn new(prototype: Option<ObjectId>, class: ObjectClass) -> Self {
        Self {
            prototype,
            extensible: true,
            properties: IndexMap::new(),
            class,
        }
    }

    /// Plain object
    pub fn ordinary(prototype: Option<ObjectId>) -> Self {
        Self::new(prototype, ObjectClass::Ordinary)
    }

    /// Function data, if this is a function
    pub fn function(&self) -> Option<&FunctionData> {
        match &self.class {
            ObjectClass::Function(data) => Some(data),
            _ => None,
        }
    }

    /// Whether `[[Call]]` is present
    pub fn is_callable(&self) -> bool {
        match &self.class {
            ObjectClass::Function(_) => true,
            ObjectClass::Proxy(proxy) => proxy.callable,
            _ => false,
        }
    }

    /// Whether `[[Construct]]` is present
    pub fn is_constructor(&self) -> bool {
        match &self.class {
            ObjectClass::Function(data) => data.is_constructor(),
            ObjectClass::Proxy(proxy) => proxy.constructor,
            _ => false,
        }
    }

    /// Environment record, if this is one
    pub fn environment(&self) -> Option<&EnvironmentRecord> {
        match &self.class {
            ObjectClass::Environment(env) => Some(env),
            _ => None,
        }
    }

    /// Mutable environment record, if this is one
    pub fn environment_mut(&mut self) -> Option<&mut EnvironmentRecord> {
        match &mut self.class {
            ObjectClass::Environment(env) => Some(env),
            _ => None,
        }
    }

    /// Dense elements of arrays and arguments objects
    pub fn elements(&self) -> Option<&Vec<Value>> {
        match &self.class {
            ObjectClass::Array(elements) | ObjectClass::Arguments(elements) => Some(elements),
            _ => None,
        }
    }

    /// Own property lookup, including array elements and `length`
    pub fn get_own(&self, key: &PropertyKey) -> Option<Property> {
        match (&self.class, key) {
            (ObjectClass::Array(elements) | ObjectClass::Arguments(elements), PropertyKey::Index(i)) => elements
                .get(*i as usize)
                .map(|v| Property::with_attributes(v.clone(), true, true, true)),
            (ObjectClass::Array(elements), PropertyKey::String(s)) if &**s == "length" => Some(
                Property::with_attributes(Value::number(elements.len() as f64), true, false, false),
            ),
            (ObjectClass::StringWrapper(s), PropertyKey::Index(i)) => s
                .encode_utf16()
                .nth(*i as usize)
                .map(|unit| Property::with_attributes(Value::from(String::from_utf16_lossy(&[unit])), false, true, false)),
            (ObjectClass::StringWrapper(s), PropertyKey::String(name)) if &**name == "length" => Some(
                Property::with_attributes(Value::number(s.encode_utf16().count() as f64), false, false, false),
            ),
            _ => self.properties.get(key).cloned(),
        }
    }

    /// Own property keys in enumeration order: indices, strings, then symbols
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let mut keys = Vec::with_capacity(self.properties.len());
        match &self.class {
            ObjectClass::Array(elements) | ObjectClass::Arguments(elements) => {
                keys.extend((0..elements.len() as u32).map(PropertyKey::Index));
            }
            ObjectClass::StringWrapper(s) => {
                keys.extend((0..s.encode_utf16().count() as u32).map(PropertyKey::Index));
            }
            _ => {}
        }
        let mut indexed: Vec<u32> = self.properties.keys().filter_map(|k| k.as_index()).collect();
        indexed.sort_unstable();
        for i in indexed {
            if !keys.contains(&PropertyKey::Index(i)) {
                keys.push(PropertyKey::Index(i));
            }
        }
        if matches!(self.class, ObjectClass::Array(_)) {
            keys.push(PropertyKey::from("length"));
        }
        keys.extend(
            self.properties
                .keys()
                .filter(|k| matches!(k, PropertyKey::String(_)))
                .cloned(),
        );
        keys.extend(self.properties.keys().filter(|k| k.is_symbol()).cloned());
        keys
    }
}

impl Trace for JsObject {
    fn trace(&self, tracer: &mut Tracer) {
        self.prototype.trace(tracer);
        for property in self.properties.values() {
            match &property.slot {
                PropertySlot::Data { value, .. } => tracer.mark_value(value),
                PropertySlot::Accessor { getter, setter } => {
                    getter.trace(tracer);
                    setter.trace(tracer);
                }
            }
        }
        match &self.class {
            ObjectClass::Array(elements) | ObjectClass::Arguments(elements) => tracer.mark_values(elements),
            ObjectClass::Function(data) => {
                if let FunctionKind::Interpreted {
                    env,
                    bound_this,
                    bound_new_target,
                    home_object,
                    ..
                } = &data.kind
                {
                    tracer.mark(*env);
                    bound_this.trace(tracer);
                    bound_new_target.trace(tracer);
                    home_object.trace(tracer);
                }
            }
            ObjectClass::Proxy(proxy) => {
                proxy.target.trace(tracer);
                proxy.handler.trace(tracer);
            }
            ObjectClass::BigIntWrapper(value) => tracer.mark_value(value),
            ObjectClass::Environment(env) => env.trace(tracer),
            ObjectClass::Generator(gen) => gen.trace(tracer),
            ObjectClass::Promise(promise) => promise.trace(tracer),
            ObjectClass::ForInIterator(iter) => iter.object.trace(tracer),
            ObjectClass::ArrayIterator(iter) => iter.array.trace(tracer),
            ObjectClass::Ordinary
            | ObjectClass::Error { .. }
            | ObjectClass::BooleanWrapper(_)
            | ObjectClass::NumberWrapper(_)
            | ObjectClass::StringWrapper(_)
            | ObjectClass::SymbolWrapper(_)
            | ObjectClass::SharedArrayBuffer(_) => {}
        }
    }
}
