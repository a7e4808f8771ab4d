//! Script value representation.
//!
//! This module provides the core `Value` enum: a fixed-size tagged datum with
//! exactly one active variant. String, symbol and BigInt payloads are shared
//! immutable references; objects are handles into the traced heap owned by the
//! interpreter, so a `Value::Object` is only meaningful together with that heap.

use num_bigint::BigInt;
use num_traits::Zero;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::number;

/// Handle to a heap-allocated object.
///
/// The generation distinguishes a live object from a later occupant of the
/// same heap slot, so a handle that outlived its object is detectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    /// Create a handle from a slot index and generation.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the heap.
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Generation of the slot when this handle was issued.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

struct SymbolData {
    description: Option<Rc<str>>,
}

/// A symbol: a value with unique identity and an optional description.
///
/// Two symbols are equal only if they are the same symbol.
///
/// # Examples
///
/// ```
/// use core_types::Symbol;
///
/// let a = Symbol::new(Some("tag"));
/// let b = Symbol::new(Some("tag"));
/// assert_eq!(a, a.clone());
/// assert_ne!(a, b);
/// assert_eq!(a.description(), Some("tag"));
/// ```
#[derive(Clone)]
pub struct Symbol(Rc<SymbolData>);

impl Symbol {
    /// Create a fresh symbol.
    pub fn new(description: Option<&str>) -> Self {
        Symbol(Rc::new(SymbolData {
            description: description.map(Rc::from),
        }))
    }

    /// The description given at creation, if any.
    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or(""))
    }
}

/// Internal sentinel values.
///
/// Sentinels never escape to script code; they only appear in binding slots
/// and on the operand stack where the interpreter checks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Magic {
    /// A lexical binding (or derived-constructor `this`) before initialization.
    UninitializedLexical,
    /// The in-flight completion of a generator being closed, as seen by a
    /// finally block.
    GeneratorClosing,
    /// A for-in iterator has no further keys.
    NoIterValue,
}

/// Represents any script value.
///
/// `Int32` and `Double` are two representations of the same Number type;
/// use [`Value::number`] to build a canonical number. Structural equality
/// (`==` on this type) distinguishes the two representations; the language's
/// equality algorithms live in the interpreter.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let undefined = Value::Undefined;
/// let number = Value::Int32(42);
/// let float = Value::Double(3.14);
///
/// assert!(!undefined.is_truthy());
/// assert!(number.is_truthy());
/// assert_eq!(float.type_of(), "number");
/// assert_eq!(Value::from("x").type_of(), "string");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The undefined value
    Undefined,
    /// The null value
    Null,
    /// true or false
    Boolean(bool),
    /// Number stored as an exact 32-bit integer
    Int32(i32),
    /// Number stored as an IEEE 754 double
    Double(f64),
    /// Immutable string
    String(Rc<str>),
    /// Unique symbol
    Symbol(Symbol),
    /// Arbitrary-precision integer
    BigInt(Rc<BigInt>),
    /// Reference to a heap object
    Object(ObjectId),
    /// Internal sentinel, never visible to script code
    Magic(Magic),
}

impl Value {
    /// Build a canonical Number: `Int32` when the value is an exact integer
    /// in range (and not negative zero), `Double` otherwise.
    pub fn number(n: f64) -> Value {
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && !(n == 0.0 && n.is_sign_negative())
        {
            Value::Int32(n as i32)
        } else {
            Value::Double(n)
        }
    }

    /// Build a string value.
    pub fn string(s: &str) -> Value {
        Value::String(Rc::from(s))
    }

    /// Build a BigInt value.
    pub fn bigint(n: BigInt) -> Value {
        Value::BigInt(Rc::new(n))
    }

    /// Returns true for undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true for null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for undefined or null.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Returns true for either number representation.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Double(_))
    }

    /// Returns true for strings.
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Returns true for BigInts.
    pub fn is_bigint(&self) -> bool {
        matches!(self, Value::BigInt(_))
    }

    /// Returns true for object references.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Returns true if this is the given sentinel.
    pub fn is_magic(&self, which: Magic) -> bool {
        matches!(self, Value::Magic(m) if *m == which)
    }

    /// Returns true for any value a script can observe (everything but
    /// objects and sentinels is a primitive).
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Object(_) | Value::Magic(_))
    }

    /// The object handle, if this is an object.
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int32(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// The string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns whether this value is truthy (`ToBoolean`).
    ///
    /// Falsy values are undefined, null, false, +0, -0, NaN, the empty
    /// string and `0n`. Every object and symbol is truthy. Sentinels are
    /// never converted by the interpreter and report false.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::Value;
    ///
    /// assert!(!Value::Undefined.is_truthy());
    /// assert!(!Value::Int32(0).is_truthy());
    /// assert!(!Value::Double(f64::NAN).is_truthy());
    /// assert!(!Value::from("").is_truthy());
    /// assert!(Value::from("0").is_truthy());
    /// ```
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Int32(n) => *n != 0,
            Value::Double(n) => !n.is_nan() && *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Symbol(_) => true,
            Value::BigInt(n) => !n.is_zero(),
            Value::Object(_) => true,
            Value::Magic(_) => false,
        }
    }

    /// Returns the `typeof` string for this value.
    ///
    /// Objects always report `"object"` here; the interpreter refines this to
    /// `"function"` for callable objects since that needs the heap.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Int32(_) | Value::Double(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::BigInt(_) => "bigint",
            Value::Object(_) => "object",
            Value::Magic(_) => "undefined",
        }
    }

    /// Strict equality (`===`) for values that need no heap access.
    ///
    /// Numbers compare by numeric value (so `NaN !== NaN` and `0 === -0`),
    /// strings by contents, symbols and objects by identity.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => a.as_number() == b.as_number(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Magic(a), Value::Magic(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::String(s)
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::bigint(n)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int32(n) => write!(f, "{}", n),
            Value::Double(n) => write!(f, "{}", number::number_to_string(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Symbol(s) => write!(f, "Symbol({})", s.description().unwrap_or("")),
            Value::BigInt(n) => write!(f, "{}", n),
            Value::Object(id) => write!(f, "[object {}]", id),
            Value::Magic(m) => write!(f, "<magic {:?}>", m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_canonicalizes_to_int32() {
        assert_eq!(Value::number(7.0), Value::Int32(7));
        assert_eq!(Value::number(-2147483648.0), Value::Int32(i32::MIN));
        assert!(matches!(Value::number(2147483648.0), Value::Double(_)));
        assert!(matches!(Value::number(0.5), Value::Double(_)));
    }

    #[test]
    fn test_negative_zero_stays_double() {
        match Value::number(-0.0) {
            Value::Double(d) => assert!(d.is_sign_negative()),
            other => panic!("expected double, got {:?}", other),
        }
    }

    #[test]
    fn test_strict_equals_mixed_representations() {
        assert!(Value::Int32(1).strict_equals(&Value::Double(1.0)));
        assert!(!Value::Double(f64::NAN).strict_equals(&Value::Double(f64::NAN)));
        assert!(Value::Double(0.0).strict_equals(&Value::Double(-0.0)));
        assert!(!Value::Int32(1).strict_equals(&Value::from("1")));
    }

    #[test]
    fn test_magic_is_not_primitive() {
        let tdz = Value::Magic(Magic::UninitializedLexical);
        assert!(tdz.is_magic(Magic::UninitializedLexical));
        assert!(!tdz.is_magic(Magic::GeneratorClosing));
        assert!(!tdz.is_primitive());
    }

    #[test]
    fn test_display_formats_numbers() {
        assert_eq!(Value::Double(1e21).to_string(), "1e+21");
        assert_eq!(Value::Double(0.5).to_string(), "0.5");
        assert_eq!(Value::Int32(-3).to_string(), "-3");
    }
}
