//! Constant pool entries

use std::fmt;
use std::rc::Rc;

use core_types::Value;
use num_bigint::BigInt;

/// A literal stored in a script's constant pool.
///
/// Constants are plain data; the interpreter turns them into [`Value`]s when
/// `LoadConstant` executes.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Number literal
    Number(f64),
    /// String literal
    String(Rc<str>),
    /// BigInt literal
    BigInt(Rc<BigInt>),
}

impl Constant {
    /// Materialize the constant as a value.
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Number(n) => Value::number(*n),
            Constant::String(s) => Value::String(s.clone()),
            Constant::BigInt(n) => Value::BigInt(n.clone()),
        }
    }
}

impl From<f64> for Constant {
    fn from(n: f64) -> Self {
        Constant::Number(n)
    }
}

impl From<&str> for Constant {
    fn from(s: &str) -> Self {
        Constant::String(Rc::from(s))
    }
}

impl From<BigInt> for Constant {
    fn from(n: BigInt) -> Self {
        Constant::BigInt(Rc::new(n))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Number(n) => write!(f, "{}", core_types::number::number_to_string(*n)),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::BigInt(n) => write!(f, "{}n", n),
        }
    }
}
