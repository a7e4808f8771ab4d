//! Arithmetic and coercion operations
//!
//! Binary operators take Int32 fast paths when the result provably fits,
//! then fall back to `ToPrimitive`/`ToNumeric` and either BigInt or double
//! arithmetic. Mixing BigInt with Number outside of comparisons is a
//! TypeError.

use std::cmp::Ordering;
use std::rc::Rc;

use core_types::number::{
    f64_to_bigint, number_pow, number_remainder, number_to_string, string_to_bigint,
    string_to_number, to_int32, to_uint32,
};
use core_types::{JsResult, ObjectId, Value};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::object::{JsObject, ObjectClass, PropertyKey};
use crate::vm::VM;

/// Hint passed to `ToPrimitive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredType {
    /// No preference (`+`, `==`)
    Default,
    /// Numeric context
    Number,
    /// String context
    String,
}

impl PreferredType {
    fn hint(self) -> &'static str {
        match self {
            PreferredType::Default => "default",
            PreferredType::Number => "number",
            PreferredType::String => "string",
        }
    }
}

/// Binary operators other than `+`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum NumericOp {
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitOr,
    BitXor,
    BitAnd,
    Lsh,
    Rsh,
    Ursh,
}

/// Largest shift a BigInt operation will materialize.
const MAX_BIGINT_SHIFT: u64 = 1 << 24;

fn int32_fast_path(op: NumericOp, a: i32, b: i32) -> Option<Value> {
    let value = match op {
        NumericOp::Sub => Value::Int32(a.checked_sub(b)?),
        NumericOp::Mul => {
            let product = a.checked_mul(b)?;
            if product == 0 && (a < 0 || b < 0) {
                return Some(Value::Double(-0.0));
            }
            Value::Int32(product)
        }
        NumericOp::Mod if a >= 0 && b > 0 => Value::Int32(a % b),
        NumericOp::BitOr => Value::Int32(a | b),
        NumericOp::BitXor => Value::Int32(a ^ b),
        NumericOp::BitAnd => Value::Int32(a & b),
        NumericOp::Lsh => Value::Int32(a.wrapping_shl(b as u32 & 31)),
        NumericOp::Rsh => Value::Int32(a >> (b as u32 & 31)),
        NumericOp::Ursh => Value::number(((a as u32) >> (b as u32 & 31)) as f64),
        _ => return None,
    };
    Some(value)
}

fn number_op(op: NumericOp, a: f64, b: f64) -> Value {
    match op {
        NumericOp::Sub => Value::number(a - b),
        NumericOp::Mul => Value::number(a * b),
        NumericOp::Div => Value::number(a / b),
        NumericOp::Mod => Value::number(number_remainder(a, b)),
        NumericOp::Pow => Value::number(number_pow(a, b)),
        NumericOp::BitOr => Value::Int32(to_int32(a) | to_int32(b)),
        NumericOp::BitXor => Value::Int32(to_int32(a) ^ to_int32(b)),
        NumericOp::BitAnd => Value::Int32(to_int32(a) & to_int32(b)),
        NumericOp::Lsh => Value::Int32(to_int32(a).wrapping_shl(to_uint32(b) & 31)),
        NumericOp::Rsh => Value::Int32(to_int32(a) >> (to_uint32(b) & 31)),
        NumericOp::Ursh => Value::number((to_uint32(a) >> (to_uint32(b) & 31)) as f64),
    }
}

/// Order of a BigInt relative to a Number; `None` when the number is NaN.
pub fn compare_bigint_number(x: &BigInt, n: f64) -> Option<Ordering> {
    if n.is_nan() {
        return None;
    }
    if n.is_infinite() {
        return Some(if n > 0.0 { Ordering::Less } else { Ordering::Greater });
    }
    let floor = n.floor();
    let whole = f64_to_bigint(floor)?;
    match x.cmp(&whole) {
        Ordering::Equal if n > floor => Some(Ordering::Less),
        ordering => Some(ordering),
    }
}

/// Code-unit order of two strings.
pub fn compare_strings(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

impl VM {
    /// `ToPrimitive`
    pub fn to_primitive(&mut self, value: &Value, preferred: PreferredType) -> JsResult<Value> {
        if !value.is_object() {
            return Ok(value.clone());
        }
        let key = PropertyKey::Symbol(self.realm.symbols.to_primitive.clone());
        if let Some(exotic) = self.get_method(value, &key)? {
            let result = self.call(&exotic, value, &[Value::from(preferred.hint())])?;
            if result.is_object() {
                return Err(self.type_error("can't convert object to primitive type"));
            }
            return Ok(result);
        }
        let order = match preferred {
            PreferredType::String => ["toString", "valueOf"],
            _ => ["valueOf", "toString"],
        };
        for name in order {
            let method = self.get_value_property(value, &PropertyKey::from(name))?;
            if self.is_callable(&method) {
                let result = self.call(&method, value, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(self.type_error(format!("can't convert object to {}", preferred.hint())))
    }

    /// `ToNumber`
    pub fn to_number(&mut self, value: &Value) -> JsResult<f64> {
        match value {
            Value::Undefined => Ok(f64::NAN),
            Value::Null => Ok(0.0),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Int32(n) => Ok(*n as f64),
            Value::Double(n) => Ok(*n),
            Value::String(s) => Ok(string_to_number(s)),
            Value::Symbol(_) => Err(self.type_error("can't convert symbol to number")),
            Value::BigInt(_) => Err(self.type_error("can't convert BigInt to number")),
            Value::Object(_) => {
                let primitive = self.to_primitive(value, PreferredType::Number)?;
                self.to_number(&primitive)
            }
            Value::Magic(m) => crate::fatal!("numeric conversion of magic value {:?}", m),
        }
    }

    /// `ToNumeric`: a Number or a BigInt.
    pub fn to_numeric(&mut self, value: &Value) -> JsResult<Value> {
        match value {
            Value::Int32(_) | Value::Double(_) | Value::BigInt(_) => Ok(value.clone()),
            Value::Object(_) => {
                let primitive = self.to_primitive(value, PreferredType::Number)?;
                self.to_numeric(&primitive)
            }
            other => Ok(Value::number(self.to_number(other)?)),
        }
    }

    /// `ToInt32`
    pub fn to_int32(&mut self, value: &Value) -> JsResult<i32> {
        match value {
            Value::Int32(n) => Ok(*n),
            other => Ok(to_int32(self.to_number(other)?)),
        }
    }

    /// `ToString`
    pub fn to_js_string(&mut self, value: &Value) -> JsResult<Rc<str>> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Undefined => Ok(Rc::from("undefined")),
            Value::Null => Ok(Rc::from("null")),
            Value::Boolean(b) => Ok(Rc::from(if *b { "true" } else { "false" })),
            Value::Int32(n) => Ok(Rc::from(n.to_string())),
            Value::Double(n) => Ok(Rc::from(number_to_string(*n))),
            Value::BigInt(n) => Ok(Rc::from(n.to_string())),
            Value::Symbol(_) => Err(self.type_error("can't convert symbol to string")),
            Value::Object(_) => {
                let primitive = self.to_primitive(value, PreferredType::String)?;
                self.to_js_string(&primitive)
            }
            Value::Magic(m) => crate::fatal!("string conversion of magic value {:?}", m),
        }
    }

    /// `ToObject`, allocating a wrapper for primitives.
    pub fn to_object(&mut self, value: &Value) -> JsResult<ObjectId> {
        let class = match value {
            Value::Object(id) => return Ok(*id),
            Value::Undefined | Value::Null => {
                return Err(self.type_error(format!("can't convert {} to object", value)));
            }
            Value::Boolean(b) => ObjectClass::BooleanWrapper(*b),
            Value::Int32(_) | Value::Double(_) => ObjectClass::NumberWrapper(value.as_number().unwrap_or(f64::NAN)),
            Value::String(s) => ObjectClass::StringWrapper(s.clone()),
            Value::Symbol(sym) => ObjectClass::SymbolWrapper(sym.clone()),
            Value::BigInt(_) => ObjectClass::BigIntWrapper(value.clone()),
            Value::Magic(m) => crate::fatal!("object conversion of magic value {:?}", m),
        };
        let proto = self.primitive_prototype(value);
        Ok(self.alloc(JsObject::new(Some(proto), class)))
    }

    /// `typeof`, reporting callable objects as `"function"`.
    pub fn type_of(&self, value: &Value) -> &'static str {
        if self.is_callable(value) {
            return "function";
        }
        value.type_of()
    }

    /// `a + b`
    pub fn add_values(&mut self, a: &Value, b: &Value) -> JsResult<Value> {
        match (a, b) {
            (Value::Int32(x), Value::Int32(y)) => {
                if let Some(sum) = x.checked_add(*y) {
                    return Ok(Value::Int32(sum));
                }
                return Ok(Value::Double(*x as f64 + *y as f64));
            }
            (Value::String(x), Value::String(y)) => return Ok(concat(x, y)),
            _ => {}
        }
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return Ok(Value::number(x + y));
        }
        let pa = self.to_primitive(a, PreferredType::Default)?;
        let pb = self.to_primitive(b, PreferredType::Default)?;
        if pa.is_string() || pb.is_string() {
            let sa = self.to_js_string(&pa)?;
            let sb = self.to_js_string(&pb)?;
            return Ok(concat(&sa, &sb));
        }
        let na = self.to_numeric(&pa)?;
        let nb = self.to_numeric(&pb)?;
        match (&na, &nb) {
            (Value::BigInt(x), Value::BigInt(y)) => Ok(Value::bigint(&**x + &**y)),
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(self.mixed_bigint_error()),
            _ => Ok(Value::number(
                na.as_number().unwrap_or(f64::NAN) + nb.as_number().unwrap_or(f64::NAN),
            )),
        }
    }

    /// Every binary arithmetic or bitwise operator except `+`.
    pub fn numeric_binary(&mut self, op: NumericOp, a: &Value, b: &Value) -> JsResult<Value> {
        if let (Value::Int32(x), Value::Int32(y)) = (a, b) {
            if let Some(result) = int32_fast_path(op, *x, *y) {
                return Ok(result);
            }
        }
        let na = self.to_numeric(a)?;
        let nb = self.to_numeric(b)?;
        match (&na, &nb) {
            (Value::BigInt(x), Value::BigInt(y)) => self.bigint_binary(op, x, y),
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(self.mixed_bigint_error()),
            _ => Ok(number_op(
                op,
                na.as_number().unwrap_or(f64::NAN),
                nb.as_number().unwrap_or(f64::NAN),
            )),
        }
    }

    fn mixed_bigint_error(&mut self) -> core_types::Abrupt {
        self.type_error("can't mix BigInt and other types, use explicit conversions")
    }

    fn bigint_binary(&mut self, op: NumericOp, x: &BigInt, y: &BigInt) -> JsResult<Value> {
        let result = match op {
            NumericOp::Sub => x - y,
            NumericOp::Mul => x * y,
            NumericOp::Div | NumericOp::Mod if y.is_zero() => {
                return Err(self.range_error("BigInt division by zero"));
            }
            NumericOp::Div => x / y,
            NumericOp::Mod => x % y,
            NumericOp::Pow => {
                if y.is_negative() {
                    return Err(self.range_error("BigInt negative exponent"));
                }
                match y.to_u32() {
                    Some(exponent) => num_traits::pow(x.clone(), exponent as usize),
                    None if x.is_zero() || x == &BigInt::from(1) => x.clone(),
                    None => return Err(self.range_error("BigInt is too large to allocate")),
                }
            }
            NumericOp::BitOr => x | y,
            NumericOp::BitXor => x ^ y,
            NumericOp::BitAnd => x & y,
            NumericOp::Lsh | NumericOp::Rsh => {
                let left = (op == NumericOp::Lsh) != y.is_negative();
                let amount = y.abs().to_u64().filter(|n| *n <= MAX_BIGINT_SHIFT);
                match (left, amount) {
                    (true, Some(n)) => x << n as usize,
                    (false, Some(n)) => x >> n as usize,
                    (true, None) if x.is_zero() => BigInt::zero(),
                    (true, None) => return Err(self.range_error("BigInt is too large to allocate")),
                    (false, None) if x.is_negative() => BigInt::from(-1),
                    (false, None) => BigInt::zero(),
                }
            }
            NumericOp::Ursh => {
                return Err(self.type_error("BigInts have no unsigned right shift, use >> instead"));
            }
        };
        Ok(Value::bigint(result))
    }

    /// Unary `-`
    pub fn negate(&mut self, value: &Value) -> JsResult<Value> {
        match value {
            Value::Int32(0) => Ok(Value::Double(-0.0)),
            Value::Int32(n) if *n != i32::MIN => Ok(Value::Int32(-n)),
            _ => match self.to_numeric(value)? {
                Value::BigInt(n) => Ok(Value::bigint(-&*n)),
                other => Ok(Value::number(-other.as_number().unwrap_or(f64::NAN))),
            },
        }
    }

    /// Unary `~`
    pub fn bit_not(&mut self, value: &Value) -> JsResult<Value> {
        match self.to_numeric(value)? {
            Value::BigInt(n) => Ok(Value::bigint(!&*n)),
            other => Ok(Value::Int32(!to_int32(other.as_number().unwrap_or(f64::NAN)))),
        }
    }

    /// `n + 1` or `n - 1` on an already-numeric operand.
    pub fn increment(&mut self, value: &Value, delta: i32) -> JsResult<Value> {
        match value {
            Value::Int32(n) => Ok(match n.checked_add(delta) {
                Some(result) => Value::Int32(result),
                None => Value::Double(*n as f64 + delta as f64),
            }),
            Value::Double(n) => Ok(Value::number(n + delta as f64)),
            Value::BigInt(n) => Ok(Value::bigint(&**n + BigInt::from(delta))),
            other => {
                let numeric = self.to_numeric(other)?;
                self.increment(&numeric, delta)
            }
        }
    }

    /// Abstract relational comparison `x < y`; `None` means undefined
    /// (a NaN was involved).
    pub fn less_than(&mut self, x: &Value, y: &Value, left_first: bool) -> JsResult<Option<bool>> {
        if let (Value::Int32(a), Value::Int32(b)) = (x, y) {
            return Ok(Some(a < b));
        }
        let (px, py) = if left_first {
            let px = self.to_primitive(x, PreferredType::Number)?;
            let py = self.to_primitive(y, PreferredType::Number)?;
            (px, py)
        } else {
            let py = self.to_primitive(y, PreferredType::Number)?;
            let px = self.to_primitive(x, PreferredType::Number)?;
            (px, py)
        };
        match (&px, &py) {
            (Value::String(a), Value::String(b)) => return Ok(Some(compare_strings(a, b) == Ordering::Less)),
            (Value::BigInt(a), Value::String(b)) => {
                return Ok(string_to_bigint(b).map(|b| **a < b));
            }
            (Value::String(a), Value::BigInt(b)) => {
                return Ok(string_to_bigint(a).map(|a| a < **b));
            }
            _ => {}
        }
        let nx = self.to_numeric(&px)?;
        let ny = self.to_numeric(&py)?;
        Ok(match (&nx, &ny) {
            (Value::BigInt(a), Value::BigInt(b)) => Some(a < b),
            (Value::BigInt(a), other) => {
                compare_bigint_number(a, other.as_number().unwrap_or(f64::NAN)).map(|o| o == Ordering::Less)
            }
            (other, Value::BigInt(b)) => {
                compare_bigint_number(b, other.as_number().unwrap_or(f64::NAN)).map(|o| o == Ordering::Greater)
            }
            _ => {
                let a = nx.as_number().unwrap_or(f64::NAN);
                let b = ny.as_number().unwrap_or(f64::NAN);
                if a.is_nan() || b.is_nan() {
                    None
                } else {
                    Some(a < b)
                }
            }
        })
    }

    /// Loose equality (`==`).
    pub fn loose_equals(&mut self, x: &Value, y: &Value) -> JsResult<bool> {
        match (x, y) {
            _ if x.is_number() && y.is_number() => Ok(x.strict_equals(y)),
            _ if std::mem::discriminant(x) == std::mem::discriminant(y) => Ok(x.strict_equals(y)),
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => Ok(true),
            (Value::String(s), n) | (n, Value::String(s)) if n.is_number() => {
                Ok(string_to_number(s) == n.as_number().unwrap_or(f64::NAN))
            }
            (Value::BigInt(b), Value::String(s)) | (Value::String(s), Value::BigInt(b)) => {
                Ok(string_to_bigint(s).is_some_and(|parsed| parsed == **b))
            }
            (Value::Boolean(b), other) | (other, Value::Boolean(b)) => {
                let n = Value::Int32(*b as i32);
                self.loose_equals(&n, other)
            }
            (Value::Object(_), other) | (other, Value::Object(_))
                if other.is_number() || other.is_string() || other.is_bigint() || matches!(other, Value::Symbol(_)) =>
            {
                let object = if x.is_object() { x } else { y };
                let primitive = self.to_primitive(object, PreferredType::Default)?;
                self.loose_equals(&primitive, other)
            }
            (Value::BigInt(b), n) | (n, Value::BigInt(b)) if n.is_number() => {
                Ok(compare_bigint_number(b, n.as_number().unwrap_or(f64::NAN)) == Some(Ordering::Equal))
            }
            _ => Ok(false),
        }
    }

    /// `key in object`
    pub fn has_in(&mut self, key: &Value, object: &Value) -> JsResult<bool> {
        let Value::Object(id) = object else {
            return Err(self.type_error(format!("invalid 'in' operand {}", object)));
        };
        let id = *id;
        let key = self.to_property_key(key)?;
        self.has_property(id, &key)
    }
}

fn concat(a: &str, b: &str) -> Value {
    let mut s = String::with_capacity(a.len() + b.len());
    s.push_str(a);
    s.push_str(b);
    Value::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_int32_overflow_widens() {
        let mut vm = VM::new();
        let sum = vm.add_values(&Value::Int32(i32::MAX), &Value::Int32(1)).unwrap();
        assert_eq!(sum, Value::Double(2147483648.0));
        assert_eq!(vm.add_values(&Value::Int32(2), &Value::Int32(3)).unwrap(), Value::Int32(5));
    }

    #[test]
    fn test_add_concatenates_strings() {
        let mut vm = VM::new();
        assert_eq!(vm.add_values(&Value::Int32(1), &Value::from("2")).unwrap(), Value::from("12"));
        assert_eq!(vm.add_values(&Value::Null, &Value::from("x")).unwrap(), Value::from("nullx"));
        assert_eq!(
            vm.add_values(&Value::Double(0.5), &Value::from("")).unwrap(),
            Value::from("0.5")
        );
    }

    #[test]
    fn test_sub_coerces_strings() {
        let mut vm = VM::new();
        let result = vm.numeric_binary(NumericOp::Sub, &Value::from("3"), &Value::Int32(1)).unwrap();
        assert_eq!(result, Value::Int32(2));
    }

    #[test]
    fn test_mod_keeps_dividend_sign() {
        let mut vm = VM::new();
        assert_eq!(
            vm.numeric_binary(NumericOp::Mod, &Value::Int32(7), &Value::Int32(3)).unwrap(),
            Value::Int32(1)
        );
        let negative = vm.numeric_binary(NumericOp::Mod, &Value::Int32(-7), &Value::Int32(3)).unwrap();
        assert_eq!(negative, Value::Int32(-1));
        let zero = vm.numeric_binary(NumericOp::Mod, &Value::Int32(-4), &Value::Int32(2)).unwrap();
        assert!(matches!(zero, Value::Double(z) if z == 0.0 && z.is_sign_negative()));
        let nan = vm.numeric_binary(NumericOp::Mod, &Value::Int32(1), &Value::Int32(0)).unwrap();
        assert!(matches!(nan, Value::Double(n) if n.is_nan()));
    }

    #[test]
    fn test_mul_produces_negative_zero() {
        let mut vm = VM::new();
        let result = vm.numeric_binary(NumericOp::Mul, &Value::Int32(-3), &Value::Int32(0)).unwrap();
        assert!(matches!(result, Value::Double(z) if z == 0.0 && z.is_sign_negative()));
    }

    #[test]
    fn test_shifts() {
        let mut vm = VM::new();
        assert_eq!(
            vm.numeric_binary(NumericOp::Ursh, &Value::Int32(-1), &Value::Int32(0)).unwrap(),
            Value::Double(4294967295.0)
        );
        assert_eq!(
            vm.numeric_binary(NumericOp::Lsh, &Value::Int32(1), &Value::Int32(33)).unwrap(),
            Value::Int32(2)
        );
    }

    #[test]
    fn test_bigint_arithmetic_and_errors() {
        let mut vm = VM::new();
        let a = Value::bigint(BigInt::from(7));
        let b = Value::bigint(BigInt::from(-2));
        assert_eq!(
            vm.numeric_binary(NumericOp::Div, &a, &b).unwrap(),
            Value::bigint(BigInt::from(-3))
        );
        assert_eq!(
            vm.numeric_binary(NumericOp::Rsh, &b, &Value::bigint(BigInt::from(1))).unwrap(),
            Value::bigint(BigInt::from(-1))
        );
        let zero = Value::bigint(BigInt::from(0));
        assert!(vm.numeric_binary(NumericOp::Div, &a, &zero).is_err());
        assert!(vm.numeric_binary(NumericOp::Pow, &a, &b).is_err());
        assert!(vm.numeric_binary(NumericOp::Sub, &a, &Value::Int32(1)).is_err());
        assert!(vm.numeric_binary(NumericOp::Ursh, &a, &a).is_err());
    }

    #[test]
    fn test_relational_comparison() {
        let mut vm = VM::new();
        assert_eq!(vm.less_than(&Value::from("a"), &Value::from("b"), true).unwrap(), Some(true));
        assert_eq!(vm.less_than(&Value::from("10"), &Value::from("9"), true).unwrap(), Some(true));
        assert_eq!(vm.less_than(&Value::from("10"), &Value::Int32(9), true).unwrap(), Some(false));
        assert_eq!(vm.less_than(&Value::Double(f64::NAN), &Value::Int32(1), true).unwrap(), None);
        let big = Value::bigint(BigInt::from(2));
        assert_eq!(vm.less_than(&big, &Value::Double(2.5), true).unwrap(), Some(true));
        assert_eq!(vm.less_than(&Value::Double(2.5), &big, true).unwrap(), Some(false));
    }

    #[test]
    fn test_loose_equality() {
        let mut vm = VM::new();
        assert!(vm.loose_equals(&Value::Null, &Value::Undefined).unwrap());
        assert!(vm.loose_equals(&Value::from("1"), &Value::Int32(1)).unwrap());
        assert!(vm.loose_equals(&Value::Boolean(true), &Value::from("1")).unwrap());
        assert!(vm.loose_equals(&Value::bigint(BigInt::from(1)), &Value::Double(1.0)).unwrap());
        assert!(!vm.loose_equals(&Value::Null, &Value::Int32(0)).unwrap());
        assert!(!vm.loose_equals(&Value::Double(f64::NAN), &Value::Double(f64::NAN)).unwrap());
    }

    #[test]
    fn test_to_string_of_numbers() {
        let mut vm = VM::new();
        assert_eq!(&*vm.to_js_string(&Value::Double(1e21)).unwrap(), "1e+21");
        assert_eq!(&*vm.to_js_string(&Value::Double(-0.0)).unwrap(), "0");
        assert!(vm.to_js_string(&Value::Symbol(core_types::Symbol::new(None))).is_err());
    }

    #[test]
    fn test_negate_zero_and_min() {
        let mut vm = VM::new();
        assert!(matches!(vm.negate(&Value::Int32(0)).unwrap(), Value::Double(z) if z.is_sign_negative()));
        assert_eq!(vm.negate(&Value::Int32(i32::MIN)).unwrap(), Value::Double(2147483648.0));
    }
}
