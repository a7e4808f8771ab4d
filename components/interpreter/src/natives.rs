//! Built-in native functions
//!
//! Only the natives the interpreter's own contract depends on: conversions
//! consult `valueOf`/`toString`, iteration consults the array iterator, and
//! generators are driven through their prototype methods.

use bytecode_system::GeneratorResumeKind;
use core_types::number::number_to_string as format_number;
use core_types::{ErrorKind, JsResult, ObjectId, Value};

use crate::object::ops::missing_receiver;
use crate::object::{ArrayIteratorData, CallArgs, JsObject, ObjectClass, PropertyKey, MAX_ARRAY_LENGTH};
use crate::vm::VM;

/// `Function.prototype` itself: accepts anything, returns undefined.
pub fn function_prototype(_vm: &mut VM, _args: &CallArgs) -> JsResult<Value> {
    Ok(Value::Undefined)
}

/// `Object.prototype.toString`
pub fn object_to_string(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let tag = match &args.this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        this => {
            let id = vm.to_object(this)?;
            vm.object(id).class.class_name()
        }
    };
    Ok(Value::from(format!("[object {}]", tag)))
}

/// `Object.prototype.valueOf`
pub fn object_value_of(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    Ok(Value::Object(vm.to_object(&args.this)?))
}

/// `Object.prototype.hasOwnProperty`
pub fn object_has_own_property(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let key = vm.to_property_key(&args.arg(0))?;
    let object = vm.to_object(&args.this)?;
    let _guard = vm.root_object(object);
    Ok(Value::Boolean(vm.get_own_property(object, &key)?.is_some()))
}

/// `Object(value)` and `new Object()`
pub fn object_constructor(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    if args.is_construct() && args.new_target != Value::Object(args.callee) {
        let fallback = vm.realm.protos.object;
        let proto = vm.prototype_from_constructor(&args.new_target, fallback)?;
        return Ok(Value::Object(vm.new_object_with_proto(Some(proto))));
    }
    match args.arg(0) {
        Value::Undefined | Value::Null => {
            let proto = vm.realm.protos.object;
            Ok(Value::Object(vm.new_object_with_proto(Some(proto))))
        }
        value => Ok(Value::Object(vm.to_object(&value)?)),
    }
}

/// `%IteratorPrototype%[Symbol.iterator]`
pub fn iterator_self(_vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    Ok(args.this.clone())
}

/// `length` of an array-like, clamped to the array index range.
fn length_of(vm: &mut VM, object: ObjectId) -> JsResult<u32> {
    if let Some(elements) = vm.object(object).elements() {
        return Ok(elements.len() as u32);
    }
    let length = vm.get(object, "length")?;
    let n = vm.to_number(&length)?;
    Ok(if n.is_nan() || n <= 0.0 {
        0
    } else {
        n.min(MAX_ARRAY_LENGTH as f64) as u32
    })
}

/// `Array.prototype.values` and `Array.prototype[Symbol.iterator]`
pub fn array_values(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let array = vm.to_object(&args.this)?;
    let _guard = vm.root_object(array);
    let proto = vm.realm.protos.array_iterator;
    let iterator = vm.alloc(JsObject::new(
        Some(proto),
        ObjectClass::ArrayIterator(ArrayIteratorData {
            array: Some(array),
            index: 0,
        }),
    ));
    Ok(Value::Object(iterator))
}

/// `%ArrayIteratorPrototype%.next`
pub fn array_iterator_next(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let iterator = match &args.this {
        Value::Object(id) if matches!(vm.object(*id).class, ObjectClass::ArrayIterator(_)) => *id,
        _ => return Err(missing_receiver(vm, "ArrayIterator.prototype.next")),
    };
    let ObjectClass::ArrayIterator(state) = vm.object(iterator).class else {
        return Err(missing_receiver(vm, "ArrayIterator.prototype.next"));
    };
    let Some(array) = state.array else {
        return Ok(Value::Object(vm.create_iter_result(Value::Undefined, true)));
    };
    let length = length_of(vm, array)?;
    if state.index >= length {
        if let ObjectClass::ArrayIterator(state) = &mut vm.object_mut(iterator).class {
            state.array = None;
        }
        return Ok(Value::Object(vm.create_iter_result(Value::Undefined, true)));
    }
    let value = vm.get(array, state.index)?;
    if let ObjectClass::ArrayIterator(state) = &mut vm.object_mut(iterator).class {
        state.index += 1;
    }
    Ok(Value::Object(vm.create_iter_result(value, false)))
}

/// `Array.prototype.join`
pub fn array_join(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let object = vm.to_object(&args.this)?;
    let _guard = vm.root_object(object);
    let separator = match args.arg(0) {
        Value::Undefined => ",".into(),
        other => vm.to_js_string(&other)?,
    };
    let length = length_of(vm, object)?;
    let mut out = String::new();
    for i in 0..length {
        if i > 0 {
            out.push_str(&separator);
        }
        let element = vm.get(object, i)?;
        if !element.is_nullish() {
            out.push_str(&vm.to_js_string(&element)?);
        }
    }
    Ok(Value::from(out))
}

/// `Array.prototype.toString`
pub fn array_to_string(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let object = vm.to_object(&args.this)?;
    let _guard = vm.root_object(object);
    let join = vm.get(object, "join")?;
    if vm.is_callable(&join) {
        return vm.call(&join, &Value::Object(object), &[]);
    }
    object_to_string(vm, args)
}

/// `Array.prototype.push`
pub fn array_push(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let object = vm.to_object(&args.this)?;
    let _guard = vm.root_object(object);
    if let ObjectClass::Array(elements) = &mut vm.object_mut(object).class {
        if elements.len() + args.args.len() <= MAX_ARRAY_LENGTH as usize {
            elements.extend(args.args.iter().cloned());
            return Ok(Value::number(elements.len() as f64));
        }
    }
    let mut length = length_of(vm, object)? as f64;
    let receiver = Value::Object(object);
    for value in &args.args {
        let key = PropertyKey::from_name(&format_number(length));
        vm.set_value_property(&receiver, &key, value.clone(), true)?;
        length += 1.0;
    }
    vm.set_value_property(&receiver, &PropertyKey::from("length"), Value::number(length), true)?;
    Ok(Value::number(length))
}

/// `Array(...)` and `new Array(...)`
pub fn array_constructor(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let fallback = vm.realm.protos.array;
    let proto = if args.is_construct() {
        vm.prototype_from_constructor(&args.new_target, fallback)?
    } else {
        fallback
    };
    let elements = match args.args.as_slice() {
        [length] if length.is_number() => {
            let n = length.as_number().unwrap_or(f64::NAN);
            if n < 0.0 || n.fract() != 0.0 || n > MAX_ARRAY_LENGTH as f64 {
                return Err(vm.range_error("invalid array length"));
            }
            vec![Value::Undefined; n as usize]
        }
        values => values.to_vec(),
    };
    Ok(Value::Object(vm.alloc(JsObject::new(Some(proto), ObjectClass::Array(elements)))))
}

/// `%GeneratorPrototype%.next`
pub fn generator_next(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    vm.generator_method(&args.this, GeneratorResumeKind::Next, args.arg(0))
}

/// `%GeneratorPrototype%.return`
pub fn generator_return(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    vm.generator_method(&args.this, GeneratorResumeKind::Return, args.arg(0))
}

/// `%GeneratorPrototype%.throw`
pub fn generator_throw(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    vm.generator_method(&args.this, GeneratorResumeKind::Throw, args.arg(0))
}

/// `%AsyncGeneratorPrototype%.next`
pub fn async_generator_next(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    vm.async_generator_enqueue(&args.this, GeneratorResumeKind::Next, args.arg(0))
}

/// `%AsyncGeneratorPrototype%.return`
pub fn async_generator_return(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    vm.async_generator_enqueue(&args.this, GeneratorResumeKind::Return, args.arg(0))
}

/// `%AsyncGeneratorPrototype%.throw`
pub fn async_generator_throw(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    vm.async_generator_enqueue(&args.this, GeneratorResumeKind::Throw, args.arg(0))
}

/// The primitive inside `this`, if it is one of the expected kind or its
/// wrapper.
fn this_primitive(vm: &VM, this: &Value, unwrap: fn(&Value, &ObjectClass) -> Option<Value>) -> Option<Value> {
    match this {
        Value::Object(id) => unwrap(this, &vm.object(*id).class),
        primitive => unwrap(primitive, &ObjectClass::Ordinary),
    }
}

fn this_boolean(vm: &mut VM, this: &Value, what: &str) -> JsResult<bool> {
    let value = this_primitive(vm, this, |v, class| match (v, class) {
        (Value::Boolean(b), _) | (_, ObjectClass::BooleanWrapper(b)) => Some(Value::Boolean(*b)),
        _ => None,
    });
    match value {
        Some(Value::Boolean(b)) => Ok(b),
        _ => Err(missing_receiver(vm, what)),
    }
}

fn this_number(vm: &mut VM, this: &Value, what: &str) -> JsResult<f64> {
    let value = this_primitive(vm, this, |v, class| match (v, class) {
        (n, _) if n.is_number() => Some(n.clone()),
        (_, ObjectClass::NumberWrapper(n)) => Some(Value::Double(*n)),
        _ => None,
    });
    match value.and_then(|v| v.as_number()) {
        Some(n) => Ok(n),
        None => Err(missing_receiver(vm, what)),
    }
}

fn this_bigint(vm: &mut VM, this: &Value, what: &str) -> JsResult<Value> {
    let value = this_primitive(vm, this, |v, class| match (v, class) {
        (Value::BigInt(_), _) => Some(v.clone()),
        (_, ObjectClass::BigIntWrapper(inner)) => Some(inner.clone()),
        _ => None,
    });
    value.ok_or_else(|| missing_receiver(vm, what))
}

/// `Boolean.prototype.valueOf`
pub fn boolean_value_of(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    Ok(Value::Boolean(this_boolean(vm, &args.this, "Boolean.prototype.valueOf")?))
}

/// `Boolean.prototype.toString`
pub fn boolean_to_string(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let b = this_boolean(vm, &args.this, "Boolean.prototype.toString")?;
    Ok(Value::from(if b { "true" } else { "false" }))
}

/// `Number.prototype.valueOf`
pub fn number_value_of(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    Ok(Value::number(this_number(vm, &args.this, "Number.prototype.valueOf")?))
}

/// Digits of `n` in `radix`, for radices other than 10.
fn number_to_radix_string(n: f64, radix: u32) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let negative = n < 0.0;
    let n = n.abs();
    let mut integer = n.trunc();
    let mut fraction = n - integer;
    let mut digits = Vec::new();
    loop {
        let digit = (integer % radix as f64) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        integer = (integer / radix as f64).trunc();
        if integer < 1.0 {
            break;
        }
    }
    let mut out: String = if negative { "-".to_string() } else { String::new() };
    out.extend(digits.iter().rev());
    if fraction > 0.0 {
        out.push('.');
        for _ in 0..52 {
            fraction *= radix as f64;
            let digit = fraction.trunc() as u32;
            out.push(std::char::from_digit(digit, radix).unwrap_or('0'));
            fraction -= digit as f64;
            if fraction <= 0.0 {
                break;
            }
        }
    }
    out
}

fn radix_argument(vm: &mut VM, value: &Value) -> JsResult<u32> {
    if value.is_undefined() {
        return Ok(10);
    }
    let radix = vm.to_number(value)?.trunc();
    if !(2.0..=36.0).contains(&radix) {
        return Err(vm.range_error("radix must be an integer at least 2 and no greater than 36"));
    }
    Ok(radix as u32)
}

/// `Number.prototype.toString`
pub fn number_to_string(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let n = this_number(vm, &args.this, "Number.prototype.toString")?;
    let radix = radix_argument(vm, &args.arg(0))?;
    if radix == 10 {
        return Ok(Value::from(format_number(n)));
    }
    Ok(Value::from(number_to_radix_string(n, radix)))
}

/// `String.prototype.valueOf` and `String.prototype.toString`
pub fn string_value_of(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    match &args.this {
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Object(id) => match &vm.object(*id).class {
            ObjectClass::StringWrapper(s) => Ok(Value::String(s.clone())),
            _ => Err(missing_receiver(vm, "String.prototype.valueOf")),
        },
        _ => Err(missing_receiver(vm, "String.prototype.valueOf")),
    }
}

/// `Symbol.prototype.valueOf`
pub fn symbol_value_of(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    match &args.this {
        Value::Symbol(sym) => Ok(Value::Symbol(sym.clone())),
        Value::Object(id) => match &vm.object(*id).class {
            ObjectClass::SymbolWrapper(sym) => Ok(Value::Symbol(sym.clone())),
            _ => Err(missing_receiver(vm, "Symbol.prototype.valueOf")),
        },
        _ => Err(missing_receiver(vm, "Symbol.prototype.valueOf")),
    }
}

/// `BigInt.prototype.valueOf`
pub fn bigint_value_of(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    this_bigint(vm, &args.this, "BigInt.prototype.valueOf")
}

/// `BigInt.prototype.toString`
pub fn bigint_to_string(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let value = this_bigint(vm, &args.this, "BigInt.prototype.toString")?;
    let radix = radix_argument(vm, &args.arg(0))?;
    match value {
        Value::BigInt(n) => Ok(Value::from(n.to_str_radix(radix))),
        _ => Err(missing_receiver(vm, "BigInt.prototype.toString")),
    }
}

/// `SharedArrayBuffer.prototype.byteLength`
pub fn shared_buffer_byte_length(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    if let Value::Object(id) = &args.this {
        if let ObjectClass::SharedArrayBuffer(buffer) = &vm.object(*id).class {
            return Ok(Value::number(buffer.byte_length() as f64));
        }
    }
    Err(missing_receiver(vm, "SharedArrayBuffer.prototype.byteLength"))
}

/// `Error.prototype.toString`
pub fn error_to_string(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let Value::Object(object) = args.this else {
        return Err(missing_receiver(vm, "Error.prototype.toString"));
    };
    let name = match vm.get(object, "name")? {
        Value::Undefined => "Error".into(),
        other => vm.to_js_string(&other)?,
    };
    let message = match vm.get(object, "message")? {
        Value::Undefined => "".into(),
        other => vm.to_js_string(&other)?,
    };
    Ok(match (name.is_empty(), message.is_empty()) {
        (true, _) => Value::String(message),
        (_, true) => Value::String(name),
        _ => Value::from(format!("{}: {}", name, message)),
    })
}

/// `Error(message)` and the other error constructors
pub fn error_constructor(vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
    let kind = vm
        .object(args.callee)
        .function()
        .and_then(|f| ErrorKind::from_name(&f.name))
        .unwrap_or(ErrorKind::Error);
    let fallback = vm.realm.protos.error(kind);
    let proto = if args.is_construct() {
        vm.prototype_from_constructor(&args.new_target, fallback)?
    } else {
        fallback
    };
    let _guard = vm.root_object(proto);
    let message = match args.arg(0) {
        Value::Undefined => "".into(),
        other => vm.to_js_string(&other)?,
    };
    Ok(Value::Object(vm.create_error_object(kind, &message, Some(proto))))
}
