//! Property operations
//!
//! `get`/`set`/`has`/`delete`/`define` over ordinary objects, arrays and
//! proxies. Operations take a receiver distinct from the target so that
//! `super` property access and proxy forwarding see the right `this`.
//! `set`, `delete` and `define` report a strict-mode violation as `Ok(false)`;
//! `Err` is reserved for thrown exceptions.

use std::collections::HashSet;
use std::rc::Rc;

use core_types::{Abrupt, JsResult, ObjectId, Value};

use crate::arith::PreferredType;
use crate::object::{JsObject, ObjectClass, Property, PropertyKey, PropertySlot, ProxyData};
use crate::vm::VM;

/// Elements past the dense end that a single write may fill in.
const MAX_DENSE_GAP: usize = 1 << 20;

impl VM {
    /// Allocate a plain object with the given prototype.
    pub(crate) fn new_object_with_proto(&mut self, prototype: Option<ObjectId>) -> ObjectId {
        self.alloc(JsObject::ordinary(prototype))
    }

    /// Allocate an array holding `values`.
    pub(crate) fn create_array(&mut self, values: Vec<Value>) -> ObjectId {
        let proto = self.realm.protos.array;
        self.alloc(JsObject::new(Some(proto), ObjectClass::Array(values)))
    }

    /// Define a property on an object that user code has not seen yet.
    pub(crate) fn init_property(&mut self, id: ObjectId, key: PropertyKey, property: Property) {
        let object = self.object_mut(id);
        if let (ObjectClass::Array(elements), Some(index)) = (&mut object.class, key.as_index()) {
            if let Some(value) = property.value() {
                let index = index as usize;
                if index < elements.len() {
                    elements[index] = value.clone();
                    return;
                }
                if index - elements.len() < MAX_DENSE_GAP {
                    elements.resize(index, Value::Undefined);
                    elements.push(value.clone());
                    return;
                }
            }
        }
        object.properties.insert(key, property);
    }

    pub(crate) fn proxy_parts(&mut self, proxy: ProxyData) -> JsResult<(ObjectId, ObjectId)> {
        match (proxy.target, proxy.handler) {
            (Some(target), Some(handler)) => Ok((target, handler)),
            _ => Err(self.type_error("illegal operation attempted on a revoked proxy")),
        }
    }

    /// The trap `name` of `handler`, or `None` to forward to the target.
    pub(crate) fn proxy_trap(&mut self, handler: ObjectId, name: &str) -> JsResult<Option<Value>> {
        let trap = self.get_property(handler, &PropertyKey::from(name), &Value::Object(handler))?;
        if trap.is_nullish() {
            return Ok(None);
        }
        if !self.is_callable(&trap) {
            return Err(self.type_error(format!("proxy trap '{}' is not a function", name)));
        }
        Ok(Some(trap))
    }

    pub(crate) fn proxy_of(&self, id: ObjectId) -> Option<ProxyData> {
        match self.object(id).class {
            ObjectClass::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// `[[GetPrototypeOf]]`; proxies report their target's prototype.
    pub(crate) fn get_prototype_of(&self, mut id: ObjectId) -> Option<ObjectId> {
        while let Some(proxy) = self.proxy_of(id) {
            id = proxy.target?;
        }
        self.object(id).prototype
    }

    /// `[[GetOwnProperty]]`; proxies report their target's property.
    pub(crate) fn get_own_property(&mut self, mut id: ObjectId, key: &PropertyKey) -> JsResult<Option<Property>> {
        while let Some(proxy) = self.proxy_of(id) {
            id = self.proxy_parts(proxy)?.0;
        }
        Ok(self.object(id).get_own(key))
    }

    /// `[[Get]]` with an explicit receiver.
    pub fn get_property(&mut self, id: ObjectId, key: &PropertyKey, receiver: &Value) -> JsResult<Value> {
        let mut current = id;
        loop {
            let object = self.object(current);
            if let ObjectClass::Proxy(proxy) = object.class {
                return self.proxy_get(proxy, key, receiver);
            }
            match object.get_own(key) {
                Some(property) => {
                    return match property.slot {
                        PropertySlot::Data { value, .. } => Ok(value),
                        PropertySlot::Accessor { getter: Some(getter), .. } => {
                            self.call(&Value::Object(getter), receiver, &[])
                        }
                        PropertySlot::Accessor { getter: None, .. } => Ok(Value::Undefined),
                    };
                }
                None => match object.prototype {
                    Some(proto) => current = proto,
                    None => return Ok(Value::Undefined),
                },
            }
        }
    }

    fn proxy_get(&mut self, proxy: ProxyData, key: &PropertyKey, receiver: &Value) -> JsResult<Value> {
        let (target, handler) = self.proxy_parts(proxy)?;
        match self.proxy_trap(handler, "get")? {
            Some(trap) => self.call(
                &trap,
                &Value::Object(handler),
                &[Value::Object(target), key.to_value(), receiver.clone()],
            ),
            None => self.get_property(target, key, receiver),
        }
    }

    /// `[[Get]]` with the object itself as receiver.
    pub fn get(&mut self, id: ObjectId, key: impl Into<PropertyKey>) -> JsResult<Value> {
        self.get_property(id, &key.into(), &Value::Object(id))
    }

    /// Prototype that supplies properties of a primitive.
    pub(crate) fn primitive_prototype(&self, value: &Value) -> ObjectId {
        let protos = &self.realm.protos;
        match value {
            Value::Boolean(_) => protos.boolean,
            Value::Int32(_) | Value::Double(_) => protos.number,
            Value::String(_) => protos.string,
            Value::Symbol(_) => protos.symbol,
            Value::BigInt(_) => protos.bigint,
            Value::Object(id) => *id,
            other => crate::fatal!("{} has no primitive prototype", other),
        }
    }

    /// Property read on any base value, boxing primitives through their
    /// prototypes.
    pub(crate) fn get_value_property(&mut self, base: &Value, key: &PropertyKey) -> JsResult<Value> {
        let proto = match base {
            Value::Object(id) => return self.get_property(*id, key, base),
            Value::Undefined | Value::Null => {
                return Err(self.type_error(format!("can't access property \"{}\" of {}", key, base)));
            }
            Value::String(s) => {
                match key {
                    PropertyKey::Index(i) => {
                        if let Some(unit) = s.encode_utf16().nth(*i as usize) {
                            return Ok(Value::from(String::from_utf16_lossy(&[unit])));
                        }
                    }
                    PropertyKey::String(name) if &**name == "length" => {
                        return Ok(Value::number(s.encode_utf16().count() as f64));
                    }
                    _ => {}
                }
                self.primitive_prototype(base)
            }
            primitive => self.primitive_prototype(primitive),
        };
        self.get_property(proto, key, base)
    }

    /// `[[Set]]` with an explicit receiver; `Ok(false)` if the assignment
    /// was refused.
    pub fn set_property(&mut self, id: ObjectId, key: &PropertyKey, value: Value, receiver: &Value) -> JsResult<bool> {
        let mut current = id;
        loop {
            let object = self.object(current);
            if let ObjectClass::Proxy(proxy) = object.class {
                return self.proxy_set(proxy, key, value, receiver);
            }
            match object.get_own(key) {
                Some(property) => match property.slot {
                    PropertySlot::Data { writable: false, .. } => return Ok(false),
                    PropertySlot::Data { .. } => break,
                    PropertySlot::Accessor { setter: Some(setter), .. } => {
                        self.call(&Value::Object(setter), receiver, &[value])?;
                        return Ok(true);
                    }
                    PropertySlot::Accessor { setter: None, .. } => return Ok(false),
                },
                None => match object.prototype {
                    Some(proto) => current = proto,
                    None => break,
                },
            }
        }
        let Value::Object(target) = receiver else {
            return Ok(false);
        };
        let target = *target;
        if self.proxy_of(target).is_some() {
            return self.define_own_property(target, key, Property::data(value));
        }
        match self.object(target).get_own(key) {
            Some(existing) => match existing.slot {
                PropertySlot::Data { writable: true, .. } => self.write_own_value(target, key, value),
                _ => Ok(false),
            },
            None if !self.object(target).extensible => Ok(false),
            None => self.write_own_value(target, key, value),
        }
    }

    fn proxy_set(&mut self, proxy: ProxyData, key: &PropertyKey, value: Value, receiver: &Value) -> JsResult<bool> {
        let (target, handler) = self.proxy_parts(proxy)?;
        match self.proxy_trap(handler, "set")? {
            Some(trap) => {
                let result = self.call(
                    &trap,
                    &Value::Object(handler),
                    &[Value::Object(target), key.to_value(), value, receiver.clone()],
                )?;
                Ok(result.is_truthy())
            }
            None => self.set_property(target, key, value, receiver),
        }
    }

    /// Store `value` in an own writable slot, creating it if absent.
    fn write_own_value(&mut self, id: ObjectId, key: &PropertyKey, value: Value) -> JsResult<bool> {
        if matches!(self.object(id).class, ObjectClass::Array(_)) {
            if let PropertyKey::String(name) = key {
                if &**name == "length" {
                    return self.set_array_length(id, &value);
                }
            }
        }
        let object = self.object_mut(id);
        if let (ObjectClass::Array(elements), Some(index)) = (&mut object.class, key.as_index()) {
            let index = index as usize;
            if index < elements.len() {
                elements[index] = value;
                return Ok(true);
            }
            if index - elements.len() < MAX_DENSE_GAP {
                elements.resize(index, Value::Undefined);
                elements.push(value);
                return Ok(true);
            }
        }
        if let (ObjectClass::Arguments(elements), Some(index)) = (&mut object.class, key.as_index()) {
            if let Some(slot) = elements.get_mut(index as usize) {
                *slot = value;
                return Ok(true);
            }
        }
        match object.properties.get_mut(key) {
            Some(Property {
                slot: PropertySlot::Data { value: slot, .. },
                ..
            }) => *slot = value,
            _ => {
                object.properties.insert(key.clone(), Property::data(value));
            }
        }
        Ok(true)
    }

    fn set_array_length(&mut self, id: ObjectId, value: &Value) -> JsResult<bool> {
        let number = self.to_number(value)?;
        let length = number as u32;
        if length as f64 != number {
            return Err(self.range_error("invalid array length"));
        }
        if let ObjectClass::Array(elements) = &mut self.object_mut(id).class {
            let length = length as usize;
            if length > elements.len() && length - elements.len() >= MAX_DENSE_GAP {
                return Err(self.range_error("invalid array length"));
            }
            elements.resize(length, Value::Undefined);
        }
        Ok(true)
    }

    /// Property write on any base value.
    ///
    /// A refused assignment throws in strict code and is otherwise reported
    /// as a strict-mode violation.
    pub(crate) fn set_value_property(
        &mut self,
        base: &Value,
        key: &PropertyKey,
        value: Value,
        strict: bool,
    ) -> JsResult<()> {
        let succeeded = match base {
            Value::Object(id) => self.set_property(*id, key, value, base)?,
            Value::Undefined | Value::Null => {
                return Err(self.type_error(format!("can't assign to property \"{}\" of {}", key, base)));
            }
            Value::Magic(m) => crate::fatal!("property assignment on magic value {:?}", m),
            primitive => {
                let proto = self.primitive_prototype(primitive);
                self.set_property(proto, key, value, base)?
            }
        };
        if succeeded {
            return Ok(());
        }
        self.report_strict_violation(
            strict,
            format!("can't assign to property \"{}\" on {}: not writable", key, base),
        )
    }

    /// A sloppy-mode assignment failed silently, or strict code must throw.
    pub(crate) fn report_strict_violation(&mut self, strict: bool, message: String) -> JsResult<()> {
        if strict || self.options.werror {
            return Err(self.type_error(message));
        }
        if self.options.extra_warnings {
            log::warn!("strict mode violation: {}", message);
        }
        Ok(())
    }

    /// `[[HasProperty]]`
    pub fn has_property(&mut self, id: ObjectId, key: &PropertyKey) -> JsResult<bool> {
        let mut current = id;
        loop {
            let object = self.object(current);
            if let ObjectClass::Proxy(proxy) = object.class {
                let (target, handler) = self.proxy_parts(proxy)?;
                return match self.proxy_trap(handler, "has")? {
                    Some(trap) => {
                        let result = self.call(
                            &trap,
                            &Value::Object(handler),
                            &[Value::Object(target), key.to_value()],
                        )?;
                        Ok(result.is_truthy())
                    }
                    None => self.has_property(target, key),
                };
            }
            if object.get_own(key).is_some() {
                return Ok(true);
            }
            match object.prototype {
                Some(proto) => current = proto,
                None => return Ok(false),
            }
        }
    }

    /// `[[Delete]]`; `Ok(false)` for non-configurable properties.
    pub fn delete_property(&mut self, id: ObjectId, key: &PropertyKey) -> JsResult<bool> {
        if let Some(proxy) = self.proxy_of(id) {
            let (target, handler) = self.proxy_parts(proxy)?;
            return match self.proxy_trap(handler, "deleteProperty")? {
                Some(trap) => {
                    let result = self.call(
                        &trap,
                        &Value::Object(handler),
                        &[Value::Object(target), key.to_value()],
                    )?;
                    Ok(result.is_truthy())
                }
                None => self.delete_property(target, key),
            };
        }
        let object = self.object_mut(id);
        let is_array = matches!(object.class, ObjectClass::Array(_));
        if let (ObjectClass::Array(elements) | ObjectClass::Arguments(elements), Some(index)) =
            (&mut object.class, key.as_index())
        {
            let index = index as usize;
            if is_array && index + 1 == elements.len() {
                elements.pop();
                return Ok(true);
            }
            if let Some(slot) = elements.get_mut(index) {
                *slot = Value::Undefined;
                return Ok(true);
            }
        }
        match object.get_own(key) {
            None => Ok(true),
            Some(property) if property.configurable => {
                object.properties.shift_remove(key);
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// `[[DefineOwnProperty]]`; `Ok(false)` if the definition is not allowed.
    pub fn define_own_property(&mut self, id: ObjectId, key: &PropertyKey, property: Property) -> JsResult<bool> {
        if let Some(proxy) = self.proxy_of(id) {
            let (target, handler) = self.proxy_parts(proxy)?;
            return match self.proxy_trap(handler, "defineProperty")? {
                Some(trap) => {
                    let descriptor = self.descriptor_object(&property);
                    let _guard = self.root_object(descriptor);
                    let result = self.call(
                        &trap,
                        &Value::Object(handler),
                        &[Value::Object(target), key.to_value(), Value::Object(descriptor)],
                    )?;
                    Ok(result.is_truthy())
                }
                None => self.define_own_property(target, key, property),
            };
        }
        let existing = self.object(id).get_own(key);
        match existing {
            Some(current) if !current.configurable => {
                let allowed = matches!(
                    (&current.slot, &property.slot),
                    (PropertySlot::Data { writable: true, .. }, PropertySlot::Data { .. })
                ) && property.enumerable == current.enumerable
                    && !property.configurable;
                if !allowed {
                    return Ok(false);
                }
            }
            None if !self.object(id).extensible => return Ok(false),
            _ => {}
        }
        let is_array_slot = matches!(self.object(id).class, ObjectClass::Array(_))
            && (key.as_index().is_some() || matches!(key, PropertyKey::String(s) if &**s == "length"));
        if is_array_slot {
            if let Some(value) = property.value() {
                return self.write_own_value(id, key, value.clone());
            }
        }
        self.object_mut(id).properties.insert(key.clone(), property);
        Ok(true)
    }

    /// `{ value, writable, enumerable, configurable }` or `{ get, set, ... }`
    fn descriptor_object(&mut self, property: &Property) -> ObjectId {
        let mut object = JsObject::ordinary(Some(self.realm.protos.object));
        let mut put = |name: &str, value: Value| {
            object.properties.insert(PropertyKey::from(name), Property::data(value));
        };
        match &property.slot {
            PropertySlot::Data { value, writable } => {
                put("value", value.clone());
                put("writable", Value::Boolean(*writable));
            }
            PropertySlot::Accessor { getter, setter } => {
                put("get", getter.map(Value::Object).unwrap_or(Value::Undefined));
                put("set", setter.map(Value::Object).unwrap_or(Value::Undefined));
            }
        }
        put("enumerable", Value::Boolean(property.enumerable));
        put("configurable", Value::Boolean(property.configurable));
        self.alloc(object)
    }

    /// `ToPropertyKey`
    pub(crate) fn to_property_key(&mut self, value: &Value) -> JsResult<PropertyKey> {
        match value {
            Value::Int32(n) if *n >= 0 => Ok(PropertyKey::Index(*n as u32)),
            Value::String(s) => Ok(PropertyKey::from_rc(s.clone())),
            Value::Symbol(sym) => Ok(PropertyKey::Symbol(sym.clone())),
            Value::Object(_) => {
                let primitive = self.to_primitive(value, PreferredType::String)?;
                self.to_property_key(&primitive)
            }
            other => {
                let s = self.to_js_string(other)?;
                Ok(PropertyKey::from_rc(s))
            }
        }
    }

    /// Enumerable string keys visible to for-in, own keys first, shadowed
    /// keys reported once.
    pub(crate) fn for_in_keys(&mut self, id: ObjectId) -> JsResult<Vec<Rc<str>>> {
        let mut seen: HashSet<Rc<str>> = HashSet::new();
        let mut keys = Vec::new();
        let mut current = Some(id);
        while let Some(mut object_id) = current {
            while let Some(proxy) = self.proxy_of(object_id) {
                object_id = self.proxy_parts(proxy)?.0;
            }
            let object = self.object(object_id);
            for key in object.own_keys() {
                if key.is_symbol() {
                    continue;
                }
                let name: Rc<str> = match &key {
                    PropertyKey::String(s) => s.clone(),
                    other => Rc::from(other.to_string()),
                };
                if !seen.insert(name.clone()) {
                    continue;
                }
                if object.get_own(&key).is_some_and(|p| p.enumerable) {
                    keys.push(name);
                }
            }
            current = object.prototype;
        }
        Ok(keys)
    }

    /// Whether `value` has a `[[Call]]` method.
    pub fn is_callable(&self, value: &Value) -> bool {
        match value {
            Value::Object(id) => self.object(*id).is_callable(),
            _ => false,
        }
    }

    /// Whether `value` has a `[[Construct]]` method.
    pub fn is_constructor(&self, value: &Value) -> bool {
        match value {
            Value::Object(id) => self.object(*id).is_constructor(),
            _ => false,
        }
    }

    /// `GetMethod`: undefined and null mean "no method".
    pub(crate) fn get_method(&mut self, base: &Value, key: &PropertyKey) -> JsResult<Option<Value>> {
        let method = self.get_value_property(base, key)?;
        if method.is_nullish() {
            return Ok(None);
        }
        if !self.is_callable(&method) {
            return Err(self.type_error(format!("{} is not a function", key)));
        }
        Ok(Some(method))
    }

    /// `OrdinaryHasInstance`
    pub(crate) fn ordinary_has_instance(&mut self, ctor: &Value, value: &Value) -> JsResult<bool> {
        let Value::Object(ctor_id) = ctor else {
            return Err(self.type_error(format!("invalid 'instanceof' operand {}", ctor)));
        };
        if !self.is_callable(ctor) {
            return Err(self.type_error(format!("invalid 'instanceof' operand {}", ctor)));
        }
        let Value::Object(mut current) = value else {
            return Ok(false);
        };
        let proto = self.get(*ctor_id, "prototype")?;
        let Value::Object(proto) = proto else {
            return Err(self.type_error("'prototype' property of the instanceof operand is not an object"));
        };
        while let Some(next) = self.get_prototype_of(current) {
            if next == proto {
                return Ok(true);
            }
            current = next;
        }
        Ok(false)
    }
}

/// Shorthand used by natives that only need to signal a failed lookup.
pub(crate) fn missing_receiver(vm: &mut VM, what: &str) -> Abrupt {
    vm.type_error(format!("{} called on incompatible receiver", what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_walks_prototype_chain() {
        let mut vm = VM::new();
        let proto = vm.new_object_with_proto(None);
        let _p = vm.root_object(proto);
        vm.init_property(proto, PropertyKey::from("x"), Property::data(Value::Int32(1)));
        let child = vm.new_object_with_proto(Some(proto));
        assert_eq!(vm.get(child, "x").unwrap(), Value::Int32(1));
        assert_eq!(vm.get(child, "y").unwrap(), Value::Undefined);
    }

    #[test]
    fn test_set_respects_readonly_and_extensibility() {
        let mut vm = VM::new();
        let obj = vm.new_object_with_proto(None);
        let _o = vm.root_object(obj);
        vm.init_property(obj, PropertyKey::from("k"), Property::readonly(Value::Int32(1)));
        let receiver = Value::Object(obj);
        assert!(!vm.set_property(obj, &PropertyKey::from("k"), Value::Int32(2), &receiver).unwrap());
        vm.object_mut(obj).extensible = false;
        assert!(!vm.set_property(obj, &PropertyKey::from("n"), Value::Int32(2), &receiver).unwrap());
        assert_eq!(vm.get(obj, "k").unwrap(), Value::Int32(1));
    }

    #[test]
    fn test_array_writes_extend_elements() {
        let mut vm = VM::new();
        let array = vm.create_array(vec![Value::Int32(1)]);
        let _a = vm.root_object(array);
        let receiver = Value::Object(array);
        assert!(vm.set_property(array, &PropertyKey::Index(2), Value::Int32(3), &receiver).unwrap());
        assert_eq!(vm.get(array, "length").unwrap(), Value::Int32(3));
        assert_eq!(vm.get(array, 1u32).unwrap(), Value::Undefined);
        assert!(vm.set_property(array, &PropertyKey::from("length"), Value::Int32(1), &receiver).unwrap());
        assert_eq!(vm.get(array, "length").unwrap(), Value::Int32(1));
    }

    #[test]
    fn test_delete_non_configurable_fails() {
        let mut vm = VM::new();
        let obj = vm.new_object_with_proto(None);
        let _o = vm.root_object(obj);
        vm.init_property(
            obj,
            PropertyKey::from("fixed"),
            Property::with_attributes(Value::Null, true, true, false),
        );
        vm.init_property(obj, PropertyKey::from("loose"), Property::data(Value::Null));
        assert!(!vm.delete_property(obj, &PropertyKey::from("fixed")).unwrap());
        assert!(vm.delete_property(obj, &PropertyKey::from("loose")).unwrap());
        assert!(vm.delete_property(obj, &PropertyKey::from("absent")).unwrap());
    }

    #[test]
    fn test_for_in_keys_skip_shadowed_and_hidden() {
        let mut vm = VM::new();
        let proto = vm.new_object_with_proto(None);
        let _p = vm.root_object(proto);
        vm.init_property(proto, PropertyKey::from("a"), Property::data(Value::Null));
        vm.init_property(proto, PropertyKey::from("b"), Property::data(Value::Null));
        let obj = vm.new_object_with_proto(Some(proto));
        let _o = vm.root_object(obj);
        vm.init_property(obj, PropertyKey::from("b"), Property::hidden(Value::Null));
        vm.init_property(obj, PropertyKey::from("c"), Property::data(Value::Null));
        let keys: Vec<String> = vm.for_in_keys(obj).unwrap().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["c", "a"]);
    }

    #[test]
    fn test_property_read_on_undefined_throws() {
        let mut vm = VM::new();
        let result = vm.get_value_property(&Value::Undefined, &PropertyKey::from("x"));
        assert!(matches!(result, Err(Abrupt::Throw(_))));
    }

    #[test]
    fn test_string_length_and_index() {
        let mut vm = VM::new();
        let s = Value::from("héllo");
        assert_eq!(vm.get_value_property(&s, &PropertyKey::from("length")).unwrap(), Value::Int32(5));
        assert_eq!(vm.get_value_property(&s, &PropertyKey::Index(1)).unwrap(), Value::from("é"));
    }
}
