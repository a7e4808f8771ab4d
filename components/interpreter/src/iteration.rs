//! for-in enumeration and the iterator protocol

use core_types::{Abrupt, JsResult, Magic, ObjectId, Value};

use crate::object::{ForInIterator, JsObject, ObjectClass, Property, PropertyKey};
use crate::vm::VM;

impl VM {
    /// `{ value, done }`
    pub(crate) fn create_iter_result(&mut self, value: Value, done: bool) -> ObjectId {
        let _guard = self.root(&value);
        let mut object = JsObject::ordinary(Some(self.realm.protos.object));
        object
            .properties
            .insert(PropertyKey::from("value"), Property::data(value));
        object
            .properties
            .insert(PropertyKey::from("done"), Property::data(Value::Boolean(done)));
        self.alloc(object)
    }

    /// `Iter`: snapshot the enumerable keys of `value`.
    pub(crate) fn for_in_iterator(&mut self, value: &Value) -> JsResult<ObjectId> {
        let state = if value.is_nullish() {
            ForInIterator {
                object: None,
                keys: Vec::new(),
                index: 0,
            }
        } else {
            let object = self.to_object(value)?;
            let _guard = self.root_object(object);
            let keys = self.for_in_keys(object)?;
            ForInIterator {
                object: Some(object),
                keys,
                index: 0,
            }
        };
        Ok(self.alloc(JsObject::new(None, ObjectClass::ForInIterator(state))))
    }

    /// `MoreIter`: the next key still present on the object, or the
    /// no-iter-value sentinel.
    pub(crate) fn for_in_next(&mut self, iter: &Value) -> JsResult<Value> {
        let Some(id) = iter.as_object() else {
            crate::fatal!("MoreIter on {:?}", iter);
        };
        loop {
            let (object, key) = match &mut self.object_mut(id).class {
                ObjectClass::ForInIterator(state) => {
                    let Some(object) = state.object else {
                        return Ok(Value::Magic(Magic::NoIterValue));
                    };
                    let Some(key) = state.keys.get(state.index).cloned() else {
                        return Ok(Value::Magic(Magic::NoIterValue));
                    };
                    state.index += 1;
                    (object, key)
                }
                _ => crate::fatal!("MoreIter on a non-iterator object"),
            };
            // Keys deleted after the snapshot are not visited.
            if self.has_property(object, &PropertyKey::from_rc(key.clone()))? {
                return Ok(Value::String(key));
            }
        }
    }

    /// `EndIter` and unwinding: release the enumeration state.
    pub(crate) fn close_for_in(&mut self, iter: &Value) {
        let Some(id) = iter.as_object() else {
            return;
        };
        if let Some(object) = self.heap.get_mut(id) {
            if let ObjectClass::ForInIterator(state) = &mut object.class {
                state.object = None;
                state.keys.clear();
            }
        }
    }

    /// `GetIterator`: `[iterator, next]` for `value[Symbol.iterator]()`.
    pub(crate) fn get_iterator(&mut self, value: &Value) -> JsResult<(Value, Value)> {
        let key = PropertyKey::Symbol(self.realm.symbols.iterator.clone());
        let method = match value {
            Value::Undefined | Value::Null => None,
            _ => self.get_method(value, &key)?,
        };
        let Some(method) = method else {
            let described = self.describe_value(value);
            return Err(self.type_error(format!("{} is not iterable", described)));
        };
        let iterator = self.call(&method, value, &[])?;
        if !iterator.is_object() {
            return Err(self.type_error("result of the Symbol.iterator method is not an object"));
        }
        let _guard = self.root(&iterator);
        let next = self.get_value_property(&iterator, &PropertyKey::from("next"))?;
        Ok((iterator, next))
    }

    /// `IteratorNext`
    pub(crate) fn iterator_next(&mut self, iterator: &Value, next: &Value) -> JsResult<Value> {
        let result = self.call(next, iterator, &[])?;
        if !result.is_object() {
            return Err(self.type_error("iterator.next() returned a non-object value"));
        }
        Ok(result)
    }

    /// `CloseIter`: call `return` on a normal completion.
    pub(crate) fn close_iterator(&mut self, iterator: &Value) -> JsResult<()> {
        let Some(method) = self.get_method(iterator, &PropertyKey::from("return"))? else {
            return Ok(());
        };
        let result = self.call(&method, iterator, &[])?;
        if !result.is_object() {
            return Err(self.type_error("iterator.return() returned a non-object value"));
        }
        Ok(())
    }

    /// Close an iterator while an exception is already propagating.
    ///
    /// The result of `return` is not inspected, but an exception thrown by
    /// the lookup or the call replaces the pending one.
    pub(crate) fn close_iterator_on_throw(&mut self, iterator: &Value) -> JsResult<()> {
        if let Some(method) = self.get_method(iterator, &PropertyKey::from("return"))? {
            self.call(&method, iterator, &[])?;
        }
        Ok(())
    }
}
