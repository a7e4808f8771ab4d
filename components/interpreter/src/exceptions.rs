//! Error objects and stack snapshots
//!
//! Scriptable failures are raised as error objects whose prototype comes
//! from the realm. Each carries the interpreter stack at the point it was
//! created; the snapshot is what the embedding sees if the error escapes.

use core_types::{Abrupt, ErrorKind, JsError, ObjectId, StackFrame, Value};

use crate::errors::VmError;
use crate::object::{JsObject, ObjectClass, Property, PropertyKey, PropertySlot};
use crate::vm::VM;

/// Render a stack snapshot the way `error.stack` shows it.
pub fn render_stack(stack: &[StackFrame]) -> String {
    let mut out = String::new();
    for frame in stack {
        out.push_str(&frame.to_string());
        out.push('\n');
    }
    out
}

impl VM {
    /// Interpreter frames, innermost first.
    pub fn capture_stack(&self) -> Vec<StackFrame> {
        self.frames
            .iter()
            .rev()
            .map(|frame| {
                let position = frame.script.position_at(frame.current_pc());
                StackFrame {
                    function_name: (!frame.script.name.is_empty()).then(|| frame.script.name.to_string()),
                    source_url: frame.script.url.as_ref().map(|url| url.to_string()),
                    line: position.map_or(0, |p| p.line),
                    column: position.map_or(0, |p| p.column),
                }
            })
            .collect()
    }

    /// Allocate an error object of `kind` with the current stack.
    pub(crate) fn create_error_object(&mut self, kind: ErrorKind, message: &str, proto: Option<ObjectId>) -> ObjectId {
        let stack = self.capture_stack();
        let proto = proto.unwrap_or_else(|| self.realm.protos.error(kind));
        let rendered = render_stack(&stack);
        let mut object = JsObject::new(Some(proto), ObjectClass::Error { kind, stack });
        if !message.is_empty() {
            object
                .properties
                .insert(PropertyKey::from("message"), Property::hidden(Value::from(message)));
        }
        object
            .properties
            .insert(PropertyKey::from("stack"), Property::hidden(Value::from(rendered)));
        self.alloc(object)
    }

    /// A catchable error of `kind`.
    pub(crate) fn throw_error(&mut self, kind: ErrorKind, message: impl Into<String>) -> Abrupt {
        let message = message.into();
        log::debug!("raising {}: {}", kind, message);
        let error = self.create_error_object(kind, &message, None);
        Abrupt::Throw(Value::Object(error))
    }

    /// A catchable TypeError.
    pub(crate) fn type_error(&mut self, message: impl Into<String>) -> Abrupt {
        self.throw_error(ErrorKind::TypeError, message)
    }

    /// A catchable RangeError.
    pub(crate) fn range_error(&mut self, message: impl Into<String>) -> Abrupt {
        self.throw_error(ErrorKind::RangeError, message)
    }

    /// A catchable ReferenceError.
    pub(crate) fn reference_error(&mut self, message: impl Into<String>) -> Abrupt {
        self.throw_error(ErrorKind::ReferenceError, message)
    }

    /// A catchable SyntaxError.
    pub(crate) fn syntax_error(&mut self, message: impl Into<String>) -> Abrupt {
        self.throw_error(ErrorKind::SyntaxError, message)
    }

    /// A catchable InternalError.
    pub(crate) fn internal_error(&mut self, message: impl Into<String>) -> Abrupt {
        self.throw_error(ErrorKind::InternalError, message)
    }

    /// Describe a value without running script code.
    pub(crate) fn describe_value(&self, value: &Value) -> String {
        match value {
            Value::String(s) => format!("\"{}\"", s),
            Value::Object(id) => match self.heap_object(*id) {
                Some(object) => match object.function() {
                    Some(function) if !function.name.is_empty() => format!("function {}", function.name),
                    _ => format!("[object {}]", object.class.class_name()),
                },
                None => "[object]".to_string(),
            },
            other => other.to_string(),
        }
    }

    fn own_data_string(&self, id: ObjectId, name: &str) -> Option<String> {
        let mut current = Some(id);
        while let Some(object_id) = current {
            let object = self.heap_object(object_id)?;
            if let Some(property) = object.properties.get(&PropertyKey::from(name)) {
                return match &property.slot {
                    PropertySlot::Data { value: Value::String(s), .. } => Some(s.to_string()),
                    _ => None,
                };
            }
            current = object.prototype;
        }
        None
    }

    /// Host view of an abrupt completion that escaped the outermost
    /// activation.
    pub(crate) fn to_vm_error(&mut self, abrupt: Abrupt) -> VmError {
        let value = match abrupt {
            Abrupt::Throw(value) => value,
            Abrupt::Terminated => return VmError::Terminated,
            other => crate::fatal!("{:?} escaped the outermost activation", other),
        };
        let error = match &value {
            Value::Object(id) => match self.heap_object(*id).map(|o| &o.class) {
                Some(ObjectClass::Error { kind, stack }) => {
                    let (kind, stack) = (*kind, stack.clone());
                    let message = self.own_data_string(*id, "message").unwrap_or_default();
                    JsError::new(kind, message).with_stack(stack)
                }
                _ => JsError::new(ErrorKind::Error, format!("uncaught exception: {}", self.describe_value(&value)))
                    .with_stack(std::mem::take(&mut self.last_throw_stack)),
            },
            other => JsError::new(ErrorKind::Error, format!("uncaught exception: {}", self.describe_value(other)))
                .with_stack(std::mem::take(&mut self.last_throw_stack)),
        };
        VmError::Uncaught { error, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_object_has_realm_prototype() {
        let mut vm = VM::new();
        let Abrupt::Throw(Value::Object(error)) = vm.type_error("boom") else {
            panic!("expected a thrown object");
        };
        let _e = vm.root_object(error);
        assert_eq!(vm.heap_object(error).unwrap().prototype, Some(vm.realm.protos.error(ErrorKind::TypeError)));
        assert_eq!(vm.get(error, "message").unwrap(), Value::from("boom"));
        assert_eq!(vm.get(error, "name").unwrap(), Value::from("TypeError"));
    }

    #[test]
    fn test_uncaught_error_converts_to_js_error() {
        let mut vm = VM::new();
        let abrupt = vm.range_error("too big");
        let error = vm.to_vm_error(abrupt);
        let js = error.js_error().unwrap();
        assert_eq!(js.kind, ErrorKind::RangeError);
        assert_eq!(js.message, "too big");
    }

    #[test]
    fn test_uncaught_primitive_is_described() {
        let mut vm = VM::new();
        let error = vm.to_vm_error(Abrupt::Throw(Value::Int32(3)));
        assert_eq!(error.js_error().unwrap().message, "uncaught exception: 3");
        assert_eq!(error.thrown_value(), Some(&Value::Int32(3)));
        assert!(matches!(vm.to_vm_error(Abrupt::Terminated), VmError::Terminated));
    }

    #[test]
    fn test_render_stack() {
        let stack = vec![StackFrame {
            function_name: Some("f".into()),
            source_url: Some("a.js".into()),
            line: 2,
            column: 3,
        }];
        assert_eq!(render_stack(&stack), "f@a.js:2:3\n");
    }
}
