//! Realm: the global object, intrinsics and well-known symbols
//!
//! A realm is built once per VM, directly into the heap before any script
//! runs. Everything it holds is a GC root.

use std::rc::Rc;

use bytecode_system::{Opcode, Script};
use core_types::{ErrorKind, ObjectId, Symbol, Value};
use indexmap::IndexMap;
use memory_manager::{Heap, Trace, Tracer};

use crate::environment::{EnvironmentKind, EnvironmentRecord};
use crate::natives;
use crate::object::{FunctionData, FunctionKind, JsObject, NativeFn, ObjectClass, Property, PropertyKey};

/// Prototype objects of the built-in kinds.
#[derive(Debug, Clone)]
pub struct Prototypes {
    /// `Object.prototype`
    pub object: ObjectId,
    /// `Function.prototype`
    pub function: ObjectId,
    /// `Array.prototype`
    pub array: ObjectId,
    /// `%IteratorPrototype%`
    pub iterator: ObjectId,
    /// `%ArrayIteratorPrototype%`
    pub array_iterator: ObjectId,
    /// `%GeneratorPrototype%`
    pub generator: ObjectId,
    /// `%AsyncGeneratorPrototype%`
    pub async_generator: ObjectId,
    /// `Promise.prototype`
    pub promise: ObjectId,
    /// `Boolean.prototype`
    pub boolean: ObjectId,
    /// `Number.prototype`
    pub number: ObjectId,
    /// `String.prototype`
    pub string: ObjectId,
    /// `Symbol.prototype`
    pub symbol: ObjectId,
    /// `BigInt.prototype`
    pub bigint: ObjectId,
    /// `SharedArrayBuffer.prototype`
    pub shared_array_buffer: ObjectId,
    /// Error prototypes in [`ErrorKind::ALL`] order
    pub errors: Vec<ObjectId>,
}

impl Prototypes {
    /// Prototype of errors of `kind`
    pub fn error(&self, kind: ErrorKind) -> ObjectId {
        let index = ErrorKind::ALL.iter().position(|k| *k == kind).unwrap_or(0);
        self.errors[index]
    }
}

/// Symbols the interpreter consults.
#[derive(Debug, Clone)]
pub struct WellKnownSymbols {
    /// `Symbol.iterator`
    pub iterator: Symbol,
    /// `Symbol.asyncIterator`
    pub async_iterator: Symbol,
    /// `Symbol.toPrimitive`
    pub to_primitive: Symbol,
    /// `Symbol.unscopables`
    pub unscopables: Symbol,
}

impl WellKnownSymbols {
    fn new() -> Self {
        Self {
            iterator: Symbol::new(Some("Symbol.iterator")),
            async_iterator: Symbol::new(Some("Symbol.asyncIterator")),
            to_primitive: Symbol::new(Some("Symbol.toPrimitive")),
            unscopables: Symbol::new(Some("Symbol.unscopables")),
        }
    }
}

/// Global state shared by all code of one VM.
#[derive(Debug)]
pub struct Realm {
    /// The global object
    pub global: ObjectId,
    /// Top-level lexical environment over the global object
    pub global_lexical: ObjectId,
    /// Names readable through `GetIntrinsic`
    pub intrinsics: IndexMap<Rc<str>, Value>,
    /// Built-in prototypes
    pub protos: Prototypes,
    /// Well-known symbols
    pub symbols: WellKnownSymbols,
    /// Body of a synthesized base-class constructor
    pub base_class_template: Rc<Script>,
    /// Body of a synthesized derived-class constructor
    pub derived_class_template: Rc<Script>,
}

impl Trace for Realm {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark(self.global);
        tracer.mark(self.global_lexical);
        tracer.mark_values(self.intrinsics.values());
        let p = &self.protos;
        for id in [
            p.object,
            p.function,
            p.array,
            p.iterator,
            p.array_iterator,
            p.generator,
            p.async_generator,
            p.promise,
            p.boolean,
            p.number,
            p.string,
            p.symbol,
            p.bigint,
            p.shared_array_buffer,
        ] {
            tracer.mark(id);
        }
        p.errors.trace(tracer);
    }
}

/// Inserts realm objects straight into the heap; no collection can run
/// while the realm is incomplete.
struct RealmBuilder<'h> {
    heap: &'h mut Heap<JsObject>,
    function_proto: ObjectId,
}

impl RealmBuilder<'_> {
    fn object(&mut self, prototype: Option<ObjectId>) -> ObjectId {
        self.heap.insert(JsObject::ordinary(prototype))
    }

    fn native(&mut self, name: &str, func: NativeFn, length: i32, constructor: bool) -> ObjectId {
        let mut object = JsObject::new(
            Some(self.function_proto),
            ObjectClass::Function(FunctionData {
                name: Rc::from(name),
                kind: FunctionKind::Native { func, constructor },
            }),
        );
        object
            .properties
            .insert(PropertyKey::from("length"), Property::readonly(Value::Int32(length)));
        object
            .properties
            .insert(PropertyKey::from("name"), Property::readonly(Value::from(name)));
        self.heap.insert(object)
    }

    fn put(&mut self, target: ObjectId, key: PropertyKey, property: Property) {
        if let Some(object) = self.heap.get_mut(target) {
            object.properties.insert(key, property);
        }
    }

    fn method(&mut self, target: ObjectId, name: &str, func: NativeFn, length: i32) -> ObjectId {
        let function = self.native(name, func, length, false);
        self.put(target, PropertyKey::from(name), Property::hidden(Value::Object(function)));
        function
    }

    fn symbol_method(&mut self, target: ObjectId, symbol: &Symbol, name: &str, func: NativeFn) {
        let function = self.native(name, func, 0, false);
        self.put(
            target,
            PropertyKey::Symbol(symbol.clone()),
            Property::hidden(Value::Object(function)),
        );
    }

    /// Link `constructor.prototype` and `prototype.constructor`.
    fn link(&mut self, constructor: ObjectId, prototype: ObjectId) {
        self.put(
            constructor,
            PropertyKey::from("prototype"),
            Property::with_attributes(Value::Object(prototype), false, false, false),
        );
        self.put(prototype, PropertyKey::from("constructor"), Property::hidden(Value::Object(constructor)));
    }
}

fn class_template(derived: bool) -> Script {
    let mut script = Script::new("");
    script.flags.class_constructor = true;
    script.flags.strict = true;
    if derived {
        script.flags.derived_class_constructor = true;
        for op in [
            Opcode::Callee,
            Opcode::SuperFun,
            Opcode::Rest,
            Opcode::NewTarget,
            Opcode::SpreadSuperCall,
            Opcode::Pop,
            Opcode::FunctionThis,
            Opcode::CheckReturn,
            Opcode::RetRval,
        ] {
            script.emit(op);
        }
        script.max_stack_depth = 3;
    } else {
        script.emit(Opcode::RetRval);
    }
    script
}

impl Realm {
    /// Build a realm inside `heap`.
    pub fn new(heap: &mut Heap<JsObject>) -> Self {
        let symbols = WellKnownSymbols::new();
        let object_proto = heap.insert(JsObject::ordinary(None));
        let function_proto = heap.insert(JsObject::new(
            Some(object_proto),
            ObjectClass::Function(FunctionData {
                name: Rc::from(""),
                kind: FunctionKind::Native {
                    func: natives::function_prototype,
                    constructor: false,
                },
            }),
        ));
        let mut b = RealmBuilder { heap, function_proto };
        let mut intrinsics: IndexMap<Rc<str>, Value> = IndexMap::new();

        // Object
        b.method(object_proto, "toString", natives::object_to_string, 0);
        b.method(object_proto, "valueOf", natives::object_value_of, 0);
        b.method(object_proto, "hasOwnProperty", natives::object_has_own_property, 1);
        let object_ctor = b.native("Object", natives::object_constructor, 1, true);
        b.link(object_ctor, object_proto);

        // Iterators and arrays
        let iterator = b.object(Some(object_proto));
        b.symbol_method(iterator, &symbols.iterator, "[Symbol.iterator]", natives::iterator_self);
        let array_iterator = b.object(Some(iterator));
        b.method(array_iterator, "next", natives::array_iterator_next, 0);

        let array_proto = b.object(Some(object_proto));
        b.method(array_proto, "join", natives::array_join, 1);
        b.method(array_proto, "toString", natives::array_to_string, 0);
        b.method(array_proto, "push", natives::array_push, 1);
        let values = b.method(array_proto, "values", natives::array_values, 0);
        b.put(
            array_proto,
            PropertyKey::Symbol(symbols.iterator.clone()),
            Property::hidden(Value::Object(values)),
        );
        let array_ctor = b.native("Array", natives::array_constructor, 1, true);
        b.link(array_ctor, array_proto);

        // Generators
        let generator = b.object(Some(iterator));
        b.method(generator, "next", natives::generator_next, 1);
        b.method(generator, "return", natives::generator_return, 1);
        b.method(generator, "throw", natives::generator_throw, 1);
        let async_iterator = b.object(Some(object_proto));
        b.symbol_method(
            async_iterator,
            &symbols.async_iterator,
            "[Symbol.asyncIterator]",
            natives::iterator_self,
        );
        let async_generator = b.object(Some(async_iterator));
        b.method(async_generator, "next", natives::async_generator_next, 1);
        b.method(async_generator, "return", natives::async_generator_return, 1);
        b.method(async_generator, "throw", natives::async_generator_throw, 1);
        let promise = b.object(Some(object_proto));

        // Primitive wrappers
        let boolean = b.object(Some(object_proto));
        b.method(boolean, "valueOf", natives::boolean_value_of, 0);
        b.method(boolean, "toString", natives::boolean_to_string, 0);
        let number = b.object(Some(object_proto));
        b.method(number, "valueOf", natives::number_value_of, 0);
        b.method(number, "toString", natives::number_to_string, 1);
        let string = b.object(Some(object_proto));
        b.method(string, "valueOf", natives::string_value_of, 0);
        b.method(string, "toString", natives::string_value_of, 0);
        let symbol = b.object(Some(object_proto));
        b.method(symbol, "valueOf", natives::symbol_value_of, 0);
        let bigint = b.object(Some(object_proto));
        b.method(bigint, "valueOf", natives::bigint_value_of, 0);
        b.method(bigint, "toString", natives::bigint_to_string, 0);
        let shared_array_buffer = b.object(Some(object_proto));
        b.method(shared_array_buffer, "byteLength", natives::shared_buffer_byte_length, 0);

        // Errors
        let error_proto = b.object(Some(object_proto));
        b.method(error_proto, "toString", natives::error_to_string, 0);
        let mut errors = Vec::with_capacity(ErrorKind::ALL.len());
        let mut error_ctors = Vec::with_capacity(ErrorKind::ALL.len());
        for kind in ErrorKind::ALL {
            let proto = if kind == ErrorKind::Error {
                error_proto
            } else {
                b.object(Some(error_proto))
            };
            b.put(proto, PropertyKey::from("name"), Property::hidden(Value::from(kind.name())));
            b.put(proto, PropertyKey::from("message"), Property::hidden(Value::from("")));
            let ctor = b.native(kind.name(), natives::error_constructor, 1, true);
            b.link(ctor, proto);
            errors.push(proto);
            error_ctors.push((kind, ctor));
        }

        // Global object
        let global = b.object(Some(object_proto));
        b.put(global, PropertyKey::from("globalThis"), Property::hidden(Value::Object(global)));
        for (name, value) in [
            ("undefined", Value::Undefined),
            ("NaN", Value::Double(f64::NAN)),
            ("Infinity", Value::Double(f64::INFINITY)),
        ] {
            b.put(
                global,
                PropertyKey::from(name),
                Property::with_attributes(value, false, false, false),
            );
        }
        let mut constructors = vec![("Object", object_ctor), ("Array", array_ctor)];
        constructors.extend(error_ctors.iter().map(|(kind, ctor)| (kind.name(), *ctor)));
        for (name, ctor) in constructors {
            b.put(global, PropertyKey::from(name), Property::hidden(Value::Object(ctor)));
            intrinsics.insert(Rc::from(name), Value::Object(ctor));
        }

        for (name, id) in [
            ("ObjectPrototype", object_proto),
            ("FunctionPrototype", function_proto),
            ("ArrayPrototype", array_proto),
            ("ArrayValues", values),
            ("IteratorPrototype", iterator),
            ("ArrayIteratorPrototype", array_iterator),
            ("GeneratorPrototype", generator),
            ("AsyncGeneratorPrototype", async_generator),
            ("PromisePrototype", promise),
        ] {
            intrinsics.insert(Rc::from(name), Value::Object(id));
        }

        let global_lexical = b.heap.insert(JsObject::new(
            None,
            ObjectClass::Environment(EnvironmentRecord::bare(
                EnvironmentKind::GlobalLexical {
                    bindings: IndexMap::new(),
                    global,
                },
                None,
            )),
        ));

        log::trace!("realm initialized with {} intrinsics", intrinsics.len());

        Realm {
            global,
            global_lexical,
            intrinsics,
            protos: Prototypes {
                object: object_proto,
                function: function_proto,
                array: array_proto,
                iterator,
                array_iterator,
                generator,
                async_generator,
                promise,
                boolean,
                number,
                string,
                symbol,
                bigint,
                shared_array_buffer,
                errors,
            },
            symbols,
            base_class_template: Rc::new(class_template(false)),
            derived_class_template: Rc::new(class_template(true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realm_globals() {
        let mut heap = Heap::new();
        let realm = Realm::new(&mut heap);
        let global = heap.get(realm.global).unwrap();
        assert!(global.properties.contains_key(&PropertyKey::from("Object")));
        assert!(global.properties.contains_key(&PropertyKey::from("TypeError")));
        assert!(realm.intrinsics.contains_key("ArrayValues"));
    }

    #[test]
    fn test_error_prototypes_chain_to_error() {
        let mut heap = Heap::new();
        let realm = Realm::new(&mut heap);
        let type_error = heap.get(realm.protos.error(ErrorKind::TypeError)).unwrap();
        assert_eq!(type_error.prototype, Some(realm.protos.error(ErrorKind::Error)));
    }

    #[test]
    fn test_derived_template_ends_with_check_return() {
        let template = class_template(true);
        let ops: Vec<Opcode> = template.instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(ops.first(), Some(&Opcode::Callee));
        assert_eq!(&ops[ops.len() - 2..], &[Opcode::CheckReturn, Opcode::RetRval]);
        assert!(template.flags.derived_class_constructor);
    }
}
