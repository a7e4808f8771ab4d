//! Call and construct protocol
//!
//! Interpreted callees invoked from bytecode get a frame pushed on the
//! running loop, so script-to-script calls never recurse on the Rust stack.
//! Everything else (natives, proxies, host calls, getters reached from a
//! property operation) goes through [`VM::call_internal`], which runs a
//! nested activation of the loop for interpreted targets.

use std::rc::Rc;

use bytecode_system::{BindingKind, BindingLocation, Script};
use core_types::{Abrupt, JsResult, Magic, ObjectId, Value};
use memory_manager::Rooted;

use crate::call_frame::{Frame, FrameFlags};
use crate::dispatch::Flow;
use crate::environment::{EnvironmentKind, EnvironmentRecord};
use crate::hooks::ResumeMode;
use crate::object::{
    CallArgs, FunctionData, FunctionKind, JsObject, NativeFn, ObjectClass, Property, PropertyKey, ProxyData,
};
use crate::vm::VM;

/// Nested activations of the loop (natives calling back into script,
/// getters, generator resumption) allowed at once.
pub const MAX_ACTIVATION_DEPTH: usize = 64;

/// What a callee turns out to be.
enum Callee {
    Interpreted(Rc<Script>),
    Native(NativeFn, Rc<str>),
    Proxy(ProxyData),
}

impl VM {
    fn classify_callee(&self, id: ObjectId) -> Option<Callee> {
        match &self.object(id).class {
            ObjectClass::Function(FunctionData { kind, name }) => Some(match kind {
                FunctionKind::Interpreted { script, .. } => Callee::Interpreted(script.clone()),
                FunctionKind::Native { func, .. } => Callee::Native(*func, name.clone()),
            }),
            ObjectClass::Proxy(proxy) if proxy.callable => Some(Callee::Proxy(*proxy)),
            _ => None,
        }
    }

    pub(crate) fn enter_activation(&mut self) -> JsResult<()> {
        if self.activation_depth >= MAX_ACTIVATION_DEPTH {
            return Err(self.internal_error("too much recursion"));
        }
        self.activation_depth += 1;
        Ok(())
    }

    pub(crate) fn leave_activation(&mut self) {
        self.activation_depth = self.activation_depth.saturating_sub(1);
    }

    /// `Call(callee, this, args)`
    pub fn call(&mut self, callee: &Value, this: &Value, args: &[Value]) -> JsResult<Value> {
        match callee {
            Value::Object(id) if self.object(*id).is_callable() => {
                self.call_internal(*id, this.clone(), args.to_vec(), Value::Undefined)
            }
            other => {
                let described = self.describe_value(other);
                Err(self.type_error(format!("{} is not a function", described)))
            }
        }
    }

    /// Call the method `name` of `base`.
    pub(crate) fn call_method(&mut self, base: &Value, name: &str, args: &[Value]) -> JsResult<Value> {
        let method = self.get_value_property(base, &PropertyKey::from(name))?;
        if !self.is_callable(&method) {
            return Err(self.type_error(format!("{} is not a function", name)));
        }
        self.call(&method, base, args)
    }

    /// Invoke a callable object to completion, nesting an activation of the
    /// loop when the callee is interpreted.
    pub(crate) fn call_internal(
        &mut self,
        callee: ObjectId,
        this: Value,
        args: Vec<Value>,
        new_target: Value,
    ) -> JsResult<Value> {
        let constructing = !new_target.is_undefined();
        match self.classify_callee(callee) {
            Some(Callee::Native(func, name)) => self.call_native(callee, func, &name, this, args, new_target),
            Some(Callee::Proxy(proxy)) => self.call_proxy(callee, proxy, this, args, new_target),
            Some(Callee::Interpreted(_)) => {
                self.enter_activation()?;
                let depth = self.frames.len();
                let flags = FrameFlags {
                    constructing,
                    ..FrameFlags::default()
                };
                let result = match self.enter_interpreted(callee, this, args, new_target, flags) {
                    Ok(()) => self.run(depth, Ok(Flow::Entered)),
                    Err(abrupt) => Err(abrupt),
                };
                self.leave_activation();
                result
            }
            None => crate::fatal!("call_internal on non-callable object {}", callee),
        }
    }

    /// `Construct(callee, args, newTarget)`; both must be constructors.
    pub(crate) fn construct_internal(&mut self, callee: ObjectId, args: Vec<Value>, new_target: Value) -> JsResult<Value> {
        match self.classify_callee(callee) {
            Some(Callee::Interpreted(script)) => {
                let _guards = self.root_all(&args);
                let this = self.construct_this(&script, &new_target)?;
                self.call_internal(callee, this, args, new_target)
            }
            Some(_) => self.call_internal(callee, Value::Undefined, args, new_target),
            None => crate::fatal!("construct_internal on non-constructor {}", callee),
        }
    }

    /// Construct from a script-visible value, checking constructibility.
    pub(crate) fn construct_value(&mut self, callee: &Value, args: &[Value], new_target: &Value) -> JsResult<Value> {
        let id = self.require_constructor(callee)?;
        self.construct_internal(id, args.to_vec(), new_target.clone())
    }

    fn require_constructor(&mut self, callee: &Value) -> JsResult<ObjectId> {
        match callee {
            Value::Object(id) if self.object(*id).is_constructor() => Ok(*id),
            other => {
                let described = self.describe_value(other);
                Err(self.type_error(format!("{} is not a constructor", described)))
            }
        }
    }

    /// `this` of a fresh construct call: uninitialized for derived class
    /// constructors, otherwise an object inheriting from
    /// `newTarget.prototype`.
    fn construct_this(&mut self, script: &Script, new_target: &Value) -> JsResult<Value> {
        if script.flags.derived_class_constructor {
            return Ok(Value::Magic(Magic::UninitializedLexical));
        }
        let fallback = self.realm.protos.object;
        let proto = self.prototype_from_constructor(new_target, fallback)?;
        Ok(Value::Object(self.new_object_with_proto(Some(proto))))
    }

    /// `GetPrototypeFromConstructor`
    pub(crate) fn prototype_from_constructor(&mut self, ctor: &Value, fallback: ObjectId) -> JsResult<ObjectId> {
        let Value::Object(id) = ctor else {
            return Ok(fallback);
        };
        match self.get(*id, "prototype")? {
            Value::Object(proto) => Ok(proto),
            _ => Ok(fallback),
        }
    }

    pub(crate) fn root_all(&self, values: &[Value]) -> Vec<Rooted> {
        values.iter().filter_map(|value| self.root(value)).collect()
    }

    fn call_native(
        &mut self,
        callee: ObjectId,
        func: NativeFn,
        name: &str,
        this: Value,
        args: Vec<Value>,
        new_target: Value,
    ) -> JsResult<Value> {
        let constructing = !new_target.is_undefined();
        if self.hooks.is_some() && self.frames.last().is_some_and(|f| f.flags.debuggee) {
            let mode = self.with_hooks(|hooks, _| hooks.on_native_call(name, constructing));
            match mode {
                ResumeMode::Continue => {}
                ResumeMode::Return(value) => return Ok(value),
                ResumeMode::Throw(value) => return Err(Abrupt::Throw(value)),
                ResumeMode::Terminate => return Err(Abrupt::Terminated),
            }
        }
        self.check_interrupt()?;
        let mut guards = self.root_all(&args);
        guards.push(self.root_object(callee));
        guards.extend(self.root(&this));
        guards.extend(self.root(&new_target));
        let depth = self.frames.len();
        let call_args = CallArgs {
            callee,
            this,
            args,
            new_target,
        };
        log::trace!("calling native {}", name);
        let result = func(self, &call_args);
        if self.frames.len() != depth {
            crate::fatal!("native {} left {} frames, expected {}", name, self.frames.len(), depth);
        }
        if constructing && matches!(&result, Ok(value) if !value.is_object()) {
            crate::fatal!("native constructor {} returned a primitive", name);
        }
        result
    }

    fn call_proxy(
        &mut self,
        proxy_id: ObjectId,
        proxy: ProxyData,
        this: Value,
        args: Vec<Value>,
        new_target: Value,
    ) -> JsResult<Value> {
        let (target, handler) = self.proxy_parts(proxy)?;
        let constructing = !new_target.is_undefined();
        let trap_name = if constructing { "construct" } else { "apply" };
        let _guards = (self.root_all(&args), self.root(&this), self.root(&new_target), self.root_object(proxy_id));
        let Some(trap) = self.proxy_trap(handler, trap_name)? else {
            if !self.object(target).is_callable() {
                crate::fatal!("callable proxy {} without a callable target", proxy_id);
            }
            return if constructing {
                self.construct_internal(target, args, new_target)
            } else {
                self.call_internal(target, this, args, Value::Undefined)
            };
        };
        let array = self.create_array(args);
        let _array = self.root_object(array);
        let last = if constructing { new_target } else { this };
        let result = self.call(
            &trap,
            &Value::Object(handler),
            &[Value::Object(target), Value::Object(array), last],
        )?;
        if constructing && !result.is_object() {
            return Err(self.type_error("proxy [[Construct]] must return an object"));
        }
        Ok(result)
    }

    /// Push a frame for an interpreted function.
    ///
    /// All checks that can fail run before the frame is pushed; once it is
    /// on the stack the prologue only allocates.
    pub(crate) fn enter_interpreted(
        &mut self,
        callee: ObjectId,
        this: Value,
        mut args: Vec<Value>,
        new_target: Value,
        mut flags: FrameFlags,
    ) -> JsResult<()> {
        let (script, env, bound_this, bound_new_target) = match &self.object(callee).class {
            ObjectClass::Function(FunctionData {
                kind:
                    FunctionKind::Interpreted {
                        script,
                        env,
                        bound_this,
                        bound_new_target,
                        ..
                    },
                ..
            }) => (script.clone(), *env, bound_this.clone(), bound_new_target.clone()),
            _ => crate::fatal!("enter_interpreted on object {} without bytecode", callee),
        };
        if self.frames.len() >= self.options.max_recursion_depth {
            return Err(self.internal_error("too much recursion"));
        }
        if script.flags.class_constructor && !flags.constructing {
            return Err(self.type_error("class constructors must be invoked with 'new'"));
        }

        let (this, new_target) = if script.flags.arrow {
            (
                bound_this.unwrap_or(Value::Undefined),
                bound_new_target.unwrap_or(Value::Undefined),
            )
        } else if flags.constructing || script.flags.strict {
            (this, new_target)
        } else {
            let this = match this {
                Value::Undefined | Value::Null => Value::Object(self.realm.global),
                Value::Object(id) => Value::Object(id),
                primitive => {
                    let _guards = (self.root_all(&args), self.root_object(callee));
                    Value::Object(self.to_object(&primitive)?)
                }
            };
            (this, new_target)
        };

        let argc = args.len();
        let formals = script.arg_count as usize;
        if argc < formals {
            args.resize(formals, Value::Undefined);
        }
        let base = self.stack.len();
        let local_count = script.local_count as usize;
        self.stack.reserve(local_count + script.max_stack_depth as usize);
        self.stack.resize(base + local_count, Value::Undefined);

        flags.generator = script.flags.generator || script.flags.is_async;
        flags.debuggee = self.observes_script(&script.name);
        let mut frame = Frame::new(script.clone(), base, env);
        frame.callee = Some(callee);
        frame.this = this;
        frame.new_target = new_target;
        frame.args = args;
        frame.argc = argc;
        frame.flags = flags;
        log::trace!("entering {} with {} arguments at depth {}", script.name, argc, self.frames.len());
        self.frames.push(frame);

        if let Some(index) = script.named_lambda_scope {
            let scope = script.scopes[index as usize].clone();
            let mut record = EnvironmentRecord::for_scope(EnvironmentKind::NamedLambda, scope.clone(), Some(env));
            for binding in &scope.bindings {
                if let (BindingKind::Callee, BindingLocation::Environment(slot)) = (binding.kind, binding.location) {
                    record.slots[slot as usize] = Value::Object(callee);
                }
            }
            let named = self.alloc_environment(record);
            self.current_frame_mut().env = named;
        }

        if script.flags.has_call_object {
            if let Some(index) = script.function_scope {
                let scope = script.scopes[index as usize].clone();
                let parent = self.current_frame().env;
                let mut record = EnvironmentRecord::for_scope(EnvironmentKind::Call, scope.clone(), Some(parent));
                let frame = self.current_frame();
                let formals = scope.bindings.iter().filter(|b| b.kind == BindingKind::FormalParameter);
                for (i, binding) in formals.enumerate() {
                    if let BindingLocation::Environment(slot) = binding.location {
                        record.slots[slot as usize] = frame.args.get(i).cloned().unwrap_or(Value::Undefined);
                    }
                }
                let call_env = self.alloc_environment(record);
                let frame = self.current_frame_mut();
                frame.env = call_env;
                frame.env_scopes.push(index);
            }
        }

        if script.flags.needs_arguments_object {
            let arguments = self.create_arguments_object();
            self.current_frame_mut().args_obj = Some(arguments);
        }
        Ok(())
    }

    /// Unmapped arguments object of the running frame.
    pub(crate) fn create_arguments_object(&mut self) -> ObjectId {
        let frame = self.current_frame();
        let passed = frame.args[..frame.argc.min(frame.args.len())].to_vec();
        let length = passed.len();
        let mut object = JsObject::new(Some(self.realm.protos.object), ObjectClass::Arguments(passed));
        object
            .properties
            .insert(PropertyKey::from("length"), Property::hidden(Value::number(length as f64)));
        self.alloc(object)
    }

    /// Call from bytecode: interpreted callees get a frame on this loop,
    /// everything else completes here and its result is pushed.
    pub(crate) fn invoke(&mut self, callee: Value, this: Value, args: Vec<Value>) -> JsResult<Flow> {
        let id = match &callee {
            Value::Object(id) if self.object(*id).is_callable() => *id,
            other => {
                let described = self.describe_value(other);
                return Err(self.type_error(format!("{} is not a function", described)));
            }
        };
        if let Some(Callee::Interpreted(_)) = self.classify_callee(id) {
            self.enter_interpreted(id, this, args, Value::Undefined, FrameFlags::default())?;
            return Ok(Flow::Entered);
        }
        let result = self.call_internal(id, this, args, Value::Undefined)?;
        self.stack.push(result);
        Ok(Flow::Next)
    }

    /// `new` or `super()` from bytecode.
    pub(crate) fn invoke_construct(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        new_target: Value,
        super_call: bool,
    ) -> JsResult<Flow> {
        let id = if super_call {
            match &callee {
                Value::Object(id) if self.object(*id).is_constructor() => *id,
                other => {
                    let described = self.describe_value(other);
                    return Err(self.type_error(format!("super constructor {} is not a constructor", described)));
                }
            }
        } else {
            self.require_constructor(&callee)?
        };
        if !self.is_constructor(&new_target) {
            let described = self.describe_value(&new_target);
            return Err(self.type_error(format!("{} is not a constructor", described)));
        }
        if let Some(Callee::Interpreted(script)) = self.classify_callee(id) {
            let _guards = (self.root_all(&args), self.root_object(id), self.root(&new_target));
            let this = self.construct_this(&script, &new_target)?;
            let flags = FrameFlags {
                constructing: true,
                super_call,
                ..FrameFlags::default()
            };
            self.enter_interpreted(id, this, args, new_target, flags)?;
            return Ok(Flow::Entered);
        }
        let result = self.construct_internal(id, args, new_target)?;
        if super_call {
            self.bind_super_this(result.clone())?;
        }
        self.stack.push(result);
        Ok(Flow::Next)
    }

    /// Initialize `this` of the running derived constructor with the
    /// result of `super()`.
    pub(crate) fn bind_super_this(&mut self, value: Value) -> JsResult<()> {
        if !self.current_frame().this.is_magic(Magic::UninitializedLexical) {
            return Err(self.reference_error("super() called twice in derived class constructor"));
        }
        self.current_frame_mut().this = value;
        Ok(())
    }

    /// Arguments of a spread call, from the array the bytecode built.
    pub(crate) fn spread_arguments(&mut self, array: &Value) -> JsResult<Vec<Value>> {
        let elements = match array.as_object().and_then(|id| self.object(id).elements()) {
            Some(elements) => elements.clone(),
            None => crate::fatal!("spread call without an argument array"),
        };
        if elements.len() > self.options.max_arguments {
            return Err(self.range_error("too many arguments provided for a function call"));
        }
        Ok(elements)
    }

    /// Allocate an interpreted function object closing over `env`.
    ///
    /// Constructors get a fresh `prototype` object; generator functions get
    /// one inheriting from the generator prototype.
    pub(crate) fn create_function(
        &mut self,
        script: Rc<Script>,
        env: ObjectId,
        bound_this: Option<Value>,
        bound_new_target: Option<Value>,
    ) -> ObjectId {
        let name = script.name.clone();
        let length = script.arg_count;
        let is_constructor = script.is_constructor();
        let generator_proto = match (script.flags.generator, script.flags.is_async) {
            (true, false) => Some(self.realm.protos.generator),
            (true, true) => Some(self.realm.protos.async_generator),
            _ => None,
        };
        let mut object = JsObject::new(
            Some(self.realm.protos.function),
            ObjectClass::Function(FunctionData {
                name: name.clone(),
                kind: FunctionKind::Interpreted {
                    script,
                    env,
                    bound_this,
                    bound_new_target,
                    home_object: None,
                    source_span: None,
                },
            }),
        );
        object
            .properties
            .insert(PropertyKey::from("length"), Property::readonly(Value::Int32(length as i32)));
        object
            .properties
            .insert(PropertyKey::from("name"), Property::readonly(Value::String(name)));
        let function = self.alloc(object);
        if !is_constructor && generator_proto.is_none() {
            return function;
        }
        let _guard = self.root_object(function);
        let prototype = self.new_object_with_proto(Some(generator_proto.unwrap_or(self.realm.protos.object)));
        if generator_proto.is_none() {
            self.init_property(
                prototype,
                PropertyKey::from("constructor"),
                Property::hidden(Value::Object(function)),
            );
        }
        self.init_property(
            function,
            PropertyKey::from("prototype"),
            Property::with_attributes(Value::Object(prototype), true, false, false),
        );
        function
    }

    /// Default class constructor synthesized from the realm's templates,
    /// reporting the class's own source span.
    pub(crate) fn create_class_constructor(
        &mut self,
        name: Rc<str>,
        span: core_types::SourceSpan,
        heritage: Option<Value>,
    ) -> JsResult<ObjectId> {
        let (ctor_proto, proto_parent, template) = match &heritage {
            None => (
                self.realm.protos.function,
                Some(self.realm.protos.object),
                self.realm.base_class_template.clone(),
            ),
            Some(Value::Null) => (self.realm.protos.function, None, self.realm.derived_class_template.clone()),
            Some(parent @ Value::Object(parent_id)) if self.is_constructor(parent) => {
                let parent_id = *parent_id;
                let parent_proto = match self.get(parent_id, "prototype")? {
                    Value::Object(id) => Some(id),
                    Value::Null => None,
                    _ => return Err(self.type_error("class heritage prototype is not an object or null")),
                };
                (parent_id, parent_proto, self.realm.derived_class_template.clone())
            }
            Some(other) => {
                let described = self.describe_value(other);
                return Err(self.type_error(format!("class heritage {} is not an object or null", described)));
            }
        };
        let _heritage = heritage.as_ref().and_then(|h| self.root(h));
        let prototype = self.new_object_with_proto(proto_parent);
        let _prototype = self.root_object(prototype);
        let env = self.current_frame().env;
        let mut object = JsObject::new(
            Some(ctor_proto),
            ObjectClass::Function(FunctionData {
                name: name.clone(),
                kind: FunctionKind::Interpreted {
                    script: template,
                    env,
                    bound_this: None,
                    bound_new_target: None,
                    home_object: Some(prototype),
                    source_span: Some(span),
                },
            }),
        );
        object
            .properties
            .insert(PropertyKey::from("length"), Property::readonly(Value::Int32(0)));
        object
            .properties
            .insert(PropertyKey::from("name"), Property::readonly(Value::String(name)));
        object.properties.insert(
            PropertyKey::from("prototype"),
            Property::with_attributes(Value::Object(prototype), false, false, false),
        );
        let ctor = self.alloc(object);
        self.init_property(prototype, PropertyKey::from("constructor"), Property::hidden(Value::Object(ctor)));
        Ok(ctor)
    }

    /// Home object of the running method, for `super` lookups.
    pub(crate) fn home_object(&self) -> Option<ObjectId> {
        let callee = self.current_frame().callee?;
        match &self.object(callee).class {
            ObjectClass::Function(FunctionData {
                kind: FunctionKind::Interpreted { home_object, .. },
                ..
            }) => *home_object,
            _ => None,
        }
    }

    /// `InitHomeObject`
    pub(crate) fn set_home_object(&mut self, function: ObjectId, home: ObjectId) {
        if let ObjectClass::Function(FunctionData {
            kind: FunctionKind::Interpreted { home_object, .. },
            ..
        }) = &mut self.object_mut(function).class
        {
            *home_object = Some(home);
        }
    }

    /// Reported source span of a function object.
    pub fn function_source_span(&self, function: &Value) -> Option<core_types::SourceSpan> {
        self.heap_object(function.as_object()?)?.function()?.source_span()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_vm: &mut VM, args: &CallArgs) -> JsResult<Value> {
        Ok(Value::number(args.args.len() as f64))
    }

    #[test]
    fn test_calling_non_callable_is_type_error() {
        let mut vm = VM::new();
        let result = vm.call(&Value::Int32(1), &Value::Undefined, &[]);
        let Err(Abrupt::Throw(Value::Object(error))) = result else {
            panic!("expected a thrown error");
        };
        let _e = vm.root_object(error);
        assert_eq!(vm.get(error, "message").unwrap(), Value::from("1 is not a function"));
    }

    #[test]
    fn test_native_receives_arguments() {
        let mut vm = VM::new();
        let f = vm.new_native_function("count", noop, 0);
        let result = vm.call(&f, &Value::Undefined, &[Value::Null, Value::Null]).unwrap();
        assert_eq!(result, Value::Int32(2));
    }

    #[test]
    fn test_activation_depth_is_capped() {
        let mut vm = VM::new();
        vm.activation_depth = MAX_ACTIVATION_DEPTH;
        assert!(matches!(vm.enter_activation(), Err(Abrupt::Throw(_))));
        vm.activation_depth = 0;
        assert!(vm.enter_activation().is_ok());
        vm.leave_activation();
        assert_eq!(vm.activation_depth, 0);
    }

    #[test]
    fn test_second_super_call_is_reference_error() {
        use bytecode_system::Opcode;

        let mut vm = VM::new();
        let mut script = Script::new("Derived");
        script.flags.strict = true;
        script.flags.class_constructor = true;
        script.flags.derived_class_constructor = true;
        script.max_stack_depth = 3;
        for _ in 0..2 {
            for op in [Opcode::Callee, Opcode::SuperFun, Opcode::NewTarget, Opcode::SuperCall(0), Opcode::Pop] {
                script.emit(op);
            }
        }
        script.emit(Opcode::FunctionThis);
        script.emit(Opcode::CheckReturn);
        script.emit(Opcode::RetRval);

        let env = vm.realm.global_lexical;
        let derived = vm.create_function(Rc::new(script), env, None, None);
        let _d = vm.root_object(derived);
        let parent = vm.realm.intrinsics["Object"].as_object();
        vm.object_mut(derived).prototype = parent;

        let ctor = Value::Object(derived);
        let Err(Abrupt::Throw(Value::Object(error))) = vm.construct_value(&ctor, &[], &ctor) else {
            panic!("expected a thrown error");
        };
        let _e = vm.root_object(error);
        assert_eq!(
            vm.get(error, "message").unwrap(),
            Value::from("super() called twice in derived class constructor")
        );
        assert_eq!(vm.frames.len(), 0);
    }

    #[test]
    fn test_prototype_from_constructor_falls_back() {
        let mut vm = VM::new();
        let fallback = vm.realm.protos.object;
        assert_eq!(vm.prototype_from_constructor(&Value::Undefined, fallback).unwrap(), fallback);
        let array_ctor = vm.realm.intrinsics["Array"].clone();
        let proto = vm.prototype_from_constructor(&array_ctor, fallback).unwrap();
        assert_eq!(proto, vm.realm.protos.array);
    }
}
