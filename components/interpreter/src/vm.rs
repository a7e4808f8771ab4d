//! Virtual Machine for bytecode execution
//!
//! Main entry point for executing Scripts. A [`VM`] owns one heap, one realm
//! and the shared value stack all frames live on; host calls into it open an
//! activation and report failures as [`VmError`].

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use bytecode_system::Script;
use core_types::{JsResult, ObjectId, Value};
use memory_manager::{Heap, RootSet, SharedBufferRef};

use crate::call_frame::Frame;
use crate::dispatch::Flow;
use crate::environment::{EnvironmentKind, EnvironmentRecord};
use crate::errors::VmError;
use crate::hooks::DebugHooks;
use crate::interrupt::{InterruptCallback, InterruptHandle};
use crate::jit::CompiledTier;
use crate::object::{FunctionData, FunctionKind, JsObject, NativeFn, ObjectClass, Property, PropertyKey, ProxyData};
use crate::options::EngineOptions;
use crate::profile::ProfileData;
use crate::promise_integration::Job;
use crate::realm::Realm;

/// Virtual Machine for executing bytecode
///
/// The VM manages the execution state including:
/// - The traced heap and the realm living in it
/// - The value stack and the frames sharing it
/// - The job queue of async continuations
/// - Installed debugger hooks, compiled tier and interrupt callback
pub struct VM {
    pub(crate) heap: Heap<JsObject>,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) realm: Realm,
    pub(crate) roots: RootSet,
    pub(crate) jobs: VecDeque<Job>,
    /// Exception caught by a catch note, consumed by `Exception`
    pub(crate) pending_exception: Option<Value>,
    /// Stack captured by the last `Throw`, for uncaught non-error values
    pub(crate) last_throw_stack: Vec<core_types::StackFrame>,
    pub(crate) options: EngineOptions,
    pub(crate) profile: ProfileData,
    pub(crate) hooks: Option<Box<dyn DebugHooks>>,
    pub(crate) tier: Option<Box<dyn CompiledTier>>,
    pub(crate) interrupt: InterruptHandle,
    pub(crate) interrupt_callback: Option<InterruptCallback>,
    pub(crate) interrupt_checks: u32,
    /// Nested activations of the dispatch loop
    pub(crate) activation_depth: usize,
}

impl fmt::Debug for VM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VM")
            .field("heap_objects", &self.heap.len())
            .field("stack_len", &self.stack.len())
            .field("frames", &self.frames.len())
            .field("pending_jobs", &self.jobs.len())
            .field("activation_depth", &self.activation_depth)
            .field("options", &self.options)
            .field("hooks", &self.hooks.is_some())
            .field("tier", &self.tier.is_some())
            .finish()
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    /// Create a VM with default options.
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// Create a VM with `options`.
    pub fn with_options(options: EngineOptions) -> Self {
        let mut heap = Heap::with_threshold(options.gc_threshold);
        let realm = Realm::new(&mut heap);
        Self {
            heap,
            stack: Vec::with_capacity(1024),
            frames: Vec::with_capacity(64),
            realm,
            roots: RootSet::new(),
            jobs: VecDeque::new(),
            pending_exception: None,
            last_throw_stack: Vec::new(),
            profile: ProfileData::with_thresholds(options.jit_warmup_threshold, options.jit_osr_threshold),
            options,
            hooks: None,
            tier: None,
            interrupt: InterruptHandle::new(),
            interrupt_callback: None,
            interrupt_checks: 0,
            activation_depth: 0,
        }
    }

    /// Current options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Replace the options. The allocation threshold and warm-up counters
    /// follow the new values.
    pub fn set_options(&mut self, options: EngineOptions) {
        self.heap.set_threshold(options.gc_threshold);
        self.profile = ProfileData::with_thresholds(options.jit_warmup_threshold, options.jit_osr_threshold);
        self.options = options;
    }

    /// Warm-up counters consulted by the compiled-tier bridge.
    pub fn profile(&self) -> &ProfileData {
        &self.profile
    }

    /// Number of live interpreter frames.
    pub fn call_stack_depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn current_frame(&self) -> &Frame {
        match self.frames.last() {
            Some(frame) => frame,
            None => crate::fatal!("no active frame"),
        }
    }

    pub(crate) fn current_frame_mut(&mut self) -> &mut Frame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => crate::fatal!("no active frame"),
        }
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub(crate) fn pop(&mut self) -> Value {
        match self.stack.pop() {
            Some(value) => value,
            None => crate::fatal!("operand stack underflow"),
        }
    }

    /// The operand `n` slots below the top.
    pub(crate) fn peek(&self, n: usize) -> &Value {
        let len = self.stack.len();
        if n >= len {
            crate::fatal!("operand stack underflow: peek {} of {}", n, len);
        }
        &self.stack[len - 1 - n]
    }

    /// Open an activation for a host entry point. The outermost one arms
    /// the time limit; failures leave as [`VmError`].
    fn host_activation<T>(&mut self, f: impl FnOnce(&mut VM) -> JsResult<T>) -> Result<T, VmError> {
        let outermost = self.activation_depth == 0;
        if let Err(abrupt) = self.enter_activation() {
            return Err(self.to_vm_error(abrupt));
        }
        if outermost {
            self.arm_deadline();
        }
        let result = f(self);
        if outermost {
            self.disarm_deadline();
        }
        self.leave_activation();
        result.map_err(|abrupt| {
            self.pending_exception = None;
            self.to_vm_error(abrupt)
        })
    }

    /// Execute a top-level script against the global lexical environment.
    pub fn execute(&mut self, script: Rc<Script>) -> Result<Value, VmError> {
        let env = self.realm.global_lexical;
        self.execute_in(script, env)
    }

    /// Execute a top-level script with `scope` interposed between it and the
    /// global lexical environment. Unqualified names resolve against the
    /// object first.
    pub fn execute_with_environment(&mut self, script: Rc<Script>, scope: &Value) -> Result<Value, VmError> {
        let Value::Object(object) = scope else {
            return Err(VmError::InvalidArgument(format!("scope must be an object, got {}", scope)));
        };
        let _guard = self.root_object(*object);
        let record = EnvironmentRecord::bare(
            EnvironmentKind::NonSyntactic { object: *object },
            Some(self.realm.global_lexical),
        );
        let env = self.alloc_environment(record);
        let mut script = (*script).clone();
        script.flags.has_non_syntactic_scope = true;
        let _env = self.root_object(env);
        self.execute_in(Rc::new(script), env)
    }

    fn execute_in(&mut self, mut script: Rc<Script>, env: ObjectId) -> Result<Value, VmError> {
        if self.options.strict_mode && !script.flags.strict {
            let mut strict = (*script).clone();
            strict.flags.strict = true;
            script = Rc::new(strict);
        }
        log::trace!("executing {} ({} instructions)", script.name, script.instructions.len());
        self.host_activation(|vm| {
            let depth = vm.frames.len();
            let base = vm.stack.len();
            let local_count = script.local_count as usize;
            vm.stack.reserve(local_count + script.max_stack_depth as usize);
            vm.stack.resize(base + local_count, Value::Undefined);
            let mut frame = Frame::new(script.clone(), base, env);
            frame.this = Value::Object(vm.realm.global);
            frame.flags.debuggee = vm.observes_script(&script.name);
            vm.frames.push(frame);
            vm.run(depth, Ok(Flow::Entered))
        })
    }

    /// Call `callee` with `this` and `args` from the host.
    pub fn call_function(&mut self, callee: &Value, this: &Value, args: &[Value]) -> Result<Value, VmError> {
        self.host_activation(|vm| vm.call(callee, this, args))
    }

    /// `new callee(...args)` from the host.
    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> Result<Value, VmError> {
        self.host_activation(|vm| vm.construct_value(callee, args, callee))
    }

    /// Read a property of the global object.
    pub fn get_global(&mut self, name: &str) -> Result<Value, VmError> {
        let global = self.realm.global;
        self.host_activation(|vm| vm.get(global, name))
    }

    /// Write a property of the global object.
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), VmError> {
        let global = Value::Object(self.realm.global);
        let key = PropertyKey::from_name(name);
        self.host_activation(|vm| vm.set_value_property(&global, &key, value, true))
    }

    /// `base[name]`, running getters and proxy traps.
    pub fn get_member(&mut self, base: &Value, name: &str) -> Result<Value, VmError> {
        let key = PropertyKey::from_name(name);
        self.host_activation(|vm| vm.get_value_property(base, &key))
    }

    /// `base[name] = value` as strict code, running setters and proxy traps.
    pub fn set_member(&mut self, base: &Value, name: &str, value: Value) -> Result<(), VmError> {
        let key = PropertyKey::from_name(name);
        self.host_activation(|vm| vm.set_value_property(base, &key, value, true))
    }

    /// A fresh ordinary object inheriting from `Object.prototype`.
    pub fn new_object(&mut self) -> Value {
        let proto = self.realm.protos.object;
        Value::Object(self.new_object_with_proto(Some(proto)))
    }

    /// A fresh array holding `values`.
    pub fn new_array(&mut self, values: Vec<Value>) -> Value {
        let _guards = self.root_all(&values);
        Value::Object(self.create_array(values))
    }

    /// A proxy over `target` with the traps of `handler`.
    pub fn new_proxy(&mut self, target: &Value, handler: &Value) -> Result<Value, VmError> {
        let (Value::Object(target), Value::Object(handler)) = (target, handler) else {
            return Err(VmError::InvalidArgument(
                "proxy target and handler must be objects".to_string(),
            ));
        };
        let (target, handler) = (*target, *handler);
        let _guards = (self.root_object(target), self.root_object(handler));
        let target_object = self.object(target);
        let data = ProxyData {
            target: Some(target),
            handler: Some(handler),
            callable: target_object.is_callable(),
            constructor: target_object.is_constructor(),
        };
        let prototype = target_object.prototype;
        Ok(Value::Object(self.alloc(JsObject::new(prototype, ObjectClass::Proxy(data)))))
    }

    /// Revoke a proxy; every later operation on it throws a TypeError.
    pub fn revoke_proxy(&mut self, proxy: &Value) -> Result<(), VmError> {
        if let Value::Object(id) = proxy {
            if let ObjectClass::Proxy(data) = &mut self.object_mut(*id).class {
                data.target = None;
                data.handler = None;
                return Ok(());
            }
        }
        Err(VmError::InvalidArgument(format!("{} is not a proxy", proxy)))
    }

    /// A native function object named `name`.
    pub fn new_native_function(&mut self, name: &str, func: NativeFn, length: i32) -> Value {
        let proto = self.realm.protos.function;
        let mut object = JsObject::new(
            Some(proto),
            ObjectClass::Function(FunctionData {
                name: Rc::from(name),
                kind: FunctionKind::Native {
                    func,
                    constructor: false,
                },
            }),
        );
        object
            .properties
            .insert(PropertyKey::from("length"), Property::readonly(Value::Int32(length)));
        object
            .properties
            .insert(PropertyKey::from("name"), Property::readonly(Value::from(name)));
        Value::Object(self.alloc(object))
    }

    /// A SharedArrayBuffer object over `buffer`. Several VMs may wrap clones
    /// of the same raw buffer.
    pub fn wrap_shared_buffer(&mut self, buffer: SharedBufferRef) -> Value {
        let proto = self.realm.protos.shared_array_buffer;
        Value::Object(self.alloc(JsObject::new(Some(proto), ObjectClass::SharedArrayBuffer(buffer))))
    }

    /// Frame slot `slot` of the frame `depth` levels below the top.
    pub fn frame_local(&self, depth: usize, slot: u32) -> Option<Value> {
        let frame = self.frames.iter().rev().nth(depth)?;
        if slot >= frame.script.local_count {
            return None;
        }
        self.stack.get(frame.base + slot as usize).cloned()
    }

    /// Overwrite frame slot `slot` of the frame `depth` levels below the
    /// top, returning whether the slot exists.
    pub fn set_frame_local(&mut self, depth: usize, slot: u32, value: Value) -> bool {
        let Some(frame) = self.frames.iter().rev().nth(depth) else {
            return false;
        };
        if slot >= frame.script.local_count {
            return false;
        }
        let index = frame.base + slot as usize;
        match self.stack.get_mut(index) {
            Some(target) => {
                *target = value;
                true
            }
            None => false,
        }
    }
}
