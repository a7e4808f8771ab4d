//! Dispatch loop for bytecode execution
//!
//! [`VM::run`] drives the frames above an entry depth until the entry frame
//! returns or suspends. Each instruction is executed by `VM::execute_op`,
//! which reports how the loop continues through [`Flow`]. Abrupt
//! completions go to the unwinder; frames entered by calls from bytecode run
//! on the same loop without growing the Rust stack.

use std::ops::ControlFlow;
use std::rc::Rc;

use bytecode_system::{Constant, GeneratorResumeKind, Opcode};
use core_types::{Abrupt, JsResult, Magic, ObjectId, Value};

use crate::arith::NumericOp;
use crate::environment::EnvironmentKind;
use crate::generator::SuspendKind;
use crate::hooks::HookOutcome;
use crate::jit::{ResumePoint, TierEntry};
use crate::names::const_assignment_message;
use crate::object::{Property, PropertyKey};
use crate::vm::VM;

/// How the loop continues after an instruction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    /// Execute the next instruction of the top frame
    Next,
    /// A frame was just pushed; run its entry hooks first
    Entered,
    /// The top frame completed normally with this value
    Return(Value),
    /// The top frame was moved into a generator; hand this value out
    Suspend(Value),
}

impl VM {
    /// Run until the frame stack is back at `entry_depth`, starting with
    /// `flow` as the outcome of the last step.
    pub(crate) fn run(&mut self, entry_depth: usize, mut flow: JsResult<Flow>) -> JsResult<Value> {
        loop {
            match flow {
                Ok(Flow::Next) => {}
                Ok(Flow::Entered) => {
                    flow = self.frame_entered();
                    continue;
                }
                Ok(Flow::Return(value)) => match self.return_to_caller(entry_depth, Ok(value)) {
                    ControlFlow::Break(result) => return result,
                    ControlFlow::Continue(next) => {
                        flow = next;
                        continue;
                    }
                },
                Ok(Flow::Suspend(value)) => {
                    if self.frames.len() <= entry_depth {
                        return Ok(value);
                    }
                    self.stack.push(value);
                }
                Err(abrupt) => {
                    if let Err(abrupt) = self.handle_error(abrupt) {
                        match self.return_to_caller(entry_depth, Err(abrupt)) {
                            ControlFlow::Break(result) => return result,
                            ControlFlow::Continue(next) => {
                                flow = next;
                                continue;
                            }
                        }
                    }
                }
            }
            flow = self.step();
        }
    }

    /// Pop the top frame and deliver its completion to the caller frame, or
    /// break out once the entry frame is gone.
    fn return_to_caller(
        &mut self,
        entry_depth: usize,
        result: JsResult<Value>,
    ) -> ControlFlow<JsResult<Value>, JsResult<Flow>> {
        let (result, flags) = self.complete_frame(result);
        if self.frames.len() <= entry_depth {
            return ControlFlow::Break(result);
        }
        let value = match result {
            Ok(value) => value,
            Err(abrupt) => return ControlFlow::Continue(Err(abrupt)),
        };
        if flags.super_call {
            if let Err(abrupt) = self.bind_super_this(value.clone()) {
                return ControlFlow::Continue(Err(abrupt));
            }
        }
        self.stack.push(value);
        ControlFlow::Continue(Ok(Flow::Next))
    }

    /// Entry hooks of a freshly pushed frame: the debugger, then the
    /// compiled tier.
    fn frame_entered(&mut self) -> JsResult<Flow> {
        if self.hooks.is_some() && self.current_frame().flags.debuggee {
            let mode = self.with_hooks(|hooks, view| hooks.on_enter_frame(view));
            if let HookOutcome::Abrupt(abrupt) = self.apply_resume_mode(mode) {
                return Err(abrupt);
            }
        }
        match self.try_tier_up(TierEntry::FunctionEntry) {
            Some(point) => self.resume_from_tier(point),
            None => Ok(Flow::Next),
        }
    }

    fn resume_from_tier(&mut self, point: ResumePoint) -> JsResult<Flow> {
        match point {
            ResumePoint::Returned(value) => Ok(Flow::Return(value)),
            ResumePoint::Threw(abrupt) => Err(abrupt),
            ResumePoint::ReenterAt(pc) => {
                self.current_frame_mut().pc = pc;
                Ok(Flow::Next)
            }
        }
    }

    /// Fetch and execute one instruction of the top frame. Running off the
    /// end of the stream returns the return-value slot.
    fn step(&mut self) -> JsResult<Flow> {
        let frame = self.current_frame_mut();
        let pc = frame.pc;
        let Some(instruction) = frame.script.instructions.get(pc) else {
            return Ok(Flow::Return(frame.rval.clone()));
        };
        let opcode = instruction.opcode;
        frame.pc = pc + 1;
        if self.hooks.is_some() {
            self.step_hooks(pc)?;
        }
        self.execute_op(opcode, pc)
    }

    /// Clones of the top `N` operands, deepest first.
    fn operands<const N: usize>(&self) -> [Value; N] {
        let len = self.stack.len();
        if len < N {
            crate::fatal!("operand stack underflow: need {}, have {}", N, len);
        }
        std::array::from_fn(|i| self.stack[len - N + i].clone())
    }

    /// Stack height with the top `n` operands removed.
    fn height_below(&self, n: usize) -> usize {
        match self.stack.len().checked_sub(n) {
            Some(height) => height,
            None => crate::fatal!("operand stack underflow: need {}, have {}", n, self.stack.len()),
        }
    }

    /// Replace the top `n` operands with `value`.
    fn replace_top(&mut self, n: usize, value: Value) {
        let height = self.height_below(n);
        self.stack.truncate(height);
        self.stack.push(value);
    }

    fn jump(&mut self, target: u32) {
        self.current_frame_mut().pc = target as usize;
    }

    fn local_index(&self, slot: u32) -> usize {
        let frame = self.current_frame();
        if slot >= frame.script.local_count {
            crate::fatal!("frame slot {} out of range in {}", slot, frame.script.name);
        }
        frame.base + slot as usize
    }

    fn local_name(&self, slot: u32) -> Rc<str> {
        self.current_frame()
            .script
            .local_name(slot)
            .unwrap_or_else(|| Rc::from("?"))
    }

    fn atom_key(&self, atom: u32) -> PropertyKey {
        PropertyKey::from_rc(self.current_atom(atom))
    }

    fn object_operand(&self, value: &Value, what: &str) -> ObjectId {
        match value {
            Value::Object(id) => *id,
            other => crate::fatal!("{} expects an object operand, got {:?}", what, other),
        }
    }

    /// Strict frames treat the sloppy forms of assignment and `delete` as
    /// their strict counterparts.
    fn is_strict(&self) -> bool {
        self.current_frame().is_strict()
    }

    /// `delete base[key]`
    fn delete_value_property(&mut self, base: &Value, key: &PropertyKey, strict: bool) -> JsResult<bool> {
        let object = self.to_object(base)?;
        let _guard = self.root_object(object);
        let deleted = self.delete_property(object, key)?;
        if !deleted {
            self.report_strict_violation(
                strict,
                format!("property \"{}\" is non-configurable and can't be deleted", key),
            )?;
        }
        Ok(deleted)
    }

    fn super_base_object(&mut self, base: &Value, key: &PropertyKey) -> JsResult<ObjectId> {
        match base {
            Value::Object(id) => Ok(*id),
            other => Err(self.type_error(format!("can't access property \"{}\" of {}", key, other))),
        }
    }

    /// Execute `opcode`, fetched from `pc` of the top frame.
    fn execute_op(&mut self, opcode: Opcode, pc: usize) -> JsResult<Flow> {
        match opcode {
            // Literals and stack shuffling
            Opcode::LoadConstant(index) => {
                let value = match self.current_frame().script.constants.get(index as usize) {
                    Some(constant) => Constant::to_value(constant),
                    None => crate::fatal!("constant {} out of range", index),
                };
                self.stack.push(value);
            }
            Opcode::LoadInt(n) => self.stack.push(Value::Int32(n)),
            Opcode::LoadUndefined => self.stack.push(Value::Undefined),
            Opcode::LoadNull => self.stack.push(Value::Null),
            Opcode::LoadTrue => self.stack.push(Value::Boolean(true)),
            Opcode::LoadFalse => self.stack.push(Value::Boolean(false)),
            Opcode::Uninitialized => self.stack.push(Value::Magic(Magic::UninitializedLexical)),
            Opcode::Pop => {
                self.pop();
            }
            Opcode::PopN(n) => {
                let height = self.height_below(n as usize);
                self.stack.truncate(height);
            }
            Opcode::Dup => {
                let value = self.peek(0).clone();
                self.stack.push(value);
            }
            Opcode::Dup2 => {
                let [a, b] = self.operands::<2>();
                self.stack.push(a);
                self.stack.push(b);
            }
            Opcode::DupAt(n) => {
                let value = self.peek(n as usize).clone();
                self.stack.push(value);
            }
            Opcode::Swap => {
                let below = self.height_below(2);
                self.stack.swap(below, below + 1);
            }
            Opcode::Pick(n) => {
                let index = self.height_below(n as usize + 1);
                let value = self.stack.remove(index);
                self.stack.push(value);
            }
            Opcode::Unpick(n) => {
                let value = self.pop();
                let index = self.height_below(n as usize);
                self.stack.insert(index, value);
            }

            // Arithmetic and coercion
            Opcode::Add => {
                let [a, b] = self.operands::<2>();
                let result = self.add_values(&a, &b)?;
                self.replace_top(2, result);
            }
            Opcode::Sub => self.binary_numeric(NumericOp::Sub)?,
            Opcode::Mul => self.binary_numeric(NumericOp::Mul)?,
            Opcode::Div => self.binary_numeric(NumericOp::Div)?,
            Opcode::Mod => self.binary_numeric(NumericOp::Mod)?,
            Opcode::Pow => self.binary_numeric(NumericOp::Pow)?,
            Opcode::BitOr => self.binary_numeric(NumericOp::BitOr)?,
            Opcode::BitXor => self.binary_numeric(NumericOp::BitXor)?,
            Opcode::BitAnd => self.binary_numeric(NumericOp::BitAnd)?,
            Opcode::Lsh => self.binary_numeric(NumericOp::Lsh)?,
            Opcode::Rsh => self.binary_numeric(NumericOp::Rsh)?,
            Opcode::Ursh => self.binary_numeric(NumericOp::Ursh)?,
            Opcode::Pos => {
                let [value] = self.operands::<1>();
                let n = self.to_number(&value)?;
                self.replace_top(1, Value::number(n));
            }
            Opcode::Neg => {
                let [value] = self.operands::<1>();
                let result = self.negate(&value)?;
                self.replace_top(1, result);
            }
            Opcode::BitNot => {
                let [value] = self.operands::<1>();
                let result = self.bit_not(&value)?;
                self.replace_top(1, result);
            }
            Opcode::Not => {
                let value = self.pop();
                self.stack.push(Value::Boolean(!value.is_truthy()));
            }
            Opcode::Inc | Opcode::Dec => {
                let [value] = self.operands::<1>();
                let delta = if opcode == Opcode::Inc { 1 } else { -1 };
                let result = self.increment(&value, delta)?;
                self.replace_top(1, result);
            }
            Opcode::ToNumeric => {
                let [value] = self.operands::<1>();
                let result = self.to_numeric(&value)?;
                self.replace_top(1, result);
            }
            Opcode::ToString => {
                let [value] = self.operands::<1>();
                let result = self.to_js_string(&value)?;
                self.replace_top(1, Value::String(result));
            }
            Opcode::Typeof => {
                let value = self.pop();
                let name = self.type_of(&value);
                self.stack.push(Value::from(name));
            }
            Opcode::Void => self.replace_top(1, Value::Undefined),

            // Comparison
            Opcode::Eq | Opcode::Ne => {
                let [a, b] = self.operands::<2>();
                let equal = self.loose_equals(&a, &b)?;
                self.replace_top(2, Value::Boolean(equal == (opcode == Opcode::Eq)));
            }
            Opcode::StrictEq | Opcode::StrictNe => {
                let [a, b] = self.operands::<2>();
                let equal = a.strict_equals(&b);
                self.replace_top(2, Value::Boolean(equal == (opcode == Opcode::StrictEq)));
            }
            Opcode::Lt => {
                let [a, b] = self.operands::<2>();
                let result = self.less_than(&a, &b, true)?;
                self.replace_top(2, Value::Boolean(result == Some(true)));
            }
            Opcode::Gt => {
                let [a, b] = self.operands::<2>();
                let result = self.less_than(&b, &a, false)?;
                self.replace_top(2, Value::Boolean(result == Some(true)));
            }
            Opcode::Le => {
                let [a, b] = self.operands::<2>();
                let result = self.less_than(&b, &a, false)?;
                self.replace_top(2, Value::Boolean(result == Some(false)));
            }
            Opcode::Ge => {
                let [a, b] = self.operands::<2>();
                let result = self.less_than(&a, &b, true)?;
                self.replace_top(2, Value::Boolean(result == Some(false)));
            }
            Opcode::Instanceof => {
                let [object, ctor] = self.operands::<2>();
                let result = self.ordinary_has_instance(&ctor, &object)?;
                self.replace_top(2, Value::Boolean(result));
            }
            Opcode::In => {
                let [key, object] = self.operands::<2>();
                let result = self.has_in(&key, &object)?;
                self.replace_top(2, Value::Boolean(result));
            }

            // Control flow
            Opcode::Goto(target) => {
                if target as usize <= pc {
                    self.check_interrupt()?;
                }
                self.jump(target);
            }
            Opcode::IfEq(target) => {
                if !self.pop().is_truthy() {
                    self.jump(target);
                }
            }
            Opcode::IfNe(target) => {
                if self.pop().is_truthy() {
                    self.jump(target);
                }
            }
            Opcode::And(target) => {
                if !self.peek(0).is_truthy() {
                    self.jump(target);
                }
            }
            Opcode::Or(target) => {
                if self.peek(0).is_truthy() {
                    self.jump(target);
                }
            }
            Opcode::Coalesce(target) => {
                if !self.peek(0).is_nullish() {
                    self.jump(target);
                }
            }
            Opcode::LoopHead => {
                self.check_interrupt()?;
                if let Some(point) = self.try_tier_up(TierEntry::LoopHead(pc)) {
                    return self.resume_from_tier(point);
                }
            }
            Opcode::Nop | Opcode::Try | Opcode::TryDestructuring | Opcode::AfterYield => {}
            Opcode::Return => {
                let value = self.pop();
                return Ok(Flow::Return(value));
            }
            Opcode::RetRval => return Ok(Flow::Return(self.current_frame().rval.clone())),
            Opcode::SetRval => {
                let value = self.pop();
                self.current_frame_mut().rval = value;
            }
            Opcode::GetRval => {
                let value = self.current_frame().rval.clone();
                self.stack.push(value);
            }

            // Arguments and frame slots
            Opcode::GetArg(n) => {
                let value = match self.current_frame().args.get(n as usize) {
                    Some(value) => value.clone(),
                    None => crate::fatal!("argument slot {} out of range", n),
                };
                self.stack.push(value);
            }
            Opcode::SetArg(n) => {
                let value = self.peek(0).clone();
                match self.current_frame_mut().args.get_mut(n as usize) {
                    Some(slot) => *slot = value,
                    None => crate::fatal!("argument slot {} out of range", n),
                }
            }
            Opcode::GetLocal(slot) => {
                let value = self.stack[self.local_index(slot)].clone();
                self.stack.push(value);
            }
            Opcode::SetLocal(slot) | Opcode::InitLexical(slot) => {
                let index = self.local_index(slot);
                let value = self.peek(0).clone();
                self.stack[index] = value;
            }
            Opcode::CheckLexical(slot) => {
                let value = self.stack[self.local_index(slot)].clone();
                self.check_lexical(&value, |vm| vm.local_name(slot))?;
            }
            Opcode::ThrowSetConst(slot) => {
                let name = self.local_name(slot);
                return Err(self.type_error(const_assignment_message(&name)));
            }

            // Environment coordinates
            Opcode::GetAliasedVar(ec) => {
                let env = self.env_at_hops(self.current_frame().env, ec.hops);
                let value = self.env_slot(env, ec.slot);
                self.stack.push(value);
            }
            Opcode::SetAliasedVar(ec) | Opcode::InitAliasedLexical(ec) => {
                let env = self.env_at_hops(self.current_frame().env, ec.hops);
                let value = self.peek(0).clone();
                self.set_env_slot(env, ec.slot, value);
            }
            Opcode::CheckAliasedLexical(ec) => {
                let env = self.env_at_hops(self.current_frame().env, ec.hops);
                let value = self.env_slot(env, ec.slot);
                self.check_lexical(&value, |vm| vm.env_slot_name(env, ec.slot))?;
            }
            Opcode::ThrowSetAliasedConst(ec) => {
                let env = self.env_at_hops(self.current_frame().env, ec.hops);
                let name = self.env_slot_name(env, ec.slot);
                return Err(self.type_error(const_assignment_message(&name)));
            }

            // Dynamic and global names
            Opcode::GetName(atom) => {
                let value = self.get_name(atom)?;
                self.stack.push(value);
            }
            Opcode::GetBoundName(atom) => {
                let [target] = self.operands::<1>();
                let value = self.get_bound_name(&target, atom)?;
                self.replace_top(1, value);
            }
            Opcode::BindName(atom) => {
                let target = self.bind_name(atom)?;
                self.stack.push(target);
            }
            Opcode::SetName(atom) | Opcode::SetGName(atom) => {
                let [target, value] = self.operands::<2>();
                let strict = self.is_strict();
                self.set_bound_name(&target, atom, value.clone(), strict)?;
                self.replace_top(2, value);
            }
            Opcode::StrictSetName(atom) | Opcode::StrictSetGName(atom) => {
                let [target, value] = self.operands::<2>();
                self.set_bound_name(&target, atom, value.clone(), true)?;
                self.replace_top(2, value);
            }
            Opcode::DelName(atom) => {
                let deleted = self.delete_name(atom)?;
                self.stack.push(Value::Boolean(deleted));
            }
            Opcode::GetGName(atom) => {
                let value = self.get_global_name(atom)?;
                self.stack.push(value);
            }
            Opcode::BindGName(atom) => {
                let target = self.bind_global_name(atom)?;
                self.stack.push(target);
            }
            Opcode::InitGLexical(atom) => {
                let value = self.peek(0).clone();
                self.init_global_lexical(atom, value);
            }
            Opcode::DefVar(atom) => self.define_global_var(atom)?,
            Opcode::DefLet(atom) => self.define_global_lexical(atom, false)?,
            Opcode::DefConst(atom) => self.define_global_lexical(atom, true)?,
            Opcode::DefFun => {
                let [function] = self.operands::<1>();
                self.define_global_function(function)?;
                self.pop();
            }
            Opcode::GetIntrinsic(atom) => {
                let value = self.get_intrinsic(atom);
                self.stack.push(value);
            }
            Opcode::SetIntrinsic(atom) => {
                let value = self.peek(0).clone();
                self.set_intrinsic(atom, value);
            }
            Opcode::GetImport(atom) => {
                let value = self.get_import(atom)?;
                self.stack.push(value);
            }
            Opcode::Callee => {
                let callee = match self.current_frame().callee {
                    Some(callee) => callee,
                    None => crate::fatal!("Callee outside a function"),
                };
                self.stack.push(Value::Object(callee));
            }
            Opcode::ThrowSetCallee => {
                let name = self
                    .current_frame()
                    .callee
                    .and_then(|callee| self.object(callee).function().map(|f| f.name.clone()))
                    .unwrap_or_else(|| Rc::from("?"));
                return Err(self.type_error(const_assignment_message(&name)));
            }
            Opcode::ImplicitThis(atom) => {
                let this = self.implicit_this(atom)?;
                self.stack.push(this);
            }
            Opcode::GImplicitThis(atom) => {
                let this = self.global_implicit_this(atom)?;
                self.stack.push(this);
            }

            // Environments
            Opcode::PushLexicalEnv(scope) => self.push_scope_environment(scope, EnvironmentKind::Lexical),
            Opcode::PushVarEnv(scope) => self.push_scope_environment(scope, EnvironmentKind::Var),
            Opcode::PopLexicalEnv | Opcode::LeaveWith => self.pop_scope_environment(),
            Opcode::FreshenLexicalEnv => {
                let env = self.current_frame().env;
                let fresh = self.clone_environment(env);
                self.current_frame_mut().env = fresh;
            }
            Opcode::RecreateLexicalEnv => {
                let env = self.current_frame().env;
                let fresh = self.recreate_environment(env);
                self.current_frame_mut().env = fresh;
            }
            Opcode::EnterWith(scope) => {
                let [object] = self.operands::<1>();
                self.enter_with(scope, &object)?;
                self.pop();
            }

            // Objects and properties
            Opcode::NewObject => {
                let proto = self.realm.protos.object;
                let object = self.new_object_with_proto(Some(proto));
                self.stack.push(Value::Object(object));
            }
            Opcode::NewArray(capacity) => {
                let array = self.create_array(Vec::with_capacity(capacity as usize));
                self.stack.push(Value::Object(array));
            }
            Opcode::ObjWithProto => {
                let [proto] = self.operands::<1>();
                let proto = match proto {
                    Value::Object(id) => Some(id),
                    Value::Null => None,
                    other => {
                        let described = self.describe_value(&other);
                        return Err(self.type_error(format!(
                            "Object prototype may only be an Object or null: {}",
                            described
                        )));
                    }
                };
                let object = self.new_object_with_proto(proto);
                self.replace_top(1, Value::Object(object));
            }
            Opcode::InitProp(atom) | Opcode::InitHiddenProp(atom) => {
                let value = self.pop();
                let object = self.object_operand(self.peek(0), "InitProp");
                let property = if matches!(opcode, Opcode::InitProp(_)) {
                    Property::data(value)
                } else {
                    Property::hidden(value)
                };
                let key = self.atom_key(atom);
                self.init_property(object, key, property);
            }
            Opcode::InitElem => {
                let [_, key, _] = self.operands::<3>();
                let key = self.to_property_key(&key)?;
                let value = self.pop();
                self.pop();
                let object = self.object_operand(self.peek(0), "InitElem");
                self.init_property(object, key, Property::data(value));
            }
            Opcode::InitElemArray(index) => {
                let value = self.pop();
                let array = self.object_operand(self.peek(0), "InitElemArray");
                self.init_property(array, PropertyKey::from(index), Property::data(value));
            }
            Opcode::InitHomeObject => {
                let home = self.pop();
                let home = self.object_operand(&home, "InitHomeObject");
                let function = self.object_operand(self.peek(0), "InitHomeObject");
                self.set_home_object(function, home);
            }
            Opcode::GetProp(atom) => {
                let [base] = self.operands::<1>();
                let key = self.atom_key(atom);
                let value = self.get_value_property(&base, &key)?;
                self.replace_top(1, value);
            }
            Opcode::SetProp(atom) | Opcode::StrictSetProp(atom) => {
                let [base, value] = self.operands::<2>();
                let key = self.atom_key(atom);
                let strict = matches!(opcode, Opcode::StrictSetProp(_)) || self.is_strict();
                self.set_value_property(&base, &key, value.clone(), strict)?;
                self.replace_top(2, value);
            }
            Opcode::GetElem => {
                let [base, key] = self.operands::<2>();
                let key = self.to_property_key(&key)?;
                let value = self.get_value_property(&base, &key)?;
                self.replace_top(2, value);
            }
            Opcode::SetElem | Opcode::StrictSetElem => {
                let [base, key, value] = self.operands::<3>();
                let key = self.to_property_key(&key)?;
                let strict = opcode == Opcode::StrictSetElem || self.is_strict();
                self.set_value_property(&base, &key, value.clone(), strict)?;
                self.replace_top(3, value);
            }
            Opcode::DelProp(atom) | Opcode::StrictDelProp(atom) => {
                let [base] = self.operands::<1>();
                let key = self.atom_key(atom);
                let strict = matches!(opcode, Opcode::StrictDelProp(_)) || self.is_strict();
                let deleted = self.delete_value_property(&base, &key, strict)?;
                self.replace_top(1, Value::Boolean(deleted));
            }
            Opcode::DelElem | Opcode::StrictDelElem => {
                let [base, key] = self.operands::<2>();
                let key = self.to_property_key(&key)?;
                let strict = opcode == Opcode::StrictDelElem || self.is_strict();
                let deleted = self.delete_value_property(&base, &key, strict)?;
                self.replace_top(2, Value::Boolean(deleted));
            }
            Opcode::SuperBase => {
                let home = self.pop();
                let home = self.object_operand(&home, "SuperBase");
                let base = self.get_prototype_of(home).map_or(Value::Null, Value::Object);
                self.stack.push(base);
            }
            Opcode::GetPropSuper(atom) => {
                let [receiver, base] = self.operands::<2>();
                let key = self.atom_key(atom);
                let object = self.super_base_object(&base, &key)?;
                let value = self.get_property(object, &key, &receiver)?;
                self.replace_top(2, value);
            }
            Opcode::SetPropSuper(atom) | Opcode::StrictSetPropSuper(atom) => {
                let [receiver, base, value] = self.operands::<3>();
                let key = self.atom_key(atom);
                let strict = matches!(opcode, Opcode::StrictSetPropSuper(_)) || self.is_strict();
                let object = self.super_base_object(&base, &key)?;
                if !self.set_property(object, &key, value.clone(), &receiver)? {
                    self.report_strict_violation(
                        strict,
                        format!("can't assign to property \"{}\" on {}: not writable", key, receiver),
                    )?;
                }
                self.replace_top(3, value);
            }
            Opcode::HomeObject => {
                let Some(home) = self.home_object() else {
                    crate::fatal!("HomeObject in a function without a home object");
                };
                self.stack.push(Value::Object(home));
            }

            // Functions, this and classes
            Opcode::Lambda(index) | Opcode::LambdaArrow(index) => {
                let frame = self.current_frame();
                let Some(script) = frame.script.functions.get(index as usize).cloned() else {
                    crate::fatal!("function {} out of range in {}", index, frame.script.name);
                };
                let env = frame.env;
                let function = if matches!(opcode, Opcode::LambdaArrow(_)) {
                    let this = frame.this.clone();
                    let new_target = self.peek(0).clone();
                    let function = self.create_function(script, env, Some(this), Some(new_target));
                    self.pop();
                    function
                } else {
                    self.create_function(script, env, None, None)
                };
                self.stack.push(Value::Object(function));
            }
            Opcode::FunctionThis => {
                let this = self.current_frame().this.clone();
                self.stack.push(this);
            }
            Opcode::GlobalThis => self.stack.push(Value::Object(self.realm.global)),
            Opcode::NewTarget => {
                let new_target = self.current_frame().new_target.clone();
                self.stack.push(new_target);
            }
            Opcode::Arguments => {
                let arguments = match self.current_frame().args_obj {
                    Some(arguments) => arguments,
                    None => {
                        let arguments = self.create_arguments_object();
                        self.current_frame_mut().args_obj = Some(arguments);
                        arguments
                    }
                };
                self.stack.push(Value::Object(arguments));
            }
            Opcode::Rest => {
                let frame = self.current_frame();
                let start = frame.script.arg_count as usize;
                let rest = frame.args.get(start..frame.argc).map(<[Value]>::to_vec).unwrap_or_default();
                let array = self.create_array(rest);
                self.stack.push(Value::Object(array));
            }
            Opcode::CheckThis => {
                if self.peek(0).is_magic(Magic::UninitializedLexical) {
                    return Err(self.reference_error(
                        "must call super constructor before using 'this' in derived class constructor",
                    ));
                }
            }
            Opcode::CheckThisReinit => {
                if !self.peek(0).is_magic(Magic::UninitializedLexical) {
                    return Err(self.reference_error("super() called twice in derived class constructor"));
                }
            }
            Opcode::CheckReturn => {
                let this = self.pop();
                self.check_return(this)?;
            }
            Opcode::SuperFun => {
                let callee = self.pop();
                let callee = self.object_operand(&callee, "SuperFun");
                let parent = self.get_prototype_of(callee).map_or(Value::Null, Value::Object);
                self.stack.push(parent);
            }
            Opcode::ClassConstructor { name, span } | Opcode::DerivedConstructor { name, span } => {
                let name = self.current_atom(name);
                let span = match self.current_frame().script.spans.get(span as usize) {
                    Some(span) => *span,
                    None => crate::fatal!("class span {} out of range", span),
                };
                if matches!(opcode, Opcode::DerivedConstructor { .. }) {
                    let [heritage] = self.operands::<1>();
                    let ctor = self.create_class_constructor(name, span, Some(heritage))?;
                    self.replace_top(1, Value::Object(ctor));
                } else {
                    let ctor = self.create_class_constructor(name, span, None)?;
                    self.stack.push(Value::Object(ctor));
                }
            }

            // Calls
            Opcode::Call(argc) | Opcode::CallIgnoresRv(argc) => {
                self.check_interrupt()?;
                let args = self.stack.split_off(self.height_below(argc as usize));
                let this = self.pop();
                let callee = self.pop();
                return self.invoke(callee, this, args);
            }
            Opcode::New(argc) | Opcode::SuperCall(argc) => {
                self.check_interrupt()?;
                let new_target = self.pop();
                let args = self.stack.split_off(self.height_below(argc as usize));
                let callee = self.pop();
                let super_call = matches!(opcode, Opcode::SuperCall(_));
                return self.invoke_construct(callee, args, new_target, super_call);
            }
            Opcode::SpreadCall => {
                self.check_interrupt()?;
                let [_, _, array] = self.operands::<3>();
                let args = self.spread_arguments(&array)?;
                self.pop();
                let this = self.pop();
                let callee = self.pop();
                return self.invoke(callee, this, args);
            }
            Opcode::SpreadNew | Opcode::SpreadSuperCall => {
                self.check_interrupt()?;
                let [_, array, _] = self.operands::<3>();
                let args = self.spread_arguments(&array)?;
                let new_target = self.pop();
                self.pop();
                let callee = self.pop();
                let super_call = opcode == Opcode::SpreadSuperCall;
                return self.invoke_construct(callee, args, new_target, super_call);
            }

            // Exceptions
            Opcode::Exception => {
                let Some(exception) = self.pending_exception.take() else {
                    crate::fatal!("Exception without a pending exception");
                };
                self.stack.push(exception);
            }
            Opcode::Throw => {
                self.check_interrupt()?;
                let value = self.pop();
                self.last_throw_stack = self.capture_stack();
                return Err(Abrupt::Throw(value));
            }
            Opcode::ThrowMsg(kind) => return Err(self.type_error(kind.message())),
            Opcode::ResumeIndex(index) => self.stack.push(Value::Int32(index as i32)),
            Opcode::Gosub(target) => self.jump(target),
            Opcode::Retsub => self.retsub()?,
            Opcode::Finally => self.check_interrupt()?,

            // Iteration
            Opcode::Iter => {
                let [object] = self.operands::<1>();
                let iterator = self.for_in_iterator(&object)?;
                self.replace_top(1, Value::Object(iterator));
            }
            Opcode::MoreIter => {
                let iterator = self.peek(0).clone();
                let key = self.for_in_next(&iterator)?;
                self.stack.push(key);
            }
            Opcode::IsNoIter => {
                let done = self.peek(0).is_magic(Magic::NoIterValue);
                self.stack.push(Value::Boolean(done));
            }
            Opcode::EndIter => {
                self.pop();
                let iterator = self.pop();
                self.close_for_in(&iterator);
            }
            Opcode::GetIterator => {
                let [iterable] = self.operands::<1>();
                let (iterator, next) = self.get_iterator(&iterable)?;
                self.replace_top(1, iterator);
                self.stack.push(next);
            }
            Opcode::IteratorNext => {
                let [iterator, next] = self.operands::<2>();
                let result = self.iterator_next(&iterator, &next)?;
                self.stack.push(result);
            }
            Opcode::CloseIter => {
                let [iterator] = self.operands::<1>();
                self.close_iterator(&iterator)?;
                self.pop();
            }

            // Generators and async functions
            Opcode::Generator => {
                let generator = self.create_generator();
                self.stack.push(Value::Object(generator));
            }
            Opcode::InitialYield => return self.suspend_generator(SuspendKind::Yield, true),
            Opcode::Yield => return self.suspend_generator(SuspendKind::Yield, false),
            Opcode::Await => return self.suspend_generator(SuspendKind::Await, false),
            Opcode::ResumeKind(kind) => self.stack.push(Value::Int32(kind.to_i32())),
            Opcode::CheckResumeKind => self.check_resume_kind()?,
            Opcode::Resume => {
                let kind = match self.pop() {
                    Value::Int32(n) => GeneratorResumeKind::from_i32(n),
                    _ => None,
                };
                let Some(kind) = kind else {
                    crate::fatal!("Resume with a malformed resume kind");
                };
                let value = self.pop();
                let [generator] = self.operands::<1>();
                let result = self.generator_method(&generator, kind, value)?;
                self.replace_top(1, result);
            }
            Opcode::FinalYieldRval => {
                self.pop();
                return Ok(Flow::Return(self.current_frame().rval.clone()));
            }
            Opcode::IsGenClosing => {
                let closing = self.peek(0).is_magic(Magic::GeneratorClosing);
                self.stack.push(Value::Boolean(closing));
            }

            Opcode::Debugger => {
                if self.hooks.is_some() && self.current_frame().flags.debuggee {
                    let mode = self.with_hooks(|hooks, view| hooks.on_breakpoint(view));
                    if let HookOutcome::Abrupt(abrupt) = self.apply_resume_mode(mode) {
                        return Err(abrupt);
                    }
                }
            }
        }
        Ok(Flow::Next)
    }

    fn binary_numeric(&mut self, op: NumericOp) -> JsResult<()> {
        let [a, b] = self.operands::<2>();
        let result = self.numeric_binary(op, &a, &b)?;
        self.replace_top(2, result);
        Ok(())
    }
}
