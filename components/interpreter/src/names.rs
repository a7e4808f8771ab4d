//! Name resolution
//!
//! Statically resolved bindings (argument and frame slots, environment
//! coordinates) are read directly by the dispatch loop. This module handles
//! the rest: dynamic lookups through the environment chain, the global
//! lexical scope and global object, intrinsics, imports and the scope
//! push/pop opcodes.

use std::rc::Rc;

use bytecode_system::{BindingKind, Script};
use core_types::{JsResult, Magic, ObjectId, Value};

use crate::environment::{EnvironmentKind, EnvironmentRecord, GlobalLexicalBinding};
use crate::object::{ObjectClass, Property, PropertyKey};
use crate::vm::VM;

/// Where a dynamically looked-up name lives.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NameRef {
    /// Slot of a declarative environment
    Slot {
        env: ObjectId,
        slot: u32,
        kind: BindingKind,
    },
    /// Binding of the global lexical scope
    GlobalLexical { env: ObjectId },
    /// Property of a binding object; `with_env` is set for `with` scopes
    Object {
        object: ObjectId,
        with_env: bool,
    },
    /// Module import
    Import { module: ObjectId, name: Rc<str> },
    /// Not found anywhere
    Unresolvable,
}

pub(crate) fn uninitialized_message(name: &str) -> String {
    format!("can't access lexical declaration '{}' before initialization", name)
}

pub(crate) fn const_assignment_message(name: &str) -> String {
    format!("invalid assignment to const '{}'", name)
}

impl VM {
    fn atom(&self, script: &Script, index: u32) -> Rc<str> {
        match script.atom(index) {
            Some(atom) => atom.clone(),
            None => crate::fatal!("atom {} out of range in {}", index, script.name),
        }
    }

    /// Name `index` of the running script's atom pool.
    pub(crate) fn current_atom(&self, index: u32) -> Rc<str> {
        let script = self.current_frame().script.clone();
        self.atom(&script, index)
    }

    /// Whether `name` is blocked in a `with` scope by `@@unscopables`.
    fn is_unscopable(&mut self, object: ObjectId, name: &str) -> JsResult<bool> {
        let key = PropertyKey::Symbol(self.realm.symbols.unscopables.clone());
        let unscopables = self.get(object, key)?;
        match unscopables {
            Value::Object(list) => {
                let _guard = self.root_object(list);
                Ok(self.get(list, name)?.is_truthy())
            }
            _ => Ok(false),
        }
    }

    /// Walk the environment chain from `env` looking for `name`.
    pub(crate) fn resolve_name(&mut self, mut env: ObjectId, name: &Rc<str>) -> JsResult<NameRef> {
        let key = PropertyKey::from_rc(name.clone());
        loop {
            env = self.unwrap_debug_proxy(env);
            let record = self.env(env);
            let parent = record.parent;
            match &record.kind {
                EnvironmentKind::With { object } => {
                    let object = *object;
                    if self.has_property(object, &key)? && !self.is_unscopable(object, name)? {
                        return Ok(NameRef::Object { object, with_env: true });
                    }
                }
                EnvironmentKind::NonSyntactic { object } => {
                    let object = *object;
                    if self.has_property(object, &key)? {
                        return Ok(NameRef::Object { object, with_env: false });
                    }
                }
                EnvironmentKind::GlobalLexical { bindings, global } => {
                    if bindings.contains_key(name) {
                        return Ok(NameRef::GlobalLexical { env });
                    }
                    let global = *global;
                    if self.has_property(global, &key)? {
                        return Ok(NameRef::Object {
                            object: global,
                            with_env: false,
                        });
                    }
                }
                EnvironmentKind::Module { imports } => {
                    if let Some(import) = imports.get(name) {
                        return Ok(NameRef::Import {
                            module: import.module,
                            name: import.name.clone(),
                        });
                    }
                    if let Some((slot, kind)) = record.lookup_slot(name) {
                        return Ok(NameRef::Slot { env, slot, kind });
                    }
                }
                _ => {
                    if let Some((slot, kind)) = record.lookup_slot(name) {
                        return Ok(NameRef::Slot { env, slot, kind });
                    }
                }
            }
            match parent {
                Some(parent) => env = parent,
                None => return Ok(NameRef::Unresolvable),
            }
        }
    }

    fn global_lexical_binding(&self, env: ObjectId, name: &str) -> Option<&GlobalLexicalBinding> {
        match &self.env(env).kind {
            EnvironmentKind::GlobalLexical { bindings, .. } => bindings.get(name),
            _ => None,
        }
    }

    fn check_initialized(&mut self, value: Value, name: &str) -> JsResult<Value> {
        if value.is_magic(Magic::UninitializedLexical) {
            return Err(self.reference_error(uninitialized_message(name)));
        }
        Ok(value)
    }

    /// Read a resolved name.
    pub(crate) fn get_name_ref(&mut self, reference: &NameRef, name: &Rc<str>) -> JsResult<Value> {
        match reference {
            NameRef::Slot { env, slot, .. } => {
                let value = self.env_slot(*env, *slot);
                self.check_initialized(value, name)
            }
            NameRef::GlobalLexical { env } => {
                let value = self
                    .global_lexical_binding(*env, name)
                    .map_or(Value::Undefined, |binding| binding.value.clone());
                self.check_initialized(value, name)
            }
            NameRef::Object { object, .. } => self.get(*object, PropertyKey::from_rc(name.clone())),
            NameRef::Import { module, name } => self.read_import(*module, name),
            NameRef::Unresolvable => Err(self.reference_error(format!("{} is not defined", name))),
        }
    }

    fn read_import(&mut self, module: ObjectId, name: &Rc<str>) -> JsResult<Value> {
        let Some((slot, _)) = self.env(module).lookup_slot(name) else {
            crate::fatal!("module environment {} does not export {}", module, name);
        };
        let value = self.env_slot(module, slot);
        self.check_initialized(value, name)
    }

    /// Assign to a resolved name.
    pub(crate) fn set_name_ref(&mut self, reference: &NameRef, name: &Rc<str>, value: Value, strict: bool) -> JsResult<()> {
        match reference {
            NameRef::Slot { env, slot, kind } => {
                if self.env_slot(*env, *slot).is_magic(Magic::UninitializedLexical) {
                    return Err(self.reference_error(uninitialized_message(name)));
                }
                match kind {
                    BindingKind::Const => Err(self.type_error(const_assignment_message(name))),
                    BindingKind::Callee if strict => Err(self.type_error(const_assignment_message(name))),
                    BindingKind::Callee => Ok(()),
                    _ => {
                        self.set_env_slot(*env, *slot, value);
                        Ok(())
                    }
                }
            }
            NameRef::GlobalLexical { env } => {
                let (current, constant) = match self.global_lexical_binding(*env, name) {
                    Some(binding) => (binding.value.clone(), binding.constant),
                    None => crate::fatal!("global lexical binding {} vanished", name),
                };
                if current.is_magic(Magic::UninitializedLexical) {
                    return Err(self.reference_error(uninitialized_message(name)));
                }
                if constant {
                    return Err(self.type_error(const_assignment_message(name)));
                }
                if let EnvironmentKind::GlobalLexical { bindings, .. } = &mut self.env_mut(*env).kind {
                    if let Some(binding) = bindings.get_mut(name) {
                        binding.value = value;
                    }
                }
                Ok(())
            }
            NameRef::Object { object, .. } => {
                let key = PropertyKey::from_rc(name.clone());
                self.set_value_property(&Value::Object(*object), &key, value, strict)
            }
            NameRef::Import { .. } => Err(self.type_error(const_assignment_message(name))),
            NameRef::Unresolvable => {
                if strict {
                    return Err(self.reference_error(format!("assignment to undeclared variable {}", name)));
                }
                let global = self.realm.global;
                let key = PropertyKey::from_rc(name.clone());
                self.set_value_property(&Value::Object(global), &key, value, false)
            }
        }
    }

    /// `GetName`
    pub(crate) fn get_name(&mut self, atom: u32) -> JsResult<Value> {
        let name = self.current_atom(atom);
        let env = self.current_frame().env;
        let reference = self.resolve_name(env, &name)?;
        self.get_name_ref(&reference, &name)
    }

    /// `BindName`: the environment or object an assignment to the name
    /// will target. Unresolvable names bind to the global object.
    pub(crate) fn bind_name(&mut self, atom: u32) -> JsResult<Value> {
        let name = self.current_atom(atom);
        let env = self.current_frame().env;
        let target = match self.resolve_name(env, &name)? {
            NameRef::Slot { env, .. } | NameRef::GlobalLexical { env } => env,
            NameRef::Object { object, .. } => object,
            NameRef::Import { module, .. } => module,
            NameRef::Unresolvable => self.realm.global,
        };
        Ok(Value::Object(target))
    }

    /// Re-resolve `name` against the target found by `BindName`.
    fn bound_reference(&mut self, target: &Value, name: &Rc<str>) -> JsResult<NameRef> {
        let Value::Object(target) = target else {
            crate::fatal!("bound name {} without a target object", name);
        };
        let target = *target;
        let reference = match &self.object(target).class {
            ObjectClass::Environment(record) => match &record.kind {
                EnvironmentKind::GlobalLexical { .. } => NameRef::GlobalLexical { env: target },
                EnvironmentKind::Module { imports } if imports.contains_key(name) => {
                    let import = &imports[name];
                    NameRef::Import {
                        module: import.module,
                        name: import.name.clone(),
                    }
                }
                _ => match record.lookup_slot(name) {
                    Some((slot, kind)) => NameRef::Slot { env: target, slot, kind },
                    None => crate::fatal!("bound environment does not declare {}", name),
                },
            },
            _ if target == self.realm.global => {
                if self.has_property(target, &PropertyKey::from_rc(name.clone()))? {
                    NameRef::Object {
                        object: target,
                        with_env: false,
                    }
                } else {
                    NameRef::Unresolvable
                }
            }
            _ => NameRef::Object {
                object: target,
                with_env: false,
            },
        };
        Ok(reference)
    }

    /// `GetBoundName`
    pub(crate) fn get_bound_name(&mut self, target: &Value, atom: u32) -> JsResult<Value> {
        let name = self.current_atom(atom);
        let reference = self.bound_reference(target, &name)?;
        self.get_name_ref(&reference, &name)
    }

    /// `SetName`, `StrictSetName`, `SetGName` and `StrictSetGName`
    pub(crate) fn set_bound_name(&mut self, target: &Value, atom: u32, value: Value, strict: bool) -> JsResult<()> {
        let name = self.current_atom(atom);
        let reference = self.bound_reference(target, &name)?;
        self.set_name_ref(&reference, &name, value, strict)
    }

    /// `DelName`: declarative bindings cannot be deleted, unresolvable
    /// names delete trivially.
    pub(crate) fn delete_name(&mut self, atom: u32) -> JsResult<bool> {
        let name = self.current_atom(atom);
        let env = self.current_frame().env;
        match self.resolve_name(env, &name)? {
            NameRef::Object { object, .. } => self.delete_property(object, &PropertyKey::from_rc(name)),
            NameRef::Unresolvable => Ok(true),
            _ => Ok(false),
        }
    }

    /// `ImplicitThis`: only a `with` object supplies `this` for an
    /// unqualified call.
    pub(crate) fn implicit_this(&mut self, atom: u32) -> JsResult<Value> {
        let name = self.current_atom(atom);
        let env = self.current_frame().env;
        match self.resolve_name(env, &name)? {
            NameRef::Object {
                object,
                with_env: true,
            } => Ok(Value::Object(object)),
            _ => Ok(Value::Undefined),
        }
    }

    fn uses_dynamic_globals(&self) -> bool {
        self.current_frame().script.flags.has_non_syntactic_scope
    }

    /// `GetGName`
    pub(crate) fn get_global_name(&mut self, atom: u32) -> JsResult<Value> {
        if self.uses_dynamic_globals() {
            return self.get_name(atom);
        }
        let name = self.current_atom(atom);
        let env = self.realm.global_lexical;
        if self.global_lexical_binding(env, &name).is_some() {
            return self.get_name_ref(&NameRef::GlobalLexical { env }, &name);
        }
        let global = self.realm.global;
        let key = PropertyKey::from_rc(name.clone());
        if self.has_property(global, &key)? {
            return self.get(global, key);
        }
        Err(self.reference_error(format!("{} is not defined", name)))
    }

    /// `BindGName`
    pub(crate) fn bind_global_name(&mut self, atom: u32) -> JsResult<Value> {
        if self.uses_dynamic_globals() {
            return self.bind_name(atom);
        }
        let name = self.current_atom(atom);
        let env = self.realm.global_lexical;
        if self.global_lexical_binding(env, &name).is_some() {
            return Ok(Value::Object(env));
        }
        Ok(Value::Object(self.realm.global))
    }

    /// `GImplicitThis`
    pub(crate) fn global_implicit_this(&mut self, atom: u32) -> JsResult<Value> {
        if self.uses_dynamic_globals() {
            return self.implicit_this(atom);
        }
        Ok(Value::Undefined)
    }

    fn global_lexical_bindings_mut(&mut self) -> &mut indexmap::IndexMap<Rc<str>, GlobalLexicalBinding> {
        let env = self.realm.global_lexical;
        match &mut self.env_mut(env).kind {
            EnvironmentKind::GlobalLexical { bindings, .. } => bindings,
            _ => crate::fatal!("realm global lexical environment has the wrong kind"),
        }
    }

    /// `InitGLexical`
    pub(crate) fn init_global_lexical(&mut self, atom: u32, value: Value) {
        let name = self.current_atom(atom);
        match self.global_lexical_bindings_mut().get_mut(&name) {
            Some(binding) => binding.value = value,
            None => crate::fatal!("InitGLexical of undeclared {}", name),
        }
    }

    fn redeclaration(&mut self, kind: &str, name: &str) -> core_types::Abrupt {
        self.syntax_error(format!("redeclaration of {} {}", kind, name))
    }

    fn lexical_kind_name(binding: &GlobalLexicalBinding) -> &'static str {
        if binding.constant {
            "const"
        } else {
            "let"
        }
    }

    /// `DefVar`
    pub(crate) fn define_global_var(&mut self, atom: u32) -> JsResult<()> {
        let name = self.current_atom(atom);
        if let Some(binding) = self.global_lexical_binding(self.realm.global_lexical, &name) {
            let kind = Self::lexical_kind_name(binding);
            return Err(self.redeclaration(kind, &name));
        }
        let global = self.realm.global;
        let key = PropertyKey::from_rc(name);
        if self.get_own_property(global, &key)?.is_none() {
            self.define_own_property(global, &key, Property::with_attributes(Value::Undefined, true, true, false))?;
        }
        Ok(())
    }

    /// `DefLet` and `DefConst`
    pub(crate) fn define_global_lexical(&mut self, atom: u32, constant: bool) -> JsResult<()> {
        let name = self.current_atom(atom);
        if let Some(binding) = self.global_lexical_binding(self.realm.global_lexical, &name) {
            let kind = Self::lexical_kind_name(binding);
            return Err(self.redeclaration(kind, &name));
        }
        let global = self.realm.global;
        if let Some(existing) = self.get_own_property(global, &PropertyKey::from_rc(name.clone()))? {
            if !existing.configurable {
                return Err(self.redeclaration("var", &name));
            }
        }
        self.global_lexical_bindings_mut().insert(
            name,
            GlobalLexicalBinding {
                value: Value::Magic(Magic::UninitializedLexical),
                constant,
            },
        );
        Ok(())
    }

    /// `DefFun`
    pub(crate) fn define_global_function(&mut self, function: Value) -> JsResult<()> {
        let name = match function.as_object().and_then(|id| self.object(id).function()) {
            Some(data) => data.name.clone(),
            None => crate::fatal!("DefFun without a function object"),
        };
        if let Some(binding) = self.global_lexical_binding(self.realm.global_lexical, &name) {
            let kind = Self::lexical_kind_name(binding);
            return Err(self.redeclaration(kind, &name));
        }
        let global = self.realm.global;
        let key = PropertyKey::from_rc(name.clone());
        let replaceable = match self.get_own_property(global, &key)? {
            None => true,
            Some(existing) => existing.configurable,
        };
        if replaceable {
            self.define_own_property(global, &key, Property::with_attributes(function, true, true, false))?;
            return Ok(());
        }
        if !self.set_property(global, &key, function, &Value::Object(global))? {
            return Err(self.type_error(format!("cannot redefine non-configurable property '{}'", name)));
        }
        Ok(())
    }

    /// `GetIntrinsic`
    pub(crate) fn get_intrinsic(&self, atom: u32) -> Value {
        let name = self.current_atom(atom);
        match self.realm.intrinsics.get(&name) {
            Some(value) => value.clone(),
            None => crate::fatal!("missing intrinsic {}", name),
        }
    }

    /// `SetIntrinsic`
    pub(crate) fn set_intrinsic(&mut self, atom: u32, value: Value) {
        let name = self.current_atom(atom);
        self.realm.intrinsics.insert(name, value);
    }

    /// `GetImport`
    pub(crate) fn get_import(&mut self, atom: u32) -> JsResult<Value> {
        let name = self.current_atom(atom);
        let env = self.current_frame().env;
        let Some(module) = self.module_environment(env) else {
            crate::fatal!("GetImport of {} outside a module", name);
        };
        let import = match &self.env(module).kind {
            EnvironmentKind::Module { imports } => imports.get(&name).cloned(),
            _ => None,
        };
        match import {
            Some(import) => self.read_import(import.module, &import.name),
            None => crate::fatal!("module does not import {}", name),
        }
    }

    /// `CheckLexical` and `CheckAliasedLexical`
    pub(crate) fn check_lexical(&mut self, value: &Value, name: impl FnOnce(&VM) -> Rc<str>) -> JsResult<()> {
        if value.is_magic(Magic::UninitializedLexical) {
            let name = name(self);
            return Err(self.reference_error(uninitialized_message(&name)));
        }
        Ok(())
    }

    /// Push an environment for `scopes[index]` of the running script.
    pub(crate) fn push_scope_environment(&mut self, index: u32, kind: EnvironmentKind) {
        let frame = self.current_frame();
        let Some(scope) = frame.script.scopes.get(index as usize).cloned() else {
            crate::fatal!("scope {} out of range in {}", index, frame.script.name);
        };
        let record = EnvironmentRecord::for_scope(kind, scope, Some(frame.env));
        let env = self.alloc_environment(record);
        let frame = self.current_frame_mut();
        frame.env = env;
        frame.env_scopes.push(index);
    }

    /// Pop the innermost environment pushed by the running frame.
    pub(crate) fn pop_scope_environment(&mut self) {
        let env = self.current_frame().env;
        let Some(parent) = self.env_parent(env) else {
            crate::fatal!("popping the outermost environment");
        };
        let frame = self.current_frame_mut();
        frame.env = parent;
        frame.env_scopes.pop();
    }

    /// `EnterWith`
    pub(crate) fn enter_with(&mut self, index: u32, value: &Value) -> JsResult<()> {
        let object = self.to_object(value)?;
        let _guard = self.root_object(object);
        self.push_scope_environment(index, EnvironmentKind::With { object });
        Ok(())
    }

    /// Pop environments until the innermost pushed scope encloses `target`.
    pub(crate) fn unwind_environments(&mut self, target: Option<u32>) {
        loop {
            let frame = self.current_frame();
            let Some(&top) = frame.env_scopes.last() else {
                return;
            };
            if target.is_some_and(|target| frame.script.scope_encloses(top, target)) {
                return;
            }
            log::debug!("unwinding environment of scope {} in {}", top, frame.script.name);
            self.pop_scope_environment();
        }
    }
}
