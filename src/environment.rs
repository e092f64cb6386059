//! Environment records
//!
//! Scopes form a chain of reference-counted records linked to their outer
//! scope. Closures keep the record that was active when they were created.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashSet};

use crate::error::{EngineError, JsError};
use crate::object::{Access, Assign, ObjectRef, Property};
use crate::value::{CheapClone, JsString, JsValue, PropertyKey};

pub type EnvRef = Rc<Environment>;

pub type Bindings = IndexMap<JsString, Binding, FxBuildHasher>;

/// A single name binding
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: JsValue,
    pub mutable: bool,
    /// False until the declaring construct ran (temporal dead zone)
    pub initialized: bool,
    pub deletable: bool,
    /// Immutable binding that throws on assignment even in sloppy code
    pub strict: bool,
}

impl Binding {
    fn mutable(deletable: bool) -> Self {
        Self {
            value: JsValue::Undefined,
            mutable: true,
            initialized: false,
            deletable,
            strict: false,
        }
    }

    fn immutable(strict: bool) -> Self {
        Self {
            value: JsValue::Undefined,
            mutable: false,
            initialized: false,
            deletable: false,
            strict,
        }
    }
}

/// `this` slot of a function record
#[derive(Debug, Clone)]
pub enum ThisState {
    /// Derived constructor before `super()` returned
    Uninitialized,
    Bound(JsValue),
}

pub struct Environment {
    pub record: EnvRecord,
    pub outer: Option<EnvRef>,
}

pub enum EnvRecord {
    Declarative(RefCell<Bindings>),
    /// Bindings are the properties of an object (`with`)
    Object(ObjectRef),
    Function(FunctionRecord),
    Global(GlobalRecord),
    Module(ModuleRecord),
}

pub struct FunctionRecord {
    pub bindings: RefCell<Bindings>,
    pub this: RefCell<ThisState>,
    pub function: ObjectRef,
    pub home_object: Option<ObjectRef>,
    pub new_target: Option<ObjectRef>,
}

/// Object part (the global object: `var`, functions, host globals) plus a
/// declarative part (`let`, `const`, `class`)
pub struct GlobalRecord {
    pub object: ObjectRef,
    pub declarative: RefCell<Bindings>,
    pub var_names: RefCell<FxHashSet<JsString>>,
}

pub struct ModuleRecord {
    pub bindings: RefCell<Bindings>,
    /// local name -> (exporting module environment, exported binding name)
    pub imports: RefCell<IndexMap<JsString, (EnvRef, JsString), FxBuildHasher>>,
}

fn uninitialized_error(name: &JsString) -> JsError {
    JsError::reference_error_with_message(format!("Cannot access '{}' before initialization", name))
}

fn const_assignment_error() -> JsError {
    JsError::type_error("Assignment to constant variable.")
}

fn missing_binding(name: &JsString) -> JsError {
    JsError::internal_error(format!("binding '{}' does not exist", name))
}

impl Environment {
    pub fn new_declarative(outer: Option<EnvRef>) -> EnvRef {
        Rc::new(Environment {
            record: EnvRecord::Declarative(RefCell::new(Bindings::default())),
            outer,
        })
    }

    pub fn new_object(object: ObjectRef, outer: Option<EnvRef>) -> EnvRef {
        Rc::new(Environment {
            record: EnvRecord::Object(object),
            outer,
        })
    }

    pub fn new_function(
        function: ObjectRef,
        this: ThisState,
        home_object: Option<ObjectRef>,
        new_target: Option<ObjectRef>,
        outer: Option<EnvRef>,
    ) -> EnvRef {
        Rc::new(Environment {
            record: EnvRecord::Function(FunctionRecord {
                bindings: RefCell::new(Bindings::default()),
                this: RefCell::new(this),
                function,
                home_object,
                new_target,
            }),
            outer,
        })
    }

    pub fn new_global(object: ObjectRef) -> EnvRef {
        Rc::new(Environment {
            record: EnvRecord::Global(GlobalRecord {
                object,
                declarative: RefCell::new(Bindings::default()),
                var_names: RefCell::new(FxHashSet::default()),
            }),
            outer: None,
        })
    }

    pub fn new_module(outer: Option<EnvRef>) -> EnvRef {
        Rc::new(Environment {
            record: EnvRecord::Module(ModuleRecord {
                bindings: RefCell::new(Bindings::default()),
                imports: RefCell::new(IndexMap::default()),
            }),
            outer,
        })
    }

    /// Declarative binding table, if this record has one
    fn bindings(&self) -> Option<&RefCell<Bindings>> {
        match &self.record {
            EnvRecord::Declarative(b) => Some(b),
            EnvRecord::Function(f) => Some(&f.bindings),
            EnvRecord::Module(m) => Some(&m.bindings),
            EnvRecord::Global(g) => Some(&g.declarative),
            EnvRecord::Object(_) => None,
        }
    }

    pub fn has_binding(&self, name: &JsString) -> bool {
        match &self.record {
            EnvRecord::Object(object) => object.has_property(&PropertyKey::from(name.cheap_clone())),
            EnvRecord::Global(g) => {
                g.declarative.borrow().contains_key(name)
                    || g.object.has_property(&PropertyKey::from(name.cheap_clone()))
            }
            EnvRecord::Module(m) => {
                m.bindings.borrow().contains_key(name) || m.imports.borrow().contains_key(name)
            }
            EnvRecord::Declarative(b) => b.borrow().contains_key(name),
            EnvRecord::Function(f) => f.bindings.borrow().contains_key(name),
        }
    }

    /// Whether a lexical (declarative) binding with this name exists in this record
    pub fn has_lexical_declaration(&self, name: &JsString) -> bool {
        self.bindings().is_some_and(|b| b.borrow().contains_key(name))
    }

    pub fn create_mutable_binding(&self, name: JsString, deletable: bool) {
        match &self.record {
            EnvRecord::Object(object) => {
                let key = PropertyKey::from(name);
                if !object.borrow().has_own_property(&key) {
                    object.define_value(key, JsValue::Undefined);
                }
            }
            _ => {
                if let Some(b) = self.bindings() {
                    b.borrow_mut().insert(name, Binding::mutable(deletable));
                }
            }
        }
    }

    pub fn create_immutable_binding(&self, name: JsString, strict: bool) {
        if let Some(b) = self.bindings() {
            b.borrow_mut().insert(name, Binding::immutable(strict));
        }
    }

    /// Initialize a binding created uninitialized. Initializing twice, or a
    /// name that was never created, is an engine defect.
    pub fn initialize_binding(&self, name: &JsString, value: JsValue) -> Result<(), JsError> {
        if let EnvRecord::Object(object) = &self.record {
            object.define_value(PropertyKey::from(name.cheap_clone()), value);
            return Ok(());
        }
        let Some(bindings) = self.bindings() else {
            return Err(missing_binding(name));
        };
        let mut bindings = bindings.borrow_mut();
        let binding = bindings.get_mut(name).ok_or_else(|| missing_binding(name))?;
        if binding.initialized {
            return Err(JsError::Engine(EngineError::InvariantViolation(format!(
                "binding '{}' initialized twice",
                name
            ))));
        }
        binding.value = value;
        binding.initialized = true;
        Ok(())
    }

    /// Initialize or overwrite (`var` re-declaration in the same scope)
    pub fn initialize_or_set(&self, name: &JsString, value: JsValue) {
        if let Some(bindings) = self.bindings()
            && let Some(binding) = bindings.borrow_mut().get_mut(name)
        {
            binding.value = value;
            binding.initialized = true;
            return;
        }
        if let EnvRecord::Object(object) | EnvRecord::Global(GlobalRecord { object, .. }) = &self.record {
            object.define_value(PropertyKey::from(name.cheap_clone()), value);
        }
    }

    pub fn set_mutable_binding(&self, name: &JsString, value: JsValue, strict: bool) -> Result<Assign, JsError> {
        if let EnvRecord::Module(m) = &self.record
            && m.imports.borrow().contains_key(name)
        {
            return Err(const_assignment_error());
        }

        if let Some(bindings) = self.bindings() {
            let mut bindings = bindings.borrow_mut();
            if let Some(binding) = bindings.get_mut(name) {
                if !binding.initialized {
                    return Err(uninitialized_error(name));
                }
                if binding.mutable {
                    binding.value = value;
                } else if binding.strict || strict {
                    return Err(const_assignment_error());
                }
                return Ok(Assign::Done);
            }
        }

        match &self.record {
            EnvRecord::Object(object) | EnvRecord::Global(GlobalRecord { object, .. }) => {
                let key = PropertyKey::from(name.cheap_clone());
                if strict && !object.has_property(&key) {
                    return Err(JsError::reference_error(name));
                }
                Ok(object.set(key, value))
            }
            _ => Err(missing_binding(name)),
        }
    }

    pub fn get_binding_value(&self, name: &JsString, strict: bool) -> Result<Access, JsError> {
        if let EnvRecord::Module(m) = &self.record {
            let import = m.imports.borrow().get(name).cloned();
            if let Some((target, target_name)) = import {
                return target.get_binding_value(&target_name, true);
            }
        }

        if let Some(bindings) = self.bindings()
            && let Some(binding) = bindings.borrow().get(name)
        {
            if !binding.initialized {
                return Err(uninitialized_error(name));
            }
            return Ok(Access::Value(binding.value.clone()));
        }

        match &self.record {
            EnvRecord::Object(object) | EnvRecord::Global(GlobalRecord { object, .. }) => {
                let key = PropertyKey::from(name.cheap_clone());
                if !object.has_property(&key) {
                    // Deleted between resolution and read
                    return if strict {
                        Err(JsError::reference_error(name))
                    } else {
                        Ok(Access::Value(JsValue::Undefined))
                    };
                }
                Ok(object.get(&key))
            }
            _ => Err(missing_binding(name)),
        }
    }

    /// `delete name`: false for non-deletable bindings
    pub fn delete_binding(&self, name: &JsString) -> bool {
        if let Some(bindings) = self.bindings() {
            let mut bindings = bindings.borrow_mut();
            if let Some(binding) = bindings.get(name) {
                if !binding.deletable {
                    return false;
                }
                bindings.shift_remove(name);
                return true;
            }
        }
        match &self.record {
            EnvRecord::Object(object) => object.borrow_mut().delete(&PropertyKey::from(name.cheap_clone())),
            EnvRecord::Global(g) => {
                let deleted = g.object.borrow_mut().delete(&PropertyKey::from(name.cheap_clone()));
                if deleted {
                    g.var_names.borrow_mut().remove(name);
                }
                deleted
            }
            _ => true,
        }
    }

    pub fn has_this_binding(&self) -> bool {
        matches!(
            self.record,
            EnvRecord::Function(_) | EnvRecord::Global(_) | EnvRecord::Module(_)
        )
    }

    /// Bind `this` after `super()` returned. Binding twice is a guest `ReferenceError`.
    pub fn bind_this_value(&self, value: JsValue) -> Result<(), JsError> {
        match &self.record {
            EnvRecord::Function(f) => {
                let mut this = f.this.borrow_mut();
                if matches!(*this, ThisState::Bound(_)) {
                    return Err(JsError::reference_error_with_message(
                        "Super constructor may only be called once",
                    ));
                }
                *this = ThisState::Bound(value);
                Ok(())
            }
            _ => Err(JsError::internal_error("bind_this_value on a record without this")),
        }
    }

    pub fn get_this_binding(&self) -> Result<JsValue, JsError> {
        match &self.record {
            EnvRecord::Function(f) => match &*f.this.borrow() {
                ThisState::Bound(v) => Ok(v.clone()),
                ThisState::Uninitialized => Err(JsError::reference_error_with_message(
                    "Must call super constructor in derived class before accessing 'this' or returning from derived constructor",
                )),
            },
            EnvRecord::Global(g) => Ok(JsValue::Object(g.object.cheap_clone())),
            EnvRecord::Module(_) => Ok(JsValue::Undefined),
            _ => Err(JsError::internal_error("get_this_binding on a record without this")),
        }
    }

    /// Indirect binding in a module record
    pub fn create_import_binding(&self, name: JsString, target: EnvRef, target_name: JsString) -> Result<(), JsError> {
        match &self.record {
            EnvRecord::Module(m) => {
                m.imports.borrow_mut().insert(name, (target, target_name));
                Ok(())
            }
            _ => Err(JsError::internal_error("import binding outside a module record")),
        }
    }

    pub fn as_function(&self) -> Option<&FunctionRecord> {
        match &self.record {
            EnvRecord::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_global(&self) -> Option<&GlobalRecord> {
        match &self.record {
            EnvRecord::Global(g) => Some(g),
            _ => None,
        }
    }
}

impl GlobalRecord {
    /// `var`/function name at script top level
    pub fn create_var_binding(&self, name: JsString, deletable: bool) {
        let key = PropertyKey::from(name.cheap_clone());
        if !self.object.borrow().has_own_property(&key) {
            self.object.borrow_mut().define_property(
                key,
                Property {
                    configurable: deletable,
                    ..Property::data(JsValue::Undefined)
                },
            );
        }
        self.var_names.borrow_mut().insert(name);
    }

    pub fn create_function_binding(&self, name: JsString, value: JsValue) {
        let key = PropertyKey::from(name.cheap_clone());
        self.object.borrow_mut().define_property(
            key,
            Property {
                configurable: false,
                ..Property::data(value)
            },
        );
        self.var_names.borrow_mut().insert(name);
    }

    /// Redeclaration checks of script instantiation
    pub fn check_declarations(&self, lexical: &[JsString], vars: &[JsString]) -> Result<(), JsError> {
        let declarative = self.declarative.borrow();
        let var_names = self.var_names.borrow();
        let redeclared = |name: &JsString| {
            JsError::syntax_error(format!("Identifier '{}' has already been declared", name), 0, 0)
        };

        for name in lexical {
            if declarative.contains_key(name) || var_names.contains(name) {
                return Err(redeclared(name));
            }
            let key = PropertyKey::from(name.cheap_clone());
            if let Some(prop) = self.object.borrow().get_own_property(&key)
                && !prop.configurable
            {
                return Err(redeclared(name));
            }
        }
        for name in vars {
            if declarative.contains_key(name) {
                return Err(redeclared(name));
            }
        }
        Ok(())
    }
}

/// Result of identifier resolution
#[derive(Clone)]
pub enum Reference {
    Env { env: EnvRef, name: JsString, strict: bool },
    Unresolvable { name: JsString, strict: bool },
    Property {
        base: JsValue,
        key: PropertyKey,
        /// Receiver for accessors (differs from `base` for `super.x`)
        this: JsValue,
        strict: bool,
    },
}

/// Walk the chain for `name`
pub fn resolve_binding(env: &EnvRef, name: &JsString, strict: bool) -> Reference {
    let mut current = Some(env.cheap_clone());
    while let Some(e) = current {
        if e.has_binding(name) {
            return Reference::Env {
                env: e,
                name: name.cheap_clone(),
                strict,
            };
        }
        current = e.outer.clone();
    }
    Reference::Unresolvable {
        name: name.cheap_clone(),
        strict,
    }
}

/// Nearest record providing `this`
pub fn this_environment(env: &EnvRef) -> Option<EnvRef> {
    let mut current = Some(env.cheap_clone());
    while let Some(e) = current {
        if e.has_this_binding() {
            return Some(e);
        }
        current = e.outer.clone();
    }
    None
}

impl Reference {
    /// Read a binding reference; unresolvable names are a `ReferenceError`
    pub fn get_binding(&self) -> Result<Access, JsError> {
        match self {
            Reference::Env { env, name, strict } => env.get_binding_value(name, *strict),
            Reference::Unresolvable { name, .. } => Err(JsError::reference_error(name)),
            Reference::Property { .. } => Err(JsError::internal_error("property reference read as binding")),
        }
    }

    /// Write a binding reference. Sloppy writes to unresolvable names create a
    /// property on the global object.
    pub fn put_binding(&self, value: JsValue, global: &ObjectRef) -> Result<Assign, JsError> {
        match self {
            Reference::Env { env, name, strict } => env.set_mutable_binding(name, value, *strict),
            Reference::Unresolvable { name, strict } => {
                if *strict {
                    Err(JsError::reference_error(name))
                } else {
                    Ok(global.set(PropertyKey::from(name.cheap_clone()), value))
                }
            }
            Reference::Property { .. } => Err(JsError::internal_error("property reference written as binding")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::JsObject;

    fn name(s: &str) -> JsString {
        JsString::from(s)
    }

    fn value_of(env: &Environment, n: &str) -> Result<JsValue, JsError> {
        match env.get_binding_value(&name(n), true)? {
            Access::Value(v) => Ok(v),
            Access::Getter(_) => panic!("unexpected getter"),
        }
    }

    #[test]
    fn test_tdz() {
        let env = Environment::new_declarative(None);
        env.create_mutable_binding(name("x"), false);
        let err = value_of(&env, "x").err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("ReferenceError: Cannot access 'x' before initialization")
        );
        assert!(env.set_mutable_binding(&name("x"), JsValue::from(1), false).is_err());

        env.initialize_binding(&name("x"), JsValue::from(1)).ok();
        assert!(matches!(value_of(&env, "x"), Ok(JsValue::Number(n)) if n == 1.0));
    }

    #[test]
    fn test_double_initialization_is_engine_error() {
        let env = Environment::new_declarative(None);
        env.create_mutable_binding(name("x"), false);
        assert!(env.initialize_binding(&name("x"), JsValue::Null).is_ok());
        let err = env.initialize_binding(&name("x"), JsValue::Null);
        assert!(matches!(err, Err(e) if e.is_engine()));
    }

    #[test]
    fn test_const_assignment() {
        let env = Environment::new_declarative(None);
        env.create_immutable_binding(name("c"), true);
        env.initialize_binding(&name("c"), JsValue::from(1)).ok();
        let err = env.set_mutable_binding(&name("c"), JsValue::from(2), false);
        assert!(matches!(err, Err(JsError::TypeError { .. })));
    }

    #[test]
    fn test_sloppy_immutable_assignment_is_ignored() {
        let env = Environment::new_declarative(None);
        env.create_immutable_binding(name("f"), false);
        env.initialize_binding(&name("f"), JsValue::from(1)).ok();
        assert!(env.set_mutable_binding(&name("f"), JsValue::from(2), false).is_ok());
        assert!(matches!(value_of(&env, "f"), Ok(JsValue::Number(n)) if n == 1.0));
    }

    #[test]
    fn test_resolution_walks_outward() {
        let global_object = ObjectRef::new(JsObject::ordinary(None));
        let global = Environment::new_global(global_object.clone());
        if let Some(g) = global.as_global() {
            g.create_var_binding(name("v"), false);
        }
        let inner = Environment::new_declarative(Some(global.clone()));

        match resolve_binding(&inner, &name("v"), false) {
            Reference::Env { env, .. } => assert!(Rc::ptr_eq(&env, &global)),
            _ => panic!("expected environment reference"),
        }
        assert!(matches!(
            resolve_binding(&inner, &name("missing"), false),
            Reference::Unresolvable { .. }
        ));
    }

    #[test]
    fn test_global_redeclaration_checks() {
        let global = Environment::new_global(ObjectRef::new(JsObject::ordinary(None)));
        let Some(g) = global.as_global() else {
            panic!("expected global record");
        };
        g.create_var_binding(name("a"), false);
        assert!(g.check_declarations(&[name("a")], &[]).is_err());

        global.create_mutable_binding(name("b"), false);
        assert!(g.check_declarations(&[], &[name("b")]).is_err());
        assert!(g.check_declarations(&[name("c")], &[name("d")]).is_ok());
    }
}
