//! Function invocation
//!
//! Calling a closure pushes a `CallShell` frame on the caller's coroutine and
//! the callee's prologue and body above it; the shell turns the body's
//! `Return` into the call's value. Nothing here recurses on the host stack.

use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

use crate::ast::{FunctionBody, FunctionKind, FunctionNode, Pattern};
use crate::completion::{Completion, Unwind};
use crate::environment::{EnvRef, Environment, ThisState};
use crate::error::{EngineError, JsError};
use crate::object::{Access, Callable, JsObject, ObjectKind, ObjectRef, Property};
use crate::value::{CheapClone, JsString, JsValue, PropertyKey, describe};

use super::async_fn::{AsyncInvocation, InvocationState};
use super::builtins::promise::AllElement;
use super::frame::{ActivationKind, BindTarget, Context, Coroutine, Flow, Mark, Op, ShellKind, Step};
use super::hoist::{DEFAULT_EXPORT_BINDING, ScopeInfo};
use super::{Interpreter, define_function_metadata, rethrow};

/// How a function binds `this`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThisMode {
    /// Arrow functions: `this` of the enclosing scope
    Lexical,
    Strict,
    /// Sloppy functions: nullish becomes the global object, primitives are boxed
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructorKind {
    None,
    Base,
    /// `class extends`: `this` is bound by `super()`
    Derived,
}

/// An interpreted function: code plus the environment it closes over
pub struct Closure {
    pub node: Rc<FunctionNode>,
    pub env: EnvRef,
    pub this_mode: ThisMode,
    /// Object whose prototype `super` refers to
    pub home_object: Option<ObjectRef>,
    pub constructor_kind: ConstructorKind,
    pub name: JsString,
}

impl Closure {
    pub fn is_constructor(&self) -> bool {
        self.constructor_kind != ConstructorKind::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKind {
    Next,
    Return,
    Throw,
}

impl ResumeKind {
    pub fn method_name(self) -> &'static str {
        match self {
            ResumeKind::Next => "next",
            ResumeKind::Return => "return",
            ResumeKind::Throw => "throw",
        }
    }
}

/// Built-ins the evaluator runs itself because they call back into guest
/// code as frames or carry per-function state
pub enum Intrinsic {
    FunctionCall,
    FunctionApply,
    BoundFunction {
        target: ObjectRef,
        this: JsValue,
        args: Vec<JsValue>,
        name: JsString,
    },
    GeneratorResume(ResumeKind),
    /// Implicit constructor of a class without one
    DefaultConstructor { derived: bool, name: JsString },
    /// Resolve or reject function of a promise capability
    PromiseResolver {
        promise: ObjectRef,
        resolved: Rc<Cell<bool>>,
        reject: bool,
    },
    PromiseAllElement(AllElement),
    PromiseFinally { on_finally: JsValue, reject: bool },
}

impl Intrinsic {
    pub fn name(&self) -> JsString {
        JsString::from(match self {
            Intrinsic::FunctionCall => "call",
            Intrinsic::FunctionApply => "apply",
            Intrinsic::BoundFunction { name, .. } | Intrinsic::DefaultConstructor { name, .. } => {
                return name.cheap_clone();
            }
            Intrinsic::GeneratorResume(kind) => kind.method_name(),
            Intrinsic::PromiseResolver { .. } | Intrinsic::PromiseAllElement(_) | Intrinsic::PromiseFinally { .. } => "",
        })
    }

    pub fn is_constructor(&self) -> bool {
        match self {
            Intrinsic::DefaultConstructor { .. } => true,
            Intrinsic::BoundFunction { target, .. } => target.callable().is_some_and(|c| c.is_constructor()),
            _ => false,
        }
    }
}

impl Interpreter {
    // ═══════════════════════════════════════════════════════════════════════
    // Function objects
    // ═══════════════════════════════════════════════════════════════════════

    /// Function object for a closure, with `length` and `name`
    pub(crate) fn closure_object(&self, closure: Closure) -> ObjectRef {
        let name = closure.name.cheap_clone();
        let length = closure.node.expected_arguments();
        let func = self.create_function_object(Callable::Closure(Rc::new(closure)));
        define_function_metadata(&func, name, length);
        func
    }

    /// Function declaration, expression body or method, closing over `env`
    pub(crate) fn instantiate_function(
        &self,
        env: &EnvRef,
        node: &Rc<FunctionNode>,
        name: JsString,
        home_object: Option<ObjectRef>,
    ) -> ObjectRef {
        let this_mode = if node.is_arrow() {
            ThisMode::Lexical
        } else if node.strict {
            ThisMode::Strict
        } else {
            ThisMode::Global
        };
        let constructor_kind = if node.kind == FunctionKind::Normal && !node.is_async && !node.is_generator {
            ConstructorKind::Base
        } else {
            ConstructorKind::None
        };
        let func = self.closure_object(Closure {
            node: node.clone(),
            env: env.cheap_clone(),
            this_mode,
            home_object,
            constructor_kind,
            name,
        });

        let prototype = if constructor_kind == ConstructorKind::Base {
            let proto = self.create_object();
            proto.define_hidden("constructor", JsValue::Object(func.cheap_clone()));
            Some(proto)
        } else if node.is_generator {
            Some(ObjectRef::new(JsObject::ordinary(Some(
                self.realm.generator_prototype.cheap_clone(),
            ))))
        } else {
            None
        };
        if let Some(proto) = prototype {
            func.borrow_mut().define_property(
                PropertyKey::from("prototype"),
                Property {
                    writable: true,
                    ..Property::internal(JsValue::Object(proto))
                },
            );
        }
        func
    }

    /// Function or arrow expression. A named function expression sees its
    /// own name through an extra scope.
    pub(crate) fn function_expression(&self, ctx: &Rc<Context>, node: &Rc<FunctionNode>, hint: Option<JsString>) -> ObjectRef {
        match (&node.id, node.is_arrow()) {
            (Some(id), false) => {
                let func_env = Environment::new_declarative(Some(ctx.lexical_env.cheap_clone()));
                func_env.create_immutable_binding(id.name.cheap_clone(), false);
                let func = self.instantiate_function(&func_env, node, id.name.cheap_clone(), None);
                func_env.initialize_or_set(&id.name, JsValue::Object(func.cheap_clone()));
                func
            }
            _ => self.instantiate_function(&ctx.lexical_env, node, hint.unwrap_or_default(), None),
        }
    }

    /// `OrdinaryCreateFromConstructor`: `new_target.prototype`, or `fallback`
    pub(crate) fn prototype_from_constructor(&mut self, new_target: &ObjectRef, fallback: &ObjectRef) -> Result<ObjectRef, JsError> {
        let proto = self.get_named(&JsValue::Object(new_target.cheap_clone()), "prototype")?;
        Ok(match proto {
            JsValue::Object(p) => p,
            _ => fallback.cheap_clone(),
        })
    }

    pub(crate) fn ordinary_create_from_constructor(&mut self, new_target: &ObjectRef) -> Result<ObjectRef, JsError> {
        let fallback = self.realm.object_prototype.cheap_clone();
        let proto = self.prototype_from_constructor(new_target, &fallback)?;
        Ok(ObjectRef::new(JsObject::ordinary(Some(proto))))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // [[Call]] / [[Construct]]
    // ═══════════════════════════════════════════════════════════════════════

    /// Call `func`. The result ends up on the caller's value stack, possibly
    /// after frames this pushes have run.
    pub(crate) fn invoke(&mut self, ctx: &Rc<Context>, func: JsValue, this: JsValue, args: Vec<JsValue>) -> Step {
        let callable = func.as_object().and_then(|o| o.callable());
        let (Some(callable), JsValue::Object(func_obj)) = (callable, &func) else {
            return Err(JsError::type_error(format!("{} is not a function", describe(&func))).into());
        };
        match callable {
            Callable::Native(native) => {
                let result = (native.call)(self, this, &args)?;
                self.co.values.push(result);
                Ok(Flow::Continue)
            }
            Callable::NativeLoop(native) => {
                let state = (native.start)(self, this, &args)?;
                self.start_callback_loop(ctx, state)
            }
            Callable::Closure(closure) => self.call_closure(ctx, closure, func_obj.cheap_clone(), this, args, None),
            Callable::Intrinsic(intrinsic) => self.call_intrinsic(ctx, &intrinsic, this, args),
        }
    }

    pub(crate) fn construct(&mut self, ctx: &Rc<Context>, func: JsValue, args: Vec<JsValue>, new_target: ObjectRef) -> Step {
        let callable = func
            .as_object()
            .and_then(|o| o.callable())
            .filter(|c| c.is_constructor());
        let (Some(callable), JsValue::Object(func_obj)) = (callable, &func) else {
            return Err(JsError::type_error(format!("{} is not a constructor", describe(&func))).into());
        };
        match callable {
            Callable::Closure(closure) => {
                self.call_closure(ctx, closure, func_obj.cheap_clone(), JsValue::Undefined, args, Some(new_target))
            }
            Callable::Native(native) => {
                let Some(construct) = native.construct else {
                    return Err(JsError::type_error(format!("{} is not a constructor", native.name)).into());
                };
                let result = construct(self, &args, &new_target)?;
                self.co.values.push(result);
                Ok(Flow::Continue)
            }
            Callable::NativeLoop(native) => {
                let Some(construct) = native.construct else {
                    return Err(JsError::type_error(format!("{} is not a constructor", native.name)).into());
                };
                let state = construct(self, &args, &new_target)?;
                self.start_callback_loop(ctx, state)
            }
            Callable::Intrinsic(intrinsic) => match &*intrinsic {
                Intrinsic::DefaultConstructor { derived: true, .. } => {
                    let parent = func_obj.prototype().map(JsValue::Object).unwrap_or(JsValue::Null);
                    if !parent.as_object().is_some_and(|p| p.callable().is_some_and(|c| c.is_constructor())) {
                        return Err(JsError::type_error("Super constructor is not a constructor").into());
                    }
                    self.construct(ctx, parent, args, new_target)
                }
                Intrinsic::DefaultConstructor { derived: false, .. } => {
                    let this = self.ordinary_create_from_constructor(&new_target)?;
                    self.co.values.push(JsValue::Object(this));
                    Ok(Flow::Continue)
                }
                Intrinsic::BoundFunction {
                    target, args: bound, ..
                } => {
                    let new_target = if new_target.ptr_eq(func_obj) {
                        target.cheap_clone()
                    } else {
                        new_target
                    };
                    let mut all = bound.clone();
                    all.extend(args);
                    self.construct(ctx, JsValue::Object(target.cheap_clone()), all, new_target)
                }
                _ => Err(JsError::type_error(format!("{} is not a constructor", describe(&func))).into()),
            },
        }
    }

    fn coerce_this(&self, mode: ThisMode, this: JsValue) -> Result<JsValue, JsError> {
        Ok(match mode {
            ThisMode::Global if this.is_null_or_undefined() => JsValue::Object(self.realm.global.cheap_clone()),
            ThisMode::Global if !this.is_object() => JsValue::Object(self.to_object(&this)?),
            _ => this,
        })
    }

    fn call_closure(
        &mut self,
        ctx: &Rc<Context>,
        closure: Rc<Closure>,
        func: ObjectRef,
        this: JsValue,
        args: Vec<JsValue>,
        new_target: Option<ObjectRef>,
    ) -> Step {
        if self.call_depth() >= self.max_call_depth {
            return Err(JsError::range_error("Maximum call stack size exceeded").into());
        }
        let node = closure.node.clone();
        if node.kind == FunctionKind::ClassConstructor && new_target.is_none() {
            return Err(JsError::type_error(format!(
                "Class constructor {} cannot be invoked without 'new'",
                closure.name
            ))
            .into());
        }
        if node.is_async && node.is_generator {
            return Err(JsError::unsupported("async generator functions").into());
        }

        let mut shell = ShellKind::Call;
        let env = if node.is_arrow() {
            Environment::new_declarative(Some(closure.env.cheap_clone()))
        } else {
            let this_state = match (&new_target, closure.constructor_kind) {
                (Some(_), ConstructorKind::Derived) => ThisState::Uninitialized,
                (Some(nt), _) => {
                    let this_obj = self.ordinary_create_from_constructor(nt)?;
                    shell = ShellKind::Construct(this_obj.cheap_clone());
                    ThisState::Bound(JsValue::Object(this_obj))
                }
                (None, _) => ThisState::Bound(self.coerce_this(closure.this_mode, this)?),
            };
            Environment::new_function(
                func.cheap_clone(),
                this_state,
                closure.home_object.clone(),
                new_target.clone(),
                Some(closure.env.cheap_clone()),
            )
        };
        if new_target.is_some() && closure.constructor_kind == ConstructorKind::Derived {
            shell = ShellKind::ConstructDerived(env.cheap_clone());
        }

        let param_ops = self.bind_parameters(&closure, &env, args);
        let fctx = Context::new(env.cheap_clone(), env.cheap_clone(), node.strict);

        if node.is_async {
            return self.start_async_call(closure, env, &fctx, param_ops);
        }

        let mark = self.co.mark();
        self.co.depth += 1;
        self.co.push(ctx, Op::CallShell { kind: shell, mark });
        if node.is_generator {
            self.co.push(&fctx, Op::MakeGenerator { closure, env, func });
        } else {
            self.co.push(&fctx, Op::FunctionBody { closure, env });
        }
        for op in param_ops.into_iter().rev() {
            self.co.push(&fctx, op);
        }
        Ok(Flow::Continue)
    }

    fn start_async_call(&mut self, closure: Rc<Closure>, env: EnvRef, fctx: &Rc<Context>, param_ops: Vec<Op>) -> Step {
        let promise = self.create_promise();
        let id = self.fresh_invocation_id();
        let invocation = Rc::new(AsyncInvocation::new(id, promise));
        invocation.set_state(InvocationState::Started);

        let mut co = Coroutine {
            depth: 1,
            ..Coroutine::default()
        };
        co.push(fctx, Op::AsyncShell { script: false });
        co.push(fctx, Op::FunctionBody { closure, env });
        for op in param_ops.into_iter().rev() {
            co.push(fctx, op);
        }
        trace!(invocation = id, "async invocation started");
        self.enter_activation(
            ActivationKind::Async {
                invocation,
                deliver_promise: true,
            },
            co,
        );
        Ok(Flow::Continue)
    }

    /// Create parameter bindings; simple lists are bound here, others return
    /// the frames that bind them
    fn bind_parameters(&mut self, closure: &Closure, env: &EnvRef, args: Vec<JsValue>) -> Vec<Op> {
        let node = &closure.node;
        let mut names = Vec::new();
        for param in node.params.iter() {
            param.bound_names(&mut names);
        }
        if let Some(rest) = &node.rest {
            rest.bound_names(&mut names);
        }
        for id in &names {
            if !env.has_lexical_declaration(&id.name) {
                env.create_mutable_binding(id.name.cheap_clone(), false);
            }
        }

        if node.uses_arguments && !node.is_arrow() && !names.iter().any(|id| id.name == "arguments") {
            let arguments = self.create_arguments_object(&args);
            let name = JsString::from("arguments");
            env.create_mutable_binding(name.cheap_clone(), false);
            env.initialize_or_set(&name, JsValue::Object(arguments));
        }

        let mut args = args.into_iter();
        if node.simple_params {
            for param in node.params.iter() {
                if let Pattern::Identifier(id) = param {
                    env.initialize_or_set(&id.name, args.next().unwrap_or_default());
                }
            }
            return Vec::new();
        }

        let mut ops = Vec::with_capacity(node.params.len() * 2 + 2);
        for param in node.params.iter() {
            ops.push(Op::Push(args.next().unwrap_or_default()));
            ops.push(Op::BindPattern {
                pattern: param.clone(),
                target: BindTarget::Initialize(env.cheap_clone()),
            });
        }
        if let Some(rest) = &node.rest {
            let rest_array = self.create_array(args.collect());
            ops.push(Op::Push(JsValue::Object(rest_array)));
            ops.push(Op::BindPattern {
                pattern: rest.clone(),
                target: BindTarget::Initialize(env.cheap_clone()),
            });
        }
        ops
    }

    /// Unmapped `arguments` object
    fn create_arguments_object(&self, args: &[JsValue]) -> ObjectRef {
        let obj = ObjectRef::new(JsObject::new(
            Some(self.realm.object_prototype.cheap_clone()),
            ObjectKind::Arguments,
        ));
        for (i, arg) in args.iter().enumerate() {
            obj.define_value(PropertyKey::Index(i as u32), arg.clone());
        }
        obj.define_hidden("length", JsValue::from(args.len()));
        let values = self
            .realm
            .array_prototype
            .borrow()
            .get_own_data(&PropertyKey::from("values"))
            .unwrap_or_default();
        obj.define_hidden(PropertyKey::Symbol(self.realm.symbol_iterator.clone()), values);
        obj
    }

    /// Declaration instantiation of a function body, then the body itself
    pub(crate) fn function_body(&mut self, _ctx: &Rc<Context>, closure: &Rc<Closure>, env: EnvRef) -> Step {
        let node = &closure.node;
        let info = ScopeInfo::for_function(node);

        let var_env = if node.simple_params || node.strict {
            env.cheap_clone()
        } else {
            Environment::new_declarative(Some(env.cheap_clone()))
        };
        let separate = !Rc::ptr_eq(&var_env, &env);

        for name in &info.var_names {
            if separate {
                let initial = if env.has_lexical_declaration(name) {
                    match env.get_binding_value(name, true)? {
                        Access::Value(v) => v,
                        Access::Getter(_) => JsValue::Undefined,
                    }
                } else {
                    JsValue::Undefined
                };
                var_env.create_mutable_binding(name.cheap_clone(), false);
                var_env.initialize_binding(name, initial)?;
            } else if !var_env.has_lexical_declaration(name) {
                var_env.create_mutable_binding(name.cheap_clone(), false);
                var_env.initialize_binding(name, JsValue::Undefined)?;
            }
        }

        for func in &info.functions {
            let name = func
                .id
                .as_ref()
                .map(|id| id.name.cheap_clone())
                .unwrap_or_else(|| JsString::from(DEFAULT_EXPORT_BINDING));
            let fobj = self.instantiate_function(&var_env, func, name.cheap_clone(), None);
            if !var_env.has_lexical_declaration(&name) {
                var_env.create_mutable_binding(name.cheap_clone(), false);
            }
            var_env.initialize_or_set(&name, JsValue::Object(fobj));
        }

        for lexical in &info.lexical {
            if lexical.constant {
                var_env.create_immutable_binding(lexical.name.cheap_clone(), true);
            } else {
                var_env.create_mutable_binding(lexical.name.cheap_clone(), false);
            }
        }

        let body_ctx = Context::new(var_env.cheap_clone(), var_env, node.strict);
        match &node.body {
            FunctionBody::Block(body) => {
                self.co.completion = Completion::empty();
                self.co.push(
                    &body_ctx,
                    Op::StmtList {
                        body: body.clone(),
                        index: 0,
                        value: None,
                    },
                );
            }
            FunctionBody::Expression(expr) => {
                self.co.push(&body_ctx, Op::ReturnValue);
                self.co.push(&body_ctx, Op::Expr(expr.clone()));
            }
        }
        Ok(Flow::Continue)
    }

    /// Body ran off its end
    pub(crate) fn call_shell_done(&mut self, kind: ShellKind) -> Step {
        self.co.depth = self.co.depth.saturating_sub(1);
        check_label_escape(std::mem::take(&mut self.co.completion))?;
        let result = match kind {
            ShellKind::Call => JsValue::Undefined,
            ShellKind::Construct(this) => JsValue::Object(this),
            ShellKind::ConstructDerived(env) => env.get_this_binding()?,
        };
        self.co.values.push(result);
        Ok(Flow::Continue)
    }

    pub(crate) fn call_shell_unwind(&mut self, kind: ShellKind, mark: Mark, signal: Unwind) -> Result<Option<Unwind>, JsError> {
        self.co.depth = self.co.depth.saturating_sub(1);
        let Unwind::Return(value) = signal else {
            return Ok(Some(signal));
        };
        self.co.truncate(mark);
        let result = match kind {
            ShellKind::Call => value,
            ShellKind::Construct(this) => {
                if value.is_object() {
                    value
                } else {
                    JsValue::Object(this)
                }
            }
            ShellKind::ConstructDerived(env) => {
                if value.is_object() {
                    value
                } else if value.is_undefined() {
                    match env.get_this_binding() {
                        Ok(this) => this,
                        Err(err) => return rethrow(err),
                    }
                } else {
                    return rethrow(JsError::type_error(
                        "Derived constructors may only return object or undefined",
                    ));
                }
            }
        };
        self.co.values.push(result);
        Ok(None)
    }

    fn call_intrinsic(&mut self, ctx: &Rc<Context>, intrinsic: &Intrinsic, this: JsValue, args: Vec<JsValue>) -> Step {
        match intrinsic {
            Intrinsic::FunctionCall => {
                let mut args = args.into_iter();
                let this_arg = args.next().unwrap_or_default();
                self.invoke(ctx, this, this_arg, args.collect())
            }
            Intrinsic::FunctionApply => {
                let this_arg = args.first().cloned().unwrap_or_default();
                let list = self.list_from_array_like(&args.get(1).cloned().unwrap_or_default())?;
                self.invoke(ctx, this, this_arg, list)
            }
            Intrinsic::BoundFunction {
                target,
                this: bound_this,
                args: bound,
                ..
            } => {
                let mut all = bound.clone();
                all.extend(args);
                self.invoke(ctx, JsValue::Object(target.cheap_clone()), bound_this.clone(), all)
            }
            Intrinsic::GeneratorResume(kind) => {
                let value = args.into_iter().next().unwrap_or_default();
                self.generator_resume(this, *kind, value)
            }
            Intrinsic::DefaultConstructor { name, .. } => Err(JsError::type_error(format!(
                "Class constructor {} cannot be invoked without 'new'",
                name
            ))
            .into()),
            Intrinsic::PromiseResolver {
                promise,
                resolved,
                reject,
            } => {
                if !resolved.get() {
                    resolved.set(true);
                    let value = args.into_iter().next().unwrap_or_default();
                    if *reject {
                        self.reject_promise(promise, value);
                    } else {
                        self.resolve_promise(promise, value)?;
                    }
                }
                self.co.values.push(JsValue::Undefined);
                Ok(Flow::Continue)
            }
            Intrinsic::PromiseAllElement(element) => {
                let value = args.into_iter().next().unwrap_or_default();
                self.promise_all_element(element, value)?;
                self.co.values.push(JsValue::Undefined);
                Ok(Flow::Continue)
            }
            Intrinsic::PromiseFinally { on_finally, reject } => {
                let value = args.into_iter().next().unwrap_or_default();
                if !on_finally.is_callable() {
                    if *reject {
                        return Err(Unwind::throw(value));
                    }
                    self.co.values.push(value);
                    return Ok(Flow::Continue);
                }
                self.co.push(ctx, Op::FinallyPass { value, reject: *reject });
                self.invoke(ctx, on_finally.clone(), JsValue::Undefined, Vec::new())
            }
        }
    }
}

/// `break`/`continue` must never leave a function, script, module or job
pub(crate) fn check_label_escape(completion: Completion) -> Result<(), JsError> {
    match completion {
        Completion::Break { label, .. } => Err(JsError::Engine(EngineError::UnreachableLabel {
            kind: "break",
            label: label.map(|l| l.to_string()),
        })),
        Completion::Continue { label, .. } => Err(JsError::Engine(EngineError::UnreachableLabel {
            kind: "continue",
            label: label.map(|l| l.to_string()),
        })),
        _ => Ok(()),
    }
}
