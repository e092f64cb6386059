//! Interpreter for the guest language
//!
//! Execution is a trampoline: [`Interpreter::step`] pops one [`Frame`] from
//! the running coroutine and performs it, pushing follow-up frames instead of
//! recursing. Return and throw travel as `Err(Unwind)` to [`Interpreter::unwind`],
//! which pops frames until a handler frame takes the signal. Generators and
//! async invocations own coroutines of their own and are swapped in and out
//! as activations, so suspension never captures the host stack.

pub mod async_fn;
pub mod builtins;
pub mod call;
pub mod callback;
mod class;
pub mod driver;
mod eval_expr;
mod eval_stmt;
pub mod frame;
pub mod generator;
pub mod hoist;
pub mod module;
mod operations;
mod pattern;
pub mod realm;

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicU8;

use rustc_hash::FxHashMap;

use crate::RuntimeConfig;
use crate::completion::{Completion, Unwind};
use crate::error::{EngineError, JsError};
use crate::object::{Access, Callable, JsObject, NativeFn, NativeFunction, ObjectKind, ObjectRef, Property};
use crate::platform::{ConsoleProvider, RandomProvider, TimeProvider};
use crate::value::{CheapClone, JsString, JsSymbol, JsValue, PropertyKey, describe};

use async_fn::AsyncInvocation;
use builtins::promise::Job;
use driver::RootKind;
use frame::{Activation, ActivationKind, Context, Coroutine, Flow, Frame, Op, Pending, Step};
use module::ModuleRegistry;
use realm::Realm;

/// The interpreter state: one realm plus the task currently being driven
pub struct Interpreter {
    pub realm: Realm,
    /// Scope of host-initiated tasks
    pub(crate) global_ctx: Rc<Context>,

    /// Running coroutine
    pub(crate) co: Coroutine,
    pub(crate) activation: ActivationKind,
    /// Suspended callers of the running activation, innermost last
    pub(crate) callers: Vec<Activation>,
    /// Sum of `depth` over `callers`
    pub(crate) callers_depth: usize,

    /// Microtask queue
    pub(crate) jobs: VecDeque<Job>,
    /// Rejected promises without a handler, checked after each drain
    pub(crate) pending_rejections: Vec<ObjectRef>,
    /// Async invocations suspended at an `await`
    pub(crate) parked: Vec<Rc<AsyncInvocation>>,

    pub(crate) root: Option<RootKind>,
    /// Result of the last finished root task: `Err` holds a thrown value
    pub(crate) task_result: Option<Result<JsValue, JsValue>>,
    /// Result of the innermost nested run
    pub(crate) nested_result: Option<Result<JsValue, JsValue>>,

    pub(crate) modules: ModuleRegistry,

    pub(crate) max_call_depth: usize,
    /// Nested runs on the host stack (see [`Interpreter::run_nested`])
    pub(crate) nested_runs: usize,
    next_symbol_id: u64,
    next_invocation_id: u64,

    pub(crate) console: Box<dyn ConsoleProvider>,
    pub(crate) time: Box<dyn TimeProvider>,
    pub(crate) random: Box<dyn RandomProvider>,
    pub(crate) console_timers: FxHashMap<String, u64>,
    /// Arrays being joined, so cyclic arrays render as empty strings
    pub(crate) join_stack: Vec<usize>,
    pub(crate) yield_observer: Option<Box<dyn FnMut(&JsValue)>>,

    pub(crate) interrupt: Arc<AtomicU8>,
    /// Steps executed since the interpreter was created
    pub(crate) steps: u64,
    /// Budget of the `run` in progress
    pub(crate) limits: Option<driver::RunLimits>,
    pub(crate) aborting: bool,
}

impl Interpreter {
    pub fn new(config: &RuntimeConfig) -> Self {
        let mut next_symbol_id = 1;
        let realm = Realm::new(&mut next_symbol_id);
        let global_ctx = Context::new(realm.global_env.cheap_clone(), realm.global_env.cheap_clone(), config.strict);

        let mut interp = Self {
            realm,
            global_ctx,
            co: Coroutine::default(),
            activation: ActivationKind::Idle,
            callers: Vec::new(),
            callers_depth: 0,
            jobs: VecDeque::new(),
            pending_rejections: Vec::new(),
            parked: Vec::new(),
            root: None,
            task_result: None,
            nested_result: None,
            modules: ModuleRegistry::default(),
            max_call_depth: config.max_call_depth,
            nested_runs: 0,
            next_symbol_id,
            next_invocation_id: 1,
            console: crate::platform::default_console(),
            time: crate::platform::default_time(),
            random: crate::platform::default_random(),
            console_timers: FxHashMap::default(),
            join_stack: Vec::new(),
            yield_observer: None,
            interrupt: Arc::new(AtomicU8::new(driver::INTERRUPT_NONE)),
            steps: 0,
            limits: None,
            aborting: false,
        };
        builtins::install(&mut interp);
        interp
    }

    pub fn set_console(&mut self, console: Box<dyn ConsoleProvider>) {
        self.console = console;
    }

    pub fn set_time_provider(&mut self, time: Box<dyn TimeProvider>) {
        self.time = time;
    }

    pub fn set_random_provider(&mut self, random: Box<dyn RandomProvider>) {
        self.random = random;
    }

    pub(crate) fn fresh_symbol(&mut self, description: Option<JsString>) -> JsSymbol {
        let id = self.next_symbol_id;
        self.next_symbol_id += 1;
        JsSymbol::new(id, description)
    }

    pub(crate) fn fresh_invocation_id(&mut self) -> u64 {
        let id = self.next_invocation_id;
        self.next_invocation_id += 1;
        id
    }

    /// Guest call depth across every activation of the running task
    pub(crate) fn call_depth(&self) -> usize {
        self.callers_depth + self.co.depth
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Object creation
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a plain object with the proper prototype
    pub fn create_object(&self) -> ObjectRef {
        ObjectRef::new(JsObject::ordinary(Some(self.realm.object_prototype.cheap_clone())))
    }

    /// Create an array with the proper prototype
    pub fn create_array(&self, elements: Vec<JsValue>) -> ObjectRef {
        ObjectRef::new(JsObject::new(
            Some(self.realm.array_prototype.cheap_clone()),
            ObjectKind::Array(elements),
        ))
    }

    pub(crate) fn create_function_object(&self, callable: Callable) -> ObjectRef {
        ObjectRef::new(JsObject::new(
            Some(self.realm.function_prototype.cheap_clone()),
            ObjectKind::Function(callable),
        ))
    }

    /// Function object with `name` and `length`
    pub fn create_native_function(&self, name: &str, call: NativeFn, arity: u32) -> ObjectRef {
        let func = self.create_function_object(Callable::Native(NativeFunction {
            name: JsString::from(name),
            call,
            construct: None,
            arity,
        }));
        define_function_metadata(&func, JsString::from(name), arity as usize);
        func
    }

    /// Register a native method on a prototype or namespace object
    pub fn register_method(&self, obj: &ObjectRef, name: &str, func: NativeFn, arity: u32) {
        let f = self.create_native_function(name, func, arity);
        obj.define_hidden(name, JsValue::Object(f));
    }

    /// Register a native getter (`get name`)
    pub fn register_getter(&self, obj: &ObjectRef, name: &str, func: NativeFn) {
        let getter = self.create_native_function(&format!("get {}", name), func, 0);
        obj.borrow_mut()
            .define_property(PropertyKey::from(name), Property::accessor(Some(getter), None, false));
    }

    pub(crate) fn create_intrinsic(&self, intrinsic: call::Intrinsic, arity: usize) -> ObjectRef {
        let name = intrinsic.name();
        let func = self.create_function_object(Callable::Intrinsic(Rc::new(intrinsic)));
        define_function_metadata(&func, name, arity);
        func
    }

    /// Guest error object of the given constructor name
    pub fn create_error(&self, kind: &str, message: &str) -> ObjectRef {
        let proto = self.realm.error_prototype(kind);
        let error = ObjectRef::new(JsObject::new(Some(proto), ObjectKind::Error));
        error.define_hidden("message", JsValue::from(message));
        error
    }

    /// Iterator result object `{ value, done }`
    pub fn iter_result(&self, value: JsValue, done: bool) -> JsValue {
        let obj = self.create_object();
        obj.define_value("value", value);
        obj.define_value("done", JsValue::Boolean(done));
        JsValue::Object(obj)
    }

    /// Guest value of a throw: typed errors become error objects; engine
    /// errors stay errors
    pub(crate) fn error_value(&self, err: JsError) -> Result<JsValue, JsError> {
        match err {
            JsError::Thrown(value) => Ok(value),
            JsError::Engine(_) => Err(err),
            other => {
                let kind = other.guest_kind().unwrap_or("Error");
                Ok(JsValue::Object(self.create_error(kind, &other.message())))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Property access
    // ═══════════════════════════════════════════════════════════════════════

    /// `[[Get]]` on any value without running accessors. Primitives read
    /// through their prototype.
    pub(crate) fn property_access(&self, base: &JsValue, key: &PropertyKey) -> Result<Access, JsError> {
        let proto = match base {
            JsValue::Object(obj) => return Ok(obj.get(key)),
            JsValue::Undefined | JsValue::Null => {
                return Err(JsError::type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    describe(base),
                    key
                )));
            }
            JsValue::String(s) => {
                match key {
                    PropertyKey::Index(i) => {
                        if let Some(unit) = s.code_unit_at(*i as usize) {
                            return Ok(Access::Value(JsValue::from(String::from_utf16_lossy(&[unit]))));
                        }
                    }
                    PropertyKey::String(name) if name == "length" => {
                        return Ok(Access::Value(JsValue::from(s.utf16_len())));
                    }
                    _ => {}
                }
                &self.realm.string_prototype
            }
            JsValue::Number(_) => &self.realm.number_prototype,
            JsValue::Boolean(_) => &self.realm.boolean_prototype,
            JsValue::Symbol(_) => &self.realm.symbol_prototype,
        };
        Ok(proto.get(key))
    }

    /// Property read that runs getters synchronously (for natives)
    pub fn get_value(&mut self, base: &JsValue, key: &PropertyKey) -> Result<JsValue, JsError> {
        match self.property_access(base, key)? {
            Access::Value(v) => Ok(v),
            Access::Getter(getter) => self.call_function(&JsValue::Object(getter), base.clone(), &[]),
        }
    }

    pub fn get_named(&mut self, base: &JsValue, name: &str) -> Result<JsValue, JsError> {
        self.get_value(base, &PropertyKey::from(name))
    }

    /// Property write that runs setters synchronously; rejected writes throw
    pub fn set_value(&mut self, obj: &ObjectRef, key: PropertyKey, value: JsValue) -> Result<(), JsError> {
        match obj.set(key.clone(), value.clone()) {
            crate::object::Assign::Done => Ok(()),
            crate::object::Assign::Setter(setter) => {
                self.call_function(&JsValue::Object(setter), JsValue::Object(obj.cheap_clone()), &[value])?;
                Ok(())
            }
            crate::object::Assign::Rejected => Err(JsError::type_error(format!(
                "Cannot assign to read only property '{}' of object",
                key
            ))),
        }
    }

    /// Push a property read's result, calling the getter as a frame
    pub(crate) fn push_access(&mut self, ctx: &Rc<Context>, access: Access, receiver: JsValue) -> Step {
        match access {
            Access::Value(v) => {
                self.co.values.push(v);
                Ok(Flow::Continue)
            }
            Access::Getter(getter) => self.invoke(ctx, JsValue::Object(getter), receiver, Vec::new()),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Synchronous calls from native code
    // ═══════════════════════════════════════════════════════════════════════

    /// Call a function to completion. Guest functions run as a nested task on
    /// a fresh coroutine; the caller's task is restored afterwards. Natives
    /// whose callbacks should be pausable return a
    /// [`CallbackLoop`](callback::CallbackLoop) instead of calling this.
    pub fn call_function(&mut self, func: &JsValue, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
        let callable = match func {
            JsValue::Object(obj) => obj.callable(),
            _ => None,
        };
        match callable {
            None => Err(JsError::type_error(format!("{} is not a function", describe(func)))),
            Some(Callable::Native(native)) => (native.call)(self, this, args),
            Some(_) => self.run_nested(Op::Invoke {
                func: func.clone(),
                this,
                args: args.to_vec(),
            }),
        }
    }

    /// Construct from native code
    pub fn construct_function(&mut self, func: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
        let Some(obj) = func.as_object().filter(|o| o.callable().is_some_and(|c| c.is_constructor())) else {
            return Err(JsError::type_error(format!("{} is not a constructor", describe(func))));
        };
        if let Some(Callable::Native(NativeFunction {
            construct: Some(construct),
            ..
        })) = obj.callable()
        {
            return construct(self, args, obj);
        }
        self.run_nested(Op::Construct {
            func: obj.cheap_clone(),
            args: args.to_vec(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Value stack helpers
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn pop_value(&mut self) -> Result<JsValue, JsError> {
        self.co
            .values
            .pop()
            .ok_or_else(|| JsError::internal_error("value stack underflow"))
    }

    pub(crate) fn peek_value(&self) -> Result<JsValue, JsError> {
        self.co
            .values
            .last()
            .cloned()
            .ok_or_else(|| JsError::internal_error("value stack underflow"))
    }

    pub(crate) fn pop_reference(&mut self) -> Result<crate::environment::Reference, JsError> {
        self.co
            .refs
            .pop()
            .ok_or_else(|| JsError::internal_error("reference stack underflow"))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Dispatch
    // ═══════════════════════════════════════════════════════════════════════

    /// Perform one frame
    pub(crate) fn step(&mut self, frame: Frame) -> Step {
        let Frame { ctx, op } = frame;
        match op {
            // Statements
            Op::Stmt(stmt) => self.eval_statement(&ctx, stmt),
            Op::StmtList { body, index, value } => self.statement_list(&ctx, body, index, value),
            Op::ExprStmtEnd => {
                let v = self.pop_value()?;
                self.co.completion = Completion::Normal(Some(v));
                Ok(Flow::Continue)
            }
            Op::Declarators { decl, index } => self.declarators(&ctx, decl, index),
            Op::IfBranch(node) => self.if_branch(&ctx, node),
            Op::FillEmpty => {
                let completion = std::mem::take(&mut self.co.completion);
                self.co.completion = completion.update_empty(Some(JsValue::Undefined));
                Ok(Flow::Continue)
            }
            Op::LabelScope(labels) => self.label_scope(&labels),
            Op::LoopTest(state) => self.loop_test(&ctx, state),
            Op::LoopCheck(state) => self.loop_check(&ctx, state),
            Op::LoopAfterBody(state) => self.loop_after_body(&ctx, state),
            Op::ForStart(state) => self.for_start(&ctx, state),
            Op::ForTest(state) => self.for_test(&ctx, state),
            Op::ForCheck(state) => self.for_check(&ctx, state),
            Op::ForAfterBody(state) => self.for_after_body(&ctx, state),
            Op::ForUpdated(state) => self.for_updated(&ctx, state),
            Op::ForInStart { node, labels } => self.for_in_start(&ctx, node, labels),
            Op::ForInNext(state) => self.for_in_next(&ctx, state),
            Op::ForInAfterBody(state) => self.for_in_after_body(&ctx, state),
            Op::ForOfStart { node, labels } => self.for_of_start(&ctx, node, labels),
            Op::ForOfNext(state) => self.for_of_next(&ctx, state),
            Op::ForOfResult(state) => self.for_of_result(&ctx, state),
            Op::ForOfAfterBody(state) => self.for_of_after_body(&ctx, state),
            Op::ForOfClosed(completion) => self.for_of_closed(completion),
            Op::SwitchStart { node, labels } => self.switch_start(&ctx, node, labels),
            Op::SwitchTest { state, index } => self.switch_test(&ctx, state, index),
            Op::SwitchCompare { state, index } => self.switch_compare(&ctx, state, index),
            Op::SwitchRun { state, index, value } => self.switch_run(&ctx, state, index, value),
            Op::SwitchAfterCase { state, index, value } => self.switch_after_case(&ctx, state, index, value),
            Op::TryCatch { .. } => {
                // Try block finished without throwing
                let completion = std::mem::take(&mut self.co.completion);
                self.co.completion = completion.update_empty(Some(JsValue::Undefined));
                Ok(Flow::Continue)
            }
            Op::TryFinally { node, .. } => {
                let completion = std::mem::take(&mut self.co.completion);
                self.enter_finally(&ctx, &node, Pending::Completion(completion))
            }
            Op::FinallyResume(pending) => self.finally_resume(pending),
            Op::WithEnter(node) => self.with_enter(&ctx, node),
            Op::ReturnValue => {
                let v = self.pop_value()?;
                Err(Unwind::Return(v))
            }
            Op::ThrowValue => {
                let v = self.pop_value()?;
                Err(Unwind::throw(v))
            }
            Op::ClassDeclBind(name) => {
                let class = self.pop_value()?;
                ctx.lexical_env.initialize_binding(&name, class)?;
                self.co.completion = Completion::empty();
                Ok(Flow::Continue)
            }
            Op::ExportDefaultBind => {
                let v = self.pop_value()?;
                ctx.lexical_env
                    .initialize_binding(&JsString::from(hoist::DEFAULT_EXPORT_BINDING), v)?;
                self.co.completion = Completion::empty();
                Ok(Flow::Continue)
            }

            // Expressions
            Op::Expr(expr) => self.eval_expression(&ctx, expr),
            Op::NamedExpr(expr, hint) => self.named_expression(&ctx, expr, hint),
            Op::Pop => {
                self.pop_value()?;
                Ok(Flow::Continue)
            }
            Op::Push(v) => {
                self.co.values.push(v);
                Ok(Flow::Continue)
            }
            Op::Replace(v) => {
                self.pop_value()?;
                self.co.values.push(v);
                Ok(Flow::Continue)
            }
            Op::Unary(op) => self.unary(op),
            Op::Binary(op) => self.binary(op),
            Op::LogicalRest(node) => self.logical_rest(&ctx, node),
            Op::ConditionalRest(node) => self.conditional_rest(&ctx, node),
            Op::ToStringTop => {
                let v = self.pop_value()?;
                let s = self.to_string(&v)?;
                self.co.values.push(JsValue::String(s));
                Ok(Flow::Continue)
            }
            Op::TemplateConcat(node) => self.template_concat(&node),
            Op::ToPropertyKey => {
                let v = self.pop_value()?;
                let key = self.to_property_key(&v)?;
                self.co.values.push(key.to_value());
                Ok(Flow::Continue)
            }
            Op::ArrayFinish { base } => {
                let elements = self.co.values.split_off(base.min(self.co.values.len()));
                let array = self.create_array(elements);
                self.co.values.push(JsValue::Object(array));
                Ok(Flow::Continue)
            }
            Op::SpreadBegin => self.spread_begin(&ctx),
            Op::SpreadNext(rec) => self.spread_next(&ctx, rec),
            Op::SpreadResult(rec) => self.spread_result(&ctx, rec),
            Op::ObjectProps { node, index } => self.object_props(&ctx, node, index),
            Op::ObjectDefine { key, proto_setter } => self.object_define(key, proto_setter),
            Op::ObjectMethod { node, index } => self.object_method(&ctx, &node, index),
            Op::ObjectSpread => self.object_spread(),
            Op::MemberGet => self.member_get(&ctx, None),
            Op::MemberGetStatic(key) => self.member_get(&ctx, Some(key)),
            Op::OptionalCheck => {
                if self.peek_value()?.is_null_or_undefined() {
                    return self.short_circuit();
                }
                Ok(Flow::Continue)
            }
            Op::OptionalChainEnd(_) => Ok(Flow::Continue),
            Op::MethodLoad => self.method_load(&ctx, None),
            Op::MethodLoadStatic(key) => self.method_load(&ctx, Some(key)),
            Op::SuperMethodLoad => self.super_method_load(&ctx),
            Op::CallFinish { node, base } => self.call_finish(&ctx, &node, base),
            Op::NewFinish { node, base } => self.new_finish(&ctx, &node, base),
            Op::SuperCallFinish { base, .. } => self.super_call_finish(&ctx, base),
            Op::BindThis(env) => {
                let this = self.peek_value()?;
                env.bind_this_value(this)?;
                Ok(Flow::Continue)
            }
            Op::MakeRef => self.make_ref(&ctx, None),
            Op::MakeRefStatic(key) => self.make_ref(&ctx, Some(key)),
            Op::MakeSuperRef => self.make_super_ref(&ctx),
            Op::GetRef => self.get_ref(&ctx),
            Op::DropRef => {
                self.pop_reference()?;
                Ok(Flow::Continue)
            }
            Op::PutRef => {
                let value = self.pop_value()?;
                let reference = self.pop_reference()?;
                self.put_reference(&ctx, reference, value, true)
            }
            Op::CompoundFinish(op) => self.compound_finish(&ctx, op),
            Op::LogicalAssignRest(node) => self.logical_assign_rest(&ctx, node),
            Op::UpdateFinish { op, prefix } => self.update_finish(&ctx, op, prefix),
            Op::AssignPattern(pattern) => {
                let value = self.peek_value()?;
                self.bind_pattern(&ctx, &pattern, value, frame::BindTarget::Assign)
            }
            Op::DeleteMember => self.delete_member(&ctx),
            Op::ClassHeritage { node, name } => self.class_heritage(&ctx, node, name),
            Op::ClassMembers { state, index } => self.class_members(&ctx, state, index),
            Op::ClassMemberDefine { state, index } => {
                let key = self.pop_value()?;
                let key = self.to_property_key(&key)?;
                self.define_class_member(&ctx, &state, index, key)?;
                Ok(Flow::Continue)
            }

            // Patterns
            Op::BindPattern { pattern, target } => {
                let value = self.pop_value()?;
                self.bind_pattern(&ctx, &pattern, value, target)
            }
            Op::ObjectPatternStep { state, index } => self.object_pattern_step(&ctx, state, index),
            Op::ObjectPatternKey { state, index } => self.object_pattern_key(&ctx, state, index),
            Op::ArrayPatternBegin { pattern, target } => self.array_pattern_begin(&ctx, pattern, target),
            Op::ArrayPatternStep { state, index } => self.array_pattern_step(&ctx, state, index),
            Op::ArrayPatternValue { state, index } => self.array_pattern_value(&ctx, state, index),
            Op::ArrayPatternRest { state, base } => self.array_pattern_rest(&ctx, state, base),
            Op::ArrayPatternRestValue { state, base } => self.array_pattern_rest_value(&ctx, state, base),
            Op::IterCloseResult => {
                let result = self.pop_value()?;
                if !result.is_object() {
                    return Err(JsError::type_error(format!("Iterator result {} is not an object", describe(&result))).into());
                }
                Ok(Flow::Continue)
            }
            Op::ResumeUnwind(signal) => {
                // return() finished during close-on-unwind: keep unwinding
                self.pop_value()?;
                Err(signal)
            }

            // Iteration, generators, await
            Op::GetIterator => self.get_iterator(&ctx),
            Op::YieldValue => {
                let v = self.pop_value()?;
                Ok(Flow::Suspend(crate::completion::SuspensionCommand::Yield(v)))
            }
            Op::YieldStarBegin => self.yield_star_begin(&ctx),
            Op::YieldDelegate(rec) => self.yield_delegate(&ctx, rec),
            Op::YieldDelegateResult(rec) => self.yield_delegate_result(&ctx, rec),
            Op::YieldDelegateReturn(rec) => self.yield_delegate_return(&ctx, rec),
            Op::AwaitValue => {
                let v = self.pop_value()?;
                Ok(Flow::Suspend(crate::completion::SuspensionCommand::Await(v)))
            }

            // Calls and activations
            Op::CallShell { kind, .. } => self.call_shell_done(kind),
            Op::FunctionBody { closure, env } => self.function_body(&ctx, &closure, env),
            Op::MakeGenerator { closure, env, func } => self.make_generator(&ctx, closure, env, &func),
            Op::GeneratorShell => self.generator_shell_done(),
            Op::AsyncShell { script } => self.async_shell_done(script),
            Op::TaskShell { root } => self.task_shell_done(root),
            Op::JobShell(settle) => self.job_shell_done(settle),
            Op::CallbackLoop { state, .. } => {
                let result = self.pop_value()?;
                self.resume_loop(&ctx, state, Some(result))
            }
            Op::Invoke { func, this, args } => self.invoke(&ctx, func, this, args),
            Op::Construct { func, args } => {
                let new_target = func.cheap_clone();
                self.construct(&ctx, JsValue::Object(func), args, new_target)
            }
            Op::ResumeAsync { invocation, resumption } => self.resume_async(&invocation, resumption),
            Op::AbortAsync(invocation) => self.abort_async(&invocation),
            Op::ScriptBody(program) => self.script_body(&ctx, &program),
            Op::StartScript(program) => self.start_script(&ctx, program),
            Op::StartModule(instance) => self.start_module(&ctx, instance),
            Op::ModuleBody(instance) => self.module_body(&instance),
            Op::ModuleEvaluated(instance) => {
                instance.mark_evaluated();
                self.co.completion = Completion::empty();
                Ok(Flow::Continue)
            }
            Op::FinallyPass { value, reject } => {
                self.pop_value()?;
                if reject {
                    return Err(Unwind::throw(value));
                }
                self.co.values.push(value);
                Ok(Flow::Continue)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Unwinding
    // ═══════════════════════════════════════════════════════════════════════

    /// Pop frames until one handles `signal`. Engine errors, and anything that
    /// goes wrong while unwinding, come back as `Err`.
    pub(crate) fn unwind(&mut self, mut signal: Unwind) -> Result<(), JsError> {
        loop {
            if let Unwind::Error(err) = &signal
                && err.is_engine()
            {
                return Err(err.clone());
            }
            let Some(Frame { ctx, op }) = self.co.frames.pop() else {
                return Err(JsError::internal_error("unwound past the bottom of a coroutine"));
            };
            match self.unwind_frame(&ctx, op, signal)? {
                None => return Ok(()),
                Some(next) => signal = next,
            }
        }
    }

    /// `None` when the frame handled the signal
    fn unwind_frame(&mut self, ctx: &Rc<Context>, op: Op, signal: Unwind) -> Result<Option<Unwind>, JsError> {
        match op {
            Op::TryCatch { node, mark } => match signal {
                Unwind::Error(err) => {
                    let value = self.error_value(err)?;
                    self.co.truncate(mark);
                    match self.enter_catch(ctx, &node, value) {
                        Ok(()) => Ok(None),
                        Err(err) => rethrow(err),
                    }
                }
                other => Ok(Some(other)),
            },
            Op::TryFinally { node, mark } => {
                self.co.truncate(mark);
                settle_step(self.enter_finally(ctx, &node, Pending::Unwind(signal)))
            }
            Op::ForOfAfterBody(state) => self.close_iterator_on_unwind(ctx, &state.iter, signal),
            Op::ArrayPatternStep { state, .. }
            | Op::ArrayPatternValue { state, .. }
            | Op::ArrayPatternRest { state, .. }
            | Op::ArrayPatternRestValue { state, .. } => self.close_iterator_on_unwind(ctx, &state.iter, signal),
            Op::ResumeUnwind(original) => {
                // A throw already in flight wins over errors from return()
                if matches!(original, Unwind::Error(_)) || matches!(signal, Unwind::Abort) {
                    Ok(Some(original))
                } else {
                    Ok(Some(signal))
                }
            }
            // A throw out of a finalizer cannot outrun an abort
            Op::FinallyResume(Pending::Unwind(Unwind::Abort)) => Ok(Some(Unwind::Abort)),
            Op::YieldDelegate(rec) => self.yield_delegate_unwind(ctx, &rec, signal),
            Op::CallbackLoop { state, mark } => self.callback_loop_unwind(ctx, state, mark, signal),
            Op::CallShell { kind, mark } => self.call_shell_unwind(kind, mark, signal),
            Op::GeneratorShell => self.generator_shell_unwind(signal),
            Op::AsyncShell { .. } => self.async_shell_unwind(signal),
            Op::TaskShell { root } => self.task_shell_unwind(root, signal),
            Op::JobShell(settle) => self.job_shell_unwind(settle, signal),
            _ => Ok(Some(signal)),
        }
    }
}

/// Guest errors raised inside a handler keep unwinding; engine errors abort
pub(crate) fn rethrow(err: JsError) -> Result<Option<Unwind>, JsError> {
    if err.is_engine() {
        Err(err)
    } else {
        Ok(Some(Unwind::Error(err)))
    }
}

/// Map the outcome of a handler that started new work
pub(crate) fn settle_step(step: Step) -> Result<Option<Unwind>, JsError> {
    match step {
        Ok(Flow::Continue) => Ok(None),
        Ok(Flow::Suspend(_)) => Err(JsError::Engine(EngineError::UnsupportedConstruct(
            "suspension while unwinding".to_string(),
        ))),
        Err(signal) => Ok(Some(signal)),
    }
}

/// `length` and `name` of a function object
pub(crate) fn define_function_metadata(func: &ObjectRef, name: JsString, length: usize) {
    let mut f = func.borrow_mut();
    f.define_property(
        PropertyKey::from("length"),
        Property {
            configurable: true,
            ..Property::internal(JsValue::from(length))
        },
    );
    f.define_property(
        PropertyKey::from("name"),
        Property {
            configurable: true,
            ..Property::internal(JsValue::String(name))
        },
    );
}
