//! Promise built-in and the microtask plumbing behind `await`
//!
//! Settling a promise never runs guest code directly: every reaction
//! becomes a [`Job`] on the interpreter's queue, and the driver runs jobs as
//! tasks of their own once the current task is finished.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::warn;

use crate::completion::{Resumption, Unwind};
use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::publish_constructor;
use crate::interpreter::callback::{CallbackLoop, LoopStep};
use crate::interpreter::async_fn::AsyncInvocation;
use crate::interpreter::call::Intrinsic;
use crate::interpreter::frame::{Coroutine, JobSettle, Op};
use crate::object::{JsObject, ObjectKind, ObjectRef};
use crate::value::{CheapClone, JsValue, describe};

#[derive(Debug, Clone)]
pub enum PromiseState {
    Pending,
    Fulfilled(JsValue),
    Rejected(JsValue),
}

impl PromiseState {
    pub fn label(&self) -> &'static str {
        match self {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled(_) => "fulfilled",
            PromiseState::Rejected(_) => "rejected",
        }
    }
}

pub struct PromiseData {
    pub state: PromiseState,
    reactions: Vec<Reaction>,
    /// A reaction was registered at some point
    pub handled: bool,
}

impl PromiseData {
    fn pending() -> Self {
        Self {
            state: PromiseState::Pending,
            reactions: Vec::new(),
            handled: false,
        }
    }
}

/// What runs when a promise settles
#[derive(Clone)]
pub enum Handler {
    /// Guest callback; a non-callable passes the settlement through
    Callback(JsValue),
    /// Continue an invocation parked at `await`
    Await(Rc<AsyncInvocation>),
}

struct Reaction {
    /// Promise settled with the handler's outcome
    derived: Option<ObjectRef>,
    on_fulfilled: Handler,
    on_rejected: Handler,
}

/// A queued microtask
pub enum Job {
    Reaction {
        handler: Handler,
        derived: Option<ObjectRef>,
        argument: JsValue,
        rejected: bool,
    },
    /// Adopt the state of a thenable by calling its `then`
    ResolveThenable {
        promise: ObjectRef,
        thenable: JsValue,
        then: JsValue,
    },
}

/// Shared state of one `Promise.all` call
pub struct AllElement {
    pub index: usize,
    pub values: Rc<RefCell<Vec<JsValue>>>,
    pub remaining: Rc<Cell<usize>>,
    pub promise: ObjectRef,
    pub called: Cell<bool>,
}

/// State of a promise object, `None` for anything else
pub fn promise_state(obj: &ObjectRef) -> Option<PromiseState> {
    match &obj.borrow().kind {
        ObjectKind::Promise(data) => Some(data.state.clone()),
        _ => None,
    }
}

fn is_promise(value: &JsValue) -> bool {
    value
        .as_object()
        .is_some_and(|o| matches!(o.borrow().kind, ObjectKind::Promise(_)))
}

pub fn init_promise(interp: &mut Interpreter) {
    let proto = interp.realm.promise_prototype.cheap_clone();
    interp.register_method(&proto, "then", promise_then, 2);
    interp.register_method(&proto, "catch", promise_catch, 1);
    interp.register_method(&proto, "finally", promise_finally, 1);

    let ctor = interp.create_native_loop_function("Promise", promise_called, Some(promise_construct), 1);
    publish_constructor(interp, "Promise", &ctor, &proto);
    interp.register_method(&ctor, "resolve", promise_resolve_static, 1);
    interp.register_method(&ctor, "reject", promise_reject_static, 1);
    interp.register_method(&ctor, "all", promise_all, 1);
    interp.register_method(&ctor, "race", promise_race, 1);
}

impl Interpreter {
    // ═══════════════════════════════════════════════════════════════════════
    // Promise operations
    // ═══════════════════════════════════════════════════════════════════════

    pub fn create_promise(&self) -> ObjectRef {
        ObjectRef::new(JsObject::new(
            Some(self.realm.promise_prototype.cheap_clone()),
            ObjectKind::Promise(PromiseData::pending()),
        ))
    }

    /// Resolve `promise` with `value`, adopting thenables through a job.
    /// Guest errors while looking up `then` reject the promise.
    pub fn resolve_promise(&mut self, promise: &ObjectRef, value: JsValue) -> Result<(), JsError> {
        if let JsValue::Object(obj) = &value {
            if obj.ptr_eq(promise) {
                let err = self.create_error("TypeError", "Chaining cycle detected for promise");
                self.reject_promise(promise, JsValue::Object(err));
                return Ok(());
            }
            let then = match self.get_named(&value, "then") {
                Ok(then) => then,
                Err(err) => {
                    let reason = self.error_value(err)?;
                    self.reject_promise(promise, reason);
                    return Ok(());
                }
            };
            if then.is_callable() {
                self.jobs.push_back(Job::ResolveThenable {
                    promise: promise.cheap_clone(),
                    thenable: value,
                    then,
                });
                return Ok(());
            }
        }
        self.settle_promise(promise, PromiseState::Fulfilled(value));
        Ok(())
    }

    pub fn reject_promise(&mut self, promise: &ObjectRef, reason: JsValue) {
        self.settle_promise(promise, PromiseState::Rejected(reason));
    }

    /// Settle a pending promise and queue its reactions; later settlements
    /// are ignored
    fn settle_promise(&mut self, promise: &ObjectRef, state: PromiseState) {
        let (reactions, handled) = {
            let mut obj = promise.borrow_mut();
            let ObjectKind::Promise(data) = &mut obj.kind else {
                return;
            };
            if !matches!(data.state, PromiseState::Pending) {
                return;
            }
            data.state = state.clone();
            (std::mem::take(&mut data.reactions), data.handled)
        };
        let (argument, rejected) = match state {
            PromiseState::Fulfilled(v) => (v, false),
            PromiseState::Rejected(v) => (v, true),
            PromiseState::Pending => return,
        };
        if rejected && !handled {
            self.pending_rejections.push(promise.cheap_clone());
        }
        for reaction in reactions {
            self.queue_reaction(reaction, argument.clone(), rejected);
        }
    }

    fn queue_reaction(&mut self, reaction: Reaction, argument: JsValue, rejected: bool) {
        let handler = if rejected {
            reaction.on_rejected
        } else {
            reaction.on_fulfilled
        };
        self.jobs.push_back(Job::Reaction {
            handler,
            derived: reaction.derived,
            argument,
            rejected,
        });
    }

    /// Register reactions; settled promises queue them right away
    pub(crate) fn perform_then(
        &mut self,
        promise: &ObjectRef,
        on_fulfilled: Handler,
        on_rejected: Handler,
        derived: Option<ObjectRef>,
    ) {
        let reaction = Reaction {
            derived,
            on_fulfilled,
            on_rejected,
        };
        let settled = {
            let mut obj = promise.borrow_mut();
            let ObjectKind::Promise(data) = &mut obj.kind else {
                return;
            };
            data.handled = true;
            match &data.state {
                PromiseState::Pending => {
                    data.reactions.push(reaction);
                    return;
                }
                PromiseState::Fulfilled(v) => (v.clone(), false),
                PromiseState::Rejected(v) => (v.clone(), true),
            }
        };
        self.queue_reaction(reaction, settled.0, settled.1);
    }

    /// `PromiseResolve`: promises pass through, anything else is wrapped
    pub(crate) fn promise_resolve(&mut self, value: JsValue) -> Result<ObjectRef, JsError> {
        if let JsValue::Object(obj) = &value
            && is_promise(&value)
        {
            return Ok(obj.cheap_clone());
        }
        let promise = self.create_promise();
        self.resolve_promise(&promise, value)?;
        Ok(promise)
    }

    /// Mark a promise as observed so its rejection is not reported
    pub(crate) fn mark_handled(&self, promise: &ObjectRef) {
        if let ObjectKind::Promise(data) = &mut promise.borrow_mut().kind {
            data.handled = true;
        }
    }

    /// Resolve and reject functions sharing one "already resolved" flag
    pub(crate) fn create_resolving_functions(&self, promise: &ObjectRef) -> (ObjectRef, ObjectRef, Rc<Cell<bool>>) {
        let resolved = Rc::new(Cell::new(false));
        let resolve = self.create_intrinsic(
            Intrinsic::PromiseResolver {
                promise: promise.cheap_clone(),
                resolved: resolved.clone(),
                reject: false,
            },
            1,
        );
        let reject = self.create_intrinsic(
            Intrinsic::PromiseResolver {
                promise: promise.cheap_clone(),
                resolved: resolved.clone(),
                reject: true,
            },
            1,
        );
        (resolve, reject, resolved)
    }

    pub(crate) fn promise_all_element(&mut self, element: &AllElement, value: JsValue) -> Result<(), JsError> {
        if element.called.replace(true) {
            return Ok(());
        }
        if let Some(slot) = element.values.borrow_mut().get_mut(element.index) {
            *slot = value;
        }
        let remaining = element.remaining.get().saturating_sub(1);
        element.remaining.set(remaining);
        if remaining == 0 {
            let values = element.values.borrow().clone();
            let array = self.create_array(values);
            self.resolve_promise(&element.promise, JsValue::Object(array))?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Jobs
    // ═══════════════════════════════════════════════════════════════════════

    /// Coroutine that performs `job`, or `None` when the job finished
    /// without running guest code
    pub(crate) fn job_coroutine(&mut self, job: Job) -> Result<Option<Coroutine>, JsError> {
        let ctx = self.global_ctx.clone();
        let mut co = Coroutine::default();
        match job {
            Job::Reaction {
                handler: Handler::Await(invocation),
                argument,
                rejected,
                ..
            } => {
                let resumption = if rejected {
                    Resumption::Throw(argument)
                } else {
                    Resumption::Next(argument)
                };
                co.push(&ctx, Op::JobShell(JobSettle::None));
                co.push(&ctx, Op::ResumeAsync { invocation, resumption });
            }
            Job::Reaction {
                handler: Handler::Callback(callback),
                derived,
                argument,
                rejected,
            } => {
                if !callback.is_callable() {
                    if let Some(derived) = derived {
                        if rejected {
                            self.reject_promise(&derived, argument);
                        } else {
                            self.resolve_promise(&derived, argument)?;
                        }
                    }
                    return Ok(None);
                }
                let settle = derived.map_or(JobSettle::None, JobSettle::Promise);
                co.push(&ctx, Op::JobShell(settle));
                co.push(
                    &ctx,
                    Op::Invoke {
                        func: callback,
                        this: JsValue::Undefined,
                        args: vec![argument],
                    },
                );
            }
            Job::ResolveThenable { promise, thenable, then } => {
                let (resolve, reject, resolved) = self.create_resolving_functions(&promise);
                co.push(&ctx, Op::JobShell(JobSettle::Resolvers { promise, resolved }));
                co.push(
                    &ctx,
                    Op::Invoke {
                        func: then,
                        this: thenable,
                        args: vec![JsValue::Object(resolve), JsValue::Object(reject)],
                    },
                );
            }
        }
        Ok(Some(co))
    }

    /// Job body finished normally
    pub(crate) fn job_shell_done(&mut self, settle: JobSettle) -> crate::interpreter::frame::Step {
        match settle {
            JobSettle::None => {}
            JobSettle::Promise(derived) => {
                let value = self.pop_value()?;
                self.resolve_promise(&derived, value)?;
            }
            JobSettle::Resolvers { .. } => {
                self.pop_value()?;
            }
        }
        self.end_task();
        Ok(crate::interpreter::frame::Flow::Continue)
    }

    pub(crate) fn job_shell_unwind(&mut self, settle: JobSettle, signal: Unwind) -> Result<Option<Unwind>, JsError> {
        if let Unwind::Error(err) = signal {
            let reason = self.error_value(err)?;
            match settle {
                JobSettle::Promise(derived) => self.reject_promise(&derived, reason),
                JobSettle::Resolvers { promise, resolved } => {
                    if !resolved.replace(true) {
                        self.reject_promise(&promise, reason);
                    }
                }
                JobSettle::None => warn!(reason = %describe(&reason), "error escaped a microtask"),
            }
        }
        self.end_task();
        Ok(None)
    }

    /// Remaining unhandled rejections, logged once each
    pub(crate) fn take_unhandled_rejections(&mut self) -> Vec<JsValue> {
        let mut reasons = Vec::new();
        for promise in std::mem::take(&mut self.pending_rejections) {
            let reason = match &promise.borrow().kind {
                ObjectKind::Promise(PromiseData {
                    state: PromiseState::Rejected(reason),
                    handled: false,
                    ..
                }) => Some(reason.clone()),
                _ => None,
            };
            if let Some(reason) = reason {
                warn!(reason = %describe(&reason), "unhandled promise rejection");
                self.mark_handled(&promise);
                reasons.push(reason);
            }
        }
        reasons
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Constructor and statics
// ═══════════════════════════════════════════════════════════════════════════

fn promise_called(_interp: &mut Interpreter, _this: JsValue, _args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    Err(JsError::type_error("Promise constructor cannot be invoked without 'new'"))
}

fn promise_construct(interp: &mut Interpreter, args: &[JsValue], new_target: &ObjectRef) -> Result<Box<dyn CallbackLoop>, JsError> {
    let executor = args.first().cloned().unwrap_or_default();
    if !executor.is_callable() {
        return Err(JsError::type_error(format!(
            "Promise resolver {} is not a function",
            describe(&executor)
        )));
    }
    let fallback = interp.realm.promise_prototype.cheap_clone();
    let proto = interp.prototype_from_constructor(new_target, &fallback)?;
    let promise = interp.create_promise();
    promise.borrow_mut().prototype = Some(proto);

    let (resolve, reject, resolved) = interp.create_resolving_functions(&promise);
    Ok(Box::new(RunExecutor {
        executor: Some((executor, resolve, reject)),
        promise,
        resolved,
    }))
}

/// `executor(resolve, reject)`; a throw rejects the promise unless it was
/// already resolved
struct RunExecutor {
    executor: Option<(JsValue, ObjectRef, ObjectRef)>,
    promise: ObjectRef,
    resolved: Rc<Cell<bool>>,
}

impl CallbackLoop for RunExecutor {
    fn resume(&mut self, _interp: &mut Interpreter, _result: Option<JsValue>) -> Result<LoopStep, JsError> {
        Ok(match self.executor.take() {
            Some((func, resolve, reject)) => LoopStep::Call {
                func,
                this: JsValue::Undefined,
                args: vec![JsValue::Object(resolve), JsValue::Object(reject)],
            },
            None => LoopStep::Done(JsValue::Object(self.promise.cheap_clone())),
        })
    }

    fn catch(&mut self, interp: &mut Interpreter, error: JsError) -> Result<LoopStep, JsError> {
        let reason = interp.error_value(error)?;
        if !self.resolved.replace(true) {
            interp.reject_promise(&self.promise, reason);
        }
        Ok(LoopStep::Done(JsValue::Object(self.promise.cheap_clone())))
    }
}

fn promise_resolve_static(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let value = args.first().cloned().unwrap_or_default();
    Ok(JsValue::Object(interp.promise_resolve(value)?))
}

fn promise_reject_static(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let promise = interp.create_promise();
    interp.reject_promise(&promise, args.first().cloned().unwrap_or_default());
    Ok(JsValue::Object(promise))
}

fn promise_all(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let items = interp.iterate_to_list(&args.first().cloned().unwrap_or_default())?;
    let result = interp.create_promise();
    if items.is_empty() {
        let array = interp.create_array(Vec::new());
        interp.resolve_promise(&result, JsValue::Object(array))?;
        return Ok(JsValue::Object(result));
    }

    let values = Rc::new(RefCell::new(vec![JsValue::Undefined; items.len()]));
    let remaining = Rc::new(Cell::new(items.len()));
    let (_, reject, _) = interp.create_resolving_functions(&result);
    for (index, item) in items.into_iter().enumerate() {
        let promise = interp.promise_resolve(item)?;
        let element = interp.create_intrinsic(
            Intrinsic::PromiseAllElement(AllElement {
                index,
                values: values.clone(),
                remaining: remaining.clone(),
                promise: result.cheap_clone(),
                called: Cell::new(false),
            }),
            1,
        );
        interp.perform_then(
            &promise,
            Handler::Callback(JsValue::Object(element)),
            Handler::Callback(JsValue::Object(reject.cheap_clone())),
            None,
        );
    }
    Ok(JsValue::Object(result))
}

fn promise_race(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let items = interp.iterate_to_list(&args.first().cloned().unwrap_or_default())?;
    let result = interp.create_promise();
    let (resolve, reject, _) = interp.create_resolving_functions(&result);
    for item in items {
        let promise = interp.promise_resolve(item)?;
        interp.perform_then(
            &promise,
            Handler::Callback(JsValue::Object(resolve.cheap_clone())),
            Handler::Callback(JsValue::Object(reject.cheap_clone())),
            None,
        );
    }
    Ok(JsValue::Object(result))
}

// ═══════════════════════════════════════════════════════════════════════════
// Prototype methods
// ═══════════════════════════════════════════════════════════════════════════

fn this_promise(this: &JsValue, method: &str) -> Result<ObjectRef, JsError> {
    match this {
        JsValue::Object(obj) if is_promise(this) => Ok(obj.cheap_clone()),
        _ => Err(JsError::type_error(format!(
            "Method Promise.prototype.{} called on incompatible receiver {}",
            method,
            describe(this)
        ))),
    }
}

fn then_with(interp: &mut Interpreter, promise: &ObjectRef, on_fulfilled: JsValue, on_rejected: JsValue) -> JsValue {
    let derived = interp.create_promise();
    interp.perform_then(
        promise,
        Handler::Callback(on_fulfilled),
        Handler::Callback(on_rejected),
        Some(derived.cheap_clone()),
    );
    JsValue::Object(derived)
}

fn promise_then(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let promise = this_promise(&this, "then")?;
    let on_fulfilled = args.first().cloned().unwrap_or_default();
    let on_rejected = args.get(1).cloned().unwrap_or_default();
    Ok(then_with(interp, &promise, on_fulfilled, on_rejected))
}

fn promise_catch(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let promise = this_promise(&this, "catch")?;
    let on_rejected = args.first().cloned().unwrap_or_default();
    Ok(then_with(interp, &promise, JsValue::Undefined, on_rejected))
}

fn promise_finally(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let promise = this_promise(&this, "finally")?;
    let on_finally = args.first().cloned().unwrap_or_default();
    let fulfilled = interp.create_intrinsic(
        Intrinsic::PromiseFinally {
            on_finally: on_finally.clone(),
            reject: false,
        },
        1,
    );
    let rejected = interp.create_intrinsic(Intrinsic::PromiseFinally { on_finally, reject: true }, 1);
    Ok(then_with(
        interp,
        &promise,
        JsValue::Object(fulfilled),
        JsValue::Object(rejected),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;

    #[test]
    fn test_settles_once() {
        let mut interp = Interpreter::new(&RuntimeConfig::default());
        let promise = interp.create_promise();
        interp.reject_promise(&promise, JsValue::from(1));
        interp.resolve_promise(&promise, JsValue::from(2)).ok();
        assert!(matches!(promise_state(&promise), Some(PromiseState::Rejected(JsValue::Number(n))) if n == 1.0));
        assert_eq!(interp.take_unhandled_rejections().len(), 1);
        assert!(interp.take_unhandled_rejections().is_empty());
    }

    #[test]
    fn test_reactions_are_queued_not_run() {
        let mut interp = Interpreter::new(&RuntimeConfig::default());
        let promise = interp.create_promise();
        let derived = interp.create_promise();
        interp.perform_then(
            &promise,
            Handler::Callback(JsValue::Undefined),
            Handler::Callback(JsValue::Undefined),
            Some(derived.cheap_clone()),
        );
        interp.resolve_promise(&promise, JsValue::from(3)).ok();
        assert_eq!(interp.jobs.len(), 1);
        assert!(matches!(promise_state(&derived), Some(PromiseState::Pending)));
    }
}
