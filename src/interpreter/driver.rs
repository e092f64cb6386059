//! Host driver
//!
//! A host request (evaluate a script or module, call a function, step a
//! generator) becomes a root task. [`Interpreter::run`] steps the running
//! coroutine one frame at a time, swaps activations at `yield`/`await`,
//! drains the microtask queue in FIFO order, and stops when the root task
//! has an outcome, the budget runs out, or an interrupt arrives.

use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ast::Program;
use crate::completion::{SuspensionCommand, Unwind};
use crate::error::{EngineError, JsError};
use crate::value::{CheapClone, JsString, JsValue};

use super::Interpreter;
use super::async_fn::{AsyncInvocation, InvocationState};
use super::builtins::promise::{PromiseState, promise_state};
use super::call::ResumeKind;
use super::frame::{Activation, ActivationKind, Context, Coroutine, Flow, Op, Step};
use super::hoist::ScopeInfo;

pub(crate) const INTERRUPT_NONE: u8 = 0;
pub(crate) const INTERRUPT_PAUSE: u8 = 1;
pub(crate) const INTERRUPT_ABORT: u8 = 2;

/// Per-run budget. `None` fields fall back to the runtime configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Frame steps before the run pauses
    pub max_steps: Option<u64>,
    /// Wall-clock time before the run pauses
    pub max_wall_time: Option<Duration>,
}

impl RunOptions {
    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_max_wall_time(mut self, time: Duration) -> Self {
        self.max_wall_time = Some(time);
        self
    }

    /// Fill unset fields from `defaults`
    pub fn or(self, defaults: RunOptions) -> Self {
        Self {
            max_steps: self.max_steps.or(defaults.max_steps),
            max_wall_time: self.max_wall_time.or(defaults.max_wall_time),
        }
    }
}

/// Budget of the run in progress. Nested runs check it too, since they
/// cannot return to the driver loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunLimits {
    /// Step counter when the run started
    start: u64,
    max_steps: Option<u64>,
    deadline: Option<Instant>,
}

impl RunLimits {
    fn exhausted(&self, steps: u64) -> bool {
        self.max_steps.is_some_and(|max| steps - self.start >= max)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Nested runs allowed on the host stack at once
const MAX_NESTED_RUNS: usize = 32;

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The root task finished with a value and the microtask queue is empty
    Completed(JsValue),
    /// The root task threw, or the evaluation's promise was rejected
    Rejected(JsValue),
    /// Budget exhausted or pause requested; `run` continues from here
    Paused,
    /// Nothing runnable: the evaluation waits on a promise only the host can settle
    Suspended,
    /// A host-driven generator step produced a value
    Yielded(JsValue),
    Aborted,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: Outcome,
    /// Frame steps executed by this run
    pub steps: u64,
    /// Rejections still unhandled after the microtask queue drained
    pub unhandled_rejections: Vec<JsValue>,
}

/// Kind of host request the root task serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// Script or module; the task result is the evaluation's promise
    Evaluation,
    Call,
    /// Generator method call; the task result is an iterator result
    GeneratorStep,
}

impl Interpreter {
    // ═══════════════════════════════════════════════════════════════════════
    // Root tasks
    // ═══════════════════════════════════════════════════════════════════════

    /// Queue a script evaluation as the root task
    pub fn start_evaluation(&mut self, program: Program) -> Result<(), JsError> {
        self.begin_task(RootKind::Evaluation, Op::StartScript(Rc::new(program)))
    }

    /// Queue evaluation of a registered module and its dependencies
    pub fn start_module_evaluation(&mut self, specifier: &str) -> Result<(), JsError> {
        self.ensure_idle()?;
        let instance = self.load_module(specifier)?;
        self.begin_task(RootKind::Evaluation, Op::StartModule(instance))
    }

    /// Queue a call of `func` as the root task
    pub fn start_call(&mut self, func: JsValue, this: JsValue, args: Vec<JsValue>) -> Result<(), JsError> {
        self.begin_task(RootKind::Call, Op::Invoke { func, this, args })
    }

    /// Queue `next`/`return`/`throw` on a generator object
    pub fn start_generator_step(&mut self, generator: &JsValue, kind: ResumeKind, value: JsValue) -> Result<(), JsError> {
        self.ensure_idle()?;
        let method = self.get_named(generator, kind.method_name())?;
        self.begin_task(
            RootKind::GeneratorStep,
            Op::Invoke {
                func: method,
                this: generator.clone(),
                args: vec![value],
            },
        )
    }

    fn ensure_idle(&self) -> Result<(), JsError> {
        if self.root.is_some() || !matches!(self.activation, ActivationKind::Idle) {
            return Err(EngineError::TaskInProgress.into());
        }
        Ok(())
    }

    fn begin_task(&mut self, root: RootKind, op: Op) -> Result<(), JsError> {
        self.ensure_idle()?;
        let ctx = self.global_ctx.clone();
        let mut co = Coroutine::default();
        co.push(&ctx, Op::TaskShell { root: true });
        co.push(&ctx, op);
        self.co = co;
        self.activation = ActivationKind::Task;
        self.root = Some(root);
        self.task_result = None;
        debug!(?root, "root task queued");
        Ok(())
    }

    /// Root task of a script: an async invocation over the body, so
    /// top-level `await` suspends the evaluation rather than the host
    pub(crate) fn start_script(&mut self, ctx: &Rc<Context>, program: Rc<Program>) -> Step {
        let promise = self.create_promise();
        self.mark_handled(&promise);
        let id = self.fresh_invocation_id();
        let invocation = Rc::new(AsyncInvocation::new(id, promise));
        invocation.set_state(InvocationState::Started);

        let global_env = self.realm.global_env.cheap_clone();
        let script_ctx = Context::new(global_env.cheap_clone(), global_env, program.strict || ctx.strict);
        let mut co = Coroutine::default();
        co.push(&script_ctx, Op::AsyncShell { script: true });
        co.push(&script_ctx, Op::ScriptBody(program));
        self.enter_activation(
            ActivationKind::Async {
                invocation,
                deliver_promise: true,
            },
            co,
        );
        Ok(Flow::Continue)
    }

    /// Global declaration instantiation, then the statements
    pub(crate) fn script_body(&mut self, ctx: &Rc<Context>, program: &Rc<Program>) -> Step {
        let info = ScopeInfo::for_program(program);
        let global_env = self.realm.global_env.cheap_clone();
        let Some(global) = global_env.as_global() else {
            return Err(JsError::internal_error("global environment without a global record").into());
        };
        let lexical: Vec<JsString> = info.lexical.iter().map(|l| l.name.cheap_clone()).collect();
        global.check_declarations(&lexical, &info.var_scoped_names())?;

        for func in &info.functions {
            let Some(id) = &func.id else {
                continue;
            };
            let fobj = self.instantiate_function(&global_env, func, id.name.cheap_clone(), None);
            global.create_function_binding(id.name.cheap_clone(), JsValue::Object(fobj));
        }
        for name in &info.var_names {
            global.create_var_binding(name.cheap_clone(), false);
        }
        for name in &info.lexical {
            if name.constant {
                global_env.create_immutable_binding(name.name.cheap_clone(), true);
            } else {
                global_env.create_mutable_binding(name.name.cheap_clone(), false);
            }
        }

        self.co.completion = crate::completion::Completion::empty();
        self.co.push(
            ctx,
            Op::StmtList {
                body: program.body.clone(),
                index: 0,
                value: None,
            },
        );
        Ok(Flow::Continue)
    }

    /// Bottom of a task finished normally
    pub(crate) fn task_shell_done(&mut self, root: bool) -> Step {
        let value = self.co.values.pop().unwrap_or_default();
        if root {
            self.task_result = Some(Ok(value));
        } else {
            self.nested_result = Some(Ok(value));
        }
        self.end_task();
        Ok(Flow::Continue)
    }

    pub(crate) fn task_shell_unwind(&mut self, root: bool, signal: Unwind) -> Result<Option<Unwind>, JsError> {
        let result = match signal {
            Unwind::Return(v) => Some(Ok(v)),
            Unwind::Error(err) => Some(Err(self.error_value(err)?)),
            Unwind::Abort => None,
        };
        if root {
            self.task_result = result;
        } else {
            self.nested_result = result;
        }
        self.end_task();
        Ok(None)
    }

    /// The bottom activation finished: nothing is running
    pub(crate) fn end_task(&mut self) {
        self.activation = ActivationKind::Idle;
        self.co = Coroutine::default();
        self.callers.clear();
        self.callers_depth = 0;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Activations
    // ═══════════════════════════════════════════════════════════════════════

    /// Make `co` the running coroutine; the current one waits as its caller
    pub(crate) fn enter_activation(&mut self, kind: ActivationKind, co: Coroutine) {
        let caller_co = std::mem::replace(&mut self.co, co);
        let caller_kind = std::mem::replace(&mut self.activation, kind);
        self.callers_depth += caller_co.depth;
        self.callers.push(Activation {
            kind: caller_kind,
            co: caller_co,
        });
    }

    /// Return to the caller; hands back the finished or parked coroutine
    pub(crate) fn finish_activation(&mut self) -> Result<Coroutine, JsError> {
        let Some(caller) = self.callers.pop() else {
            return Err(JsError::internal_error("activation without a caller"));
        };
        self.callers_depth = self.callers_depth.saturating_sub(caller.co.depth);
        self.activation = caller.kind;
        Ok(std::mem::replace(&mut self.co, caller.co))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Driving
    // ═══════════════════════════════════════════════════════════════════════

    /// Drive the current task and the microtask queue within `options`
    pub fn run(&mut self, options: &RunOptions) -> Result<RunReport, JsError> {
        let idle = matches!(self.activation, ActivationKind::Idle);
        if self.root.is_none() && idle && self.jobs.is_empty() {
            return Err(EngineError::NoActiveExecution.into());
        }
        let start = self.steps;
        let deadline = options.max_wall_time.map(|limit| Instant::now() + limit);
        debug!(
            max_steps = ?options.max_steps,
            max_wall_time = ?options.max_wall_time,
            queued_jobs = self.jobs.len(),
            "run started"
        );

        let limits = RunLimits {
            start,
            max_steps: options.max_steps,
            deadline,
        };
        self.limits = Some(limits);
        let driven = self.drive(limits);
        self.limits = None;
        let outcome = match driven {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!(error = %err, "run failed");
                self.reset();
                return Err(err);
            }
        };
        let unhandled_rejections = if outcome == Outcome::Paused {
            Vec::new()
        } else {
            self.take_unhandled_rejections()
        };
        let steps = self.steps - start;
        debug!(?outcome, steps, "run finished");
        Ok(RunReport {
            outcome,
            steps,
            unhandled_rejections,
        })
    }

    fn drive(&mut self, limits: RunLimits) -> Result<Outcome, JsError> {
        let mut drained = 0usize;
        loop {
            match self.interrupt.swap(INTERRUPT_NONE, Ordering::AcqRel) {
                INTERRUPT_PAUSE => {
                    debug!("pause requested");
                    return Ok(Outcome::Paused);
                }
                INTERRUPT_ABORT => {
                    self.abort()?;
                    return Ok(Outcome::Aborted);
                }
                _ => {}
            }

            if matches!(self.activation, ActivationKind::Idle) {
                let Some(job) = self.jobs.pop_front() else {
                    if drained > 0 {
                        debug!(jobs = drained, "microtask queue drained");
                    }
                    return self.root_outcome();
                };
                drained += 1;
                if let Some(co) = self.job_coroutine(job)? {
                    self.co = co;
                    self.activation = ActivationKind::Task;
                }
                continue;
            }

            if limits.exhausted(self.steps) {
                debug!(steps = self.steps - limits.start, "budget exhausted");
                return Ok(Outcome::Paused);
            }
            self.advance()?;
        }
    }

    /// Perform one frame of the running coroutine
    fn advance(&mut self) -> Result<(), JsError> {
        let Some(frame) = self.co.frames.pop() else {
            return Err(JsError::internal_error("running coroutine has no frames"));
        };
        self.steps += 1;
        let advanced = match self.step(frame) {
            Ok(Flow::Continue) => Ok(()),
            Ok(Flow::Suspend(command)) => {
                // An aborting task must not park: unwind from the suspension point
                if self.aborting && self.nested_runs == 0 {
                    return self.unwind(Unwind::Abort);
                }
                let suspended = match command {
                    SuspensionCommand::Await(value) => self.suspend_await(value),
                    SuspensionCommand::Yield(value) => self.suspend_yield(value),
                };
                match suspended {
                    Ok(()) => Ok(()),
                    Err(err) => self.unwind(Unwind::Error(err)),
                }
            }
            Err(signal) => self.unwind(signal),
        };
        match advanced {
            // The interrupt flag holds the abort; the loop above acts on it
            Err(JsError::Engine(EngineError::Interrupted)) => Ok(()),
            other => other,
        }
    }

    /// Step until the bottom activation ends; budgets do not apply
    fn run_to_idle(&mut self) -> Result<(), JsError> {
        while !matches!(self.activation, ActivationKind::Idle) {
            self.advance()?;
        }
        Ok(())
    }

    /// Outcome once nothing is runnable
    fn root_outcome(&mut self) -> Result<Outcome, JsError> {
        let Some(root) = self.root else {
            return Ok(Outcome::Completed(JsValue::Undefined));
        };
        let Some(result) = self.task_result.clone() else {
            return Err(JsError::internal_error("root task ended without a result"));
        };
        let settled = match (root, result) {
            (_, Err(thrown)) => Err(thrown),
            (RootKind::Call, Ok(value)) => Ok(value),
            (RootKind::Evaluation, Ok(JsValue::Object(promise))) => match promise_state(&promise) {
                Some(PromiseState::Fulfilled(value)) => Ok(value),
                Some(PromiseState::Rejected(reason)) => Err(reason),
                Some(PromiseState::Pending) => {
                    debug!(parked = self.parked.len(), "evaluation suspended");
                    return Ok(Outcome::Suspended);
                }
                None => return Err(JsError::internal_error("evaluation result is not a promise")),
            },
            (RootKind::Evaluation, Ok(_)) => {
                return Err(JsError::internal_error("evaluation result is not a promise"));
            }
            (RootKind::GeneratorStep, Ok(result)) => {
                self.root = None;
                self.task_result = None;
                let done = self.get_named(&result, "done")?.to_boolean();
                let value = self.get_named(&result, "value")?;
                return Ok(if done {
                    Outcome::Completed(value)
                } else {
                    Outcome::Yielded(value)
                });
            }
        };
        self.root = None;
        self.task_result = None;
        Ok(match settled {
            Ok(value) => Outcome::Completed(value),
            Err(reason) => Outcome::Rejected(reason),
        })
    }

    /// Drop the running task after an engine error
    fn reset(&mut self) {
        self.end_task();
        self.root = None;
        self.task_result = None;
        self.aborting = false;
        self.jobs.clear();
        self.parked.clear();
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Nested runs and abort
    // ═══════════════════════════════════════════════════════════════════════

    /// Run `op` to completion on a fresh task while the current one waits.
    ///
    /// The host stack holds the native that asked for the run, so the task
    /// cannot pause here. An abort request, or a budget that runs out, unwinds
    /// the nested task with `Unwind::Abort` and fails with
    /// `EngineError::Interrupted`; the enclosing run then aborts the task.
    pub(crate) fn run_nested(&mut self, op: Op) -> Result<JsValue, JsError> {
        if self.nested_runs >= MAX_NESTED_RUNS {
            return Err(JsError::range_error("Maximum call stack size exceeded"));
        }
        let ctx = self.global_ctx.clone();
        let mut co = Coroutine::default();
        co.push(&ctx, Op::TaskShell { root: false });
        co.push(&ctx, op);

        let depth = self.call_depth();
        let saved_co = std::mem::replace(&mut self.co, co);
        let saved_activation = std::mem::replace(&mut self.activation, ActivationKind::Task);
        let saved_callers = std::mem::take(&mut self.callers);
        let saved_callers_depth = std::mem::replace(&mut self.callers_depth, depth);
        self.nested_result = None;
        self.nested_runs += 1;

        let ran = self.run_nested_to_idle();

        self.nested_runs -= 1;
        self.co = saved_co;
        self.activation = saved_activation;
        self.callers = saved_callers;
        self.callers_depth = saved_callers_depth;
        ran?;

        match self.nested_result.take() {
            Some(Ok(value)) => Ok(value),
            Some(Err(thrown)) => Err(JsError::Thrown(thrown)),
            None => Err(JsError::internal_error("nested run ended without a result")),
        }
    }

    fn run_nested_to_idle(&mut self) -> Result<(), JsError> {
        while !matches!(self.activation, ActivationKind::Idle) {
            if self.nested_must_stop() {
                trace!(nested = self.nested_runs, "unwinding nested run");
                self.aborting = true;
                let unwound = self.unwind(Unwind::Abort).and_then(|()| self.run_to_idle());
                self.aborting = false;
                unwound?;
                return Err(EngineError::Interrupted.into());
            }
            self.advance()?;
        }
        Ok(())
    }

    /// Abort requested, or the budget ran out inside a run. Not checked while
    /// an abort is already unwinding or outside `run`.
    fn nested_must_stop(&mut self) -> bool {
        let Some(limits) = self.limits else {
            return false;
        };
        if self.aborting {
            return false;
        }
        if self.interrupt.load(Ordering::Acquire) == INTERRUPT_ABORT {
            return true;
        }
        if limits.exhausted(self.steps) {
            debug!(
                steps = self.steps - limits.start,
                "budget exhausted inside a native callback; aborting the task"
            );
            self.interrupt.store(INTERRUPT_ABORT, Ordering::Release);
            return true;
        }
        false
    }

    /// Unwind every live activation with `Unwind::Abort` so `finally`
    /// blocks run, then drop queued jobs
    pub(crate) fn abort(&mut self) -> Result<(), JsError> {
        debug!(parked = self.parked.len(), jobs = self.jobs.len(), "abort requested");
        self.aborting = true;
        let result = self.abort_activations();
        self.aborting = false;
        self.jobs.clear();
        self.parked.clear();
        self.root = None;
        self.task_result = None;
        if result.is_err() {
            self.end_task();
        }
        result
    }

    fn abort_activations(&mut self) -> Result<(), JsError> {
        if !matches!(self.activation, ActivationKind::Idle) {
            self.unwind(Unwind::Abort)?;
            self.run_to_idle()?;
        }
        while let Some(invocation) = self.parked.pop() {
            trace!(invocation = invocation.id, "aborting parked invocation");
            let ctx = self.global_ctx.clone();
            let mut co = Coroutine::default();
            co.push(&ctx, Op::TaskShell { root: false });
            co.push(&ctx, Op::AbortAsync(invocation));
            self.co = co;
            self.activation = ActivationKind::Task;
            self.run_to_idle()?;
        }
        Ok(())
    }

    /// Whether a root task exists that `run` can continue
    pub fn has_pending_work(&self) -> bool {
        self.root.is_some() || !matches!(self.activation, ActivationKind::Idle) || !self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;
    use crate::parser::Parser;

    fn interpreter() -> Interpreter {
        Interpreter::new(&RuntimeConfig::default())
    }

    fn evaluate(interp: &mut Interpreter, source: &str, options: RunOptions) -> RunReport {
        let Ok(program) = Parser::new(source).parse_program() else {
            panic!("parse failed: {}", source);
        };
        let Ok(()) = interp.start_evaluation(program) else {
            panic!("could not start evaluation");
        };
        match interp.run(&options) {
            Ok(report) => report,
            Err(err) => panic!("run failed: {}", err),
        }
    }

    #[test]
    fn test_run_without_task() {
        let mut interp = interpreter();
        let err = interp.run(&RunOptions::default()).err();
        assert!(matches!(err, Some(JsError::Engine(EngineError::NoActiveExecution))));
    }

    #[test]
    fn test_second_task_rejected_while_paused() {
        let mut interp = interpreter();
        let report = evaluate(&mut interp, "while (true) {}", RunOptions::default().with_max_steps(50));
        assert_eq!(report.outcome, Outcome::Paused);
        let Ok(program) = Parser::new("1").parse_program() else {
            panic!("parse failed");
        };
        let err = interp.start_evaluation(program).err();
        assert!(matches!(err, Some(JsError::Engine(EngineError::TaskInProgress))));
    }

    #[test]
    fn test_step_budget_counts_steps() {
        let mut interp = interpreter();
        let report = evaluate(&mut interp, "var n = 0; while (true) { n++; }", RunOptions::default().with_max_steps(200));
        assert_eq!(report.outcome, Outcome::Paused);
        assert_eq!(report.steps, 200);
    }

    #[test]
    fn test_interrupt_pause_then_resume() {
        let mut interp = interpreter();
        interp.interrupt.store(INTERRUPT_PAUSE, Ordering::Release);
        let report = evaluate(&mut interp, "40 + 2", RunOptions::default());
        assert_eq!(report.outcome, Outcome::Paused);
        assert_eq!(report.steps, 0);
        let Ok(report) = interp.run(&RunOptions::default()) else {
            panic!("resume failed");
        };
        assert_eq!(report.outcome, Outcome::Completed(JsValue::Number(42.0)));
    }

    #[test]
    fn test_run_options_fall_back() {
        let defaults = RunOptions::default().with_max_steps(10);
        let options = RunOptions::default().with_max_wall_time(Duration::from_millis(5)).or(defaults);
        assert_eq!(options.max_steps, Some(10));
        assert_eq!(options.max_wall_time, Some(Duration::from_millis(5)));
    }
}
