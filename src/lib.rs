//! Suspendable, embeddable interpreter for a JavaScript subset
//!
//! Every run is driven by the host under a budget. A script that loops
//! forever, awaits a promise only the host can settle, or yields from a
//! host-driven generator hands control back with an [`Outcome`] instead of
//! blocking, and a later [`Runtime::run`] continues exactly where it stopped.
//!
//! # Example
//!
//! ```
//! use jsweave::{JsValue, Outcome, RunOptions, Runtime};
//!
//! let mut runtime = Runtime::new();
//! let report = runtime.eval("let x = 1; function f() { x = 2; } f(); x", &RunOptions::default()).unwrap();
//! assert_eq!(report.outcome, Outcome::Completed(JsValue::Number(2.0)));
//! ```

pub mod ast;
pub mod completion;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod platform;
pub mod value;

pub use error::{EngineError, JsError};
pub use interpreter::Interpreter;
pub use interpreter::driver::{Outcome, RunOptions, RunReport};
pub use object::ObjectRef;
pub use value::{CheapClone, JsString, JsValue};

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use interpreter::builtins::{json_to_value, value_to_json};
use interpreter::call::ResumeKind;
use interpreter::driver::{INTERRUPT_ABORT, INTERRUPT_PAUSE};
use platform::{ConsoleProvider, RandomProvider, TimeProvider};

/// Runtime-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Guest call depth before a `RangeError` is thrown
    pub max_call_depth: usize,
    /// Step budget used when a run does not set one
    pub default_max_steps: Option<u64>,
    /// Wall-clock budget used when a run does not set one
    pub default_max_wall_time_ms: Option<u64>,
    /// Evaluate every script as strict code
    pub strict: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 10_000,
            default_max_steps: None,
            default_max_wall_time_ms: None,
            strict: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Budget applied to fields a [`RunOptions`] leaves unset
    pub fn run_defaults(&self) -> RunOptions {
        RunOptions {
            max_steps: self.default_max_steps,
            max_wall_time: self.default_max_wall_time_ms.map(Duration::from_millis),
        }
    }
}

/// Requests a pause or an abort from any thread; observed at the next step
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicU8>,
}

impl InterruptHandle {
    pub fn pause(&self) {
        self.flag.store(INTERRUPT_PAUSE, Ordering::Release);
    }

    /// Abort wins over a pending pause
    pub fn abort(&self) {
        self.flag.store(INTERRUPT_ABORT, Ordering::Release);
    }
}

/// Host-facing entry point: one realm plus its driver
pub struct Runtime {
    interpreter: Interpreter,
    config: RuntimeConfig,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            interpreter: Interpreter::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Underlying interpreter, for hosts that build values directly
    pub fn interpreter(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }

    pub fn set_console(&mut self, console: Box<dyn ConsoleProvider>) {
        self.interpreter.set_console(console);
    }

    pub fn set_time_provider(&mut self, time: Box<dyn TimeProvider>) {
        self.interpreter.set_time_provider(time);
    }

    pub fn set_random_provider(&mut self, random: Box<dyn RandomProvider>) {
        self.interpreter.set_random_provider(random);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Starting work
    // ═══════════════════════════════════════════════════════════════════════

    /// Parse and evaluate a script, then drive it within `options`
    pub fn eval(&mut self, source: &str, options: &RunOptions) -> Result<RunReport, JsError> {
        let program = parser::Parser::new(source).strict(self.config.strict).parse_program()?;
        self.interpreter.start_evaluation(program)?;
        self.run(options)
    }

    /// Make `source` importable as `specifier`
    pub fn register_module(&mut self, specifier: &str, source: &str) {
        debug!(specifier, "module registered");
        self.interpreter.modules.register(specifier, source);
    }

    /// Evaluate a registered module and its dependencies.
    /// A completed module evaluation yields `undefined`.
    pub fn eval_module(&mut self, specifier: &str, options: &RunOptions) -> Result<RunReport, JsError> {
        self.interpreter.start_module_evaluation(specifier)?;
        self.run(options)
    }

    /// Value of an export of an evaluated module
    pub fn module_export(&mut self, specifier: &str, name: &str) -> Result<JsValue, JsError> {
        self.interpreter.module_export(specifier, name)
    }

    /// Call a guest function with `this = undefined`
    pub fn call_function(&mut self, func: &JsValue, args: &[JsValue], options: &RunOptions) -> Result<RunReport, JsError> {
        self.interpreter
            .start_call(func.clone(), JsValue::Undefined, args.to_vec())?;
        self.run(options)
    }

    /// `generator.next(value)`; a suspension at `yield` reports `Outcome::Yielded`
    pub fn generator_next(&mut self, generator: &JsValue, value: JsValue, options: &RunOptions) -> Result<RunReport, JsError> {
        self.generator_step(generator, ResumeKind::Next, value, options)
    }

    pub fn generator_return(&mut self, generator: &JsValue, value: JsValue, options: &RunOptions) -> Result<RunReport, JsError> {
        self.generator_step(generator, ResumeKind::Return, value, options)
    }

    pub fn generator_throw(&mut self, generator: &JsValue, value: JsValue, options: &RunOptions) -> Result<RunReport, JsError> {
        self.generator_step(generator, ResumeKind::Throw, value, options)
    }

    fn generator_step(
        &mut self,
        generator: &JsValue,
        kind: ResumeKind,
        value: JsValue,
        options: &RunOptions,
    ) -> Result<RunReport, JsError> {
        self.interpreter.start_generator_step(generator, kind, value)?;
        self.run(options)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Driving
    // ═══════════════════════════════════════════════════════════════════════

    /// Continue after `Paused` or `Suspended`, or drain jobs queued by the host
    pub fn run(&mut self, options: &RunOptions) -> Result<RunReport, JsError> {
        let options = options.or(self.config.run_defaults());
        self.interpreter.run(&options)
    }

    /// Alias of [`run`](Self::run) for a paused task
    pub fn resume(&mut self, options: &RunOptions) -> Result<RunReport, JsError> {
        self.run(options)
    }

    /// Make the next run stop at its first step boundary
    pub fn pause(&self) {
        self.interrupt_handle().pause();
    }

    /// Cancel the current task: pending `finally` blocks run, then every
    /// queued job and parked invocation is dropped
    pub fn abort(&mut self) -> Result<RunReport, JsError> {
        let start = self.interpreter.steps;
        self.interpreter.abort()?;
        let unhandled_rejections = self.interpreter.take_unhandled_rejections();
        Ok(RunReport {
            outcome: Outcome::Aborted,
            steps: self.interpreter.steps - start,
            unhandled_rejections,
        })
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            flag: self.interpreter.interrupt.clone(),
        }
    }

    /// Whether `run` has anything left to do
    pub fn has_pending_work(&self) -> bool {
        self.interpreter.has_pending_work()
    }

    /// Called with the operand of every `yield`
    pub fn set_yield_observer(&mut self, observer: impl FnMut(&JsValue) + 'static) {
        self.interpreter.yield_observer = Some(Box::new(observer));
    }

    pub fn clear_yield_observer(&mut self) {
        self.interpreter.yield_observer = None;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Host promises
    // ═══════════════════════════════════════════════════════════════════════

    /// Pending promise the host settles later; guest code may await it
    pub fn create_promise(&mut self) -> ObjectRef {
        self.interpreter.create_promise()
    }

    /// Reactions run on the next `run`
    pub fn resolve_promise(&mut self, promise: &ObjectRef, value: JsValue) -> Result<(), JsError> {
        self.interpreter.resolve_promise(promise, value)
    }

    pub fn reject_promise(&mut self, promise: &ObjectRef, reason: JsValue) {
        self.interpreter.reject_promise(promise, reason);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Values
    // ═══════════════════════════════════════════════════════════════════════

    pub fn define_global(&mut self, name: &str, value: JsValue) {
        self.interpreter.realm.global.define_value(name, value);
    }

    /// Global property `name`, running getters; `undefined` when absent
    pub fn get_global(&mut self, name: &str) -> Result<JsValue, JsError> {
        let global = JsValue::Object(self.interpreter.realm.global.cheap_clone());
        self.interpreter.get_named(&global, name)
    }

    pub fn value_from_json(&self, json: &serde_json::Value) -> JsValue {
        json_to_value(&self.interpreter, json)
    }

    /// JSON of a guest value, following `JSON.stringify`
    pub fn value_to_json(&mut self, value: &JsValue) -> Result<serde_json::Value, JsError> {
        value_to_json(&mut self.interpreter, value)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_partial_json() {
        let Ok(config) = RuntimeConfig::from_json_str(r#"{ "default_max_steps": 500, "strict": true }"#) else {
            panic!("config should parse");
        };
        assert_eq!(config.max_call_depth, 10_000);
        assert_eq!(config.default_max_steps, Some(500));
        assert!(config.strict);
        assert_eq!(config.run_defaults().max_steps, Some(500));
        assert_eq!(config.run_defaults().max_wall_time, None);
    }

    #[test]
    fn test_config_budget_applies_to_runs() {
        let config = RuntimeConfig {
            default_max_steps: Some(100),
            ..RuntimeConfig::default()
        };
        let mut runtime = Runtime::with_config(config);
        let Ok(report) = runtime.eval("while (true) {}", &RunOptions::default()) else {
            panic!("eval failed");
        };
        assert_eq!(report.outcome, Outcome::Paused);
        assert_eq!(report.steps, 100);
    }

    #[test]
    fn test_globals_round_trip() {
        let mut runtime = Runtime::new();
        runtime.define_global("answer", JsValue::Number(42.0));
        let Ok(report) = runtime.eval("answer + 1", &RunOptions::default()) else {
            panic!("eval failed");
        };
        assert_eq!(report.outcome, Outcome::Completed(JsValue::Number(43.0)));
        assert!(matches!(runtime.get_global("missing"), Ok(JsValue::Undefined)));
    }

    #[test]
    fn test_value_json_round_trip() {
        let mut runtime = Runtime::new();
        let json = serde_json::json!({ "b": [1, true, null], "a": "x" });
        let value = runtime.value_from_json(&json);
        let Ok(back) = runtime.value_to_json(&value) else {
            panic!("conversion failed");
        };
        assert_eq!(back, json);
    }

    #[test]
    fn test_abort_when_idle() {
        let mut runtime = Runtime::new();
        let Ok(report) = runtime.abort() else {
            panic!("abort failed");
        };
        assert_eq!(report.outcome, Outcome::Aborted);
        assert!(!runtime.has_pending_work());
    }
}
