//! Integration tests for the interpreter, organized by feature
//!
//! Every test goes through the public [`Runtime`] API. Scripts that settle
//! asynchronously are driven until the microtask queue is empty, so `eval`
//! sees the final value of top-level `await` as well.

mod array;
mod async_await;
mod basics;
mod class;
mod console;
mod control_flow;
mod driver;
mod error;
mod function;
mod generator;
mod global;
mod json;
mod math;
mod modules;
mod number;
mod object;
mod promise;
mod scope;
mod string;
mod symbol;

use jsweave::value::describe;
use jsweave::{JsError, JsValue, Outcome, RunOptions, RunReport, Runtime};

/// Evaluate a script and return its completion value.
/// Panics unless the evaluation completes.
pub fn eval(source: &str) -> JsValue {
    match eval_result(source) {
        Ok(value) => value,
        Err(err) => panic!("eval failed: {}\n{}", err, source),
    }
}

/// Evaluate a script; an uncaught throw comes back as `JsError::Thrown`
pub fn eval_result(source: &str) -> Result<JsValue, JsError> {
    let mut runtime = Runtime::new();
    let report = runtime.eval(source, &RunOptions::default())?;
    match report.outcome {
        Outcome::Completed(value) => Ok(value),
        Outcome::Rejected(reason) => Err(JsError::Thrown(reason)),
        other => Err(JsError::type_error(format!("evaluation did not finish: {:?}", other))),
    }
}

/// Evaluate a script under `options` and return the raw report
pub fn run_report(runtime: &mut Runtime, source: &str, options: RunOptions) -> RunReport {
    match runtime.eval(source, &options) {
        Ok(report) => report,
        Err(err) => panic!("eval failed: {}\n{}", err, source),
    }
}

/// Whether evaluation throws, with `error_contains` in the rendered error
pub fn throws_error(source: &str, error_contains: &str) -> bool {
    match eval_result(source) {
        Err(JsError::Thrown(value)) => describe(&value).contains(error_contains),
        Err(err) => err.to_string().contains(error_contains),
        Ok(_) => false,
    }
}

/// Shorthand for string results
pub fn s(value: &str) -> JsValue {
    JsValue::from(value)
}

pub fn n(value: f64) -> JsValue {
    JsValue::Number(value)
}
