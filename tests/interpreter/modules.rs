//! Host-registered modules: imports, exports, evaluation order

use super::{n, s};
use jsweave::{JsError, JsValue, Outcome, RunOptions, Runtime};

fn evaluate(runtime: &mut Runtime, specifier: &str) -> Outcome {
    match runtime.eval_module(specifier, &RunOptions::default()) {
        Ok(report) => report.outcome,
        Err(err) => panic!("eval_module({}) failed: {}", specifier, err),
    }
}

fn export(runtime: &mut Runtime, specifier: &str, name: &str) -> JsValue {
    match runtime.module_export(specifier, name) {
        Ok(value) => value,
        Err(err) => panic!("module_export({}, {}) failed: {}", specifier, name, err),
    }
}

#[test]
fn test_named_and_default_imports() {
    let mut runtime = Runtime::new();
    runtime.register_module(
        "math",
        "export function add(a, b) { return a + b; } export const PI = 3; export default function mul(a, b) { return a * b; }",
    );
    runtime.register_module(
        "main",
        "import mul, { add, PI as pi } from 'math'; export const result = add(mul(2, pi), 1);",
    );
    assert!(matches!(evaluate(&mut runtime, "main"), Outcome::Completed(_)));
    assert_eq!(export(&mut runtime, "main", "result"), n(7.0));
}

#[test]
fn test_default_expression_export() {
    let mut runtime = Runtime::new();
    runtime.register_module("config", "export default { name: 'svc', port: 80 };");
    runtime.register_module("main", "import cfg from 'config'; export const label = cfg.name + ':' + cfg.port;");
    evaluate(&mut runtime, "main");
    assert_eq!(export(&mut runtime, "main", "label"), s("svc:80"));
}

#[test]
fn test_dependency_evaluated_once_and_first() {
    let mut runtime = Runtime::new();
    let order = runtime.interpreter().create_array(Vec::new());
    runtime.define_global("order", JsValue::Object(order));
    runtime.register_module("shared", "order.push('shared'); export const v = 1;");
    runtime.register_module("a", "import { v } from 'shared'; order.push('a'); export const x = v;");
    runtime.register_module("b", "import { v } from 'shared'; order.push('b'); export const y = v;");
    runtime.register_module("main", "import { x } from 'a'; import { y } from 'b'; order.push('main');");
    evaluate(&mut runtime, "main");
    let Ok(report) = runtime.eval("order.join()", &RunOptions::default()) else {
        panic!("eval failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(s("shared,a,b,main")));
}

#[test]
fn test_imports_are_live_bindings() {
    let mut runtime = Runtime::new();
    runtime.register_module("counter", "export let count = 0; export function inc() { count++; }");
    runtime.register_module(
        "main",
        "import { count, inc } from 'counter'; const before = count; inc(); inc(); export const seen = before + '->' + count;",
    );
    evaluate(&mut runtime, "main");
    assert_eq!(export(&mut runtime, "main", "seen"), s("0->2"));
}

#[test]
fn test_assigning_import_throws() {
    let mut runtime = Runtime::new();
    runtime.register_module("dep", "export let v = 1;");
    runtime.register_module("main", "import { v } from 'dep'; v = 2;");
    assert!(matches!(evaluate(&mut runtime, "main"), Outcome::Rejected(_)));
}

#[test]
fn test_missing_export_is_syntax_error() {
    let mut runtime = Runtime::new();
    runtime.register_module("dep", "export const a = 1;");
    runtime.register_module("main", "import { b } from 'dep';");
    let Outcome::Rejected(reason) = evaluate(&mut runtime, "main") else {
        panic!("expected rejection");
    };
    let text = jsweave::value::describe(&reason);
    assert!(text.contains("SyntaxError"), "{}", text);
}

#[test]
fn test_unknown_module_is_host_error() {
    let mut runtime = Runtime::new();
    let err = runtime.eval_module("nowhere", &RunOptions::default()).err();
    assert!(matches!(err, Some(JsError::TypeError { .. })));
}

#[test]
fn test_top_level_await_in_dependency_suspends_whole_load() {
    let mut runtime = Runtime::new();
    let promise = runtime.create_promise();
    runtime.define_global("remote", JsValue::Object(promise.clone()));
    runtime.register_module("dep", "export const data = await remote;");
    runtime.register_module("main", "import { data } from 'dep'; export const doubled = data * 2;");

    assert_eq!(evaluate(&mut runtime, "main"), Outcome::Suspended);
    assert!(runtime.resolve_promise(&promise, n(21.0)).is_ok());
    let Ok(report) = runtime.run(&RunOptions::default()) else {
        panic!("run failed");
    };
    assert!(matches!(report.outcome, Outcome::Completed(_)));
    assert_eq!(export(&mut runtime, "main", "doubled"), n(42.0));
}

#[test]
fn test_module_code_is_strict() {
    let mut runtime = Runtime::new();
    runtime.register_module("main", "undeclaredInModule = 1;");
    assert!(matches!(evaluate(&mut runtime, "main"), Outcome::Rejected(_)));
}

#[test]
fn test_export_list_renames() {
    let mut runtime = Runtime::new();
    runtime.register_module("dep", "const internal = 'hidden'; export { internal as visible };");
    runtime.register_module("main", "import { visible } from 'dep'; export const out = visible;");
    evaluate(&mut runtime, "main");
    assert_eq!(export(&mut runtime, "main", "out"), s("hidden"));
}
