//! Global object and global functions

use super::{eval, n, s};
use jsweave::{JsValue, Outcome, RunOptions, Runtime};

#[test]
fn test_global_this() {
    assert_eq!(eval("globalThis.Math === Math"), JsValue::Boolean(true));
    assert_eq!(eval("globalThis.globalThis === globalThis"), JsValue::Boolean(true));
}

#[test]
fn test_var_and_function_declarations_live_on_the_global_object() {
    assert_eq!(
        eval("var v = 1; function f() {} let l = 2; [globalThis.v, typeof globalThis.f, globalThis.l].join()"),
        s("1,function,")
    );
    assert_eq!(eval("globalThis.late = 5; late"), n(5.0));
}

#[test]
fn test_global_value_properties_are_read_only() {
    assert_eq!(eval("NaN = 1; undefined = 2; Infinity = 3; [NaN, undefined, Infinity].join()"), s("NaN,,Infinity"));
}

#[test]
fn test_is_nan_and_is_finite_coerce() {
    assert_eq!(eval("[isNaN('abc'), isNaN('12'), Number.isNaN('abc')].join()"), s("true,false,false"));
    assert_eq!(eval("[isFinite('12'), isFinite(Infinity), isFinite(null)].join()"), s("true,false,true"));
}

#[test]
fn test_parse_functions_are_shared_with_number() {
    assert_eq!(eval("parseInt === Number.parseInt && parseFloat === Number.parseFloat"), JsValue::Boolean(true));
    assert_eq!(eval("parseInt('  -17.9')"), n(-17.0));
}

#[test]
fn test_globals_persist_across_evaluations() {
    let mut runtime = Runtime::new();
    let options = RunOptions::default();
    let Ok(_) = runtime.eval("var counter = 1; let shared = 10;", &options) else {
        panic!("first eval failed");
    };
    let Ok(report) = runtime.eval("counter += 1; shared + counter", &options) else {
        panic!("second eval failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(n(12.0)));
}

#[test]
fn test_host_defined_global() {
    let mut runtime = Runtime::new();
    runtime.define_global("config", JsValue::from("prod"));
    let Ok(report) = runtime.eval("config.toUpperCase()", &RunOptions::default()) else {
        panic!("eval failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(s("PROD")));
}
