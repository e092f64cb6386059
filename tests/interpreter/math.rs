//! Math namespace

use super::{eval, n, s};
use jsweave::platform::NoOpRandomProvider;
use jsweave::{JsValue, Outcome, RunOptions, Runtime};

#[test]
fn test_min_max() {
    assert_eq!(eval("Math.max(1, 5, 3)"), n(5.0));
    assert_eq!(eval("Math.min(1, 5, -3)"), n(-3.0));
    assert_eq!(eval("Math.max()"), n(f64::NEG_INFINITY));
    assert_eq!(eval("Math.min()"), n(f64::INFINITY));
    assert_eq!(eval("Number.isNaN(Math.max(1, NaN, 3))"), JsValue::Boolean(true));
    assert_eq!(eval("Object.is(Math.min(0, -0), -0)"), JsValue::Boolean(true));
    assert_eq!(eval("Object.is(Math.max(-0, 0), 0)"), JsValue::Boolean(true));
    assert_eq!(eval("Math.max('7', 2)"), n(7.0));
}

#[test]
fn test_rounding() {
    assert_eq!(eval("[Math.round(2.5), Math.round(-2.5), Math.round(2.4)].join()"), s("3,-2,2"));
    assert_eq!(eval("[Math.floor(-1.5), Math.ceil(-1.5), Math.trunc(-1.5)].join()"), s("-2,-1,-1"));
    assert_eq!(eval("[Math.sign(-3), Math.sign(0), Math.abs(-4)].join()"), s("-1,0,4"));
}

#[test]
fn test_powers() {
    assert_eq!(eval("Math.pow(2, 10)"), n(1024.0));
    assert_eq!(eval("Number.isNaN(Math.pow(1, Infinity))"), JsValue::Boolean(true));
    assert_eq!(eval("Math.sqrt(16) + Math.cbrt(27)"), n(7.0));
    assert_eq!(eval("Math.hypot(3, 4)"), n(5.0));
    assert_eq!(eval("Math.hypot(NaN, Infinity)"), n(f64::INFINITY));
}

#[test]
fn test_constants_are_read_only() {
    assert_eq!(eval("Math.PI = 3; Math.PI > 3.14"), JsValue::Boolean(true));
    assert_eq!(eval("Object.keys(Math).length"), n(0.0));
}

#[test]
fn test_random_in_range() {
    assert_eq!(
        eval("let ok = true; for (let i = 0; i < 100; i++) { const r = Math.random(); if (r < 0 || r >= 1) ok = false; } ok"),
        JsValue::Boolean(true)
    );
}

#[test]
fn test_random_uses_host_provider() {
    let mut runtime = Runtime::new();
    runtime.set_random_provider(Box::new(NoOpRandomProvider));
    let Ok(report) = runtime.eval("Math.random() + Math.random()", &RunOptions::default()) else {
        panic!("eval failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(n(1.0)));
}
