//! Function invocation: this binding, arguments, defaults, call/apply/bind

use super::{eval, n, s, throws_error};
use jsweave::JsValue;

#[test]
fn test_default_and_rest_parameters() {
    assert_eq!(eval("function f(a, b = a + 1, ...rest) { return [a, b, rest.length].join(); } f(1)"), s("1,2,0"));
    assert_eq!(eval("function f(a, b = a + 1, ...rest) { return [a, b, rest.length].join(); } f(1, 5, 6, 7)"), s("1,5,2"));
}

#[test]
fn test_function_length_and_name() {
    assert_eq!(eval("function f(a, b = 1, c) {} f.length"), n(1.0));
    assert_eq!(eval("function named() {} named.name"), s("named"));
    assert_eq!(eval("const anon = () => 1; anon.name"), s("anon"));
    assert_eq!(eval("const o = { m() {} }; o.m.name"), s("m"));
}

#[test]
fn test_arguments_object() {
    assert_eq!(eval("function f() { return arguments.length + ':' + arguments[1]; } f(1, 'two', 3)"), s("3:two"));
}

#[test]
fn test_arguments_are_a_snapshot() {
    assert_eq!(eval("function f(a) { arguments[0] = 9; return a; } f(1)"), n(1.0));
    assert_eq!(eval("function f(a) { a = 3; return arguments[0]; } f(1)"), n(1.0));
}

#[test]
fn test_this_binding_modes() {
    assert_eq!(eval("const o = { v: 3, get() { return this.v; } }; o.get()"), n(3.0));
    assert_eq!(eval("function f() { return this === globalThis; } f()"), JsValue::Boolean(true));
    assert_eq!(eval("function f() { 'use strict'; return this; } f()"), JsValue::Undefined);
}

#[test]
fn test_arrow_captures_this() {
    assert_eq!(
        eval(
            r#"
            const o = {
                v: 42,
                later() { return [1].map(() => this.v)[0]; },
            };
            o.later()
        "#
        ),
        n(42.0)
    );
}

#[test]
fn test_call_and_apply() {
    assert_eq!(eval("function f(a, b) { return this.x + a + b; } f.call({ x: 1 }, 2, 3)"), n(6.0));
    assert_eq!(eval("function f(a, b) { return this.x + a + b; } f.apply({ x: 1 }, [2, 3])"), n(6.0));
    assert_eq!(eval("Math.max.apply(null, [1, 5, 2])"), n(5.0));
}

#[test]
fn test_bind() {
    assert_eq!(
        eval(
            r#"
            function f(a, b, c) { return [this.tag, a, b, c].join(); }
            const g = f.bind({ tag: 't' }, 1);
            [g(2, 3), g.name, g.length].join('|')
        "#
        ),
        s("t,1,2,3|bound f|2")
    );
}

#[test]
fn test_bound_constructor_ignores_bound_this() {
    assert_eq!(
        eval(
            r#"
            function Point(x, y) { this.x = x; this.y = y; }
            const P = Point.bind({ ignored: true }, 1);
            const p = new P(2);
            [p.x, p.y, p instanceof Point].join()
        "#
        ),
        s("1,2,true")
    );
}

#[test]
fn test_constructor_function_and_prototype() {
    assert_eq!(
        eval(
            r#"
            function Animal(name) { this.name = name; }
            Animal.prototype.speak = function () { return this.name + ' speaks'; };
            new Animal('Rex').speak()
        "#
        ),
        s("Rex speaks")
    );
}

#[test]
fn test_constructor_returning_object_wins() {
    assert_eq!(eval("function F() { this.a = 1; return { b: 2 }; } const o = new F(); [o.a, o.b].join()"), s(",2"));
    assert_eq!(eval("function F() { this.a = 1; return 5; } new F().a"), n(1.0));
}

#[test]
fn test_new_target() {
    assert_eq!(eval("function F() { return new.target === F; } [F(), new F() instanceof F].join()"), s("false,true"));
}

#[test]
fn test_calling_non_function_throws() {
    assert!(throws_error("const o = {}; o.missing()", "TypeError"));
    assert!(throws_error("new (() => 1)()", "TypeError"));
}

#[test]
fn test_recursion() {
    assert_eq!(eval("function fact(n) { return n <= 1 ? 1 : n * fact(n - 1); } fact(10)"), n(3628800.0));
}

#[test]
fn test_deep_recursion_does_not_use_host_stack() {
    assert_eq!(eval("function depth(n) { return n === 0 ? 0 : 1 + depth(n - 1); } depth(5000)"), n(5000.0));
}

#[test]
fn test_call_depth_limit_is_range_error() {
    assert!(throws_error("function inf() { return inf(); } inf()", "RangeError"));
}

#[test]
fn test_call_depth_error_is_catchable() {
    assert_eq!(
        eval("function inf() { return inf(); } let r; try { inf(); } catch (e) { r = e instanceof RangeError; } r"),
        JsValue::Boolean(true)
    );
}

#[test]
fn test_immediately_invoked_function() {
    assert_eq!(eval("(function (x) { return x * 2; })(21)"), n(42.0));
}

#[test]
fn test_named_function_expression_binding() {
    assert_eq!(eval("const f = function inner(n) { return n ? inner(n - 1) + 1 : 0; }; f(4)"), n(4.0));
}

#[test]
fn test_function_to_string() {
    assert_eq!(eval("typeof (function () {}).toString()"), s("string"));
}
