//! Bindings, closures and the temporal dead zone

use super::{eval, n, run_report, s, throws_error};
use jsweave::{JsValue, Outcome, RunOptions, Runtime, RuntimeConfig};

#[test]
fn test_closure_writes_outer_binding() {
    assert_eq!(eval("let x = 1; function f() { x = 2; } f(); x;"), n(2.0));
}

#[test]
fn test_per_iteration_let_bindings() {
    assert_eq!(
        eval(
            r#"
            const fns = [];
            for (let i = 0; i < 3; i++) { fns.push(() => i); }
            fns.map(f => f()).join()
        "#
        ),
        s("0,1,2")
    );
}

#[test]
fn test_var_shares_one_binding_across_iterations() {
    assert_eq!(
        eval(
            r#"
            const fns = [];
            for (var i = 0; i < 3; i++) { fns.push(() => i); }
            fns.map(f => f()).join()
        "#
        ),
        s("3,3,3")
    );
}

#[test]
fn test_for_of_let_binding_per_iteration() {
    assert_eq!(
        eval(
            r#"
            const fns = [];
            for (const v of ['a', 'b']) fns.push(() => v);
            fns.map(f => f()).join('')
        "#
        ),
        s("ab")
    );
}

#[test]
fn test_tdz_read_before_declaration() {
    assert!(throws_error("x; let x = 1;", "ReferenceError"));
    assert!(throws_error("{ f(); let y = 1; function f() { return y; } }", "ReferenceError"));
    assert!(throws_error("const c = c + 1;", "Cannot access 'c' before initialization"));
}

#[test]
fn test_tdz_write_before_declaration() {
    assert!(throws_error("x = 2; let x = 1;", "ReferenceError"));
}

#[test]
fn test_tdz_typeof_is_not_exempt() {
    assert!(throws_error("typeof z; let z;", "ReferenceError"));
}

#[test]
fn test_tdz_on_conditional_path() {
    assert!(throws_error(
        r#"
        function f(flag) {
            if (flag) { return v; }
            let v = 1;
            return v;
        }
        f(true)
    "#,
        "ReferenceError"
    ));
}

#[test]
fn test_tdz_in_switch_cases() {
    assert!(throws_error(
        "switch (1) { case 0: let a = 1; case 1: a; }",
        "ReferenceError"
    ));
}

#[test]
fn test_let_without_initializer_is_undefined() {
    assert_eq!(eval("let u; u"), JsValue::Undefined);
}

#[test]
fn test_const_reassignment_throws() {
    assert!(throws_error("const k = 1; k = 2;", "TypeError"));
}

#[test]
fn test_var_hoisting() {
    assert_eq!(eval("const before = v; var v = 3; [before, v].join()"), s(",3"));
}

#[test]
fn test_function_hoisting() {
    assert_eq!(eval("f(); function f() { return 'hoisted'; }"), s("hoisted"));
}

#[test]
fn test_block_shadowing() {
    assert_eq!(eval("let a = 1; { let a = 2; } a"), n(1.0));
    assert_eq!(eval("var b = 1; { var b = 2; } b"), n(2.0));
}

#[test]
fn test_undeclared_assignment_sloppy_creates_global() {
    assert_eq!(eval("function f() { leaked = 5; } f(); globalThis.leaked"), n(5.0));
}

#[test]
fn test_undeclared_assignment_strict_throws() {
    assert!(throws_error("'use strict'; notDeclared = 1;", "ReferenceError"));
}

#[test]
fn test_strict_config_applies_inside_functions() {
    let mut runtime = Runtime::with_config(RuntimeConfig {
        strict: true,
        ..RuntimeConfig::default()
    });
    let source = r#"
        var seen = [];
        try { topLevelLeak = 1; } catch (e) { seen.push('top-' + e.name); }
        function assign() { functionLeak = 2; }
        try { assign(); } catch (e) { seen.push('fn-' + e.name); }
        seen.push(typeof (function () { return this; })());
        seen.join()
    "#;
    let report = run_report(&mut runtime, source, RunOptions::default());
    assert_eq!(
        report.outcome,
        Outcome::Completed(s("top-ReferenceError,fn-ReferenceError,undefined"))
    );
}

#[test]
fn test_unresolvable_read_throws() {
    assert!(throws_error("nope + 1", "nope is not defined"));
}

#[test]
fn test_closures_share_environment() {
    assert_eq!(
        eval(
            r#"
            function counter() {
                let n = 0;
                return { inc: () => ++n, get: () => n };
            }
            const c = counter();
            c.inc(); c.inc();
            c.get()
        "#
        ),
        n(2.0)
    );
}

#[test]
fn test_catch_parameter_scope() {
    assert_eq!(eval("let e = 'outer'; try { throw 'inner'; } catch (e) { e; } e"), s("outer"));
}

#[test]
fn test_global_lexical_redeclaration_is_syntax_error() {
    assert!(throws_error("let a = 1; var a = 2;", "SyntaxError"));
}

#[test]
fn test_with_statement_sloppy() {
    assert_eq!(eval("const o = { p: 4 }; let r; with (o) { r = p * 2; } r"), n(8.0));
}
