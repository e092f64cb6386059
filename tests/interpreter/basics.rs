//! Expressions, operators and statement completion values

use super::{eval, n, s, throws_error};
use jsweave::JsValue;

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(eval("1 + 2 * 3 - 4 / 2"), n(5.0));
    assert_eq!(eval("2 ** 3 ** 2"), n(512.0));
    assert_eq!(eval("(1 + 2) * 3"), n(9.0));
    assert_eq!(eval("7 % 3"), n(1.0));
}

#[test]
fn test_string_concatenation_coerces() {
    assert_eq!(eval("'a' + 1 + 2"), s("a12"));
    assert_eq!(eval("1 + 2 + 'a'"), s("3a"));
    assert_eq!(eval("'' + null + undefined + true"), s("nullundefinedtrue"));
}

#[test]
fn test_equality() {
    assert_eq!(eval("1 == '1'"), JsValue::Boolean(true));
    assert_eq!(eval("1 === '1'"), JsValue::Boolean(false));
    assert_eq!(eval("null == undefined"), JsValue::Boolean(true));
    assert_eq!(eval("null === undefined"), JsValue::Boolean(false));
    assert_eq!(eval("NaN === NaN"), JsValue::Boolean(false));
    assert_eq!(eval("({}) == '[object Object]'"), JsValue::Boolean(true));
}

#[test]
fn test_bitwise_and_shifts() {
    assert_eq!(eval("5 & 3"), n(1.0));
    assert_eq!(eval("5 | 3"), n(7.0));
    assert_eq!(eval("5 ^ 3"), n(6.0));
    assert_eq!(eval("~5"), n(-6.0));
    assert_eq!(eval("-16 >> 2"), n(-4.0));
    assert_eq!(eval("-1 >>> 28"), n(15.0));
    assert_eq!(eval("1 << 31"), n(-2147483648.0));
}

#[test]
fn test_logical_operators_short_circuit() {
    assert_eq!(
        eval(
            r#"
            let calls = 0;
            function hit() { calls++; return true; }
            false && hit();
            true || hit();
            null ?? hit();
            0 ?? hit();
            calls
        "#
        ),
        n(1.0)
    );
    assert_eq!(eval("0 || 'x'"), s("x"));
    assert_eq!(eval("0 ?? 'x'"), n(0.0));
}

#[test]
fn test_logical_assignment() {
    assert_eq!(
        eval(
            r#"
            let a = null, b = 1, c = 0;
            a ??= 5;
            b &&= 7;
            c ||= 9;
            [a, b, c].join()
        "#
        ),
        s("5,7,9")
    );
}

#[test]
fn test_typeof() {
    assert_eq!(eval("typeof 1"), s("number"));
    assert_eq!(eval("typeof 'a'"), s("string"));
    assert_eq!(eval("typeof undefined"), s("undefined"));
    assert_eq!(eval("typeof null"), s("object"));
    assert_eq!(eval("typeof function () {}"), s("function"));
    assert_eq!(eval("typeof Symbol()"), s("symbol"));
    assert_eq!(eval("typeof notDeclaredAnywhere"), s("undefined"));
}

#[test]
fn test_update_expressions() {
    assert_eq!(eval("let i = 1; const a = i++; const b = ++i; a * 10 + b"), n(13.0));
    assert_eq!(eval("const o = { v: 5 }; o.v--; --o.v; o.v"), n(3.0));
}

#[test]
fn test_conditional_and_sequence() {
    assert_eq!(eval("true ? 'yes' : 'no'"), s("yes"));
    assert_eq!(eval("let x = (1, 2, 3); x"), n(3.0));
}

#[test]
fn test_template_literals() {
    assert_eq!(eval("const name = 'world'; `hello ${name}, ${1 + 1}!`"), s("hello world, 2!"));
    assert_eq!(eval("`line\\none`"), s("line\none"));
    assert_eq!(eval("`${[1, 2]}`"), s("1,2"));
}

#[test]
fn test_statement_list_value() {
    assert_eq!(eval("1; if (false) {}"), n(1.0));
    assert_eq!(eval("2; var x = 5;"), n(2.0));
    assert_eq!(eval("3; { }"), n(3.0));
    assert_eq!(eval("let y = 0; while (y < 3) { y++; }"), n(2.0));
}

#[test]
fn test_optional_chaining() {
    assert_eq!(eval("const o = null; o?.a.b.c"), JsValue::Undefined);
    assert_eq!(eval("const o = { a: { b: 2 } }; o?.a?.b"), n(2.0));
    assert_eq!(eval("const o = {}; o.f?.()"), JsValue::Undefined);
    assert_eq!(eval("const o = { f() { return 4; } }; o.f?.()"), n(4.0));
}

#[test]
fn test_in_and_instanceof() {
    assert_eq!(eval("'a' in { a: 1 }"), JsValue::Boolean(true));
    assert_eq!(eval("'toString' in {}"), JsValue::Boolean(true));
    assert_eq!(eval("[] instanceof Array"), JsValue::Boolean(true));
    assert_eq!(eval("({}) instanceof Array"), JsValue::Boolean(false));
    assert!(throws_error("'a' in 5", "TypeError"));
}

#[test]
fn test_delete() {
    assert_eq!(eval("const o = { a: 1, b: 2 }; delete o.a; Object.keys(o).join()"), s("b"));
    assert_eq!(eval("delete Math.PI"), JsValue::Boolean(false));
}

#[test]
fn test_destructuring() {
    assert_eq!(
        eval(
            r#"
            const { a, b: { c = 3 } = {}, ...rest } = { a: 1, d: 4, e: 5 };
            const [x, , y = 7, ...others] = [10, 20, undefined, 30, 40];
            [a, c, Object.keys(rest).join('|'), x, y, others.length].join()
        "#
        ),
        s("1,3,d|e,10,7,2")
    );
}

#[test]
fn test_destructuring_assignment_swaps() {
    assert_eq!(eval("let a = 1, b = 2; [a, b] = [b, a]; a * 10 + b"), n(21.0));
}

#[test]
fn test_spread() {
    assert_eq!(eval("const a = [1, 2]; [0, ...a, 3].join()"), s("0,1,2,3"));
    assert_eq!(eval("Math.max(...[3, 9, 4])"), n(9.0));
    assert_eq!(eval("const o = { ...{ a: 1 }, b: 2 }; o.a + o.b"), n(3.0));
    assert_eq!(eval("[...'hé'].length"), n(2.0));
}

#[test]
fn test_getters_and_setters_in_literals() {
    assert_eq!(
        eval(
            r#"
            const o = {
                _v: 1,
                get v() { return this._v * 10; },
                set v(x) { this._v = x; },
            };
            o.v = 4;
            o.v
        "#
        ),
        n(40.0)
    );
}

#[test]
fn test_computed_and_shorthand_properties() {
    assert_eq!(eval("const k = 'x'; const x = 1; const o = { [k + '1']: 2, x }; o.x1 + o.x"), n(3.0));
}
