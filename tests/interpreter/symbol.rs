//! Symbol values and the iteration protocol

use super::{eval, n, s, throws_error};
use jsweave::JsValue;

#[test]
fn test_symbol_identity() {
    assert_eq!(eval("Symbol('a') === Symbol('a')"), JsValue::Boolean(false));
    assert_eq!(eval("const x = Symbol('a'); x === x"), JsValue::Boolean(true));
    assert_eq!(eval("typeof Symbol()"), s("symbol"));
}

#[test]
fn test_description_and_to_string() {
    assert_eq!(eval("Symbol('tag').description"), s("tag"));
    assert_eq!(eval("Symbol().description"), JsValue::Undefined);
    assert_eq!(eval("Symbol('tag').toString()"), s("Symbol(tag)"));
    assert_eq!(eval("String(Symbol('x'))"), s("Symbol(x)"));
}

#[test]
fn test_symbol_is_not_a_constructor() {
    assert!(throws_error("new Symbol()", "TypeError"));
}

#[test]
fn test_implicit_string_conversion_throws() {
    assert!(throws_error("'' + Symbol('x')", "TypeError"));
    assert!(throws_error("`${Symbol('x')}`", "TypeError"));
}

#[test]
fn test_symbol_keys_are_hidden_from_enumeration() {
    assert_eq!(
        eval(
            r#"
            const k = Symbol('k');
            const o = { [k]: 1, visible: 2 };
            [o[k], Object.keys(o).join(), JSON.stringify(o)].join('|')
        "#
        ),
        s(r#"1|visible|{"visible":2}"#)
    );
}

#[test]
fn test_custom_iterable() {
    assert_eq!(
        eval(
            r#"
            const range = {
                from: 1, to: 4,
                [Symbol.iterator]() {
                    let cur = this.from, last = this.to;
                    return { next: () => cur <= last ? { value: cur++, done: false } : { value: undefined, done: true } };
                }
            };
            let total = 0;
            for (const x of range) total += x;
            [total, [...range].join(), Array.from(range).length].join('|')
        "#
        ),
        s("10|1,2,3,4|4")
    );
}

#[test]
fn test_builtin_iterators() {
    assert_eq!(eval("const it = [7, 8][Symbol.iterator](); it.next().value + it.next().value"), n(15.0));
    assert_eq!(eval("[...'héllo'].length"), n(5.0));
    assert_eq!(eval("typeof Symbol.iterator"), s("symbol"));
}

#[test]
fn test_non_iterable_spread_throws() {
    assert!(throws_error("[...{}]", "TypeError"));
    assert!(throws_error("for (const x of 5) {}", "TypeError"));
}
