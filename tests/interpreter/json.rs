//! JSON.stringify and JSON.parse

use super::{eval, n, s, throws_error};
use jsweave::{JsValue, RunOptions, Runtime};

#[test]
fn test_stringify_basic() {
    assert_eq!(eval(r#"JSON.stringify({ a: 1, b: [true, null, 'x'] })"#), s(r#"{"a":1,"b":[true,null,"x"]}"#));
    assert_eq!(eval("JSON.stringify('a\"b\\n')"), s(r#""a\"b\n""#));
    assert_eq!(eval("JSON.stringify(undefined)"), JsValue::Undefined);
    assert_eq!(eval("JSON.stringify([NaN, Infinity])"), s("[null,null]"));
}

#[test]
fn test_stringify_skips_unserializable_members() {
    assert_eq!(
        eval("JSON.stringify({ a: undefined, f() {}, s: Symbol('x'), b: 2 })"),
        s(r#"{"b":2}"#)
    );
    assert_eq!(eval("JSON.stringify([undefined, function () {}])"), s("[null,null]"));
}

#[test]
fn test_stringify_indent() {
    assert_eq!(
        eval("JSON.stringify({ a: [1, 2], b: {} }, null, 2)"),
        s("{\n  \"a\": [\n    1,\n    2\n  ],\n  \"b\": {}\n}")
    );
    assert_eq!(eval("JSON.stringify([1], null, '--')"), s("[\n--1\n]"));
}

#[test]
fn test_stringify_replacers() {
    assert_eq!(
        eval("JSON.stringify({ a: 1, b: 'x', c: 3 }, (k, v) => typeof v === 'number' ? v * 10 : v)"),
        s(r#"{"a":10,"b":"x","c":30}"#)
    );
    assert_eq!(eval("JSON.stringify({ a: 1, b: 2, c: 3 }, ['c', 'a'])"), s(r#"{"c":3,"a":1}"#));
}

#[test]
fn test_stringify_to_json() {
    assert_eq!(
        eval("JSON.stringify({ when: { toJSON(key) { return 'at:' + key; } } })"),
        s(r#"{"when":"at:when"}"#)
    );
}

#[test]
fn test_stringify_cycle_throws() {
    assert!(throws_error("const o = {}; o.self = o; JSON.stringify(o)", "TypeError"));
    // Shared but acyclic references are fine
    assert_eq!(eval("const x = [1]; JSON.stringify([x, x])"), s("[[1],[1]]"));
}

#[test]
fn test_parse() {
    assert_eq!(eval(r#"JSON.parse('{"a":[1,2,{"b":null}]}').a[2].b"#), JsValue::Null);
    assert_eq!(eval(r#"Object.keys(JSON.parse('{"z":1,"a":2}')).join()"#), s("z,a"));
    assert_eq!(eval(r#"JSON.parse('"\\u0041"')"#), s("A"));
    assert_eq!(eval("JSON.parse(' 42 ')"), n(42.0));
}

#[test]
fn test_parse_reviver() {
    assert_eq!(
        eval(
            r#"
            const seen = [];
            const v = JSON.parse('{"a":1,"b":{"c":2}}', (k, v) => {
                seen.push(k);
                return typeof v === 'number' ? v + 1 : v;
            });
            [v.a, v.b.c, seen.join()].join('|')
        "#
        ),
        s("2|3|a,c,b,")
    );
    assert_eq!(eval(r#"'a' in JSON.parse('{"a":1,"b":2}', (k, v) => k === 'a' ? undefined : v)"#), JsValue::Boolean(false));
}

#[test]
fn test_parse_errors() {
    assert!(throws_error("JSON.parse('{a:1}')", "SyntaxError"));
    assert!(throws_error("JSON.parse('')", "SyntaxError"));
    assert_eq!(
        eval("try { JSON.parse('[1,'); } catch (e) { e instanceof SyntaxError }"),
        JsValue::Boolean(true)
    );
}

#[test]
fn test_host_json_conversion() {
    let mut runtime = Runtime::new();
    let input = runtime.value_from_json(&serde_json::json!({ "items": [1, 2, 3], "name": "n" }));
    runtime.define_global("input", input);
    let Ok(_) = runtime.eval(
        "var output = { total: input.items.reduce((a, b) => a + b, 0), name: input.name, skip: undefined }",
        &RunOptions::default(),
    ) else {
        panic!("eval failed");
    };
    let Ok(output) = runtime.get_global("output") else {
        panic!("missing output");
    };
    let Ok(json) = runtime.value_to_json(&output) else {
        panic!("conversion failed");
    };
    assert_eq!(json, serde_json::json!({ "total": 6, "name": "n" }));
}
