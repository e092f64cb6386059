//! Number and Boolean built-ins, numeric conversions

use super::{eval, n, s, throws_error};
use jsweave::JsValue;

#[test]
fn test_number_conversion() {
    assert_eq!(eval("Number('  42 ')"), n(42.0));
    assert_eq!(eval("Number('')"), n(0.0));
    assert_eq!(eval("Number('0x10')"), n(16.0));
    assert_eq!(eval("Number(null) + Number(true)"), n(1.0));
    assert_eq!(eval("Number.isNaN(Number('12px'))"), JsValue::Boolean(true));
    assert_eq!(eval("+[]"), n(0.0));
}

#[test]
fn test_number_to_string() {
    assert_eq!(eval("(255).toString(16)"), s("ff"));
    assert_eq!(eval("(-255).toString(2)"), s("-11111111"));
    assert_eq!(eval("(0.5).toString(2)"), s("0.1"));
    assert_eq!(eval("String(1e21)"), s("1e+21"));
    assert_eq!(eval("String(-0)"), s("0"));
    assert!(throws_error("(1).toString(1)", "RangeError"));
}

#[test]
fn test_to_fixed_precision_exponential() {
    assert_eq!(eval("(3.14159).toFixed(2)"), s("3.14"));
    assert_eq!(eval("(5).toFixed(2)"), s("5.00"));
    assert_eq!(eval("(123.456).toPrecision(4)"), s("123.5"));
    assert_eq!(eval("(12345).toExponential(2)"), s("1.23e+4"));
    assert_eq!(eval("(0.00015).toExponential(1)"), s("1.5e-4"));
}

#[test]
fn test_number_predicates() {
    assert_eq!(
        eval("[Number.isInteger(5), Number.isInteger(5.5), Number.isSafeInteger(2 ** 53), Number.isFinite('1')].join()"),
        s("true,false,false,false")
    );
}

#[test]
fn test_number_constants() {
    assert_eq!(eval("Number.MAX_SAFE_INTEGER"), n(9007199254740991.0));
    assert_eq!(eval("Number.EPSILON > 0 && Number.EPSILON < 1e-15"), JsValue::Boolean(true));
    assert_eq!(eval("Number.POSITIVE_INFINITY === Infinity"), JsValue::Boolean(true));
}

#[test]
fn test_parse_int_and_float() {
    assert_eq!(eval("parseInt('42px')"), n(42.0));
    assert_eq!(eval("parseInt('0x1A')"), n(26.0));
    assert_eq!(eval("parseInt('z', 36)"), n(35.0));
    assert_eq!(eval("Number.isNaN(parseInt('px'))"), JsValue::Boolean(true));
    assert_eq!(eval("parseFloat('3.5e2abc')"), n(350.0));
    assert_eq!(eval("parseInt === Number.parseInt"), JsValue::Boolean(true));
}

#[test]
fn test_integer_conversions_in_operators() {
    assert_eq!(eval("4294967296 | 0"), n(0.0));
    assert_eq!(eval("2147483648 | 0"), n(-2147483648.0));
    assert_eq!(eval("NaN | 0"), n(0.0));
}

#[test]
fn test_division_edge_cases() {
    assert_eq!(eval("1 / 0"), n(f64::INFINITY));
    assert_eq!(eval("-1 / 0"), n(f64::NEG_INFINITY));
    assert_eq!(eval("Object.is(0 * -1, -0)"), JsValue::Boolean(true));
    assert_eq!(eval("5 % -3"), n(2.0));
    assert_eq!(eval("-5 % 3"), n(-2.0));
}

#[test]
fn test_boolean() {
    assert_eq!(eval("[Boolean(''), Boolean('0'), Boolean(NaN), Boolean({}), !!null].join()"), s("false,true,false,true,false"));
    assert_eq!(eval("typeof new Boolean(false)"), s("object"));
    assert_eq!(eval("new Boolean(false) ? 'truthy' : 'falsy'"), s("truthy"));
    assert_eq!(eval("(true).toString()"), s("true"));
}

#[test]
fn test_number_wrapper() {
    assert_eq!(eval("new Number(5).valueOf() + 1"), n(6.0));
    assert_eq!(eval("typeof new Number(5)"), s("object"));
}
