//! String built-in

use super::{eval, n, s, throws_error};
use jsweave::JsValue;

#[test]
fn test_length_counts_utf16_units() {
    assert_eq!(eval("'abc'.length"), n(3.0));
    assert_eq!(eval("'😀'.length"), n(2.0));
    assert_eq!(eval("[...'😀'].length"), n(1.0));
}

#[test]
fn test_char_access() {
    assert_eq!(eval("'hello'.charAt(1)"), s("e"));
    assert_eq!(eval("'hello'[4]"), s("o"));
    assert_eq!(eval("'hello'.charCodeAt(0)"), n(104.0));
    assert_eq!(eval("'😀'.codePointAt(0)"), n(128512.0));
    assert_eq!(eval("'abc'.at(-1)"), s("c"));
    assert_eq!(eval("'abc'.charAt(10)"), s(""));
}

#[test]
fn test_searching() {
    assert_eq!(eval("'banana'.indexOf('an')"), n(1.0));
    assert_eq!(eval("'banana'.lastIndexOf('an')"), n(3.0));
    assert_eq!(eval("'banana'.includes('nan')"), JsValue::Boolean(true));
    assert_eq!(eval("'banana'.startsWith('ban') && 'banana'.endsWith('ana')"), JsValue::Boolean(true));
    assert_eq!(eval("'banana'.indexOf('x')"), n(-1.0));
}

#[test]
fn test_slicing() {
    assert_eq!(eval("'abcdef'.slice(1, -2)"), s("bcd"));
    assert_eq!(eval("'abcdef'.substring(4, 1)"), s("bcd"));
    assert_eq!(eval("'abcdef'.substr(-3, 2)"), s("de"));
}

#[test]
fn test_case_and_trim() {
    assert_eq!(eval("'MiXeD'.toUpperCase() + 'MiXeD'.toLowerCase()"), s("MIXEDmixed"));
    assert_eq!(eval("'  pad  '.trim() + '|' + '  pad'.trimStart() + '|' + 'pad  '.trimEnd()"), s("pad|pad|pad"));
}

#[test]
fn test_padding_and_repeat() {
    assert_eq!(eval("'5'.padStart(3, '0')"), s("005"));
    assert_eq!(eval("'ab'.padEnd(7, 'xy')"), s("abxyxyx"));
    assert_eq!(eval("'ab'.repeat(3)"), s("ababab"));
    assert!(throws_error("'a'.repeat(-1)", "RangeError"));
}

#[test]
fn test_split() {
    assert_eq!(eval("'a,b,,c'.split(',').length"), n(4.0));
    assert_eq!(eval("'abc'.split('').join('-')"), s("a-b-c"));
    assert_eq!(eval("'a b c'.split(' ', 2).join()"), s("a,b"));
    assert_eq!(eval("'abc'.split().length"), n(1.0));
}

#[test]
fn test_replace() {
    assert_eq!(eval("'aaa'.replace('a', 'b')"), s("baa"));
    assert_eq!(eval("'aaa'.replaceAll('a', 'b')"), s("bbb"));
    assert_eq!(eval("'price: 5'.replace('5', '$$$&')"), s("price: $5"));
    assert_eq!(eval("'x-y'.replace('-', (m, i) => '[' + m + i + ']')"), s("x[-1]y"));
}

#[test]
fn test_concat_and_locale_compare() {
    assert_eq!(eval("'a'.concat(1, null)"), s("a1null"));
    assert_eq!(eval("['b', 'a', 'c'].sort((x, y) => x.localeCompare(y)).join('')"), s("abc"));
}

#[test]
fn test_string_constructor_and_wrappers() {
    assert_eq!(eval("String(123) + String(null) + String(Symbol('d'))"), s("123nullSymbol(d)"));
    assert_eq!(eval("typeof new String('x')"), s("object"));
    assert_eq!(eval("new String('abc').length"), n(3.0));
    assert_eq!(eval("String.fromCharCode(72, 105)"), s("Hi"));
    assert_eq!(eval("String.fromCodePoint(128512).length"), n(2.0));
}

#[test]
fn test_strings_are_immutable() {
    assert_eq!(eval("const t = 'abc'; t[0] = 'z'; t"), s("abc"));
}

#[test]
fn test_string_methods_on_number_this() {
    assert_eq!(eval("String.prototype.slice.call(12345, 1, 3)"), s("23"));
}
