//! Object built-in and property attributes

use super::{eval, n, s, throws_error};
use jsweave::JsValue;

#[test]
fn test_keys_values_entries_order() {
    assert_eq!(eval("Object.keys({ b: 1, a: 2, 2: 3, 1: 4 }).join()"), s("1,2,b,a"));
    assert_eq!(eval("Object.values({ x: 1, y: 2 }).join()"), s("1,2"));
    assert_eq!(eval("Object.entries({ x: 1 }).map(e => e.join('=')).join()"), s("x=1"));
}

#[test]
fn test_assign_and_from_entries() {
    assert_eq!(eval("const t = Object.assign({ a: 1 }, { b: 2 }, null, { a: 3 }); t.a + t.b"), n(5.0));
    assert_eq!(eval("Object.fromEntries([['k', 'v'], ['n', 1]]).k"), s("v"));
}

#[test]
fn test_create_with_prototype_and_descriptors() {
    assert_eq!(
        eval(
            r#"
            const proto = { greet() { return 'hi ' + this.name; } };
            const o = Object.create(proto, { name: { value: 'ann', enumerable: true } });
            [o.greet(), Object.getPrototypeOf(o) === proto, Object.keys(o).join()].join('|')
        "#
        ),
        s("hi ann|true|name")
    );
    assert_eq!(eval("Object.getPrototypeOf(Object.create(null))"), JsValue::Null);
}

#[test]
fn test_define_property_attributes() {
    assert_eq!(
        eval(
            r#"
            const o = {};
            Object.defineProperty(o, 'ro', { value: 1 });
            o.ro = 2;
            const d = Object.getOwnPropertyDescriptor(o, 'ro');
            [o.ro, d.writable, d.enumerable, d.configurable, Object.keys(o).length].join()
        "#
        ),
        s("1,false,false,false,0")
    );
}

#[test]
fn test_define_property_strict_write_throws() {
    assert!(throws_error(
        "'use strict'; const o = {}; Object.defineProperty(o, 'x', { value: 1 }); o.x = 2;",
        "TypeError"
    ));
}

#[test]
fn test_redefine_non_configurable_throws() {
    assert!(throws_error(
        "const o = {}; Object.defineProperty(o, 'x', { value: 1 }); Object.defineProperty(o, 'x', { value: 2 });",
        "TypeError"
    ));
}

#[test]
fn test_accessor_descriptor() {
    assert_eq!(
        eval(
            r#"
            const o = { _t: 2 };
            Object.defineProperty(o, 'twice', { get() { return this._t * 2; }, enumerable: false });
            const d = Object.getOwnPropertyDescriptor(o, 'twice');
            [o.twice, typeof d.get, d.set, 'value' in d].join()
        "#
        ),
        s("4,function,,false")
    );
}

#[test]
fn test_define_properties() {
    assert_eq!(
        eval("const o = Object.defineProperties({}, { a: { value: 1, enumerable: true }, b: { value: 2 } }); Object.keys(o).join() + o.b"),
        s("a2")
    );
}

#[test]
fn test_freeze() {
    assert_eq!(
        eval(
            r#"
            const o = Object.freeze({ a: 1, nested: { b: 1 } });
            o.a = 2; o.c = 3; delete o.a; o.nested.b = 2;
            [o.a, o.c, o.nested.b, Object.isFrozen(o)].join()
        "#
        ),
        s("1,,2,true")
    );
    assert!(throws_error("'use strict'; const o = Object.freeze({ a: 1 }); o.a = 2;", "TypeError"));
}

#[test]
fn test_prevent_extensions() {
    assert_eq!(
        eval("const o = { a: 1 }; Object.preventExtensions(o); o.b = 2; o.a = 5; [o.a, o.b, Object.isExtensible(o)].join()"),
        s("5,,false")
    );
}

#[test]
fn test_set_prototype_of_rejects_cycles() {
    assert!(throws_error("const a = {}; const b = Object.create(a); Object.setPrototypeOf(a, b);", "TypeError"));
    assert_eq!(eval("const p = { v: 1 }; const o = Object.setPrototypeOf({}, p); o.v"), n(1.0));
}

#[test]
fn test_has_own_and_property_checks() {
    assert_eq!(
        eval(
            r#"
            const o = Object.create({ inherited: 1 });
            o.own = 1;
            [o.hasOwnProperty('own'), o.hasOwnProperty('inherited'), Object.hasOwn(o, 'own'),
             o.propertyIsEnumerable('own'), Object.prototype.isPrototypeOf(o)].join()
        "#
        ),
        s("true,false,true,true,true")
    );
}

#[test]
fn test_object_is() {
    assert_eq!(eval("[Object.is(NaN, NaN), Object.is(0, -0), Object.is('a', 'a')].join()"), s("true,false,true"));
}

#[test]
fn test_to_string_tags() {
    assert_eq!(eval("Object.prototype.toString.call([])"), s("[object Array]"));
    assert_eq!(eval("Object.prototype.toString.call(null)"), s("[object Null]"));
    assert_eq!(eval("String({})"), s("[object Object]"));
}

#[test]
fn test_get_own_property_names_includes_hidden() {
    assert_eq!(eval("Object.getOwnPropertyNames([1]).join()"), s("0,length"));
}

#[test]
fn test_value_of_and_to_primitive() {
    assert_eq!(eval("const o = { valueOf() { return 41; } }; o + 1"), n(42.0));
    assert_eq!(eval("const o = { toString() { return 'str'; } }; `${o}`"), s("str"));
}

#[test]
fn test_object_wrapping() {
    assert_eq!(eval("typeof Object(1)"), s("object"));
    assert_eq!(eval("const o = {}; Object(o) === o"), JsValue::Boolean(true));
}

#[test]
fn test_property_access_on_null_throws() {
    assert!(throws_error("const o = null; o.x", "TypeError"));
    assert!(throws_error("undefined.x = 1", "TypeError"));
}
