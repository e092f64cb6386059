//! Classes: constructors, methods, accessors, inheritance and super

use super::{eval, n, s, throws_error};
use jsweave::JsValue;

#[test]
fn test_class_basic() {
    assert_eq!(
        eval(
            r#"
            class Counter {
                constructor(start) { this.count = start; }
                inc() { this.count++; return this; }
            }
            new Counter(5).inc().inc().count
        "#
        ),
        n(7.0)
    );
}

#[test]
fn test_class_requires_new() {
    assert!(throws_error("class A {} A()", "TypeError"));
}

#[test]
fn test_class_declaration_tdz() {
    assert!(throws_error("new B(); class B {}", "ReferenceError"));
}

#[test]
fn test_static_members_and_accessors() {
    assert_eq!(
        eval(
            r#"
            class Temp {
                constructor(c) { this.c = c; }
                get f() { return this.c * 9 / 5 + 32; }
                set f(v) { this.c = (v - 32) * 5 / 9; }
                static freezing() { return new Temp(0); }
            }
            const t = Temp.freezing();
            t.f = 212;
            [t.c, t.f].join()
        "#
        ),
        s("100,212")
    );
}

#[test]
fn test_inheritance_and_super() {
    assert_eq!(
        eval(
            r#"
            class Shape {
                constructor(name) { this.name = name; }
                describe() { return 'a ' + this.name; }
            }
            class Square extends Shape {
                constructor(side) { super('square'); this.side = side; }
                describe() { return super.describe() + ' of side ' + this.side; }
            }
            const sq = new Square(3);
            [sq.describe(), sq instanceof Shape, Object.getPrototypeOf(Square) === Shape].join('|')
        "#
        ),
        s("a square of side 3|true|true")
    );
}

#[test]
fn test_default_derived_constructor_forwards_arguments() {
    assert_eq!(
        eval("class A { constructor(x, y) { this.sum = x + y; } } class B extends A {} new B(2, 3).sum"),
        n(5.0)
    );
}

#[test]
fn test_this_before_super_throws() {
    assert!(throws_error(
        "class A {} class B extends A { constructor() { this.x = 1; super(); } } new B()",
        "ReferenceError"
    ));
}

#[test]
fn test_derived_without_super_throws() {
    assert!(throws_error("class A {} class B extends A { constructor() {} } new B()", "ReferenceError"));
}

#[test]
fn test_extending_builtin_error() {
    assert_eq!(
        eval(
            r#"
            class ValidationError extends Error {
                constructor(field) { super('bad ' + field); this.name = 'ValidationError'; }
            }
            const e = new ValidationError('email');
            [e instanceof Error, e.message, String(e)].join('|')
        "#
        ),
        s("true|bad email|ValidationError: bad email")
    );
}

#[test]
fn test_static_methods_inherited() {
    assert_eq!(
        eval("class A { static who() { return 'A'; } } class B extends A {} B.who()"),
        s("A")
    );
}

#[test]
fn test_class_methods_not_enumerable() {
    assert_eq!(eval("class A { m() {} } Object.keys(A.prototype).length"), n(0.0));
}

#[test]
fn test_class_expression_name() {
    assert_eq!(eval("const K = class Inner { who() { return Inner.name; } }; new K().who()"), s("Inner"));
}

#[test]
fn test_computed_method_names() {
    assert_eq!(eval("const k = 'dyn'; class A { [k + 'amic']() { return 1; } } new A().dynamic()"), n(1.0));
}

#[test]
fn test_class_body_is_strict() {
    assert_eq!(eval("class A { m() { return this; } } const m = new A().m; m()"), JsValue::Undefined);
}
