//! Error constructors and engine-raised errors

use super::{eval, eval_result, n, s, throws_error};
use jsweave::value::describe;
use jsweave::{JsError, JsValue};

#[test]
fn test_error_construction() {
    assert_eq!(eval("const e = new Error('boom'); [e.name, e.message].join()"), s("Error,boom"));
    assert_eq!(eval("Error('no new').message"), s("no new"));
    assert_eq!(eval("new Error().message"), s(""));
    assert_eq!(eval("String(new RangeError('r'))"), s("RangeError: r"));
    assert_eq!(eval("String(new TypeError())"), s("TypeError"));
}

#[test]
fn test_error_cause() {
    assert_eq!(eval("new Error('outer', { cause: 42 }).cause"), n(42.0));
    assert_eq!(eval("'cause' in new Error('x', {})"), JsValue::Boolean(false));
}

#[test]
fn test_error_hierarchy() {
    assert_eq!(
        eval(
            r#"
            const e = new TypeError('t');
            [e instanceof TypeError, e instanceof Error, e instanceof RangeError,
             Object.getPrototypeOf(TypeError) === Error,
             Object.getPrototypeOf(TypeError.prototype) === Error.prototype].join()
        "#
        ),
        s("true,true,false,true,true")
    );
}

#[test]
fn test_error_properties_not_enumerable() {
    assert_eq!(eval("Object.keys(new Error('x')).length"), n(0.0));
    assert_eq!(eval("Object.prototype.toString.call(new SyntaxError('s'))"), s("[object Error]"));
}

#[test]
fn test_custom_error_to_string() {
    assert_eq!(
        eval("const e = new Error('m'); e.name = 'Custom'; e.toString()"),
        s("Custom: m")
    );
    assert_eq!(eval("Error.prototype.toString.call({ message: 'plain' })"), s("Error: plain"));
}

#[test]
fn test_engine_errors_are_catchable_guest_errors() {
    assert_eq!(
        eval(
            r#"
            const kinds = [];
            try { null.x; } catch (e) { kinds.push(e instanceof TypeError); }
            try { missing; } catch (e) { kinds.push(e instanceof ReferenceError, e.name); }
            try { new Array(-1); } catch (e) { kinds.push(e.name); }
            try { (1)(); } catch (e) { kinds.push(e.constructor === TypeError); }
            kinds.join()
        "#
        ),
        s("true,true,ReferenceError,RangeError,true")
    );
}

#[test]
fn test_throw_any_value() {
    assert_eq!(eval("try { throw { code: 7 }; } catch (e) { e.code }"), n(7.0));
    let Err(JsError::Thrown(value)) = eval_result("throw 'plain'") else {
        panic!("expected a thrown value");
    };
    assert_eq!(value, s("plain"));
}

#[test]
fn test_uncaught_error_rendering() {
    let Err(JsError::Thrown(value)) = eval_result("throw new RangeError('too big')") else {
        panic!("expected a thrown value");
    };
    assert_eq!(describe(&value), "RangeError: too big");
    assert!(throws_error("undefinedFunction()", "ReferenceError"));
}

#[test]
fn test_syntax_error_is_reported_before_running() {
    let mut runtime = jsweave::Runtime::new();
    let result = runtime.eval("var ran = 1; )", &jsweave::RunOptions::default());
    assert!(matches!(result, Err(JsError::SyntaxError { .. })));
    assert!(matches!(runtime.get_global("ran"), Ok(JsValue::Undefined)));
}
