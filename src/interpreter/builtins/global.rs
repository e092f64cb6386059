//! Global value properties and functions

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::arg;
use crate::object::Property;
use crate::value::{CheapClone, JsValue, PropertyKey};

pub fn init_global(interp: &mut Interpreter) {
    let global = interp.realm.global.cheap_clone();

    let values = [
        ("undefined", JsValue::Undefined),
        ("NaN", JsValue::Number(f64::NAN)),
        ("Infinity", JsValue::Number(f64::INFINITY)),
    ];
    for (name, value) in values {
        global
            .borrow_mut()
            .define_property(PropertyKey::from(name), Property::internal(value));
    }
    global.define_hidden("globalThis", JsValue::Object(global.cheap_clone()));

    // Same function objects as Number.parseInt / Number.parseFloat
    for name in ["parseInt", "parseFloat"] {
        let number = global.borrow().get_own_data(&PropertyKey::from("Number"));
        let func = match number {
            Some(JsValue::Object(ctor)) => ctor.borrow().get_own_data(&PropertyKey::from(name)),
            _ => None,
        };
        if let Some(func) = func {
            global.define_hidden(name, func);
        }
    }

    interp.register_method(&global, "isNaN", global_is_nan, 1);
    interp.register_method(&global, "isFinite", global_is_finite, 1);
}

fn global_is_nan(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Boolean(interp.to_number(&arg(args, 0))?.is_nan()))
}

fn global_is_finite(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Boolean(interp.to_number(&arg(args, 0))?.is_finite()))
}
