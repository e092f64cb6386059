//! Boolean constructor and Boolean.prototype

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::{arg, install_constructor};
use crate::object::{JsObject, ObjectKind, ObjectRef};
use crate::value::{CheapClone, JsValue};

pub fn init_boolean(interp: &mut Interpreter) {
    let proto = interp.realm.boolean_prototype.cheap_clone();
    proto.borrow_mut().kind = ObjectKind::BooleanObject(false);

    interp.register_method(&proto, "toString", boolean_to_string, 0);
    interp.register_method(&proto, "valueOf", boolean_value_of, 0);

    install_constructor(interp, "Boolean", boolean_called, Some(boolean_construct), 1, &proto);
}

fn boolean_called(_interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Boolean(arg(args, 0).to_boolean()))
}

fn boolean_construct(interp: &mut Interpreter, args: &[JsValue], new_target: &ObjectRef) -> Result<JsValue, JsError> {
    let fallback = interp.realm.boolean_prototype.cheap_clone();
    let proto = interp.prototype_from_constructor(new_target, &fallback)?;
    Ok(JsValue::Object(ObjectRef::new(JsObject::new(
        Some(proto),
        ObjectKind::BooleanObject(arg(args, 0).to_boolean()),
    ))))
}

fn this_boolean(this: &JsValue, method: &str) -> Result<bool, JsError> {
    let wrapped = match this {
        JsValue::Boolean(b) => return Ok(*b),
        JsValue::Object(obj) => match obj.borrow().kind {
            ObjectKind::BooleanObject(b) => Some(b),
            _ => None,
        },
        _ => None,
    };
    wrapped.ok_or_else(|| {
        JsError::type_error(format!(
            "Boolean.prototype.{} requires that 'this' be a Boolean",
            method
        ))
    })
}

fn boolean_to_string(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let b = this_boolean(&this, "toString")?;
    Ok(JsValue::from(if b { "true" } else { "false" }))
}

fn boolean_value_of(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Boolean(this_boolean(&this, "valueOf")?))
}
