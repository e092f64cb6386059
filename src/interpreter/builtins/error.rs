//! Error constructors: Error and its native subclasses

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::{arg, install_constructor};
use crate::object::{JsObject, NativeConstructFn, NativeFn, ObjectKind, ObjectRef};
use crate::value::{CheapClone, JsValue, PropertyKey};

/// Defines the call and construct entry points for one error constructor
macro_rules! error_constructor {
    ($called:ident, $construct:ident, $kind:literal) => {
        fn $called(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
            let proto = interp.realm.error_prototype($kind);
            create_error_object(interp, proto, args)
        }

        fn $construct(interp: &mut Interpreter, args: &[JsValue], new_target: &ObjectRef) -> Result<JsValue, JsError> {
            let fallback = interp.realm.error_prototype($kind);
            let proto = interp.prototype_from_constructor(new_target, &fallback)?;
            create_error_object(interp, proto, args)
        }
    };
}

error_constructor!(error_called, error_construct, "Error");
error_constructor!(type_error_called, type_error_construct, "TypeError");
error_constructor!(reference_error_called, reference_error_construct, "ReferenceError");
error_constructor!(range_error_called, range_error_construct, "RangeError");
error_constructor!(syntax_error_called, syntax_error_construct, "SyntaxError");

pub fn init_errors(interp: &mut Interpreter) {
    let proto = interp.realm.error_prototype.cheap_clone();
    proto.define_hidden("name", JsValue::from("Error"));
    proto.define_hidden("message", JsValue::from(""));
    interp.register_method(&proto, "toString", error_to_string, 0);
    let error_ctor = install_constructor(interp, "Error", error_called, Some(error_construct), 1, &proto);

    let subclasses: [(&str, NativeFn, NativeConstructFn); 4] = [
        ("TypeError", type_error_called, type_error_construct),
        ("ReferenceError", reference_error_called, reference_error_construct),
        ("RangeError", range_error_called, range_error_construct),
        ("SyntaxError", syntax_error_called, syntax_error_construct),
    ];
    for (name, called, construct) in subclasses {
        let proto = interp.realm.error_prototype(name);
        proto.define_hidden("name", JsValue::from(name));
        proto.define_hidden("message", JsValue::from(""));
        let ctor = install_constructor(interp, name, called, Some(construct), 1, &proto);
        // TypeError.__proto__ === Error
        ctor.borrow_mut().prototype = Some(error_ctor.cheap_clone());
    }
}

fn create_error_object(interp: &mut Interpreter, proto: ObjectRef, args: &[JsValue]) -> Result<JsValue, JsError> {
    let error = ObjectRef::new(JsObject::new(Some(proto), ObjectKind::Error));
    let message = arg(args, 0);
    if !message.is_undefined() {
        let message = interp.to_string(&message)?;
        error.define_hidden("message", JsValue::String(message));
    }
    if let JsValue::Object(options) = arg(args, 1)
        && options.has_property(&PropertyKey::from("cause"))
    {
        let cause = interp.get_named(&JsValue::Object(options), "cause")?;
        error.define_hidden("cause", cause);
    }
    Ok(JsValue::Object(error))
}

fn error_to_string(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    if !this.is_object() {
        return Err(JsError::type_error("Error.prototype.toString called on non-object"));
    }
    let name = match interp.get_named(&this, "name")? {
        JsValue::Undefined => "Error".into(),
        other => interp.to_string(&other)?,
    };
    let message = match interp.get_named(&this, "message")? {
        JsValue::Undefined => Default::default(),
        other => interp.to_string(&other)?,
    };
    let text = match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => name + ": " + &message,
    };
    Ok(JsValue::String(text))
}
