//! Function.prototype
//!
//! `call` and `apply` are intrinsics so the callee runs as a frame of the
//! calling coroutine and may `yield`/`await` through them.

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::arg;
use crate::interpreter::call::Intrinsic;
use crate::value::{CheapClone, JsString, JsValue, describe};

pub fn init_function(interp: &mut Interpreter) {
    let proto = interp.realm.function_prototype.cheap_clone();

    let call = interp.create_intrinsic(Intrinsic::FunctionCall, 1);
    proto.define_hidden("call", JsValue::Object(call));
    let apply = interp.create_intrinsic(Intrinsic::FunctionApply, 2);
    proto.define_hidden("apply", JsValue::Object(apply));

    interp.register_method(&proto, "bind", function_bind, 1);
    interp.register_method(&proto, "toString", function_to_string, 0);
}

fn function_bind(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let Some(target) = this.as_object().filter(|o| o.is_callable()).cloned() else {
        return Err(JsError::type_error(format!("Bind must be called on a function, got {}", describe(&this))));
    };
    let bound_args: Vec<JsValue> = args.iter().skip(1).cloned().collect();

    let target_name = match interp.get_named(&this, "name")? {
        JsValue::String(s) => s,
        _ => JsString::default(),
    };
    let length = match interp.get_named(&this, "length")? {
        JsValue::Number(n) if n.is_finite() => (n.max(0.0) as usize).saturating_sub(bound_args.len()),
        _ => 0,
    };

    let bound = interp.create_intrinsic(
        Intrinsic::BoundFunction {
            target,
            this: arg(args, 0),
            args: bound_args,
            name: JsString::from("bound ") + &target_name,
        },
        length,
    );
    Ok(JsValue::Object(bound))
}

fn function_to_string(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let Some(callable) = this.as_object().and_then(|o| o.callable()) else {
        return Err(JsError::type_error("Function.prototype.toString requires that 'this' be a Function"));
    };
    Ok(JsValue::from(format!("function {}() {{ [native code] }}", callable.name())))
}
