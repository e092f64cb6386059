//! Symbol function and Symbol.prototype
//!
//! `Symbol.iterator` is the only well-known symbol; the evaluator looks it up
//! through the realm.

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::{arg, install_constructor};
use crate::object::{ObjectKind, Property};
use crate::value::{CheapClone, JsSymbol, JsValue, PropertyKey};

pub fn init_symbol(interp: &mut Interpreter) {
    let proto = interp.realm.symbol_prototype.cheap_clone();

    interp.register_method(&proto, "toString", symbol_to_string, 0);
    interp.register_method(&proto, "valueOf", symbol_value_of, 0);
    interp.register_getter(&proto, "description", symbol_description);

    // Callable but not a constructor: `new Symbol()` throws
    let ctor = install_constructor(interp, "Symbol", symbol_called, None, 0, &proto);
    ctor.borrow_mut().define_property(
        PropertyKey::from("iterator"),
        Property::internal(JsValue::Symbol(interp.realm.symbol_iterator.clone())),
    );
}

fn symbol_called(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let description = match arg(args, 0) {
        JsValue::Undefined => None,
        other => Some(interp.to_string(&other)?),
    };
    Ok(JsValue::Symbol(interp.fresh_symbol(description)))
}

fn this_symbol(this: &JsValue, method: &str) -> Result<JsSymbol, JsError> {
    let found = match this {
        JsValue::Symbol(sym) => Some(sym.clone()),
        JsValue::Object(obj) => match &obj.borrow().kind {
            ObjectKind::SymbolObject(sym) => Some(sym.clone()),
            _ => None,
        },
        _ => None,
    };
    found.ok_or_else(|| {
        JsError::type_error(format!(
            "Symbol.prototype.{} requires that 'this' be a Symbol",
            method
        ))
    })
}

fn symbol_to_string(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::from(this_symbol(&this, "toString")?.descriptive_string()))
}

fn symbol_value_of(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Symbol(this_symbol(&this, "valueOf")?))
}

fn symbol_description(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let sym = this_symbol(&this, "description")?;
    Ok(sym.description.map(JsValue::String).unwrap_or_default())
}
