//! Built-in objects of the realm
//!
//! Each module exposes an `init_*` function that fills in the prototypes
//! allocated by [`Realm`](super::realm::Realm) and publishes constructors on
//! the global object.

pub mod array;
pub mod boolean;
pub mod console;
pub mod error;
pub mod function;
pub mod generator;
pub mod global;
pub mod json;
pub mod math;
pub mod number;
pub mod object;
pub mod promise;
pub mod string;
pub mod symbol;

pub use json::{json_to_value, value_to_json};

use crate::interpreter::Interpreter;
use crate::object::{Callable, NativeConstructFn, NativeFn, ObjectKind, ObjectRef, Property};
use crate::value::{CheapClone, JsValue, PropertyKey};

/// Populate the realm: prototypes first, then constructors and namespaces
pub fn install(interp: &mut Interpreter) {
    function::init_function(interp);
    object::init_object(interp);
    error::init_errors(interp);
    array::init_array(interp);
    string::init_string(interp);
    number::init_number(interp);
    boolean::init_boolean(interp);
    symbol::init_symbol(interp);
    generator::init_generator(interp);
    promise::init_promise(interp);
    math::init_math(interp);
    json::init_json(interp);
    console::init_console(interp);
    global::init_global(interp);
}

/// Argument `index`, `undefined` when missing
pub(crate) fn arg(args: &[JsValue], index: usize) -> JsValue {
    args.get(index).cloned().unwrap_or_default()
}

/// Constructor function linked with `proto` and published as a global
pub(crate) fn install_constructor(
    interp: &mut Interpreter,
    name: &str,
    call: NativeFn,
    construct: Option<NativeConstructFn>,
    arity: u32,
    proto: &ObjectRef,
) -> ObjectRef {
    let ctor = interp.create_native_function(name, call, arity);
    if let ObjectKind::Function(Callable::Native(native)) = &mut ctor.borrow_mut().kind {
        native.construct = construct;
    }
    publish_constructor(interp, name, &ctor, proto);
    ctor
}

/// Link `ctor` with `proto` and publish it as a global
pub(crate) fn publish_constructor(interp: &mut Interpreter, name: &str, ctor: &ObjectRef, proto: &ObjectRef) {
    ctor.borrow_mut().define_property(
        PropertyKey::from("prototype"),
        Property::internal(JsValue::Object(proto.cheap_clone())),
    );
    proto.define_hidden("constructor", JsValue::Object(ctor.cheap_clone()));
    interp.realm.global.define_hidden(name, JsValue::Object(ctor.cheap_clone()));
}
