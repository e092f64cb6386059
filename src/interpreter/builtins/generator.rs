//! %IteratorPrototype% and Generator.prototype
//!
//! `next`/`return`/`throw` are intrinsics: resuming a generator swaps its
//! coroutine in as the running activation instead of re-entering the host.

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::call::{Intrinsic, ResumeKind};
use crate::value::{CheapClone, JsValue, PropertyKey};

pub fn init_generator(interp: &mut Interpreter) {
    let iterator_proto = interp.realm.iterator_prototype.cheap_clone();
    let iterator_fn = interp.create_native_function("[Symbol.iterator]", iterator_self, 0);
    iterator_proto.define_hidden(
        PropertyKey::Symbol(interp.realm.symbol_iterator.clone()),
        JsValue::Object(iterator_fn),
    );

    let proto = interp.realm.generator_prototype.cheap_clone();
    for kind in [ResumeKind::Next, ResumeKind::Return, ResumeKind::Throw] {
        let method = interp.create_intrinsic(Intrinsic::GeneratorResume(kind), 1);
        proto.define_hidden(kind.method_name(), JsValue::Object(method));
    }
}

/// `[Symbol.iterator]() { return this }`
fn iterator_self(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(this)
}
