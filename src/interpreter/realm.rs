//! Realm: the global object, its environment and the intrinsic prototypes
//!
//! Prototypes are allocated empty here; `builtins::install` fills them in.

use crate::environment::{EnvRef, Environment};
use crate::object::{JsObject, ObjectRef};
use crate::value::{CheapClone, JsString, JsSymbol};

pub struct Realm {
    pub global: ObjectRef,
    pub global_env: EnvRef,

    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub string_prototype: ObjectRef,
    pub number_prototype: ObjectRef,
    pub boolean_prototype: ObjectRef,
    pub symbol_prototype: ObjectRef,
    pub promise_prototype: ObjectRef,
    /// `%IteratorPrototype%`: `[Symbol.iterator]() { return this }`
    pub iterator_prototype: ObjectRef,
    pub list_iterator_prototype: ObjectRef,
    pub generator_prototype: ObjectRef,

    pub error_prototype: ObjectRef,
    pub type_error_prototype: ObjectRef,
    pub reference_error_prototype: ObjectRef,
    pub range_error_prototype: ObjectRef,
    pub syntax_error_prototype: ObjectRef,

    /// `Symbol.iterator`
    pub symbol_iterator: JsSymbol,
}

impl Realm {
    pub fn new(next_symbol_id: &mut u64) -> Self {
        let object_prototype = ObjectRef::new(JsObject::ordinary(None));
        let inheriting = |proto: &ObjectRef| ObjectRef::new(JsObject::ordinary(Some(proto.cheap_clone())));

        let iterator_prototype = inheriting(&object_prototype);
        let error_prototype = inheriting(&object_prototype);
        let global = inheriting(&object_prototype);

        let symbol_iterator = JsSymbol::new(*next_symbol_id, Some(JsString::from("Symbol.iterator")));
        *next_symbol_id += 1;

        Self {
            global_env: Environment::new_global(global.cheap_clone()),
            global,
            function_prototype: inheriting(&object_prototype),
            array_prototype: inheriting(&object_prototype),
            string_prototype: inheriting(&object_prototype),
            number_prototype: inheriting(&object_prototype),
            boolean_prototype: inheriting(&object_prototype),
            symbol_prototype: inheriting(&object_prototype),
            promise_prototype: inheriting(&object_prototype),
            list_iterator_prototype: inheriting(&iterator_prototype),
            generator_prototype: inheriting(&iterator_prototype),
            type_error_prototype: inheriting(&error_prototype),
            reference_error_prototype: inheriting(&error_prototype),
            range_error_prototype: inheriting(&error_prototype),
            syntax_error_prototype: inheriting(&error_prototype),
            iterator_prototype,
            error_prototype,
            object_prototype,
            symbol_iterator,
        }
    }

    /// Prototype for error objects created under the constructor name `kind`
    pub fn error_prototype(&self, kind: &str) -> ObjectRef {
        match kind {
            "TypeError" => self.type_error_prototype.cheap_clone(),
            "ReferenceError" => self.reference_error_prototype.cheap_clone(),
            "RangeError" => self.range_error_prototype.cheap_clone(),
            "SyntaxError" => self.syntax_error_prototype.cheap_clone(),
            _ => self.error_prototype.cheap_clone(),
        }
    }
}
