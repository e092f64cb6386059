//! Object model
//!
//! Objects are `Rc<RefCell<JsObject>>` handles. Property reads and writes
//! never run guest code here: when an accessor is involved the lookup
//! returns it (`Access::Getter`, `Assign::Setter`) and the evaluator calls it
//! as an ordinary frame.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::promise::PromiseData;
use crate::interpreter::callback::CallbackLoop;
use crate::interpreter::call::{Closure, Intrinsic};
use crate::interpreter::generator::GeneratorData;
use crate::value::{CheapClone, JsString, JsSymbol, JsValue, PropertyKey};

/// Host function: `(interpreter, this, arguments)`
pub type NativeFn = fn(&mut Interpreter, JsValue, &[JsValue]) -> Result<JsValue, JsError>;

/// Host constructor: `(interpreter, arguments, new_target)`
pub type NativeConstructFn = fn(&mut Interpreter, &[JsValue], &ObjectRef) -> Result<JsValue, JsError>;

/// Host function that calls back into guest code: returns the loop the
/// evaluator drives
pub type NativeLoopFn = fn(&mut Interpreter, JsValue, &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError>;

pub type NativeLoopConstructFn = fn(&mut Interpreter, &[JsValue], &ObjectRef) -> Result<Box<dyn CallbackLoop>, JsError>;

pub type PropertyMap = IndexMap<PropertyKey, Property, FxBuildHasher>;

/// Shared handle to a heap object
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<JsObject>>);

impl CheapClone for ObjectRef {}

impl ObjectRef {
    pub fn new(object: JsObject) -> Self {
        ObjectRef(Rc::new(RefCell::new(object)))
    }

    pub fn borrow(&self) -> Ref<'_, JsObject> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, JsObject> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity usable as a map key (stable while the object is alive)
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Function(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Array(_))
    }

    pub fn prototype(&self) -> Option<ObjectRef> {
        self.borrow().prototype.clone()
    }

    /// Callable behind this object, if it is a function
    pub fn callable(&self) -> Option<Callable> {
        match &self.borrow().kind {
            ObjectKind::Function(callable) => Some(callable.clone()),
            _ => None,
        }
    }

    /// `[[Get]]` without running accessors
    pub fn get(&self, key: &PropertyKey) -> Access {
        let mut current = Some(self.cheap_clone());
        while let Some(obj) = current {
            let o = obj.borrow();
            if let Some(prop) = o.get_own_property(key) {
                return prop.access();
            }
            current = o.prototype.clone();
        }
        Access::Value(JsValue::Undefined)
    }

    /// `[[Set]]` with `receiver` as the object that receives new data properties
    pub fn set_with_receiver(&self, key: PropertyKey, value: JsValue, receiver: &ObjectRef) -> Assign {
        let mut current = Some(self.cheap_clone());
        while let Some(obj) = current {
            let found = obj.borrow().get_own_property(&key);
            if let Some(prop) = found {
                if prop.is_accessor() {
                    return match prop.setter {
                        Some(setter) => Assign::Setter(setter),
                        None => Assign::Rejected,
                    };
                }
                if !prop.writable {
                    return Assign::Rejected;
                }
                break;
            }
            current = obj.borrow().prototype.clone();
        }
        receiver.borrow_mut().write_data(key, value)
    }

    pub fn set(&self, key: PropertyKey, value: JsValue) -> Assign {
        self.set_with_receiver(key, value, self)
    }

    /// `HasProperty` (own or inherited)
    pub fn has_property(&self, key: &PropertyKey) -> bool {
        let mut current = Some(self.cheap_clone());
        while let Some(obj) = current {
            let o = obj.borrow();
            if o.has_own_property(key) {
                return true;
            }
            current = o.prototype.clone();
        }
        false
    }

    /// Data property with default attributes (writable, enumerable, configurable)
    pub fn define_value(&self, key: impl Into<PropertyKey>, value: JsValue) {
        self.borrow_mut().define_property(key.into(), Property::data(value));
    }

    /// Non-enumerable data property (built-in methods, `constructor`)
    pub fn define_hidden(&self, key: impl Into<PropertyKey>, value: JsValue) {
        self.borrow_mut().define_property(key.into(), Property::hidden(value));
    }

    /// Whether `proto` appears on this object's prototype chain
    pub fn inherits_from(&self, proto: &ObjectRef) -> bool {
        let mut current = self.prototype();
        while let Some(obj) = current {
            if obj.ptr_eq(proto) {
                return true;
            }
            current = obj.prototype();
        }
        false
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::value::describe(&JsValue::Object(self.cheap_clone())))
    }
}

/// Result of a property read
pub enum Access {
    Value(JsValue),
    /// Accessor found: the caller invokes it with the original receiver
    Getter(ObjectRef),
}

/// Result of a property write
pub enum Assign {
    Done,
    /// Accessor found: the caller invokes it with the value
    Setter(ObjectRef),
    /// Non-writable, non-extensible or getter-only; a `TypeError` in strict code
    Rejected,
}

/// A JavaScript object
pub struct JsObject {
    pub prototype: Option<ObjectRef>,
    /// Whether the object can have properties added
    pub extensible: bool,
    /// Array elements are read-only (set by `Object.freeze`)
    pub frozen: bool,
    pub properties: PropertyMap,
    pub kind: ObjectKind,
}

impl JsObject {
    pub fn new(prototype: Option<ObjectRef>, kind: ObjectKind) -> Self {
        Self {
            prototype,
            extensible: true,
            frozen: false,
            properties: PropertyMap::default(),
            kind,
        }
    }

    pub fn ordinary(prototype: Option<ObjectRef>) -> Self {
        Self::new(prototype, ObjectKind::Ordinary)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    /// Own property, synthesizing the virtual ones (array elements, `length`,
    /// boxed string characters)
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<Property> {
        match (&self.kind, key) {
            (ObjectKind::Array(elements), PropertyKey::Index(i)) => {
                let value = elements.get(*i as usize)?;
                return Some(Property {
                    writable: !self.frozen,
                    configurable: !self.frozen,
                    ..Property::data(value.clone())
                });
            }
            (ObjectKind::Array(elements), PropertyKey::String(s)) if s == "length" => {
                return Some(Property {
                    writable: !self.frozen,
                    ..Property::internal(JsValue::from(elements.len()))
                });
            }
            (ObjectKind::StringObject(s), PropertyKey::Index(i)) => {
                if let Some(unit) = s.code_unit_at(*i as usize) {
                    let ch = String::from_utf16_lossy(&[unit]);
                    return Some(Property::readonly(JsValue::from(ch)));
                }
            }
            (ObjectKind::StringObject(s), PropertyKey::String(name)) if name == "length" => {
                return Some(Property::internal(JsValue::from(s.utf16_len())));
            }
            _ => {}
        }
        self.properties.get(key).cloned()
    }

    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        match (&self.kind, key) {
            (ObjectKind::Array(elements), PropertyKey::Index(i)) => (*i as usize) < elements.len(),
            (ObjectKind::Array(_), PropertyKey::String(s)) if s == "length" => true,
            _ => self.properties.contains_key(key),
        }
    }

    /// Own data value without accessor resolution
    pub fn get_own_data(&self, key: &PropertyKey) -> Option<JsValue> {
        self.get_own_property(key)
            .filter(|p| !p.is_accessor())
            .map(|p| p.value)
    }

    /// Write an own data property, creating it if the object is extensible
    pub fn write_data(&mut self, key: PropertyKey, value: JsValue) -> Assign {
        let frozen = self.frozen;
        let extensible = self.extensible;
        if let ObjectKind::Array(elements) = &mut self.kind {
            match &key {
                PropertyKey::Index(i) => {
                    if frozen {
                        return Assign::Rejected;
                    }
                    let i = *i as usize;
                    if i >= elements.len() {
                        if !extensible {
                            return Assign::Rejected;
                        }
                        elements.resize(i + 1, JsValue::Undefined);
                    }
                    if let Some(slot) = elements.get_mut(i) {
                        *slot = value;
                    }
                    return Assign::Done;
                }
                PropertyKey::String(s) if s == "length" => {
                    if frozen {
                        return Assign::Rejected;
                    }
                    let len = match value {
                        JsValue::Number(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => n as usize,
                        _ => return Assign::Rejected,
                    };
                    elements.resize(len, JsValue::Undefined);
                    return Assign::Done;
                }
                _ => {}
            }
        }

        if let Some(prop) = self.properties.get_mut(&key) {
            if prop.is_accessor() || !prop.writable {
                return Assign::Rejected;
            }
            prop.value = value;
            return Assign::Done;
        }
        if !self.extensible {
            return Assign::Rejected;
        }
        self.properties.insert(key, Property::data(value));
        Assign::Done
    }

    /// Define or replace an own property
    pub fn define_property(&mut self, key: PropertyKey, prop: Property) {
        if let ObjectKind::Array(elements) = &mut self.kind {
            match &key {
                PropertyKey::Index(i) if !prop.is_accessor() => {
                    let i = *i as usize;
                    if i >= elements.len() {
                        elements.resize(i + 1, JsValue::Undefined);
                    }
                    if let Some(slot) = elements.get_mut(i) {
                        *slot = prop.value;
                    }
                    return;
                }
                PropertyKey::String(s) if s == "length" => {
                    if let JsValue::Number(n) = prop.value
                        && n >= 0.0
                        && n.fract() == 0.0
                    {
                        elements.resize(n as usize, JsValue::Undefined);
                    }
                    return;
                }
                _ => {}
            }
        }
        self.properties.insert(key, prop);
    }

    /// `[[Delete]]`: false when the property is non-configurable
    pub fn delete(&mut self, key: &PropertyKey) -> bool {
        let frozen = self.frozen;
        if let ObjectKind::Array(elements) = &mut self.kind {
            match key {
                PropertyKey::Index(i) => {
                    if frozen {
                        return false;
                    }
                    let i = *i as usize;
                    // Holes read as undefined; the last element can shrink the array
                    if i + 1 == elements.len() {
                        elements.pop();
                    } else if let Some(slot) = elements.get_mut(i) {
                        *slot = JsValue::Undefined;
                    }
                    return true;
                }
                PropertyKey::String(s) if s == "length" => return false,
                _ => {}
            }
        }
        match self.properties.get(key) {
            Some(prop) if !prop.configurable => false,
            Some(_) => {
                self.properties.shift_remove(key);
                true
            }
            None => true,
        }
    }

    /// Own keys in property order: integer indices ascending, then strings and
    /// symbols in insertion order
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let mut indices: Vec<u32> = Vec::new();
        match &self.kind {
            ObjectKind::Array(elements) => indices.extend(0..elements.len() as u32),
            ObjectKind::StringObject(s) => indices.extend(0..s.utf16_len() as u32),
            _ => {}
        }
        indices.extend(self.properties.keys().filter_map(|k| match k {
            PropertyKey::Index(i) => Some(*i),
            _ => None,
        }));
        indices.sort_unstable();
        indices.dedup();

        let mut keys: Vec<PropertyKey> = indices.into_iter().map(PropertyKey::Index).collect();
        if matches!(self.kind, ObjectKind::Array(_) | ObjectKind::StringObject(_)) {
            keys.push(PropertyKey::from("length"));
        }
        keys.extend(
            self.properties
                .keys()
                .filter(|k| matches!(k, PropertyKey::String(_)))
                .cloned(),
        );
        keys.extend(self.properties.keys().filter(|k| k.is_symbol()).cloned());
        keys
    }

    /// Own enumerable string keys (`Object.keys`, `for-in`)
    pub fn enumerable_keys(&self) -> Vec<PropertyKey> {
        self.own_keys()
            .into_iter()
            .filter(|k| !k.is_symbol())
            .filter(|k| self.get_own_property(k).is_some_and(|p| p.enumerable))
            .collect()
    }
}

/// Object property descriptor
#[derive(Debug, Clone)]
pub struct Property {
    pub value: JsValue,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
    /// Getter function (for accessor properties)
    pub getter: Option<ObjectRef>,
    /// Setter function (for accessor properties)
    pub setter: Option<ObjectRef>,
}

impl Property {
    pub fn data(value: JsValue) -> Self {
        Self {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
            getter: None,
            setter: None,
        }
    }

    /// Writable, configurable, not enumerable
    pub fn hidden(value: JsValue) -> Self {
        Self {
            enumerable: false,
            ..Self::data(value)
        }
    }

    pub fn readonly(value: JsValue) -> Self {
        Self {
            writable: false,
            configurable: false,
            ..Self::data(value)
        }
    }

    /// Not writable, enumerable or configurable (`length` of strings)
    pub fn internal(value: JsValue) -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
            ..Self::data(value)
        }
    }

    pub fn accessor(getter: Option<ObjectRef>, setter: Option<ObjectRef>, enumerable: bool) -> Self {
        Self {
            value: JsValue::Undefined,
            writable: false,
            enumerable,
            configurable: true,
            getter,
            setter,
        }
    }

    pub fn is_accessor(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }

    fn access(&self) -> Access {
        match (&self.getter, self.is_accessor()) {
            (Some(getter), _) => Access::Getter(getter.cheap_clone()),
            (None, true) => Access::Value(JsValue::Undefined),
            (None, false) => Access::Value(self.value.clone()),
        }
    }
}

/// Exotic object behavior
pub enum ObjectKind {
    Ordinary,
    /// Dense elements; holes are stored as `undefined`
    Array(Vec<JsValue>),
    Function(Callable),
    Error,
    Arguments,
    BooleanObject(bool),
    NumberObject(f64),
    StringObject(JsString),
    SymbolObject(JsSymbol),
    Promise(PromiseData),
    Generator(Box<GeneratorData>),
    /// Built-in iterator over an array-like or string
    ListIterator(ListIterator),
}

/// State of an array/string iterator
pub struct ListIterator {
    pub source: JsValue,
    pub index: usize,
    pub kind: ListIteratorKind,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListIteratorKind {
    Keys,
    Values,
    Entries,
}

/// Anything that can be called
#[derive(Clone)]
pub enum Callable {
    /// Interpreted function
    Closure(Rc<Closure>),
    /// Host function
    Native(NativeFunction),
    /// Host function whose callbacks run as frames
    NativeLoop(NativeLoopFunction),
    /// Built-in the evaluator handles itself (may push frames or carry state)
    Intrinsic(Rc<Intrinsic>),
}

impl Callable {
    pub fn name(&self) -> JsString {
        match self {
            Callable::Closure(c) => c.name.cheap_clone(),
            Callable::Native(n) => n.name.cheap_clone(),
            Callable::NativeLoop(n) => n.name.cheap_clone(),
            Callable::Intrinsic(i) => i.name(),
        }
    }

    /// Whether `new` is allowed
    pub fn is_constructor(&self) -> bool {
        match self {
            Callable::Closure(c) => c.is_constructor(),
            Callable::Native(n) => n.construct.is_some(),
            Callable::NativeLoop(n) => n.construct.is_some(),
            Callable::Intrinsic(i) => i.is_constructor(),
        }
    }
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: JsString,
    pub call: NativeFn,
    pub construct: Option<NativeConstructFn>,
    pub arity: u32,
}

#[derive(Clone)]
pub struct NativeLoopFunction {
    pub name: JsString,
    pub start: NativeLoopFn,
    pub construct: Option<NativeLoopConstructFn>,
    pub arity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_virtual_properties() {
        let arr = ObjectRef::new(JsObject::new(
            None,
            ObjectKind::Array(vec![JsValue::from(1), JsValue::from(2)]),
        ));
        assert!(matches!(arr.get(&PropertyKey::from("length")), Access::Value(JsValue::Number(n)) if n == 2.0));

        assert!(matches!(arr.set(PropertyKey::Index(4), JsValue::from(5)), Assign::Done));
        assert!(matches!(arr.get(&PropertyKey::from("length")), Access::Value(JsValue::Number(n)) if n == 5.0));
        assert!(matches!(arr.get(&PropertyKey::Index(3)), Access::Value(JsValue::Undefined)));

        assert!(matches!(arr.set(PropertyKey::from("length"), JsValue::from(1)), Assign::Done));
        assert_eq!(arr.borrow().own_keys().len(), 2);
    }

    #[test]
    fn test_prototype_lookup_and_shadowing() {
        let proto = ObjectRef::new(JsObject::ordinary(None));
        proto.define_value("x", JsValue::from(1));
        let obj = ObjectRef::new(JsObject::ordinary(Some(proto.clone())));

        assert!(matches!(obj.get(&PropertyKey::from("x")), Access::Value(JsValue::Number(n)) if n == 1.0));
        assert!(!obj.borrow().has_own_property(&PropertyKey::from("x")));

        assert!(matches!(obj.set(PropertyKey::from("x"), JsValue::from(2)), Assign::Done));
        assert!(matches!(proto.get(&PropertyKey::from("x")), Access::Value(JsValue::Number(n)) if n == 1.0));
        assert!(obj.borrow().has_own_property(&PropertyKey::from("x")));
    }

    #[test]
    fn test_readonly_rejects_write() {
        let obj = ObjectRef::new(JsObject::ordinary(None));
        obj.borrow_mut()
            .define_property(PropertyKey::from("k"), Property::readonly(JsValue::from(1)));
        assert!(matches!(obj.set(PropertyKey::from("k"), JsValue::from(2)), Assign::Rejected));
        assert!(!obj.borrow_mut().delete(&PropertyKey::from("k")));
    }

    #[test]
    fn test_key_order() {
        let obj = ObjectRef::new(JsObject::ordinary(None));
        obj.define_value("b", JsValue::Null);
        obj.define_value(PropertyKey::Index(2), JsValue::Null);
        obj.define_value("a", JsValue::Null);
        obj.define_value(PropertyKey::Index(0), JsValue::Null);
        let keys: Vec<String> = obj.borrow().own_keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["0", "2", "b", "a"]);
    }
}
