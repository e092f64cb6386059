//! Object constructor and Object.prototype

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::{arg, install_constructor};
use crate::object::{JsObject, ObjectKind, ObjectRef, Property};
use crate::value::{CheapClone, JsValue, PropertyKey, describe};

pub fn init_object(interp: &mut Interpreter) {
    let proto = interp.realm.object_prototype.cheap_clone();

    interp.register_method(&proto, "hasOwnProperty", object_has_own_property, 1);
    interp.register_method(&proto, "isPrototypeOf", object_is_prototype_of, 1);
    interp.register_method(&proto, "propertyIsEnumerable", object_property_is_enumerable, 1);
    interp.register_method(&proto, "toString", object_to_string, 0);
    interp.register_method(&proto, "valueOf", object_value_of, 0);

    let ctor = install_constructor(interp, "Object", object_called, Some(object_construct), 1, &proto);

    // Property enumeration
    interp.register_method(&ctor, "keys", object_keys, 1);
    interp.register_method(&ctor, "values", object_values, 1);
    interp.register_method(&ctor, "entries", object_entries, 1);
    interp.register_method(&ctor, "getOwnPropertyNames", object_get_own_property_names, 1);

    // Object manipulation
    interp.register_method(&ctor, "assign", object_assign, 2);
    interp.register_method(&ctor, "fromEntries", object_from_entries, 1);
    interp.register_method(&ctor, "create", object_create, 2);
    interp.register_method(&ctor, "hasOwn", object_has_own, 2);
    interp.register_method(&ctor, "is", object_is, 2);

    // Freezing/extensibility
    interp.register_method(&ctor, "freeze", object_freeze, 1);
    interp.register_method(&ctor, "isFrozen", object_is_frozen, 1);
    interp.register_method(&ctor, "preventExtensions", object_prevent_extensions, 1);
    interp.register_method(&ctor, "isExtensible", object_is_extensible, 1);

    // Prototypes and descriptors
    interp.register_method(&ctor, "getPrototypeOf", object_get_prototype_of, 1);
    interp.register_method(&ctor, "setPrototypeOf", object_set_prototype_of, 2);
    interp.register_method(&ctor, "defineProperty", object_define_property, 3);
    interp.register_method(&ctor, "defineProperties", object_define_properties, 2);
    interp.register_method(&ctor, "getOwnPropertyDescriptor", object_get_own_property_descriptor, 2);
}

fn object_called(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let value = arg(args, 0);
    if value.is_null_or_undefined() {
        return Ok(JsValue::Object(interp.create_object()));
    }
    Ok(JsValue::Object(interp.to_object(&value)?))
}

fn object_construct(interp: &mut Interpreter, args: &[JsValue], _new_target: &ObjectRef) -> Result<JsValue, JsError> {
    object_called(interp, JsValue::Undefined, args)
}

/// Target object of an `Object.*` static: primitives are boxed
fn target(interp: &Interpreter, args: &[JsValue]) -> Result<ObjectRef, JsError> {
    interp.to_object(&arg(args, 0))
}

fn require_object(value: &JsValue, what: &str) -> Result<ObjectRef, JsError> {
    match value {
        JsValue::Object(obj) => Ok(obj.cheap_clone()),
        other => Err(JsError::type_error(format!("{} called on non-object {}", what, describe(other)))),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Object.prototype
// ═══════════════════════════════════════════════════════════════════════════

fn object_has_own_property(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let key = interp.to_property_key(&arg(args, 0))?;
    let obj = interp.to_object(&this)?;
    let has = obj.borrow().has_own_property(&key);
    Ok(JsValue::Boolean(has))
}

fn object_is_prototype_of(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let JsValue::Object(candidate) = arg(args, 0) else {
        return Ok(JsValue::Boolean(false));
    };
    let proto = interp.to_object(&this)?;
    Ok(JsValue::Boolean(candidate.inherits_from(&proto)))
}

fn object_property_is_enumerable(
    interp: &mut Interpreter,
    this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let key = interp.to_property_key(&arg(args, 0))?;
    let obj = interp.to_object(&this)?;
    let enumerable = obj.borrow().get_own_property(&key).is_some_and(|p| p.enumerable);
    Ok(JsValue::Boolean(enumerable))
}

fn object_to_string(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let tag = match &this {
        JsValue::Undefined => "Undefined",
        JsValue::Null => "Null",
        JsValue::Boolean(_) => "Boolean",
        JsValue::Number(_) => "Number",
        JsValue::String(_) => "String",
        JsValue::Symbol(_) => "Symbol",
        JsValue::Object(obj) => match &obj.borrow().kind {
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
            ObjectKind::Arguments => "Arguments",
            ObjectKind::BooleanObject(_) => "Boolean",
            ObjectKind::NumberObject(_) => "Number",
            ObjectKind::StringObject(_) => "String",
            ObjectKind::SymbolObject(_) => "Symbol",
            ObjectKind::Promise(_) => "Promise",
            ObjectKind::Generator(_) => "Generator",
            ObjectKind::ListIterator(_) => "Array Iterator",
            ObjectKind::Ordinary => "Object",
        },
    };
    Ok(JsValue::from(format!("[object {}]", tag)))
}

fn object_value_of(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Object(interp.to_object(&this)?))
}

// ═══════════════════════════════════════════════════════════════════════════
// Enumeration
// ═══════════════════════════════════════════════════════════════════════════

fn object_keys(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let obj = target(interp, args)?;
    let keys: Vec<JsValue> = obj.borrow().enumerable_keys().iter().map(PropertyKey::to_value).collect();
    Ok(JsValue::Object(interp.create_array(keys)))
}

fn object_values(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let obj = target(interp, args)?;
    let receiver = JsValue::Object(obj.cheap_clone());
    let keys = obj.borrow().enumerable_keys();
    let mut values = Vec::with_capacity(keys.len());
    for key in keys {
        values.push(interp.get_value(&receiver, &key)?);
    }
    Ok(JsValue::Object(interp.create_array(values)))
}

fn object_entries(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let obj = target(interp, args)?;
    let receiver = JsValue::Object(obj.cheap_clone());
    let keys = obj.borrow().enumerable_keys();
    let mut entries = Vec::with_capacity(keys.len());
    for key in keys {
        let value = interp.get_value(&receiver, &key)?;
        let pair = interp.create_array(vec![key.to_value(), value]);
        entries.push(JsValue::Object(pair));
    }
    Ok(JsValue::Object(interp.create_array(entries)))
}

fn object_get_own_property_names(
    interp: &mut Interpreter,
    _this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let obj = target(interp, args)?;
    let names: Vec<JsValue> = obj
        .borrow()
        .own_keys()
        .iter()
        .filter(|k| !k.is_symbol())
        .map(PropertyKey::to_value)
        .collect();
    Ok(JsValue::Object(interp.create_array(names)))
}

// ═══════════════════════════════════════════════════════════════════════════
// Manipulation
// ═══════════════════════════════════════════════════════════════════════════

fn object_assign(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let target = target(interp, args)?;
    for source in args.iter().skip(1) {
        if source.is_null_or_undefined() {
            continue;
        }
        let from = interp.to_object(source)?;
        let keys: Vec<PropertyKey> = {
            let o = from.borrow();
            o.own_keys()
                .into_iter()
                .filter(|k| o.get_own_property(k).is_some_and(|p| p.enumerable))
                .collect()
        };
        let receiver = JsValue::Object(from);
        for key in keys {
            let value = interp.get_value(&receiver, &key)?;
            interp.set_value(&target, key, value)?;
        }
    }
    Ok(JsValue::Object(target))
}

fn object_from_entries(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let entries = interp.iterate_to_list(&arg(args, 0))?;
    let obj = interp.create_object();
    for entry in entries {
        if !entry.is_object() {
            return Err(JsError::type_error(format!(
                "Iterator value {} is not an entry object",
                describe(&entry)
            )));
        }
        let key = interp.get_value(&entry, &PropertyKey::Index(0))?;
        let value = interp.get_value(&entry, &PropertyKey::Index(1))?;
        let key = interp.to_property_key(&key)?;
        obj.define_value(key, value);
    }
    Ok(JsValue::Object(obj))
}

fn object_create(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let prototype = match arg(args, 0) {
        JsValue::Object(proto) => Some(proto),
        JsValue::Null => None,
        other => {
            return Err(JsError::type_error(format!(
                "Object prototype may only be an Object or null: {}",
                describe(&other)
            )));
        }
    };
    let obj = ObjectRef::new(JsObject::ordinary(prototype));
    let properties = arg(args, 1);
    if !properties.is_undefined() {
        define_properties(interp, &obj, &properties)?;
    }
    Ok(JsValue::Object(obj))
}

fn object_has_own(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let obj = target(interp, args)?;
    let key = interp.to_property_key(&arg(args, 1))?;
    let has = obj.borrow().has_own_property(&key);
    Ok(JsValue::Boolean(has))
}

fn object_is(_interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let (x, y) = (arg(args, 0), arg(args, 1));
    let same = match (&x, &y) {
        (JsValue::Number(a), JsValue::Number(b)) => {
            (a.is_nan() && b.is_nan()) || (a == b && a.is_sign_negative() == b.is_sign_negative())
        }
        _ => x.strict_equals(&y),
    };
    Ok(JsValue::Boolean(same))
}

// ═══════════════════════════════════════════════════════════════════════════
// Integrity
// ═══════════════════════════════════════════════════════════════════════════

fn object_freeze(_interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let value = arg(args, 0);
    if let JsValue::Object(obj) = &value {
        let mut o = obj.borrow_mut();
        o.extensible = false;
        o.frozen = true;
        for prop in o.properties.values_mut() {
            if !prop.is_accessor() {
                prop.writable = false;
            }
            prop.configurable = false;
        }
    }
    Ok(value)
}

fn object_is_frozen(_interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let JsValue::Object(obj) = arg(args, 0) else {
        return Ok(JsValue::Boolean(true));
    };
    let o = obj.borrow();
    let elements_frozen = match &o.kind {
        ObjectKind::Array(elements) => o.frozen || elements.is_empty(),
        _ => true,
    };
    let frozen = !o.extensible
        && elements_frozen
        && o
            .properties
            .values()
            .all(|p| !p.configurable && (p.is_accessor() || !p.writable));
    Ok(JsValue::Boolean(frozen))
}

fn object_prevent_extensions(
    _interp: &mut Interpreter,
    _this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let value = arg(args, 0);
    if let JsValue::Object(obj) = &value {
        obj.borrow_mut().extensible = false;
    }
    Ok(value)
}

fn object_is_extensible(_interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let extensible = match arg(args, 0) {
        JsValue::Object(obj) => obj.borrow().extensible,
        _ => false,
    };
    Ok(JsValue::Boolean(extensible))
}

// ═══════════════════════════════════════════════════════════════════════════
// Prototypes and descriptors
// ═══════════════════════════════════════════════════════════════════════════

fn object_get_prototype_of(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let obj = target(interp, args)?;
    Ok(obj.prototype().map(JsValue::Object).unwrap_or(JsValue::Null))
}

fn object_set_prototype_of(
    _interp: &mut Interpreter,
    _this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let value = arg(args, 0);
    let prototype = match arg(args, 1) {
        JsValue::Object(proto) => Some(proto),
        JsValue::Null => None,
        other => {
            return Err(JsError::type_error(format!(
                "Object prototype may only be an Object or null: {}",
                describe(&other)
            )));
        }
    };
    let JsValue::Object(obj) = &value else {
        return Ok(value);
    };
    if let Some(proto) = &prototype
        && (proto.ptr_eq(obj) || proto.inherits_from(obj))
    {
        return Err(JsError::type_error("Cyclic __proto__ value"));
    }
    let mut o = obj.borrow_mut();
    let unchanged = match (&o.prototype, &prototype) {
        (Some(a), Some(b)) => a.ptr_eq(b),
        (None, None) => true,
        _ => false,
    };
    if !unchanged && !o.extensible {
        return Err(JsError::type_error("Object is not extensible"));
    }
    o.prototype = prototype;
    drop(o);
    Ok(value)
}

fn object_define_property(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let obj = require_object(&arg(args, 0), "Object.defineProperty")?;
    let key = interp.to_property_key(&arg(args, 1))?;
    define_from_descriptor(interp, &obj, key, &arg(args, 2))?;
    Ok(JsValue::Object(obj))
}

fn object_define_properties(
    interp: &mut Interpreter,
    _this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let obj = require_object(&arg(args, 0), "Object.defineProperties")?;
    define_properties(interp, &obj, &arg(args, 1))?;
    Ok(JsValue::Object(obj))
}

fn object_get_own_property_descriptor(
    interp: &mut Interpreter,
    _this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let obj = target(interp, args)?;
    let key = interp.to_property_key(&arg(args, 1))?;
    let Some(prop) = obj.borrow().get_own_property(&key) else {
        return Ok(JsValue::Undefined);
    };
    let desc = interp.create_object();
    if prop.is_accessor() {
        desc.define_value("get", prop.getter.map(JsValue::Object).unwrap_or_default());
        desc.define_value("set", prop.setter.map(JsValue::Object).unwrap_or_default());
    } else {
        desc.define_value("value", prop.value);
        desc.define_value("writable", JsValue::Boolean(prop.writable));
    }
    desc.define_value("enumerable", JsValue::Boolean(prop.enumerable));
    desc.define_value("configurable", JsValue::Boolean(prop.configurable));
    Ok(JsValue::Object(desc))
}

fn define_properties(interp: &mut Interpreter, obj: &ObjectRef, properties: &JsValue) -> Result<(), JsError> {
    let props = interp.to_object(properties)?;
    let keys = props.borrow().enumerable_keys();
    let source = JsValue::Object(props);
    for key in keys {
        let descriptor = interp.get_value(&source, &key)?;
        define_from_descriptor(interp, obj, key, &descriptor)?;
    }
    Ok(())
}

/// `[[DefineOwnProperty]]` from a guest descriptor object. Missing fields
/// keep the existing attribute or default to false.
fn define_from_descriptor(
    interp: &mut Interpreter,
    obj: &ObjectRef,
    key: PropertyKey,
    descriptor: &JsValue,
) -> Result<(), JsError> {
    if !descriptor.is_object() {
        return Err(JsError::type_error(format!(
            "Property description must be an object: {}",
            describe(descriptor)
        )));
    }
    let existing = obj.borrow().get_own_property(&key);
    if let Some(current) = &existing
        && !current.configurable
    {
        return Err(JsError::type_error(format!("Cannot redefine property: {}", key)));
    }
    if existing.is_none() && !obj.borrow().extensible {
        return Err(JsError::type_error(format!(
            "Cannot define property {}, object is not extensible",
            key
        )));
    }

    let field = |interp: &mut Interpreter, name: &str| -> Result<Option<JsValue>, JsError> {
        let name = PropertyKey::from(name);
        let present = descriptor.as_object().is_some_and(|d| d.has_property(&name));
        if present { interp.get_value(descriptor, &name).map(Some) } else { Ok(None) }
    };
    let accessor_fn = |value: Option<JsValue>, what: &str| -> Result<Option<ObjectRef>, JsError> {
        match value {
            None | Some(JsValue::Undefined) => Ok(None),
            Some(JsValue::Object(f)) if f.is_callable() => Ok(Some(f)),
            Some(other) => Err(JsError::type_error(format!(
                "{} must be a function: {}",
                what,
                describe(&other)
            ))),
        }
    };

    let value = field(interp, "value")?;
    let writable = field(interp, "writable")?.map(|v| v.to_boolean());
    let enumerable = field(interp, "enumerable")?.map(|v| v.to_boolean());
    let configurable = field(interp, "configurable")?.map(|v| v.to_boolean());
    let get = field(interp, "get")?;
    let set = field(interp, "set")?;

    let base = existing.unwrap_or(Property {
        value: JsValue::Undefined,
        writable: false,
        enumerable: false,
        configurable: false,
        getter: None,
        setter: None,
    });
    let enumerable = enumerable.unwrap_or(base.enumerable);
    let configurable = configurable.unwrap_or(base.configurable);

    let prop = if get.is_some() || set.is_some() {
        if value.is_some() || writable.is_some() {
            return Err(JsError::type_error(
                "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
            ));
        }
        let getter = match get {
            Some(g) => accessor_fn(Some(g), "Getter")?,
            None => base.getter,
        };
        let setter = match set {
            Some(s) => accessor_fn(Some(s), "Setter")?,
            None => base.setter,
        };
        Property {
            configurable,
            ..Property::accessor(getter, setter, enumerable)
        }
    } else {
        Property {
            value: value.unwrap_or(base.value),
            writable: writable.unwrap_or(base.writable),
            enumerable,
            configurable,
            getter: None,
            setter: None,
        }
    };
    obj.borrow_mut().define_property(key, prop);
    Ok(())
}
