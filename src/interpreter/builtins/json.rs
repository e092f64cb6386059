//! JSON object and host value conversion
//!
//! `JSON.stringify` writes text directly so property order, `toJSON` and
//! getters behave as guest code expects; `serde_json` provides string
//! escaping and parsing.

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::arg;
use crate::object::ObjectKind;
use crate::value::{JsString, JsValue, PropertyKey, number_to_string};

pub fn init_json(interp: &mut Interpreter) {
    let json = interp.create_object();
    interp.register_method(&json, "stringify", json_stringify, 3);
    interp.register_method(&json, "parse", json_parse, 2);
    interp.realm.global.define_hidden("JSON", JsValue::Object(json));
}

// ═══════════════════════════════════════════════════════════════════════════
// stringify
// ═══════════════════════════════════════════════════════════════════════════

struct Stringifier {
    replacer: Option<JsValue>,
    /// Property allow-list from an array replacer
    allowed: Option<Vec<PropertyKey>>,
    gap: String,
    indent: String,
    /// Objects on the current path, for cycle detection
    stack: Vec<usize>,
}

impl Stringifier {
    fn plain() -> Self {
        Self {
            replacer: None,
            allowed: None,
            gap: String::new(),
            indent: String::new(),
            stack: Vec::new(),
        }
    }
}

fn json_stringify(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let mut ctx = Stringifier::plain();

    let replacer = arg(args, 1);
    if replacer.is_callable() {
        ctx.replacer = Some(replacer);
    } else if replacer.as_object().is_some_and(|o| o.is_array()) {
        let mut allowed: Vec<PropertyKey> = Vec::new();
        for item in interp.list_from_array_like(&replacer)? {
            let key = match &item {
                JsValue::String(_) | JsValue::Number(_) => Some(interp.to_property_key(&item)?),
                JsValue::Object(obj) if matches!(obj.borrow().kind, ObjectKind::StringObject(_) | ObjectKind::NumberObject(_)) => {
                    Some(PropertyKey::from(interp.to_string(&item)?))
                }
                _ => None,
            };
            if let Some(key) = key
                && !allowed.contains(&key)
            {
                allowed.push(key);
            }
        }
        ctx.allowed = Some(allowed);
    }

    let space = arg(args, 2);
    let space = match &space {
        JsValue::Object(obj) => match &obj.borrow().kind {
            ObjectKind::NumberObject(n) => JsValue::Number(*n),
            ObjectKind::StringObject(s) => JsValue::String(s.clone()),
            _ => JsValue::Undefined,
        },
        other => other.clone(),
    };
    ctx.gap = match space {
        JsValue::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        JsValue::String(s) => s.as_str().chars().take(10).collect(),
        _ => String::new(),
    };

    let holder = interp.create_object();
    let value = arg(args, 0);
    holder.define_value("", value.clone());
    let text = serialize_property(interp, &mut ctx, &JsValue::Object(holder), &PropertyKey::from(""), value)?;
    Ok(text.map(JsValue::from).unwrap_or_default())
}

/// JSON text of a value, `None` when the value is not serializable
/// (`undefined`, functions, symbols)
pub(crate) fn stringify(interp: &mut Interpreter, value: &JsValue) -> Result<Option<String>, JsError> {
    let mut ctx = Stringifier::plain();
    let holder = interp.create_object();
    holder.define_value("", value.clone());
    serialize_property(interp, &mut ctx, &JsValue::Object(holder), &PropertyKey::from(""), value.clone())
}

fn quote(s: &str) -> Result<String, JsError> {
    serde_json::to_string(s).map_err(|e| JsError::internal_error(format!("string escape failed: {}", e)))
}

fn serialize_property(
    interp: &mut Interpreter,
    ctx: &mut Stringifier,
    holder: &JsValue,
    key: &PropertyKey,
    mut value: JsValue,
) -> Result<Option<String>, JsError> {
    if value.is_object() {
        let to_json = interp.get_named(&value, "toJSON")?;
        if to_json.is_callable() {
            value = interp.call_function(&to_json, value, &[key.to_value()])?;
        }
    }
    if let Some(replacer) = ctx.replacer.clone() {
        value = interp.call_function(&replacer, holder.clone(), &[key.to_value(), value])?;
    }

    // Wrapper objects serialize as their primitive
    if let JsValue::Object(obj) = &value {
        let unwrapped = match &obj.borrow().kind {
            ObjectKind::NumberObject(_) => Some(true),
            ObjectKind::StringObject(_) => Some(false),
            ObjectKind::BooleanObject(b) => return Ok(Some(b.to_string())),
            _ => None,
        };
        match unwrapped {
            Some(true) => value = JsValue::Number(interp.to_number(&value)?),
            Some(false) => value = JsValue::String(interp.to_string(&value)?),
            None => {}
        }
    }

    Ok(match &value {
        JsValue::Null => Some("null".to_string()),
        JsValue::Boolean(b) => Some(b.to_string()),
        JsValue::String(s) => Some(quote(s.as_str())?),
        JsValue::Number(n) => Some(if n.is_finite() { number_to_string(*n) } else { "null".to_string() }),
        JsValue::Undefined | JsValue::Symbol(_) => None,
        JsValue::Object(obj) if obj.is_callable() => None,
        JsValue::Object(obj) => {
            let id = obj.id();
            if ctx.stack.contains(&id) {
                return Err(JsError::type_error("Converting circular structure to JSON"));
            }
            ctx.stack.push(id);
            let stepback = ctx.indent.clone();
            ctx.indent.push_str(&ctx.gap.clone());
            let text = if obj.is_array() {
                serialize_array(interp, ctx, &value)
            } else {
                serialize_object(interp, ctx, &value)
            };
            ctx.indent = stepback;
            ctx.stack.pop();
            Some(text?)
        }
    })
}

/// Wrap serialized members in brackets, one per line when a gap is set
fn wrap(ctx: &Stringifier, open: char, close: char, parts: Vec<String>) -> String {
    if parts.is_empty() {
        return format!("{}{}", open, close);
    }
    if ctx.gap.is_empty() {
        return format!("{}{}{}", open, parts.join(","), close);
    }
    let stepback_len = ctx.indent.len().saturating_sub(ctx.gap.len());
    let stepback = ctx.indent.get(..stepback_len).unwrap_or("");
    let separator = format!(",\n{}", ctx.indent);
    format!("{}\n{}{}\n{}{}", open, ctx.indent, parts.join(&separator), stepback, close)
}

fn serialize_object(interp: &mut Interpreter, ctx: &mut Stringifier, value: &JsValue) -> Result<String, JsError> {
    let keys = match (&ctx.allowed, value.as_object()) {
        (Some(allowed), _) => allowed.clone(),
        (None, Some(obj)) => obj.borrow().enumerable_keys(),
        (None, None) => Vec::new(),
    };
    let mut parts = Vec::new();
    for key in keys {
        let member = interp.get_value(value, &key)?;
        if let Some(text) = serialize_property(interp, ctx, value, &key, member)? {
            let separator = if ctx.gap.is_empty() { ":" } else { ": " };
            parts.push(format!("{}{}{}", quote(&key.to_string())?, separator, text));
        }
    }
    Ok(wrap(ctx, '{', '}', parts))
}

fn serialize_array(interp: &mut Interpreter, ctx: &mut Stringifier, value: &JsValue) -> Result<String, JsError> {
    let len = interp.get_named(value, "length")?;
    let len = interp.to_integer(&len)?.max(0.0) as usize;
    let mut parts = Vec::with_capacity(len);
    for i in 0..len {
        let key = PropertyKey::Index(i as u32);
        let element = interp.get_value(value, &key)?;
        let text = serialize_property(interp, ctx, value, &key, element)?;
        parts.push(text.unwrap_or_else(|| "null".to_string()));
    }
    Ok(wrap(ctx, '[', ']', parts))
}

// ═══════════════════════════════════════════════════════════════════════════
// parse
// ═══════════════════════════════════════════════════════════════════════════

fn json_parse(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let text = interp.to_string(&arg(args, 0))?;
    let json: serde_json::Value = serde_json::from_str(text.as_str()).map_err(|e| {
        JsError::syntax_error(
            format!("Unexpected token in JSON at line {} column {}", e.line(), e.column()),
            e.line() as u32,
            e.column() as u32,
        )
    })?;
    let value = json_to_value(interp, &json);

    let reviver = arg(args, 1);
    if !reviver.is_callable() {
        return Ok(value);
    }
    let root = interp.create_object();
    root.define_value("", value);
    internalize(interp, &JsValue::Object(root), &PropertyKey::from(""), &reviver)
}

/// Apply a `JSON.parse` reviver bottom-up
fn internalize(interp: &mut Interpreter, holder: &JsValue, key: &PropertyKey, reviver: &JsValue) -> Result<JsValue, JsError> {
    let value = interp.get_value(holder, key)?;
    if let JsValue::Object(obj) = &value {
        let keys: Vec<PropertyKey> = if obj.is_array() {
            let len = interp.get_named(&value, "length")?;
            let len = interp.to_integer(&len)?.max(0.0) as u32;
            (0..len).map(PropertyKey::Index).collect()
        } else {
            obj.borrow().enumerable_keys()
        };
        for child in keys {
            let revived = internalize(interp, &value, &child, reviver)?;
            if revived.is_undefined() {
                obj.borrow_mut().delete(&child);
            } else {
                obj.define_value(child, revived);
            }
        }
    }
    interp.call_function(reviver, holder.clone(), &[key.to_value(), value])
}

// ═══════════════════════════════════════════════════════════════════════════
// Host conversion
// ═══════════════════════════════════════════════════════════════════════════

/// Build a guest value from host JSON
pub fn json_to_value(interp: &Interpreter, json: &serde_json::Value) -> JsValue {
    match json {
        serde_json::Value::Null => JsValue::Null,
        serde_json::Value::Bool(b) => JsValue::Boolean(*b),
        serde_json::Value::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => JsValue::String(JsString::from(s.as_str())),
        serde_json::Value::Array(items) => {
            let elements = items.iter().map(|item| json_to_value(interp, item)).collect();
            JsValue::Object(interp.create_array(elements))
        }
        serde_json::Value::Object(map) => {
            let obj = interp.create_object();
            for (key, value) in map {
                obj.define_value(PropertyKey::from(key.as_str()), json_to_value(interp, value));
            }
            JsValue::Object(obj)
        }
    }
}

/// Host JSON of a guest value, following `JSON.stringify` rules.
/// Values `JSON.stringify` skips (`undefined`, functions) become `null`.
pub fn value_to_json(interp: &mut Interpreter, value: &JsValue) -> Result<serde_json::Value, JsError> {
    match stringify(interp, value)? {
        None => Ok(serde_json::Value::Null),
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| JsError::internal_error(format!("stringified value is not JSON: {}", e))),
    }
}
