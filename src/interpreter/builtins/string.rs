//! String constructor and String.prototype
//!
//! Indices are UTF-16 code units, as guest code observes them.

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::array::create_list_iterator;
use crate::interpreter::builtins::{arg, install_constructor};
use crate::interpreter::callback::{CallbackLoop, LoopStep, ready};
use crate::object::{JsObject, ListIteratorKind, ObjectKind, ObjectRef};
use crate::value::{CheapClone, JsString, JsValue, PropertyKey, describe};

pub fn init_string(interp: &mut Interpreter) {
    let proto = interp.realm.string_prototype.cheap_clone();
    proto.borrow_mut().kind = ObjectKind::StringObject(JsString::default());

    interp.register_method(&proto, "charAt", string_char_at, 1);
    interp.register_method(&proto, "charCodeAt", string_char_code_at, 1);
    interp.register_method(&proto, "codePointAt", string_code_point_at, 1);
    interp.register_method(&proto, "at", string_at, 1);
    interp.register_method(&proto, "indexOf", string_index_of, 1);
    interp.register_method(&proto, "lastIndexOf", string_last_index_of, 1);
    interp.register_method(&proto, "includes", string_includes, 1);
    interp.register_method(&proto, "startsWith", string_starts_with, 1);
    interp.register_method(&proto, "endsWith", string_ends_with, 1);
    interp.register_method(&proto, "slice", string_slice, 2);
    interp.register_method(&proto, "substring", string_substring, 2);
    interp.register_method(&proto, "substr", string_substr, 2);
    interp.register_method(&proto, "toUpperCase", string_to_upper_case, 0);
    interp.register_method(&proto, "toLowerCase", string_to_lower_case, 0);
    interp.register_method(&proto, "trim", string_trim, 0);
    interp.register_method(&proto, "trimStart", string_trim_start, 0);
    interp.register_method(&proto, "trimEnd", string_trim_end, 0);
    interp.register_method(&proto, "padStart", string_pad_start, 2);
    interp.register_method(&proto, "padEnd", string_pad_end, 2);
    interp.register_method(&proto, "repeat", string_repeat, 1);
    interp.register_method(&proto, "split", string_split, 2);
    interp.register_method(&proto, "concat", string_concat, 1);
    interp.register_loop_method(&proto, "replace", string_replace, 2);
    interp.register_loop_method(&proto, "replaceAll", string_replace_all, 2);
    interp.register_method(&proto, "localeCompare", string_locale_compare, 1);
    interp.register_method(&proto, "toString", string_value_of, 0);
    interp.register_method(&proto, "valueOf", string_value_of, 0);

    let iterator = interp.create_native_function("[Symbol.iterator]", string_iterator, 0);
    proto.define_hidden(
        PropertyKey::Symbol(interp.realm.symbol_iterator.clone()),
        JsValue::Object(iterator),
    );

    let ctor = install_constructor(interp, "String", string_called, Some(string_construct), 1, &proto);
    interp.register_method(&ctor, "fromCharCode", string_from_char_code, 1);
    interp.register_method(&ctor, "fromCodePoint", string_from_code_point, 1);
}

fn string_called(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(match args.first() {
        None => JsValue::from(""),
        Some(JsValue::Symbol(sym)) => JsValue::from(sym.descriptive_string()),
        Some(value) => JsValue::String(interp.to_string(value)?),
    })
}

fn string_construct(interp: &mut Interpreter, args: &[JsValue], new_target: &ObjectRef) -> Result<JsValue, JsError> {
    let value = match args.first() {
        None => JsString::default(),
        Some(value) => interp.to_string(value)?,
    };
    let fallback = interp.realm.string_prototype.cheap_clone();
    let proto = interp.prototype_from_constructor(new_target, &fallback)?;
    Ok(JsValue::Object(ObjectRef::new(JsObject::new(
        Some(proto),
        ObjectKind::StringObject(value),
    ))))
}

fn string_from_char_code(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let mut units = Vec::with_capacity(args.len());
    for value in args {
        units.push(interp.to_uint32(value)? as u16);
    }
    Ok(JsValue::from(String::from_utf16_lossy(&units)))
}

fn string_from_code_point(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let mut out = String::new();
    for value in args {
        let n = interp.to_number(value)?;
        let ch = (n.fract() == 0.0 && n >= 0.0)
            .then(|| char::from_u32(n as u32))
            .flatten()
            .ok_or_else(|| JsError::range_error(format!("Invalid code point {}", describe(value))))?;
        out.push(ch);
    }
    Ok(JsValue::from(out))
}

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

/// `this` coerced to a string; `null`/`undefined` receivers throw
fn this_string(interp: &mut Interpreter, this: &JsValue, method: &str) -> Result<JsString, JsError> {
    match this {
        JsValue::String(s) => Ok(s.cheap_clone()),
        JsValue::Undefined | JsValue::Null => Err(JsError::type_error(format!(
            "String.prototype.{} called on null or undefined",
            method
        ))),
        JsValue::Object(obj) => {
            if let ObjectKind::StringObject(s) = &obj.borrow().kind {
                return Ok(s.cheap_clone());
            }
            interp.to_string(this)
        }
        other => interp.to_string(other),
    }
}

fn units(s: &JsString) -> Vec<u16> {
    s.as_str().encode_utf16().collect()
}

fn from_units(units: &[u16]) -> JsValue {
    JsValue::from(String::from_utf16_lossy(units))
}

fn string_arg(interp: &mut Interpreter, args: &[JsValue], index: usize) -> Result<Vec<u16>, JsError> {
    let s = interp.to_string(&arg(args, index))?;
    Ok(units(&s))
}

/// Integer position argument clamped to `0..=len`
fn position(interp: &mut Interpreter, value: &JsValue, len: usize, default: usize) -> Result<usize, JsError> {
    if value.is_undefined() {
        return Ok(default);
    }
    let n = interp.to_integer(value)?;
    Ok(n.clamp(0.0, len as f64) as usize)
}

/// Relative position (`-1` is the last unit) clamped to `0..=len`
fn relative(interp: &mut Interpreter, value: &JsValue, len: usize, default: usize) -> Result<usize, JsError> {
    if value.is_undefined() {
        return Ok(default);
    }
    let n = interp.to_integer(value)?;
    let len_f = len as f64;
    Ok(if n < 0.0 { (len_f + n).max(0.0) } else { n.min(len_f) } as usize)
}

fn find_from(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return (from <= haystack.len()).then_some(from);
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .skip(from)
        .find(|(_, w)| *w == needle)
        .map(|(i, _)| i)
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

// ═══════════════════════════════════════════════════════════════════════════
// Character access
// ═══════════════════════════════════════════════════════════════════════════

fn string_char_at(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "charAt")?;
    let index = interp.to_integer(&arg(args, 0))?;
    if index < 0.0 {
        return Ok(JsValue::from(""));
    }
    Ok(match s.code_unit_at(index as usize) {
        Some(unit) => from_units(&[unit]),
        None => JsValue::from(""),
    })
}

fn string_char_code_at(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "charCodeAt")?;
    let index = interp.to_integer(&arg(args, 0))?;
    if index < 0.0 {
        return Ok(JsValue::Number(f64::NAN));
    }
    Ok(match s.code_unit_at(index as usize) {
        Some(unit) => JsValue::from(u32::from(unit)),
        None => JsValue::Number(f64::NAN),
    })
}

fn string_code_point_at(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "codePointAt")?;
    let index = interp.to_integer(&arg(args, 0))?;
    if index < 0.0 {
        return Ok(JsValue::Undefined);
    }
    let index = index as usize;
    let Some(first) = s.code_unit_at(index) else {
        return Ok(JsValue::Undefined);
    };
    if (0xD800..=0xDBFF).contains(&first)
        && let Some(second) = s.code_unit_at(index + 1)
        && (0xDC00..=0xDFFF).contains(&second)
    {
        let cp = 0x10000 + ((u32::from(first) - 0xD800) << 10) + (u32::from(second) - 0xDC00);
        return Ok(JsValue::from(cp));
    }
    Ok(JsValue::from(u32::from(first)))
}

fn string_at(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "at")?;
    let len = s.utf16_len() as f64;
    let rel = interp.to_integer(&arg(args, 0))?;
    let index = if rel < 0.0 { len + rel } else { rel };
    if index < 0.0 || index >= len {
        return Ok(JsValue::Undefined);
    }
    Ok(s.code_unit_at(index as usize).map(|u| from_units(&[u])).unwrap_or_default())
}

// ═══════════════════════════════════════════════════════════════════════════
// Search
// ═══════════════════════════════════════════════════════════════════════════

fn string_index_of(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = units(&this_string(interp, &this, "indexOf")?);
    let needle = string_arg(interp, args, 0)?;
    let from = position(interp, &arg(args, 1), s.len(), 0)?;
    Ok(match find_from(&s, &needle, from) {
        Some(i) => JsValue::from(i),
        None => JsValue::Number(-1.0),
    })
}

fn string_last_index_of(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = units(&this_string(interp, &this, "lastIndexOf")?);
    let needle = string_arg(interp, args, 0)?;
    let from = match arg(args, 1) {
        JsValue::Undefined => s.len(),
        other => {
            let n = interp.to_number(&other)?;
            if n.is_nan() { s.len() } else { n.clamp(0.0, s.len() as f64) as usize }
        }
    };
    let last_start = s.len().saturating_sub(needle.len()).min(from);
    if needle.len() > s.len() {
        return Ok(JsValue::Number(-1.0));
    }
    let found = (0..=last_start)
        .rev()
        .find(|&i| s.get(i..i + needle.len()) == Some(needle.as_slice()));
    Ok(match found {
        Some(i) => JsValue::from(i),
        None => JsValue::Number(-1.0),
    })
}

fn string_includes(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = units(&this_string(interp, &this, "includes")?);
    let needle = string_arg(interp, args, 0)?;
    let from = position(interp, &arg(args, 1), s.len(), 0)?;
    Ok(JsValue::Boolean(find_from(&s, &needle, from).is_some()))
}

fn string_starts_with(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = units(&this_string(interp, &this, "startsWith")?);
    let needle = string_arg(interp, args, 0)?;
    let start = position(interp, &arg(args, 1), s.len(), 0)?;
    let matched = s.get(start..).is_some_and(|rest| rest.starts_with(&needle));
    Ok(JsValue::Boolean(matched))
}

fn string_ends_with(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = units(&this_string(interp, &this, "endsWith")?);
    let needle = string_arg(interp, args, 0)?;
    let end = position(interp, &arg(args, 1), s.len(), s.len())?;
    let matched = s.get(..end).is_some_and(|head| head.ends_with(&needle));
    Ok(JsValue::Boolean(matched))
}

// ═══════════════════════════════════════════════════════════════════════════
// Substrings
// ═══════════════════════════════════════════════════════════════════════════

fn string_slice(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "slice")?;
    let len = s.utf16_len();
    let start = relative(interp, &arg(args, 0), len, 0)?;
    let end = relative(interp, &arg(args, 1), len, len)?;
    Ok(JsValue::String(s.utf16_slice(start, end.max(start))))
}

fn string_substring(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "substring")?;
    let len = s.utf16_len();
    let a = position(interp, &arg(args, 0), len, 0)?;
    let b = position(interp, &arg(args, 1), len, len)?;
    Ok(JsValue::String(s.utf16_slice(a.min(b), a.max(b))))
}

fn string_substr(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "substr")?;
    let len = s.utf16_len();
    let start = relative(interp, &arg(args, 0), len, 0)?;
    let count = match arg(args, 1) {
        JsValue::Undefined => len - start,
        other => interp.to_integer(&other)?.clamp(0.0, (len - start) as f64) as usize,
    };
    Ok(JsValue::String(s.utf16_slice(start, start + count)))
}

// ═══════════════════════════════════════════════════════════════════════════
// Transformations
// ═══════════════════════════════════════════════════════════════════════════

fn string_to_upper_case(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "toUpperCase")?;
    Ok(JsValue::from(s.as_str().to_uppercase()))
}

fn string_to_lower_case(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "toLowerCase")?;
    Ok(JsValue::from(s.as_str().to_lowercase()))
}

fn string_trim(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "trim")?;
    Ok(JsValue::from(s.as_str().trim_matches(is_js_whitespace)))
}

fn string_trim_start(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "trimStart")?;
    Ok(JsValue::from(s.as_str().trim_start_matches(is_js_whitespace)))
}

fn string_trim_end(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "trimEnd")?;
    Ok(JsValue::from(s.as_str().trim_end_matches(is_js_whitespace)))
}

fn pad(interp: &mut Interpreter, this: JsValue, args: &[JsValue], method: &str, at_start: bool) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, method)?;
    let target = interp.to_integer(&arg(args, 0))?;
    let filler: Vec<u16> = match arg(args, 1) {
        JsValue::Undefined => vec![u16::from(b' ')],
        other => units(&interp.to_string(&other)?),
    };
    let len = s.utf16_len();
    if target <= len as f64 || filler.is_empty() {
        return Ok(JsValue::String(s));
    }
    if target > f64::from(1u32 << 29) {
        return Err(JsError::range_error("Invalid string length"));
    }
    let fill_len = target as usize - len;
    let padding: Vec<u16> = filler.iter().copied().cycle().take(fill_len).collect();
    let own = units(&s);
    let joined = if at_start { [padding, own].concat() } else { [own, padding].concat() };
    Ok(from_units(&joined))
}

fn string_pad_start(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    pad(interp, this, args, "padStart", true)
}

fn string_pad_end(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    pad(interp, this, args, "padEnd", false)
}

fn string_repeat(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "repeat")?;
    let count = interp.to_integer(&arg(args, 0))?;
    if count < 0.0 || count.is_infinite() {
        return Err(JsError::range_error(format!("Invalid count value: {}", describe(&arg(args, 0)))));
    }
    let count = count as usize;
    if s.len().saturating_mul(count) > (1 << 29) {
        return Err(JsError::range_error("Invalid string length"));
    }
    Ok(JsValue::from(s.as_str().repeat(count)))
}

fn string_concat(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let mut out = this_string(interp, &this, "concat")?.to_string();
    for value in args {
        out.push_str(interp.to_string(value)?.as_str());
    }
    Ok(JsValue::from(out))
}

fn string_split(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "split")?;
    let limit = match arg(args, 1) {
        JsValue::Undefined => u32::MAX as usize,
        other => interp.to_uint32(&other)? as usize,
    };
    let separator = arg(args, 0);
    let parts: Vec<JsValue> = if separator.is_undefined() {
        vec![JsValue::String(s)]
    } else {
        let sep = units(&interp.to_string(&separator)?);
        let own = units(&s);
        if sep.is_empty() {
            own.iter().map(|u| from_units(&[*u])).collect()
        } else {
            let mut parts = Vec::new();
            let mut start = 0;
            while let Some(found) = find_from(&own, &sep, start) {
                parts.push(from_units(own.get(start..found).unwrap_or_default()));
                start = found + sep.len();
            }
            parts.push(from_units(own.get(start..).unwrap_or_default()));
            parts
        }
    };
    let parts = parts.into_iter().take(limit).collect();
    Ok(JsValue::Object(interp.create_array(parts)))
}

/// Expand `$$`, `$&`, `` $` `` and `$'` in a replacement template
fn expand_replacement(template: &[u16], subject: &[u16], at: usize, matched_len: usize) -> Vec<u16> {
    let mut out = Vec::with_capacity(template.len());
    let mut i = 0;
    while let Some(&unit) = template.get(i) {
        if unit == u16::from(b'$') {
            match template.get(i + 1).and_then(|u| u8::try_from(*u).ok()) {
                Some(b'$') => out.push(unit),
                Some(b'&') => out.extend_from_slice(subject.get(at..at + matched_len).unwrap_or_default()),
                Some(b'`') => out.extend_from_slice(subject.get(..at).unwrap_or_default()),
                Some(b'\'') => out.extend_from_slice(subject.get(at + matched_len..).unwrap_or_default()),
                _ => {
                    out.push(unit);
                    i += 1;
                    continue;
                }
            }
            i += 2;
        } else {
            out.push(unit);
            i += 1;
        }
    }
    out
}

fn replace(interp: &mut Interpreter, this: JsValue, args: &[JsValue], method: &str, all: bool) -> Result<Box<dyn CallbackLoop>, JsError> {
    let subject = units(&this_string(interp, &this, method)?);
    let pattern = string_arg(interp, args, 0)?;
    let replacer = arg(args, 1);
    let template = if replacer.is_callable() {
        None
    } else {
        Some(units(&interp.to_string(&replacer)?))
    };

    let mut positions = Vec::new();
    let mut from = 0;
    while let Some(found) = find_from(&subject, &pattern, from) {
        positions.push(found);
        if !all {
            break;
        }
        from = found + pattern.len().max(1);
        if from > subject.len() {
            break;
        }
    }

    let Some(template) = template else {
        return Ok(Box::new(ReplaceWith {
            replacer,
            out: Vec::with_capacity(subject.len()),
            subject,
            pattern,
            positions: positions.into_iter(),
            current: None,
            last: 0,
        }));
    };
    let mut out = Vec::with_capacity(subject.len());
    let mut last = 0;
    for at in positions {
        out.extend_from_slice(subject.get(last..at).unwrap_or_default());
        out.extend(expand_replacement(&template, &subject, at, pattern.len()));
        last = at + pattern.len();
    }
    out.extend_from_slice(subject.get(last..).unwrap_or_default());
    Ok(ready(from_units(&out)))
}

/// Replacement through a function: `replacer(match, position, subject)` per
/// occurrence, the result converted to a string
struct ReplaceWith {
    replacer: JsValue,
    subject: Vec<u16>,
    pattern: Vec<u16>,
    positions: std::vec::IntoIter<usize>,
    /// Occurrence the running call replaces
    current: Option<usize>,
    last: usize,
    out: Vec<u16>,
}

impl CallbackLoop for ReplaceWith {
    fn resume(&mut self, interp: &mut Interpreter, result: Option<JsValue>) -> Result<LoopStep, JsError> {
        if let (Some(result), Some(at)) = (result, self.current.take()) {
            self.out.extend_from_slice(self.subject.get(self.last..at).unwrap_or_default());
            self.out.extend(units(&interp.to_string(&result)?));
            self.last = at + self.pattern.len();
        }
        let Some(at) = self.positions.next() else {
            self.out.extend_from_slice(self.subject.get(self.last..).unwrap_or_default());
            return Ok(LoopStep::Done(from_units(&self.out)));
        };
        self.current = Some(at);
        Ok(LoopStep::Call {
            func: self.replacer.clone(),
            this: JsValue::Undefined,
            args: vec![from_units(&self.pattern), JsValue::from(at), from_units(&self.subject)],
        })
    }
}

fn string_replace(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    replace(interp, this, args, "replace", false)
}

fn string_replace_all(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    replace(interp, this, args, "replaceAll", true)
}

fn string_locale_compare(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "localeCompare")?;
    let other = interp.to_string(&arg(args, 0))?;
    Ok(JsValue::Number(match s.as_str().cmp(other.as_str()) {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    }))
}

fn string_value_of(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    match &this {
        JsValue::String(_) => Ok(this),
        JsValue::Object(obj) => match &obj.borrow().kind {
            ObjectKind::StringObject(s) => Ok(JsValue::String(s.cheap_clone())),
            _ => Err(JsError::type_error("String.prototype.valueOf requires that 'this' be a String")),
        },
        _ => Err(JsError::type_error("String.prototype.valueOf requires that 'this' be a String")),
    }
}

fn string_iterator(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(interp, &this, "[Symbol.iterator]")?;
    Ok(JsValue::Object(create_list_iterator(interp, JsValue::String(s), ListIteratorKind::Values)))
}
