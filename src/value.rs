//! JavaScript value representation
//!
//! Primitive values, strings, symbols and property keys. Objects live in
//! [`crate::object`].

use std::fmt;
use std::rc::Rc;

use crate::object::{Access, ObjectKind, ObjectRef};

/// Trait for types that have cheap (O(1), reference-counted) clones.
///
/// Makes it explicit at call sites that a clone only bumps a reference count.
pub trait CheapClone: Clone {
    fn cheap_clone(&self) -> Self {
        self.clone()
    }
}

impl<T: ?Sized> CheapClone for Rc<T> {}

/// A JavaScript value
#[derive(Clone, Default)]
pub enum JsValue {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(JsString),
    Symbol(JsSymbol),
    Object(ObjectRef),
}

impl CheapClone for JsValue {}

impl JsValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    /// Check if this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, JsValue::Null | JsValue::Undefined)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JsValue::Object(_))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            JsValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Check if this value is callable (a function)
    pub fn is_callable(&self) -> bool {
        match self {
            JsValue::Object(obj) => obj.is_callable(),
            _ => false,
        }
    }

    /// Get the typeof result for this value
    pub fn type_of(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null => "object",
            JsValue::Boolean(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Symbol(_) => "symbol",
            JsValue::Object(obj) => {
                if obj.is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    /// Convert to boolean (ToBoolean)
    pub fn to_boolean(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Boolean(b) => *b,
            JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
            JsValue::String(s) => !s.is_empty(),
            JsValue::Symbol(_) | JsValue::Object(_) => true,
        }
    }

    /// Strict equality (===)
    pub fn strict_equals(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Undefined, JsValue::Undefined) => true,
            (JsValue::Null, JsValue::Null) => true,
            (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
            // NaN !== NaN, +0 === -0
            (JsValue::Number(a), JsValue::Number(b)) => a == b,
            (JsValue::String(a), JsValue::String(b)) => a == b,
            (JsValue::Symbol(a), JsValue::Symbol(b)) => a == b,
            (JsValue::Object(a), JsValue::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// SameValueZero: like `===` but NaN equals NaN
    pub fn same_value_zero(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Number(a), JsValue::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::String(s) => write!(f, "\"{}\"", s),
            other => write!(f, "{}", describe(other)),
        }
    }
}

impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

// Conversions from Rust types

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Boolean(b)
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        JsValue::Number(n)
    }
}

impl From<i32> for JsValue {
    fn from(n: i32) -> Self {
        JsValue::Number(f64::from(n))
    }
}

impl From<u32> for JsValue {
    fn from(n: u32) -> Self {
        JsValue::Number(f64::from(n))
    }
}

impl From<usize> for JsValue {
    fn from(n: usize) -> Self {
        JsValue::Number(n as f64)
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        JsValue::String(JsString::from(s))
    }
}

impl From<String> for JsValue {
    fn from(s: String) -> Self {
        JsValue::String(JsString::from(s))
    }
}

impl From<JsString> for JsValue {
    fn from(s: JsString) -> Self {
        JsValue::String(s)
    }
}

impl From<ObjectRef> for JsValue {
    fn from(obj: ObjectRef) -> Self {
        JsValue::Object(obj)
    }
}

/// Reference-counted string for efficient string handling
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsString(Rc<str>);

impl CheapClone for JsString {}

impl JsString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn parse<F: std::str::FromStr>(&self) -> Result<F, F::Err> {
        self.0.parse()
    }

    /// Length in UTF-16 code units, as guest code observes it
    pub fn utf16_len(&self) -> usize {
        self.0.encode_utf16().count()
    }

    /// Code unit at `index`, if any
    pub fn code_unit_at(&self, index: usize) -> Option<u16> {
        self.0.encode_utf16().nth(index)
    }

    /// Substring by UTF-16 code unit range; lone surrogates become U+FFFD
    pub fn utf16_slice(&self, start: usize, end: usize) -> JsString {
        let units: Vec<u16> = self
            .0
            .encode_utf16()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect();
        JsString::from(String::from_utf16_lossy(&units))
    }
}

impl Default for JsString {
    fn default() -> Self {
        JsString::from("")
    }
}

impl AsRef<str> for JsString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for JsString {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for JsString {
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for JsString {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        JsString(s.into())
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        JsString(s.into())
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add<&str> for JsString {
    type Output = JsString;

    fn add(self, other: &str) -> JsString {
        let mut s = String::from(&*self.0);
        s.push_str(other);
        JsString::from(s)
    }
}

impl std::ops::Add<&JsString> for JsString {
    type Output = JsString;

    fn add(self, other: &JsString) -> JsString {
        let mut s = String::from(&*self.0);
        s.push_str(&other.0);
        JsString::from(s)
    }
}

/// JavaScript Symbol primitive
/// Symbols are unique identifiers, optionally with a description
#[derive(Clone, Debug)]
pub struct JsSymbol {
    id: u64,
    pub description: Option<JsString>,
}

impl JsSymbol {
    pub fn new(id: u64, description: Option<JsString>) -> Self {
        Self { id, description }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// `Symbol(description)`
    pub fn descriptive_string(&self) -> String {
        match &self.description {
            Some(desc) => format!("Symbol({})", desc),
            None => "Symbol()".to_string(),
        }
    }
}

impl PartialEq for JsSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for JsSymbol {}

impl std::hash::Hash for JsSymbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Property key (string, index, or symbol)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(JsString),
    Index(u32),
    Symbol(JsSymbol),
}

impl PropertyKey {
    /// Check if this is a symbol key
    pub fn is_symbol(&self) -> bool {
        matches!(self, PropertyKey::Symbol(_))
    }

    /// Check if this key equals a string literal (avoids allocation)
    #[inline]
    pub fn eq_str(&self, s: &str) -> bool {
        match self {
            PropertyKey::String(js_str) => js_str.as_str() == s,
            PropertyKey::Index(_) | PropertyKey::Symbol(_) => false,
        }
    }

    /// Key for a numeric property name (`{ 1.5: x }`, `a[2]`)
    pub fn from_number(n: f64) -> Self {
        if n >= 0.0 && n < f64::from(u32::MAX) && n.fract() == 0.0 {
            PropertyKey::Index(n as u32)
        } else {
            PropertyKey::String(JsString::from(number_to_string(n)))
        }
    }

    /// Key as a guest value (`Object.keys`, `for-in`)
    pub fn to_value(&self) -> JsValue {
        match self {
            PropertyKey::String(s) => JsValue::String(s.cheap_clone()),
            PropertyKey::Index(i) => JsValue::String(JsString::from(i.to_string())),
            PropertyKey::Symbol(s) => JsValue::Symbol(s.clone()),
        }
    }

    /// Name a function gets when defined under this key
    pub fn function_name(&self) -> JsString {
        match self {
            PropertyKey::String(s) => s.cheap_clone(),
            PropertyKey::Index(i) => JsString::from(i.to_string()),
            PropertyKey::Symbol(s) => match &s.description {
                Some(desc) => JsString::from(format!("[{}]", desc)),
                None => JsString::default(),
            },
        }
    }
}

impl From<&str> for PropertyKey {
    #[inline]
    fn from(s: &str) -> Self {
        // Fast path: check first char is a digit before parsing
        if let Some(first) = s.bytes().next()
            && first.is_ascii_digit()
            && let Ok(idx) = s.parse::<u32>()
            && idx != u32::MAX
            && idx.to_string() == s
        {
            return PropertyKey::Index(idx);
        }
        PropertyKey::String(JsString::from(s))
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::from(s.as_str())
    }
}

impl From<JsString> for PropertyKey {
    #[inline]
    fn from(s: JsString) -> Self {
        if let Some(first) = s.as_str().bytes().next()
            && first.is_ascii_digit()
            && let Ok(idx) = s.parse::<u32>()
            && idx != u32::MAX
            && idx.to_string() == s.as_str()
        {
            return PropertyKey::Index(idx);
        }
        PropertyKey::String(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(idx: u32) -> Self {
        PropertyKey::Index(idx)
    }
}

impl From<JsSymbol> for PropertyKey {
    fn from(sym: JsSymbol) -> Self {
        PropertyKey::Symbol(sym)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Index(i) => write!(f, "{}", i),
            PropertyKey::Symbol(s) => write!(f, "{}", s.descriptive_string()),
        }
    }
}

/// Number::toString(10) formatting
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n < 0.0 {
        return format!("-{}", number_to_string(-n));
    }
    if n.fract() == 0.0 && n < 1e21 {
        return format!("{}", n);
    }

    // Shortest round-trip digits from `{:e}`: "d.ddde±x"
    let sci = format!("{:e}", n);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let point = exponent + 1;

    if k <= point && point <= 21 {
        let zeros = "0".repeat((point - k) as usize);
        format!("{}{}", digits, zeros)
    } else if 0 < point && point <= 21 {
        let (int_part, frac_part) = digits.split_at(point as usize);
        format!("{}.{}", int_part, frac_part)
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat((-point) as usize), digits)
    } else {
        let sign = if point - 1 >= 0 { "+" } else { "-" };
        let exp = (point - 1).abs();
        let mut chars = digits.chars();
        let first: String = chars.next().map(String::from).unwrap_or_default();
        let rest: String = chars.collect();
        if rest.is_empty() {
            format!("{}e{}{}", first, sign, exp)
        } else {
            format!("{}.{}e{}{}", first, rest, sign, exp)
        }
    }
}

/// StringToNumber
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if trimmed.is_empty() {
        return 0.0;
    }

    let radix_body = |prefix_len: usize, radix: u32| -> f64 {
        let body = trimmed.get(prefix_len..).unwrap_or("");
        if body.is_empty() {
            return f64::NAN;
        }
        body.chars().try_fold(0.0f64, |acc, c| {
            c.to_digit(radix).map(|d| acc * f64::from(radix) + f64::from(d))
        })
        .unwrap_or(f64::NAN)
    };

    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("0x") {
        return radix_body(2, 16);
    }
    if lower.starts_with("0o") {
        return radix_body(2, 8);
    }
    if lower.starts_with("0b") {
        return radix_body(2, 2);
    }

    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    // Rust accepts spellings like "inf" and "nan" that JavaScript does not
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Short human-readable rendering used by error messages, the CLI and `Debug`
pub fn describe(value: &JsValue) -> String {
    match value {
        JsValue::Undefined => "undefined".to_string(),
        JsValue::Null => "null".to_string(),
        JsValue::Boolean(b) => b.to_string(),
        JsValue::Number(n) => number_to_string(*n),
        JsValue::String(s) => s.to_string(),
        JsValue::Symbol(s) => s.descriptive_string(),
        JsValue::Object(obj) => describe_object(obj),
    }
}

fn describe_object(obj: &ObjectRef) -> String {
    let o = obj.borrow();
    match &o.kind {
        ObjectKind::Function(callable) => format!("[Function: {}]", callable.name()),
        ObjectKind::Array(elements) => {
            let parts: Vec<String> = elements.iter().map(describe_element).collect();
            format!("[{}]", parts.join(", "))
        }
        ObjectKind::Error => {
            // `name` usually lives on the prototype
            let read = |key: &str| match obj.get(&PropertyKey::from(key)) {
                Access::Value(v) if !v.is_undefined() => Some(describe(&v)),
                _ => None,
            };
            let name = read("name").unwrap_or_else(|| "Error".to_string());
            match read("message") {
                Some(m) if !m.is_empty() => format!("{}: {}", name, m),
                _ => name,
            }
        }
        ObjectKind::Promise(p) => format!("Promise {{ <{}> }}", p.state.label()),
        ObjectKind::Generator(_) => "[object Generator]".to_string(),
        _ => {
            let parts: Vec<String> = o
                .properties
                .iter()
                .filter(|(k, p)| p.enumerable && !k.is_symbol())
                .map(|(k, p)| {
                    if p.is_accessor() {
                        format!("{}: [Getter/Setter]", k)
                    } else {
                        format!("{}: {}", k, describe_element(&p.value))
                    }
                })
                .collect();
            if parts.is_empty() {
                "{}".to_string()
            } else {
                format!("{{ {} }}", parts.join(", "))
            }
        }
    }
}

/// Nested values: strings quoted, objects abbreviated
fn describe_element(value: &JsValue) -> String {
    match value {
        JsValue::String(s) => format!("'{}'", s),
        JsValue::Object(obj) => {
            let o = obj.borrow();
            match &o.kind {
                ObjectKind::Function(callable) => format!("[Function: {}]", callable.name()),
                ObjectKind::Array(elements) => format!("[Array({})]", elements.len()),
                _ => "[Object]".to_string(),
            }
        }
        other => describe(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(0.0), "0");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(42.0), "42");
        assert_eq!(number_to_string(-1.5), "-1.5");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(number_to_string(0.000001), "0.000001");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number("  42  "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn test_property_key_canonical_index() {
        assert_eq!(PropertyKey::from("3"), PropertyKey::Index(3));
        assert_eq!(PropertyKey::from("03"), PropertyKey::String(JsString::from("03")));
        assert_eq!(PropertyKey::from_number(1.5), PropertyKey::String(JsString::from("1.5")));
    }
}
