//! Number constructor, Number.prototype and the numeric parsing functions

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::{arg, install_constructor};
use crate::object::{JsObject, ObjectKind, ObjectRef, Property};
use crate::value::{CheapClone, JsValue, PropertyKey, number_to_string};

/// Largest integer `n` such that `n` and `n + 1` are both exact
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn init_number(interp: &mut Interpreter) {
    let proto = interp.realm.number_prototype.cheap_clone();
    proto.borrow_mut().kind = ObjectKind::NumberObject(0.0);

    interp.register_method(&proto, "toString", number_to_string_method, 1);
    interp.register_method(&proto, "toFixed", number_to_fixed, 1);
    interp.register_method(&proto, "toPrecision", number_to_precision, 1);
    interp.register_method(&proto, "toExponential", number_to_exponential, 1);
    interp.register_method(&proto, "valueOf", number_value_of, 0);

    let ctor = install_constructor(interp, "Number", number_called, Some(number_construct), 1, &proto);

    let constants = [
        ("MAX_SAFE_INTEGER", MAX_SAFE_INTEGER),
        ("MIN_SAFE_INTEGER", -MAX_SAFE_INTEGER),
        ("EPSILON", f64::EPSILON),
        ("MAX_VALUE", f64::MAX),
        ("MIN_VALUE", 5e-324),
        ("POSITIVE_INFINITY", f64::INFINITY),
        ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
        ("NaN", f64::NAN),
    ];
    for (name, value) in constants {
        ctor.borrow_mut()
            .define_property(PropertyKey::from(name), Property::internal(JsValue::Number(value)));
    }

    interp.register_method(&ctor, "isInteger", number_is_integer, 1);
    interp.register_method(&ctor, "isSafeInteger", number_is_safe_integer, 1);
    interp.register_method(&ctor, "isFinite", number_is_finite, 1);
    interp.register_method(&ctor, "isNaN", number_is_nan, 1);
    interp.register_method(&ctor, "parseInt", parse_int, 2);
    interp.register_method(&ctor, "parseFloat", parse_float, 1);
}

fn number_called(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Number(match args.first() {
        None => 0.0,
        Some(value) => interp.to_number(value)?,
    }))
}

fn number_construct(interp: &mut Interpreter, args: &[JsValue], new_target: &ObjectRef) -> Result<JsValue, JsError> {
    let value = match args.first() {
        None => 0.0,
        Some(value) => interp.to_number(value)?,
    };
    let fallback = interp.realm.number_prototype.cheap_clone();
    let proto = interp.prototype_from_constructor(new_target, &fallback)?;
    Ok(JsValue::Object(ObjectRef::new(JsObject::new(
        Some(proto),
        ObjectKind::NumberObject(value),
    ))))
}

/// Number value of `this` (a primitive or a Number wrapper)
fn this_number(this: &JsValue, method: &str) -> Result<f64, JsError> {
    match this {
        JsValue::Number(n) => Ok(*n),
        JsValue::Object(obj) => match obj.borrow().kind {
            ObjectKind::NumberObject(n) => Ok(n),
            _ => Err(JsError::type_error(format!(
                "Number.prototype.{} requires that 'this' be a Number",
                method
            ))),
        },
        _ => Err(JsError::type_error(format!(
            "Number.prototype.{} requires that 'this' be a Number",
            method
        ))),
    }
}

fn number_value_of(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Number(this_number(&this, "valueOf")?))
}

// ═══════════════════════════════════════════════════════════════════════════
// Formatting
// ═══════════════════════════════════════════════════════════════════════════

fn number_to_string_method(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let n = this_number(&this, "toString")?;
    let radix = match arg(args, 0) {
        JsValue::Undefined => 10.0,
        other => interp.to_integer(&other)?,
    };
    if !(2.0..=36.0).contains(&radix) {
        return Err(JsError::range_error("toString() radix must be between 2 and 36"));
    }
    if radix == 10.0 {
        return Ok(JsValue::from(number_to_string(n)));
    }
    Ok(JsValue::from(to_radix_string(n, radix as u32)))
}

/// Number rendered in a non-decimal radix; fractions stop after 52 digits
pub(crate) fn to_radix_string(n: f64, radix: u32) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let digit = |d: f64| std::char::from_digit(d as u32, radix).unwrap_or('0');
    let radix_f = f64::from(radix);
    let negative = n < 0.0;
    let n = n.abs();

    let mut int_part = n.trunc();
    let mut int_digits = Vec::new();
    loop {
        int_digits.push(digit(int_part % radix_f));
        int_part = (int_part / radix_f).trunc();
        if int_part < 1.0 {
            break;
        }
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.extend(int_digits.iter().rev());

    let mut frac = n.fract();
    if frac > 0.0 {
        out.push('.');
        for _ in 0..52 {
            frac *= radix_f;
            out.push(digit(frac.trunc()));
            frac = frac.fract();
            if frac == 0.0 {
                break;
            }
        }
    }
    out
}

/// Digit-count argument in `0..=100`
fn digits_arg(interp: &mut Interpreter, value: &JsValue, min: f64, method: &str) -> Result<usize, JsError> {
    let d = interp.to_integer(value)?;
    if !(min..=100.0).contains(&d) {
        return Err(JsError::range_error(format!(
            "{}() argument must be between {} and 100",
            method, min
        )));
    }
    Ok(d as usize)
}

/// Rust's `1.5e3` exponent spelling turned into `1.5e+3`
fn js_exponent(formatted: &str) -> String {
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => formatted.to_string(),
    }
}

fn number_to_fixed(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let n = this_number(&this, "toFixed")?;
    let digits = digits_arg(interp, &arg(args, 0), 0.0, "toFixed")?;
    if !n.is_finite() || n.abs() >= 1e21 {
        return Ok(JsValue::from(number_to_string(n)));
    }
    // -0 prints as 0
    let n = if n == 0.0 { 0.0 } else { n };
    Ok(JsValue::from(format!("{:.*}", digits, n)))
}

fn number_to_precision(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let n = this_number(&this, "toPrecision")?;
    let precision = arg(args, 0);
    if precision.is_undefined() || !n.is_finite() {
        return Ok(JsValue::from(number_to_string(n)));
    }
    let p = digits_arg(interp, &precision, 1.0, "toPrecision")?;
    let n = if n == 0.0 { 0.0 } else { n };

    let scientific = format!("{:.*e}", p - 1, n);
    let exponent: i32 = scientific
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);
    if exponent < -6 || exponent >= p as i32 {
        return Ok(JsValue::from(js_exponent(&scientific)));
    }
    let decimals = (p as i32 - 1 - exponent).max(0) as usize;
    Ok(JsValue::from(format!("{:.*}", decimals, n)))
}

fn number_to_exponential(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let n = this_number(&this, "toExponential")?;
    let digits = arg(args, 0);
    if !n.is_finite() {
        return Ok(JsValue::from(number_to_string(n)));
    }
    let n = if n == 0.0 { 0.0 } else { n };
    let formatted = if digits.is_undefined() {
        format!("{:e}", n)
    } else {
        let d = digits_arg(interp, &digits, 0.0, "toExponential")?;
        format!("{:.*e}", d, n)
    };
    Ok(JsValue::from(js_exponent(&formatted)))
}

// ═══════════════════════════════════════════════════════════════════════════
// Predicates
// ═══════════════════════════════════════════════════════════════════════════

fn as_number(value: &JsValue) -> Option<f64> {
    match value {
        JsValue::Number(n) => Some(*n),
        _ => None,
    }
}

fn number_is_integer(_interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let is = as_number(&arg(args, 0)).is_some_and(|n| n.is_finite() && n.trunc() == n);
    Ok(JsValue::Boolean(is))
}

fn number_is_safe_integer(_interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let is = as_number(&arg(args, 0)).is_some_and(|n| n.trunc() == n && n.abs() <= MAX_SAFE_INTEGER);
    Ok(JsValue::Boolean(is))
}

fn number_is_finite(_interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Boolean(as_number(&arg(args, 0)).is_some_and(f64::is_finite)))
}

fn number_is_nan(_interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Boolean(as_number(&arg(args, 0)).is_some_and(f64::is_nan)))
}

// ═══════════════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════════════

/// `parseInt(string, radix)`
pub(crate) fn parse_int(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let input = interp.to_string(&arg(args, 0))?;
    let radix = interp.to_int32(&arg(args, 1))?;
    Ok(JsValue::Number(parse_int_str(input.as_str(), radix)))
}

fn parse_int_str(input: &str, radix: i32) -> f64 {
    let s = input.trim_start_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, s.get(1..).unwrap_or("")),
        Some(b'+') => (false, s.get(1..).unwrap_or("")),
        _ => (false, s),
    };

    let has_hex_prefix = s.starts_with("0x") || s.starts_with("0X");
    let (radix, s) = match radix {
        0 if has_hex_prefix => (16, s.get(2..).unwrap_or("")),
        0 => (10, s),
        16 if has_hex_prefix => (16, s.get(2..).unwrap_or("")),
        2..=36 => (radix as u32, s),
        _ => return f64::NAN,
    };

    let digits: Vec<u32> = s.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .iter()
        .fold(0.0f64, |acc, d| acc * f64::from(radix) + f64::from(*d));
    if negative { -value } else { value }
}

/// `parseFloat(string)`
pub(crate) fn parse_float(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let input = interp.to_string(&arg(args, 0))?;
    Ok(JsValue::Number(parse_float_str(input.as_str())))
}

fn parse_float_str(input: &str) -> f64 {
    let s = input.trim_start_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    if unsigned.starts_with("Infinity") {
        return if s.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }

    // Longest prefix of the form digits[.digits][e[+-]digits]
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }
    s.get(..end).and_then(|p| p.parse().ok()).unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_prefixes() {
        assert_eq!(parse_int_str("  42px", 0), 42.0);
        assert_eq!(parse_int_str("-0x1f", 0), -31.0);
        assert_eq!(parse_int_str("101", 2), 5.0);
        assert!(parse_int_str("z", 10).is_nan());
        assert!(parse_int_str("1", 37).is_nan());
    }

    #[test]
    fn test_parse_float_prefix() {
        assert_eq!(parse_float_str("3.25abc"), 3.25);
        assert_eq!(parse_float_str("  -1e3x"), -1000.0);
        assert_eq!(parse_float_str(".5"), 0.5);
        assert_eq!(parse_float_str("1e"), 1.0);
        assert!(parse_float_str("e5").is_nan());
        assert_eq!(parse_float_str("-Infinity"), f64::NEG_INFINITY);
    }

    #[test]
    fn test_radix_strings() {
        assert_eq!(to_radix_string(255.0, 16), "ff");
        assert_eq!(to_radix_string(-5.5, 2), "-101.1");
        assert_eq!(to_radix_string(0.0, 36), "0");
    }

    #[test]
    fn test_js_exponent() {
        assert_eq!(js_exponent("1.5e3"), "1.5e+3");
        assert_eq!(js_exponent("1.5e-3"), "1.5e-3");
    }
}
