//! Abstract operations: type conversion, operators and equality
//!
//! Conversions may call guest `valueOf`/`toString`; those calls run to
//! completion through [`Interpreter::call_function`].

use crate::ast::{BinaryOp, UnaryOp};
use crate::error::JsError;
use crate::object::{JsObject, ObjectKind, ObjectRef};
use crate::value::{CheapClone, JsString, JsValue, PropertyKey, describe, number_to_string, string_to_number};

use super::Interpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredType {
    Default,
    Number,
    String,
}

impl Interpreter {
    pub(crate) fn to_primitive(&mut self, value: &JsValue, hint: PreferredType) -> Result<JsValue, JsError> {
        let JsValue::Object(obj) = value else {
            return Ok(value.clone());
        };
        let order = match hint {
            PreferredType::String => ["toString", "valueOf"],
            PreferredType::Default | PreferredType::Number => ["valueOf", "toString"],
        };
        for name in order {
            let method = self.get_named(value, name)?;
            if method.is_callable() {
                let result = self.call_function(&method, JsValue::Object(obj.cheap_clone()), &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(JsError::type_error("Cannot convert object to primitive value"))
    }

    pub fn to_number(&mut self, value: &JsValue) -> Result<f64, JsError> {
        Ok(match value {
            JsValue::Undefined => f64::NAN,
            JsValue::Null => 0.0,
            JsValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            JsValue::Number(n) => *n,
            JsValue::String(s) => string_to_number(s.as_str()),
            JsValue::Symbol(_) => return Err(JsError::type_error("Cannot convert a Symbol value to a number")),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, PreferredType::Number)?;
                return self.to_number(&prim);
            }
        })
    }

    pub fn to_string(&mut self, value: &JsValue) -> Result<JsString, JsError> {
        Ok(match value {
            JsValue::Undefined => JsString::from("undefined"),
            JsValue::Null => JsString::from("null"),
            JsValue::Boolean(b) => JsString::from(if *b { "true" } else { "false" }),
            JsValue::Number(n) => JsString::from(number_to_string(*n)),
            JsValue::String(s) => s.cheap_clone(),
            JsValue::Symbol(_) => return Err(JsError::type_error("Cannot convert a Symbol value to a string")),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, PreferredType::String)?;
                return self.to_string(&prim);
            }
        })
    }

    pub(crate) fn to_property_key(&mut self, value: &JsValue) -> Result<PropertyKey, JsError> {
        match value {
            JsValue::Symbol(s) => Ok(PropertyKey::Symbol(s.clone())),
            JsValue::String(s) => Ok(PropertyKey::from(s.cheap_clone())),
            JsValue::Number(n) => Ok(PropertyKey::from_number(*n)),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, PreferredType::String)?;
                self.to_property_key(&prim)
            }
            other => Ok(PropertyKey::from(self.to_string(other)?)),
        }
    }

    pub fn to_object(&self, value: &JsValue) -> Result<ObjectRef, JsError> {
        let (proto, kind) = match value {
            JsValue::Object(obj) => return Ok(obj.cheap_clone()),
            JsValue::Undefined | JsValue::Null => {
                return Err(JsError::type_error("Cannot convert undefined or null to object"));
            }
            JsValue::Boolean(b) => (&self.realm.boolean_prototype, ObjectKind::BooleanObject(*b)),
            JsValue::Number(n) => (&self.realm.number_prototype, ObjectKind::NumberObject(*n)),
            JsValue::String(s) => (&self.realm.string_prototype, ObjectKind::StringObject(s.cheap_clone())),
            JsValue::Symbol(s) => (&self.realm.symbol_prototype, ObjectKind::SymbolObject(s.clone())),
        };
        Ok(ObjectRef::new(JsObject::new(Some(proto.cheap_clone()), kind)))
    }

    pub(crate) fn to_int32(&mut self, value: &JsValue) -> Result<i32, JsError> {
        Ok(f64_to_int32(self.to_number(value)?))
    }

    pub(crate) fn to_uint32(&mut self, value: &JsValue) -> Result<u32, JsError> {
        Ok(f64_to_int32(self.to_number(value)?) as u32)
    }

    /// `ToIntegerOrInfinity`
    pub(crate) fn to_integer(&mut self, value: &JsValue) -> Result<f64, JsError> {
        let n = self.to_number(value)?;
        Ok(if n.is_nan() { 0.0 } else { n.trunc() })
    }

    pub(crate) fn unary_operator(&mut self, op: UnaryOp, value: JsValue) -> Result<JsValue, JsError> {
        Ok(match op {
            UnaryOp::Minus => JsValue::Number(-self.to_number(&value)?),
            UnaryOp::Plus => JsValue::Number(self.to_number(&value)?),
            UnaryOp::Not => JsValue::Boolean(!value.to_boolean()),
            UnaryOp::BitNot => JsValue::Number(f64::from(!self.to_int32(&value)?)),
            UnaryOp::Typeof => JsValue::from(value.type_of()),
            UnaryOp::Void => JsValue::Undefined,
            // `delete` of a non-reference
            UnaryOp::Delete => JsValue::Boolean(true),
        })
    }

    pub(crate) fn binary_operator(&mut self, op: BinaryOp, left: JsValue, right: JsValue) -> Result<JsValue, JsError> {
        Ok(match op {
            BinaryOp::Add => {
                let l = self.to_primitive(&left, PreferredType::Default)?;
                let r = self.to_primitive(&right, PreferredType::Default)?;
                if matches!(l, JsValue::String(_)) || matches!(r, JsValue::String(_)) {
                    let ls = self.to_string(&l)?;
                    let rs = self.to_string(&r)?;
                    JsValue::String(ls + &rs)
                } else {
                    JsValue::Number(self.to_number(&l)? + self.to_number(&r)?)
                }
            }
            BinaryOp::Sub => JsValue::Number(self.to_number(&left)? - self.to_number(&right)?),
            BinaryOp::Mul => JsValue::Number(self.to_number(&left)? * self.to_number(&right)?),
            BinaryOp::Div => JsValue::Number(self.to_number(&left)? / self.to_number(&right)?),
            BinaryOp::Mod => JsValue::Number(self.to_number(&left)? % self.to_number(&right)?),
            BinaryOp::Exp => JsValue::Number(exponentiate(self.to_number(&left)?, self.to_number(&right)?)),
            BinaryOp::Eq => JsValue::Boolean(self.loose_equals(&left, &right)?),
            BinaryOp::NotEq => JsValue::Boolean(!self.loose_equals(&left, &right)?),
            BinaryOp::StrictEq => JsValue::Boolean(left.strict_equals(&right)),
            BinaryOp::StrictNotEq => JsValue::Boolean(!left.strict_equals(&right)),
            BinaryOp::Lt => JsValue::Boolean(self.less_than(&left, &right, true)? == Some(true)),
            BinaryOp::Gt => JsValue::Boolean(self.less_than(&right, &left, false)? == Some(true)),
            BinaryOp::LtEq => JsValue::Boolean(self.less_than(&right, &left, false)? == Some(false)),
            BinaryOp::GtEq => JsValue::Boolean(self.less_than(&left, &right, true)? == Some(false)),
            BinaryOp::BitAnd => JsValue::Number(f64::from(self.to_int32(&left)? & self.to_int32(&right)?)),
            BinaryOp::BitOr => JsValue::Number(f64::from(self.to_int32(&left)? | self.to_int32(&right)?)),
            BinaryOp::BitXor => JsValue::Number(f64::from(self.to_int32(&left)? ^ self.to_int32(&right)?)),
            BinaryOp::LShift => {
                let l = self.to_int32(&left)?;
                let r = self.to_uint32(&right)? & 0x1f;
                JsValue::Number(f64::from(l.wrapping_shl(r)))
            }
            BinaryOp::RShift => {
                let l = self.to_int32(&left)?;
                let r = self.to_uint32(&right)? & 0x1f;
                JsValue::Number(f64::from(l >> r))
            }
            BinaryOp::URShift => {
                let l = self.to_uint32(&left)?;
                let r = self.to_uint32(&right)? & 0x1f;
                JsValue::Number(f64::from(l >> r))
            }
            BinaryOp::In => {
                let JsValue::Object(obj) = &right else {
                    return Err(JsError::type_error(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        describe(&left),
                        describe(&right)
                    )));
                };
                let key = self.to_property_key(&left)?;
                JsValue::Boolean(obj.has_property(&key))
            }
            BinaryOp::Instanceof => JsValue::Boolean(self.instance_of(&left, &right)?),
        })
    }

    /// `IsLessThan`; `None` when either side is NaN
    fn less_than(&mut self, x: &JsValue, y: &JsValue, left_first: bool) -> Result<Option<bool>, JsError> {
        let (px, py) = if left_first {
            let px = self.to_primitive(x, PreferredType::Number)?;
            let py = self.to_primitive(y, PreferredType::Number)?;
            (px, py)
        } else {
            let py = self.to_primitive(y, PreferredType::Number)?;
            let px = self.to_primitive(x, PreferredType::Number)?;
            (px, py)
        };
        if let (JsValue::String(a), JsValue::String(b)) = (&px, &py) {
            return Ok(Some(a.as_str().encode_utf16().lt(b.as_str().encode_utf16())));
        }
        let nx = self.to_number(&px)?;
        let ny = self.to_number(&py)?;
        if nx.is_nan() || ny.is_nan() {
            return Ok(None);
        }
        Ok(Some(nx < ny))
    }

    /// `==`
    pub(crate) fn loose_equals(&mut self, x: &JsValue, y: &JsValue) -> Result<bool, JsError> {
        Ok(match (x, y) {
            (JsValue::Undefined | JsValue::Null, JsValue::Undefined | JsValue::Null) => true,
            (JsValue::Undefined | JsValue::Null, _) | (_, JsValue::Undefined | JsValue::Null) => false,
            (JsValue::Number(_), JsValue::String(s)) => x.strict_equals(&JsValue::Number(string_to_number(s.as_str()))),
            (JsValue::String(s), JsValue::Number(_)) => JsValue::Number(string_to_number(s.as_str())).strict_equals(y),
            (JsValue::Boolean(b), _) => {
                let n = JsValue::Number(if *b { 1.0 } else { 0.0 });
                return self.loose_equals(&n, y);
            }
            (_, JsValue::Boolean(b)) => {
                let n = JsValue::Number(if *b { 1.0 } else { 0.0 });
                return self.loose_equals(x, &n);
            }
            (JsValue::Object(_), JsValue::Object(_)) => x.strict_equals(y),
            (JsValue::Object(_), _) => {
                let px = self.to_primitive(x, PreferredType::Default)?;
                return self.loose_equals(&px, y);
            }
            (_, JsValue::Object(_)) => {
                let py = self.to_primitive(y, PreferredType::Default)?;
                return self.loose_equals(x, &py);
            }
            _ => x.strict_equals(y),
        })
    }

    /// `OrdinaryHasInstance`
    pub(crate) fn instance_of(&mut self, value: &JsValue, target: &JsValue) -> Result<bool, JsError> {
        let Some(target_obj) = target.as_object().filter(|o| o.is_callable()) else {
            return Err(JsError::type_error("Right-hand side of 'instanceof' is not callable"));
        };
        let JsValue::Object(obj) = value else {
            return Ok(false);
        };
        let proto = self.get_named(&JsValue::Object(target_obj.cheap_clone()), "prototype")?;
        let JsValue::Object(proto) = proto else {
            return Err(JsError::type_error(
                "Function has non-object prototype in instanceof check",
            ));
        };
        Ok(obj.inherits_from(&proto))
    }

    /// `CreateListFromArrayLike`
    pub(crate) fn list_from_array_like(&mut self, value: &JsValue) -> Result<Vec<JsValue>, JsError> {
        match value {
            JsValue::Undefined | JsValue::Null => return Ok(Vec::new()),
            JsValue::Object(obj) => {
                if let ObjectKind::Array(elements) = &obj.borrow().kind {
                    return Ok(elements.clone());
                }
            }
            _ => return Err(JsError::type_error("CreateListFromArrayLike called on non-object")),
        }
        let len = self.get_named(value, "length")?;
        let len = self.to_integer(&len)?.max(0.0) as usize;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.get_value(value, &PropertyKey::Index(i as u32))?);
        }
        Ok(out)
    }

    /// Collect every value of an iterable, closing the iterator if reading
    /// a value fails. Used by natives, so the iteration runs synchronously.
    pub(crate) fn iterate_to_list(&mut self, iterable: &JsValue) -> Result<Vec<JsValue>, JsError> {
        if iterable.is_null_or_undefined() {
            return Err(JsError::type_error(format!("{} is not iterable", describe(iterable))));
        }
        let key = PropertyKey::Symbol(self.realm.symbol_iterator.clone());
        let method = self.get_value(iterable, &key)?;
        if !method.is_callable() {
            return Err(JsError::type_error(format!("{} is not iterable", describe(iterable))));
        }
        let iterator = self.call_function(&method, iterable.clone(), &[])?;
        let rec = self.iterator_record(iterator)?;

        let mut out = Vec::new();
        loop {
            let result = self.call_function(&rec.next, rec.iterator.clone(), &[])?;
            if !result.is_object() {
                return Err(JsError::type_error(format!(
                    "Iterator result {} is not an object",
                    describe(&result)
                )));
            }
            if self.get_named(&result, "done")?.to_boolean() {
                return Ok(out);
            }
            match self.get_named(&result, "value") {
                Ok(value) => out.push(value),
                Err(err) if err.is_engine() => return Err(err),
                Err(err) => {
                    // The pending error wins over guest errors from return()
                    let closed = match self.get_named(&rec.iterator, "return") {
                        Ok(close) if close.is_callable() => self.call_function(&close, rec.iterator.clone(), &[]).map(drop),
                        Ok(_) => Ok(()),
                        Err(close_err) => Err(close_err),
                    };
                    if let Err(close_err) = closed
                        && close_err.is_engine()
                    {
                        return Err(close_err);
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// `ToInt32` on a number
pub(crate) fn f64_to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4_294_967_296.0);
    if m >= 2_147_483_648.0 {
        (m - 4_294_967_296.0) as i32
    } else {
        m as i32
    }
}

/// `Number::exponentiate`
pub(crate) fn exponentiate(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() {
        return f64::NAN;
    }
    if base.abs() == 1.0 && exponent.is_infinite() {
        return f64::NAN;
    }
    base.powf(exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_wrapping() {
        assert_eq!(f64_to_int32(4_294_967_297.0), 1);
        assert_eq!(f64_to_int32(2_147_483_648.0), -2_147_483_648);
        assert_eq!(f64_to_int32(-1.5), -1);
        assert_eq!(f64_to_int32(f64::NAN), 0);
    }

    #[test]
    fn test_exponentiate_edge_cases() {
        assert!(exponentiate(1.0, f64::INFINITY).is_nan());
        assert!(exponentiate(2.0, f64::NAN).is_nan());
        assert_eq!(exponentiate(2.0, 10.0), 1024.0);
        assert_eq!(exponentiate(f64::NAN, 0.0), 1.0);
    }
}
