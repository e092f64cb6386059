//! Math namespace

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::operations::exponentiate;
use crate::object::Property;
use crate::value::{JsValue, PropertyKey};

pub fn init_math(interp: &mut Interpreter) {
    let math = interp.create_object();

    let constants = [
        ("PI", std::f64::consts::PI),
        ("E", std::f64::consts::E),
        ("LN2", std::f64::consts::LN_2),
        ("LN10", std::f64::consts::LN_10),
        ("LOG2E", std::f64::consts::LOG2_E),
        ("LOG10E", std::f64::consts::LOG10_E),
        ("SQRT2", std::f64::consts::SQRT_2),
        ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ];
    for (name, value) in constants {
        math.borrow_mut()
            .define_property(PropertyKey::from(name), Property::internal(JsValue::Number(value)));
    }

    // Rounding
    interp.register_method(&math, "abs", math_abs, 1);
    interp.register_method(&math, "floor", math_floor, 1);
    interp.register_method(&math, "ceil", math_ceil, 1);
    interp.register_method(&math, "round", math_round, 1);
    interp.register_method(&math, "trunc", math_trunc, 1);
    interp.register_method(&math, "sign", math_sign, 1);

    interp.register_method(&math, "min", math_min, 2);
    interp.register_method(&math, "max", math_max, 2);

    // Powers and logarithms
    interp.register_method(&math, "pow", math_pow, 2);
    interp.register_method(&math, "sqrt", math_sqrt, 1);
    interp.register_method(&math, "cbrt", math_cbrt, 1);
    interp.register_method(&math, "hypot", math_hypot, 2);
    interp.register_method(&math, "exp", math_exp, 1);
    interp.register_method(&math, "log", math_log, 1);
    interp.register_method(&math, "log2", math_log2, 1);
    interp.register_method(&math, "log10", math_log10, 1);

    // Trigonometry
    interp.register_method(&math, "sin", math_sin, 1);
    interp.register_method(&math, "cos", math_cos, 1);
    interp.register_method(&math, "tan", math_tan, 1);
    interp.register_method(&math, "asin", math_asin, 1);
    interp.register_method(&math, "acos", math_acos, 1);
    interp.register_method(&math, "atan", math_atan, 1);
    interp.register_method(&math, "atan2", math_atan2, 2);

    interp.register_method(&math, "random", math_random, 0);

    interp.realm.global.define_hidden("Math", JsValue::Object(math));
}

/// First argument as a number (`NaN` when missing)
fn number_arg(interp: &mut Interpreter, args: &[JsValue], index: usize) -> Result<f64, JsError> {
    match args.get(index) {
        Some(value) => interp.to_number(value),
        None => Ok(f64::NAN),
    }
}

/// Defines a one-argument Math function over `f64`
macro_rules! unary_math {
    ($($name:ident => $op:expr;)*) => {
        $(
            fn $name(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
                let x = number_arg(interp, args, 0)?;
                let op: fn(f64) -> f64 = $op;
                Ok(JsValue::Number(op(x)))
            }
        )*
    };
}

unary_math! {
    math_abs => f64::abs;
    math_floor => f64::floor;
    math_ceil => f64::ceil;
    math_trunc => f64::trunc;
    math_sqrt => f64::sqrt;
    math_cbrt => f64::cbrt;
    math_exp => f64::exp;
    math_log => f64::ln;
    math_log2 => f64::log2;
    math_log10 => f64::log10;
    math_sin => f64::sin;
    math_cos => f64::cos;
    math_tan => f64::tan;
    math_asin => f64::asin;
    math_acos => f64::acos;
    math_atan => f64::atan;
    math_sign => |x| if x.is_nan() || x == 0.0 { x } else { x.signum() };
    // Halves round toward +Infinity: Math.round(-2.5) === -2
    math_round => |x| if !x.is_finite() || x == 0.0 { x } else { (x + 0.5).floor() };
}

fn math_min(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let mut result = f64::INFINITY;
    for value in args {
        let n = interp.to_number(value)?;
        if n.is_nan() || result.is_nan() {
            result = f64::NAN;
        } else if n < result || (n == 0.0 && result == 0.0 && n.is_sign_negative()) {
            result = n;
        }
    }
    Ok(JsValue::Number(result))
}

fn math_max(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let mut result = f64::NEG_INFINITY;
    for value in args {
        let n = interp.to_number(value)?;
        if n.is_nan() || result.is_nan() {
            result = f64::NAN;
        } else if n > result || (n == 0.0 && result == 0.0 && n.is_sign_positive()) {
            result = n;
        }
    }
    Ok(JsValue::Number(result))
}

fn math_pow(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let base = number_arg(interp, args, 0)?;
    let exponent = number_arg(interp, args, 1)?;
    Ok(JsValue::Number(exponentiate(base, exponent)))
}

fn math_hypot(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let mut sum = 0.0;
    let mut infinite = false;
    let mut nan = false;
    for value in args {
        let n = interp.to_number(value)?;
        infinite |= n.is_infinite();
        nan |= n.is_nan();
        sum += n * n;
    }
    Ok(JsValue::Number(if infinite {
        f64::INFINITY
    } else if nan {
        f64::NAN
    } else {
        sum.sqrt()
    }))
}

fn math_atan2(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let y = number_arg(interp, args, 0)?;
    let x = number_arg(interp, args, 1)?;
    Ok(JsValue::Number(y.atan2(x)))
}

fn math_random(interp: &mut Interpreter, _this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Number(interp.random.random()))
}
