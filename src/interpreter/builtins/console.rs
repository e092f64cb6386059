//! console namespace, writing through the host's [`ConsoleProvider`]
//!
//! [`ConsoleProvider`]: crate::platform::ConsoleProvider

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::arg;
use crate::platform::ConsoleLevel;
use crate::value::{JsValue, describe};

pub fn init_console(interp: &mut Interpreter) {
    let console = interp.create_object();

    interp.register_method(&console, "log", console_log, 0);
    interp.register_method(&console, "info", console_info, 0);
    interp.register_method(&console, "debug", console_debug, 0);
    interp.register_method(&console, "warn", console_warn, 0);
    interp.register_method(&console, "error", console_error, 0);
    interp.register_method(&console, "assert", console_assert, 0);
    interp.register_method(&console, "time", console_time, 0);
    interp.register_method(&console, "timeEnd", console_time_end, 0);
    interp.register_method(&console, "clear", console_clear, 0);

    interp.realm.global.define_hidden("console", JsValue::Object(console));
}

/// Arguments joined by spaces; strings print without quotes
fn format_args(args: &[JsValue]) -> String {
    args.iter()
        .map(|value| match value {
            JsValue::String(s) => s.to_string(),
            other => describe(other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn write(interp: &Interpreter, level: ConsoleLevel, args: &[JsValue]) -> Result<JsValue, JsError> {
    interp.console.write(level, &format_args(args));
    Ok(JsValue::Undefined)
}

fn console_log(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    write(interp, ConsoleLevel::Log, args)
}

fn console_info(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    write(interp, ConsoleLevel::Info, args)
}

fn console_debug(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    write(interp, ConsoleLevel::Debug, args)
}

fn console_warn(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    write(interp, ConsoleLevel::Warn, args)
}

fn console_error(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    write(interp, ConsoleLevel::Error, args)
}

fn console_assert(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    if arg(args, 0).to_boolean() {
        return Ok(JsValue::Undefined);
    }
    let rest = args.get(1..).unwrap_or_default();
    let message = if rest.is_empty() {
        "Assertion failed".to_string()
    } else {
        format!("Assertion failed: {}", format_args(rest))
    };
    interp.console.write(ConsoleLevel::Error, &message);
    Ok(JsValue::Undefined)
}

fn timer_label(interp: &mut Interpreter, args: &[JsValue]) -> Result<String, JsError> {
    Ok(match arg(args, 0) {
        JsValue::Undefined => "default".to_string(),
        other => interp.to_string(&other)?.to_string(),
    })
}

fn console_time(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let label = timer_label(interp, args)?;
    if interp.console_timers.contains_key(&label) {
        let message = format!("Timer '{}' already exists", label);
        interp.console.write(ConsoleLevel::Warn, &message);
        return Ok(JsValue::Undefined);
    }
    let start = interp.time.start_timer();
    interp.console_timers.insert(label, start);
    Ok(JsValue::Undefined)
}

fn console_time_end(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let label = timer_label(interp, args)?;
    match interp.console_timers.remove(&label) {
        Some(start) => {
            let elapsed = interp.time.elapsed_millis(start);
            interp.console.write(ConsoleLevel::Log, &format!("{}: {}ms", label, elapsed));
        }
        None => {
            let message = format!("Timer '{}' does not exist", label);
            interp.console.write(ConsoleLevel::Warn, &message);
        }
    }
    Ok(JsValue::Undefined)
}

fn console_clear(interp: &mut Interpreter, _this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    interp.console.clear();
    Ok(JsValue::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_args() {
        let args = [JsValue::from("a"), JsValue::from(1), JsValue::Null];
        assert_eq!(format_args(&args), "a 1 null");
    }
}
