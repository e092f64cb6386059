//! console output through host providers

use jsweave::platform::{BufferedConsoleProvider, ConsoleLevel, NoOpTimeProvider};
use jsweave::{Outcome, RunOptions, Runtime};

fn capture(source: &str) -> BufferedConsoleProvider {
    let console = BufferedConsoleProvider::new();
    let mut runtime = Runtime::new();
    runtime.set_console(Box::new(console.clone()));
    runtime.set_time_provider(Box::new(NoOpTimeProvider));
    let Ok(report) = runtime.eval(source, &RunOptions::default()) else {
        panic!("eval failed: {}", source);
    };
    assert!(matches!(report.outcome, Outcome::Completed(_)), "{:?}", report.outcome);
    console
}

#[test]
fn test_log_formatting() {
    let console = capture(r#"console.log('a', 1, [1, 'b'], { k: 2 }, null, undefined, true);"#);
    assert_eq!(console.messages(), vec!["a 1 [1, 'b'] { k: 2 } null undefined true"]);
}

#[test]
fn test_levels() {
    let console = capture("console.info('i'); console.warn('w'); console.error('e'); console.debug('d');");
    assert_eq!(
        console.lines(),
        vec![
            (ConsoleLevel::Info, "i".to_string()),
            (ConsoleLevel::Warn, "w".to_string()),
            (ConsoleLevel::Error, "e".to_string()),
            (ConsoleLevel::Debug, "d".to_string()),
        ]
    );
}

#[test]
fn test_errors_and_functions() {
    let console = capture("console.log(new TypeError('bad')); console.log(function named() {});");
    assert_eq!(console.messages(), vec!["TypeError: bad", "[Function: named]"]);
}

#[test]
fn test_promises_show_their_state() {
    let console = capture(
        "var r = Promise.reject(1); r.catch(function () {}); \
         console.log(new Promise(function () {})); console.log(Promise.resolve(1)); console.log(r);",
    );
    assert_eq!(
        console.messages(),
        vec!["Promise { <pending> }", "Promise { <fulfilled> }", "Promise { <rejected> }"]
    );
}

#[test]
fn test_assert() {
    let console = capture("console.assert(true, 'hidden'); console.assert(0, 'shown', 2); console.assert(false);");
    assert_eq!(
        console.lines(),
        vec![
            (ConsoleLevel::Error, "Assertion failed: shown 2".to_string()),
            (ConsoleLevel::Error, "Assertion failed".to_string()),
        ]
    );
}

#[test]
fn test_timers() {
    let console = capture("console.time('t'); console.time('t'); console.timeEnd('t'); console.timeEnd('t'); console.time(); console.timeEnd();");
    assert_eq!(
        console.messages(),
        vec![
            "Timer 't' already exists",
            "t: 0ms",
            "Timer 't' does not exist",
            "default: 0ms",
        ]
    );
}

#[test]
fn test_clear() {
    let console = capture("console.log('gone'); console.clear(); console.log('kept');");
    assert_eq!(console.messages(), vec!["kept"]);
}

#[test]
fn test_output_order_with_microtasks() {
    let console = capture(
        r#"
        Promise.resolve().then(() => console.log('micro'));
        (async () => { console.log('async start'); await null; console.log('async end'); })();
        console.log('sync');
    "#,
    );
    assert_eq!(console.messages(), vec!["async start", "sync", "micro", "async end"]);
}
