#![no_main]

use jsweave::platform::NoOpConsoleProvider;
use jsweave::{EngineError, JsError, Outcome, RunOptions, Runtime};
use libfuzzer_sys::fuzz_target;

const MAX_STEPS: u64 = 100_000;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    // More expensive per byte than parsing
    if source.len() > 10_000 {
        return;
    }

    let mut runtime = Runtime::new();
    runtime.set_console(Box::new(NoOpConsoleProvider));
    let options = RunOptions::default().with_max_steps(MAX_STEPS);

    let report = match runtime.eval(source, &options) {
        Ok(report) => report,
        Err(JsError::Engine(e @ EngineError::InvariantViolation(_))) => panic!("{}", e),
        Err(_) => return,
    };
    // A paused or parked script must always be cancellable
    if matches!(report.outcome, Outcome::Paused | Outcome::Suspended) && runtime.abort().is_err() {
        panic!("abort failed after {:?}", report.outcome);
    }
});
