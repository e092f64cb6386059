//! Host driver: budgets, pause/resume, abort, host promises and generators

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::{n, run_report, s};
use jsweave::{EngineError, JsError, JsValue, Outcome, RunOptions, Runtime};

fn global(runtime: &mut Runtime, name: &str) -> JsValue {
    match runtime.get_global(name) {
        Ok(value) => value,
        Err(err) => panic!("get_global({}) failed: {}", name, err),
    }
}

fn number(value: JsValue) -> f64 {
    match value {
        JsValue::Number(n) => n,
        other => panic!("expected a number, got {:?}", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Budgets
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_infinite_loop_pauses_and_resumes_in_place() {
    let mut runtime = Runtime::new();
    let budget = RunOptions::default().with_max_steps(500);
    let report = run_report(&mut runtime, "var counter = 0; while (true) { counter++; }", budget);
    assert_eq!(report.outcome, Outcome::Paused);
    assert_eq!(report.steps, 500);
    let first = number(global(&mut runtime, "counter"));
    assert!(first > 0.0);

    let Ok(report) = runtime.resume(&budget) else {
        panic!("resume failed");
    };
    assert_eq!(report.outcome, Outcome::Paused);
    let second = number(global(&mut runtime, "counter"));
    assert!(second > first);
    // Same budget again: no iteration was replayed from the start
    assert!(second <= first * 2.0 + 1.0);
}

#[test]
fn test_sliced_run_reaches_the_same_result() {
    let source = "var c = 0; for (let i = 0; i < 300; i++) { c += i; } c";
    let mut runtime = Runtime::new();
    let slice = RunOptions::default().with_max_steps(37);
    let mut report = run_report(&mut runtime, source, slice);
    let mut slices = 1;
    while report.outcome == Outcome::Paused {
        report = match runtime.run(&slice) {
            Ok(report) => report,
            Err(err) => panic!("run failed: {}", err),
        };
        slices += 1;
    }
    assert!(slices > 1);
    assert_eq!(report.outcome, Outcome::Completed(n(44850.0)));
}

#[test]
fn test_wall_time_budget() {
    let mut runtime = Runtime::new();
    let options = RunOptions::default().with_max_wall_time(Duration::from_millis(20));
    let report = run_report(&mut runtime, "while (true) {}", options);
    assert_eq!(report.outcome, Outcome::Paused);
    assert!(report.steps > 0);
}

#[test]
fn test_new_task_rejected_while_paused() {
    let mut runtime = Runtime::new();
    run_report(&mut runtime, "while (true) {}", RunOptions::default().with_max_steps(10));
    let err = runtime.eval("1", &RunOptions::default()).err();
    assert!(matches!(err, Some(JsError::Engine(EngineError::TaskInProgress))));
}

#[test]
fn test_run_without_work_is_error() {
    let mut runtime = Runtime::new();
    let err = runtime.run(&RunOptions::default()).err();
    assert!(matches!(err, Some(JsError::Engine(EngineError::NoActiveExecution))));
}

#[test]
fn test_budget_pauses_inside_array_callback() {
    let mut runtime = Runtime::new();
    let budget = RunOptions::default().with_max_steps(1000);
    let report = run_report(&mut runtime, "var n = 0; [1].map(() => { while (true) { n++; } })", budget);
    assert_eq!(report.outcome, Outcome::Paused);
    assert_eq!(report.steps, 1000);
    let first = number(global(&mut runtime, "n"));
    assert!(first > 0.0);

    let Ok(report) = runtime.resume(&budget) else {
        panic!("resume failed");
    };
    assert_eq!(report.outcome, Outcome::Paused);
    assert!(number(global(&mut runtime, "n")) > first);
}

#[test]
fn test_budget_pauses_inside_sort_comparator_and_resumes() {
    let source = r#"
        var calls = 0;
        var sorted = [5, 3, 9, 1, 7, 2].sort((a, b) => { for (let i = 0; i < 50; i++) {} calls++; return a - b; });
        sorted.join() + ' ' + (calls > 0)
    "#;
    let mut runtime = Runtime::new();
    let slice = RunOptions::default().with_max_steps(40);
    let mut report = run_report(&mut runtime, source, slice);
    let mut slices = 1;
    while report.outcome == Outcome::Paused {
        report = match runtime.run(&slice) {
            Ok(report) => report,
            Err(err) => panic!("run failed: {}", err),
        };
        slices += 1;
    }
    assert!(slices > 10);
    assert_eq!(report.outcome, Outcome::Completed(s("1,2,3,5,7,9 true")));
}

#[test]
fn test_budget_pauses_inside_promise_executor() {
    let mut runtime = Runtime::new();
    let source = "var spins = 0; new Promise(() => { while (true) { spins++; } })";
    let report = run_report(&mut runtime, source, RunOptions::default().with_max_steps(300));
    assert_eq!(report.outcome, Outcome::Paused);
    assert!(number(global(&mut runtime, "spins")) > 0.0);
    let Ok(report) = runtime.abort() else {
        panic!("abort failed");
    };
    assert_eq!(report.outcome, Outcome::Aborted);
}

#[test]
fn test_recursion_through_callbacks_stays_off_the_host_stack() {
    let mut runtime = Runtime::new();
    let source = "function f(n) { return n ? [n].map(x => f(x - 1))[0] + 1 : 0; } f(2000)";
    let report = run_report(&mut runtime, source, RunOptions::default());
    assert_eq!(report.outcome, Outcome::Completed(n(2000.0)));
}

#[test]
fn test_budget_exhausted_inside_getter_aborts_task() {
    // Getters read by natives run to completion, so a budget that runs out
    // there aborts the task instead of pausing it
    let mut runtime = Runtime::new();
    let source = r#"
        var log = [];
        var holder = { get value() { try { while (true) {} } finally { log.push('getter'); } } };
        try { JSON.stringify(holder); } finally { log.push('outer'); }
    "#;
    let report = run_report(&mut runtime, source, RunOptions::default().with_max_steps(1000));
    assert_eq!(report.outcome, Outcome::Aborted);
    assert!(!runtime.has_pending_work());
    let Ok(report) = runtime.eval("log.join()", &RunOptions::default()) else {
        panic!("eval failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(s("getter,outer")));
}

#[test]
fn test_budget_exhausted_while_closing_iterator_aborts_task() {
    // Closing the iterator after a failed read must not turn the abort
    // back into the guest error
    let mut runtime = Runtime::new();
    let source = r#"
        var log = [];
        var iter = {
            [Symbol.iterator]() { return this; },
            next() { return { done: false, get value() { throw new Error('bad value'); } }; },
            return() { log.push('closing'); while (true) {} }
        };
        try { Array.from(iter); } catch (e) { log.push('caught'); }
    "#;
    let report = run_report(&mut runtime, source, RunOptions::default().with_max_steps(2000));
    assert_eq!(report.outcome, Outcome::Aborted);
    let Ok(report) = runtime.eval("log.join()", &RunOptions::default()) else {
        panic!("eval failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(s("closing")));
}

#[test]
fn test_nested_native_reentry_is_bounded() {
    let mut runtime = Runtime::new();
    let source = r#"
        var o = { valueOf() { return o + 1; } };
        try { o + 1; 'finished' } catch (e) { e instanceof RangeError }
    "#;
    let report = run_report(&mut runtime, source, RunOptions::default());
    assert_eq!(report.outcome, Outcome::Completed(JsValue::Boolean(true)));
}

// ═══════════════════════════════════════════════════════════════════════════
// Interrupts and abort
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_pause_before_run() {
    let mut runtime = Runtime::new();
    runtime.pause();
    let report = run_report(&mut runtime, "6 * 7", RunOptions::default());
    assert_eq!(report.outcome, Outcome::Paused);
    assert_eq!(report.steps, 0);
    let Ok(report) = runtime.resume(&RunOptions::default()) else {
        panic!("resume failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(n(42.0)));
}

#[test]
fn test_interrupt_from_another_thread() {
    let mut runtime = Runtime::new();
    let handle = runtime.interrupt_handle();
    let pauser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        handle.pause();
    });
    let report = run_report(&mut runtime, "var spins = 0; while (true) { spins++; }", RunOptions::default());
    let _ = pauser.join();
    assert_eq!(report.outcome, Outcome::Paused);
    assert!(number(global(&mut runtime, "spins")) > 0.0);

    runtime.interrupt_handle().abort();
    let Ok(report) = runtime.run(&RunOptions::default()) else {
        panic!("run failed");
    };
    assert_eq!(report.outcome, Outcome::Aborted);
    assert!(!runtime.has_pending_work());
}

#[test]
fn test_abort_runs_finally_blocks() {
    let mut runtime = Runtime::new();
    let source = r#"
        var log = [];
        function work() {
            try { while (true) {} }
            finally { log.push('inner'); }
        }
        try { work(); } finally { log.push('outer'); }
    "#;
    let report = run_report(&mut runtime, source, RunOptions::default().with_max_steps(200));
    assert_eq!(report.outcome, Outcome::Paused);

    let Ok(report) = runtime.abort() else {
        panic!("abort failed");
    };
    assert_eq!(report.outcome, Outcome::Aborted);
    let Ok(log) = runtime.eval("log.join()", &RunOptions::default()) else {
        panic!("eval failed");
    };
    assert_eq!(log.outcome, Outcome::Completed(s("inner,outer")));
}

#[test]
fn test_abort_inside_callback_runs_finally_and_stops_iteration() {
    let mut runtime = Runtime::new();
    let source = r#"
        var log = [];
        [1, 2, 3].forEach(x => {
            try { while (true) {} }
            finally { log.push('callback ' + x); }
        });
    "#;
    let report = run_report(&mut runtime, source, RunOptions::default().with_max_steps(300));
    assert_eq!(report.outcome, Outcome::Paused);
    let Ok(report) = runtime.abort() else {
        panic!("abort failed");
    };
    assert_eq!(report.outcome, Outcome::Aborted);
    let Ok(log) = runtime.eval("log.join()", &RunOptions::default()) else {
        panic!("eval failed");
    };
    assert_eq!(log.outcome, Outcome::Completed(s("callback 1")));
}

#[test]
fn test_abort_cannot_be_caught() {
    let mut runtime = Runtime::new();
    let source = r#"
        var caught = false;
        try { while (true) {} } catch (e) { caught = true; }
    "#;
    run_report(&mut runtime, source, RunOptions::default().with_max_steps(50));
    assert!(runtime.abort().is_ok());
    assert_eq!(global(&mut runtime, "caught"), JsValue::Boolean(false));
}

#[test]
fn test_abort_unwinds_parked_async_functions_and_drops_jobs() {
    let mut runtime = Runtime::new();
    let promise = runtime.create_promise();
    runtime.define_global("hostPromise", JsValue::Object(promise.clone()));
    let source = r#"
        var log = [];
        async function waiter() {
            try { await hostPromise; log.push('resumed'); }
            finally { log.push('waiter finally'); }
        }
        waiter();
        await hostPromise;
    "#;
    let report = run_report(&mut runtime, source, RunOptions::default());
    assert_eq!(report.outcome, Outcome::Suspended);

    assert!(runtime.abort().is_ok());
    assert!(!runtime.has_pending_work());
    assert!(runtime.resolve_promise(&promise, n(1.0)).is_ok());
    let Ok(report) = runtime.eval("log.join()", &RunOptions::default()) else {
        panic!("eval failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(s("waiter finally")));
}

// ═══════════════════════════════════════════════════════════════════════════
// Host promises
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_suspended_until_host_resolves() {
    let mut runtime = Runtime::new();
    let promise = runtime.create_promise();
    runtime.define_global("fetchConfig", JsValue::Object(promise.clone()));
    let report = run_report(&mut runtime, "const cfg = await fetchConfig; cfg.port + 1", RunOptions::default());
    assert_eq!(report.outcome, Outcome::Suspended);
    assert!(runtime.has_pending_work());

    let value = runtime.value_from_json(&serde_json::json!({ "port": 8080 }));
    assert!(runtime.resolve_promise(&promise, value).is_ok());
    let Ok(report) = runtime.run(&RunOptions::default()) else {
        panic!("run failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(n(8081.0)));
}

#[test]
fn test_host_rejection_reaches_guest_catch() {
    let mut runtime = Runtime::new();
    let promise = runtime.create_promise();
    runtime.define_global("load", JsValue::Object(promise.clone()));
    let source = "let r; try { await load; } catch (e) { r = 'caught ' + e; } r";
    let report = run_report(&mut runtime, source, RunOptions::default());
    assert_eq!(report.outcome, Outcome::Suspended);
    runtime.reject_promise(&promise, s("offline"));
    let Ok(report) = runtime.run(&RunOptions::default()) else {
        panic!("run failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(s("caught offline")));
}

#[test]
fn test_unhandled_rejections_reported() {
    let mut runtime = Runtime::new();
    let report = run_report(
        &mut runtime,
        "Promise.reject('lost'); const p = Promise.reject('kept'); p.catch(() => {}); 1",
        RunOptions::default(),
    );
    assert_eq!(report.outcome, Outcome::Completed(n(1.0)));
    assert_eq!(report.unhandled_rejections, vec![s("lost")]);
}

#[test]
fn test_uncaught_throw_is_rejected_outcome() {
    let mut runtime = Runtime::new();
    let report = run_report(&mut runtime, "throw 'top';", RunOptions::default());
    assert_eq!(report.outcome, Outcome::Rejected(s("top")));
}

// ═══════════════════════════════════════════════════════════════════════════
// Host calls and generators
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_call_function_from_host() {
    let mut runtime = Runtime::new();
    run_report(&mut runtime, "function add(a, b) { return a + b; }", RunOptions::default());
    let add = global(&mut runtime, "add");
    let Ok(report) = runtime.call_function(&add, &[n(2.0), n(3.0)], &RunOptions::default()) else {
        panic!("call failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(n(5.0)));
}

#[test]
fn test_call_function_throw_is_rejected() {
    let mut runtime = Runtime::new();
    run_report(&mut runtime, "function fail() { throw new Error('nope'); }", RunOptions::default());
    let fail = global(&mut runtime, "fail");
    let Ok(report) = runtime.call_function(&fail, &[], &RunOptions::default()) else {
        panic!("call failed");
    };
    assert!(matches!(report.outcome, Outcome::Rejected(JsValue::Object(_))));
}

#[test]
fn test_host_driven_generator() {
    let mut runtime = Runtime::new();
    run_report(
        &mut runtime,
        "function* g() { const x = yield 1; yield x * 2; return 'end'; } var it = g();",
        RunOptions::default(),
    );
    let it = global(&mut runtime, "it");
    let options = RunOptions::default();

    let step = |runtime: &mut Runtime, value: JsValue| match runtime.generator_next(&it, value, &options) {
        Ok(report) => report.outcome,
        Err(err) => panic!("generator_next failed: {}", err),
    };
    assert_eq!(step(&mut runtime, JsValue::Undefined), Outcome::Yielded(n(1.0)));
    assert_eq!(step(&mut runtime, n(21.0)), Outcome::Yielded(n(42.0)));
    assert_eq!(step(&mut runtime, JsValue::Undefined), Outcome::Completed(s("end")));
    assert_eq!(step(&mut runtime, JsValue::Undefined), Outcome::Completed(JsValue::Undefined));
}

#[test]
fn test_host_generator_return_and_throw() {
    let mut runtime = Runtime::new();
    run_report(
        &mut runtime,
        "var log = []; function* g() { try { yield 1; } finally { log.push('closed'); } } var a = g(); var b = g();",
        RunOptions::default(),
    );
    let a = global(&mut runtime, "a");
    let b = global(&mut runtime, "b");
    let options = RunOptions::default();

    assert!(runtime.generator_next(&a, JsValue::Undefined, &options).is_ok());
    let Ok(report) = runtime.generator_return(&a, s("bye"), &options) else {
        panic!("generator_return failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(s("bye")));

    assert!(runtime.generator_next(&b, JsValue::Undefined, &options).is_ok());
    let Ok(report) = runtime.generator_throw(&b, s("boom"), &options) else {
        panic!("generator_throw failed");
    };
    assert_eq!(report.outcome, Outcome::Rejected(s("boom")));

    let Ok(report) = runtime.eval("log.join()", &options) else {
        panic!("eval failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(s("closed,closed")));
}

#[test]
fn test_yield_observer_sees_every_yield() {
    let mut runtime = Runtime::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    runtime.set_yield_observer(move |value| sink.borrow_mut().push(value.clone()));
    let report = run_report(
        &mut runtime,
        "function* g() { yield 'a'; yield 'b'; } [...g()].length",
        RunOptions::default(),
    );
    assert_eq!(report.outcome, Outcome::Completed(n(2.0)));
    assert_eq!(*seen.borrow(), vec![s("a"), s("b")]);
}

#[test]
fn test_generator_paused_mid_body_resumes() {
    let mut runtime = Runtime::new();
    run_report(
        &mut runtime,
        "function* g() { let t = 0; for (let i = 0; i < 200; i++) t += i; yield t; } var it = g();",
        RunOptions::default(),
    );
    let it = global(&mut runtime, "it");
    let slice = RunOptions::default().with_max_steps(25);
    let mut report = match runtime.generator_next(&it, JsValue::Undefined, &slice) {
        Ok(report) => report,
        Err(err) => panic!("generator_next failed: {}", err),
    };
    while report.outcome == Outcome::Paused {
        report = match runtime.run(&slice) {
            Ok(report) => report,
            Err(err) => panic!("run failed: {}", err),
        };
    }
    assert_eq!(report.outcome, Outcome::Yielded(n(19900.0)));
}
