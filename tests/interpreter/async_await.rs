//! Async functions, await ordering and top-level await

use super::{eval, n, run_report, s, throws_error};
use jsweave::{JsValue, Outcome, RunOptions, Runtime};

#[test]
fn test_async_function_returns_promise() {
    assert_eq!(eval("async function f() { return 1; } f() instanceof Promise"), JsValue::Boolean(true));
}

#[test]
fn test_top_level_await() {
    assert_eq!(eval("async function f() { return 20; } (await f()) + 1"), n(21.0));
    assert_eq!(eval("await 5"), n(5.0));
}

#[test]
fn test_await_is_never_synchronous() {
    assert_eq!(
        eval(
            r#"
            const log = [];
            async function f() { log.push('before'); await null; log.push('after'); }
            f();
            log.push('sync');
            await null;
            await null;
            log.join()
        "#
        ),
        s("before,sync,after")
    );
}

#[test]
fn test_awaiting_resolved_value_still_defers() {
    assert_eq!(
        eval(
            r#"
            let flag = 'unset';
            async function f() { await 1; flag = 'set'; }
            f();
            const seen = flag;
            await f();
            seen + ',' + flag
        "#
        ),
        s("unset,set")
    );
}

#[test]
fn test_rejection_caught_inside_async_function() {
    assert_eq!(
        eval(
            r#"
            async function f() {
                try { await Promise.reject(new Error('nope')); return 'unreached'; }
                catch (e) { return 'caught ' + e.message; }
            }
            await f()
        "#
        ),
        s("caught nope")
    );
}

#[test]
fn test_async_promise_settles_once() {
    assert_eq!(
        eval(
            r#"
            let settlements = 0;
            async function f() {
                try { await Promise.reject('first'); }
                finally { settlements += 0; }
            }
            const p = f();
            p.then(() => settlements++, () => settlements++);
            try { await p; } catch (e) {}
            await null;
            settlements
        "#
        ),
        n(1.0)
    );
}

#[test]
fn test_async_throw_rejects_promise() {
    assert_eq!(
        eval(
            r#"
            async function f() { throw new TypeError('bad'); }
            let msg;
            await f().catch(e => { msg = e.name + ':' + e.message; });
            msg
        "#
        ),
        s("TypeError:bad")
    );
}

#[test]
fn test_uncaught_top_level_await_rejection() {
    assert!(throws_error("await Promise.reject(new RangeError('late'))", "RangeError: late"));
}

#[test]
fn test_sequential_awaits_in_loop() {
    assert_eq!(
        eval(
            r#"
            const delay = v => new Promise(resolve => resolve(v));
            async function sum(n) { let t = 0; for (let i = 1; i <= n; i++) t += await delay(i); return t; }
            await sum(10)
        "#
        ),
        n(55.0)
    );
}

#[test]
fn test_async_arrow_and_method() {
    assert_eq!(
        eval(
            r#"
            const double = async x => x * 2;
            const o = { async triple(x) { return x * 3; } };
            (await double(2)) + (await o.triple(2))
        "#
        ),
        n(10.0)
    );
}

#[test]
fn test_await_thenable() {
    assert_eq!(
        eval(
            r#"
            const thenable = { then(resolve) { resolve('from thenable'); } };
            await thenable
        "#
        ),
        s("from thenable")
    );
}

#[test]
fn test_interleaving_of_two_async_functions() {
    assert_eq!(
        eval(
            r#"
            const log = [];
            async function a() { log.push('a1'); await null; log.push('a2'); await null; log.push('a3'); }
            async function b() { log.push('b1'); await null; log.push('b2'); await null; log.push('b3'); }
            await Promise.all([a(), b()]);
            log.join()
        "#
        ),
        s("a1,b1,a2,b2,a3,b3")
    );
}

#[test]
fn test_finally_in_async_function_after_await() {
    assert_eq!(
        eval(
            r#"
            const log = [];
            async function f() {
                try { await null; log.push('body'); return 'r'; }
                finally { log.push('finally'); }
            }
            log.push(await f());
            log.join()
        "#
        ),
        s("body,finally,r")
    );
}

#[test]
fn test_async_function_in_class() {
    assert_eq!(
        eval(
            r#"
            class Repo { async load(id) { await null; return { id }; } }
            (await new Repo().load(7)).id
        "#
        ),
        n(7.0)
    );
}

#[test]
fn test_async_generator_unsupported() {
    assert!(throws_error("async function* g() {} g()", "async generator"));
}

#[test]
fn test_continuation_for_halted_invocation_is_dropped() {
    let mut runtime = Runtime::new();
    let gate = runtime.create_promise();
    runtime.define_global("gate", JsValue::Object(gate.clone()));
    let source = r#"
        var log = [];
        async function worker() {
            try { await gate; log.push('resumed'); }
            finally { log.push('halted'); }
        }
        worker();
        await gate;
    "#;
    let report = run_report(&mut runtime, source, RunOptions::default());
    assert_eq!(report.outcome, Outcome::Suspended);
    let Ok(report) = runtime.abort() else {
        panic!("abort failed");
    };
    assert_eq!(report.outcome, Outcome::Aborted);

    // Settling the gate queues a continuation for the halted worker
    assert!(runtime.resolve_promise(&gate, n(1.0)).is_ok());
    assert!(runtime.has_pending_work());
    let Ok(report) = runtime.run(&RunOptions::default()) else {
        panic!("run failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(JsValue::Undefined));
    assert!(!runtime.has_pending_work());

    let Ok(report) = runtime.eval("log.join()", &RunOptions::default()) else {
        panic!("eval failed");
    };
    assert_eq!(report.outcome, Outcome::Completed(s("halted")));
}
