//! Promise built-in and microtask ordering

use super::{eval, n, s, throws_error};
use jsweave::JsValue;

#[test]
fn test_then_chain() {
    assert_eq!(
        eval("await Promise.resolve(1).then(v => v + 1).then(v => v * 10)"),
        n(20.0)
    );
}

#[test]
fn test_microtasks_run_fifo() {
    assert_eq!(
        eval(
            r#"
            const log = [];
            Promise.resolve().then(() => log.push(1));
            Promise.resolve().then(() => log.push(2));
            Promise.resolve().then(() => log.push(3)).then(() => log.push(5));
            Promise.resolve().then(() => log.push(4));
            await null; await null; await null;
            log.join()
        "#
        ),
        s("1,2,3,4,5")
    );
}

#[test]
fn test_then_callbacks_are_async() {
    assert_eq!(
        eval(
            r#"
            const log = [];
            Promise.resolve().then(() => log.push('then'));
            log.push('sync');
            await null;
            log.join()
        "#
        ),
        s("sync,then")
    );
}

#[test]
fn test_executor_runs_synchronously() {
    assert_eq!(eval("let ran = false; new Promise(() => { ran = true; }); ran"), JsValue::Boolean(true));
}

#[test]
fn test_executor_throw_rejects() {
    assert_eq!(
        eval("await new Promise(() => { throw new Error('exec'); }).catch(e => e.message)"),
        s("exec")
    );
}

#[test]
fn test_resolve_only_first_settlement_counts() {
    assert_eq!(
        eval("await new Promise((resolve, reject) => { resolve('first'); reject('second'); resolve('third'); })"),
        s("first")
    );
}

#[test]
fn test_catch_and_recover() {
    assert_eq!(
        eval("await Promise.reject('e').catch(e => 'recovered ' + e).then(v => v.toUpperCase())"),
        s("RECOVERED E")
    );
}

#[test]
fn test_finally_passes_value_through() {
    assert_eq!(
        eval(
            r#"
            let cleaned = false;
            const v = await Promise.resolve(3).finally(() => { cleaned = true; return 'ignored'; });
            v + ':' + cleaned
        "#
        ),
        s("3:true")
    );
}

#[test]
fn test_finally_passes_rejection_through() {
    assert_eq!(
        eval("await Promise.reject('why').finally(() => {}).catch(e => 'still ' + e)"),
        s("still why")
    );
}

#[test]
fn test_promise_all() {
    assert_eq!(
        eval("(await Promise.all([1, Promise.resolve(2), new Promise(r => r(3))])).join()"),
        s("1,2,3")
    );
    assert_eq!(eval("(await Promise.all([])).length"), n(0.0));
}

#[test]
fn test_promise_all_rejects_on_first_failure() {
    assert_eq!(
        eval("await Promise.all([Promise.resolve(1), Promise.reject('bad'), 3]).catch(e => e)"),
        s("bad")
    );
}

#[test]
fn test_promise_race() {
    assert_eq!(eval("await Promise.race([new Promise(() => {}), Promise.resolve('fast')])"), s("fast"));
}

#[test]
fn test_resolve_with_promise_adopts_state() {
    assert_eq!(eval("await new Promise(r => r(Promise.resolve('inner')))"), s("inner"));
}

#[test]
fn test_self_resolution_is_type_error() {
    assert!(throws_error(
        "let resolveSelf; const p = new Promise(r => { resolveSelf = r; }); resolveSelf(p); await p",
        "TypeError"
    ));
}

#[test]
fn test_promise_requires_new_and_executor() {
    assert!(throws_error("Promise(() => {})", "TypeError"));
    assert!(throws_error("new Promise(5)", "TypeError"));
}

#[test]
fn test_promise_resolve_returns_same_promise() {
    assert_eq!(eval("const p = Promise.resolve(1); Promise.resolve(p) === p"), JsValue::Boolean(true));
}
