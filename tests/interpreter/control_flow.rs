//! Control flow: loops, labels, switch, try/catch/finally

use super::{eval, n, s, throws_error};
use jsweave::JsValue;

// ═══════════════════════════════════════════════════════════════════════════
// Loops
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_for_loop() {
    assert_eq!(eval("let t = 0; for (let i = 1; i <= 10; i++) t += i; t"), n(55.0));
}

#[test]
fn test_do_while_runs_once() {
    assert_eq!(eval("let c = 0; do { c++; } while (false); c"), n(1.0));
}

#[test]
fn test_for_in_enumerates_own_then_inherited() {
    assert_eq!(
        eval(
            r#"
            const proto = { inherited: 1 };
            const o = Object.create(proto);
            o.b = 2; o.a = 3; o[1] = 4;
            const keys = [];
            for (const k in o) keys.push(k);
            keys.join()
        "#
        ),
        s("1,b,a,inherited")
    );
}

#[test]
fn test_for_in_over_null_is_skipped() {
    assert_eq!(eval("let c = 0; for (const k in null) c++; c"), n(0.0));
}

#[test]
fn test_for_of_array_and_string() {
    assert_eq!(eval("let t = 0; for (const v of [1, 2, 3]) t += v; t"), n(6.0));
    assert_eq!(eval("let r = ''; for (const ch of 'abc') r = ch + r; r"), s("cba"));
}

#[test]
fn test_for_of_non_iterable_throws() {
    assert!(throws_error("for (const v of 5) {}", "TypeError"));
}

#[test]
fn test_for_of_break_closes_iterator() {
    assert_eq!(
        eval(
            r#"
            let closed = false;
            const iterable = {
                [Symbol.iterator]() {
                    let i = 0;
                    return {
                        next() { return { value: i++, done: false }; },
                        return() { closed = true; return {}; },
                    };
                },
            };
            for (const v of iterable) { if (v === 2) break; }
            closed
        "#
        ),
        JsValue::Boolean(true)
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// Labels
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_labeled_break_targets_outer_loop() {
    assert_eq!(
        eval(
            r#"
            let pairs = [];
            outer: for (let i = 0; i < 3; i++) {
                for (let j = 0; j < 3; j++) {
                    if (j === 1) continue outer;
                    if (i === 2) break outer;
                    pairs.push(i + '' + j);
                }
            }
            pairs.join()
        "#
        ),
        s("00,10")
    );
}

#[test]
fn test_labeled_block_break() {
    assert_eq!(
        eval(
            r#"
            let r = 'start';
            done: {
                r = 'inside';
                break done;
                r = 'unreachable';
            }
            r
        "#
        ),
        s("inside")
    );
}

#[test]
fn test_bare_break_targets_nearest_switch() {
    assert_eq!(
        eval(
            r#"
            let log = [];
            for (let i = 0; i < 2; i++) {
                switch (i) {
                    case 0: log.push('zero'); break;
                    default: log.push('other');
                }
                log.push('after' + i);
            }
            log.join()
        "#
        ),
        s("zero,after0,other,after1")
    );
}

#[test]
fn test_continue_inside_switch_targets_loop() {
    assert_eq!(
        eval(
            r#"
            let t = 0;
            for (let i = 0; i < 4; i++) {
                switch (i % 2) { case 0: continue; }
                t += i;
            }
            t
        "#
        ),
        n(4.0)
    );
}

#[test]
fn test_unknown_label_is_syntax_error() {
    assert!(throws_error("while (true) { break nowhere; }", "SyntaxError"));
    assert!(throws_error("break;", "SyntaxError"));
}

// ═══════════════════════════════════════════════════════════════════════════
// switch
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_switch_fallthrough() {
    assert_eq!(
        eval(
            r#"
            let r = '';
            switch (2) { case 1: r += 'a'; case 2: r += 'b'; case 3: r += 'c'; break; case 4: r += 'd'; }
            r
        "#
        ),
        s("bc")
    );
}

#[test]
fn test_switch_default_in_middle() {
    assert_eq!(
        eval("let r = ''; switch (9) { case 1: r += 'a'; default: r += 'd'; case 2: r += 'b'; } r"),
        s("db")
    );
}

#[test]
fn test_switch_uses_strict_equality() {
    assert_eq!(eval("let r = 'none'; switch ('1') { case 1: r = 'number'; break; case '1': r = 'string'; } r"), s("string"));
}

// ═══════════════════════════════════════════════════════════════════════════
// try / catch / finally
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_catch_receives_thrown_value() {
    assert_eq!(eval("try { throw { code: 7 }; } catch (e) { e.code }"), n(7.0));
}

#[test]
fn test_catch_typed_error_is_error_object() {
    assert_eq!(
        eval("try { null.x; } catch (e) { [e instanceof TypeError, e.name].join() }"),
        s("true,TypeError")
    );
}

#[test]
fn test_finally_runs_after_return() {
    assert_eq!(
        eval(
            r#"
            const log = [];
            function f() {
                try { log.push('try'); return 'value'; }
                finally { log.push('finally'); }
            }
            log.push(f());
            log.join()
        "#
        ),
        s("try,finally,value")
    );
}

#[test]
fn test_finally_return_overrides() {
    assert_eq!(eval("function f() { try { return 1; } finally { return 2; } } f()"), n(2.0));
    assert_eq!(eval("function f() { try { throw 1; } finally { return 3; } } f()"), n(3.0));
}

#[test]
fn test_break_in_finally_discards_throw() {
    assert_eq!(
        eval(
            r#"
            let r = 'start';
            while (true) {
                try { throw new Error('lost'); }
                finally { r = 'broke'; break; }
            }
            r
        "#
        ),
        s("broke")
    );
}

#[test]
fn test_nested_finally_ordering() {
    assert_eq!(
        eval(
            r#"
            const log = [];
            function f() {
                try {
                    try { throw 'inner'; }
                    finally { log.push('f1'); }
                } catch (e) {
                    log.push('caught ' + e);
                    return 'r';
                } finally {
                    log.push('f2');
                }
            }
            log.push(f());
            log.join()
        "#
        ),
        s("f1,caught inner,f2,r")
    );
}

#[test]
fn test_rethrow_from_catch() {
    assert!(throws_error("try { throw new Error('a'); } catch (e) { throw new RangeError('b'); }", "RangeError: b"));
}

#[test]
fn test_optional_catch_binding() {
    assert_eq!(eval("let r; try { throw 1; } catch { r = 'ok'; } r"), s("ok"));
}

#[test]
fn test_uncaught_throw_value() {
    assert!(throws_error("throw 'plain';", "plain"));
}

#[test]
fn test_try_completion_value() {
    assert_eq!(eval("try { 1; } finally { 2; }"), n(1.0));
    assert_eq!(eval("try { throw 0; } catch (e) { 5; }"), n(5.0));
}
