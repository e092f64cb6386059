//! Generators: lazy iteration, resumption kinds, delegation, idempotence

use super::{eval, eval_result, n, s, throws_error};
use jsweave::{EngineError, JsError, JsValue};

#[test]
fn test_generator_is_lazy() {
    assert_eq!(
        eval(
            r#"
            const log = [];
            function* gen() { log.push('start'); yield 1; log.push('end'); }
            const g = gen();
            log.push('created');
            g.next();
            log.join()
        "#
        ),
        s("created,start")
    );
}

#[test]
fn test_generator_sequence_and_done() {
    assert_eq!(
        eval(
            r#"
            function* gen() { yield 1; yield 2; return 3; }
            const g = gen();
            const r = [g.next(), g.next(), g.next(), g.next()];
            r.map(x => x.value + ':' + x.done).join()
        "#
        ),
        s("1:false,2:false,3:true,undefined:true")
    );
}

#[test]
fn test_next_value_becomes_yield_result() {
    assert_eq!(
        eval(
            r#"
            function* acc() { let total = 0; while (true) { total += yield total; } }
            const g = acc();
            g.next(); g.next(5); g.next(10);
            g.next(1).value
        "#
        ),
        n(16.0)
    );
}

#[test]
fn test_generator_in_for_of_and_spread() {
    assert_eq!(eval("function* r(n) { for (let i = 0; i < n; i++) yield i; } [...r(4)].join()"), s("0,1,2,3"));
    assert_eq!(eval("function* r() { yield 'a'; yield 'b'; } let t = ''; for (const v of r()) t += v; t"), s("ab"));
}

#[test]
fn test_return_runs_finally() {
    assert_eq!(
        eval(
            r#"
            const log = [];
            function* gen() { try { yield 1; yield 2; } finally { log.push('cleanup'); } }
            const g = gen();
            g.next();
            const r = g.return(99);
            log.push(r.value + ':' + r.done);
            log.join()
        "#
        ),
        s("cleanup,99:true")
    );
}

#[test]
fn test_completed_return_is_idempotent() {
    assert_eq!(
        eval(
            r#"
            let finallyRuns = 0;
            function* gen() { try { yield 1; } finally { finallyRuns++; } }
            const g = gen();
            g.next();
            const first = g.return('x');
            const second = g.return('y');
            const third = g.next();
            [first.done, second.value, second.done, third.value, third.done, finallyRuns].join()
        "#
        ),
        s("true,y,true,,true,1")
    );
}

#[test]
fn test_yield_in_finally_during_return() {
    assert_eq!(
        eval(
            r#"
            function* gen() { try { yield 1; } finally { yield 'from finally'; } }
            const g = gen();
            g.next();
            const a = g.return('done');
            const b = g.next();
            [a.value, a.done, b.value, b.done].join()
        "#
        ),
        s("from finally,false,done,true")
    );
}

#[test]
fn test_throw_is_catchable_inside_generator() {
    assert_eq!(
        eval(
            r#"
            function* gen() {
                while (true) {
                    try { yield 'waiting'; }
                    catch (e) { yield 'caught ' + e; }
                }
            }
            const g = gen();
            g.next();
            g.throw('boom').value
        "#
        ),
        s("caught boom")
    );
}

#[test]
fn test_throw_before_start_completes_generator() {
    assert_eq!(
        eval(
            r#"
            function* gen() { yield 1; }
            const g = gen();
            let caught;
            try { g.throw(new Error('early')); } catch (e) { caught = e.message; }
            [caught, g.next().done].join()
        "#
        ),
        s("early,true")
    );
}

#[test]
fn test_uncaught_throw_in_generator_propagates() {
    assert!(throws_error("function* g() { throw new TypeError('inside'); } g().next()", "TypeError: inside"));
}

#[test]
fn test_yield_star_delegation() {
    assert_eq!(
        eval(
            r#"
            function* inner() { const x = yield 'i1'; yield 'got ' + x; return 'inner done'; }
            function* outer() { const r = yield* inner(); yield r; }
            const g = outer();
            const out = [g.next().value, g.next('X').value, g.next().value, g.next().done];
            out.join()
        "#
        ),
        s("i1,got X,inner done,true")
    );
}

#[test]
fn test_yield_star_over_array() {
    assert_eq!(eval("function* g() { yield* [1, 2]; yield 3; } [...g()].join()"), s("1,2,3"));
}

#[test]
fn test_yield_star_forwards_return() {
    assert_eq!(
        eval(
            r#"
            const log = [];
            function* inner() { try { yield 1; } finally { log.push('inner finally'); } }
            function* outer() { try { yield* inner(); } finally { log.push('outer finally'); } }
            const g = outer();
            g.next();
            g.return();
            log.join()
        "#
        ),
        s("inner finally,outer finally")
    );
}

#[test]
fn test_generator_methods_in_classes_and_objects() {
    assert_eq!(
        eval(
            r#"
            class Bag { constructor() { this.items = [1, 2]; } *[Symbol.iterator]() { yield* this.items; } }
            const o = { *pairs() { yield 'a'; } };
            [...new Bag()].join() + [...o.pairs()].join()
        "#
        ),
        s("1,2a")
    );
}

#[test]
fn test_generator_object_is_its_own_iterator() {
    assert_eq!(eval("function* g() {} const it = g(); it[Symbol.iterator]() === it"), JsValue::Boolean(true));
}

#[test]
fn test_generator_cannot_be_constructed() {
    assert!(throws_error("function* g() {} new g()", "TypeError"));
}

#[test]
fn test_reentrant_next_is_engine_error() {
    let result = eval_result(
        r#"
        let g;
        function* gen() { g.next(); yield 1; }
        g = gen();
        g.next();
    "#,
    );
    assert!(matches!(result, Err(JsError::Engine(EngineError::ReentrantGenerator))));
}

#[test]
fn test_infinite_generator_with_take() {
    assert_eq!(
        eval(
            r#"
            function* naturals() { let i = 1; while (true) yield i++; }
            const out = [];
            for (const v of naturals()) { if (v > 5) break; out.push(v * v); }
            out.join()
        "#
        ),
        s("1,4,9,16,25")
    );
}
