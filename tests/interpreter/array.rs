//! Array built-in

use super::{eval, n, s, throws_error};
use jsweave::JsValue;

#[test]
fn test_length_tracks_writes() {
    assert_eq!(eval("const a = [1, 2]; a[4] = 5; a.length"), n(5.0));
    assert_eq!(eval("const a = [1, 2, 3]; a.length = 1; a.join()"), s("1"));
    assert_eq!(eval("const a = [1, , 3]; a.length"), n(3.0));
}

#[test]
fn test_push_pop_shift_unshift() {
    assert_eq!(
        eval(
            r#"
            const a = [2];
            const len = a.push(3, 4);
            a.unshift(0, 1);
            const last = a.pop();
            const first = a.shift();
            [len, last, first, a.join()].join('|')
        "#
        ),
        s("3|4|0|1,2,3")
    );
}

#[test]
fn test_splice() {
    assert_eq!(
        eval("const a = [1, 2, 3, 4, 5]; const removed = a.splice(1, 2, 'x', 'y', 'z'); removed.join() + '|' + a.join()"),
        s("2,3|1,x,y,z,4,5")
    );
    assert_eq!(eval("const a = [1, 2, 3]; a.splice(-1); a.join()"), s("1,2"));
}

#[test]
fn test_slice_and_concat() {
    assert_eq!(eval("[1, 2, 3, 4].slice(1, -1).join()"), s("2,3"));
    assert_eq!(eval("[1].concat([2, 3], 4, [[5]]).length"), n(5.0));
}

#[test]
fn test_join_handles_null_and_cycles() {
    assert_eq!(eval("[1, null, undefined, 'x'].join('-')"), s("1---x"));
    assert_eq!(eval("const a = [1]; a.push(a); a.join()"), s("1,"));
}

#[test]
fn test_search_methods() {
    assert_eq!(eval("[1, 2, 3, 2].indexOf(2)"), n(1.0));
    assert_eq!(eval("[1, 2, 3, 2].lastIndexOf(2)"), n(3.0));
    assert_eq!(eval("[NaN].indexOf(NaN)"), n(-1.0));
    assert_eq!(eval("[NaN].includes(NaN)"), JsValue::Boolean(true));
    assert_eq!(eval("[1, 2, 3].at(-1)"), n(3.0));
}

#[test]
fn test_callback_methods() {
    assert_eq!(eval("[1, 2, 3].map((x, i) => x * i).join()"), s("0,2,6"));
    assert_eq!(eval("[1, 2, 3, 4].filter(x => x % 2 === 0).join()"), s("2,4"));
    assert_eq!(eval("[5, 12, 8, 130].find(x => x > 10)"), n(12.0));
    assert_eq!(eval("[5, 12, 8, 130].findIndex(x => x > 100)"), n(3.0));
    assert_eq!(eval("[5, 12, 8, 130].findLast(x => x < 10)"), n(8.0));
    assert_eq!(eval("[1, 2].some(x => x > 1) + ',' + [1, 2].every(x => x > 1)"), s("true,false"));
    assert_eq!(eval("let t = 0; [1, 2, 3].forEach(x => { t += x; }); t"), n(6.0));
}

#[test]
fn test_reduce() {
    assert_eq!(eval("[1, 2, 3, 4].reduce((a, b) => a + b)"), n(10.0));
    assert_eq!(eval("[1, 2, 3].reduce((a, b) => a + b, 10)"), n(16.0));
    assert_eq!(eval("['a', 'b', 'c'].reduceRight((a, b) => a + b)"), s("cba"));
    assert!(throws_error("[].reduce((a, b) => a + b)", "TypeError"));
}

#[test]
fn test_callback_this_arg() {
    assert_eq!(eval("[1, 2].map(function (x) { return x * this.k; }, { k: 10 }).join()"), s("10,20"));
}

#[test]
fn test_callback_exceptions_propagate() {
    assert!(throws_error("[1].map(() => { throw new Error('in map'); })", "in map"));
}

#[test]
fn test_default_sort_is_string_order() {
    assert_eq!(eval("[10, 9, 1, 100].sort().join()"), s("1,10,100,9"));
    assert_eq!(eval("[3, undefined, 1].sort().join()"), s("1,3,"));
}

#[test]
fn test_sort_with_comparator_is_stable() {
    assert_eq!(
        eval(
            r#"
            const people = [{ n: 'a', age: 30 }, { n: 'b', age: 25 }, { n: 'c', age: 30 }, { n: 'd', age: 25 }];
            people.sort((x, y) => x.age - y.age).map(p => p.n).join('')
        "#
        ),
        s("bdac")
    );
}

#[test]
fn test_reverse_and_fill() {
    assert_eq!(eval("[1, 2, 3].reverse().join()"), s("3,2,1"));
    assert_eq!(eval("new Array(3).fill(0).join()"), s("0,0,0"));
    assert_eq!(eval("[1, 2, 3, 4].fill(9, 1, 3).join()"), s("1,9,9,4"));
}

#[test]
fn test_flat_and_flat_map() {
    assert_eq!(eval("[1, [2, [3, [4]]]].flat().length"), n(4.0));
    assert_eq!(eval("[1, [2, [3, [4]]]].flat(Infinity).join()"), s("1,2,3,4"));
    assert_eq!(eval("['a b', 'c'].flatMap(x => x.split(' ')).join()"), s("a,b,c"));
}

#[test]
fn test_iteration_methods() {
    assert_eq!(eval("[...['a', 'b'].keys()].join()"), s("0,1"));
    assert_eq!(eval("[...['a', 'b'].entries()].map(e => e.join(':')).join()"), s("0:a,1:b"));
    assert_eq!(eval("[][Symbol.iterator] === [].values"), JsValue::Boolean(true));
}

#[test]
fn test_array_constructor() {
    assert_eq!(eval("new Array(2).length"), n(2.0));
    assert_eq!(eval("Array(1, 2, 3).join()"), s("1,2,3"));
    assert_eq!(eval("Array.of(7).length"), n(1.0));
    assert!(throws_error("new Array(-1)", "RangeError"));
}

#[test]
fn test_array_from() {
    assert_eq!(eval("Array.from('abc').join()"), s("a,b,c"));
    assert_eq!(eval("Array.from({ length: 3 }, (_, i) => i * 2).join()"), s("0,2,4"));
    assert_eq!(eval("function* g() { yield 1; yield 2; } Array.from(g()).length"), n(2.0));
}

#[test]
fn test_is_array() {
    assert_eq!(eval("Array.isArray([]) + ',' + Array.isArray({ length: 0 })"), s("true,false"));
}

#[test]
fn test_frozen_array_rejects_push() {
    assert!(throws_error("const a = Object.freeze([1]); a.push(2);", "TypeError"));
}

#[test]
fn test_array_to_string() {
    assert_eq!(eval("String([1, [2, 3]])"), s("1,2,3"));
    assert_eq!(eval("[] + []"), s(""));
}
