//! Array constructor, Array.prototype and the array/string iterator
//!
//! Reading methods accept any array-like `this` and read elements live, so a
//! callback that mutates the array is observed. Mutating methods operate on
//! real arrays only.

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::{arg, install_constructor};
use crate::interpreter::callback::{CallbackLoop, LoopStep, ready};
use crate::object::{JsObject, ListIterator, ListIteratorKind, ObjectKind, ObjectRef};
use crate::value::{CheapClone, JsString, JsValue, PropertyKey, describe};

pub fn init_array(interp: &mut Interpreter) {
    let proto = interp.realm.array_prototype.cheap_clone();
    // Array.prototype is itself an array
    proto.borrow_mut().kind = ObjectKind::Array(Vec::new());

    // Mutators
    interp.register_method(&proto, "push", array_push, 1);
    interp.register_method(&proto, "pop", array_pop, 0);
    interp.register_method(&proto, "shift", array_shift, 0);
    interp.register_method(&proto, "unshift", array_unshift, 1);
    interp.register_method(&proto, "splice", array_splice, 2);
    interp.register_method(&proto, "reverse", array_reverse, 0);
    interp.register_loop_method(&proto, "sort", array_sort, 1);
    interp.register_method(&proto, "fill", array_fill, 1);

    // Accessors
    interp.register_method(&proto, "slice", array_slice, 2);
    interp.register_method(&proto, "concat", array_concat, 1);
    interp.register_method(&proto, "join", array_join, 1);
    interp.register_method(&proto, "toString", array_to_string, 0);
    interp.register_method(&proto, "indexOf", array_index_of, 1);
    interp.register_method(&proto, "lastIndexOf", array_last_index_of, 1);
    interp.register_method(&proto, "includes", array_includes, 1);
    interp.register_method(&proto, "at", array_at, 1);
    interp.register_method(&proto, "flat", array_flat, 0);

    // Callback methods
    interp.register_loop_method(&proto, "forEach", array_for_each, 1);
    interp.register_loop_method(&proto, "map", array_map, 1);
    interp.register_loop_method(&proto, "filter", array_filter, 1);
    interp.register_loop_method(&proto, "find", array_find, 1);
    interp.register_loop_method(&proto, "findIndex", array_find_index, 1);
    interp.register_loop_method(&proto, "findLast", array_find_last, 1);
    interp.register_loop_method(&proto, "findLastIndex", array_find_last_index, 1);
    interp.register_loop_method(&proto, "some", array_some, 1);
    interp.register_loop_method(&proto, "every", array_every, 1);
    interp.register_loop_method(&proto, "reduce", array_reduce, 1);
    interp.register_loop_method(&proto, "reduceRight", array_reduce_right, 1);
    interp.register_loop_method(&proto, "flatMap", array_flat_map, 1);

    // Iteration
    interp.register_method(&proto, "keys", array_keys, 0);
    interp.register_method(&proto, "values", array_values, 0);
    interp.register_method(&proto, "entries", array_entries, 0);
    let values = proto
        .borrow()
        .get_own_data(&PropertyKey::from("values"))
        .unwrap_or_default();
    proto.define_hidden(PropertyKey::Symbol(interp.realm.symbol_iterator.clone()), values);

    let ctor = install_constructor(interp, "Array", array_called, Some(array_construct), 1, &proto);
    interp.register_method(&ctor, "isArray", array_is_array, 1);
    interp.register_method(&ctor, "of", array_of, 0);
    interp.register_loop_method(&ctor, "from", array_from, 1);

    let iter_proto = interp.realm.list_iterator_prototype.cheap_clone();
    interp.register_method(&iter_proto, "next", list_iterator_next, 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

/// `this` as an object plus its `length`
fn array_like(interp: &mut Interpreter, this: &JsValue) -> Result<(JsValue, usize), JsError> {
    let obj = JsValue::Object(interp.to_object(this)?);
    let array_len = obj.as_object().and_then(|o| match &o.borrow().kind {
        ObjectKind::Array(elements) => Some(elements.len()),
        _ => None,
    });
    if let Some(len) = array_len {
        return Ok((obj, len));
    }
    let len = interp.get_named(&obj, "length")?;
    let len = interp.to_integer(&len)?.clamp(0.0, f64::from(u32::MAX)) as usize;
    Ok((obj, len))
}

fn element(interp: &mut Interpreter, obj: &JsValue, index: usize) -> Result<JsValue, JsError> {
    interp.get_value(obj, &PropertyKey::Index(index as u32))
}

/// Run `f` on the element vector of a real, unfrozen array
fn with_elements<R>(
    this: &JsValue,
    method: &str,
    f: impl FnOnce(&mut Vec<JsValue>) -> R,
) -> Result<R, JsError> {
    let Some(obj) = this.as_object() else {
        return Err(JsError::type_error(format!(
            "Array.prototype.{} called on {}",
            method,
            describe(this)
        )));
    };
    let mut o = obj.borrow_mut();
    if o.frozen {
        return Err(JsError::type_error(format!(
            "Cannot modify frozen array with Array.prototype.{}",
            method
        )));
    }
    match &mut o.kind {
        ObjectKind::Array(elements) => Ok(f(elements)),
        _ => Err(JsError::type_error(format!(
            "Array.prototype.{} called on non-array {}",
            method,
            describe(this)
        ))),
    }
}

/// Resolve a relative index argument (`-1` is the last element) into `0..=len`
fn relative_index(interp: &mut Interpreter, value: &JsValue, len: usize, default: usize) -> Result<usize, JsError> {
    if value.is_undefined() {
        return Ok(default);
    }
    let rel = interp.to_integer(value)?;
    let len_f = len as f64;
    Ok(if rel < 0.0 {
        (len_f + rel).max(0.0) as usize
    } else {
        rel.min(len_f) as usize
    })
}

fn callback(args: &[JsValue], method: &str) -> Result<JsValue, JsError> {
    let f = arg(args, 0);
    if !f.is_callable() {
        return Err(JsError::type_error(format!(
            "{} is not a function (Array.prototype.{})",
            describe(&f),
            method
        )));
    }
    Ok(f)
}

// ═══════════════════════════════════════════════════════════════════════════
// Constructor
// ═══════════════════════════════════════════════════════════════════════════

fn array_elements_from_args(args: &[JsValue]) -> Result<Vec<JsValue>, JsError> {
    match args {
        [JsValue::Number(n)] => {
            if *n < 0.0 || n.fract() != 0.0 || *n > f64::from(u32::MAX) {
                return Err(JsError::range_error("Invalid array length"));
            }
            Ok(vec![JsValue::Undefined; *n as usize])
        }
        _ => Ok(args.to_vec()),
    }
}

fn array_called(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let elements = array_elements_from_args(args)?;
    Ok(JsValue::Object(interp.create_array(elements)))
}

fn array_construct(interp: &mut Interpreter, args: &[JsValue], new_target: &ObjectRef) -> Result<JsValue, JsError> {
    let elements = array_elements_from_args(args)?;
    let fallback = interp.realm.array_prototype.cheap_clone();
    let proto = interp.prototype_from_constructor(new_target, &fallback)?;
    Ok(JsValue::Object(ObjectRef::new(JsObject::new(
        Some(proto),
        ObjectKind::Array(elements),
    ))))
}

fn array_is_array(_interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Boolean(arg(args, 0).as_object().is_some_and(ObjectRef::is_array)))
}

fn array_of(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Object(interp.create_array(args.to_vec())))
}

fn array_from(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    let source = arg(args, 0);
    let map_fn = arg(args, 1);
    if !map_fn.is_undefined() && !map_fn.is_callable() {
        return Err(JsError::type_error(format!("{} is not a function", describe(&map_fn))));
    }
    if source.is_null_or_undefined() {
        return Err(JsError::type_error(format!("{} is not iterable", describe(&source))));
    }

    let iterator_key = PropertyKey::Symbol(interp.realm.symbol_iterator.clone());
    let items = if interp.get_value(&source, &iterator_key)?.is_undefined() {
        let obj = JsValue::Object(interp.to_object(&source)?);
        interp.list_from_array_like(&obj)?
    } else {
        interp.iterate_to_list(&source)?
    };

    if map_fn.is_undefined() {
        return Ok(ready(JsValue::Object(interp.create_array(items))));
    }
    Ok(Box::new(MapItems {
        map_fn,
        this_arg: arg(args, 2),
        items: items.into_iter().enumerate(),
        out: Vec::new(),
    }))
}

/// `Array.from` with a map function: `mapFn(item, index)` per collected item
struct MapItems {
    map_fn: JsValue,
    this_arg: JsValue,
    items: std::iter::Enumerate<std::vec::IntoIter<JsValue>>,
    out: Vec<JsValue>,
}

impl CallbackLoop for MapItems {
    fn resume(&mut self, interp: &mut Interpreter, result: Option<JsValue>) -> Result<LoopStep, JsError> {
        self.out.extend(result);
        Ok(match self.items.next() {
            Some((i, item)) => LoopStep::Call {
                func: self.map_fn.clone(),
                this: self.this_arg.clone(),
                args: vec![item, JsValue::from(i)],
            },
            None => LoopStep::Done(JsValue::Object(interp.create_array(std::mem::take(&mut self.out)))),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Mutators
// ═══════════════════════════════════════════════════════════════════════════

fn array_push(_interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let len = with_elements(&this, "push", |elements| {
        elements.extend_from_slice(args);
        elements.len()
    })?;
    Ok(JsValue::from(len))
}

fn array_pop(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    with_elements(&this, "pop", |elements| elements.pop().unwrap_or_default())
}

fn array_shift(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    with_elements(&this, "shift", |elements| {
        if elements.is_empty() {
            JsValue::Undefined
        } else {
            elements.remove(0)
        }
    })
}

fn array_unshift(_interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let len = with_elements(&this, "unshift", |elements| {
        elements.splice(0..0, args.iter().cloned());
        elements.len()
    })?;
    Ok(JsValue::from(len))
}

fn array_splice(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let len = with_elements(&this, "splice", |elements| elements.len())?;
    let start = relative_index(interp, &arg(args, 0), len, 0)?;
    let delete_count = match args.len() {
        0 => 0,
        1 => len - start,
        _ => {
            let n = interp.to_integer(&arg(args, 1))?;
            (n.max(0.0) as usize).min(len - start)
        }
    };
    let inserted: Vec<JsValue> = args.iter().skip(2).cloned().collect();
    let removed = with_elements(&this, "splice", |elements| {
        let end = (start + delete_count).min(elements.len());
        let start = start.min(end);
        elements.splice(start..end, inserted).collect::<Vec<_>>()
    })?;
    Ok(JsValue::Object(interp.create_array(removed)))
}

fn array_reverse(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    with_elements(&this, "reverse", |elements| elements.reverse())?;
    Ok(this)
}

fn array_fill(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let len = with_elements(&this, "fill", |elements| elements.len())?;
    let start = relative_index(interp, &arg(args, 1), len, 0)?;
    let end = relative_index(interp, &arg(args, 2), len, len)?;
    let value = arg(args, 0);
    with_elements(&this, "fill", |elements| {
        for slot in elements.iter_mut().take(end).skip(start) {
            *slot = value.clone();
        }
    })?;
    Ok(this)
}

fn array_sort(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    let comparator = arg(args, 0);
    if !comparator.is_undefined() && !comparator.is_callable() {
        return Err(JsError::type_error(
            "The comparison function must be either a function or undefined",
        ));
    }
    let items = with_elements(&this, "sort", |elements| elements.clone())?;

    // undefined sorts last and never reaches the comparator
    let (defined, undefined): (Vec<JsValue>, Vec<JsValue>) = items.into_iter().partition(|v| !v.is_undefined());
    if comparator.is_undefined() {
        let mut keyed = Vec::with_capacity(defined.len());
        for value in defined {
            let key = interp.to_string(&value)?;
            keyed.push((key, value));
        }
        // Stable, so equal strings keep their order
        keyed.sort_by(|a, b| a.0.as_str().encode_utf16().cmp(b.0.as_str().encode_utf16()));
        let mut sorted: Vec<JsValue> = keyed.into_iter().map(|(_, v)| v).collect();
        sorted.extend(undefined);
        with_elements(&this, "sort", |elements| *elements = sorted)?;
        return Ok(ready(this));
    }

    let right = defined.len().min(1);
    Ok(Box::new(MergeSort {
        this,
        comparator,
        src: defined,
        dst: Vec::new(),
        undefined: undefined.len(),
        width: 1,
        lo: 0,
        left: 0,
        right,
    }))
}

/// Bottom-up stable merge sort driven by a guest comparator. Runs
/// `[lo, lo + width)` and `[lo + width, lo + 2 * width)` of `src` merge into
/// `dst`; `left` and `right` are the heads of the two runs. An inconsistent
/// comparator gives some order.
struct MergeSort {
    this: JsValue,
    comparator: JsValue,
    src: Vec<JsValue>,
    dst: Vec<JsValue>,
    undefined: usize,
    width: usize,
    lo: usize,
    left: usize,
    right: usize,
}

impl MergeSort {
    fn take(&mut self, from_right: bool) {
        let index = if from_right { &mut self.right } else { &mut self.left };
        self.dst.extend(self.src.get(*index).cloned());
        *index += 1;
    }
}

impl CallbackLoop for MergeSort {
    fn resume(&mut self, interp: &mut Interpreter, result: Option<JsValue>) -> Result<LoopStep, JsError> {
        if let Some(order) = result {
            // Positive: the left element sorts after the right one
            let order = interp.to_number(&order)?;
            self.take(order > 0.0);
        }
        let n = self.src.len();
        loop {
            if self.width >= n {
                let mut sorted = std::mem::take(&mut self.src);
                sorted.resize(sorted.len() + self.undefined, JsValue::Undefined);
                with_elements(&self.this, "sort", |elements| *elements = sorted)?;
                return Ok(LoopStep::Done(self.this.clone()));
            }
            let mid = (self.lo + self.width).min(n);
            let hi = (self.lo + 2 * self.width).min(n);
            if self.left < mid && self.right < hi {
                let (Some(a), Some(b)) = (self.src.get(self.left), self.src.get(self.right)) else {
                    return Err(JsError::internal_error("merge run out of bounds"));
                };
                return Ok(LoopStep::Call {
                    func: self.comparator.clone(),
                    this: JsValue::Undefined,
                    args: vec![a.clone(), b.clone()],
                });
            }
            self.dst.extend(self.src.get(self.left..mid).unwrap_or_default().iter().cloned());
            self.dst.extend(self.src.get(self.right..hi).unwrap_or_default().iter().cloned());
            self.lo = hi;
            if self.lo >= n {
                std::mem::swap(&mut self.src, &mut self.dst);
                self.dst.clear();
                self.width *= 2;
                self.lo = 0;
            }
            self.left = self.lo;
            self.right = (self.lo + self.width).min(n);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Accessors
// ═══════════════════════════════════════════════════════════════════════════

fn array_slice(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let (obj, len) = array_like(interp, &this)?;
    let start = relative_index(interp, &arg(args, 0), len, 0)?;
    let end = relative_index(interp, &arg(args, 1), len, len)?;
    let mut out = Vec::with_capacity(end.saturating_sub(start));
    for i in start..end {
        out.push(element(interp, &obj, i)?);
    }
    Ok(JsValue::Object(interp.create_array(out)))
}

fn array_concat(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let first = JsValue::Object(interp.to_object(&this)?);
    let mut out = Vec::new();
    for item in std::iter::once(&first).chain(args.iter()) {
        match item.as_object() {
            Some(obj) if obj.is_array() => out.extend(interp.list_from_array_like(item)?),
            _ => out.push(item.clone()),
        }
    }
    Ok(JsValue::Object(interp.create_array(out)))
}

fn array_join(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let separator = match arg(args, 0) {
        JsValue::Undefined => JsString::from(","),
        other => interp.to_string(&other)?,
    };
    let (obj, len) = array_like(interp, &this)?;
    let id = obj.as_object().map(ObjectRef::id).unwrap_or_default();
    if interp.join_stack.contains(&id) {
        return Ok(JsValue::from(""));
    }

    interp.join_stack.push(id);
    let joined = join_elements(interp, &obj, len, &separator);
    interp.join_stack.pop();
    Ok(JsValue::from(joined?))
}

fn join_elements(interp: &mut Interpreter, obj: &JsValue, len: usize, separator: &JsString) -> Result<String, JsError> {
    let mut out = String::new();
    for i in 0..len {
        if i > 0 {
            out.push_str(separator.as_str());
        }
        let value = element(interp, obj, i)?;
        if !value.is_null_or_undefined() {
            out.push_str(interp.to_string(&value)?.as_str());
        }
    }
    Ok(out)
}

fn array_to_string(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    array_join(interp, this, &[])
}

fn array_index_of(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let (obj, len) = array_like(interp, &this)?;
    let target = arg(args, 0);
    let start = relative_index(interp, &arg(args, 1), len, 0)?;
    for i in start..len {
        if element(interp, &obj, i)?.strict_equals(&target) {
            return Ok(JsValue::from(i));
        }
    }
    Ok(JsValue::Number(-1.0))
}

fn array_last_index_of(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let (obj, len) = array_like(interp, &this)?;
    if len == 0 {
        return Ok(JsValue::Number(-1.0));
    }
    let target = arg(args, 0);
    let from = match args.get(1) {
        None => len - 1,
        Some(value) => {
            let n = interp.to_integer(value)?;
            if n < 0.0 {
                let back = len as f64 + n;
                if back < 0.0 {
                    return Ok(JsValue::Number(-1.0));
                }
                back as usize
            } else {
                (n as usize).min(len - 1)
            }
        }
    };
    for i in (0..=from).rev() {
        if element(interp, &obj, i)?.strict_equals(&target) {
            return Ok(JsValue::from(i));
        }
    }
    Ok(JsValue::Number(-1.0))
}

fn array_includes(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let (obj, len) = array_like(interp, &this)?;
    let target = arg(args, 0);
    let start = relative_index(interp, &arg(args, 1), len, 0)?;
    for i in start..len {
        if element(interp, &obj, i)?.same_value_zero(&target) {
            return Ok(JsValue::Boolean(true));
        }
    }
    Ok(JsValue::Boolean(false))
}

fn array_at(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let (obj, len) = array_like(interp, &this)?;
    let rel = interp.to_integer(&arg(args, 0))?;
    let index = if rel < 0.0 { len as f64 + rel } else { rel };
    if index < 0.0 || index >= len as f64 {
        return Ok(JsValue::Undefined);
    }
    element(interp, &obj, index as usize)
}

fn flatten_into(interp: &mut Interpreter, out: &mut Vec<JsValue>, items: Vec<JsValue>, depth: f64) -> Result<(), JsError> {
    for item in items {
        if depth >= 1.0 && item.as_object().is_some_and(ObjectRef::is_array) {
            let inner = interp.list_from_array_like(&item)?;
            flatten_into(interp, out, inner, depth - 1.0)?;
        } else {
            out.push(item);
        }
    }
    Ok(())
}

fn array_flat(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let depth = match arg(args, 0) {
        JsValue::Undefined => 1.0,
        other => interp.to_integer(&other)?,
    };
    let obj = JsValue::Object(interp.to_object(&this)?);
    let items = interp.list_from_array_like(&obj)?;
    let mut out = Vec::new();
    flatten_into(interp, &mut out, items, depth)?;
    Ok(JsValue::Object(interp.create_array(out)))
}

// ═══════════════════════════════════════════════════════════════════════════
// Callback methods
// ═══════════════════════════════════════════════════════════════════════════

/// What a per-element loop does with each callback result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Each {
    ForEach,
    Map,
    Filter,
    Find,
    FindIndex,
    FindLast,
    FindLastIndex,
    Any,
    All,
    FlatMap,
}

impl Each {
    fn method(self) -> &'static str {
        match self {
            Each::ForEach => "forEach",
            Each::Map => "map",
            Each::Filter => "filter",
            Each::Find => "find",
            Each::FindIndex => "findIndex",
            Each::FindLast => "findLast",
            Each::FindLastIndex => "findLastIndex",
            Each::Any => "some",
            Each::All => "every",
            Each::FlatMap => "flatMap",
        }
    }

    fn reverse(self) -> bool {
        matches!(self, Each::FindLast | Each::FindLastIndex)
    }
}

/// Calls `f(element, index, array)` for each index, reading elements live
struct EachElement {
    each: Each,
    obj: JsValue,
    f: JsValue,
    this_arg: JsValue,
    len: usize,
    visited: usize,
    /// Element handed to the running callback
    current: Option<(usize, JsValue)>,
    out: Vec<JsValue>,
}

impl EachElement {
    /// Fold in one result; `Some` ends the loop early
    fn visit(&mut self, index: usize, value: JsValue, result: JsValue) -> Option<JsValue> {
        match self.each {
            Each::ForEach => None,
            Each::Map | Each::FlatMap => {
                self.out.push(result);
                None
            }
            Each::Filter => {
                if result.to_boolean() {
                    self.out.push(value);
                }
                None
            }
            Each::Find | Each::FindLast => result.to_boolean().then_some(value),
            Each::FindIndex | Each::FindLastIndex => result.to_boolean().then(|| JsValue::from(index)),
            Each::Any => result.to_boolean().then_some(JsValue::Boolean(true)),
            Each::All => (!result.to_boolean()).then_some(JsValue::Boolean(false)),
        }
    }

    /// Result after every element was visited
    fn finish(&mut self, interp: &mut Interpreter) -> Result<JsValue, JsError> {
        let out = std::mem::take(&mut self.out);
        Ok(match self.each {
            Each::ForEach | Each::Find | Each::FindLast => JsValue::Undefined,
            Each::Map | Each::Filter => JsValue::Object(interp.create_array(out)),
            Each::FlatMap => {
                let mut flat = Vec::new();
                flatten_into(interp, &mut flat, out, 1.0)?;
                JsValue::Object(interp.create_array(flat))
            }
            Each::FindIndex | Each::FindLastIndex => JsValue::Number(-1.0),
            Each::Any => JsValue::Boolean(false),
            Each::All => JsValue::Boolean(true),
        })
    }
}

impl CallbackLoop for EachElement {
    fn resume(&mut self, interp: &mut Interpreter, result: Option<JsValue>) -> Result<LoopStep, JsError> {
        if let Some(result) = result {
            let Some((index, value)) = self.current.take() else {
                return Err(JsError::internal_error("callback result without an element"));
            };
            if let Some(done) = self.visit(index, value, result) {
                return Ok(LoopStep::Done(done));
            }
        }
        if self.visited >= self.len {
            return Ok(LoopStep::Done(self.finish(interp)?));
        }
        let index = if self.each.reverse() {
            self.len - 1 - self.visited
        } else {
            self.visited
        };
        self.visited += 1;
        let value = element(interp, &self.obj, index)?;
        self.current = Some((index, value.clone()));
        Ok(LoopStep::Call {
            func: self.f.clone(),
            this: self.this_arg.clone(),
            args: vec![value, JsValue::from(index), self.obj.clone()],
        })
    }
}

fn each_element(interp: &mut Interpreter, this: &JsValue, args: &[JsValue], each: Each) -> Result<Box<dyn CallbackLoop>, JsError> {
    let (obj, len) = array_like(interp, this)?;
    let f = callback(args, each.method())?;
    Ok(Box::new(EachElement {
        each,
        obj,
        f,
        this_arg: arg(args, 1),
        len,
        visited: 0,
        current: None,
        out: Vec::new(),
    }))
}

fn array_for_each(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    each_element(interp, &this, args, Each::ForEach)
}

fn array_map(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    each_element(interp, &this, args, Each::Map)
}

fn array_filter(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    each_element(interp, &this, args, Each::Filter)
}

fn array_find(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    each_element(interp, &this, args, Each::Find)
}

fn array_find_index(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    each_element(interp, &this, args, Each::FindIndex)
}

fn array_find_last(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    each_element(interp, &this, args, Each::FindLast)
}

fn array_find_last_index(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    each_element(interp, &this, args, Each::FindLastIndex)
}

fn array_some(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    each_element(interp, &this, args, Each::Any)
}

fn array_every(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    each_element(interp, &this, args, Each::All)
}

fn array_flat_map(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    each_element(interp, &this, args, Each::FlatMap)
}

/// `reduce`/`reduceRight`: `acc = f(acc, element, index, array)`
struct Reduce {
    obj: JsValue,
    f: JsValue,
    indices: Box<dyn Iterator<Item = usize>>,
    acc: JsValue,
}

impl CallbackLoop for Reduce {
    fn resume(&mut self, interp: &mut Interpreter, result: Option<JsValue>) -> Result<LoopStep, JsError> {
        if let Some(acc) = result {
            self.acc = acc;
        }
        let Some(index) = self.indices.next() else {
            return Ok(LoopStep::Done(std::mem::take(&mut self.acc)));
        };
        let value = element(interp, &self.obj, index)?;
        Ok(LoopStep::Call {
            func: self.f.clone(),
            this: JsValue::Undefined,
            args: vec![self.acc.clone(), value, JsValue::from(index), self.obj.clone()],
        })
    }
}

fn reduce(interp: &mut Interpreter, this: JsValue, args: &[JsValue], method: &str, reverse: bool) -> Result<Box<dyn CallbackLoop>, JsError> {
    let (obj, len) = array_like(interp, &this)?;
    let f = callback(args, method)?;
    let mut indices: Box<dyn Iterator<Item = usize>> = if reverse {
        Box::new((0..len).rev())
    } else {
        Box::new(0..len)
    };
    let acc = match args.get(1) {
        Some(initial) => initial.clone(),
        None => match indices.next() {
            Some(i) => element(interp, &obj, i)?,
            None => return Err(JsError::type_error("Reduce of empty array with no initial value")),
        },
    };
    Ok(Box::new(Reduce { obj, f, indices, acc }))
}

fn array_reduce(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    reduce(interp, this, args, "reduce", false)
}

fn array_reduce_right(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<Box<dyn CallbackLoop>, JsError> {
    reduce(interp, this, args, "reduceRight", true)
}

// ═══════════════════════════════════════════════════════════════════════════
// Iterators
// ═══════════════════════════════════════════════════════════════════════════

/// Built-in iterator over `source` (an object or a string)
pub(crate) fn create_list_iterator(interp: &Interpreter, source: JsValue, kind: ListIteratorKind) -> ObjectRef {
    ObjectRef::new(JsObject::new(
        Some(interp.realm.list_iterator_prototype.cheap_clone()),
        ObjectKind::ListIterator(ListIterator {
            source,
            index: 0,
            kind,
            done: false,
        }),
    ))
}

fn array_iterator(interp: &mut Interpreter, this: &JsValue, kind: ListIteratorKind) -> Result<JsValue, JsError> {
    let source = JsValue::Object(interp.to_object(this)?);
    Ok(JsValue::Object(create_list_iterator(interp, source, kind)))
}

fn array_keys(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    array_iterator(interp, &this, ListIteratorKind::Keys)
}

fn array_values(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    array_iterator(interp, &this, ListIteratorKind::Values)
}

fn array_entries(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    array_iterator(interp, &this, ListIteratorKind::Entries)
}

fn list_iterator_next(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let state = this.as_object().and_then(|obj| match &obj.borrow().kind {
        ObjectKind::ListIterator(it) => Some((it.source.clone(), it.index, it.kind, it.done)),
        _ => None,
    });
    let Some((source, index, kind, done)) = state else {
        return Err(JsError::type_error(format!(
            "next method called on incompatible receiver {}",
            describe(&this)
        )));
    };
    if done {
        return Ok(interp.iter_result(JsValue::Undefined, true));
    }

    // Strings step by code point; everything else by index
    let (item, advance) = match &source {
        JsValue::String(s) => match s.code_unit_at(index) {
            None => (None, 0),
            Some(high @ 0xD800..=0xDBFF) => match s.code_unit_at(index + 1) {
                Some(low @ 0xDC00..=0xDFFF) => (Some(JsValue::from(String::from_utf16_lossy(&[high, low]))), 2),
                _ => (Some(JsValue::from(String::from_utf16_lossy(&[high]))), 1),
            },
            Some(unit) => (Some(JsValue::from(String::from_utf16_lossy(&[unit]))), 1),
        },
        _ => {
            let (obj, len) = array_like(interp, &source)?;
            if index < len {
                let item = match kind {
                    ListIteratorKind::Keys => JsValue::from(index),
                    ListIteratorKind::Values => element(interp, &obj, index)?,
                    ListIteratorKind::Entries => {
                        let value = element(interp, &obj, index)?;
                        JsValue::Object(interp.create_array(vec![JsValue::from(index), value]))
                    }
                };
                (Some(item), 1)
            } else {
                (None, 0)
            }
        }
    };

    if let Some(obj) = this.as_object()
        && let ObjectKind::ListIterator(it) = &mut obj.borrow_mut().kind
    {
        it.index = index + advance;
        it.done = item.is_none();
    }
    Ok(match item {
        Some(value) => interp.iter_result(value, false),
        None => interp.iter_result(JsValue::Undefined, true),
    })
}
