//! Destructuring and iterator plumbing
//!
//! Array patterns and `for-of` drive guest iterators one `next()` call per
//! frame. A frame that holds an open iterator closes it (calls `return()`)
//! when a throw, return or abort unwinds through it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::ast::{ArrayPattern, Pattern};
use crate::completion::Unwind;
use crate::environment::resolve_binding;
use crate::error::JsError;
use crate::object::Property;
use crate::value::{CheapClone, JsString, JsValue, PropertyKey, describe};

use super::eval_expr::static_key;
use super::eval_stmt::named_or_plain;
use super::frame::{
    ArrayPatternState, BindTarget, Context, Flow, IteratorRecord, ObjectPatternState, Op, Step,
};
use super::{Interpreter, rethrow, settle_step};

impl Interpreter {
    /// Bind `pattern` to `value`. Simple names complete here; nested
    /// patterns push frames.
    pub(crate) fn bind_pattern(&mut self, ctx: &Rc<Context>, pattern: &Pattern, value: JsValue, target: BindTarget) -> Step {
        match pattern {
            Pattern::Identifier(id) => self.bind_name(ctx, &id.name, value, &target),
            Pattern::Expression(expr) => {
                self.co.push(ctx, Op::Pop);
                self.co.push(ctx, Op::PutRef);
                self.co.push(ctx, Op::Push(value));
                self.push_reference(ctx, expr)?;
                Ok(Flow::Continue)
            }
            Pattern::Assignment(assign) => {
                if !value.is_undefined() {
                    return self.bind_pattern(ctx, &assign.target, value, target);
                }
                let default_op = match &assign.target {
                    Pattern::Identifier(id) => named_or_plain(&assign.default, &id.name),
                    _ => Op::Expr(assign.default.clone()),
                };
                self.co.push(
                    ctx,
                    Op::BindPattern {
                        pattern: assign.target.clone(),
                        target,
                    },
                );
                self.co.push(ctx, default_op);
                Ok(Flow::Continue)
            }
            Pattern::Object(pat) => {
                if value.is_null_or_undefined() {
                    return Err(JsError::type_error(format!("Cannot destructure '{0}' as it is {0}.", describe(&value))).into());
                }
                let state = Rc::new(ObjectPatternState {
                    pattern: pat.clone(),
                    target,
                    source: value,
                    excluded: RefCell::new(Vec::new()),
                });
                self.co.push(ctx, Op::ObjectPatternStep { state, index: 0 });
                Ok(Flow::Continue)
            }
            Pattern::Array(pat) => {
                self.co.push(
                    ctx,
                    Op::ArrayPatternBegin {
                        pattern: pat.clone(),
                        target,
                    },
                );
                self.co.push(ctx, Op::GetIterator);
                self.co.push(ctx, Op::Push(value));
                Ok(Flow::Continue)
            }
        }
    }

    fn bind_name(&mut self, ctx: &Rc<Context>, name: &JsString, value: JsValue, target: &BindTarget) -> Step {
        match target {
            BindTarget::Initialize(env) => {
                env.initialize_binding(name, value)?;
                Ok(Flow::Continue)
            }
            BindTarget::Assign => {
                let reference = resolve_binding(&ctx.lexical_env, name, ctx.strict);
                self.put_reference(ctx, reference, value, false)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Object patterns
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn object_pattern_step(&mut self, ctx: &Rc<Context>, state: Rc<ObjectPatternState>, index: usize) -> Step {
        let Some(prop) = state.pattern.properties.get(index) else {
            return self.object_pattern_rest(ctx, &state);
        };
        match static_key(&prop.key) {
            Some(key) => {
                let value_pattern = prop.value.clone();
                self.read_pattern_property(ctx, state, index, key, value_pattern)
            }
            None => {
                let crate::ast::PropertyName::Computed(key_expr) = &prop.key else {
                    return Err(JsError::internal_error("computed key without expression").into());
                };
                let key_expr = key_expr.clone();
                self.co.push(ctx, Op::ObjectPatternKey { state, index });
                self.co.push(ctx, Op::ToPropertyKey);
                self.co.push(ctx, Op::Expr(key_expr));
                Ok(Flow::Continue)
            }
        }
    }

    pub(crate) fn object_pattern_key(&mut self, ctx: &Rc<Context>, state: Rc<ObjectPatternState>, index: usize) -> Step {
        let key = self.pop_value()?;
        let key = self.to_property_key(&key)?;
        let Some(value_pattern) = state.pattern.properties.get(index).map(|p| p.value.clone()) else {
            return Err(JsError::internal_error("object pattern index out of range").into());
        };
        self.read_pattern_property(ctx, state, index, key, value_pattern)
    }

    /// Read `source[key]` and bind it, then continue with the next property
    fn read_pattern_property(
        &mut self,
        ctx: &Rc<Context>,
        state: Rc<ObjectPatternState>,
        index: usize,
        key: PropertyKey,
        pattern: Pattern,
    ) -> Step {
        state.excluded.borrow_mut().push(key.clone());
        let source = state.source.clone();
        let target = state.target.clone();
        self.co.push(ctx, Op::ObjectPatternStep { state, index: index + 1 });
        self.co.push(ctx, Op::BindPattern { pattern, target });
        let access = self.property_access(&source, &key)?;
        self.push_access(ctx, access, source)
    }

    /// `...rest`: own enumerable properties not named earlier in the pattern
    fn object_pattern_rest(&mut self, ctx: &Rc<Context>, state: &ObjectPatternState) -> Step {
        let Some(rest) = &state.pattern.rest else {
            return Ok(Flow::Continue);
        };
        let from = self.to_object(&state.source)?;
        let keys: Vec<PropertyKey> = {
            let o = from.borrow();
            let excluded = state.excluded.borrow();
            o.own_keys()
                .into_iter()
                .filter(|k| !excluded.contains(k))
                .filter(|k| o.get_own_property(k).is_some_and(|p| p.enumerable))
                .collect()
        };
        let copy = self.create_object();
        for key in keys {
            let value = self.get_value(&JsValue::Object(from.cheap_clone()), &key)?;
            copy.borrow_mut().define_property(key, Property::data(value));
        }
        self.co.push(
            ctx,
            Op::BindPattern {
                pattern: rest.clone(),
                target: state.target.clone(),
            },
        );
        self.co.push(ctx, Op::Push(JsValue::Object(copy)));
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Array patterns
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn array_pattern_begin(&mut self, ctx: &Rc<Context>, pattern: Rc<ArrayPattern>, target: BindTarget) -> Step {
        let iterator = self.pop_value()?;
        let iter = Rc::new(self.iterator_record(iterator)?);
        let state = Rc::new(ArrayPatternState { pattern, target, iter });
        self.co.push(ctx, Op::ArrayPatternStep { state, index: 0 });
        Ok(Flow::Continue)
    }

    pub(crate) fn array_pattern_step(&mut self, ctx: &Rc<Context>, state: Rc<ArrayPatternState>, index: usize) -> Step {
        let Some(element) = state.pattern.elements.get(index).cloned() else {
            return self.array_pattern_finish(ctx, state);
        };
        if state.iter.done.get() {
            self.co.push(ctx, Op::ArrayPatternStep { state: state.clone(), index: index + 1 });
            if let Some(pattern) = element {
                self.co.push(
                    ctx,
                    Op::BindPattern {
                        pattern,
                        target: state.target.clone(),
                    },
                );
                self.co.push(ctx, Op::Push(JsValue::Undefined));
            }
            return Ok(Flow::Continue);
        }
        state.iter.done.set(true);
        let (next, iterator) = (state.iter.next.clone(), state.iter.iterator.clone());
        self.co.push(ctx, Op::ArrayPatternValue { state, index });
        self.invoke(ctx, next, iterator, Vec::new())
    }

    pub(crate) fn array_pattern_value(&mut self, ctx: &Rc<Context>, state: Rc<ArrayPatternState>, index: usize) -> Step {
        let value = match self.step_result()? {
            Some(value) => {
                state.iter.done.set(false);
                value
            }
            None => JsValue::Undefined,
        };
        let element = state.pattern.elements.get(index).cloned().flatten();
        let target = state.target.clone();
        self.co.push(ctx, Op::ArrayPatternStep { state, index: index + 1 });
        if let Some(pattern) = element {
            self.co.push(ctx, Op::BindPattern { pattern, target });
            self.co.push(ctx, Op::Push(value));
        }
        Ok(Flow::Continue)
    }

    /// Elements done: collect the rest or close the iterator
    fn array_pattern_finish(&mut self, ctx: &Rc<Context>, state: Rc<ArrayPatternState>) -> Step {
        if state.pattern.rest.is_some() {
            let base = self.co.values.len();
            if state.iter.done.get() {
                return self.bind_array_rest(ctx, &state, base);
            }
            self.co.push(ctx, Op::ArrayPatternRest { state, base });
            return Ok(Flow::Continue);
        }
        if state.iter.done.get() {
            return Ok(Flow::Continue);
        }
        state.iter.done.set(true);
        let method = self.get_named(&state.iter.iterator, "return")?;
        if method.is_null_or_undefined() {
            return Ok(Flow::Continue);
        }
        self.co.push(ctx, Op::IterCloseResult);
        self.invoke(ctx, method, state.iter.iterator.clone(), Vec::new())
    }

    pub(crate) fn array_pattern_rest(&mut self, ctx: &Rc<Context>, state: Rc<ArrayPatternState>, base: usize) -> Step {
        state.iter.done.set(true);
        let (next, iterator) = (state.iter.next.clone(), state.iter.iterator.clone());
        self.co.push(ctx, Op::ArrayPatternRestValue { state, base });
        self.invoke(ctx, next, iterator, Vec::new())
    }

    pub(crate) fn array_pattern_rest_value(&mut self, ctx: &Rc<Context>, state: Rc<ArrayPatternState>, base: usize) -> Step {
        match self.step_result()? {
            Some(value) => {
                state.iter.done.set(false);
                self.co.values.push(value);
                self.co.push(ctx, Op::ArrayPatternRest { state, base });
                Ok(Flow::Continue)
            }
            None => self.bind_array_rest(ctx, &state, base),
        }
    }

    fn bind_array_rest(&mut self, ctx: &Rc<Context>, state: &ArrayPatternState, base: usize) -> Step {
        let elements = self.co.values.split_off(base.min(self.co.values.len()));
        let array = self.create_array(elements);
        if let Some(rest) = &state.pattern.rest {
            self.co.push(
                ctx,
                Op::BindPattern {
                    pattern: rest.clone(),
                    target: state.target.clone(),
                },
            );
            self.co.push(ctx, Op::Push(JsValue::Object(array)));
        }
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Iterators
    // ═══════════════════════════════════════════════════════════════════════

    /// Pops an iterable and calls its `Symbol.iterator` method
    pub(crate) fn get_iterator(&mut self, ctx: &Rc<Context>) -> Step {
        let iterable = self.pop_value()?;
        if iterable.is_null_or_undefined() {
            return Err(JsError::type_error(format!("{} is not iterable", describe(&iterable))).into());
        }
        let key = PropertyKey::Symbol(self.realm.symbol_iterator.clone());
        let method = self.get_value(&iterable, &key)?;
        if !method.is_callable() {
            return Err(JsError::type_error(format!("{} is not iterable", describe(&iterable))).into());
        }
        self.invoke(ctx, method, iterable, Vec::new())
    }

    pub(crate) fn iterator_record(&mut self, iterator: JsValue) -> Result<IteratorRecord, JsError> {
        if !iterator.is_object() {
            return Err(JsError::type_error("Result of the Symbol.iterator method is not an object"));
        }
        let next = self.get_named(&iterator, "next")?;
        Ok(IteratorRecord {
            iterator,
            next,
            done: Cell::new(false),
        })
    }

    /// Pops a `next()` result: `None` once the iterator is done
    pub(crate) fn step_result(&mut self) -> Result<Option<JsValue>, JsError> {
        let result = self.pop_value()?;
        if !result.is_object() {
            return Err(JsError::type_error(format!("Iterator result {} is not an object", describe(&result))));
        }
        if self.get_named(&result, "done")?.to_boolean() {
            return Ok(None);
        }
        Ok(Some(self.get_named(&result, "value")?))
    }

    /// A signal is leaving a frame that holds an open iterator: call
    /// `return()` first. An error from closing replaces a return or break
    /// but never a throw already in flight.
    pub(crate) fn close_iterator_on_unwind(
        &mut self,
        ctx: &Rc<Context>,
        iter: &IteratorRecord,
        signal: Unwind,
    ) -> Result<Option<Unwind>, JsError> {
        if iter.done.get() {
            return Ok(Some(signal));
        }
        iter.done.set(true);
        let method = match self.get_named(&iter.iterator, "return") {
            Ok(m) => m,
            Err(err) if err.is_engine() => return Err(err),
            Err(err) => {
                if matches!(signal, Unwind::Error(_) | Unwind::Abort) {
                    return Ok(Some(signal));
                }
                return rethrow(err);
            }
        };
        if method.is_null_or_undefined() {
            return Ok(Some(signal));
        }
        self.co.push(ctx, Op::ResumeUnwind(signal));
        settle_step(self.invoke(ctx, method, iter.iterator.clone(), Vec::new()))
    }
}
