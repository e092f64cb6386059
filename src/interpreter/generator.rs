//! Generator objects
//!
//! A generator owns a parked [`Coroutine`]. Resuming it swaps that coroutine
//! in as the running activation; a `yield` swaps it back out and hands an
//! iterator result to whoever resumed it.

use std::rc::Rc;

use tracing::trace;

use crate::completion::{Resumption, Unwind};
use crate::environment::EnvRef;
use crate::error::{EngineError, JsError};
use crate::object::{JsObject, ObjectKind, ObjectRef};
use crate::value::{CheapClone, JsValue, describe};

use super::call::{Closure, ResumeKind, check_label_escape};
use super::frame::{ActivationKind, Context, Coroutine, Flow, IteratorRecord, Op, Step};
use super::{Interpreter, rethrow, settle_step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    SuspendedStart,
    SuspendedYield,
    Executing,
    Completed,
}

pub struct GeneratorData {
    pub state: GeneratorState,
    /// Parked body; `None` while executing and once completed
    pub coroutine: Option<Coroutine>,
}

/// Run `f` on the generator state behind `obj`
fn with_generator<R>(obj: &ObjectRef, f: impl FnOnce(&mut GeneratorData) -> R) -> Option<R> {
    match &mut obj.borrow_mut().kind {
        ObjectKind::Generator(data) => Some(f(data)),
        _ => None,
    }
}

impl Interpreter {
    /// Parameters are bound: wrap the body in a generator object and return
    /// it from the call
    pub(crate) fn make_generator(&mut self, ctx: &Rc<Context>, closure: Rc<Closure>, env: EnvRef, func: &ObjectRef) -> Step {
        let proto = match self.get_named(&JsValue::Object(func.cheap_clone()), "prototype")? {
            JsValue::Object(p) => p,
            _ => self.realm.generator_prototype.cheap_clone(),
        };
        let mut co = Coroutine {
            depth: 1,
            ..Coroutine::default()
        };
        co.push(ctx, Op::GeneratorShell);
        co.push(ctx, Op::FunctionBody { closure, env });

        let generator = ObjectRef::new(JsObject::new(
            Some(proto),
            ObjectKind::Generator(Box::new(GeneratorData {
                state: GeneratorState::SuspendedStart,
                coroutine: Some(co),
            })),
        ));
        Err(Unwind::Return(JsValue::Object(generator)))
    }

    /// `next`/`return`/`throw` on a generator object
    pub(crate) fn generator_resume(&mut self, this: JsValue, kind: ResumeKind, value: JsValue) -> Step {
        let resumption = match kind {
            ResumeKind::Next => Resumption::Next(value),
            ResumeKind::Return => Resumption::Return(value),
            ResumeKind::Throw => Resumption::Throw(value),
        };
        let generator = this.as_object().cloned();
        let state = generator
            .as_ref()
            .and_then(|g| with_generator(g, |data| data.state));
        let (Some(generator), Some(state)) = (generator, state) else {
            return Err(JsError::type_error(format!(
                "next method called on incompatible receiver {}",
                describe(&this)
            ))
            .into());
        };

        match (state, resumption) {
            (GeneratorState::Executing, _) => Err(JsError::Engine(EngineError::ReentrantGenerator).into()),
            (GeneratorState::Completed, Resumption::Next(_)) => {
                let result = self.iter_result(JsValue::Undefined, true);
                self.co.values.push(result);
                Ok(Flow::Continue)
            }
            (GeneratorState::Completed, Resumption::Return(v)) => {
                let result = self.iter_result(v, true);
                self.co.values.push(result);
                Ok(Flow::Continue)
            }
            (GeneratorState::Completed, Resumption::Throw(v)) => Err(Unwind::throw(v)),
            (GeneratorState::SuspendedStart, Resumption::Return(v)) => {
                complete_generator(&generator);
                let result = self.iter_result(v, true);
                self.co.values.push(result);
                Ok(Flow::Continue)
            }
            (GeneratorState::SuspendedStart, Resumption::Throw(v)) => {
                complete_generator(&generator);
                Err(Unwind::throw(v))
            }
            (state, resumption) => {
                if self.call_depth() >= self.max_call_depth {
                    return Err(JsError::range_error("Maximum call stack size exceeded").into());
                }
                let co = with_generator(&generator, |data| {
                    data.state = GeneratorState::Executing;
                    data.coroutine.take()
                })
                .flatten()
                .ok_or_else(|| JsError::internal_error("suspended generator without a coroutine"))?;
                trace!(?state, "generator resumed");
                self.enter_activation(ActivationKind::Generator(generator), co);
                match resumption {
                    Resumption::Next(v) => {
                        if state == GeneratorState::SuspendedYield {
                            self.co.values.push(v);
                        }
                        Ok(Flow::Continue)
                    }
                    Resumption::Throw(v) => Err(Unwind::throw(v)),
                    Resumption::Return(v) => Err(Unwind::Return(v)),
                }
            }
        }
    }

    /// A `Yield` reached the driver: park the generator and hand the value
    /// to the resumer
    pub(crate) fn suspend_yield(&mut self, value: JsValue) -> Result<(), JsError> {
        let ActivationKind::Generator(generator) = self.activation.clone() else {
            return Err(JsError::internal_error("yield outside a generator activation"));
        };
        if let Some(observer) = self.yield_observer.as_mut() {
            observer(&value);
        }
        let co = self.finish_activation()?;
        with_generator(&generator, |data| {
            data.state = GeneratorState::SuspendedYield;
            data.coroutine = Some(co);
        });
        let result = self.iter_result(value, false);
        self.co.values.push(result);
        Ok(())
    }

    /// The body ran off its end
    pub(crate) fn generator_shell_done(&mut self) -> Step {
        check_label_escape(std::mem::take(&mut self.co.completion))?;
        self.leave_generator()?;
        let result = self.iter_result(JsValue::Undefined, true);
        self.co.values.push(result);
        Ok(Flow::Continue)
    }

    pub(crate) fn generator_shell_unwind(&mut self, signal: Unwind) -> Result<Option<Unwind>, JsError> {
        self.leave_generator()?;
        match signal {
            Unwind::Return(v) => {
                let result = self.iter_result(v, true);
                self.co.values.push(result);
                Ok(None)
            }
            other => Ok(Some(other)),
        }
    }

    fn leave_generator(&mut self) -> Result<(), JsError> {
        let ActivationKind::Generator(generator) = self.activation.clone() else {
            return Err(JsError::internal_error("generator shell outside a generator activation"));
        };
        complete_generator(&generator);
        self.finish_activation()?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // yield*
    // ═══════════════════════════════════════════════════════════════════════

    /// Iterator on the stack: start forwarding to it
    pub(crate) fn yield_star_begin(&mut self, ctx: &Rc<Context>) -> Step {
        let iterator = self.pop_value()?;
        let rec = Rc::new(self.iterator_record(iterator)?);
        self.co.push(ctx, Op::YieldDelegateResult(rec.clone()));
        self.invoke(ctx, rec.next.clone(), rec.iterator.clone(), vec![JsValue::Undefined])
    }

    /// Resumed with `next(value)`: pass it on
    pub(crate) fn yield_delegate(&mut self, ctx: &Rc<Context>, rec: Rc<IteratorRecord>) -> Step {
        let value = self.pop_value()?;
        self.co.push(ctx, Op::YieldDelegateResult(rec.clone()));
        self.invoke(ctx, rec.next.clone(), rec.iterator.clone(), vec![value])
    }

    /// Inner result on the stack: finish with its value or yield it
    pub(crate) fn yield_delegate_result(&mut self, ctx: &Rc<Context>, rec: Rc<IteratorRecord>) -> Step {
        let (done, value) = self.inner_result()?;
        if done {
            self.co.values.push(value);
            return Ok(Flow::Continue);
        }
        self.co.push(ctx, Op::YieldDelegate(rec));
        Ok(Flow::Suspend(crate::completion::SuspensionCommand::Yield(value)))
    }

    /// Result of forwarding `return(value)`: a done result returns from the
    /// outer generator too
    pub(crate) fn yield_delegate_return(&mut self, ctx: &Rc<Context>, rec: Rc<IteratorRecord>) -> Step {
        let (done, value) = self.inner_result()?;
        if done {
            return Err(Unwind::Return(value));
        }
        self.co.push(ctx, Op::YieldDelegate(rec));
        Ok(Flow::Suspend(crate::completion::SuspensionCommand::Yield(value)))
    }

    /// Resumed with `throw` or `return` while delegating
    pub(crate) fn yield_delegate_unwind(
        &mut self,
        ctx: &Rc<Context>,
        rec: &Rc<IteratorRecord>,
        signal: Unwind,
    ) -> Result<Option<Unwind>, JsError> {
        match signal {
            Unwind::Error(err) => {
                let value = self.error_value(err)?;
                let method = match self.get_named(&rec.iterator, "throw") {
                    Ok(m) => m,
                    Err(err) => return rethrow(err),
                };
                if method.is_null_or_undefined() {
                    let missing = Unwind::Error(JsError::type_error("The iterator does not provide a 'throw' method"));
                    return self.close_iterator_on_unwind(ctx, rec, missing);
                }
                self.co.push(ctx, Op::YieldDelegateResult(rec.clone()));
                settle_step(self.invoke(ctx, method, rec.iterator.clone(), vec![value]))
            }
            Unwind::Return(value) => {
                let method = match self.get_named(&rec.iterator, "return") {
                    Ok(m) => m,
                    Err(err) => return rethrow(err),
                };
                if method.is_null_or_undefined() {
                    return Ok(Some(Unwind::Return(value)));
                }
                self.co.push(ctx, Op::YieldDelegateReturn(rec.clone()));
                settle_step(self.invoke(ctx, method, rec.iterator.clone(), vec![value]))
            }
            Unwind::Abort => self.close_iterator_on_unwind(ctx, rec, Unwind::Abort),
        }
    }

    /// Pops an inner iterator result: `(done, value)`
    fn inner_result(&mut self) -> Result<(bool, JsValue), JsError> {
        let result = self.pop_value()?;
        if !result.is_object() {
            return Err(JsError::type_error(format!(
                "Iterator result {} is not an object",
                describe(&result)
            )));
        }
        let done = self.get_named(&result, "done")?.to_boolean();
        let value = self.get_named(&result, "value")?;
        Ok((done, value))
    }
}

fn complete_generator(generator: &ObjectRef) {
    with_generator(generator, |data| {
        data.state = GeneratorState::Completed;
        data.coroutine = None;
    });
}
