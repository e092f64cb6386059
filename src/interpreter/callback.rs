//! Natives that call back into guest code
//!
//! A [`CallbackLoop`] holds the state of a native algorithm between two
//! callbacks. The evaluator runs every callback as frames of the calling
//! coroutine and hands the result back through [`CallbackLoop::resume`], so
//! callbacks are ordinary steps: they count against the budget, can be paused
//! and aborted, and never grow the host stack.

use std::rc::Rc;

use crate::completion::Unwind;
use crate::error::JsError;
use crate::object::{Callable, NativeLoopConstructFn, NativeLoopFn, NativeLoopFunction, ObjectRef};
use crate::value::{JsString, JsValue};

use super::frame::{Context, Flow, Mark, Op, Step};
use super::{Interpreter, define_function_metadata, rethrow, settle_step};

/// What a loop wants next
pub enum LoopStep {
    /// Call `func` and resume with its result
    Call {
        func: JsValue,
        this: JsValue,
        args: Vec<JsValue>,
    },
    /// The native returns `value`
    Done(JsValue),
}

pub trait CallbackLoop {
    /// Advance with the result of the last callback; `None` on entry
    fn resume(&mut self, interp: &mut Interpreter, result: Option<JsValue>) -> Result<LoopStep, JsError>;

    /// A callback threw. The default lets the error propagate.
    fn catch(&mut self, _interp: &mut Interpreter, error: JsError) -> Result<LoopStep, JsError> {
        Err(error)
    }
}

/// Loop that finishes without calling anything
struct Ready(Option<JsValue>);

impl CallbackLoop for Ready {
    fn resume(&mut self, _interp: &mut Interpreter, _result: Option<JsValue>) -> Result<LoopStep, JsError> {
        Ok(LoopStep::Done(self.0.take().unwrap_or_default()))
    }
}

/// Loop for a native that needed no callback after all
pub fn ready(value: JsValue) -> Box<dyn CallbackLoop> {
    Box::new(Ready(Some(value)))
}

impl Interpreter {
    /// Function object for a native that calls back into guest code
    pub fn create_native_loop_function(
        &self,
        name: &str,
        start: NativeLoopFn,
        construct: Option<NativeLoopConstructFn>,
        arity: u32,
    ) -> ObjectRef {
        let func = self.create_function_object(Callable::NativeLoop(NativeLoopFunction {
            name: JsString::from(name),
            start,
            construct,
            arity,
        }));
        define_function_metadata(&func, JsString::from(name), arity as usize);
        func
    }

    pub fn register_loop_method(&self, obj: &ObjectRef, name: &str, start: NativeLoopFn, arity: u32) {
        let f = self.create_native_loop_function(name, start, None, arity);
        obj.define_hidden(name, JsValue::Object(f));
    }

    pub(crate) fn start_callback_loop(&mut self, ctx: &Rc<Context>, state: Box<dyn CallbackLoop>) -> Step {
        self.resume_loop(ctx, state, None)
    }

    pub(crate) fn resume_loop(&mut self, ctx: &Rc<Context>, mut state: Box<dyn CallbackLoop>, result: Option<JsValue>) -> Step {
        let next = state.resume(self, result)?;
        self.apply_loop_step(ctx, state, next)
    }

    fn apply_loop_step(&mut self, ctx: &Rc<Context>, state: Box<dyn CallbackLoop>, next: LoopStep) -> Step {
        match next {
            LoopStep::Done(value) => {
                self.co.values.push(value);
                Ok(Flow::Continue)
            }
            LoopStep::Call { func, this, args } => {
                let mark = self.co.mark();
                self.co.push(ctx, Op::CallbackLoop { state, mark });
                self.invoke(ctx, func, this, args)
            }
        }
    }

    /// A callback unwound through its loop: throws go to `catch`
    pub(crate) fn callback_loop_unwind(
        &mut self,
        ctx: &Rc<Context>,
        mut state: Box<dyn CallbackLoop>,
        mark: Mark,
        signal: Unwind,
    ) -> Result<Option<Unwind>, JsError> {
        let Unwind::Error(err) = signal else {
            return Ok(Some(signal));
        };
        match state.catch(self, err) {
            Ok(next) => {
                self.co.truncate(mark);
                settle_step(self.apply_loop_step(ctx, state, next))
            }
            Err(err) => rethrow(err),
        }
    }
}
