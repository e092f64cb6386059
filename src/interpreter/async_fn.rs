//! Await-based invocations
//!
//! An async function call (and every script or module evaluation) runs as
//! an [`AsyncInvocation`] with a coroutine of its own. At an `await` the
//! coroutine is parked in the invocation and a promise reaction is
//! registered; the reaction's job later swaps the coroutine back in.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{trace, warn};

use crate::completion::{Resumption, Unwind};
use crate::error::{EngineError, JsError};
use crate::object::ObjectRef;
use crate::value::{CheapClone, JsValue};

use super::Interpreter;
use super::builtins::promise::Handler;
use super::call::check_label_escape;
use super::frame::{ActivationKind, Coroutine, Flow, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Created, body not entered yet
    Pending,
    /// Running its synchronous prefix
    Started,
    /// Resumed by a job
    Running,
    Awaiting,
    /// Settled its promise; terminal
    Halted,
}

pub struct AsyncInvocation {
    pub id: u64,
    /// Settled exactly once with the body's outcome
    pub promise: ObjectRef,
    state: Cell<InvocationState>,
    coroutine: RefCell<Option<Coroutine>>,
}

impl AsyncInvocation {
    pub fn new(id: u64, promise: ObjectRef) -> Self {
        Self {
            id,
            promise,
            state: Cell::new(InvocationState::Pending),
            coroutine: RefCell::new(None),
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: InvocationState) {
        self.state.set(state);
    }

    fn park(&self, co: Coroutine) {
        self.state.set(InvocationState::Awaiting);
        *self.coroutine.borrow_mut() = Some(co);
    }

    fn take_coroutine(&self) -> Option<Coroutine> {
        self.coroutine.borrow_mut().take()
    }
}

impl Interpreter {
    /// An `Await` reached the driver: park the running invocation until the
    /// awaited value settles
    pub(crate) fn suspend_await(&mut self, value: JsValue) -> Result<(), JsError> {
        let ActivationKind::Async {
            invocation,
            deliver_promise,
        } = self.activation.clone()
        else {
            return Err(JsError::internal_error("await outside an async activation"));
        };
        let awaited = self.promise_resolve(value)?;
        self.perform_then(
            &awaited,
            Handler::Await(invocation.clone()),
            Handler::Await(invocation.clone()),
            None,
        );

        let co = self.finish_activation()?;
        invocation.park(co);
        self.parked.push(invocation.clone());
        trace!(invocation = invocation.id, "invocation parked at await");
        if deliver_promise {
            self.co.values.push(JsValue::Object(invocation.promise.cheap_clone()));
        }
        Ok(())
    }

    /// Job continuation of a parked invocation
    pub(crate) fn resume_async(&mut self, invocation: &Rc<AsyncInvocation>, resumption: Resumption) -> Step {
        if invocation.state() != InvocationState::Awaiting {
            let err = EngineError::InvocationHalted(invocation.id);
            warn!(invocation = invocation.id, error = %err, "late continuation rejected");
            return Ok(Flow::Continue);
        }
        let Some(co) = invocation.take_coroutine() else {
            return Err(JsError::internal_error("awaiting invocation without a coroutine").into());
        };
        self.parked.retain(|p| !Rc::ptr_eq(p, invocation));
        invocation.set_state(InvocationState::Running);
        trace!(invocation = invocation.id, "invocation resumed");
        self.enter_activation(
            ActivationKind::Async {
                invocation: invocation.clone(),
                deliver_promise: false,
            },
            co,
        );
        match resumption {
            Resumption::Next(v) => {
                self.co.values.push(v);
                Ok(Flow::Continue)
            }
            Resumption::Throw(v) => Err(Unwind::throw(v)),
            Resumption::Return(v) => Err(Unwind::Return(v)),
        }
    }

    /// Re-enter a parked invocation only to unwind it (host abort)
    pub(crate) fn abort_async(&mut self, invocation: &Rc<AsyncInvocation>) -> Step {
        let Some(co) = invocation.take_coroutine() else {
            return Ok(Flow::Continue);
        };
        self.parked.retain(|p| !Rc::ptr_eq(p, invocation));
        invocation.set_state(InvocationState::Running);
        self.enter_activation(
            ActivationKind::Async {
                invocation: invocation.clone(),
                deliver_promise: false,
            },
            co,
        );
        Err(Unwind::Abort)
    }

    /// Body ran off its end: scripts settle with their completion value,
    /// functions with `undefined`
    pub(crate) fn async_shell_done(&mut self, script: bool) -> Step {
        let completion = std::mem::take(&mut self.co.completion);
        let value = if script { completion.value() } else { JsValue::Undefined };
        check_label_escape(completion)?;
        self.leave_async(Ok(value))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn async_shell_unwind(&mut self, signal: Unwind) -> Result<Option<Unwind>, JsError> {
        match signal {
            Unwind::Return(v) => {
                self.leave_async(Ok(v))?;
                Ok(None)
            }
            Unwind::Error(err) => {
                let reason = self.error_value(err)?;
                self.leave_async(Err(reason))?;
                Ok(None)
            }
            Unwind::Abort => {
                let ActivationKind::Async { invocation, .. } = self.activation.clone() else {
                    return Err(JsError::internal_error("async shell outside an async activation"));
                };
                invocation.set_state(InvocationState::Halted);
                self.finish_activation()?;
                Ok(Some(Unwind::Abort))
            }
        }
    }

    /// Settle the invocation's promise and return to the caller
    fn leave_async(&mut self, outcome: Result<JsValue, JsValue>) -> Result<(), JsError> {
        let ActivationKind::Async {
            invocation,
            deliver_promise,
        } = self.activation.clone()
        else {
            return Err(JsError::internal_error("async shell outside an async activation"));
        };
        invocation.set_state(InvocationState::Halted);
        match outcome {
            Ok(value) => self.resolve_promise(&invocation.promise, value)?,
            Err(reason) => self.reject_promise(&invocation.promise, reason),
        }
        self.finish_activation()?;
        trace!(invocation = invocation.id, "invocation halted");
        if deliver_promise {
            self.co.values.push(JsValue::Object(invocation.promise.cheap_clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;
    use crate::completion::Resumption;

    #[test]
    fn test_halted_invocation_ignores_continuation() {
        let mut interp = Interpreter::new(&RuntimeConfig::default());
        let promise = interp.create_promise();
        let invocation = Rc::new(AsyncInvocation::new(7, promise));
        invocation.set_state(InvocationState::Halted);

        let step = interp.resume_async(&invocation, Resumption::Next(JsValue::from(1)));
        assert!(matches!(step, Ok(Flow::Continue)));
        assert!(interp.co.values.is_empty());
        assert!(matches!(interp.activation, ActivationKind::Idle));
        assert_eq!(invocation.state(), InvocationState::Halted);
    }
}
