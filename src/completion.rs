//! Completion algebra
//!
//! Statement results are [`Completion`]s. `Break`/`Continue` stay in the
//! coroutine's completion register and are inspected by loops, switches and
//! labeled statements; `Return`/`Throw` travel as [`Unwind`] errors so `?`
//! carries them straight to the nearest handler frame.

use crate::error::JsError;
use crate::value::{JsString, JsValue};

/// Result of evaluating a statement
#[derive(Debug, Clone)]
pub enum Completion {
    /// `None` is the empty completion value
    Normal(Option<JsValue>),
    Return(JsValue),
    /// `value` is the completion value of the statements run before the jump
    Break {
        label: Option<JsString>,
        value: Option<JsValue>,
    },
    Continue {
        label: Option<JsString>,
        value: Option<JsValue>,
    },
    Throw(JsValue),
}

impl Default for Completion {
    fn default() -> Self {
        Completion::Normal(None)
    }
}

impl Completion {
    pub fn empty() -> Self {
        Completion::Normal(None)
    }

    pub fn is_abrupt(&self) -> bool {
        !matches!(self, Completion::Normal(_))
    }

    /// Statement-list value rule: an empty completion takes `value`.
    ///
    /// `Return` and `Throw` always carry a value and are left unchanged.
    pub fn update_empty(self, value: Option<JsValue>) -> Self {
        match self {
            Completion::Normal(None) => Completion::Normal(value),
            Completion::Break { label, value: None } => Completion::Break { label, value },
            Completion::Continue { label, value: None } => Completion::Continue { label, value },
            other => other,
        }
    }

    /// Completion value slot (empty for `Return`/`Throw`, which carry their own)
    pub fn carried(&self) -> Option<JsValue> {
        match self {
            Completion::Normal(v) | Completion::Break { value: v, .. } | Completion::Continue { value: v, .. } => {
                v.clone()
            }
            Completion::Return(_) | Completion::Throw(_) => None,
        }
    }

    /// Value carried by a `Normal` completion, or undefined
    pub fn value(&self) -> JsValue {
        match self {
            Completion::Normal(Some(v)) | Completion::Return(v) | Completion::Throw(v) => v.clone(),
            _ => JsValue::Undefined,
        }
    }

    /// Whether a `break`/`continue` completion targets a construct carrying `labels`.
    ///
    /// Bare `break` targets the nearest breakable construct; labelled forms
    /// target only constructs whose label set contains the label.
    pub fn targets(label: &Option<JsString>, labels: &[JsString], bare_ok: bool) -> bool {
        match label {
            None => bare_ok,
            Some(l) => labels.iter().any(|x| x == l),
        }
    }
}

/// Boundary-agnostic abrupt completion in flight
#[derive(Debug, Clone)]
pub enum Unwind {
    Return(JsValue),
    /// A throw; typed errors are materialized into guest objects by the handler
    /// that catches them. Engine errors pass every handler.
    Error(JsError),
    /// Host abort: runs `finally` blocks and iterator cleanup but is caught
    /// by nothing
    Abort,
}

impl From<JsError> for Unwind {
    fn from(err: JsError) -> Self {
        Unwind::Error(err)
    }
}

impl Unwind {
    pub fn throw(value: JsValue) -> Self {
        Unwind::Error(JsError::Thrown(value))
    }

    pub fn is_engine(&self) -> bool {
        matches!(self, Unwind::Error(e) if e.is_engine())
    }
}

/// Values that cross the coroutine boundary to the driver
#[derive(Debug, Clone)]
pub enum SuspensionCommand {
    Await(JsValue),
    Yield(JsValue),
}

/// Outcome injected into a suspended coroutine when it resumes
#[derive(Debug, Clone)]
pub enum Resumption {
    Next(JsValue),
    Throw(JsValue),
    Return(JsValue),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_empty() {
        let c = Completion::empty().update_empty(Some(JsValue::from(1)));
        assert!(matches!(c, Completion::Normal(Some(JsValue::Number(n))) if n == 1.0));

        let c = Completion::Normal(Some(JsValue::from(2))).update_empty(Some(JsValue::from(1)));
        assert!(matches!(c, Completion::Normal(Some(JsValue::Number(n))) if n == 2.0));

        let c = Completion::Break { label: None, value: None }.update_empty(Some(JsValue::from(1)));
        assert!(matches!(c, Completion::Break { label: None, value: Some(_) }));
    }

    #[test]
    fn test_label_targeting() {
        let labels = [JsString::from("outer")];
        assert!(Completion::targets(&None, &labels, true));
        assert!(!Completion::targets(&None, &labels, false));
        assert!(Completion::targets(&Some(JsString::from("outer")), &labels, false));
        assert!(!Completion::targets(&Some(JsString::from("inner")), &labels, true));
    }

    #[test]
    fn test_abrupt() {
        assert!(!Completion::empty().is_abrupt());
        assert!(Completion::Continue { label: None, value: None }.is_abrupt());
        assert!(Completion::Return(JsValue::Undefined).is_abrupt());
    }
}
