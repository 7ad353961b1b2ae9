//! Raised script conditions.
//!
//! A `raise` statement turns its operand into a `RaisedException` snapshot:
//! the class name, the names of every class it derives from, and the string
//! form of the instance. The snapshot is plain data so that errors can leave
//! the interpreter and cross thread boundaries.

use std::fmt;

use crate::interpreter::Interpreter;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaisedException {
    pub type_name: String,
    /// The raised class followed by all of its ancestors.
    pub lineage: Vec<String>,
    pub message: String,
}

impl RaisedException {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            lineage: vec![type_name.clone()],
            type_name,
            message: message.into(),
        }
    }

    pub fn is_instance_of(&self, name: &str) -> bool {
        self.lineage.iter().any(|ancestor| ancestor == name)
    }

    pub fn is_stop_iteration(&self) -> bool {
        self.is_instance_of("StopIteration")
    }
}

impl fmt::Display for RaisedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.type_name)
        } else {
            write!(f, "{}: {}", self.type_name, self.message)
        }
    }
}

/// Converts the operand of `raise` into the error that unwinds the stack.
pub(crate) fn raise(rt: &Interpreter, value: Value) -> RuntimeError {
    match snapshot(rt, value) {
        Ok(raised) => RuntimeError::Raised(raised),
        Err(error) => error,
    }
}

fn snapshot(rt: &Interpreter, value: Value) -> RuntimeResult<RaisedException> {
    let value = match value {
        Value::Class(class) => class.instantiate(rt, Vec::new())?,
        other => other,
    };
    let message = value.to_str(rt)?;
    match &value {
        Value::Object(object) => Ok(RaisedException {
            type_name: object.class.name.clone(),
            lineage: object.class.lineage(),
            message,
        }),
        _ => Ok(RaisedException::new("Exception", message)),
    }
}

pub(crate) fn stop_iteration() -> RuntimeError {
    RuntimeError::Raised(RaisedException::new("StopIteration", ""))
}

pub(crate) fn assertion_error(message: String) -> RuntimeError {
    let mut raised = RaisedException::new("AssertionError", message);
    raised.lineage.push("Exception".into());
    raised.lineage.push("BaseException".into());
    RuntimeError::Raised(raised)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_omits_empty_messages() {
        assert_eq!(RaisedException::new("KeyError", "").to_string(), "KeyError");
        assert_eq!(
            RaisedException::new("ValueError", "bad input").to_string(),
            "ValueError: bad input"
        );
    }

    #[test]
    fn lineage_answers_subclass_queries() {
        let raised = RaisedException {
            type_name: "Exhausted".into(),
            lineage: vec!["Exhausted".into(), "StopIteration".into()],
            message: String::new(),
        };
        assert!(raised.is_stop_iteration());
        assert!(!raised.is_instance_of("KeyError"));
    }
}
