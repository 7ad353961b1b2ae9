use thiserror::Error;

use crate::runtime::exception::RaisedException;

/// Errors raised while compiled script code runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("TypeError: {0}")]
    Type(String),
    #[error("AttributeError: {0}")]
    Attribute(String),
    #[error("NameError: name '{0}' is not defined")]
    Name(String),
    #[error("UnboundLocalError: local variable '{0}' referenced before assignment")]
    UnboundLocal(String),
    #[error("IndexError: {0}")]
    Index(String),
    #[error("KeyError: {0}")]
    Key(String),
    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),
    #[error("OverflowError: {0}")]
    Overflow(String),
    #[error("ValueError: {0}")]
    Value(String),
    #[error("RecursionError: maximum recursion depth exceeded ({0})")]
    Recursion(usize),
    #[error("ImportError: {0}")]
    Import(String),
    #[error("{0}")]
    Raised(RaisedException),
}

impl RuntimeError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::Attribute(message.into())
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::Value(message.into())
    }

    pub(crate) fn expect_arity_range(
        name: &str,
        min: usize,
        max: usize,
        found: usize,
    ) -> Result<(), Self> {
        if (min..=max).contains(&found) {
            return Ok(());
        }
        Err(Self::Type(format!(
            "{name}() takes from {min} to {max} arguments ({found} given)"
        )))
    }

    /// Python-style kind name, as the driver reports it.
    pub fn kind(&self) -> &str {
        match self {
            Self::Type(_) => "TypeError",
            Self::Attribute(_) => "AttributeError",
            Self::Name(_) => "NameError",
            Self::UnboundLocal(_) => "UnboundLocalError",
            Self::Index(_) => "IndexError",
            Self::Key(_) => "KeyError",
            Self::ZeroDivision(_) => "ZeroDivisionError",
            Self::Overflow(_) => "OverflowError",
            Self::Value(_) => "ValueError",
            Self::Recursion(_) => "RecursionError",
            Self::Import(_) => "ImportError",
            Self::Raised(raised) => &raised.type_name,
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
