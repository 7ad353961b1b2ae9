use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} at line {line}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }

    pub fn invalid_syntax(line: usize) -> Self {
        Self::new("invalid syntax", line)
    }

    pub fn not_assignable(line: usize) -> Self {
        Self::new("the left hand of the expression is not assignable", line)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
