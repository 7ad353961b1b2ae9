use thiserror::Error;

/// Rejected while turning the syntax tree into closures, before anything
/// runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} (line {line})")]
pub struct CompileError {
    pub message: String,
    pub line: usize,
}

impl CompileError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
