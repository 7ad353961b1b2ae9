use std::fmt::Write as _;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::compiler::CompileError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::runtime::error::RuntimeError;
use crate::runtime::execution::TraceFrame;

/// Error returned by every public entry point of the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("SyntaxError: {0}")]
    Lex(#[from] LexError),
    #[error("SyntaxError: {0}")]
    Parse(#[from] ParseError),
    #[error("SyntaxError: {0}")]
    Compile(#[from] CompileError),
    #[error("{error}")]
    Runtime {
        error: RuntimeError,
        /// Script routines the error unwound through, innermost first.
        trace: Vec<TraceFrame>,
    },
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<RuntimeError> for Error {
    fn from(error: RuntimeError) -> Self {
        Self::Runtime {
            error,
            trace: Vec::new(),
        }
    }
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors raised before any code ran.
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, Self::Lex(_) | Self::Parse(_) | Self::Compile(_))
    }

    pub fn runtime_error(&self) -> Option<&RuntimeError> {
        match self {
            Self::Runtime { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn trace(&self) -> &[TraceFrame] {
        match self {
            Self::Runtime { trace, .. } => trace,
            _ => &[],
        }
    }

    /// Message followed by one `at <routine>, line N` line per frame.
    pub fn report(&self) -> String {
        let mut report = self.to_string();
        for frame in self.trace() {
            let _ = write!(report, "\n  {frame}");
        }
        report
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn front_end_errors_read_as_syntax_errors() {
        let error = Error::from(ParseError::invalid_syntax(3));
        assert!(error.is_syntax_error());
        assert_eq!(error.to_string(), "SyntaxError: invalid syntax at line 3");
    }

    #[test]
    fn report_lists_frames_innermost_first() {
        let error = Error::Runtime {
            error: RuntimeError::Name("x".into()),
            trace: vec![
                TraceFrame {
                    routine: "inner".into(),
                    line: 4,
                },
                TraceFrame {
                    routine: "<module>".into(),
                    line: 9,
                },
            ],
        };
        assert_eq!(
            error.report(),
            "NameError: name 'x' is not defined\n  at inner, line 4\n  at <module>, line 9"
        );
    }
}
