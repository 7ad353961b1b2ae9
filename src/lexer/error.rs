use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("EOL while scanning string literal at line {line}")]
    UnterminatedString { line: usize },
    #[error("EOF while scanning triple-quoted string literal starting at line {line}")]
    UnterminatedDocString { line: usize },
    #[error("Unexpected character '{character}' at line {line}")]
    UnexpectedCharacter { character: char, line: usize },
    #[error("Unmatched '{character}' at line {line}")]
    UnmatchedDelimiter { character: char, line: usize },
    #[error("'{open}' opened at line {line} was never closed")]
    UnclosedDelimiter { open: char, line: usize },
    #[error("Unexpected indent at line {line}")]
    UnexpectedIndent { line: usize },
    #[error("Unindent does not match any outer indentation level at line {line}")]
    InvalidDedent { line: usize },
    #[error("Expected an indented block after line {line}")]
    ExpectedIndent { line: usize },
    #[error("Invalid number literal '{literal}' at line {line}")]
    InvalidNumber { literal: String, line: usize },
    #[error("'{keyword}' without a matching 'if' at line {line}")]
    DanglingTier { keyword: String, line: usize },
    #[error("Unexpected keyword '{keyword}' at line {line}")]
    UnexpectedKeyword { keyword: String, line: usize },
    #[error("Invalid lambda parameter '{name}' at line {line}")]
    InvalidLambdaParameter { name: String, line: usize },
    #[error("Invalid f-string expression at line {line}: {message}")]
    InvalidInterpolation { message: String, line: usize },
}

pub type LexResult<T> = Result<T, LexError>;
