//! An embeddable Python-flavored scripting language.
//!
//! Source text is split into statement groups by the [`lexer`], turned into a
//! syntax tree by the [`parser`] and compiled by the [`compiler`] into
//! closures that run on the [`runtime`] object model. The [`interpreter`]
//! drives all of it and is the entry point for embedders.

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod config;
pub mod error;
pub mod host;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod token;

pub use config::Config;
pub use error::{Error, Result};
pub use interpreter::{Interpreter, Module};
pub use runtime::Value;
