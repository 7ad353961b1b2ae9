//! Runtime object model: values, classes and instances, callables, and the
//! dispatch protocol compiled code calls into.
pub mod callable;
pub mod class;
pub mod dict;
pub mod dispatch;
pub mod error;
pub mod exception;
pub mod execution;
pub mod extension;
pub mod iter;
pub mod list;
pub mod method;
pub mod nil;
pub mod object;
pub mod ops;
pub mod value;

pub use self::error::{RuntimeError, RuntimeResult};
pub use self::value::Value;
