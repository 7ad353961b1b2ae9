//! Deferred member references.
//!
//! Reading a member a host type does not expose as an extension, property or
//! field yields `Value::Nil`. Nothing is resolved until the reference is
//! called; then the host type's methods of that name are matched against the
//! kinds of the actual arguments.

use crate::host::{HostMethod, HostType, StaticType, resolve_overload};
use crate::interpreter::Interpreter;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Value;

pub struct DeferredMember {
    pub receiver: Value,
    pub ty: HostType,
    pub name: String,
    /// Set for members read off the type marker rather than an instance.
    pub statics: bool,
}

impl DeferredMember {
    pub fn new(receiver: Value, ty: HostType, name: impl Into<String>, statics: bool) -> Self {
        Self {
            receiver,
            ty,
            name: name.into(),
            statics,
        }
    }

    fn candidates(&self) -> Vec<&HostMethod> {
        self.ty
            .methods_named(&self.name)
            .filter(|method| method.is_static == self.statics)
            .collect()
    }

    /// Whether calling the reference could find any method at all.
    pub fn is_resolvable(&self) -> bool {
        !self.candidates().is_empty()
    }

    pub fn invoke(&self, rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
        let kinds: Vec<StaticType> = args.iter().map(StaticType::of).collect();
        let candidates = self.candidates();
        if let Some(method) = resolve_overload(&candidates, &kinds, false) {
            return method.invoke(rt, &self.receiver, args);
        }
        if candidates.is_empty() {
            return Err(RuntimeError::attribute_error(format!(
                "'{}' object has no attribute '{}'",
                self.ty.name(),
                self.name
            )));
        }
        let given: Vec<_> = kinds.iter().map(|kind| kind.name().into_owned()).collect();
        let listed: Vec<_> = candidates.iter().map(|method| method.signature()).collect();
        Err(RuntimeError::attribute_error(format!(
            "no overload of '{}.{}' accepts ({}); candidates: {}",
            self.ty.name(),
            self.name,
            given.join(", "),
            listed.join("; ")
        )))
    }
}
