use std::rc::Rc;

use crate::interpreter::Interpreter;
use crate::runtime::error::RuntimeResult;
use crate::runtime::value::Value;

/// A callable paired with the receiver it is invoked on.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub function: Value,
}

impl BoundMethod {
    pub fn call(&self, rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(self.receiver.clone());
        call_args.extend(args);
        self.function.call(rt, call_args)
    }
}

pub(crate) fn bind(receiver: Value, function: Value) -> Value {
    Value::BoundMethod(Rc::new(BoundMethod { receiver, function }))
}
