use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::ast::ParamKind;
use crate::interpreter::Interpreter;
use crate::runtime::dict::Dict;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Value;

/// Native entry point of a function: receives the raw call arguments,
/// keyword arguments included as trailing `Value::Keyword`s.
pub type Routine = Rc<dyn Fn(&Interpreter, Vec<Value>) -> RuntimeResult<Value>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: String,
    pub kind: ParamKind,
}

impl ParamInfo {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

pub struct Function {
    pub name: String,
    pub qualname: String,
    pub module: Rc<str>,
    pub params: Rc<[ParamInfo]>,
    routine: Routine,
    native: bool,
    is_static: Cell<bool>,
}

impl Function {
    pub fn compiled(
        name: impl Into<String>,
        qualname: impl Into<String>,
        module: Rc<str>,
        params: Rc<[ParamInfo]>,
        routine: Routine,
    ) -> Self {
        Self {
            name: name.into(),
            qualname: qualname.into(),
            module,
            params,
            routine,
            native: false,
            is_static: Cell::new(false),
        }
    }

    pub fn native(
        name: impl Into<String>,
        routine: impl Fn(&Interpreter, Vec<Value>) -> RuntimeResult<Value> + 'static,
    ) -> Self {
        let name = name.into();
        Self {
            qualname: name.clone(),
            name,
            module: Rc::from("builtins"),
            params: Rc::from(Vec::new()),
            routine: Rc::new(routine),
            native: true,
            is_static: Cell::new(false),
        }
    }

    pub fn is_native(&self) -> bool {
        self.native
    }

    /// Static members are returned unbound from instance lookups.
    pub fn is_static(&self) -> bool {
        self.is_static.get()
    }

    pub fn mark_static(&self) {
        self.is_static.set(true);
    }

    pub fn call(&self, rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
        let guard = rt.state().enter_call()?;
        let result = (self.routine)(rt, args);
        if result.is_err() && !self.native {
            rt.state().record_frame(&self.qualname);
        }
        drop(guard);
        result
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("qualname", &self.qualname)
            .field("module", &self.module)
            .field("native", &self.native)
            .finish()
    }
}

/// Destructures an exact argument count for native routines.
pub(crate) fn take_args<const N: usize>(name: &str, args: Vec<Value>) -> RuntimeResult<[Value; N]> {
    let found = args.len();
    args.try_into()
        .map_err(|_| RuntimeError::type_error(format!("{name}() takes {N} arguments ({found} given)")))
}

/// Splits off the trailing run of keyword arguments.
pub(crate) fn split_keywords(mut args: Vec<Value>) -> (Vec<Value>, Vec<(Rc<str>, Value)>) {
    let positional = args
        .iter()
        .rposition(|arg| !matches!(arg, Value::Keyword(_)))
        .map_or(0, |index| index + 1);
    let keywords = args
        .drain(positional..)
        .filter_map(|arg| match arg {
            Value::Keyword(keyword) => Some((keyword.name.clone(), keyword.value.clone())),
            _ => None,
        })
        .collect();
    (args, keywords)
}

/// Matches call arguments to declared parameters.
///
/// Each slot is `None` when the caller supplied nothing for it, leaving the
/// default (or `None`) to the caller. Surplus arguments and unknown keywords
/// are dropped.
pub(crate) fn bind_arguments(
    params: &[ParamInfo],
    args: Vec<Value>,
) -> RuntimeResult<Vec<Option<Value>>> {
    let (positional, mut keywords) = split_keywords(args);
    let mut positional = positional.into_iter();
    let mut bound = Vec::with_capacity(params.len());
    for param in params {
        match param.kind {
            ParamKind::VarArgs => bound.push(Some(Value::tuple(positional.by_ref().collect()))),
            ParamKind::KwArgs => {
                let mut dict = Dict::new();
                for (name, value) in keywords.drain(..) {
                    dict.insert(Value::Str(name), value)?;
                }
                bound.push(Some(Value::dict(dict)));
            }
            ParamKind::Normal => match positional.next() {
                Some(value) => bound.push(Some(value)),
                None => {
                    let matched = keywords.iter().position(|(name, _)| **name == *param.name);
                    bound.push(matched.map(|index| keywords.remove(index).1));
                }
            },
        }
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn signature() -> Vec<ParamInfo> {
        vec![
            ParamInfo::new("a", ParamKind::Normal),
            ParamInfo::new("b", ParamKind::Normal),
            ParamInfo::new("c", ParamKind::VarArgs),
            ParamInfo::new("d", ParamKind::KwArgs),
        ]
    }

    #[test]
    fn missing_arguments_leave_empty_slots() {
        let bound = bind_arguments(&signature(), vec![Value::Int(1)]).expect("bind");
        assert_eq!(
            bound,
            vec![
                Some(Value::Int(1)),
                None,
                Some(Value::tuple(vec![])),
                Some(Value::dict(Dict::new())),
            ]
        );
    }

    #[test]
    fn surplus_positionals_and_keywords_collect() {
        let args = vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::keyword("x", Value::Int(9)),
        ];
        let bound = bind_arguments(&signature(), args).expect("bind");
        let mut expected = Dict::new();
        expected.insert(Value::str("x"), Value::Int(9)).expect("insert");
        assert_eq!(
            bound,
            vec![
                Some(Value::Int(1)),
                Some(Value::Int(2)),
                Some(Value::tuple(vec![Value::Int(3)])),
                Some(Value::dict(expected)),
            ]
        );
    }

    #[test]
    fn keywords_fill_named_parameters() {
        let args = vec![Value::keyword("b", Value::Int(5)), Value::keyword("a", Value::Int(4))];
        let bound = bind_arguments(&signature()[..2], args).expect("bind");
        assert_eq!(bound, vec![Some(Value::Int(4)), Some(Value::Int(5))]);
    }
}
