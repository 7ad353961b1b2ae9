//! `StringBuilder`: a native host type with overloaded members, a property,
//! a writable field and a by-reference parameter.

use crate::host::types::{HostMethod, HostParam, HostProperty, HostType, HostTypeDef, NativeObject, StaticType as T};
use crate::interpreter::Interpreter;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Value;

pub const NAME: &str = "StringBuilder";

#[derive(Debug, Clone, PartialEq)]
pub struct Builder {
    pub text: String,
    pub newline: String,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            text: String::new(),
            newline: "\n".into(),
        }
    }
}

fn with_builder<R>(receiver: &Value, edit: impl FnOnce(&mut Builder) -> R) -> RuntimeResult<R> {
    match receiver {
        Value::Native(native) => native.with_state_mut(edit),
        _ => None,
    }
    .ok_or_else(|| {
        RuntimeError::type_error(format!(
            "descriptor requires a '{NAME}' object but received a '{}'",
            receiver.type_name()
        ))
    })
}

fn new_builder(receiver: &Value, text: String) -> RuntimeResult<Value> {
    let Value::Type(ty) = receiver else {
        return Err(RuntimeError::type_error(format!("{NAME}() needs its type")));
    };
    Ok(Value::Native(NativeObject::new(
        HostType::clone(ty),
        Builder {
            text,
            ..Builder::default()
        },
    )))
}

/// `append` overload for one argument kind. Each returns the builder so
/// calls chain.
fn append(kind: T) -> HostMethod {
    HostMethod::new("append", [kind], T::Host(crate::host::TypeKey::named(NAME)), |rt, receiver, args| {
        let piece = match args.first() {
            Some(value) => value.to_str(rt)?,
            None => String::new(),
        };
        with_builder(receiver, |builder| builder.text.push_str(&piece))?;
        Ok(receiver.clone())
    })
}

pub fn definition() -> HostTypeDef {
    HostTypeDef::new(NAME)
        .constructor(HostMethod::new(NAME, [], T::Dynamic, |_, receiver, _| {
            new_builder(receiver, String::new())
        }))
        .constructor(HostMethod::new(NAME, [T::Str], T::Dynamic, |rt, receiver, args| {
            let initial = match args.first() {
                Some(value) => value.to_str(rt)?,
                None => String::new(),
            };
            new_builder(receiver, initial)
        }))
        .method(append(T::Str))
        .method(append(T::Int))
        .method(append(T::Float))
        .method(append(T::Bool))
        .method(append(T::Dynamic))
        .method(HostMethod::new("append_line", [T::Str], T::None, |rt: &Interpreter, receiver, args| {
            let line = match args.first() {
                Some(value) => value.to_str(rt)?,
                None => String::new(),
            };
            with_builder(receiver, |builder| {
                builder.text.push_str(&line);
                let newline = builder.newline.clone();
                builder.text.push_str(&newline);
            })?;
            Ok(Value::None)
        }))
        .method(HostMethod::new("insert", [T::Int, T::Str], T::None, |_, receiver, args| {
            let (Some(index), Some(piece)) = (
                args.first().and_then(Value::as_int),
                args.get(1).and_then(Value::as_str),
            ) else {
                return Err(RuntimeError::type_error("insert(int, str) expected"));
            };
            with_builder(receiver, |builder| {
                let count = builder.text.chars().count() as i64;
                let position = if index < 0 { (index + count).max(0) } else { index.min(count) };
                let byte = builder
                    .text
                    .char_indices()
                    .nth(position as usize)
                    .map_or(builder.text.len(), |(byte, _)| byte);
                builder.text.insert_str(byte, piece);
            })?;
            Ok(Value::None)
        }))
        .method(HostMethod::new("clear", [], T::None, |_, receiver, _| {
            with_builder(receiver, |builder| builder.text.clear())?;
            Ok(Value::None)
        }))
        .method(HostMethod::new("to_string", [], T::Str, |_, receiver, _| {
            Ok(Value::str(with_builder(receiver, |builder| builder.text.clone())?))
        }))
        .method(HostMethod::new("__str__", [], T::Str, |_, receiver, _| {
            Ok(Value::str(with_builder(receiver, |builder| builder.text.clone())?))
        }))
        .method(HostMethod::new("__len__", [], T::Int, |_, receiver, _| {
            Ok(Value::Int(with_builder(receiver, |builder| builder.text.chars().count())? as i64))
        }))
        .method(
            HostMethod::new("drain_into", [], T::None, |_, receiver, args| {
                let Some(Value::List(target)) = args.first() else {
                    return Err(RuntimeError::type_error("drain_into(ref list) expected"));
                };
                let text = with_builder(receiver, |builder| std::mem::take(&mut builder.text))?;
                target.borrow_mut().push(Value::str(text));
                Ok(Value::None)
            })
            .with_params(vec![HostParam::by_ref(T::List)]),
        )
        .property(HostProperty::read_only("length", T::Int, |_, receiver| {
            Ok(Value::Int(with_builder(receiver, |builder| builder.text.chars().count())? as i64))
        }))
        .field(HostProperty::read_write(
            "newline",
            T::Str,
            |_, receiver| Ok(Value::str(with_builder(receiver, |builder| builder.newline.clone())?)),
            |_, receiver, value| {
                let newline = value.as_str().unwrap_or_default().to_string();
                with_builder(receiver, |builder| builder.newline = newline)
            },
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{StaticType, resolve_overload};

    #[test]
    fn append_overloads_resolve_by_argument_kind() {
        let def = definition();
        let candidates: Vec<_> = def.methods_named("append").collect();
        for (kind, expected) in [
            (StaticType::Int, "append(int)"),
            (StaticType::Str, "append(str)"),
            (StaticType::List, "append(object)"),
        ] {
            let picked = resolve_overload(&candidates, &[kind], false).expect("overload");
            assert!(picked.signature().starts_with(expected), "{}", picked.signature());
        }
    }

    #[test]
    fn member_tables_expose_property_and_field() {
        let def = definition();
        assert!(def.find_property("length").is_some());
        assert!(def.find_field("newline").is_some());
        assert!(def.find_property("newline").is_none());
        assert_eq!(def.constructors().len(), 2);
    }
}
