//! The dispatch protocol dynamic-mode code runs on.
//!
//! Script objects are handled by calling the named member of their class
//! with the instance prepended. Builtin values are handled by matching on
//! the variant; for the hooks a builtin variant does not implement itself,
//! the extension table and then the host type's member table are consulted.

use std::rc::Rc;

use crate::interpreter::Interpreter;
use crate::runtime::class::Class;
use crate::runtime::dict::set_contains;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::list::normalize_index;
use crate::runtime::method::bind;
use crate::runtime::nil::DeferredMember;
use crate::runtime::object::{Object, object_getattribute};
use crate::runtime::value::{Value, format_float};
use crate::host::{HostType, StaticType, resolve_overload};

impl Value {
    /// Calls `name` on a script object through its class.
    pub(crate) fn call_method(&self, rt: &Interpreter, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        self.get_attr(rt, name)?.call(rt, args)
    }

    /// Runs a hook on a builtin or native value: an extension registered for
    /// the value's type first, then a host method of that name.
    fn host_hook(&self, rt: &Interpreter, name: &str, args: Vec<Value>) -> Option<RuntimeResult<Value>> {
        if let Some(extension) = rt.extensions().lookup(&self.type_key(), name) {
            let mut call_args = Vec::with_capacity(args.len() + 1);
            call_args.push(self.clone());
            call_args.extend(args);
            return Some(extension.call(rt, call_args));
        }
        let ty = rt.types().type_of(self)?;
        if !ty.has_method(name) {
            return None;
        }
        Some(DeferredMember::new(self.clone(), ty, name, false).invoke(rt, args))
    }

    fn object_hook(
        &self,
        rt: &Interpreter,
        object: &Object,
        name: &str,
        args: Vec<Value>,
    ) -> Option<RuntimeResult<Value>> {
        object
            .class
            .has_member(name)
            .then(|| self.call_method(rt, name, args))
    }

    pub fn get_attr(&self, rt: &Interpreter, name: &str) -> RuntimeResult<Value> {
        match self {
            Value::Object(object) => match object.class.lookup("__getattribute__") {
                Some(Value::Function(hook)) if hook.is_native() => object_getattribute(rt, self, object, name),
                Some(hook) => hook.call(rt, vec![self.clone(), Value::str(name)]),
                None => object_getattribute(rt, self, object, name),
            },
            Value::Class(class) => class.lookup(name).ok_or_else(|| {
                RuntimeError::attribute_error(format!(
                    "type object '{}' has no attribute '{name}'",
                    class.name
                ))
            }),
            Value::Module(module) => module.get(name).ok_or_else(|| {
                RuntimeError::attribute_error(format!(
                    "module '{}' has no attribute '{name}'",
                    module.name()
                ))
            }),
            Value::Function(function) => match name {
                "__name__" => Ok(Value::str(&function.name)),
                "__qualname__" => Ok(Value::str(&function.qualname)),
                "__module__" => Ok(Value::Str(function.module.clone())),
                _ => Err(RuntimeError::attribute_error(format!(
                    "'function' object has no attribute '{name}'"
                ))),
            },
            Value::BoundMethod(method) => match name {
                "__self__" => Ok(method.receiver.clone()),
                "__func__" => Ok(method.function.clone()),
                _ => method.function.get_attr(rt, name),
            },
            Value::Super(parent) => match parent.lookup(name) {
                Some(member @ Value::Function(_)) if !is_static(&member) => {
                    Ok(bind(parent.receiver.clone(), member))
                }
                Some(member) => Ok(member),
                None => Err(RuntimeError::attribute_error(format!(
                    "'super' object has no attribute '{name}'"
                ))),
            },
            Value::Type(ty) => {
                if let Some(extension) = rt.extensions().lookup(ty.key(), name) {
                    return Ok(Value::Function(extension));
                }
                if name == "__name__" {
                    return Ok(Value::str(ty.name()));
                }
                Ok(Value::Nil(Rc::new(DeferredMember::new(self.clone(), ty.clone(), name, true))))
            }
            other => other.host_attr(rt, name),
        }
    }

    fn host_attr(&self, rt: &Interpreter, name: &str) -> RuntimeResult<Value> {
        if let Some(extension) = rt.extensions().lookup(&self.type_key(), name) {
            return Ok(bind(self.clone(), Value::Function(extension)));
        }
        let Some(ty) = rt.types().type_of(self) else {
            return Err(RuntimeError::attribute_error(format!(
                "'{}' object has no attribute '{name}'",
                self.type_name()
            )));
        };
        if name == "__class__" {
            return Ok(Value::Type(ty));
        }
        if let Some(property) = ty.find_property(name) {
            return property.get(rt, self);
        }
        if let Some(field) = ty.find_field(name) {
            return field.get(rt, self);
        }
        Ok(Value::Nil(Rc::new(DeferredMember::new(self.clone(), ty, name, false))))
    }

    pub fn set_attr(&self, rt: &Interpreter, name: &str, value: Value) -> RuntimeResult<()> {
        match self {
            Value::Object(object) => {
                match object.class.lookup("__setattr__") {
                    Some(Value::Function(hook)) if hook.is_native() => object.set(name, value),
                    Some(hook) => {
                        hook.call(rt, vec![self.clone(), Value::str(name), value])?;
                    }
                    None => object.set(name, value),
                }
                Ok(())
            }
            Value::Class(class) => {
                class.set_member(name, value);
                Ok(())
            }
            Value::Module(module) => {
                module.set(name, value);
                Ok(())
            }
            other => {
                let ty = rt.types().type_of(other);
                if let Some(ty) = &ty {
                    if let Some(property) = ty.find_property(name) {
                        return property.set(rt, other, value);
                    }
                    if let Some(field) = ty.find_field(name) {
                        return field.set(rt, other, value);
                    }
                }
                Err(RuntimeError::attribute_error(format!(
                    "'{}' object has no attribute '{name}'",
                    other.type_name()
                )))
            }
        }
    }

    pub fn del_attr(&self, rt: &Interpreter, name: &str) -> RuntimeResult<()> {
        match self {
            Value::Object(_) => self.call_method(rt, "__delattr__", vec![Value::str(name)]).map(drop),
            Value::Class(class) => class.remove_member(name).map(drop).ok_or_else(|| {
                RuntimeError::attribute_error(format!(
                    "type object '{}' has no attribute '{name}'",
                    class.name
                ))
            }),
            Value::Module(module) => module.remove(name).map(drop).ok_or_else(|| {
                RuntimeError::attribute_error(format!(
                    "module '{}' has no attribute '{name}'",
                    module.name()
                ))
            }),
            other => Err(RuntimeError::type_error(format!(
                "'{}' object does not support attribute deletion",
                other.type_name()
            ))),
        }
    }

    pub fn get_item(&self, rt: &Interpreter, index: &Value) -> RuntimeResult<Value> {
        match self {
            Value::Object(object) => self
                .object_hook(rt, object, "__getitem__", vec![index.clone()])
                .unwrap_or_else(|| Err(not_subscriptable(self))),
            Value::List(items) => {
                let items = items.borrow();
                let position = normalize_index(sequence_index(self, index)?, items.len(), "list")?;
                Ok(items[position].clone())
            }
            Value::Tuple(items) => {
                let position = normalize_index(sequence_index(self, index)?, items.len(), "tuple")?;
                Ok(items[position].clone())
            }
            Value::Str(text) => {
                let count = text.chars().count();
                let position = normalize_index(sequence_index(self, index)?, count, "string")?;
                Ok(text
                    .chars()
                    .nth(position)
                    .map(|ch| Value::str(ch.to_string()))
                    .unwrap_or(Value::None))
            }
            Value::Range(range) => {
                let position = normalize_index(sequence_index(self, index)?, range.len(), "range object")?;
                Ok(range.get(position).map(Value::Int).unwrap_or(Value::None))
            }
            Value::Dict(dict) => {
                let found = dict.borrow().get(index)?;
                match found {
                    Some(value) => Ok(value),
                    None => Err(RuntimeError::Key(index.repr(rt)?)),
                }
            }
            other => other
                .host_hook(rt, "__getitem__", vec![index.clone()])
                .unwrap_or_else(|| Err(not_subscriptable(other))),
        }
    }

    pub fn set_item(&self, rt: &Interpreter, index: &Value, value: Value) -> RuntimeResult<()> {
        match self {
            Value::Object(object) => self
                .object_hook(rt, object, "__setitem__", vec![index.clone(), value])
                .unwrap_or_else(|| Err(no_item_assignment(self)))
                .map(drop),
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let position = normalize_index(sequence_index(self, index)?, items.len(), "list assignment")?;
                items[position] = value;
                Ok(())
            }
            Value::Dict(dict) => dict.borrow_mut().insert(index.clone(), value),
            other => other
                .host_hook(rt, "__setitem__", vec![index.clone(), value])
                .unwrap_or_else(|| Err(no_item_assignment(other)))
                .map(drop),
        }
    }

    pub fn del_item(&self, rt: &Interpreter, index: &Value) -> RuntimeResult<()> {
        match self {
            Value::Object(_) => self.call_method(rt, "__delitem__", vec![index.clone()]).map(drop),
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let position = normalize_index(sequence_index(self, index)?, items.len(), "list assignment")?;
                items.remove(position);
                Ok(())
            }
            Value::Dict(dict) => {
                let removed = dict.borrow_mut().remove(index)?;
                match removed {
                    Some(_) => Ok(()),
                    None => Err(RuntimeError::Key(index.repr(rt)?)),
                }
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object doesn't support item deletion",
                other.type_name()
            ))),
        }
    }

    /// `item in self`.
    pub fn contains(&self, rt: &Interpreter, item: &Value) -> RuntimeResult<bool> {
        match self {
            Value::Object(object) => match self.object_hook(rt, object, "__contains__", vec![item.clone()]) {
                Some(found) => found?.truthy(rt),
                None => Err(not_iterable(self)),
            },
            Value::Str(text) => match item {
                Value::Str(needle) => Ok(text.contains(&**needle)),
                other => Err(RuntimeError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            Value::List(items) => {
                let items = items.borrow().clone();
                scan(rt, &items, item)
            }
            Value::Tuple(items) => scan(rt, items, item),
            Value::Range(range) => Ok(item.as_int().is_some_and(|number| range.contains(number))),
            Value::Dict(dict) => dict.borrow().contains(item),
            Value::Set(set) => set_contains(&set.borrow(), item),
            other => match other.host_hook(rt, "__contains__", vec![item.clone()]) {
                Some(found) => found?.truthy(rt),
                None => Err(not_iterable(other)),
            },
        }
    }

    pub fn call(&self, rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
        match self {
            Value::Function(function) => function.call(rt, args),
            Value::BoundMethod(method) => method.call(rt, args),
            Value::Class(class) => class.instantiate(rt, args),
            Value::Object(object) => self
                .object_hook(rt, object, "__call__", args)
                .unwrap_or_else(|| Err(not_callable(self))),
            Value::Nil(member) => member.invoke(rt, args),
            Value::Type(ty) => construct(rt, ty, args),
            other => other
                .host_hook(rt, "__call__", args)
                .unwrap_or_else(|| Err(not_callable(other))),
        }
    }

    pub fn truthy(&self, rt: &Interpreter) -> RuntimeResult<bool> {
        Ok(match self {
            Value::None | Value::Nil(_) => false,
            Value::Bool(flag) => *flag,
            Value::Int(number) => *number != 0,
            Value::Float(number) => *number != 0.0,
            Value::Str(text) => !text.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => !dict.borrow().is_empty(),
            Value::Set(set) => !set.borrow().is_empty(),
            Value::Range(range) => !range.is_empty(),
            Value::Object(_) => {
                let result = self.call_method(rt, "__bool__", Vec::new())?;
                match result {
                    Value::Bool(flag) => flag,
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "__bool__ should return bool, returned {}",
                            other.type_name()
                        )));
                    }
                }
            }
            _ => true,
        })
    }

    /// `self is other`: class and host type markers test membership,
    /// everything else tests identity.
    pub fn is_(&self, other: &Value) -> bool {
        if self.same(other) {
            return true;
        }
        match (self, other) {
            (Value::Object(object), Value::Class(class)) => object.class.is_subclass_of(class),
            (_, Value::Type(ty)) => !matches!(self, Value::Object(_) | Value::Class(_)) && self.type_key() == *ty.key(),
            _ => false,
        }
    }

    pub fn equals(&self, rt: &Interpreter, other: &Value) -> RuntimeResult<bool> {
        match (self, other) {
            (Value::Object(_), _) => self.call_method(rt, "__eq__", vec![other.clone()])?.truthy(rt),
            (_, Value::Object(_)) => other.call_method(rt, "__eq__", vec![self.clone()])?.truthy(rt),
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                all_equal(rt, &a, &b)
            }
            (Value::Tuple(a), Value::Tuple(b)) => all_equal(rt, a, b),
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let pairs: Vec<(Value, Value)> =
                    a.borrow().items().map(|(k, v)| (k.clone(), v.clone())).collect();
                if pairs.len() != b.borrow().len() {
                    return Ok(false);
                }
                for (key, value) in pairs {
                    let theirs = b.borrow().get(&key)?;
                    match theirs {
                        Some(theirs) if value.equals(rt, &theirs)? => {}
                        _ => return Ok(false),
                    }
                }
                Ok(true)
            }
            _ => Ok(self == other),
        }
    }

    /// `str(self)`.
    pub fn to_str(&self, rt: &Interpreter) -> RuntimeResult<String> {
        match self {
            Value::Str(text) => Ok(text.to_string()),
            Value::Object(_) => match self.call_method(rt, "__str__", Vec::new())? {
                Value::Str(text) => Ok(text.to_string()),
                other => Err(RuntimeError::type_error(format!(
                    "__str__ returned non-string (type {})",
                    other.type_name()
                ))),
            },
            Value::Native(_) => match self.host_hook(rt, "__str__", Vec::new()) {
                Some(text) => text?.to_str(rt),
                None => self.repr(rt),
            },
            other => other.repr(rt),
        }
    }

    /// `repr(self)`.
    pub fn repr(&self, rt: &Interpreter) -> RuntimeResult<String> {
        Ok(match self {
            Value::None => "None".into(),
            Value::Nil(member) => format!("<nil {}.{}>", member.ty.name(), member.name),
            Value::Bool(true) => "True".into(),
            Value::Bool(false) => "False".into(),
            Value::Int(number) => number.to_string(),
            Value::Float(number) => format_float(*number),
            Value::Str(text) => quote_str(text),
            Value::List(items) => {
                let Some(_guard) = rt.state().enter_repr(self.identity()) else {
                    return Ok("[...]".into());
                };
                let items = items.borrow().clone();
                format!("[{}]", join_reprs(rt, &items)?)
            }
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr(rt)?),
            Value::Tuple(items) => format!("({})", join_reprs(rt, items)?),
            Value::Dict(dict) => {
                let Some(_guard) = rt.state().enter_repr(self.identity()) else {
                    return Ok("{...}".into());
                };
                let pairs: Vec<(Value, Value)> =
                    dict.borrow().items().map(|(k, v)| (k.clone(), v.clone())).collect();
                let mut parts = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    parts.push(format!("{}: {}", key.repr(rt)?, value.repr(rt)?));
                }
                format!("{{{}}}", parts.join(", "))
            }
            Value::Set(set) => {
                let items: Vec<Value> = set.borrow().values().cloned().collect();
                if items.is_empty() {
                    "set()".into()
                } else {
                    format!("{{{}}}", join_reprs(rt, &items)?)
                }
            }
            Value::Range(range) if range.step == 1 => format!("range({}, {})", range.start, range.stop),
            Value::Range(range) => format!("range({}, {}, {})", range.start, range.stop, range.step),
            Value::Keyword(keyword) => format!("{}={}", keyword.name, keyword.value.repr(rt)?),
            Value::Function(function) => format!("<function {}>", function.qualname),
            Value::BoundMethod(method) => {
                let name = match &method.function {
                    Value::Function(function) => function.qualname.clone(),
                    other => other.type_name().into_owned(),
                };
                format!("<bound method {name} of {}>", method.receiver.repr(rt)?)
            }
            Value::Class(class) => format!("<class '{}'>", class.name),
            Value::Object(_) => match self.call_method(rt, "__repr__", Vec::new())? {
                Value::Str(text) => text.to_string(),
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "__repr__ returned non-string (type {})",
                        other.type_name()
                    )));
                }
            },
            Value::Super(parent) => format!("<super: <class '{}'>>", parent.class.name),
            Value::Type(ty) => format!("<class '{}'>", ty.name()),
            Value::Module(module) => format!("<module '{}'>", module.name()),
            Value::Generator(_) => "<generator object>".into(),
            Value::Iterator(_) => "<iterator object>".into(),
            Value::Native(native) => match self.host_hook(rt, "__repr__", Vec::new()) {
                Some(text) => text?.to_str(rt)?,
                None => format!("<{} object>", native.host_type().name()),
            },
        })
    }

    /// `len(self)`.
    pub fn len(&self, rt: &Interpreter) -> RuntimeResult<usize> {
        Ok(match self {
            Value::Str(text) => text.chars().count(),
            Value::List(items) => items.borrow().len(),
            Value::Tuple(items) => items.len(),
            Value::Dict(dict) => dict.borrow().len(),
            Value::Set(set) => set.borrow().len(),
            Value::Range(range) => range.len(),
            Value::Object(object) => {
                let Some(length) = self.object_hook(rt, object, "__len__", Vec::new()) else {
                    return Err(no_len(self));
                };
                return as_length(length?);
            }
            other => {
                let Some(length) = other.host_hook(rt, "__len__", Vec::new()) else {
                    return Err(no_len(other));
                };
                return as_length(length?);
            }
        })
    }
}

fn is_static(member: &Value) -> bool {
    matches!(member, Value::Function(function) if function.is_static())
}

/// Calls a host type marker: an extension `__new__` first, then the
/// constructor overload matching the argument kinds.
fn construct(rt: &Interpreter, ty: &HostType, args: Vec<Value>) -> RuntimeResult<Value> {
    if let Some(extension) = rt.extensions().lookup(ty.key(), "__new__") {
        return extension.call(rt, args);
    }
    let kinds: Vec<StaticType> = args.iter().map(StaticType::of).collect();
    let candidates: Vec<_> = ty.constructors().iter().collect();
    match resolve_overload(&candidates, &kinds, true) {
        Some(constructor) => constructor.invoke(rt, &Value::Type(ty.clone()), args),
        None if candidates.is_empty() => Err(RuntimeError::type_error(format!(
            "cannot create '{}' instances",
            ty.name()
        ))),
        None => {
            let given: Vec<_> = kinds.iter().map(|kind| kind.name().into_owned()).collect();
            Err(RuntimeError::type_error(format!(
                "{}() does not accept ({})",
                ty.name(),
                given.join(", ")
            )))
        }
    }
}

fn sequence_index(container: &Value, index: &Value) -> RuntimeResult<i64> {
    match index {
        Value::Int(number) => Ok(*number),
        Value::Bool(flag) => Ok(i64::from(*flag)),
        other => Err(RuntimeError::type_error(format!(
            "{} indices must be integers, not {}",
            container.type_name(),
            other.type_name()
        ))),
    }
}

fn scan(rt: &Interpreter, items: &[Value], needle: &Value) -> RuntimeResult<bool> {
    for item in items {
        if item.equals(rt, needle)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn all_equal(rt: &Interpreter, a: &[Value], b: &[Value]) -> RuntimeResult<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (left, right) in a.iter().zip(b) {
        if !left.equals(rt, right)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn join_reprs(rt: &Interpreter, items: &[Value]) -> RuntimeResult<String> {
    let parts = items
        .iter()
        .map(|item| item.repr(rt))
        .collect::<RuntimeResult<Vec<_>>>()?;
    Ok(parts.join(", "))
}

fn as_length(value: Value) -> RuntimeResult<usize> {
    match value {
        Value::Int(length) if length >= 0 => Ok(length as usize),
        Value::Int(_) => Err(RuntimeError::value_error("__len__() should return >= 0")),
        other => Err(RuntimeError::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            other.type_name()
        ))),
    }
}

/// Quotes a string the way `repr` shows it.
pub(crate) fn quote_str(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            ch if ch == quote => {
                quoted.push('\\');
                quoted.push(ch);
            }
            ch => quoted.push(ch),
        }
    }
    quoted.push(quote);
    quoted
}

/// Whether `value` is an instance of `class`, as `isinstance` sees it.
pub(crate) fn instance_of_class(value: &Value, class: &Class) -> bool {
    matches!(value, Value::Object(object) if object.class.is_subclass_of(class))
}

fn not_subscriptable(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!("'{}' object is not subscriptable", value.type_name()))
}

fn no_item_assignment(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "'{}' object does not support item assignment",
        value.type_name()
    ))
}

fn not_iterable(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!("argument of type '{}' is not iterable", value.type_name()))
}

fn not_callable(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!("'{}' object is not callable", value.type_name()))
}

fn no_len(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!("object of type '{}' has no len()", value.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn strings_quote_like_python() {
        assert_eq!(quote_str("abc"), "'abc'");
        assert_eq!(quote_str("it's"), "\"it's\"");
        assert_eq!(quote_str("a\nb"), "'a\\nb'");
        assert_eq!(quote_str("both ' and \""), "'both \\' and \"'");
    }

    #[test]
    fn self_referencing_containers_repr_with_ellipsis() {
        let rt = Interpreter::new(Config::captured()).expect("interpreter");
        let source = "items = [1]\nitems.append(items)\ntable = {'k': 2}\ntable['me'] = table\nboth = [table, table]";
        let module = rt.run_source("cycles", source).expect("run");
        let repr_of = |name: &str| module.get(name).expect("bound").repr(&rt).expect("repr");
        assert_eq!(repr_of("items"), "[1, [...]]");
        assert_eq!(repr_of("table"), "{'k': 2, 'me': {...}}");
        assert_eq!(repr_of("both"), "[{'k': 2, 'me': {...}}, {'k': 2, 'me': {...}}]");
    }
}
