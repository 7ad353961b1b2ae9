//! Script instances and the root `object` class.
//!
//! Instance behavior is looked up by name on the owning class. The root class
//! supplies the default members every class inherits: construction, the
//! attribute protocol, string conversion, identity equality and truthiness.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::interpreter::Interpreter;
use crate::runtime::callable::{Function, take_args};
use crate::runtime::class::Class;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::method::bind;
use crate::runtime::value::Value;

#[derive(Debug)]
pub struct Object {
    pub class: Rc<Class>,
    pub dict: RefCell<IndexMap<String, Value>>,
}

impl Object {
    pub fn new(class: Rc<Class>) -> Rc<Self> {
        Rc::new(Self {
            class,
            dict: RefCell::new(IndexMap::new()),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.dict.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.dict.borrow_mut().insert(name.into(), value);
    }
}

fn expect_object(name: &str, value: &Value) -> RuntimeResult<Rc<Object>> {
    match value {
        Value::Object(object) => Ok(object.clone()),
        other => Err(RuntimeError::type_error(format!(
            "descriptor '{name}' requires an 'object' instance but received a '{}'",
            other.type_name()
        ))),
    }
}

fn expect_name(value: &Value) -> RuntimeResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RuntimeError::type_error("attribute name must be string"))
}

/// Default attribute read: instance dictionary, then class members (binding
/// non-static functions), then `__getattr__`.
pub(crate) fn object_getattribute(
    rt: &Interpreter,
    receiver: &Value,
    object: &Object,
    name: &str,
) -> RuntimeResult<Value> {
    if let Some(value) = object.get(name) {
        return Ok(value);
    }
    if let Some(member) = object.class.lookup(name) {
        return Ok(match &member {
            Value::Function(function) if !function.is_static() => bind(receiver.clone(), member),
            _ => member,
        });
    }
    if name == "__class__" {
        return Ok(Value::Class(object.class.clone()));
    }
    if name == "__dict__" {
        let mut dict = crate::runtime::dict::Dict::new();
        for (key, value) in object.dict.borrow().iter() {
            dict.insert(Value::str(key), value.clone())?;
        }
        return Ok(Value::dict(dict));
    }
    if let Some(fallback) = object.class.lookup("__getattr__") {
        return fallback.call(rt, vec![receiver.clone(), Value::str(name)]);
    }
    Err(RuntimeError::attribute_error(format!(
        "'{}' object has no attribute '{name}'",
        object.class.name
    )))
}

fn native(name: &'static str, routine: impl Fn(&Interpreter, Vec<Value>) -> RuntimeResult<Value> + 'static) -> Value {
    Value::Function(Rc::new(Function::native(name, routine)))
}

/// Builds the root class every script class ultimately derives from.
pub(crate) fn object_class() -> Rc<Class> {
    let mut members = IndexMap::new();

    members.insert(
        "__new__".to_string(),
        native("__new__", |_rt, args| match args.first() {
            Some(Value::Class(class)) => Ok(Value::Object(Object::new(class.clone()))),
            _ => Err(RuntimeError::type_error("object.__new__(X): X is not a type object")),
        }),
    );
    members.insert("__init__".to_string(), native("__init__", |_rt, _args| Ok(Value::None)));
    members.insert(
        "__getattribute__".to_string(),
        native("__getattribute__", |rt, args| {
            let [receiver, name] = take_args("__getattribute__", args)?;
            let object = expect_object("__getattribute__", &receiver)?;
            object_getattribute(rt, &receiver, &object, &expect_name(&name)?)
        }),
    );
    members.insert(
        "__setattr__".to_string(),
        native("__setattr__", |_rt, args| {
            let [receiver, name, value] = take_args("__setattr__", args)?;
            expect_object("__setattr__", &receiver)?.set(expect_name(&name)?, value);
            Ok(Value::None)
        }),
    );
    members.insert(
        "__delattr__".to_string(),
        native("__delattr__", |_rt, args| {
            let [receiver, name] = take_args("__delattr__", args)?;
            let object = expect_object("__delattr__", &receiver)?;
            let name = expect_name(&name)?;
            if object.dict.borrow_mut().shift_remove(&name).is_none() {
                return Err(RuntimeError::attribute_error(format!(
                    "'{}' object has no attribute '{name}'",
                    object.class.name
                )));
            }
            Ok(Value::None)
        }),
    );
    members.insert(
        "__repr__".to_string(),
        native("__repr__", |_rt, args| {
            let [receiver] = take_args("__repr__", args)?;
            Ok(Value::str(format!("<{} object>", receiver.type_name())))
        }),
    );
    members.insert(
        "__str__".to_string(),
        native("__str__", |rt, args| {
            let [receiver] = take_args("__str__", args)?;
            Ok(Value::str(receiver.repr(rt)?))
        }),
    );
    members.insert(
        "__eq__".to_string(),
        native("__eq__", |_rt, args| {
            let [receiver, other] = take_args("__eq__", args)?;
            Ok(Value::Bool(receiver.same(&other)))
        }),
    );
    members.insert(
        "__ne__".to_string(),
        native("__ne__", |rt, args| {
            let [receiver, other] = take_args("__ne__", args)?;
            let equal = receiver.get_attr(rt, "__eq__")?.call(rt, vec![other])?;
            Ok(Value::Bool(!equal.truthy(rt)?))
        }),
    );
    members.insert(
        "__bool__".to_string(),
        native("__bool__", |rt, args| {
            let [receiver] = take_args("__bool__", args)?;
            let object = expect_object("__bool__", &receiver)?;
            if object.class.has_member("__len__") {
                return Ok(Value::Bool(receiver.len(rt)? != 0));
            }
            Ok(Value::Bool(true))
        }),
    );

    Class::new("object", Rc::from("builtins"), Vec::new(), members)
}
