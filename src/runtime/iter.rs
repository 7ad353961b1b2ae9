//! Iteration over script values.
//!
//! `ValueIter` is the cursor every loop, unpacking and builtin drives. Lists
//! are walked by index so appends made while looping are observed. A
//! `Generator` only describes a lazy transform of a source iterable; each
//! iteration starts a fresh cursor, which makes comprehension adapters
//! restartable.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::interpreter::Interpreter;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::{Range, Value};

/// Per-element transform of a generator; `None` skips the element.
pub type GeneratorStep = Rc<dyn Fn(&Interpreter, Value) -> RuntimeResult<Option<Value>>>;

pub struct Generator {
    source: Value,
    step: GeneratorStep,
}

impl Generator {
    pub fn new(
        source: Value,
        step: impl Fn(&Interpreter, Value) -> RuntimeResult<Option<Value>> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            source,
            step: Rc::new(step),
        })
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator").field("source", &self.source).finish()
    }
}

pub enum ValueIter {
    List(Rc<RefCell<Vec<Value>>>, usize),
    Tuple(Rc<[Value]>, usize),
    Owned(std::vec::IntoIter<Value>),
    Range(Range, usize),
    Map {
        inner: Box<ValueIter>,
        step: GeneratorStep,
    },
    /// Script object driven through `__next__`.
    Protocol(Value),
    Shared(Rc<RefCell<ValueIter>>),
}

impl ValueIter {
    pub fn next(&mut self, rt: &Interpreter) -> RuntimeResult<Option<Value>> {
        match self {
            Self::List(items, index) => {
                let item = items.borrow().get(*index).cloned();
                *index += 1;
                Ok(item)
            }
            Self::Tuple(items, index) => {
                let item = items.get(*index).cloned();
                *index += 1;
                Ok(item)
            }
            Self::Owned(items) => Ok(items.next()),
            Self::Range(range, index) => {
                let item = range.get(*index).map(Value::Int);
                *index += 1;
                Ok(item)
            }
            Self::Map { inner, step } => {
                while let Some(item) = inner.next(rt)? {
                    if let Some(mapped) = step(rt, item)? {
                        return Ok(Some(mapped));
                    }
                }
                Ok(None)
            }
            Self::Protocol(receiver) => {
                let mark = rt.state().trace_mark();
                let advance = receiver.get_attr(rt, "__next__")?;
                match advance.call(rt, Vec::new()) {
                    Ok(item) => Ok(Some(item)),
                    Err(RuntimeError::Raised(raised)) if raised.is_stop_iteration() => {
                        rt.state().truncate_trace(mark);
                        Ok(None)
                    }
                    Err(error) => Err(error),
                }
            }
            Self::Shared(shared) => {
                let mut cursor = shared
                    .try_borrow_mut()
                    .map_err(|_| RuntimeError::value_error("iterator already executing"))?;
                cursor.next(rt)
            }
        }
    }

    pub fn collect(mut self, rt: &Interpreter) -> RuntimeResult<Vec<Value>> {
        let mut items = Vec::new();
        while let Some(item) = self.next(rt)? {
            items.push(item);
        }
        Ok(items)
    }
}

impl Value {
    /// Starts a cursor over this value.
    pub fn iter(&self, rt: &Interpreter) -> RuntimeResult<ValueIter> {
        Ok(match self {
            Value::List(items) => ValueIter::List(items.clone(), 0),
            Value::Tuple(items) => ValueIter::Tuple(items.clone(), 0),
            Value::Str(text) => ValueIter::Owned(
                text.chars()
                    .map(|ch| Value::str(ch.to_string()))
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            Value::Dict(dict) => ValueIter::Owned(dict.borrow().keys().cloned().collect::<Vec<_>>().into_iter()),
            Value::Set(set) => ValueIter::Owned(set.borrow().values().cloned().collect::<Vec<_>>().into_iter()),
            Value::Range(range) => ValueIter::Range(*range, 0),
            Value::Generator(generator) => ValueIter::Map {
                inner: Box::new(generator.source.iter(rt)?),
                step: generator.step.clone(),
            },
            Value::Iterator(shared) => ValueIter::Shared(shared.clone()),
            Value::Object(object) if object.class.has_member("__iter__") => {
                let iterator = self.get_attr(rt, "__iter__")?.call(rt, Vec::new())?;
                match &iterator {
                    Value::Object(inner) if inner.class.has_member("__next__") => ValueIter::Protocol(iterator),
                    Value::Object(_) => {
                        return Err(RuntimeError::type_error(format!(
                            "iter() returned non-iterator of type '{}'",
                            iterator.type_name()
                        )));
                    }
                    other => other.iter(rt)?,
                }
            }
            Value::Object(object) if object.class.has_member("__next__") => ValueIter::Protocol(self.clone()),
            other => {
                if let Some(extension) = rt.extensions().lookup(&other.type_key(), "__iter__") {
                    let produced = extension.call(rt, vec![other.clone()])?;
                    return produced.iter(rt);
                }
                return Err(RuntimeError::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )));
            }
        })
    }

    /// Drains this value into a vector.
    pub fn to_vec(&self, rt: &Interpreter) -> RuntimeResult<Vec<Value>> {
        match self {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.to_vec()),
            other => other.iter(rt)?.collect(rt),
        }
    }

    /// Wraps a cursor over this value as a first-class iterator.
    pub fn make_iterator(&self, rt: &Interpreter) -> RuntimeResult<Value> {
        match self {
            Value::Iterator(_) => Ok(self.clone()),
            Value::Object(object) if object.class.has_member("__next__") => Ok(self.clone()),
            other => Ok(Value::Iterator(Rc::new(RefCell::new(other.iter(rt)?)))),
        }
    }
}
