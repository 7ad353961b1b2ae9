//! Insertion-ordered mappings and sets keyed by `HashKey`.
//!
//! Keys are normalized before hashing so that values Python treats as equal
//! land on the same entry: `True`, `1` and `1.0` share a key. Containers that
//! can change (`list`, `dict`, `set`) are rejected, and script objects hash by
//! identity.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::host::TypeKey;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    /// Bit pattern of a float with a fractional part.
    Float(u64),
    Str(Rc<str>),
    Tuple(Rc<[HashKey]>),
    Type(TypeKey),
    Identity(usize),
}

impl HashKey {
    pub fn from_value(value: &Value) -> RuntimeResult<Self> {
        Ok(match value {
            Value::None => Self::None,
            Value::Bool(flag) => Self::Int(i64::from(*flag)),
            Value::Int(number) => Self::Int(*number),
            Value::Float(number) => {
                if number.fract() == 0.0 && number.abs() < 9.2e18 {
                    Self::Int(*number as i64)
                } else {
                    Self::Float(number.to_bits())
                }
            }
            Value::Str(text) => Self::Str(text.clone()),
            Value::Tuple(items) => Self::Tuple(
                items
                    .iter()
                    .map(Self::from_value)
                    .collect::<RuntimeResult<Vec<_>>>()?
                    .into(),
            ),
            Value::Type(ty) => Self::Type(ty.key().clone()),
            Value::List(_) | Value::Dict(_) | Value::Set(_) => {
                return Err(RuntimeError::type_error(format!(
                    "unhashable type: '{}'",
                    value.type_name()
                )));
            }
            other => Self::Identity(other.identity()),
        })
    }
}

/// Mapping from keys to values; each entry keeps the key value it was first
/// inserted with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: IndexMap<HashKey, (Value, Value)>,
}

pub type ValueSet = IndexMap<HashKey, Value>;

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: Value, value: Value) -> RuntimeResult<()> {
        let hash = HashKey::from_value(&key)?;
        match self.entries.get_mut(&hash) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(hash, (key, value));
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &Value) -> RuntimeResult<Option<Value>> {
        let hash = HashKey::from_value(key)?;
        Ok(self.entries.get(&hash).map(|(_, value)| value.clone()))
    }

    pub fn contains(&self, key: &Value) -> RuntimeResult<bool> {
        Ok(self.entries.contains_key(&HashKey::from_value(key)?))
    }

    pub fn remove(&mut self, key: &Value) -> RuntimeResult<Option<Value>> {
        let hash = HashKey::from_value(key)?;
        Ok(self.entries.shift_remove(&hash).map(|(_, value)| value))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.values().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values().map(|(_, value)| value)
    }

    pub fn items(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(key, value)| (key, value))
    }
}

pub(crate) fn set_from_values(values: impl IntoIterator<Item = Value>) -> RuntimeResult<ValueSet> {
    let mut set = ValueSet::new();
    for value in values {
        set.insert(HashKey::from_value(&value)?, value);
    }
    Ok(set)
}

pub(crate) fn set_contains(set: &ValueSet, value: &Value) -> RuntimeResult<bool> {
    Ok(set.contains_key(&HashKey::from_value(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numerically_equal_keys_alias() {
        let mut dict = Dict::new();
        dict.insert(Value::Int(1), Value::str("int")).expect("insert");
        dict.insert(Value::Bool(true), Value::str("bool")).expect("insert");
        dict.insert(Value::Float(1.0), Value::str("float")).expect("insert");
        assert_eq!(dict.len(), 1);
        assert_eq!(
            dict.get(&Value::Int(1)).expect("lookup"),
            Some(Value::str("float"))
        );
        let keys: Vec<_> = dict.keys().cloned().collect();
        assert_eq!(keys, vec![Value::Int(1)]);
    }

    #[test]
    fn removal_preserves_insertion_order() {
        let mut dict = Dict::new();
        for (index, name) in ["a", "b", "c"].into_iter().enumerate() {
            dict.insert(Value::str(name), Value::Int(index as i64))
                .expect("insert");
        }
        assert_eq!(
            dict.remove(&Value::str("b")).expect("remove"),
            Some(Value::Int(1))
        );
        let keys: Vec<_> = dict.keys().cloned().collect();
        assert_eq!(keys, vec![Value::str("a"), Value::str("c")]);
    }

    #[test]
    fn mutable_containers_are_unhashable() {
        let error = HashKey::from_value(&Value::list(vec![])).expect_err("unhashable");
        assert_eq!(
            error,
            RuntimeError::Type("unhashable type: 'list'".into())
        );
        let nested = Value::tuple(vec![Value::Int(1), Value::list(vec![])]);
        assert!(HashKey::from_value(&nested).is_err());
    }

    #[test]
    fn sets_deduplicate() {
        let set = set_from_values([Value::Int(2), Value::Float(2.0), Value::str("x")])
            .expect("hashable");
        assert_eq!(set.len(), 2);
        assert!(set_contains(&set, &Value::str("x")).expect("hashable"));
    }
}
