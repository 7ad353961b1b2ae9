//! Host introspection capability.
//!
//! Every value kind the runtime does not define in script code is described
//! by a [`HostTypeDef`]: the builtin value types, the native
//! `StringBuilder`, and whatever an embedder registers. The registry is the
//! only place compiled code and the dispatch protocol learn about host
//! members from.

pub mod std_types;
pub mod string_builder;
pub mod types;

use std::cell::RefCell;

use indexmap::IndexMap;
use log::debug;

pub use self::types::{
    Fit, HostMethod, HostParam, HostProperty, HostType, HostTypeDef, NativeObject, StaticType, TypeKey,
    resolve_overload,
};
use crate::runtime::value::Value;

#[derive(Default)]
pub struct TypeRegistry {
    types: RefCell<IndexMap<TypeKey, HostType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the builtin value types and `StringBuilder`.
    pub fn with_std() -> Self {
        let registry = Self::new();
        for def in std_types::definitions() {
            registry.register(def);
        }
        registry.register(string_builder::definition());
        registry
    }

    pub fn register(&self, def: HostTypeDef) -> HostType {
        let ty = HostType::new(def);
        debug!("registered host type {}", ty.name());
        self.types.borrow_mut().insert(ty.key().clone(), ty.clone());
        ty
    }

    pub fn get(&self, key: &TypeKey) -> Option<HostType> {
        self.types.borrow().get(key).cloned()
    }

    pub fn by_name(&self, name: &str) -> Option<HostType> {
        self.types
            .borrow()
            .values()
            .find(|ty| ty.name() == name)
            .cloned()
    }

    /// Member table describing `value`, if it is a host value.
    pub fn type_of(&self, value: &Value) -> Option<HostType> {
        match value {
            Value::Native(native) => Some(native.host_type().clone()),
            Value::Object(_) | Value::Class(_) => None,
            other => self.get(&other.type_key()),
        }
    }

    /// Table for a compile-time type, if it has one.
    pub fn for_static(&self, ty: &StaticType) -> Option<HostType> {
        self.get(&ty.key()?)
    }

    pub fn all(&self) -> Vec<HostType> {
        self.types.borrow().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_registry_describes_builtin_values() {
        let registry = TypeRegistry::with_std();
        let ty = registry.type_of(&Value::str("x")).expect("str is described");
        assert_eq!(ty.name(), "str");
        assert!(ty.has_method("upper"));
        assert!(registry.by_name("StringBuilder").is_some());
        assert!(registry.type_of(&Value::None).is_none());
    }

    #[test]
    fn registering_adds_an_embedder_type() {
        let registry = TypeRegistry::new();
        let ty = registry.register(HostTypeDef::new("Point"));
        assert_eq!(registry.get(ty.key()), Some(ty.clone()));
        assert_eq!(registry.for_static(&StaticType::Host(ty.key().clone())), Some(ty));
    }
}
