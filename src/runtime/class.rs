use std::cell::RefCell;
use std::fmt;
use std::ptr;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::interpreter::Interpreter;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Value;

/// A script class. Its member table already contains every inherited
/// member: bases are merged once, at construction.
pub struct Class {
    pub name: String,
    pub module: Rc<str>,
    pub bases: Vec<Rc<Class>>,
    members: RefCell<IndexMap<String, Value>>,
}

impl Class {
    /// Builds a class from its own body bindings. Base members are copied in
    /// declaration order and only where the name is still free, so the class
    /// itself wins over its bases and earlier bases win over later ones.
    pub fn new(
        name: impl Into<String>,
        module: Rc<str>,
        bases: Vec<Rc<Class>>,
        own: IndexMap<String, Value>,
    ) -> Rc<Self> {
        let name = name.into();
        let mut members = own;
        for base in &bases {
            for (member, value) in base.members.borrow().iter() {
                if !members.contains_key(member) {
                    members.insert(member.clone(), value.clone());
                }
            }
        }
        members.insert("__name__".into(), Value::str(&name));
        members.insert("__module__".into(), Value::Str(module.clone()));
        members.insert(
            "__bases__".into(),
            Value::tuple(bases.iter().cloned().map(Value::Class).collect()),
        );
        Rc::new(Self {
            name,
            module,
            bases,
            members: RefCell::new(members),
        })
    }

    /// Like `new`, defaulting to the root `object` class when no base is given.
    pub fn define(
        rt: &Interpreter,
        name: impl Into<String>,
        module: Rc<str>,
        mut bases: Vec<Rc<Class>>,
        own: IndexMap<String, Value>,
    ) -> Rc<Self> {
        if bases.is_empty() {
            bases.push(rt.object_class());
        }
        Self::new(name, module, bases, own)
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.members.borrow().get(name).cloned()
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.members.borrow().contains_key(name)
    }

    pub fn set_member(&self, name: impl Into<String>, value: Value) {
        self.members.borrow_mut().insert(name.into(), value);
    }

    pub fn remove_member(&self, name: &str) -> Option<Value> {
        self.members.borrow_mut().shift_remove(name)
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members.borrow().keys().cloned().collect()
    }

    pub fn is_subclass_of(&self, other: &Class) -> bool {
        ptr::eq(self, other) || self.bases.iter().any(|base| base.is_subclass_of(other))
    }

    /// This class and every ancestor, depth first, without repeats.
    pub fn lineage(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        for base in &self.bases {
            for name in base.lineage() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// `Class(...)`: `__new__` receives the class, and `__init__` runs only
    /// when `__new__` produced a fresh instance of exactly this class.
    pub fn instantiate(self: &Rc<Self>, rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
        let constructor = self.lookup("__new__").ok_or_else(|| {
            RuntimeError::type_error(format!("cannot create '{}' instances", self.name))
        })?;
        let mut new_args = Vec::with_capacity(args.len() + 1);
        new_args.push(Value::Class(self.clone()));
        new_args.extend(args.iter().cloned());
        let instance = constructor.call(rt, new_args)?;

        if let Value::Object(object) = &instance
            && Rc::ptr_eq(&object.class, self)
            && let Some(initializer) = self.lookup("__init__")
        {
            let mut init_args = Vec::with_capacity(args.len() + 1);
            init_args.push(instance.clone());
            init_args.extend(args);
            initializer.call(rt, init_args)?;
        }
        Ok(instance)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("members", &self.member_names())
            .finish()
    }
}

/// `super()`: looks members up past `class`, binding them to `receiver`.
#[derive(Debug)]
pub struct SuperRef {
    pub class: Rc<Class>,
    pub receiver: Value,
}

impl SuperRef {
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.class.bases.iter().find_map(|base| base.lookup(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn class(name: &str, bases: Vec<Rc<Class>>, members: &[(&str, i64)]) -> Rc<Class> {
        let own = members
            .iter()
            .map(|(member, value)| (member.to_string(), Value::Int(*value)))
            .collect();
        Class::new(name, Rc::from("test"), bases, own)
    }

    #[test]
    fn first_base_wins_and_own_members_win_over_bases() {
        let a = class("A", vec![], &[("m", 1), ("only_a", 10)]);
        let b = class("B", vec![], &[("m", 2), ("only_b", 20)]);
        let c = class("C", vec![a.clone(), b.clone()], &[]);
        assert_eq!(c.lookup("m"), Some(Value::Int(1)));
        assert_eq!(c.lookup("only_b"), Some(Value::Int(20)));

        let d = class("D", vec![a, b], &[("m", 3)]);
        assert_eq!(d.lookup("m"), Some(Value::Int(3)));
        assert_eq!(d.lookup("__name__"), Some(Value::str("D")));
    }

    #[test]
    fn subclass_and_lineage_follow_bases() {
        let base = class("Base", vec![], &[]);
        let middle = class("Middle", vec![base.clone()], &[]);
        let leaf = class("Leaf", vec![middle.clone(), base.clone()], &[]);
        assert!(leaf.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&leaf));
        assert_eq!(leaf.lineage(), vec!["Leaf", "Middle", "Base"]);
    }
}
