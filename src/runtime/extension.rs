use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::host::TypeKey;
use crate::runtime::callable::Function;

/// Script-visible members attached to host types, keyed by type and name.
#[derive(Default)]
pub struct ExtensionTable {
    entries: RefCell<FxHashMap<(TypeKey, String), Rc<Function>>>,
}

impl ExtensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: TypeKey, name: impl Into<String>, function: Rc<Function>) {
        let name = name.into();
        debug!("extension {key}.{name} -> {}", function.qualname);
        self.entries.borrow_mut().insert((key, name), function);
    }

    pub fn lookup(&self, key: &TypeKey, name: &str) -> Option<Rc<Function>> {
        self.entries
            .borrow()
            .get(&(key.clone(), name.to_string()))
            .cloned()
    }

    pub fn contains(&self, key: &TypeKey, name: &str) -> bool {
        self.lookup(key, name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::Value;

    #[test]
    fn lookup_is_keyed_by_type_and_name() {
        let table = ExtensionTable::new();
        let shout = Rc::new(Function::native("shout", |_, _| Ok(Value::None)));
        table.register(TypeKey::builtin("str"), "shout", shout.clone());

        let found = table.lookup(&TypeKey::builtin("str"), "shout").expect("registered");
        assert!(Rc::ptr_eq(&found, &shout));
        assert!(!table.contains(&TypeKey::builtin("list"), "shout"));
        assert!(!table.contains(&TypeKey::builtin("str"), "whisper"));
    }
}
