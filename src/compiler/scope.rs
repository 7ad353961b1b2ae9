//! Lexical scopes of the code generator.
//!
//! Every function, lambda, comprehension and class body gets a `Scope`. A
//! pre-pass over its body decides which names are local; the rest resolve
//! outward, through intermediate scopes, to a captured cell or to the
//! module globals. Class bodies keep their bindings to themselves: nested
//! functions skip them, except for the hidden `__class__` cell used by
//! `super()`.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{Statement, StatementKind, Target};
use crate::host::StaticType;

pub(crate) const CLASS_CELL: &str = "__class__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Module,
    Function,
    Class,
}

/// Where a name lives, seen from one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    Local(usize),
    Capture(usize),
    Global,
}

/// How a scope's captured cell is obtained from its parent's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CaptureSource {
    Local(usize),
    Capture(usize),
}

#[derive(Debug)]
pub(crate) struct Scope {
    pub kind: ScopeKind,
    pub qualname: String,
    pub locals: IndexMap<String, usize>,
    pub globals: FxHashSet<String>,
    pub nonlocals: FxHashSet<String>,
    pub captures: Vec<CaptureSource>,
    capture_names: FxHashMap<String, usize>,
    pub loop_depth: usize,
    /// Set for functions compiled in typed mode.
    pub typed: bool,
    pub types: FxHashMap<usize, StaticType>,
    pub returns: Option<StaticType>,
    /// Slot of the first parameter, the receiver for `super()`.
    pub first_param: Option<usize>,
}

impl Scope {
    pub fn new(kind: ScopeKind, qualname: impl Into<String>) -> Self {
        Self {
            kind,
            qualname: qualname.into(),
            locals: IndexMap::new(),
            globals: FxHashSet::default(),
            nonlocals: FxHashSet::default(),
            captures: Vec::new(),
            capture_names: FxHashMap::default(),
            loop_depth: 0,
            typed: false,
            types: FxHashMap::default(),
            returns: None,
            first_param: None,
        }
    }

    /// Slot for `name`, allocating one if needed.
    pub fn declare(&mut self, name: &str) -> usize {
        let next = self.locals.len();
        *self.locals.entry(name.to_string()).or_insert(next)
    }

    pub fn slot_count(&self) -> usize {
        self.locals.len()
    }

    pub fn static_type(&self, slot: usize) -> StaticType {
        self.types.get(&slot).cloned().unwrap_or(StaticType::Dynamic)
    }

    /// Names this scope binds by assignment, in the order they appear.
    pub fn declare_assigned(&mut self, body: &[Statement]) {
        let mut names = Vec::new();
        collect_statements(body, &mut names, &mut self.globals, &mut self.nonlocals);
        for name in names {
            if !self.globals.contains(&name) && !self.nonlocals.contains(&name) {
                self.declare(&name);
            }
        }
    }
}

/// The scope stack of one compilation.
#[derive(Debug, Default)]
pub(crate) struct Scopes {
    stack: Vec<Scope>,
}

impl Scopes {
    pub fn push(&mut self, scope: Scope) {
        self.stack.push(scope);
    }

    pub fn pop(&mut self) -> Option<Scope> {
        self.stack.pop()
    }

    pub fn current(&self) -> &Scope {
        &self.stack[self.stack.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut Scope {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// Resolves `name` as seen from the innermost scope.
    pub fn resolve(&mut self, name: &str) -> Binding {
        let index = self.stack.len() - 1;
        self.lookup(index, name, true).unwrap_or(Binding::Global)
    }

    /// Like `resolve`, but `None` when the name would fall through to the
    /// module globals.
    pub fn resolve_enclosing(&mut self, name: &str) -> Option<Binding> {
        let index = self.stack.len() - 1;
        self.lookup(index, name, true)
    }

    fn lookup(&mut self, index: usize, name: &str, innermost: bool) -> Option<Binding> {
        let scope = &self.stack[index];
        if scope.kind == ScopeKind::Module || scope.globals.contains(name) {
            return None;
        }
        let visible = innermost || scope.kind != ScopeKind::Class || name == CLASS_CELL;
        if visible && let Some(&slot) = scope.locals.get(name) {
            return Some(Binding::Local(slot));
        }
        if let Some(&capture) = scope.capture_names.get(name) {
            return Some(Binding::Capture(capture));
        }
        if index == 0 {
            return None;
        }
        let source = match self.lookup(index - 1, name, false)? {
            Binding::Local(slot) => CaptureSource::Local(slot),
            Binding::Capture(capture) => CaptureSource::Capture(capture),
            Binding::Global => return None,
        };
        let scope = &mut self.stack[index];
        let capture = scope.captures.len();
        scope.captures.push(source);
        scope.capture_names.insert(name.to_string(), capture);
        Some(Binding::Capture(capture))
    }

    /// Qualified name for a routine defined in the current scope.
    pub fn child_qualname(&self, name: &str) -> String {
        let parent = self.current();
        match parent.kind {
            ScopeKind::Module => name.to_string(),
            ScopeKind::Class => format!("{}.{name}", parent.qualname),
            ScopeKind::Function => format!("{}.<locals>.{name}", parent.qualname),
        }
    }
}

fn collect_target(target: &Target, names: &mut Vec<String>) {
    match target {
        Target::Name(name) => names.push(name.clone()),
        Target::Tuple(items) => items.iter().for_each(|item| collect_target(item, names)),
        Target::Attribute { .. } | Target::Index { .. } => {}
    }
}

fn collect_statements(
    body: &[Statement],
    names: &mut Vec<String>,
    globals: &mut FxHashSet<String>,
    nonlocals: &mut FxHashSet<String>,
) {
    for statement in body {
        match &statement.kind {
            StatementKind::Assign { targets, .. } => {
                targets.iter().for_each(|target| collect_target(target, names));
            }
            StatementKind::AugAssign { target, .. } => collect_target(target, names),
            StatementKind::For { target, body, .. } => {
                collect_target(target, names);
                collect_statements(body, names, globals, nonlocals);
            }
            StatementKind::While { body, .. } => collect_statements(body, names, globals, nonlocals),
            StatementKind::If { branches, orelse } => {
                for (_, branch) in branches {
                    collect_statements(branch, names, globals, nonlocals);
                }
                collect_statements(orelse, names, globals, nonlocals);
            }
            StatementKind::FunctionDef(def) => names.push(def.name.clone()),
            StatementKind::ClassDef(def) => names.push(def.name.clone()),
            StatementKind::Del(targets) => targets.iter().for_each(|target| collect_target(target, names)),
            StatementKind::Global(declared) => globals.extend(declared.iter().cloned()),
            StatementKind::Nonlocal(declared) => nonlocals.extend(declared.iter().cloned()),
            StatementKind::Import { path } => {
                if let Some(last) = path.rsplit('.').next() {
                    names.push(last.to_string());
                }
            }
            StatementKind::FromImport { names: imported, .. } => names.extend(imported.iter().cloned()),
            StatementKind::Expression(_)
            | StatementKind::Return(_)
            | StatementKind::Break
            | StatementKind::Continue
            | StatementKind::Pass
            | StatementKind::Raise(_)
            | StatementKind::Assert { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn body(source: &str) -> Vec<Statement> {
        parse(source).expect("parse").body
    }

    #[test]
    fn assigned_names_become_locals_in_order() {
        let mut scope = Scope::new(ScopeKind::Function, "f");
        scope.declare("a");
        scope.declare_assigned(&body(indoc! {"
            x = 1
            for i, (j, k) in pairs:
                y = i
            def inner():
                z = 2
            import os.path
            from m import p, q
        "}));
        let names: Vec<&str> = scope.locals.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "x", "i", "j", "k", "y", "inner", "path", "p", "q"]);
    }

    #[test]
    fn global_and_nonlocal_declarations_are_not_locals() {
        let mut scope = Scope::new(ScopeKind::Function, "f");
        scope.declare_assigned(&body(indoc! {"
            global counter
            nonlocal total
            counter = 1
            total = 2
            other = 3
        "}));
        assert_eq!(scope.locals.keys().collect::<Vec<_>>(), vec!["other"]);
        assert!(scope.globals.contains("counter"));
        assert!(scope.nonlocals.contains("total"));
    }

    #[test]
    fn captures_thread_through_intermediate_scopes() {
        let mut scopes = Scopes::default();
        scopes.push(Scope::new(ScopeKind::Module, "<module>"));
        let mut outer = Scope::new(ScopeKind::Function, "outer");
        outer.declare("x");
        scopes.push(outer);
        scopes.push(Scope::new(ScopeKind::Function, "outer.<locals>.middle"));
        scopes.push(Scope::new(ScopeKind::Function, "outer.<locals>.middle.<locals>.inner"));

        assert_eq!(scopes.resolve("x"), Binding::Capture(0));
        assert_eq!(scopes.resolve("print"), Binding::Global);

        let inner = scopes.pop().expect("inner");
        assert_eq!(inner.captures, vec![CaptureSource::Capture(0)]);
        let middle = scopes.pop().expect("middle");
        assert_eq!(middle.captures, vec![CaptureSource::Local(0)]);
    }

    #[test]
    fn class_bodies_are_skipped_except_for_the_class_cell() {
        let mut scopes = Scopes::default();
        scopes.push(Scope::new(ScopeKind::Module, "<module>"));
        let mut class = Scope::new(ScopeKind::Class, "C");
        class.declare(CLASS_CELL);
        class.declare("attr");
        scopes.push(class);
        scopes.push(Scope::new(ScopeKind::Function, "C.method"));

        assert_eq!(scopes.resolve("attr"), Binding::Global);
        assert_eq!(scopes.resolve(CLASS_CELL), Binding::Capture(0));
    }
}
