//! Per-interpreter execution bookkeeping: the current source line, call depth,
//! the stack of executing modules and the frames collected while an error
//! unwinds.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Globals;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub routine: String,
    pub line: usize,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}, line {}", self.routine, self.line)
    }
}

pub struct ExecutionState {
    line: Cell<usize>,
    depth: Cell<usize>,
    max_depth: usize,
    trace: RefCell<Vec<TraceFrame>>,
    modules: RefCell<Vec<(Rc<str>, Globals)>>,
    /// Identities of containers whose repr is being built.
    reprs: RefCell<FxHashSet<usize>>,
}

impl ExecutionState {
    pub fn new(max_depth: usize) -> Self {
        Self {
            line: Cell::new(0),
            depth: Cell::new(0),
            max_depth,
            trace: RefCell::new(Vec::new()),
            modules: RefCell::new(Vec::new()),
            reprs: RefCell::new(FxHashSet::default()),
        }
    }

    pub fn line(&self) -> usize {
        self.line.get()
    }

    pub fn set_line(&self, line: usize) {
        self.line.set(line);
    }

    /// Enters a routine. The guard restores the caller's line and depth.
    pub fn enter_call(&self) -> RuntimeResult<CallGuard<'_>> {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(RuntimeError::Recursion(self.max_depth));
        }
        self.depth.set(depth + 1);
        Ok(CallGuard {
            state: self,
            line: self.line.get(),
        })
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Notes that `routine` is unwinding at the current line.
    pub fn record_frame(&self, routine: &str) {
        self.trace.borrow_mut().push(TraceFrame {
            routine: routine.to_string(),
            line: self.line.get(),
        });
    }

    pub fn trace_mark(&self) -> usize {
        self.trace.borrow().len()
    }

    /// Forgets frames recorded by an error that was handled after `mark`.
    pub fn truncate_trace(&self, mark: usize) {
        self.trace.borrow_mut().truncate(mark);
    }

    pub fn take_trace(&self) -> Vec<TraceFrame> {
        std::mem::take(&mut *self.trace.borrow_mut())
    }

    pub fn enter_module(&self, name: Rc<str>, globals: Globals) -> ModuleGuard<'_> {
        self.modules.borrow_mut().push((name, globals));
        ModuleGuard { state: self }
    }

    pub fn current_module(&self) -> Option<Rc<str>> {
        self.modules.borrow().last().map(|(name, _)| name.clone())
    }

    /// Namespace of the innermost module being executed.
    pub fn current_globals(&self) -> Option<Globals> {
        self.modules.borrow().last().map(|(_, globals)| globals.clone())
    }

    pub fn module_depth(&self) -> usize {
        self.modules.borrow().len()
    }

    /// Marks the container `identity` as being rendered. `None` when it
    /// already is, i.e. the container holds itself.
    pub fn enter_repr(&self, identity: usize) -> Option<ReprGuard<'_>> {
        let fresh = self.reprs.borrow_mut().insert(identity);
        fresh.then(|| ReprGuard { state: self, identity })
    }
}

pub struct ReprGuard<'a> {
    state: &'a ExecutionState,
    identity: usize,
}

impl Drop for ReprGuard<'_> {
    fn drop(&mut self) {
        self.state.reprs.borrow_mut().remove(&self.identity);
    }
}

pub struct CallGuard<'a> {
    state: &'a ExecutionState,
    line: usize,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.state.depth.set(self.state.depth.get().saturating_sub(1));
        self.state.line.set(self.line);
    }
}

pub struct ModuleGuard<'a> {
    state: &'a ExecutionState,
}

impl Drop for ModuleGuard<'_> {
    fn drop(&mut self) {
        self.state.modules.borrow_mut().pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn call_guard_restores_line_and_depth() {
        let state = ExecutionState::new(8);
        state.set_line(3);
        {
            let _guard = state.enter_call().expect("enter");
            state.set_line(10);
            assert_eq!(state.depth(), 1);
        }
        assert_eq!(state.line(), 3);
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn depth_limit_is_enforced() {
        let state = ExecutionState::new(2);
        let _a = state.enter_call().expect("first");
        let _b = state.enter_call().expect("second");
        assert_eq!(state.enter_call().err(), Some(RuntimeError::Recursion(2)));
    }

    #[test]
    fn module_stack_pops_on_drop() {
        let state = ExecutionState::new(8);
        {
            let _main = state.enter_module(Rc::from("main"), Globals::default());
            let _nested = state.enter_module(Rc::from("util"), Globals::default());
            assert_eq!(state.current_module().as_deref(), Some("util"));
            assert_eq!(state.module_depth(), 2);
        }
        assert_eq!(state.current_module(), None);
        assert_eq!(state.module_depth(), 0);
    }

    #[test]
    fn repr_guard_rejects_reentry_until_dropped() {
        let state = ExecutionState::new(8);
        {
            let _outer = state.enter_repr(7).expect("first entry");
            assert!(state.enter_repr(7).is_none());
            assert!(state.enter_repr(8).is_some());
        }
        assert!(state.enter_repr(7).is_some());
    }

    #[test]
    fn trace_can_be_truncated_to_a_mark() {
        let state = ExecutionState::new(8);
        state.set_line(4);
        state.record_frame("outer");
        let mark = state.trace_mark();
        state.record_frame("inner");
        state.truncate_trace(mark);
        assert_eq!(
            state.take_trace(),
            vec![TraceFrame {
                routine: "outer".into(),
                line: 4
            }]
        );
    }
}
