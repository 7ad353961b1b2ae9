//! Code generator: turns a syntax tree into a tree of closures.
//!
//! Every expression becomes an [`Eval`] and every statement an [`Exec`];
//! both run against a [`Frame`] holding the routine's local cells. Names are
//! resolved once, here, to a slot, a captured cell or a module global.
//! Functions with annotations compile in typed mode (see `typed`), everything
//! else goes through the runtime dispatch protocol.

mod error;
mod expr;
mod function;
mod scope;
mod typed;

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

pub use self::error::{CompileError, CompileResult};
use self::scope::{Binding, CaptureSource, Scope, ScopeKind, Scopes};
use crate::ast::{BinaryOperator, Expression, Program, Statement, StatementKind, Target};
use crate::host::StaticType;
use crate::interpreter::{Interpreter, Module};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::exception::{self, RaisedException};
use crate::runtime::ops;
use crate::runtime::value::{Globals, Value};

/// Storage of one local variable. Shared with closures that capture it.
pub(crate) type Cell = Rc<RefCell<Option<Value>>>;

pub(crate) struct Frame<'rt> {
    pub rt: &'rt Interpreter,
    pub slots: Vec<Cell>,
    pub captures: Rc<[Cell]>,
}

impl<'rt> Frame<'rt> {
    pub fn new(rt: &'rt Interpreter, slot_count: usize, captures: Rc<[Cell]>) -> Self {
        Self {
            rt,
            slots: (0..slot_count).map(|_| Rc::new(RefCell::new(None))).collect(),
            captures,
        }
    }

    fn cell(&self, at: CellRef) -> &Cell {
        match at {
            CellRef::Local(slot) => &self.slots[slot],
            CellRef::Capture(index) => &self.captures[index],
        }
    }

    /// Cells handed to a routine created in this frame.
    pub fn capture_cells(&self, sources: &[CaptureSource]) -> Rc<[Cell]> {
        sources
            .iter()
            .map(|source| match *source {
                CaptureSource::Local(slot) => self.slots[slot].clone(),
                CaptureSource::Capture(index) => self.captures[index].clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum CellRef {
    Local(usize),
    Capture(usize),
}

fn cell_ref(binding: Binding) -> Option<CellRef> {
    match binding {
        Binding::Local(slot) => Some(CellRef::Local(slot)),
        Binding::Capture(index) => Some(CellRef::Capture(index)),
        Binding::Global => None,
    }
}

pub(crate) type Eval = Rc<dyn Fn(&Frame<'_>) -> RuntimeResult<Value>>;
pub(crate) type Exec = Rc<dyn Fn(&Frame<'_>) -> RuntimeResult<Flow>>;
pub(crate) type Store = Rc<dyn Fn(&Frame<'_>, Value) -> RuntimeResult<()>>;

pub(crate) enum Flow {
    Next,
    Return(Value),
    Break,
    Continue,
}

/// Top-level routine of a compiled module or snippet.
pub type ModuleCode = Rc<dyn Fn(&Interpreter) -> RuntimeResult<Value>>;

pub(crate) struct Compiler<'rt> {
    rt: &'rt Interpreter,
    module: Rc<str>,
    globals: Globals,
    scopes: Scopes,
    line: usize,
}

/// Compiles `program` against `module`'s namespace. With `interactive`, a
/// trailing expression statement becomes the routine's result.
pub fn compile_module(
    rt: &Interpreter,
    program: &Program,
    module: &Module,
    interactive: bool,
) -> CompileResult<ModuleCode> {
    let mut compiler = Compiler {
        rt,
        module: module.shared_name(),
        globals: module.globals().clone(),
        scopes: Scopes::default(),
        line: 0,
    };
    compiler.scopes.push(Scope::new(ScopeKind::Module, "<module>"));
    let mut body = Vec::with_capacity(program.body.len());
    let last = program.body.len().saturating_sub(1);
    for (index, statement) in program.body.iter().enumerate() {
        match &statement.kind {
            StatementKind::Expression(expr) if interactive && index == last => {
                compiler.line = statement.line;
                let value = compiler.expr(expr)?;
                body.push(with_line(statement.line, Rc::new(move |frame| Ok(Flow::Return(value(frame)?)))));
            }
            _ => body.push(compiler.statement(statement)?),
        }
    }
    let body = sequence(body);
    debug!("compiled module {} ({} statements)", compiler.module, program.body.len());
    Ok(Rc::new(move |rt| {
        let frame = Frame::new(rt, 0, Rc::from(Vec::new()));
        match body(&frame)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }))
}

fn sequence(statements: Vec<Exec>) -> Exec {
    match statements.len() {
        0 => Rc::new(|_| Ok(Flow::Next)),
        1 => statements[0].clone(),
        _ => {
            let statements: Rc<[Exec]> = statements.into();
            Rc::new(move |frame| {
                for statement in statements.iter() {
                    match statement(frame)? {
                        Flow::Next => {}
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Next)
            })
        }
    }
}

fn with_line(line: usize, exec: Exec) -> Exec {
    Rc::new(move |frame| {
        frame.rt.state().set_line(line);
        exec(frame)
    })
}

fn unpack_count(values: &[Value], expected: usize) -> RuntimeResult<()> {
    match values.len() {
        found if found < expected => Err(RuntimeError::value_error(format!(
            "not enough values to unpack (expected {expected}, got {found})"
        ))),
        found if found > expected => Err(RuntimeError::value_error(format!(
            "too many values to unpack (expected {expected})"
        ))),
        _ => Ok(()),
    }
}

impl<'rt> Compiler<'rt> {
    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, self.line)
    }

    fn scope(&self) -> &Scope {
        self.scopes.current()
    }

    fn scope_mut(&mut self) -> &mut Scope {
        self.scopes.current_mut()
    }

    fn block(&mut self, body: &[Statement]) -> CompileResult<Exec> {
        let statements = body
            .iter()
            .map(|statement| self.statement(statement))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(sequence(statements))
    }

    fn statement(&mut self, statement: &Statement) -> CompileResult<Exec> {
        self.line = statement.line;
        let exec = self.statement_kind(&statement.kind)?;
        Ok(with_line(statement.line, exec))
    }

    fn statement_kind(&mut self, kind: &StatementKind) -> CompileResult<Exec> {
        Ok(match kind {
            StatementKind::Expression(expr) => {
                let value = self.operand(expr)?;
                Rc::new(move |frame| {
                    value(frame)?;
                    Ok(Flow::Next)
                })
            }
            StatementKind::Assign { targets, value } => self.assign(targets, value)?,
            StatementKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            StatementKind::If { branches, orelse } => {
                let branches = branches
                    .iter()
                    .map(|(test, body)| Ok((self.condition(test)?, self.block(body)?)))
                    .collect::<CompileResult<Vec<_>>>()?;
                let orelse = self.block(orelse)?;
                Rc::new(move |frame| {
                    for (test, body) in &branches {
                        if test(frame)? {
                            return body(frame);
                        }
                    }
                    orelse(frame)
                })
            }
            StatementKind::While { condition, body } => {
                let condition = self.condition(condition)?;
                let body = self.loop_body(body)?;
                Rc::new(move |frame| {
                    while condition(frame)? {
                        match body(frame)? {
                            Flow::Break => break,
                            Flow::Return(value) => return Ok(Flow::Return(value)),
                            Flow::Next | Flow::Continue => {}
                        }
                    }
                    Ok(Flow::Next)
                })
            }
            StatementKind::For { target, iterable, body } => {
                let element_type = self.element_type(iterable);
                let source = self.operand(iterable)?;
                let store = self.target_with_type(target, element_type)?;
                let body = self.loop_body(body)?;
                Rc::new(move |frame| {
                    let mut items = source(frame)?.iter(frame.rt)?;
                    while let Some(item) = items.next(frame.rt)? {
                        store(frame, item)?;
                        match body(frame)? {
                            Flow::Break => break,
                            Flow::Return(value) => return Ok(Flow::Return(value)),
                            Flow::Next | Flow::Continue => {}
                        }
                    }
                    Ok(Flow::Next)
                })
            }
            StatementKind::FunctionDef(def) => {
                let function = self.function_def(def)?;
                let store = self.target(&Target::Name(def.name.clone()))?;
                Rc::new(move |frame| {
                    store(frame, function(frame)?)?;
                    Ok(Flow::Next)
                })
            }
            StatementKind::ClassDef(def) => {
                let class = self.class_def(def)?;
                let store = self.target(&Target::Name(def.name.clone()))?;
                Rc::new(move |frame| {
                    store(frame, class(frame)?)?;
                    Ok(Flow::Next)
                })
            }
            StatementKind::Return(value) => self.return_statement(value.as_ref())?,
            StatementKind::Break | StatementKind::Continue => {
                if self.scope().loop_depth == 0 {
                    let keyword = if matches!(kind, StatementKind::Break) { "break" } else { "continue" };
                    return Err(self.error(format!("'{keyword}' outside loop")));
                }
                if matches!(kind, StatementKind::Break) {
                    Rc::new(|_| Ok(Flow::Break))
                } else {
                    Rc::new(|_| Ok(Flow::Continue))
                }
            }
            StatementKind::Pass | StatementKind::Global(_) => Rc::new(|_| Ok(Flow::Next)),
            StatementKind::Nonlocal(names) => {
                if self.scope().kind != ScopeKind::Function {
                    return Err(self.error("nonlocal declaration not allowed at module level"));
                }
                for name in names {
                    if self.scopes.resolve_enclosing(name).is_none() {
                        return Err(self.error(format!("no binding for nonlocal '{name}' found")));
                    }
                }
                Rc::new(|_| Ok(Flow::Next))
            }
            StatementKind::Del(targets) => {
                let deletes = targets
                    .iter()
                    .map(|target| self.delete(target))
                    .collect::<CompileResult<Vec<_>>>()?;
                sequence(deletes)
            }
            StatementKind::Raise(value) => match value {
                Some(value) => {
                    let value = self.operand(value)?;
                    Rc::new(move |frame| Err(exception::raise(frame.rt, value(frame)?)))
                }
                None => Rc::new(|_| {
                    Err(RuntimeError::Raised(RaisedException::new(
                        "RuntimeError",
                        "No active exception to reraise",
                    )))
                }),
            },
            StatementKind::Assert { test, message } => {
                let test = self.condition(test)?;
                let message = message.as_ref().map(|message| self.operand(message)).transpose()?;
                Rc::new(move |frame| {
                    if test(frame)? {
                        return Ok(Flow::Next);
                    }
                    let text = match &message {
                        Some(message) => message(frame)?.to_str(frame.rt)?,
                        None => String::new(),
                    };
                    Err(exception::assertion_error(text))
                })
            }
            StatementKind::Import { path } => {
                let bound = path.rsplit('.').next().unwrap_or(path).to_string();
                let store = self.target(&Target::Name(bound))?;
                let path = path.clone();
                Rc::new(move |frame| {
                    let module = frame.rt.import(&path)?;
                    store(frame, Value::Module(module))?;
                    Ok(Flow::Next)
                })
            }
            StatementKind::FromImport { path, names } if names.is_empty() => {
                if self.scope().kind != ScopeKind::Module {
                    return Err(self.error("import * only allowed at module level"));
                }
                let path = path.clone();
                let globals = self.globals.clone();
                Rc::new(move |frame| {
                    let module = frame.rt.import(&path)?;
                    let exported: Vec<(String, Value)> = module
                        .globals()
                        .borrow()
                        .iter()
                        .filter(|(name, _)| !name.starts_with('_'))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    globals.borrow_mut().extend(exported);
                    Ok(Flow::Next)
                })
            }
            StatementKind::FromImport { path, names } => {
                let stores = names
                    .iter()
                    .map(|name| self.target(&Target::Name(name.clone())))
                    .collect::<CompileResult<Vec<_>>>()?;
                let path = path.clone();
                let names = names.clone();
                Rc::new(move |frame| {
                    let values = frame.rt.import_names(&path, &names)?;
                    for (store, value) in stores.iter().zip(values) {
                        store(frame, value)?;
                    }
                    Ok(Flow::Next)
                })
            }
        })
    }

    fn loop_body(&mut self, body: &[Statement]) -> CompileResult<Exec> {
        self.scope_mut().loop_depth += 1;
        let body = self.block(body);
        self.scope_mut().loop_depth -= 1;
        body
    }

    fn condition(&mut self, test: &Expression) -> CompileResult<Rc<dyn Fn(&Frame<'_>) -> RuntimeResult<bool>>> {
        if self.scope().typed {
            return Ok(self.typed_condition(test)?);
        }
        let test = self.expr(test)?;
        Ok(Rc::new(move |frame| test(frame)?.truthy(frame.rt)))
    }

    fn return_statement(&mut self, value: Option<&Expression>) -> CompileResult<Exec> {
        if self.scope().kind != ScopeKind::Function {
            return Err(self.error("'return' outside function"));
        }
        let value = match (value, self.scope().returns.clone()) {
            (Some(value), Some(returns)) => self.typed_value(value, &returns, "return value")?,
            (Some(value), None) => self.operand(value)?,
            (None, _) => return Ok(Rc::new(|_| Ok(Flow::Return(Value::None)))),
        };
        Ok(Rc::new(move |frame| Ok(Flow::Return(value(frame)?))))
    }

    fn assign(&mut self, targets: &[Target], value: &Expression) -> CompileResult<Exec> {
        let (value, known) = if self.scope().typed {
            let value = self.typed_expr(value)?;
            let known = value.static_type();
            (value.boxed(), known)
        } else {
            (self.expr(value)?, StaticType::Dynamic)
        };
        let mut stores = targets
            .iter()
            .map(|target| self.target_with_type(target, known.clone()))
            .collect::<CompileResult<Vec<_>>>()?;
        if stores.len() == 1 {
            let store = stores.remove(0);
            return Ok(Rc::new(move |frame| {
                store(frame, value(frame)?)?;
                Ok(Flow::Next)
            }));
        }
        Ok(Rc::new(move |frame| {
            let value = value(frame)?;
            for store in &stores {
                store(frame, value.clone())?;
            }
            Ok(Flow::Next)
        }))
    }

    fn aug_assign(&mut self, target: &Target, op: BinaryOperator, value: &Expression) -> CompileResult<Exec> {
        match target {
            Target::Name(name) if self.scope().typed => {
                let combined = Expression::Binary {
                    op,
                    left: Box::new(Expression::Name(name.clone())),
                    right: Box::new(value.clone()),
                };
                self.assign(std::slice::from_ref(target), &combined)
            }
            Target::Name(name) => {
                let current = self.name(name)?;
                let value = self.operand(value)?;
                let store = self.target(target)?;
                Ok(Rc::new(move |frame| {
                    let left = current(frame)?;
                    let right = value(frame)?;
                    store(frame, ops::inplace(frame.rt, op, &left, &right)?)?;
                    Ok(Flow::Next)
                }))
            }
            Target::Attribute { object, name } => {
                let object = self.operand(object)?;
                let value = self.operand(value)?;
                let name = name.clone();
                Ok(Rc::new(move |frame| {
                    let rt = frame.rt;
                    let object = object(frame)?;
                    let left = object.get_attr(rt, &name)?;
                    let right = value(frame)?;
                    object.set_attr(rt, &name, ops::inplace(rt, op, &left, &right)?)?;
                    Ok(Flow::Next)
                }))
            }
            Target::Index { object, index } => {
                let object = self.operand(object)?;
                let index = self.operand(index)?;
                let value = self.operand(value)?;
                Ok(Rc::new(move |frame| {
                    let rt = frame.rt;
                    let object = object(frame)?;
                    let index = index(frame)?;
                    let left = object.get_item(rt, &index)?;
                    let right = value(frame)?;
                    object.set_item(rt, &index, ops::inplace(rt, op, &left, &right)?)?;
                    Ok(Flow::Next)
                }))
            }
            Target::Tuple(_) => Err(self.error("illegal expression for augmented assignment")),
        }
    }

    pub(crate) fn target(&mut self, target: &Target) -> CompileResult<Store> {
        self.target_with_type(target, StaticType::Dynamic)
    }

    /// Store for an assignment target. In typed routines `known` is the
    /// static type of the stored values, recorded for untyped locals.
    fn target_with_type(&mut self, target: &Target, known: StaticType) -> CompileResult<Store> {
        Ok(match target {
            Target::Name(name) => match cell_ref(self.scopes.resolve(name)) {
                Some(at) => {
                    let declared = match at {
                        CellRef::Local(slot) if self.scope().typed => {
                            let declared = self.scope().static_type(slot);
                            if declared == StaticType::Dynamic && known != StaticType::Dynamic {
                                self.scope_mut().types.insert(slot, known.clone());
                                known.clone()
                            } else {
                                declared
                            }
                        }
                        _ => StaticType::Dynamic,
                    };
                    if known != StaticType::Dynamic && !known.widens_to(&declared) {
                        return Err(self.error(format!(
                            "cannot assign {} to '{name}' of type {}",
                            known.name(),
                            declared.name()
                        )));
                    }
                    let name = name.clone();
                    Rc::new(move |frame, value| {
                        let value = if declared == StaticType::Dynamic || declared == known {
                            value
                        } else {
                            typed::coerce(&declared, value, &name)?
                        };
                        *frame.cell(at).borrow_mut() = Some(value);
                        Ok(())
                    })
                }
                None => {
                    let globals = self.globals.clone();
                    let name = name.clone();
                    Rc::new(move |_, value| {
                        globals.borrow_mut().insert(name.clone(), value);
                        Ok(())
                    })
                }
            },
            Target::Attribute { object, name } => {
                let object = self.operand(object)?;
                let name = name.clone();
                Rc::new(move |frame, value| object(frame)?.set_attr(frame.rt, &name, value))
            }
            Target::Index { object, index } => {
                let object = self.operand(object)?;
                let index = self.operand(index)?;
                Rc::new(move |frame, value| {
                    let object = object(frame)?;
                    object.set_item(frame.rt, &index(frame)?, value)
                })
            }
            Target::Tuple(items) => {
                let stores = items
                    .iter()
                    .map(|item| self.target(item))
                    .collect::<CompileResult<Vec<_>>>()?;
                Rc::new(move |frame, value| {
                    let values = value.to_vec(frame.rt)?;
                    unpack_count(&values, stores.len())?;
                    for (store, value) in stores.iter().zip(values) {
                        store(frame, value)?;
                    }
                    Ok(())
                })
            }
        })
    }

    fn delete(&mut self, target: &Target) -> CompileResult<Exec> {
        Ok(match target {
            Target::Name(name) => match cell_ref(self.scopes.resolve(name)) {
                Some(at) => {
                    let name = name.clone();
                    Rc::new(move |frame| {
                        if frame.cell(at).borrow_mut().take().is_none() {
                            return Err(RuntimeError::UnboundLocal(name.clone()));
                        }
                        Ok(Flow::Next)
                    })
                }
                None => {
                    let globals = self.globals.clone();
                    let name = name.clone();
                    Rc::new(move |_| match globals.borrow_mut().shift_remove(&name) {
                        Some(_) => Ok(Flow::Next),
                        None => Err(RuntimeError::Name(name.clone())),
                    })
                }
            },
            Target::Attribute { object, name } => {
                let object = self.operand(object)?;
                let name = name.clone();
                Rc::new(move |frame| {
                    object(frame)?.del_attr(frame.rt, &name)?;
                    Ok(Flow::Next)
                })
            }
            Target::Index { object, index } => {
                let object = self.operand(object)?;
                let index = self.operand(index)?;
                Rc::new(move |frame| {
                    let object = object(frame)?;
                    object.del_item(frame.rt, &index(frame)?)?;
                    Ok(Flow::Next)
                })
            }
            Target::Tuple(items) => {
                let deletes = items
                    .iter()
                    .map(|item| self.delete(item))
                    .collect::<CompileResult<Vec<_>>>()?;
                sequence(deletes)
            }
        })
    }

    /// Reads a name as resolved from the current scope.
    pub(crate) fn name(&mut self, name: &str) -> CompileResult<Eval> {
        let in_class = self.scope().kind == ScopeKind::Class;
        let binding = self.scopes.resolve(name);
        let globals = self.globals.clone();
        let name = name.to_string();
        Ok(match binding {
            Binding::Local(slot) => Rc::new(move |frame| {
                if let Some(value) = frame.slots[slot].borrow().as_ref() {
                    return Ok(value.clone());
                }
                if in_class && let Some(value) = globals.borrow().get(&name) {
                    return Ok(value.clone());
                }
                Err(RuntimeError::UnboundLocal(name.clone()))
            }),
            Binding::Capture(index) => Rc::new(move |frame| {
                frame.captures[index]
                    .borrow()
                    .clone()
                    .ok_or_else(|| RuntimeError::Name(name.clone()))
            }),
            Binding::Global => Rc::new(move |_| {
                globals
                    .borrow()
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::Name(name.clone()))
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::parser::parse;
    use indoc::indoc;

    fn compile(source: &str) -> Result<ModuleCode, CompileError> {
        let rt = Interpreter::new(Config::default()).expect("interpreter");
        let module = rt.new_module("test");
        compile_module(&rt, &parse(source).expect("parse"), &module, false)
    }

    fn compile_error(source: &str) -> String {
        match compile(source) {
            Err(error) => error.message,
            Ok(_) => panic!("expected a compile error"),
        }
    }

    #[test]
    fn control_statements_outside_their_construct_are_rejected() {
        assert_eq!(compile_error("return 1"), "'return' outside function");
        assert_eq!(compile_error("break"), "'break' outside loop");
        assert_eq!(
            compile_error(indoc! {"
                def f():
                    continue
            "}),
            "'continue' outside loop"
        );
    }

    #[test]
    fn loops_inside_functions_do_not_leak_outward() {
        assert_eq!(
            compile_error(indoc! {"
                while True:
                    def f():
                        break
            "}),
            "'break' outside loop"
        );
    }

    #[test]
    fn nonlocal_requires_an_enclosing_binding() {
        assert_eq!(
            compile_error(indoc! {"
                def f():
                    nonlocal missing
                    missing = 1
            "}),
            "no binding for nonlocal 'missing' found"
        );
        assert!(
            compile(indoc! {"
                def outer():
                    count = 0
                    def bump():
                        nonlocal count
                        count += 1
                    return bump
            "})
            .is_ok()
        );
    }

    #[test]
    fn interactive_mode_returns_the_trailing_expression() {
        let rt = Interpreter::new(Config::default()).expect("interpreter");
        let module = rt.new_module("snippet");
        let program = parse("x = 20\nx * 2 + 2").expect("parse");
        let code = compile_module(&rt, &program, &module, true).expect("compile");
        assert_eq!(code(&rt).expect("run"), Value::Int(42));
    }
}
