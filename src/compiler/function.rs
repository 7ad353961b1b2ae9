//! Routines and classes: `def`, `lambda` and `class` bodies.

use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;

use crate::ast::{ClassDef, Expression, FunctionDef, Param, ParamKind, Statement};
use crate::compiler::scope::{CLASS_CELL, CaptureSource, Scope, ScopeKind};
use crate::compiler::{Cell, CompileResult, Compiler, Eval, Exec, Flow, Frame, typed};
use crate::host::StaticType;
use crate::interpreter::Interpreter;
use crate::runtime::callable::{Function, ParamInfo, Routine, bind_arguments};
use crate::runtime::class::Class;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Value;

enum Body<'a> {
    Block(&'a [Statement]),
    Expression(&'a Expression),
}

struct Binding {
    name: String,
    slot: usize,
    default: Option<Eval>,
    /// Declared type in typed routines; arguments are coerced to it.
    check: Option<StaticType>,
}

/// Everything needed to run one compiled routine; shared by every function
/// value created from the same definition.
struct RoutinePlan {
    name: String,
    qualname: String,
    params: Rc<[ParamInfo]>,
    bindings: Vec<Binding>,
    slot_count: usize,
    captures: Vec<CaptureSource>,
    body: Exec,
}

impl RoutinePlan {
    fn invoke(&self, rt: &Interpreter, args: Vec<Value>, captures: &Rc<[Cell]>) -> RuntimeResult<Value> {
        let bound = bind_arguments(&self.params, args)?;
        let frame = Frame::new(rt, self.slot_count, captures.clone());
        for (binding, value) in self.bindings.iter().zip(bound) {
            let value = match (value, &binding.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default(&frame)?,
                (None, None) => Value::None,
            };
            let value = match &binding.check {
                Some(ty) => typed::coerce(ty, value, &binding.name)?,
                None => value,
            };
            *frame.slots[binding.slot].borrow_mut() = Some(value);
        }
        match (self.body)(&frame)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }
}

/// Applies decorators innermost first.
fn decorate(rt: &Interpreter, decorators: Vec<Value>, mut value: Value) -> RuntimeResult<Value> {
    for decorator in decorators.into_iter().rev() {
        value = decorator.call(rt, vec![value])?;
    }
    Ok(value)
}

impl Compiler<'_> {
    fn decorators(&mut self, decorators: &[Expression]) -> CompileResult<Rc<[Eval]>> {
        decorators.iter().map(|decorator| self.expr(decorator)).collect()
    }

    pub(crate) fn function_def(&mut self, def: &FunctionDef) -> CompileResult<Eval> {
        let decorators = self.decorators(&def.decorators)?;
        let make = self.routine(&def.name, &def.params, Body::Block(&def.body), def.is_typed(), def.returns.as_deref())?;
        Ok(Rc::new(move |frame| {
            let decorators = decorators
                .iter()
                .map(|decorator| decorator(frame))
                .collect::<RuntimeResult<Vec<_>>>()?;
            decorate(frame.rt, decorators, make(frame)?)
        }))
    }

    pub(crate) fn lambda(&mut self, params: &[String], body: &Expression) -> CompileResult<Eval> {
        let params: Vec<Param> = params
            .iter()
            .map(|name| {
                let (name, kind) = if let Some(name) = name.strip_prefix("**") {
                    (name, ParamKind::KwArgs)
                } else if let Some(name) = name.strip_prefix('*') {
                    (name, ParamKind::VarArgs)
                } else {
                    (name.as_str(), ParamKind::Normal)
                };
                Param {
                    name: name.to_string(),
                    kind,
                    annotation: None,
                    default: None,
                }
            })
            .collect();
        self.routine("<lambda>", &params, Body::Expression(body), false, None)
    }

    fn routine(
        &mut self,
        name: &str,
        params: &[Param],
        body: Body<'_>,
        typed: bool,
        returns: Option<&str>,
    ) -> CompileResult<Eval> {
        let qualname = self.scopes.child_qualname(name);
        let mut scope = Scope::new(ScopeKind::Function, qualname.clone());
        let slots: Vec<usize> = params.iter().map(|param| scope.declare(&param.name)).collect();
        scope.first_param = params
            .first()
            .filter(|param| param.kind == ParamKind::Normal)
            .map(|_| slots[0]);
        let mut checks = vec![None; params.len()];
        if typed {
            scope.typed = true;
            for (index, param) in params.iter().enumerate() {
                let ty = match (param.kind, &param.annotation) {
                    (ParamKind::VarArgs, _) => StaticType::Tuple,
                    (ParamKind::KwArgs, _) => StaticType::Dict,
                    (ParamKind::Normal, Some(annotation)) => self.annotation(annotation),
                    (ParamKind::Normal, None) => StaticType::Dynamic,
                };
                if ty != StaticType::Dynamic {
                    scope.types.insert(slots[index], ty.clone());
                    checks[index] = Some(ty);
                }
            }
            scope.returns = returns.map(|annotation| self.annotation(annotation));
        }
        if let Body::Block(statements) = body {
            scope.declare_assigned(statements);
        }

        self.scopes.push(scope);
        let compiled = (|| -> CompileResult<_> {
            let defaults = params
                .iter()
                .map(|param| param.default.as_ref().map(|default| self.expr(default)).transpose())
                .collect::<CompileResult<Vec<_>>>()?;
            let body: Exec = match body {
                Body::Block(statements) => self.block(statements)?,
                Body::Expression(expr) => {
                    let value = self.expr(expr)?;
                    Rc::new(move |frame| Ok(Flow::Return(value(frame)?)))
                }
            };
            Ok((defaults, body))
        })();
        let scope = self.scopes.pop();
        let (defaults, body) = compiled?;
        let scope = scope.ok_or_else(|| self.error("scope stack underflow"))?;
        debug!(
            "compiled {qualname} ({} mode, {} locals, {} captures)",
            if typed { "typed" } else { "dynamic" },
            scope.slot_count(),
            scope.captures.len()
        );

        let bindings = params
            .iter()
            .zip(slots)
            .zip(defaults)
            .zip(checks)
            .map(|(((param, slot), default), check)| Binding {
                name: param.name.clone(),
                slot,
                default,
                check,
            })
            .collect();
        let plan = Rc::new(RoutinePlan {
            name: name.to_string(),
            qualname,
            params: params
                .iter()
                .map(|param| ParamInfo::new(param.name.clone(), param.kind))
                .collect(),
            bindings,
            slot_count: scope.slot_count(),
            captures: scope.captures,
            body,
        });
        let module = self.module.clone();
        Ok(Rc::new(move |frame| {
            let captures = frame.capture_cells(&plan.captures);
            let target = plan.clone();
            let routine: Routine = Rc::new(move |rt, args| target.invoke(rt, args, &captures));
            Ok(Value::Function(Rc::new(Function::compiled(
                plan.name.clone(),
                plan.qualname.clone(),
                module.clone(),
                plan.params.clone(),
                routine,
            ))))
        }))
    }

    /// The class body runs once, in a frame of its own; whatever it binds
    /// becomes the class's own members.
    pub(crate) fn class_def(&mut self, def: &ClassDef) -> CompileResult<Eval> {
        let decorators = self.decorators(&def.decorators)?;
        let bases = def
            .bases
            .iter()
            .map(|base| self.expr(base))
            .collect::<CompileResult<Vec<_>>>()?;

        let qualname = self.scopes.child_qualname(&def.name);
        let mut scope = Scope::new(ScopeKind::Class, qualname.clone());
        let class_cell = scope.declare(CLASS_CELL);
        scope.declare_assigned(&def.body);
        self.scopes.push(scope);
        let body = self.block(&def.body);
        let scope = self.scopes.pop();
        let body = body?;
        let scope = scope.ok_or_else(|| self.error("scope stack underflow"))?;
        debug!("compiled class {qualname} ({} members)", scope.slot_count() - 1);

        let members: Vec<(String, usize)> = scope
            .locals
            .iter()
            .filter(|(name, _)| name.as_str() != CLASS_CELL)
            .map(|(name, slot)| (name.clone(), *slot))
            .collect();
        let (slot_count, sources) = (scope.slot_count(), scope.captures);
        let name = def.name.clone();
        let module = self.module.clone();
        Ok(Rc::new(move |frame| {
            let rt = frame.rt;
            let decorators = decorators
                .iter()
                .map(|decorator| decorator(frame))
                .collect::<RuntimeResult<Vec<_>>>()?;
            let mut base_classes = Vec::with_capacity(bases.len());
            for base in &bases {
                match base(frame)? {
                    Value::Class(class) => base_classes.push(class),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "bases must be classes, not '{}'",
                            other.type_name()
                        )));
                    }
                }
            }
            let inner = Frame::new(rt, slot_count, frame.capture_cells(&sources));
            body(&inner)?;
            let mut own = IndexMap::new();
            for (member, slot) in &members {
                if let Some(value) = inner.slots[*slot].borrow().clone() {
                    own.insert(member.clone(), value);
                }
            }
            let class = Class::define(rt, name.clone(), module.clone(), base_classes, own);
            *inner.slots[class_cell].borrow_mut() = Some(Value::Class(class.clone()));
            decorate(rt, decorators, Value::Class(class))
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::interpreter::Interpreter;
    use crate::runtime::value::Value;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn eval(source: &str, expression: &str) -> Value {
        let rt = Interpreter::new(Config::default()).expect("interpreter");
        let module = rt.run_source("test", source).expect("run");
        rt.eval_snippet(&module, expression).expect("eval")
    }

    #[test]
    fn defaults_are_evaluated_per_call() {
        let value = eval(
            indoc! {"
                def collect(item, into=[]):
                    into.append(item)
                    return into
                collect(1)
            "},
            "collect(2)",
        );
        assert_eq!(value, Value::list(vec![Value::Int(2)]));
    }

    #[test]
    fn closures_share_the_captured_cell() {
        let value = eval(
            indoc! {"
                def counter():
                    count = 0
                    def bump():
                        nonlocal count
                        count += 1
                        return count
                    return bump
                tick = counter()
                tick()
                tick()
            "},
            "tick()",
        );
        assert_eq!(value, Value::Int(3));
    }

    #[test]
    fn class_bodies_bind_members_and_qualnames() {
        let value = eval(
            indoc! {"
                class Point:
                    dims = 2
                    def norm(self):
                        return self.dims
            "},
            "(Point().norm(), Point.norm.__qualname__)",
        );
        assert_eq!(value, Value::tuple(vec![Value::Int(2), Value::str("Point.norm")]));
    }

    #[test]
    fn zero_argument_super_reaches_the_base() {
        let value = eval(
            indoc! {"
                class Base:
                    def greet(self):
                        return 'base'
                class Child(Base):
                    def greet(self):
                        return 'child+' + super().greet()
            "},
            "Child().greet()",
        );
        assert_eq!(value, Value::str("child+base"));
    }
}
