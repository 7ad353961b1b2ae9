//! Dynamic-mode expressions: every operation goes through the runtime
//! dispatch protocol.

use std::rc::Rc;

use crate::ast::{Argument, Comprehension, ComprehensionKind, DictItem, Expression, Target};
use crate::compiler::scope::{CLASS_CELL, Scope, ScopeKind};
use crate::compiler::{CompileResult, Compiler, Eval, Frame, cell_ref};
use crate::runtime::class::SuperRef;
use crate::runtime::dict::{Dict, set_from_values};
use crate::runtime::dispatch::instance_of_class;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::exception::RaisedException;
use crate::runtime::iter::Generator;
use crate::runtime::ops;
use crate::runtime::value::Value;

/// Produces the argument vector of a call, keywords trailing as
/// `Value::Keyword`.
pub(crate) type ArgsEval = Rc<dyn Fn(&Frame<'_>) -> RuntimeResult<Vec<Value>>>;

enum Piece {
    One(Eval),
    Spread(Eval),
}

fn constant(value: Value) -> Eval {
    Rc::new(move |_| Ok(value.clone()))
}

/// Evaluates the pieces of a literal or call, expanding `*` operands.
fn gather(pieces: &[Piece], frame: &Frame<'_>) -> RuntimeResult<Vec<Value>> {
    let mut items = Vec::with_capacity(pieces.len());
    for piece in pieces {
        match piece {
            Piece::One(value) => items.push(value(frame)?),
            Piece::Spread(value) => items.extend(value(frame)?.to_vec(frame.rt)?),
        }
    }
    Ok(items)
}

/// Appends the entries of a `**` operand to `dict`.
fn merge_mapping(frame: &Frame<'_>, dict: &mut Dict, mapping: &Value) -> RuntimeResult<()> {
    match mapping {
        Value::Dict(source) => {
            for (key, value) in source.borrow().items() {
                dict.insert(key.clone(), value.clone())?;
            }
            Ok(())
        }
        Value::Object(_) => {
            for key in mapping.get_attr(frame.rt, "keys")?.call(frame.rt, Vec::new())?.to_vec(frame.rt)? {
                let value = mapping.get_item(frame.rt, &key)?;
                dict.insert(key, value)?;
            }
            Ok(())
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not a mapping",
            other.type_name()
        ))),
    }
}

impl Compiler<'_> {
    /// Sub-expressions of a routine compiled in its mode: inside typed
    /// routines members and overloads are bound while compiling.
    pub(crate) fn operand(&mut self, expr: &Expression) -> CompileResult<Eval> {
        if self.scope().typed {
            return Ok(self.typed_expr(expr)?.boxed());
        }
        self.expr(expr)
    }

    pub(crate) fn expr(&mut self, expr: &Expression) -> CompileResult<Eval> {
        Ok(match expr {
            Expression::None | Expression::Nil => constant(Value::None),
            Expression::Bool(value) => constant(Value::Bool(*value)),
            Expression::Int(value) => constant(Value::Int(*value)),
            Expression::Float(value) => constant(Value::Float(*value)),
            Expression::Str(text) => constant(Value::str(text)),
            Expression::Name(name) => self.name(name)?,
            Expression::Format(inner) => {
                let inner = self.operand(inner)?;
                Rc::new(move |frame| Ok(Value::str(inner(frame)?.to_str(frame.rt)?)))
            }
            Expression::Tuple(items) => {
                let pieces = self.pieces(items)?;
                Rc::new(move |frame| Ok(Value::tuple(gather(&pieces, frame)?)))
            }
            Expression::List(items) => {
                let pieces = self.pieces(items)?;
                Rc::new(move |frame| Ok(Value::list(gather(&pieces, frame)?)))
            }
            Expression::Set(items) => {
                let pieces = self.pieces(items)?;
                Rc::new(move |frame| Ok(Value::set(set_from_values(gather(&pieces, frame)?)?)))
            }
            Expression::Dict(items) => self.dict(items)?,
            Expression::Starred(_) => return Err(self.error("can't use starred expression here")),
            Expression::DoubleStarred(_) => return Err(self.error("can't use double starred expression here")),
            Expression::Binary { op, left, right } => {
                let (op, left, right) = (*op, self.operand(left)?, self.operand(right)?);
                Rc::new(move |frame| ops::binary(frame.rt, op, &left(frame)?, &right(frame)?))
            }
            Expression::Unary { op, operand } => {
                let (op, operand) = (*op, self.operand(operand)?);
                Rc::new(move |frame| ops::unary(frame.rt, op, &operand(frame)?))
            }
            Expression::Not(operand) => {
                let operand = self.operand(operand)?;
                Rc::new(move |frame| Ok(Value::Bool(!operand(frame)?.truthy(frame.rt)?)))
            }
            Expression::And(left, right) => {
                let (left, right) = (self.operand(left)?, self.operand(right)?);
                Rc::new(move |frame| {
                    let first = left(frame)?;
                    if first.truthy(frame.rt)? { right(frame) } else { Ok(first) }
                })
            }
            Expression::Or(left, right) => {
                let (left, right) = (self.operand(left)?, self.operand(right)?);
                Rc::new(move |frame| {
                    let first = left(frame)?;
                    if first.truthy(frame.rt)? { Ok(first) } else { right(frame) }
                })
            }
            Expression::Is { left, right, negated } => {
                let (left, right, negated) = (self.operand(left)?, self.operand(right)?, *negated);
                Rc::new(move |frame| Ok(Value::Bool(left(frame)?.is_(&right(frame)?) != negated)))
            }
            Expression::In { item, container, negated } => {
                let (item, container, negated) = (self.operand(item)?, self.operand(container)?, *negated);
                Rc::new(move |frame| {
                    let item = item(frame)?;
                    Ok(Value::Bool(container(frame)?.contains(frame.rt, &item)? != negated))
                })
            }
            Expression::Ternary { condition, then, otherwise } => {
                let condition = self.operand(condition)?;
                let (then, otherwise) = (self.operand(then)?, self.operand(otherwise)?);
                Rc::new(move |frame| {
                    if condition(frame)?.truthy(frame.rt)? { then(frame) } else { otherwise(frame) }
                })
            }
            Expression::Attribute { object, name } => {
                let object = self.operand(object)?;
                let name = name.clone();
                Rc::new(move |frame| object(frame)?.get_attr(frame.rt, &name))
            }
            Expression::Index { object, index } => {
                let (object, index) = (self.operand(object)?, self.operand(index)?);
                Rc::new(move |frame| {
                    let object = object(frame)?;
                    object.get_item(frame.rt, &index(frame)?)
                })
            }
            Expression::Slice { object, start, stop, step } => self.slice(object, [start, stop, step])?,
            Expression::Call { callee, args } => {
                let callee = self.operand(callee)?;
                let args = self.arguments(args)?;
                Rc::new(move |frame| {
                    let callee = callee(frame)?;
                    callee.call(frame.rt, args(frame)?)
                })
            }
            Expression::Lambda { params, body } => self.lambda(params, body)?,
            Expression::Comprehension(comprehension) => self.comprehension(comprehension)?,
            Expression::Convert { value, target } => {
                let (value, target) = (self.operand(value)?, self.operand(target)?);
                Rc::new(move |frame| {
                    let value = value(frame)?;
                    target(frame)?.call(frame.rt, vec![value])
                })
            }
            Expression::Cast { value, target } => {
                let (value, target) = (self.operand(value)?, self.operand(target)?);
                Rc::new(move |frame| cast(value(frame)?, &target(frame)?))
            }
            Expression::TypedEval(inner) => self.typed_expr(inner)?.boxed(),
            Expression::Super => self.zero_argument_super()?,
        })
    }

    fn pieces(&mut self, items: &[Expression]) -> CompileResult<Vec<Piece>> {
        items
            .iter()
            .map(|item| match item {
                Expression::Starred(inner) => Ok(Piece::Spread(self.operand(inner)?)),
                other => Ok(Piece::One(self.operand(other)?)),
            })
            .collect()
    }

    fn dict(&mut self, items: &[DictItem]) -> CompileResult<Eval> {
        enum Entry {
            Pair(Eval, Eval),
            Unpack(Eval),
        }
        let entries = items
            .iter()
            .map(|item| match item {
                DictItem::Pair(key, value) => Ok(Entry::Pair(self.operand(key)?, self.operand(value)?)),
                DictItem::Unpack(mapping) => Ok(Entry::Unpack(self.operand(mapping)?)),
            })
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(Rc::new(move |frame| {
            let mut dict = Dict::new();
            for entry in &entries {
                match entry {
                    Entry::Pair(key, value) => {
                        let key = key(frame)?;
                        dict.insert(key, value(frame)?)?;
                    }
                    Entry::Unpack(mapping) => merge_mapping(frame, &mut dict, &mapping(frame)?)?,
                }
            }
            Ok(Value::dict(dict))
        }))
    }

    pub(crate) fn arguments(&mut self, args: &[Argument]) -> CompileResult<ArgsEval> {
        enum Arg {
            Positional(Eval),
            Keyword(Rc<str>, Eval),
            Star(Eval),
            DoubleStar(Eval),
        }
        let compiled = args
            .iter()
            .map(|arg| {
                Ok(match arg {
                    Argument::Positional(value) => Arg::Positional(self.operand(value)?),
                    Argument::Keyword(name, value) => Arg::Keyword(Rc::from(name.as_str()), self.operand(value)?),
                    Argument::Star(value) => Arg::Star(self.operand(value)?),
                    Argument::DoubleStar(value) => Arg::DoubleStar(self.operand(value)?),
                })
            })
            .collect::<CompileResult<Vec<_>>>()?;
        if compiled.iter().all(|arg| matches!(arg, Arg::Positional(_))) {
            let values: Vec<Eval> = compiled
                .into_iter()
                .filter_map(|arg| match arg {
                    Arg::Positional(value) => Some(value),
                    _ => None,
                })
                .collect();
            return Ok(Rc::new(move |frame| values.iter().map(|value| value(frame)).collect()));
        }
        Ok(Rc::new(move |frame| {
            let mut values = Vec::with_capacity(compiled.len());
            for arg in &compiled {
                match arg {
                    Arg::Positional(value) => values.push(value(frame)?),
                    Arg::Keyword(name, value) => values.push(Value::keyword(name, value(frame)?)),
                    Arg::Star(value) => values.extend(value(frame)?.to_vec(frame.rt)?),
                    Arg::DoubleStar(mapping) => {
                        let mut dict = Dict::new();
                        merge_mapping(frame, &mut dict, &mapping(frame)?)?;
                        for (key, value) in dict.items() {
                            let Some(name) = key.as_str() else {
                                return Err(RuntimeError::type_error("keywords must be strings"));
                            };
                            values.push(Value::keyword(name, value.clone()));
                        }
                    }
                }
            }
            Ok(values)
        }))
    }

    /// `a[i:j:k]` calls the module's `slice` with `None` for missing bounds.
    fn slice(&mut self, object: &Expression, bounds: [&Option<Box<Expression>>; 3]) -> CompileResult<Eval> {
        let object = self.operand(object)?;
        let bounds = bounds
            .into_iter()
            .map(|bound| match bound {
                Some(bound) => self.operand(bound),
                None => Ok(constant(Value::None)),
            })
            .collect::<CompileResult<Vec<_>>>()?;
        let globals = self.globals.clone();
        Ok(Rc::new(move |frame| {
            let slice = globals
                .borrow()
                .get("slice")
                .cloned()
                .ok_or_else(|| RuntimeError::Name("slice".into()))?;
            let mut args = Vec::with_capacity(4);
            args.push(object(frame)?);
            for bound in &bounds {
                args.push(bound(frame)?);
            }
            slice.call(frame.rt, args)
        }))
    }

    /// Comprehensions run their element and condition in a scope of their
    /// own; the outermost iterable is evaluated in the enclosing one.
    fn comprehension(&mut self, comprehension: &Comprehension) -> CompileResult<Eval> {
        let Comprehension { kind, element, target, iterable, condition } = comprehension;
        let source = self.operand(iterable)?;
        let label = match kind {
            ComprehensionKind::Generator => "<genexpr>",
            ComprehensionKind::List => "<listcomp>",
            ComprehensionKind::Set => "<setcomp>",
            ComprehensionKind::Dict => "<dictcomp>",
        };
        let qualname = self.scopes.child_qualname(label);
        let mut scope = Scope::new(ScopeKind::Function, qualname);
        declare_target(&mut scope, target);
        self.scopes.push(scope);
        let compiled = (|| -> CompileResult<_> {
            let store = self.target(target)?;
            let condition = condition.as_ref().map(|condition| self.expr(condition)).transpose()?;
            let element: Eval = match (kind, element) {
                (ComprehensionKind::Dict, Expression::Dict(items)) => match items.as_slice() {
                    [DictItem::Pair(key, value)] => {
                        let (key, value) = (self.expr(key)?, self.expr(value)?);
                        Rc::new(move |frame: &Frame<'_>| {
                            let key = key(frame)?;
                            Ok(Value::tuple(vec![key, value(frame)?]))
                        })
                    }
                    _ => return Err(self.error("invalid dict comprehension")),
                },
                _ => self.expr(element)?,
            };
            Ok((store, condition, element))
        })();
        let scope = self.scopes.pop();
        let (store, condition, element) = compiled?;
        let scope = scope.ok_or_else(|| self.error("scope stack underflow"))?;
        let (slot_count, sources) = (scope.slot_count(), scope.captures);
        let kind = *kind;

        Ok(Rc::new(move |frame| {
            let captures = frame.capture_cells(&sources);
            let (store, condition, element) = (store.clone(), condition.clone(), element.clone());
            let generator = Value::Generator(Generator::new(source(frame)?, move |rt, item| {
                let inner = Frame::new(rt, slot_count, captures.clone());
                store(&inner, item)?;
                if let Some(condition) = &condition
                    && !condition(&inner)?.truthy(rt)?
                {
                    return Ok(None);
                }
                element(&inner).map(Some)
            }));
            let rt = frame.rt;
            match kind {
                ComprehensionKind::Generator => Ok(generator),
                ComprehensionKind::List => Ok(Value::list(generator.to_vec(rt)?)),
                ComprehensionKind::Set => Ok(Value::set(set_from_values(generator.to_vec(rt)?)?)),
                ComprehensionKind::Dict => {
                    let mut dict = Dict::new();
                    for pair in generator.to_vec(rt)? {
                        if let Value::Tuple(pair) = pair
                            && let [key, value] = &*pair
                        {
                            dict.insert(key.clone(), value.clone())?;
                        }
                    }
                    Ok(Value::dict(dict))
                }
            }
        }))
    }

    /// `super()` reads the enclosing class from the hidden `__class__` cell
    /// and the receiver from the method's first parameter.
    fn zero_argument_super(&mut self) -> CompileResult<Eval> {
        let receiver = self.scope().first_param;
        let (Some(receiver), ScopeKind::Function) = (receiver, self.scope().kind) else {
            return Err(self.error("super(): no arguments"));
        };
        let Some(class_cell) = self.scopes.resolve_enclosing(CLASS_CELL).and_then(cell_ref) else {
            return Err(self.error("super() used outside a method"));
        };
        Ok(Rc::new(move |frame| {
            let class = frame.cell(class_cell).borrow().clone();
            let receiver = frame.slots[receiver].borrow().clone();
            match (class, receiver) {
                (Some(Value::Class(class)), Some(receiver)) => {
                    Ok(Value::Super(Rc::new(SuperRef { class, receiver })))
                }
                _ => Err(RuntimeError::Raised(RaisedException::new(
                    "RuntimeError",
                    "super(): empty __class__ cell",
                ))),
            }
        }))
    }
}

fn declare_target(scope: &mut Scope, target: &Target) {
    match target {
        Target::Name(name) => {
            scope.declare(name);
        }
        Target::Tuple(items) => items.iter().for_each(|item| declare_target(scope, item)),
        Target::Attribute { .. } | Target::Index { .. } => {}
    }
}

/// `value @ T`: passes `value` through when it is a `T`.
pub(crate) fn cast(value: Value, target: &Value) -> RuntimeResult<Value> {
    let matches = match target {
        Value::Class(class) => instance_of_class(&value, class),
        Value::Type(ty) => value.type_key() == *ty.key() || (ty.name() == "float" && matches!(value, Value::Int(_))),
        other => {
            return Err(RuntimeError::type_error(format!(
                "cast target must be a type, not '{}'",
                other.type_name()
            )));
        }
    };
    if !matches {
        return Err(RuntimeError::type_error(format!(
            "cannot cast '{}' to '{}'",
            value.type_name(),
            match target {
                Value::Class(class) => class.name.clone(),
                Value::Type(ty) => ty.name().to_string(),
                _ => String::new(),
            }
        )));
    }
    Ok(match (target, value) {
        (Value::Type(ty), Value::Int(number)) if ty.name() == "float" => Value::Float(number as f64),
        (_, value) => value,
    })
}
