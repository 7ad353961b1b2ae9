//! Typed mode.
//!
//! Inside annotated functions (and `eval(...)` expressions) every
//! expression carries a compile-time [`StaticType`]. Operations whose operand
//! types are known and equal run natively on unboxed values; members of host
//! types are bound to the matching overload at compile time. Everything
//! else falls back to the dynamic protocol.

use std::rc::Rc;

use crate::ast::{Argument, BinaryOperator, Expression, UnaryOperator};
use crate::compiler::expr::cast;
use crate::compiler::scope::Binding;
use crate::compiler::{CompileResult, Compiler, Eval, Frame};
use crate::host::{HostType, StaticType, resolve_overload};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::ops::{self, floor_div, floor_mod};
use crate::runtime::value::Value;

pub(crate) type IntEval = Rc<dyn Fn(&Frame<'_>) -> RuntimeResult<i64>>;
pub(crate) type FloatEval = Rc<dyn Fn(&Frame<'_>) -> RuntimeResult<f64>>;
pub(crate) type BoolEval = Rc<dyn Fn(&Frame<'_>) -> RuntimeResult<bool>>;
pub(crate) type StrEval = Rc<dyn Fn(&Frame<'_>) -> RuntimeResult<Rc<str>>>;

/// A compiled expression together with its static type.
pub(crate) enum Typed {
    Int(IntEval),
    Float(FloatEval),
    Bool(BoolEval),
    Str(StrEval),
    Boxed(StaticType, Eval),
}

impl Typed {
    pub fn static_type(&self) -> StaticType {
        match self {
            Self::Int(_) => StaticType::Int,
            Self::Float(_) => StaticType::Float,
            Self::Bool(_) => StaticType::Bool,
            Self::Str(_) => StaticType::Str,
            Self::Boxed(ty, _) => ty.clone(),
        }
    }

    pub fn boxed(self) -> Eval {
        match self {
            Self::Int(eval) => Rc::new(move |frame| Ok(Value::Int(eval(frame)?))),
            Self::Float(eval) => Rc::new(move |frame| Ok(Value::Float(eval(frame)?))),
            Self::Bool(eval) => Rc::new(move |frame| Ok(Value::Bool(eval(frame)?))),
            Self::Str(eval) => Rc::new(move |frame| Ok(Value::Str(eval(frame)?))),
            Self::Boxed(_, eval) => eval,
        }
    }

    /// Wraps a boxed evaluation whose values are known to be of `ty`.
    fn unboxed(ty: StaticType, eval: Eval) -> Self {
        match ty {
            StaticType::Int => Self::Int(Rc::new(move |frame| expect_int(eval(frame)?))),
            StaticType::Float => Self::Float(Rc::new(move |frame| expect_float(eval(frame)?))),
            StaticType::Bool => Self::Bool(Rc::new(move |frame| match eval(frame)? {
                Value::Bool(value) => Ok(value),
                other => Err(mismatch("bool", &other)),
            })),
            StaticType::Str => Self::Str(Rc::new(move |frame| match eval(frame)? {
                Value::Str(text) => Ok(text),
                other => Err(mismatch("str", &other)),
            })),
            other => Self::Boxed(other, eval),
        }
    }
}

fn mismatch(expected: &str, found: &Value) -> RuntimeError {
    RuntimeError::type_error(format!("expected {expected}, got {}", found.type_name()))
}

fn expect_int(value: Value) -> RuntimeResult<i64> {
    match value {
        Value::Int(number) => Ok(number),
        Value::Bool(flag) => Ok(i64::from(flag)),
        other => Err(mismatch("int", &other)),
    }
}

fn expect_float(value: Value) -> RuntimeResult<f64> {
    match value {
        Value::Float(number) => Ok(number),
        Value::Int(number) => Ok(number as f64),
        other => Err(mismatch("float", &other)),
    }
}

/// Checks `value` against a declared type, widening `int` to `float`.
pub(crate) fn coerce(ty: &StaticType, value: Value, name: &str) -> RuntimeResult<Value> {
    if ty.accepts(&value) {
        return Ok(value);
    }
    match (ty, value) {
        (StaticType::Float, Value::Int(number)) => Ok(Value::Float(number as f64)),
        (StaticType::Int, Value::Bool(flag)) => Ok(Value::Int(i64::from(flag))),
        (_, value) => Err(RuntimeError::type_error(format!(
            "'{name}' must be {}, not {}",
            ty.name(),
            value.type_name()
        ))),
    }
}

fn overflow() -> RuntimeError {
    RuntimeError::Overflow("integer result too large".into())
}

fn int_arithmetic(a: IntEval, b: IntEval, apply: fn(i64, i64) -> RuntimeResult<i64>) -> Typed {
    Typed::Int(Rc::new(move |frame| apply(a(frame)?, b(frame)?)))
}

fn float_arithmetic(a: FloatEval, b: FloatEval, apply: fn(f64, f64) -> RuntimeResult<f64>) -> Typed {
    Typed::Float(Rc::new(move |frame| apply(a(frame)?, b(frame)?)))
}

fn compare<T: 'static>(
    a: Rc<dyn Fn(&Frame<'_>) -> RuntimeResult<T>>,
    b: Rc<dyn Fn(&Frame<'_>) -> RuntimeResult<T>>,
    apply: fn(&T, &T) -> bool,
) -> Typed {
    Typed::Bool(Rc::new(move |frame| Ok(apply(&a(frame)?, &b(frame)?))))
}

fn int_binary(op: BinaryOperator, a: &IntEval, b: &IntEval) -> Option<Typed> {
    use BinaryOperator::*;
    let (a, b) = (a.clone(), b.clone());
    Some(match op {
        Add => int_arithmetic(a, b, |x, y| x.checked_add(y).ok_or_else(overflow)),
        Sub => int_arithmetic(a, b, |x, y| x.checked_sub(y).ok_or_else(overflow)),
        Mul => int_arithmetic(a, b, |x, y| x.checked_mul(y).ok_or_else(overflow)),
        FloorDiv => int_arithmetic(a, b, floor_div),
        Mod => int_arithmetic(a, b, floor_mod),
        BitAnd => int_arithmetic(a, b, |x, y| Ok(x & y)),
        BitOr => int_arithmetic(a, b, |x, y| Ok(x | y)),
        BitXor => int_arithmetic(a, b, |x, y| Ok(x ^ y)),
        Div => Typed::Float(Rc::new(move |frame| {
            let (x, y) = (a(frame)?, b(frame)?);
            if y == 0 {
                return Err(RuntimeError::ZeroDivision("division by zero".into()));
            }
            Ok(x as f64 / y as f64)
        })),
        Lt => compare(a, b, i64::lt),
        Le => compare(a, b, i64::le),
        Gt => compare(a, b, i64::gt),
        Ge => compare(a, b, i64::ge),
        Eq => compare(a, b, i64::eq),
        Ne => compare(a, b, i64::ne),
        Pow | LShift | RShift => return None,
    })
}

fn float_binary(op: BinaryOperator, a: &FloatEval, b: &FloatEval) -> Option<Typed> {
    use BinaryOperator::*;
    let (a, b) = (a.clone(), b.clone());
    Some(match op {
        Add => float_arithmetic(a, b, |x, y| Ok(x + y)),
        Sub => float_arithmetic(a, b, |x, y| Ok(x - y)),
        Mul => float_arithmetic(a, b, |x, y| Ok(x * y)),
        Div => float_arithmetic(a, b, |x, y| {
            if y == 0.0 {
                return Err(RuntimeError::ZeroDivision("float division by zero".into()));
            }
            Ok(x / y)
        }),
        Lt => compare(a, b, f64::lt),
        Le => compare(a, b, f64::le),
        Gt => compare(a, b, f64::gt),
        Ge => compare(a, b, f64::ge),
        Eq => compare(a, b, f64::eq),
        Ne => compare(a, b, f64::ne),
        _ => return None,
    })
}

fn str_binary(op: BinaryOperator, a: &StrEval, b: &StrEval) -> Option<Typed> {
    use BinaryOperator::*;
    let (a, b) = (a.clone(), b.clone());
    Some(match op {
        Add => Typed::Str(Rc::new(move |frame| {
            let (x, y) = (a(frame)?, b(frame)?);
            Ok(Rc::from(format!("{x}{y}")))
        })),
        Lt => compare(a, b, |x, y| x < y),
        Le => compare(a, b, |x, y| x <= y),
        Gt => compare(a, b, |x, y| x > y),
        Ge => compare(a, b, |x, y| x >= y),
        Eq => compare(a, b, |x, y| x == y),
        Ne => compare(a, b, |x, y| x != y),
        _ => return None,
    })
}

impl Compiler<'_> {
    /// Static type named by an annotation. Names the registry does not know
    /// (script classes among them) are dynamic.
    pub(crate) fn annotation(&self, annotation: &str) -> StaticType {
        let name = annotation.rsplit('.').next().unwrap_or(annotation);
        match name {
            "None" | "NoneType" => StaticType::None,
            "object" | "any" | "Any" => StaticType::Dynamic,
            _ => match self.rt.types().by_name(name) {
                Some(ty) => StaticType::from_key(ty.key()),
                None => StaticType::Dynamic,
            },
        }
    }

    /// Host type named by the operand of `as`/`@`, which typed code requires
    /// to be known.
    fn named_type(&self, target: &Expression) -> CompileResult<HostType> {
        let name = match target {
            Expression::Name(name) => name.as_str(),
            Expression::Attribute { name, .. } => name.as_str(),
            _ => return Err(self.error("type name expected")),
        };
        self.rt
            .types()
            .by_name(name)
            .ok_or_else(|| self.error(format!("unknown type '{name}'")))
    }

    pub(crate) fn typed_expr(&mut self, expr: &Expression) -> CompileResult<Typed> {
        Ok(match expr {
            Expression::Int(number) => {
                let number = *number;
                Typed::Int(Rc::new(move |_| Ok(number)))
            }
            Expression::Float(number) => {
                let number = *number;
                Typed::Float(Rc::new(move |_| Ok(number)))
            }
            Expression::Bool(flag) => {
                let flag = *flag;
                Typed::Bool(Rc::new(move |_| Ok(flag)))
            }
            Expression::Str(text) => {
                let text: Rc<str> = Rc::from(text.as_str());
                Typed::Str(Rc::new(move |_| Ok(text.clone())))
            }
            Expression::None => Typed::Boxed(StaticType::None, self.expr(expr)?),
            Expression::Name(name) => self.typed_name(name)?,
            Expression::Binary { op, left, right } => {
                let (left, right) = (self.typed_expr(left)?, self.typed_expr(right)?);
                typed_binary(*op, left, right)
            }
            Expression::Unary { op, operand } => typed_unary(*op, self.typed_expr(operand)?),
            Expression::Not(operand) => {
                let operand = self.typed_truth(operand)?;
                Typed::Bool(Rc::new(move |frame| Ok(!operand(frame)?)))
            }
            Expression::And(left, right) | Expression::Or(left, right) => {
                let (left, right) = (self.typed_expr(left)?, self.typed_expr(right)?);
                let is_and = matches!(expr, Expression::And(..));
                match (left, right) {
                    (Typed::Bool(a), Typed::Bool(b)) if is_and => {
                        Typed::Bool(Rc::new(move |frame| Ok(a(frame)? && b(frame)?)))
                    }
                    (Typed::Bool(a), Typed::Bool(b)) => Typed::Bool(Rc::new(move |frame| Ok(a(frame)? || b(frame)?))),
                    _ => Typed::Boxed(StaticType::Dynamic, self.expr(expr)?),
                }
            }
            Expression::Ternary { condition, then, otherwise } => {
                let condition = self.typed_truth(condition)?;
                let (then, otherwise) = (self.typed_expr(then)?, self.typed_expr(otherwise)?);
                let ty = if then.static_type() == otherwise.static_type() {
                    then.static_type()
                } else {
                    StaticType::Dynamic
                };
                let (then, otherwise) = (then.boxed(), otherwise.boxed());
                Typed::unboxed(
                    ty,
                    Rc::new(move |frame| if condition(frame)? { then(frame) } else { otherwise(frame) }),
                )
            }
            Expression::Attribute { object, name } => self.typed_attribute(object, name)?,
            Expression::Call { callee, args } => match callee.as_ref() {
                Expression::Attribute { object, name } => self.typed_method_call(expr, object, name, args)?,
                _ => Typed::Boxed(StaticType::Dynamic, self.expr(expr)?),
            },
            Expression::Convert { value, target } => self.typed_convert(value, target)?,
            Expression::Cast { value, target } => {
                let ty = self.named_type(target)?;
                let value = self.typed_expr(value)?;
                let static_type = StaticType::from_key(ty.key());
                if value.static_type() == static_type {
                    value
                } else {
                    let value = value.boxed();
                    let marker = Value::Type(ty);
                    Typed::unboxed(static_type, Rc::new(move |frame| cast(value(frame)?, &marker)))
                }
            }
            Expression::TypedEval(inner) => self.typed_expr(inner)?,
            other => Typed::Boxed(StaticType::Dynamic, self.expr(other)?),
        })
    }

    fn typed_name(&mut self, name: &str) -> CompileResult<Typed> {
        let read = self.name(name)?;
        let ty = match self.scopes.resolve(name) {
            Binding::Local(slot) => self.scope().static_type(slot),
            _ => StaticType::Dynamic,
        };
        Ok(Typed::unboxed(ty, read))
    }

    /// Truth value of an expression, natively for scalars.
    fn typed_truth(&mut self, expr: &Expression) -> CompileResult<BoolEval> {
        Ok(match self.typed_expr(expr)? {
            Typed::Bool(eval) => eval,
            Typed::Int(eval) => Rc::new(move |frame| Ok(eval(frame)? != 0)),
            Typed::Float(eval) => Rc::new(move |frame| Ok(eval(frame)? != 0.0)),
            Typed::Str(eval) => Rc::new(move |frame| Ok(!eval(frame)?.is_empty())),
            Typed::Boxed(_, eval) => Rc::new(move |frame| eval(frame)?.truthy(frame.rt)),
        })
    }

    pub(crate) fn typed_condition(&mut self, test: &Expression) -> CompileResult<BoolEval> {
        self.typed_truth(test)
    }

    /// Value checked against a declared type: rejected at compile time when
    /// the static types cannot agree, checked at run time when unknown.
    pub(crate) fn typed_value(&mut self, expr: &Expression, declared: &StaticType, what: &str) -> CompileResult<Eval> {
        let value = self.typed_expr(expr)?;
        let found = value.static_type();
        if *declared == StaticType::Dynamic || found == *declared {
            return Ok(value.boxed());
        }
        if found != StaticType::Dynamic && !found.widens_to(declared) {
            return Err(self.error(format!(
                "{what} has type {}, expected {}",
                found.name(),
                declared.name()
            )));
        }
        let (declared, what, value) = (declared.clone(), what.to_string(), value.boxed());
        Ok(Rc::new(move |frame| coerce(&declared, value(frame)?, &what)))
    }

    fn typed_attribute(&mut self, object: &Expression, name: &str) -> CompileResult<Typed> {
        let receiver = self.typed_expr(object)?;
        let Some(ty) = self.bindable(&receiver.static_type(), name) else {
            let receiver = receiver.boxed();
            let name = name.to_string();
            return Ok(Typed::Boxed(
                StaticType::Dynamic,
                Rc::new(move |frame| receiver(frame)?.get_attr(frame.rt, &name)),
            ));
        };
        let Some(property) = ty.find_property(name).or_else(|| ty.find_field(name)) else {
            let receiver = receiver.boxed();
            let name = name.to_string();
            return Ok(Typed::Boxed(
                StaticType::Dynamic,
                Rc::new(move |frame| receiver(frame)?.get_attr(frame.rt, &name)),
            ));
        };
        let (getter, result) = (property.getter(), property.ty.clone());
        let receiver = receiver.boxed();
        Ok(Typed::unboxed(
            result,
            Rc::new(move |frame| getter(frame.rt, &receiver(frame)?)),
        ))
    }

    /// Member table members of `ty` can be bound against, unless an
    /// extension claims `name` first.
    fn bindable(&self, ty: &StaticType, name: &str) -> Option<HostType> {
        let key = ty.key()?;
        if self.rt.extensions().contains(&key, name) {
            return None;
        }
        self.rt.types().get(&key)
    }

    fn typed_method_call(
        &mut self,
        call: &Expression,
        object: &Expression,
        name: &str,
        args: &[Argument],
    ) -> CompileResult<Typed> {
        let positional: Option<Vec<&Expression>> = args
            .iter()
            .map(|arg| match arg {
                Argument::Positional(value) => Some(value),
                _ => None,
            })
            .collect();
        let receiver = self.typed_expr(object)?;
        let (Some(positional), Some(ty)) = (positional, self.bindable(&receiver.static_type(), name)) else {
            return Ok(Typed::Boxed(StaticType::Dynamic, self.expr(call)?));
        };
        if !ty.has_method(name) {
            return Ok(Typed::Boxed(StaticType::Dynamic, self.expr(call)?));
        }
        let args = positional
            .into_iter()
            .map(|arg| self.typed_expr(arg))
            .collect::<CompileResult<Vec<_>>>()?;
        let kinds: Vec<StaticType> = args.iter().map(Typed::static_type).collect();
        if kinds.contains(&StaticType::Dynamic) {
            return Ok(Typed::Boxed(StaticType::Dynamic, self.expr(call)?));
        }
        let candidates: Vec<_> = ty.methods_named(name).filter(|method| !method.is_static).collect();
        let Some(method) = resolve_overload(&candidates, &kinds, true) else {
            let given: Vec<_> = kinds.iter().map(|kind| kind.name().into_owned()).collect();
            let listed: Vec<_> = candidates.iter().map(|method| method.signature()).collect();
            return Err(self.error(format!(
                "no overload of '{}.{name}' accepts ({}); candidates: {}",
                ty.name(),
                given.join(", "),
                listed.join("; ")
            )));
        };
        let widened: Vec<bool> = if method.variadic {
            vec![false; args.len()]
        } else {
            method
                .params
                .iter()
                .zip(&kinds)
                .map(|(param, kind)| param.ty == StaticType::Float && *kind == StaticType::Int)
                .collect()
        };
        let (invoke, result) = (method.invoker(), method.returns.clone());
        let receiver = receiver.boxed();
        let args: Vec<Eval> = args.into_iter().map(Typed::boxed).collect();
        Ok(Typed::unboxed(
            result,
            Rc::new(move |frame| {
                let receiver = receiver(frame)?;
                let mut values = Vec::with_capacity(args.len());
                for (arg, widen) in args.iter().zip(&widened) {
                    let value = arg(frame)?;
                    values.push(match value {
                        Value::Int(number) if *widen => Value::Float(number as f64),
                        value => value,
                    });
                }
                invoke(frame.rt, &receiver, values)
            }),
        ))
    }

    /// `value as T`: a constructor of `T` chosen for the static type of
    /// `value`, or the runtime conversion when that type is unknown.
    fn typed_convert(&mut self, value: &Expression, target: &Expression) -> CompileResult<Typed> {
        let ty = self.named_type(target)?;
        let result = StaticType::from_key(ty.key());
        let value = self.typed_expr(value)?;
        let source = value.static_type();
        if source == result {
            return Ok(value);
        }
        let marker = Value::Type(ty.clone());
        let value = value.boxed();
        if source != StaticType::Dynamic {
            let candidates: Vec<_> = ty.constructors().iter().collect();
            if let Some(constructor) = resolve_overload(&candidates, std::slice::from_ref(&source), true) {
                let invoke = constructor.invoker();
                return Ok(Typed::unboxed(
                    result,
                    Rc::new(move |frame| invoke(frame.rt, &marker, vec![value(frame)?])),
                ));
            }
            if !self.rt.extensions().contains(ty.key(), "__new__") {
                return Err(self.error(format!("cannot convert {} to {}", source.name(), ty.name())));
            }
        }
        Ok(Typed::unboxed(
            result,
            Rc::new(move |frame| marker.call(frame.rt, vec![value(frame)?])),
        ))
    }

    /// Static element type of a `for` loop over `iterable`, for typed
    /// routines.
    pub(crate) fn element_type(&mut self, iterable: &Expression) -> StaticType {
        if !self.scope().typed {
            return StaticType::Dynamic;
        }
        match iterable {
            Expression::Call { callee, .. } if matches!(callee.as_ref(), Expression::Name(name) if name == "range") => {
                StaticType::Int
            }
            Expression::Str(_) => StaticType::Str,
            Expression::Name(name) => match self.scopes.resolve(name) {
                Binding::Local(slot) if self.scope().static_type(slot) == StaticType::Str => StaticType::Str,
                _ => StaticType::Dynamic,
            },
            _ => StaticType::Dynamic,
        }
    }
}

fn typed_binary(op: BinaryOperator, left: Typed, right: Typed) -> Typed {
    let native = match (&left, &right) {
        (Typed::Int(a), Typed::Int(b)) => int_binary(op, a, b),
        (Typed::Float(a), Typed::Float(b)) => float_binary(op, a, b),
        (Typed::Str(a), Typed::Str(b)) => str_binary(op, a, b),
        (Typed::Bool(a), Typed::Bool(b)) if matches!(op, BinaryOperator::Eq | BinaryOperator::Ne) => {
            let (a, b, equal) = (a.clone(), b.clone(), op == BinaryOperator::Eq);
            Some(Typed::Bool(Rc::new(move |frame| Ok((a(frame)? == b(frame)?) == equal))))
        }
        _ => None,
    };
    if let Some(native) = native {
        return native;
    }
    let (left, right) = (left.boxed(), right.boxed());
    Typed::Boxed(
        StaticType::Dynamic,
        Rc::new(move |frame| ops::binary(frame.rt, op, &left(frame)?, &right(frame)?)),
    )
}

fn typed_unary(op: UnaryOperator, operand: Typed) -> Typed {
    match (op, operand) {
        (UnaryOperator::Neg, Typed::Int(eval)) => {
            Typed::Int(Rc::new(move |frame| eval(frame)?.checked_neg().ok_or_else(overflow)))
        }
        (UnaryOperator::Invert, Typed::Int(eval)) => Typed::Int(Rc::new(move |frame| Ok(!eval(frame)?))),
        (UnaryOperator::Neg, Typed::Float(eval)) => Typed::Float(Rc::new(move |frame| Ok(-eval(frame)?))),
        (UnaryOperator::Pos, operand @ (Typed::Int(_) | Typed::Float(_))) => operand,
        (op, operand) => {
            let operand = operand.boxed();
            Typed::Boxed(
                StaticType::Dynamic,
                Rc::new(move |frame| ops::unary(frame.rt, op, &operand(frame)?)),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::Error;
    use crate::interpreter::Interpreter;
    use crate::runtime::value::Value;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn run(source: &str, expression: &str) -> Result<Value, Error> {
        let rt = Interpreter::new(Config::default())?;
        let module = rt.run_source("typed", source)?;
        rt.eval_snippet(&module, expression)
    }

    #[test]
    fn annotated_functions_compute_natively() {
        let value = run(
            indoc! {"
                def total(n: int) -> int:
                    acc = 0
                    for i in range(n):
                        acc = acc + i * 2
                    return acc
            "},
            "total(5)",
        )
        .expect("run");
        assert_eq!(value, Value::Int(20));
    }

    #[test]
    fn integer_arguments_widen_to_float_parameters() {
        let value = run("def half(x: float) -> float:\n    return x / 2.0\n", "half(3)").expect("run");
        assert_eq!(value, Value::Float(1.5));
    }

    #[test]
    fn reassigning_a_typed_local_with_another_type_is_rejected() {
        let error = run(
            indoc! {"
                def broken(n: int):
                    n = 'text'
            "},
            "0",
        )
        .expect_err("compile error");
        assert!(error.to_string().contains("cannot assign str to 'n' of type int"), "{error}");
    }

    #[test]
    fn host_members_bind_at_compile_time() {
        let value = run(
            indoc! {"
                def shout(word: str) -> str:
                    return word.upper() + '!'
            "},
            "shout('hey')",
        )
        .expect("run");
        assert_eq!(value, Value::str("HEY!"));
    }

    #[test]
    fn overload_failures_surface_while_compiling() {
        let error = run(
            indoc! {"
                def bad(word: str):
                    return word.startswith(1)
            "},
            "0",
        )
        .expect_err("compile error");
        assert!(error.to_string().contains("no overload of 'str.startswith'"), "{error}");
    }

    #[test]
    fn overloads_resolve_inside_nested_expressions() {
        for body in [
            "    print(word.startswith(1))\n",
            "    word.startswith(1)\n",
            "    parts = [word.startswith(1)]\n",
            "    for ch in word.split(2):\n        pass\n",
        ] {
            let source = format!("def bad(word: str):\n{body}");
            let error = run(&source, "0").expect_err("compile error");
            assert!(error.is_syntax_error(), "{error}");
            assert!(error.to_string().contains("no overload of 'str."), "{error}");
        }
    }

    #[test]
    fn unannotated_returns_still_compute_natively() {
        let value = run("def scaled(n: int):\n    return len([n]) + n * 3\n", "scaled(4)").expect("run");
        assert_eq!(value, Value::Int(13));
    }

    #[test]
    fn typed_arguments_are_checked_on_entry() {
        let error = run("def twice(n: int) -> int:\n    return n * 2\n", "twice('x')").expect_err("type error");
        assert!(error.to_string().contains("'n' must be int, not str"), "{error}");
    }

    #[test]
    fn conversions_and_casts() {
        let value = run("", "(eval(2 + 3), '42' as int, 7 @ int)").expect("run");
        assert_eq!(value, Value::tuple(vec![Value::Int(5), Value::Int(42), Value::Int(7)]));
    }
}
