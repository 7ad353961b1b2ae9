//! Native functions seeded into the prelude namespace.
//!
//! The host type markers (`int`, `str`, `list`, ...) are seeded next to them;
//! calling a marker runs the type's constructor, so conversions need no
//! builtin of their own.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::ast::BinaryOperator;
use crate::interpreter::{Interpreter, Module};
use crate::runtime::callable::{Function, split_keywords, take_args};
use crate::runtime::class::SuperRef;
use crate::runtime::dict::Dict;
use crate::runtime::dispatch::instance_of_class;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::exception::stop_iteration;
use crate::runtime::iter::ValueIter;
use crate::runtime::list::slice_indices;
use crate::runtime::ops::{self, sort_values};
use crate::runtime::value::{Range, Value};

type Builtin = fn(&Interpreter, Vec<Value>) -> RuntimeResult<Value>;

const BUILTINS: &[(&str, Builtin)] = &[
    ("print", print),
    ("len", len),
    ("repr", repr),
    ("isinstance", isinstance),
    ("issubclass", issubclass),
    ("type", type_of),
    ("iter", iter),
    ("next", next),
    ("hasattr", hasattr),
    ("getattr", getattr),
    ("setattr", setattr),
    ("callable", callable),
    ("id", id),
    ("abs", abs),
    ("round", round),
    ("chr", chr),
    ("ord", ord),
    ("sorted", sorted),
    ("enumerate", enumerate),
    ("zip", zip),
    ("sum", sum),
    ("globals", globals),
    ("super", super_),
    ("staticmethod", staticmethod),
    ("slice", slice),
    ("__import__", import),
    ("__extend__", extend),
];

/// Binds every builtin function, the root class and the host type markers
/// into `module`.
pub fn install(rt: &Interpreter, module: &Module) {
    for (name, builtin) in BUILTINS {
        module.set(*name, Value::Function(Rc::new(Function::native(*name, *builtin))));
    }
    module.set("object", Value::Class(rt.object_class()));
    for ty in rt.types().all() {
        let name = ty.name().to_string();
        module.set(name, Value::Type(ty));
    }
    debug!("installed {} builtins", BUILTINS.len());
}

fn print(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let (args, keywords) = split_keywords(args);
    let mut sep = " ".to_string();
    let mut end = "\n".to_string();
    for (name, value) in keywords {
        let text = match &value {
            Value::None => continue,
            other => other.to_str(rt)?,
        };
        match &*name {
            "sep" => sep = text,
            "end" => end = text,
            other => {
                return Err(RuntimeError::type_error(format!(
                    "'{other}' is an invalid keyword argument for print()"
                )));
            }
        }
    }
    let mut line = args
        .iter()
        .map(|arg| arg.to_str(rt))
        .collect::<RuntimeResult<Vec<_>>>()?
        .join(&sep);
    line.push_str(&end);
    rt.write_output(&line);
    Ok(Value::None)
}

fn len(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [value] = take_args("len", args)?;
    Ok(Value::Int(value.len(rt)? as i64))
}

fn repr(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [value] = take_args("repr", args)?;
    Ok(Value::str(value.repr(rt)?))
}

fn matches_type(value: &Value, target: &Value) -> RuntimeResult<bool> {
    match target {
        Value::Class(class) => Ok(instance_of_class(value, class)),
        Value::Type(_) => Ok(value.is_(target)),
        Value::Tuple(targets) => {
            for target in targets.iter() {
                if matches_type(value, target)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(RuntimeError::type_error(format!(
            "isinstance() arg 2 must be a type or tuple of types, not '{}'",
            other.type_name()
        ))),
    }
}

fn isinstance(_rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [value, target] = take_args("isinstance", args)?;
    Ok(Value::Bool(matches_type(&value, &target)?))
}

fn issubclass(_rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [class, target] = take_args("issubclass", args)?;
    let Value::Class(class) = class else {
        return Err(RuntimeError::type_error("issubclass() arg 1 must be a class"));
    };
    let subclass_of = |target: &Value| match target {
        Value::Class(target) => Ok(class.is_subclass_of(target)),
        other => Err(RuntimeError::type_error(format!(
            "issubclass() arg 2 must be a class, not '{}'",
            other.type_name()
        ))),
    };
    let found = match &target {
        Value::Tuple(targets) => {
            let mut found = false;
            for target in targets.iter() {
                found |= subclass_of(target)?;
            }
            found
        }
        other => subclass_of(other)?,
    };
    Ok(Value::Bool(found))
}

fn type_of(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [value] = take_args("type", args)?;
    match &value {
        Value::Object(object) => Ok(Value::Class(object.class.clone())),
        other => rt.types().type_of(other).map(Value::Type).ok_or_else(|| {
            RuntimeError::type_error(format!("type of '{}' values is not inspectable", other.type_name()))
        }),
    }
}

fn iter(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [value] = take_args("iter", args)?;
    value.make_iterator(rt)
}

fn next(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    RuntimeError::expect_arity_range("next", 1, 2, args.len())?;
    let mut args = args.into_iter();
    let (iterator, default) = (args.next().unwrap_or(Value::None), args.next());
    let item = match &iterator {
        Value::Iterator(cursor) => {
            let mut cursor = cursor
                .try_borrow_mut()
                .map_err(|_| RuntimeError::value_error("iterator already executing"))?;
            cursor.next(rt)?
        }
        Value::Object(_) => {
            let mark = rt.state().trace_mark();
            match iterator.call_method(rt, "__next__", Vec::new()) {
                Ok(item) => Some(item),
                Err(RuntimeError::Raised(raised)) if raised.is_stop_iteration() && default.is_some() => {
                    rt.state().truncate_trace(mark);
                    None
                }
                Err(error) => return Err(error),
            }
        }
        other => {
            return Err(RuntimeError::type_error(format!(
                "'{}' object is not an iterator",
                other.type_name()
            )));
        }
    };
    match (item, default) {
        (Some(item), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(stop_iteration()),
    }
}

fn attribute_name(value: &Value) -> RuntimeResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RuntimeError::type_error("attribute name must be string"))
}

/// Reads an attribute, mapping a missing one to `None`. A deferred host
/// member only counts as present when some method could answer it.
fn lookup_attr(rt: &Interpreter, value: &Value, name: &str) -> RuntimeResult<Option<Value>> {
    let mark = rt.state().trace_mark();
    match value.get_attr(rt, name) {
        Ok(Value::Nil(member)) if !member.is_resolvable() => Ok(None),
        Ok(found) => Ok(Some(found)),
        Err(error) if is_attribute_error(&error) => {
            rt.state().truncate_trace(mark);
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

/// Native attribute errors and script-raised `AttributeError` subclasses.
fn is_attribute_error(error: &RuntimeError) -> bool {
    match error {
        RuntimeError::Attribute(_) => true,
        RuntimeError::Raised(raised) => raised.is_instance_of("AttributeError"),
        _ => false,
    }
}

fn hasattr(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [value, name] = take_args("hasattr", args)?;
    Ok(Value::Bool(lookup_attr(rt, &value, &attribute_name(&name)?)?.is_some()))
}

fn getattr(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    RuntimeError::expect_arity_range("getattr", 2, 3, args.len())?;
    let mut args = args.into_iter();
    let value = args.next().unwrap_or(Value::None);
    let name = attribute_name(&args.next().unwrap_or(Value::None))?;
    match args.next() {
        Some(default) => Ok(lookup_attr(rt, &value, &name)?.unwrap_or(default)),
        None => value.get_attr(rt, &name),
    }
}

fn setattr(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [target, name, value] = take_args("setattr", args)?;
    target.set_attr(rt, &attribute_name(&name)?, value)?;
    Ok(Value::None)
}

fn callable(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [value] = take_args("callable", args)?;
    Ok(Value::Bool(match &value {
        Value::Function(_) | Value::BoundMethod(_) | Value::Class(_) | Value::Type(_) => true,
        Value::Nil(member) => member.is_resolvable(),
        Value::Object(object) => object.class.has_member("__call__"),
        other => rt.extensions().contains(&other.type_key(), "__call__"),
    }))
}

fn id(_rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [value] = take_args("id", args)?;
    Ok(Value::Int(value.identity() as i64))
}

fn abs(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [value] = take_args("abs", args)?;
    match value {
        Value::Int(number) => number
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::Overflow("integer absolute value overflow".into())),
        Value::Bool(flag) => Ok(Value::Int(i64::from(flag))),
        Value::Float(number) => Ok(Value::Float(number.abs())),
        Value::Object(_) => value.call_method(rt, "__abs__", Vec::new()),
        other => Err(RuntimeError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn round(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    RuntimeError::expect_arity_range("round", 1, 2, args.len())?;
    let mut args = args.into_iter();
    let value = args.next().unwrap_or(Value::None);
    let digits = match args.next() {
        None | Some(Value::None) => None,
        Some(digits) => Some(digits.as_int().ok_or_else(|| {
            RuntimeError::type_error("round() digits must be an integer")
        })?),
    };
    match (&value, digits) {
        (Value::Int(_) | Value::Bool(_), _) => Ok(Value::Int(value.as_int().unwrap_or_default())),
        (Value::Float(number), None) if number.is_nan() => {
            Err(RuntimeError::value_error("cannot convert float NaN to integer"))
        }
        (Value::Float(number), None) if number.is_infinite() => Err(RuntimeError::Overflow(
            "cannot convert float infinity to integer".into(),
        )),
        (Value::Float(number), None) => Ok(Value::Int(round_half_even(*number) as i64)),
        (Value::Float(number), Some(_)) if !number.is_finite() => Ok(Value::Float(*number)),
        (Value::Float(number), Some(digits)) if digits >= 0 => {
            // Formatting rounds the exact binary value, ties to even.
            let precision = digits.min(400) as usize;
            let text = format!("{number:.precision$}");
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| RuntimeError::value_error(format!("cannot round {text}")))
        }
        (Value::Float(number), Some(digits)) => {
            let scale = 10f64.powi(digits.max(-308) as i32);
            Ok(Value::Float(round_half_even(number * scale) / scale))
        }
        (Value::Object(_), _) => value.call_method(rt, "__round__", Vec::new()),
        (other, _) => Err(RuntimeError::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn round_half_even(number: f64) -> f64 {
    let rounded = number.round();
    if (number - number.trunc()).abs() == 0.5 {
        2.0 * (number / 2.0).round()
    } else {
        rounded
    }
}

fn chr(_rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [code] = take_args("chr", args)?;
    let code = code
        .as_int()
        .ok_or_else(|| RuntimeError::type_error("an integer is required"))?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|ch| Value::str(ch.to_string()))
        .ok_or_else(|| RuntimeError::value_error("chr() arg not in range(0x110000)"))
}

fn ord(_rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [text] = take_args("ord", args)?;
    let mut chars = text.as_str().unwrap_or_default().chars();
    match (chars.next(), chars.next(), &text) {
        (Some(ch), None, Value::Str(_)) => Ok(Value::Int(i64::from(u32::from(ch)))),
        (_, _, Value::Str(_)) => Err(RuntimeError::type_error(
            "ord() expected a character, but string of different length found",
        )),
        (_, _, other) => Err(RuntimeError::type_error(format!(
            "ord() expected string of length 1, but {} found",
            other.type_name()
        ))),
    }
}

fn sorted(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let (args, keywords) = split_keywords(args);
    let [iterable] = take_args("sorted", args)?;
    let mut key = None;
    let mut reverse = false;
    for (name, value) in keywords {
        match &*name {
            "key" => key = Some(value),
            "reverse" => reverse = value.truthy(rt)?,
            other => {
                return Err(RuntimeError::type_error(format!(
                    "'{other}' is an invalid keyword argument for sorted()"
                )));
            }
        }
    }
    let items = iterable.to_vec(rt)?;
    Ok(Value::list(sort_values(rt, items, key.as_ref(), reverse)?))
}

fn one_shot(items: Vec<Value>) -> Value {
    Value::Iterator(Rc::new(RefCell::new(ValueIter::Owned(items.into_iter()))))
}

fn enumerate(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let (args, keywords) = split_keywords(args);
    RuntimeError::expect_arity_range("enumerate", 1, 2, args.len())?;
    let start = args
        .get(1)
        .or_else(|| keywords.iter().find(|(name, _)| &**name == "start").map(|(_, value)| value))
        .map_or(Some(0), Value::as_int)
        .ok_or_else(|| RuntimeError::type_error("enumerate() start must be an integer"))?;
    let items = args[0].to_vec(rt)?;
    let pairs = items
        .into_iter()
        .zip(start..)
        .map(|(item, index)| Value::tuple(vec![Value::Int(index), item]))
        .collect();
    Ok(one_shot(pairs))
}

fn zip(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut cursors = args
        .iter()
        .map(|arg| arg.iter(rt))
        .collect::<RuntimeResult<Vec<_>>>()?;
    let mut rows = Vec::new();
    if cursors.is_empty() {
        return Ok(one_shot(rows));
    }
    'rows: loop {
        let mut row = Vec::with_capacity(cursors.len());
        for cursor in &mut cursors {
            match cursor.next(rt)? {
                Some(item) => row.push(item),
                None => break 'rows,
            }
        }
        rows.push(Value::tuple(row));
    }
    Ok(one_shot(rows))
}

fn sum(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    RuntimeError::expect_arity_range("sum", 1, 2, args.len())?;
    let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
    if total.as_str().is_some() {
        return Err(RuntimeError::type_error(
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    let mut cursor = args[0].iter(rt)?;
    while let Some(item) = cursor.next(rt)? {
        total = ops::binary(rt, BinaryOperator::Add, &total, &item)?;
    }
    Ok(total)
}

/// Snapshot of the namespace of the module being executed.
fn globals(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    take_args::<0>("globals", args)?;
    let mut dict = Dict::new();
    if let Some(globals) = rt.state().current_globals() {
        for (name, value) in globals.borrow().iter() {
            dict.insert(Value::str(name), value.clone())?;
        }
    }
    Ok(Value::dict(dict))
}

fn super_(_rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [class, receiver] = take_args("super", args)?;
    let Value::Class(class) = class else {
        return Err(RuntimeError::type_error(format!(
            "super() argument 1 must be a class, not {}",
            class.type_name()
        )));
    };
    if !matches!(&receiver, Value::Object(object) if object.class.is_subclass_of(&class))
        && !matches!(&receiver, Value::Class(inner) if inner.is_subclass_of(&class))
    {
        return Err(RuntimeError::type_error(
            "super(type, obj): obj must be an instance or subtype of type",
        ));
    }
    Ok(Value::Super(Rc::new(SuperRef { class, receiver })))
}

fn staticmethod(_rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [function] = take_args("staticmethod", args)?;
    match &function {
        Value::Function(inner) => {
            inner.mark_static();
            Ok(function)
        }
        other => Err(RuntimeError::type_error(format!(
            "staticmethod() expects a function, not '{}'",
            other.type_name()
        ))),
    }
}

fn bound(value: &Value) -> RuntimeResult<Option<i64>> {
    match value {
        Value::None => Ok(None),
        other => other.as_int().map(Some).ok_or_else(|| {
            RuntimeError::type_error("slice indices must be integers or None")
        }),
    }
}

/// `obj[start:stop:step]`.
fn slice(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [target, start, stop, step] = take_args("slice", args)?;
    if let Value::Object(_) = &target {
        return target.call_method(rt, "__getslice__", vec![start, stop, step]);
    }
    let (start, stop, step) = (bound(&start)?, bound(&stop)?, bound(&step)?);
    let pick = |items: &[Value]| -> RuntimeResult<Vec<Value>> {
        Ok(slice_indices(items.len(), start, stop, step)?
            .into_iter()
            .map(|index| items[index].clone())
            .collect())
    };
    match &target {
        Value::List(items) => {
            let items = items.borrow().clone();
            Ok(Value::list(pick(&items[..])?))
        }
        Value::Tuple(items) => Ok(Value::tuple(pick(&items[..])?)),
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let picked: String = slice_indices(chars.len(), start, stop, step)?
                .into_iter()
                .map(|index| chars[index])
                .collect();
            Ok(Value::str(picked))
        }
        Value::Range(range) => {
            let positions = slice_indices(range.len(), start, stop, step)?;
            let step = range
                .step
                .checked_mul(step.unwrap_or(1))
                .ok_or_else(|| RuntimeError::Overflow("range step too large".into()))?;
            let picked = |index: Option<&usize>| index.and_then(|index| range.get(*index));
            let (start, stop) = match (picked(positions.first()), picked(positions.last())) {
                // The stop only needs to lie past the last element.
                (Some(first), Some(last)) => (first, last.saturating_add(step)),
                _ => (range.start, range.start),
            };
            Ok(Value::Range(Range { start, stop, step }))
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn import(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [path] = take_args("__import__", args)?;
    let path = path
        .as_str()
        .ok_or_else(|| RuntimeError::type_error("__import__() argument must be a string"))?;
    Ok(Value::Module(rt.import(path)?))
}

/// `__extend__(type, name, function)`: attaches `function` to every value of
/// a host type.
fn extend(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let [target, name, function] = take_args("__extend__", args)?;
    let key = match &target {
        Value::Type(ty) => ty.key().clone(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "extensions attach to host types, not '{}'",
                other.type_name()
            )));
        }
    };
    let name = attribute_name(&name)?;
    let Value::Function(routine) = &function else {
        return Err(RuntimeError::type_error(format!(
            "extension '{name}' must be a function, not '{}'",
            function.type_name()
        )));
    };
    rt.register_extension(key, &name, routine.clone());
    Ok(function)
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::interpreter::Interpreter;
    use crate::runtime::value::Value;
    use pretty_assertions::assert_eq;

    fn eval(expression: &str) -> Value {
        let rt = Interpreter::new(Config::captured()).expect("interpreter");
        let module = rt.new_module("test");
        rt.eval_snippet(&module, expression).expect("eval")
    }

    #[test]
    fn sorted_is_stable_and_keyed() {
        assert_eq!(
            eval("sorted(['bb', 'a', 'cc', 'd'], key=len)"),
            Value::list(vec![Value::str("a"), Value::str("d"), Value::str("bb"), Value::str("cc")])
        );
        assert_eq!(
            eval("sorted([3, 1, 2], reverse=True)"),
            Value::list(vec![Value::Int(3), Value::Int(2), Value::Int(1)])
        );
    }

    #[test]
    fn enumerate_and_zip_pair_items() {
        assert_eq!(
            eval("list(enumerate('ab', 1))"),
            Value::list(vec![
                Value::tuple(vec![Value::Int(1), Value::str("a")]),
                Value::tuple(vec![Value::Int(2), Value::str("b")]),
            ])
        );
        assert_eq!(
            eval("list(zip([1, 2, 3], 'xy'))"),
            Value::list(vec![
                Value::tuple(vec![Value::Int(1), Value::str("x")]),
                Value::tuple(vec![Value::Int(2), Value::str("y")]),
            ])
        );
    }

    #[test]
    fn slicing_covers_sequences_and_ranges() {
        assert_eq!(eval("'hello'[1:4]"), Value::str("ell"));
        assert_eq!(eval("[1, 2, 3, 4][::-2]"), Value::list(vec![Value::Int(4), Value::Int(2)]));
        assert_eq!(eval("list(range(10)[2:8:3])"), Value::list(vec![Value::Int(2), Value::Int(5)]));
    }

    #[test]
    fn type_tests_distinguish_host_types() {
        assert_eq!(eval("isinstance(1, (str, int))"), Value::Bool(true));
        assert_eq!(eval("isinstance('x', int)"), Value::Bool(false));
        assert_eq!(eval("type('x') is str"), Value::Bool(true));
    }

    #[test]
    fn hasattr_and_getattr_see_host_members() {
        assert_eq!(eval("hasattr('x', 'upper')"), Value::Bool(true));
        assert_eq!(eval("hasattr('x', 'nothing')"), Value::Bool(false));
        assert_eq!(eval("getattr([], 'missing', 5)"), Value::Int(5));
    }

    #[test]
    fn next_falls_back_to_the_default() {
        assert_eq!(eval("next(iter([]), 'done')"), Value::str("done"));
        assert_eq!(eval("next(iter([7]))"), Value::Int(7));
    }

    #[test]
    fn round_uses_bankers_rounding() {
        assert_eq!(eval("round(2.5)"), Value::Int(2));
        assert_eq!(eval("round(3.5)"), Value::Int(4));
        assert_eq!(eval("round(1.25, 1)"), Value::Float(1.2));
    }

    #[test]
    fn round_with_digits_uses_the_stored_value() {
        assert_eq!(eval("round(2.675, 2)"), Value::Float(2.67));
        assert_eq!(eval("round(0.125, 2)"), Value::Float(0.12));
        assert_eq!(eval("round(1234.5678, 0)"), Value::Float(1235.0));
        assert_eq!(eval("round(1250.0, -2)"), Value::Float(1200.0));
        assert_eq!(eval("round(0.1, 30)"), Value::Float(0.1));
    }
}
