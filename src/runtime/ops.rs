//! Operator dispatch.
//!
//! Script objects are asked first (the left operand's hook, then the right
//! operand's reflected hook), then any extension registered for the left
//! operand's type, and finally the builtin semantics of the value kinds.

use std::cmp::Ordering;

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::interpreter::Interpreter;
use crate::runtime::dict::ValueSet;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::list::{merge_sort, repeat, repeat_len};
use crate::runtime::value::Value;

pub fn binary(rt: &Interpreter, op: BinaryOperator, left: &Value, right: &Value) -> RuntimeResult<Value> {
    if let Value::Object(object) = left
        && object.class.has_member(op.magic_name())
    {
        return left.call_method(rt, op.magic_name(), vec![right.clone()]);
    }
    if let Value::Object(object) = right
        && let Some(reflected) = reflected_name(op)
        && object.class.has_member(reflected)
    {
        return right.call_method(rt, reflected, vec![left.clone()]);
    }
    if !matches!(left, Value::Object(_))
        && let Some(extension) = rt.extensions().lookup(&left.type_key(), op.magic_name())
    {
        return extension.call(rt, vec![left.clone(), right.clone()]);
    }
    if let Some(value) = builtin_binary(rt, op, left, right)? {
        return Ok(value);
    }
    match op {
        BinaryOperator::Eq => Ok(Value::Bool(left.equals(rt, right)?)),
        BinaryOperator::Ne => Ok(Value::Bool(!left.equals(rt, right)?)),
        _ if op.is_comparison() => Err(RuntimeError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
        _ => Err(RuntimeError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Hook looked up on the right operand when the left one has none.
fn reflected_name(op: BinaryOperator) -> Option<&'static str> {
    Some(match op {
        BinaryOperator::Add => "__radd__",
        BinaryOperator::Sub => "__rsub__",
        BinaryOperator::Mul => "__rmul__",
        BinaryOperator::Div => "__rdiv__",
        BinaryOperator::FloorDiv => "__rfloordiv__",
        BinaryOperator::Mod => "__rmod__",
        BinaryOperator::Pow => "__rpow__",
        BinaryOperator::Lt => "__gt__",
        BinaryOperator::Le => "__ge__",
        BinaryOperator::Gt => "__lt__",
        BinaryOperator::Ge => "__le__",
        BinaryOperator::Eq => "__eq__",
        BinaryOperator::Ne => "__ne__",
        _ => return None,
    })
}

fn builtin_binary(
    rt: &Interpreter,
    op: BinaryOperator,
    left: &Value,
    right: &Value,
) -> RuntimeResult<Option<Value>> {
    use BinaryOperator::*;

    if op.is_comparison() && !matches!(op, Eq | Ne) {
        return Ok(ordering(rt, left, right)?.map(|order| {
            Value::Bool(match op {
                Lt => order == Ordering::Less,
                Le => order != Ordering::Greater,
                Gt => order == Ordering::Greater,
                _ => order != Ordering::Less,
            })
        }));
    }

    Ok(Some(match (left, right) {
        (Value::Bool(a), Value::Bool(b)) if matches!(op, BitAnd | BitOr | BitXor) => Value::Bool(match op {
            BitAnd => a & b,
            BitOr => a | b,
            _ => a ^ b,
        }),
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            let (Some(a), Some(b)) = (left.as_int(), right.as_int()) else {
                return Ok(None);
            };
            match int_binary(op, a, b)? {
                Some(value) => value,
                None => return Ok(None),
            }
        }
        (Value::Float(_) | Value::Int(_) | Value::Bool(_), Value::Float(_) | Value::Int(_) | Value::Bool(_)) => {
            let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
                return Ok(None);
            };
            match float_binary(op, a, b)? {
                Some(value) => value,
                None => return Ok(None),
            }
        }
        (Value::Str(a), Value::Str(b)) if op == Add => Value::str(format!("{a}{b}")),
        (Value::Str(text), Value::Int(times)) | (Value::Int(times), Value::Str(text)) if op == Mul => {
            repeat_len(text.len(), *times)?;
            Value::str(text.repeat((*times).max(0) as usize))
        }
        (Value::List(a), Value::List(b)) if op == Add => {
            let mut joined = a.borrow().clone();
            joined.extend(b.borrow().iter().cloned());
            Value::list(joined)
        }
        (Value::List(items), Value::Int(times)) | (Value::Int(times), Value::List(items)) if op == Mul => {
            Value::list(repeat(&items.borrow(), *times)?)
        }
        (Value::Tuple(a), Value::Tuple(b)) if op == Add => {
            Value::tuple(a.iter().chain(b.iter()).cloned().collect())
        }
        (Value::Tuple(items), Value::Int(times)) | (Value::Int(times), Value::Tuple(items)) if op == Mul => {
            Value::tuple(repeat(items, *times)?)
        }
        (Value::Set(a), Value::Set(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            let combined: ValueSet = match op {
                BitOr => a.iter().chain(b.iter()).map(|(k, v)| (k.clone(), v.clone())).collect(),
                BitAnd => a.iter().filter(|(k, _)| b.contains_key(*k)).map(|(k, v)| (k.clone(), v.clone())).collect(),
                Sub => a.iter().filter(|(k, _)| !b.contains_key(*k)).map(|(k, v)| (k.clone(), v.clone())).collect(),
                BitXor => a
                    .iter()
                    .filter(|(k, _)| !b.contains_key(*k))
                    .chain(b.iter().filter(|(k, _)| !a.contains_key(*k)))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                _ => return Ok(None),
            };
            Value::set(combined)
        }
        (Value::Dict(a), Value::Dict(b)) if op == BitOr => {
            let mut merged = a.borrow().clone();
            for (key, value) in b.borrow().items() {
                merged.insert(key.clone(), value.clone())?;
            }
            Value::dict(merged)
        }
        _ => return Ok(None),
    }))
}

fn int_binary(op: BinaryOperator, a: i64, b: i64) -> RuntimeResult<Option<Value>> {
    use BinaryOperator::*;
    let overflow = || RuntimeError::Overflow("integer result too large".into());
    Ok(Some(match op {
        Add => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
        Sub => Value::Int(a.checked_sub(b).ok_or_else(overflow)?),
        Mul => Value::Int(a.checked_mul(b).ok_or_else(overflow)?),
        Div => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision("division by zero".into()));
            }
            Value::Float(a as f64 / b as f64)
        }
        FloorDiv => Value::Int(floor_div(a, b)?),
        Mod => Value::Int(floor_mod(a, b)?),
        Pow if b < 0 && a == 0 => {
            return Err(RuntimeError::ZeroDivision(
                "0.0 cannot be raised to a negative power".into(),
            ));
        }
        Pow if b < 0 => Value::Float((a as f64).powf(b as f64)),
        Pow => {
            let exponent = u32::try_from(b).map_err(|_| overflow())?;
            Value::Int(a.checked_pow(exponent).ok_or_else(overflow)?)
        }
        LShift => {
            if b < 0 {
                return Err(RuntimeError::value_error("negative shift count"));
            }
            if a == 0 {
                Value::Int(0)
            } else if b >= 63 {
                return Err(overflow());
            } else {
                let shifted = a << b;
                if shifted >> b != a {
                    return Err(overflow());
                }
                Value::Int(shifted)
            }
        }
        RShift => {
            if b < 0 {
                return Err(RuntimeError::value_error("negative shift count"));
            }
            Value::Int(if b >= 64 { if a < 0 { -1 } else { 0 } } else { a >> b })
        }
        BitAnd => Value::Int(a & b),
        BitOr => Value::Int(a | b),
        BitXor => Value::Int(a ^ b),
        _ => return Ok(None),
    }))
}

fn float_binary(op: BinaryOperator, a: f64, b: f64) -> RuntimeResult<Option<Value>> {
    use BinaryOperator::*;
    let zero = || RuntimeError::ZeroDivision("float division by zero".into());
    Ok(Some(Value::Float(match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        Div if b == 0.0 => return Err(zero()),
        Div => a / b,
        FloorDiv if b == 0.0 => return Err(zero()),
        FloorDiv => (a / b).floor(),
        Mod if b == 0.0 => return Err(RuntimeError::ZeroDivision("float modulo".into())),
        Mod => {
            let remainder = a % b;
            if remainder != 0.0 && (remainder < 0.0) != (b < 0.0) {
                remainder + b
            } else {
                remainder
            }
        }
        Pow if a == 0.0 && b < 0.0 => {
            return Err(RuntimeError::ZeroDivision(
                "0.0 cannot be raised to a negative power".into(),
            ));
        }
        Pow => a.powf(b),
        _ => return Ok(None),
    })))
}

pub(crate) fn floor_div(a: i64, b: i64) -> RuntimeResult<i64> {
    if b == 0 {
        return Err(RuntimeError::ZeroDivision("integer division or modulo by zero".into()));
    }
    let quotient = a
        .checked_div(b)
        .ok_or_else(|| RuntimeError::Overflow("integer result too large".into()))?;
    Ok(if a % b != 0 && ((a < 0) != (b < 0)) {
        quotient - 1
    } else {
        quotient
    })
}

pub(crate) fn floor_mod(a: i64, b: i64) -> RuntimeResult<i64> {
    if b == 0 {
        return Err(RuntimeError::ZeroDivision("integer division or modulo by zero".into()));
    }
    let remainder = a.checked_rem(b).unwrap_or(0);
    Ok(if remainder != 0 && ((remainder < 0) != (b < 0)) {
        remainder + b
    } else {
        remainder
    })
}

/// Ordering of two builtin values, `None` when the kinds are not ordered.
pub fn ordering(rt: &Interpreter, left: &Value, right: &Value) -> RuntimeResult<Option<Ordering>> {
    Ok(match (left, right) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            left.as_int().zip(right.as_int()).map(|(a, b)| a.cmp(&b))
        }
        (Value::Int(_) | Value::Bool(_) | Value::Float(_), Value::Int(_) | Value::Bool(_) | Value::Float(_)) => {
            left.as_float()
                .zip(right.as_float())
                .and_then(|(a, b)| a.partial_cmp(&b))
        }
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::List(a), Value::List(b)) => {
            let (a, b) = (a.borrow().clone(), b.borrow().clone());
            sequence_ordering(rt, &a, &b)?
        }
        (Value::Tuple(a), Value::Tuple(b)) => sequence_ordering(rt, a, b)?,
        (Value::Set(a), Value::Set(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            let a_in_b = a.keys().all(|key| b.contains_key(key));
            let b_in_a = b.keys().all(|key| a.contains_key(key));
            match (a_in_b, b_in_a) {
                (true, true) => Some(Ordering::Equal),
                (true, false) => Some(Ordering::Less),
                (false, true) => Some(Ordering::Greater),
                (false, false) => None,
            }
        }
        _ => None,
    })
}

fn sequence_ordering(rt: &Interpreter, a: &[Value], b: &[Value]) -> RuntimeResult<Option<Ordering>> {
    for (left, right) in a.iter().zip(b) {
        if left.equals(rt, right)? {
            continue;
        }
        return match ordering(rt, left, right)? {
            Some(order) => Ok(Some(order)),
            None => Err(RuntimeError::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                left.type_name(),
                right.type_name()
            ))),
        };
    }
    Ok(Some(a.len().cmp(&b.len())))
}

/// Sorting comparator used by `sorted` and `list.sort`.
pub(crate) fn less_than(rt: &Interpreter, left: &Value, right: &Value) -> RuntimeResult<bool> {
    binary(rt, BinaryOperator::Lt, left, right)?.truthy(rt)
}

/// Sorts by `key(item)` (or the items themselves), stably.
pub(crate) fn sort_values(
    rt: &Interpreter,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> RuntimeResult<Vec<Value>> {
    let keyed = items
        .into_iter()
        .map(|item| {
            let sort_key = match key {
                Some(key) if !key.is_none() => key.call(rt, vec![item.clone()])?,
                _ => item.clone(),
            };
            Ok((sort_key, item))
        })
        .collect::<RuntimeResult<Vec<_>>>()?;
    let sorted = merge_sort(keyed, &mut |a, b| {
        if reverse {
            less_than(rt, &b.0, &a.0)
        } else {
            less_than(rt, &a.0, &b.0)
        }
    })?;
    Ok(sorted.into_iter().map(|(_, item)| item).collect())
}

/// Augmented assignment: `x op= y`. Objects may define `__iadd__` and
/// friends; lists grow in place under `+=`; everything else rebinds to the
/// plain binary result.
pub fn inplace(rt: &Interpreter, op: BinaryOperator, left: &Value, right: &Value) -> RuntimeResult<Value> {
    if let Value::Object(object) = left {
        let hook = format!("__i{}", &op.magic_name()[2..]);
        if object.class.has_member(&hook) {
            return left.call_method(rt, &hook, vec![right.clone()]);
        }
    }
    if let (BinaryOperator::Add, Value::List(items)) = (op, left) {
        let extra = right.to_vec(rt)?;
        items.borrow_mut().extend(extra);
        return Ok(left.clone());
    }
    binary(rt, op, left, right)
}

pub fn unary(rt: &Interpreter, op: UnaryOperator, operand: &Value) -> RuntimeResult<Value> {
    if let Value::Object(object) = operand
        && object.class.has_member(op.magic_name())
    {
        return operand.call_method(rt, op.magic_name(), Vec::new());
    }
    if let Some(extension) = rt.extensions().lookup(&operand.type_key(), op.magic_name()) {
        return extension.call(rt, vec![operand.clone()]);
    }
    let symbol = match op {
        UnaryOperator::Neg => "-",
        UnaryOperator::Pos => "+",
        UnaryOperator::Invert => "~",
    };
    match (op, operand) {
        (UnaryOperator::Neg, Value::Float(number)) => Ok(Value::Float(-number)),
        (UnaryOperator::Pos, Value::Float(number)) => Ok(Value::Float(*number)),
        (_, Value::Int(_) | Value::Bool(_)) => {
            let number = operand.as_int().unwrap_or_default();
            Ok(Value::Int(match op {
                UnaryOperator::Neg => number
                    .checked_neg()
                    .ok_or_else(|| RuntimeError::Overflow("integer result too large".into()))?,
                UnaryOperator::Pos => number,
                UnaryOperator::Invert => !number,
            }))
        }
        _ => Err(RuntimeError::type_error(format!(
            "bad operand type for unary {symbol}: '{}'",
            operand.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn floor_division_and_modulo_follow_the_divisor_sign() {
        assert_eq!(floor_div(7, 2).expect("div"), 3);
        assert_eq!(floor_div(-7, 2).expect("div"), -4);
        assert_eq!(floor_div(7, -2).expect("div"), -4);
        assert_eq!(floor_mod(-7, 2).expect("mod"), 1);
        assert_eq!(floor_mod(7, -2).expect("mod"), -1);
        assert!(matches!(floor_div(1, 0), Err(RuntimeError::ZeroDivision(_))));
    }

    #[test]
    fn int_arithmetic_checks_overflow() {
        assert!(matches!(
            int_binary(BinaryOperator::Mul, i64::MAX, 2),
            Err(RuntimeError::Overflow(_))
        ));
        assert!(matches!(
            int_binary(BinaryOperator::LShift, 1, 70),
            Err(RuntimeError::Overflow(_))
        ));
        assert_eq!(
            int_binary(BinaryOperator::Pow, 2, 10).expect("pow"),
            Some(Value::Int(1024))
        );
        assert_eq!(
            int_binary(BinaryOperator::Div, 7, 2).expect("div"),
            Some(Value::Float(3.5))
        );
    }

    #[test]
    fn zero_to_a_negative_power_divides_by_zero() {
        assert!(matches!(
            int_binary(BinaryOperator::Pow, 0, -1),
            Err(RuntimeError::ZeroDivision(_))
        ));
        assert!(matches!(
            float_binary(BinaryOperator::Pow, 0.0, -2.0),
            Err(RuntimeError::ZeroDivision(_))
        ));
        assert_eq!(
            int_binary(BinaryOperator::Pow, 2, -1).expect("pow"),
            Some(Value::Float(0.5))
        );
    }

    fn run(source: &str) -> RuntimeResult<Value> {
        let rt = Interpreter::new(Config::captured()).expect("interpreter");
        let module = rt.run_source("ops", source).map_err(|error| match error.runtime_error() {
            Some(runtime) => runtime.clone(),
            None => RuntimeError::type_error(error.to_string()),
        })?;
        Ok(module.get("result").unwrap_or(Value::None))
    }

    #[test]
    fn repetition_counts_at_the_limits() {
        assert_eq!(run("result = [7] * 0").expect("run"), Value::list(Vec::new()));
        assert_eq!(run("result = -2 * 'ab'").expect("run"), Value::str(""));
        assert_eq!(
            run("result = (1, 2) * 2").expect("run"),
            Value::tuple(vec![Value::Int(1), Value::Int(2), Value::Int(1), Value::Int(2)])
        );
        for source in [
            "result = [0, 0, 0, 0] * 4611686018427387904",
            "result = 'abcd' * 4611686018427387904",
            "result = (1,) * 9223372036854775807",
        ] {
            assert!(matches!(run(source), Err(RuntimeError::Overflow(_))), "{source}");
        }
    }

    #[test]
    fn huge_slice_steps_do_not_overflow() {
        assert_eq!(
            run("result = [1, 2, 3][1::9223372036854775807]").expect("run"),
            Value::list(vec![Value::Int(2)])
        );
        assert_eq!(
            run("result = 'abc'[::-9223372036854775807]").expect("run"),
            Value::str("c")
        );
    }

    #[test]
    fn objects_without_unary_hooks_are_type_errors() {
        let error = run("class Box:\n    pass\nresult = -Box()").expect_err("no hook");
        assert_eq!(
            error.to_string(),
            "TypeError: bad operand type for unary -: 'Box'"
        );
    }
}
