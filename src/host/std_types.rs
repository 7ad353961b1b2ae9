//! Member tables of the builtin value types.
//!
//! Constructors double as the conversion functions (`int(x)`, `str(x)`), so
//! the type markers seeded into every namespace are callable.

use std::cell::RefCell;
use std::rc::Rc;

use crate::host::types::{HostMethod, HostProperty, HostTypeDef, StaticType as T};
use crate::interpreter::Interpreter;
use crate::runtime::callable::split_keywords;
use crate::runtime::dict::{Dict, HashKey, ValueSet, set_from_values};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::list::normalize_index;
use crate::runtime::ops::sort_values;
use crate::runtime::value::{Range, Value};

pub fn definitions() -> Vec<HostTypeDef> {
    vec![
        int_type(),
        float_type(),
        bool_type(),
        str_type(),
        list_type(),
        tuple_type(),
        dict_type(),
        set_type(),
        range_type(),
    ]
}

fn wrong_receiver(expected: &str, found: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "descriptor requires a '{expected}' object but received a '{}'",
        found.type_name()
    ))
}

fn text(receiver: &Value) -> RuntimeResult<Rc<str>> {
    match receiver {
        Value::Str(text) => Ok(text.clone()),
        other => Err(wrong_receiver("str", other)),
    }
}

fn items(receiver: &Value) -> RuntimeResult<Rc<RefCell<Vec<Value>>>> {
    match receiver {
        Value::List(items) => Ok(items.clone()),
        other => Err(wrong_receiver("list", other)),
    }
}

fn mapping(receiver: &Value) -> RuntimeResult<Rc<RefCell<Dict>>> {
    match receiver {
        Value::Dict(dict) => Ok(dict.clone()),
        other => Err(wrong_receiver("dict", other)),
    }
}

fn members(receiver: &Value) -> RuntimeResult<Rc<RefCell<ValueSet>>> {
    match receiver {
        Value::Set(set) => Ok(set.clone()),
        other => Err(wrong_receiver("set", other)),
    }
}

fn arg(args: &[Value], index: usize) -> RuntimeResult<Value> {
    args.get(index)
        .cloned()
        .ok_or_else(|| RuntimeError::type_error(format!("missing argument {}", index + 1)))
}

fn str_arg(args: &[Value], index: usize) -> RuntimeResult<Rc<str>> {
    match arg(args, index)? {
        Value::Str(text) => Ok(text),
        other => Err(RuntimeError::type_error(format!(
            "expected str, got {}",
            other.type_name()
        ))),
    }
}

fn int_arg(args: &[Value], index: usize) -> RuntimeResult<i64> {
    let value = arg(args, index)?;
    value.as_int().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })
}

/// `int(value)`.
pub(crate) fn to_int(rt: &Interpreter, value: &Value) -> RuntimeResult<i64> {
    match value {
        Value::Int(number) => Ok(*number),
        Value::Bool(flag) => Ok(i64::from(*flag)),
        Value::Float(number) if number.is_nan() => {
            Err(RuntimeError::value_error("cannot convert float NaN to integer"))
        }
        Value::Float(number) if number.is_infinite() => Err(RuntimeError::Overflow(
            "cannot convert float infinity to integer".into(),
        )),
        Value::Float(number) => Ok(number.trunc() as i64),
        Value::Str(text) => parse_int(text, 10),
        Value::Object(_) => match value.call_method(rt, "__int__", Vec::new())? {
            Value::Int(number) => Ok(number),
            other => Err(RuntimeError::type_error(format!(
                "__int__ returned non-int (type {})",
                other.type_name()
            ))),
        },
        other => Err(RuntimeError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_int(text: &str, base: i64) -> RuntimeResult<i64> {
    let invalid = || {
        RuntimeError::value_error(format!(
            "invalid literal for int() with base {base}: '{text}'"
        ))
    };
    let radix = u32::try_from(base)
        .ok()
        .filter(|radix| (2..=36).contains(radix))
        .ok_or_else(|| RuntimeError::value_error("int() base must be >= 2 and <= 36"))?;
    let cleaned = text.trim().replace('_', "");
    i64::from_str_radix(&cleaned, radix).map_err(|_| invalid())
}

/// `float(value)`.
pub(crate) fn to_float(rt: &Interpreter, value: &Value) -> RuntimeResult<f64> {
    match value {
        Value::Float(number) => Ok(*number),
        Value::Int(_) | Value::Bool(_) => Ok(value.as_float().unwrap_or_default()),
        Value::Str(text) => {
            let trimmed = text.trim();
            match trimmed.to_ascii_lowercase().as_str() {
                "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
                "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                _ => trimmed.parse::<f64>().map_err(|_| {
                    RuntimeError::value_error(format!("could not convert string to float: '{text}'"))
                }),
            }
        }
        Value::Object(_) => match value.call_method(rt, "__float__", Vec::new())? {
            Value::Float(number) => Ok(number),
            other => Err(RuntimeError::type_error(format!(
                "__float__ returned non-float (type {})",
                other.type_name()
            ))),
        },
        other => Err(RuntimeError::type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn int_type() -> HostTypeDef {
    HostTypeDef::builtin("int")
        .constructor(HostMethod::new("int", [], T::Int, |_, _, _| Ok(Value::Int(0))))
        .constructor(HostMethod::new("int", [T::Dynamic], T::Int, |rt, _, args| {
            Ok(Value::Int(to_int(rt, &arg(&args, 0)?)?))
        }))
        .constructor(HostMethod::new("int", [T::Str, T::Int], T::Int, |_, _, args| {
            Ok(Value::Int(parse_int(&str_arg(&args, 0)?, int_arg(&args, 1)?)?))
        }))
        .method(HostMethod::new("bit_length", [], T::Int, |_, receiver, _| {
            let number = receiver.as_int().unwrap_or_default();
            Ok(Value::Int(i64::from(64 - number.unsigned_abs().leading_zeros())))
        }))
        .property(HostProperty::read_only("real", T::Int, |_, receiver| Ok(receiver.clone())))
        .property(HostProperty::read_only("imag", T::Int, |_, _| Ok(Value::Int(0))))
}

fn float_type() -> HostTypeDef {
    HostTypeDef::builtin("float")
        .constructor(HostMethod::new("float", [], T::Float, |_, _, _| Ok(Value::Float(0.0))))
        .constructor(HostMethod::new("float", [T::Dynamic], T::Float, |rt, _, args| {
            Ok(Value::Float(to_float(rt, &arg(&args, 0)?)?))
        }))
        .method(HostMethod::new("is_integer", [], T::Bool, |_, receiver, _| {
            let number = receiver.as_float().unwrap_or_default();
            Ok(Value::Bool(number.is_finite() && number.fract() == 0.0))
        }))
}

fn bool_type() -> HostTypeDef {
    HostTypeDef::builtin("bool")
        .constructor(HostMethod::new("bool", [], T::Bool, |_, _, _| Ok(Value::Bool(false))))
        .constructor(HostMethod::new("bool", [T::Dynamic], T::Bool, |rt, _, args| {
            Ok(Value::Bool(arg(&args, 0)?.truthy(rt)?))
        }))
}

fn str_method(
    name: &str,
    params: impl IntoIterator<Item = T>,
    returns: T,
    body: impl Fn(&Interpreter, &str, Vec<Value>) -> RuntimeResult<Value> + 'static,
) -> HostMethod {
    HostMethod::new(name, params, returns, move |rt, receiver, args| {
        body(rt, &text(receiver)?, args)
    })
}

fn char_test(name: &str, test: fn(char) -> bool) -> HostMethod {
    str_method(name, [], T::Bool, move |_, text, _| {
        Ok(Value::Bool(!text.is_empty() && text.chars().all(test)))
    })
}

fn strings(parts: impl IntoIterator<Item = impl AsRef<str>>) -> Value {
    Value::list(parts.into_iter().map(Value::str).collect())
}

fn split(text: &str, separator: Option<&str>, limit: i64) -> RuntimeResult<Value> {
    let Some(separator) = separator else {
        let words = text.split_whitespace();
        return Ok(if limit < 0 {
            strings(words)
        } else {
            let mut parts: Vec<String> = Vec::new();
            let mut rest = text.trim_start();
            while (parts.len() as i64) < limit && !rest.is_empty() {
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                parts.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            if !rest.is_empty() {
                parts.push(rest.to_string());
            }
            strings(parts)
        });
    };
    if separator.is_empty() {
        return Err(RuntimeError::value_error("empty separator"));
    }
    Ok(if limit < 0 {
        strings(text.split(separator))
    } else {
        strings(text.splitn(limit as usize + 1, separator))
    })
}

fn pad(text: &str, width: i64, fill: char, align: char) -> String {
    let length = text.chars().count() as i64;
    if width <= length {
        return text.to_string();
    }
    let missing = (width - length) as usize;
    let (before, after) = match align {
        '>' => (missing, 0),
        '^' => (missing / 2, missing - missing / 2),
        _ => (0, missing),
    };
    let fill = fill.to_string();
    format!("{}{text}{}", fill.repeat(before), fill.repeat(after))
}

/// Applies a `[[fill]align][0][width][.precision][type]` spec.
pub(crate) fn apply_format_spec(rt: &Interpreter, value: &Value, spec: &str) -> RuntimeResult<String> {
    if spec.is_empty() {
        return value.to_str(rt);
    }
    let chars: Vec<char> = spec.chars().collect();
    let mut pos = 0;
    let mut fill = ' ';
    let mut align = None;
    if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
        fill = chars[0];
        align = Some(chars[1]);
        pos = 2;
    } else if matches!(chars.first(), Some('<' | '>' | '^')) {
        align = chars.first().copied();
        pos = 1;
    }
    if align.is_none() && chars.get(pos) == Some(&'0') {
        fill = '0';
        align = Some('>');
        pos += 1;
    }
    let digits = |pos: &mut usize| {
        let start = *pos;
        while chars.get(*pos).is_some_and(char::is_ascii_digit) {
            *pos += 1;
        }
        chars[start..*pos].iter().collect::<String>().parse::<i64>().ok()
    };
    let width = digits(&mut pos);
    let precision = if chars.get(pos) == Some(&'.') {
        pos += 1;
        digits(&mut pos)
    } else {
        None
    };
    let kind = chars.get(pos).copied();
    if pos + usize::from(kind.is_some()) != chars.len() {
        return Err(RuntimeError::value_error(format!("Invalid format specifier '{spec}'")));
    }

    let numeric = matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_));
    let body = match kind {
        Some('f') => format!("{:.*}", precision.unwrap_or(6) as usize, to_float(rt, value)?),
        Some('d') => to_int(rt, value)?.to_string(),
        Some('x') => format!("{:x}", to_int(rt, value)?),
        Some('b') => format!("{:b}", to_int(rt, value)?),
        Some('%') => format!("{:.*}%", precision.unwrap_or(6) as usize, to_float(rt, value)? * 100.0),
        Some('s') | None => match (value, precision) {
            (Value::Float(number), Some(digits)) => format!("{number:.*}", digits as usize),
            (_, Some(digits)) => value.to_str(rt)?.chars().take(digits as usize).collect(),
            _ => value.to_str(rt)?,
        },
        Some(other) => {
            return Err(RuntimeError::value_error(format!(
                "Unknown format code '{other}' for object of type '{}'",
                value.type_name()
            )));
        }
    };
    let align = align.unwrap_or(if numeric { '>' } else { '<' });
    Ok(pad(&body, width.unwrap_or(0), fill, align))
}

/// `template.format(*args, **kwargs)`.
fn format_str(rt: &Interpreter, template: &str, args: Vec<Value>) -> RuntimeResult<String> {
    let (positional, keywords) = split_keywords(args);
    let mut formatted = String::with_capacity(template.len());
    let mut next_auto = 0;
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                formatted.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                formatted.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => {
                            return Err(RuntimeError::value_error(
                                "Single '{' encountered in format string",
                            ));
                        }
                    }
                }
                let (name, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name, spec),
                    None => (field.as_str(), ""),
                };
                let value = if let Ok(index) = name.parse::<usize>() {
                    positional.get(index).cloned().ok_or_else(|| {
                        RuntimeError::Index(format!("Replacement index {index} out of range"))
                    })?
                } else if name.is_empty() {
                    next_auto += 1;
                    positional.get(next_auto - 1).cloned().ok_or_else(|| {
                        RuntimeError::Index(format!("Replacement index {} out of range", next_auto - 1))
                    })?
                } else {
                    keywords
                        .iter()
                        .find(|(keyword, _)| **keyword == *name)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| RuntimeError::Key(format!("'{name}'")))?
                };
                formatted.push_str(&apply_format_spec(rt, &value, spec)?);
            }
            '}' => {
                return Err(RuntimeError::value_error(
                    "Single '}' encountered in format string",
                ));
            }
            ch => formatted.push(ch),
        }
    }
    Ok(formatted)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn str_type() -> HostTypeDef {
    HostTypeDef::builtin("str")
        .constructor(HostMethod::new("str", [], T::Str, |_, _, _| Ok(Value::str(""))))
        .constructor(HostMethod::new("str", [T::Dynamic], T::Str, |rt, _, args| {
            Ok(Value::str(arg(&args, 0)?.to_str(rt)?))
        }))
        .method(str_method("upper", [], T::Str, |_, text, _| Ok(Value::str(text.to_uppercase()))))
        .method(str_method("lower", [], T::Str, |_, text, _| Ok(Value::str(text.to_lowercase()))))
        .method(str_method("capitalize", [], T::Str, |_, text, _| Ok(Value::str(capitalize(text)))))
        .method(str_method("title", [], T::Str, |_, text, _| {
            let mut titled = String::with_capacity(text.len());
            let mut at_word_start = true;
            for ch in text.chars() {
                if ch.is_alphabetic() {
                    if at_word_start {
                        titled.extend(ch.to_uppercase());
                    } else {
                        titled.extend(ch.to_lowercase());
                    }
                    at_word_start = false;
                } else {
                    titled.push(ch);
                    at_word_start = true;
                }
            }
            Ok(Value::str(titled))
        }))
        .method(str_method("strip", [], T::Str, |_, text, _| Ok(Value::str(text.trim()))))
        .method(str_method("strip", [T::Str], T::Str, |_, text, args| {
            let set = str_arg(&args, 0)?;
            Ok(Value::str(text.trim_matches(|ch| set.contains(ch))))
        }))
        .method(str_method("lstrip", [], T::Str, |_, text, _| Ok(Value::str(text.trim_start()))))
        .method(str_method("lstrip", [T::Str], T::Str, |_, text, args| {
            let set = str_arg(&args, 0)?;
            Ok(Value::str(text.trim_start_matches(|ch| set.contains(ch))))
        }))
        .method(str_method("rstrip", [], T::Str, |_, text, _| Ok(Value::str(text.trim_end()))))
        .method(str_method("rstrip", [T::Str], T::Str, |_, text, args| {
            let set = str_arg(&args, 0)?;
            Ok(Value::str(text.trim_end_matches(|ch| set.contains(ch))))
        }))
        .method(str_method("split", [], T::List, |_, text, _| split(text, None, -1)))
        .method(str_method("split", [T::Str], T::List, |_, text, args| {
            split(text, Some(&str_arg(&args, 0)?), -1)
        }))
        .method(str_method("split", [T::Str, T::Int], T::List, |_, text, args| {
            split(text, Some(&str_arg(&args, 0)?), int_arg(&args, 1)?)
        }))
        .method(str_method("splitlines", [], T::List, |_, text, _| Ok(strings(text.lines()))))
        .method(str_method("join", [T::Dynamic], T::Str, |rt, text, args| {
            let parts = arg(&args, 0)?.to_vec(rt)?;
            let mut pieces = Vec::with_capacity(parts.len());
            for (index, part) in parts.iter().enumerate() {
                match part {
                    Value::Str(piece) => pieces.push(piece.to_string()),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "sequence item {index}: expected str instance, {} found",
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::str(pieces.join(text)))
        }))
        .method(str_method("replace", [T::Str, T::Str], T::Str, |_, text, args| {
            Ok(Value::str(text.replace(&*str_arg(&args, 0)?, &str_arg(&args, 1)?)))
        }))
        .method(str_method("replace", [T::Str, T::Str, T::Int], T::Str, |_, text, args| {
            let count = int_arg(&args, 2)?;
            let (from, to) = (str_arg(&args, 0)?, str_arg(&args, 1)?);
            Ok(Value::str(if count < 0 {
                text.replace(&*from, &to)
            } else {
                text.replacen(&*from, &to, count as usize)
            }))
        }))
        .method(str_method("startswith", [T::Str], T::Bool, |_, text, args| {
            Ok(Value::Bool(text.starts_with(&*str_arg(&args, 0)?)))
        }))
        .method(str_method("endswith", [T::Str], T::Bool, |_, text, args| {
            Ok(Value::Bool(text.ends_with(&*str_arg(&args, 0)?)))
        }))
        .method(str_method("find", [T::Str], T::Int, |_, text, args| {
            let needle = str_arg(&args, 0)?;
            Ok(Value::Int(match text.find(&*needle) {
                Some(byte) => text[..byte].chars().count() as i64,
                None => -1,
            }))
        }))
        .method(str_method("count", [T::Str], T::Int, |_, text, args| {
            let needle = str_arg(&args, 0)?;
            Ok(Value::Int(if needle.is_empty() {
                text.chars().count() as i64 + 1
            } else {
                text.matches(&*needle).count() as i64
            }))
        }))
        .method(char_test("isdigit", char::is_numeric))
        .method(char_test("isalpha", char::is_alphabetic))
        .method(char_test("isalnum", char::is_alphanumeric))
        .method(char_test("isspace", char::is_whitespace))
        .method(str_method("zfill", [T::Int], T::Str, |_, text, args| {
            let width = int_arg(&args, 0)?;
            let (sign, digits) = match text.strip_prefix(['-', '+']) {
                Some(rest) => (&text[..1], rest),
                None => ("", text),
            };
            let padded = pad(digits, width - sign.len() as i64, '0', '>');
            Ok(Value::str(format!("{sign}{padded}")))
        }))
        .method(str_method("ljust", [T::Int], T::Str, |_, text, args| {
            Ok(Value::str(pad(text, int_arg(&args, 0)?, ' ', '<')))
        }))
        .method(str_method("rjust", [T::Int], T::Str, |_, text, args| {
            Ok(Value::str(pad(text, int_arg(&args, 0)?, ' ', '>')))
        }))
        .method(str_method("center", [T::Int], T::Str, |_, text, args| {
            Ok(Value::str(pad(text, int_arg(&args, 0)?, ' ', '^')))
        }))
        .method(str_method("format", [], T::Str, |rt, text, args| Ok(Value::str(format_str(rt, text, args)?))).variadic())
}

fn index_of(rt: &Interpreter, haystack: &[Value], needle: &Value) -> RuntimeResult<Option<usize>> {
    for (index, item) in haystack.iter().enumerate() {
        if item.equals(rt, needle)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn count_of(rt: &Interpreter, haystack: &[Value], needle: &Value) -> RuntimeResult<i64> {
    let mut count = 0;
    for item in haystack {
        if item.equals(rt, needle)? {
            count += 1;
        }
    }
    Ok(count)
}

fn list_type() -> HostTypeDef {
    HostTypeDef::builtin("list")
        .constructor(HostMethod::new("list", [], T::List, |_, _, _| Ok(Value::list(Vec::new()))))
        .constructor(HostMethod::new("list", [T::Dynamic], T::List, |rt, _, args| {
            Ok(Value::list(arg(&args, 0)?.to_vec(rt)?))
        }))
        .method(HostMethod::new("append", [T::Dynamic], T::None, |_, receiver, args| {
            items(receiver)?.borrow_mut().push(arg(&args, 0)?);
            Ok(Value::None)
        }))
        .method(HostMethod::new("extend", [T::Dynamic], T::None, |rt, receiver, args| {
            let extra = arg(&args, 0)?.to_vec(rt)?;
            items(receiver)?.borrow_mut().extend(extra);
            Ok(Value::None)
        }))
        .method(HostMethod::new("pop", [], T::Dynamic, |_, receiver, _| {
            items(receiver)?
                .borrow_mut()
                .pop()
                .ok_or_else(|| RuntimeError::Index("pop from empty list".into()))
        }))
        .method(HostMethod::new("pop", [T::Int], T::Dynamic, |_, receiver, args| {
            let list = items(receiver)?;
            let mut list = list.borrow_mut();
            if list.is_empty() {
                return Err(RuntimeError::Index("pop from empty list".into()));
            }
            let position = normalize_index(int_arg(&args, 0)?, list.len(), "pop")?;
            Ok(list.remove(position))
        }))
        .method(HostMethod::new("insert", [T::Int, T::Dynamic], T::None, |_, receiver, args| {
            let list = items(receiver)?;
            let mut list = list.borrow_mut();
            let len = list.len() as i64;
            let index = int_arg(&args, 0)?;
            let position = if index < 0 { (index + len).max(0) } else { index.min(len) };
            list.insert(position as usize, arg(&args, 1)?);
            Ok(Value::None)
        }))
        .method(HostMethod::new("remove", [T::Dynamic], T::None, |rt, receiver, args| {
            let list = items(receiver)?;
            let snapshot = list.borrow().clone();
            match index_of(rt, &snapshot, &arg(&args, 0)?)? {
                Some(position) => {
                    list.borrow_mut().remove(position);
                    Ok(Value::None)
                }
                None => Err(RuntimeError::value_error("list.remove(x): x not in list")),
            }
        }))
        .method(HostMethod::new("index", [T::Dynamic], T::Int, |rt, receiver, args| {
            let needle = arg(&args, 0)?;
            let snapshot = items(receiver)?.borrow().clone();
            match index_of(rt, &snapshot, &needle)? {
                Some(position) => Ok(Value::Int(position as i64)),
                None => Err(RuntimeError::value_error(format!("{} is not in list", needle.repr(rt)?))),
            }
        }))
        .method(HostMethod::new("count", [T::Dynamic], T::Int, |rt, receiver, args| {
            let snapshot = items(receiver)?.borrow().clone();
            Ok(Value::Int(count_of(rt, &snapshot, &arg(&args, 0)?)?))
        }))
        .method(HostMethod::new("reverse", [], T::None, |_, receiver, _| {
            items(receiver)?.borrow_mut().reverse();
            Ok(Value::None)
        }))
        .method(
            HostMethod::new("sort", [], T::None, |rt, receiver, args| {
                let (_, keywords) = split_keywords(args);
                let mut key = None;
                let mut reverse = false;
                for (name, value) in &keywords {
                    match &**name {
                        "key" => key = Some(value.clone()),
                        "reverse" => reverse = value.truthy(rt)?,
                        other => {
                            return Err(RuntimeError::type_error(format!(
                                "'{other}' is an invalid keyword argument for sort()"
                            )));
                        }
                    }
                }
                let list = items(receiver)?;
                let snapshot = list.borrow().clone();
                let sorted = sort_values(rt, snapshot, key.as_ref(), reverse)?;
                *list.borrow_mut() = sorted;
                Ok(Value::None)
            })
            .variadic(),
        )
        .method(HostMethod::new("clear", [], T::None, |_, receiver, _| {
            items(receiver)?.borrow_mut().clear();
            Ok(Value::None)
        }))
        .method(HostMethod::new("copy", [], T::List, |_, receiver, _| {
            Ok(Value::list(items(receiver)?.borrow().clone()))
        }))
}

fn tuple_type() -> HostTypeDef {
    HostTypeDef::builtin("tuple")
        .constructor(HostMethod::new("tuple", [], T::Tuple, |_, _, _| Ok(Value::tuple(Vec::new()))))
        .constructor(HostMethod::new("tuple", [T::Dynamic], T::Tuple, |rt, _, args| {
            Ok(Value::tuple(arg(&args, 0)?.to_vec(rt)?))
        }))
        .method(HostMethod::new("index", [T::Dynamic], T::Int, |rt, receiver, args| {
            let needle = arg(&args, 0)?;
            match index_of(rt, &receiver.to_vec(rt)?, &needle)? {
                Some(position) => Ok(Value::Int(position as i64)),
                None => Err(RuntimeError::value_error("tuple.index(x): x not in tuple")),
            }
        }))
        .method(HostMethod::new("count", [T::Dynamic], T::Int, |rt, receiver, args| {
            Ok(Value::Int(count_of(rt, &receiver.to_vec(rt)?, &arg(&args, 0)?)?))
        }))
}

/// Entries contributed by `dict(...)`/`dict.update(...)` arguments.
fn collect_entries(rt: &Interpreter, args: Vec<Value>) -> RuntimeResult<Vec<(Value, Value)>> {
    let (positional, keywords) = split_keywords(args);
    if positional.len() > 1 {
        return Err(RuntimeError::type_error(format!(
            "dict expected at most 1 argument, got {}",
            positional.len()
        )));
    }
    let mut entries = Vec::new();
    if let Some(source) = positional.into_iter().next() {
        match &source {
            Value::Dict(dict) => {
                entries.extend(dict.borrow().items().map(|(k, v)| (k.clone(), v.clone())));
            }
            other => {
                for (index, pair) in other.to_vec(rt)?.into_iter().enumerate() {
                    let pair = pair.to_vec(rt)?;
                    let [key, value] = <[Value; 2]>::try_from(pair).map_err(|pair| {
                        RuntimeError::value_error(format!(
                            "dictionary update sequence element #{index} has length {}; 2 is required",
                            pair.len()
                        ))
                    })?;
                    entries.push((key, value));
                }
            }
        }
    }
    entries.extend(keywords.into_iter().map(|(name, value)| (Value::Str(name), value)));
    Ok(entries)
}

fn missing_key(rt: &Interpreter, key: &Value) -> RuntimeResult<RuntimeError> {
    Ok(RuntimeError::Key(key.repr(rt)?))
}

fn dict_type() -> HostTypeDef {
    HostTypeDef::builtin("dict")
        .constructor(
            HostMethod::new("dict", [], T::Dict, |rt, _, args| {
                let mut dict = Dict::new();
                for (key, value) in collect_entries(rt, args)? {
                    dict.insert(key, value)?;
                }
                Ok(Value::dict(dict))
            })
            .variadic(),
        )
        .method(
            HostMethod::new("update", [], T::None, |rt, receiver, args| {
                let entries = collect_entries(rt, args)?;
                let dict = mapping(receiver)?;
                let mut dict = dict.borrow_mut();
                for (key, value) in entries {
                    dict.insert(key, value)?;
                }
                Ok(Value::None)
            })
            .variadic(),
        )
        .method(HostMethod::new("get", [T::Dynamic], T::Dynamic, |_, receiver, args| {
            Ok(mapping(receiver)?.borrow().get(&arg(&args, 0)?)?.unwrap_or(Value::None))
        }))
        .method(HostMethod::new("get", [T::Dynamic, T::Dynamic], T::Dynamic, |_, receiver, args| {
            let found = mapping(receiver)?.borrow().get(&arg(&args, 0)?)?;
            Ok(match found {
                Some(value) => value,
                None => arg(&args, 1)?,
            })
        }))
        .method(HostMethod::new("keys", [], T::List, |_, receiver, _| {
            Ok(Value::list(mapping(receiver)?.borrow().keys().cloned().collect()))
        }))
        .method(HostMethod::new("values", [], T::List, |_, receiver, _| {
            Ok(Value::list(mapping(receiver)?.borrow().values().cloned().collect()))
        }))
        .method(HostMethod::new("items", [], T::List, |_, receiver, _| {
            let pairs = mapping(receiver)?
                .borrow()
                .items()
                .map(|(key, value)| Value::tuple(vec![key.clone(), value.clone()]))
                .collect();
            Ok(Value::list(pairs))
        }))
        .method(HostMethod::new("pop", [T::Dynamic], T::Dynamic, |rt, receiver, args| {
            let key = arg(&args, 0)?;
            let removed = mapping(receiver)?.borrow_mut().remove(&key)?;
            match removed {
                Some(value) => Ok(value),
                None => Err(missing_key(rt, &key)?),
            }
        }))
        .method(HostMethod::new("pop", [T::Dynamic, T::Dynamic], T::Dynamic, |_, receiver, args| {
            let removed = mapping(receiver)?.borrow_mut().remove(&arg(&args, 0)?)?;
            Ok(match removed {
                Some(value) => value,
                None => arg(&args, 1)?,
            })
        }))
        .method(HostMethod::new("setdefault", [T::Dynamic, T::Dynamic], T::Dynamic, |_, receiver, args| {
            let key = arg(&args, 0)?;
            let dict = mapping(receiver)?;
            let existing = dict.borrow().get(&key)?;
            match existing {
                Some(value) => Ok(value),
                None => {
                    let value = arg(&args, 1)?;
                    dict.borrow_mut().insert(key, value.clone())?;
                    Ok(value)
                }
            }
        }))
        .method(HostMethod::new("clear", [], T::None, |_, receiver, _| {
            mapping(receiver)?.borrow_mut().clear();
            Ok(Value::None)
        }))
        .method(HostMethod::new("copy", [], T::Dict, |_, receiver, _| {
            Ok(Value::dict(mapping(receiver)?.borrow().clone()))
        }))
}

fn other_set(rt: &Interpreter, args: &[Value]) -> RuntimeResult<ValueSet> {
    match arg(args, 0)? {
        Value::Set(set) => Ok(set.borrow().clone()),
        other => set_from_values(other.to_vec(rt)?),
    }
}

fn set_type() -> HostTypeDef {
    HostTypeDef::builtin("set")
        .constructor(HostMethod::new("set", [], T::Set, |_, _, _| Ok(Value::set(ValueSet::new()))))
        .constructor(HostMethod::new("set", [T::Dynamic], T::Set, |rt, _, args| {
            Ok(Value::set(set_from_values(arg(&args, 0)?.to_vec(rt)?)?))
        }))
        .method(HostMethod::new("add", [T::Dynamic], T::None, |_, receiver, args| {
            let item = arg(&args, 0)?;
            members(receiver)?.borrow_mut().insert(HashKey::from_value(&item)?, item);
            Ok(Value::None)
        }))
        .method(HostMethod::new("remove", [T::Dynamic], T::None, |rt, receiver, args| {
            let item = arg(&args, 0)?;
            let removed = members(receiver)?.borrow_mut().shift_remove(&HashKey::from_value(&item)?);
            match removed {
                Some(_) => Ok(Value::None),
                None => Err(missing_key(rt, &item)?),
            }
        }))
        .method(HostMethod::new("discard", [T::Dynamic], T::None, |_, receiver, args| {
            let item = arg(&args, 0)?;
            members(receiver)?.borrow_mut().shift_remove(&HashKey::from_value(&item)?);
            Ok(Value::None)
        }))
        .method(HostMethod::new("pop", [], T::Dynamic, |_, receiver, _| {
            members(receiver)?
                .borrow_mut()
                .shift_remove_index(0)
                .map(|(_, item)| item)
                .ok_or_else(|| RuntimeError::Key("'pop from an empty set'".into()))
        }))
        .method(HostMethod::new("union", [T::Dynamic], T::Set, |rt, receiver, args| {
            let mut combined = members(receiver)?.borrow().clone();
            combined.extend(other_set(rt, &args)?);
            Ok(Value::set(combined))
        }))
        .method(HostMethod::new("intersection", [T::Dynamic], T::Set, |rt, receiver, args| {
            let other = other_set(rt, &args)?;
            let mut kept = members(receiver)?.borrow().clone();
            kept.retain(|key, _| other.contains_key(key));
            Ok(Value::set(kept))
        }))
        .method(HostMethod::new("difference", [T::Dynamic], T::Set, |rt, receiver, args| {
            let other = other_set(rt, &args)?;
            let mut kept = members(receiver)?.borrow().clone();
            kept.retain(|key, _| !other.contains_key(key));
            Ok(Value::set(kept))
        }))
        .method(HostMethod::new("issubset", [T::Dynamic], T::Bool, |rt, receiver, args| {
            let other = other_set(rt, &args)?;
            Ok(Value::Bool(members(receiver)?.borrow().keys().all(|key| other.contains_key(key))))
        }))
        .method(HostMethod::new("clear", [], T::None, |_, receiver, _| {
            members(receiver)?.borrow_mut().clear();
            Ok(Value::None)
        }))
        .method(HostMethod::new("copy", [], T::Set, |_, receiver, _| {
            Ok(Value::set(members(receiver)?.borrow().clone()))
        }))
}

fn make_range(start: i64, stop: i64, step: i64) -> RuntimeResult<Value> {
    if step == 0 {
        return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
    }
    Ok(Value::Range(Range { start, stop, step }))
}

fn range_field(name: &'static str, read: fn(&Range) -> i64) -> HostProperty {
    HostProperty::read_only(name, T::Int, move |_, receiver| match receiver {
        Value::Range(range) => Ok(Value::Int(read(range))),
        other => Err(wrong_receiver("range", other)),
    })
}

fn range_type() -> HostTypeDef {
    HostTypeDef::builtin("range")
        .constructor(HostMethod::new("range", [T::Int], T::Dynamic, |_, _, args| {
            make_range(0, int_arg(&args, 0)?, 1)
        }))
        .constructor(HostMethod::new("range", [T::Int, T::Int], T::Dynamic, |_, _, args| {
            make_range(int_arg(&args, 0)?, int_arg(&args, 1)?, 1)
        }))
        .constructor(HostMethod::new("range", [T::Int, T::Int, T::Int], T::Dynamic, |_, _, args| {
            make_range(int_arg(&args, 0)?, int_arg(&args, 1)?, int_arg(&args, 2)?)
        }))
        .property(range_field("start", |range| range.start))
        .property(range_field("stop", |range| range.stop))
        .property(range_field("step", |range| range.step))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(value: Value) -> Vec<String> {
        match value {
            Value::List(items) => items
                .borrow()
                .iter()
                .map(|item| item.as_str().unwrap_or_default().to_string())
                .collect(),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn split_variants() {
        assert_eq!(texts(split("  a b\tc ", None, -1).expect("split")), vec!["a", "b", "c"]);
        assert_eq!(texts(split("a,b,,c", Some(","), -1).expect("split")), vec!["a", "b", "", "c"]);
        assert_eq!(texts(split("a,b,c", Some(","), 1).expect("split")), vec!["a", "b,c"]);
        assert_eq!(texts(split("a b  c", None, 1).expect("split")), vec!["a", "b  c"]);
        assert!(split("abc", Some(""), -1).is_err());
    }

    #[test]
    fn padding_and_ints() {
        assert_eq!(pad("ab", 5, '*', '^'), "*ab**");
        assert_eq!(pad("abcdef", 3, ' ', '>'), "abcdef");
        assert_eq!(parse_int(" 42 ", 10).expect("int"), 42);
        assert_eq!(parse_int("ff", 16).expect("hex"), 255);
        assert!(parse_int("4.2", 10).is_err());
        assert_eq!(capitalize("hELLO"), "Hello");
    }

    #[test]
    fn every_builtin_type_has_constructors() {
        for def in definitions() {
            assert!(!def.constructors().is_empty(), "{} has no constructor", def.name());
        }
    }
}
