use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::host::{HostType, NativeObject, TypeKey};
use crate::interpreter::Module;
use crate::runtime::callable::Function;
use crate::runtime::class::{Class, SuperRef};
use crate::runtime::dict::{Dict, ValueSet};
use crate::runtime::iter::{Generator, ValueIter};
use crate::runtime::method::BoundMethod;
use crate::runtime::nil::DeferredMember;
use crate::runtime::object::Object;

/// A module namespace shared by every routine compiled in that module.
pub type Globals = Rc<RefCell<IndexMap<String, Value>>>;

/// Every value a script can observe.
///
/// Script-defined behavior lives on `Object`/`Class`; every other variant is a
/// host value whose behavior comes from the builtin semantics, the extension
/// table and the host type's member table.
#[derive(Clone)]
pub enum Value {
    None,
    /// Deferred member reference produced by a failed host member lookup.
    Nil(Rc<DeferredMember>),
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<ValueSet>>),
    Range(Range),
    /// `name=value` at a call site; binders collect the trailing run of these.
    Keyword(Rc<KeywordArg>),
    Function(Rc<Function>),
    BoundMethod(Rc<BoundMethod>),
    Class(Rc<Class>),
    Object(Rc<Object>),
    Super(Rc<SuperRef>),
    /// Host type marker such as `int` or `StringBuilder`.
    Type(HostType),
    Module(Rc<Module>),
    Generator(Rc<Generator>),
    Iterator(Rc<RefCell<ValueIter>>),
    Native(Rc<NativeObject>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let (start, stop) = (i128::from(self.start), i128::from(self.stop));
        let span = if self.step > 0 { stop - start } else { start - stop };
        if span <= 0 {
            return 0;
        }
        let count = span.unsigned_abs().div_ceil(u128::from(self.step.unsigned_abs()));
        usize::try_from(count).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        let value = i128::from(self.start) + i128::from(self.step) * index as i128;
        i64::try_from(value).ok()
    }

    pub fn contains(&self, value: i64) -> bool {
        let in_bounds = if self.step > 0 {
            value >= self.start && value < self.stop
        } else {
            value <= self.start && value > self.stop
        };
        in_bounds && (i128::from(value) - i128::from(self.start)) % i128::from(self.step) == 0
    }
}

#[derive(Debug)]
pub struct KeywordArg {
    pub name: Rc<str>,
    pub value: Value,
}

impl Value {
    pub fn str(text: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(text.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::from(items))
    }

    pub fn dict(dict: Dict) -> Self {
        Self::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn set(set: ValueSet) -> Self {
        Self::Set(Rc::new(RefCell::new(set)))
    }

    pub fn keyword(name: impl AsRef<str>, value: Value) -> Self {
        Self::Keyword(Rc::new(KeywordArg {
            name: Rc::from(name.as_ref()),
            value,
        }))
    }

    pub fn type_name(&self) -> Cow<'static, str> {
        match self {
            Self::Object(object) => Cow::Owned(object.class.name.clone()),
            Self::Native(native) => Cow::Owned(native.host_type().name().to_string()),
            other => Cow::Borrowed(other.builtin_type_name()),
        }
    }

    fn builtin_type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Nil(_) => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Set(_) => "set",
            Self::Range(_) => "range",
            Self::Keyword(_) => "keyword",
            Self::Function(_) => "function",
            Self::BoundMethod(_) => "method",
            Self::Class(_) | Self::Type(_) => "type",
            Self::Object(_) => "object",
            Self::Super(_) => "super",
            Self::Module(_) => "module",
            Self::Generator(_) => "generator",
            Self::Iterator(_) => "iterator",
            Self::Native(_) => "native",
        }
    }

    /// Key under which host member tables and extensions are registered.
    pub fn type_key(&self) -> TypeKey {
        match self {
            Self::Native(native) => native.host_type().key().clone(),
            other => TypeKey::builtin(other.builtin_type_name()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            Self::Bool(value) => Some(f64::from(u8::from(*value))),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Reference identity, widened to value identity for immutable scalars.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Range(a), Self::Range(b)) => a == b,
            (Self::Nil(a), Self::Nil(b)) => Rc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Set(a), Self::Set(b)) => Rc::ptr_eq(a, b),
            (Self::Keyword(a), Self::Keyword(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::BoundMethod(a), Self::BoundMethod(b)) => Rc::ptr_eq(a, b),
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Super(a), Self::Super(b)) => Rc::ptr_eq(a, b),
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::Module(a), Self::Module(b)) => Rc::ptr_eq(a, b),
            (Self::Generator(a), Self::Generator(b)) => Rc::ptr_eq(a, b),
            (Self::Iterator(a), Self::Iterator(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Address used to hash identity-keyed values.
    pub(crate) fn identity(&self) -> usize {
        match self {
            Self::Nil(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::List(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::Dict(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::Set(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::Tuple(rc) => rc.as_ptr() as *const u8 as usize,
            Self::Keyword(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::Function(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::BoundMethod(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::Class(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::Object(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::Super(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::Module(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::Generator(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::Iterator(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Self::Native(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            _ => 0,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::str(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::list(items)
    }
}

/// Structural equality for plain data, identity for everything else.
/// Script-level `==` goes through `__eq__` dispatch instead.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(_) | Self::Bool(_) | Self::Float(_), _)
                if matches!(other, Self::Int(_) | Self::Bool(_) | Self::Float(_)) =>
            {
                match (self.as_int(), other.as_int()) {
                    (Some(a), Some(b)) => a == b,
                    _ => self.as_float() == other.as_float(),
                }
            }
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Set(a), Self::Set(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len() && a.keys().all(|key| b.contains_key(key))
                }
            }
            _ => self.same(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(value) => write!(f, "Bool({value})"),
            Self::Int(value) => write!(f, "Int({value})"),
            Self::Float(value) => write!(f, "Float({value})"),
            Self::Str(text) => write!(f, "Str({text:?})"),
            Self::List(items) => f.debug_tuple("List").field(&*items.borrow()).finish(),
            Self::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            Self::Dict(dict) => f.debug_tuple("Dict").field(&*dict.borrow()).finish(),
            Self::Set(set) => f
                .debug_tuple("Set")
                .field(&set.borrow().values().collect::<Vec<_>>())
                .finish(),
            Self::Range(range) => write!(f, "{range:?}"),
            Self::Keyword(keyword) => write!(f, "Keyword({}={:?})", keyword.name, keyword.value),
            Self::Function(function) => write!(f, "Function({})", function.qualname),
            Self::Class(class) => write!(f, "Class({})", class.name),
            Self::Object(object) => write!(f, "Object({})", object.class.name),
            Self::Type(ty) => write!(f, "Type({})", ty.name()),
            Self::Module(module) => write!(f, "Module({})", module.name()),
            Self::Nil(member) => write!(f, "Nil({})", member.name),
            other => write!(f, "<{}>", other.type_name()),
        }
    }
}

/// Python-style float text: `1.0`, `0.1`, `1e+20`.
pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let text = format!("{value:e}");
        let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_length_and_membership() {
        let range = Range {
            start: 0,
            stop: 10,
            step: 3,
        };
        assert_eq!(range.len(), 4);
        assert_eq!(range.get(3), Some(9));
        assert!(range.contains(6));
        assert!(!range.contains(7));

        let down = Range {
            start: 5,
            stop: 0,
            step: -2,
        };
        assert_eq!(down.len(), 3);
        assert!(down.contains(1));
        assert!(Range {
            start: 3,
            stop: 3,
            step: 1
        }
        .is_empty());
    }

    #[test]
    fn ranges_near_the_integer_limits() {
        let wide = Range {
            start: i64::MIN,
            stop: i64::MAX,
            step: 1,
        };
        assert!(wide.contains(i64::MAX - 1));
        assert!(!wide.contains(i64::MAX));
        assert_eq!(wide.get(0), Some(i64::MIN));

        let sparse = Range {
            start: -5,
            stop: i64::MAX,
            step: i64::MAX,
        };
        assert_eq!(sparse.len(), 2);
        assert_eq!(sparse.get(1), Some(i64::MAX - 5));
        assert!(sparse.contains(i64::MAX - 5));
        assert!(!sparse.contains(i64::MAX - 4));

        let falling = Range {
            start: i64::MAX,
            stop: i64::MIN,
            step: i64::MIN,
        };
        assert_eq!(falling.len(), 2);
        assert!(falling.contains(-1));
        assert!(!falling.contains(0));
    }

    #[test]
    fn floats_render_like_python() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
    }

    #[test]
    fn structural_equality_mixes_numbers() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::str("a")]),
            Value::list(vec![Value::Int(1), Value::str("a")])
        );
        assert_ne!(Value::str("1"), Value::Int(1));
    }
}
