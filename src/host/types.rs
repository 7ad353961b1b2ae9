//! Host introspection: the member tables through which scripts see host
//! values.
//!
//! A `HostTypeDef` lists methods (with parameter type descriptors, so calls
//! can be resolved by argument kinds), properties, fields and constructors.
//! Both the typed compiler and deferred member references resolve against
//! these tables; nothing else in the crate knows how host values are laid
//! out.

use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::interpreter::Interpreter;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey(Cow<'static, str>);

impl TypeKey {
    pub const fn builtin(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compile-time description of a value's type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StaticType {
    Dynamic,
    None,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Dict,
    Set,
    Host(TypeKey),
}

impl StaticType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::None => Self::None,
            Value::Bool(_) => Self::Bool,
            Value::Int(_) => Self::Int,
            Value::Float(_) => Self::Float,
            Value::Str(_) => Self::Str,
            Value::List(_) => Self::List,
            Value::Tuple(_) => Self::Tuple,
            Value::Dict(_) => Self::Dict,
            Value::Set(_) => Self::Set,
            Value::Native(native) => Self::Host(native.host_type().key().clone()),
            _ => Self::Dynamic,
        }
    }

    pub fn from_key(key: &TypeKey) -> Self {
        match key.as_str() {
            "NoneType" => Self::None,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "float" => Self::Float,
            "str" => Self::Str,
            "list" => Self::List,
            "tuple" => Self::Tuple,
            "dict" => Self::Dict,
            "set" => Self::Set,
            "object" => Self::Dynamic,
            _ => Self::Host(key.clone()),
        }
    }

    /// Key of the member table for values of this type.
    pub fn key(&self) -> Option<TypeKey> {
        Some(match self {
            Self::Dynamic => return None,
            Self::None => TypeKey::builtin("NoneType"),
            Self::Bool => TypeKey::builtin("bool"),
            Self::Int => TypeKey::builtin("int"),
            Self::Float => TypeKey::builtin("float"),
            Self::Str => TypeKey::builtin("str"),
            Self::List => TypeKey::builtin("list"),
            Self::Tuple => TypeKey::builtin("tuple"),
            Self::Dict => TypeKey::builtin("dict"),
            Self::Set => TypeKey::builtin("set"),
            Self::Host(key) => key.clone(),
        })
    }

    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Self::Dynamic => Cow::Borrowed("object"),
            Self::Host(key) => Cow::Borrowed(key.as_str()),
            other => match other.key() {
                Some(key) => Cow::Owned(key.as_str().to_string()),
                None => Cow::Borrowed("object"),
            },
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        *self == Self::Dynamic || *self == Self::of(value)
    }

    /// Whether a value of `self` may be passed where `target` is expected,
    /// allowing the implicit `int` to `float` widening.
    pub fn widens_to(&self, target: &StaticType) -> bool {
        self == target || *target == Self::Dynamic || (*self == Self::Int && *target == Self::Float)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostParam {
    pub ty: StaticType,
    /// Passed by reference; matched on the referenced type.
    pub by_ref: bool,
}

impl HostParam {
    pub fn of(ty: StaticType) -> Self {
        Self { ty, by_ref: false }
    }

    pub fn by_ref(ty: StaticType) -> Self {
        Self { ty, by_ref: true }
    }
}

pub type HostInvoke = Rc<dyn Fn(&Interpreter, &Value, Vec<Value>) -> RuntimeResult<Value>>;
pub type HostGetter = Rc<dyn Fn(&Interpreter, &Value) -> RuntimeResult<Value>>;
pub type HostSetter = Rc<dyn Fn(&Interpreter, &Value, Value) -> RuntimeResult<()>>;

pub struct HostMethod {
    pub name: String,
    pub params: Vec<HostParam>,
    pub returns: StaticType,
    pub is_static: bool,
    /// Accepts any argument list; resolution only checks the name.
    pub variadic: bool,
    invoke: HostInvoke,
}

impl HostMethod {
    pub fn new(
        name: impl Into<String>,
        params: impl IntoIterator<Item = StaticType>,
        returns: StaticType,
        invoke: impl Fn(&Interpreter, &Value, Vec<Value>) -> RuntimeResult<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.into_iter().map(HostParam::of).collect(),
            returns,
            is_static: false,
            variadic: false,
            invoke: Rc::new(invoke),
        }
    }

    pub fn with_params(mut self, params: Vec<HostParam>) -> Self {
        self.params = params;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn statically(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn invoke(&self, rt: &Interpreter, receiver: &Value, args: Vec<Value>) -> RuntimeResult<Value> {
        (self.invoke)(rt, receiver, args)
    }

    /// Entry point, for callers that bind the member ahead of time.
    pub fn invoker(&self) -> HostInvoke {
        self.invoke.clone()
    }

    pub fn matches(&self, args: &[StaticType], fit: Fit) -> bool {
        if self.variadic {
            return true;
        }
        self.params.len() == args.len()
            && self.params.iter().zip(args).all(|(param, arg)| match fit {
                Fit::Exact => param.ty == *arg,
                Fit::Dynamic => param.ty == StaticType::Dynamic || param.ty == *arg,
                Fit::Widened => arg.widens_to(&param.ty),
            })
    }

    pub fn signature(&self) -> String {
        if self.variadic {
            return format!("{}(...) -> {}", self.name, self.returns.name());
        }
        let params: Vec<String> = self
            .params
            .iter()
            .map(|param| {
                let name = param.ty.name();
                if param.by_ref {
                    format!("ref {name}")
                } else {
                    name.into_owned()
                }
            })
            .collect();
        format!("{}({}) -> {}", self.name, params.join(", "), self.returns.name())
    }
}

impl fmt::Debug for HostMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

pub struct HostProperty {
    pub name: String,
    pub ty: StaticType,
    get: HostGetter,
    set: Option<HostSetter>,
}

impl HostProperty {
    pub fn read_only(
        name: impl Into<String>,
        ty: StaticType,
        get: impl Fn(&Interpreter, &Value) -> RuntimeResult<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            get: Rc::new(get),
            set: None,
        }
    }

    pub fn read_write(
        name: impl Into<String>,
        ty: StaticType,
        get: impl Fn(&Interpreter, &Value) -> RuntimeResult<Value> + 'static,
        set: impl Fn(&Interpreter, &Value, Value) -> RuntimeResult<()> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            get: Rc::new(get),
            set: Some(Rc::new(set)),
        }
    }

    pub fn get(&self, rt: &Interpreter, receiver: &Value) -> RuntimeResult<Value> {
        (self.get)(rt, receiver)
    }

    pub fn getter(&self) -> HostGetter {
        self.get.clone()
    }

    pub fn set(&self, rt: &Interpreter, receiver: &Value, value: Value) -> RuntimeResult<()> {
        let Some(set) = &self.set else {
            return Err(RuntimeError::attribute_error(format!(
                "attribute '{}' of '{}' objects is not writable",
                self.name,
                receiver.type_name()
            )));
        };
        if !self.ty.accepts(&value) {
            return Err(RuntimeError::type_error(format!(
                "'{}' expects {}, got {}",
                self.name,
                self.ty.name(),
                value.type_name()
            )));
        }
        set(rt, receiver, value)
    }
}

/// Member table of one host type.
pub struct HostTypeDef {
    name: String,
    key: TypeKey,
    methods: Vec<HostMethod>,
    properties: Vec<HostProperty>,
    fields: Vec<HostProperty>,
    constructors: Vec<HostMethod>,
}

impl HostTypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: TypeKey::named(name.clone()),
            name,
            methods: Vec::new(),
            properties: Vec::new(),
            fields: Vec::new(),
            constructors: Vec::new(),
        }
    }

    pub(crate) fn builtin(name: &'static str) -> Self {
        Self {
            name: name.to_string(),
            key: TypeKey::builtin(name),
            methods: Vec::new(),
            properties: Vec::new(),
            fields: Vec::new(),
            constructors: Vec::new(),
        }
    }

    pub fn method(mut self, method: HostMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn property(mut self, property: HostProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn field(mut self, field: HostProperty) -> Self {
        self.fields.push(field);
        self
    }

    pub fn constructor(mut self, constructor: HostMethod) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HostMethod> {
        self.methods.iter().filter(move |method| method.name == name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|method| method.name == name)
    }

    pub fn find_property(&self, name: &str) -> Option<&HostProperty> {
        self.properties.iter().find(|property| property.name == name)
    }

    pub fn find_field(&self, name: &str) -> Option<&HostProperty> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn constructors(&self) -> &[HostMethod] {
        &self.constructors
    }
}

/// Shared handle to a registered host type; compares by key.
#[derive(Clone)]
pub struct HostType(Rc<HostTypeDef>);

impl HostType {
    pub fn new(def: HostTypeDef) -> Self {
        Self(Rc::new(def))
    }
}

impl Deref for HostType {
    type Target = HostTypeDef;

    fn deref(&self) -> &HostTypeDef {
        &self.0
    }
}

impl PartialEq for HostType {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}

impl fmt::Debug for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostType({})", self.0.name)
    }
}

/// Instance of a host type defined outside the builtin value set.
pub struct NativeObject {
    ty: HostType,
    state: RefCell<Box<dyn Any>>,
}

impl NativeObject {
    pub fn new(ty: HostType, state: impl Any) -> Rc<Self> {
        Rc::new(Self {
            ty,
            state: RefCell::new(Box::new(state)),
        })
    }

    pub fn host_type(&self) -> &HostType {
        &self.ty
    }

    pub fn with_state<T: 'static, R>(&self, read: impl FnOnce(&T) -> R) -> Option<R> {
        self.state.borrow().downcast_ref::<T>().map(read)
    }

    pub fn with_state_mut<T: 'static, R>(&self, write: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.state.borrow_mut().downcast_mut::<T>().map(write)
    }
}

/// How strictly argument kinds must agree with parameter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    Exact,
    /// `object` parameters accept anything.
    Dynamic,
    /// Additionally admits `int` where `float` is declared.
    Widened,
}

/// Picks the candidate whose parameter kinds fit `args`, trying exact
/// matches first, then `object` parameters, then (with `widen`) numeric
/// widening, and finally a variadic candidate.
pub fn resolve_overload<'a>(
    candidates: &[&'a HostMethod],
    args: &[StaticType],
    widen: bool,
) -> Option<&'a HostMethod> {
    let mut fits = vec![Fit::Exact, Fit::Dynamic];
    if widen {
        fits.push(Fit::Widened);
    }
    fits.into_iter()
        .find_map(|fit| {
            candidates
                .iter()
                .find(|method| !method.variadic && method.matches(args, fit))
        })
        .or_else(|| candidates.iter().find(|method| method.variadic))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overload(params: &[StaticType]) -> HostMethod {
        HostMethod::new("append", params.to_vec(), StaticType::None, |_, _, _| Ok(Value::None))
    }

    #[test]
    fn exact_match_wins_over_dynamic_and_widening() {
        let by_int = overload(&[StaticType::Int]);
        let by_float = overload(&[StaticType::Float]);
        let by_any = overload(&[StaticType::Dynamic]);
        let candidates = [&by_float, &by_any, &by_int];

        let picked = resolve_overload(&candidates, &[StaticType::Int], true);
        assert!(std::ptr::eq(picked.expect("overload"), &by_int));

        let picked = resolve_overload(&candidates, &[StaticType::Str], true);
        assert!(std::ptr::eq(picked.expect("overload"), &by_any));
    }

    #[test]
    fn widening_only_when_requested() {
        let by_float = overload(&[StaticType::Float]);
        let candidates = [&by_float];
        assert!(resolve_overload(&candidates, &[StaticType::Int], false).is_none());
        assert!(resolve_overload(&candidates, &[StaticType::Int], true).is_some());
        assert!(resolve_overload(&candidates, &[StaticType::Str], true).is_none());
    }

    #[test]
    fn by_ref_parameters_match_their_referenced_type() {
        let drain = HostMethod::new("drain", [], StaticType::None, |_, _, _| Ok(Value::None))
            .with_params(vec![HostParam::by_ref(StaticType::List)]);
        assert!(drain.matches(&[StaticType::List], Fit::Exact));
        assert_eq!(drain.signature(), "drain(ref list) -> NoneType");
    }
}
