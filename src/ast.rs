#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitXor,
    BitOr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOperator {
    pub fn magic_name(self) -> &'static str {
        match self {
            Self::Add => "__add__",
            Self::Sub => "__sub__",
            Self::Mul => "__mul__",
            Self::Div => "__div__",
            Self::FloorDiv => "__floordiv__",
            Self::Mod => "__mod__",
            Self::Pow => "__pow__",
            Self::LShift => "__lshift__",
            Self::RShift => "__rshift__",
            Self::BitAnd => "__and__",
            Self::BitXor => "__xor__",
            Self::BitOr => "__or__",
            Self::Lt => "__lt__",
            Self::Le => "__le__",
            Self::Gt => "__gt__",
            Self::Ge => "__ge__",
            Self::Eq => "__eq__",
            Self::Ne => "__ne__",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::BitAnd => "&",
            Self::BitXor => "^",
            Self::BitOr => "|",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Pos,
    Invert,
}

impl UnaryOperator {
    pub fn magic_name(self) -> &'static str {
        match self {
            Self::Neg => "__neg__",
            Self::Pos => "__pos__",
            Self::Invert => "__invert__",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    None,
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    /// f-string splice, converted with `str`.
    Format(Box<Expression>),
    Tuple(Vec<Expression>),
    List(Vec<Expression>),
    Set(Vec<Expression>),
    Dict(Vec<DictItem>),
    Starred(Box<Expression>),
    DoubleStarred(Box<Expression>),
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Is {
        left: Box<Expression>,
        right: Box<Expression>,
        negated: bool,
    },
    In {
        item: Box<Expression>,
        container: Box<Expression>,
        negated: bool,
    },
    Ternary {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    Attribute {
        object: Box<Expression>,
        name: String,
    },
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
    },
    Slice {
        object: Box<Expression>,
        start: Option<Box<Expression>>,
        stop: Option<Box<Expression>>,
        step: Option<Box<Expression>>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Argument>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expression>,
    },
    Comprehension(Box<Comprehension>),
    /// `value as T`
    Convert {
        value: Box<Expression>,
        target: Box<Expression>,
    },
    /// `value @ T`
    Cast {
        value: Box<Expression>,
        target: Box<Expression>,
    },
    /// `eval(expr)` compiled in typed mode.
    TypedEval(Box<Expression>),
    /// Zero-argument `super()`.
    Super,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    Generator,
    List,
    Set,
    Dict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub kind: ComprehensionKind,
    /// For dict comprehensions the element is `Dict` with a single pair.
    pub element: Expression,
    pub target: Target,
    pub iterable: Expression,
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DictItem {
    Pair(Expression, Expression),
    Unpack(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Positional(Expression),
    Keyword(String, Expression),
    Star(Expression),
    DoubleStar(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Attribute { object: Expression, name: String },
    Index { object: Expression, index: Expression },
    Tuple(Vec<Target>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Normal,
    VarArgs,
    KwArgs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    /// Dotted type name from `name: T`.
    pub annotation: Option<String>,
    pub default: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Option<String>,
    pub body: Vec<Statement>,
    pub decorators: Vec<Expression>,
}

impl FunctionDef {
    /// Annotated functions compile in typed mode.
    pub fn is_typed(&self) -> bool {
        self.returns.is_some() || self.params.iter().any(|param| param.annotation.is_some())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<Expression>,
    pub body: Vec<Statement>,
    pub decorators: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Expression(Expression),
    Assign {
        targets: Vec<Target>,
        value: Expression,
    },
    AugAssign {
        target: Target,
        op: BinaryOperator,
        value: Expression,
    },
    If {
        branches: Vec<(Expression, Vec<Statement>)>,
        orelse: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    For {
        target: Target,
        iterable: Expression,
        body: Vec<Statement>,
    },
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Return(Option<Expression>),
    Break,
    Continue,
    Pass,
    Global(Vec<String>),
    Nonlocal(Vec<String>),
    Del(Vec<Target>),
    Raise(Option<Expression>),
    Assert {
        test: Expression,
        message: Option<Expression>,
    },
    Import {
        path: String,
    },
    FromImport {
        path: String,
        /// Empty for `from m import *`.
        names: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub line: usize,
}

impl Statement {
    pub fn new(kind: StatementKind, line: usize) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Statement>,
}
