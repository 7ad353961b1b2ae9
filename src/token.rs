use std::fmt;

/// Binding strength of an operator. Lower values bind tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    Cast,
    Exponentiation,
    Unary,
    Multiplicative,
    Additive,
    Shift,
    BitwiseAnd,
    BitwiseXor,
    BitwiseOr,
    Relational,
    LogicalNot,
    LogicalAnd,
    LogicalOr,
    Key,
    Iteration,
    Colon,
    Assignment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
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
    Invert,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Is,
    IsNot,
    In,
    NotIn,
    Not,
    And,
    Or,
    If,
    Else,
    For,
    As,
    Import,
    Lambda(Vec<String>),
    Colon,
    Arrow,
    Assign,
    At,
}

impl OpKind {
    pub fn precedence(&self) -> Precedence {
        match self {
            Self::At => Precedence::Cast,
            Self::Pow => Precedence::Exponentiation,
            Self::Invert => Precedence::Unary,
            Self::Mul | Self::Div | Self::FloorDiv | Self::Mod => Precedence::Multiplicative,
            Self::Add | Self::Sub => Precedence::Additive,
            Self::LShift | Self::RShift => Precedence::Shift,
            Self::BitAnd => Precedence::BitwiseAnd,
            Self::BitXor => Precedence::BitwiseXor,
            Self::BitOr => Precedence::BitwiseOr,
            Self::Lt
            | Self::Le
            | Self::Gt
            | Self::Ge
            | Self::Eq
            | Self::Ne
            | Self::Is
            | Self::IsNot
            | Self::In
            | Self::NotIn => Precedence::Relational,
            Self::Not => Precedence::LogicalNot,
            Self::And => Precedence::LogicalAnd,
            Self::Or => Precedence::LogicalOr,
            Self::If | Self::Else | Self::As | Self::Import | Self::Lambda(_) => Precedence::Key,
            Self::For => Precedence::Iteration,
            Self::Colon | Self::Arrow => Precedence::Colon,
            Self::Assign => Precedence::Assignment,
        }
    }

    pub fn right_assoc(&self) -> bool {
        matches!(
            self,
            Self::Pow
                | Self::Invert
                | Self::Not
                | Self::If
                | Self::Else
                | Self::For
                | Self::As
                | Self::Import
                | Self::Lambda(_)
                | Self::Assign
                | Self::At
        )
    }

    /// Name of the dispatch hook a binary use of this operator routes through.
    pub fn magic_name(&self) -> Option<&'static str> {
        Some(match self {
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
            Self::Invert => "__invert__",
            Self::Lt => "__lt__",
            Self::Le => "__le__",
            Self::Gt => "__gt__",
            Self::Ge => "__ge__",
            Self::Eq => "__eq__",
            Self::Ne => "__ne__",
            Self::In | Self::NotIn => "__contains__",
            _ => return None,
        })
    }

    pub fn symbol(&self) -> &'static str {
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
            Self::Invert => "~",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Is => "is",
            Self::IsNot => "is not",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Not => "not",
            Self::And => "and",
            Self::Or => "or",
            Self::If => "if",
            Self::Else => "else",
            Self::For => "for",
            Self::As => "as",
            Self::Import => "import",
            Self::Lambda(_) => "lambda",
            Self::Colon => ":",
            Self::Arrow => "->",
            Self::Assign => "=",
            Self::At => "@",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub kind: OpKind,
    pub precedence: Precedence,
    pub right_assoc: bool,
    /// `+=` and friends: the base operator at assignment precedence.
    pub augmented: bool,
}

impl Operator {
    pub fn new(kind: OpKind) -> Self {
        Self {
            precedence: kind.precedence(),
            right_assoc: kind.right_assoc(),
            kind,
            augmented: false,
        }
    }

    pub fn augmented(kind: OpKind) -> Self {
        Self {
            kind,
            precedence: Precedence::Assignment,
            right_assoc: true,
            augmented: true,
        }
    }

    pub fn is_assignment(&self) -> bool {
        self.augmented || self.kind == OpKind::Assign
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Paren,
    Bracket,
    Brace,
    /// An f-string `{expr}` splice.
    Format,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Member(String),
    Number(String),
    Str(String),
    Operator(Operator),
    Group(GroupKind, Vec<Token>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    /// Last item before a `,` separator.
    pub ends_comma: bool,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize) -> Self {
        Self {
            kind,
            line,
            ends_comma: false,
        }
    }

    pub fn operator(&self) -> Option<&Operator> {
        match &self.kind {
            TokenKind::Operator(op) => Some(op),
            _ => None,
        }
    }

    pub fn is_op(&self, kind: &OpKind) -> bool {
        self.operator().is_some_and(|op| &op.kind == kind && !op.augmented)
    }

    pub fn identifier(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Identifier(name) => write!(f, "{name}"),
            TokenKind::Member(name) => write!(f, ".{name}"),
            TokenKind::Number(text) => write!(f, "{text}"),
            TokenKind::Str(text) => write!(f, "{text:?}"),
            TokenKind::Operator(op) if op.augmented => write!(f, "{}=", op.kind.symbol()),
            TokenKind::Operator(op) => write!(f, "{}", op.kind.symbol()),
            TokenKind::Group(GroupKind::Paren, _) => write!(f, "(...)"),
            TokenKind::Group(GroupKind::Bracket, _) => write!(f, "[...]"),
            TokenKind::Group(GroupKind::Brace, _) => write!(f, "{{...}}"),
            TokenKind::Group(GroupKind::Format, _) => write!(f, "{{format}}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Elif,
    Else,
    For,
    While,
    Def,
    Class,
    Return,
    Pass,
    Break,
    Continue,
    Import,
    From,
    Global,
    Nonlocal,
    Del,
    Raise,
    Assert,
    Try,
    Except,
    Finally,
    Yield,
    With,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "if" => Self::If,
            "elif" => Self::Elif,
            "else" => Self::Else,
            "for" => Self::For,
            "while" => Self::While,
            "def" => Self::Def,
            "class" => Self::Class,
            "return" => Self::Return,
            "pass" => Self::Pass,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "import" => Self::Import,
            "from" => Self::From,
            "global" => Self::Global,
            "nonlocal" => Self::Nonlocal,
            "del" => Self::Del,
            "raise" => Self::Raise,
            "assert" => Self::Assert,
            "try" => Self::Try,
            "except" => Self::Except,
            "finally" => Self::Finally,
            "yield" => Self::Yield,
            "with" => Self::With,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::For => "for",
            Self::While => "while",
            Self::Def => "def",
            Self::Class => "class",
            Self::Return => "return",
            Self::Pass => "pass",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Import => "import",
            Self::From => "from",
            Self::Global => "global",
            Self::Nonlocal => "nonlocal",
            Self::Del => "del",
            Self::Raise => "raise",
            Self::Assert => "assert",
            Self::Try => "try",
            Self::Except => "except",
            Self::Finally => "finally",
            Self::Yield => "yield",
            Self::With => "with",
        }
    }

    /// The operator a keyword turns into when it appears mid-expression.
    pub fn inline_operator(self) -> Option<OpKind> {
        match self {
            Self::If => Some(OpKind::If),
            Self::Else => Some(OpKind::Else),
            Self::For => Some(OpKind::For),
            Self::Import => Some(OpKind::Import),
            _ => None,
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical line: its tokens, leading keyword, indented body and the
/// `elif`/`else` continuations attached to it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Line {
    pub tokens: Vec<Token>,
    pub keyword: Option<Keyword>,
    pub body: Option<Vec<Line>>,
    pub tiers: Vec<Line>,
    pub line: usize,
}
