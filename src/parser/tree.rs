//! Expression trees from flat token runs.
//!
//! A run is split into operands (maximal spans of non-operator tokens, each a
//! primary followed by member/call/subscript trailers) and operators. The
//! tightest-binding reducible operator is then folded with its neighbours
//! until a single operand remains. Ties go to the rightmost candidate when the
//! current winner is right-associative and to the leftmost otherwise, so the
//! resulting tree depends only on the precedence table and the token order.

use crate::ast::{
    Argument, BinaryOperator, Comprehension, ComprehensionKind, DictItem, Expression, Target,
    UnaryOperator,
};
use crate::parser::error::{ParseError, ParseResult};
use crate::token::{GroupKind, OpKind, Operator, Precedence, Token, TokenKind};

enum Node {
    Expr(Expression),
    /// Right half of `a if cond else b`, waiting for its `if`.
    ElseArm {
        condition: Expression,
        otherwise: Expression,
    },
}

enum Item {
    Operand(Node),
    Operator { op: Operator, unary: bool },
}

impl Item {
    fn is_operand(&self) -> bool {
        matches!(self, Item::Operand(_))
    }
}

fn near(token: &Token) -> ParseError {
    ParseError::new(format!("invalid syntax near '{token}'"), token.line)
}

fn unary_precedence(kind: &OpKind) -> Option<Precedence> {
    match kind {
        OpKind::Sub | OpKind::Add | OpKind::Invert => Some(Precedence::Unary),
        OpKind::Not => Some(Precedence::LogicalNot),
        OpKind::Mul | OpKind::Pow | OpKind::Lambda(_) => Some(Precedence::Key),
        _ => None,
    }
}

pub(crate) fn binary_operator(kind: &OpKind) -> Option<BinaryOperator> {
    Some(match kind {
        OpKind::Add => BinaryOperator::Add,
        OpKind::Sub => BinaryOperator::Sub,
        OpKind::Mul => BinaryOperator::Mul,
        OpKind::Div => BinaryOperator::Div,
        OpKind::FloorDiv => BinaryOperator::FloorDiv,
        OpKind::Mod => BinaryOperator::Mod,
        OpKind::Pow => BinaryOperator::Pow,
        OpKind::LShift => BinaryOperator::LShift,
        OpKind::RShift => BinaryOperator::RShift,
        OpKind::BitAnd => BinaryOperator::BitAnd,
        OpKind::BitXor => BinaryOperator::BitXor,
        OpKind::BitOr => BinaryOperator::BitOr,
        OpKind::Lt => BinaryOperator::Lt,
        OpKind::Le => BinaryOperator::Le,
        OpKind::Gt => BinaryOperator::Gt,
        OpKind::Ge => BinaryOperator::Ge,
        OpKind::Eq => BinaryOperator::Eq,
        OpKind::Ne => BinaryOperator::Ne,
        _ => return None,
    })
}

/// Builds one expression from a comma-free token run.
pub(crate) fn build(tokens: &[Token], line: usize) -> ParseResult<Expression> {
    let line = tokens.first().map_or(line, |token| token.line);
    let mut items = segment(tokens, line)?;
    while items.len() > 1 {
        let index = select(&items).ok_or_else(|| ParseError::invalid_syntax(line))?;
        reduce(&mut items, index, line)?;
    }
    match items.pop() {
        Some(Item::Operand(node)) => expect_expr(node, line),
        _ => Err(ParseError::new("expected an expression", line)),
    }
}

/// Builds a comma-separated run: a single expression, or a tuple when a
/// comma is present.
pub(crate) fn build_list(tokens: &[Token], line: usize) -> ParseResult<Expression> {
    let (segments, trailing) = split_commas(tokens);
    match segments.as_slice() {
        [] => Err(ParseError::new("expected an expression", line)),
        [single] if !trailing => build(single, line),
        _ => Ok(Expression::Tuple(build_each(&segments, line)?)),
    }
}

fn build_each(segments: &[&[Token]], line: usize) -> ParseResult<Vec<Expression>> {
    segments
        .iter()
        .map(|segment| build(segment, line))
        .collect()
}

pub(crate) fn split_commas(tokens: &[Token]) -> (Vec<&[Token]>, bool) {
    let mut segments = Vec::new();
    let mut start = 0;
    for (index, token) in tokens.iter().enumerate() {
        if token.ends_comma {
            segments.push(&tokens[start..=index]);
            start = index + 1;
        }
    }
    let trailing = !tokens.is_empty() && start == tokens.len();
    if start < tokens.len() {
        segments.push(&tokens[start..]);
    }
    (segments, trailing)
}

fn segment(tokens: &[Token], line: usize) -> ParseResult<Vec<Item>> {
    let mut items = Vec::new();
    let mut start = 0;
    for (index, token) in tokens.iter().enumerate() {
        let Some(op) = token.operator() else {
            continue;
        };
        if start < index {
            let operand = parse_operand(&tokens[start..index], line)?;
            items.push(Item::Operand(Node::Expr(operand)));
        }
        start = index + 1;

        if op.augmented
            || matches!(
                op.kind,
                OpKind::Assign | OpKind::Colon | OpKind::Arrow | OpKind::For | OpKind::Import
            )
        {
            return Err(near(token));
        }
        let unary = !items.last().is_some_and(Item::is_operand);
        if unary && unary_precedence(&op.kind).is_none() {
            return Err(near(token));
        }
        items.push(Item::Operator {
            op: op.clone(),
            unary,
        });
    }
    if start < tokens.len() {
        let operand = parse_operand(&tokens[start..], line)?;
        items.push(Item::Operand(Node::Expr(operand)));
    }
    if let Some(Item::Operator { op, .. }) = items.last() {
        return Err(ParseError::new(
            format!("expected an expression after '{}'", op.kind.symbol()),
            line,
        ));
    }
    Ok(items)
}

fn select(items: &[Item]) -> Option<usize> {
    let mut best: Option<(usize, Precedence, bool)> = None;
    for (index, item) in items.iter().enumerate() {
        let Item::Operator { op, unary } = item else {
            continue;
        };
        let right_ready = items.get(index + 1).is_some_and(Item::is_operand);
        let reducible = if *unary {
            right_ready
        } else {
            right_ready && index > 0 && items[index - 1].is_operand()
        };
        if !reducible {
            continue;
        }
        let (precedence, right_assoc) = if *unary {
            (unary_precedence(&op.kind).unwrap_or(Precedence::Unary), true)
        } else {
            (op.precedence, op.right_assoc)
        };
        best = match best {
            Some((_, best_precedence, best_right))
                if !(precedence < best_precedence
                    || (best_right && precedence == best_precedence)) =>
            {
                best
            }
            _ => Some((index, precedence, right_assoc)),
        };
    }
    best.map(|(index, ..)| index)
}

fn reduce(items: &mut Vec<Item>, index: usize, line: usize) -> ParseResult<()> {
    let Item::Operator { op, unary } = items.remove(index) else {
        return Err(ParseError::invalid_syntax(line));
    };
    let Item::Operand(right) = items.remove(index) else {
        return Err(ParseError::invalid_syntax(line));
    };
    if unary {
        let operand = apply_unary(op, expect_expr(right, line)?);
        items.insert(index, Item::Operand(Node::Expr(operand)));
        return Ok(());
    }
    let Item::Operand(left) = items.remove(index - 1) else {
        return Err(ParseError::invalid_syntax(line));
    };
    let node = combine(op, left, right, line)?;
    items.insert(index - 1, Item::Operand(node));
    Ok(())
}

fn expect_expr(node: Node, line: usize) -> ParseResult<Expression> {
    match node {
        Node::Expr(expr) => Ok(expr),
        Node::ElseArm { .. } => Err(ParseError::new(
            "'else' without 'if' in conditional expression",
            line,
        )),
    }
}

fn apply_unary(op: Operator, operand: Expression) -> Expression {
    match op.kind {
        OpKind::Sub => match operand {
            Expression::Int(value) => Expression::Int(-value),
            Expression::Float(value) => Expression::Float(-value),
            operand => Expression::Unary {
                op: UnaryOperator::Neg,
                operand: Box::new(operand),
            },
        },
        OpKind::Add => Expression::Unary {
            op: UnaryOperator::Pos,
            operand: Box::new(operand),
        },
        OpKind::Invert => Expression::Unary {
            op: UnaryOperator::Invert,
            operand: Box::new(operand),
        },
        OpKind::Not => Expression::Not(Box::new(operand)),
        OpKind::Mul => Expression::Starred(Box::new(operand)),
        OpKind::Pow => Expression::DoubleStarred(Box::new(operand)),
        OpKind::Lambda(params) => Expression::Lambda {
            params,
            body: Box::new(operand),
        },
        _ => operand,
    }
}

fn combine(op: Operator, left: Node, right: Node, line: usize) -> ParseResult<Node> {
    match op.kind {
        OpKind::Else => {
            return Ok(Node::ElseArm {
                condition: expect_expr(left, line)?,
                otherwise: expect_expr(right, line)?,
            });
        }
        OpKind::If => {
            let Node::ElseArm {
                condition,
                otherwise,
            } = right
            else {
                return Err(ParseError::new(
                    "expected 'else' in conditional expression",
                    line,
                ));
            };
            return Ok(Node::Expr(Expression::Ternary {
                condition: Box::new(condition),
                then: Box::new(expect_expr(left, line)?),
                otherwise: Box::new(otherwise),
            }));
        }
        _ => {}
    }

    let left = Box::new(expect_expr(left, line)?);
    let right = Box::new(expect_expr(right, line)?);
    let expr = match &op.kind {
        OpKind::Is | OpKind::IsNot => Expression::Is {
            left,
            right,
            negated: op.kind == OpKind::IsNot,
        },
        OpKind::In | OpKind::NotIn => Expression::In {
            item: left,
            container: right,
            negated: op.kind == OpKind::NotIn,
        },
        OpKind::And => Expression::And(left, right),
        OpKind::Or => Expression::Or(left, right),
        OpKind::As => Expression::Convert {
            value: left,
            target: right,
        },
        OpKind::At => Expression::Cast {
            value: left,
            target: right,
        },
        kind => match binary_operator(kind) {
            Some(op) => Expression::Binary { op, left, right },
            None => {
                return Err(ParseError::new(
                    format!("invalid syntax near '{}'", kind.symbol()),
                    line,
                ));
            }
        },
    };
    Ok(Node::Expr(expr))
}

fn parse_number(text: &str, line: usize) -> ParseResult<Expression> {
    let invalid = || ParseError::new(format!("invalid number literal '{text}'"), line);
    if text.contains(['.', 'e', 'E']) {
        text.parse().map(Expression::Float).map_err(|_| invalid())
    } else {
        text.parse().map(Expression::Int).map_err(|_| invalid())
    }
}

/// A primary followed by `.name`, `(...)` and `[...]` trailers.
pub(crate) fn parse_operand(span: &[Token], line: usize) -> ParseResult<Expression> {
    let Some((first, mut rest)) = span.split_first() else {
        return Err(ParseError::new("expected an expression", line));
    };
    let mut expr = match &first.kind {
        TokenKind::Identifier(name) => match name.as_str() {
            "None" => Expression::None,
            "True" => Expression::Bool(true),
            "False" => Expression::Bool(false),
            "nil" => Expression::Nil,
            _ => Expression::Name(name.clone()),
        },
        TokenKind::Number(text) => parse_number(text, first.line)?,
        TokenKind::Str(text) => {
            let mut text = text.clone();
            while let Some((
                Token {
                    kind: TokenKind::Str(more),
                    ..
                },
                tail,
            )) = rest.split_first()
            {
                text.push_str(more);
                rest = tail;
            }
            Expression::Str(text)
        }
        TokenKind::Group(GroupKind::Paren, inner) => parse_paren(inner, first.line)?,
        TokenKind::Group(GroupKind::Bracket, inner) => parse_bracket(inner, first.line)?,
        TokenKind::Group(GroupKind::Brace, inner) => parse_brace(inner, first.line)?,
        TokenKind::Group(GroupKind::Format, inner) => {
            Expression::Format(Box::new(build_list(inner, first.line)?))
        }
        TokenKind::Member(_) | TokenKind::Operator(_) => return Err(near(first)),
    };
    for token in rest {
        expr = match &token.kind {
            TokenKind::Member(name) => Expression::Attribute {
                object: Box::new(expr),
                name: name.clone(),
            },
            TokenKind::Group(GroupKind::Paren, inner) => make_call(expr, inner, token.line)?,
            TokenKind::Group(GroupKind::Bracket, inner) => {
                make_subscript(expr, inner, token.line)?
            }
            _ => return Err(near(token)),
        };
    }
    Ok(expr)
}

fn has_op(tokens: &[Token], kind: &OpKind) -> bool {
    tokens.iter().any(|token| token.is_op(kind))
}

fn find_op(tokens: &[Token], kind: &OpKind) -> Option<usize> {
    tokens.iter().position(|token| token.is_op(kind))
}

fn make_call(callee: Expression, inner: &[Token], line: usize) -> ParseResult<Expression> {
    let mut args = parse_args(inner, line)?;
    let named = |wanted: &str| matches!(&callee, Expression::Name(name) if name == wanted);
    if named("super") && args.is_empty() {
        return Ok(Expression::Super);
    }
    if named("eval")
        && matches!(args.as_slice(), [Argument::Positional(_)])
        && let Some(Argument::Positional(value)) = args.pop()
    {
        return Ok(Expression::TypedEval(Box::new(value)));
    }
    Ok(Expression::Call {
        callee: Box::new(callee),
        args,
    })
}

pub(crate) fn parse_args(inner: &[Token], line: usize) -> ParseResult<Vec<Argument>> {
    if has_op(inner, &OpKind::For) {
        let comprehension = parse_comprehension(inner, ComprehensionKind::Generator, line)?;
        return Ok(vec![Argument::Positional(Expression::Comprehension(
            Box::new(comprehension),
        ))]);
    }
    let (segments, _) = split_commas(inner);
    let mut args = Vec::with_capacity(segments.len());
    let mut keyword_seen = false;
    for segment in segments {
        let segment_line = segment.first().map_or(line, |token| token.line);
        let arg = match segment {
            [
                Token {
                    kind: TokenKind::Identifier(name),
                    ..
                },
                equals,
                value @ ..,
            ] if equals.is_op(&OpKind::Assign) => {
                Argument::Keyword(name.clone(), build(value, segment_line)?)
            }
            _ => match build(segment, segment_line)? {
                Expression::Starred(value) => Argument::Star(*value),
                Expression::DoubleStarred(value) => Argument::DoubleStar(*value),
                value => Argument::Positional(value),
            },
        };
        match arg {
            Argument::Positional(_) | Argument::Star(_) if keyword_seen => {
                return Err(ParseError::new(
                    "positional argument follows keyword argument",
                    segment_line,
                ));
            }
            Argument::Keyword(..) | Argument::DoubleStar(_) => keyword_seen = true,
            _ => {}
        }
        args.push(arg);
    }
    Ok(args)
}

fn make_subscript(object: Expression, inner: &[Token], line: usize) -> ParseResult<Expression> {
    if !has_op(inner, &OpKind::Colon) {
        return Ok(Expression::Index {
            object: Box::new(object),
            index: Box::new(build_list(inner, line)?),
        });
    }
    let parts: Vec<&[Token]> = inner.split(|token| token.is_op(&OpKind::Colon)).collect();
    if parts.len() > 3 {
        return Err(ParseError::invalid_syntax(line));
    }
    let part = |index: usize| -> ParseResult<Option<Box<Expression>>> {
        match parts.get(index) {
            Some(tokens) if !tokens.is_empty() => Ok(Some(Box::new(build(tokens, line)?))),
            _ => Ok(None),
        }
    };
    Ok(Expression::Slice {
        object: Box::new(object),
        start: part(0)?,
        stop: part(1)?,
        step: part(2)?,
    })
}

fn parse_paren(inner: &[Token], line: usize) -> ParseResult<Expression> {
    if inner.is_empty() {
        return Ok(Expression::Tuple(Vec::new()));
    }
    if has_op(inner, &OpKind::For) {
        let comprehension = parse_comprehension(inner, ComprehensionKind::Generator, line)?;
        return Ok(Expression::Comprehension(Box::new(comprehension)));
    }
    build_list(inner, line)
}

fn parse_bracket(inner: &[Token], line: usize) -> ParseResult<Expression> {
    if has_op(inner, &OpKind::For) {
        let comprehension = parse_comprehension(inner, ComprehensionKind::List, line)?;
        return Ok(Expression::Comprehension(Box::new(comprehension)));
    }
    let (segments, _) = split_commas(inner);
    Ok(Expression::List(build_each(&segments, line)?))
}

fn parse_brace(inner: &[Token], line: usize) -> ParseResult<Expression> {
    if inner.is_empty() {
        return Ok(Expression::Dict(Vec::new()));
    }
    if let Some(for_at) = find_op(inner, &OpKind::For) {
        let kind = if has_op(&inner[..for_at], &OpKind::Colon) {
            ComprehensionKind::Dict
        } else {
            ComprehensionKind::Set
        };
        let comprehension = parse_comprehension(inner, kind, line)?;
        return Ok(Expression::Comprehension(Box::new(comprehension)));
    }

    let (segments, _) = split_commas(inner);
    let starts_unpack = |tokens: &[Token]| tokens.first().is_some_and(|t| t.is_op(&OpKind::Pow));
    let is_dict = segments
        .first()
        .is_some_and(|first| starts_unpack(first) || has_op(first, &OpKind::Colon));
    if !is_dict {
        return Ok(Expression::Set(build_each(&segments, line)?));
    }

    let mut items = Vec::with_capacity(segments.len());
    for segment in segments {
        let segment_line = segment.first().map_or(line, |token| token.line);
        if starts_unpack(segment) {
            items.push(DictItem::Unpack(build(&segment[1..], segment_line)?));
            continue;
        }
        let colon = find_op(segment, &OpKind::Colon).ok_or_else(|| {
            ParseError::new("expected ':' in dictionary entry", segment_line)
        })?;
        items.push(DictItem::Pair(
            build(&segment[..colon], segment_line)?,
            build(&segment[colon + 1..], segment_line)?,
        ));
    }
    Ok(Expression::Dict(items))
}

fn parse_comprehension(
    tokens: &[Token],
    kind: ComprehensionKind,
    line: usize,
) -> ParseResult<Comprehension> {
    let for_at = find_op(tokens, &OpKind::For).ok_or_else(|| ParseError::invalid_syntax(line))?;
    let (element_tokens, rest) = (&tokens[..for_at], &tokens[for_at + 1..]);
    let in_at = find_op(rest, &OpKind::In)
        .ok_or_else(|| ParseError::new("expected 'in' in comprehension", line))?;
    let target = parse_target_list(&rest[..in_at], line)?;
    let tail = &rest[in_at + 1..];
    let (iterable_tokens, condition_tokens) = match find_op(tail, &OpKind::If) {
        Some(at) => (&tail[..at], Some(&tail[at + 1..])),
        None => (tail, None),
    };
    if has_op(tail, &OpKind::For) {
        return Err(ParseError::new(
            "nested comprehension clauses are not supported",
            line,
        ));
    }

    let element = if kind == ComprehensionKind::Dict {
        let colon = find_op(element_tokens, &OpKind::Colon)
            .ok_or_else(|| ParseError::new("expected ':' in dictionary comprehension", line))?;
        Expression::Dict(vec![DictItem::Pair(
            build(&element_tokens[..colon], line)?,
            build(&element_tokens[colon + 1..], line)?,
        )])
    } else {
        build(element_tokens, line)?
    };

    Ok(Comprehension {
        kind,
        element,
        target,
        iterable: build_list(iterable_tokens, line)?,
        condition: condition_tokens
            .map(|tokens| build(tokens, line))
            .transpose()?,
    })
}

pub(crate) fn to_target(expr: Expression, line: usize) -> ParseResult<Target> {
    match expr {
        Expression::Name(name) => Ok(Target::Name(name)),
        Expression::Attribute { object, name } => Ok(Target::Attribute {
            object: *object,
            name,
        }),
        Expression::Index { object, index } => Ok(Target::Index {
            object: *object,
            index: *index,
        }),
        Expression::Tuple(items) | Expression::List(items) => Ok(Target::Tuple(
            items
                .into_iter()
                .map(|item| to_target(item, line))
                .collect::<ParseResult<_>>()?,
        )),
        _ => Err(ParseError::not_assignable(line)),
    }
}

pub(crate) fn parse_target_list(tokens: &[Token], line: usize) -> ParseResult<Target> {
    let line = tokens.first().map_or(line, |token| token.line);
    to_target(build_list(tokens, line)?, line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use pretty_assertions::assert_eq;

    fn expr(source: &str) -> Expression {
        let lines = tokenize(source).expect("tokenize should succeed");
        build_list(&lines[0].tokens, 1).expect("build should succeed")
    }

    fn expr_error(source: &str) -> ParseError {
        let lines = tokenize(source).expect("tokenize should succeed");
        build_list(&lines[0].tokens, 1).expect_err("build should fail")
    }

    fn name(value: &str) -> Expression {
        Expression::Name(value.to_string())
    }

    fn int(value: i64) -> Expression {
        Expression::Int(value)
    }

    fn bin(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            expr("1 + 2 * 3"),
            bin(
                BinaryOperator::Add,
                int(1),
                bin(BinaryOperator::Mul, int(2), int(3))
            )
        );
        assert_eq!(
            expr("(1 + 2) * 3"),
            bin(
                BinaryOperator::Mul,
                bin(BinaryOperator::Add, int(1), int(2)),
                int(3)
            )
        );
    }

    #[test]
    fn left_and_right_associativity() {
        assert_eq!(
            expr("a - b - c"),
            bin(
                BinaryOperator::Sub,
                bin(BinaryOperator::Sub, name("a"), name("b")),
                name("c")
            )
        );
        assert_eq!(
            expr("2 ** 3 ** 2"),
            bin(
                BinaryOperator::Pow,
                int(2),
                bin(BinaryOperator::Pow, int(3), int(2))
            )
        );
    }

    #[test]
    fn unary_operators_take_their_own_precedence() {
        assert_eq!(
            expr("-a ** 2"),
            Expression::Unary {
                op: UnaryOperator::Neg,
                operand: Box::new(bin(BinaryOperator::Pow, name("a"), int(2))),
            }
        );
        assert_eq!(
            expr("2 ** -1"),
            bin(BinaryOperator::Pow, int(2), int(-1))
        );
        assert_eq!(
            expr("not a == b"),
            Expression::Not(Box::new(bin(BinaryOperator::Eq, name("a"), name("b"))))
        );
        assert_eq!(
            expr("not a and not b"),
            Expression::And(
                Box::new(Expression::Not(Box::new(name("a")))),
                Box::new(Expression::Not(Box::new(name("b"))))
            )
        );
    }

    #[test]
    fn logical_operators_bind_looser_than_comparisons() {
        assert_eq!(
            expr("a < b or c is not None"),
            Expression::Or(
                Box::new(bin(BinaryOperator::Lt, name("a"), name("b"))),
                Box::new(Expression::Is {
                    left: Box::new(name("c")),
                    right: Box::new(Expression::None),
                    negated: true,
                })
            )
        );
    }

    #[test]
    fn ternary_nests_to_the_right() {
        assert_eq!(
            expr("a if c else b + 1"),
            Expression::Ternary {
                condition: Box::new(name("c")),
                then: Box::new(name("a")),
                otherwise: Box::new(bin(BinaryOperator::Add, name("b"), int(1))),
            }
        );
        assert!(
            expr_error("a if c")
                .message
                .contains("expected 'else'")
        );
    }

    #[test]
    fn trailers_build_calls_members_and_subscripts() {
        assert_eq!(
            expr("obj.items[0](x, key=1)"),
            Expression::Call {
                callee: Box::new(Expression::Index {
                    object: Box::new(Expression::Attribute {
                        object: Box::new(name("obj")),
                        name: "items".into(),
                    }),
                    index: Box::new(int(0)),
                }),
                args: vec![
                    Argument::Positional(name("x")),
                    Argument::Keyword("key".into(), int(1)),
                ],
            }
        );
        assert_eq!(
            expr("s[1:]"),
            Expression::Slice {
                object: Box::new(name("s")),
                start: Some(Box::new(int(1))),
                stop: None,
                step: None,
            }
        );
    }

    #[test]
    fn unpacking_inside_literals() {
        assert_eq!(
            expr("[*a, 3]"),
            Expression::List(vec![Expression::Starred(Box::new(name("a"))), int(3)])
        );
        assert_eq!(
            expr("{**d, 'b': 2}"),
            Expression::Dict(vec![
                DictItem::Unpack(name("d")),
                DictItem::Pair(Expression::Str("b".into()), int(2)),
            ])
        );
        assert_eq!(expr("{1, 2}"), Expression::Set(vec![int(1), int(2)]));
        assert_eq!(expr("(1,)"), Expression::Tuple(vec![int(1)]));
        assert_eq!(expr("a, b"), Expression::Tuple(vec![name("a"), name("b")]));
    }

    #[test]
    fn comprehensions_split_target_iterable_and_filter() {
        let Expression::Comprehension(comprehension) = expr("[x * 2 for x in xs if x != 2]") else {
            panic!("expected a comprehension");
        };
        assert_eq!(comprehension.kind, ComprehensionKind::List);
        assert_eq!(comprehension.target, Target::Name("x".into()));
        assert_eq!(comprehension.iterable, name("xs"));
        assert_eq!(
            comprehension.condition,
            Some(bin(BinaryOperator::Ne, name("x"), int(2)))
        );

        let Expression::Comprehension(pairs) = expr("{k: v for k, v in items}") else {
            panic!("expected a dict comprehension");
        };
        assert_eq!(pairs.kind, ComprehensionKind::Dict);
        assert_eq!(
            pairs.target,
            Target::Tuple(vec![Target::Name("k".into()), Target::Name("v".into())])
        );
    }

    #[test]
    fn lambda_and_special_calls() {
        assert_eq!(
            expr("lambda a: a + 1"),
            Expression::Lambda {
                params: vec!["a".into()],
                body: Box::new(bin(BinaryOperator::Add, name("a"), int(1))),
            }
        );
        assert_eq!(
            expr("super().m()"),
            Expression::Call {
                callee: Box::new(Expression::Attribute {
                    object: Box::new(Expression::Super),
                    name: "m".into(),
                }),
                args: vec![],
            }
        );
        assert_eq!(
            expr("eval(1 + 2)"),
            Expression::TypedEval(Box::new(bin(BinaryOperator::Add, int(1), int(2))))
        );
    }

    #[test]
    fn rejects_malformed_runs() {
        assert!(expr_error("a b").message.contains("invalid syntax"));
        assert!(expr_error("1 +").message.contains("expected an expression"));
        assert!(expr_error("f(a=1, 2)").message.contains("positional argument"));
    }

    #[test]
    fn targets_reject_non_assignable_expressions() {
        let lines = tokenize("a + b\n").expect("tokenize should succeed");
        assert_eq!(
            parse_target_list(&lines[0].tokens, 1).expect_err("not assignable"),
            ParseError::not_assignable(1)
        );
    }
}
