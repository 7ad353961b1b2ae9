pub mod error;
mod tree;

use std::collections::HashSet;

use log::debug;

pub use self::error::{ParseError, ParseResult};
use self::tree::{binary_operator, build, build_list, parse_target_list, split_commas, to_target};
use crate::ast::{
    ClassDef, Expression, FunctionDef, Param, ParamKind, Program, Statement, StatementKind, Target,
};
use crate::error::Error;
use crate::lexer;
use crate::token::{GroupKind, Keyword, Line, OpKind, Token, TokenKind};

/// Lexes and parses a whole module.
pub fn parse(source: &str) -> Result<Program, Error> {
    let lines = lexer::tokenize(source)?;
    Ok(parse_lines(&lines)?)
}

/// Turns lexed statement groups into a program.
pub fn parse_lines(lines: &[Line]) -> ParseResult<Program> {
    let body = Parser::default().parse_block(lines)?;
    debug!("parsed {} top-level statements", body.len());
    Ok(Program { body })
}

#[derive(Default)]
struct Parser {
    decorators: Vec<Expression>,
}

impl Parser {
    fn parse_block(&mut self, lines: &[Line]) -> ParseResult<Vec<Statement>> {
        let mut body = Vec::with_capacity(lines.len());
        for line in lines {
            if let Some(statement) = self.parse_line(line)? {
                body.push(statement);
            }
        }
        if !self.decorators.is_empty() {
            let line = lines.last().map_or(0, |line| line.line);
            return Err(ParseError::new(
                "a decorator must be followed by a function or class definition",
                line,
            ));
        }
        Ok(body)
    }

    fn parse_line(&mut self, line: &Line) -> ParseResult<Option<Statement>> {
        let number = line.line;
        let tokens = line.tokens.as_slice();

        if line.keyword.is_none() && tokens.first().is_some_and(|t| t.is_op(&OpKind::At)) {
            if line.body.is_some() {
                return Err(ParseError::invalid_syntax(number));
            }
            self.decorators.push(build(&tokens[1..], number)?);
            return Ok(None);
        }
        if !self.decorators.is_empty() && !matches!(line.keyword, Some(Keyword::Def | Keyword::Class))
        {
            return Err(ParseError::new(
                "a decorator must be followed by a function or class definition",
                number,
            ));
        }

        // Block keywords, including the ones rejected below with their own
        // message.
        let compound = matches!(
            line.keyword,
            Some(
                Keyword::If
                    | Keyword::While
                    | Keyword::For
                    | Keyword::Def
                    | Keyword::Class
                    | Keyword::Elif
                    | Keyword::Else
                    | Keyword::Try
                    | Keyword::Except
                    | Keyword::Finally
                    | Keyword::With
            )
        );
        if !compound && line.body.is_some() {
            return Err(ParseError::invalid_syntax(number));
        }

        let kind = match line.keyword {
            None => parse_simple(tokens, number)?,
            Some(Keyword::If) => self.parse_if(line)?,
            Some(Keyword::While) => StatementKind::While {
                condition: build_list(tokens, number)?,
                body: self.parse_body(line)?,
            },
            Some(Keyword::For) => {
                let at = tokens
                    .iter()
                    .position(|token| token.is_op(&OpKind::In))
                    .ok_or_else(|| ParseError::new("expected 'in' in for statement", number))?;
                StatementKind::For {
                    target: parse_target_list(&tokens[..at], number)?,
                    iterable: build_list(&tokens[at + 1..], number)?,
                    body: self.parse_body(line)?,
                }
            }
            Some(Keyword::Def) => {
                let decorators = std::mem::take(&mut self.decorators);
                StatementKind::FunctionDef(self.parse_def(line, decorators)?)
            }
            Some(Keyword::Class) => {
                let decorators = std::mem::take(&mut self.decorators);
                StatementKind::ClassDef(self.parse_class(line, decorators)?)
            }
            Some(Keyword::Return) => {
                StatementKind::Return(optional_expression(tokens, number)?)
            }
            Some(Keyword::Raise) => StatementKind::Raise(optional_expression(tokens, number)?),
            Some(keyword @ (Keyword::Pass | Keyword::Break | Keyword::Continue)) => {
                if !tokens.is_empty() {
                    return Err(ParseError::invalid_syntax(number));
                }
                match keyword {
                    Keyword::Pass => StatementKind::Pass,
                    Keyword::Break => StatementKind::Break,
                    _ => StatementKind::Continue,
                }
            }
            Some(Keyword::Global) => StatementKind::Global(parse_names(tokens, number)?),
            Some(Keyword::Nonlocal) => StatementKind::Nonlocal(parse_names(tokens, number)?),
            Some(Keyword::Del) => {
                let (segments, _) = split_commas(tokens);
                if segments.is_empty() {
                    return Err(ParseError::invalid_syntax(number));
                }
                let targets = segments
                    .into_iter()
                    .map(|segment| to_target(build(segment, number)?, number))
                    .collect::<ParseResult<Vec<Target>>>()?;
                StatementKind::Del(targets)
            }
            Some(Keyword::Assert) => {
                let (segments, _) = split_commas(tokens);
                let Some((test, rest)) = segments.split_first() else {
                    return Err(ParseError::invalid_syntax(number));
                };
                let message = match rest {
                    [] => None,
                    [message] => Some(build(message, number)?),
                    _ => return Err(ParseError::invalid_syntax(number)),
                };
                StatementKind::Assert {
                    test: build(test, number)?,
                    message,
                }
            }
            Some(Keyword::Import) => StatementKind::Import {
                path: dotted_path(tokens, number)?,
            },
            Some(Keyword::From) => {
                let at = tokens
                    .iter()
                    .position(|token| token.is_op(&OpKind::Import))
                    .ok_or_else(|| ParseError::new("expected 'import' after module path", number))?;
                let names = match &tokens[at + 1..] {
                    [star] if star.is_op(&OpKind::Mul) => Vec::new(),
                    names => parse_names(names, number)?,
                };
                StatementKind::FromImport {
                    path: dotted_path(&tokens[..at], number)?,
                    names,
                }
            }
            Some(keyword @ (Keyword::Elif | Keyword::Else)) => {
                return Err(ParseError::new(
                    format!("'{keyword}' without a matching 'if'"),
                    number,
                ));
            }
            Some(
                keyword @ (Keyword::Try
                | Keyword::Except
                | Keyword::Finally
                | Keyword::Yield
                | Keyword::With),
            ) => {
                return Err(ParseError::new(
                    format!("'{keyword}' statements are not supported"),
                    number,
                ));
            }
        };
        Ok(Some(Statement::new(kind, number)))
    }

    fn parse_body(&mut self, line: &Line) -> ParseResult<Vec<Statement>> {
        match &line.body {
            Some(body) if !body.is_empty() => self.parse_block(body),
            _ => Err(ParseError::new("expected an indented block", line.line)),
        }
    }

    fn parse_if(&mut self, line: &Line) -> ParseResult<StatementKind> {
        let mut branches = vec![(build_list(&line.tokens, line.line)?, self.parse_body(line)?)];
        let mut orelse = Vec::new();
        for tier in &line.tiers {
            match tier.keyword {
                Some(Keyword::Elif) => {
                    branches.push((build_list(&tier.tokens, tier.line)?, self.parse_body(tier)?));
                }
                Some(Keyword::Else) if tier.tokens.is_empty() => orelse = self.parse_body(tier)?,
                _ => return Err(ParseError::invalid_syntax(tier.line)),
            }
        }
        Ok(StatementKind::If { branches, orelse })
    }

    fn parse_def(&mut self, line: &Line, decorators: Vec<Expression>) -> ParseResult<FunctionDef> {
        let number = line.line;
        let (name, inner, rest) = match line.tokens.as_slice() {
            [
                Token {
                    kind: TokenKind::Identifier(name),
                    ..
                },
                Token {
                    kind: TokenKind::Group(GroupKind::Paren, inner),
                    ..
                },
                rest @ ..,
            ] => (name.clone(), inner, rest),
            _ => return Err(ParseError::new("invalid function definition", number)),
        };
        let returns = match rest {
            [] => None,
            [arrow, annotation @ ..] if arrow.is_op(&OpKind::Arrow) => {
                Some(dotted_path(annotation, number)?)
            }
            _ => return Err(ParseError::invalid_syntax(number)),
        };
        Ok(FunctionDef {
            name,
            params: parse_params(inner, number)?,
            returns,
            body: self.parse_body(line)?,
            decorators,
        })
    }

    fn parse_class(&mut self, line: &Line, decorators: Vec<Expression>) -> ParseResult<ClassDef> {
        let number = line.line;
        let (name, bases) = match line.tokens.as_slice() {
            [
                Token {
                    kind: TokenKind::Identifier(name),
                    ..
                },
            ] => (name.clone(), Vec::new()),
            [
                Token {
                    kind: TokenKind::Identifier(name),
                    ..
                },
                Token {
                    kind: TokenKind::Group(GroupKind::Paren, inner),
                    ..
                },
            ] => {
                let (segments, _) = split_commas(inner);
                let bases = segments
                    .into_iter()
                    .map(|segment| build(segment, number))
                    .collect::<ParseResult<Vec<_>>>()?;
                (name.clone(), bases)
            }
            _ => return Err(ParseError::new("invalid class definition", number)),
        };
        Ok(ClassDef {
            name,
            bases,
            body: self.parse_body(line)?,
            decorators,
        })
    }
}

fn parse_simple(tokens: &[Token], line: usize) -> ParseResult<StatementKind> {
    let assignments: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| token.operator().is_some_and(|op| op.is_assignment()))
        .map(|(index, _)| index)
        .collect();

    let Some(&last) = assignments.last() else {
        return Ok(StatementKind::Expression(build_list(tokens, line)?));
    };
    let value = build_list(&tokens[last + 1..], line)?;

    let augmented = assignments
        .iter()
        .filter_map(|&index| tokens[index].operator())
        .find(|op| op.augmented);
    if let Some(op) = augmented {
        if assignments.len() > 1 {
            return Err(ParseError::invalid_syntax(line));
        }
        let target = parse_target_list(&tokens[..last], line)?;
        if matches!(target, Target::Tuple(_)) {
            return Err(ParseError::new(
                "illegal expression for augmented assignment",
                line,
            ));
        }
        let op = binary_operator(&op.kind).ok_or_else(|| ParseError::invalid_syntax(line))?;
        return Ok(StatementKind::AugAssign { target, op, value });
    }

    let mut targets = Vec::with_capacity(assignments.len());
    let mut start = 0;
    for &index in &assignments {
        targets.push(parse_target_list(&tokens[start..index], line)?);
        start = index + 1;
    }
    Ok(StatementKind::Assign { targets, value })
}

fn optional_expression(tokens: &[Token], line: usize) -> ParseResult<Option<Expression>> {
    if tokens.is_empty() {
        Ok(None)
    } else {
        build_list(tokens, line).map(Some)
    }
}

fn parse_names(tokens: &[Token], line: usize) -> ParseResult<Vec<String>> {
    let (segments, _) = split_commas(tokens);
    if segments.is_empty() {
        return Err(ParseError::invalid_syntax(line));
    }
    segments
        .into_iter()
        .map(|segment| match segment {
            [token] => token
                .identifier()
                .map(str::to_string)
                .ok_or_else(|| ParseError::new(format!("expected a name, found '{token}'"), line)),
            _ => Err(ParseError::invalid_syntax(line)),
        })
        .collect()
}

/// `a.b.c` written as an identifier followed by member tokens.
fn dotted_path(tokens: &[Token], line: usize) -> ParseResult<String> {
    let Some((first, rest)) = tokens.split_first() else {
        return Err(ParseError::new("expected a dotted name", line));
    };
    let mut path = first
        .identifier()
        .ok_or_else(|| ParseError::new(format!("expected a name, found '{first}'"), line))?
        .to_string();
    for token in rest {
        let TokenKind::Member(segment) = &token.kind else {
            return Err(ParseError::new(format!("unexpected '{token}' in dotted name"), line));
        };
        path.push('.');
        path.push_str(segment);
    }
    Ok(path)
}

fn parse_params(inner: &[Token], line: usize) -> ParseResult<Vec<Param>> {
    let (segments, _) = split_commas(inner);
    let mut params: Vec<Param> = Vec::with_capacity(segments.len());
    let mut seen = HashSet::new();
    for segment in segments {
        let param = match segment {
            [star, name] if star.is_op(&OpKind::Mul) || star.is_op(&OpKind::Pow) => Param {
                name: param_name(name, line)?,
                kind: if star.is_op(&OpKind::Mul) {
                    ParamKind::VarArgs
                } else {
                    ParamKind::KwArgs
                },
                annotation: None,
                default: None,
            },
            [name, rest @ ..] => {
                let assign = rest.iter().position(|token| token.is_op(&OpKind::Assign));
                let (annotation_tokens, default_tokens) = match assign {
                    Some(at) => (&rest[..at], Some(&rest[at + 1..])),
                    None => (rest, None),
                };
                let annotation = match annotation_tokens {
                    [] => None,
                    [colon, path @ ..] if colon.is_op(&OpKind::Colon) => {
                        Some(dotted_path(path, line)?)
                    }
                    _ => return Err(ParseError::invalid_syntax(line)),
                };
                Param {
                    name: param_name(name, line)?,
                    kind: ParamKind::Normal,
                    annotation,
                    default: default_tokens.map(|tokens| build(tokens, line)).transpose()?,
                }
            }
            [] => return Err(ParseError::invalid_syntax(line)),
        };

        if !seen.insert(param.name.clone()) {
            return Err(ParseError::new(
                format!("duplicate argument '{}' in function definition", param.name),
                line,
            ));
        }
        let after_default = params
            .iter()
            .any(|earlier| earlier.default.is_some() && earlier.kind == ParamKind::Normal);
        if param.kind == ParamKind::Normal && param.default.is_none() && after_default {
            return Err(ParseError::new(
                "non-default argument follows default argument",
                line,
            ));
        }
        params.push(param);
    }
    Ok(params)
}

fn param_name(token: &Token, line: usize) -> ParseResult<String> {
    token
        .identifier()
        .map(str::to_string)
        .ok_or_else(|| ParseError::new(format!("invalid parameter '{token}'"), line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn program(source: &str) -> Program {
        parse(source).expect("program should parse")
    }

    fn parse_error(source: &str) -> ParseError {
        match parse(source) {
            Err(Error::Parse(error)) => error,
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn if_chains_collect_elif_and_else() {
        let program = program(indoc! {"
            if a:
                x = 1
            elif b:
                x = 2
            else:
                x = 3
        "});
        let StatementKind::If { branches, orelse } = &program.body[0].kind else {
            panic!("expected an if statement");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].0, Expression::Name("b".into()));
        assert_eq!(orelse.len(), 1);
        assert_eq!(orelse[0].line, 6);
    }

    #[test]
    fn function_definitions_with_defaults_and_annotations() {
        let program = program(indoc! {"
            def area(w: float, h: float = 2.0) -> float:
                return w * h

            def collect(first, *rest, **named):
                pass
        "});
        let StatementKind::FunctionDef(area) = &program.body[0].kind else {
            panic!("expected a function");
        };
        assert!(area.is_typed());
        assert_eq!(area.returns.as_deref(), Some("float"));
        assert_eq!(area.params[1].default, Some(Expression::Float(2.0)));

        let StatementKind::FunctionDef(collect) = &program.body[1].kind else {
            panic!("expected a function");
        };
        assert!(!collect.is_typed());
        let kinds: Vec<_> = collect.params.iter().map(|param| param.kind).collect();
        assert_eq!(
            kinds,
            vec![ParamKind::Normal, ParamKind::VarArgs, ParamKind::KwArgs]
        );
    }

    #[test]
    fn decorators_attach_to_the_next_definition() {
        let program = program(indoc! {"
            @extension(str)
            def shout(self):
                return self.upper()

            class Point(Base, Mixin):
                pass
        "});
        let StatementKind::FunctionDef(shout) = &program.body[0].kind else {
            panic!("expected a function");
        };
        assert_eq!(shout.decorators.len(), 1);
        let StatementKind::ClassDef(point) = &program.body[1].kind else {
            panic!("expected a class");
        };
        assert_eq!(point.bases.len(), 2);
        assert!(point.decorators.is_empty());

        let error = parse_error("@dec\nx = 1\n");
        assert!(error.message.contains("decorator"));
    }

    #[test]
    fn chained_tuple_and_augmented_assignment() {
        let program = program("a = b = 1\nx, (y, z) = t\nn += 2\n");
        assert_eq!(
            program.body[0].kind,
            StatementKind::Assign {
                targets: vec![Target::Name("a".into()), Target::Name("b".into())],
                value: Expression::Int(1),
            }
        );
        assert_eq!(
            program.body[1].kind,
            StatementKind::Assign {
                targets: vec![Target::Tuple(vec![
                    Target::Name("x".into()),
                    Target::Tuple(vec![Target::Name("y".into()), Target::Name("z".into())]),
                ])],
                value: Expression::Name("t".into()),
            }
        );
        assert_eq!(
            program.body[2].kind,
            StatementKind::AugAssign {
                target: Target::Name("n".into()),
                op: BinaryOperator::Add,
                value: Expression::Int(2),
            }
        );
    }

    #[test]
    fn loops_and_imports() {
        let program = program(indoc! {"
            import tools.text
            from tools.math import clamp, lerp
            from tools import *
            for i, v in enumerate(xs):
                continue
            while True: break
        "});
        assert_eq!(
            program.body[0].kind,
            StatementKind::Import {
                path: "tools.text".into()
            }
        );
        assert_eq!(
            program.body[1].kind,
            StatementKind::FromImport {
                path: "tools.math".into(),
                names: vec!["clamp".into(), "lerp".into()],
            }
        );
        assert_eq!(
            program.body[2].kind,
            StatementKind::FromImport {
                path: "tools".into(),
                names: vec![],
            }
        );
        assert!(matches!(program.body[3].kind, StatementKind::For { .. }));
        assert!(matches!(program.body[4].kind, StatementKind::While { .. }));
    }

    #[test]
    fn reports_invalid_statements() {
        assert_eq!(
            parse_error("1 = x\n"),
            ParseError::not_assignable(1)
        );
        assert_eq!(
            parse_error("try:\n    pass\n"),
            ParseError::new("'try' statements are not supported", 1)
        );
        assert_eq!(
            parse_error("x = 1\nwith x:\n    pass\n"),
            ParseError::new("'with' statements are not supported", 2)
        );
        assert_eq!(
            parse_error("def f():\n    yield 1\n"),
            ParseError::new("'yield' statements are not supported", 2)
        );
        assert!(
            parse_error("def f(a=1, b):\n    pass\n")
                .message
                .contains("non-default argument")
        );
        assert!(
            parse_error("def f(a, a):\n    pass\n")
                .message
                .contains("duplicate argument")
        );
    }
}
