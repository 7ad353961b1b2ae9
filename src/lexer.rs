pub mod error;

use std::collections::HashMap;
use std::mem;

use log::debug;

pub use self::error::{LexError, LexResult};
use crate::token::{GroupKind, Keyword, Line, OpKind, Operator, Token, TokenKind};

/// Splits source text into statement groups nested by indentation.
pub fn tokenize(source: &str) -> LexResult<Vec<Line>> {
    let lines = Lexer::new(source, 1).run()?;
    debug!("tokenized {} top-level statements", lines.len());
    Ok(lines)
}

#[derive(Debug, Default)]
struct RawLine {
    tokens: Vec<Token>,
    keyword: Option<Keyword>,
    line: usize,
    indent: String,
    body: Option<usize>,
    tiers: Vec<usize>,
}

#[derive(Debug)]
struct OpenGroup {
    kind: GroupKind,
    close: char,
    tokens: Vec<Token>,
    line: usize,
}

enum Piece {
    Text(String),
    Splice(Vec<Token>),
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    lines: Vec<RawLine>,
    blocks: Vec<Vec<usize>>,
    indents: HashMap<String, usize>,
    indent: String,
    block: usize,
    /// Statement whose body has been opened by a trailing `:`.
    opener: Option<usize>,
    /// Still on the physical line of `opener`; statements land in its body.
    inline: bool,
    inline_filled: bool,
    groups: Vec<OpenGroup>,
    statement: Vec<Token>,
    keyword: Option<Keyword>,
    statement_line: usize,
    member: bool,
}

impl Lexer {
    pub fn new(source: &str, first_line: usize) -> Self {
        let normalized = source.replace("\r\n", "\n");
        let mut indents = HashMap::new();
        indents.insert(String::new(), 0);
        Self {
            chars: normalized.chars().collect(),
            pos: 0,
            line: first_line,
            lines: Vec::new(),
            blocks: vec![Vec::new()],
            indents,
            indent: String::new(),
            block: 0,
            opener: None,
            inline: false,
            inline_filled: false,
            groups: Vec::new(),
            statement: Vec::new(),
            keyword: None,
            statement_line: first_line,
            member: false,
        }
    }

    pub fn run(mut self) -> LexResult<Vec<Line>> {
        self.read_indent()?;
        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    self.advance();
                    if self.groups.is_empty() {
                        self.end_physical_line()?;
                        self.read_indent()?;
                    }
                }
                ' ' | '\t' | '\r' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 1;
                    self.advance();
                }
                ';' if self.groups.is_empty() => {
                    self.pos += 1;
                    self.end_statement()?;
                }
                ',' => {
                    self.pos += 1;
                    let line = self.line;
                    match self.current_tokens().last_mut() {
                        Some(token) => token.ends_comma = true,
                        None => {
                            return Err(LexError::UnexpectedCharacter {
                                character: ',',
                                line,
                            });
                        }
                    }
                }
                '.' => {
                    self.pos += 1;
                    if self.member || self.current_tokens().is_empty() {
                        return Err(LexError::UnexpectedCharacter {
                            character: '.',
                            line: self.line,
                        });
                    }
                    self.member = true;
                }
                '(' => self.open_group(GroupKind::Paren, ')'),
                '[' => self.open_group(GroupKind::Bracket, ']'),
                '{' => self.open_group(GroupKind::Brace, '}'),
                ')' | ']' | '}' => self.close_group(c)?,
                ':' if self.groups.is_empty() => {
                    self.pos += 1;
                    self.open_block()?;
                }
                '"' | '\'' => self.read_string(false, false)?,
                c if c.is_ascii_digit() => self.read_number()?,
                c if c.is_alphabetic() || c == '_' => self.read_word()?,
                _ => self.read_operator()?,
            }
        }

        if let Some(group) = self.groups.last() {
            return Err(LexError::UnclosedDelimiter {
                open: opening_char(group.close),
                line: group.line,
            });
        }
        self.end_physical_line()?;
        if let Some(opener) = self.opener {
            return Err(LexError::ExpectedIndent {
                line: self.lines[opener].line,
            });
        }
        Ok(self.assemble(0))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn current_tokens(&mut self) -> &mut Vec<Token> {
        match self.groups.last_mut() {
            Some(group) => &mut group.tokens,
            None => &mut self.statement,
        }
    }

    fn push(&mut self, kind: TokenKind) {
        let kind = match kind {
            TokenKind::Identifier(name) if self.member => TokenKind::Member(name),
            other => other,
        };
        self.member = false;
        if self.groups.is_empty() && self.statement.is_empty() && self.keyword.is_none() {
            self.statement_line = self.line;
        }
        let token = Token::new(kind, self.line);
        self.current_tokens().push(token);
    }

    fn push_op(&mut self, operator: Operator) {
        self.push(TokenKind::Operator(operator));
    }

    fn last_op_kind(&mut self) -> Option<OpKind> {
        self.current_tokens()
            .last()
            .and_then(Token::operator)
            .filter(|op| !op.augmented)
            .map(|op| op.kind.clone())
    }

    fn replace_last_op(&mut self, kind: OpKind) {
        if let Some(token) = self.current_tokens().last_mut() {
            token.kind = TokenKind::Operator(Operator::new(kind));
        }
    }

    fn open_group(&mut self, kind: GroupKind, close: char) {
        self.pos += 1;
        if self.member {
            self.member = false;
        }
        if self.groups.is_empty() && self.statement.is_empty() && self.keyword.is_none() {
            self.statement_line = self.line;
        }
        self.groups.push(OpenGroup {
            kind,
            close,
            tokens: Vec::new(),
            line: self.line,
        });
    }

    fn close_group(&mut self, c: char) -> LexResult<()> {
        self.pos += 1;
        let line = self.line;
        let group = match self.groups.pop() {
            Some(group) if group.close == c => group,
            _ => {
                return Err(LexError::UnmatchedDelimiter { character: c, line });
            }
        };
        let token = Token::new(TokenKind::Group(group.kind, group.tokens), group.line);
        self.current_tokens().push(token);
        Ok(())
    }

    fn new_block(&mut self) -> usize {
        self.blocks.push(Vec::new());
        self.blocks.len() - 1
    }

    fn take_statement(&mut self, body: Option<usize>) -> Option<usize> {
        let tokens = mem::take(&mut self.statement);
        let keyword = self.keyword.take();
        self.member = false;
        if tokens.is_empty() && keyword.is_none() {
            return None;
        }
        self.lines.push(RawLine {
            tokens,
            keyword,
            line: self.statement_line,
            indent: self.indent.clone(),
            body,
            tiers: Vec::new(),
        });
        Some(self.lines.len() - 1)
    }

    fn place(&mut self, id: usize) {
        if self.inline
            && let Some(opener) = self.opener
            && let Some(body) = self.lines[opener].body
        {
            self.blocks[body].push(id);
            self.inline_filled = true;
            return;
        }
        self.blocks[self.block].push(id);
    }

    fn end_statement(&mut self) -> LexResult<()> {
        if let Some(id) = self.take_statement(None) {
            self.place(id);
        }
        Ok(())
    }

    fn end_physical_line(&mut self) -> LexResult<()> {
        self.end_statement()?;
        if self.inline_filled {
            self.opener = None;
            self.inline_filled = false;
        }
        self.inline = false;
        Ok(())
    }

    /// A `:` at the top nesting level ends the statement and opens its body.
    fn open_block(&mut self) -> LexResult<()> {
        let body = self.new_block();
        let line = self.statement_line;
        let Some(id) = self.take_statement(Some(body)) else {
            return Err(LexError::UnexpectedCharacter {
                character: ':',
                line: self.line,
            });
        };
        match self.lines[id].keyword {
            Some(keyword @ (Keyword::Else | Keyword::Elif)) => {
                let head = self.blocks[self.block].last().copied().filter(|&head| {
                    self.lines[head].keyword == Some(Keyword::If)
                        && self.lines[head]
                            .tiers
                            .last()
                            .is_none_or(|&tier| self.lines[tier].keyword == Some(Keyword::Elif))
                });
                let Some(head) = head else {
                    return Err(LexError::DanglingTier {
                        keyword: keyword.to_string(),
                        line,
                    });
                };
                self.lines[head].tiers.push(id);
            }
            _ => self.place(id),
        }
        self.opener = Some(id);
        self.inline = true;
        self.inline_filled = false;
        Ok(())
    }

    /// Consumes leading whitespace of the next non-blank line and selects
    /// the block it belongs to.
    fn read_indent(&mut self) -> LexResult<()> {
        loop {
            let start = self.pos;
            while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
                self.pos += 1;
            }
            match self.peek() {
                None => return Ok(()),
                Some('\n') => {
                    self.advance();
                }
                Some('#') => self.skip_comment(),
                Some(_) => {
                    let indent: String = self.chars[start..self.pos]
                        .iter()
                        .filter(|c| **c != '\r')
                        .collect();
                    return self.enter_indent(indent);
                }
            }
        }
    }

    fn enter_indent(&mut self, indent: String) -> LexResult<()> {
        let line = self.line;
        if let Some(opener) = self.opener.take() {
            let outer = &self.lines[opener].indent;
            if indent.len() <= outer.len() || !indent.starts_with(outer.as_str()) {
                return Err(LexError::ExpectedIndent {
                    line: self.lines[opener].line,
                });
            }
            let Some(body) = self.lines[opener].body else {
                return Err(LexError::ExpectedIndent { line });
            };
            self.indents.retain(|known, _| known.len() < indent.len());
            self.indents.insert(indent.clone(), body);
        } else {
            self.indents.retain(|known, _| known.len() <= indent.len());
        }
        self.block = match self.indents.get(&indent) {
            Some(&block) => block,
            None if indent.len() > self.indent.len() => {
                return Err(LexError::UnexpectedIndent { line });
            }
            None => return Err(LexError::InvalidDedent { line }),
        };
        self.indent = indent;
        Ok(())
    }

    fn read_number(&mut self) -> LexResult<()> {
        let start = self.pos;
        let mut float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.pos += 1;
            } else if c == '.' && !float && self.peek_at(1).is_none_or(|n| !n.is_alphabetic()) {
                float = true;
                self.pos += 1;
            } else if matches!(c, 'e' | 'E')
                && self
                    .peek_at(1)
                    .is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+')
            {
                float = true;
                self.pos += 2;
            } else {
                break;
            }
        }
        let literal: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let valid = if float {
            literal.parse::<f64>().is_ok()
        } else {
            literal.parse::<i64>().is_ok()
        };
        if !valid || self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(LexError::InvalidNumber {
                literal,
                line: self.line,
            });
        }
        self.push(TokenKind::Number(literal));
        Ok(())
    }

    fn read_word(&mut self) -> LexResult<()> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        if self.member {
            self.push(TokenKind::Identifier(word));
            return Ok(());
        }

        if matches!(self.peek(), Some('"' | '\'')) {
            match word.as_str() {
                "f" | "F" => return self.read_string(true, false),
                "r" | "R" => return self.read_string(false, true),
                "rf" | "fr" | "Rf" | "fR" | "RF" | "FR" | "rF" | "Fr" => {
                    return self.read_string(true, true);
                }
                _ => {}
            }
        }

        match word.as_str() {
            "and" => self.push_op(Operator::new(OpKind::And)),
            "or" => self.push_op(Operator::new(OpKind::Or)),
            "is" => self.push_op(Operator::new(OpKind::Is)),
            "as" => self.push_op(Operator::new(OpKind::As)),
            "not" => {
                if self.last_op_kind() == Some(OpKind::Is) {
                    self.replace_last_op(OpKind::IsNot);
                } else {
                    self.push_op(Operator::new(OpKind::Not));
                }
            }
            "in" => {
                if self.last_op_kind() == Some(OpKind::Not) {
                    self.replace_last_op(OpKind::NotIn);
                } else {
                    self.push_op(Operator::new(OpKind::In));
                }
            }
            "lambda" => self.read_lambda()?,
            _ => match Keyword::from_word(&word) {
                Some(keyword)
                    if self.groups.is_empty()
                        && self.statement.is_empty()
                        && self.keyword.is_none() =>
                {
                    self.statement_line = self.line;
                    self.keyword = Some(keyword);
                }
                Some(keyword) => match keyword.inline_operator() {
                    Some(kind) => self.push_op(Operator::new(kind)),
                    None => {
                        return Err(LexError::UnexpectedKeyword {
                            keyword: word,
                            line: self.line,
                        });
                    }
                },
                None => self.push(TokenKind::Identifier(word)),
            },
        }
        Ok(())
    }

    /// `lambda a, b:` captures its parameter names up to the colon.
    fn read_lambda(&mut self) -> LexResult<()> {
        let line = self.line;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ':' || c == '\n' {
                break;
            }
            self.pos += 1;
        }
        if self.peek() != Some(':') {
            return Err(LexError::UnexpectedKeyword {
                keyword: "lambda".into(),
                line,
            });
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        self.pos += 1;
        let mut params = Vec::new();
        for name in raw.split(',').map(str::trim) {
            if name.is_empty() && params.is_empty() && raw.trim().is_empty() {
                break;
            }
            let valid = name
                .chars()
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_alphanumeric() || c == '_');
            if !valid {
                return Err(LexError::InvalidLambdaParameter {
                    name: name.to_string(),
                    line,
                });
            }
            params.push(name.to_string());
        }
        self.push_op(Operator::new(OpKind::Lambda(params)));
        Ok(())
    }

    fn read_string(&mut self, format: bool, raw: bool) -> LexResult<()> {
        let line = self.line;
        let Some(quote) = self.advance() else {
            return Err(LexError::UnterminatedString { line });
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }
        let unterminated = || {
            if triple {
                LexError::UnterminatedDocString { line }
            } else {
                LexError::UnterminatedString { line }
            }
        };

        let mut pieces = Vec::new();
        let mut text = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(unterminated());
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
                text.push(c);
                self.pos += 1;
                continue;
            }
            match c {
                '\n' if !triple => return Err(LexError::UnterminatedString { line }),
                '\\' if !raw => {
                    self.pos += 1;
                    let Some(escaped) = self.advance() else {
                        return Err(unterminated());
                    };
                    match escaped {
                        'n' => text.push('\n'),
                        'r' => text.push('\r'),
                        't' => text.push('\t'),
                        '0' => text.push('\0'),
                        '\\' | '\'' | '"' => text.push(escaped),
                        '\n' => {}
                        other => {
                            text.push('\\');
                            text.push(other);
                        }
                    }
                }
                '{' if format => {
                    if self.peek_at(1) == Some('{') {
                        text.push('{');
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        let tokens = self.read_interpolation(quote)?;
                        pieces.push(Piece::Text(mem::take(&mut text)));
                        pieces.push(Piece::Splice(tokens));
                    }
                }
                '}' if format && self.peek_at(1) == Some('}') => {
                    text.push('}');
                    self.pos += 2;
                }
                _ => {
                    text.push(c);
                    self.advance();
                }
            }
        }

        if pieces.is_empty() {
            self.push(TokenKind::Str(text));
            return Ok(());
        }
        pieces.push(Piece::Text(text));

        let mut chain = Vec::new();
        for (index, piece) in pieces.into_iter().enumerate() {
            if index > 0 {
                chain.push(Token::new(
                    TokenKind::Operator(Operator::new(OpKind::Add)),
                    line,
                ));
            }
            let kind = match piece {
                Piece::Text(text) => TokenKind::Str(text),
                Piece::Splice(tokens) => TokenKind::Group(GroupKind::Format, tokens),
            };
            chain.push(Token::new(kind, line));
        }
        self.push(TokenKind::Group(GroupKind::Paren, chain));
        Ok(())
    }

    /// Reads an f-string `{...}` body and tokenizes it on its own.
    fn read_interpolation(&mut self, quote: char) -> LexResult<Vec<Token>> {
        let line = self.line;
        let mut depth = 0usize;
        let mut inner_quote: Option<char> = None;
        let mut source = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(LexError::UnterminatedString { line });
            };
            if c == '\n' {
                return Err(LexError::UnterminatedString { line });
            }
            match inner_quote {
                Some(q) if c == q => inner_quote = None,
                Some(_) => {}
                None => match c {
                    '}' if depth == 0 => {
                        self.pos += 1;
                        break;
                    }
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' | '}' => depth = depth.saturating_sub(1),
                    '"' | '\'' if c == quote => {
                        return Err(LexError::InvalidInterpolation {
                            message: "nested quotes must differ from the enclosing quote".into(),
                            line,
                        });
                    }
                    '"' | '\'' => inner_quote = Some(c),
                    ':' | '!' if depth == 0 && self.peek_at(1) != Some('=') => {
                        return Err(LexError::InvalidInterpolation {
                            message: "format specifiers are not supported".into(),
                            line,
                        });
                    }
                    _ => {}
                },
            }
            source.push(c);
            self.pos += 1;
        }

        let mut lines = Lexer::new(source.trim(), line).run()?;
        match (lines.pop(), lines.is_empty()) {
            (Some(fragment), true) if fragment.keyword.is_none() && fragment.body.is_none() => {
                Ok(fragment.tokens)
            }
            _ => Err(LexError::InvalidInterpolation {
                message: format!("'{source}' is not an expression"),
                line,
            }),
        }
    }

    fn read_operator(&mut self) -> LexResult<()> {
        let line = self.line;
        let Some(c) = self.peek() else {
            return Ok(());
        };
        let next = self.peek_at(1);
        let after = self.peek_at(2);

        let (width, operator) = match (c, next, after) {
            ('+', Some('='), _) => (2, Operator::augmented(OpKind::Add)),
            ('+', _, _) => (1, Operator::new(OpKind::Add)),
            ('-', Some('>'), _) => (2, Operator::new(OpKind::Arrow)),
            ('-', Some('='), _) => (2, Operator::augmented(OpKind::Sub)),
            ('-', _, _) => (1, Operator::new(OpKind::Sub)),
            ('*', Some('*'), Some('=')) => (3, Operator::augmented(OpKind::Pow)),
            ('*', Some('*'), _) => (2, Operator::new(OpKind::Pow)),
            ('*', Some('='), _) => (2, Operator::augmented(OpKind::Mul)),
            ('*', _, _) => (1, Operator::new(OpKind::Mul)),
            ('/', Some('/'), Some('=')) => (3, Operator::augmented(OpKind::FloorDiv)),
            ('/', Some('/'), _) => (2, Operator::new(OpKind::FloorDiv)),
            ('/', Some('='), _) => (2, Operator::augmented(OpKind::Div)),
            ('/', _, _) => (1, Operator::new(OpKind::Div)),
            ('%', Some('='), _) => (2, Operator::augmented(OpKind::Mod)),
            ('%', _, _) => (1, Operator::new(OpKind::Mod)),
            ('<', Some('<'), Some('=')) => (3, Operator::augmented(OpKind::LShift)),
            ('<', Some('<'), _) => (2, Operator::new(OpKind::LShift)),
            ('<', Some('='), _) => (2, Operator::new(OpKind::Le)),
            ('<', _, _) => (1, Operator::new(OpKind::Lt)),
            ('>', Some('>'), Some('=')) => (3, Operator::augmented(OpKind::RShift)),
            ('>', Some('>'), _) => (2, Operator::new(OpKind::RShift)),
            ('>', Some('='), _) => (2, Operator::new(OpKind::Ge)),
            ('>', _, _) => (1, Operator::new(OpKind::Gt)),
            ('=', Some('='), _) => (2, Operator::new(OpKind::Eq)),
            ('=', _, _) => (1, Operator::new(OpKind::Assign)),
            ('!', Some('='), _) => (2, Operator::new(OpKind::Ne)),
            ('&', Some('='), _) => (2, Operator::augmented(OpKind::BitAnd)),
            ('&', _, _) => (1, Operator::new(OpKind::BitAnd)),
            ('^', Some('='), _) => (2, Operator::augmented(OpKind::BitXor)),
            ('^', _, _) => (1, Operator::new(OpKind::BitXor)),
            ('|', Some('='), _) => (2, Operator::augmented(OpKind::BitOr)),
            ('|', _, _) => (1, Operator::new(OpKind::BitOr)),
            ('~', _, _) => (1, Operator::new(OpKind::Invert)),
            ('@', _, _) => (1, Operator::new(OpKind::At)),
            (':', _, _) => (1, Operator::new(OpKind::Colon)),
            (character, _, _) => {
                return Err(LexError::UnexpectedCharacter { character, line });
            }
        };
        self.pos += width;
        self.push_op(operator);
        Ok(())
    }

    fn assemble(&mut self, block: usize) -> Vec<Line> {
        let ids = mem::take(&mut self.blocks[block]);
        ids.into_iter().map(|id| self.assemble_line(id)).collect()
    }

    fn assemble_line(&mut self, id: usize) -> Line {
        let raw = mem::take(&mut self.lines[id]);
        Line {
            tokens: raw.tokens,
            keyword: raw.keyword,
            line: raw.line,
            body: raw.body.map(|body| self.assemble(body)),
            tiers: raw
                .tiers
                .into_iter()
                .map(|tier| self.assemble_line(tier))
                .collect(),
        }
    }
}

fn opening_char(close: char) -> char {
    match close {
        ')' => '(',
        ']' => '[',
        _ => '{',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|token| token.kind.clone()).collect()
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Identifier(name.to_string())
    }

    fn num(text: &str) -> TokenKind {
        TokenKind::Number(text.to_string())
    }

    fn op(kind: OpKind) -> TokenKind {
        TokenKind::Operator(Operator::new(kind))
    }

    #[test]
    fn splits_statements_and_nests_blocks() {
        let source = indoc! {"
            def add(a, b):
                total = a + b
                return total
            print(add(1, 2))
        "};
        let lines = tokenize(source).expect("tokenize should succeed");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].keyword, Some(Keyword::Def));
        let body = lines[0].body.as_ref().expect("def has a body");
        assert_eq!(body.len(), 2);
        assert_eq!(
            kinds(&body[0].tokens),
            vec![ident("total"), op(OpKind::Assign), ident("a"), op(OpKind::Add), ident("b")]
        );
        assert_eq!(body[1].keyword, Some(Keyword::Return));
        assert_eq!(lines[1].line, 4);
    }

    #[test]
    fn attaches_elif_and_else_as_tiers() {
        let source = indoc! {"
            if a:
                x = 1
            elif b:
                x = 2
            else:
                x = 3
            y = x
        "};
        let lines = tokenize(source).expect("tokenize should succeed");
        assert_eq!(lines.len(), 2);
        let tiers: Vec<_> = lines[0].tiers.iter().map(|tier| tier.keyword).collect();
        assert_eq!(tiers, vec![Some(Keyword::Elif), Some(Keyword::Else)]);
        assert_eq!(lines[0].tiers[1].body.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn inline_bodies_and_semicolons() {
        let lines = tokenize("if a: b = 1; c = 2\nd = 3\n").expect("tokenize should succeed");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].body.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn multi_character_operators_and_augmented_assignment() {
        let lines = tokenize("a **= b // c <= d << 1\n").expect("tokenize should succeed");
        let tokens = &lines[0].tokens;
        assert_eq!(
            tokens[1].kind,
            TokenKind::Operator(Operator::augmented(OpKind::Pow))
        );
        assert_eq!(tokens[3].kind, op(OpKind::FloorDiv));
        assert_eq!(tokens[5].kind, op(OpKind::Le));
        assert_eq!(tokens[7].kind, op(OpKind::LShift));
    }

    #[test]
    fn contextual_keyword_fixups() {
        let lines = tokenize("a is not b and c not in d\n").expect("tokenize should succeed");
        assert_eq!(
            kinds(&lines[0].tokens),
            vec![
                ident("a"),
                op(OpKind::IsNot),
                ident("b"),
                op(OpKind::And),
                ident("c"),
                op(OpKind::NotIn),
                ident("d"),
            ]
        );
    }

    #[test]
    fn numbers_distinguish_int_and_float() {
        let lines = tokenize("x = 12 + 3.5 + 1e3\n").expect("tokenize should succeed");
        let tokens = kinds(&lines[0].tokens);
        assert_eq!(tokens[2], num("12"));
        assert_eq!(tokens[4], num("3.5"));
        assert_eq!(tokens[6], num("1e3"));
    }

    #[test]
    fn groups_nest_and_mark_commas() {
        let lines = tokenize("f(a, [b, c])\n").expect("tokenize should succeed");
        let TokenKind::Group(GroupKind::Paren, args) = &lines[0].tokens[1].kind else {
            panic!("expected call group");
        };
        assert!(args[0].ends_comma);
        let TokenKind::Group(GroupKind::Bracket, items) = &args[1].kind else {
            panic!("expected list group");
        };
        assert_eq!(items.len(), 2);
        assert!(items[0].ends_comma && !items[1].ends_comma);
    }

    #[test]
    fn member_access_marks_following_identifier() {
        let lines = tokenize("a.b.c()\n").expect("tokenize should succeed");
        assert_eq!(
            kinds(&lines[0].tokens)[..3],
            [
                ident("a"),
                TokenKind::Member("b".into()),
                TokenKind::Member("c".into())
            ]
        );
    }

    #[test]
    fn f_strings_splice_a_concatenation_chain() {
        let lines = tokenize("s = f\"a{x}b\"\n").expect("tokenize should succeed");
        let TokenKind::Group(GroupKind::Paren, chain) = &lines[0].tokens[2].kind else {
            panic!("expected spliced chain");
        };
        assert_eq!(
            kinds(chain),
            vec![
                TokenKind::Str("a".into()),
                op(OpKind::Add),
                TokenKind::Group(GroupKind::Format, vec![Token::new(ident("x"), 1)]),
                op(OpKind::Add),
                TokenKind::Str("b".into()),
            ]
        );
    }

    #[test]
    fn escapes_and_doc_strings() {
        let source = "s = 'a\\nb\\\\'\nd = \"\"\"line one\nline two\"\"\"\n";
        let lines = tokenize(source).expect("tokenize should succeed");
        assert_eq!(lines[0].tokens[2].kind, TokenKind::Str("a\nb\\".into()));
        assert_eq!(
            lines[1].tokens[2].kind,
            TokenKind::Str("line one\nline two".into())
        );
        assert_eq!(lines[1].line, 2);
    }

    #[test]
    fn newline_inside_string_is_fatal() {
        let error = tokenize("s = 'abc\nd'\n").expect_err("string is unterminated");
        assert_eq!(error, LexError::UnterminatedString { line: 1 });
        assert!(error.to_string().contains("EOL while scanning string literal"));
    }

    #[test]
    fn lambda_captures_parameters() {
        let lines = tokenize("f = lambda a, b: a + b\n").expect("tokenize should succeed");
        assert_eq!(
            lines[0].tokens[2].kind,
            op(OpKind::Lambda(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn comments_and_blank_lines_do_not_disturb_blocks() {
        let source = indoc! {"
            def f():
            # leading comment at column zero

                return 1
            x = f()
        "};
        let lines = tokenize(source).expect("tokenize should succeed");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].body.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn indentation_errors() {
        assert_eq!(
            tokenize("if a:\nb\n").expect_err("missing body"),
            LexError::ExpectedIndent { line: 1 }
        );
        assert_eq!(
            tokenize("a = 1\n    b = 2\n").expect_err("stray indent"),
            LexError::UnexpectedIndent { line: 2 }
        );
        assert_eq!(
            tokenize("if a:\n        b\n    c\n").expect_err("bad dedent"),
            LexError::InvalidDedent { line: 3 }
        );
        assert!(matches!(
            tokenize("else:\n    a\n").expect_err("dangling else"),
            LexError::DanglingTier { .. }
        ));
        assert!(matches!(
            tokenize("f(a\n").expect_err("unclosed"),
            LexError::UnclosedDelimiter { open: '(', .. }
        ));
    }
}
