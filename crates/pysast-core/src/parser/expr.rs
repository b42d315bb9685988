//! Pratt expression parsing.

use super::{PResult, ParseError, Parser};
use crate::ast::{
    Argument, ArgumentKind, BinaryOp, Call, Comprehension, DictEntry, Expr, ExprKind, FStringPart,
    Span, UnaryOp,
};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use std::sync::Arc;

/// Binding power, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Precedence {
    Lowest,
    Conditional,
    Or,
    And,
    Equality,
    Relational,
    Bitwise,
    Additive,
    Multiplicative,
    Prefix,
    Power,
    Postfix,
}

const WALRUS_MESSAGE: &str = "assignment expressions (`:=`) are not supported";

fn can_start_expression(token: &Token) -> bool {
    match token.kind {
        TokenKind::Identifier
        | TokenKind::Integer
        | TokenKind::Float
        | TokenKind::String
        | TokenKind::FString
        | TokenKind::Boolean
        | TokenKind::None => true,
        TokenKind::Delimiter => matches!(token.literal.as_str(), "(" | "[" | "{"),
        TokenKind::Operator => matches!(token.literal.as_str(), "-" | "+" | "~" | "!" | "*" | "..."),
        TokenKind::Keyword => matches!(token.literal.as_str(), "not" | "lambda" | "await" | "yield"),
        _ => false,
    }
}

fn parse_int(literal: &str) -> Option<i64> {
    let (digits, radix) = match literal.get(..2) {
        Some("0x") => (&literal[2..], 16),
        Some("0o") => (&literal[2..], 8),
        Some("0b") => (&literal[2..], 2),
        _ => (literal, 10),
    };
    i64::from_str_radix(digits, radix).ok()
}

impl<I: Iterator<Item = Token>> Parser<I> {
    /// Parses an expression whose operators bind tighter than `precedence`.
    pub(super) fn parse_expression(&mut self, precedence: Precedence) -> PResult<Expr> {
        self.nested(|parser| parser.parse_operators(precedence))
    }

    fn parse_operators(&mut self, precedence: Precedence) -> PResult<Expr> {
        let mut left = self.parse_prefix()?;
        while let Some(next) = self.infix_precedence() {
            if next <= precedence {
                break;
            }
            left = self.parse_infix(left, next)?;
        }
        if self.check_op(":=") {
            return Err(self.error_here(WALRUS_MESSAGE));
        }
        Ok(left)
    }

    /// Comma separated expressions; more than one yields a tuple.
    pub(super) fn parse_expression_list(&mut self) -> PResult<Expr> {
        let first = self.parse_expression(Precedence::Lowest)?;
        if !self.check_delim(",") {
            return Ok(first);
        }
        let span = first.span.clone();
        let mut items = vec![first];
        while self.eat_delim(",") {
            if !can_start_expression(&self.current) {
                break;
            }
            items.push(self.parse_expression(Precedence::Lowest)?);
        }
        Ok(Expr::new(span, ExprKind::Tuple(items)))
    }

    /// Loop targets: stops before `in`.
    pub(super) fn parse_target_list(&mut self) -> PResult<Expr> {
        let first = self.parse_expression(Precedence::Relational)?;
        if !self.check_delim(",") {
            return Ok(first);
        }
        let span = first.span.clone();
        let mut items = vec![first];
        while self.eat_delim(",") {
            if self.check_keyword("in") {
                break;
            }
            items.push(self.parse_expression(Precedence::Relational)?);
        }
        Ok(Expr::new(span, ExprKind::Tuple(items)))
    }

    fn infix_precedence(&self) -> Option<Precedence> {
        let literal = self.current.literal.as_str();
        match self.current.kind {
            TokenKind::Keyword => match literal {
                "or" => Some(Precedence::Or),
                "and" => Some(Precedence::And),
                "is" | "in" => Some(Precedence::Relational),
                "not" if self.peek.is_keyword("in") => Some(Precedence::Relational),
                "if" => Some(Precedence::Conditional),
                _ => None,
            },
            TokenKind::Operator => match literal {
                "==" | "!=" => Some(Precedence::Equality),
                "<" | ">" | "<=" | ">=" => Some(Precedence::Relational),
                "|" | "^" | "&" | "<<" | ">>" => Some(Precedence::Bitwise),
                "+" | "-" => Some(Precedence::Additive),
                "*" | "/" | "//" | "%" | "@" => Some(Precedence::Multiplicative),
                "**" => Some(Precedence::Power),
                "." => Some(Precedence::Postfix),
                _ => None,
            },
            TokenKind::Delimiter => match literal {
                "(" | "[" => Some(Precedence::Postfix),
                _ => None,
            },
            _ => None,
        }
    }

    fn parse_prefix(&mut self) -> PResult<Expr> {
        let span = self.span();
        let literal = self.current.literal.clone();
        let kind = match self.current.kind {
            TokenKind::Identifier => {
                self.advance();
                ExprKind::Identifier(literal)
            }
            TokenKind::Integer => {
                let value = parse_int(&literal).ok_or_else(|| {
                    self.error_here(format!("integer literal `{literal}` is out of range"))
                })?;
                self.advance();
                ExprKind::Int(value)
            }
            TokenKind::Float => {
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| self.error_here(format!("invalid float literal `{literal}`")))?;
                self.advance();
                ExprKind::Float(value)
            }
            TokenKind::String | TokenKind::FString => return self.parse_strings(),
            TokenKind::Boolean => {
                self.advance();
                ExprKind::Bool(literal == "True")
            }
            TokenKind::None => {
                self.advance();
                ExprKind::None
            }
            TokenKind::Delimiter => match literal.as_str() {
                "(" => return self.parse_parenthesized(),
                "[" => return self.parse_list_display(),
                "{" => return self.parse_brace_display(),
                _ => return Err(self.unexpected("expression")),
            },
            TokenKind::Operator => match literal.as_str() {
                "-" | "+" | "~" | "!" => {
                    self.advance();
                    let op = match literal.as_str() {
                        "-" => UnaryOp::Neg,
                        "+" => UnaryOp::Pos,
                        "~" => UnaryOp::Invert,
                        _ => UnaryOp::Not,
                    };
                    let operand = self.parse_expression(Precedence::Prefix)?;
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    }
                }
                "*" => {
                    self.advance();
                    ExprKind::Starred(Box::new(self.parse_expression(Precedence::Bitwise)?))
                }
                "..." => {
                    self.advance();
                    ExprKind::Identifier("Ellipsis".to_string())
                }
                _ => return Err(self.unexpected("expression")),
            },
            TokenKind::Keyword => match literal.as_str() {
                "not" => {
                    self.advance();
                    let operand = self.parse_expression(Precedence::Prefix)?;
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    }
                }
                "lambda" => {
                    self.advance();
                    let params = self.parse_params(":", false)?;
                    self.expect_delim(":")?;
                    let body = self.parse_expression(Precedence::Lowest)?;
                    ExprKind::Lambda {
                        params,
                        body: Box::new(body),
                    }
                }
                "await" => {
                    self.advance();
                    ExprKind::Await(Box::new(self.parse_expression(Precedence::Prefix)?))
                }
                "yield" => return self.parse_yield(),
                _ => return Err(self.unexpected("expression")),
            },
            _ => return Err(self.unexpected("expression")),
        };
        Ok(Expr::new(span, kind))
    }

    fn parse_infix(&mut self, left: Expr, precedence: Precedence) -> PResult<Expr> {
        let span = left.span.clone();
        if self.current.kind == TokenKind::Delimiter {
            return if self.eat_delim("(") {
                let args = self.parse_call_args()?;
                Ok(Expr::new(
                    span,
                    ExprKind::Call(Call {
                        func: Box::new(left),
                        args,
                    }),
                ))
            } else {
                self.expect_delim("[")?;
                let index = self.parse_subscript()?;
                self.expect_delim("]")?;
                Ok(Expr::new(
                    span,
                    ExprKind::Subscript {
                        value: Box::new(left),
                        index: Box::new(index),
                    },
                ))
            };
        }

        if self.eat_op(".") {
            let attr = self.expect_identifier("an attribute name")?;
            return Ok(Expr::new(
                span,
                ExprKind::Attribute {
                    value: Box::new(left),
                    attr,
                },
            ));
        }

        if self.eat_keyword("if") {
            let test = self.parse_expression(Precedence::Conditional)?;
            self.expect_keyword("else")?;
            let orelse = self.parse_expression(Precedence::Lowest)?;
            return Ok(Expr::new(
                span,
                ExprKind::Conditional {
                    test: Box::new(test),
                    body: Box::new(left),
                    orelse: Box::new(orelse),
                },
            ));
        }

        let token = self.advance();
        let op = match token.literal.as_str() {
            "not" => {
                self.expect_keyword("in")?;
                BinaryOp::NotIn
            }
            "is" if self.eat_keyword("not") => BinaryOp::IsNot,
            symbol => BinaryOp::from_symbol(symbol)
                .ok_or_else(|| self.error_at(&token, format!("unexpected {token}")))?,
        };
        let right_precedence = if op == BinaryOp::Pow {
            Precedence::Prefix
        } else {
            precedence
        };
        let right = self.parse_expression(right_precedence)?;
        Ok(Expr::new(
            span,
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        ))
    }

    /// Arguments after `(`, consuming the closing `)`.
    pub(super) fn parse_call_args(&mut self) -> PResult<Vec<Argument>> {
        let mut args = Vec::new();
        while !self.check_delim(")") {
            let argument = if self.eat_op("*") {
                Argument {
                    kind: ArgumentKind::Star,
                    value: self.parse_expression(Precedence::Lowest)?,
                }
            } else if self.eat_op("**") {
                Argument {
                    kind: ArgumentKind::DoubleStar,
                    value: self.parse_expression(Precedence::Lowest)?,
                }
            } else if self.current.kind == TokenKind::Identifier && self.peek.is_operator("=") {
                let name = self.advance().literal;
                self.advance();
                Argument {
                    kind: ArgumentKind::Keyword(name),
                    value: self.parse_expression(Precedence::Lowest)?,
                }
            } else {
                let value = self.parse_expression(Precedence::Lowest)?;
                let value = if self.check_keyword("for") || self.check_keyword("async") {
                    let span = value.span.clone();
                    let generators = self.parse_comprehension_clauses()?;
                    Expr::new(
                        span,
                        ExprKind::GeneratorExp {
                            element: Box::new(value),
                            generators,
                        },
                    )
                } else {
                    value
                };
                Argument {
                    kind: ArgumentKind::Positional,
                    value,
                }
            };
            args.push(argument);
            if !self.eat_delim(",") {
                break;
            }
        }
        self.expect_delim(")")?;
        Ok(args)
    }

    fn parse_subscript(&mut self) -> PResult<Expr> {
        let first = self.parse_slice_item()?;
        if !self.check_delim(",") {
            return Ok(first);
        }
        let span = first.span.clone();
        let mut items = vec![first];
        while self.eat_delim(",") {
            if self.check_delim("]") {
                break;
            }
            items.push(self.parse_slice_item()?);
        }
        Ok(Expr::new(span, ExprKind::Tuple(items)))
    }

    fn slice_bound(&mut self) -> PResult<Option<Box<Expr>>> {
        if self.check_delim(":") || self.check_delim("]") || self.check_delim(",") {
            Ok(None)
        } else {
            Ok(Some(Box::new(self.parse_expression(Precedence::Lowest)?)))
        }
    }

    fn parse_slice_item(&mut self) -> PResult<Expr> {
        let span = self.span();
        let lower = self.slice_bound()?;
        if !self.eat_delim(":") {
            return match lower {
                Some(index) => Ok(*index),
                None => Err(self.unexpected("subscript")),
            };
        }
        let upper = self.slice_bound()?;
        let step = if self.eat_delim(":") {
            self.slice_bound()?
        } else {
            None
        };
        Ok(Expr::new(span, ExprKind::Slice { lower, upper, step }))
    }

    fn parse_comprehension_clauses(&mut self) -> PResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        loop {
            let is_async = self.eat_keyword("async");
            if !self.check_keyword("for") {
                if is_async {
                    return Err(self.unexpected("`for`"));
                }
                break;
            }
            self.advance();
            let target = self.parse_target_list()?;
            self.expect_keyword("in")?;
            let iter = self.parse_expression(Precedence::Conditional)?;
            let mut conditions = Vec::new();
            while self.eat_keyword("if") {
                conditions.push(self.parse_expression(Precedence::Conditional)?);
            }
            generators.push(Comprehension {
                target,
                iter,
                conditions,
                is_async,
            });
        }
        Ok(generators)
    }

    fn at_comprehension(&self) -> bool {
        self.check_keyword("for") || self.check_keyword("async")
    }

    fn parse_parenthesized(&mut self) -> PResult<Expr> {
        let span = self.span();
        self.advance();
        if self.eat_delim(")") {
            return Ok(Expr::new(span, ExprKind::Tuple(Vec::new())));
        }
        if self.check_keyword("yield") {
            let value = self.parse_yield()?;
            self.expect_delim(")")?;
            return Ok(value);
        }

        let first = self.parse_expression(Precedence::Lowest)?;
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect_delim(")")?;
            return Ok(Expr::new(
                span,
                ExprKind::GeneratorExp {
                    element: Box::new(first),
                    generators,
                },
            ));
        }
        if !self.check_delim(",") {
            self.expect_delim(")")?;
            return Ok(first);
        }

        let mut items = vec![first];
        while self.eat_delim(",") {
            if self.check_delim(")") {
                break;
            }
            items.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect_delim(")")?;
        Ok(Expr::new(span, ExprKind::Tuple(items)))
    }

    fn parse_list_display(&mut self) -> PResult<Expr> {
        let span = self.span();
        self.advance();
        if self.eat_delim("]") {
            return Ok(Expr::new(span, ExprKind::List(Vec::new())));
        }
        let first = self.parse_expression(Precedence::Lowest)?;
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect_delim("]")?;
            return Ok(Expr::new(
                span,
                ExprKind::ListComp {
                    element: Box::new(first),
                    generators,
                },
            ));
        }
        let mut items = vec![first];
        while self.eat_delim(",") {
            if self.check_delim("]") {
                break;
            }
            items.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect_delim("]")?;
        Ok(Expr::new(span, ExprKind::List(items)))
    }

    fn parse_dict_entry(&mut self) -> PResult<DictEntry> {
        if self.eat_op("**") {
            return Ok(DictEntry {
                key: None,
                value: self.parse_expression(Precedence::Bitwise)?,
            });
        }
        let key = self.parse_expression(Precedence::Lowest)?;
        self.expect_delim(":")?;
        let value = self.parse_expression(Precedence::Lowest)?;
        Ok(DictEntry {
            key: Some(key),
            value,
        })
    }

    fn parse_brace_display(&mut self) -> PResult<Expr> {
        let span = self.span();
        self.advance();
        if self.eat_delim("}") {
            return Ok(Expr::new(span, ExprKind::Dict(Vec::new())));
        }

        if self.check_op("**") {
            return self.finish_dict(span, Vec::new());
        }

        let first = self.parse_expression(Precedence::Lowest)?;
        if self.eat_delim(":") {
            let value = self.parse_expression(Precedence::Lowest)?;
            if self.at_comprehension() {
                let generators = self.parse_comprehension_clauses()?;
                self.expect_delim("}")?;
                return Ok(Expr::new(
                    span,
                    ExprKind::DictComp {
                        key: Box::new(first),
                        value: Box::new(value),
                        generators,
                    },
                ));
            }
            let entries = vec![DictEntry {
                key: Some(first),
                value,
            }];
            if !self.eat_delim(",") {
                self.expect_delim("}")?;
                return Ok(Expr::new(span, ExprKind::Dict(entries)));
            }
            return self.finish_dict(span, entries);
        }

        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect_delim("}")?;
            return Ok(Expr::new(
                span,
                ExprKind::SetComp {
                    element: Box::new(first),
                    generators,
                },
            ));
        }
        let mut items = vec![first];
        while self.eat_delim(",") {
            if self.check_delim("}") {
                break;
            }
            items.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect_delim("}")?;
        Ok(Expr::new(span, ExprKind::Set(items)))
    }

    fn finish_dict(&mut self, span: Span, mut entries: Vec<DictEntry>) -> PResult<Expr> {
        while !self.check_delim("}") {
            entries.push(self.parse_dict_entry()?);
            if !self.eat_delim(",") {
                break;
            }
        }
        self.expect_delim("}")?;
        Ok(Expr::new(span, ExprKind::Dict(entries)))
    }

    fn parse_yield(&mut self) -> PResult<Expr> {
        let span = self.span();
        self.expect_keyword("yield")?;
        if self.eat_keyword("from") {
            let value = self.parse_expression(Precedence::Lowest)?;
            return Ok(Expr::new(
                span,
                ExprKind::Yield {
                    value: Some(Box::new(value)),
                    from: true,
                },
            ));
        }
        let value = if can_start_expression(&self.current) {
            Some(Box::new(self.parse_expression_list()?))
        } else {
            None
        };
        Ok(Expr::new(span, ExprKind::Yield { value, from: false }))
    }

    /// Adjacent string literals concatenate; any f-string makes the whole
    /// run a [`ExprKind::FormattedStr`].
    fn parse_strings(&mut self) -> PResult<Expr> {
        let span = self.span();
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut formatted = false;
        while matches!(self.current.kind, TokenKind::String | TokenKind::FString) {
            let token = self.advance();
            if token.kind == TokenKind::FString {
                formatted = true;
                for part in self.parse_fstring_body(&token)? {
                    push_part(&mut parts, part);
                }
            } else {
                push_part(&mut parts, FStringPart::Literal(token.literal));
            }
        }

        if formatted {
            return Ok(Expr::new(span, ExprKind::FormattedStr(parts)));
        }
        let text = parts
            .into_iter()
            .map(|part| match part {
                FStringPart::Literal(s) => s,
                FStringPart::Expr(_) => String::new(),
            })
            .collect();
        Ok(Expr::new(span, ExprKind::Str(text)))
    }

    fn parse_fstring_body(&self, token: &Token) -> PResult<Vec<FStringPart>> {
        let chars: Vec<char> = token.literal.chars().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut line = token.line;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '{' if chars.get(i + 1) == Some(&'{') => {
                    literal.push('{');
                    i += 2;
                }
                '{' => {
                    if !literal.is_empty() {
                        parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                    }
                    let (expr_end, close) = find_replacement_end(&chars, i + 1)
                        .ok_or_else(|| self.fstring_error(line, "unterminated `{` in f-string"))?;
                    let text: String = chars[i + 1..expr_end].iter().collect();
                    let text = strip_debug_marker(text.trim());
                    if text.is_empty() {
                        return Err(self.fstring_error(line, "empty expression in f-string"));
                    }
                    parts.push(FStringPart::Expr(self.parse_sub_expression(text, line)?));
                    line += chars[i..close].iter().filter(|&&ch| ch == '\n').count();
                    i = close + 1;
                }
                '}' if chars.get(i + 1) == Some(&'}') => {
                    literal.push('}');
                    i += 2;
                }
                '}' => return Err(self.fstring_error(line, "single `}` is not allowed in f-string")),
                _ => {
                    if c == '\n' {
                        line += 1;
                    }
                    literal.push(c);
                    i += 1;
                }
            }
        }
        if !literal.is_empty() {
            parts.push(FStringPart::Literal(literal));
        }
        Ok(parts)
    }

    fn parse_sub_expression(&self, text: &str, line: usize) -> PResult<Expr> {
        let lexer = Lexer::with_shared_path(text, Arc::clone(&self.file)).starting_at_line(line);
        let mut sub = Parser::new(lexer, Arc::clone(&self.file));
        sub.nesting = self.nesting;
        let expr = sub.parse_expression_list()?;
        if !matches!(sub.current.kind, TokenKind::Newline | TokenKind::Eof) {
            return Err(sub.unexpected("end of f-string expression"));
        }
        Ok(expr)
    }

    fn fstring_error(&self, line: usize, message: &str) -> ParseError {
        ParseError {
            file: self.file.to_path_buf(),
            line,
            message: message.to_string(),
        }
    }
}

fn push_part(parts: &mut Vec<FStringPart>, part: FStringPart) {
    if let (FStringPart::Literal(next), Some(FStringPart::Literal(prev))) = (&part, parts.last_mut()) {
        prev.push_str(next);
        return;
    }
    parts.push(part);
}

/// Finds the end of the expression inside a replacement field starting at
/// `start` and the index of its closing `}`.
fn find_replacement_end(chars: &[char], start: usize) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut expr_end = None;
    let mut j = start;
    while j < chars.len() {
        let ch = chars[j];
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            j += 1;
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '}' if depth > 0 => depth -= 1,
            '}' => return Some((expr_end.unwrap_or(j), j)),
            '!' if depth == 0 && chars.get(j + 1) != Some(&'=') && expr_end.is_none() => {
                expr_end = Some(j);
            }
            ':' if depth == 0 && expr_end.is_none() => expr_end = Some(j),
            _ => {}
        }
        j += 1;
    }
    None
}

fn strip_debug_marker(text: &str) -> &str {
    let is_comparison = ["==", "!=", "<=", ">="].iter().any(|op| text.ends_with(op));
    match text.strip_suffix('=') {
        Some(stripped) if !is_comparison => stripped.trim_end(),
        _ => text,
    }
}
