//! Recursive-descent parser with Pratt expression parsing.
//!
//! The parser never stops at the first error. A malformed statement is
//! recorded as a [`ParseError`], tokens are discarded up to the next statement
//! boundary and parsing resumes, so the caller always receives a best-effort
//! [`Program`] together with every diagnostic.

mod expr;
mod stmt;

use crate::ast::{Program, Span, Stmt};
use crate::lexer::{LexError, Lexer};
use crate::token::{Token, TokenKind};
use miette::Diagnostic;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// A recoverable syntax error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Diagnostic)]
#[error("{}:{}: {}", .file.display(), .line, .message)]
#[diagnostic(code(pysast::parse))]
pub struct ParseError {
    /// File containing the error.
    pub file: PathBuf,
    /// Line of the offending token.
    pub line: usize,
    /// Human-readable description.
    pub message: String,
}

pub(crate) type PResult<T> = Result<T, ParseError>;

/// Deepest expression or block nesting accepted before the construct is
/// reported as an error instead of being parsed.
pub const MAX_NESTING: usize = 64;

/// Lexes and parses `source` in one call.
///
/// Returns the (possibly partial) program and all parse errors, in source order.
pub fn lex_and_parse(source: &str, file: impl AsRef<Path>) -> (Program, Vec<ParseError>) {
    let lexer = Lexer::new(source, file);
    let path = Arc::clone(lexer.file());
    Parser::new(lexer, path).parse_program()
}

/// Builds a [`Program`] from a token stream.
pub struct Parser<I: Iterator<Item = Token>> {
    tokens: I,
    current: Token,
    peek: Token,
    file: Arc<Path>,
    errors: Vec<ParseError>,
    position: usize,
    nesting: usize,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    /// Creates a parser over `tokens` originating from `file`.
    pub fn new(mut tokens: I, file: Arc<Path>) -> Self {
        let eof = Token::new(TokenKind::Eof, "", 1, Arc::clone(&file));
        let current = tokens.next().unwrap_or_else(|| eof.clone());
        let peek = tokens.next().unwrap_or(eof);
        Self {
            tokens,
            current,
            peek,
            file,
            errors: Vec::new(),
            position: 0,
            nesting: 0,
        }
    }

    /// Parses the whole input.
    #[must_use]
    pub fn parse_program(mut self) -> (Program, Vec<ParseError>) {
        let mut statements = Vec::new();
        while self.current.kind != TokenKind::Eof {
            match self.current.kind {
                // Stray terminators left behind by recovery.
                TokenKind::Newline | TokenKind::Dedent => {
                    self.advance();
                }
                _ => self.parse_statement_recovering(&mut statements),
            }
        }
        debug!(
            file = %self.file.display(),
            statements = statements.len(),
            errors = self.errors.len(),
            "parsed program"
        );
        let program = Program {
            file: self.file,
            statements,
        };
        (program, self.errors)
    }

    /// Parses one statement; on failure records the error and resynchronises.
    fn parse_statement_recovering(&mut self, out: &mut Vec<Stmt>) {
        if self.current.kind == TokenKind::Indent {
            // Keep the over-indented lines as if they were not indented.
            let err = self.error_at(&self.current, "unexpected indent".to_string());
            self.record(err);
            self.advance();
            while !matches!(self.current.kind, TokenKind::Dedent | TokenKind::Eof) {
                if self.current.kind == TokenKind::Newline {
                    self.advance();
                    continue;
                }
                self.parse_statement_recovering(out);
            }
            self.advance();
            return;
        }

        let start = self.position;
        if let Err(err) = self.parse_statement(out) {
            self.record(err);
            self.synchronize();
            if self.position == start {
                self.advance();
            }
        }
    }

    fn record(&mut self, err: ParseError) {
        debug!(file = %err.file.display(), line = err.line, message = %err.message, "parse error");
        self.errors.push(err);
    }

    /// Discards tokens up to the next statement boundary: the end of the
    /// current line (plus any indented body hanging off it), a dedent or a
    /// statement keyword.
    fn synchronize(&mut self) {
        loop {
            match self.current.kind {
                TokenKind::Eof | TokenKind::Dedent => break,
                TokenKind::Newline => {
                    self.advance();
                    if self.current.kind == TokenKind::Indent {
                        self.skip_indented_block();
                    }
                    break;
                }
                TokenKind::Keyword if self.current.is_statement_starter() => break,
                _ => {
                    self.advance();
                }
            }
        }
        trace!(line = self.current.line, token = %self.current, "resynchronised");
    }

    fn skip_indented_block(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current.kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                TokenKind::Eof => return,
                _ => {}
            }
            self.advance();
        }
    }

    /// Runs `parse` one nesting level deeper, failing once [`MAX_NESTING`]
    /// is reached.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.nesting >= MAX_NESTING {
            trace!(line = self.current.line, "nesting limit reached");
            return Err(self.error_here("too many nested expressions or blocks"));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    // --- token window ---

    fn advance(&mut self) -> Token {
        let next = self.tokens.next().unwrap_or_else(|| {
            Token::new(TokenKind::Eof, "", self.peek.line, Arc::clone(&self.file))
        });
        let upcoming = mem::replace(&mut self.peek, next);
        self.position += 1;
        mem::replace(&mut self.current, upcoming)
    }

    fn span(&self) -> Span {
        Span::new(Arc::clone(&self.file), self.current.line)
    }

    fn check_delim(&self, delim: &str) -> bool {
        self.current.is_delimiter(delim)
    }

    fn check_keyword(&self, word: &str) -> bool {
        self.current.is_keyword(word)
    }

    fn check_op(&self, op: &str) -> bool {
        self.current.is_operator(op)
    }

    fn eat_delim(&mut self, delim: &str) -> bool {
        let found = self.check_delim(delim);
        if found {
            self.advance();
        }
        found
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        let found = self.check_keyword(word);
        if found {
            self.advance();
        }
        found
    }

    fn eat_op(&mut self, op: &str) -> bool {
        let found = self.check_op(op);
        if found {
            self.advance();
        }
        found
    }

    fn expect_delim(&mut self, delim: &str) -> PResult<Token> {
        if self.check_delim(delim) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("`{delim}`")))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> PResult<Token> {
        if self.check_keyword(word) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("`{word}`")))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> PResult<String> {
        if self.current.kind == TokenKind::Identifier {
            Ok(self.advance().literal)
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_newline(&mut self) -> PResult<()> {
        match self.current.kind {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    // --- diagnostics ---

    fn error_at(&self, token: &Token, message: String) -> ParseError {
        let message = LexError::classify(token).map_or(message, |lex| lex.to_string());
        ParseError {
            file: self.file.to_path_buf(),
            line: token.line,
            message,
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        self.error_at(&self.current, message.into())
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        self.error_here(format!("expected {expected}, found {}", self.current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, StmtKind};

    fn parse(src: &str) -> (Program, Vec<ParseError>) {
        lex_and_parse(src, "test.py")
    }

    #[test]
    fn test_indentation_round_trip() {
        let (program, errors) = parse("if x:\n    y\nz\n");
        assert!(errors.is_empty());
        assert_eq!(program.statements.len(), 2);
        let StmtKind::If { body, alternate, .. } = &program.statements[0].kind else {
            panic!("expected if statement");
        };
        assert_eq!(body.statements.len(), 1);
        assert!(matches!(
            &body.statements[0].kind,
            StmtKind::Expr(e) if e.kind == ExprKind::Identifier("y".into())
        ));
        assert!(alternate.is_none());
        assert!(matches!(
            &program.statements[1].kind,
            StmtKind::Expr(e) if e.kind == ExprKind::Identifier("z".into())
        ));
    }

    #[test]
    fn test_recovery_keeps_following_statements() {
        let (program, errors) = parse("x = = 1\na = 1\nb = 2\nprint(a)\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 1);
        assert_eq!(program.statements.len(), 3);
    }

    #[test]
    fn test_recovery_after_unclosed_bracket() {
        let (program, errors) =
            parse("x = foo(\ny = 1\ndef g():\n    return 2\nexecute(q)\nz = 3\n");
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(errors[0].line, 2);
        let lines: Vec<usize> = program.statements.iter().map(|s| s.span.line).collect();
        assert_eq!(lines, vec![3, 5, 6]);
    }

    #[test]
    fn test_deep_nesting_is_error() {
        let depth = 5_000;
        let source = format!("x = {}1{}\ny = 2\n", "(".repeat(depth), ")".repeat(depth));
        let (program, errors) = parse(&source);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("nested"));
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn test_nesting_below_limit_parses() {
        let depth = MAX_NESTING - 2;
        let source = format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
        let (program, errors) = parse(&source);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn test_deeply_nested_blocks_are_error() {
        let levels = MAX_NESTING + 5;
        let mut source = String::new();
        for level in 0..levels {
            source.push_str(&" ".repeat(level));
            source.push_str("if x:\n");
        }
        source.push_str(&" ".repeat(levels));
        source.push_str("pass\nafter()\n");

        let (program, errors) = std::thread::Builder::new()
            .stack_size(16 * 1024 * 1024)
            .spawn(move || parse(&source))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(program.statements.len(), 2);
        assert_eq!(program.statements[1].span.line, levels + 2);
    }

    #[test]
    fn test_recovery_skips_malformed_compound_body() {
        let (program, errors) = parse("def :\n    body()\n    more()\nafter()\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(program.statements.len(), 1);
        assert_eq!(program.statements[0].span.line, 4);
    }

    #[test]
    fn test_recovery_inside_block() {
        let (program, errors) = parse("def f():\n    a = )\n    return 1\ng()\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(program.statements.len(), 2);
        let StmtKind::FunctionDef(def) = &program.statements[0].kind else {
            panic!("expected function");
        };
        assert_eq!(def.body.statements.len(), 1);
    }

    #[test]
    fn test_empty_body_is_error() {
        let (program, errors) = parse("if x:\ny = 1\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("indented block"));
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn test_unexpected_indent_keeps_statements() {
        let (program, errors) = parse("a = 1\n    b = 2\nc = 3\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(program.statements.len(), 3);
    }

    #[test]
    fn test_illegal_token_reports_lex_error() {
        let (program, errors) = parse("a = $\nb = 2\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("illegal character"));
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn test_unterminated_string_error() {
        let (_, errors) = parse("s = \"oops\nt = 1\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "unterminated string literal");
    }

    #[test]
    fn test_parse_error_display() {
        let (_, errors) = parse("x = = 1\n");
        assert_eq!(
            errors[0].to_string(),
            "test.py:1: expected expression, found operator `=`"
        );
    }

    #[test]
    fn test_multiple_errors_reported() {
        let (program, errors) = parse("x = = 1\ny = 2\nz = ) \nw = 3\n");
        assert_eq!(errors.len(), 2);
        assert_eq!(program.statements.len(), 2);
    }
}
