//! Indentation-aware lexer.
//!
//! The lexer is lazy: tokens are produced on demand by [`Lexer::next_token`].
//! Malformed input never aborts scanning; it becomes a [`TokenKind::Illegal`]
//! token and scanning resumes at the next character.

use crate::token::{lookup_ident, Token, TokenKind};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

const THREE_CHAR_OPS: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];

const TWO_CHAR_OPS: &[&str] = &[
    "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "->", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", ":=", "@=",
];

const ONE_CHAR_OPS: &str = "+-*/%<>=!&|^~@.";

const DELIMITERS: &str = "()[]{},:;";

const TAB_WIDTH: usize = 8;

/// Keywords that cannot continue an expression. One of these starting a
/// line at or left of the current indentation closes any open brackets.
const BRACKET_RESET_KEYWORDS: &[&str] = &[
    "def", "class", "return", "import", "while", "with", "try", "raise", "pass", "break",
    "continue", "del", "global", "nonlocal", "assert", "async",
];

/// Diagnostic describing why the lexer produced an illegal token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    /// A character outside the language's alphabet.
    #[error("illegal character `{ch}`")]
    IllegalCharacter {
        /// The offending character.
        ch: String,
        /// Line of the character.
        line: usize,
    },

    /// A string literal that reaches end of line or input without its closing quote.
    #[error("unterminated string literal")]
    UnterminatedString {
        /// Line where the literal starts.
        line: usize,
    },

    /// A dedent to a column that matches no enclosing indentation level.
    #[error("unindent does not match any outer indentation level")]
    InconsistentDedent {
        /// Line of the dedent.
        line: usize,
    },
}

impl LexError {
    /// Classifies an illegal token. Returns `None` for any other token kind.
    #[must_use]
    pub fn classify(token: &Token) -> Option<Self> {
        if token.kind != TokenKind::Illegal {
            return None;
        }
        let line = token.line;
        let first = token.literal.chars().next();
        Some(match first {
            Some('"' | '\'') => Self::UnterminatedString { line },
            Some(c) if c == ' ' || c == '\t' => Self::InconsistentDedent { line },
            _ => Self::IllegalCharacter {
                ch: token.literal.clone(),
                line,
            },
        })
    }

    /// Line the diagnostic points at.
    #[must_use]
    pub fn line(&self) -> usize {
        match self {
            Self::IllegalCharacter { line, .. }
            | Self::UnterminatedString { line }
            | Self::InconsistentDedent { line } => *line,
        }
    }
}

/// Converts source text into a stream of positioned tokens.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    file: Arc<Path>,
    indent_stack: Vec<usize>,
    pending: VecDeque<Token>,
    at_line_start: bool,
    line_has_content: bool,
    depth: usize,
    eof_emitted: bool,
}

impl Lexer {
    /// Creates a lexer over `source` attributed to `file`.
    #[must_use]
    pub fn new(source: &str, file: impl AsRef<Path>) -> Self {
        Self::with_shared_path(source, Arc::from(file.as_ref()))
    }

    /// Creates a lexer that tags tokens with an already shared path.
    #[must_use]
    pub fn with_shared_path(source: &str, file: Arc<Path>) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            file,
            indent_stack: vec![0],
            pending: VecDeque::new(),
            at_line_start: true,
            line_has_content: false,
            depth: 0,
            eof_emitted: false,
        }
    }

    /// Starts line numbering at `line` instead of 1.
    #[must_use]
    pub fn starting_at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    /// Path attached to every token.
    #[must_use]
    pub fn file(&self) -> &Arc<Path> {
        &self.file
    }

    /// Lexes the whole input, including the trailing `Eof` token.
    #[must_use]
    pub fn tokenize(self) -> Vec<Token> {
        self.collect()
    }

    /// Returns the next token. After the input is exhausted this keeps
    /// returning `Eof`.
    pub fn next_token(&mut self) -> Token {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return token;
            }

            if self.at_line_start && self.depth == 0 {
                self.at_line_start = false;
                self.read_indentation();
                continue;
            }

            self.skip_inline_whitespace();

            let Some(c) = self.current() else {
                return self.finish();
            };

            match c {
                '#' => self.skip_comment(),
                '\n' => {
                    let line = self.line;
                    self.advance();
                    self.line += 1;
                    if self.depth > 0 {
                        if !self.line_starts_statement() {
                            continue;
                        }
                        debug!(line = self.line, depth = self.depth, "unclosed bracket before statement");
                        self.depth = 0;
                    }
                    self.at_line_start = true;
                    if self.line_has_content {
                        self.line_has_content = false;
                        return self.make(TokenKind::Newline, "\n", line);
                    }
                }
                '\\' if self.peek(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '"' | '\'' => return self.content(|lx| lx.read_string(String::new())),
                c if c.is_ascii_digit() => return self.content(Self::read_number),
                '.' if self.peek(1).is_some_and(|n| n.is_ascii_digit()) => {
                    return self.content(Self::read_number);
                }
                c if c.is_alphabetic() || c == '_' => return self.content(Self::read_word),
                _ => return self.content(Self::read_symbol),
            }
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current()?;
        self.pos += 1;
        Some(c)
    }

    fn make(&self, kind: TokenKind, literal: impl Into<String>, line: usize) -> Token {
        Token::new(kind, literal, line, Arc::clone(&self.file))
    }

    fn content(&mut self, read: impl FnOnce(&mut Self) -> Token) -> Token {
        self.line_has_content = true;
        read(self)
    }

    /// True when the physical line at `pos` starts with a
    /// [`BRACKET_RESET_KEYWORDS`] entry at or left of the current indentation.
    fn line_starts_statement(&self) -> bool {
        let mut offset = 0;
        let mut column = 0;
        while let Some(c) = self.peek(offset) {
            match c {
                ' ' => column += 1,
                '\t' => column = (column / TAB_WIDTH + 1) * TAB_WIDTH,
                _ => break,
            }
            offset += 1;
        }
        if self.indent_stack.last().is_some_and(|&top| column > top) {
            return false;
        }
        let word: String = self.chars[self.pos + offset..]
            .iter()
            .take_while(|c| c.is_alphanumeric() || **c == '_')
            .collect();
        BRACKET_RESET_KEYWORDS.contains(&word.as_str())
    }

    fn skip_inline_whitespace(&mut self) {
        while matches!(self.current(), Some(' ' | '\t' | '\r' | '\x0c')) {
            self.pos += 1;
        }
    }

    fn skip_comment(&mut self) {
        while self.current().is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
    }

    /// Measures leading whitespace of a logical line and queues
    /// `Indent`/`Dedent` tokens. Blank and comment-only lines are ignored.
    fn read_indentation(&mut self) {
        let start = self.pos;
        let mut column = 0;
        while let Some(c) = self.current() {
            match c {
                ' ' => column += 1,
                '\t' => column = (column / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }

        match self.current() {
            None | Some('\n' | '#') => return,
            Some('\\') if self.peek(1) == Some('\n') => return,
            _ => {}
        }

        let top = self.indent_stack.last().copied().unwrap_or(0);
        if column > top {
            self.indent_stack.push(column);
            let token = self.make(TokenKind::Indent, "", self.line);
            self.pending.push_back(token);
            return;
        }

        while self.indent_stack.len() > 1 && self.indent_stack.last().is_some_and(|&l| l > column) {
            self.indent_stack.pop();
            let token = self.make(TokenKind::Dedent, "", self.line);
            self.pending.push_back(token);
        }

        if self.indent_stack.last().is_some_and(|&l| l != column) {
            let whitespace: String = self.chars[start..self.pos].iter().collect();
            debug!(line = self.line, "inconsistent dedent");
            let token = self.make(TokenKind::Illegal, whitespace, self.line);
            self.pending.push_back(token);
        }
    }

    fn finish(&mut self) -> Token {
        if self.line_has_content {
            self.line_has_content = false;
            return self.make(TokenKind::Newline, "\n", self.line);
        }
        if self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            return self.make(TokenKind::Dedent, "", self.line);
        }
        self.make(TokenKind::Eof, "", self.line)
    }

    fn read_word(&mut self) -> Token {
        let line = self.line;
        let start = self.pos;
        while self.current().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.current(), Some('"' | '\'')) && is_string_prefix(&word) {
            return self.read_string(word.to_ascii_lowercase());
        }

        self.make(lookup_ident(&word), word, line)
    }

    fn read_number(&mut self) -> Token {
        let line = self.line;
        let mut text = String::new();
        let mut is_float = false;

        if self.current() == Some('0') && matches!(self.peek(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
            text.push('0');
            self.pos += 1;
            if let Some(radix) = self.advance() {
                text.push(radix.to_ascii_lowercase());
            }
            while let Some(c) = self.current().filter(|c| c.is_ascii_hexdigit() || *c == '_') {
                if c != '_' {
                    text.push(c);
                }
                self.pos += 1;
            }
            return self.make(TokenKind::Integer, text, line);
        }

        while let Some(c) = self.current() {
            match c {
                '0'..='9' => text.push(c),
                '_' => {}
                '.' if !is_float && self.peek(1) != Some('.') => {
                    is_float = true;
                    text.push(c);
                }
                'e' | 'E' if self.peek(1).is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+') => {
                    is_float = true;
                    text.push(c);
                    self.pos += 1;
                    if let Some(sign) = self.current().filter(|s| *s == '-' || *s == '+') {
                        text.push(sign);
                        self.pos += 1;
                    }
                    continue;
                }
                'j' | 'J' => {
                    is_float = true;
                    self.pos += 1;
                    break;
                }
                _ => break,
            }
            self.pos += 1;
        }

        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Integer
        };
        self.make(kind, text, line)
    }

    /// Reads a string literal whose optional prefix has already been consumed.
    fn read_string(&mut self, prefix: String) -> Token {
        let line = self.line;
        let Some(quote) = self.advance() else {
            return self.make(TokenKind::Illegal, prefix, line);
        };
        let triple = self.current() == Some(quote) && self.peek(1) == Some(quote);
        if triple {
            self.pos += 2;
        }
        let raw = prefix.contains('r');
        let formatted = prefix.contains('f');
        let mut value = String::new();
        let mut opening = String::from(quote);
        if triple {
            opening.push(quote);
            opening.push(quote);
        }

        loop {
            let Some(c) = self.current() else {
                return self.unterminated(&opening, &value, line);
            };
            match c {
                c if c == quote => {
                    if !triple {
                        self.pos += 1;
                        break;
                    }
                    if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                        self.pos += 3;
                        break;
                    }
                    value.push(c);
                    self.pos += 1;
                }
                '\n' if !triple => return self.unterminated(&opening, &value, line),
                '\n' => {
                    value.push(c);
                    self.pos += 1;
                    self.line += 1;
                }
                '\\' => {
                    self.pos += 1;
                    let Some(next) = self.advance() else {
                        return self.unterminated(&opening, &value, line);
                    };
                    if next == '\n' {
                        self.line += 1;
                        if raw || formatted {
                            value.push('\\');
                            value.push('\n');
                        }
                        continue;
                    }
                    if raw || formatted {
                        value.push('\\');
                        value.push(next);
                        continue;
                    }
                    match next {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' | '\'' | '"' => value.push(next),
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                _ => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }

        let kind = if formatted {
            TokenKind::FString
        } else {
            TokenKind::String
        };
        self.make(kind, value, line)
    }

    fn unterminated(&mut self, opening: &str, value: &str, line: usize) -> Token {
        debug!(line, file = %self.file.display(), "unterminated string literal");
        // Leave the newline in place so the line still terminates.
        self.make(TokenKind::Illegal, format!("{opening}{value}"), line)
    }

    fn read_symbol(&mut self) -> Token {
        let line = self.line;
        for ops in [THREE_CHAR_OPS, TWO_CHAR_OPS] {
            for op in ops {
                if self.matches_ahead(op) {
                    self.pos += op.chars().count();
                    return self.make(TokenKind::Operator, *op, line);
                }
            }
        }

        let Some(c) = self.advance() else {
            return self.make(TokenKind::Eof, "", line);
        };
        if DELIMITERS.contains(c) {
            match c {
                '(' | '[' | '{' => self.depth += 1,
                ')' | ']' | '}' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
            return self.make(TokenKind::Delimiter, c.to_string(), line);
        }
        if ONE_CHAR_OPS.contains(c) {
            return self.make(TokenKind::Operator, c.to_string(), line);
        }

        trace!(line, ch = %c, "illegal character");
        self.make(TokenKind::Illegal, c.to_string(), line)
    }

    fn matches_ahead(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, expected)| self.peek(i) == Some(expected))
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.eof_emitted {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            self.eof_emitted = true;
        }
        Some(token)
    }
}

fn is_string_prefix(word: &str) -> bool {
    matches!(
        word.to_ascii_lowercase().as_str(),
        "r" | "b" | "u" | "f" | "rb" | "br" | "fr" | "rf"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src, "test.py").map(|t| t.kind).collect()
    }

    fn literals(src: &str) -> Vec<String> {
        Lexer::new(src, "test.py").map(|t| t.literal).collect()
    }

    #[test]
    fn test_simple_assignment() {
        use TokenKind::*;
        assert_eq!(
            kinds("x = 42\n"),
            vec![Identifier, Operator, Integer, Newline, Eof]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        use TokenKind::*;
        assert_eq!(
            kinds("if x:\n    y\nz\n"),
            vec![
                Keyword, Identifier, Delimiter, Newline, Indent, Identifier, Newline, Dedent,
                Identifier, Newline, Eof
            ]
        );
    }

    #[test]
    fn test_multiple_dedents_at_eof() {
        let tokens: Vec<Token> = Lexer::new("def f():\n  if x:\n    y", "t.py").collect();
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        assert_eq!(dedents, 2);
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn test_blank_and_comment_lines_ignored() {
        use TokenKind::*;
        assert_eq!(
            kinds("if x:\n\n    # note\n    y\n"),
            vec![Keyword, Identifier, Delimiter, Newline, Indent, Identifier, Newline, Dedent, Eof]
        );
    }

    #[test]
    fn test_implicit_line_joining() {
        use TokenKind::*;
        assert_eq!(
            kinds("f(a,\n      b)\n"),
            vec![Identifier, Delimiter, Identifier, Delimiter, Identifier, Delimiter, Newline, Eof]
        );
    }

    #[test]
    fn test_unclosed_bracket_closed_by_statement_keyword() {
        use TokenKind::*;
        assert_eq!(
            kinds("f(a,\nb\ndef g"),
            vec![
                Identifier, Delimiter, Identifier, Delimiter, Identifier, Newline, Keyword,
                Identifier, Newline, Eof
            ]
        );
    }

    #[test]
    fn test_indented_keyword_inside_brackets_keeps_joining() {
        use TokenKind::*;
        assert_eq!(
            kinds("if x:\n    f(\n        pass_through,\n    )\n"),
            vec![
                Keyword, Identifier, Delimiter, Newline, Indent, Identifier, Delimiter, Identifier,
                Delimiter, Delimiter, Newline, Dedent, Eof
            ]
        );
    }

    #[test]
    fn test_maximal_munch_operators() {
        assert_eq!(
            literals("a **= b // c != d"),
            vec!["a", "**=", "b", "//", "c", "!=", "d", "\n", ""]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens: Vec<Token> = Lexer::new(r#"s = "a\"b\n""#, "t.py").collect();
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[2].literal, "a\"b\n");
    }

    #[test]
    fn test_raw_and_fstring_prefixes() {
        let tokens: Vec<Token> = Lexer::new(r#"r"\d+" f"hi {name}""#, "t.py").collect();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].literal, r"\d+");
        assert_eq!(tokens[1].kind, TokenKind::FString);
        assert_eq!(tokens[1].literal, "hi {name}");
    }

    #[test]
    fn test_triple_quoted_string_tracks_lines() {
        let tokens: Vec<Token> = Lexer::new("s = \"\"\"a\nb\"\"\"\nt = 1\n", "t.py").collect();
        let t = tokens.iter().find(|t| t.literal == "t").map(|t| t.line);
        assert_eq!(t, Some(3));
    }

    #[test]
    fn test_unterminated_string_is_illegal() {
        let tokens: Vec<Token> = Lexer::new("x = \"abc\ny = 1\n", "t.py").collect();
        let illegal = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Illegal)
            .cloned();
        let illegal = illegal.unwrap();
        assert_eq!(
            LexError::classify(&illegal),
            Some(LexError::UnterminatedString { line: 1 })
        );
        // Scanning continues on the next line.
        assert!(tokens.iter().any(|t| t.literal == "y" && t.line == 2));
    }

    #[test]
    fn test_illegal_character_does_not_abort() {
        let tokens: Vec<Token> = Lexer::new("a = $\nb = 2\n", "t.py").collect();
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Illegal && t.literal == "$"));
        assert!(tokens.iter().any(|t| t.literal == "b"));
    }

    #[test]
    fn test_inconsistent_dedent() {
        let tokens: Vec<Token> = Lexer::new("if x:\n    y\n  z\n", "t.py").collect();
        let illegal = tokens.iter().find(|t| t.kind == TokenKind::Illegal);
        assert!(matches!(
            illegal.and_then(LexError::classify),
            Some(LexError::InconsistentDedent { line: 3 })
        ));
    }

    #[test]
    fn test_numbers() {
        use TokenKind::*;
        assert_eq!(kinds("1_000 3.14 0xff 1e5 .5"), vec![Integer, Float, Integer, Float, Float, Newline, Eof]);
        assert_eq!(literals("1_000")[0], "1000");
    }

    #[test]
    fn test_lexing_is_deterministic() {
        let src = "def f(a):\n    return a + 1\n\nprint(f(2))\n";
        let first: Vec<Token> = Lexer::new(src, "t.py").collect();
        let second: Vec<Token> = Lexer::new(src, "t.py").collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_keywords_and_literal_keywords() {
        use TokenKind::*;
        assert_eq!(
            kinds("not None is True"),
            vec![Keyword, None, Keyword, Boolean, Newline, Eof]
        );
    }
}
