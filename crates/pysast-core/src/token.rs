//! Token types produced by the [`Lexer`](crate::Lexer).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Reserved word from [`KEYWORDS`].
    Keyword,
    /// Name that is not a keyword.
    Identifier,
    /// Decimal, hex, octal or binary integer.
    Integer,
    /// Floating point number.
    Float,
    /// String or bytes literal; the literal holds the decoded value.
    String,
    /// `f"..."` literal; the literal holds the raw body.
    FString,
    /// `True` or `False`.
    Boolean,
    /// `None`.
    None,
    /// Operator such as `+`, `==` or `**=`.
    Operator,
    /// Bracket, comma, colon or semicolon.
    Delimiter,
    /// End of a logical line.
    Newline,
    /// Indentation increased.
    Indent,
    /// Indentation decreased by one level.
    Dedent,
    /// Input the lexer could not classify.
    Illegal,
    /// End of input.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Keyword => "keyword",
            Self::Identifier => "identifier",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::FString => "f-string",
            Self::Boolean => "boolean",
            Self::None => "None",
            Self::Operator => "operator",
            Self::Delimiter => "delimiter",
            Self::Newline => "newline",
            Self::Indent => "indent",
            Self::Dedent => "dedent",
            Self::Illegal => "illegal token",
            Self::Eof => "end of input",
        };
        f.write_str(name)
    }
}

/// Reserved words of the language.
pub const KEYWORDS: &[&str] = &[
    "def", "if", "elif", "else", "for", "while", "return", "in", "and", "or", "not", "is",
    "class", "import", "from", "pass", "break", "continue", "try", "except", "finally",
    "lambda", "yield", "with", "as", "async", "await", "raise", "del", "assert", "global",
    "nonlocal",
];

/// Keywords that can begin a statement; used as resynchronisation points.
pub const STATEMENT_STARTERS: &[&str] = &[
    "if", "while", "for", "def", "class", "return", "import", "pass", "break", "continue",
];

/// Classifies a word as keyword, literal keyword or identifier.
#[must_use]
pub fn lookup_ident(word: &str) -> TokenKind {
    match word {
        "True" | "False" => TokenKind::Boolean,
        "None" => TokenKind::None,
        w if KEYWORDS.contains(&w) => TokenKind::Keyword,
        _ => TokenKind::Identifier,
    }
}

/// A positioned lexical unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token classification.
    pub kind: TokenKind,
    /// Source text (decoded for string literals).
    pub literal: String,
    /// Line number (1-indexed).
    pub line: usize,
    /// Originating file.
    pub file: Arc<Path>,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub fn new(kind: TokenKind, literal: impl Into<String>, line: usize, file: Arc<Path>) -> Self {
        Self {
            kind,
            literal: literal.into(),
            line,
            file,
        }
    }

    /// Returns true if this is the given keyword.
    #[must_use]
    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.literal == word
    }

    /// Returns true if this is the given operator.
    #[must_use]
    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.literal == op
    }

    /// Returns true if this is the given delimiter.
    #[must_use]
    pub fn is_delimiter(&self, delim: &str) -> bool {
        self.kind == TokenKind::Delimiter && self.literal == delim
    }

    /// Returns true if the token may begin a statement.
    #[must_use]
    pub fn is_statement_starter(&self) -> bool {
        self.kind == TokenKind::Keyword && STATEMENT_STARTERS.contains(&self.literal.as_str())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof => {
                write!(f, "{}", self.kind)
            }
            _ => write!(f, "{} `{}`", self.kind, self.literal),
        }
    }
}
