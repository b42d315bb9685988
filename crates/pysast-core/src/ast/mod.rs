//! Abstract syntax tree for the analyzed language.
//!
//! Every node is a closed tagged union carrying a [`Span`] that points at its
//! first token. Trees are built once by the parser and are read-only
//! afterwards; rules query them through the functions in [`visit`].

pub mod visit;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use visit::{find_all, find_first, function_scopes, walk, walk_scope, Node, NodeKind, Scope};

/// Position of a node: originating file and 1-indexed line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    /// Originating file.
    pub file: Arc<Path>,
    /// Line of the node's first token.
    pub line: usize,
}

impl Span {
    /// Creates a span.
    #[must_use]
    pub fn new(file: Arc<Path>, line: usize) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Root of a parsed file.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Originating file.
    pub file: Arc<Path>,
    /// Top-level statements in source order.
    pub statements: Vec<Stmt>,
}

impl Program {
    /// Span of the program (line 1 of its file).
    #[must_use]
    pub fn span(&self) -> Span {
        Span::new(Arc::clone(&self.file), 1)
    }
}

/// An indented suite of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Position of the first statement.
    pub span: Span,
    /// Statements in source order.
    pub statements: Vec<Stmt>,
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Position of the first token.
    pub span: Span,
    /// Variant payload.
    pub kind: StmtKind,
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Plain, chained, augmented or annotated assignment.
    Assign(Assign),
    /// Expression evaluated for its effect.
    Expr(Expr),
    /// `if` with an optional `elif`/`else` chain.
    If {
        /// Condition.
        test: Expr,
        /// Consequence.
        body: Block,
        /// `elif` (an `If` statement) or `else` (a `Block` statement).
        alternate: Option<Box<Stmt>>,
    },
    /// `while` loop.
    While {
        /// Condition.
        test: Expr,
        /// Loop body.
        body: Block,
        /// `else` clause.
        orelse: Option<Block>,
    },
    /// `for` loop.
    For {
        /// Loop variable(s).
        target: Expr,
        /// Iterated expression.
        iter: Expr,
        /// Loop body.
        body: Block,
        /// `else` clause.
        orelse: Option<Block>,
        /// `async for`.
        is_async: bool,
    },
    /// Function definition.
    FunctionDef(FunctionDef),
    /// Class definition.
    ClassDef(ClassDef),
    /// `import a.b as c, d`.
    Import(Vec<Alias>),
    /// `from module import names`.
    FromImport {
        /// Dotted module path, without leading dots.
        module: String,
        /// Number of leading dots of a relative import.
        level: usize,
        /// Imported names; `*` for a star import.
        names: Vec<Alias>,
    },
    /// `pass`.
    Pass,
    /// `return [value]`.
    Return(Option<Expr>),
    /// `break`.
    Break,
    /// `continue`.
    Continue,
    /// `try` statement.
    Try {
        /// Guarded body.
        body: Block,
        /// `except` clauses.
        handlers: Vec<ExceptHandler>,
        /// `else` clause.
        orelse: Option<Block>,
        /// `finally` clause.
        finalbody: Option<Block>,
    },
    /// A bare block; used for `else` clauses of an `if` chain.
    Block(Block),
    /// `with` statement.
    With {
        /// Context managers.
        items: Vec<WithItem>,
        /// Body.
        body: Block,
        /// `async with`.
        is_async: bool,
    },
    /// `raise [exc [from cause]]`.
    Raise {
        /// Raised exception.
        exc: Option<Expr>,
        /// `from` cause.
        cause: Option<Expr>,
    },
    /// `assert test[, msg]`.
    Assert {
        /// Asserted condition.
        test: Expr,
        /// Failure message.
        msg: Option<Expr>,
    },
    /// `del a, b`.
    Delete(Vec<Expr>),
    /// `global` or `nonlocal` declaration.
    Global {
        /// Declared names.
        names: Vec<String>,
        /// True for `nonlocal`.
        nonlocal: bool,
    },
}

/// Assignment payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    /// Targets, left to right (`a = b = 1` has two).
    pub targets: Vec<Expr>,
    /// Assigned value; absent for a bare annotation (`x: int`).
    pub value: Option<Expr>,
    /// Annotation of `x: T = v`.
    pub annotation: Option<Expr>,
    /// Operator of an augmented assignment (`+=` is `Add`).
    pub augmented: Option<BinaryOp>,
}

/// Function definition payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Function name.
    pub name: String,
    /// Parameters.
    pub params: Vec<Param>,
    /// Return annotation.
    pub returns: Option<Expr>,
    /// Body.
    pub body: Block,
    /// Decorator expressions, outermost first.
    pub decorators: Vec<Expr>,
    /// `async def`.
    pub is_async: bool,
}

/// Class definition payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    /// Class name.
    pub name: String,
    /// Base classes and keyword arguments.
    pub bases: Vec<Argument>,
    /// Body.
    pub body: Block,
    /// Decorator expressions.
    pub decorators: Vec<Expr>,
}

/// A function or lambda parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Positional, `*args` or `**kwargs`.
    pub kind: ParamKind,
    /// Default value.
    pub default: Option<Expr>,
    /// Type annotation.
    pub annotation: Option<Expr>,
}

/// Parameter flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Regular parameter.
    Normal,
    /// `*args`.
    VarArgs,
    /// `**kwargs`.
    KwArgs,
}

/// `name as asname` in an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    /// Imported (dotted) name.
    pub name: String,
    /// Local alias.
    pub asname: Option<String>,
}

/// `except [type [as name]]: body`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    /// Position of the `except` keyword.
    pub span: Span,
    /// Caught exception type.
    pub kind: Option<Expr>,
    /// Bound name.
    pub name: Option<String>,
    /// Handler body.
    pub body: Block,
}

/// `context [as target]` in a `with` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    /// Context manager expression.
    pub context: Expr,
    /// Bound target.
    pub target: Option<Expr>,
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Position of the first token.
    pub span: Span,
    /// Variant payload.
    pub kind: ExprKind,
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Name reference.
    Identifier(String),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal (adjacent literals already concatenated).
    Str(String),
    /// `True` / `False`.
    Bool(bool),
    /// `None`.
    None,
    /// Prefix operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Infix operation, including boolean and comparison operators.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Function call.
    Call(Call),
    /// `value.attr`.
    Attribute {
        /// Object.
        value: Box<Expr>,
        /// Attribute name.
        attr: String,
    },
    /// `value[index]`.
    Subscript {
        /// Indexed object.
        value: Box<Expr>,
        /// Index or slice.
        index: Box<Expr>,
    },
    /// `lower:upper:step` inside a subscript.
    Slice {
        /// Lower bound.
        lower: Option<Box<Expr>>,
        /// Upper bound.
        upper: Option<Box<Expr>>,
        /// Step.
        step: Option<Box<Expr>>,
    },
    /// `[a, b]`.
    List(Vec<Expr>),
    /// `(a, b)` or a bare `a, b`.
    Tuple(Vec<Expr>),
    /// `{k: v}`.
    Dict(Vec<DictEntry>),
    /// `{a, b}`.
    Set(Vec<Expr>),
    /// `lambda params: body`.
    Lambda {
        /// Parameters.
        params: Vec<Param>,
        /// Body expression.
        body: Box<Expr>,
    },
    /// `[elt for ...]`.
    ListComp {
        /// Produced element.
        element: Box<Expr>,
        /// `for`/`if` clauses.
        generators: Vec<Comprehension>,
    },
    /// `{k: v for ...}`.
    DictComp {
        /// Produced key.
        key: Box<Expr>,
        /// Produced value.
        value: Box<Expr>,
        /// `for`/`if` clauses.
        generators: Vec<Comprehension>,
    },
    /// `{elt for ...}`.
    SetComp {
        /// Produced element.
        element: Box<Expr>,
        /// `for`/`if` clauses.
        generators: Vec<Comprehension>,
    },
    /// `(elt for ...)`.
    GeneratorExp {
        /// Produced element.
        element: Box<Expr>,
        /// `for`/`if` clauses.
        generators: Vec<Comprehension>,
    },
    /// `await value`.
    Await(Box<Expr>),
    /// f-string, split into literal and interpolated parts.
    FormattedStr(Vec<FStringPart>),
    /// `body if test else orelse`.
    Conditional {
        /// Condition.
        test: Box<Expr>,
        /// Value when true.
        body: Box<Expr>,
        /// Value when false.
        orelse: Box<Expr>,
    },
    /// `yield [value]` / `yield from value`.
    Yield {
        /// Yielded value.
        value: Option<Box<Expr>>,
        /// `yield from`.
        from: bool,
    },
    /// `*value` in a display or assignment target.
    Starred(Box<Expr>),
}

/// A call expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Called expression.
    pub func: Box<Expr>,
    /// Arguments in source order.
    pub args: Vec<Argument>,
}

impl Call {
    /// Dotted path of the callee, e.g. `cursor.execute`.
    #[must_use]
    pub fn callee(&self) -> Option<String> {
        self.func.dotted_name()
    }

    /// Last segment of the callee (`execute` for `db.cursor().execute`).
    #[must_use]
    pub fn method_name(&self) -> Option<&str> {
        match &self.func.kind {
            ExprKind::Identifier(name) => Some(name),
            ExprKind::Attribute { attr, .. } => Some(attr),
            _ => None,
        }
    }

    /// The `index`-th positional argument.
    #[must_use]
    pub fn positional(&self, index: usize) -> Option<&Expr> {
        self.args
            .iter()
            .filter(|a| a.kind == ArgumentKind::Positional)
            .nth(index)
            .map(|a| &a.value)
    }

    /// Number of positional arguments.
    #[must_use]
    pub fn positional_count(&self) -> usize {
        self.args
            .iter()
            .filter(|a| a.kind == ArgumentKind::Positional)
            .count()
    }

    /// Value of the keyword argument `name`.
    #[must_use]
    pub fn keyword(&self, name: &str) -> Option<&Expr> {
        self.args.iter().find_map(|a| match &a.kind {
            ArgumentKind::Keyword(k) if k == name => Some(&a.value),
            _ => None,
        })
    }
}

/// A call argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// Argument flavour.
    pub kind: ArgumentKind,
    /// Argument value.
    pub value: Expr,
}

/// Argument flavours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentKind {
    /// `f(x)`.
    Positional,
    /// `f(name=x)`.
    Keyword(String),
    /// `f(*xs)`.
    Star,
    /// `f(**kw)`.
    DoubleStar,
}

/// Entry of a dict display; `key` is `None` for `**mapping`.
#[derive(Debug, Clone, PartialEq)]
pub struct DictEntry {
    /// Key.
    pub key: Option<Expr>,
    /// Value.
    pub value: Expr,
}

/// A `for target in iter if cond` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    /// Loop variable(s).
    pub target: Expr,
    /// Iterated expression.
    pub iter: Expr,
    /// Filter conditions.
    pub conditions: Vec<Expr>,
    /// `async for`.
    pub is_async: bool,
}

/// Piece of an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    /// Literal text.
    Literal(String),
    /// Interpolated expression.
    Expr(Expr),
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `not` / `!`.
    Not,
    /// `-`.
    Neg,
    /// `+`.
    Pos,
    /// `~`.
    Invert,
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtE,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
    BitOr,
    BitXor,
    BitAnd,
    LShift,
    RShift,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    MatMul,
    Pow,
}

impl BinaryOp {
    /// Maps an operator token (or its augmented form without `=`) to an operator.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "or" => Self::Or,
            "and" => Self::And,
            "==" => Self::Eq,
            "!=" => Self::NotEq,
            "<" => Self::Lt,
            ">" => Self::Gt,
            "<=" => Self::LtE,
            ">=" => Self::GtE,
            "is" => Self::Is,
            "in" => Self::In,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            "&" => Self::BitAnd,
            "<<" => Self::LShift,
            ">>" => Self::RShift,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "//" => Self::FloorDiv,
            "%" => Self::Mod,
            "@" => Self::MatMul,
            "**" => Self::Pow,
            _ => return None,
        })
    }
}

impl Expr {
    /// Creates an expression.
    #[must_use]
    pub fn new(span: Span, kind: ExprKind) -> Self {
        Self { span, kind }
    }

    /// Dotted path for names and attribute chains (`request.args.get`).
    #[must_use]
    pub fn dotted_name(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name.clone()),
            ExprKind::Attribute { value, attr } => {
                value.dotted_name().map(|base| format!("{base}.{attr}"))
            }
            _ => None,
        }
    }

    /// The string value of a plain string literal.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The call payload of a call expression.
    #[must_use]
    pub fn as_call(&self) -> Option<&Call> {
        match &self.kind {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }

    /// True for constant literals (strings, numbers, booleans, `None`).
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Str(_)
                | ExprKind::Int(_)
                | ExprKind::Float(_)
                | ExprKind::Bool(_)
                | ExprKind::None
        )
    }

    /// Literal text reachable through concatenation, `%`, f-strings and
    /// `"...".format(...)`; used to inspect dynamically built strings.
    #[must_use]
    pub fn literal_text(&self) -> String {
        let mut out = String::new();
        self.collect_literal_text(&mut out);
        out
    }

    fn collect_literal_text(&self, out: &mut String) {
        match &self.kind {
            ExprKind::Str(s) => out.push_str(s),
            ExprKind::FormattedStr(parts) => {
                for part in parts {
                    if let FStringPart::Literal(s) = part {
                        out.push_str(s);
                    }
                }
            }
            ExprKind::Binary {
                op: BinaryOp::Add | BinaryOp::Mod,
                left,
                right,
            } => {
                left.collect_literal_text(out);
                right.collect_literal_text(out);
            }
            ExprKind::Call(call) => {
                if let ExprKind::Attribute { value, attr } = &call.func.kind {
                    if attr == "format" {
                        value.collect_literal_text(out);
                    }
                }
            }
            _ => {}
        }
    }
}
