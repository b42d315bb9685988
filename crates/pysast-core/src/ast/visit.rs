//! Generic traversal and query primitives over the AST.

use super::{Block, Call, Expr, ExprKind, FStringPart, FunctionDef, Param, Program, Span, Stmt, StmtKind};

/// Kind tag of a node, one per AST variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum NodeKind {
    Program,
    Assign,
    ExprStmt,
    If,
    While,
    For,
    FunctionDef,
    ClassDef,
    Import,
    FromImport,
    Pass,
    Return,
    Break,
    Continue,
    Try,
    Block,
    With,
    Raise,
    Assert,
    Delete,
    Global,
    Identifier,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    BoolLiteral,
    NoneLiteral,
    Unary,
    Binary,
    Call,
    Attribute,
    Subscript,
    Slice,
    ListLit,
    TupleLit,
    DictLit,
    SetLit,
    Lambda,
    ListComp,
    DictComp,
    SetComp,
    GeneratorExp,
    Await,
    FormattedStr,
    Conditional,
    Yield,
    Starred,
}

/// Borrowed view of any node in a tree.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// File root.
    Program(&'a Program),
    /// Statement.
    Stmt(&'a Stmt),
    /// Body of a compound statement.
    Block(&'a Block),
    /// Expression.
    Expr(&'a Expr),
}

impl<'a> Node<'a> {
    /// Variant tag of the node.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Program(_) => NodeKind::Program,
            Self::Block(_) => NodeKind::Block,
            Self::Stmt(stmt) => stmt_kind(stmt),
            Self::Expr(expr) => expr_kind(expr),
        }
    }

    /// Position of the node.
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Program(program) => program.span(),
            Self::Stmt(stmt) => stmt.span.clone(),
            Self::Block(block) => block.span.clone(),
            Self::Expr(expr) => expr.span.clone(),
        }
    }

    /// The node as a statement, if it is one.
    #[must_use]
    pub fn as_stmt(&self) -> Option<&'a Stmt> {
        match self {
            Self::Stmt(stmt) => Some(stmt),
            _ => None,
        }
    }

    /// The node as an expression, if it is one.
    #[must_use]
    pub fn as_expr(&self) -> Option<&'a Expr> {
        match self {
            Self::Expr(expr) => Some(expr),
            _ => None,
        }
    }

    /// The node as a call, if it is one.
    #[must_use]
    pub fn as_call(&self) -> Option<&'a Call> {
        self.as_expr().and_then(Expr::as_call)
    }

    /// Direct children in source order.
    #[must_use]
    pub fn children(&self) -> Vec<Node<'a>> {
        let mut out = Vec::new();
        match *self {
            Self::Program(program) => out.extend(program.statements.iter().map(Node::Stmt)),
            Self::Block(block) => out.extend(block.statements.iter().map(Node::Stmt)),
            Self::Stmt(stmt) => stmt_children(stmt, &mut out, true),
            Self::Expr(expr) => expr_children(expr, &mut out),
        }
        out
    }

    /// Children that belong to the same scope: like [`Node::children`], but a
    /// nested function contributes only its decorators, defaults and
    /// annotations, never its body.
    fn scope_children(&self) -> Vec<Node<'a>> {
        match *self {
            Self::Stmt(stmt) => {
                let mut out = Vec::new();
                stmt_children(stmt, &mut out, false);
                out
            }
            _ => self.children(),
        }
    }
}

fn stmt_kind(stmt: &Stmt) -> NodeKind {
    match &stmt.kind {
        StmtKind::Assign(_) => NodeKind::Assign,
        StmtKind::Expr(_) => NodeKind::ExprStmt,
        StmtKind::If { .. } => NodeKind::If,
        StmtKind::While { .. } => NodeKind::While,
        StmtKind::For { .. } => NodeKind::For,
        StmtKind::FunctionDef(_) => NodeKind::FunctionDef,
        StmtKind::ClassDef(_) => NodeKind::ClassDef,
        StmtKind::Import(_) => NodeKind::Import,
        StmtKind::FromImport { .. } => NodeKind::FromImport,
        StmtKind::Pass => NodeKind::Pass,
        StmtKind::Return(_) => NodeKind::Return,
        StmtKind::Break => NodeKind::Break,
        StmtKind::Continue => NodeKind::Continue,
        StmtKind::Try { .. } => NodeKind::Try,
        StmtKind::Block(_) => NodeKind::Block,
        StmtKind::With { .. } => NodeKind::With,
        StmtKind::Raise { .. } => NodeKind::Raise,
        StmtKind::Assert { .. } => NodeKind::Assert,
        StmtKind::Delete(_) => NodeKind::Delete,
        StmtKind::Global { .. } => NodeKind::Global,
    }
}

fn expr_kind(expr: &Expr) -> NodeKind {
    match &expr.kind {
        ExprKind::Identifier(_) => NodeKind::Identifier,
        ExprKind::Int(_) => NodeKind::IntLiteral,
        ExprKind::Float(_) => NodeKind::FloatLiteral,
        ExprKind::Str(_) => NodeKind::StringLiteral,
        ExprKind::Bool(_) => NodeKind::BoolLiteral,
        ExprKind::None => NodeKind::NoneLiteral,
        ExprKind::Unary { .. } => NodeKind::Unary,
        ExprKind::Binary { .. } => NodeKind::Binary,
        ExprKind::Call(_) => NodeKind::Call,
        ExprKind::Attribute { .. } => NodeKind::Attribute,
        ExprKind::Subscript { .. } => NodeKind::Subscript,
        ExprKind::Slice { .. } => NodeKind::Slice,
        ExprKind::List(_) => NodeKind::ListLit,
        ExprKind::Tuple(_) => NodeKind::TupleLit,
        ExprKind::Dict(_) => NodeKind::DictLit,
        ExprKind::Set(_) => NodeKind::SetLit,
        ExprKind::Lambda { .. } => NodeKind::Lambda,
        ExprKind::ListComp { .. } => NodeKind::ListComp,
        ExprKind::DictComp { .. } => NodeKind::DictComp,
        ExprKind::SetComp { .. } => NodeKind::SetComp,
        ExprKind::GeneratorExp { .. } => NodeKind::GeneratorExp,
        ExprKind::Await(_) => NodeKind::Await,
        ExprKind::FormattedStr(_) => NodeKind::FormattedStr,
        ExprKind::Conditional { .. } => NodeKind::Conditional,
        ExprKind::Yield { .. } => NodeKind::Yield,
        ExprKind::Starred(_) => NodeKind::Starred,
    }
}

fn push_params<'a>(params: &'a [Param], out: &mut Vec<Node<'a>>) {
    for param in params {
        if let Some(annotation) = &param.annotation {
            out.push(Node::Expr(annotation));
        }
        if let Some(default) = &param.default {
            out.push(Node::Expr(default));
        }
    }
}

fn push_function_header<'a>(def: &'a FunctionDef, out: &mut Vec<Node<'a>>) {
    out.extend(def.decorators.iter().map(Node::Expr));
    push_params(&def.params, out);
    out.extend(def.returns.iter().map(Node::Expr));
}

fn stmt_children<'a>(stmt: &'a Stmt, out: &mut Vec<Node<'a>>, enter_functions: bool) {
    match &stmt.kind {
        StmtKind::Assign(assign) => {
            out.extend(assign.targets.iter().map(Node::Expr));
            out.extend(assign.annotation.iter().map(Node::Expr));
            out.extend(assign.value.iter().map(Node::Expr));
        }
        StmtKind::Expr(expr) => out.push(Node::Expr(expr)),
        StmtKind::If {
            test,
            body,
            alternate,
        } => {
            out.push(Node::Expr(test));
            out.push(Node::Block(body));
            out.extend(alternate.as_deref().map(Node::Stmt));
        }
        StmtKind::While { test, body, orelse } => {
            out.push(Node::Expr(test));
            out.push(Node::Block(body));
            out.extend(orelse.iter().map(Node::Block));
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
            ..
        } => {
            out.push(Node::Expr(target));
            out.push(Node::Expr(iter));
            out.push(Node::Block(body));
            out.extend(orelse.iter().map(Node::Block));
        }
        StmtKind::FunctionDef(def) => {
            push_function_header(def, out);
            if enter_functions {
                out.push(Node::Block(&def.body));
            }
        }
        StmtKind::ClassDef(class) => {
            out.extend(class.decorators.iter().map(Node::Expr));
            out.extend(class.bases.iter().map(|a| Node::Expr(&a.value)));
            out.push(Node::Block(&class.body));
        }
        StmtKind::Return(value) => out.extend(value.iter().map(Node::Expr)),
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            out.push(Node::Block(body));
            for handler in handlers {
                out.extend(handler.kind.iter().map(Node::Expr));
                out.push(Node::Block(&handler.body));
            }
            out.extend(orelse.iter().map(Node::Block));
            out.extend(finalbody.iter().map(Node::Block));
        }
        StmtKind::Block(block) => out.extend(block.statements.iter().map(Node::Stmt)),
        StmtKind::With { items, body, .. } => {
            for item in items {
                out.push(Node::Expr(&item.context));
                out.extend(item.target.iter().map(Node::Expr));
            }
            out.push(Node::Block(body));
        }
        StmtKind::Raise { exc, cause } => {
            out.extend(exc.iter().map(Node::Expr));
            out.extend(cause.iter().map(Node::Expr));
        }
        StmtKind::Assert { test, msg } => {
            out.push(Node::Expr(test));
            out.extend(msg.iter().map(Node::Expr));
        }
        StmtKind::Delete(targets) => out.extend(targets.iter().map(Node::Expr)),
        StmtKind::Import(_)
        | StmtKind::FromImport { .. }
        | StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Global { .. } => {}
    }
}

fn expr_children<'a>(expr: &'a Expr, out: &mut Vec<Node<'a>>) {
    match &expr.kind {
        ExprKind::Unary { operand, .. } => out.push(Node::Expr(operand)),
        ExprKind::Binary { left, right, .. } => {
            out.push(Node::Expr(left));
            out.push(Node::Expr(right));
        }
        ExprKind::Call(call) => {
            out.push(Node::Expr(&call.func));
            out.extend(call.args.iter().map(|a| Node::Expr(&a.value)));
        }
        ExprKind::Attribute { value, .. } => out.push(Node::Expr(value)),
        ExprKind::Subscript { value, index } => {
            out.push(Node::Expr(value));
            out.push(Node::Expr(index));
        }
        ExprKind::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                out.push(Node::Expr(part));
            }
        }
        ExprKind::List(items) | ExprKind::Tuple(items) | ExprKind::Set(items) => {
            out.extend(items.iter().map(Node::Expr));
        }
        ExprKind::Dict(entries) => {
            for entry in entries {
                out.extend(entry.key.iter().map(Node::Expr));
                out.push(Node::Expr(&entry.value));
            }
        }
        ExprKind::Lambda { params, body } => {
            push_params(params, out);
            out.push(Node::Expr(body));
        }
        ExprKind::ListComp {
            element,
            generators,
        }
        | ExprKind::SetComp {
            element,
            generators,
        }
        | ExprKind::GeneratorExp {
            element,
            generators,
        } => {
            out.push(Node::Expr(element));
            for generator in generators {
                out.push(Node::Expr(&generator.target));
                out.push(Node::Expr(&generator.iter));
                out.extend(generator.conditions.iter().map(Node::Expr));
            }
        }
        ExprKind::DictComp {
            key,
            value,
            generators,
        } => {
            out.push(Node::Expr(key));
            out.push(Node::Expr(value));
            for generator in generators {
                out.push(Node::Expr(&generator.target));
                out.push(Node::Expr(&generator.iter));
                out.extend(generator.conditions.iter().map(Node::Expr));
            }
        }
        ExprKind::Await(inner) | ExprKind::Starred(inner) => out.push(Node::Expr(inner)),
        ExprKind::FormattedStr(parts) => {
            for part in parts {
                if let FStringPart::Expr(e) = part {
                    out.push(Node::Expr(e));
                }
            }
        }
        ExprKind::Conditional { test, body, orelse } => {
            out.push(Node::Expr(body));
            out.push(Node::Expr(test));
            out.push(Node::Expr(orelse));
        }
        ExprKind::Yield { value, .. } => out.extend(value.as_deref().map(Node::Expr)),
        ExprKind::Identifier(_)
        | ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::None => {}
    }
}

fn traverse<'a>(
    roots: Vec<Node<'a>>,
    children: impl Fn(&Node<'a>) -> Vec<Node<'a>>,
    mut visitor: impl FnMut(Node<'a>),
) {
    let mut stack = roots;
    stack.reverse();
    while let Some(node) = stack.pop() {
        visitor(node);
        let mut kids = children(&node);
        kids.reverse();
        stack.extend(kids);
    }
}

/// Pre-order depth-first traversal, calling `visitor` for `root` and every
/// descendant.
pub fn walk<'a>(root: Node<'a>, visitor: impl FnMut(Node<'a>)) {
    traverse(vec![root], Node::children, visitor);
}

/// All nodes of `kind` under `root` (inclusive), in traversal order.
#[must_use]
pub fn find_all(root: Node<'_>, kind: NodeKind) -> Vec<Node<'_>> {
    let mut found = Vec::new();
    walk(root, |node| {
        if node.kind() == kind {
            found.push(node);
        }
    });
    found
}

/// First node of `kind` under `root` (inclusive) in traversal order.
#[must_use]
pub fn find_first(root: Node<'_>, kind: NodeKind) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == kind {
            return Some(node);
        }
        let mut kids = node.children();
        kids.reverse();
        stack.extend(kids);
    }
    None
}

/// Pre-order traversal of `statements` that does not enter nested function
/// bodies.
pub fn walk_scope<'a>(statements: &'a [Stmt], visitor: impl FnMut(Node<'a>)) {
    traverse(
        statements.iter().map(Node::Stmt).collect(),
        Node::scope_children,
        visitor,
    );
}

/// A unit of intraprocedural analysis: module level code or one function body.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// The function owning this scope, `None` for module level.
    pub function: Option<&'a FunctionDef>,
    /// Statements of the scope.
    pub statements: &'a [Stmt],
}

impl<'a> Scope<'a> {
    /// Pre-order traversal of the scope.
    pub fn walk(&self, visitor: impl FnMut(Node<'a>)) {
        walk_scope(self.statements, visitor);
    }

    /// Nodes of the scope in traversal order.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node<'a>> {
        let mut nodes = Vec::new();
        self.walk(|n| nodes.push(n));
        nodes
    }
}

/// The module scope followed by every function body, in traversal order.
#[must_use]
pub fn function_scopes(program: &Program) -> Vec<Scope<'_>> {
    let mut scopes = vec![Scope {
        function: None,
        statements: &program.statements,
    }];
    for node in find_all(Node::Program(program), NodeKind::FunctionDef) {
        if let Some(Stmt {
            kind: StmtKind::FunctionDef(def),
            ..
        }) = node.as_stmt()
        {
            scopes.push(Scope {
                function: Some(def),
                statements: &def.body.statements,
            });
        }
    }
    scopes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lex_and_parse;

    fn parse(src: &str) -> Program {
        let (program, errors) = lex_and_parse(src, "test.py");
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
        program
    }

    #[test]
    fn test_walk_is_preorder() {
        let program = parse("x = a + b\n");
        let mut kinds = Vec::new();
        walk(Node::Program(&program), |n| kinds.push(n.kind()));
        assert_eq!(
            kinds,
            vec![
                NodeKind::Program,
                NodeKind::Assign,
                NodeKind::Identifier,
                NodeKind::Binary,
                NodeKind::Identifier,
                NodeKind::Identifier,
            ]
        );
    }

    #[test]
    fn test_find_all_in_source_order() {
        let program = parse("f(1)\nif x:\n    g(2)\nh(3)\n");
        let names: Vec<String> = find_all(Node::Program(&program), NodeKind::Call)
            .iter()
            .filter_map(|n| n.as_call().and_then(Call::callee))
            .collect();
        assert_eq!(names, vec!["f", "g", "h"]);
    }

    #[test]
    fn test_find_first() {
        let program = parse("a = 1\nreturn_value = g()\n");
        let first = find_first(Node::Program(&program), NodeKind::Call);
        assert_eq!(first.map(|n| n.span().line), Some(2));
        assert!(find_first(Node::Program(&program), NodeKind::Lambda).is_none());
    }

    #[test]
    fn test_find_all_includes_root() {
        let program = parse("pass\n");
        assert_eq!(find_all(Node::Program(&program), NodeKind::Program).len(), 1);
    }

    #[test]
    fn test_walk_scope_skips_nested_bodies() {
        let program = parse("@route('/x')\ndef f():\n    inner()\nouter()\n");
        let mut calls = Vec::new();
        walk_scope(&program.statements, |n| {
            if let Some(name) = n.as_call().and_then(Call::callee) {
                calls.push(name);
            }
        });
        assert_eq!(calls, vec!["route", "outer"]);
    }

    #[test]
    fn test_function_scopes() {
        let program = parse("def a():\n    def b():\n        pass\n    pass\nclass C:\n    def m(self):\n        pass\n");
        let names: Vec<Option<&str>> = function_scopes(&program)
            .iter()
            .map(|s| s.function.map(|f| f.name.as_str()))
            .collect();
        assert_eq!(names, vec![None, Some("a"), Some("b"), Some("m")]);
    }
}
