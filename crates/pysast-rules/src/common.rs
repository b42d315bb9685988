//! Helpers shared by the built-in rules: callee matching, assignment
//! resolution and static string inspection.

use pysast_core::ast::{Call, Expr, ExprKind, FStringPart, Stmt, StmtKind};
use pysast_core::Node;
use regex::Regex;
use std::collections::HashMap;
use tracing::trace;

/// Largest expression a binding keeps. Larger values are remembered as the
/// bare name, so `s = s + s` repeated cannot grow without bound.
const MAX_BOUND_NODES: usize = 256;

/// Compiles a pattern that is a compile-time constant of this crate.
#[allow(clippy::expect_used)]
pub(crate) fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid built-in regex")
}

/// Untrusted input in common web frameworks and the standard library.
pub(crate) const USER_INPUT_SOURCES: &[&str] = &[
    "input",
    "raw_input",
    "sys.argv",
    "request.GET",
    "request.POST",
    "request.args",
    "request.form",
    "request.values",
    "request.files",
    "request.json",
    "request.data",
    "request.cookies",
    "request.headers",
    "request.query_params",
    "request.get_json",
];

/// True when `callee` is `pattern` or ends with `.pattern`.
pub(crate) fn callee_matches(callee: &str, pattern: &str) -> bool {
    callee == pattern
        || callee
            .strip_suffix(pattern)
            .is_some_and(|rest| rest.ends_with('.'))
}

/// The display name of `call` when it matches one of `patterns`.
///
/// Calls on computed receivers (`db.cursor().execute`) have no dotted
/// callee; they match undotted patterns by method name.
pub(crate) fn matched_call<S: AsRef<str>>(call: &Call, patterns: &[S]) -> Option<String> {
    let callee = call.callee();
    let pattern = patterns.iter().map(AsRef::as_ref).find(|pattern| match &callee {
        Some(callee) => callee_matches(callee, pattern),
        None => !pattern.contains('.') && call.method_name() == Some(*pattern),
    })?;
    Some(callee.unwrap_or_else(|| pattern.to_string()))
}

/// Last dotted segment of a name.
pub(crate) fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Appends configured values that are not already present.
pub(crate) fn extend_unique(target: &mut Vec<String>, extra: Vec<String>) {
    for value in extra {
        if !target.contains(&value) {
            target.push(value);
        }
    }
}

/// Owned copies of a const name list.
pub(crate) fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

/// Most recent plain-name assignments seen while walking one scope.
///
/// Stored values have earlier bindings substituted in, so
/// `q = base + uid` remembers the text of `base` at that point.
#[derive(Debug, Default)]
pub(crate) struct Bindings<'a> {
    values: HashMap<String, Expr>,
    pending: Option<&'a Stmt>,
}

impl<'a> Bindings<'a> {
    /// Advances the bindings to `node`; call once per visited node, in
    /// traversal order.
    ///
    /// An assignment takes effect once its own subtree has been visited.
    pub(crate) fn step(&mut self, node: Node<'a>) {
        let Some(stmt) = node.as_stmt() else {
            return;
        };
        if let Some(previous) = self.pending.take() {
            self.observe(previous);
        }
        match &stmt.kind {
            StmtKind::Assign(_) => self.pending = Some(stmt),
            StmtKind::For { target, .. } => self.forget(target),
            _ => {}
        }
    }

    fn observe(&mut self, stmt: &Stmt) {
        let StmtKind::Assign(assign) = &stmt.kind else {
            return;
        };
        let Some(value) = &assign.value else {
            return;
        };
        for target in &assign.targets {
            let ExprKind::Identifier(name) = &target.kind else {
                self.forget(target);
                continue;
            };
            let previous = self.values.get(name).cloned();
            let resolved = match (assign.augmented, previous) {
                (Some(op), Some(previous)) => Expr::new(
                    value.span.clone(),
                    ExprKind::Binary {
                        op,
                        left: Box::new(previous),
                        right: Box::new(self.resolve(value)),
                    },
                ),
                (Some(_), None) => continue,
                (None, _) => self.resolve(value),
            };
            let resolved = if within_node_budget(&resolved) {
                resolved
            } else {
                trace!(name = %name, line = stmt.span.line, "binding too large, keeping name only");
                target.clone()
            };
            self.values.insert(name.clone(), resolved);
        }
    }

    fn forget(&mut self, target: &Expr) {
        match &target.kind {
            ExprKind::Identifier(name) => {
                self.values.remove(name);
            }
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    self.forget(item);
                }
            }
            ExprKind::Starred(inner) => self.forget(inner),
            _ => {}
        }
    }

    /// `expr` with bound names replaced by their assigned values inside
    /// string-building expressions.
    pub(crate) fn resolve(&self, expr: &Expr) -> Expr {
        let kind = match &expr.kind {
            ExprKind::Identifier(name) => match self.values.get(name) {
                Some(value) => return value.clone(),
                None => return expr.clone(),
            },
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op: *op,
                left: Box::new(self.resolve(left)),
                right: Box::new(self.resolve(right)),
            },
            ExprKind::FormattedStr(parts) => ExprKind::FormattedStr(
                parts
                    .iter()
                    .map(|part| match part {
                        FStringPart::Expr(inner) => FStringPart::Expr(self.resolve(inner)),
                        literal @ FStringPart::Literal(_) => literal.clone(),
                    })
                    .collect(),
            ),
            ExprKind::Call(call) if call.method_name() == Some("format") => {
                let mut call = call.clone();
                if let ExprKind::Attribute { value, .. } = &mut call.func.kind {
                    **value = self.resolve(value);
                }
                for arg in &mut call.args {
                    arg.value = self.resolve(&arg.value);
                }
                ExprKind::Call(call)
            }
            _ => return expr.clone(),
        };
        Expr::new(expr.span.clone(), kind)
    }
}

/// True when the string-building part of `expr` has at most
/// [`MAX_BOUND_NODES`] nodes.
fn within_node_budget(expr: &Expr) -> bool {
    fn consume(expr: &Expr, remaining: &mut usize) -> bool {
        let Some(rest) = remaining.checked_sub(1) else {
            return false;
        };
        *remaining = rest;
        match &expr.kind {
            ExprKind::Binary { left, right, .. } => consume(left, remaining) && consume(right, remaining),
            ExprKind::FormattedStr(parts) => parts.iter().all(|part| match part {
                FStringPart::Expr(inner) => consume(inner, remaining),
                FStringPart::Literal(_) => true,
            }),
            ExprKind::Call(call) if call.method_name() == Some("format") => {
                let receiver = match &call.func.kind {
                    ExprKind::Attribute { value, .. } => consume(value, remaining),
                    _ => true,
                };
                receiver && call.args.iter().all(|arg| consume(&arg.value, remaining))
            }
            _ => true,
        }
    }
    let mut remaining = MAX_BOUND_NODES;
    consume(expr, &mut remaining)
}

/// True when `expr` is built only from literals.
pub(crate) fn is_constant(expr: &Expr) -> bool {
    match &expr.kind {
        _ if expr.is_literal() => true,
        ExprKind::FormattedStr(parts) => parts.iter().all(|p| matches!(p, FStringPart::Literal(_))),
        ExprKind::Binary { left, right, .. } => is_constant(left) && is_constant(right),
        ExprKind::Tuple(items) | ExprKind::List(items) => items.iter().all(is_constant),
        ExprKind::Call(call) if call.method_name() == Some("format") => {
            let receiver_constant = match &call.func.kind {
                ExprKind::Attribute { value, .. } => is_constant(value),
                _ => false,
            };
            receiver_constant && call.args.iter().all(|a| is_constant(&a.value))
        }
        _ => false,
    }
}

/// True for expressions that assemble a string at runtime
/// (concatenation, `%`, f-strings, `.format`).
pub(crate) fn is_string_construction(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Binary { .. } => !expr.literal_text().is_empty(),
        ExprKind::FormattedStr(_) => true,
        ExprKind::Call(call) => call.method_name() == Some("format"),
        _ => false,
    }
}

/// The literal text a string expression is known to start with.
pub(crate) fn static_prefix(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Str(s) => s.clone(),
        ExprKind::FormattedStr(parts) => parts
            .iter()
            .map_while(|part| match part {
                FStringPart::Literal(s) => Some(s.as_str()),
                FStringPart::Expr(_) => None,
            })
            .collect(),
        ExprKind::Binary { left, right, .. } => {
            let mut prefix = static_prefix(left);
            if is_constant(left) {
                prefix.push_str(&static_prefix(right));
            }
            prefix
        }
        ExprKind::Call(call) if call.method_name() == Some("format") => match &call.func.kind {
            ExprKind::Attribute { value, .. } => {
                let template = static_prefix(value);
                template.split('{').next().unwrap_or_default().to_string()
            }
            _ => String::new(),
        },
        _ => String::new(),
    }
}
