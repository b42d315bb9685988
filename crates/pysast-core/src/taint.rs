//! Intraprocedural forward taint propagation.
//!
//! A [`TaintTracker`] follows assignments through one [`Scope`] in source
//! order. A name becomes tainted when it is assigned a value derived from a
//! configured source, and clean again when it is reassigned an untainted
//! value. Passing data through a sanitizer call yields an untainted value.

use crate::ast::{Expr, ExprKind, Node, Scope, Stmt, StmtKind};
use std::collections::HashSet;

/// Source and sanitizer names driving a [`TaintTracker`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaintConfig {
    sources: Vec<String>,
    sanitizers: Vec<String>,
}

impl TaintConfig {
    /// Creates a configuration from dotted source and sanitizer names.
    #[must_use]
    pub fn new<S, T>(sources: S, sanitizers: T) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            sanitizers: sanitizers.into_iter().map(Into::into).collect(),
        }
    }

    /// Adds more sources.
    #[must_use]
    pub fn with_sources(mut self, extra: impl IntoIterator<Item = String>) -> Self {
        self.sources.extend(extra);
        self
    }

    /// Adds more sanitizers.
    #[must_use]
    pub fn with_sanitizers(mut self, extra: impl IntoIterator<Item = String>) -> Self {
        self.sanitizers.extend(extra);
        self
    }

    /// Configured sources.
    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// True when `name` is a source or a member of one
    /// (`request.args.get` matches `request.args`).
    #[must_use]
    pub fn is_source(&self, name: &str) -> bool {
        self.sources.iter().any(|source| {
            name == source
                || name
                    .strip_prefix(source.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// True when `name` is a sanitizer, either exactly or as the last
    /// segment of a dotted path.
    #[must_use]
    pub fn is_sanitizer(&self, name: &str) -> bool {
        self.sanitizers.iter().any(|sanitizer| {
            name == sanitizer
                || name
                    .strip_suffix(sanitizer.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }
}

/// Taint state of one scope.
#[derive(Debug, Clone)]
pub struct TaintTracker<'c> {
    config: &'c TaintConfig,
    tainted: HashSet<String>,
}

impl<'c> TaintTracker<'c> {
    /// Creates a tracker with no tainted names.
    #[must_use]
    pub fn new(config: &'c TaintConfig) -> Self {
        Self {
            config,
            tainted: HashSet::new(),
        }
    }

    /// Walks `scope` in source order, calling `visit` for every node with the
    /// taint state in effect at that point.
    pub fn scan<'a>(
        config: &'c TaintConfig,
        scope: &Scope<'a>,
        mut visit: impl FnMut(Node<'a>, &TaintTracker<'c>),
    ) {
        let mut tracker = Self::new(config);
        scope.walk(|node| {
            visit(node, &tracker);
            if let Some(stmt) = node.as_stmt() {
                tracker.observe(stmt);
            }
        });
    }

    /// True when `name` (a plain or dotted name) currently holds tainted data.
    #[must_use]
    pub fn is_name_tainted(&self, name: &str) -> bool {
        self.tainted.contains(name)
    }

    /// True when the value of `expr` may derive from a source.
    #[must_use]
    pub fn is_tainted(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Identifier(name) => {
                self.tainted.contains(name) || self.config.is_source(name)
            }
            ExprKind::Attribute { value, .. } => {
                let by_name = expr
                    .dotted_name()
                    .is_some_and(|name| self.tainted.contains(&name) || self.config.is_source(&name));
                by_name || self.is_tainted(value)
            }
            ExprKind::Subscript { value, .. } => self.is_tainted(value),
            ExprKind::Call(call) => {
                if let Some(callee) = call.callee() {
                    if self.config.is_sanitizer(&callee) {
                        return false;
                    }
                    if self.config.is_source(&callee) {
                        return true;
                    }
                }
                if let ExprKind::Attribute { value, .. } = &call.func.kind {
                    if self.is_tainted(value) {
                        return true;
                    }
                }
                call.args.iter().any(|arg| self.is_tainted(&arg.value))
            }
            ExprKind::Lambda { .. } | ExprKind::Yield { .. } => false,
            _ if expr.is_literal() => false,
            _ => Node::Expr(expr)
                .children()
                .iter()
                .filter_map(Node::as_expr)
                .any(|child| self.is_tainted(child)),
        }
    }

    /// Applies the effect of `stmt` on the taint state.
    pub fn observe(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assign(assign) => {
                let Some(value) = &assign.value else {
                    return;
                };
                let tainted = self.is_tainted(value);
                for target in &assign.targets {
                    if assign.augmented.is_some() {
                        if tainted {
                            self.bind(target, true);
                        }
                    } else {
                        self.bind(target, tainted);
                    }
                }
            }
            StmtKind::For { target, iter, .. } => {
                let tainted = self.is_tainted(iter);
                self.bind(target, tainted);
            }
            StmtKind::With { items, .. } => {
                for item in items {
                    if let Some(target) = &item.target {
                        let tainted = self.is_tainted(&item.context);
                        self.bind(target, tainted);
                    }
                }
            }
            _ => {}
        }
    }

    fn bind(&mut self, target: &Expr, tainted: bool) {
        match &target.kind {
            ExprKind::Identifier(_) | ExprKind::Attribute { .. } => {
                if let Some(name) = target.dotted_name() {
                    if tainted {
                        self.tainted.insert(name);
                    } else {
                        self.tainted.remove(&name);
                    }
                }
            }
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    self.bind(item, tainted);
                }
            }
            ExprKind::Starred(inner) => self.bind(inner, tainted),
            // Writing into a container taints it but never cleans it.
            ExprKind::Subscript { value, .. } if tainted => self.bind(value, true),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::function_scopes;
    use crate::parser::lex_and_parse;

    fn config() -> TaintConfig {
        TaintConfig::new(["input", "request.args", "request.GET"], ["html", "escape"])
    }

    /// Names passed to `sink(...)` that are tainted at the call.
    fn tainted_sinks(src: &str) -> Vec<usize> {
        let (program, errors) = lex_and_parse(src, "t.py");
        assert!(errors.is_empty(), "{errors:?}");
        let config = config();
        let mut lines = Vec::new();
        for scope in function_scopes(&program) {
            TaintTracker::scan(&config, &scope, |node, tracker| {
                if let Some(call) = node.as_call() {
                    if call.callee().as_deref() == Some("sink")
                        && call.args.iter().any(|a| tracker.is_tainted(&a.value))
                    {
                        lines.push(node.span().line);
                    }
                }
            });
        }
        lines
    }

    #[test]
    fn test_assignment_propagates() {
        assert_eq!(tainted_sinks("a = input()\nb = a + '!'\nsink(b)\n"), vec![3]);
    }

    #[test]
    fn test_sanitizer_clears() {
        assert!(tainted_sinks("a = input()\nsink(html(a))\n").is_empty());
        assert!(tainted_sinks("a = input()\na = escape(a)\nsink(a)\n").is_empty());
    }

    #[test]
    fn test_source_prefix_and_methods() {
        assert_eq!(tainted_sinks("q = request.args.get('q')\nsink(q.strip())\n"), vec![2]);
    }

    #[test]
    fn test_for_and_fstring() {
        assert_eq!(
            tainted_sinks("for item in request.GET:\n    sink(f'<p>{item}</p>')\n"),
            vec![2]
        );
    }

    #[test]
    fn test_scopes_are_independent() {
        let src = "def a():\n    x = input()\ndef b():\n    sink(x)\n";
        assert!(tainted_sinks(src).is_empty());
    }

    #[test]
    fn test_reassignment_untaints() {
        assert!(tainted_sinks("x = input()\nx = 'safe'\nsink(x)\n").is_empty());
    }

    #[test]
    fn test_matching_rules() {
        let config = config();
        assert!(config.is_source("request.args.get"));
        assert!(!config.is_source("request.argsx"));
        assert!(config.is_sanitizer("markupsafe.escape"));
        assert!(!config.is_sanitizer("unescape"));
    }
}
