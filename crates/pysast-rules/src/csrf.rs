//! Rule to detect state-changing HTTP handlers without CSRF protection.
//!
//! # Rationale
//!
//! A handler that accepts `POST`, `PUT`, `PATCH` or `DELETE` requests must
//! verify a CSRF token, otherwise any site the user visits can submit
//! requests on their behalf.
//!
//! # Detected Patterns
//!
//! - `@app.route(..., methods=["POST"])`, `@app.post(...)`,
//!   `@api_view(["POST"])`, `@require_POST`, `@require_http_methods([...])`
//!   handlers with no protection marker
//! - view functions that branch on `request.method == "POST"`
//! - `app.add_url_rule(..., methods=["POST"])` registrations
//! - handlers decorated with `@csrf_exempt`
//!
//! Findings are warnings, raised to errors when the handler deletes or
//! updates data.
//!
//! # Allowed Patterns
//!
//! - module-level `CSRFProtect(app)` or `csrf.init_app(app)`
//! - `CsrfViewMiddleware` in the module
//! - `@csrf_protect`, or a `validate_csrf(...)`-style call in the handler
//!
//! # Configuration
//!
//! - `markers`: additional protection calls or decorators
//!
//! # Suppression
//!
//! - `# pysast: allow(csrf)` comment

use crate::common;
use pysast_core::ast::{
    walk_scope, BinaryOp, Call, Expr, ExprKind, FunctionDef, Node, NodeKind, Stmt, StmtKind,
};
use pysast_core::{find_all, Finding, Location, Program, Rule, RuleConfig, Severity};

/// Rule code for csrf.
pub const CODE: &str = "PS003";

/// Rule name for csrf.
pub const NAME: &str = "csrf";

/// HTTP methods that change server state.
const UNSAFE_METHODS: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];

/// Decorators named after the method they route.
const METHOD_DECORATORS: &[&str] = &["post", "put", "patch", "delete"];

/// Decorators taking a `methods=[...]` list.
const ROUTE_DECORATORS: &[&str] = &["route", "api_route", "add_url_rule"];

/// Decorators taking the method list as first argument.
const METHOD_LIST_DECORATORS: &[&str] = &["api_view", "require_http_methods"];

/// Calls and decorators that verify a CSRF token.
const DEFAULT_MARKERS: &[&str] = &[
    "csrf_protect",
    "validate_csrf",
    "verify_csrf",
    "check_csrf",
    "csrf.protect",
    "validate_on_submit",
];

/// Method calls that modify stored data.
const STATE_CHANGING_CALLS: &[&str] = &["delete", "update", "remove", "destroy", "drop", "insert"];

const EXEMPT_DECORATOR: &str = "csrf_exempt";

/// Detects HTTP handlers missing CSRF protection.
#[derive(Debug, Clone)]
pub struct Csrf {
    /// Protection markers.
    pub markers: Vec<String>,
    /// Severity of an unprotected handler.
    pub severity: Severity,
    /// Severity when the handler changes state.
    pub escalated_severity: Severity,
}

impl Default for Csrf {
    fn default() -> Self {
        Self::new()
    }
}

impl Csrf {
    /// Creates a new rule with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            markers: common::owned(DEFAULT_MARKERS),
            severity: Severity::Warning,
            escalated_severity: Severity::Error,
        }
    }

    /// Creates the rule with options from a `[rules.csrf]` table.
    #[must_use]
    pub fn from_config(config: &RuleConfig) -> Self {
        Self::new().markers(config.get_str_array("markers"))
    }

    /// Adds protection markers.
    #[must_use]
    pub fn markers(mut self, markers: Vec<String>) -> Self {
        common::extend_unique(&mut self.markers, markers);
        self
    }

    /// Sets the base severity level.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    fn is_marker(&self, expr: &Expr) -> bool {
        match expr.as_call() {
            Some(call) => common::matched_call(call, &self.markers).is_some(),
            None => expr
                .dotted_name()
                .is_some_and(|name| self.markers.iter().any(|m| common::callee_matches(&name, m))),
        }
    }

    /// True when the module installs CSRF protection for every view.
    fn module_protected(program: &Program) -> bool {
        let mut protected = false;
        walk_scope(&program.statements, |node| {
            if let Some(callee) = node.as_call().and_then(Call::callee) {
                protected |= common::last_segment(&callee) == "CSRFProtect"
                    || (callee.ends_with(".init_app") && callee.to_lowercase().contains("csrf"));
            }
            if let Some(text) = node.as_expr().and_then(Expr::as_str) {
                protected |= text.contains("CsrfViewMiddleware");
            }
        });
        protected
    }

    fn handler_protected(&self, def: &FunctionDef) -> bool {
        if def.decorators.iter().any(|d| self.is_marker(d)) {
            return true;
        }
        let mut protected = false;
        walk_scope(&def.body.statements, |node| {
            if let Some(call) = node.as_call() {
                protected |= common::matched_call(call, &self.markers).is_some();
            }
            if let Some(text) = node.as_expr().and_then(Expr::as_str) {
                protected |= text == "csrf_token" || text == "csrfmiddlewaretoken";
            }
        });
        protected
    }

    fn check_handler(&self, stmt: &Stmt, def: &FunctionDef, module_protected: bool, out: &mut Vec<Finding>) {
        let state_changing = changes_state(def);
        let severity = if state_changing {
            self.escalated_severity
        } else {
            self.severity
        };
        let suffix = if state_changing {
            " and modifies stored data"
        } else {
            ""
        };

        if def.decorators.iter().any(is_exempt) {
            out.push(handler_finding(
                stmt,
                severity,
                format!("Handler `{}` is exempt from CSRF protection{suffix}", def.name),
            ));
            return;
        }

        let Some(method) = unsafe_method(def) else {
            return;
        };
        if module_protected || self.handler_protected(def) {
            return;
        }
        out.push(handler_finding(
            stmt,
            severity,
            format!("Handler `{}` accepts {method} requests without CSRF protection{suffix}", def.name),
        ));
    }

    fn check_registrations(&self, program: &Program, out: &mut Vec<Finding>) {
        for node in find_all(Node::Program(program), NodeKind::ExprStmt) {
            let Some(Stmt {
                kind: StmtKind::Expr(expr),
                ..
            }) = node.as_stmt()
            else {
                continue;
            };
            let Some(call) = expr.as_call() else {
                continue;
            };
            if call.method_name() != Some("add_url_rule") {
                continue;
            }
            if let Some(method) = call.keyword("methods").and_then(first_unsafe_method) {
                out.push(self.finding(
                    &node.span(),
                    format!("URL rule accepts {method} requests without CSRF protection"),
                ));
            }
        }
    }
}

fn handler_finding(stmt: &Stmt, severity: Severity, message: String) -> Finding {
    Finding::new(NAME, CODE, severity, Location::from(&stmt.span), message)
}

fn is_exempt(decorator: &Expr) -> bool {
    let named = |expr: &Expr| {
        expr.dotted_name()
            .is_some_and(|name| common::last_segment(&name) == EXEMPT_DECORATOR)
    };
    match decorator.as_call() {
        // `@method_decorator(csrf_exempt)` as well as `@csrf_exempt()`
        Some(call) => named(call.func.as_ref()) || call.args.iter().any(|arg| named(&arg.value)),
        None => named(decorator),
    }
}

/// The first state-changing HTTP method the handler is routed for.
fn unsafe_method(def: &FunctionDef) -> Option<String> {
    def.decorators
        .iter()
        .find_map(decorator_method)
        .or_else(|| compared_method(def))
}

fn decorator_method(decorator: &Expr) -> Option<String> {
    let (name, call) = match decorator.as_call() {
        Some(call) => (call.callee()?, Some(call)),
        None => (decorator.dotted_name()?, None),
    };
    let name = common::last_segment(&name);
    if METHOD_DECORATORS.contains(&name) {
        return Some(name.to_uppercase());
    }
    if name == "require_POST" {
        return Some("POST".to_string());
    }
    let call = call?;
    if ROUTE_DECORATORS.contains(&name) {
        return call.keyword("methods").and_then(first_unsafe_method);
    }
    if METHOD_LIST_DECORATORS.contains(&name) {
        return call
            .positional(0)
            .or_else(|| call.keyword("http_method_names"))
            .and_then(first_unsafe_method);
    }
    None
}

fn first_unsafe_method(list: &Expr) -> Option<String> {
    let (ExprKind::List(items) | ExprKind::Tuple(items) | ExprKind::Set(items)) = &list.kind else {
        return None;
    };
    items
        .iter()
        .filter_map(Expr::as_str)
        .map(str::to_uppercase)
        .find(|method| UNSAFE_METHODS.contains(&method.as_str()))
}

/// `request.method == "POST"` inside the handler body.
fn compared_method(def: &FunctionDef) -> Option<String> {
    let mut method = None;
    walk_scope(&def.body.statements, |node| {
        if method.is_some() {
            return;
        }
        let Some(ExprKind::Binary {
            op: BinaryOp::Eq,
            left,
            right,
        }) = node.as_expr().map(|e| &e.kind)
        else {
            return;
        };
        let is_method = |e: &Expr| e.dotted_name().is_some_and(|n| n.ends_with("request.method"));
        let literal = if is_method(left) {
            right.as_str()
        } else if is_method(right) {
            left.as_str()
        } else {
            None
        };
        method = literal
            .map(str::to_uppercase)
            .filter(|m| UNSAFE_METHODS.contains(&m.as_str()));
    });
    method
}

fn changes_state(def: &FunctionDef) -> bool {
    let mut found = false;
    walk_scope(&def.body.statements, |node| {
        if let Some(call) = node.as_call() {
            found |= call
                .method_name()
                .is_some_and(|m| STATE_CHANGING_CALLS.contains(&m));
        }
    });
    found
}

impl Rule for Csrf {
    fn name(&self) -> &'static str {
        NAME
    }

    fn code(&self) -> &'static str {
        CODE
    }

    fn description(&self) -> &'static str {
        "Detects state-changing HTTP handlers without CSRF protection"
    }

    fn default_severity(&self) -> Severity {
        self.severity
    }

    fn check(&self, program: &Program) -> Vec<Finding> {
        let module_protected = Self::module_protected(program);
        let mut findings = Vec::new();
        for node in find_all(Node::Program(program), NodeKind::FunctionDef) {
            let Some(stmt) = node.as_stmt() else {
                continue;
            };
            if let StmtKind::FunctionDef(def) = &stmt.kind {
                self.check_handler(stmt, def, module_protected, &mut findings);
            }
        }
        if !module_protected {
            self.check_registrations(program, &mut findings);
        }
        findings.sort_by_key(Finding::line);
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pysast_core::lex_and_parse;

    fn check_code(code: &str) -> Vec<Finding> {
        let (program, errors) = lex_and_parse(code, "test.py");
        assert!(errors.is_empty(), "{errors:?}");
        Csrf::new().check(&program)
    }

    #[test]
    fn test_detects_unprotected_post_route() {
        let findings = check_code(
            r#"
@app.route("/profile", methods=["GET", "POST"])
def profile():
    return render_template("profile.html")
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line(), 2);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert!(findings[0].message.contains("POST"));
    }

    #[test]
    fn test_escalates_on_state_change() {
        let findings = check_code(
            r#"
@app.post("/users/<uid>/delete")
def delete_user(uid):
    User.query.filter_by(id=uid).delete()
    return redirect("/")
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
        assert!(findings[0].message.contains("modifies stored data"));
    }

    #[test]
    fn test_get_route_is_ignored() {
        let findings = check_code(
            r#"
@app.route("/")
def index():
    return "hello"
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_module_protection() {
        let findings = check_code(
            r#"
csrf = CSRFProtect(app)

@app.route("/save", methods=["POST"])
def save():
    record.update(request.form)
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_handler_marker() {
        let findings = check_code(
            r#"
@app.route("/save", methods=["POST"])
def save():
    validate_csrf(request.form.get("csrf_token"))
    return "ok"

@csrf_protect
@require_POST
def legacy(request):
    return "ok"
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_exempt_is_flagged_even_with_module_protection() {
        let findings = check_code(
            r#"
csrf.init_app(app)

@csrf_exempt
def webhook(request):
    return "ok"

class Hooks:
    @method_decorator(csrf_exempt)
    def dispatch(self, request):
        return "ok"
"#,
        );
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.message.contains("exempt")));
    }

    #[test]
    fn test_django_method_comparison() {
        let findings = check_code(
            r#"
def transfer(request):
    if request.method == "POST":
        account.update(balance=request.POST["amount"])
    return render(request, "transfer.html")
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
    }

    #[test]
    fn test_detects_url_rule_registration() {
        let findings = check_code(
            r#"app.add_url_rule("/upload", view_func=upload, methods=["PUT"])"#,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("PUT"));
    }

    #[test]
    fn test_custom_marker_from_config() {
        let config: RuleConfig = toml::from_str("markers = [\"check_origin\"]").unwrap();
        let (program, _) = lex_and_parse(
            "@app.post('/x')\ndef x():\n    check_origin(request)\n",
            "t.py",
        );
        assert!(Csrf::from_config(&config).check(&program).is_empty());
    }
}
