//! Rule to detect cross-site scripting sinks.
//!
//! # Rationale
//!
//! User input written into an HTML response without escaping lets an
//! attacker inject markup and script into the page.
//!
//! # Detected Patterns
//!
//! - a value derived from `input()`, `request.GET`, `request.args`, ...
//!   reaching `print`, `render_template_string`, `mark_safe`, `Markup` or
//!   an `.innerHTML`/`.outerHTML` assignment in the same function
//! - HTML literals carrying inline `on*=` event handlers
//! - `<script>` literals calling `eval`, `setTimeout`, `document.write` or
//!   assigning `window.location`
//!
//! # Allowed Patterns
//!
//! - data passed through `html(...)`, `htmlspecialchars(...)`, `escape(...)`
//!   or `bleach.clean(...)` before reaching the sink
//!
//! # Configuration
//!
//! - `sources`, `sinks`, `sanitizers`: names added to the defaults
//!
//! # Suppression
//!
//! - `# pysast: allow(xss)` comment

use crate::common;
use once_cell::sync::Lazy;
use pysast_core::ast::{ExprKind, FStringPart, Node, NodeKind, StmtKind};
use pysast_core::{
    find_all, function_scopes, Finding, Program, Rule, RuleConfig, Severity, TaintConfig,
    TaintTracker,
};
use regex::Regex;

/// Rule code for xss.
pub const CODE: &str = "PS002";

/// Rule name for xss.
pub const NAME: &str = "xss";

/// Calls that write their arguments into a response.
const DEFAULT_SINKS: &[&str] = &[
    "print",
    "render_template_string",
    "mark_safe",
    "Markup",
    "HttpResponse",
    "make_response",
    "document.write",
    "response.write",
];

/// Calls that make data safe for HTML output.
const DEFAULT_SANITIZERS: &[&str] = &[
    "html",
    "htmlspecialchars",
    "escape",
    "bleach.clean",
    "conditional_escape",
    "strip_tags",
];

/// DOM properties that parse assigned strings as HTML.
const HTML_PROPERTIES: &[&str] = &["innerHTML", "outerHTML"];

static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| common::compile(r#"(?i)<[a-z][^>]*\son[a-z]+\s*=\s*["']?[^\s>]"#));

static DANGEROUS_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    common::compile(
        r"(?is)<script\b[^>]*>.*?(eval\s*\(|settimeout\s*\(|document\.write|window\.location)",
    )
});

/// Detects unescaped user input in HTML output.
#[derive(Debug, Clone)]
pub struct Xss {
    /// Taint sources and sanitizers.
    pub taint: TaintConfig,
    /// Output sinks.
    pub sinks: Vec<String>,
    /// Custom severity.
    pub severity: Severity,
}

impl Default for Xss {
    fn default() -> Self {
        Self::new()
    }
}

impl Xss {
    /// Creates a new rule with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            taint: TaintConfig::new(
                common::USER_INPUT_SOURCES.iter().copied(),
                DEFAULT_SANITIZERS.iter().copied(),
            ),
            sinks: common::owned(DEFAULT_SINKS),
            severity: Severity::Error,
        }
    }

    /// Creates the rule with options from a `[rules.xss]` table.
    #[must_use]
    pub fn from_config(config: &RuleConfig) -> Self {
        let mut rule = Self::new().sinks(config.get_str_array("sinks"));
        rule.taint = rule
            .taint
            .with_sources(config.get_str_array("sources"))
            .with_sanitizers(config.get_str_array("sanitizers"));
        rule
    }

    /// Adds output sinks.
    #[must_use]
    pub fn sinks(mut self, sinks: Vec<String>) -> Self {
        common::extend_unique(&mut self.sinks, sinks);
        self
    }

    /// Sets the severity level.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    fn check_flows(&self, program: &Program, out: &mut Vec<Finding>) {
        for scope in function_scopes(program) {
            TaintTracker::scan(&self.taint, &scope, |node, tracker| {
                if let Some(call) = node.as_call() {
                    let Some(sink) = common::matched_call(call, &self.sinks) else {
                        return;
                    };
                    if call.args.iter().any(|arg| tracker.is_tainted(&arg.value)) {
                        out.push(self.finding(
                            &node.span(),
                            format!("User input reaches `{sink}` without HTML escaping"),
                        ));
                    }
                    return;
                }

                let Some(StmtKind::Assign(assign)) = node.as_stmt().map(|s| &s.kind) else {
                    return;
                };
                let Some(value) = &assign.value else {
                    return;
                };
                for target in &assign.targets {
                    if let ExprKind::Attribute { attr, .. } = &target.kind {
                        if HTML_PROPERTIES.contains(&attr.as_str()) && tracker.is_tainted(value) {
                            out.push(self.finding(
                                &node.span(),
                                format!("User input assigned to `.{attr}` without HTML escaping"),
                            ));
                        }
                    }
                }
            });
        }
    }

    fn check_literals(&self, program: &Program, out: &mut Vec<Finding>) {
        let root = Node::Program(program);
        let literals = find_all(root, NodeKind::StringLiteral)
            .into_iter()
            .chain(find_all(root, NodeKind::FormattedStr));
        for node in literals {
            let Some(expr) = node.as_expr() else {
                continue;
            };
            let text = match &expr.kind {
                ExprKind::Str(s) => s.clone(),
                ExprKind::FormattedStr(parts) => parts
                    .iter()
                    .filter_map(|part| match part {
                        FStringPart::Literal(s) => Some(s.as_str()),
                        FStringPart::Expr(_) => None,
                    })
                    .collect(),
                _ => continue,
            };
            if EVENT_HANDLER.is_match(&text) {
                out.push(self.finding(&node.span(), "HTML literal carries an inline event handler attribute"));
            }
            if let Some(caps) = DANGEROUS_SCRIPT.captures(&text) {
                let call = caps.get(1).map_or("", |m| m.as_str()).trim_end_matches(['(', ' ']);
                out.push(self.finding(
                    &node.span(),
                    format!("Inline script uses `{call}`, which executes or redirects to dynamic content"),
                ));
            }
        }
    }
}

impl Rule for Xss {
    fn name(&self) -> &'static str {
        NAME
    }

    fn code(&self) -> &'static str {
        CODE
    }

    fn description(&self) -> &'static str {
        "Detects user input written to HTML output without escaping"
    }

    fn default_severity(&self) -> Severity {
        self.severity
    }

    fn check(&self, program: &Program) -> Vec<Finding> {
        let mut findings = Vec::new();
        self.check_flows(program, &mut findings);
        self.check_literals(program, &mut findings);
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
        Xss::new().check(&program)
    }

    #[test]
    fn test_detects_input_printed() {
        let findings = check_code("user = input()\nprint(user)\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, NAME);
        assert_eq!(findings[0].line(), 2);
    }

    #[test]
    fn test_allows_escaped_output() {
        assert!(check_code("user = input()\nprint(html(user))\n").is_empty());
        assert!(check_code("user = input()\nprint(htmlspecialchars(user))\n").is_empty());
    }

    #[test]
    fn test_detects_flask_template_string() {
        let findings = check_code(
            r#"
@app.route("/hello")
def hello():
    name = request.args.get("name", "")
    page = "<h1>Hello " + name + "</h1>"
    return render_template_string(page)
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line(), 6);
        assert!(findings[0].message.contains("render_template_string"));
    }

    #[test]
    fn test_escape_clears_taint() {
        let findings = check_code(
            r#"
def hello():
    name = escape(request.args["name"])
    return mark_safe("<b>" + name + "</b>")
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_detects_inner_html_assignment() {
        let findings = check_code(
            r#"
def show(element):
    comment = request.form["comment"]
    element.innerHTML = comment
    element.textContent = comment
"#,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains(".innerHTML"));
    }

    #[test]
    fn test_taint_does_not_cross_functions() {
        let findings = check_code(
            r#"
def read():
    data = input()

def write():
    print(data)
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_detects_event_handler_literal() {
        let findings = check_code(r#"banner = '<img src="x.png" onerror="steal()">'"#);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("event handler"));
    }

    #[test]
    fn test_detects_dangerous_script_literal() {
        let findings = check_code(
            r#"snippet = "<script>setTimeout('go()', 10); window.location = next</script>""#,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("setTimeout"));
    }

    #[test]
    fn test_plain_markup_is_fine() {
        assert!(check_code(r#"page = "<p class='note'>Saved</p><script src='app.js'></script>""#).is_empty());
    }

    #[test]
    fn test_extra_source_from_config() {
        let config: RuleConfig = toml::from_str("sources = [\"load_comment\"]").unwrap();
        let (program, _) = lex_and_parse("c = load_comment()\nprint(c)\n", "t.py");
        assert_eq!(Xss::from_config(&config).check(&program).len(), 1);
    }
}
