//! Declarative rule implementation.
//!
//! Interprets every `[[pattern-rule]]` entry against the AST.

use std::sync::Arc;

use crate::ast::{function_scopes, Program};
use crate::declarative::model::{DeclarativeConfig, PatternRuleSpec};
use crate::rule::Rule;
use crate::taint::TaintTracker;
use crate::types::{Finding, Location, Severity};

const PATTERN_RULE_NAME: &str = "pattern-rule";
const PATTERN_RULE_CODE: &str = "PSD001";

/// A per-file rule that enforces `[[pattern-rule]]` declarations.
///
/// Findings carry the entry's own name and code, so configuration and
/// suppressions address entries individually.
pub struct PatternRule {
    config: Arc<DeclarativeConfig>,
}

impl PatternRule {
    /// Creates a new pattern rule backed by the given config.
    #[must_use]
    pub fn new(config: Arc<DeclarativeConfig>) -> Self {
        Self { config }
    }
}

impl Rule for PatternRule {
    fn name(&self) -> &'static str {
        PATTERN_RULE_NAME
    }

    fn code(&self) -> &'static str {
        PATTERN_RULE_CODE
    }

    fn description(&self) -> &'static str {
        "Flag calls to configured sinks, optionally only with tainted arguments"
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, program: &Program) -> Vec<Finding> {
        let applicable = self.config.rules_for_path(&program.file);
        if applicable.is_empty() {
            return vec![];
        }

        let scopes = function_scopes(program);
        let mut findings = Vec::new();
        for spec in applicable {
            for scope in &scopes {
                check_scope(spec, scope, &mut findings);
            }
        }
        findings.sort_by_key(Finding::line);
        findings
    }
}

fn check_scope(spec: &PatternRuleSpec, scope: &crate::ast::Scope<'_>, out: &mut Vec<Finding>) {
    TaintTracker::scan(spec.taint(), scope, |node, tracker| {
        let Some(call) = node.as_call() else {
            return;
        };
        let Some(callee) = call.callee() else {
            return;
        };
        if !spec.is_sink(&callee) {
            return;
        }
        if spec.requires_taint() && !call.args.iter().any(|a| tracker.is_tainted(&a.value)) {
            return;
        }
        out.push(Finding::new(
            spec.name().as_str(),
            spec.code(),
            spec.severity(),
            Location::from(&node.span()),
            format!("{}: `{callee}`", spec.message()),
        ));
    });
}
