//! Rule trait for defining security checks.

use crate::ast::{Program, Span};
use crate::types::{Finding, Location, Severity};

/// A security check over one parsed [`Program`].
///
/// Rules are pure functions of the tree: they must not mutate shared state
/// or perform I/O, since the engine runs them concurrently over the same
/// program.
///
/// # Example
///
/// ```ignore
/// use pysast_core::{Finding, Program, Rule};
///
/// pub struct NoExec;
///
/// impl Rule for NoExec {
///     fn name(&self) -> &'static str { "no-exec" }
///     fn code(&self) -> &'static str { "PS900" }
///
///     fn check(&self, program: &Program) -> Vec<Finding> {
///         // query the tree with find_all / walk ...
///         vec![]
///     }
/// }
/// ```
pub trait Rule: Send + Sync {
    /// Returns the kebab-case name of this rule (e.g., "sql-injection").
    fn name(&self) -> &'static str;

    /// Returns the rule code (e.g., "PS001").
    fn code(&self) -> &'static str;

    /// Returns a brief description of what this rule checks.
    fn description(&self) -> &'static str {
        ""
    }

    /// Returns the default severity for findings from this rule.
    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    /// Checks a program and returns any findings, in emission order.
    fn check(&self, program: &Program) -> Vec<Finding>;

    /// Builds a finding of this rule at `span` with the default severity.
    fn finding(&self, span: &Span, message: impl Into<String>) -> Finding
    where
        Self: Sized,
    {
        Finding::new(
            self.name(),
            self.code(),
            self.default_severity(),
            Location::from(span),
            message,
        )
    }
}

/// Type alias for boxed Rule trait objects.
pub type RuleBox = Box<dyn Rule>;

/// A rule that failed internally; the other rules are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rule `{rule}` failed: {message}")]
pub struct RuleError {
    /// Name of the failing rule.
    pub rule: String,
    /// Failure description.
    pub message: String,
}
