//! TOML deserialization types (DTO layer).
//!
//! These types exist solely for serde deserialization.
//! They are converted to domain model types via the loader.

use serde::Deserialize;

/// Raw TOML representation of declarative rules.
///
/// Extends the base `Config` with `[[pattern-rule]]` sections; every other
/// key of the document is ignored here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeclarativeConfigDto {
    /// Pattern rules.
    #[serde(rename = "pattern-rule", default)]
    pub pattern_rules: Vec<PatternRuleDto>,
}

/// TOML representation of a pattern rule.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternRuleDto {
    /// Rule name (e.g., "no-pickle-loads").
    pub name: String,
    /// Dotted callee names that are flagged (e.g., "pickle.loads").
    pub sinks: Vec<String>,
    /// Taint sources; when set, only tainted sink calls are flagged.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Calls that clear taint.
    #[serde(default)]
    pub sanitizers: Vec<String>,
    /// File globs restricting where the rule applies.
    #[serde(default)]
    pub files: Option<Vec<String>>,
    /// Finding message.
    pub message: String,
    /// Severity (default: "error").
    #[serde(default = "default_severity_str")]
    pub severity: String,
    /// Rule code (default: "PSD001").
    #[serde(default)]
    pub code: Option<String>,
}

fn default_severity_str() -> String {
    "error".to_string()
}
