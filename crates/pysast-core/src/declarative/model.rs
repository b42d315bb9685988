//! Pure domain model for declarative pattern rules.
//!
//! This module contains no serde and no I/O dependencies.
//! All invariants are enforced at construction time via validated newtypes.

use crate::taint::TaintConfig;
use crate::types::Severity;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

// ────────────────────────────────────────────
// Newtypes with validation
// ────────────────────────────────────────────

/// A validated rule name (non-empty, `[a-z0-9-]` only).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleName(String);

impl RuleName {
    /// Creates a new rule name.
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or contains invalid characters.
    pub fn new(name: &str) -> Result<Self, ModelError> {
        if name.is_empty() {
            return Err(ModelError::EmptyRuleName);
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ModelError::InvalidRuleName {
                name: name.to_string(),
            });
        }
        Ok(Self(name.to_string()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated glob pattern for file path matching.
///
/// The glob is compiled once at construction and reused for all match calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    raw: String,
    compiled: glob::Pattern,
}

impl GlobPattern {
    /// Creates a new glob pattern.
    ///
    /// # Errors
    ///
    /// Returns error if the pattern is empty or has invalid glob syntax.
    pub fn new(pattern: &str) -> Result<Self, ModelError> {
        if pattern.is_empty() {
            return Err(ModelError::EmptyGlobPattern);
        }
        let compiled = glob::Pattern::new(pattern).map_err(|e| ModelError::InvalidGlobPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            compiled,
        })
    }

    /// Tests whether a file path matches this pattern.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        let path_str = path_str.strip_prefix("./").unwrap_or(&path_str);
        if self.compiled.matches(path_str) {
            return true;
        }
        // `dir/**` also covers files directly below `dir`.
        self.raw.strip_suffix("/**").is_some_and(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            path_str.starts_with(prefix)
                && path_str.as_bytes().get(prefix.len()) == Some(&b'/')
        })
    }

    /// Returns the pattern as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// A validated dotted callee name such as `pickle.loads`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallPattern(String);

impl CallPattern {
    /// Creates a new call pattern.
    ///
    /// # Errors
    ///
    /// Returns error if the pattern is empty or has an empty segment.
    pub fn new(pattern: &str) -> Result<Self, ModelError> {
        if pattern.is_empty() {
            return Err(ModelError::EmptyCallPattern);
        }
        let valid = pattern.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '*')
        });
        if !valid {
            return Err(ModelError::InvalidCallPattern {
                pattern: pattern.to_string(),
            });
        }
        Ok(Self(pattern.to_string()))
    }

    /// Tests whether a dotted callee matches.
    ///
    /// `obj.method` also matches longer receivers (`self.obj.method`), and a
    /// leading `*` segment matches any receiver (`*.execute`).
    #[must_use]
    pub fn matches(&self, callee: &str) -> bool {
        if let Some(method) = self.0.strip_prefix("*.") {
            return callee == method
                || callee
                    .strip_suffix(method)
                    .is_some_and(|rest| rest.ends_with('.'));
        }
        callee == self.0
            || callee
                .strip_suffix(self.0.as_str())
                .is_some_and(|rest| rest.ends_with('.') && self.0.contains('.'))
    }

    /// Returns the pattern as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ────────────────────────────────────────────
// Domain entities
// ────────────────────────────────────────────

/// One declarative pattern rule.
#[derive(Debug, Clone)]
pub struct PatternRuleSpec {
    name: RuleName,
    code: String,
    sinks: Vec<CallPattern>,
    taint: TaintConfig,
    files: Vec<GlobPattern>,
    message: String,
    severity: Severity,
}

impl PatternRuleSpec {
    /// Creates a new pattern rule.
    #[must_use]
    pub fn new(
        name: RuleName,
        code: String,
        sinks: Vec<CallPattern>,
        taint: TaintConfig,
        files: Vec<GlobPattern>,
        message: String,
        severity: Severity,
    ) -> Self {
        Self {
            name,
            code,
            sinks,
            taint,
            files,
            message,
            severity,
        }
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &RuleName {
        &self.name
    }

    /// Returns the rule code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the sink patterns.
    #[must_use]
    pub fn sinks(&self) -> &[CallPattern] {
        &self.sinks
    }

    /// Returns the taint configuration.
    #[must_use]
    pub fn taint(&self) -> &TaintConfig {
        &self.taint
    }

    /// True when only tainted sink calls are flagged.
    #[must_use]
    pub fn requires_taint(&self) -> bool {
        !self.taint.sources().is_empty()
    }

    /// Returns the finding message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the severity.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// True when the callee matches a sink.
    #[must_use]
    pub fn is_sink(&self, callee: &str) -> bool {
        self.sinks.iter().any(|s| s.matches(callee))
    }

    /// True when the rule applies to `path`; no globs means every file.
    #[must_use]
    pub fn applies_to(&self, path: &Path) -> bool {
        self.files.is_empty() || self.files.iter().any(|g| g.matches(path))
    }
}

// ────────────────────────────────────────────
// Aggregate root
// ────────────────────────────────────────────

/// Validated declarative configuration.
#[derive(Debug, Clone, Default)]
pub struct DeclarativeConfig {
    pattern_rules: Vec<PatternRuleSpec>,
}

impl DeclarativeConfig {
    /// Creates a new declarative config, rejecting duplicate rule names.
    ///
    /// # Errors
    ///
    /// Returns every duplicate name found.
    pub fn new(pattern_rules: Vec<PatternRuleSpec>) -> Result<Self, Vec<ModelError>> {
        let mut seen = HashSet::new();
        let errors: Vec<ModelError> = pattern_rules
            .iter()
            .filter(|rule| !seen.insert(rule.name.clone()))
            .map(|rule| ModelError::DuplicateRule {
                name: rule.name.clone(),
            })
            .collect();

        if errors.is_empty() {
            Ok(Self { pattern_rules })
        } else {
            Err(errors)
        }
    }

    /// Creates an empty declarative config.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if no declarative rules are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pattern_rules.is_empty()
    }

    /// Returns all pattern rules.
    #[must_use]
    pub fn pattern_rules(&self) -> &[PatternRuleSpec] {
        &self.pattern_rules
    }

    /// Pattern rules applying to `path`.
    #[must_use]
    pub fn rules_for_path(&self, path: &Path) -> Vec<&PatternRuleSpec> {
        self.pattern_rules
            .iter()
            .filter(|r| r.applies_to(path))
            .collect()
    }
}

// ────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────

/// Errors in domain model construction.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// Rule name is empty.
    #[error("rule name must not be empty")]
    EmptyRuleName,

    /// Rule name contains invalid characters.
    #[error("invalid rule name `{name}`: must be [a-z0-9-]")]
    InvalidRuleName {
        /// The invalid name.
        name: String,
    },

    /// Glob pattern is empty.
    #[error("glob pattern must not be empty")]
    EmptyGlobPattern,

    /// Glob pattern has invalid syntax.
    #[error("invalid glob pattern `{pattern}`: {reason}")]
    InvalidGlobPattern {
        /// The invalid pattern.
        pattern: String,
        /// Why it's invalid.
        reason: String,
    },

    /// Call pattern is empty.
    #[error("call pattern must not be empty")]
    EmptyCallPattern,

    /// Call pattern is not a dotted name.
    #[error("invalid call pattern `{pattern}`: expected a dotted name like `pickle.loads`")]
    InvalidCallPattern {
        /// The invalid pattern.
        pattern: String,
    },

    /// A pattern rule has no sinks.
    #[error("at least one sink is required")]
    NoSinks,

    /// Two rules share a name.
    #[error("duplicate pattern rule `{name}`")]
    DuplicateRule {
        /// The repeated name.
        name: RuleName,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- RuleName --

    #[test]
    fn rule_name_valid() {
        assert_eq!(RuleName::new("no-pickle-2").unwrap().as_str(), "no-pickle-2");
    }

    #[test]
    fn rule_name_rejects_invalid() {
        assert!(matches!(RuleName::new(""), Err(ModelError::EmptyRuleName)));
        assert!(matches!(
            RuleName::new("No_Pickle"),
            Err(ModelError::InvalidRuleName { .. })
        ));
    }

    // -- GlobPattern --

    #[test]
    fn glob_matches_paths() {
        let glob = GlobPattern::new("app/**").unwrap();
        assert!(glob.matches(Path::new("app/views.py")));
        assert!(glob.matches(Path::new("./app/api/users.py")));
        assert!(!glob.matches(Path::new("tests/test_app.py")));
    }

    #[test]
    fn glob_rejects_invalid() {
        assert!(matches!(GlobPattern::new(""), Err(ModelError::EmptyGlobPattern)));
        assert!(matches!(
            GlobPattern::new("app/[**"),
            Err(ModelError::InvalidGlobPattern { .. })
        ));
    }

    // -- CallPattern --

    #[test]
    fn call_pattern_matching() {
        let exact = CallPattern::new("pickle.loads").unwrap();
        assert!(exact.matches("pickle.loads"));
        assert!(exact.matches("self.pickle.loads"));
        assert!(!exact.matches("cpickle.loads"));

        let bare = CallPattern::new("eval").unwrap();
        assert!(bare.matches("eval"));
        assert!(!bare.matches("obj.eval"));

        let any = CallPattern::new("*.execute").unwrap();
        assert!(any.matches("cursor.execute"));
        assert!(any.matches("execute"));
        assert!(!any.matches("cursor.executemany"));
    }

    #[test]
    fn call_pattern_rejects_invalid() {
        assert!(matches!(CallPattern::new(""), Err(ModelError::EmptyCallPattern)));
        assert!(matches!(
            CallPattern::new("pickle..loads"),
            Err(ModelError::InvalidCallPattern { .. })
        ));
        assert!(matches!(
            CallPattern::new("os.system()"),
            Err(ModelError::InvalidCallPattern { .. })
        ));
    }

    // -- DeclarativeConfig --

    fn spec(name: &str, files: &[&str]) -> PatternRuleSpec {
        PatternRuleSpec::new(
            RuleName::new(name).unwrap(),
            "PSD001".into(),
            vec![CallPattern::new("eval").unwrap()],
            TaintConfig::default(),
            files.iter().map(|f| GlobPattern::new(f).unwrap()).collect(),
            "msg".into(),
            Severity::Error,
        )
    }

    #[test]
    fn config_rejects_duplicates() {
        let errors = DeclarativeConfig::new(vec![spec("a", &[]), spec("a", &[])]).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ModelError::DuplicateRule { .. }));
    }

    #[test]
    fn config_filters_by_path() {
        let config = DeclarativeConfig::new(vec![spec("a", &[]), spec("b", &["web/**"])]).unwrap();
        assert_eq!(config.rules_for_path(Path::new("web/app.py")).len(), 2);
        assert_eq!(config.rules_for_path(Path::new("cli.py")).len(), 1);
        assert!(!config.pattern_rules()[0].requires_taint());
    }
}
