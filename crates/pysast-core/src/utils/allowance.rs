//! Comment-based suppression directives.
//!
//! Supports directives like:
//! ```text
//! cursor.execute(query)  # pysast: allow(sql-injection) reason="query is static"
//! ```
//!
//! A directive applies to findings on its own line and on the line below.

use std::collections::{HashMap, HashSet};

/// Result of checking for an allow directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowCheck {
    /// Rule is not allowed.
    Denied,
    /// Rule is allowed with optional reason.
    Allowed {
        /// The reason provided (if any).
        reason: Option<String>,
    },
}

impl AllowCheck {
    /// Returns true if allowed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Returns the reason if allowed.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed { reason } => reason.as_deref(),
            Self::Denied => None,
        }
    }
}

/// Parsed allowance directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowDirective {
    /// Rule names that are allowed; `all` matches every rule.
    pub rules: HashSet<String>,
    /// Optional reason for the allowance.
    pub reason: Option<String>,
}

impl AllowDirective {
    fn allows(&self, rule_name: &str) -> bool {
        self.rules.contains(rule_name) || self.rules.contains("all")
    }
}

/// Directives of one source file indexed by line.
#[derive(Debug, Clone, Default)]
pub struct Suppressions {
    directives: HashMap<usize, AllowDirective>,
}

impl Suppressions {
    /// Scans `source` for directives.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let directives = source
            .lines()
            .enumerate()
            .filter_map(|(index, line)| parse_allow_directive(line).map(|d| (index + 1, d)))
            .collect();
        Self { directives }
    }

    /// True when the file has no directives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Checks whether `rule_name` is allowed on `line` (1-indexed).
    #[must_use]
    pub fn check(&self, line: usize, rule_name: &str) -> AllowCheck {
        for candidate in [line, line.saturating_sub(1)] {
            if candidate == 0 {
                continue;
            }
            if let Some(directive) = self.directives.get(&candidate) {
                if directive.allows(rule_name) {
                    return AllowCheck::Allowed {
                        reason: directive.reason.clone(),
                    };
                }
            }
        }
        AllowCheck::Denied
    }
}

/// Checks source code for a directive covering `rule_name` on `line`.
#[must_use]
pub fn check_allow_with_reason(content: &str, line: usize, rule_name: &str) -> AllowCheck {
    Suppressions::parse(content).check(line, rule_name)
}

/// Parses an allowance directive from a source line, which may carry code
/// before the comment.
fn parse_allow_directive(line: &str) -> Option<AllowDirective> {
    let start = line.find("# pysast:").or_else(|| line.find("#pysast:"))?;
    let comment = line[start + 1..].trim_start();

    let directive = comment.strip_prefix("pysast:")?.trim();
    let allow_content = directive.strip_prefix("allow(")?.trim();

    let paren_end = allow_content.find(')')?;
    let rules: HashSet<String> = allow_content[..paren_end]
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if rules.is_empty() {
        return None;
    }

    let rest = allow_content[paren_end + 1..].trim();
    let reason = rest
        .strip_prefix("reason=")
        .map(str::trim)
        .and_then(|r| r.strip_prefix('"'))
        .and_then(|r| r.find('"').map(|end| r[..end].to_string()));

    Some(AllowDirective { rules, reason })
}
