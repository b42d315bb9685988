//! Core types for findings and analysis results.

use crate::ast::Span;
use crate::parser::ParseError;
use crate::rule::RuleError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Severity level for findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message, does not fail analysis.
    Info,
    /// Weakness that should be reviewed.
    Warning,
    /// Vulnerability that must be fixed.
    Error,
}

impl Severity {
    /// Parses `error`, `warning` or `info` (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warning" | "warn" => Some(Self::Warning),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Source location of a finding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File path as given to the analyzer.
    #[serde(rename = "File")]
    pub file: PathBuf,
    /// Line number (1-indexed).
    #[serde(rename = "Line")]
    pub line: usize,
}

impl Location {
    /// Creates a new location.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl From<&Span> for Location {
    fn from(span: &Span) -> Self {
        Self::new(span.file.to_path_buf(), span.line)
    }
}

/// A security issue reported by a rule.
///
/// The serialized field names are part of the detailed JSON export and stay
/// stable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Finding {
    /// Name of the rule that produced the finding (e.g. `sql-injection`).
    #[serde(rename = "RuleID")]
    pub rule_id: String,
    /// Rule code (e.g. `PS001`).
    #[serde(rename = "Code")]
    pub code: String,
    /// Human-readable description.
    #[serde(rename = "Description")]
    pub message: String,
    /// Severity of this finding.
    #[serde(rename = "Severity")]
    pub severity: Severity,
    /// Where the issue was found.
    #[serde(rename = "Location")]
    pub location: Location,
    /// How to fix it.
    #[serde(rename = "Suggestion", default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    /// Creates a new finding.
    #[must_use]
    pub fn new(
        rule_id: impl Into<String>,
        code: impl Into<String>,
        severity: Severity,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            code: code.into(),
            message: message.into(),
            severity,
            location,
            suggestion: None,
        }
    }

    /// Adds a fix suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// File of the finding.
    #[must_use]
    pub fn file(&self) -> &std::path::Path {
        &self.location.file
    }

    /// Line of the finding.
    #[must_use]
    pub fn line(&self) -> usize {
        self.location.line
    }

    /// Formats the finding for terminal output.
    #[must_use]
    pub fn format(&self) -> String {
        use std::fmt::Write;
        let mut output = format!(
            "{} {} at {}:{}\n",
            self.code,
            self.rule_id,
            self.location.file.display(),
            self.location.line,
        );
        let _ = writeln!(output, "  {}: {}", self.severity, self.message);
        if let Some(suggestion) = &self.suggestion {
            let _ = writeln!(output, "  = help: {suggestion}");
        }
        output
    }
}

/// `<file>:<line>: <message>`, the text export line format.
impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {}",
            self.location.file.display(),
            self.location.line,
            self.message
        )
    }
}

/// Outcome of analyzing one file.
#[derive(Debug, Clone, Default)]
pub struct FileReport {
    /// Analyzed file.
    pub file: PathBuf,
    /// Syntax errors; the findings come from a partial tree when non-empty.
    pub parse_errors: Vec<ParseError>,
    /// Findings after configuration and suppressions were applied.
    pub findings: Vec<Finding>,
    /// Rules that failed internally while checking this file.
    pub rule_errors: Vec<RuleError>,
}

impl FileReport {
    /// True when the file parsed, every rule ran and nothing was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.parse_errors.is_empty() && self.findings.is_empty() && self.rule_errors.is_empty()
    }
}

/// A file that could not be analyzed at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// File that failed.
    pub path: PathBuf,
    /// Why it failed.
    pub message: String,
}

/// Aggregated result of analyzing a batch of files.
#[derive(Debug, Default)]
pub struct AnalysisResult {
    /// All findings, grouped by file in analysis order.
    pub findings: Vec<Finding>,
    /// All parse errors.
    pub parse_errors: Vec<ParseError>,
    /// All rule failures.
    pub rule_errors: Vec<RuleError>,
    /// Files that could not be read.
    pub failures: Vec<FileFailure>,
    /// Number of files analyzed (including failed ones).
    pub files_checked: usize,
}

impl AnalysisResult {
    /// Creates a new empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the outcome of one file.
    pub fn push_file(&mut self, report: FileReport) {
        self.files_checked += 1;
        self.findings.extend(report.findings);
        self.parse_errors.extend(report.parse_errors);
        self.rule_errors.extend(report.rule_errors);
    }

    /// Records a file that could not be analyzed.
    pub fn push_failure(&mut self, failure: FileFailure) {
        self.files_checked += 1;
        self.failures.push(failure);
    }

    /// Returns true if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    /// Returns true if there are any warnings or errors.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.findings.iter().any(|f| f.severity >= Severity::Warning)
    }

    /// Checks if any findings meet or exceed the given severity threshold.
    #[must_use]
    pub fn has_violations_at(&self, severity: Severity) -> bool {
        self.findings.iter().any(|f| f.severity >= severity)
    }

    /// Returns findings with exactly the given severity.
    #[must_use]
    pub fn by_severity(&self, severity: Severity) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .collect()
    }

    /// Counts findings as `(errors, warnings, infos)`.
    #[must_use]
    pub fn count_by_severity(&self) -> (usize, usize, usize) {
        self.findings
            .iter()
            .fold((0, 0, 0), |(e, w, i), f| match f.severity {
                Severity::Error => (e + 1, w, i),
                Severity::Warning => (e, w + 1, i),
                Severity::Info => (e, w, i + 1),
            })
    }

    /// Formats findings at or above `fail_on` as a multi-line report.
    #[must_use]
    pub fn format_report(&self, fail_on: Severity) -> String {
        use std::fmt::Write;

        let failing: Vec<&Finding> = self
            .findings
            .iter()
            .filter(|f| f.severity >= fail_on)
            .collect();

        let mut report = String::new();
        let _ = writeln!(report, "\n=== pysast: {} finding(s) ===\n", failing.len());

        for finding in &failing {
            report.push_str(&finding.format());
            report.push('\n');
        }

        for error in &self.parse_errors {
            let _ = writeln!(report, "parse error: {error}");
        }
        for error in &self.rule_errors {
            let _ = writeln!(report, "rule error: {error}");
        }
        for failure in &self.failures {
            let _ = writeln!(
                report,
                "unreadable: {}: {}",
                failure.path.display(),
                failure.message
            );
        }

        let (errors, warnings, infos) = self.count_by_severity();
        let _ = writeln!(
            report,
            "Total: {} error(s), {} warning(s), {} info(s) in {} file(s)",
            errors, warnings, infos, self.files_checked
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_finding(severity: Severity) -> Finding {
        Finding::new(
            "sql-injection",
            "PS001",
            severity,
            Location::new("app/db.py", 42),
            "Query built from untrusted input",
        )
    }

    #[test]
    fn finding_display_is_text_export_line() {
        assert_eq!(
            make_finding(Severity::Error).to_string(),
            "app/db.py:42: Query built from untrusted input"
        );
    }

    #[test]
    fn finding_format_includes_suggestion() {
        let f = make_finding(Severity::Error).with_suggestion("Use parameters");
        let formatted = f.format();
        assert!(formatted.starts_with("PS001 sql-injection at app/db.py:42"));
        assert!(formatted.contains("= help: Use parameters"));
    }

    #[test]
    fn finding_serializes_with_stable_field_names() {
        let json = serde_json::to_value(make_finding(Severity::Warning)).unwrap();
        assert_eq!(json["RuleID"], "sql-injection");
        assert_eq!(json["Description"], "Query built from untrusted input");
        assert_eq!(json["Severity"], "warning");
        assert_eq!(json["Location"]["File"], "app/db.py");
        assert_eq!(json["Location"]["Line"], 42);
        assert!(json.get("Suggestion").is_none());
    }

    #[test]
    fn severity_parse_and_order() {
        assert_eq!(Severity::parse("ERROR"), Some(Severity::Error));
        assert_eq!(Severity::parse("bogus"), None);
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn has_violations_at_threshold() {
        let mut result = AnalysisResult::new();
        result.findings.push(make_finding(Severity::Warning));
        assert!(!result.has_violations_at(Severity::Error));
        assert!(result.has_violations_at(Severity::Warning));
        assert!(!result.has_errors());
        assert!(result.has_warnings());
    }

    #[test]
    fn format_report_filters_by_severity() {
        let mut result = AnalysisResult::new();
        result.push_file(FileReport {
            file: "a.py".into(),
            findings: vec![make_finding(Severity::Warning), make_finding(Severity::Error)],
            ..FileReport::default()
        });

        let report = result.format_report(Severity::Error);
        assert!(report.contains("1 finding(s)"));
        assert!(report.contains("1 error(s), 1 warning(s), 0 info(s) in 1 file(s)"));
    }

    #[test]
    fn failures_count_as_checked_files() {
        let mut result = AnalysisResult::new();
        result.push_failure(FileFailure {
            path: "missing.py".into(),
            message: "not found".into(),
        });
        assert_eq!(result.files_checked, 1);
        assert!(result.format_report(Severity::Info).contains("unreadable: missing.py"));
    }
}
