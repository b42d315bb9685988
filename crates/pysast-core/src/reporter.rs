//! Thread-safe collection of findings with query and export operations.

use crate::types::{Finding, Location, Severity};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Rule id recorded for findings added through [`Reporter::add_issue`].
pub const ADHOC_RULE: &str = "adhoc";

/// Lock-guarded sink for findings produced by concurrently running rules.
///
/// Every append takes the lock once, so findings are never lost or
/// duplicated, and a batch added with [`Reporter::extend`] stays contiguous.
/// Read operations return snapshots taken under the same lock.
#[derive(Debug, Default)]
pub struct Reporter {
    issues: Mutex<Vec<Finding>>,
}

#[derive(Serialize)]
struct PlainIssue<'a> {
    #[serde(rename = "File")]
    file: &'a Path,
    #[serde(rename = "Line")]
    line: usize,
    #[serde(rename = "Message")]
    message: &'a str,
}

impl Reporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Finding>> {
        // A panicking writer cannot leave the vector half-updated.
        self.issues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a bare issue as a warning under the `adhoc` rule id.
    pub fn add_issue(&self, file: impl Into<PathBuf>, line: usize, message: impl Into<String>) {
        let finding = Finding::new(
            ADHOC_RULE,
            "",
            Severity::Warning,
            Location::new(file, line),
            message,
        );
        self.add(finding);
    }

    /// Records one finding.
    pub fn add(&self, finding: Finding) {
        self.lock().push(finding);
    }

    /// Records a batch of findings contiguously, preserving their order.
    pub fn extend(&self, findings: impl IntoIterator<Item = Finding>) {
        let findings: Vec<Finding> = findings.into_iter().collect();
        if findings.is_empty() {
            return;
        }
        self.lock().extend(findings);
    }

    /// Snapshot of all findings.
    #[must_use]
    pub fn issues(&self) -> Vec<Finding> {
        self.lock().clone()
    }

    /// Findings in `file`.
    #[must_use]
    pub fn by_file(&self, file: impl AsRef<Path>) -> Vec<Finding> {
        let file = file.as_ref();
        self.select(|f| f.location.file == file)
    }

    /// Findings on `line` of any file.
    #[must_use]
    pub fn by_line(&self, line: usize) -> Vec<Finding> {
        self.select(|f| f.location.line == line)
    }

    /// Findings whose message contains `needle`.
    #[must_use]
    pub fn by_message_substring(&self, needle: &str) -> Vec<Finding> {
        self.select(|f| f.message.contains(needle))
    }

    /// Findings produced by `rule_id`.
    #[must_use]
    pub fn by_rule(&self, rule_id: &str) -> Vec<Finding> {
        self.select(|f| f.rule_id == rule_id)
    }

    fn select(&self, predicate: impl Fn(&Finding) -> bool) -> Vec<Finding> {
        self.lock().iter().filter(|f| predicate(f)).cloned().collect()
    }

    /// Number of findings.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes all findings.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Removes and returns all findings.
    #[must_use]
    pub fn take(&self) -> Vec<Finding> {
        std::mem::take(&mut *self.lock())
    }

    /// New reporter holding the findings that satisfy `predicate`.
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&Finding) -> bool) -> Self {
        Self {
            issues: Mutex::new(self.select(predicate)),
        }
    }

    /// One `<file>:<line>: <message>` line per finding.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for finding in self.lock().iter() {
            let _ = writeln!(out, "{finding}");
        }
        out
    }

    /// JSON array of `{File, Line, Message}` objects.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let issues = self.lock();
        let plain: Vec<PlainIssue<'_>> = issues
            .iter()
            .map(|f| PlainIssue {
                file: &f.location.file,
                line: f.location.line,
                message: &f.message,
            })
            .collect();
        serde_json::to_string_pretty(&plain)
    }

    /// JSON array of `{RuleID, Code, Description, Severity, Location}` objects.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_detailed(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.lock())
    }

    /// XML document with one `<Issue>` element per finding.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Issues>\n");
        for finding in self.lock().iter() {
            let _ = write!(
                out,
                "  <Issue>\n    <File>{}</File>\n    <Line>{}</Line>\n    <Message>{}</Message>\n  </Issue>\n",
                escape_xml(&finding.location.file.display().to_string()),
                finding.location.line,
                escape_xml(&finding.message),
            );
        }
        out.push_str("</Issues>\n");
        out
    }

    /// Writes the text export to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.to_text())
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
