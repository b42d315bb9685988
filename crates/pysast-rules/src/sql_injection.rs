//! Rule to detect SQL queries built from untrusted data.
//!
//! # Rationale
//!
//! A query assembled by concatenating or formatting runtime values lets the
//! caller rewrite the statement. Parameterized queries keep data out of the
//! SQL text.
//!
//! # Detected Patterns
//!
//! - `execute("SELECT ... " + user_id)` and the equivalent f-string, `%`
//!   and `.format()` forms, also when the query is first assigned to a name
//! - execution sinks called with a non-literal query in a function that
//!   never prepares a statement
//!
//! # Allowed Patterns
//!
//! - `execute(query, params)`: a second positional argument (or `params=`)
//!   marks the call as parameterized
//! - a `prepare(...)` call anywhere in the same function
//! - constant queries
//!
//! # Configuration
//!
//! - `sinks`: additional execution sinks
//! - `markers`: additional parameterization calls
//!
//! # Suppression
//!
//! - `# pysast: allow(sql-injection)` comment

use crate::common::{self, Bindings};
use once_cell::sync::Lazy;
use pysast_core::ast::{Call, Scope};
use pysast_core::{function_scopes, Finding, Program, Rule, RuleConfig, Severity};
use regex::Regex;

/// Rule code for sql-injection.
pub const CODE: &str = "PS001";

/// Rule name for sql-injection.
pub const NAME: &str = "sql-injection";

/// Calls that execute SQL text.
const DEFAULT_SINKS: &[&str] = &[
    "execute",
    "cursor.execute",
    "executemany",
    "executescript",
    "raw",
    "extra",
    "read_sql",
];

/// Calls that mark the surrounding function as using prepared statements.
const DEFAULT_MARKERS: &[&str] = &["prepare", "prepared_statement"];

static DML_KEYWORD: Lazy<Regex> =
    Lazy::new(|| common::compile(r"(?i)\b(select|insert|update|delete|drop)\b"));

/// Detects injectable SQL query construction.
#[derive(Debug, Clone)]
pub struct SqlInjection {
    /// Execution sinks.
    pub sinks: Vec<String>,
    /// Parameterization markers.
    pub markers: Vec<String>,
    /// Custom severity.
    pub severity: Severity,
}

impl Default for SqlInjection {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlInjection {
    /// Creates a new rule with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sinks: common::owned(DEFAULT_SINKS),
            markers: common::owned(DEFAULT_MARKERS),
            severity: Severity::Error,
        }
    }

    /// Creates the rule with options from a `[rules.sql-injection]` table.
    #[must_use]
    pub fn from_config(config: &RuleConfig) -> Self {
        Self::new()
            .sinks(config.get_str_array("sinks"))
            .markers(config.get_str_array("markers"))
    }

    /// Adds execution sinks.
    #[must_use]
    pub fn sinks(mut self, sinks: Vec<String>) -> Self {
        common::extend_unique(&mut self.sinks, sinks);
        self
    }

    /// Adds parameterization markers.
    #[must_use]
    pub fn markers(mut self, markers: Vec<String>) -> Self {
        common::extend_unique(&mut self.markers, markers);
        self
    }

    /// Sets the severity level.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    fn has_marker(&self, scope: &Scope<'_>) -> bool {
        let mut found = false;
        scope.walk(|node| {
            if let Some(call) = node.as_call() {
                found |= common::matched_call(call, &self.markers).is_some();
            }
        });
        found
    }

    fn check_scope(&self, scope: &Scope<'_>, out: &mut Vec<Finding>) {
        let prepared = self.has_marker(scope);
        let mut bindings = Bindings::default();
        scope.walk(|node| {
            bindings.step(node);
            let Some(call) = node.as_call() else {
                return;
            };
            let Some(sink) = common::matched_call(call, &self.sinks) else {
                return;
            };
            if is_parameterized_call(call) {
                return;
            }
            let Some(query) = call.positional(0).or_else(|| call.keyword("sql")) else {
                return;
            };
            let query = bindings.resolve(query);
            if common::is_constant(&query) {
                return;
            }

            let message = if common::is_string_construction(&query)
                && DML_KEYWORD.is_match(&query.literal_text())
            {
                format!("SQL query passed to `{sink}` is built from runtime values; use a parameterized query")
            } else if prepared {
                return;
            } else {
                format!("`{sink}` runs a non-literal query and no prepared statement is used in this scope")
            };
            out.push(self.finding(&node.span(), message));
        });
    }
}

/// Parameters passed alongside the query keep it parameterized.
fn is_parameterized_call(call: &Call) -> bool {
    call.positional_count() >= 2 || call.keyword("params").is_some() || call.keyword("parameters").is_some()
}

impl Rule for SqlInjection {
    fn name(&self) -> &'static str {
        NAME
    }

    fn code(&self) -> &'static str {
        CODE
    }

    fn description(&self) -> &'static str {
        "Detects SQL queries built from runtime values"
    }

    fn default_severity(&self) -> Severity {
        self.severity
    }

    fn check(&self, program: &Program) -> Vec<Finding> {
        let mut findings = Vec::new();
        for scope in function_scopes(program) {
            self.check_scope(&scope, &mut findings);
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
        SqlInjection::new().check(&program)
    }

    #[test]
    fn test_detects_concatenated_query() {
        let findings = check_code(
            r#"
def get_user(user_id):
    execute("SELECT * FROM users WHERE id=" + user_id)
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, NAME);
        assert_eq!(findings[0].code, CODE);
        assert_eq!(findings[0].line(), 3);
        assert!(findings[0].message.contains("parameterized"));
    }

    #[test]
    fn test_allows_prepared_statement() {
        let findings = check_code(
            r#"
stmt = prepare("SELECT * FROM users WHERE id=?"); execute(stmt, [user_id])
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_detects_query_through_variable() {
        let findings = check_code(
            r#"
def delete(cursor, name):
    query = "DELETE FROM accounts WHERE name = '%s'" % name
    cursor.execute(query)
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line(), 4);
        assert!(findings[0].message.contains("cursor.execute"));
    }

    #[test]
    fn test_detects_fstring_and_format() {
        let findings = check_code(
            r#"
def search(db, term, table):
    db.cursor().execute(f"SELECT * FROM items WHERE name LIKE '%{term}%'")
    db.execute("DROP TABLE {}".format(table))
"#,
        );
        assert_eq!(findings.len(), 2);
        assert!(findings[0].message.contains("`execute`"));
        assert!(findings[1].message.contains("db.execute"));
    }

    #[test]
    fn test_second_argument_marks_parameterized_call() {
        let findings = check_code(
            r#"
def get(cursor, uid):
    cursor.execute("SELECT * FROM users WHERE id = %s", (uid,))
    cursor.execute(sql="SELECT 1", params=[uid])
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_constant_query_is_safe() {
        let findings = check_code(
            r#"
def count(cursor):
    query = "SELECT COUNT(*) " + "FROM users"
    cursor.execute(query)
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_non_literal_query_without_marker() {
        let findings = check_code(
            r#"
def run(cursor, query):
    cursor.execute(query)

def run_prepared(cursor, query):
    handle = cursor.prepare(query)
    cursor.execute(handle)
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line(), 3);
        assert!(findings[0].message.contains("no prepared statement"));
    }

    #[test]
    fn test_marker_does_not_excuse_concatenation() {
        let findings = check_code(
            r#"
def mixed(cursor, uid):
    stmt = cursor.prepare("SELECT 1")
    cursor.execute("UPDATE users SET seen = 1 WHERE id = " + uid)
"#,
        );
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_repeated_self_concatenation_terminates() {
        let mut code = String::from("def build(cursor, uid):\n    s = 'SELECT * FROM t WHERE id=' + uid\n");
        for _ in 0..40 {
            code.push_str("    s = s + s\n");
        }
        code.push_str("    cursor.execute(s)\n");
        let findings = check_code(&code);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line(), 43);
    }

    #[test]
    fn test_custom_sink_from_config() {
        let config: RuleConfig = toml::from_str("sinks = [\"run_sql\"]").unwrap();
        let rule = SqlInjection::from_config(&config);
        let (program, _) = lex_and_parse("run_sql('SELECT * FROM t WHERE a=' + a)\n", "t.py");
        assert_eq!(rule.check(&program).len(), 1);
    }
}
