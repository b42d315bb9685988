//! Rule to detect local and remote file inclusion.
//!
//! # Rationale
//!
//! Loading code or files from relative paths lets `../` sequences escape the
//! intended directory, and fetching files from remote URLs executes or
//! serves content the application does not control.
//!
//! # Detected Patterns
//!
//! - include-like calls (`include`, `require`, `importlib.import_module`,
//!   `runpy.run_path`, ...) with a path starting with `./` or `../`
//! - file opens (`open`, `send_file`, ...) with a path starting with `../`
//! - either kind with a path derived from user input
//! - include-like and remote-fetch calls (`file_get_contents`,
//!   `urlretrieve`, ...) with an `http://` or `https://` literal
//!
//! # Suppression
//!
//! - `# pysast: allow(file-inclusion)` comment

use crate::common::{self, Bindings};
use pysast_core::ast::Call;
use pysast_core::{
    function_scopes, Finding, Program, Rule, Severity, TaintConfig, TaintTracker,
};

/// Rule code for file-inclusion.
pub const CODE: &str = "PS005";

/// Rule name for file-inclusion.
pub const NAME: &str = "file-inclusion";

/// Calls that load and execute or render a file.
const INCLUDE_CALLS: &[&str] = &[
    "include",
    "include_once",
    "require",
    "require_once",
    "execfile",
    "importlib.import_module",
    "__import__",
    "runpy.run_path",
    "imp.load_source",
    "render_template",
];

/// Calls that open or serve a local file.
const OPEN_CALLS: &[&str] = &["open", "io.open", "codecs.open", "send_file", "FileResponse"];

/// Calls that download remote content.
const REMOTE_FETCH_CALLS: &[&str] = &[
    "file_get_contents",
    "fopen",
    "readfile",
    "urlretrieve",
];

/// Kind of call a path argument flows into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Include,
    Open,
    RemoteFetch,
}

impl Target {
    fn of(call: &Call) -> Option<(Self, String)> {
        [
            (Self::Include, INCLUDE_CALLS),
            (Self::Open, OPEN_CALLS),
            (Self::RemoteFetch, REMOTE_FETCH_CALLS),
        ]
        .into_iter()
        .find_map(|(target, names)| common::matched_call(call, names).map(|name| (target, name)))
    }
}

/// Detects file inclusion through relative, remote or user-chosen paths.
#[derive(Debug, Clone)]
pub struct FileInclusion {
    /// User input sources.
    pub taint: TaintConfig,
    /// Custom severity.
    pub severity: Severity,
}

impl Default for FileInclusion {
    fn default() -> Self {
        Self::new()
    }
}

impl FileInclusion {
    /// Creates a new rule with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            taint: TaintConfig::new(
                common::USER_INPUT_SOURCES.iter().copied(),
                ["basename", "secure_filename", "safe_join"],
            ),
            severity: Severity::Error,
        }
    }

    /// Sets the severity level.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

fn classify(target: Target, name: &str, prefix: &str) -> Option<String> {
    let remote = prefix.starts_with("http://") || prefix.starts_with("https://");
    match target {
        Target::Include | Target::RemoteFetch if remote => Some(format!(
            "`{name}` loads a remote file; fetch and validate remote content explicitly"
        )),
        Target::Include if prefix.starts_with("./") || prefix.starts_with("../") => Some(format!(
            "`{name}` includes a relative path; resolve it against a fixed base directory"
        )),
        Target::Open if prefix.starts_with("../") => Some(format!(
            "`{name}` opens a path that traverses to a parent directory"
        )),
        _ => None,
    }
}

impl Rule for FileInclusion {
    fn name(&self) -> &'static str {
        NAME
    }

    fn code(&self) -> &'static str {
        CODE
    }

    fn description(&self) -> &'static str {
        "Detects file inclusion through relative, remote or user-controlled paths"
    }

    fn default_severity(&self) -> Severity {
        self.severity
    }

    fn check(&self, program: &Program) -> Vec<Finding> {
        let mut findings = Vec::new();
        for scope in function_scopes(program) {
            let mut bindings = Bindings::default();
            TaintTracker::scan(&self.taint, &scope, |node, tracker| {
                bindings.step(node);
                let Some(call) = node.as_call() else {
                    return;
                };
                let Some((target, name)) = Target::of(call) else {
                    return;
                };
                let Some(path) = call.positional(0).or_else(|| call.keyword("file")) else {
                    return;
                };

                let prefix = common::static_prefix(&bindings.resolve(path));
                let message = classify(target, &name, &prefix).or_else(|| {
                    (target != Target::RemoteFetch && tracker.is_tainted(path))
                        .then(|| format!("`{name}` loads a path derived from user input"))
                });
                if let Some(message) = message {
                    findings.push(self.finding(&node.span(), message));
                }
            });
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
        FileInclusion::new().check(&program)
    }

    #[test]
    fn test_detects_relative_include() {
        let findings = check_code(
            r#"
include("./plugins/" + name + ".py")
require_once("../lib/config.php")
include("/opt/app/plugins/base.py")
"#,
        );
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].line(), 2);
        assert_eq!(findings[1].line(), 3);
    }

    #[test]
    fn test_open_only_flags_traversal() {
        let findings = check_code(
            r#"
config = open("./config.ini")
secret = open("../../etc/shadow")
"#,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("parent directory"));
    }

    #[test]
    fn test_detects_remote_fetch() {
        let findings = check_code(
            r#"
page = file_get_contents("http://example.com/page.html")
urlretrieve("https://example.com/plugin.py", "plugin.py")
local = file_get_contents("data/page.html")
"#,
        );
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.message.contains("remote file")));
    }

    #[test]
    fn test_detects_tainted_path() {
        let findings = check_code(
            r#"
def download():
    name = request.args.get("file")
    return send_file(name)

def safe_download():
    name = secure_filename(request.args.get("file"))
    return send_file(name)
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line(), 4);
        assert!(findings[0].message.contains("user input"));
    }

    #[test]
    fn test_resolves_path_variable() {
        let findings = check_code(
            r#"
def load(module):
    path = "../modules/" + module
    return runpy.run_path(path)
"#,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("runpy.run_path"));
    }
}
