//! Rule to detect risky process execution and file system writes.
//!
//! # Rationale
//!
//! Commands assembled at runtime or run through a shell can be hijacked by
//! their arguments. Deleting and writing files from request handlers is
//! worth a second look even when the paths are fixed.
//!
//! # Detected Patterns
//!
//! - `os.system`, `os.popen` and the `subprocess` helpers with
//!   `shell=True` or a command that is not a literal (error)
//! - a literal argument starting with `-` passed to those helpers, which
//!   lets later arguments be read as options (warning)
//! - `shutil.rmtree`, `os.remove`, `os.unlink`, `os.rmdir` (info)
//! - `open(path, "w")` and other writing modes inside a function or class
//!   body (info)
//!
//! # Allowed Patterns
//!
//! - `subprocess.run(["git", "status"])` with a literal argument list
//! - writes at module level, which run once at import
//!
//! # Suppression
//!
//! - `# pysast: allow(dangerous-io)` comment

use crate::common::{self, Bindings};
use pysast_core::ast::{Call, ExprKind, Node, Scope, StmtKind};
use pysast_core::{function_scopes, Finding, Location, Program, Rule, Severity, Span};

/// Rule code for dangerous-io.
pub const CODE: &str = "PS007";

/// Rule name for dangerous-io.
pub const NAME: &str = "dangerous-io";

/// Calls that start a process.
const SHELL_CALLS: &[&str] = &[
    "os.system",
    "os.popen",
    "subprocess.call",
    "subprocess.run",
    "subprocess.Popen",
    "subprocess.check_output",
    "subprocess.check_call",
    "subprocess.getoutput",
];

/// Calls that delete files or directories.
const DELETE_CALLS: &[&str] = &[
    "shutil.rmtree",
    "os.remove",
    "os.unlink",
    "os.rmdir",
    "os.removedirs",
];

const OPEN_CALLS: &[&str] = &["open", "io.open"];

/// Detects shell execution, file deletion and file writes.
#[derive(Debug, Clone)]
pub struct DangerousIo {
    /// Severity of option-injection findings.
    pub severity: Severity,
}

impl Default for DangerousIo {
    fn default() -> Self {
        Self::new()
    }
}

impl DangerousIo {
    /// Creates a new rule with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            severity: Severity::Warning,
        }
    }

    /// Sets the severity level.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    fn check_process_calls(&self, scope: &Scope<'_>, out: &mut Vec<Finding>) {
        let mut bindings = Bindings::default();
        scope.walk(|node| {
            bindings.step(node);
            let Some(call) = node.as_call() else {
                return;
            };
            let span = node.span();
            if let Some(name) = common::matched_call(call, SHELL_CALLS) {
                if let Some((severity, message)) = self.classify_shell(call, &name, &bindings) {
                    out.push(finding_at(&span, severity, message));
                }
            } else if let Some(name) = common::matched_call(call, DELETE_CALLS) {
                out.push(finding_at(
                    &span,
                    Severity::Info,
                    format!("`{name}` deletes files; make sure the path cannot be chosen by a caller"),
                ));
            }
        });
    }

    fn classify_shell(
        &self,
        call: &Call,
        name: &str,
        bindings: &Bindings<'_>,
    ) -> Option<(Severity, String)> {
        let shell = call
            .keyword("shell")
            .is_some_and(|value| matches!(value.kind, ExprKind::Bool(true)));
        if shell {
            return Some((
                Severity::Error,
                format!("`{name}` runs its command through a shell (`shell=True`)"),
            ));
        }

        let command = call.positional(0).or_else(|| call.keyword("args"))?;
        if !common::is_constant(&bindings.resolve(command)) {
            return Some((
                Severity::Error,
                format!("`{name}` runs a command built at runtime"),
            ));
        }

        let option = (1..call.positional_count())
            .filter_map(|i| call.positional(i).and_then(|arg| arg.as_str()))
            .find(|arg| arg.trim_start().starts_with('-'))?;
        Some((
            self.severity,
            format!("`{name}` receives option-like argument `{option}`; separate options from operands with `--`"),
        ))
    }

    /// Visits `node`, tracking the innermost enclosing function or class.
    fn check_writes(node: Node<'_>, owner: Option<&str>, out: &mut Vec<Finding>) {
        let owner = match node.as_stmt().map(|stmt| &stmt.kind) {
            Some(StmtKind::FunctionDef(def)) => Some(def.name.as_str()),
            Some(StmtKind::ClassDef(class)) => Some(class.name.as_str()),
            _ => owner,
        };

        if let (Some(owner), Some(call)) = (owner, node.as_call()) {
            if let Some(name) = common::matched_call(call, OPEN_CALLS) {
                let mode = call
                    .positional(1)
                    .or_else(|| call.keyword("mode"))
                    .and_then(|mode| mode.as_str());
                if mode.is_some_and(|mode| mode.contains(['w', 'a', 'x', '+'])) {
                    out.push(finding_at(
                        &node.span(),
                        Severity::Info,
                        format!("`{name}` writes to a file inside `{owner}`"),
                    ));
                }
            }
        }

        for child in node.children() {
            Self::check_writes(child, owner, out);
        }
    }
}

fn finding_at(span: &Span, severity: Severity, message: String) -> Finding {
    Finding::new(NAME, CODE, severity, Location::from(span), message)
}

impl Rule for DangerousIo {
    fn name(&self) -> &'static str {
        NAME
    }

    fn code(&self) -> &'static str {
        CODE
    }

    fn description(&self) -> &'static str {
        "Detects shell execution, file deletion and file writes"
    }

    fn default_severity(&self) -> Severity {
        self.severity
    }

    fn check(&self, program: &Program) -> Vec<Finding> {
        let mut findings = Vec::new();
        for scope in function_scopes(program) {
            self.check_process_calls(&scope, &mut findings);
        }
        Self::check_writes(Node::Program(program), None, &mut findings);
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
        DangerousIo::new().check(&program)
    }

    #[test]
    fn test_detects_shell_true() {
        let findings = check_code("subprocess.run(\"ls -la\", shell=True)\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
        assert!(findings[0].message.contains("shell=True"));
    }

    #[test]
    fn test_detects_runtime_command() {
        let findings = check_code(
            r#"
def ping(host):
    os.system("ping -c 1 " + host)
    cmd = "uptime"
    os.system(cmd)
    subprocess.check_output(["git", "log"])
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line(), 3);
        assert_eq!(findings[0].severity, Severity::Error);
    }

    #[test]
    fn test_detects_option_like_argument() {
        let findings = check_code("subprocess.call(\"tar\", \"-xf\", \"backup.tar\")\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert!(findings[0].message.contains("`-xf`"));
    }

    #[test]
    fn test_deletion_is_info() {
        let findings = check_code("shutil.rmtree(\"/tmp/cache\")\nos.remove(path)\n");
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.severity == Severity::Info));
    }

    #[test]
    fn test_write_mode_inside_function() {
        let findings = check_code(
            r#"
log = open("app.log", "a")

def save(data):
    with open("out.txt", "w") as f:
        f.write(data)
    with open("in.txt") as f:
        return f.read()

class Cache:
    handle = open("cache.bin", mode="wb+")
"#,
        );
        assert_eq!(findings.len(), 2);
        assert!(findings[0].message.contains("`save`"));
        assert!(findings[1].message.contains("`Cache`"));
        assert!(findings.iter().all(|f| f.severity == Severity::Info));
    }
}
