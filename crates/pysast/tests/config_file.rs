//! Configuration loaded from `pysast.toml` on disk.

use pysast::{analyzer_for_dir, analyzer_from_file, Reporter, Severity};
use std::fs;
use std::path::Path;

const CONFIG: &str = r#"
preset = "minimal"

[analyzer]
rules = ["sql-injection", "ssrf"]

[rules.ssrf]
severity = "warning"
allowed_ports = [443]

[[pattern-rule]]
name = "no-pickle"
sinks = ["pickle.loads"]
message = "Deserializing untrusted data"
"#;

const SOURCE: &str = r#"import pickle

def fetch(blob):
    requests.get("https://api.example.com:8443/data")
    obj = pickle.loads(blob)
    print(input())
"#;

fn write_project(dir: &Path) {
    fs::write(dir.join("pysast.toml"), CONFIG).unwrap();
    fs::create_dir_all(dir.join("app")).unwrap();
    fs::write(dir.join("app/fetch.py"), SOURCE).unwrap();
}

#[test]
fn config_selects_rules_and_overrides_severity() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let analyzer = analyzer_from_file(dir.path().join("pysast.toml")).unwrap();
    let report = analyzer.analyze_file(dir.path().join("app/fetch.py")).unwrap();

    let summary: Vec<(&str, usize, Severity)> = report
        .findings
        .iter()
        .map(|f| (f.rule_id.as_str(), f.line(), f.severity))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("ssrf", 4, Severity::Warning),
            ("no-pickle", 5, Severity::Error),
        ]
    );
    assert!(report.findings[0].message.contains("port 8443"));
}

#[test]
fn batch_records_unreadable_files() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let analyzer = analyzer_for_dir(dir.path()).unwrap();
    let result = analyzer.analyze_files([
        dir.path().join("app/fetch.py"),
        dir.path().join("app/missing.py"),
    ]);

    assert_eq!(result.files_checked, 2);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.findings.len(), 2);
    assert_eq!(result.findings[0].file(), Path::new("app/fetch.py"));
    assert!(result.has_errors());
    assert_eq!(result.count_by_severity(), (1, 1, 0));
}

#[test]
fn detailed_json_keeps_field_names() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let analyzer = analyzer_for_dir(dir.path()).unwrap();
    let report = analyzer.analyze_file(dir.path().join("app/fetch.py")).unwrap();
    let reporter = Reporter::new();
    reporter.extend(report.findings);

    let json: serde_json::Value =
        serde_json::from_str(&reporter.to_json_detailed().unwrap()).unwrap();
    assert_eq!(json[1]["RuleID"], "no-pickle");
    assert_eq!(json[1]["Description"], "Deserializing untrusted data: `pickle.loads`");
    assert_eq!(json[1]["Severity"], "error");
    assert_eq!(json[1]["Location"]["Line"], 5);

    let plain: serde_json::Value = serde_json::from_str(&reporter.to_json().unwrap()).unwrap();
    assert_eq!(plain[0]["File"], "app/fetch.py");
    assert_eq!(plain[0]["Line"], 4);
}

#[test]
fn missing_config_uses_recommended_preset() {
    let dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer_for_dir(dir.path()).unwrap();
    assert_eq!(analyzer.active_rules().len(), 7);
}
