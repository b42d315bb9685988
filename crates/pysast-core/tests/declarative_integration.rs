//! Integration test: declarative rules end-to-end via Analyzer.
//!
//! Uses fixture files under `tests/fixtures/declarative/` to verify
//! that the full TOML → DTO → domain model → Rule → Analyzer pipeline
//! flags the configured calls.

use pysast_core::declarative;
use pysast_core::{AnalysisResult, Analyzer, Config, Severity};
use std::path::PathBuf;

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/declarative")
}

fn fixture_files() -> Vec<PathBuf> {
    let root = fixture_root();
    vec![root.join("app/views.py"), root.join("scripts/maintenance.py")]
}

fn analyze_with(toml_content: &str) -> AnalysisResult {
    let config = if toml_content.is_empty() {
        Config::default()
    } else {
        Config::parse(toml_content).expect("fixture config should parse")
    };
    let rules = declarative::load_rules_from_toml(toml_content).expect("fixture rules should load");

    let mut builder = Analyzer::builder().root(fixture_root()).config(config);
    for rule in rules {
        builder = builder.rule_box(rule);
    }
    let analyzer = builder.build().expect("analyzer should build");
    analyzer.analyze_files(fixture_files())
}

fn analyze_fixture() -> AnalysisResult {
    let toml_content = std::fs::read_to_string(fixture_root().join("pysast.toml"))
        .expect("fixture TOML should exist");
    analyze_with(&toml_content)
}

// ── Happy-path: detects expected findings ──

#[test]
fn detects_all_three_pattern_rules() {
    let result = analyze_fixture();

    // Expect exactly 3 findings:
    //   1. no-pickle: pickle.loads in app/views.py
    //   2. tainted-subprocess: request data in app/views.py
    //   3. no-yaml-load: yaml.load in scripts/maintenance.py
    assert_eq!(
        result.findings.len(),
        3,
        "expected 3 findings, got {}: {:#?}",
        result.findings.len(),
        result
            .findings
            .iter()
            .map(|f| format!("{} @ {}", f.rule_id, f.location.file.display()))
            .collect::<Vec<_>>()
    );

    let codes: Vec<&str> = result.findings.iter().map(|f| f.code.as_str()).collect();
    assert!(codes.contains(&"PSD001"), "missing no-pickle finding");
    assert!(codes.contains(&"PSD002"), "missing no-yaml-load finding");
    assert!(codes.contains(&"PSD003"), "missing tainted-subprocess finding");
    assert!(result.parse_errors.is_empty());
    assert_eq!(result.files_checked, 2);
}

#[test]
fn tainted_call_details() {
    let result = analyze_fixture();

    let tainted = result
        .findings
        .iter()
        .find(|f| f.code == "PSD003")
        .expect("should have tainted-subprocess finding");

    assert_eq!(tainted.rule_id, "tainted-subprocess");
    assert_eq!(tainted.severity, Severity::Error);
    assert_eq!(tainted.line(), 15);
    assert!(tainted.message.contains("subprocess.run"));
    assert_eq!(tainted.location.file, PathBuf::from("app/views.py"));
}

#[test]
fn severity_override_applies_to_entry_name() {
    let result = analyze_fixture();

    let yaml = result
        .findings
        .iter()
        .find(|f| f.rule_id == "no-yaml-load")
        .expect("should have no-yaml-load finding");

    assert_eq!(yaml.severity, Severity::Warning);
    assert_eq!(yaml.line(), 7);
    assert_eq!(yaml.location.file, PathBuf::from("scripts/maintenance.py"));
}

// ── Edge case: empty config produces no findings ──

#[test]
fn empty_config_no_findings() {
    let result = analyze_with("");
    assert!(
        result.findings.is_empty(),
        "empty config should produce no findings"
    );
}

// ── Severity filtering ──

#[test]
fn has_violations_at_respects_severity() {
    let result = analyze_fixture();
    assert!(result.has_violations_at(Severity::Error));
    assert_eq!(result.by_severity(Severity::Warning).len(), 1);
    assert_eq!(result.count_by_severity(), (2, 1, 0));
}
