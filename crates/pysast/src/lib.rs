//! # pysast
//!
//! Static security analyzer for Python-like source code.
//!
//! This is the facade crate: it re-exports the core (lexer, parser, AST,
//! engine, reporter, analyzer) and the built-in rules.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pysast::rules::RuleName;
//!
//! let (program, errors) = pysast::lex_and_parse(source, "app.py");
//! let findings = pysast::analyze(&program, &[RuleName::SqlInjection, RuleName::Xss]);
//! ```
//!
//! ## Configured Analysis
//!
//! ```rust,ignore
//! let analyzer = pysast::analyzer_for_dir("./service")?;
//! let result = analyzer.analyze_files(files);
//! if result.has_errors() {
//!     eprintln!("{}", result.format_report(pysast::Severity::Error));
//! }
//! ```
//!
//! Configuration lives in `pysast.toml`:
//!
//! ```toml
//! preset = "strict"
//!
//! [rules.ssrf]
//! allowed_ports = [443]
//!
//! [[pattern-rule]]
//! name = "no-pickle-loads"
//! sinks = ["pickle.loads"]
//! message = "Deserializing untrusted data"
//! ```

#![forbid(unsafe_code)]

// Re-export core types and traits
pub use pysast_core::*;

/// Built-in rules and presets.
pub mod rules {
    pub use pysast_rules::*;
}

mod discover;

pub use discover::{
    analyzer_for_dir, analyzer_from_config, analyzer_from_file, analyzer_from_toml, find_config,
    CONFIG_CANDIDATES,
};

use once_cell::sync::Lazy;
use pysast_rules::RuleName;

/// Every built-in rule with default settings, built on first use.
static REGISTRY: Lazy<RuleEngine> = Lazy::new(pysast_rules::default_engine);

/// Runs the selected built-in rules over a parsed program.
///
/// Rules run concurrently. Findings of one rule keep that rule's order;
/// the order across rules is unspecified.
#[must_use]
pub fn analyze(program: &Program, enabled_rules: &[RuleName]) -> Vec<Finding> {
    let names: Vec<&str> = enabled_rules.iter().map(|rule| rule.as_str()).collect();
    let reporter = Reporter::new();
    REGISTRY.run(program, &names, &reporter);
    reporter.take()
}
