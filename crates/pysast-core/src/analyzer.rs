//! Per-file analysis: parse, dispatch rules, apply configuration.

use crate::config::{Config, ConfigError, RuleConfig};
use crate::declarative::{load_rules_from_toml, LoadRulesError};
use crate::engine::RuleEngine;
use crate::parser::lex_and_parse;
use crate::reporter::Reporter;
use crate::rule::{Rule, RuleBox};
use crate::types::{AnalysisResult, FileFailure, FileReport, Finding};
use crate::utils::allowance::Suppressions;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during analysis.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Source file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Declarative rules could not be loaded.
    #[error("Declarative rule error: {0}")]
    Declarative(#[from] LoadRulesError),
}

/// Builder for configuring an [`Analyzer`].
#[derive(Default)]
pub struct AnalyzerBuilder {
    root: Option<PathBuf>,
    engine: Option<Arc<RuleEngine>>,
    rules: Vec<RuleBox>,
    selection: Option<Vec<String>>,
    config: Option<Config>,
    config_file: Option<PathBuf>,
    declarative: Vec<String>,
    analyze_partial: Option<bool>,
}

impl AnalyzerBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory that reported file paths are made relative to.
    #[must_use]
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Sets the shared registry of built-in rules.
    #[must_use]
    pub fn engine(mut self, engine: Arc<RuleEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Adds a rule owned by this analyzer; it always runs unless disabled.
    #[must_use]
    pub fn rule<R: Rule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Adds a boxed rule owned by this analyzer.
    #[must_use]
    pub fn rule_box(mut self, rule: RuleBox) -> Self {
        self.rules.push(rule);
        self
    }

    /// Selects which engine rules run. Overrides `[analyzer] rules`.
    #[must_use]
    pub fn rules<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Reads the configuration from a TOML file at build time, including
    /// its `[[pattern-rule]]` entries.
    #[must_use]
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Adds `[[pattern-rule]]` entries from TOML text, parsed at build time.
    #[must_use]
    pub fn declarative(mut self, toml: impl Into<String>) -> Self {
        self.declarative.push(toml.into());
        self
    }

    /// Sets whether rules run over programs with parse errors (default: true).
    #[must_use]
    pub fn analyze_partial(mut self, enabled: bool) -> Self {
        self.analyze_partial = Some(enabled);
        self
    }

    /// Builds the analyzer.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed,
    /// or a declarative rule is invalid.
    pub fn build(self) -> Result<Analyzer, AnalyzerError> {
        let mut declarative = self.declarative;
        let config = match (self.config, self.config_file) {
            (Some(config), _) => config,
            (None, Some(path)) => {
                let content = std::fs::read_to_string(&path).map_err(|source| {
                    ConfigError::Io {
                        path: path.clone(),
                        source,
                    }
                })?;
                let config = Config::parse(&content)?;
                declarative.push(content);
                config
            }
            (None, None) => Config::default(),
        };

        let mut local = RuleEngine::new();
        for rule in self.rules {
            local.register(rule);
        }
        for content in &declarative {
            for rule in load_rules_from_toml(content)? {
                local.register(rule);
            }
        }

        let engine = self.engine.unwrap_or_default();
        let selection = self
            .selection
            .or_else(|| (!config.analyzer.rules.is_empty()).then(|| config.analyzer.rules.clone()))
            .unwrap_or_else(|| engine.rule_names().into_iter().map(String::from).collect());

        for unknown in engine.unknown_rules(&selection) {
            warn!(rule = unknown, "unknown rule in selection");
        }

        let selection: Vec<String> = selection
            .into_iter()
            .filter(|name| {
                let enabled = config.is_rule_enabled(name);
                if !enabled {
                    debug!(rule = %name, "skipping disabled rule");
                }
                enabled
            })
            .collect();
        let local_selection: Vec<String> = local
            .rule_names()
            .into_iter()
            .filter(|name| config.is_rule_enabled(name))
            .map(String::from)
            .collect();

        Ok(Analyzer {
            root: self.root,
            engine,
            local,
            selection,
            local_selection,
            analyze_partial: self
                .analyze_partial
                .unwrap_or(config.analyzer.analyze_partial),
            config,
        })
    }
}

/// Runs the lexer, parser and rules over source files.
///
/// Use [`Analyzer::builder()`] to construct an instance.
#[derive(Debug)]
pub struct Analyzer {
    root: Option<PathBuf>,
    engine: Arc<RuleEngine>,
    local: RuleEngine,
    selection: Vec<String>,
    local_selection: Vec<String>,
    config: Config,
    analyze_partial: bool,
}

impl Analyzer {
    /// Creates a new builder for configuring an analyzer.
    #[must_use]
    pub fn builder() -> AnalyzerBuilder {
        AnalyzerBuilder::new()
    }

    /// Names of the rules that run on every file.
    #[must_use]
    pub fn active_rules(&self) -> Vec<&str> {
        self.selection
            .iter()
            .chain(&self.local_selection)
            .map(String::as_str)
            .filter(|name| self.engine.get(name).is_some() || self.local.get(name).is_some())
            .collect()
    }

    /// Returns the configuration in effect.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gets the rule configuration for a specific rule.
    #[must_use]
    pub fn rule_config(&self, rule_name: &str) -> Option<&RuleConfig> {
        self.config.rules.get(rule_name)
    }

    /// Analyzes source text that came from `path`.
    pub fn analyze_source(&self, source: &str, path: impl AsRef<Path>) -> FileReport {
        let path = path.as_ref();
        info!(file = %path.display(), "analyzing");

        let (program, parse_errors) = lex_and_parse(source, path);
        let mut report = FileReport {
            file: path.to_path_buf(),
            parse_errors,
            ..FileReport::default()
        };

        if !report.parse_errors.is_empty() && !self.analyze_partial {
            info!(
                file = %path.display(),
                parse_errors = report.parse_errors.len(),
                "skipping rules for file with parse errors"
            );
            return report;
        }

        let reporter = Reporter::new();
        let outcome = self.engine.run(&program, &self.selection, &reporter);
        report.rule_errors = outcome.rule_errors;
        let outcome = self.local.run(&program, &self.local_selection, &reporter);
        report.rule_errors.extend(outcome.rule_errors);

        report.findings = self.apply_config(source, reporter.take());

        info!(
            file = %path.display(),
            parse_errors = report.parse_errors.len(),
            findings = report.findings.len(),
            "analysis complete"
        );
        report
    }

    /// Reads and analyzes one file. The report names the file relative to
    /// the root when one is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn analyze_file(&self, path: impl AsRef<Path>) -> Result<FileReport, AnalyzerError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| AnalyzerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.analyze_source(&source, self.display_path(path)))
    }

    fn display_path<'p>(&self, path: &'p Path) -> &'p Path {
        self.root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(path)
    }

    /// Analyzes each file independently; unreadable files are recorded as
    /// failures and do not stop the batch.
    pub fn analyze_files<I, P>(&self, paths: I) -> AnalysisResult
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut result = AnalysisResult::new();
        for path in paths {
            let path = path.as_ref();
            match self.analyze_file(path) {
                Ok(report) => result.push_file(report),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "cannot analyze file");
                    result.push_failure(FileFailure {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    });
                }
            }
        }
        info!(
            files = result.files_checked,
            findings = result.findings.len(),
            "batch complete"
        );
        result
    }

    /// Drops disabled or suppressed findings, applies severity overrides and
    /// orders the rest by line.
    fn apply_config(&self, source: &str, findings: Vec<Finding>) -> Vec<Finding> {
        let suppressions = if self.config.analyzer.respect_suppressions {
            Suppressions::parse(source)
        } else {
            Suppressions::default()
        };

        let mut kept: Vec<Finding> = findings
            .into_iter()
            .filter(|f| self.config.is_rule_enabled(&f.rule_id))
            .filter(|f| {
                let check = suppressions.check(f.line(), &f.rule_id);
                if check.is_allowed() {
                    debug!(
                        rule = %f.rule_id,
                        line = f.line(),
                        reason = check.reason().unwrap_or(""),
                        "finding suppressed"
                    );
                }
                !check.is_allowed()
            })
            .map(|mut f| {
                if let Some(severity) = self.config.rule_severity(&f.rule_id) {
                    f.severity = severity;
                }
                f
            })
            .collect();

        kept.sort_by(|a, b| {
            a.line()
                .cmp(&b.line())
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });
        kept
    }
}
