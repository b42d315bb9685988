//! DTO → Domain model conversion with validation.

use crate::taint::TaintConfig;
use crate::types::Severity;

use super::config_dto::{DeclarativeConfigDto, PatternRuleDto};
use super::model::{
    CallPattern, DeclarativeConfig, GlobPattern, ModelError, PatternRuleSpec, RuleName,
};

/// Code assigned to pattern rules that do not set one.
pub const DEFAULT_PATTERN_CODE: &str = "PSD001";

/// Errors during DTO → Domain conversion.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// A field-level validation error.
    #[error("{context}: {source}")]
    Validation {
        /// Where the error occurred (e.g., "pattern-rule[0].sinks[1]").
        context: String,
        /// The underlying model error.
        source: ModelError,
    },

    /// Unknown severity string.
    #[error("{context}: unknown severity `{value}`, expected: error, warning, info")]
    UnknownSeverity {
        /// Where the error occurred.
        context: String,
        /// The invalid value.
        value: String,
    },

    /// Cross-rule errors from aggregate root construction.
    #[error("configuration validation errors:\n{}", format_errors(.0))]
    CrossRef(Vec<ModelError>),
}

fn format_errors(errors: &[ModelError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Converts a `DeclarativeConfigDto` to a validated `DeclarativeConfig`.
///
/// # Errors
///
/// Returns the first error encountered during conversion.
pub fn load(dto: DeclarativeConfigDto) -> Result<DeclarativeConfig, LoadError> {
    let pattern_rules = dto
        .pattern_rules
        .into_iter()
        .enumerate()
        .map(|(i, r)| convert_pattern_rule(r, i))
        .collect::<Result<Vec<_>, _>>()?;

    DeclarativeConfig::new(pattern_rules).map_err(LoadError::CrossRef)
}

fn convert_pattern_rule(dto: PatternRuleDto, index: usize) -> Result<PatternRuleSpec, LoadError> {
    let ctx = format!("pattern-rule[{index}]");
    let validation = |field: String| move |source: ModelError| LoadError::Validation {
        context: field,
        source,
    };

    let name = RuleName::new(&dto.name).map_err(validation(format!("{ctx}.name")))?;
    let ctx = format!("pattern-rule '{name}'");

    if dto.sinks.is_empty() {
        return Err(LoadError::Validation {
            context: format!("{ctx}.sinks"),
            source: ModelError::NoSinks,
        });
    }
    let sinks = convert_calls(&dto.sinks, &format!("{ctx}.sinks"))?;
    let sources = convert_calls(&dto.sources, &format!("{ctx}.sources"))?;
    let sanitizers = convert_calls(&dto.sanitizers, &format!("{ctx}.sanitizers"))?;

    let files = dto
        .files
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, p)| GlobPattern::new(p).map_err(validation(format!("{ctx}.files[{i}]"))))
        .collect::<Result<Vec<_>, _>>()?;

    let severity = parse_severity(&dto.severity, &ctx)?;
    let taint = TaintConfig::new(
        sources.iter().map(|s| s.as_str().to_string()),
        sanitizers.iter().map(|s| s.as_str().to_string()),
    );

    Ok(PatternRuleSpec::new(
        name,
        dto.code.unwrap_or_else(|| DEFAULT_PATTERN_CODE.to_string()),
        sinks,
        taint,
        files,
        dto.message,
        severity,
    ))
}

fn convert_calls(patterns: &[String], context: &str) -> Result<Vec<CallPattern>, LoadError> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, p)| {
            CallPattern::new(p).map_err(|e| LoadError::Validation {
                context: format!("{context}[{i}]"),
                source: e,
            })
        })
        .collect()
}

fn parse_severity(value: &str, context: &str) -> Result<Severity, LoadError> {
    match value {
        "error" => Ok(Severity::Error),
        "warning" => Ok(Severity::Warning),
        "info" => Ok(Severity::Info),
        _ => Err(LoadError::UnknownSeverity {
            context: context.to_string(),
            value: value.to_string(),
        }),
    }
}
