//! Rule presets and the registry of built-in rules.

use crate::{Csrf, DangerousIo, FileInclusion, SensitiveInfo, SqlInjection, Ssrf, Xss};
use pysast_core::{Config, RuleBox, RuleConfig, RuleEngine};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// The closed set of built-in rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleName {
    /// `sql-injection` (PS001).
    SqlInjection,
    /// `xss` (PS002).
    Xss,
    /// `csrf` (PS003).
    Csrf,
    /// `ssrf` (PS004).
    Ssrf,
    /// `file-inclusion` (PS005).
    FileInclusion,
    /// `sensitive-info` (PS006).
    SensitiveInfo,
    /// `dangerous-io` (PS007).
    DangerousIo,
}

impl RuleName {
    /// Every built-in rule, in code order.
    pub const ALL: [Self; 7] = [
        Self::SqlInjection,
        Self::Xss,
        Self::Csrf,
        Self::Ssrf,
        Self::FileInclusion,
        Self::SensitiveInfo,
        Self::DangerousIo,
    ];

    /// Registry name of the rule.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SqlInjection => crate::sql_injection::NAME,
            Self::Xss => crate::xss::NAME,
            Self::Csrf => crate::csrf::NAME,
            Self::Ssrf => crate::ssrf::NAME,
            Self::FileInclusion => crate::file_inclusion::NAME,
            Self::SensitiveInfo => crate::sensitive_info::NAME,
            Self::DangerousIo => crate::dangerous_io::NAME,
        }
    }

    /// Rule code (`PS001`...).
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::SqlInjection => crate::sql_injection::CODE,
            Self::Xss => crate::xss::CODE,
            Self::Csrf => crate::csrf::CODE,
            Self::Ssrf => crate::ssrf::CODE,
            Self::FileInclusion => crate::file_inclusion::CODE,
            Self::SensitiveInfo => crate::sensitive_info::CODE,
            Self::DangerousIo => crate::dangerous_io::CODE,
        }
    }

    /// Builds the rule with default settings.
    #[must_use]
    pub fn build(self) -> RuleBox {
        self.build_with(&RuleConfig::default(), false)
    }

    /// Builds the rule with options from its `[rules.<name>]` table.
    fn build_with(self, options: &RuleConfig, strict: bool) -> RuleBox {
        match self {
            Self::SqlInjection => Box::new(SqlInjection::from_config(options)),
            Self::Xss => Box::new(Xss::from_config(options)),
            Self::Csrf => Box::new(Csrf::from_config(options)),
            Self::Ssrf => Box::new(Ssrf::from_config(options)),
            Self::FileInclusion => Box::new(FileInclusion::new()),
            Self::SensitiveInfo if strict => {
                Box::new(SensitiveInfo::new().strict().with_config(options))
            }
            Self::SensitiveInfo => Box::new(SensitiveInfo::from_config(options)),
            Self::DangerousIo => Box::new(DangerousIo::new()),
        }
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule name that is not one of the built-in rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rule `{0}`")]
pub struct UnknownRuleName(pub String);

impl FromStr for RuleName {
    type Err = UnknownRuleName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rule| rule.as_str() == s || rule.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRuleName(s.to_string()))
    }
}

/// Preset configurations for pysast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Every built-in rule with default settings.
    Recommended,
    /// Every built-in rule with lower detection thresholds.
    Strict,
    /// Injection rules only, for gradual adoption.
    Minimal,
}

impl Preset {
    /// Looks a preset up by its configuration name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "recommended" => Some(Self::Recommended),
            "strict" => Some(Self::Strict),
            "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }

    /// Rules selected by this preset.
    #[must_use]
    pub fn rule_names(self) -> Vec<RuleName> {
        match self {
            Self::Recommended | Self::Strict => RuleName::ALL.to_vec(),
            Self::Minimal => vec![RuleName::SqlInjection, RuleName::Xss],
        }
    }

    /// Returns the rules for this preset.
    #[must_use]
    pub fn rules(self) -> Vec<RuleBox> {
        match self {
            Self::Recommended => recommended_rules(),
            Self::Strict => strict_rules(),
            Self::Minimal => minimal_rules(),
        }
    }
}

/// Returns the recommended set of rules.
///
/// Includes all seven built-in rules with their default options.
#[must_use]
pub fn recommended_rules() -> Vec<RuleBox> {
    all_rules()
}

/// Returns the strict set of rules.
///
/// Same rules as [`recommended_rules`], with `sensitive-info` checking
/// shorter literals against a lower entropy threshold.
#[must_use]
pub fn strict_rules() -> Vec<RuleBox> {
    RuleName::ALL
        .into_iter()
        .map(|name| name.build_with(&RuleConfig::default(), true))
        .collect()
}

/// Returns the minimal set of rules.
///
/// For gradual adoption, only includes:
/// - `sql-injection` (PS001)
/// - `xss` (PS002)
#[must_use]
pub fn minimal_rules() -> Vec<RuleBox> {
    Preset::Minimal
        .rule_names()
        .into_iter()
        .map(RuleName::build)
        .collect()
}

/// Returns all available rules.
#[must_use]
pub fn all_rules() -> Vec<RuleBox> {
    RuleName::ALL.into_iter().map(RuleName::build).collect()
}

/// Builds the rules a configuration selects, with their options applied.
///
/// `[analyzer] rules` takes precedence over the preset. Unknown names and
/// presets are logged and skipped.
#[must_use]
pub fn rules_from_config(config: &Config) -> Vec<RuleBox> {
    let preset = match config.preset.as_deref() {
        None => Preset::Recommended,
        Some(name) => Preset::from_name(name).unwrap_or_else(|| {
            warn!(preset = name, "Unknown preset, using recommended");
            Preset::Recommended
        }),
    };

    let names = if config.analyzer.rules.is_empty() {
        preset.rule_names()
    } else {
        config
            .analyzer
            .rules
            .iter()
            .filter_map(|name| match name.parse::<RuleName>() {
                Ok(rule) => Some(rule),
                Err(e) => {
                    debug!(rule = %name, "{e}, skipping");
                    None
                }
            })
            .collect()
    };

    let defaults = RuleConfig::default();
    names
        .into_iter()
        .map(|name| {
            let options = config.rule(name.as_str()).unwrap_or(&defaults);
            name.build_with(options, preset == Preset::Strict)
        })
        .collect()
}

/// Builds an engine holding the rules a configuration selects.
#[must_use]
pub fn engine_from_config(config: &Config) -> RuleEngine {
    let mut engine = RuleEngine::new();
    for rule in rules_from_config(config) {
        engine.register(rule);
    }
    engine
}

/// Builds an engine holding every built-in rule with default settings.
#[must_use]
pub fn default_engine() -> RuleEngine {
    let mut engine = RuleEngine::new();
    for rule in all_rules() {
        engine.register(rule);
    }
    engine
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(rules: &[RuleBox]) -> Vec<&'static str> {
        rules.iter().map(|rule| rule.name()).collect()
    }

    #[test]
    fn test_preset_rules() {
        assert_eq!(Preset::Recommended.rules().len(), 7);
        assert_eq!(Preset::Strict.rules().len(), 7);
        assert_eq!(
            names(&Preset::Minimal.rules()),
            vec!["sql-injection", "xss"]
        );
    }

    #[test]
    fn test_rule_names_parse() {
        assert_eq!("ssrf".parse::<RuleName>(), Ok(RuleName::Ssrf));
        assert_eq!("ps006".parse::<RuleName>(), Ok(RuleName::SensitiveInfo));
        assert_eq!(
            "no-such-rule".parse::<RuleName>().unwrap_err().to_string(),
            "unknown rule `no-such-rule`"
        );
        for rule in RuleName::ALL {
            assert_eq!(rule.build().name(), rule.as_str());
            assert_eq!(rule.build().code(), rule.code());
        }
    }

    #[test]
    fn test_explicit_rules_override_preset() {
        let config = Config::parse(
            r#"
preset = "minimal"

[analyzer]
rules = ["csrf", "dangerous-io", "bogus"]
"#,
        )
        .unwrap();
        assert_eq!(names(&rules_from_config(&config)), vec!["csrf", "dangerous-io"]);
    }

    #[test]
    fn test_unknown_preset_falls_back() {
        let config = Config::parse("preset = \"paranoid\"").unwrap();
        assert_eq!(rules_from_config(&config).len(), 7);
    }

    #[test]
    fn test_engine_from_config_registers_selection() {
        let config = Config::parse("preset = \"minimal\"").unwrap();
        let engine = engine_from_config(&config);
        assert_eq!(engine.rule_names(), vec!["sql-injection", "xss"]);
        assert_eq!(default_engine().len(), 7);
    }
}
