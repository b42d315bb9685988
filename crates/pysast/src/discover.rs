//! Locating and loading `pysast.toml`.

use pysast_core::{Analyzer, AnalyzerError, Config, ConfigError};
use pysast_rules::engine_from_config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Config file names to search for, in priority order.
pub const CONFIG_CANDIDATES: &[&str] = &["pysast.toml", ".pysast.toml"];

/// Finds the nearest config file in `start` or one of its ancestors.
#[must_use]
pub fn find_config(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        CONFIG_CANDIDATES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    })
}

/// Builds an analyzer from configuration text.
///
/// The built-in rules follow the preset, `[analyzer] rules` and
/// `[rules.<name>]` options; `[[pattern-rule]]` entries in the same text
/// are added as declarative rules.
///
/// # Errors
///
/// Returns an error if the TOML is invalid or a pattern rule is malformed.
pub fn analyzer_from_toml(content: &str) -> Result<Analyzer, AnalyzerError> {
    let config = Config::parse(content)?;
    let engine = engine_from_config(&config);
    debug!(rules = ?engine.rule_names(), "built rule registry from config");
    Analyzer::builder()
        .engine(Arc::new(engine))
        .config(config)
        .declarative(content)
        .build()
}

/// Builds an analyzer from a parsed configuration without pattern rules.
///
/// # Errors
///
/// Returns an error if the analyzer cannot be built.
pub fn analyzer_from_config(config: Config) -> Result<Analyzer, AnalyzerError> {
    Analyzer::builder()
        .engine(Arc::new(engine_from_config(&config)))
        .config(config)
        .build()
}

/// Builds an analyzer from a config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its content is invalid.
pub fn analyzer_from_file(path: impl AsRef<Path>) -> Result<Analyzer, AnalyzerError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(config = %path.display(), "loaded configuration");
    analyzer_from_toml(&content)
}

/// Builds an analyzer for the project at `dir`, using the nearest config
/// file or the recommended preset when there is none. Reported paths are
/// relative to `dir`.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be loaded.
pub fn analyzer_for_dir(dir: impl AsRef<Path>) -> Result<Analyzer, AnalyzerError> {
    let dir = dir.as_ref();
    let content = match find_config(dir) {
        Some(path) => {
            info!(config = %path.display(), "using configuration");
            std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })?
        }
        None => {
            debug!(dir = %dir.display(), "no configuration found, using recommended preset");
            String::new()
        }
    };
    let config = Config::parse(&content)?;
    Analyzer::builder()
        .root(dir)
        .engine(Arc::new(engine_from_config(&config)))
        .config(config)
        .declarative(content)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn find_config_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("src/app");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join(".pysast.toml"), "preset = \"minimal\"\n").unwrap();

        assert_eq!(find_config(&nested), Some(dir.path().join(".pysast.toml")));
    }

    #[test]
    fn find_config_prefers_plain_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pysast.toml"), "").unwrap();
        fs::write(dir.path().join(".pysast.toml"), "").unwrap();

        assert_eq!(find_config(dir.path()), Some(dir.path().join("pysast.toml")));
    }

    #[test]
    fn preset_selects_rules() {
        let analyzer = analyzer_from_toml("preset = \"minimal\"\n").unwrap();
        assert_eq!(analyzer.active_rules(), vec!["sql-injection", "xss"]);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = analyzer_from_file("/nonexistent/pysast.toml").unwrap_err();
        assert!(matches!(err, AnalyzerError::Config(ConfigError::Io { .. })));
    }
}
