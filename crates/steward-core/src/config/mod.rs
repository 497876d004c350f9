//! Engine configuration parsing and defaults.
//!
//! Configuration is TOML; every section and field has a default, so an
//! empty file (or no file) yields a working engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::sensitivity::{
    DEFAULT_PROTECTED_PATH_PREFIXES, DEFAULT_PROTECTED_TAGS, DEFAULT_SECRET_PATTERNS,
};

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Budget section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSettings {
    /// Monthly cloud-spend cap.
    #[serde(default = "default_monthly_cap")]
    pub monthly_cap: f64,
    /// Spend recorded so far this month.
    #[serde(default)]
    pub monthly_spend: f64,
    /// First warning band lower bound.
    #[serde(default = "default_warn_70")]
    pub warn_70_threshold: f64,
    /// Second warning band lower bound.
    #[serde(default = "default_warn_90")]
    pub warn_90_threshold: f64,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            monthly_cap: default_monthly_cap(),
            monthly_spend: 0.0,
            warn_70_threshold: default_warn_70(),
            warn_90_threshold: default_warn_90(),
        }
    }
}

/// Action tiering section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieringSettings {
    /// Minimum confidence for `suggest` on medium risk.
    #[serde(default = "default_suggest_threshold")]
    pub suggest_threshold: f64,
    /// Minimum confidence for `auto` on low risk.
    #[serde(default = "default_auto_threshold")]
    pub auto_threshold: f64,
}

impl Default for TieringSettings {
    fn default() -> Self {
        Self {
            suggest_threshold: default_suggest_threshold(),
            auto_threshold: default_auto_threshold(),
        }
    }
}

/// Provider routing section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSettings {
    /// Local confidence below this value triggers fallback.
    #[serde(default = "default_local_confidence_threshold")]
    pub local_confidence_threshold: f64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            local_confidence_threshold: default_local_confidence_threshold(),
        }
    }
}

/// Sensitivity gate section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivitySettings {
    /// Tags that block cloud use.
    #[serde(default = "default_protected_tags")]
    pub protected_tags: Vec<String>,
    /// Path prefixes that block cloud use.
    #[serde(default = "default_protected_path_prefixes")]
    pub protected_path_prefixes: Vec<String>,
    /// Secret-like content patterns (regex source strings).
    #[serde(default = "default_secret_patterns")]
    pub secret_patterns: Vec<String>,
}

impl Default for SensitivitySettings {
    fn default() -> Self {
        Self {
            protected_tags: default_protected_tags(),
            protected_path_prefixes: default_protected_path_prefixes(),
            secret_patterns: default_secret_patterns(),
        }
    }
}

/// Durable state section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSettings {
    /// State database path; absent keeps the engine memory-only.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Budget guardrail settings.
    #[serde(default)]
    pub budget: BudgetSettings,
    /// Action tiering settings.
    #[serde(default)]
    pub tiering: TieringSettings,
    /// Provider routing settings.
    #[serde(default)]
    pub routing: RoutingSettings,
    /// Sensitivity gate settings.
    #[serde(default)]
    pub sensitivity: SensitivitySettings,
    /// Durable state settings.
    #[serde(default)]
    pub state: StateSettings,
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn default_monthly_cap() -> f64 {
    30.0
}

fn default_warn_70() -> f64 {
    0.70
}

fn default_warn_90() -> f64 {
    0.90
}

fn default_suggest_threshold() -> f64 {
    0.70
}

fn default_auto_threshold() -> f64 {
    0.80
}

fn default_local_confidence_threshold() -> f64 {
    0.70
}

fn default_protected_tags() -> Vec<String> {
    DEFAULT_PROTECTED_TAGS
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_protected_path_prefixes() -> Vec<String> {
    DEFAULT_PROTECTED_PATH_PREFIXES
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_secret_patterns() -> Vec<String> {
    DEFAULT_SECRET_PATTERNS
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!((config.budget.monthly_cap - 30.0).abs() < f64::EPSILON);
        assert!((config.tiering.auto_threshold - 0.80).abs() < f64::EPSILON);
        assert!(config.state.db_path.is_none());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [budget]
            monthly_cap = 50.0
            monthly_spend = 12.5
            "#,
        )
        .unwrap();
        assert!((config.budget.monthly_cap - 50.0).abs() < f64::EPSILON);
        assert!((config.budget.monthly_spend - 12.5).abs() < f64::EPSILON);
        assert!((config.budget.warn_90_threshold - 0.90).abs() < f64::EPSILON);
        assert_eq!(config.tiering, TieringSettings::default());
    }

    #[test]
    fn test_sensitivity_overrides_replace_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [sensitivity]
            protected_tags = ["internal"]
            protected_path_prefixes = ["legal/"]
            secret_patterns = ["\\bAWS_SECRET\\b"]
            "#,
        )
        .unwrap();
        assert_eq!(config.sensitivity.protected_tags, vec!["internal"]);
        assert_eq!(config.sensitivity.protected_path_prefixes, vec!["legal/"]);
        assert_eq!(config.sensitivity.secret_patterns, vec![r"\bAWS_SECRET\b"]);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = EngineConfig::default();
        let rendered = config.to_toml().unwrap();
        let reparsed = EngineConfig::from_toml(&rendered).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let result = EngineConfig::from_toml("[budget\nmonthly_cap = 1");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
