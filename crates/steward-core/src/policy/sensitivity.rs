//! Sensitivity gate: decides whether note material may leave the device.
//!
//! Four independent checks run against frontmatter flags, tags, the
//! normalized path, and the content body. All matching reasons are
//! collected rather than short-circuited, so a caller sees everything
//! that blocked a note. The content check alone stops after the first
//! matching secret pattern.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default tag names that block cloud use.
pub const DEFAULT_PROTECTED_TAGS: &[&str] = &["private", "sensitive", "secret"];

/// Default path prefixes that block cloud use.
pub const DEFAULT_PROTECTED_PATH_PREFIXES: &[&str] = &["private/", "secrets/", "finance/"];

/// Default secret-like content patterns.
pub const DEFAULT_SECRET_PATTERNS: &[&str] = &[r"\bOPENAI_API_KEY\b", r"\bsk-[A-Za-z0-9_-]{8,}\b"];

/// Why a note was ruled cloud-ineligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Frontmatter carries a `sensitive` or `private` flag.
    BlockedByFrontmatterFlag,
    /// A tag is in the protected set.
    BlockedByTagRule,
    /// The path starts with a protected prefix.
    BlockedByPathRule,
    /// The content matched a secret-like pattern.
    BlockedByRegexPattern,
}

impl BlockReason {
    /// Returns the wire name of the reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BlockedByFrontmatterFlag => "blocked_by_frontmatter_flag",
            Self::BlockedByTagRule => "blocked_by_tag_rule",
            Self::BlockedByPathRule => "blocked_by_path_rule",
            Self::BlockedByRegexPattern => "blocked_by_regex_pattern",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Frontmatter privacy flags considered by the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontmatterFlags {
    /// The note is marked sensitive.
    #[serde(default)]
    pub sensitive: bool,
    /// The note is marked private.
    #[serde(default, rename = "private")]
    pub private_flag: bool,
}

/// Material evaluated by the gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensitivityInput {
    /// Frontmatter privacy flags.
    #[serde(default)]
    pub frontmatter: FrontmatterFlags,
    /// Note tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Note path relative to the vault root.
    #[serde(default)]
    pub path: String,
    /// Note content body.
    #[serde(default)]
    pub content: String,
}

/// Gate verdict with every matching reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivityVerdict {
    /// `true` when no rule matched.
    pub allowed: bool,
    /// All reasons that blocked cloud use, in check order.
    pub reasons: Vec<BlockReason>,
}

/// Error raised while compiling gate configuration.
#[derive(Debug, Error)]
pub enum SensitivityConfigError {
    /// A configured secret pattern is not a valid regular expression.
    #[error("invalid secret pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern source.
        pattern: String,
        /// The regex compile error.
        #[source]
        source: regex::Error,
    },
}

/// Cloud-eligibility gate with compiled rules.
#[derive(Debug)]
pub struct SensitivityGate {
    protected_tags: Vec<String>,
    protected_path_prefixes: Vec<String>,
    secret_patterns: Vec<Regex>,
}

impl Default for SensitivityGate {
    fn default() -> Self {
        // The default patterns are static and known-valid.
        Self::new(
            DEFAULT_PROTECTED_TAGS.iter().map(ToString::to_string),
            DEFAULT_PROTECTED_PATH_PREFIXES
                .iter()
                .map(ToString::to_string),
            DEFAULT_SECRET_PATTERNS.iter().map(ToString::to_string),
        )
        .expect("default secret patterns compile")
    }
}

impl SensitivityGate {
    /// Builds a gate from rule sources, compiling the secret patterns.
    ///
    /// Tags are normalized to lowercase at construction so matching is
    /// case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`SensitivityConfigError`] for an invalid pattern.
    pub fn new(
        protected_tags: impl IntoIterator<Item = String>,
        protected_path_prefixes: impl IntoIterator<Item = String>,
        secret_patterns: impl IntoIterator<Item = String>,
    ) -> Result<Self, SensitivityConfigError> {
        let mut compiled = Vec::new();
        for pattern in secret_patterns {
            let regex =
                Regex::new(&pattern).map_err(|source| SensitivityConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            compiled.push(regex);
        }
        Ok(Self {
            protected_tags: protected_tags
                .into_iter()
                .map(|tag| tag.to_lowercase())
                .collect(),
            protected_path_prefixes: protected_path_prefixes.into_iter().collect(),
            secret_patterns: compiled,
        })
    }

    /// Returns the protected tag set, sorted.
    #[must_use]
    pub fn protected_tags(&self) -> Vec<String> {
        let mut tags = self.protected_tags.clone();
        tags.sort();
        tags
    }

    /// Returns the protected path prefixes in configuration order.
    #[must_use]
    pub fn protected_path_prefixes(&self) -> &[String] {
        &self.protected_path_prefixes
    }

    /// Returns how many secret patterns are compiled.
    #[must_use]
    pub fn secret_pattern_count(&self) -> usize {
        self.secret_patterns.len()
    }

    /// Evaluates cloud eligibility for one note's material.
    ///
    /// All checks run; reasons accumulate in check order. Only the
    /// content scan stops at its first matching pattern.
    #[must_use]
    pub fn cloud_eligibility(&self, input: &SensitivityInput) -> SensitivityVerdict {
        let mut reasons = Vec::new();

        if input.frontmatter.sensitive || input.frontmatter.private_flag {
            reasons.push(BlockReason::BlockedByFrontmatterFlag);
        }

        if input
            .tags
            .iter()
            .any(|tag| self.protected_tags.contains(&tag.to_lowercase()))
        {
            reasons.push(BlockReason::BlockedByTagRule);
        }

        let normalized_path = input.path.trim().to_lowercase().replace('\\', "/");
        if self
            .protected_path_prefixes
            .iter()
            .any(|prefix| normalized_path.starts_with(prefix.as_str()))
        {
            reasons.push(BlockReason::BlockedByPathRule);
        }

        if self
            .secret_patterns
            .iter()
            .any(|pattern| pattern.is_match(&input.content))
        {
            reasons.push(BlockReason::BlockedByRegexPattern);
        }

        SensitivityVerdict {
            allowed: reasons.is_empty(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(path: &str, content: &str) -> SensitivityInput {
        SensitivityInput {
            frontmatter: FrontmatterFlags::default(),
            tags: Vec::new(),
            path: path.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_clean_note_is_allowed() {
        let verdict = SensitivityGate::default().cloud_eligibility(&input(
            "notes/atlas.md",
            "Plain content with nothing secret in it.",
        ));
        assert!(verdict.allowed);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_frontmatter_flags_block() {
        let gate = SensitivityGate::default();
        for flags in [
            FrontmatterFlags {
                sensitive: true,
                private_flag: false,
            },
            FrontmatterFlags {
                sensitive: false,
                private_flag: true,
            },
        ] {
            let verdict = gate.cloud_eligibility(&SensitivityInput {
                frontmatter: flags,
                ..SensitivityInput::default()
            });
            assert!(!verdict.allowed);
            assert_eq!(verdict.reasons, vec![BlockReason::BlockedByFrontmatterFlag]);
        }
    }

    #[test]
    fn test_tag_matching_is_case_insensitive() {
        let gate = SensitivityGate::default();
        let verdict = gate.cloud_eligibility(&SensitivityInput {
            tags: vec!["Secret".to_string()],
            ..SensitivityInput::default()
        });
        assert_eq!(verdict.reasons, vec![BlockReason::BlockedByTagRule]);
    }

    #[test]
    fn test_path_is_normalized_before_prefix_match() {
        let gate = SensitivityGate::default();
        let verdict = gate.cloud_eligibility(&input("  Private\\taxes.md", ""));
        assert_eq!(verdict.reasons, vec![BlockReason::BlockedByPathRule]);
    }

    #[test]
    fn test_secret_pattern_blocks_content() {
        let gate = SensitivityGate::default();
        let verdict =
            gate.cloud_eligibility(&input("notes/a.md", "export OPENAI_API_KEY=abc123"));
        assert_eq!(verdict.reasons, vec![BlockReason::BlockedByRegexPattern]);

        let verdict = gate.cloud_eligibility(&input("notes/a.md", "token sk-abcDEF123456 here"));
        assert_eq!(verdict.reasons, vec![BlockReason::BlockedByRegexPattern]);
    }

    #[test]
    fn test_content_scan_reports_one_reason_for_multiple_patterns() {
        let gate = SensitivityGate::default();
        let verdict = gate.cloud_eligibility(&input(
            "notes/a.md",
            "OPENAI_API_KEY and also sk-abcDEF123456",
        ));
        assert_eq!(verdict.reasons, vec![BlockReason::BlockedByRegexPattern]);
    }

    #[test]
    fn test_all_reasons_accumulate_in_check_order() {
        let gate = SensitivityGate::default();
        let verdict = gate.cloud_eligibility(&SensitivityInput {
            frontmatter: FrontmatterFlags {
                sensitive: true,
                private_flag: false,
            },
            tags: vec!["private".to_string()],
            path: "secrets/keys.md".to_string(),
            content: "sk-abcDEF123456".to_string(),
        });
        assert!(!verdict.allowed);
        assert_eq!(
            verdict.reasons,
            vec![
                BlockReason::BlockedByFrontmatterFlag,
                BlockReason::BlockedByTagRule,
                BlockReason::BlockedByPathRule,
                BlockReason::BlockedByRegexPattern,
            ]
        );
    }

    #[test]
    fn test_invalid_pattern_is_a_config_error() {
        let result = SensitivityGate::new(
            Vec::new(),
            Vec::new(),
            vec!["[unclosed".to_string()],
        );
        assert!(matches!(
            result,
            Err(SensitivityConfigError::InvalidPattern { .. })
        ));
    }
}
