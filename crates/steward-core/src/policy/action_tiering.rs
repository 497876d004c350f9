//! Action tiering policy: (risk tier, confidence) -> automation mode.
//!
//! High-risk changes are never automated. Medium-risk changes may be
//! surfaced as suggestions above the suggest threshold. Low-risk changes
//! may be applied unattended above the auto threshold. Everything else
//! falls back to `manual`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Automation tier assigned to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionMode {
    /// Eligible for unattended application.
    Auto,
    /// Surfaced as a suggestion; human accepts or declines.
    Suggest,
    /// Requires explicit human action.
    Manual,
}

impl ActionMode {
    /// Returns the wire name of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Suggest => "suggest",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ActionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Risk tier of a proposed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Reversible, low-blast-radius change.
    Low,
    /// Change with moderate review value.
    Medium,
    /// Change that must always be human-driven.
    High,
}

impl RiskTier {
    /// Returns the wire name of the tier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned for confidence values outside `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("confidence must be between 0.0 and 1.0: got {confidence}")]
pub struct ConfidenceOutOfRange {
    /// The rejected confidence value.
    pub confidence: f64,
}

/// Tiering policy with named, overridable thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionTieringPolicy {
    /// Minimum confidence for `suggest` on medium-risk changes.
    pub suggest_threshold: f64,
    /// Minimum confidence for `auto` on low-risk changes.
    pub auto_threshold: f64,
}

impl Default for ActionTieringPolicy {
    fn default() -> Self {
        Self {
            suggest_threshold: 0.70,
            auto_threshold: 0.80,
        }
    }
}

impl ActionTieringPolicy {
    /// Decides the automation mode for a change.
    ///
    /// Pure and deterministic: the same `(risk_tier, confidence)` input
    /// always yields the same mode under a given policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfidenceOutOfRange`] when `confidence` is outside
    /// `[0.0, 1.0]`.
    pub fn decide(
        &self,
        risk_tier: RiskTier,
        confidence: f64,
    ) -> Result<ActionMode, ConfidenceOutOfRange> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ConfidenceOutOfRange { confidence });
        }

        let mode = match risk_tier {
            RiskTier::High => ActionMode::Manual,
            RiskTier::Medium => {
                if confidence >= self.suggest_threshold {
                    ActionMode::Suggest
                } else {
                    ActionMode::Manual
                }
            },
            RiskTier::Low => {
                if confidence >= self.auto_threshold {
                    ActionMode::Auto
                } else {
                    ActionMode::Manual
                }
            },
        };
        Ok(mode)
    }
}
