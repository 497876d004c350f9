//! Budget guardrail: monthly spend against a hard cap.
//!
//! The guardrail is fail-closed at the cap: once utilization reaches
//! 1.0 the engine refuses cloud calls entirely and enters local-only
//! mode. Two warning bands below the cap keep cloud access while
//! signalling pressure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Severity band for budget utilization.
///
/// Ordered by severity; `Ord` follows utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    /// Utilization below the first warning band.
    Normal,
    /// Utilization at or above the 70% band.
    Warn70,
    /// Utilization at or above the 90% band.
    Warn90,
    /// Utilization at or above the cap; cloud access revoked.
    HardStop,
}

impl BudgetStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warn70 => "warn_70",
            Self::Warn90 => "warn_90",
            Self::HardStop => "hard_stop",
        }
    }
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of evaluating spend against the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetDecision {
    /// Severity band.
    pub status: BudgetStatus,
    /// Whether cloud calls remain permitted.
    pub cloud_allowed: bool,
    /// Whether the engine must route everything locally.
    pub local_only_mode: bool,
}

/// Error for malformed spend/cap inputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetInputError {
    /// Spend below zero.
    #[error("spend must be >= 0: got {spend}")]
    NegativeSpend {
        /// The rejected spend value.
        spend: f64,
    },

    /// Cap at or below zero.
    #[error("cap must be > 0: got {cap}")]
    NonPositiveCap {
        /// The rejected cap value.
        cap: f64,
    },
}

/// Budget guardrail with named warning thresholds.
///
/// The hard stop is pinned at utilization 1.0 and is not configurable;
/// only the warning bands move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetGuardrail {
    /// Lower bound of the first warning band (inclusive).
    pub warn_70_threshold: f64,
    /// Lower bound of the second warning band (inclusive).
    pub warn_90_threshold: f64,
}

impl Default for BudgetGuardrail {
    fn default() -> Self {
        Self {
            warn_70_threshold: 0.70,
            warn_90_threshold: 0.90,
        }
    }
}

impl BudgetGuardrail {
    /// Evaluates spend against the cap.
    ///
    /// Thresholds are inclusive at their lower bound: utilization of
    /// exactly 0.90 lands in `warn_90`, not `warn_70`.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetInputError`] for negative spend or a
    /// non-positive cap.
    pub fn evaluate(&self, spend: f64, cap: f64) -> Result<BudgetDecision, BudgetInputError> {
        if spend < 0.0 {
            return Err(BudgetInputError::NegativeSpend { spend });
        }
        if cap <= 0.0 {
            return Err(BudgetInputError::NonPositiveCap { cap });
        }

        let utilization = spend / cap;
        let decision = if utilization >= 1.0 {
            BudgetDecision {
                status: BudgetStatus::HardStop,
                cloud_allowed: false,
                local_only_mode: true,
            }
        } else if utilization >= self.warn_90_threshold {
            BudgetDecision {
                status: BudgetStatus::Warn90,
                cloud_allowed: true,
                local_only_mode: false,
            }
        } else if utilization >= self.warn_70_threshold {
            BudgetDecision {
                status: BudgetStatus::Warn70,
                cloud_allowed: true,
                local_only_mode: false,
            }
        } else {
            BudgetDecision {
                status: BudgetStatus::Normal,
                cloud_allowed: true,
                local_only_mode: false,
            }
        };
        Ok(decision)
    }
}
