//! Run lifecycle state machine.
//!
//! A run moves along a linear happy path from intake to verification:
//!
//! ```text
//! queued -> analyzing -> ready_safe_auto -> awaiting_review
//!        -> approved -> applied -> verified
//! ```
//!
//! Three global failure states (`auto_safe_mode`, `rolled_back`,
//! `failed_needs_attention`) are reachable from any non-terminal state.
//! Failure states and `verified` are terminal: once entered, no further
//! transition is legal.
//!
//! Every state mutation in the engine goes through [`try_transition`];
//! nothing writes a run's state field directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Accepted, not yet analyzing.
    Queued,
    /// Analysis in progress.
    Analyzing,
    /// Analysis complete with at least one auto-eligible proposal.
    ReadySafeAuto,
    /// Analysis complete; human review required before approval.
    AwaitingReview,
    /// Proposals approved, not yet applied.
    Approved,
    /// Proposals applied; a snapshot has been recorded.
    Applied,
    /// Applied changes verified. Terminal.
    Verified,
    /// Automation halted as a safety measure. Terminal.
    AutoSafeMode,
    /// The last applied batch was rolled back. Terminal.
    RolledBack,
    /// Analysis or application failed unrecoverably. Terminal.
    FailedNeedsAttention,
}

impl RunState {
    /// Returns the wire name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Analyzing => "analyzing",
            Self::ReadySafeAuto => "ready_safe_auto",
            Self::AwaitingReview => "awaiting_review",
            Self::Approved => "approved",
            Self::Applied => "applied",
            Self::Verified => "verified",
            Self::AutoSafeMode => "auto_safe_mode",
            Self::RolledBack => "rolled_back",
            Self::FailedNeedsAttention => "failed_needs_attention",
        }
    }

    /// Returns all states, in happy-path-then-failure order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Queued,
            Self::Analyzing,
            Self::ReadySafeAuto,
            Self::AwaitingReview,
            Self::Approved,
            Self::Applied,
            Self::Verified,
            Self::AutoSafeMode,
            Self::RolledBack,
            Self::FailedNeedsAttention,
        ]
    }

    /// Returns `true` for the global failure states.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::AutoSafeMode | Self::RolledBack | Self::FailedNeedsAttention
        )
    }

    /// Returns `true` if no transition out of this state is legal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified) || self.is_failure()
    }

    /// The single legal forward successor on the happy path, if any.
    const fn forward_successor(&self) -> Option<Self> {
        match self {
            Self::Queued => Some(Self::Analyzing),
            Self::Analyzing => Some(Self::ReadySafeAuto),
            Self::ReadySafeAuto => Some(Self::AwaitingReview),
            Self::AwaitingReview => Some(Self::Approved),
            Self::Approved => Some(Self::Applied),
            Self::Applied => Some(Self::Verified),
            Self::Verified
            | Self::AutoSafeMode
            | Self::RolledBack
            | Self::FailedNeedsAttention => None,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error for a transition the table does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition: {from} -> {to}")]
pub struct IllegalTransition {
    /// State the run is currently in.
    pub from: RunState,
    /// State the caller attempted to enter.
    pub to: RunState,
}

/// Returns `true` if `current -> target` is a legal transition.
///
/// Failure states are reachable from any non-terminal state. Terminal
/// states (`verified` and the failure states) have no outgoing
/// transitions.
#[must_use]
pub fn can_transition(current: RunState, target: RunState) -> bool {
    if current.is_terminal() {
        return false;
    }
    if target.is_failure() {
        return true;
    }
    current.forward_successor() == Some(target)
}

/// Checks `current -> target` and returns the entered state.
///
/// This is the single transition contract; there is no separate
/// validation path.
///
/// # Errors
///
/// Returns [`IllegalTransition`] naming both states when the table does
/// not allow the move.
pub fn try_transition(current: RunState, target: RunState) -> Result<RunState, IllegalTransition> {
    if can_transition(current, target) {
        Ok(target)
    } else {
        Err(IllegalTransition {
            from: current,
            to: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_legal_in_order() {
        let path = [
            RunState::Queued,
            RunState::Analyzing,
            RunState::ReadySafeAuto,
            RunState::AwaitingReview,
            RunState::Approved,
            RunState::Applied,
            RunState::Verified,
        ];
        for pair in path.windows(2) {
            assert!(can_transition(pair[0], pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_skipping_ahead_is_illegal() {
        assert!(!can_transition(RunState::Queued, RunState::Applied));
        assert!(!can_transition(RunState::Analyzing, RunState::AwaitingReview));
        assert!(!can_transition(RunState::Queued, RunState::Verified));
    }

    #[test]
    fn test_backward_moves_are_illegal() {
        assert!(!can_transition(RunState::Approved, RunState::AwaitingReview));
        assert!(!can_transition(RunState::Applied, RunState::Queued));
    }

    #[test]
    fn test_failure_states_reachable_from_any_non_terminal() {
        for &state in RunState::all() {
            if state.is_terminal() {
                continue;
            }
            assert!(can_transition(state, RunState::AutoSafeMode));
            assert!(can_transition(state, RunState::RolledBack));
            assert!(can_transition(state, RunState::FailedNeedsAttention));
        }
    }

    #[test]
    fn test_verified_has_no_outgoing_transitions() {
        for &target in RunState::all() {
            assert!(!can_transition(RunState::Verified, target));
        }
    }

    #[test]
    fn test_failure_states_are_terminal() {
        for &from in &[
            RunState::AutoSafeMode,
            RunState::RolledBack,
            RunState::FailedNeedsAttention,
        ] {
            for &target in RunState::all() {
                assert!(!can_transition(from, target), "{from} -> {target}");
            }
        }
    }

    #[test]
    fn test_try_transition_reports_both_states() {
        let err = try_transition(RunState::Queued, RunState::Applied).unwrap_err();
        assert_eq!(err.from, RunState::Queued);
        assert_eq!(err.to, RunState::Applied);
        assert_eq!(err.to_string(), "illegal transition: queued -> applied");
    }

    #[test]
    fn test_try_transition_returns_target_on_success() {
        let entered = try_transition(RunState::Queued, RunState::Analyzing).unwrap();
        assert_eq!(entered, RunState::Analyzing);
    }

    #[test]
    fn test_wire_names_round_trip_through_serde() {
        for &state in RunState::all() {
            let encoded = serde_json::to_string(&state).unwrap();
            assert_eq!(encoded, format!("\"{}\"", state.as_str()));
            let decoded: RunState = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, state);
        }
    }
}
