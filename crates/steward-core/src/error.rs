//! Engine error taxonomy.
//!
//! Four genuine error kinds cross the coordinator boundary:
//! validation, not-found, state conflict and internal. Policy-driven
//! downgrades (a blocked cloud call, a duplicate event id) are *not*
//! errors; they travel inside successful responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::IllegalTransition;
use crate::policy::{BudgetInputError, ConfidenceOutOfRange};
use crate::profile::ProfileError;
use crate::store::persist::StateError;

/// Coarse error classification for transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing request fields; caller-fixable.
    Validation,
    /// A referenced entity does not exist.
    NotFound,
    /// The operation is illegal in the entity's current state.
    Conflict,
    /// Engine-internal failure (persistence, replay-cache gap).
    Internal,
}

/// Error surfaced by coordinator operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Malformed or missing request fields.
    #[error("{reason}")]
    Validation {
        /// What was wrong with the request.
        reason: String,
    },

    /// A referenced entity does not exist.
    #[error("unknown {entity}: {id}")]
    NotFound {
        /// Entity kind ("run", "draft", "snapshot").
        entity: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// The operation is illegal in the current lifecycle state, or the
    /// aggregate has nothing the operation could act on.
    #[error("{reason}")]
    StateConflict {
        /// Why the operation is illegal right now.
        reason: String,
    },

    /// A duplicate event id arrived but its cached response is gone.
    ///
    /// This indicates a crash window between ledger accept and cache
    /// write; the caller cannot fix it.
    #[error("missing replay cache for duplicate event: scope={scope}, event_id={event_id}")]
    ReplayCacheMissing {
        /// Idempotency scope.
        scope: String,
        /// The duplicate event id.
        event_id: String,
    },

    /// An external collaborator (provider caller, publish adapter)
    /// failed.
    #[error("collaborator failure: {reason}")]
    Collaborator {
        /// What the collaborator reported.
        reason: String,
    },

    /// Durable state could not be saved or loaded.
    #[error(transparent)]
    State(#[from] StateError),
}

impl EngineError {
    /// Convenience constructor for validation failures.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for state conflicts.
    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::StateConflict {
            reason: reason.into(),
        }
    }

    /// Returns the coarse classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::StateConflict { .. } => ErrorKind::Conflict,
            Self::ReplayCacheMissing { .. } | Self::Collaborator { .. } | Self::State(_) => {
                ErrorKind::Internal
            },
        }
    }
}

impl From<IllegalTransition> for EngineError {
    fn from(error: IllegalTransition) -> Self {
        Self::StateConflict {
            reason: error.to_string(),
        }
    }
}

impl From<ConfidenceOutOfRange> for EngineError {
    fn from(error: ConfidenceOutOfRange) -> Self {
        Self::Validation {
            reason: error.to_string(),
        }
    }
}

impl From<BudgetInputError> for EngineError {
    fn from(error: BudgetInputError) -> Self {
        Self::Validation {
            reason: error.to_string(),
        }
    }
}

impl From<ProfileError> for EngineError {
    fn from(error: ProfileError) -> Self {
        Self::Validation {
            reason: error.to_string(),
        }
    }
}

impl From<crate::policy::SensitivityConfigError> for EngineError {
    fn from(error: crate::policy::SensitivityConfigError) -> Self {
        Self::Validation {
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::RunState;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            EngineError::validation("bad").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::NotFound {
                entity: "run",
                id: "run_0404".to_string()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(EngineError::conflict("nope").kind(), ErrorKind::Conflict);
        assert_eq!(
            EngineError::ReplayCacheMissing {
                scope: "ask".to_string(),
                event_id: "evt".to_string()
            }
            .kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_illegal_transition_maps_to_conflict() {
        let err: EngineError = IllegalTransition {
            from: RunState::Queued,
            to: RunState::Applied,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "illegal transition: queued -> applied");
    }

    #[test]
    fn test_not_found_message_names_entity_and_id() {
        let err = EngineError::NotFound {
            entity: "run",
            id: "run_0404".to_string(),
        };
        assert_eq!(err.to_string(), "unknown run: run_0404");
    }
}
