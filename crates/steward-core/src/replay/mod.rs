//! Idempotent event replay ledger.
//!
//! The ledger records which `(scope, event_id)` pairs have been
//! accepted. The first application of a pair is accepted; every later
//! application of the same pair reports a duplicate without side
//! effects. Scopes are independent: the same event id may be accepted
//! once per scope.
//!
//! Accepted ids are retained for the life of the process and restored
//! verbatim from persisted state. There is deliberately no eviction or
//! TTL; retention is unbounded.
//!
//! # Concurrency
//!
//! [`ReplayLedger::apply_event`] is an atomic check-and-set: of N
//! concurrent applications of the same pair, exactly one is accepted.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Wire reason accompanying an apply outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayReason {
    /// First time this pair was seen.
    Accepted,
    /// The pair was seen before.
    DuplicateEventId,
}

impl ReplayReason {
    /// Returns the wire name of the reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::DuplicateEventId => "duplicate_event_id",
        }
    }
}

impl std::fmt::Display for ReplayReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of applying an event id within a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyEventOutcome {
    /// The event was recorded now.
    pub accepted: bool,
    /// The event had been recorded before.
    pub duplicate: bool,
    /// Wire reason for the outcome.
    pub reason: ReplayReason,
}

impl ApplyEventOutcome {
    const fn accepted() -> Self {
        Self {
            accepted: true,
            duplicate: false,
            reason: ReplayReason::Accepted,
        }
    }

    const fn duplicate() -> Self {
        Self {
            accepted: false,
            duplicate: true,
            reason: ReplayReason::DuplicateEventId,
        }
    }
}

#[derive(Debug, Default)]
struct ScopeLedger {
    seen: HashSet<String>,
    order: Vec<String>,
}

/// Per-scope idempotency ledger.
#[derive(Debug, Default)]
pub struct ReplayLedger {
    scopes: Mutex<BTreeMap<String, ScopeLedger>>,
}

impl ReplayLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event id within a scope, atomically.
    ///
    /// The check and the insert happen under one lock, so two racing
    /// callers with the same pair observe exactly one acceptance.
    #[must_use]
    pub fn apply_event(&self, scope: &str, event_id: &str) -> ApplyEventOutcome {
        let mut scopes = self.scopes.lock().expect("replay ledger lock poisoned");
        let ledger = scopes.entry(scope.to_string()).or_default();
        if ledger.seen.contains(event_id) {
            return ApplyEventOutcome::duplicate();
        }
        ledger.seen.insert(event_id.to_string());
        ledger.order.push(event_id.to_string());
        ApplyEventOutcome::accepted()
    }

    /// Returns the accepted event ids for a scope in first-seen order.
    #[must_use]
    pub fn replay_order(&self, scope: &str) -> Vec<String> {
        let scopes = self.scopes.lock().expect("replay ledger lock poisoned");
        scopes
            .get(scope)
            .map(|ledger| ledger.order.clone())
            .unwrap_or_default()
    }

    /// Returns how many event ids a scope has accepted.
    #[must_use]
    pub fn accepted_count(&self, scope: &str) -> usize {
        let scopes = self.scopes.lock().expect("replay ledger lock poisoned");
        scopes.get(scope).map_or(0, |ledger| ledger.order.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_first_apply_is_accepted() {
        let ledger = ReplayLedger::new();
        let outcome = ledger.apply_event("ask", "evt-1");
        assert!(outcome.accepted);
        assert!(!outcome.duplicate);
        assert_eq!(outcome.reason, ReplayReason::Accepted);
    }

    #[test]
    fn test_second_apply_is_duplicate() {
        let ledger = ReplayLedger::new();
        let _ = ledger.apply_event("ask", "evt-1");
        let outcome = ledger.apply_event("ask", "evt-1");
        assert!(!outcome.accepted);
        assert!(outcome.duplicate);
        assert_eq!(outcome.reason, ReplayReason::DuplicateEventId);
    }

    #[test]
    fn test_event_ids_are_independent_across_scopes() {
        let ledger = ReplayLedger::new();
        assert!(ledger.apply_event("ask", "evt-1").accepted);
        assert!(ledger.apply_event("links_apply", "evt-1").accepted);
        assert!(ledger.apply_event("ask", "evt-1").duplicate);
    }

    #[test]
    fn test_replay_order_is_first_seen_order() {
        let ledger = ReplayLedger::new();
        let _ = ledger.apply_event("ask", "c");
        let _ = ledger.apply_event("ask", "a");
        let _ = ledger.apply_event("ask", "c");
        let _ = ledger.apply_event("ask", "b");
        assert_eq!(ledger.replay_order("ask"), vec!["c", "a", "b"]);
        assert_eq!(ledger.accepted_count("ask"), 3);
    }

    #[test]
    fn test_unknown_scope_has_empty_order() {
        let ledger = ReplayLedger::new();
        assert!(ledger.replay_order("missing").is_empty());
        assert_eq!(ledger.accepted_count("missing"), 0);
    }

    #[test]
    fn test_concurrent_applies_yield_exactly_one_acceptance() {
        let ledger = Arc::new(ReplayLedger::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = Arc::clone(&ledger);
            handles.push(thread::spawn(move || {
                ledger.apply_event("ask", "race-evt")
            }));
        }
        let outcomes: Vec<ApplyEventOutcome> = handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect();
        let accepted = outcomes.iter().filter(|outcome| outcome.accepted).count();
        let duplicates = outcomes.iter().filter(|outcome| outcome.duplicate).count();
        assert_eq!(accepted, 1);
        assert_eq!(duplicates, 15);
    }
}
