//! Snapshot store: the per-run applied-batch log.
//!
//! Every successful apply appends exactly one record. Records are
//! append-only and ordered by a 1-based sequence number per run; the
//! log is never rewritten, not even by a rollback. Only the
//! highest-sequence record of a run may be rolled back to: rollback is
//! "undo the last apply", not time travel.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One applied batch for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Identifier of the form `snap-<run_id>-<seq>`.
    pub snapshot_id: String,
    /// The owning run.
    pub run_id: String,
    /// Proposal identifiers whose effects this snapshot captures,
    /// in application order.
    pub changed_note_ids: Vec<String>,
}

/// Why a rollback request was allowed or refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackReason {
    /// The requested snapshot is the latest for the run.
    Allowed,
    /// No record with this id exists for this run.
    SnapshotNotFound,
    /// A newer record for the run supersedes this one.
    NotLatestSnapshot,
}

impl RollbackReason {
    /// Returns the wire name of the reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::SnapshotNotFound => "snapshot_not_found",
            Self::NotLatestSnapshot => "not_latest_snapshot",
        }
    }
}

impl std::fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rollback validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackDecision {
    /// Whether the rollback may proceed.
    pub allowed: bool,
    /// Why.
    pub reason: RollbackReason,
}

/// Error for a run with no recorded snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no snapshots recorded for run: {run_id}")]
pub struct NoSnapshotsForRun {
    /// The run without snapshots.
    pub run_id: String,
}

/// Append-only snapshot log, ordered per run.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    records_by_run: Mutex<BTreeMap<String, Vec<SnapshotRecord>>>,
}

impl SnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next snapshot for a run and returns the record.
    ///
    /// Sequence numbers start at 1 and increase by one per append.
    pub fn append_snapshot(&self, run_id: &str, changed_note_ids: Vec<String>) -> SnapshotRecord {
        let mut records = self.records_by_run.lock().expect("snapshot lock poisoned");
        let log = records.entry(run_id.to_string()).or_default();
        let sequence = log.len() + 1;
        let record = SnapshotRecord {
            snapshot_id: format!("snap-{run_id}-{sequence}"),
            run_id: run_id.to_string(),
            changed_note_ids,
        };
        log.push(record.clone());
        record
    }

    /// Returns the most recent snapshot for a run.
    ///
    /// # Errors
    ///
    /// Returns [`NoSnapshotsForRun`] if nothing has been recorded.
    pub fn latest_for_run(&self, run_id: &str) -> Result<SnapshotRecord, NoSnapshotsForRun> {
        let records = self.records_by_run.lock().expect("snapshot lock poisoned");
        records
            .get(run_id)
            .and_then(|log| log.last())
            .cloned()
            .ok_or_else(|| NoSnapshotsForRun {
                run_id: run_id.to_string(),
            })
    }

    /// Validates a rollback request against the latest-only policy.
    #[must_use]
    pub fn validate_rollback(&self, run_id: &str, snapshot_id: &str) -> RollbackDecision {
        let records = self.records_by_run.lock().expect("snapshot lock poisoned");
        let Some(log) = records.get(run_id).filter(|log| !log.is_empty()) else {
            return RollbackDecision {
                allowed: false,
                reason: RollbackReason::SnapshotNotFound,
            };
        };

        if !log.iter().any(|record| record.snapshot_id == snapshot_id) {
            return RollbackDecision {
                allowed: false,
                reason: RollbackReason::SnapshotNotFound,
            };
        }

        // Non-empty log checked above.
        let latest = &log[log.len() - 1];
        if latest.snapshot_id != snapshot_id {
            return RollbackDecision {
                allowed: false,
                reason: RollbackReason::NotLatestSnapshot,
            };
        }

        RollbackDecision {
            allowed: true,
            reason: RollbackReason::Allowed,
        }
    }

    /// Returns every record grouped by run, for persistence.
    #[must_use]
    pub fn export_records(&self) -> BTreeMap<String, Vec<SnapshotRecord>> {
        self.records_by_run
            .lock()
            .expect("snapshot lock poisoned")
            .clone()
    }

    /// Replaces the store contents from persisted records.
    pub fn import_records(&self, records: BTreeMap<String, Vec<SnapshotRecord>>) {
        *self.records_by_run.lock().expect("snapshot lock poisoned") = records;
    }

    /// Returns the total number of records across all runs.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records_by_run
            .lock()
            .expect("snapshot lock poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_snapshot_gets_sequence_one() {
        let store = SnapshotStore::new();
        let record = store.append_snapshot("run_0001", vec!["run_0001-prop-01".to_string()]);
        assert_eq!(record.snapshot_id, "snap-run_0001-1");
        assert_eq!(record.run_id, "run_0001");
        assert_eq!(record.changed_note_ids, vec!["run_0001-prop-01"]);
    }

    #[test]
    fn test_sequences_increase_per_run_independently() {
        let store = SnapshotStore::new();
        let first = store.append_snapshot("run_0001", Vec::new());
        let second = store.append_snapshot("run_0001", Vec::new());
        let other = store.append_snapshot("run_0002", Vec::new());
        assert_eq!(first.snapshot_id, "snap-run_0001-1");
        assert_eq!(second.snapshot_id, "snap-run_0001-2");
        assert_eq!(other.snapshot_id, "snap-run_0002-1");
    }

    #[test]
    fn test_latest_for_run_returns_newest() {
        let store = SnapshotStore::new();
        let _ = store.append_snapshot("run_0001", Vec::new());
        let second = store.append_snapshot("run_0001", Vec::new());
        assert_eq!(store.latest_for_run("run_0001").unwrap(), second);
    }

    #[test]
    fn test_latest_for_run_without_records_fails() {
        let store = SnapshotStore::new();
        let err = store.latest_for_run("run_0404").unwrap_err();
        assert_eq!(err.run_id, "run_0404");
    }

    #[test]
    fn test_only_latest_snapshot_is_rollback_eligible() {
        let store = SnapshotStore::new();
        let first = store.append_snapshot("run_0001", Vec::new());
        let second = store.append_snapshot("run_0001", Vec::new());

        let stale = store.validate_rollback("run_0001", &first.snapshot_id);
        assert!(!stale.allowed);
        assert_eq!(stale.reason, RollbackReason::NotLatestSnapshot);

        let latest = store.validate_rollback("run_0001", &second.snapshot_id);
        assert!(latest.allowed);
        assert_eq!(latest.reason, RollbackReason::Allowed);
    }

    #[test]
    fn test_unknown_snapshot_or_run_is_not_found() {
        let store = SnapshotStore::new();
        let missing_run = store.validate_rollback("run_0404", "snap-run_0404-1");
        assert_eq!(missing_run.reason, RollbackReason::SnapshotNotFound);

        let _ = store.append_snapshot("run_0001", Vec::new());
        let missing_record = store.validate_rollback("run_0001", "snap-run_0001-9");
        assert_eq!(missing_record.reason, RollbackReason::SnapshotNotFound);
    }

    #[test]
    fn test_export_import_round_trip() {
        let store = SnapshotStore::new();
        let _ = store.append_snapshot("run_0001", vec!["a".to_string()]);
        let _ = store.append_snapshot("run_0002", vec!["b".to_string()]);

        let exported = store.export_records();
        let restored = SnapshotStore::new();
        restored.import_records(exported);

        assert_eq!(restored.record_count(), 2);
        assert_eq!(
            restored.latest_for_run("run_0001").unwrap().changed_note_ids,
            vec!["a"]
        );
        // Appending after import continues the sequence.
        let next = restored.append_snapshot("run_0001", Vec::new());
        assert_eq!(next.snapshot_id, "snap-run_0001-2");
    }
}
