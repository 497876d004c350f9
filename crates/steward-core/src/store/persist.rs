//! Durable state snapshot: the persistence seam and its backends.
//!
//! The engine defines *what* must be persisted ([`PersistedState`])
//! and a [`StateBackend`] seam; the storage engine behind the seam is
//! replaceable. The default backend is `SQLite` in WAL mode storing one
//! JSON value per state section, written transactionally.
//!
//! Saves happen synchronously before an operation's response is
//! returned, so durable state never lags what a caller was told was
//! accepted.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::publish::{PublishQueueItem, PublishedItem};
use crate::run::{Proposal, Run, RunId};
use crate::snapshot::SnapshotRecord;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Errors from the persistence layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateError {
    /// Database error from `SQLite`.
    #[error("state database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A persisted section could not be encoded or decoded.
    #[error("state encoding error for section {section}: {detail}")]
    Encoding {
        /// The section being processed.
        section: &'static str,
        /// Serde detail.
        detail: String,
    },
}

/// Everything the engine must be able to reload after a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Run counter; the next run gets `counter + 1`.
    pub run_counter: u64,
    /// All runs keyed by id.
    pub runs: BTreeMap<RunId, Run>,
    /// Proposals keyed by owning run.
    pub proposals: BTreeMap<RunId, Vec<Proposal>>,
    /// Snapshot records keyed by owning run.
    pub snapshots: BTreeMap<String, Vec<SnapshotRecord>>,
    /// Accepted-response caches keyed by scope, then event id.
    ///
    /// Reload reconstructs each scope's already-seen set from these
    /// keys, in sorted order, so duplicate detection survives
    /// restarts.
    pub replay: BTreeMap<String, BTreeMap<String, Value>>,
    /// Drafts queued for publishing.
    pub publish_queue: Vec<PublishQueueItem>,
    /// Published drafts.
    pub published: Vec<PublishedItem>,
}

/// Persistence seam between the engine and its storage.
pub trait StateBackend: Send + Sync {
    /// Writes the full state snapshot durably.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the write fails; the calling
    /// operation must then fail rather than acknowledge.
    fn save(&self, state: &PersistedState) -> Result<(), StateError>;

    /// Loads the last saved snapshot, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when stored data cannot be read or
    /// decoded.
    fn load(&self) -> Result<Option<PersistedState>, StateError>;
}

/// Backend that keeps nothing. Used for ephemeral engines and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStateBackend;

impl StateBackend for NullStateBackend {
    fn save(&self, _state: &PersistedState) -> Result<(), StateError> {
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedState>, StateError> {
        Ok(None)
    }
}

/// `SQLite`-backed state store.
///
/// The connection is guarded by a mutex; saves are serialized, which
/// is fine because the engine saves a full snapshot per mutating
/// operation.
#[derive(Debug)]
pub struct SqliteStateBackend {
    conn: Mutex<Connection>,
}

const SECTIONS: &[&str] = &[
    "run_counter",
    "runs",
    "proposals",
    "snapshots",
    "replay",
    "publish_queue",
    "published",
];

impl SqliteStateBackend {
    /// Opens (or creates) the state database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the database cannot be opened or
    /// the schema cannot be applied.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory database. Test helper.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn encode<T: Serialize>(section: &'static str, value: &T) -> Result<String, StateError> {
        serde_json::to_string(value).map_err(|error| StateError::Encoding {
            section,
            detail: error.to_string(),
        })
    }

    fn decode<T: for<'de> Deserialize<'de>>(
        section: &'static str,
        raw: &str,
    ) -> Result<T, StateError> {
        serde_json::from_str(raw).map_err(|error| StateError::Encoding {
            section,
            detail: error.to_string(),
        })
    }
}

impl StateBackend for SqliteStateBackend {
    fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        let encoded = [
            ("run_counter", Self::encode("run_counter", &state.run_counter)?),
            ("runs", Self::encode("runs", &state.runs)?),
            ("proposals", Self::encode("proposals", &state.proposals)?),
            ("snapshots", Self::encode("snapshots", &state.snapshots)?),
            ("replay", Self::encode("replay", &state.replay)?),
            (
                "publish_queue",
                Self::encode("publish_queue", &state.publish_queue)?,
            ),
            ("published", Self::encode("published", &state.published)?),
        ];

        let mut conn = self.conn.lock().expect("state backend lock poisoned");
        let tx = conn.transaction()?;
        for (key, value) in &encoded {
            tx.execute(
                "INSERT INTO engine_state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedState>, StateError> {
        let conn = self.conn.lock().expect("state backend lock poisoned");
        let mut stmt = conn.prepare("SELECT key, value FROM engine_state")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut sections: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            if SECTIONS.contains(&key.as_str()) {
                sections.insert(key, value);
            }
        }
        if sections.is_empty() {
            return Ok(None);
        }

        let mut state = PersistedState::default();
        if let Some(raw) = sections.get("run_counter") {
            state.run_counter = Self::decode("run_counter", raw)?;
        }
        if let Some(raw) = sections.get("runs") {
            state.runs = Self::decode("runs", raw)?;
        }
        if let Some(raw) = sections.get("proposals") {
            state.proposals = Self::decode("proposals", raw)?;
        }
        if let Some(raw) = sections.get("snapshots") {
            state.snapshots = Self::decode("snapshots", raw)?;
        }
        if let Some(raw) = sections.get("replay") {
            state.replay = Self::decode("replay", raw)?;
        }
        if let Some(raw) = sections.get("publish_queue") {
            state.publish_queue = Self::decode("publish_queue", raw)?;
        }
        if let Some(raw) = sections.get("published") {
            state.published = Self::decode("published", raw)?;
        }
        Ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::FolderProfile;

    fn sample_state() -> PersistedState {
        let run_id = RunId::from_counter(1);
        let mut state = PersistedState {
            run_counter: 1,
            ..PersistedState::default()
        };
        state
            .runs
            .insert(run_id.clone(), Run::new(run_id.clone(), FolderProfile::default()));
        state.proposals.insert(run_id, Vec::new());
        state.snapshots.insert(
            "run_0001".to_string(),
            vec![SnapshotRecord {
                snapshot_id: "snap-run_0001-1".to_string(),
                run_id: "run_0001".to_string(),
                changed_note_ids: vec!["run_0001-prop-01".to_string()],
            }],
        );
        state
            .replay
            .entry("ask".to_string())
            .or_default()
            .insert("evt-1".to_string(), serde_json::json!({"cached": true}));
        state
    }

    #[test]
    fn test_null_backend_loads_nothing() {
        let backend = NullStateBackend;
        backend.save(&sample_state()).unwrap();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_empty_database_loads_none() {
        let backend = SqliteStateBackend::open_in_memory().unwrap();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let backend = SqliteStateBackend::open_in_memory().unwrap();
        let state = sample_state();
        backend.save(&state).unwrap();
        let loaded = backend.load().unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_second_save_overwrites_first() {
        let backend = SqliteStateBackend::open_in_memory().unwrap();
        backend.save(&sample_state()).unwrap();

        let mut updated = sample_state();
        updated.run_counter = 7;
        backend.save(&updated).unwrap();

        let loaded = backend.load().unwrap().unwrap();
        assert_eq!(loaded.run_counter, 7);
    }

    #[test]
    fn test_on_disk_round_trip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        let state = sample_state();
        {
            let backend = SqliteStateBackend::open(&path).unwrap();
            backend.save(&state).unwrap();
        }

        let backend = SqliteStateBackend::open(&path).unwrap();
        let loaded = backend.load().unwrap().unwrap();
        assert_eq!(loaded, state);
    }
}
