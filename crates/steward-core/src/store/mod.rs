//! Aggregate store for runs and their proposals.
//!
//! Locking is two-level: an outer `RwLock` guards the id-to-slot map
//! and is held only long enough to look a slot up or insert one; each
//! slot is an `Arc<Mutex<RunAggregate>>` whose lock serializes every
//! read-then-write sequence against that run. Operations on different
//! runs never contend with each other.

pub mod persist;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::run::{Proposal, Run, RunId};

/// A run together with its proposals, mutated as one unit.
#[derive(Debug, Clone)]
pub struct RunAggregate {
    /// The run.
    pub run: Run,
    /// Proposals scoped to the run, in creation order.
    pub proposals: Vec<Proposal>,
}

impl RunAggregate {
    /// Wraps a run with no proposals yet.
    #[must_use]
    pub fn new(run: Run) -> Self {
        Self {
            run,
            proposals: Vec::new(),
        }
    }
}

/// Shared handle to one run's aggregate.
pub type RunSlot = Arc<Mutex<RunAggregate>>;

/// Store of all run aggregates with per-run mutual exclusion.
#[derive(Debug, Default)]
pub struct RunStore {
    slots: RwLock<BTreeMap<RunId, RunSlot>>,
    counter: Mutex<u64>,
}

impl RunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next run id.
    #[must_use]
    pub fn next_run_id(&self) -> RunId {
        let mut counter = self.counter.lock().expect("run counter lock poisoned");
        *counter += 1;
        RunId::from_counter(*counter)
    }

    /// Returns the current run counter.
    #[must_use]
    pub fn counter(&self) -> u64 {
        *self.counter.lock().expect("run counter lock poisoned")
    }

    /// Inserts an aggregate and returns its slot.
    pub fn insert(&self, aggregate: RunAggregate) -> RunSlot {
        let run_id = aggregate.run.run_id.clone();
        let slot = Arc::new(Mutex::new(aggregate));
        self.slots
            .write()
            .expect("run store lock poisoned")
            .insert(run_id, Arc::clone(&slot));
        slot
    }

    /// Looks up the slot for a run.
    #[must_use]
    pub fn get(&self, run_id: &RunId) -> Option<RunSlot> {
        self.slots
            .read()
            .expect("run store lock poisoned")
            .get(run_id)
            .cloned()
    }

    /// Returns all run ids in assignment order.
    #[must_use]
    pub fn ordered_ids(&self) -> Vec<RunId> {
        self.slots
            .read()
            .expect("run store lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Returns the number of runs.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.slots.read().expect("run store lock poisoned").len()
    }

    /// Returns the total number of proposals across all runs.
    #[must_use]
    pub fn proposal_count(&self) -> usize {
        let slots = self.slots.read().expect("run store lock poisoned");
        slots
            .values()
            .map(|slot| slot.lock().expect("run slot lock poisoned").proposals.len())
            .sum()
    }

    /// Clones every aggregate out of the store, for persistence.
    ///
    /// Each slot lock is taken briefly in turn; callers must not hold
    /// any slot lock while exporting.
    #[must_use]
    pub fn export(&self) -> (BTreeMap<RunId, Run>, BTreeMap<RunId, Vec<Proposal>>) {
        let slots = self.slots.read().expect("run store lock poisoned");
        let mut runs = BTreeMap::new();
        let mut proposals = BTreeMap::new();
        for (run_id, slot) in slots.iter() {
            let aggregate = slot.lock().expect("run slot lock poisoned");
            runs.insert(run_id.clone(), aggregate.run.clone());
            proposals.insert(run_id.clone(), aggregate.proposals.clone());
        }
        (runs, proposals)
    }

    /// Replaces the store contents from persisted state.
    pub fn import(
        &self,
        counter: u64,
        runs: BTreeMap<RunId, Run>,
        mut proposals: BTreeMap<RunId, Vec<Proposal>>,
    ) {
        let mut slots = self.slots.write().expect("run store lock poisoned");
        slots.clear();
        for (run_id, run) in runs {
            let run_proposals = proposals.remove(&run_id).unwrap_or_default();
            slots.insert(
                run_id,
                Arc::new(Mutex::new(RunAggregate {
                    run,
                    proposals: run_proposals,
                })),
            );
        }
        *self.counter.lock().expect("run counter lock poisoned") = counter;
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::profile::FolderProfile;

    fn aggregate(counter: u64) -> RunAggregate {
        RunAggregate::new(Run::new(RunId::from_counter(counter), FolderProfile::default()))
    }

    #[test]
    fn test_next_run_id_is_monotonic() {
        let store = RunStore::new();
        assert_eq!(store.next_run_id().as_str(), "run_0001");
        assert_eq!(store.next_run_id().as_str(), "run_0002");
        assert_eq!(store.counter(), 2);
    }

    #[test]
    fn test_insert_then_get_returns_same_slot() {
        let store = RunStore::new();
        let slot = store.insert(aggregate(1));
        let fetched = store.get(&RunId::from_counter(1)).unwrap();
        assert!(Arc::ptr_eq(&slot, &fetched));
    }

    #[test]
    fn test_missing_run_returns_none() {
        let store = RunStore::new();
        assert!(store.get(&RunId::from_counter(7)).is_none());
    }

    #[test]
    fn test_ordered_ids_follow_assignment_order() {
        let store = RunStore::new();
        for counter in [3, 1, 2] {
            let _ = store.insert(aggregate(counter));
        }
        let ids: Vec<String> = store
            .ordered_ids()
            .iter()
            .map(|id| id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["run_0001", "run_0002", "run_0003"]);
    }

    #[test]
    fn test_export_import_round_trip() {
        let store = RunStore::new();
        let _ = store.next_run_id();
        let _ = store.insert(aggregate(1));
        let (runs, proposals) = store.export();

        let restored = RunStore::new();
        restored.import(1, runs, proposals);
        assert_eq!(restored.counter(), 1);
        assert_eq!(restored.run_count(), 1);
        assert_eq!(restored.next_run_id().as_str(), "run_0002");
    }

    #[test]
    fn test_concurrent_id_assignment_never_repeats() {
        let store = Arc::new(RunStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                (0..50)
                    .map(|_| store.next_run_id())
                    .collect::<Vec<RunId>>()
            }));
        }
        let mut all: Vec<RunId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("worker panicked"))
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
        assert_eq!(store.counter(), total as u64);
    }
}
