//! Steward core: a transactional workflow engine for automatically
//! generated change proposals.
//!
//! The engine governs how generated change proposals to a body of
//! content move from analysis through human review to irreversible
//! application, with safe rollback and exactly-once semantics for
//! client-retried operations.
//!
//! # Architecture
//!
//! ```text
//! request
//!    |
//!    v
//! WorkflowEngine (coordinator)
//!    |-- ReplayLedger ........ idempotency check before side effects
//!    |-- gating policies ..... tiering / budget / sensitivity / routing
//!    |-- RunLifecycle ........ validated state transitions
//!    |-- RunStore ............ per-run locked aggregates
//!    |-- SnapshotStore ....... append-only applied-batch log
//!    '-- StateBackend ........ durable snapshot before ack
//! ```
//!
//! Folder scanning, retrieval, model invocation and publish writes are
//! external collaborators behind the traits in [`profile`],
//! [`candidates`] and [`adapter`].
//!
//! # Example
//!
//! ```rust
//! use steward_core::coordinator::WorkflowEngine;
//! use steward_core::coordinator::requests::{AnalyzeFolderRequest, ApproveRunRequest};
//! use steward_core::profile::{FolderProfile, StaticProfiler};
//!
//! # fn main() -> Result<(), steward_core::error::EngineError> {
//! let profiler = StaticProfiler::new().with_profile(
//!     "vault/notes",
//!     FolderProfile {
//!         note_count: 1,
//!         orphan_count: 0,
//!         link_density: 2.0,
//!         notes: Vec::new(),
//!     },
//! );
//! let engine = WorkflowEngine::builder().profiler(profiler).build()?;
//!
//! let run = engine.analyze_folder(&AnalyzeFolderRequest {
//!     folder_path: "vault/notes".to_string(),
//! })?;
//! let approved = engine.approve_run(&run.run_id, &ApproveRunRequest::default())?;
//! println!("{} is now {}", approved.run_id, approved.state);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod candidates;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod links;
pub mod metrics;
pub mod organize;
pub mod policy;
pub mod profile;
pub mod publish;
pub mod replay;
pub mod run;
pub mod snapshot;
pub mod store;

pub use config::EngineConfig;
pub use coordinator::{EngineBuilder, WorkflowEngine};
pub use error::{EngineError, ErrorKind};
pub use lifecycle::RunState;
pub use policy::{ActionMode, RiskTier};
pub use run::{ChangeType, Proposal, ProposalStatus, Run, RunId};
