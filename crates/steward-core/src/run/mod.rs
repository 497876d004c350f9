//! Run and proposal aggregate types.
//!
//! A [`Run`] is one analysis/workflow instance; its [`Proposal`]s are
//! the candidate changes produced by analysis. Runs are never deleted;
//! they are retained for audit and replay.

use serde::{Deserialize, Serialize};

use crate::lifecycle::RunState;
use crate::policy::{ActionMode, RiskTier};
use crate::profile::FolderProfile;

/// Opaque, monotonically assigned run identifier.
///
/// The textual form (`run_0001`) sorts lexicographically in assignment
/// order, which gives deterministic listing order.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Builds the id for the `counter`-th run.
    #[must_use]
    pub fn from_counter(counter: u64) -> Self {
        Self(format!("run_{counter:04}"))
    }

    /// Returns the textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Category of a proposed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Add or refine tags on a note.
    TagEnrichment,
    /// Add a link between notes.
    LinkAdd,
    /// Move a note to a standardized folder.
    FolderStandardization,
}

impl ChangeType {
    /// Returns the wire name of the change type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TagEnrichment => "tag_enrichment",
            Self::LinkAdd => "link_add",
            Self::FolderStandardization => "folder_standardization",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Review status of a proposal. Monotonic within a run's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Produced by analysis, not yet reviewed.
    Pending,
    /// Approved for application.
    Approved,
    /// Applied; immutable from here on.
    Applied,
}

impl ProposalStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Applied => "applied",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One candidate change scoped to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Identifier of the form `<run_id>-prop-<ordinal>`.
    pub proposal_id: String,
    /// Category of the change.
    pub change_type: ChangeType,
    /// Risk tier assessed during analysis.
    pub risk_tier: RiskTier,
    /// Analysis confidence in `[0, 1]`.
    pub confidence: f64,
    /// Automation mode; always consistent with the tiering policy.
    pub action_mode: ActionMode,
    /// Review status.
    pub status: ProposalStatus,
    /// Source note, when the proposal came from note analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    /// Free-form details from candidate generation.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl Proposal {
    /// Builds the proposal id for the `ordinal`-th proposal of a run.
    #[must_use]
    pub fn id_for(run_id: &RunId, ordinal: usize) -> String {
        format!("{run_id}-prop-{ordinal:02}")
    }
}

/// Stage at which a per-item failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStage {
    /// The candidate provider errored.
    CandidateGeneration,
    /// The candidate provider returned nothing usable.
    CandidateGenerationEmptyOutput,
    /// The candidate payload failed validation.
    CandidateParse,
    /// The candidate payload contained no proposals.
    CandidateParseEmptyCandidates,
    /// A child batch of a multi-folder analysis failed.
    BatchAnalysis,
}

impl DiagnosticStage {
    /// Returns the wire name of the stage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CandidateGeneration => "candidate_generation",
            Self::CandidateGenerationEmptyOutput => "candidate_generation_empty_output",
            Self::CandidateParse => "candidate_parse",
            Self::CandidateParseEmptyCandidates => "candidate_parse_empty_candidates",
            Self::BatchAnalysis => "batch_analysis",
        }
    }
}

/// One per-item failure record attached to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The failed note, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    /// Stage that failed.
    pub stage: DiagnosticStage,
    /// Failure description.
    pub error: String,
}

/// One child entry of a multi-folder batch analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Folder the child analyzed.
    pub folder_path: String,
    /// Child run id, when analysis produced a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// Child terminal state, when analysis produced a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,
    /// Failure description, when the child never produced a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregation fields carried by a parent run over child batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of requested batches.
    pub batch_total: usize,
    /// Batches whose analysis produced a non-failed run.
    pub batch_completed: usize,
    /// Per-child outcomes, in request order.
    pub batches: Vec<BatchEntry>,
    /// Child run ids that ended ready for unattended changes.
    pub applied_batch_ids: Vec<RunId>,
}

/// One analysis/workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Monotonically assigned identifier.
    pub run_id: RunId,
    /// Lifecycle state; mutated only through validated transitions.
    pub state: RunState,
    /// Profile delivered by the folder analyzer.
    pub profile: FolderProfile,
    /// Per-item failure records, in discovery order.
    pub diagnostics: Vec<Diagnostic>,
    /// Last applied snapshot, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    /// Snapshot a rollback reverted, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_snapshot_id: Option<String>,
    /// Batch aggregation, when this run is a parent over child runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchSummary>,
}

impl Run {
    /// Creates a run in the `queued` state.
    #[must_use]
    pub fn new(run_id: RunId, profile: FolderProfile) -> Self {
        Self {
            run_id,
            state: RunState::Queued,
            profile,
            diagnostics: Vec::new(),
            snapshot_id: None,
            rolled_back_snapshot_id: None,
            batch: None,
        }
    }
}
