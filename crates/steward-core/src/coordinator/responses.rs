//! Typed response payloads.
//!
//! Responses of idempotent operations carry an [`IdempotencyEcho`] and
//! are cached verbatim against their event id; a duplicate request gets
//! the cached payload back with only the echo flipped.

use serde::{Deserialize, Serialize};

use crate::adapter::Citation;
use crate::links::LinkSuggestion;
use crate::organize::ParaCategory;
use crate::policy::{ActionMode, BlockReason, BudgetStatus, Provider, RouteReason};
use crate::publish::{DraftScores, ExportFormat, PublishQueueItem, PublishedItem};
use crate::run::{Proposal, Run, RunId};

/// Reason field of an idempotency echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyReason {
    /// The event id was recorded now.
    Accepted,
    /// No event id accompanied the request.
    NotProvided,
    /// The event id had been recorded before.
    DuplicateEventId,
}

/// Idempotency outcome echoed on responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyEcho {
    /// The caller-supplied event id, if any.
    pub event_id: Option<String>,
    /// Whether this response was replayed from cache.
    pub duplicate: bool,
    /// Outcome reason.
    pub reason: IdempotencyReason,
}

impl IdempotencyEcho {
    /// Echo for a freshly executed operation.
    #[must_use]
    pub fn accepted(event_id: Option<String>) -> Self {
        let reason = if event_id.is_some() {
            IdempotencyReason::Accepted
        } else {
            IdempotencyReason::NotProvided
        };
        Self {
            event_id,
            duplicate: false,
            reason,
        }
    }

    /// Echo for a replayed duplicate.
    #[must_use]
    pub fn duplicate(event_id: String) -> Self {
        Self {
            event_id: Some(event_id),
            duplicate: true,
            reason: IdempotencyReason::DuplicateEventId,
        }
    }
}

/// Response for `list_runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunListResponse {
    /// Runs in run-id order.
    pub runs: Vec<Run>,
}

/// Response for `get_run_proposals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalListResponse {
    /// The queried run.
    pub run_id: RunId,
    /// Matching proposals in creation order.
    pub proposals: Vec<Proposal>,
}

/// Response for `approve_run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveRunResponse {
    /// The approved run.
    pub run_id: RunId,
    /// Run state after approval.
    pub state: crate::lifecycle::RunState,
    /// Number of proposals marked approved.
    pub approved_count: usize,
}

/// Response for `apply_run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRunResponse {
    /// The applied run.
    pub run_id: RunId,
    /// Run state after application.
    pub state: crate::lifecycle::RunState,
    /// Snapshot recorded by this apply.
    pub snapshot_id: String,
    /// Number of proposals marked applied.
    pub applied_count: usize,
}

/// Response for `rollback_run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRunResponse {
    /// The rolled-back run.
    pub run_id: RunId,
    /// Run state after rollback.
    pub state: crate::lifecycle::RunState,
    /// Snapshot that was rolled back.
    pub rolled_back_snapshot_id: String,
}

/// Response for `check_sensitivity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivityCheckResponse {
    /// Whether cloud use is permitted for the material.
    pub allowed: bool,
    /// Every reason that blocked it, in check order.
    pub reasons: Vec<BlockReason>,
}

/// Response for `sensitivity_policy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivityPolicyResponse {
    /// Protected tags, sorted.
    pub protected_tags: Vec<String>,
    /// Protected path prefixes, in configuration order.
    pub protected_path_prefixes: Vec<String>,
    /// Number of compiled secret patterns.
    pub secret_pattern_count: usize,
}

/// Budget summary embedded in policy/ask responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetReport {
    /// Spend recorded so far this month.
    pub monthly_spend: f64,
    /// Monthly cap.
    pub monthly_cap: f64,
    /// Severity band.
    pub status: BudgetStatus,
    /// Whether cloud calls remain permitted.
    pub cloud_allowed: bool,
    /// Whether the engine is in local-only mode.
    pub local_only_mode: bool,
}

/// Provider preview for each fallback trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPreview {
    /// Provider selected on a local timeout.
    pub timeout: Provider,
    /// Provider selected on a grounding failure.
    pub grounding_failure: Provider,
    /// Provider selected on low local confidence.
    pub low_confidence: Provider,
}

/// Routing half of the `routing_policy` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicySummary {
    /// The always-first provider.
    pub local_provider: Provider,
    /// The fallback target.
    pub fallback_provider: Provider,
    /// Confidence threshold below which fallback triggers.
    pub local_confidence_threshold: f64,
    /// Trigger reasons that cause fallback.
    pub fallback_reasons: Vec<RouteReason>,
    /// Provider the router would pick per trigger, under the current
    /// budget.
    pub fallback_preview: FallbackPreview,
}

/// Response for `routing_policy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicyResponse {
    /// Routing summary.
    pub routing: RoutingPolicySummary,
    /// Budget summary.
    pub budget: BudgetReport,
}

/// Answer block of an `ask` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskAnswer {
    /// Answer text.
    pub text: String,
    /// Confidence attached to the answer.
    pub confidence: f64,
}

/// Provider trace of an `ask` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTrace {
    /// Where the request started.
    pub initial: Provider,
    /// Provider that produced the answer.
    pub provider: Provider,
    /// Whether a fallback happened.
    pub fallback_used: bool,
    /// Fallback target, when one was used.
    pub fallback_provider: Option<Provider>,
    /// Routing reason.
    pub fallback_reason: RouteReason,
}

/// Sensitivity block of an `ask` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivityReport {
    /// Whether the material was cloud-eligible.
    pub allowed: bool,
    /// Blocking reasons, in check order.
    pub reasons: Vec<BlockReason>,
}

/// Budget block of an `ask` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskBudgetReport {
    /// Severity band.
    pub status: BudgetStatus,
    /// Whether cloud calls were permitted.
    pub cloud_allowed: bool,
    /// Whether the engine was in local-only mode.
    pub local_only_mode: bool,
}

/// Retrieval trace of an `ask` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalTrace {
    /// Citations requested from the retrieval service.
    pub requested: usize,
    /// Citations returned.
    pub returned: usize,
}

/// Response for `ask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    /// The answer.
    pub answer: AskAnswer,
    /// How the answer was routed.
    pub provider_trace: ProviderTrace,
    /// Sensitivity verdict applied to the request.
    pub sensitivity: SensitivityReport,
    /// Budget decision applied to the request.
    pub budget: AskBudgetReport,
    /// Ranked citations backing the answer.
    pub citations: Vec<Citation>,
    /// Retrieval trace.
    pub retrieval_trace: RetrievalTrace,
    /// Idempotency echo.
    pub idempotency: IdempotencyEcho,
}

/// Response for `links_propose`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinksProposeResponse {
    /// Note the suggestions originate from.
    pub source_note_id: String,
    /// Suggestions, highest confidence first.
    pub suggestions: Vec<LinkSuggestion>,
}

/// One applied link in a `links_apply` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedLink {
    /// Link target.
    pub target_note_id: String,
    /// Link confidence.
    pub confidence: f64,
    /// Always `applied`.
    pub status: String,
}

/// Response for `links_apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinksApplyResponse {
    /// Note the links originate from.
    pub source_note_id: String,
    /// Number of links applied.
    pub applied_count: usize,
    /// The applied links.
    pub applied_links: Vec<AppliedLink>,
    /// Idempotency echo.
    pub idempotency: IdempotencyEcho,
}

/// Response for `publish_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishScoreResponse {
    /// Scored draft.
    pub draft_id: String,
    /// Quality scores.
    pub scores: DraftScores,
    /// Whether the draft passes the publish gate.
    pub gate_passed: bool,
}

/// Response for `publish_prepare`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPrepareResponse {
    /// Prepared draft.
    pub draft_id: String,
    /// Publish target.
    pub target: String,
    /// Normalized content.
    pub prepared_content: String,
    /// Always `true` once preparation ran.
    pub sanitized: bool,
}

/// Response for `list_publish_queue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishQueueResponse {
    /// Queue length.
    pub count: usize,
    /// Queued drafts in enqueue order.
    pub items: Vec<PublishQueueItem>,
}

/// Response for `export_for_publish`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResponse {
    /// Exported draft.
    pub draft_id: String,
    /// Export format.
    pub format: ExportFormat,
    /// Always `export_ready`.
    pub status: String,
    /// Rendered artifact.
    pub artifact: String,
    /// Idempotency echo.
    pub idempotency: IdempotencyEcho,
}

/// Response for `list_published`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedListResponse {
    /// Number of published drafts.
    pub count: usize,
    /// Published drafts in confirmation order.
    pub items: Vec<PublishedItem>,
}

/// One classified note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResult {
    /// The classified note.
    pub note_id: String,
    /// Primary PARA category.
    pub primary_para: ParaCategory,
    /// Secondary categories; currently always empty.
    pub secondary_para: Vec<ParaCategory>,
    /// Classification confidence.
    pub confidence: f64,
    /// Tiering decision for acting on the classification.
    pub action_mode: ActionMode,
}

/// Response for `classify_notes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    /// Per-note results in request order.
    pub results: Vec<ClassifyResult>,
}

/// One folder standardization proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureProposal {
    /// The note.
    pub note_id: String,
    /// Where the note lives now.
    pub current_folder: String,
    /// Where the note should live.
    pub proposed_folder: String,
    /// Always `folder_standardization`.
    pub reason: String,
    /// Folder moves are always manual.
    pub action_mode: ActionMode,
}

/// Response for `propose_structure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureResponse {
    /// Per-note proposals in request order.
    pub proposals: Vec<StructureProposal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_echo_reason_depends_on_event_id() {
        let with_id = IdempotencyEcho::accepted(Some("evt-1".to_string()));
        assert_eq!(with_id.reason, IdempotencyReason::Accepted);
        assert!(!with_id.duplicate);

        let without_id = IdempotencyEcho::accepted(None);
        assert_eq!(without_id.reason, IdempotencyReason::NotProvided);
    }

    #[test]
    fn test_duplicate_echo() {
        let echo = IdempotencyEcho::duplicate("evt-1".to_string());
        assert!(echo.duplicate);
        assert_eq!(echo.reason, IdempotencyReason::DuplicateEventId);
        assert_eq!(echo.event_id.as_deref(), Some("evt-1"));
    }

    #[test]
    fn test_echo_wire_format() {
        let echo = IdempotencyEcho::duplicate("evt-1".to_string());
        let value = serde_json::to_value(&echo).unwrap();
        assert_eq!(value["reason"], "duplicate_event_id");
        assert_eq!(value["duplicate"], true);
    }
}
