//! Workflow coordinator: composes lifecycle, policies, ledger and
//! stores into the engine's operations.
//!
//! Discipline enforced here:
//!
//! - State-changing operations look the run up, verify the current
//!   state, mutate under the run's lock, and move `state` only through
//!   validated transitions.
//! - Idempotency-keyed operations consult the replay ledger before any
//!   side-effecting work and replay the cached response verbatim on a
//!   duplicate, with only the idempotency echo flipped.
//! - Durable state is saved before a mutating operation acknowledges.

pub mod requests;
pub mod responses;

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::adapter::{
    DraftProviderCaller, NullRetrieval, ProviderCaller, RetrievalService,
};
use crate::candidates::{
    DefaultCandidateProvider, NoteCandidateProvider, build_note_prompt, parse_candidate_payload,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::lifecycle::{self, RunState};
use crate::links::score_candidates;
use crate::metrics::EngineMetrics;
use crate::organize::{classify_para, proposed_folder};
use crate::policy::{
    ActionMode, ActionTieringPolicy, BudgetGuardrail, Provider, ProviderRouter, RiskTier,
    RouteReason, RoutingInput, SensitivityGate, SensitivityInput,
};
use crate::profile::{FolderProfile, FolderProfiler, NoteProfile, StaticProfiler};
use crate::publish::{
    ExportFormat, PUBLISH_GATE_THRESHOLD, PublishQueueItem, PublishedItem, prepare_content,
    score_draft,
};
use crate::replay::ReplayLedger;
use crate::run::{
    BatchEntry, BatchSummary, Diagnostic, DiagnosticStage, Proposal, ProposalStatus, Run, RunId,
};
use crate::snapshot::{RollbackReason, SnapshotStore};
use crate::store::persist::{NullStateBackend, PersistedState, StateBackend};
use crate::store::{RunAggregate, RunStore};
use self::requests::{
    AnalyzeFolderRequest, AnalyzeFoldersRequest, ApplyRunRequest, ApproveRunRequest, AskRequest,
    ClassifyNotesRequest, ConfirmPublishRequest, ExportForPublishRequest, LinksApplyRequest,
    LinksProposeRequest, MarkForPublishRequest, ProposalFilter, ProposeStructureRequest,
    PublishPrepareRequest, PublishScoreRequest, RollbackRunRequest, RunFilter, normalize_event_id,
};
use self::responses::{
    AppliedLink, ApplyRunResponse, ApproveRunResponse, AskAnswer, AskBudgetReport, AskResponse,
    ClassifyResponse, ClassifyResult, ExportResponse, FallbackPreview, IdempotencyEcho,
    LinksApplyResponse, LinksProposeResponse, ProposalListResponse, ProviderTrace,
    PublishPrepareResponse, PublishQueueResponse, PublishScoreResponse, PublishedListResponse,
    RetrievalTrace, RollbackRunResponse, RoutingPolicyResponse, RoutingPolicySummary,
    RunListResponse, SensitivityCheckResponse, SensitivityPolicyResponse, SensitivityReport,
    StructureProposal, StructureResponse,
};

/// Idempotency scope for `ask`.
pub const SCOPE_ASK: &str = "ask";
/// Idempotency scope for `links_apply`.
pub const SCOPE_LINKS_APPLY: &str = "links_apply";
/// Idempotency scope for `mark_for_publish`.
pub const SCOPE_PUBLISH_MARK: &str = "publish_mark";
/// Idempotency scope for `export_for_publish`.
pub const SCOPE_PUBLISH_EXPORT: &str = "publish_export";
/// Idempotency scope for `confirm_publish`.
pub const SCOPE_PUBLISH_CONFIRM: &str = "publish_confirm";

/// Citations requested from the retrieval service per ask.
const ASK_CITATION_LIMIT: usize = 5;

#[derive(Debug, Default)]
struct PublishState {
    queue: Vec<PublishQueueItem>,
    published: Vec<PublishedItem>,
}

/// Builder for [`WorkflowEngine`].
pub struct EngineBuilder {
    config: EngineConfig,
    profiler: Option<Box<dyn FolderProfiler>>,
    candidates: Option<Box<dyn NoteCandidateProvider>>,
    retrieval: Option<Box<dyn RetrievalService>>,
    provider: Option<Box<dyn ProviderCaller>>,
    backend: Option<Box<dyn StateBackend>>,
}

impl EngineBuilder {
    /// Sets the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the folder profiler collaborator.
    #[must_use]
    pub fn profiler(mut self, profiler: impl FolderProfiler + 'static) -> Self {
        self.profiler = Some(Box::new(profiler));
        self
    }

    /// Sets the note candidate provider collaborator.
    #[must_use]
    pub fn candidate_provider(mut self, provider: impl NoteCandidateProvider + 'static) -> Self {
        self.candidates = Some(Box::new(provider));
        self
    }

    /// Sets the retrieval collaborator.
    #[must_use]
    pub fn retrieval(mut self, retrieval: impl RetrievalService + 'static) -> Self {
        self.retrieval = Some(Box::new(retrieval));
        self
    }

    /// Sets the provider caller collaborator.
    #[must_use]
    pub fn provider_caller(mut self, provider: impl ProviderCaller + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    /// Sets the durable state backend.
    #[must_use]
    pub fn state_backend(mut self, backend: impl StateBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Builds the engine, restoring persisted state if the backend has
    /// any.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid sensitivity patterns or a failing
    /// state backend.
    pub fn build(self) -> Result<WorkflowEngine, EngineError> {
        let config = self.config;
        let sensitivity = SensitivityGate::new(
            config.sensitivity.protected_tags.clone(),
            config.sensitivity.protected_path_prefixes.clone(),
            config.sensitivity.secret_patterns.clone(),
        )?;

        let backend: Box<dyn StateBackend> = match self.backend {
            Some(backend) => backend,
            None => match &config.state.db_path {
                Some(path) => {
                    Box::new(crate::store::persist::SqliteStateBackend::open(path)?)
                },
                None => Box::new(NullStateBackend),
            },
        };

        let engine = WorkflowEngine {
            tiering: ActionTieringPolicy {
                suggest_threshold: config.tiering.suggest_threshold,
                auto_threshold: config.tiering.auto_threshold,
            },
            budget: BudgetGuardrail {
                warn_70_threshold: config.budget.warn_70_threshold,
                warn_90_threshold: config.budget.warn_90_threshold,
            },
            monthly_spend: config.budget.monthly_spend,
            monthly_cap: config.budget.monthly_cap,
            router: ProviderRouter {
                local_confidence_threshold: config.routing.local_confidence_threshold,
            },
            sensitivity,
            runs: RunStore::new(),
            snapshots: SnapshotStore::new(),
            replay: ReplayLedger::new(),
            caches: Mutex::new(BTreeMap::new()),
            publish: Mutex::new(PublishState::default()),
            profiler: self.profiler.unwrap_or_else(|| Box::new(StaticProfiler::new())),
            candidates: self
                .candidates
                .unwrap_or_else(|| Box::new(DefaultCandidateProvider)),
            retrieval: self.retrieval.unwrap_or_else(|| Box::new(NullRetrieval)),
            provider: self.provider.unwrap_or_else(|| Box::new(DraftProviderCaller)),
            backend,
        };
        engine.restore()?;
        Ok(engine)
    }
}

/// The workflow engine.
///
/// Owns the run/proposal aggregate store, the snapshot log and the
/// replay ledger, and composes the gating policies into every
/// operation.
pub struct WorkflowEngine {
    tiering: ActionTieringPolicy,
    budget: BudgetGuardrail,
    monthly_spend: f64,
    monthly_cap: f64,
    router: ProviderRouter,
    sensitivity: SensitivityGate,
    runs: RunStore,
    snapshots: SnapshotStore,
    replay: ReplayLedger,
    caches: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    publish: Mutex<PublishState>,
    profiler: Box<dyn FolderProfiler>,
    candidates: Box<dyn NoteCandidateProvider>,
    retrieval: Box<dyn RetrievalService>,
    provider: Box<dyn ProviderCaller>,
    backend: Box<dyn StateBackend>,
}

impl WorkflowEngine {
    /// Returns a builder with defaults.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder {
            config: EngineConfig::default(),
            profiler: None,
            candidates: None,
            retrieval: None,
            provider: None,
            backend: None,
        }
    }

    // ------------------------------------------------------------------
    // State-changing operations
    // ------------------------------------------------------------------

    /// Analyzes one folder: creates a run, generates proposals and
    /// drives the run to its terminal analysis state.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank or unprofileable folder
    /// path.
    pub fn analyze_folder(&self, request: &AnalyzeFolderRequest) -> Result<Run, EngineError> {
        request.validate()?;
        let run = self.analyze_single(request.folder_path.trim())?;
        self.persist()?;
        Ok(run)
    }

    /// Analyzes several folders as one parent run over child runs.
    ///
    /// A failing child is recorded as a per-batch diagnostic and does
    /// not abort its siblings; the parent fails only if every child
    /// failed.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty or blank folder list.
    pub fn analyze_folders(&self, request: &AnalyzeFoldersRequest) -> Result<Run, EngineError> {
        request.validate()?;

        let parent_id = self.runs.next_run_id();
        let parent_slot = self.runs.insert(RunAggregate::new(Run::new(
            parent_id.clone(),
            FolderProfile::default(),
        )));
        {
            let mut parent = parent_slot.lock().expect("run slot lock poisoned");
            self.transition(&mut parent.run, RunState::Analyzing)?;
        }

        let mut entries = Vec::with_capacity(request.folder_paths.len());
        let mut diagnostics = Vec::new();
        for folder_path in &request.folder_paths {
            let folder_path = folder_path.trim();
            match self.analyze_single(folder_path) {
                Ok(child) => {
                    if child.state == RunState::FailedNeedsAttention {
                        diagnostics.push(Diagnostic {
                            note_id: None,
                            stage: DiagnosticStage::BatchAnalysis,
                            error: format!("{folder_path}: analysis failed ({})", child.run_id),
                        });
                    }
                    entries.push(BatchEntry {
                        folder_path: folder_path.to_string(),
                        run_id: Some(child.run_id.clone()),
                        state: Some(child.state),
                        error: None,
                    });
                },
                Err(error) => {
                    diagnostics.push(Diagnostic {
                        note_id: None,
                        stage: DiagnosticStage::BatchAnalysis,
                        error: format!("{folder_path}: {error}"),
                    });
                    entries.push(BatchEntry {
                        folder_path: folder_path.to_string(),
                        run_id: None,
                        state: None,
                        error: Some(error.to_string()),
                    });
                },
            }
        }

        let batch_total = entries.len();
        let failed = entries
            .iter()
            .filter(|entry| {
                entry.error.is_some() || entry.state == Some(RunState::FailedNeedsAttention)
            })
            .count();
        let any_unattended = entries
            .iter()
            .any(|entry| entry.state == Some(RunState::ReadySafeAuto));
        let applied_batch_ids: Vec<RunId> = entries
            .iter()
            .filter(|entry| entry.state == Some(RunState::ReadySafeAuto))
            .filter_map(|entry| entry.run_id.clone())
            .collect();

        let parent = {
            let mut parent = parent_slot.lock().expect("run slot lock poisoned");
            parent.run.profile = self.aggregate_profile(&entries);
            parent.run.diagnostics = diagnostics;
            parent.run.batch = Some(BatchSummary {
                batch_total,
                batch_completed: batch_total - failed,
                batches: entries,
                applied_batch_ids,
            });

            if failed == batch_total {
                self.transition(&mut parent.run, RunState::FailedNeedsAttention)?;
            } else if any_unattended {
                self.transition(&mut parent.run, RunState::ReadySafeAuto)?;
            } else {
                self.transition(&mut parent.run, RunState::ReadySafeAuto)?;
                self.transition(&mut parent.run, RunState::AwaitingReview)?;
            }
            parent.run.clone()
        };

        self.persist()?;
        Ok(parent)
    }

    /// Approves matching proposals and transitions the run to
    /// `approved`.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown run and a conflict when the
    /// run state is wrong or nothing matches.
    pub fn approve_run(
        &self,
        run_id: &RunId,
        request: &ApproveRunRequest,
    ) -> Result<ApproveRunResponse, EngineError> {
        let slot = self.run_slot(run_id)?;
        let response = {
            let mut aggregate = slot.lock().expect("run slot lock poisoned");
            if !matches!(
                aggregate.run.state,
                RunState::AwaitingReview | RunState::ReadySafeAuto
            ) {
                return Err(EngineError::conflict(
                    "run state must be awaiting_review or ready_safe_auto",
                ));
            }

            let eligible = Self::eligible_indices(&aggregate.proposals, request.change_types.as_deref());
            if eligible.is_empty() {
                return Err(EngineError::conflict("no matching proposals to approve"));
            }
            for &index in &eligible {
                aggregate.proposals[index].status = ProposalStatus::Approved;
            }

            if aggregate.run.state == RunState::ReadySafeAuto {
                self.transition(&mut aggregate.run, RunState::AwaitingReview)?;
            }
            self.transition(&mut aggregate.run, RunState::Approved)?;

            ApproveRunResponse {
                run_id: run_id.clone(),
                state: aggregate.run.state,
                approved_count: eligible.len(),
            }
        };
        self.persist()?;
        Ok(response)
    }

    /// Applies matching proposals, records exactly one snapshot and
    /// transitions the run to `applied`.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown run and a conflict when the
    /// run is not `approved` or nothing matches.
    pub fn apply_run(
        &self,
        run_id: &RunId,
        request: &ApplyRunRequest,
    ) -> Result<ApplyRunResponse, EngineError> {
        let slot = self.run_slot(run_id)?;
        let response = {
            let mut aggregate = slot.lock().expect("run slot lock poisoned");
            if aggregate.run.state != RunState::Approved {
                return Err(EngineError::conflict("run state must be approved"));
            }

            let eligible = Self::eligible_indices(&aggregate.proposals, request.change_types.as_deref());
            if eligible.is_empty() {
                return Err(EngineError::conflict("no matching proposals to apply"));
            }

            let mut changed_ids = Vec::with_capacity(eligible.len());
            for &index in &eligible {
                aggregate.proposals[index].status = ProposalStatus::Applied;
                changed_ids.push(aggregate.proposals[index].proposal_id.clone());
            }

            let snapshot = self.snapshots.append_snapshot(run_id.as_str(), changed_ids);
            self.transition(&mut aggregate.run, RunState::Applied)?;
            aggregate.run.snapshot_id = Some(snapshot.snapshot_id.clone());

            ApplyRunResponse {
                run_id: run_id.clone(),
                state: aggregate.run.state,
                snapshot_id: snapshot.snapshot_id,
                applied_count: eligible.len(),
            }
        };
        self.persist()?;
        Ok(response)
    }

    /// Rolls a run back to its latest snapshot.
    ///
    /// The snapshot log is not rewound; the run is marked
    /// `rolled_back` and remembers which snapshot was reverted.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown run or snapshot, a validation
    /// error when no snapshot id can be determined, and a conflict for
    /// a non-latest snapshot.
    pub fn rollback_run(
        &self,
        run_id: &RunId,
        request: &RollbackRunRequest,
    ) -> Result<RollbackRunResponse, EngineError> {
        request.validate()?;
        let slot = self.run_slot(run_id)?;
        let response = {
            let mut aggregate = slot.lock().expect("run slot lock poisoned");
            let requested = request
                .snapshot_id
                .as_deref()
                .map(str::trim)
                .map(ToString::to_string)
                .or_else(|| aggregate.run.snapshot_id.clone())
                .ok_or_else(|| EngineError::validation("snapshot_id is required"))?;

            let decision = self.snapshots.validate_rollback(run_id.as_str(), &requested);
            match decision.reason {
                RollbackReason::SnapshotNotFound => {
                    return Err(EngineError::NotFound {
                        entity: "snapshot",
                        id: requested,
                    });
                },
                RollbackReason::NotLatestSnapshot => {
                    return Err(EngineError::conflict(RollbackReason::NotLatestSnapshot.as_str()));
                },
                RollbackReason::Allowed => {},
            }

            self.transition(&mut aggregate.run, RunState::RolledBack)?;
            aggregate.run.rolled_back_snapshot_id = Some(requested.clone());

            RollbackRunResponse {
                run_id: run_id.clone(),
                state: aggregate.run.state,
                rolled_back_snapshot_id: requested,
            }
        };
        self.persist()?;
        Ok(response)
    }

    // ------------------------------------------------------------------
    // Read operations
    // ------------------------------------------------------------------

    /// Returns one run.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown run.
    pub fn get_run(&self, run_id: &RunId) -> Result<Run, EngineError> {
        let slot = self.run_slot(run_id)?;
        let aggregate = slot.lock().expect("run slot lock poisoned");
        Ok(aggregate.run.clone())
    }

    /// Lists runs in run-id order, optionally filtered by state.
    #[must_use]
    pub fn list_runs(&self, filter: &RunFilter) -> RunListResponse {
        let mut runs = Vec::new();
        for run_id in self.runs.ordered_ids() {
            if let Some(slot) = self.runs.get(&run_id) {
                let aggregate = slot.lock().expect("run slot lock poisoned");
                if filter.state.is_none() || filter.state == Some(aggregate.run.state) {
                    runs.push(aggregate.run.clone());
                }
            }
        }
        RunListResponse { runs }
    }

    /// Returns a run's proposals, optionally filtered.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown run.
    pub fn get_run_proposals(
        &self,
        run_id: &RunId,
        filter: &ProposalFilter,
    ) -> Result<ProposalListResponse, EngineError> {
        let slot = self.run_slot(run_id)?;
        let aggregate = slot.lock().expect("run slot lock poisoned");
        let proposals = aggregate
            .proposals
            .iter()
            .filter(|proposal| {
                (filter.risk_tier.is_none() || filter.risk_tier == Some(proposal.risk_tier))
                    && (filter.action_mode.is_none()
                        || filter.action_mode == Some(proposal.action_mode))
                    && (filter.status.is_none() || filter.status == Some(proposal.status))
            })
            .cloned()
            .collect();
        Ok(ProposalListResponse {
            run_id: run_id.clone(),
            proposals,
        })
    }

    /// Evaluates the sensitivity gate for arbitrary material.
    ///
    /// A blocked verdict is a successful response, not an error.
    #[must_use]
    pub fn check_sensitivity(&self, input: &SensitivityInput) -> SensitivityCheckResponse {
        let verdict = self.sensitivity.cloud_eligibility(input);
        SensitivityCheckResponse {
            allowed: verdict.allowed,
            reasons: verdict.reasons,
        }
    }

    /// Summarizes the active sensitivity policy.
    #[must_use]
    pub fn sensitivity_policy(&self) -> SensitivityPolicyResponse {
        SensitivityPolicyResponse {
            protected_tags: self.sensitivity.protected_tags(),
            protected_path_prefixes: self.sensitivity.protected_path_prefixes().to_vec(),
            secret_pattern_count: self.sensitivity.secret_pattern_count(),
        }
    }

    /// Summarizes the routing policy under the current budget.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the configured budget is
    /// malformed.
    pub fn routing_policy(&self) -> Result<RoutingPolicyResponse, EngineError> {
        let budget = self.budget.evaluate(self.monthly_spend, self.monthly_cap)?;
        let threshold = self.router.local_confidence_threshold;
        let low_probe = (threshold - 0.10).max(0.0);

        let preview = FallbackPreview {
            timeout: self
                .router
                .select(RoutingInput {
                    local_confidence: 0.90,
                    local_timed_out: true,
                    grounding_failed: false,
                    cloud_allowed: budget.cloud_allowed,
                })
                .provider,
            grounding_failure: self
                .router
                .select(RoutingInput {
                    local_confidence: 0.90,
                    local_timed_out: false,
                    grounding_failed: true,
                    cloud_allowed: budget.cloud_allowed,
                })
                .provider,
            low_confidence: self
                .router
                .select(RoutingInput {
                    local_confidence: low_probe,
                    local_timed_out: false,
                    grounding_failed: false,
                    cloud_allowed: budget.cloud_allowed,
                })
                .provider,
        };

        Ok(RoutingPolicyResponse {
            routing: RoutingPolicySummary {
                local_provider: Provider::Local,
                fallback_provider: Provider::Cloud,
                local_confidence_threshold: threshold,
                fallback_reasons: vec![
                    RouteReason::Timeout,
                    RouteReason::GroundingFailure,
                    RouteReason::LowConfidence,
                ],
                fallback_preview: preview,
            },
            budget: responses::BudgetReport {
                monthly_spend: self.monthly_spend,
                monthly_cap: self.monthly_cap,
                status: budget.status,
                cloud_allowed: budget.cloud_allowed,
                local_only_mode: budget.local_only_mode,
            },
        })
    }

    /// Returns point-in-time engine counters.
    #[must_use]
    pub fn metrics(&self) -> EngineMetrics {
        let publish = self.publish.lock().expect("publish lock poisoned");
        EngineMetrics {
            runs_total: self.runs.run_count(),
            proposals_total: self.runs.proposal_count(),
            snapshots_total: self.snapshots.record_count(),
            publish_queue_total: publish.queue.len(),
            published_total: publish.published.len(),
        }
    }

    // ------------------------------------------------------------------
    // Idempotent operations
    // ------------------------------------------------------------------

    /// Answers a question, routing between local and cloud under the
    /// composed gates.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed fields and an internal
    /// error for a missing replay cache or failing collaborator.
    pub fn ask(&self, request: &AskRequest) -> Result<AskResponse, EngineError> {
        request.validate()?;
        let event_id = normalize_event_id(request.event_id.as_deref())?;

        if let Some(id) = event_id.as_deref() {
            if let Some(cached) = self.check_duplicate(SCOPE_ASK, id)? {
                let mut response: AskResponse = Self::decode_cached(SCOPE_ASK, id, cached)?;
                response.idempotency = IdempotencyEcho::duplicate(id.to_string());
                return Ok(response);
            }
        }

        let verdict = self.sensitivity.cloud_eligibility(&request.sensitivity);
        let budget = self.budget.evaluate(self.monthly_spend, self.monthly_cap)?;
        let cloud_allowed = request.allow_fallback && verdict.allowed && budget.cloud_allowed;

        let routing = self.router.select(RoutingInput {
            local_confidence: request.local_confidence,
            local_timed_out: request.local_timed_out,
            grounding_failed: request.grounding_failed,
            cloud_allowed,
        });

        let query = request.query.trim();
        let citations = match self.retrieval.retrieve(query, ASK_CITATION_LIMIT) {
            Ok(citations) => citations,
            Err(error) => {
                tracing::warn!(%error, "retrieval failed; answering without citations");
                Vec::new()
            },
        };
        let text = self
            .provider
            .complete(routing.provider, query)
            .map_err(|error| EngineError::Collaborator {
                reason: error.to_string(),
            })?;

        let response = AskResponse {
            answer: AskAnswer {
                text,
                confidence: request.local_confidence,
            },
            provider_trace: ProviderTrace {
                initial: Provider::Local,
                provider: routing.provider,
                fallback_used: routing.fallback_used,
                fallback_provider: routing.fallback_used.then_some(routing.provider),
                fallback_reason: routing.reason,
            },
            sensitivity: SensitivityReport {
                allowed: verdict.allowed,
                reasons: verdict.reasons,
            },
            budget: AskBudgetReport {
                status: budget.status,
                cloud_allowed: budget.cloud_allowed,
                local_only_mode: budget.local_only_mode,
            },
            retrieval_trace: RetrievalTrace {
                requested: ASK_CITATION_LIMIT,
                returned: citations.len(),
            },
            citations,
            idempotency: IdempotencyEcho::accepted(event_id.clone()),
        };

        if let Some(id) = &event_id {
            self.cache_response(SCOPE_ASK, id, &response)?;
            self.persist()?;
        }
        Ok(response)
    }

    /// Proposes links from a source note to candidate notes.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed fields.
    pub fn links_propose(
        &self,
        request: &LinksProposeRequest,
    ) -> Result<LinksProposeResponse, EngineError> {
        request.validate()?;
        let pairs: Vec<(String, String)> = request
            .candidate_notes
            .iter()
            .map(|note| (note.note_id.clone(), note.title.clone()))
            .collect();
        Ok(LinksProposeResponse {
            source_note_id: request.source_note_id.trim().to_string(),
            suggestions: score_candidates(&pairs),
        })
    }

    /// Applies links above the confidence floor. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed fields and an internal
    /// error for a missing replay cache.
    pub fn links_apply(
        &self,
        request: &LinksApplyRequest,
    ) -> Result<LinksApplyResponse, EngineError> {
        request.validate()?;
        let event_id = normalize_event_id(request.event_id.as_deref())?;

        if let Some(id) = event_id.as_deref() {
            if let Some(cached) = self.check_duplicate(SCOPE_LINKS_APPLY, id)? {
                let mut response: LinksApplyResponse =
                    Self::decode_cached(SCOPE_LINKS_APPLY, id, cached)?;
                response.idempotency = IdempotencyEcho::duplicate(id.to_string());
                return Ok(response);
            }
        }

        let applied_links: Vec<AppliedLink> = request
            .links
            .iter()
            .filter(|link| link.confidence >= request.min_confidence)
            .map(|link| AppliedLink {
                target_note_id: link.target_note_id.trim().to_string(),
                confidence: link.confidence,
                status: "applied".to_string(),
            })
            .collect();

        let response = LinksApplyResponse {
            source_note_id: request.source_note_id.trim().to_string(),
            applied_count: applied_links.len(),
            applied_links,
            idempotency: IdempotencyEcho::accepted(event_id.clone()),
        };

        if let Some(id) = &event_id {
            self.cache_response(SCOPE_LINKS_APPLY, id, &response)?;
            self.persist()?;
        }
        Ok(response)
    }

    /// Scores a draft against the publish gate.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed fields.
    pub fn publish_score(
        &self,
        request: &PublishScoreRequest,
    ) -> Result<PublishScoreResponse, EngineError> {
        request.validate()?;
        let scores = score_draft(&request.content);
        Ok(PublishScoreResponse {
            draft_id: request.draft_id.trim().to_string(),
            scores,
            gate_passed: scores.overall >= PUBLISH_GATE_THRESHOLD,
        })
    }

    /// Normalizes a draft for publishing.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed fields.
    pub fn publish_prepare(
        &self,
        request: &PublishPrepareRequest,
    ) -> Result<PublishPrepareResponse, EngineError> {
        request.validate()?;
        Ok(PublishPrepareResponse {
            draft_id: request.draft_id.trim().to_string(),
            target: request.target.trim().to_string(),
            prepared_content: prepare_content(&request.content),
            sanitized: true,
        })
    }

    /// Enqueues a draft for publishing. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed fields and an internal
    /// error for a missing replay cache.
    pub fn mark_for_publish(
        &self,
        request: &MarkForPublishRequest,
    ) -> Result<PublishQueueItem, EngineError> {
        request.validate()?;
        let event_id = normalize_event_id(request.event_id.as_deref())?;

        if let Some(id) = event_id.as_deref() {
            if let Some(cached) = self.check_duplicate(SCOPE_PUBLISH_MARK, id)? {
                let mut item: PublishQueueItem =
                    Self::decode_cached(SCOPE_PUBLISH_MARK, id, cached)?;
                item.idempotency = IdempotencyEcho::duplicate(id.to_string());
                return Ok(item);
            }
        }

        let item = PublishQueueItem {
            draft_id: request.draft_id.trim().to_string(),
            title: request.title.trim().to_string(),
            prepared_content: request.prepared_content.trim().to_string(),
            status: "queued_for_publish".to_string(),
            idempotency: IdempotencyEcho::accepted(event_id.clone()),
        };

        self.publish
            .lock()
            .expect("publish lock poisoned")
            .queue
            .push(item.clone());
        if let Some(id) = &event_id {
            self.cache_response(SCOPE_PUBLISH_MARK, id, &item)?;
        }
        self.persist()?;
        Ok(item)
    }

    /// Lists the publish queue.
    #[must_use]
    pub fn list_publish_queue(&self) -> PublishQueueResponse {
        let publish = self.publish.lock().expect("publish lock poisoned");
        PublishQueueResponse {
            count: publish.queue.len(),
            items: publish.queue.clone(),
        }
    }

    /// Exports a queued draft in the requested format. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown draft, a validation error for
    /// malformed fields, and an internal error for a missing replay
    /// cache.
    pub fn export_for_publish(
        &self,
        request: &ExportForPublishRequest,
    ) -> Result<ExportResponse, EngineError> {
        request.validate()?;
        let event_id = normalize_event_id(request.event_id.as_deref())?;

        if let Some(id) = event_id.as_deref() {
            if let Some(cached) = self.check_duplicate(SCOPE_PUBLISH_EXPORT, id)? {
                let mut response: ExportResponse =
                    Self::decode_cached(SCOPE_PUBLISH_EXPORT, id, cached)?;
                response.idempotency = IdempotencyEcho::duplicate(id.to_string());
                return Ok(response);
            }
        }

        let draft_id = request.draft_id.trim();
        let matched = {
            let publish = self.publish.lock().expect("publish lock poisoned");
            publish
                .queue
                .iter()
                .find(|item| item.draft_id == draft_id)
                .cloned()
        };
        let Some(matched) = matched else {
            return Err(EngineError::NotFound {
                entity: "draft",
                id: draft_id.to_string(),
            });
        };

        let artifact = Self::render_export(&matched, request.format)?;
        let response = ExportResponse {
            draft_id: matched.draft_id,
            format: request.format,
            status: "export_ready".to_string(),
            artifact,
            idempotency: IdempotencyEcho::accepted(event_id.clone()),
        };

        if let Some(id) = &event_id {
            self.cache_response(SCOPE_PUBLISH_EXPORT, id, &response)?;
            self.persist()?;
        }
        Ok(response)
    }

    /// Confirms a draft as published, dequeuing it. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown draft, a validation error for
    /// malformed fields, and an internal error for a missing replay
    /// cache.
    pub fn confirm_publish(
        &self,
        request: &ConfirmPublishRequest,
    ) -> Result<PublishedItem, EngineError> {
        request.validate()?;
        let event_id = normalize_event_id(request.event_id.as_deref())?;

        if let Some(id) = event_id.as_deref() {
            if let Some(cached) = self.check_duplicate(SCOPE_PUBLISH_CONFIRM, id)? {
                let mut item: PublishedItem =
                    Self::decode_cached(SCOPE_PUBLISH_CONFIRM, id, cached)?;
                item.idempotency = IdempotencyEcho::duplicate(id.to_string());
                return Ok(item);
            }
        }

        let draft_id = request.draft_id.trim();
        let published = {
            let mut publish = self.publish.lock().expect("publish lock poisoned");
            let Some(index) = publish
                .queue
                .iter()
                .position(|item| item.draft_id == draft_id)
            else {
                return Err(EngineError::NotFound {
                    entity: "draft",
                    id: draft_id.to_string(),
                });
            };
            let queued = publish.queue.remove(index);
            let item = PublishedItem {
                draft_id: queued.draft_id,
                title: queued.title,
                published_url: request.published_url.trim().to_string(),
                status: "published".to_string(),
                idempotency: IdempotencyEcho::accepted(event_id.clone()),
            };
            publish.published.push(item.clone());
            item
        };

        if let Some(id) = &event_id {
            self.cache_response(SCOPE_PUBLISH_CONFIRM, id, &published)?;
        }
        self.persist()?;
        Ok(published)
    }

    /// Lists published drafts.
    #[must_use]
    pub fn list_published(&self) -> PublishedListResponse {
        let publish = self.publish.lock().expect("publish lock poisoned");
        PublishedListResponse {
            count: publish.published.len(),
            items: publish.published.clone(),
        }
    }

    /// Classifies notes into PARA categories with tiering decisions.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed fields.
    pub fn classify_notes(
        &self,
        request: &ClassifyNotesRequest,
    ) -> Result<ClassifyResponse, EngineError> {
        request.validate()?;
        let mut results = Vec::with_capacity(request.notes.len());
        for note in &request.notes {
            let (primary, confidence) = classify_para(&note.title);
            let action_mode = self.tiering.decide(RiskTier::Low, confidence)?;
            results.push(ClassifyResult {
                note_id: note.note_id.trim().to_string(),
                primary_para: primary,
                secondary_para: Vec::new(),
                confidence,
                action_mode,
            });
        }
        Ok(ClassifyResponse { results })
    }

    /// Proposes standardized folders for notes. Always manual.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed fields.
    pub fn propose_structure(
        &self,
        request: &ProposeStructureRequest,
    ) -> Result<StructureResponse, EngineError> {
        request.validate()?;
        let proposals = request
            .notes
            .iter()
            .map(|note| StructureProposal {
                note_id: note.note_id.trim().to_string(),
                current_folder: note.folder.clone(),
                proposed_folder: proposed_folder(&note.title, &note.folder),
                reason: "folder_standardization".to_string(),
                action_mode: ActionMode::Manual,
            })
            .collect();
        Ok(StructureResponse { proposals })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn run_slot(&self, run_id: &RunId) -> Result<crate::store::RunSlot, EngineError> {
        self.runs.get(run_id).ok_or_else(|| EngineError::NotFound {
            entity: "run",
            id: run_id.to_string(),
        })
    }

    fn transition(&self, run: &mut Run, target: RunState) -> Result<(), EngineError> {
        let entered = lifecycle::try_transition(run.state, target)?;
        tracing::debug!(run_id = %run.run_id, from = %run.state, to = %entered, "run transition");
        run.state = entered;
        Ok(())
    }

    fn eligible_indices(proposals: &[Proposal], change_types: Option<&[crate::run::ChangeType]>) -> Vec<usize> {
        proposals
            .iter()
            .enumerate()
            .filter(|(_, proposal)| {
                matches!(
                    proposal.status,
                    ProposalStatus::Pending | ProposalStatus::Approved
                ) && change_types.is_none_or(|types| types.contains(&proposal.change_type))
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn analyze_single(&self, folder_path: &str) -> Result<Run, EngineError> {
        let profile = self.profiler.profile(folder_path)?;
        let run_id = self.runs.next_run_id();
        tracing::info!(%run_id, folder_path, note_count = profile.note_count, "analysis started");

        let slot = self
            .runs
            .insert(RunAggregate::new(Run::new(run_id.clone(), profile.clone())));
        let mut aggregate = slot.lock().expect("run slot lock poisoned");
        self.transition(&mut aggregate.run, RunState::Analyzing)?;

        let (note_proposals, diagnostics, success_count) =
            self.build_note_proposals(&run_id, &profile.notes)?;
        aggregate.run.diagnostics = diagnostics;

        if success_count == 0 && !aggregate.run.diagnostics.is_empty() {
            self.transition(&mut aggregate.run, RunState::FailedNeedsAttention)?;
        } else if profile.note_count == 0 {
            self.transition(&mut aggregate.run, RunState::ReadySafeAuto)?;
            self.transition(&mut aggregate.run, RunState::AwaitingReview)?;
        } else {
            let proposals = if note_proposals.is_empty() {
                self.default_proposals(&run_id)?
            } else {
                note_proposals
            };
            let any_auto = proposals
                .iter()
                .any(|proposal| proposal.action_mode == ActionMode::Auto);
            aggregate.proposals = proposals;
            if any_auto {
                self.transition(&mut aggregate.run, RunState::ReadySafeAuto)?;
            } else {
                self.transition(&mut aggregate.run, RunState::ReadySafeAuto)?;
                self.transition(&mut aggregate.run, RunState::AwaitingReview)?;
            }
        }
        Ok(aggregate.run.clone())
    }

    fn build_note_proposals(
        &self,
        run_id: &RunId,
        notes: &[NoteProfile],
    ) -> Result<(Vec<Proposal>, Vec<Diagnostic>, usize), EngineError> {
        let mut candidates = Vec::new();
        let mut diagnostics = Vec::new();
        let mut success_count = 0usize;

        for note in notes {
            let note_id = Some(note.note_id.clone()).filter(|id| !id.is_empty());
            let prompt = build_note_prompt(note);
            let raw = match self.candidates.generate(note, &prompt) {
                Ok(raw) => raw,
                Err(error) => {
                    diagnostics.push(Diagnostic {
                        note_id,
                        stage: DiagnosticStage::CandidateGeneration,
                        error: error.to_string(),
                    });
                    continue;
                },
            };
            if raw.trim().is_empty() {
                diagnostics.push(Diagnostic {
                    note_id,
                    stage: DiagnosticStage::CandidateGenerationEmptyOutput,
                    error: "candidate output was empty".to_string(),
                });
                continue;
            }
            let parsed = match parse_candidate_payload(&raw) {
                Ok(parsed) => parsed,
                Err(error) => {
                    diagnostics.push(Diagnostic {
                        note_id,
                        stage: DiagnosticStage::CandidateParse,
                        error: error.to_string(),
                    });
                    continue;
                },
            };
            if parsed.is_empty() {
                diagnostics.push(Diagnostic {
                    note_id,
                    stage: DiagnosticStage::CandidateParseEmptyCandidates,
                    error: "candidate output did not include any proposals".to_string(),
                });
                continue;
            }
            success_count += 1;
            candidates.extend(parsed);
        }

        let mut proposals = Vec::with_capacity(candidates.len());
        for (ordinal, candidate) in candidates.into_iter().enumerate() {
            let action_mode = self.tiering.decide(candidate.risk_tier, candidate.confidence)?;
            proposals.push(Proposal {
                proposal_id: Proposal::id_for(run_id, ordinal + 1),
                change_type: candidate.change_type,
                risk_tier: candidate.risk_tier,
                confidence: candidate.confidence,
                action_mode,
                status: ProposalStatus::Pending,
                note_id: Some(candidate.note_id),
                details: candidate.details,
            });
        }
        Ok((proposals, diagnostics, success_count))
    }

    fn default_proposals(&self, run_id: &RunId) -> Result<Vec<Proposal>, EngineError> {
        let specs = [
            (crate::run::ChangeType::TagEnrichment, RiskTier::Low, 0.85),
            (crate::run::ChangeType::LinkAdd, RiskTier::Medium, 0.72),
        ];
        let mut proposals = Vec::with_capacity(specs.len());
        for (ordinal, (change_type, risk_tier, confidence)) in specs.into_iter().enumerate() {
            let action_mode = self.tiering.decide(risk_tier, confidence)?;
            proposals.push(Proposal {
                proposal_id: Proposal::id_for(run_id, ordinal + 1),
                change_type,
                risk_tier,
                confidence,
                action_mode,
                status: ProposalStatus::Pending,
                note_id: None,
                details: Value::Null,
            });
        }
        Ok(proposals)
    }

    fn aggregate_profile(&self, entries: &[BatchEntry]) -> FolderProfile {
        let mut note_count = 0usize;
        let mut orphan_count = 0usize;
        let mut total_links = 0.0f64;
        for entry in entries {
            let Some(run_id) = &entry.run_id else { continue };
            if let Some(slot) = self.runs.get(run_id) {
                let child = slot.lock().expect("run slot lock poisoned");
                note_count += child.run.profile.note_count;
                orphan_count += child.run.profile.orphan_count;
                total_links +=
                    child.run.profile.link_density * child.run.profile.note_count as f64;
            }
        }
        let link_density = if note_count > 0 {
            total_links / note_count as f64
        } else {
            0.0
        };
        FolderProfile {
            note_count,
            orphan_count,
            link_density,
            notes: Vec::new(),
        }
    }

    /// Replay-ledger check, performed before any side-effecting work.
    ///
    /// Returns the cached response payload on a duplicate, `None` on a
    /// fresh acceptance.
    fn check_duplicate(&self, scope: &str, event_id: &str) -> Result<Option<Value>, EngineError> {
        let outcome = self.replay.apply_event(scope, event_id);
        if !outcome.duplicate {
            return Ok(None);
        }
        let caches = self.caches.lock().expect("replay cache lock poisoned");
        caches
            .get(scope)
            .and_then(|cache| cache.get(event_id))
            .cloned()
            .map(Some)
            .ok_or_else(|| EngineError::ReplayCacheMissing {
                scope: scope.to_string(),
                event_id: event_id.to_string(),
            })
    }

    fn cache_response<T: Serialize>(
        &self,
        scope: &str,
        event_id: &str,
        response: &T,
    ) -> Result<(), EngineError> {
        let value = serde_json::to_value(response).map_err(|error| {
            EngineError::State(crate::store::persist::StateError::Encoding {
                section: "replay",
                detail: error.to_string(),
            })
        })?;
        self.caches
            .lock()
            .expect("replay cache lock poisoned")
            .entry(scope.to_string())
            .or_default()
            .insert(event_id.to_string(), value);
        Ok(())
    }

    fn decode_cached<T: DeserializeOwned>(
        scope: &str,
        event_id: &str,
        cached: Value,
    ) -> Result<T, EngineError> {
        serde_json::from_value(cached).map_err(|error| {
            tracing::error!(scope, event_id, %error, "cached replay response failed to decode");
            EngineError::ReplayCacheMissing {
                scope: scope.to_string(),
                event_id: event_id.to_string(),
            }
        })
    }

    fn persist(&self) -> Result<(), EngineError> {
        let (runs, proposals) = self.runs.export();
        let replay = self
            .caches
            .lock()
            .expect("replay cache lock poisoned")
            .clone();
        let (publish_queue, published) = {
            let publish = self.publish.lock().expect("publish lock poisoned");
            (publish.queue.clone(), publish.published.clone())
        };
        let state = PersistedState {
            run_counter: self.runs.counter(),
            runs,
            proposals,
            snapshots: self.snapshots.export_records(),
            replay,
            publish_queue,
            published,
        };
        self.backend.save(&state)?;
        Ok(())
    }

    fn restore(&self) -> Result<(), EngineError> {
        let Some(state) = self.backend.load()? else {
            return Ok(());
        };
        tracing::info!(
            runs = state.runs.len(),
            scopes = state.replay.len(),
            "restoring persisted engine state"
        );

        self.runs
            .import(state.run_counter, state.runs, state.proposals);
        self.snapshots.import_records(state.snapshots);

        // Re-seed the already-seen sets deterministically from the
        // response caches, in sorted event-id order.
        for (scope, cache) in &state.replay {
            for event_id in cache.keys() {
                let _ = self.replay.apply_event(scope, event_id);
            }
        }
        *self.caches.lock().expect("replay cache lock poisoned") = state.replay;

        let mut publish = self.publish.lock().expect("publish lock poisoned");
        publish.queue = state.publish_queue;
        publish.published = state.published;
        Ok(())
    }

    fn render_export(item: &PublishQueueItem, format: ExportFormat) -> Result<String, EngineError> {
        #[derive(Serialize)]
        struct ExportEnvelope<'a> {
            draft_id: &'a str,
            prepared_content: &'a str,
            title: &'a str,
        }

        let artifact = match format {
            ExportFormat::Markdown => item.prepared_content.clone(),
            ExportFormat::Html => format!("<p>{}</p>", item.prepared_content),
            ExportFormat::Json => serde_json::to_string(&ExportEnvelope {
                draft_id: &item.draft_id,
                prepared_content: &item.prepared_content,
                title: &item.title,
            })
            .map_err(|error| {
                EngineError::State(crate::store::persist::StateError::Encoding {
                    section: "publish_export",
                    detail: error.to_string(),
                })
            })?,
        };
        Ok(artifact)
    }
}
