//! Typed request schemas, validated once at the coordinator boundary.
//!
//! Each operation has its own request struct. Enumerated fields reject
//! unknown values at deserialization; the `validate` methods cover what
//! types alone cannot (blank strings, empty lists). Once a request
//! passes validation the coordinator trusts it.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::lifecycle::RunState;
use crate::policy::sensitivity::SensitivityInput;
use crate::policy::{ActionMode, RiskTier};
use crate::publish::ExportFormat;
use crate::run::ChangeType;

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Normalizes an optional event id: trims it and rejects blanks.
///
/// # Errors
///
/// Returns a validation error for a present-but-blank event id.
pub fn normalize_event_id(event_id: Option<&str>) -> Result<Option<String>, EngineError> {
    match event_id {
        None => Ok(None),
        Some(raw) if is_blank(raw) => Err(EngineError::validation(
            "event_id must be a non-empty string",
        )),
        Some(raw) => Ok(Some(raw.trim().to_string())),
    }
}

/// Request for `analyze_folder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeFolderRequest {
    /// Folder to analyze.
    pub folder_path: String,
}

impl AnalyzeFolderRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank folder path.
    pub fn validate(&self) -> Result<(), EngineError> {
        if is_blank(&self.folder_path) {
            return Err(EngineError::validation("folder_path is required"));
        }
        Ok(())
    }
}

/// Request for `analyze_folders` (multi-folder batch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeFoldersRequest {
    /// Folders to analyze, one child run each.
    pub folder_paths: Vec<String>,
}

impl AnalyzeFoldersRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty list or a blank entry.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.folder_paths.is_empty() {
            return Err(EngineError::validation(
                "folder_paths must be a non-empty list",
            ));
        }
        if self.folder_paths.iter().any(|path| is_blank(path)) {
            return Err(EngineError::validation(
                "folder_paths entries must be non-empty strings",
            ));
        }
        Ok(())
    }
}

/// Filter for `list_runs`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFilter {
    /// Keep only runs in this state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,
}

/// Filter for `get_run_proposals`.
///
/// Unknown filter keys are rejected at deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposalFilter {
    /// Keep only proposals with this risk tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_tier: Option<RiskTier>,
    /// Keep only proposals with this action mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_mode: Option<ActionMode>,
    /// Keep only proposals with this status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<crate::run::ProposalStatus>,
}

/// Request for `approve_run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRunRequest {
    /// Restrict approval to these change types; `None` approves all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_types: Option<Vec<ChangeType>>,
}

/// Request for `apply_run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRunRequest {
    /// Restrict application to these change types; `None` applies all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_types: Option<Vec<ChangeType>>,
}

/// Request for `rollback_run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRunRequest {
    /// Snapshot to roll back to; defaults to the run's last applied
    /// snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
}

impl RollbackRunRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a present-but-blank snapshot id.
    pub fn validate(&self) -> Result<(), EngineError> {
        if let Some(snapshot_id) = &self.snapshot_id {
            if is_blank(snapshot_id) {
                return Err(EngineError::validation("snapshot_id is required"));
            }
        }
        Ok(())
    }
}

/// Request for the idempotent `ask` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    /// The question.
    pub query: String,
    /// Idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Caller opt-in to cloud fallback.
    #[serde(default = "default_true")]
    pub allow_fallback: bool,
    /// Confidence reported by the local attempt.
    #[serde(default = "default_local_confidence")]
    pub local_confidence: f64,
    /// The local attempt timed out.
    #[serde(default)]
    pub local_timed_out: bool,
    /// The local answer failed grounding.
    #[serde(default)]
    pub grounding_failed: bool,
    /// Material for the sensitivity gate.
    #[serde(flatten)]
    pub sensitivity: SensitivityInput,
}

impl AskRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank query or event id.
    pub fn validate(&self) -> Result<(), EngineError> {
        if is_blank(&self.query) {
            return Err(EngineError::validation("query is required"));
        }
        let _ = normalize_event_id(self.event_id.as_deref())?;
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_local_confidence() -> f64 {
    0.85
}

/// A note reference carried by classify/links requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRef {
    /// Note identifier.
    pub note_id: String,
    /// Note title.
    pub title: String,
}

impl NoteRef {
    fn validate(&self, what: &str) -> Result<(), EngineError> {
        if is_blank(&self.note_id) {
            return Err(EngineError::validation(format!(
                "{what} note_id is required"
            )));
        }
        if is_blank(&self.title) {
            return Err(EngineError::validation(format!("{what} title is required")));
        }
        Ok(())
    }
}

/// Request for `links_propose`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinksProposeRequest {
    /// Note the links would originate from.
    pub source_note_id: String,
    /// Candidate targets.
    pub candidate_notes: Vec<NoteRef>,
}

impl LinksProposeRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields or an empty
    /// candidate list.
    pub fn validate(&self) -> Result<(), EngineError> {
        if is_blank(&self.source_note_id) {
            return Err(EngineError::validation("source_note_id is required"));
        }
        if self.candidate_notes.is_empty() {
            return Err(EngineError::validation(
                "candidate_notes must be a non-empty list",
            ));
        }
        for note in &self.candidate_notes {
            note.validate("candidate")?;
        }
        Ok(())
    }
}

/// One link to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkInput {
    /// Link target.
    pub target_note_id: String,
    /// Suggestion confidence.
    pub confidence: f64,
}

/// Request for the idempotent `links_apply` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinksApplyRequest {
    /// Note the links originate from.
    pub source_note_id: String,
    /// Idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Links to apply.
    pub links: Vec<LinkInput>,
    /// Links below this confidence are skipped.
    #[serde(default)]
    pub min_confidence: f64,
}

impl LinksApplyRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields or an empty link
    /// list.
    pub fn validate(&self) -> Result<(), EngineError> {
        if is_blank(&self.source_note_id) {
            return Err(EngineError::validation("source_note_id is required"));
        }
        let _ = normalize_event_id(self.event_id.as_deref())?;
        if self.links.is_empty() {
            return Err(EngineError::validation("links must be a non-empty list"));
        }
        for link in &self.links {
            if is_blank(&link.target_note_id) {
                return Err(EngineError::validation("target_note_id is required"));
            }
        }
        Ok(())
    }
}

/// Request for `publish_score`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishScoreRequest {
    /// Draft identifier.
    pub draft_id: String,
    /// Draft content to score.
    pub content: String,
}

impl PublishScoreRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields.
    pub fn validate(&self) -> Result<(), EngineError> {
        if is_blank(&self.draft_id) {
            return Err(EngineError::validation("draft_id is required"));
        }
        if is_blank(&self.content) {
            return Err(EngineError::validation("content is required"));
        }
        Ok(())
    }
}

/// Request for `publish_prepare`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPrepareRequest {
    /// Draft identifier.
    pub draft_id: String,
    /// Draft content to prepare.
    pub content: String,
    /// Publish target.
    pub target: String,
}

impl PublishPrepareRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields.
    pub fn validate(&self) -> Result<(), EngineError> {
        if is_blank(&self.draft_id) {
            return Err(EngineError::validation("draft_id is required"));
        }
        if is_blank(&self.content) {
            return Err(EngineError::validation("content is required"));
        }
        if is_blank(&self.target) {
            return Err(EngineError::validation("target is required"));
        }
        Ok(())
    }
}

/// Request for the idempotent `mark_for_publish` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkForPublishRequest {
    /// Idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Draft identifier.
    pub draft_id: String,
    /// Draft title.
    pub title: String,
    /// Content prepared by `publish_prepare`.
    pub prepared_content: String,
}

impl MarkForPublishRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields.
    pub fn validate(&self) -> Result<(), EngineError> {
        let _ = normalize_event_id(self.event_id.as_deref())?;
        if is_blank(&self.draft_id) {
            return Err(EngineError::validation("draft_id is required"));
        }
        if is_blank(&self.title) {
            return Err(EngineError::validation("title is required"));
        }
        if is_blank(&self.prepared_content) {
            return Err(EngineError::validation("prepared_content is required"));
        }
        Ok(())
    }
}

/// Request for the idempotent `export_for_publish` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportForPublishRequest {
    /// Idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Draft identifier.
    pub draft_id: String,
    /// Export format.
    pub format: ExportFormat,
}

impl ExportForPublishRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields.
    pub fn validate(&self) -> Result<(), EngineError> {
        let _ = normalize_event_id(self.event_id.as_deref())?;
        if is_blank(&self.draft_id) {
            return Err(EngineError::validation("draft_id is required"));
        }
        Ok(())
    }
}

/// Request for the idempotent `confirm_publish` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPublishRequest {
    /// Idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Draft identifier.
    pub draft_id: String,
    /// URL the draft was published at.
    pub published_url: String,
}

impl ConfirmPublishRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields.
    pub fn validate(&self) -> Result<(), EngineError> {
        let _ = normalize_event_id(self.event_id.as_deref())?;
        if is_blank(&self.draft_id) {
            return Err(EngineError::validation("draft_id is required"));
        }
        if is_blank(&self.published_url) {
            return Err(EngineError::validation("published_url is required"));
        }
        Ok(())
    }
}

/// Request for `classify_notes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyNotesRequest {
    /// Notes to classify.
    pub notes: Vec<NoteRef>,
}

impl ClassifyNotesRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty list or blank fields.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.notes.is_empty() {
            return Err(EngineError::validation("notes must be a non-empty list"));
        }
        for note in &self.notes {
            note.validate("note")?;
        }
        Ok(())
    }
}

/// A note reference with folder context for structure proposals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureNote {
    /// Note identifier.
    pub note_id: String,
    /// Note title.
    pub title: String,
    /// Current folder.
    #[serde(default = "default_folder")]
    pub folder: String,
}

fn default_folder() -> String {
    "Inbox".to_string()
}

/// Request for `propose_structure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposeStructureRequest {
    /// Notes to propose folders for.
    pub notes: Vec<StructureNote>,
}

impl ProposeStructureRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty list or blank fields.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.notes.is_empty() {
            return Err(EngineError::validation("notes must be a non-empty list"));
        }
        for note in &self.notes {
            if is_blank(&note.note_id) {
                return Err(EngineError::validation("note_id is required"));
            }
            if is_blank(&note.title) {
                return Err(EngineError::validation("title is required"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_folder_path_is_rejected() {
        let request = AnalyzeFolderRequest {
            folder_path: "  ".to_string(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_event_id_normalization() {
        assert_eq!(normalize_event_id(None).unwrap(), None);
        assert_eq!(
            normalize_event_id(Some("  evt-1  ")).unwrap(),
            Some("evt-1".to_string())
        );
        assert!(normalize_event_id(Some("   ")).is_err());
    }

    #[test]
    fn test_proposal_filter_rejects_unknown_keys() {
        let result: Result<ProposalFilter, _> =
            serde_json::from_str(r#"{"severity": "high"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_proposal_filter_rejects_unknown_values() {
        let result: Result<ProposalFilter, _> =
            serde_json::from_str(r#"{"risk_tier": "extreme"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_ask_request_defaults() {
        let request: AskRequest = serde_json::from_str(r#"{"query": "hello"}"#).unwrap();
        assert!(request.allow_fallback);
        assert!((request.local_confidence - 0.85).abs() < f64::EPSILON);
        assert!(!request.local_timed_out);
        assert!(!request.grounding_failed);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_ask_request_flattens_sensitivity_fields() {
        let request: AskRequest = serde_json::from_str(
            r#"{"query": "q", "path": "private/x.md", "tags": ["secret"]}"#,
        )
        .unwrap();
        assert_eq!(request.sensitivity.path, "private/x.md");
        assert_eq!(request.sensitivity.tags, vec!["secret"]);
    }

    #[test]
    fn test_links_apply_requires_non_empty_links() {
        let request = LinksApplyRequest {
            source_note_id: "a".to_string(),
            event_id: None,
            links: Vec::new(),
            min_confidence: 0.0,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_export_format_field_rejects_unknown_format() {
        let result: Result<ExportForPublishRequest, _> =
            serde_json::from_str(r#"{"draft_id": "d", "format": "pdf"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_structure_note_default_folder() {
        let note: StructureNote =
            serde_json::from_str(r#"{"note_id": "n", "title": "t"}"#).unwrap();
        assert_eq!(note.folder, "Inbox");
    }
}
