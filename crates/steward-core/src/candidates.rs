//! Candidate-change generation and payload validation.
//!
//! A [`NoteCandidateProvider`] (typically a model call in the excluded
//! provider layer) returns a raw JSON payload of candidate changes for
//! one note. The engine owns the prompt construction and the strict
//! validation of the payload; a provider cannot smuggle an unknown
//! change type or an out-of-range confidence past
//! [`parse_candidate_payload`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::policy::RiskTier;
use crate::profile::NoteProfile;
use crate::run::ChangeType;

/// One validated candidate change for a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateChange {
    /// Note the candidate targets.
    pub note_id: String,
    /// Category of the change.
    pub change_type: ChangeType,
    /// Risk tier assessed by the provider.
    pub risk_tier: RiskTier,
    /// Provider confidence in `[0, 1]`.
    pub confidence: f64,
    /// Free-form details.
    pub details: Value,
}

/// Error from candidate payload validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandidateParseError {
    /// The payload is not valid JSON.
    #[error("candidate payload must be valid JSON: {detail}")]
    InvalidJson {
        /// Parser detail.
        detail: String,
    },

    /// The payload is not shaped `{"proposals": [...]}`.
    #[error("candidate payload must be an object with a \"proposals\" list")]
    MissingProposalsList,

    /// One candidate entry failed validation.
    #[error("proposal[{index}]: {detail}")]
    InvalidCandidate {
        /// Index of the offending entry.
        index: usize,
        /// What was wrong with it.
        detail: String,
    },
}

/// Error from the candidate-generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("candidate generation failed for note {note_id}: {reason}")]
pub struct CandidateProviderError {
    /// The note being analyzed.
    pub note_id: String,
    /// Collaborator-supplied description.
    pub reason: String,
}

/// Collaborator producing raw candidate payloads for notes.
pub trait NoteCandidateProvider: Send + Sync {
    /// Generates the raw candidate payload for one note.
    ///
    /// The returned string must decode per
    /// [`parse_candidate_payload`]; the engine validates it and records
    /// a diagnostic on the run if it does not.
    ///
    /// # Errors
    ///
    /// Returns [`CandidateProviderError`] when generation fails
    /// outright.
    fn generate(&self, note: &NoteProfile, prompt: &str) -> Result<String, CandidateProviderError>;
}

/// Deterministic default provider: one low-risk tag enrichment per
/// note at confidence 0.8.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCandidateProvider;

impl NoteCandidateProvider for DefaultCandidateProvider {
    fn generate(
        &self,
        note: &NoteProfile,
        _prompt: &str,
    ) -> Result<String, CandidateProviderError> {
        let note_id = if note.note_id.trim().is_empty() {
            "unknown"
        } else {
            note.note_id.as_str()
        };
        let payload = serde_json::json!({
            "proposals": [{
                "note_id": note_id,
                "change_type": "tag_enrichment",
                "risk_tier": "low",
                "confidence": 0.8,
                "details": {"reason": "default_note_candidate"},
            }]
        });
        Ok(payload.to_string())
    }
}

/// Renders the candidate-generation prompt for one note.
#[must_use]
pub fn build_note_prompt(note: &NoteProfile) -> String {
    format!(
        "note_id: {}\ntitle: {}\nfolder: {}\ntags: {}\ncontent_preview: {}",
        note.note_id,
        note.title,
        note.folder,
        note.tags.join(", "),
        note.content_preview,
    )
}

/// Parses and validates a raw candidate payload.
///
/// # Errors
///
/// Returns [`CandidateParseError`] for malformed JSON, a missing
/// proposals list, or any invalid candidate entry.
pub fn parse_candidate_payload(raw: &str) -> Result<Vec<CandidateChange>, CandidateParseError> {
    let payload: Value =
        serde_json::from_str(raw).map_err(|error| CandidateParseError::InvalidJson {
            detail: error.to_string(),
        })?;

    let proposals = payload
        .as_object()
        .and_then(|object| object.get("proposals"))
        .and_then(Value::as_array)
        .ok_or(CandidateParseError::MissingProposalsList)?;

    let mut parsed = Vec::with_capacity(proposals.len());
    for (index, candidate) in proposals.iter().enumerate() {
        parsed.push(validate_candidate(candidate).map_err(|detail| {
            CandidateParseError::InvalidCandidate { index, detail }
        })?);
    }
    Ok(parsed)
}

fn validate_candidate(candidate: &Value) -> Result<CandidateChange, String> {
    let object = candidate
        .as_object()
        .ok_or_else(|| "each proposal must be an object".to_string())?;

    let note_id = object
        .get("note_id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| "note_id must be a non-empty string".to_string())?;

    let change_type = object
        .get("change_type")
        .and_then(|value| serde_json::from_value::<ChangeType>(value.clone()).ok())
        .ok_or_else(|| {
            format!(
                "change_type is invalid: got {}; allowed values: folder_standardization, link_add, tag_enrichment",
                object.get("change_type").unwrap_or(&Value::Null)
            )
        })?;

    let risk_tier = object
        .get("risk_tier")
        .and_then(|value| serde_json::from_value::<RiskTier>(value.clone()).ok())
        .ok_or_else(|| {
            format!(
                "risk_tier is invalid: got {}; allowed values: high, low, medium",
                object.get("risk_tier").unwrap_or(&Value::Null)
            )
        })?;

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| "confidence must be a number".to_string())?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err("confidence must be in [0, 1]".to_string());
    }

    let details = object
        .get("details")
        .filter(|value| value.is_object())
        .cloned()
        .ok_or_else(|| "details must be an object".to_string())?;

    Ok(CandidateChange {
        note_id: note_id.to_string(),
        change_type,
        risk_tier,
        confidence,
        details,
    })
}
