//! Deterministic link-suggestion scoring.
//!
//! Suggestion confidence and reason come from title heuristics; the
//! semantic scoring a model would do lives in the excluded provider
//! layer, and these heuristics stand in for it deterministically.

use serde::{Deserialize, Serialize};

/// Why a link between two notes was suggested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkReason {
    /// Both notes belong to the same project context.
    SharedProjectContext,
    /// The notes describe overlapping structure.
    StructuralOverlap,
    /// The notes are semantically similar.
    SemanticSimilarity,
}

impl LinkReason {
    /// Returns the wire name of the reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SharedProjectContext => "shared_project_context",
            Self::StructuralOverlap => "structural_overlap",
            Self::SemanticSimilarity => "semantic_similarity",
        }
    }
}

/// One scored link suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSuggestion {
    /// Suggested link target.
    pub target_note_id: String,
    /// Suggestion confidence in `[0, 1]`.
    pub confidence: f64,
    /// Why the link was suggested.
    pub reason: LinkReason,
}

/// Scores a candidate target by its title.
#[must_use]
pub fn link_confidence(title: &str) -> f64 {
    let lowered = title.to_lowercase();
    if lowered.contains("atlas") || lowered.contains("architecture") {
        0.88
    } else if lowered.contains("project") {
        0.82
    } else {
        0.61
    }
}

/// Picks the suggestion reason for a candidate target by its title.
#[must_use]
pub fn link_reason(title: &str) -> LinkReason {
    let lowered = title.to_lowercase();
    if lowered.contains("atlas") {
        LinkReason::SharedProjectContext
    } else if lowered.contains("architecture") {
        LinkReason::StructuralOverlap
    } else {
        LinkReason::SemanticSimilarity
    }
}

/// Scores candidates and returns suggestions sorted by confidence,
/// highest first. Ties keep candidate order.
#[must_use]
pub fn score_candidates(candidates: &[(String, String)]) -> Vec<LinkSuggestion> {
    let mut suggestions: Vec<LinkSuggestion> = candidates
        .iter()
        .map(|(note_id, title)| LinkSuggestion {
            target_note_id: note_id.trim().to_string(),
            confidence: link_confidence(title),
            reason: link_reason(title),
        })
        .collect();
    suggestions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_keywords_drive_confidence() {
        assert!((link_confidence("Atlas Overview") - 0.88).abs() < f64::EPSILON);
        assert!((link_confidence("System Architecture") - 0.88).abs() < f64::EPSILON);
        assert!((link_confidence("Project Plan") - 0.82).abs() < f64::EPSILON);
        assert!((link_confidence("Groceries") - 0.61).abs() < f64::EPSILON);
    }

    #[test]
    fn test_title_keywords_drive_reason() {
        assert_eq!(link_reason("Atlas Overview"), LinkReason::SharedProjectContext);
        assert_eq!(link_reason("Architecture Notes"), LinkReason::StructuralOverlap);
        assert_eq!(link_reason("Random"), LinkReason::SemanticSimilarity);
    }

    #[test]
    fn test_suggestions_sorted_by_confidence_desc() {
        let suggestions = score_candidates(&[
            ("n1".to_string(), "Groceries".to_string()),
            ("n2".to_string(), "Atlas".to_string()),
            ("n3".to_string(), "Project Plan".to_string()),
        ]);
        let order: Vec<&str> = suggestions
            .iter()
            .map(|s| s.target_note_id.as_str())
            .collect();
        assert_eq!(order, vec!["n2", "n3", "n1"]);
    }

    #[test]
    fn test_target_ids_are_trimmed() {
        let suggestions = score_candidates(&[(" n1 ".to_string(), "Atlas".to_string())]);
        assert_eq!(suggestions[0].target_note_id, "n1");
    }
}
