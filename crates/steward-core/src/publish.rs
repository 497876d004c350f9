//! Publish pipeline pieces: draft scoring, preparation, queue items
//! and export formats.
//!
//! The actual file or network write happens in an external
//! [`PublishAdapter`](crate::adapter::PublishAdapter) after
//! `confirm_publish`; the engine only owns the queue and its
//! idempotent state changes.

use serde::{Deserialize, Serialize};

use crate::coordinator::responses::IdempotencyEcho;

/// Minimum overall score at which a draft passes the publish gate.
pub const PUBLISH_GATE_THRESHOLD: f64 = 0.80;

/// Export format for a queued draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Raw markdown.
    Markdown,
    /// Paragraph-wrapped HTML.
    Html,
    /// JSON envelope with draft metadata.
    Json,
}

impl ExportFormat {
    /// Returns the wire name of the format.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Json => "json",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "markdown" => Some(Self::Markdown),
            "html" => Some(Self::Html),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quality scores for one draft.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DraftScores {
    /// Length-based structure score.
    pub structure: f64,
    /// Sentence/length clarity score.
    pub clarity: f64,
    /// Safety score; unfinished markers pull it down.
    pub safety: f64,
    /// Mean of the three, rounded to two decimals.
    pub overall: f64,
}

/// Scores a draft's content.
///
/// Structure saturates at 70 words; clarity rewards sentence-length
/// prose; a leftover `todo` marker caps safety.
#[must_use]
pub fn score_draft(content: &str) -> DraftScores {
    let normalized = content.trim();
    let word_count = normalized.split_whitespace().count();
    let has_todo = normalized.to_lowercase().contains("todo");

    let structure = (word_count as f64 / 70.0).min(1.0);
    let clarity = if word_count >= 40 && normalized.contains('.') {
        0.90
    } else if word_count >= 20 {
        0.60
    } else {
        0.40
    };
    let safety = if has_todo { 0.20 } else { 0.90 };
    let overall = round2((structure + clarity + safety) / 3.0);

    DraftScores {
        structure: round2(structure),
        clarity,
        safety,
        overall,
    }
}

/// Normalizes draft content for publishing: trims and converts CRLF
/// line endings.
#[must_use]
pub fn prepare_content(content: &str) -> String {
    content.trim().replace("\r\n", "\n")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One draft queued for publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishQueueItem {
    /// Draft identifier.
    pub draft_id: String,
    /// Draft title.
    pub title: String,
    /// Normalized content ready for export.
    pub prepared_content: String,
    /// Always `queued_for_publish` while in the queue.
    pub status: String,
    /// Idempotency echo from the enqueue operation.
    pub idempotency: IdempotencyEcho,
}

/// One published draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedItem {
    /// Draft identifier.
    pub draft_id: String,
    /// Draft title.
    pub title: String,
    /// Where the draft was published.
    pub published_url: String,
    /// Always `published`.
    pub status: String,
    /// Idempotency echo from the confirm operation.
    pub idempotency: IdempotencyEcho,
}
