//! Collaborator seams for the excluded subsystems.
//!
//! Retrieval, model invocation and publish writes all happen outside
//! the engine. These traits are the boundary; the defaults here are
//! deterministic stand-ins good enough for the engine's own logic and
//! for tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::Provider;

/// One ranked citation backing an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Cited note identifier.
    pub note_id: String,
    /// Cited note path.
    pub path: String,
    /// Supporting excerpt.
    pub excerpt: String,
    /// Chunk identifier within the note.
    pub chunk_id: String,
    /// Retrieval score.
    pub score: f64,
}

/// Error from the retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("retrieval failed: {reason}")]
pub struct RetrievalError {
    /// Collaborator-supplied description.
    pub reason: String,
}

/// Collaborator returning ranked citations for a query.
pub trait RetrievalService: Send + Sync {
    /// Retrieves up to `limit` citations for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] when the retrieval subsystem fails.
    fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<Citation>, RetrievalError>;
}

/// Retrieval stand-in that returns no citations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRetrieval;

impl RetrievalService for NullRetrieval {
    fn retrieve(&self, _query: &str, _limit: usize) -> Result<Vec<Citation>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// Error from the provider collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider call failed on {provider}: {reason}")]
pub struct ProviderCallError {
    /// The provider that failed.
    pub provider: Provider,
    /// Collaborator-supplied description.
    pub reason: String,
}

/// Collaborator performing the actual model invocation once routing
/// has decided a target.
pub trait ProviderCaller: Send + Sync {
    /// Completes `prompt` on `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderCallError`] when the invocation fails.
    fn complete(&self, provider: Provider, prompt: &str) -> Result<String, ProviderCallError>;
}

/// Provider stand-in answering with a draft echo of the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DraftProviderCaller;

impl ProviderCaller for DraftProviderCaller {
    fn complete(&self, _provider: Provider, prompt: &str) -> Result<String, ProviderCallError> {
        Ok(format!("Draft answer for: {prompt}"))
    }
}

/// Error from the publish collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("publish failed for {path}: {reason}")]
pub struct PublishAdapterError {
    /// The target path.
    pub path: String,
    /// Collaborator-supplied description.
    pub reason: String,
}

/// Collaborator performing the actual publish write (local file, SFTP,
/// ...) after a draft is confirmed.
pub trait PublishAdapter: Send + Sync {
    /// Publishes `content` at `path` and returns the public URL.
    ///
    /// # Errors
    ///
    /// Returns [`PublishAdapterError`] when the write fails.
    fn publish(&self, content: &str, path: &str) -> Result<String, PublishAdapterError>;

    /// Whether the adapter can currently accept writes.
    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_retrieval_returns_no_citations() {
        let citations = NullRetrieval.retrieve("anything", 5).unwrap();
        assert!(citations.is_empty());
    }

    #[test]
    fn test_draft_provider_echoes_prompt() {
        let answer = DraftProviderCaller
            .complete(Provider::Local, "what is steward?")
            .unwrap();
        assert_eq!(answer, "Draft answer for: what is steward?");
    }

    struct ManifestPublisher {
        base_url: String,
        written: std::sync::Mutex<Vec<(String, String)>>,
    }

    impl PublishAdapter for ManifestPublisher {
        fn publish(&self, content: &str, path: &str) -> Result<String, PublishAdapterError> {
            if path.contains("..") {
                return Err(PublishAdapterError {
                    path: path.to_string(),
                    reason: "path traversal".to_string(),
                });
            }
            self.written
                .lock()
                .unwrap()
                .push((path.to_string(), content.to_string()));
            Ok(format!("{}/{}", self.base_url, path.trim_start_matches('/')))
        }
    }

    #[test]
    fn test_publish_adapter_contract() {
        let adapter = ManifestPublisher {
            base_url: "http://localhost:8080".to_string(),
            written: std::sync::Mutex::new(Vec::new()),
        };
        assert!(adapter.is_available());

        let url = adapter.publish("body", "/notes/a.html").unwrap();
        assert_eq!(url, "http://localhost:8080/notes/a.html");
        assert_eq!(adapter.written.lock().unwrap().len(), 1);

        let err = adapter.publish("body", "../escape").unwrap_err();
        assert!(err.to_string().contains("../escape"));
    }
}
