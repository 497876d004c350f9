//! Folder profiles and the profiler collaborator seam.
//!
//! The engine never scans folders itself; an external
//! [`FolderProfiler`] delivers a [`FolderProfile`] describing the notes
//! to analyze. The profile payload is carried on the run for audit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Summary of one note inside a profiled folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteProfile {
    /// Stable note identifier.
    pub note_id: String,
    /// Note title.
    #[serde(default)]
    pub title: String,
    /// Folder the note currently lives in.
    #[serde(default)]
    pub folder: String,
    /// Note tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Leading content excerpt handed to candidate generation.
    #[serde(default)]
    pub content_preview: String,
}

/// Profile of one folder, as delivered by the external analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderProfile {
    /// Number of notes found.
    pub note_count: usize,
    /// Notes with no outgoing links.
    pub orphan_count: usize,
    /// Average links per note.
    pub link_density: f64,
    /// Per-note summaries.
    #[serde(default)]
    pub notes: Vec<NoteProfile>,
}

/// Error from the profiling collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    /// The folder path does not name a profileable folder.
    #[error("folder does not exist or is not a directory: {folder_path}")]
    InvalidFolder {
        /// The rejected path.
        folder_path: String,
    },

    /// The profiler failed for another reason.
    #[error("profiling failed for {folder_path}: {reason}")]
    ProfilingFailed {
        /// The folder being profiled.
        folder_path: String,
        /// Collaborator-supplied description.
        reason: String,
    },
}

/// Collaborator that turns a folder path into a profile.
pub trait FolderProfiler: Send + Sync {
    /// Profiles the folder at `folder_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] when the folder cannot be profiled.
    fn profile(&self, folder_path: &str) -> Result<FolderProfile, ProfileError>;
}

/// Profiler serving pre-built profiles keyed by folder path.
///
/// Used by tests and by drivers that load profile fixtures instead of
/// scanning disk.
#[derive(Debug, Default)]
pub struct StaticProfiler {
    profiles: std::collections::BTreeMap<String, FolderProfile>,
}

impl StaticProfiler {
    /// Creates an empty fixture profiler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the profile served for `folder_path`.
    #[must_use]
    pub fn with_profile(mut self, folder_path: impl Into<String>, profile: FolderProfile) -> Self {
        self.profiles.insert(folder_path.into(), profile);
        self
    }
}

impl FolderProfiler for StaticProfiler {
    fn profile(&self, folder_path: &str) -> Result<FolderProfile, ProfileError> {
        self.profiles
            .get(folder_path)
            .cloned()
            .ok_or_else(|| ProfileError::InvalidFolder {
                folder_path: folder_path.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_profiler_serves_registered_profile() {
        let profile = FolderProfile {
            note_count: 2,
            orphan_count: 1,
            link_density: 0.5,
            notes: Vec::new(),
        };
        let profiler = StaticProfiler::new().with_profile("vault/notes", profile.clone());
        assert_eq!(profiler.profile("vault/notes").unwrap(), profile);
    }

    #[test]
    fn test_static_profiler_rejects_unknown_folder() {
        let profiler = StaticProfiler::new();
        let err = profiler.profile("missing").unwrap_err();
        assert!(matches!(err, ProfileError::InvalidFolder { .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_profile_deserializes_with_defaults() {
        let profile: FolderProfile =
            serde_json::from_str(r#"{"note_count":1,"orphan_count":0,"link_density":2.0}"#)
                .unwrap();
        assert!(profile.notes.is_empty());
    }
}
