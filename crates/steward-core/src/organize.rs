//! Organization heuristics: PARA classification and folder
//! standardization.

use serde::{Deserialize, Serialize};

/// Primary PARA category of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParaCategory {
    /// Active project material.
    Project,
    /// Ongoing area of responsibility.
    Area,
    /// Reference material.
    Resource,
    /// Archived material.
    Archive,
}

impl ParaCategory {
    /// Returns the wire name of the category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Area => "area",
            Self::Resource => "resource",
            Self::Archive => "archive",
        }
    }
}

/// Classifies a note title into a PARA category with a confidence.
#[must_use]
pub fn classify_para(title: &str) -> (ParaCategory, f64) {
    let lowered = title.to_lowercase();
    if lowered.contains("project") {
        (ParaCategory::Project, 0.86)
    } else if lowered.contains("area") {
        (ParaCategory::Area, 0.83)
    } else if lowered.contains("archive") {
        (ParaCategory::Archive, 0.81)
    } else {
        (ParaCategory::Resource, 0.79)
    }
}

/// Proposes a standardized folder for a note.
///
/// Falls back to the current folder when no keyword matches, and to
/// `Resources` when the current folder is blank.
#[must_use]
pub fn proposed_folder(title: &str, current_folder: &str) -> String {
    let lowered = title.to_lowercase();
    if lowered.contains("project") || lowered.contains("atlas") {
        "Projects".to_string()
    } else if lowered.contains("archive") {
        "Archive".to_string()
    } else if !current_folder.trim().is_empty() {
        current_folder.to_string()
    } else {
        "Resources".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_by_title_keyword() {
        assert_eq!(classify_para("Project Atlas"), (ParaCategory::Project, 0.86));
        assert_eq!(classify_para("Health Area"), (ParaCategory::Area, 0.83));
        assert_eq!(classify_para("2021 Archive"), (ParaCategory::Archive, 0.81));
        assert_eq!(classify_para("Rust Notes"), (ParaCategory::Resource, 0.79));
    }

    #[test]
    fn test_proposed_folder_by_keyword() {
        assert_eq!(proposed_folder("Project Atlas", "Inbox"), "Projects");
        assert_eq!(proposed_folder("Atlas Map", "Inbox"), "Projects");
        assert_eq!(proposed_folder("Old Archive", "Inbox"), "Archive");
    }

    #[test]
    fn test_proposed_folder_fallbacks() {
        assert_eq!(proposed_folder("Groceries", "Inbox"), "Inbox");
        assert_eq!(proposed_folder("Groceries", "  "), "Resources");
    }
}
