//! Path categories derived from operation tags
//!
//! Categories are informational only and never influence severity.

use serde::{Deserialize, Serialize};

const MONITORING_TAGS: &[&str] = &[
    "Acknowledge problems",
    "Comments",
    "Downtimes",
    "Service status",
    "Metrics",
    "Parent scan",
    "Background Jobs",
];

const INTERNAL_TAGS: &[&str] = &["Autocomplete (internal)", "Hosts (internal)", "Miscellaneous"];

/// Purpose of an API path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathCategory {
    /// Configuration endpoints
    #[default]
    Setup,
    /// Operational / live actions
    Monitoring,
    /// Internal-only endpoints
    Internal,
}

impl PathCategory {
    /// Classify a path by its (sorted) tags; the first tag that matches a
    /// keyword set decides.
    pub fn classify<S: AsRef<str>>(tags: &[S]) -> Self {
        for tag in tags {
            let tag = tag.as_ref();
            if MONITORING_TAGS.contains(&tag) {
                return PathCategory::Monitoring;
            }
            if INTERNAL_TAGS.contains(&tag) || tag.contains("(internal)") {
                return PathCategory::Internal;
            }
        }
        PathCategory::Setup
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PathCategory::Setup => "setup",
            PathCategory::Monitoring => "monitoring",
            PathCategory::Internal => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(PathCategory::classify(&["Downtimes"]), PathCategory::Monitoring);
        assert_eq!(PathCategory::classify(&["Miscellaneous"]), PathCategory::Internal);
        assert_eq!(PathCategory::classify(&["Rules (internal)"]), PathCategory::Internal);
        assert_eq!(PathCategory::classify(&["Hosts", "Folders"]), PathCategory::Setup);
        assert_eq!(PathCategory::classify::<&str>(&[]), PathCategory::Setup);
    }

    #[test]
    fn test_first_matching_tag_wins() {
        assert_eq!(
            PathCategory::classify(&["Autocomplete (internal)", "Comments"]),
            PathCategory::Internal
        );
        assert_eq!(
            PathCategory::classify(&["Comments", "Miscellaneous"]),
            PathCategory::Monitoring
        );
    }
}
