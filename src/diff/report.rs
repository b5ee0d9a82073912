//! Diff report records
//!
//! Every list in a report is ordered by path or schema name so two runs over
//! the same pair of documents serialize identically.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::category::PathCategory;
use crate::severity::Severity;

/// An added or removed API path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathChange {
    pub path: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub category: PathCategory,
}

/// Path-level differences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathChanges {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<PathChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<PathChange>,
}

impl PathChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathChange> {
        self.added.iter().chain(self.removed.iter())
    }
}

/// One detected difference on one field.
///
/// A field with several simultaneous differences yields several records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Property name inside its schema
    pub path: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_type: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub was_required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub was_deprecated: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_deprecated: bool,
    /// Field description, truncated for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub reason: String,
}

/// How a schema differs between the two documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaChangeKind {
    Added,
    Removed,
    Modified,
}

/// Changes to one named schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaChange {
    pub schema_name: String,
    pub kind: SchemaChangeKind,
    pub max_severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_fields: Vec<FieldChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_fields: Vec<FieldChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<FieldChange>,
}

impl SchemaChange {
    pub fn fields(&self) -> impl Iterator<Item = &FieldChange> {
        self.added_fields
            .iter()
            .chain(self.removed_fields.iter())
            .chain(self.changed_fields.iter())
    }
}

/// Plain counts for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_schemas_old: usize,
    pub total_schemas_new: usize,
    pub paths_added: usize,
    pub paths_removed: usize,
    pub schemas_added: usize,
    pub schemas_removed: usize,
    pub schemas_with_changes: usize,
    pub total_fields_added: usize,
    pub total_fields_removed: usize,
    pub breaking_changes: usize,
    pub deprecated_changes: usize,
    pub minor_changes: usize,
    pub docs_changes: usize,
    pub total_changes: usize,
}

impl Summary {
    pub(crate) fn count(&mut self, severity: Severity) {
        self.total_changes += 1;
        match severity {
            Severity::Breaking => self.breaking_changes += 1,
            Severity::Deprecated => self.deprecated_changes += 1,
            Severity::Minor => self.minor_changes += 1,
            Severity::Docs => self.docs_changes += 1,
            Severity::None => {}
        }
    }
}

/// Path change counts within one category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub paths_added: usize,
    pub paths_removed: usize,
    pub breaking: usize,
    pub minor: usize,
}

/// Path change counts per category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub setup: CategoryStats,
    pub monitoring: CategoryStats,
    pub internal: CategoryStats,
}

impl CategorySummary {
    pub fn stats_mut(&mut self, category: PathCategory) -> &mut CategoryStats {
        match category {
            PathCategory::Setup => &mut self.setup,
            PathCategory::Monitoring => &mut self.monitoring,
            PathCategory::Internal => &mut self.internal,
        }
    }
}

/// Result of comparing two schema documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_version: Option<String>,
    pub max_severity: Severity,
    pub path_changes: PathChanges,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_changes: Vec<SchemaChange>,
    pub summary: Summary,
    pub category_summary: CategorySummary,
}

impl DiffReport {
    /// No change of any severity was detected
    pub fn is_empty(&self) -> bool {
        self.path_changes.is_empty() && self.schema_changes.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.summary.total_changes
    }

    /// Every field change across all schemas
    pub fn field_changes(&self) -> impl Iterator<Item = &FieldChange> {
        self.schema_changes.iter().flat_map(SchemaChange::fields)
    }

    /// Human-readable summary block
    pub fn render_summary(&self) -> String {
        let s = &self.summary;
        let mut out = String::new();
        let _ = writeln!(out, "Summary:");
        if let (Some(old), Some(new)) = (&self.old_version, &self.new_version) {
            let _ = writeln!(out, "  Versions: {old} → {new}");
        }
        let _ = writeln!(out, "  Max Severity: {}", self.max_severity);
        let _ = writeln!(out, "  Paths: +{} / -{}", s.paths_added, s.paths_removed);
        let _ = writeln!(out, "  Schemas: {} → {}", s.total_schemas_old, s.total_schemas_new);
        let _ = writeln!(
            out,
            "  Added: {}, Removed: {}, Changed: {}",
            s.schemas_added, s.schemas_removed, s.schemas_with_changes
        );
        let _ = writeln!(
            out,
            "  Fields added: {}, removed: {}",
            s.total_fields_added, s.total_fields_removed
        );
        let _ = writeln!(
            out,
            "  By severity: breaking={}, deprecated={}, minor={}, docs={}",
            s.breaking_changes, s.deprecated_changes, s.minor_changes, s.docs_changes
        );
        out
    }
}
