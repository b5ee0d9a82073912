//! Structural Schema Diff
//!
//! Compares two [`SchemaDocument`]s and classifies every difference into the
//! severity lattice:
//!
//! | Change                                  | Severity   |
//! |-----------------------------------------|------------|
//! | path / schema / optional field added    | minor      |
//! | path / schema / field removed           | breaking   |
//! | required field added                    | breaking   |
//! | type token changed                      | breaking   |
//! | optional → required                     | breaking   |
//! | required → optional                     | minor      |
//! | newly deprecated                        | deprecated |
//! | enum value removed / added              | breaking / minor |
//! | description only                        | docs       |
//!
//! Comparison is one level deep: properties are reduced to a type token and
//! referenced or composed schemas are not followed.

pub mod category;
pub mod report;

pub use category::PathCategory;
pub use report::{
    CategoryStats, CategorySummary, DiffReport, FieldChange, PathChange, PathChanges,
    SchemaChange, SchemaChangeKind, Summary,
};

use std::collections::BTreeSet;

use crate::document::{PathItem, SchemaDocument, SchemaNode};
use crate::severity::Severity;

const DESCRIPTION_DISPLAY_LIMIT: usize = 100;

/// Compare two documents with the default settings
pub fn diff(old: &SchemaDocument, new: &SchemaDocument) -> DiffReport {
    SchemaDiffer::new().diff(old, new)
}

/// Schema diff engine
#[derive(Debug, Clone, Default)]
pub struct SchemaDiffer {
    /// Restrict schema-level comparison to these names
    schema_filter: Option<BTreeSet<String>>,
}

impl SchemaDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only compare the named schemas. Paths are always compared.
    pub fn with_schema_filter<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Compare `old` against `new`.
    ///
    /// Pure and deterministic: the documents are held in ordered maps, so every
    /// emitted list comes out sorted by path or name.
    pub fn diff(&self, old: &SchemaDocument, new: &SchemaDocument) -> DiffReport {
        let mut report = DiffReport {
            old_version: old.version.clone(),
            new_version: new.version.clone(),
            ..DiffReport::default()
        };

        self.compare_paths(old, new, &mut report);
        self.compare_schemas(old, new, &mut report);

        report.max_severity = report
            .path_changes
            .iter()
            .map(|p| p.severity)
            .chain(report.schema_changes.iter().map(|s| s.max_severity))
            .collect();

        report
    }

    fn compare_paths(&self, old: &SchemaDocument, new: &SchemaDocument, report: &mut DiffReport) {
        for (path, item) in &new.paths {
            if !old.paths.contains_key(path) {
                let change = path_change(path, item, Severity::Minor);
                let stats = report.category_summary.stats_mut(change.category);
                stats.paths_added += 1;
                stats.minor += 1;
                report.summary.paths_added += 1;
                report.summary.count(change.severity);
                report.path_changes.added.push(change);
            }
        }

        for (path, item) in &old.paths {
            if !new.paths.contains_key(path) {
                let change = path_change(path, item, Severity::Breaking);
                let stats = report.category_summary.stats_mut(change.category);
                stats.paths_removed += 1;
                stats.breaking += 1;
                report.summary.paths_removed += 1;
                report.summary.count(change.severity);
                report.path_changes.removed.push(change);
            }
        }
    }

    fn compare_schemas(&self, old: &SchemaDocument, new: &SchemaDocument, report: &mut DiffReport) {
        report.summary.total_schemas_old = old.schemas.len();
        report.summary.total_schemas_new = new.schemas.len();

        let names: BTreeSet<&String> = match &self.schema_filter {
            Some(filter) => filter.iter().collect(),
            None => old.schemas.keys().chain(new.schemas.keys()).collect(),
        };

        for name in names {
            let change = match (old.schemas.get(name), new.schemas.get(name)) {
                (None, Some(_)) => {
                    report.summary.schemas_added += 1;
                    report.summary.count(Severity::Minor);
                    whole_schema_change(name, SchemaChangeKind::Added, Severity::Minor)
                }
                (Some(_), None) => {
                    report.summary.schemas_removed += 1;
                    report.summary.count(Severity::Breaking);
                    whole_schema_change(name, SchemaChangeKind::Removed, Severity::Breaking)
                }
                (Some(old_schema), Some(new_schema)) => {
                    let Some(change) = compare_fields(name, old_schema, new_schema) else {
                        continue;
                    };
                    report.summary.schemas_with_changes += 1;
                    report.summary.total_fields_added += change.added_fields.len();
                    report.summary.total_fields_removed += change.removed_fields.len();
                    for field in change.fields() {
                        report.summary.count(field.severity);
                    }
                    change
                }
                (None, None) => continue,
            };
            report.schema_changes.push(change);
        }
    }
}

fn path_change(path: &str, item: &PathItem, severity: Severity) -> PathChange {
    let tags = item.tags();
    PathChange {
        path: path.to_string(),
        severity,
        methods: item.methods().iter().map(|m| m.as_str().to_string()).collect(),
        category: PathCategory::classify(&tags),
        tags,
    }
}

fn whole_schema_change(name: &str, kind: SchemaChangeKind, severity: Severity) -> SchemaChange {
    SchemaChange {
        schema_name: name.to_string(),
        kind,
        max_severity: severity,
        added_fields: Vec::new(),
        removed_fields: Vec::new(),
        changed_fields: Vec::new(),
    }
}

/// Field-level comparison of a schema present on both sides
fn compare_fields(name: &str, old: &SchemaNode, new: &SchemaNode) -> Option<SchemaChange> {
    let old_props = old.properties();
    let new_props = new.properties();

    let mut change = whole_schema_change(name, SchemaChangeKind::Modified, Severity::None);

    for (prop, node) in new_props {
        if old_props.contains_key(prop) {
            continue;
        }
        let is_required = new.is_required(prop);
        let (severity, reason) = if is_required {
            (Severity::Breaking, "New required field")
        } else {
            (Severity::Minor, "New optional field")
        };
        change.added_fields.push(FieldChange {
            path: prop.clone(),
            severity,
            new_type: Some(node.type_token()),
            description: display_description(node),
            is_required,
            is_deprecated: node.deprecated,
            reason: reason.to_string(),
            ..FieldChange::default()
        });
    }

    for (prop, node) in old_props {
        if new_props.contains_key(prop) {
            continue;
        }
        change.removed_fields.push(FieldChange {
            path: prop.clone(),
            severity: Severity::Breaking,
            old_type: Some(node.type_token()),
            was_required: old.is_required(prop),
            was_deprecated: node.deprecated,
            reason: "Field removed".to_string(),
            ..FieldChange::default()
        });
    }

    for (prop, new_node) in new_props {
        if let Some(old_node) = old_props.get(prop) {
            change.changed_fields.extend(compare_field(
                prop,
                old_node,
                new_node,
                old.is_required(prop),
                new.is_required(prop),
            ));
        }
    }

    if change.fields().next().is_none() {
        return None;
    }

    change.max_severity = change.fields().map(|f| f.severity).collect();
    Some(change)
}

/// Every independent difference on a property present on both sides
fn compare_field(
    path: &str,
    old: &SchemaNode,
    new: &SchemaNode,
    was_required: bool,
    is_required: bool,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let record = |severity: Severity, reason: String| FieldChange {
        path: path.to_string(),
        severity,
        reason,
        ..FieldChange::default()
    };

    let old_type = old.type_token();
    let new_type = new.type_token();
    if old_type != new_type {
        changes.push(FieldChange {
            old_type: Some(old_type.clone()),
            new_type: Some(new_type.clone()),
            ..record(Severity::Breaking, format!("Type changed: {old_type} → {new_type}"))
        });
    }

    if was_required != is_required {
        let (severity, reason) = if is_required {
            (Severity::Breaking, "Field changed from optional to required")
        } else {
            (Severity::Minor, "Field changed from required to optional")
        };
        changes.push(FieldChange {
            was_required,
            is_required,
            ..record(severity, reason.to_string())
        });
    }

    if !old.deprecated && new.deprecated {
        changes.push(FieldChange {
            was_deprecated: false,
            is_deprecated: true,
            ..record(Severity::Deprecated, "Field marked as deprecated".to_string())
        });
    }

    let old_enum: BTreeSet<&String> = old.enum_values.iter().collect();
    let new_enum: BTreeSet<&String> = new.enum_values.iter().collect();
    for removed in old_enum.difference(&new_enum) {
        changes.push(record(Severity::Breaking, format!("Enum value removed: {removed:?}")));
    }
    for added in new_enum.difference(&old_enum) {
        changes.push(record(Severity::Minor, format!("Enum value added: {added:?}")));
    }

    if changes.is_empty() && old.description != new.description {
        changes.push(FieldChange {
            description: display_description(new),
            ..record(Severity::Docs, "Description changed".to_string())
        });
    }

    changes
}

fn display_description(node: &SchemaNode) -> Option<String> {
    node.description.as_ref().map(|desc| {
        if desc.chars().count() > DESCRIPTION_DISPLAY_LIMIT {
            let head: String = desc.chars().take(DESCRIPTION_DISPLAY_LIMIT).collect();
            format!("{head}...")
        } else {
            desc.clone()
        }
    })
}
