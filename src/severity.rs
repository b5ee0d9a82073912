//! Change severity lattice
//!
//! `none < docs < minor < deprecated < breaking`, merged with `max`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BaselineError;

/// Severity of a detected API change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// No difference
    #[default]
    None,
    /// Description text only
    Docs,
    /// Additive change (new path, schema, optional field, enum value)
    Minor,
    /// Field newly marked deprecated
    Deprecated,
    /// Removal, type change, or new requirement
    Breaking,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::None,
        Severity::Docs,
        Severity::Minor,
        Severity::Deprecated,
        Severity::Breaking,
    ];

    /// Lattice join
    pub fn merge(self, other: Severity) -> Severity {
        self.max(other)
    }

    /// Whether a release with this severity must become a new baseline
    pub fn requires_new_baseline(self) -> bool {
        self >= Severity::Minor
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Docs => "docs",
            Severity::Minor => "minor",
            Severity::Deprecated => "deprecated",
            Severity::Breaking => "breaking",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = BaselineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| BaselineError::InvalidDocument(format!("unknown severity '{s}'")))
    }
}

impl FromIterator<Severity> for Severity {
    fn from_iter<I: IntoIterator<Item = Severity>>(iter: I) -> Self {
        iter.into_iter().fold(Severity::None, Severity::merge)
    }
}

/// Severity as recorded in the manifest for one release.
///
/// Besides the lattice levels, a release can be the first of its series
/// (`initial`) or have been promoted without a usable comparison (`unknown`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordedSeverity {
    Initial,
    None,
    Docs,
    Minor,
    Deprecated,
    Breaking,
    #[default]
    Unknown,
}

impl From<Severity> for RecordedSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::None => RecordedSeverity::None,
            Severity::Docs => RecordedSeverity::Docs,
            Severity::Minor => RecordedSeverity::Minor,
            Severity::Deprecated => RecordedSeverity::Deprecated,
            Severity::Breaking => RecordedSeverity::Breaking,
        }
    }
}

impl RecordedSeverity {
    /// The lattice level, if this record came from an actual comparison
    pub fn measured(&self) -> Option<Severity> {
        match self {
            RecordedSeverity::None => Some(Severity::None),
            RecordedSeverity::Docs => Some(Severity::Docs),
            RecordedSeverity::Minor => Some(Severity::Minor),
            RecordedSeverity::Deprecated => Some(Severity::Deprecated),
            RecordedSeverity::Breaking => Some(Severity::Breaking),
            RecordedSeverity::Initial | RecordedSeverity::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordedSeverity::Initial => "initial",
            RecordedSeverity::Unknown => "unknown",
            other => other.measured().map(|s| s.as_str()).unwrap_or("unknown"),
        }
    }
}

impl fmt::Display for RecordedSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
