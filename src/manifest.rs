//! Version → baseline manifest
//!
//! The manifest is the only durable output of a run. It is loaded once,
//! mutated in memory, and written back as a full atomic rewrite with releases
//! in ascending release order so the file diffs cleanly between runs.
//!
//! ```json
//! {
//!   "baselines": ["2.4.0p1", "2.4.0p5"],
//!   "mapping": {
//!     "2.4.0p1": {"spec": "2.4.0/p1.yaml", "baseline": "2.4.0p1", "package": "v2_4_0p1",
//!                 "is_baseline": true, "max_severity": "initial"},
//!     "2.4.0p2": {"spec": "2.4.0/p1.yaml", "baseline": "2.4.0p1", "package": "v2_4_0p1",
//!                 "is_baseline": false, "max_severity": "docs"}
//!   },
//!   "last_checked": "2026-10-16T08:00:00Z"
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BaselineError, Result};
use crate::severity::{RecordedSeverity, Severity};
use crate::store::atomic_write;
use crate::version::{ReleaseVersion, SeriesKey};

/// Manifest record for one release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Snapshot path relative to the specs directory (the baseline's for an alias)
    #[serde(default)]
    pub spec: String,
    pub baseline: ReleaseVersion,
    /// Downstream package identifier (the baseline's for an alias)
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub is_baseline: bool,
    /// Severity observed against the baseline in force when this release was evaluated
    #[serde(default)]
    pub max_severity: RecordedSeverity,
}

impl VersionEntry {
    /// Entry for a release that is its own baseline
    pub fn new_baseline(version: &ReleaseVersion, severity: RecordedSeverity) -> Self {
        Self {
            spec: version.relative_snapshot_path(),
            baseline: version.clone(),
            package: version.package_name(),
            is_baseline: true,
            max_severity: severity,
        }
    }

    /// Entry for a release that reuses `baseline`'s snapshot
    pub fn new_alias(baseline: &ReleaseVersion, severity: Severity) -> Self {
        Self {
            spec: baseline.relative_snapshot_path(),
            baseline: baseline.clone(),
            package: baseline.package_name(),
            is_baseline: false,
            max_severity: severity.into(),
        }
    }
}

/// On-disk layout; `baselines` is derived from `mapping` on every save
#[derive(Serialize, Deserialize)]
struct ManifestFile<E> {
    #[serde(default)]
    baselines: Vec<ReleaseVersion>,
    #[serde(default = "BTreeMap::new")]
    mapping: BTreeMap<ReleaseVersion, E>,
    #[serde(default)]
    last_checked: Option<DateTime<Utc>>,
}

/// An entry as read from disk. Older files may omit `baseline` on baseline
/// entries and leave `spec`/`package` empty on aliases.
#[derive(Deserialize)]
struct StoredEntry {
    #[serde(default)]
    spec: String,
    #[serde(default)]
    baseline: Option<ReleaseVersion>,
    #[serde(default)]
    package: String,
    #[serde(default)]
    is_baseline: bool,
    #[serde(default)]
    max_severity: RecordedSeverity,
}

impl StoredEntry {
    fn into_entry(self, version: &ReleaseVersion) -> std::result::Result<VersionEntry, String> {
        let baseline = match (self.baseline, self.is_baseline) {
            (Some(baseline), _) => baseline,
            (None, true) => version.clone(),
            (None, false) => return Err(format!("{} has no baseline", version)),
        };

        let spec = if self.spec.is_empty() {
            baseline.relative_snapshot_path()
        } else {
            self.spec
        };
        let package = if self.package.is_empty() {
            baseline.package_name()
        } else {
            self.package
        };

        Ok(VersionEntry {
            spec,
            baseline,
            package,
            is_baseline: self.is_baseline,
            max_severity: self.max_severity,
        })
    }
}

/// The full version → entry map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<ReleaseVersion, VersionEntry>,
    last_checked: Option<DateTime<Utc>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a manifest. A missing file yields an empty manifest; a present
    /// but unparseable file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "No existing manifest, starting fresh");
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| BaselineError::ManifestCorrupt {
            path: path.display().to_string(),
            reason,
        };
        let file: ManifestFile<StoredEntry> =
            serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;

        let mut entries = BTreeMap::new();
        for (version, stored) in file.mapping {
            let entry = stored.into_entry(&version).map_err(corrupt)?;
            entries.insert(version, entry);
        }

        let manifest = Self {
            entries,
            last_checked: file.last_checked,
        };

        if let Err(e) = manifest.check_consistency() {
            warn!(path = %path.display(), "Loaded manifest is inconsistent: {}", e);
        }

        Ok(manifest)
    }

    /// Serialize with a fresh timestamp and write atomically.
    ///
    /// Refuses to write a manifest that violates the alias invariant.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.check_consistency()?;
        self.last_checked = Some(Utc::now());
        let mut content = self.to_json()?;
        content.push('\n');
        atomic_write(path.as_ref(), content.as_bytes())
    }

    /// Pretty JSON in the persisted layout
    pub fn to_json(&self) -> Result<String> {
        let file = ManifestFile {
            baselines: self.baselines(),
            mapping: self.entries.clone(),
            last_checked: self.last_checked,
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, version: &ReleaseVersion) -> Option<&VersionEntry> {
        self.entries.get(version)
    }

    pub fn contains(&self, version: &ReleaseVersion) -> bool {
        self.entries.contains_key(version)
    }

    pub fn insert(&mut self, version: ReleaseVersion, entry: VersionEntry) -> Option<VersionEntry> {
        self.entries.insert(version, entry)
    }

    /// Merge entries by key; entries for other releases are left untouched
    pub fn merge<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (ReleaseVersion, VersionEntry)>,
    {
        self.entries.extend(entries);
    }

    /// All releases in ascending order
    pub fn versions(&self) -> impl Iterator<Item = &ReleaseVersion> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ReleaseVersion, &VersionEntry)> {
        self.entries.iter()
    }

    /// Baseline releases in ascending order
    pub fn baselines(&self) -> Vec<ReleaseVersion> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_baseline)
            .map(|(version, _)| version.clone())
            .collect()
    }

    pub fn is_baseline(&self, version: &ReleaseVersion) -> bool {
        self.entries.get(version).is_some_and(|e| e.is_baseline)
    }

    /// Entries of one series, ascending
    pub fn series_entries(&self, series: &SeriesKey) -> BTreeMap<ReleaseVersion, VersionEntry> {
        self.entries
            .iter()
            .filter(|(version, _)| version.series() == series)
            .map(|(version, entry)| (version.clone(), entry.clone()))
            .collect()
    }

    /// Every alias must name an existing baseline entry, and every baseline
    /// must name itself
    pub fn check_consistency(&self) -> Result<()> {
        let mut problems = Vec::new();

        for (version, entry) in &self.entries {
            if entry.is_baseline {
                if entry.baseline != *version {
                    problems.push(format!("{version} is a baseline but points to {}", entry.baseline));
                }
                continue;
            }
            match self.entries.get(&entry.baseline) {
                Some(target) if target.is_baseline => {}
                Some(_) => problems.push(format!(
                    "{version} aliases {} which is not a baseline",
                    entry.baseline
                )),
                None => problems.push(format!(
                    "{version} aliases {} which is not in the manifest",
                    entry.baseline
                )),
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(BaselineError::InconsistentManifest(problems.join("; ")))
        }
    }

    /// Totals per series
    pub fn summary(&self) -> ManifestSummary {
        let mut summary = ManifestSummary::default();
        for (version, entry) in &self.entries {
            let counts = summary.by_series.entry(version.series().clone()).or_default();
            counts.total += 1;
            summary.total += 1;
            if entry.is_baseline {
                counts.baselines += 1;
                summary.baselines += 1;
            }
        }
        summary
    }

    /// Per-series listing of every release and what it resolves to
    pub fn render_listing(&self) -> String {
        let mut out = String::new();
        let baselines = self.baselines();
        let _ = writeln!(out, "Baselines ({}):", baselines.len());
        for baseline in &baselines {
            let _ = writeln!(out, "  - {baseline}");
        }

        let _ = writeln!(out, "\nVersion mappings ({}):", self.entries.len());
        let mut current: Option<&SeriesKey> = None;
        for (version, entry) in &self.entries {
            if current != Some(version.series()) {
                current = Some(version.series());
                let _ = writeln!(out, "\n  {} series:", version.series());
            }
            if entry.is_baseline {
                let _ = writeln!(out, "    {version}: BASELINE ({})", entry.max_severity);
            } else {
                let _ = writeln!(out, "    {version}: -> {} ({})", entry.baseline, entry.max_severity);
            }
        }
        out
    }
}

/// Release counts for one series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesCounts {
    pub total: usize,
    pub baselines: usize,
}

/// Release counts across the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSummary {
    pub total: usize,
    pub baselines: usize,
    pub by_series: BTreeMap<SeriesKey, SeriesCounts>,
}

impl ManifestSummary {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Manifest Summary:");
        let _ = writeln!(out, "  Total versions: {}", self.total);
        let _ = writeln!(out, "  Baselines: {}", self.baselines);
        let _ = writeln!(out, "  By series:");
        for (series, counts) in &self.by_series {
            let _ = writeln!(
                out,
                "    {series}: {} versions, {} baselines",
                counts.total, counts.baselines
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn v(s: &str) -> ReleaseVersion {
        ReleaseVersion::parse(s).unwrap()
    }

    fn sample() -> Manifest {
        let mut manifest = Manifest::new();
        manifest.insert(v("2.4.0p10"), VersionEntry::new_alias(&v("2.4.0p2"), Severity::Docs));
        manifest.insert(v("2.4.0p2"), VersionEntry::new_baseline(&v("2.4.0p2"), RecordedSeverity::Initial));
        manifest.insert(v("2.3.0p41"), VersionEntry::new_baseline(&v("2.3.0p41"), RecordedSeverity::Initial));
        manifest
    }

    #[test]
    fn test_missing_file_is_empty_manifest() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::load(dir.path().join("manifest.json")).unwrap();
        assert!(manifest.is_empty());
        assert!(manifest.last_checked().is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Manifest::load(&path),
            Err(BaselineError::ManifestCorrupt { .. })
        ));
    }

    #[test]
    fn test_sparse_entries_are_filled_from_baseline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(
            &path,
            r#"{"mapping": {
                "2.4.0p1": {"is_baseline": true, "max_severity": "initial"},
                "2.4.0p2": {"baseline": "2.4.0p1", "max_severity": "docs"}
            }}"#,
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(
            manifest.get(&v("2.4.0p1")),
            Some(&VersionEntry::new_baseline(&v("2.4.0p1"), RecordedSeverity::Initial))
        );
        assert_eq!(
            manifest.get(&v("2.4.0p2")),
            Some(&VersionEntry::new_alias(&v("2.4.0p1"), Severity::Docs))
        );
        manifest.check_consistency().unwrap();
    }

    #[test]
    fn test_alias_without_baseline_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, r#"{"mapping": {"2.4.0p2": {"spec": "2.4.0/p1.yaml"}}}"#).unwrap();
        assert!(matches!(
            Manifest::load(&path),
            Err(BaselineError::ManifestCorrupt { .. })
        ));
    }

    #[test]
    fn test_save_orders_releases_semantically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut manifest = sample();
        manifest.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let p41 = content.find("\"2.3.0p41\": {").unwrap();
        let p2 = content.find("\"2.4.0p2\": {").unwrap();
        let p10 = content.find("\"2.4.0p10\": {").unwrap();
        assert!(p41 < p2 && p2 < p10, "mapping must be in release order:\n{content}");

        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(raw["baselines"], serde_json::json!(["2.3.0p41", "2.4.0p2"]));
        assert_eq!(raw["mapping"]["2.4.0p10"]["spec"], "2.4.0/p2.yaml");
        assert_eq!(raw["mapping"]["2.4.0p10"]["package"], "v2_4_0p2");
        assert_eq!(raw["mapping"]["2.4.0p10"]["max_severity"], "docs");
        assert!(raw["last_checked"].is_string());

        let reloaded = Manifest::load(&path).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.get(&v("2.4.0p10")), manifest.get(&v("2.4.0p10")));
    }

    #[test]
    fn test_load_tolerates_missing_optional_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(
            &path,
            r#"{"mapping": {"2.2.0p43": {"baseline": "2.2.0p43", "is_baseline": true}}}"#,
        )
        .unwrap();
        let manifest = Manifest::load(&path).unwrap();
        let entry = manifest.get(&v("2.2.0p43")).unwrap();
        assert!(entry.is_baseline);
        assert_eq!(entry.max_severity, RecordedSeverity::Unknown);
        assert!(entry.spec.is_empty());
    }

    #[test]
    fn test_consistency_check() {
        let mut manifest = sample();
        assert!(manifest.check_consistency().is_ok());

        manifest.insert(v("2.4.0p11"), VersionEntry::new_alias(&v("2.4.0p10"), Severity::None));
        assert!(matches!(
            manifest.check_consistency(),
            Err(BaselineError::InconsistentManifest(_))
        ));

        let dir = tempdir().unwrap();
        assert!(manifest.save(dir.path().join("manifest.json")).is_err());
        assert!(!dir.path().join("manifest.json").exists());
    }

    #[test]
    fn test_merge_by_key() {
        let mut manifest = sample();
        manifest.merge(vec![(
            v("2.4.0p11"),
            VersionEntry::new_alias(&v("2.4.0p2"), Severity::None),
        )]);
        assert_eq!(manifest.len(), 4);
        assert!(manifest.contains(&v("2.3.0p41")));
    }

    #[test]
    fn test_summary_and_listing() {
        let manifest = sample();
        let summary = manifest.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.baselines, 2);
        let series = SeriesKey::parse("2.4.0").unwrap();
        assert_eq!(summary.by_series[&series], SeriesCounts { total: 2, baselines: 1 });

        let listing = manifest.render_listing();
        assert!(listing.contains("2.4.0p2: BASELINE (initial)"));
        assert!(listing.contains("2.4.0p10: -> 2.4.0p2 (docs)"));
    }
}
