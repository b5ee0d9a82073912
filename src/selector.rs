//! Baseline selection
//!
//! A [`SeriesCursor`] walks the releases of one series in ascending order and
//! decides, for each, whether it becomes a new baseline or aliases the
//! baseline currently in force:
//!
//! ```text
//!   awaiting-first ──first release──▶ has-baseline ──severity ≥ minor──▶ has-baseline (advanced)
//!                                          │
//!                                          └──severity < minor──▶ alias (pointer unchanged)
//! ```
//!
//! Each cursor owns its baseline pointer and snapshot, so separate series can
//! be driven concurrently while one series stays strictly serial.
//!
//! Deciding and committing are separate steps: a driver that still has to
//! persist a new baseline's snapshot only commits once that succeeded, so the
//! pointer never refers to a baseline that was not recorded.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::diff::{DiffReport, SchemaDiffer};
use crate::document::SchemaDocument;
use crate::error::{BaselineError, Result};
use crate::manifest::VersionEntry;
use crate::severity::{RecordedSeverity, Severity};
use crate::store::SnapshotStore;
use crate::version::{ReleaseVersion, SeriesKey};

/// A parsed snapshot together with the digest of its raw bytes
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub checksum: Checksum,
    pub document: SchemaDocument,
}

impl LoadedSnapshot {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Ok(Self {
            checksum: Checksum::from_bytes(raw),
            document: SchemaDocument::from_slice(raw)?,
        })
    }
}

/// The baseline currently in force for a series
#[derive(Debug, Clone)]
pub struct CurrentBaseline {
    pub version: ReleaseVersion,
    /// Loaded on first use when the pointer was restored from the manifest
    snapshot: Option<LoadedSnapshot>,
}

/// Cursor state
#[derive(Debug, Clone)]
pub enum CursorState {
    AwaitingFirst,
    HasBaseline(CurrentBaseline),
}

/// Outcome of evaluating one release, not yet applied to the cursor
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub version: ReleaseVersion,
    pub entry: VersionEntry,
    /// Comparison against the previous baseline, when one was made
    pub report: Option<DiffReport>,
    /// Snapshot to install as the new baseline on commit
    promoted: Option<LoadedSnapshot>,
}

impl Evaluation {
    pub fn is_baseline(&self) -> bool {
        self.entry.is_baseline
    }
}

/// Per-series baseline pointer
#[derive(Debug, Clone)]
pub struct SeriesCursor {
    series: SeriesKey,
    state: CursorState,
    last_seen: Option<ReleaseVersion>,
    force: bool,
    differ: SchemaDiffer,
}

impl SeriesCursor {
    pub fn new(series: SeriesKey) -> Self {
        Self {
            series,
            state: CursorState::AwaitingFirst,
            last_seen: None,
            force: false,
            differ: SchemaDiffer::new(),
        }
    }

    /// Re-evaluate releases even when the manifest already knows them
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_differ(mut self, differ: SchemaDiffer) -> Self {
        self.differ = differ;
        self
    }

    pub fn series(&self) -> &SeriesKey {
        &self.series
    }

    pub fn state(&self) -> &CursorState {
        &self.state
    }

    pub fn current_baseline(&self) -> Option<&ReleaseVersion> {
        match &self.state {
            CursorState::AwaitingFirst => None,
            CursorState::HasBaseline(current) => Some(&current.version),
        }
    }

    /// Whether a release with this manifest record is skipped
    pub fn should_skip(&self, known: Option<&VersionEntry>) -> bool {
        known.is_some() && !self.force
    }

    fn advance(&mut self, version: &ReleaseVersion) -> Result<()> {
        if version.series() != &self.series {
            return Err(BaselineError::InvalidVersion(format!(
                "{version} does not belong to series {}",
                self.series
            )));
        }
        if let Some(previous) = &self.last_seen {
            if version <= previous {
                return Err(BaselineError::OutOfOrder {
                    version: version.to_string(),
                    previous: previous.to_string(),
                });
            }
        }
        self.last_seen = Some(version.clone());
        Ok(())
    }

    fn point_at(&mut self, baseline: &ReleaseVersion, snapshot: Option<LoadedSnapshot>) {
        if snapshot.is_none() {
            if let CursorState::HasBaseline(current) = &self.state {
                if &current.version == baseline {
                    return;
                }
            }
        }
        self.state = CursorState::HasBaseline(CurrentBaseline {
            version: baseline.clone(),
            snapshot,
        });
    }

    /// Pass over a release the manifest already records. The pointer moves to
    /// that record's baseline so later releases compare against it.
    pub fn skip_known(&mut self, version: &ReleaseVersion, entry: &VersionEntry) -> Result<()> {
        self.advance(version)?;
        self.point_at(&entry.baseline, None);
        Ok(())
    }

    /// Decide what `version` is, given its raw snapshot bytes.
    ///
    /// An unparseable snapshot is an error and leaves the pointer untouched.
    /// If the current baseline's own snapshot cannot be loaded, the release is
    /// promoted with severity `unknown`.
    pub fn evaluate(
        &mut self,
        version: &ReleaseVersion,
        raw: &[u8],
        store: &dyn SnapshotStore,
    ) -> Result<Evaluation> {
        self.advance(version)?;
        let checksum = Checksum::from_bytes(raw);

        let current = match &mut self.state {
            CursorState::AwaitingFirst => {
                let snapshot = LoadedSnapshot::parse(raw)?;
                return Ok(promote(version, RecordedSeverity::Initial, None, snapshot));
            }
            CursorState::HasBaseline(current) => current,
        };

        if current.snapshot.is_none() {
            match store.load(&current.version).and_then(|raw| LoadedSnapshot::parse(&raw)) {
                Ok(snapshot) => current.snapshot = Some(snapshot),
                Err(e) => {
                    warn!(
                        %version,
                        baseline = %current.version,
                        "Couldn't load baseline snapshot: {}", e
                    );
                    let snapshot = LoadedSnapshot::parse(raw)?;
                    return Ok(promote(version, RecordedSeverity::Unknown, None, snapshot));
                }
            }
        }

        let baseline_version = current.version.clone();
        let Some(baseline) = current.snapshot.as_ref() else {
            return Err(BaselineError::SnapshotMissing(baseline_version.to_string()));
        };

        if baseline.checksum == checksum {
            return Ok(alias(version, &baseline_version, Severity::None, None));
        }

        let snapshot = LoadedSnapshot::parse(raw)?;
        let report = self.differ.diff(&baseline.document, &snapshot.document);
        let severity = report.max_severity;

        if severity.requires_new_baseline() {
            Ok(promote(version, severity.into(), Some(report), snapshot))
        } else {
            Ok(alias(version, &baseline_version, severity, Some(report)))
        }
    }

    /// Apply an evaluation: a new baseline becomes the pointer
    pub fn commit(&mut self, evaluation: Evaluation) -> (ReleaseVersion, VersionEntry) {
        if let Some(snapshot) = evaluation.promoted {
            self.point_at(&evaluation.version, Some(snapshot));
        }
        log_decision(&evaluation.version, &evaluation.entry, evaluation.report.as_ref());
        (evaluation.version, evaluation.entry)
    }
}

fn promote(
    version: &ReleaseVersion,
    severity: RecordedSeverity,
    report: Option<DiffReport>,
    snapshot: LoadedSnapshot,
) -> Evaluation {
    Evaluation {
        version: version.clone(),
        entry: VersionEntry::new_baseline(version, severity),
        report,
        promoted: Some(snapshot),
    }
}

fn alias(
    version: &ReleaseVersion,
    baseline: &ReleaseVersion,
    severity: Severity,
    report: Option<DiffReport>,
) -> Evaluation {
    Evaluation {
        version: version.clone(),
        entry: VersionEntry::new_alias(baseline, severity),
        report,
        promoted: None,
    }
}

fn log_decision(version: &ReleaseVersion, entry: &VersionEntry, report: Option<&DiffReport>) {
    match (entry.is_baseline, entry.max_severity) {
        (true, RecordedSeverity::Initial) => info!("  {}: BASELINE (first in series)", version),
        (true, RecordedSeverity::Unknown) => {
            info!("  {}: BASELINE (no usable comparison)", version)
        }
        (true, severity) => info!(
            "  {}: BASELINE (API changed: {}, {} changes)",
            version,
            severity,
            report.map(DiffReport::total_changes).unwrap_or_default()
        ),
        (false, severity) => debug!(
            "  {}: points to {} (no API changes, severity: {})",
            version, entry.baseline, severity
        ),
    }
}

/// Result of driving one series
#[derive(Debug, Clone, Default)]
pub struct SeriesOutcome {
    /// New or re-evaluated entries, to merge into the manifest by key
    pub entries: BTreeMap<ReleaseVersion, VersionEntry>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl SeriesOutcome {
    pub fn record(&mut self, version: ReleaseVersion, entry: VersionEntry) {
        self.entries.insert(version, entry);
        self.succeeded += 1;
    }

    pub fn baselines_created(&self) -> usize {
        self.entries.values().filter(|e| e.is_baseline).count()
    }
}

/// Releases to walk for a series: everything on offer plus everything the
/// manifest already records, ascending
pub fn series_walk<'a, I>(offered: I, known: &BTreeMap<ReleaseVersion, VersionEntry>) -> Vec<ReleaseVersion>
where
    I: IntoIterator<Item = &'a ReleaseVersion>,
{
    let walk: BTreeSet<ReleaseVersion> = offered
        .into_iter()
        .cloned()
        .chain(known.keys().cloned())
        .collect();
    walk.into_iter().collect()
}

/// Replay a series purely from snapshots already in `store`.
///
/// `known` holds the manifest's entries for this series. A release whose
/// snapshot is unreadable or unparseable is counted as failed and the walk
/// continues; out-of-order input aborts the series.
pub fn replay_series(
    mut cursor: SeriesCursor,
    releases: &[ReleaseVersion],
    known: &BTreeMap<ReleaseVersion, VersionEntry>,
    store: &dyn SnapshotStore,
) -> Result<SeriesOutcome> {
    let mut outcome = SeriesOutcome::default();

    for version in releases {
        let existing = known.get(version);
        if let Some(entry) = existing.filter(|_| cursor.should_skip(existing)) {
            debug!("  {}: already in manifest (baseline: {})", version, entry.baseline);
            cursor.skip_known(version, entry)?;
            outcome.skipped += 1;
            continue;
        }

        let raw = match store.load(version) {
            Ok(raw) => raw,
            Err(e) => {
                if let Some(entry) = existing {
                    warn!("  {}: cannot re-check ({}), keeping recorded entry", version, e);
                    cursor.skip_known(version, entry)?;
                    outcome.skipped += 1;
                } else {
                    warn!("  {}: failed to read snapshot: {}", version, e);
                    outcome.failed += 1;
                }
                continue;
            }
        };

        match cursor.evaluate(version, &raw, store) {
            Ok(evaluation) => {
                let (version, entry) = cursor.commit(evaluation);
                outcome.record(version, entry);
            }
            Err(e @ BaselineError::OutOfOrder { .. }) => return Err(e),
            Err(e) => {
                warn!("  {}: failed to evaluate: {}", version, e);
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsSnapshotStore;
    use tempfile::tempdir;

    fn v(s: &str) -> ReleaseVersion {
        ReleaseVersion::parse(s).unwrap()
    }

    fn series(s: &str) -> SeriesKey {
        SeriesKey::parse(s).unwrap()
    }

    const HOST_V1: &str = "components:\n  schemas:\n    Host:\n      type: object\n      properties:\n        name: {type: string}\n";
    const HOST_DOCS: &str = "components:\n  schemas:\n    Host:\n      type: object\n      properties:\n        name: {type: string, description: Host name}\n";
    const HOST_V2: &str = "components:\n  schemas:\n    Host:\n      type: object\n      properties:\n        name: {type: string}\n        ip: {type: string}\n";

    fn store_with(snapshots: &[(&str, &str)]) -> (tempfile::TempDir, FsSnapshotStore) {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        for (version, body) in snapshots {
            store.save(&v(version), body.as_bytes()).unwrap();
        }
        (dir, store)
    }

    #[test]
    fn test_first_release_is_initial_baseline() {
        let (_dir, store) = store_with(&[]);
        let mut cursor = SeriesCursor::new(series("2.4.0"));
        let eval = cursor.evaluate(&v("2.4.0p1"), HOST_V1.as_bytes(), &store).unwrap();
        assert!(eval.is_baseline());
        assert_eq!(eval.entry.max_severity, RecordedSeverity::Initial);
        assert_eq!(eval.entry.baseline, v("2.4.0p1"));

        // Not committed yet
        assert!(cursor.current_baseline().is_none());
        cursor.commit(eval);
        assert_eq!(cursor.current_baseline(), Some(&v("2.4.0p1")));
    }

    #[test]
    fn test_alias_and_promotion() {
        let (_dir, store) = store_with(&[]);
        let mut cursor = SeriesCursor::new(series("2.4.0"));
        let first = cursor.evaluate(&v("2.4.0p1"), HOST_V1.as_bytes(), &store).unwrap();
        cursor.commit(first);

        let same = cursor.evaluate(&v("2.4.0p2"), HOST_V1.as_bytes(), &store).unwrap();
        assert!(!same.is_baseline());
        assert_eq!(same.entry.max_severity, RecordedSeverity::None);
        assert!(same.report.is_none());
        cursor.commit(same);

        let docs = cursor.evaluate(&v("2.4.0p3"), HOST_DOCS.as_bytes(), &store).unwrap();
        assert!(!docs.is_baseline());
        assert_eq!(docs.entry.baseline, v("2.4.0p1"));
        assert_eq!(docs.entry.max_severity, RecordedSeverity::Docs);
        cursor.commit(docs);

        let added = cursor.evaluate(&v("2.4.0p4"), HOST_V2.as_bytes(), &store).unwrap();
        assert!(added.is_baseline());
        assert_eq!(added.entry.max_severity, RecordedSeverity::Minor);
        cursor.commit(added);
        assert_eq!(cursor.current_baseline(), Some(&v("2.4.0p4")));
    }

    #[test]
    fn test_out_of_order_is_rejected() {
        let (_dir, store) = store_with(&[]);
        let mut cursor = SeriesCursor::new(series("2.4.0"));
        let eval = cursor.evaluate(&v("2.4.0p5"), HOST_V1.as_bytes(), &store).unwrap();
        cursor.commit(eval);

        for version in ["2.4.0p5", "2.4.0p4"] {
            assert!(matches!(
                cursor.evaluate(&v(version), HOST_V1.as_bytes(), &store),
                Err(BaselineError::OutOfOrder { .. })
            ));
        }
        assert!(cursor.evaluate(&v("2.3.0p9"), HOST_V1.as_bytes(), &store).is_err());
    }

    #[test]
    fn test_unparseable_snapshot_leaves_pointer() {
        let (_dir, store) = store_with(&[]);
        let mut cursor = SeriesCursor::new(series("2.4.0"));
        assert!(cursor.evaluate(&v("2.4.0p1"), b"- not\n- a document\n", &store).is_err());
        assert!(cursor.current_baseline().is_none());

        let eval = cursor.evaluate(&v("2.4.0p2"), HOST_V1.as_bytes(), &store).unwrap();
        assert_eq!(eval.entry.max_severity, RecordedSeverity::Initial);
    }

    #[test]
    fn test_skip_known_moves_pointer_to_recorded_baseline() {
        let (_dir, store) = store_with(&[("2.4.0p3", HOST_V2)]);
        let mut cursor = SeriesCursor::new(series("2.4.0"));
        cursor
            .skip_known(&v("2.4.0p3"), &VersionEntry::new_baseline(&v("2.4.0p3"), RecordedSeverity::Initial))
            .unwrap();
        cursor
            .skip_known(&v("2.4.0p4"), &VersionEntry::new_alias(&v("2.4.0p3"), Severity::None))
            .unwrap();
        assert_eq!(cursor.current_baseline(), Some(&v("2.4.0p3")));

        // Baseline snapshot is loaded lazily from the store
        let eval = cursor.evaluate(&v("2.4.0p5"), HOST_V2.as_bytes(), &store).unwrap();
        assert!(!eval.is_baseline());
        assert_eq!(eval.entry.baseline, v("2.4.0p3"));
    }

    #[test]
    fn test_missing_baseline_snapshot_promotes_as_unknown() {
        let (_dir, store) = store_with(&[]);
        let mut cursor = SeriesCursor::new(series("2.4.0"));
        cursor
            .skip_known(&v("2.4.0p1"), &VersionEntry::new_baseline(&v("2.4.0p1"), RecordedSeverity::Initial))
            .unwrap();
        let eval = cursor.evaluate(&v("2.4.0p2"), HOST_V1.as_bytes(), &store).unwrap();
        assert!(eval.is_baseline());
        assert_eq!(eval.entry.max_severity, RecordedSeverity::Unknown);
    }

    #[test]
    fn test_replay_series_skips_known_unless_forced() {
        let (_dir, store) = store_with(&[
            ("2.4.0p1", HOST_V1),
            ("2.4.0p2", HOST_DOCS),
            ("2.4.0p3", HOST_V2),
        ]);
        let releases = store.list().unwrap();
        let first = replay_series(
            SeriesCursor::new(series("2.4.0")),
            &releases,
            &BTreeMap::new(),
            &store,
        )
        .unwrap();
        assert_eq!(first.succeeded, 3);
        assert_eq!(first.baselines_created(), 2);

        let again = replay_series(SeriesCursor::new(series("2.4.0")), &releases, &first.entries, &store)
            .unwrap();
        assert_eq!(again.skipped, 3);
        assert!(again.entries.is_empty());

        let forced = replay_series(
            SeriesCursor::new(series("2.4.0")).with_force(true),
            &releases,
            &first.entries,
            &store,
        )
        .unwrap();
        assert_eq!(forced.entries, first.entries);
    }

    #[test]
    fn test_series_walk_merges_known_and_offered() {
        let mut known = BTreeMap::new();
        known.insert(v("2.4.0p2"), VersionEntry::new_baseline(&v("2.4.0p2"), RecordedSeverity::Initial));
        let offered = vec![v("2.4.0p10"), v("2.4.0p1"), v("2.4.0p2")];
        assert_eq!(
            series_walk(&offered, &known),
            vec![v("2.4.0p1"), v("2.4.0p2"), v("2.4.0p10")]
        );
    }
}
