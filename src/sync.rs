//! Run orchestration: bootstrap, sync and cleanup
//!
//! All three operate on an in-memory [`Manifest`] that the caller loads once
//! and saves once at the end (see [`finish`]), so an interrupted run never
//! leaves a half-written manifest behind.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{BaselineError, Result};
use crate::manifest::{Manifest, VersionEntry};
use crate::selector::{replay_series, series_walk, SeriesCursor, SeriesOutcome};
use crate::store::SnapshotStore;
use crate::upstream::{fetch_with_timeout, SnapshotFetcher, VersionSource};
use crate::version::{group_by_series, ReleaseVersion, SeriesFilter, SeriesKey};

/// Options shared by every mode
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Decide and report, but write nothing
    pub dry_run: bool,
    /// Re-evaluate releases the manifest already knows
    pub force: bool,
    /// Restrict the run to matching releases
    pub series: Option<SeriesFilter>,
    pub max_concurrent_series: usize,
    /// Upper bound for a single release's fetch
    pub fetch_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            force: false,
            series: None,
            max_concurrent_series: 2,
            fetch_timeout: Duration::from_secs(120),
        }
    }
}

impl RunOptions {
    fn selects(&self, version: &ReleaseVersion) -> bool {
        self.series.as_ref().map_or(true, |filter| filter.matches(version))
    }
}

/// Counts for one bootstrap or sync run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub baselines_created: usize,
    /// Series whose walk stopped early; their releases are in none of the
    /// other counts
    pub aborted_series: usize,
    /// Releases a dry-run sync would fetch
    pub pending: Vec<ReleaseVersion>,
}

impl RunSummary {
    fn absorb(&mut self, outcome: &SeriesOutcome) {
        self.succeeded += outcome.succeeded;
        self.failed += outcome.failed;
        self.skipped += outcome.skipped;
        self.baselines_created += outcome.baselines_created();
    }

    /// Fold one series' result into the summary and the manifest. An
    /// aborted series contributes nothing to the manifest.
    pub fn merge_series(
        &mut self,
        manifest: &mut Manifest,
        series: &SeriesKey,
        result: Result<SeriesOutcome>,
    ) {
        match result {
            Ok(outcome) => {
                self.absorb(&outcome);
                manifest.merge(outcome.entries);
            }
            Err(e) => {
                error!("Series {} aborted, its releases were not recorded: {}", series, e);
                self.aborted_series += 1;
            }
        }
    }

    pub fn render(&self) -> String {
        let mut line = format!(
            "{} succeeded, {} failed, {} skipped ({} new baselines)",
            self.succeeded, self.failed, self.skipped, self.baselines_created
        );
        if self.aborted_series > 0 {
            line.push_str(&format!(", {} series aborted", self.aborted_series));
        }
        line
    }
}

/// Result of a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Deleted, or to be deleted in a dry run
    pub removed: Vec<ReleaseVersion>,
    pub kept: usize,
    pub failed: usize,
}

fn selected_groups(
    releases: impl IntoIterator<Item = ReleaseVersion>,
    options: &RunOptions,
) -> BTreeMap<SeriesKey, Vec<ReleaseVersion>> {
    group_by_series(releases.into_iter().filter(|v| options.selects(v)))
}

/// Rebuild or extend the manifest from snapshots already in `store`
pub fn bootstrap(
    manifest: &mut Manifest,
    store: &dyn SnapshotStore,
    options: &RunOptions,
) -> Result<RunSummary> {
    let stored = store.list()?;
    let known_versions: Vec<ReleaseVersion> = manifest.versions().cloned().collect();
    let groups = selected_groups(stored.into_iter().chain(known_versions), options);

    let mut summary = RunSummary::default();
    for (series, offered) in groups {
        info!("Series {} ({} releases)", series, offered.len());
        let known = manifest.series_entries(&series);
        let walk = series_walk(&offered, &known);
        let cursor = SeriesCursor::new(series).with_force(options.force);

        let outcome = replay_series(cursor, &walk, &known, store)?;
        summary.absorb(&outcome);
        manifest.merge(outcome.entries);
    }

    Ok(summary)
}

/// Discover releases upstream, fetch the ones the manifest lacks and feed
/// them through the baseline logic. Series run concurrently.
pub async fn sync(
    manifest: &mut Manifest,
    source: &dyn VersionSource,
    fetcher: Arc<dyn SnapshotFetcher>,
    store: Arc<dyn SnapshotStore>,
    options: &RunOptions,
) -> Result<RunSummary> {
    let available: Vec<ReleaseVersion> = source
        .list_versions()
        .await?
        .into_iter()
        .filter(|v| options.selects(v))
        .collect();
    info!("Found {} upstream releases", available.len());

    let wanted: Vec<ReleaseVersion> = available
        .into_iter()
        .filter(|v| options.force || !manifest.contains(v))
        .collect();

    let mut summary = RunSummary::default();
    if wanted.is_empty() {
        info!("All releases are up to date");
        return Ok(summary);
    }

    if options.dry_run {
        info!("Would process {} releases:", wanted.len());
        for version in &wanted {
            info!("  {}", version);
        }
        summary.pending = wanted;
        return Ok(summary);
    }

    let limit = Arc::new(Semaphore::new(options.max_concurrent_series.max(1)));
    let mut tasks = JoinSet::new();

    for (series, offered) in group_by_series(wanted) {
        let known = manifest.series_entries(&series);
        let walk = series_walk(&offered, &known);
        info!("Series {} ({} releases to process)", series, offered.len());

        let cursor = SeriesCursor::new(series.clone()).with_force(options.force);
        let fetcher = Arc::clone(&fetcher);
        let store = Arc::clone(&store);
        let limit = Arc::clone(&limit);
        let fetch_timeout = options.fetch_timeout;

        tasks.spawn(async move {
            let _permit = limit.acquire_owned().await;
            let outcome = sync_series(
                cursor,
                &walk,
                &known,
                fetcher.as_ref(),
                store.as_ref(),
                fetch_timeout,
            )
            .await;
            (series, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((series, result)) => summary.merge_series(manifest, &series, result),
            Err(e) => {
                error!("Series task failed, its releases were not recorded: {}", e);
                summary.aborted_series += 1;
            }
        }
    }

    Ok(summary)
}

/// Drive one series through fetches. A failed fetch is counted and the walk
/// continues; a new baseline's snapshot is stored before it is committed.
pub async fn sync_series(
    mut cursor: SeriesCursor,
    releases: &[ReleaseVersion],
    known: &BTreeMap<ReleaseVersion, VersionEntry>,
    fetcher: &dyn SnapshotFetcher,
    store: &dyn SnapshotStore,
    fetch_timeout: Duration,
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

        info!("  {}: fetching", version);
        let raw = match fetch_with_timeout(fetcher, version, fetch_timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("  {}: {}", version, e);
                outcome.failed += 1;
                if let Some(entry) = existing {
                    cursor.skip_known(version, entry)?;
                }
                continue;
            }
        };

        let evaluation = match cursor.evaluate(version, &raw, store) {
            Ok(evaluation) => evaluation,
            Err(e @ BaselineError::OutOfOrder { .. }) => return Err(e),
            Err(e) => {
                warn!("  {}: failed to evaluate: {}", version, e);
                outcome.failed += 1;
                continue;
            }
        };

        if evaluation.is_baseline() {
            if let Err(e) = store.save(version, &raw) {
                warn!("  {}: failed to store snapshot: {}", version, e);
                outcome.failed += 1;
                continue;
            }
        }

        let (version, entry) = cursor.commit(evaluation);
        outcome.record(version, entry);
    }

    Ok(outcome)
}

/// Delete stored snapshots of releases that are not baselines. Manifest
/// entries are left alone.
pub fn cleanup(
    manifest: &Manifest,
    store: &dyn SnapshotStore,
    options: &RunOptions,
) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();

    for version in store.list()?.into_iter().filter(|v| options.selects(v)) {
        if manifest.is_baseline(&version) {
            report.kept += 1;
            continue;
        }

        if options.dry_run {
            info!("  Would delete: {}", store.describe(&version));
            report.removed.push(version);
            continue;
        }

        match store.remove(&version) {
            Ok(()) => {
                debug!("  Deleted: {}", store.describe(&version));
                report.removed.push(version);
            }
            Err(e) => {
                warn!("  {}: failed to delete snapshot: {}", version, e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Persist the manifest at the end of a run, or print it for a dry run.
/// Saving checks consistency first, so an inconsistent manifest is never
/// written.
pub fn finish(manifest: &mut Manifest, path: &Path, dry_run: bool) -> Result<()> {
    if dry_run {
        info!("Dry run, manifest not written:\n{}", manifest.render_listing());
        return Ok(());
    }
    manifest.save(path)?;
    info!("Manifest saved to {} ({} releases)", path.display(), manifest.len());
    Ok(())
}
