//! Sync runs against in-memory upstream fakes

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use openapi_baselines::error::{BaselineError, Result};
use openapi_baselines::store::FsSnapshotStore;
use openapi_baselines::sync::{self, RunOptions};
use openapi_baselines::upstream::{SnapshotFetcher, VersionSource};
use openapi_baselines::{
    Manifest, RecordedSeverity, ReleaseVersion, SeriesCursor, SeriesFilter, SeriesKey, SnapshotStore,
};
use tempfile::tempdir;

fn v(s: &str) -> ReleaseVersion {
    ReleaseVersion::parse(s).unwrap()
}

fn fixture(name: &str) -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    fs::read(path).unwrap()
}

struct StaticSource(Vec<ReleaseVersion>);

#[async_trait]
impl VersionSource for StaticSource {
    async fn list_versions(&self) -> Result<Vec<ReleaseVersion>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct MapFetcher {
    bodies: HashMap<ReleaseVersion, Vec<u8>>,
    slow: Vec<ReleaseVersion>,
    calls: Mutex<Vec<ReleaseVersion>>,
}

impl MapFetcher {
    fn with(mut self, version: &str, fixture_name: &str) -> Self {
        self.bodies.insert(v(version), fixture(fixture_name));
        self
    }

    fn calls(&self) -> Vec<ReleaseVersion> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

#[async_trait]
impl SnapshotFetcher for MapFetcher {
    async fn fetch(&self, version: &ReleaseVersion) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(version.clone());
        if self.slow.contains(version) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        self.bodies
            .get(version)
            .cloned()
            .ok_or_else(|| BaselineError::FetchFailed {
                version: version.to_string(),
                reason: "container never came up".to_string(),
            })
    }
}

fn full_fetcher() -> MapFetcher {
    MapFetcher::default()
        .with("2.3.0p7", "host_v1.yaml")
        .with("2.4.0p1", "host_v1.yaml")
        .with("2.4.0p2", "host_v2.yaml")
        .with("2.4.0p3", "host_v3.yaml")
        .with("2.4.0p4", "host_v4.yaml")
}

fn all_versions() -> StaticSource {
    StaticSource(
        ["2.4.0p3", "2.3.0p7", "2.4.0p1", "2.4.0p4", "2.4.0p2"]
            .into_iter()
            .map(v)
            .collect(),
    )
}

#[tokio::test]
async fn sync_fetches_new_releases_and_stores_only_baselines() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsSnapshotStore::new(dir.path()));
    let fetcher = Arc::new(full_fetcher());
    let mut manifest = Manifest::new();

    let summary = sync::sync(
        &mut manifest,
        &all_versions(),
        fetcher.clone(),
        store.clone(),
        &RunOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.baselines_created, 4);
    assert_eq!(fetcher.calls().len(), 5);

    assert_eq!(
        store.list().unwrap(),
        vec![v("2.3.0p7"), v("2.4.0p1"), v("2.4.0p2"), v("2.4.0p3")]
    );
    let p4 = manifest.get(&v("2.4.0p4")).unwrap();
    assert_eq!(p4.baseline, v("2.4.0p3"));
    assert_eq!(p4.max_severity, RecordedSeverity::Docs);
    manifest.check_consistency().unwrap();
}

#[tokio::test]
async fn second_sync_fetches_nothing() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsSnapshotStore::new(dir.path()));
    let mut manifest = Manifest::new();
    let options = RunOptions::default();

    sync::sync(&mut manifest, &all_versions(), Arc::new(full_fetcher()), store.clone(), &options)
        .await
        .unwrap();
    let before = manifest.clone();

    let fetcher = Arc::new(full_fetcher());
    let summary = sync::sync(&mut manifest, &all_versions(), fetcher.clone(), store, &options)
        .await
        .unwrap();
    assert_eq!(summary, sync::RunSummary::default());
    assert!(fetcher.calls().is_empty());
    assert_eq!(manifest, before);
}

#[tokio::test]
async fn new_release_compares_against_recorded_baseline() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsSnapshotStore::new(dir.path()));
    let mut manifest = Manifest::new();
    let options = RunOptions::default();

    let first = StaticSource(vec![v("2.4.0p1"), v("2.4.0p2"), v("2.4.0p3")]);
    sync::sync(&mut manifest, &first, Arc::new(full_fetcher()), store.clone(), &options)
        .await
        .unwrap();

    // Only p4 is new; its baseline must come from the manifest and the store
    let fetcher = Arc::new(full_fetcher());
    let summary = sync::sync(&mut manifest, &all_versions(), fetcher.clone(), store, &options)
        .await
        .unwrap();
    assert_eq!(fetcher.calls(), vec![v("2.3.0p7"), v("2.4.0p4")]);
    assert_eq!(summary.skipped, 3);
    assert_eq!(manifest.get(&v("2.4.0p4")).unwrap().baseline, v("2.4.0p3"));
}

#[tokio::test]
async fn failed_fetch_is_isolated() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsSnapshotStore::new(dir.path()));
    let mut fetcher = full_fetcher();
    fetcher.bodies.remove(&v("2.4.0p2"));
    let mut manifest = Manifest::new();

    let summary = sync::sync(
        &mut manifest,
        &all_versions(),
        Arc::new(fetcher),
        store,
        &RunOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 4);
    assert!(!manifest.contains(&v("2.4.0p2")));

    // p3 drops `ip` relative to p1
    let p3 = manifest.get(&v("2.4.0p3")).unwrap();
    assert!(p3.is_baseline);
    assert_eq!(p3.max_severity, RecordedSeverity::Breaking);
    manifest.check_consistency().unwrap();
}

#[tokio::test]
async fn slow_fetch_times_out_and_counts_as_failure() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsSnapshotStore::new(dir.path()));
    let mut fetcher = full_fetcher();
    fetcher.slow.push(v("2.3.0p7"));
    let options = RunOptions {
        fetch_timeout: Duration::from_millis(50),
        ..RunOptions::default()
    };
    let mut manifest = Manifest::new();

    let summary = sync::sync(&mut manifest, &all_versions(), Arc::new(fetcher), store, &options)
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert!(!manifest.contains(&v("2.3.0p7")));
    assert_eq!(manifest.len(), 4);
}

#[tokio::test]
async fn dry_run_lists_pending_without_fetching() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsSnapshotStore::new(dir.path()));
    let fetcher = Arc::new(full_fetcher());
    let mut manifest = Manifest::new();
    let options = RunOptions {
        dry_run: true,
        series: Some(SeriesFilter::parse("2.4").unwrap()),
        ..RunOptions::default()
    };

    let summary = sync::sync(&mut manifest, &all_versions(), fetcher.clone(), store.clone(), &options)
        .await
        .unwrap();
    assert_eq!(
        summary.pending,
        vec![v("2.4.0p1"), v("2.4.0p2"), v("2.4.0p3"), v("2.4.0p4")]
    );
    assert!(fetcher.calls().is_empty());
    assert!(manifest.is_empty());
    assert!(store.list().unwrap().is_empty());
}

#[tokio::test]
async fn series_run_concurrently_and_merge_by_key() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsSnapshotStore::new(dir.path()));
    let mut manifest = Manifest::new();
    let options = RunOptions {
        max_concurrent_series: 4,
        ..RunOptions::default()
    };

    let mut fetcher = full_fetcher();
    for series in ["2.2.0", "2.1.0"] {
        fetcher.bodies.insert(v(&format!("{series}p1")), fixture("host_v1.yaml"));
        fetcher.bodies.insert(v(&format!("{series}p2")), fixture("host_v1.yaml"));
    }
    let mut versions = all_versions().0;
    versions.extend(["2.2.0p1", "2.2.0p2", "2.1.0p1", "2.1.0p2"].into_iter().map(v));

    let summary = sync::sync(
        &mut manifest,
        &StaticSource(versions),
        Arc::new(fetcher),
        store,
        &options,
    )
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 9);
    assert_eq!(manifest.len(), 9);
    assert_eq!(manifest.get(&v("2.2.0p2")).unwrap().baseline, v("2.2.0p1"));
    assert_eq!(manifest.get(&v("2.1.0p2")).unwrap().baseline, v("2.1.0p1"));
    manifest.check_consistency().unwrap();
}

#[tokio::test]
async fn forced_sync_refetches_known_releases_and_reproduces_manifest() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsSnapshotStore::new(dir.path()));
    let mut manifest = Manifest::new();
    sync::sync(
        &mut manifest,
        &all_versions(),
        Arc::new(full_fetcher()),
        store.clone(),
        &RunOptions::default(),
    )
    .await
    .unwrap();
    let before = manifest.clone();

    let fetcher = Arc::new(full_fetcher());
    let options = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    let summary = sync::sync(&mut manifest, &all_versions(), fetcher.clone(), store, &options)
        .await
        .unwrap();

    assert_eq!(fetcher.calls().len(), 5);
    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.skipped, 0);
    assert_eq!(manifest, before);
}

#[tokio::test]
async fn forced_refetch_failure_keeps_recorded_entry() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FsSnapshotStore::new(dir.path()));
    let mut manifest = Manifest::new();
    sync::sync(
        &mut manifest,
        &all_versions(),
        Arc::new(full_fetcher()),
        store.clone(),
        &RunOptions::default(),
    )
    .await
    .unwrap();
    let before = manifest.clone();

    // p2 is a recorded baseline; p3 must still compare against it
    let mut fetcher = full_fetcher();
    fetcher.bodies.remove(&v("2.4.0p2"));
    let options = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    let summary = sync::sync(&mut manifest, &all_versions(), Arc::new(fetcher), store, &options)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(manifest.get(&v("2.4.0p2")), before.get(&v("2.4.0p2")));
    assert_eq!(manifest, before);
    manifest.check_consistency().unwrap();
}

#[tokio::test]
async fn out_of_order_walk_aborts_only_that_series() {
    let dir = tempdir().unwrap();
    let store = FsSnapshotStore::new(dir.path());
    let fetcher = full_fetcher();
    let timeout = Duration::from_secs(5);

    let aborted = sync::sync_series(
        SeriesCursor::new(SeriesKey::parse("2.4.0").unwrap()),
        &[v("2.4.0p2"), v("2.4.0p1")],
        &BTreeMap::new(),
        &fetcher,
        &store,
        timeout,
    )
    .await;
    assert!(matches!(aborted, Err(BaselineError::OutOfOrder { .. })));

    let healthy = sync::sync_series(
        SeriesCursor::new(SeriesKey::parse("2.3.0").unwrap()),
        &[v("2.3.0p7")],
        &BTreeMap::new(),
        &fetcher,
        &store,
        timeout,
    )
    .await;

    let mut manifest = Manifest::new();
    let mut summary = sync::RunSummary::default();
    summary.merge_series(&mut manifest, &SeriesKey::parse("2.4.0").unwrap(), aborted);
    summary.merge_series(&mut manifest, &SeriesKey::parse("2.3.0").unwrap(), healthy);

    assert_eq!(summary.aborted_series, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(manifest.len(), 1);
    assert!(manifest.is_baseline(&v("2.3.0p7")));
    manifest.check_consistency().unwrap();
}
