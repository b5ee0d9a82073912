//! Local snapshot storage
//!
//! Snapshots live at `<specs>/<major.minor.patch>/p<N>.yaml`. Only baselines
//! are meant to stay on disk; aliases reuse their baseline's file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::checksum::Checksum;
use crate::error::{BaselineError, Result};
use crate::version::{ReleaseVersion, SeriesKey};

const SNAPSHOT_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Write bytes to `target` via a sibling temp file and a rename, so readers
/// never observe a partial file.
pub fn atomic_write(target: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    let temp_path = target.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&temp_path, content)?;
    if let Err(e) = fs::rename(&temp_path, target) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Storage for per-release schema snapshots
pub trait SnapshotStore: Send + Sync {
    /// Raw bytes of a stored snapshot; `SnapshotMissing` if absent
    fn load(&self, version: &ReleaseVersion) -> Result<Vec<u8>>;

    /// Persist a snapshot (overwrites)
    fn save(&self, version: &ReleaseVersion, data: &[u8]) -> Result<()>;

    fn exists(&self, version: &ReleaseVersion) -> bool;

    /// Every stored release, ascending
    fn list(&self) -> Result<Vec<ReleaseVersion>>;

    fn remove(&self, version: &ReleaseVersion) -> Result<()>;

    /// Human-readable location, for logs
    fn describe(&self, version: &ReleaseVersion) -> String;
}

/// Filesystem-backed snapshot store
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical path a snapshot is written to
    pub fn path_for(&self, version: &ReleaseVersion) -> PathBuf {
        self.root
            .join(version.series().dir_name())
            .join(version.snapshot_file_name())
    }

    /// Stored files for `version`, one per YAML extension present
    fn existing_paths(&self, version: &ReleaseVersion) -> Vec<PathBuf> {
        let canonical = self.path_for(version);
        SNAPSHOT_EXTENSIONS
            .iter()
            .map(|ext| canonical.with_extension(ext))
            .filter(|path| path.is_file())
            .collect()
    }

    fn existing_path(&self, version: &ReleaseVersion) -> Option<PathBuf> {
        self.existing_paths(version).into_iter().next()
    }

    /// Map `<root>/2.4.0/p17.yaml` back to `2.4.0p17`
    fn version_from_path(&self, path: &Path) -> Option<ReleaseVersion> {
        let ext = path.extension()?.to_str()?;
        if !SNAPSHOT_EXTENSIONS.contains(&ext) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let series_dir = path.parent()?.file_name()?.to_str()?;

        let series = match SeriesKey::parse(series_dir) {
            Ok(series) => series,
            Err(_) => {
                warn!(path = %path.display(), "Skipping snapshot outside a series directory");
                return None;
            }
        };
        let version = match ReleaseVersion::parse(&format!("{series}{stem}")) {
            Ok(version) => version,
            Err(e) => {
                warn!(path = %path.display(), "Skipping snapshot with unparseable name: {}", e);
                return None;
            }
        };

        // `p01.yaml` parses as p1 but would never be found under `p1.yaml`
        if self.path_for(&version).with_extension(ext) != path {
            warn!(
                path = %path.display(),
                "Skipping snapshot with non-canonical name, expected {}",
                version.relative_snapshot_path()
            );
            return None;
        }
        Some(version)
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn load(&self, version: &ReleaseVersion) -> Result<Vec<u8>> {
        let path = self
            .existing_path(version)
            .ok_or_else(|| BaselineError::SnapshotMissing(version.to_string()))?;
        Ok(fs::read(path)?)
    }

    fn save(&self, version: &ReleaseVersion, data: &[u8]) -> Result<()> {
        let path = self.path_for(version);
        if let Ok(existing) = fs::read(&path) {
            if Checksum::from_bytes(data).verify(&existing) {
                debug!(path = %path.display(), "Snapshot unchanged, not rewriting");
                return Ok(());
            }
        }
        atomic_write(&path, data)
    }

    fn exists(&self, version: &ReleaseVersion) -> bool {
        self.existing_path(version).is_some()
    }

    fn list(&self) -> Result<Vec<ReleaseVersion>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| BaselineError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(version) = self.version_from_path(entry.path()) {
                versions.push(version);
            }
        }

        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    fn remove(&self, version: &ReleaseVersion) -> Result<()> {
        let paths = self.existing_paths(version);
        if paths.is_empty() {
            return Err(BaselineError::SnapshotMissing(version.to_string()));
        }
        for path in paths {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn describe(&self, version: &ReleaseVersion) -> String {
        self.existing_path(version)
            .unwrap_or_else(|| self.path_for(version))
            .display()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn v(s: &str) -> ReleaseVersion {
        ReleaseVersion::parse(s).unwrap()
    }

    #[test]
    fn test_atomic_write_creates_parent_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("manifest.json");
        atomic_write(&target, b"{}").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"{}");

        let leftovers = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_save_load_and_layout() {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        store.save(&v("2.4.0p17"), b"paths: {}\n").unwrap();

        assert!(dir.path().join("2.4.0").join("p17.yaml").is_file());
        assert!(store.exists(&v("2.4.0p17")));
        assert_eq!(store.load(&v("2.4.0p17")).unwrap(), b"paths: {}\n");
        assert!(matches!(
            store.load(&v("2.4.0p18")),
            Err(BaselineError::SnapshotMissing(_))
        ));
    }

    #[test]
    fn test_list_skips_foreign_files() {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        store.save(&v("2.4.0p10"), b"a: 1").unwrap();
        store.save(&v("2.4.0p2"), b"a: 1").unwrap();
        store.save(&v("2.3.0p41"), b"a: 1").unwrap();
        fs::write(dir.path().join("2.4.0").join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("2.4.0").join("latest.yaml"), "x").unwrap();
        fs::create_dir_all(dir.path().join("drafts")).unwrap();
        fs::write(dir.path().join("drafts").join("p1.yaml"), "x").unwrap();
        fs::write(dir.path().join("2.4.0").join("p3.yml"), "x").unwrap();

        assert_eq!(
            store.list().unwrap(),
            vec![v("2.3.0p41"), v("2.4.0p2"), v("2.4.0p3"), v("2.4.0p10")]
        );
        assert!(store.exists(&v("2.4.0p3")));
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        store.save(&v("2.4.0p1"), b"a: 1").unwrap();
        store.remove(&v("2.4.0p1")).unwrap();
        assert!(!store.exists(&v("2.4.0p1")));
        assert!(store.remove(&v("2.4.0p1")).is_err());
    }

    #[test]
    fn test_list_skips_non_canonical_names() {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        store.save(&v("2.4.0p2"), b"a: 1").unwrap();
        fs::write(dir.path().join("2.4.0").join("p01.yaml"), "x").unwrap();

        assert_eq!(store.list().unwrap(), vec![v("2.4.0p2")]);
        assert!(!store.exists(&v("2.4.0p1")));
    }

    #[test]
    fn test_remove_deletes_both_extensions() {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        store.save(&v("2.4.0p1"), b"a: 1").unwrap();
        fs::write(dir.path().join("2.4.0").join("p1.yml"), "a: 1").unwrap();

        store.remove(&v("2.4.0p1")).unwrap();
        assert!(!store.exists(&v("2.4.0p1")));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_on_missing_root() {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }
}
