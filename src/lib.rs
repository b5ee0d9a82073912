//! OpenAPI Baselines
//!
//! Tracks how a product's REST API schema drifts across patch releases and
//! keeps only the snapshots that matter.
//!
//! ## Features
//!
//! - **Structural Diff**: Paths, schemas and fields compared one level deep
//! - **Severity Lattice**: none < docs < minor < deprecated < breaking
//! - **Baseline Selection**: A release is stored only when it changes the API
//!   by at least `minor`; every other release aliases the baseline before it
//! - **Manifest**: Version → baseline mapping, saved atomically in release order
//! - **Sync**: Discover releases upstream and fetch only what is missing
//!
//! ## Layout
//!
//! ```text
//! specs/
//! ├── 2.3.0/
//! │   └── p1.yaml
//! └── 2.4.0/
//!     ├── p1.yaml        baseline (initial)
//!     └── p5.yaml        baseline (minor)
//! manifest.json          2.4.0p2..p4 → 2.4.0p1, 2.4.0p6.. → 2.4.0p5
//! ```

pub mod checksum;
pub mod config;
pub mod diff;
pub mod document;
pub mod error;
pub mod manifest;
pub mod selector;
pub mod severity;
pub mod store;
pub mod sync;
pub mod upstream;
pub mod version;

pub use checksum::Checksum;
pub use config::SyncConfig;
pub use diff::{diff, DiffReport, FieldChange, PathCategory, SchemaChange, SchemaDiffer};
pub use document::{SchemaDocument, SchemaNode, Shape};
pub use error::{BaselineError, Result};
pub use manifest::{Manifest, VersionEntry};
pub use selector::{Evaluation, SeriesCursor, SeriesOutcome};
pub use severity::{RecordedSeverity, Severity};
pub use store::{FsSnapshotStore, SnapshotStore};
pub use sync::{RunOptions, RunSummary};
pub use upstream::{SnapshotFetcher, VersionSource};
pub use version::{ReleaseVersion, SeriesFilter, SeriesKey};
