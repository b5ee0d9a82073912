//! Upstream collaborators
//!
//! Where releases and their snapshots come from. The baseline logic only sees
//! these two traits; the Docker Hub and container implementations live in the
//! submodules.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BaselineError, Result};
use crate::version::ReleaseVersion;

pub mod docker;
pub mod docker_hub;

pub use docker::DockerSnapshotFetcher;
pub use docker_hub::DockerHubVersionSource;

/// Lists the releases available upstream
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Every known release, ascending
    async fn list_versions(&self) -> Result<Vec<ReleaseVersion>>;
}

/// Retrieves the raw schema document of one release
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch(&self, version: &ReleaseVersion) -> Result<Vec<u8>>;
}

/// Run a fetch with an upper bound on its duration
pub async fn fetch_with_timeout(
    fetcher: &dyn SnapshotFetcher,
    version: &ReleaseVersion,
    limit: Duration,
) -> Result<Vec<u8>> {
    match tokio::time::timeout(limit, fetcher.fetch(version)).await {
        Ok(result) => result,
        Err(_) => Err(BaselineError::FetchTimeout {
            version: version.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}
