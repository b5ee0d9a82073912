//! Release discovery from the Docker Hub tags API

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use super::VersionSource;
use crate::config::UpstreamConfig;
use crate::error::{BaselineError, Result};
use crate::version::ReleaseVersion;

/// One page of `GET /v2/repositories/<repo>/tags`
#[derive(Debug, Deserialize)]
struct TagPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Pages through the image's tags and keeps the ones that name a release
pub struct DockerHubVersionSource {
    client: reqwest::Client,
    tags_url: String,
    tag_pattern: Regex,
}

impl DockerHubVersionSource {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let tag_pattern = Regex::new(&config.tag_pattern).map_err(|e| {
            BaselineError::Config(format!("tag_pattern {:?}: {}", config.tag_pattern, e))
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.list_timeout())
            .build()?;

        Ok(Self {
            client,
            tags_url: config.tags_url.clone(),
            tag_pattern,
        })
    }
}

#[async_trait]
impl VersionSource for DockerHubVersionSource {
    async fn list_versions(&self) -> Result<Vec<ReleaseVersion>> {
        let mut names = Vec::new();
        let mut next = Some(self.tags_url.clone());

        while let Some(url) = next {
            debug!(%url, "Fetching tag page");
            let page: TagPage = self
                .client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            names.extend(page.results.into_iter().map(|tag| tag.name));
            next = page.next.filter(|url| !url.is_empty());
        }

        Ok(releases_from_tags(&names, &self.tag_pattern))
    }
}

/// Tags matching `pattern`, parsed and sorted ascending. Matching tags that
/// still fail to parse are skipped with a warning.
pub fn releases_from_tags<S: AsRef<str>>(tags: &[S], pattern: &Regex) -> Vec<ReleaseVersion> {
    let mut releases: Vec<ReleaseVersion> = tags
        .iter()
        .map(AsRef::as_ref)
        .filter(|tag| pattern.is_match(tag))
        .filter_map(|tag| match ReleaseVersion::parse(tag) {
            Ok(version) => Some(version),
            Err(e) => {
                warn!(tag, "Ignoring tag: {}", e);
                None
            }
        })
        .collect();

    releases.sort();
    releases.dedup();
    releases
}
