//! Release identifiers and their ordering
//!
//! Upstream releases look like `2.4.0p17`: a `major.minor.patch` series plus a
//! patch level. Ordering is numeric at every position, so `2.4.0p2 < 2.4.0p10`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BaselineError, Result};

fn release_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+)\.(\d+)\.(\d+)p(\d+)$").expect("release pattern is a valid regex")
    })
}

fn parse_component(raw: &str, input: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| BaselineError::InvalidVersion(input.to_string()))
}

/// The `major.minor.patch` prefix shared by every release of one baseline lineage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey(Version);

impl SeriesKey {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    /// Parse a bare series such as `2.4.0`
    pub fn parse(input: &str) -> Result<Self> {
        let version =
            Version::parse(input).map_err(|_| BaselineError::InvalidVersion(input.to_string()))?;
        if !version.pre.is_empty() || !version.build.is_empty() {
            return Err(BaselineError::InvalidVersion(input.to_string()));
        }
        Ok(Self(version))
    }

    pub fn version(&self) -> &Version {
        &self.0
    }

    /// Directory holding the snapshots of this series (e.g. `2.4.0`)
    pub fn dir_name(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single upstream release, e.g. `2.4.0p17`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseVersion {
    series: SeriesKey,
    patch_level: u64,
}

impl ReleaseVersion {
    pub fn new(major: u64, minor: u64, patch: u64, patch_level: u64) -> Self {
        Self {
            series: SeriesKey::new(major, minor, patch),
            patch_level,
        }
    }

    /// Parse `<major>.<minor>.<patch>p<patchlevel>`.
    ///
    /// Anything else is rejected; there is no fallback ordering for
    /// unparseable identifiers.
    pub fn parse(input: &str) -> Result<Self> {
        let caps = release_pattern()
            .captures(input)
            .ok_or_else(|| BaselineError::InvalidVersion(input.to_string()))?;

        Ok(Self::new(
            parse_component(&caps[1], input)?,
            parse_component(&caps[2], input)?,
            parse_component(&caps[3], input)?,
            parse_component(&caps[4], input)?,
        ))
    }

    pub fn series(&self) -> &SeriesKey {
        &self.series
    }

    pub fn patch_level(&self) -> u64 {
        self.patch_level
    }

    /// The ordering tuple `(major, minor, patch, patch_level)`
    pub fn as_tuple(&self) -> (u64, u64, u64, u64) {
        let v = self.series.version();
        (v.major, v.minor, v.patch, self.patch_level)
    }

    /// File name of this release's snapshot inside its series directory
    pub fn snapshot_file_name(&self) -> String {
        format!("p{}.yaml", self.patch_level)
    }

    /// Snapshot path relative to the specs directory, as recorded in the manifest
    /// (e.g. `2.4.0/p17.yaml`)
    pub fn relative_snapshot_path(&self) -> String {
        format!("{}/{}", self.series.dir_name(), self.snapshot_file_name())
    }

    /// Identifier used by downstream generators (e.g. `v2_4_0p17`)
    pub fn package_name(&self) -> String {
        format!("v{}", self.to_string().replace('.', "_"))
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p{}", self.series, self.patch_level)
    }
}

impl FromStr for ReleaseVersion {
    type Err = BaselineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ReleaseVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReleaseVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Component-wise release filter (`2`, `2.4` or `2.4.0`).
///
/// Matching is numeric per component, so `2.4` does not match `2.40.0p1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesFilter {
    components: Vec<u64>,
}

impl SeriesFilter {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(BaselineError::InvalidVersion(input.to_string()));
        }

        let components = trimmed
            .split('.')
            .map(|part| parse_component(part, input))
            .collect::<Result<Vec<_>>>()?;

        if components.len() > 3 {
            return Err(BaselineError::InvalidVersion(input.to_string()));
        }
        Ok(Self { components })
    }

    pub fn matches(&self, release: &ReleaseVersion) -> bool {
        let (major, minor, patch, _) = release.as_tuple();
        self.components
            .iter()
            .zip([major, minor, patch])
            .all(|(want, have)| *want == have)
    }
}

impl fmt::Display for SeriesFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Group releases by series, each group sorted ascending and deduplicated
pub fn group_by_series<I>(releases: I) -> BTreeMap<SeriesKey, Vec<ReleaseVersion>>
where
    I: IntoIterator<Item = ReleaseVersion>,
{
    let mut groups: BTreeMap<SeriesKey, Vec<ReleaseVersion>> = BTreeMap::new();
    for release in releases {
        groups
            .entry(release.series().clone())
            .or_default()
            .push(release);
    }
    for group in groups.values_mut() {
        group.sort();
        group.dedup();
    }
    groups
}
