//! Configuration for spec-sync
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (spec-sync.toml)
//! - Environment variables (SPEC_SYNC__SECTION__KEY)
//!
//! ## Example config file (spec-sync.toml):
//! ```toml
//! [storage]
//! specs_dir = "specs"
//! manifest_path = "manifest.json"
//!
//! [upstream]
//! image = "checkmk/check-mk-raw"
//! tag_pattern = '^2\.[234]\.[0-9]+p[0-9]+$'
//! credentials = ["cmkadmin:test123", "automation:test123"]
//! fetch_timeout_secs = 120
//!
//! [sync]
//! max_concurrent_series = 2
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Where snapshots and the manifest live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Where releases come from
    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub sync: RunConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the snapshot tree
    #[serde(default = "default_specs_dir")]
    pub specs_dir: PathBuf,

    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
}

/// Release discovery and snapshot retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Paged tag listing endpoint
    #[serde(default = "default_tags_url")]
    pub tags_url: String,

    /// Container image the snapshots are extracted from
    #[serde(default = "default_image")]
    pub image: String,

    /// Tags not matching this are ignored
    #[serde(default = "default_tag_pattern")]
    pub tag_pattern: String,

    /// Site name inside the container
    #[serde(default = "default_site")]
    pub site: String,

    /// Port the web server listens on inside the container
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// `user:password` pairs, tried in order
    #[serde(default = "default_credentials")]
    pub credentials: Vec<String>,

    /// Upper bound for one release's whole fetch
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// How long to wait for the container to start serving
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Per-request bound for tag listing
    #[serde(default = "default_list_timeout")]
    pub list_timeout_secs: u64,
}

/// Run behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Series processed at the same time during sync
    #[serde(default = "default_max_concurrent_series")]
    pub max_concurrent_series: usize,
}

// Default value functions
fn default_specs_dir() -> PathBuf {
    PathBuf::from("specs")
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("manifest.json")
}

fn default_tags_url() -> String {
    "https://hub.docker.com/v2/repositories/checkmk/check-mk-raw/tags?page_size=100".to_string()
}

fn default_image() -> String {
    "checkmk/check-mk-raw".to_string()
}

fn default_tag_pattern() -> String {
    r"^2\.[234]\.[0-9]+p[0-9]+$".to_string()
}

fn default_site() -> String {
    "cmk".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_api_version() -> String {
    "1.0".to_string()
}

fn default_credentials() -> Vec<String> {
    vec!["cmkadmin:test123".to_string(), "automation:test123".to_string()]
}

fn default_fetch_timeout() -> u64 {
    120
}

fn default_startup_timeout() -> u64 {
    120
}

fn default_list_timeout() -> u64 {
    30
}

fn default_max_concurrent_series() -> usize {
    2
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            specs_dir: default_specs_dir(),
            manifest_path: default_manifest_path(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            tags_url: default_tags_url(),
            image: default_image(),
            tag_pattern: default_tag_pattern(),
            site: default_site(),
            port: default_port(),
            api_version: default_api_version(),
            credentials: default_credentials(),
            fetch_timeout_secs: default_fetch_timeout(),
            startup_timeout_secs: default_startup_timeout(),
            list_timeout_secs: default_list_timeout(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_series: default_max_concurrent_series(),
        }
    }
}

impl UpstreamConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }
}

impl SyncConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["spec-sync.toml", ".spec-sync.toml", "config/spec-sync.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("com", "checkmk", "spec-sync") {
            let xdg_config = config_dir.config_dir().join("spec-sync.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SPEC_SYNC__UPSTREAM__IMAGE=... and friends
        builder = builder.add_source(
            Environment::with_prefix("SPEC_SYNC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
