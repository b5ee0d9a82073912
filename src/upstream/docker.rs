//! Snapshot retrieval from a throwaway container
//!
//! For each release the image is pulled and started, the web UI is polled
//! until it answers, and the schema document is downloaded from inside the
//! container. The container and image are always removed afterwards.

use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use super::SnapshotFetcher;
use crate::config::UpstreamConfig;
use crate::error::{BaselineError, Result};
use crate::version::ReleaseVersion;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Grace period after the login page first answers; the REST API comes up later
const SETTLE_DELAY: Duration = Duration::from_secs(10);

/// Container output lines logged when a site never comes up
const LOG_TAIL_LINES: &str = "20";

/// Time `fetch` may spend removing the container and image once the
/// configured fetch timeout has run out
pub const CLEANUP_GRACE: Duration = Duration::from_secs(30);

pub struct DockerSnapshotFetcher {
    docker: String,
    image: String,
    site: String,
    port: u16,
    api_version: String,
    credentials: Vec<String>,
    fetch_timeout: Duration,
    startup_timeout: Duration,
}

impl DockerSnapshotFetcher {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            docker: "docker".to_string(),
            image: config.image.clone(),
            site: config.site.clone(),
            port: config.port,
            api_version: config.api_version.clone(),
            credentials: config.credentials.clone(),
            fetch_timeout: config.fetch_timeout(),
            startup_timeout: config.startup_timeout(),
        }
    }

    /// Use a different container CLI binary (e.g. `podman`)
    pub fn with_docker_binary(mut self, docker: impl Into<String>) -> Self {
        self.docker = docker.into();
        self
    }

    fn image_ref(&self, version: &ReleaseVersion) -> String {
        format!("{}:{}", self.image, version)
    }

    fn login_url(&self) -> String {
        format!("http://localhost:{}/{}/check_mk/login.py", self.port, self.site)
    }

    fn schema_url(&self) -> String {
        format!(
            "http://localhost:{}/{}/check_mk/api/{}/openapi-swagger-ui.yaml",
            self.port, self.site, self.api_version
        )
    }

    /// Site password handed to the container, taken from the first credential
    fn site_password(&self) -> Option<&str> {
        self.credentials
            .first()
            .and_then(|creds| creds.split_once(':'))
            .map(|(_, password)| password)
    }

    async fn docker(&self, args: &[&str]) -> Result<Output> {
        debug!("{} {}", self.docker, args.join(" "));
        let output = Command::new(&self.docker)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        Ok(output)
    }

    /// Run a docker command that must succeed; returns trimmed stdout
    async fn docker_ok(&self, version: &ReleaseVersion, args: &[&str]) -> Result<String> {
        let output = self.docker(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BaselineError::fetch_failed(
                version,
                format!("docker {} failed: {}", args[0], stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn remove_container(&self, container: &str) {
        if let Err(e) = self.docker(&["rm", "-f", container]).await {
            warn!(container, "Couldn't remove container: {}", e);
        }
    }

    async fn remove_image(&self, image: &str) {
        if let Err(e) = self.docker(&["rmi", image]).await {
            warn!(image, "Couldn't remove image: {}", e);
        }
    }

    /// Last lines the container printed, stdout and stderr combined.
    /// `None` if docker could not be asked.
    async fn container_log_tail(&self, container: &str) -> Option<String> {
        match self.docker(&["logs", "--tail", LOG_TAIL_LINES, container]).await {
            Ok(output) if output.status.success() => {
                Some(combine_output(&output.stdout, &output.stderr))
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!(container, "docker logs failed: {}", stderr.trim());
                None
            }
            Err(e) => {
                debug!(container, "docker logs failed: {}", e);
                None
            }
        }
    }

    async fn log_startup_failure(&self, version: &ReleaseVersion, container: &str) {
        if let Some(tail) = self.container_log_tail(container).await {
            warn!(%version, container, "Container output before giving up:\n{}", tail);
        }
    }

    async fn start(&self, version: &ReleaseVersion, container: &str, image: &str) -> Result<()> {
        let site_env = format!("CMK_SITE_ID={}", self.site);
        let password_env = self.site_password().map(|p| format!("CMK_PASSWORD={p}"));
        let mut args = vec!["run", "-d", "--name", container, "-e", site_env.as_str()];
        if let Some(env) = password_env.as_deref() {
            args.extend(["-e", env]);
        }
        args.push(image);
        self.docker_ok(version, &args).await?;
        Ok(())
    }

    async fn wait_until_ready(&self, version: &ReleaseVersion, container: &str) -> Result<()> {
        let deadline = Instant::now() + self.startup_timeout;
        let login_url = self.login_url();

        loop {
            let running = self
                .docker_ok(version, &["inspect", "-f", "{{.State.Running}}", container])
                .await?;
            if running != "true" {
                self.log_startup_failure(version, container).await;
                return Err(BaselineError::fetch_failed(version, "container stopped during startup"));
            }

            let status = self
                .docker(&[
                    "exec", container, "curl", "-s", "-o", "/dev/null", "-w", "%{http_code}",
                    login_url.as_str(),
                ])
                .await?;
            let code = String::from_utf8_lossy(&status.stdout);
            if is_ready_status(code.trim()) {
                debug!(%version, "Site is up");
                return Ok(());
            }

            if Instant::now() + POLL_INTERVAL > deadline {
                self.log_startup_failure(version, container).await;
                return Err(BaselineError::fetch_failed(
                    version,
                    format!("site not ready after {}s", self.startup_timeout.as_secs()),
                ));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn download(&self, version: &ReleaseVersion, container: &str) -> Result<Vec<u8>> {
        let schema_url = self.schema_url();

        for creds in &self.credentials {
            let output = self
                .docker(&["exec", container, "curl", "-s", "-u", creds.as_str(), schema_url.as_str()])
                .await?;
            if output.status.success() && looks_like_schema(&output.stdout) {
                return Ok(output.stdout);
            }
            let user = creds.split_once(':').map(|(user, _)| user).unwrap_or(creds.as_str());
            debug!(%version, user, "No schema document with these credentials");
        }

        Err(BaselineError::fetch_failed(version, "no credentials returned a schema document"))
    }

    async fn run_and_download(
        &self,
        version: &ReleaseVersion,
        container: &str,
        image: &str,
    ) -> Result<Vec<u8>> {
        info!("  {}: pulling {}", version, image);
        self.docker_ok(version, &["pull", image]).await?;
        self.start(version, container, image).await?;
        self.wait_until_ready(version, container).await?;
        sleep(SETTLE_DELAY).await;
        self.download(version, container).await
    }
}

#[async_trait]
impl SnapshotFetcher for DockerSnapshotFetcher {
    async fn fetch(&self, version: &ReleaseVersion) -> Result<Vec<u8>> {
        let container = container_name(version);
        let image = self.image_ref(version);

        // Left over from an interrupted run
        self.remove_container(&container).await;

        let result = match timeout(
            self.fetch_timeout,
            self.run_and_download(version, &container, &image),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.log_startup_failure(version, &container).await;
                Err(BaselineError::FetchTimeout {
                    version: version.to_string(),
                    seconds: self.fetch_timeout.as_secs(),
                })
            }
        };

        self.remove_container(&container).await;
        self.remove_image(&image).await;
        result
    }
}

/// `spec-fetch-2-4-0p17`
pub fn container_name(version: &ReleaseVersion) -> String {
    format!("spec-fetch-{}", version.to_string().replace('.', "-"))
}

fn is_ready_status(code: &str) -> bool {
    matches!(code, "200" | "302")
}

/// `docker logs` replays the container's stderr on its own stderr
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    [stdout, stderr]
        .iter()
        .map(|stream| String::from_utf8_lossy(stream).trim_end().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A downloaded body is accepted only if it carries an API `info` block
pub fn looks_like_schema(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body);
    text.contains("info:") || text.contains("\"info\"")
}
