//! Container kill sweep.
//!
//! Equivalent to `docker ps -a -q --filter ancestor=<image> | xargs -r docker kill`,
//! run as two structured invocations so the image name is never seen by a shell.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Kills every container started from a given image.
#[async_trait]
pub trait ContainerKiller: Send + Sync {
    /// Kill all containers, running or stopped, whose ancestor is `image`.
    ///
    /// Returns how many container ids the kill command was issued for.
    async fn kill_by_ancestor(&self, image: &str) -> Result<usize>;
}

/// Killer that shells out to a Docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct DockerKiller {
    binary: String,
    timeout: Duration,
}

impl Default for DockerKiller {
    fn default() -> Self {
        Self::new("docker", Duration::from_secs(10))
    }
}

impl DockerKiller {
    /// Create a killer using `binary` (e.g. `docker`, `podman`) on PATH.
    ///
    /// `timeout` bounds each of the two CLI invocations.
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Arguments listing every container descended from `image`.
    pub fn list_args(image: &str) -> Vec<String> {
        vec![
            "ps".into(),
            "-a".into(),
            "-q".into(),
            "--filter".into(),
            format!("ancestor={image}"),
        ]
    }

    /// Arguments killing the given container ids.
    pub fn kill_args(ids: &[String]) -> Vec<String> {
        std::iter::once("kill".to_string())
            .chain(ids.iter().cloned())
            .collect()
    }

    async fn list(&self, image: &str) -> Result<Vec<String>> {
        let output = Command::new(&self.binary)
            .args(Self::list_args(image))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .with_context(|| format!("'{} ps' timed out after {:?}", self.binary, self.timeout))?
            .with_context(|| format!("Failed to run '{} ps'", self.binary))?;

        anyhow::ensure!(
            output.status.success(),
            "'{} ps' exited with {}",
            self.binary,
            output.status
        );

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect())
    }
}

#[async_trait]
impl ContainerKiller for DockerKiller {
    #[instrument(skip(self), fields(runtime = %self.binary))]
    async fn kill_by_ancestor(&self, image: &str) -> Result<usize> {
        let ids = self.list(image).await?;
        if ids.is_empty() {
            debug!("No containers to kill");
            return Ok(0);
        }

        let status = Command::new(&self.binary)
            .args(Self::kill_args(&ids))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        let status = tokio::time::timeout(self.timeout, status)
            .await
            .with_context(|| format!("'{} kill' timed out after {:?}", self.binary, self.timeout))?
            .with_context(|| format!("Failed to run '{} kill'", self.binary))?;

        anyhow::ensure!(
            status.success(),
            "'{} kill' exited with {status}",
            self.binary
        );

        debug!(count = ids.len(), "Killed containers");
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_args_keep_image_as_single_argument() {
        let args = DockerKiller::list_args("evil; rm -rf /");
        assert_eq!(
            args,
            vec!["ps", "-a", "-q", "--filter", "ancestor=evil; rm -rf /"]
        );
    }

    #[test]
    fn kill_args_append_ids() {
        let ids = vec!["abc".to_string(), "def".to_string()];
        assert_eq!(DockerKiller::kill_args(&ids), vec!["kill", "abc", "def"]);
    }

    #[tokio::test]
    async fn missing_runtime_is_an_error() {
        let killer = DockerKiller::new("/nonexistent/container-runtime", Duration::from_secs(1));
        assert!(killer.kill_by_ancestor("image").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_listing_skips_kill() {
        // `true` accepts any arguments and prints nothing
        let killer = DockerKiller::new("true", Duration::from_secs(5));
        assert_eq!(killer.kill_by_ancestor("image").await.unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_listing_is_an_error() {
        let killer = DockerKiller::new("false", Duration::from_secs(5));
        assert!(killer.kill_by_ancestor("image").await.is_err());
    }

    #[tokio::test]
    async fn kill_with_real_runtime() {
        // Requires a container runtime, skip in CI
        if std::env::var("ALGOBATTLE_DOCKER_TEST").is_err() {
            return;
        }

        let killer = DockerKiller::default();
        let killed = killer
            .kill_by_ancestor("algobattle-core-test-image-that-does-not-exist")
            .await
            .unwrap();
        assert_eq!(killed, 0);
    }
}
