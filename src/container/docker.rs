//! Docker CLI runner.
//!
//! Executes a program image with `docker run --rm -i`, piping input to stdin
//! and collecting stdout and stderr.

use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{ContainerRunner, RunOutput};
use crate::guard::ContainerRegistry;

/// Runner that starts containers through a Docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct DockerRunner {
    binary: String,
    memory_mb: Option<u64>,
    registry: Arc<ContainerRegistry>,
}

/// Registration that is released when dropped unless retained.
struct Registration<'a> {
    registry: &'a ContainerRegistry,
    image: &'a str,
    armed: bool,
}

impl<'a> Registration<'a> {
    /// `None` if the registry is closed because an interrupt is being handled.
    fn new(registry: &'a ContainerRegistry, image: &'a str) -> Option<Self> {
        registry.register(image).then(|| Self {
            registry,
            image,
            armed: true,
        })
    }

    /// Keep the image registered; its container may still be running.
    fn retain(mut self) {
        self.armed = false;
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.release(self.image);
        }
    }
}

/// Feed `input` to `stdin` while draining `stdout` and `stderr`.
///
/// All three run concurrently so a program that writes before reading cannot
/// deadlock on a full pipe. A program that exits or closes stdin before taking
/// all input is not an error.
async fn exchange<W, R, E>(
    mut stdin: W,
    mut stdout: R,
    mut stderr: E,
    input: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let write = async move {
        let result = match stdin.write_all(input).await {
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        };
        drop(stdin); // EOF
        result
    };

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let (w, r1, r2) = tokio::join!(
        write,
        stdout.read_to_end(&mut stdout_buf),
        stderr.read_to_end(&mut stderr_buf),
    );
    w.context("Failed to write input to stdin")?;
    r1.context("Failed to read stdout")?;
    r2.context("Failed to read stderr")?;
    Ok((stdout_buf, stderr_buf))
}

impl DockerRunner {
    /// Create a runner using `binary` on PATH, recording spawns in `registry`.
    pub fn new(binary: impl Into<String>, registry: Arc<ContainerRegistry>) -> Self {
        Self {
            binary: binary.into(),
            memory_mb: None,
            registry,
        }
    }

    /// Limit each container's memory.
    #[must_use]
    pub const fn with_memory_limit(mut self, memory_mb: Option<u64>) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    /// Arguments passed to the runtime binary for `image`.
    pub fn run_args(&self, image: &str) -> Vec<String> {
        let mut args: Vec<String> = ["run", "--rm", "-i", "--network", "none"]
            .into_iter()
            .map(String::from)
            .collect();
        if let Some(mb) = self.memory_mb {
            args.push("--memory".into());
            args.push(format!("{mb}m"));
        }
        args.push(image.to_string());
        args
    }
}

#[async_trait]
impl ContainerRunner for DockerRunner {
    #[instrument(skip(self, input), fields(runtime = %self.binary))]
    async fn run(&self, image: &str, input: &[u8], timeout: Duration) -> Result<RunOutput> {
        debug!(input_len = input.len(), "Starting container");

        let mut cmd = Command::new(&self.binary);
        cmd.args(self.run_args(image))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Registered before spawn so an interrupt can never miss this container
        let Some(registration) = Registration::new(&self.registry, image) else {
            anyhow::bail!("Refusing to start {image}: interrupt in progress");
        };

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {} for image {image}", self.binary))?;

        let session = async {
            let stdin = child.stdin.take().context("Failed to open stdin")?;
            let stdout = child.stdout.take().context("Failed to open stdout")?;
            let stderr = child.stderr.take().context("Failed to open stderr")?;
            let (stdout, stderr) = exchange(stdin, stdout, stderr, input).await?;
            let status = child.wait().await.context("Failed to wait for container")?;
            Ok::<_, anyhow::Error>((status, stdout, stderr))
        };
        let result = tokio::time::timeout(timeout, session)
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("Container {image} timed out after {timeout:?}")));

        let (status, stdout, stderr_buf) = match result {
            Ok(finished) => finished,
            Err(e) => {
                let _ = child.kill().await;
                // Killing the CLI client does not stop the container itself
                registration.retain();
                warn!(image = %image, error = %e, "Container run failed, left registered for cleanup");
                return Err(e);
            }
        };
        drop(registration);

        let output = RunOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
        };

        debug!(exit_code = output.exit_code, stdout_len = output.stdout.len(), "Container finished");

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::TrackingMode;

    fn registry() -> Arc<ContainerRegistry> {
        Arc::new(ContainerRegistry::new(TrackingMode::AllLive))
    }

    #[test]
    fn run_args_place_image_last() {
        let runner = DockerRunner::new("docker", registry()).with_memory_limit(Some(256));
        assert_eq!(
            runner.run_args("solver:latest"),
            vec![
                "run",
                "--rm",
                "-i",
                "--network",
                "none",
                "--memory",
                "256m",
                "solver:latest"
            ]
        );
    }

    #[tokio::test]
    async fn spawn_failure_releases_registration() {
        let registry = registry();
        let runner = DockerRunner::new("/nonexistent/docker", Arc::clone(&registry));

        let result = runner.run("gen", b"5\n", Duration::from_secs(1)).await;

        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn finished_container_is_released() {
        // `echo` stands in for the runtime and prints its arguments
        let registry = registry();
        let runner = DockerRunner::new("echo", Arc::clone(&registry));

        let output = runner.run("gen", b"", Duration::from_secs(5)).await.unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, b"run --rm -i --network none gen\n");
        assert!(registry.is_empty());
    }

    /// Executable shell script standing in for the runtime binary.
    #[cfg(unix)]
    fn runtime_script(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.path().join("runtime");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_container_stays_registered() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let runner = DockerRunner::new(runtime_script(&dir, "exec sleep 10"), Arc::clone(&registry));

        let result = runner.run("solver", b"", Duration::from_millis(200)).await;

        assert!(result.is_err());
        assert_eq!(registry.images(), vec!["solver"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn large_input_to_non_reading_container_times_out() {
        // Input far beyond the pipe buffer, never read by the program
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let runner = DockerRunner::new(runtime_script(&dir, "exec sleep 3"), Arc::clone(&registry));
        let input = vec![b'x'; 1 << 20];

        let started = std::time::Instant::now();
        let result = runner.run("solver", &input, Duration::from_millis(200)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
        assert_eq!(registry.images(), vec!["solver"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn program_ignoring_stdin_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let runner = DockerRunner::new(runtime_script(&dir, "echo ok"), Arc::clone(&registry));
        let input = vec![b'x'; 1 << 20];

        let output = runner.run("gen", &input, Duration::from_secs(5)).await.unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, b"ok\n");
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn closed_registry_refuses_to_start_container() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("started");
        let registry = registry();
        let runner = DockerRunner::new(
            runtime_script(&dir, &format!("touch '{}'", marker.display())),
            Arc::clone(&registry),
        );
        let _ = registry.close();

        let err = runner.run("solver", b"", Duration::from_secs(5)).await.unwrap_err();

        assert!(err.to_string().contains("interrupt in progress"));
        assert!(!marker.exists());
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn latest_mode_keeps_finished_image_for_the_sweep() {
        let registry = Arc::new(ContainerRegistry::new(TrackingMode::Latest));
        let runner = DockerRunner::new("echo", Arc::clone(&registry));

        runner.run("gen", b"", Duration::from_secs(5)).await.unwrap();

        assert_eq!(registry.images(), vec!["gen"]);
    }

    #[tokio::test]
    async fn exchange_collects_both_streams() {
        let stdin = tokio_test::io::Builder::new().write(b"5\n").build();
        let stdout = tokio_test::io::Builder::new().read(b"n 1\n").build();
        let stderr = tokio_test::io::Builder::new().read(b"warning\n").build();

        let (out, err) = exchange(stdin, stdout, stderr, b"5\n").await.unwrap();

        assert_eq!(out, b"n 1\n");
        assert_eq!(err, b"warning\n");
    }

    #[tokio::test]
    async fn exchange_tolerates_closed_stdin() {
        let stdin = tokio_test::io::Builder::new()
            .write_error(std::io::Error::from(ErrorKind::BrokenPipe))
            .build();
        let stdout = tokio_test::io::Builder::new().read(b"done\n").build();
        let stderr = tokio_test::io::Builder::new().build();

        let (out, err) = exchange(stdin, stdout, stderr, b"5\n").await.unwrap();

        assert_eq!(out, b"done\n");
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn exchange_reports_other_write_errors() {
        let stdin = tokio_test::io::Builder::new()
            .write_error(std::io::Error::from(ErrorKind::PermissionDenied))
            .build();
        let stdout = tokio_test::io::Builder::new().build();
        let stderr = tokio_test::io::Builder::new().build();

        let err = exchange(stdin, stdout, stderr, b"5\n").await.unwrap_err();

        assert!(err.to_string().contains("Failed to write input to stdin"));
    }

    #[tokio::test]
    async fn run_with_real_runtime() {
        // Requires a container runtime, skip in CI
        if std::env::var("ALGOBATTLE_DOCKER_TEST").is_err() {
            return;
        }

        let registry = registry();
        let runner = DockerRunner::new("docker", Arc::clone(&registry));
        let output = runner
            .run("alpine:3", b"", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(registry.is_empty());
    }
}
