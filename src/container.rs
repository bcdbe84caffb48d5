//! Container runner used by the battle loop.
//!
//! Runners start one program container, feed it input on stdin and capture
//! its output. They are the only writers of the
//! [`ContainerRegistry`](crate::guard::ContainerRegistry).

mod docker;

pub use docker::DockerRunner;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Result of running a program container to completion.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Exit code of the container (0 = success).
    pub exit_code: i32,
    /// Raw stdout, handed to the problem parser.
    pub stdout: Vec<u8>,
    /// Captured stderr, for diagnostics only.
    pub stderr: String,
}

/// Trait for container runners.
#[async_trait]
pub trait ContainerRunner: Send + Sync {
    /// Run `image` with `input` on stdin, giving up after `timeout`.
    ///
    /// Implementations must register the image with the interrupt guard's
    /// registry before the container is started.
    async fn run(&self, image: &str, input: &[u8], timeout: Duration) -> Result<RunOutput>;
}
