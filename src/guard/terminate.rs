//! Process-group termination.

use anyhow::Result;
use tracing::debug;

/// Ends the supervising process once cleanup is done.
pub trait ProcessTerminator: Send + Sync {
    /// Send a termination request to every process in our process group.
    fn terminate_group(&self) -> Result<()>;

    /// Exit the current process with `code`.
    fn exit(&self, code: i32);
}

/// Terminator acting on the real process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTerminator;

impl ProcessTerminator for SystemTerminator {
    #[cfg(unix)]
    fn terminate_group(&self) -> Result<()> {
        use anyhow::Context;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::getpgrp;
        use tokio::signal::unix::{signal, SignalKind};

        // Tokio never restores the default disposition once a listener has
        // been registered, so SIGTERM below cannot kill us before exit(0).
        drop(signal(SignalKind::terminate()).context("Failed to shield from SIGTERM")?);

        let group = getpgrp();
        debug!(pgid = %group, "Sending SIGTERM to process group");
        killpg(group, Signal::SIGTERM)
            .with_context(|| format!("Failed to signal process group {group}"))?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate_group(&self) -> Result<()> {
        debug!("Process groups are not supported on this platform");
        Ok(())
    }

    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}
