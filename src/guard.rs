//! Interrupt guard.
//!
//! Guarantees that no container started by this process outlives it when the
//! operator interrupts a run. A supervising task waits for the interrupt
//! (Ctrl-C, or an explicit cancellation), then sweeps the registry, kills the
//! whole process group and exits with status 0.

mod registry;
mod sweep;
mod terminate;

pub use registry::{ContainerRegistry, TrackingMode};
pub use sweep::{ContainerKiller, DockerKiller};
pub use terminate::{ProcessTerminator, SystemTerminator};

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::GuardError;

/// Set once the Ctrl-C watcher has been installed for this process.
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Lifecycle of the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// No interrupt received yet.
    Idle,
    /// Interrupt received, cleanup in progress.
    Interrupted,
    /// Cleanup finished and process exit requested.
    Terminated,
}

impl GuardState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Interrupted,
            _ => Self::Terminated,
        }
    }
}

/// What the sweep did. Failures are counted, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Images a kill was attempted for, in registration order.
    pub images: Vec<String>,
    /// Containers the kill command was issued for.
    pub killed: usize,
    /// Images whose kill attempt failed.
    pub failures: usize,
}

/// Kills spawned containers and the process group on interrupt.
pub struct InterruptGuard {
    registry: Arc<ContainerRegistry>,
    killer: Box<dyn ContainerKiller>,
    terminator: Box<dyn ProcessTerminator>,
    state: AtomicU8,
}

impl std::fmt::Debug for InterruptGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptGuard")
            .field("registry", &self.registry)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl InterruptGuard {
    pub fn new(
        registry: Arc<ContainerRegistry>,
        killer: impl ContainerKiller + 'static,
        terminator: impl ProcessTerminator + 'static,
    ) -> Self {
        Self {
            registry,
            killer: Box::new(killer),
            terminator: Box::new(terminator),
            state: AtomicU8::new(GuardState::Idle as u8),
        }
    }

    pub const fn registry(&self) -> &Arc<ContainerRegistry> {
        &self.registry
    }

    pub fn state(&self) -> GuardState {
        GuardState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Kill the containers of every tracked image.
    ///
    /// Closes the registry first: a runner registering while the kills are in
    /// flight is refused and never starts its container.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport {
            images: self.registry.close(),
            ..SweepReport::default()
        };

        for image in &report.images {
            match self.killer.kill_by_ancestor(image).await {
                Ok(count) => report.killed += count,
                Err(e) => {
                    debug!(image = %image, error = %e, "Ignoring container cleanup failure");
                    report.failures += 1;
                }
            }
        }
        report
    }

    /// Handler body run when the interrupt arrives.
    ///
    /// Only the first call does anything; later calls return an empty report.
    pub async fn handle_interrupt(&self) -> SweepReport {
        if self
            .state
            .compare_exchange(
                GuardState::Idle as u8,
                GuardState::Interrupted as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!("Interrupt already being handled");
            return SweepReport::default();
        }

        let report = self.sweep().await;

        info!(
            images = ?report.images,
            killed = report.killed,
            "Received SIGINT, terminating execution."
        );

        if let Err(e) = self.terminator.terminate_group() {
            debug!(error = %e, "Ignoring process group termination failure");
        }

        self.state
            .store(GuardState::Terminated as u8, Ordering::Release);
        self.terminator.exit(0);
        report
    }

    /// Run the guard until `interrupt` completes or the returned handle is
    /// triggered, then execute [`Self::handle_interrupt`].
    pub fn supervise<F>(self: Arc<Self>, interrupt: F) -> InterruptHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                () = interrupt => {}
                () = cancelled.cancelled() => {}
            }
            self.handle_interrupt().await
        });

        InterruptHandle { token, task }
    }
}

/// Install the Ctrl-C watcher for `guard`.
///
/// Must be called once, at startup, before any container is spawned. Must be
/// called from within a Tokio runtime.
pub fn install(guard: Arc<InterruptGuard>) -> Result<InterruptHandle, GuardError> {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return Err(GuardError::AlreadyInstalled);
    }

    debug!("Installing interrupt guard");
    Ok(guard.supervise(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT, guard disarmed");
            std::future::pending::<()>().await;
        }
    }))
}

/// Handle to the supervising task.
#[derive(Debug)]
pub struct InterruptHandle {
    token: CancellationToken,
    task: JoinHandle<SweepReport>,
}

impl InterruptHandle {
    /// Deliver an interrupt without an OS signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Token that triggers the guard when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the handler to finish and return its sweep report.
    pub async fn join(self) -> anyhow::Result<SweepReport> {
        Ok(self.task.await?)
    }
}
