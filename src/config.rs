//! Runtime configuration.
//!
//! Read as JSON from the `ALGOBATTLE_CONFIG` environment variable. Every key
//! is optional; an unset variable yields the defaults.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::guard::TrackingMode;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Container runtime settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Which spawned containers the interrupt guard tracks.
    #[serde(default)]
    pub tracking: TrackingMode,

    /// Per-program time limits.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Container runtime settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Docker-compatible CLI on PATH.
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Time limit for each command of the interrupt kill sweep.
    #[serde(default = "default_kill_timeout")]
    pub kill_timeout_seconds: u64,

    /// Memory limit per program container.
    #[serde(default)]
    pub memory_mb: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            kill_timeout_seconds: default_kill_timeout(),
            memory_mb: None,
        }
    }
}

/// Time limits for generator and solver containers.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_program_timeout")]
    pub generator_seconds: u64,

    #[serde(default = "default_program_timeout")]
    pub solver_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generator_seconds: default_program_timeout(),
            solver_seconds: default_program_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub const fn generator(&self) -> Duration {
        Duration::from_secs(self.generator_seconds)
    }

    pub const fn solver(&self) -> Duration {
        Duration::from_secs(self.solver_seconds)
    }
}

fn default_binary() -> String {
    "docker".into()
}

const fn default_kill_timeout() -> u64 {
    10
}

const fn default_program_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from `ALGOBATTLE_CONFIG`, or defaults if unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var("ALGOBATTLE_CONFIG") {
            Ok(json) => {
                serde_json::from_str(&json).context("Failed to parse ALGOBATTLE_CONFIG")
            }
            Err(_) => Ok(Self::default()),
        }
    }

    /// Container runtime binary.
    ///
    /// Priority: `ALGOBATTLE_RUNTIME` env var > config > `docker`.
    pub fn runtime_binary(&self) -> String {
        std::env::var("ALGOBATTLE_RUNTIME").unwrap_or_else(|_| self.runtime.binary.clone())
    }

    pub const fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime.kill_timeout_seconds)
    }

    /// Create a config from a JSON string (for testing).
    #[cfg(test)]
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        Ok(config)
    }
}
