//! algobattle-core
//!
//! Runs or checks a single battle round. Configuration is read from the
//! `ALGOBATTLE_CONFIG` env var.

use std::num::NonZeroU64;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use algobattle_core::config::Config;
use algobattle_core::container::DockerRunner;
use algobattle_core::guard::{self, ContainerRegistry, DockerKiller, InterruptGuard, SystemTerminator};
use algobattle_core::problem::{biclique, Biclique};
use algobattle_core::round::{self, RoundPlan, Verdict};

#[derive(Parser, Debug)]
#[command(name = "algobattle-core")]
#[command(about = "Run and verify algorithmic battle rounds in containers")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify a solution file against an instance file
    Verify {
        /// Problem type
        #[arg(long, default_value = "biclique")]
        problem: String,

        /// Instance size the instance was generated for
        #[arg(long)]
        size: Option<u64>,

        instance: PathBuf,
        solution: PathBuf,
    },
    /// Run one generator/solver round in containers
    Round {
        /// Problem type
        #[arg(long, default_value = "biclique")]
        problem: String,

        /// Requested instance size (raised to the problem's starting size)
        #[arg(long)]
        size: Option<u64>,

        /// Generator image
        generator: String,

        /// Solver image
        solver: String,
    },
}

fn problem_by_name(name: &str) -> Result<Biclique> {
    match name {
        "biclique" => Ok(biclique()),
        other => anyhow::bail!("Unknown problem: '{other}'. Available: [\"biclique\"]"),
    }
}

fn report(verdict: &Verdict) -> ExitCode {
    println!("{verdict}");
    if verdict.is_solved() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Logs go to stderr so stdout only carries the verdict
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    match args.command {
        Command::Verify {
            problem,
            size,
            instance,
            solution,
        } => {
            let problem = problem_by_name(&problem)?;
            let instance_raw = std::fs::read(&instance)
                .with_context(|| format!("Failed to read {}", instance.display()))?;
            let solution_raw = std::fs::read(&solution)
                .with_context(|| format!("Failed to read {}", solution.display()))?;
            let size = size
                .and_then(NonZeroU64::new)
                .unwrap_or_else(|| problem.starting_size());

            Ok(report(&round::verify_raw(&problem, &instance_raw, &solution_raw, size)))
        }
        Command::Round {
            problem,
            size,
            generator,
            solver,
        } => {
            let problem = problem_by_name(&problem)?;
            let binary = config.runtime_binary();

            // Guard goes in before the first container is spawned
            let registry = Arc::new(ContainerRegistry::new(config.tracking));
            let interrupt_guard = Arc::new(InterruptGuard::new(
                Arc::clone(&registry),
                DockerKiller::new(binary.clone(), config.kill_timeout()),
                SystemTerminator,
            ));
            let _handle = guard::install(interrupt_guard)?;

            info!(runtime = %binary, tracking = ?config.tracking, "Interrupt guard installed");

            let runner = DockerRunner::new(binary, registry)
                .with_memory_limit(config.runtime.memory_mb);
            let plan = RoundPlan {
                generator: &generator,
                solver: &solver,
                requested_size: size.unwrap_or(0),
                generator_timeout: config.timeouts.generator(),
                solver_timeout: config.timeouts.solver(),
            };

            let outcome = round::run_round(&problem, &runner, &plan).await?;
            info!(size = outcome.size.get(), "Round complete");
            Ok(report(&outcome.verdict))
        }
    }
}
