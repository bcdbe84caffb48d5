//! Single generator/solver round.
//!
//! Runs one generator and one solver container against a problem and reports
//! a [`Verdict`]. Deciding how many rounds to run and what a verdict is worth
//! is left to the caller.

use std::fmt;
use std::num::NonZeroU64;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::container::ContainerRunner;
use crate::error::{FormatError, VerificationFailure};
use crate::problem::{Parser, Problem, Verifier};

/// Outcome of checking one solver answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The solution was accepted.
    Solved,
    /// Generator output could not be parsed.
    InvalidInstance(FormatError),
    /// Solver output could not be parsed.
    InvalidSolution(FormatError),
    /// Solver output parsed but failed verification.
    Rejected(VerificationFailure),
}

impl Verdict {
    pub const fn is_solved(&self) -> bool {
        matches!(self, Self::Solved)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solved => f.write_str("solved"),
            Self::InvalidInstance(e) => write!(f, "invalid instance: {e}"),
            Self::InvalidSolution(e) => write!(f, "invalid solution: {e}"),
            Self::Rejected(e) => write!(f, "rejected: {e}"),
        }
    }
}

/// Images and limits for one round.
#[derive(Debug, Clone)]
pub struct RoundPlan<'a> {
    pub generator: &'a str,
    pub solver: &'a str,
    /// Raised to the problem's starting size if smaller.
    pub requested_size: u64,
    pub generator_timeout: Duration,
    pub solver_timeout: Duration,
}

/// Result of [`run_round`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Instance size actually requested from the generator.
    pub size: NonZeroU64,
    pub verdict: Verdict,
}

/// Parse raw generator and solver output and verify the solution.
pub fn verify_raw<P, V>(
    problem: &Problem<P, V>,
    instance_raw: &[u8],
    solution_raw: &[u8],
    instance_size: NonZeroU64,
) -> Verdict
where
    P: Parser,
    V: Verifier<Instance = P::Instance, Solution = P::Solution>,
{
    let instance = match problem.parser().parse_instance(instance_raw) {
        Ok(instance) => instance,
        Err(e) => return Verdict::InvalidInstance(e),
    };
    let solution = match problem.parser().parse_solution(solution_raw) {
        Ok(solution) => solution,
        Err(e) => return Verdict::InvalidSolution(e),
    };

    match problem.verify(&instance, &solution, instance_size) {
        Ok(()) => Verdict::Solved,
        Err(e) => Verdict::Rejected(e),
    }
}

/// Run the generator, then the solver on its instance, and verify the result.
///
/// Container failures (spawn errors, timeouts) are returned as errors; bad
/// program output becomes a [`Verdict`].
pub async fn run_round<P, V, R>(
    problem: &Problem<P, V>,
    runner: &R,
    plan: &RoundPlan<'_>,
) -> Result<RoundOutcome>
where
    P: Parser,
    V: Verifier<Instance = P::Instance, Solution = P::Solution>,
    R: ContainerRunner + ?Sized,
{
    let size = problem.clamp_size(plan.requested_size);
    info!(problem = problem.name(), size = size.get(), "Starting round");

    let generated = runner
        .run(plan.generator, format!("{size}\n").as_bytes(), plan.generator_timeout)
        .await
        .with_context(|| format!("Generator {} failed to run", plan.generator))?;
    if generated.exit_code != 0 {
        warn!(exit_code = generated.exit_code, stderr = %generated.stderr, "Generator exited with error");
    }

    let instance = match problem.parser().parse_instance(&generated.stdout) {
        Ok(instance) => instance,
        Err(e) => {
            return Ok(RoundOutcome {
                size,
                verdict: Verdict::InvalidInstance(e),
            })
        }
    };

    let input = problem.parser().encode_instance(&instance);
    let solved = runner
        .run(plan.solver, &input, plan.solver_timeout)
        .await
        .with_context(|| format!("Solver {} failed to run", plan.solver))?;
    if solved.exit_code != 0 {
        warn!(exit_code = solved.exit_code, stderr = %solved.stderr, "Solver exited with error");
    }

    let verdict = match problem.parser().parse_solution(&solved.stdout) {
        Ok(solution) => match problem.verify(&instance, &solution, size) {
            Ok(()) => Verdict::Solved,
            Err(e) => Verdict::Rejected(e),
        },
        Err(e) => Verdict::InvalidSolution(e),
    };

    info!(verdict = %verdict, "Round finished");
    Ok(RoundOutcome { size, verdict })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::container::RunOutput;
    use crate::problem::biclique;

    /// Runner returning canned stdout per image and recording inputs.
    #[derive(Default)]
    struct ScriptedRunner {
        outputs: HashMap<&'static str, &'static str>,
        inputs: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl ScriptedRunner {
        fn new(outputs: &[(&'static str, &'static str)]) -> Self {
            Self {
                outputs: outputs.iter().copied().collect(),
                inputs: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl ContainerRunner for ScriptedRunner {
        async fn run(&self, image: &str, input: &[u8], _timeout: Duration) -> Result<RunOutput> {
            self.inputs
                .lock()
                .unwrap()
                .push((image.to_string(), input.to_vec()));
            let stdout = self
                .outputs
                .get(image)
                .ok_or_else(|| anyhow::anyhow!("no such image: {image}"))?;
            Ok(RunOutput {
                exit_code: 0,
                stdout: stdout.as_bytes().to_vec(),
                stderr: String::new(),
            })
        }
    }

    fn plan(requested_size: u64) -> RoundPlan<'static> {
        RoundPlan {
            generator: "gen",
            solver: "sol",
            requested_size,
            generator_timeout: Duration::from_secs(1),
            solver_timeout: Duration::from_secs(1),
        }
    }

    const INSTANCE: &str = "n 4\ne 1 0\ne 0 3\ne 2 1\ne 2 3\n";

    #[tokio::test]
    async fn solved_round() {
        let runner = ScriptedRunner::new(&[
            ("gen", INSTANCE),
            ("sol", "s set1 0\ns set1 2\ns set2 1\ns set2 3\n"),
        ]);

        let outcome = run_round(&biclique(), &runner, &plan(8)).await.unwrap();

        assert_eq!(outcome.size.get(), 8);
        assert_eq!(outcome.verdict, Verdict::Solved);

        let inputs = runner.inputs.lock().unwrap();
        assert_eq!(inputs[0], ("gen".to_string(), b"8\n".to_vec()));
        // Solver receives the canonical encoding
        assert_eq!(
            inputs[1],
            ("sol".to_string(), b"n 4\ne 0 1\ne 0 3\ne 1 2\ne 2 3\n".to_vec())
        );
    }

    #[tokio::test]
    async fn requested_size_is_raised_to_starting_size() {
        let runner = ScriptedRunner::new(&[("gen", INSTANCE), ("sol", "s set1 0\ns set2 1\n")]);

        let outcome = run_round(&biclique(), &runner, &plan(2)).await.unwrap();

        assert_eq!(outcome.size.get(), 5);
        assert_eq!(runner.inputs.lock().unwrap()[0].1, b"5\n");
    }

    #[tokio::test]
    async fn bad_generator_output_skips_solver() {
        let runner = ScriptedRunner::new(&[("gen", "garbage\n"), ("sol", "")]);

        let outcome = run_round(&biclique(), &runner, &plan(5)).await.unwrap();

        assert!(matches!(outcome.verdict, Verdict::InvalidInstance(_)));
        assert_eq!(runner.inputs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bad_solver_output_and_wrong_answer() {
        let runner = ScriptedRunner::new(&[("gen", INSTANCE), ("sol", "s set1 0\ns set2 0\n")]);
        let outcome = run_round(&biclique(), &runner, &plan(5)).await.unwrap();
        assert!(matches!(outcome.verdict, Verdict::InvalidSolution(_)));

        let runner = ScriptedRunner::new(&[("gen", INSTANCE), ("sol", "s set1 0\ns set2 2\n")]);
        let outcome = run_round(&biclique(), &runner, &plan(5)).await.unwrap();
        assert!(matches!(outcome.verdict, Verdict::Rejected(_)));
        assert!(!outcome.verdict.is_solved());
    }

    #[tokio::test]
    async fn runner_failure_is_an_error() {
        let runner = ScriptedRunner::new(&[("gen", INSTANCE)]);
        let err = run_round(&biclique(), &runner, &plan(5)).await.unwrap_err();
        assert!(err.to_string().contains("Solver sol failed to run"));
    }

    #[test]
    fn verify_raw_classifies_failures() {
        let problem = biclique();
        let size = NonZeroU64::new(5).unwrap();

        assert_eq!(
            verify_raw(&problem, INSTANCE.as_bytes(), b"s set1 0\ns set2 1\n", size),
            Verdict::Solved
        );
        assert!(matches!(
            verify_raw(&problem, b"n 2\ne 0 5\n", b"s set1 0\ns set2 1\n", size),
            Verdict::InvalidInstance(FormatError::OutOfRange { .. })
        ));
        assert!(matches!(
            verify_raw(&problem, INSTANCE.as_bytes(), b"", size),
            Verdict::InvalidSolution(FormatError::Empty)
        ));
        assert_eq!(
            verify_raw(&problem, INSTANCE.as_bytes(), b"s set1 0\ns set2 2\n", size).to_string(),
            "rejected: solution rejected: edge 0 - 2 is missing"
        );
    }

    #[test]
    fn verify_raw_is_repeatable() {
        let problem = biclique();
        let size = NonZeroU64::new(5).unwrap();
        let solution = b"s set1 1\ns set2 0\ns set2 2\n";
        let first = verify_raw(&problem, INSTANCE.as_bytes(), solution, size);
        let second = verify_raw(&problem, INSTANCE.as_bytes(), solution, size);
        assert_eq!(first, second);
        assert_eq!(first, Verdict::Solved);
    }
}
