//! Problem contract.
//!
//! A problem type plugs into the battle loop by supplying a starting instance
//! size, a parser for raw container output and a verifier for solutions. The
//! loop is generic over [`Problem`] and never inspects which problem it runs.

mod biclique;

pub use biclique::{biclique, Biclique, BicliqueParser, BicliqueVerifier, Bipartition, Graph};

use std::fmt;
use std::num::NonZeroU64;

use crate::error::{FormatError, VerificationFailure};

/// Which program produced a piece of raw output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Output of the generator.
    Instance,
    /// Output of the solver.
    Solution,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance => f.write_str("instance"),
            Self::Solution => f.write_str("solution"),
        }
    }
}

/// Structured value produced by [`Problem::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<I, S> {
    Instance(I),
    Solution(S),
}

/// Decodes raw generator and solver output.
///
/// Implementations are pure: a failure returns a [`FormatError`] and never a
/// partially built value.
pub trait Parser: Send + Sync {
    /// Decoded generator output.
    type Instance;
    /// Decoded solver output.
    type Solution;

    fn parse_instance(&self, raw: &[u8]) -> Result<Self::Instance, FormatError>;

    fn parse_solution(&self, raw: &[u8]) -> Result<Self::Solution, FormatError>;

    /// Canonical encoding of an instance, as handed to the solver.
    fn encode_instance(&self, instance: &Self::Instance) -> Vec<u8>;

    fn encode_solution(&self, solution: &Self::Solution) -> Vec<u8>;
}

/// Checks a solution against the instance it claims to solve.
///
/// Must be deterministic so the caller can re-run it for auditing without
/// re-invoking any container.
pub trait Verifier: Send + Sync {
    type Instance;
    type Solution;

    fn verify(
        &self,
        instance: &Self::Instance,
        solution: &Self::Solution,
        instance_size: NonZeroU64,
    ) -> Result<(), VerificationFailure>;
}

/// A problem type: starting size plus its owned parsing and verification
/// strategies. Built once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct Problem<P, V> {
    name: &'static str,
    starting_size: NonZeroU64,
    parser: P,
    verifier: V,
}

impl<P, V> Problem<P, V>
where
    P: Parser,
    V: Verifier<Instance = P::Instance, Solution = P::Solution>,
{
    pub const fn new(name: &'static str, starting_size: NonZeroU64, parser: P, verifier: V) -> Self {
        Self {
            name,
            starting_size,
            parser,
            verifier,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Smallest instance size a generator may be asked for.
    pub const fn starting_size(&self) -> NonZeroU64 {
        self.starting_size
    }

    pub const fn parser(&self) -> &P {
        &self.parser
    }

    pub const fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Raise a requested size to the starting size if it is smaller.
    pub fn clamp_size(&self, requested: u64) -> NonZeroU64 {
        NonZeroU64::new(requested)
            .map_or(self.starting_size, |size| size.max(self.starting_size))
    }

    /// Decode raw output produced in the given role.
    pub fn parse(
        &self,
        raw: &[u8],
        role: Role,
    ) -> Result<Parsed<P::Instance, P::Solution>, FormatError> {
        match role {
            Role::Instance => self.parser.parse_instance(raw).map(Parsed::Instance),
            Role::Solution => self.parser.parse_solution(raw).map(Parsed::Solution),
        }
    }

    pub fn verify(
        &self,
        instance: &P::Instance,
        solution: &P::Solution,
        instance_size: NonZeroU64,
    ) -> Result<(), VerificationFailure> {
        self.verifier.verify(instance, solution, instance_size)
    }
}
