//! Typed failures surfaced to the battle loop.
//!
//! Parsing and verification failures are recoverable and local: the caller
//! decides what they mean for scoring. Interrupt-path failures never appear
//! here because the guard logs and drops them.

use thiserror::Error;

/// Raw container output did not decode into a valid instance or solution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Output contained no records at all.
    #[error("output is empty")]
    Empty,

    /// Output is not valid UTF-8 text.
    #[error("output is not valid UTF-8")]
    InvalidUtf8,

    /// A required record never appeared.
    #[error("missing required '{0}' record")]
    MissingRecord(&'static str),

    /// A record ended before all of its fields were present.
    #[error("line {line}: truncated record, expected {expected} fields but found {found}")]
    Truncated {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// A record is syntactically wrong.
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// A record references an identifier that does not exist.
    #[error("line {line}: identifier {id} is out of range (limit {limit})")]
    OutOfRange { line: usize, id: u64, limit: u64 },
}

impl FormatError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

/// A well-formed solution that does not satisfy the acceptance rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    /// The generator produced an instance larger than the round allows.
    #[error("instance has size {actual} but the round allows at most {allowed}")]
    InstanceTooLarge { actual: u64, allowed: u64 },

    /// The solution references something the instance does not contain.
    #[error("solution references unknown element {0}")]
    UnknownElement(u64),

    /// The solution is structurally valid but incorrect.
    #[error("solution rejected: {0}")]
    Rejected(String),
}

/// Failures installing the interrupt guard.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The process-wide interrupt watcher is already running.
    #[error("interrupt guard is already installed for this process")]
    AlreadyInstalled,
}
