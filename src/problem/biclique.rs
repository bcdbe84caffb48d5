//! Bipartite clique problem.
//!
//! The generator emits an undirected graph, the solver two disjoint vertex
//! sets that are fully connected to each other.
//!
//! Instance encoding:
//! ```text
//! n <vertices>
//! e <u> <v>
//! ```
//! Solution encoding:
//! ```text
//! s set1 <v>
//! s set2 <v>
//! ```

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::num::NonZeroU64;

use super::{Parser, Problem, Verifier};
use crate::error::{FormatError, VerificationFailure};

const STARTING_SIZE: NonZeroU64 = match NonZeroU64::new(5) {
    Some(size) => size,
    None => unreachable!(),
};

/// The biclique problem with its parser and verifier.
pub type Biclique = Problem<BicliqueParser, BicliqueVerifier>;

/// Construct the biclique problem.
pub const fn biclique() -> Biclique {
    Problem::new("biclique", STARTING_SIZE, BicliqueParser, BicliqueVerifier)
}

/// Undirected simple graph on vertices `0..vertices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    vertices: u64,
    // Stored as (min, max)
    edges: BTreeSet<(u64, u64)>,
}

impl Graph {
    pub const fn vertices(&self) -> u64 {
        self.vertices
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, u: u64, v: u64) -> bool {
        self.edges.contains(&(u.min(v), u.max(v)))
    }
}

/// Two disjoint vertex sets claimed to form a complete bipartite subgraph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bipartition {
    pub set1: BTreeSet<u64>,
    pub set2: BTreeSet<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BicliqueParser;

/// Accepts any non-empty biclique of the instance.
///
/// There is no quality floor: the instance carries no certificate of the
/// largest biclique, and a floor derived from the size alone would reject
/// correct answers on sparse graphs. Ranking solutions by quality is left to
/// the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct BicliqueVerifier;

/// Non-blank lines of the output, numbered from 1, split on whitespace.
fn records(raw: &[u8]) -> Result<Vec<(usize, Vec<&str>)>, FormatError> {
    let text = std::str::from_utf8(raw).map_err(|_| FormatError::InvalidUtf8)?;
    let records: Vec<_> = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.split_whitespace().collect::<Vec<_>>()))
        .filter(|(_, fields)| !fields.is_empty())
        .collect();

    if records.is_empty() {
        return Err(FormatError::Empty);
    }
    Ok(records)
}

fn expect_fields(line: usize, fields: &[&str], expected: usize) -> Result<(), FormatError> {
    match fields.len() {
        n if n < expected => Err(FormatError::Truncated {
            line,
            expected,
            found: n,
        }),
        n if n > expected => Err(FormatError::malformed(
            line,
            format!("expected {expected} fields, found {n}"),
        )),
        _ => Ok(()),
    }
}

fn number(line: usize, field: &str) -> Result<u64, FormatError> {
    field
        .parse()
        .map_err(|_| FormatError::malformed(line, format!("'{field}' is not a vertex id")))
}

impl Parser for BicliqueParser {
    type Instance = Graph;
    type Solution = Bipartition;

    fn parse_instance(&self, raw: &[u8]) -> Result<Graph, FormatError> {
        let mut vertices = None;
        let mut edges = BTreeSet::new();

        for (line, fields) in records(raw)? {
            match fields[0] {
                "n" => {
                    expect_fields(line, &fields, 2)?;
                    if vertices.is_some() {
                        return Err(FormatError::malformed(line, "duplicate 'n' record"));
                    }
                    vertices = Some(number(line, fields[1])?);
                }
                "e" => {
                    expect_fields(line, &fields, 3)?;
                    let limit = vertices.ok_or(FormatError::MissingRecord("n"))?;
                    let u = number(line, fields[1])?;
                    let v = number(line, fields[2])?;
                    for id in [u, v] {
                        if id >= limit {
                            return Err(FormatError::OutOfRange { line, id, limit });
                        }
                    }
                    if u == v {
                        return Err(FormatError::malformed(line, format!("self loop on vertex {u}")));
                    }
                    edges.insert((u.min(v), u.max(v)));
                }
                other => {
                    return Err(FormatError::malformed(line, format!("unknown record '{other}'")));
                }
            }
        }

        let vertices = vertices.ok_or(FormatError::MissingRecord("n"))?;
        Ok(Graph { vertices, edges })
    }

    fn parse_solution(&self, raw: &[u8]) -> Result<Bipartition, FormatError> {
        let mut solution = Bipartition::default();

        for (line, fields) in records(raw)? {
            if fields[0] != "s" {
                return Err(FormatError::malformed(
                    line,
                    format!("unknown record '{}'", fields[0]),
                ));
            }
            expect_fields(line, &fields, 3)?;
            let vertex = number(line, fields[2])?;
            let (own, other) = match fields[1] {
                "set1" => (&mut solution.set1, &solution.set2),
                "set2" => (&mut solution.set2, &solution.set1),
                side => {
                    return Err(FormatError::malformed(line, format!("unknown set '{side}'")));
                }
            };
            if other.contains(&vertex) {
                return Err(FormatError::malformed(
                    line,
                    format!("vertex {vertex} appears in both sets"),
                ));
            }
            own.insert(vertex);
        }

        Ok(solution)
    }

    fn encode_instance(&self, instance: &Graph) -> Vec<u8> {
        let mut out = format!("n {}\n", instance.vertices);
        for (u, v) in &instance.edges {
            let _ = writeln!(out, "e {u} {v}");
        }
        out.into_bytes()
    }

    fn encode_solution(&self, solution: &Bipartition) -> Vec<u8> {
        let mut out = String::new();
        for v in &solution.set1 {
            let _ = writeln!(out, "s set1 {v}");
        }
        for v in &solution.set2 {
            let _ = writeln!(out, "s set2 {v}");
        }
        out.into_bytes()
    }
}

impl Verifier for BicliqueVerifier {
    type Instance = Graph;
    type Solution = Bipartition;

    fn verify(
        &self,
        instance: &Graph,
        solution: &Bipartition,
        instance_size: NonZeroU64,
    ) -> Result<(), VerificationFailure> {
        if instance.vertices > instance_size.get() {
            return Err(VerificationFailure::InstanceTooLarge {
                actual: instance.vertices,
                allowed: instance_size.get(),
            });
        }
        if solution.set1.is_empty() || solution.set2.is_empty() {
            return Err(VerificationFailure::Rejected(
                "both sides of the biclique must be non-empty".into(),
            ));
        }
        if let Some(&unknown) = solution
            .set1
            .iter()
            .chain(&solution.set2)
            .find(|&&v| v >= instance.vertices)
        {
            return Err(VerificationFailure::UnknownElement(unknown));
        }

        for &u in &solution.set1 {
            for &v in &solution.set2 {
                if !instance.has_edge(u, v) {
                    return Err(VerificationFailure::Rejected(format!(
                        "edge {u} - {v} is missing"
                    )));
                }
            }
        }
        Ok(())
    }
}
