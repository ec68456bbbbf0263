//! Priority resolution: bounded integer weights consistent with the
//! dependency DAG.
//!
//! The downstream scheduler drains higher weights first, so every upstream
//! must outweigh the jobs that depend on it: for each edge A -> B (A
//! depends on B), `priority(A) < priority(B)`.

use std::collections::{BTreeMap, BTreeSet};

use lodestar_types::{DependencyKind, JobSpec};

use crate::errors::{Result, SyncError};

/// Weight assigned to a job with no dependencies.
pub const MAX_PRIORITY_WEIGHT: i32 = 10_000;

/// Weight lost per level of dependency depth.
pub const WEIGHT_STRIDE: i32 = 10;

/// Assigns `task.priority` across a batch of dependency-resolved specs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityResolver;

impl PriorityResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Return the batch in input order with `task.priority` populated.
    ///
    /// Only intra-project edges participate; inter-project and external
    /// dependencies are invisible to the local scheduler. Name-ordered
    /// traversal makes repeated runs over an unchanged input set
    /// byte-identical.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cycle`] naming every node on the first cycle
    /// found.
    pub fn resolve(&self, mut specs: Vec<JobSpec>) -> Result<Vec<JobSpec>> {
        // Owned keys so the borrow of `specs` ends before the mutation below.
        let depths: BTreeMap<String, i32> = {
            let edges = intra_project_edges(&specs);
            resolve_depths(&edges)?
                .into_iter()
                .map(|(name, depth)| (name.to_string(), depth))
                .collect()
        };

        for spec in &mut specs {
            let depth = depths.get(&spec.name).copied().unwrap_or(0);
            spec.task.priority = (MAX_PRIORITY_WEIGHT - WEIGHT_STRIDE * depth).max(0);
        }
        Ok(specs)
    }
}

/// Dependency edges between jobs of this batch, name-keyed and name-sorted.
fn intra_project_edges(specs: &[JobSpec]) -> BTreeMap<&str, Vec<&str>> {
    let batch: BTreeSet<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    specs
        .iter()
        .map(|spec| {
            let upstreams = spec
                .dependencies
                .iter()
                .filter(|(name, dep)| {
                    dep.kind == DependencyKind::IntraProject && batch.contains(name.as_str())
                })
                .map(|(name, _)| name.as_str())
                .collect();
            (spec.name.as_str(), upstreams)
        })
        .collect()
}

/// Longest dependency-chain length from each node down to a node with no
/// dependencies, via iterative depth-first traversal.
fn resolve_depths<'a>(edges: &BTreeMap<&'a str, Vec<&'a str>>) -> Result<BTreeMap<&'a str, i32>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }

    let mut depths: BTreeMap<&str, i32> = BTreeMap::new();
    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();

    for &start in edges.keys() {
        if marks.get(start) == Some(&Mark::Done) {
            continue;
        }

        // Two-phase stack walk: Enter marks a node in-progress and pushes
        // its upstreams, Exit folds their depths.
        enum Phase<'s> {
            Enter(&'s str),
            Exit(&'s str),
        }
        let mut stack = vec![Phase::Enter(start)];
        let mut path: Vec<&str> = Vec::new();

        while let Some(phase) = stack.pop() {
            match phase {
                Phase::Enter(node) => {
                    match marks.get(node) {
                        Some(Mark::Done) => continue,
                        Some(Mark::InProgress) => {
                            return Err(cycle_error(&path, node));
                        }
                        None => {}
                    }
                    marks.insert(node, Mark::InProgress);
                    path.push(node);
                    stack.push(Phase::Exit(node));
                    for &upstream in edges.get(node).into_iter().flatten() {
                        match marks.get(upstream) {
                            Some(Mark::Done) => {}
                            Some(Mark::InProgress) => {
                                return Err(cycle_error(&path, upstream));
                            }
                            None => stack.push(Phase::Enter(upstream)),
                        }
                    }
                }
                Phase::Exit(node) => {
                    let depth = edges
                        .get(node)
                        .into_iter()
                        .flatten()
                        .map(|up| depths.get(up).copied().unwrap_or(0) + 1)
                        .max()
                        .unwrap_or(0);
                    depths.insert(node, depth);
                    marks.insert(node, Mark::Done);
                    path.pop();
                }
            }
        }
    }

    Ok(depths)
}

/// Every node on the cycle closed by re-encountering `repeat` along `path`.
fn cycle_error(path: &[&str], repeat: &str) -> SyncError {
    let start = path.iter().position(|&n| n == repeat).unwrap_or(0);
    let mut nodes: Vec<String> = path[start..].iter().map(ToString::to_string).collect();
    if nodes.is_empty() {
        nodes.push(repeat.to_string());
    }
    nodes.sort();
    SyncError::Cycle { nodes }
}
