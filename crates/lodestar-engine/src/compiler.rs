//! Compilation of resolved job specs into scheduler artifacts.

use std::collections::BTreeMap;

use lodestar_types::{CompiledJob, DependencyKind, JobSpec, Project};
use serde::Serialize;

use crate::errors::{Result, SyncError};

/// Pure function turning a (project, resolved job spec) pair into an
/// opaque artifact the external scheduler can consume.
///
/// Must be side-effect free; [`crate::JobService::dump`] relies on being
/// able to compile without writing anything.
pub trait Compiler: Send + Sync {
    /// Compile one dependency- and priority-resolved spec.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Compile`] when the spec can't be rendered.
    fn compile(&self, project: &Project, spec: &JobSpec) -> Result<CompiledJob>;
}

/// Scheduler-facing manifest rendered by [`ManifestCompiler`].
#[derive(Debug, Serialize)]
struct Manifest<'a> {
    project: &'a str,
    name: &'a str,
    owner: &'a str,
    schedule: ManifestSchedule<'a>,
    task: ManifestTask<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    upstreams: Vec<String>,
    #[serde(skip_serializing_if = "map_ref_is_empty")]
    assets: &'a BTreeMap<String, String>,
}

fn map_ref_is_empty(map: &&BTreeMap<String, String>) -> bool {
    map.is_empty()
}

#[derive(Debug, Serialize)]
struct ManifestSchedule<'a> {
    start_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<String>,
    interval: &'a str,
}

#[derive(Debug, Serialize)]
struct ManifestTask<'a> {
    kind: &'a str,
    priority: i32,
    window: &'a lodestar_types::TaskWindow,
    #[serde(skip_serializing_if = "map_ref_is_empty")]
    config: &'a BTreeMap<String, String>,
}

/// Renders a resolved spec into a YAML manifest keyed by the job name.
///
/// Intra- and inter-project upstreams become qualified names in the
/// `upstreams` list; external dependencies are the other system's concern
/// and are omitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestCompiler;

impl ManifestCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for ManifestCompiler {
    fn compile(&self, project: &Project, spec: &JobSpec) -> Result<CompiledJob> {
        let upstreams = spec
            .dependencies
            .iter()
            .filter_map(|(name, dep)| match dep.kind {
                DependencyKind::IntraProject => Some(name.clone()),
                DependencyKind::InterProject => dep
                    .project
                    .as_ref()
                    .map(|proj| format!("{proj}/{name}")),
                DependencyKind::External => None,
            })
            .collect();

        let manifest = Manifest {
            project: project.name.as_str(),
            name: &spec.name,
            owner: &spec.owner,
            schedule: ManifestSchedule {
                start_date: spec.schedule.start_date.format("%Y-%m-%d").to_string(),
                end_date: spec
                    .schedule
                    .end_date
                    .map(|d| d.format("%Y-%m-%d").to_string()),
                interval: &spec.schedule.interval,
            },
            task: ManifestTask {
                kind: &spec.task.kind,
                priority: spec.task.priority,
                window: &spec.task.window,
                config: &spec.task.config,
            },
            upstreams,
            assets: &spec.assets,
        };

        let rendered = serde_yaml::to_string(&manifest).map_err(|e| SyncError::Compile {
            name: spec.name.clone(),
            message: e.to_string(),
        })?;

        Ok(CompiledJob {
            name: spec.name.clone(),
            contents: rendered.into_bytes(),
        })
    }
}
