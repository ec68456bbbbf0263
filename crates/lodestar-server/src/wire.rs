//! Wire DTOs exchanged at the system boundary, plus their conversions to
//! and from the domain model.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use lodestar_types::{
    DependencyKind, JobDependency, JobSpec, Project, ProjectName, Schedule, Task, TaskWindow,
};
use serde::{Deserialize, Serialize};

use crate::status::RpcStatus;

fn default_version() -> i32 {
    1
}

/// Job specification as submitted by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpecWire {
    #[serde(default = "default_version")]
    pub version: i32,
    pub name: String,
    #[serde(default)]
    pub owner: String,
    /// Calendar date `YYYY-MM-DD`; the first schedulable day.
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub interval: String,
    pub task: TaskWire,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyWire>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskWire {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub window: TaskWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyWire {
    pub job: String,
    #[serde(default)]
    pub kind: DependencyKind,
}

/// Project registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectWire {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

/// Streaming acknowledgment for one job during a deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployAck {
    pub success: bool,
    pub ack: bool,
    pub job_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Streaming acknowledgment for one resource during a deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAck {
    pub success: bool,
    pub ack: bool,
    pub resource_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Compile output returned by the dump operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpWire {
    pub success: bool,
    pub content: String,
}

/// One scheduler-reported run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusWire {
    pub state: String,
    pub scheduled_at: DateTime<Utc>,
}

/// Computed window boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowWire {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn parse_wire_date(field: &str, raw: &str) -> Result<DateTime<Utc>, RpcStatus> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        RpcStatus::failed_precondition(format!("invalid {field} {raw:?}: {e}"))
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| RpcStatus::failed_precondition(format!("invalid {field} {raw:?}")))?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

/// Adapt a submitted job into the domain model.
///
/// # Errors
///
/// Returns a `FailedPrecondition` status for malformed dates.
pub fn from_job_wire(wire: &JobSpecWire) -> Result<JobSpec, RpcStatus> {
    let start_date = parse_wire_date("start_date", &wire.start_date)?;
    let end_date = wire
        .end_date
        .as_deref()
        .map(|raw| parse_wire_date("end_date", raw))
        .transpose()?;

    let dependencies = wire
        .dependencies
        .iter()
        .map(|dep| {
            (
                dep.job.clone(),
                JobDependency {
                    kind: dep.kind,
                    project: None,
                },
            )
        })
        .collect();

    Ok(JobSpec {
        version: wire.version,
        name: wire.name.clone(),
        owner: wire.owner.clone(),
        schedule: Schedule {
            start_date,
            end_date,
            interval: wire.interval.clone(),
        },
        task: Task {
            kind: wire.task.name.clone(),
            config: wire.task.config.clone(),
            window: wire.task.window.clone(),
            priority: 0,
        },
        assets: wire.assets.clone(),
        dependencies,
    })
}

/// Render a domain spec back into its wire form.
#[must_use]
pub fn to_job_wire(spec: &JobSpec) -> JobSpecWire {
    JobSpecWire {
        version: spec.version,
        name: spec.name.clone(),
        owner: spec.owner.clone(),
        start_date: spec.schedule.start_date.format("%Y-%m-%d").to_string(),
        end_date: spec
            .schedule
            .end_date
            .map(|d| d.format("%Y-%m-%d").to_string()),
        interval: spec.schedule.interval.clone(),
        task: TaskWire {
            name: spec.task.kind.clone(),
            config: spec.task.config.clone(),
            window: spec.task.window.clone(),
        },
        assets: spec.assets.clone(),
        dependencies: spec
            .dependencies
            .iter()
            .map(|(name, dep)| DependencyWire {
                job: match (&dep.kind, &dep.project) {
                    (DependencyKind::InterProject, Some(project)) => format!("{project}/{name}"),
                    _ => name.clone(),
                },
                kind: dep.kind,
            })
            .collect(),
    }
}

/// Adapt a project registration payload.
///
/// # Errors
///
/// Returns a `FailedPrecondition` status for blank names.
pub fn from_project_wire(wire: &ProjectWire) -> Result<Project, RpcStatus> {
    let name = ProjectName::new(&wire.name)
        .ok_or_else(|| RpcStatus::failed_precondition("project name must not be empty"))?;
    Ok(Project {
        name,
        config: wire.config.clone(),
    })
}

/// Render a project back into its wire form.
#[must_use]
pub fn to_project_wire(project: &Project) -> ProjectWire {
    ProjectWire {
        name: project.name.to_string(),
        config: project.config.clone(),
    }
}
