//! Job specifications and their compiled form.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::project::ProjectName;
use crate::window::TaskWindow;

static JOB_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_\-]*$").expect("valid job name regex"));

/// How a declared dependency relates to the project that declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Resolvable inside the same project.
    #[default]
    IntraProject,
    /// Resolvable through another registered project.
    InterProject,
    /// A declared sink/source in another system; never resolved.
    External,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::IntraProject => "intra",
            Self::InterProject => "inter",
            Self::External => "external",
        };
        f.write_str(s)
    }
}

/// A resolved reference from one job to an upstream.
///
/// Populated by the dependency resolver; `project` is set only for
/// inter-project references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobDependency {
    pub kind: DependencyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectName>,
}

/// When and how often a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Cron expression, including `@daily`-style shorthands.
    pub interval: String,
}

/// The unit of work a job performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Task {
    /// Task plugin identifier (e.g. `"bq2bq"`).
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub window: TaskWindow,
    /// Scheduler priority weight; derived, never user-supplied.
    #[serde(default)]
    pub priority: i32,
}

/// Declarative description of one scheduled task.
///
/// `dependencies` starts out as whatever the operator declared and is
/// replaced wholesale by the dependency resolver with the enriched set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub version: i32,
    pub name: String,
    pub owner: String,
    pub schedule: Schedule,
    #[serde(default)]
    pub task: Task,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, JobDependency>,
}

impl JobSpec {
    /// Check the structural constraints a spec must satisfy before it is
    /// accepted into a project.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first violated
    /// constraint: malformed name, unrecognized schedule interval, or an
    /// empty task kind.
    pub fn validate(&self) -> Result<(), String> {
        if !JOB_NAME_RE.is_match(&self.name) {
            return Err(format!(
                "job name {:?} must match {}",
                self.name,
                JOB_NAME_RE.as_str()
            ));
        }
        if !interval_is_recognized(&self.schedule.interval) {
            return Err(format!(
                "job {}: unrecognized schedule interval {:?}",
                self.name, self.schedule.interval
            ));
        }
        if self.task.kind.trim().is_empty() {
            return Err(format!("job {}: task kind must not be empty", self.name));
        }
        Ok(())
    }
}

/// True when `interval` parses as a cron expression or shorthand.
///
/// Five-field crontab strings are accepted alongside the six-field form by
/// assuming a zero seconds column.
#[must_use]
pub fn interval_is_recognized(interval: &str) -> bool {
    let interval = interval.trim();
    if interval.is_empty() {
        return false;
    }
    if cron::Schedule::from_str(interval).is_ok() {
        return true;
    }
    if !interval.starts_with('@') && interval.split_whitespace().count() == 5 {
        return cron::Schedule::from_str(&format!("0 {interval}")).is_ok();
    }
    false
}

/// Byte payload produced from a [`JobSpec`], consumable by the external
/// scheduler. Keyed by the job's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledJob {
    pub name: String,
    pub contents: Vec<u8>,
}
