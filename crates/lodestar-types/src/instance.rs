//! Execution-instance records for scheduled runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What triggered an instance registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    Task,
    Hook,
}

impl InstanceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Hook => "hook",
        }
    }

    /// Parse the lowercase wire form.
    ///
    /// # Errors
    ///
    /// Returns the offending string for unknown kinds.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "task" => Ok(Self::Task),
            "hook" => Ok(Self::Hook),
            other => Err(format!("unknown instance kind {other:?}")),
        }
    }
}

impl std::fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one scheduled run of a job, created when the scheduler calls
/// back to register an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub job_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub kind: InstanceKind,
    pub registered_at: DateTime<Utc>,
}
