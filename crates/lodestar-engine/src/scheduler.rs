//! Contract with the external workflow scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodestar_types::Project;

use crate::errors::Result;

/// One observed run of a job as reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRunStatus {
    /// Scheduler-specific state string (e.g. `"success"`, `"running"`).
    pub state: String,
    pub scheduled_at: DateTime<Utc>,
}

/// Capability the external scheduler exposes to the control plane.
///
/// The control plane never schedules runs itself; it only queries.
#[async_trait]
pub trait SchedulerUnit: Send + Sync {
    /// Statuses of every known run of `job_name` within `project`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`](crate::SyncError) when the scheduler can't be
    /// reached or the job is unknown to it.
    async fn job_status(&self, project: &Project, job_name: &str) -> Result<Vec<JobRunStatus>>;
}

pub mod testing {
    //! Canned scheduler for tests.

    use super::{async_trait, DateTime, JobRunStatus, Project, Result, SchedulerUnit, Utc};

    /// Returns the same status list for every query.
    #[derive(Debug, Default)]
    pub struct FixedScheduler {
        statuses: Vec<JobRunStatus>,
    }

    impl FixedScheduler {
        #[must_use]
        pub fn new(statuses: Vec<JobRunStatus>) -> Self {
            Self { statuses }
        }

        /// Convenience constructor from `(state, scheduled_at)` pairs.
        #[must_use]
        pub fn with_runs(runs: Vec<(&str, DateTime<Utc>)>) -> Self {
            Self::new(
                runs.into_iter()
                    .map(|(state, scheduled_at)| JobRunStatus {
                        state: state.to_string(),
                        scheduled_at,
                    })
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl SchedulerUnit for FixedScheduler {
        async fn job_status(&self, _: &Project, _: &str) -> Result<Vec<JobRunStatus>> {
            Ok(self.statuses.clone())
        }
    }
}
