//! Registration of execution instances for scheduled runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lodestar_state::InstanceStore;
use lodestar_types::{InstanceKind, InstanceRecord, JobSpec, Project};

use crate::errors::{Result, SyncError};

/// Creates execution-instance records when the scheduler calls back for a
/// run of a job.
pub struct InstanceService {
    store: Arc<dyn InstanceStore>,
}

impl InstanceService {
    #[must_use]
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        Self { store }
    }

    /// Record one scheduled run of `spec`.
    ///
    /// # Errors
    ///
    /// [`SyncError::Validation`] when `scheduled_at` precedes the job's
    /// start date, [`SyncError::Store`] on storage failure.
    pub fn register(
        &self,
        project: &Project,
        spec: &JobSpec,
        scheduled_at: DateTime<Utc>,
        kind: InstanceKind,
    ) -> Result<InstanceRecord> {
        if scheduled_at < spec.schedule.start_date {
            return Err(SyncError::validation(format!(
                "job {} scheduled at {scheduled_at} before its start date {}",
                spec.name, spec.schedule.start_date
            )));
        }
        let record = InstanceRecord {
            job_name: spec.name.clone(),
            scheduled_at,
            kind,
            registered_at: Utc::now(),
        };
        self.store.save(project, &record)?;
        Ok(record)
    }
}
