//! The boundary service implementing the control-plane operations.
//!
//! Transport-agnostic: streaming operations emit acks onto channels the
//! transport layer owns, and every error is a structured [`RpcStatus`].

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use lodestar_datastore::ResourceService;
use lodestar_engine::{InstanceService, JobService, SchedulerUnit};
use lodestar_state::{ProjectStore, SecretStore};
use lodestar_types::{
    InstanceKind, InstanceRecord, Observer, ObserverChain, Project, ResourceWire, SecretItem,
    TaskWindow,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::observer::{JobSyncObserver, ResourceObserver};
use crate::status::{from_resource_error, from_store_error, from_sync_error, RpcStatus};
use crate::wire::{
    from_job_wire, from_project_wire, to_job_wire, to_project_wire, DeployAck, DumpWire,
    JobSpecWire, JobStatusWire, ProjectWire, ResourceAck, WindowWire,
};

/// Reply for project/secret registrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAck {
    pub success: bool,
    pub message: String,
}

/// Reply for instance registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredInstance {
    pub project: ProjectWire,
    pub job: JobSpecWire,
    pub instance: InstanceRecord,
}

/// Control-plane boundary service.
pub struct RuntimeService {
    version: String,
    jobs: Arc<JobService>,
    resources: Arc<ResourceService>,
    projects: Arc<dyn ProjectStore>,
    secrets: Arc<dyn SecretStore>,
    instances: Arc<InstanceService>,
    scheduler: Arc<dyn SchedulerUnit>,
    progress_observer: Option<Arc<dyn Observer>>,
}

impl RuntimeService {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        jobs: Arc<JobService>,
        resources: Arc<ResourceService>,
        projects: Arc<dyn ProjectStore>,
        secrets: Arc<dyn SecretStore>,
        instances: Arc<InstanceService>,
        scheduler: Arc<dyn SchedulerUnit>,
        progress_observer: Option<Arc<dyn Observer>>,
    ) -> Self {
        Self {
            version: version.into(),
            jobs,
            resources,
            projects,
            secrets,
            instances,
            scheduler,
            progress_observer,
        }
    }

    /// Server version string, for client handshakes.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    fn project(&self, name: &str) -> Result<Project, RpcStatus> {
        self.projects
            .get_by_name(name)
            .map_err(|e| from_store_error(&e, &format!("project {name} not found")))
    }

    /// Register (or overwrite) a project.
    ///
    /// # Errors
    ///
    /// `FailedPrecondition` for blank names, `Internal` on storage failure.
    pub fn register_project(&self, wire: &ProjectWire) -> Result<RegisterAck, RpcStatus> {
        let project = from_project_wire(wire)?;
        self.projects
            .save(&project)
            .map_err(|e| from_store_error(&e, &format!("failed to save project {}", wire.name)))?;
        Ok(RegisterAck {
            success: true,
            message: "saved successfully".to_string(),
        })
    }

    /// Every registered project.
    ///
    /// # Errors
    ///
    /// `Internal` on storage failure.
    pub fn list_projects(&self) -> Result<Vec<ProjectWire>, RpcStatus> {
        let projects = self
            .projects
            .all()
            .map_err(|e| from_store_error(&e, "failed to retrieve saved projects"))?;
        Ok(projects.iter().map(to_project_wire).collect())
    }

    /// Server-streaming deploy: persist the submitted set, drop everything
    /// else, reconcile, and emit one ack per upload plus one notice per
    /// orphan delete onto `ack_tx`.
    ///
    /// # Errors
    ///
    /// Already-acked items stay acked; the returned status closes the
    /// stream with every remaining failure.
    pub async fn deploy_job_specification(
        &self,
        ctx: &CancellationToken,
        project_name: &str,
        jobs: Vec<JobSpecWire>,
        ack_tx: UnboundedSender<DeployAck>,
    ) -> Result<(), RpcStatus> {
        let project = self.project(project_name)?;

        let mut to_keep = Vec::with_capacity(jobs.len());
        for wire in &jobs {
            let spec = from_job_wire(wire)?;
            self.jobs
                .create(&spec, &project)
                .await
                .map_err(|e| from_sync_error(&e, &format!("failed to save {}", spec.name)))?;
            to_keep.push(spec);
        }

        let mut chain = ObserverChain::new();
        chain.join_optional(self.progress_observer.clone());
        chain.join(Arc::new(JobSyncObserver::new(ack_tx)));
        let chain: Arc<dyn Observer> = Arc::new(chain);

        self.jobs
            .keep_only(&project, &to_keep, Some(chain.clone()))
            .await
            .map_err(|e| from_sync_error(&e, "failed to delete jobs"))?;

        self.jobs
            .sync(ctx, &project, Some(chain))
            .await
            .map_err(|e| from_sync_error(&e, "failed to sync jobs"))?;

        Ok(())
    }

    /// Every spec of a project, in wire form.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown projects, `Internal` on storage failure.
    pub async fn list_job_specification(
        &self,
        project_name: &str,
    ) -> Result<Vec<JobSpecWire>, RpcStatus> {
        let project = self.project(project_name)?;
        let specs = self.jobs.get_all(&project).await.map_err(|e| {
            from_sync_error(&e, &format!("failed to retrieve jobs for project {project_name}"))
        })?;
        Ok(specs.iter().map(to_job_wire).collect())
    }

    /// Compile one spec (resolving the whole project) without writing.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown projects or jobs, `Internal` on compile
    /// failure.
    pub async fn dump_job_specification(
        &self,
        project_name: &str,
        job_name: &str,
    ) -> Result<DumpWire, RpcStatus> {
        let project = self.project(project_name)?;
        let spec = self
            .jobs
            .get_by_name(job_name, &project)
            .await
            .map_err(|e| from_sync_error(&e, &format!("job {job_name} not found")))?;
        let compiled = self
            .jobs
            .dump(&project, &spec)
            .await
            .map_err(|e| from_sync_error(&e, &format!("failed to compile {job_name}")))?;
        Ok(DumpWire {
            success: true,
            content: String::from_utf8_lossy(&compiled.contents).into_owned(),
        })
    }

    /// Record one scheduled run of a job.
    ///
    /// # Errors
    ///
    /// `FailedPrecondition` for unknown instance kinds or runs before the
    /// job's start date; `NotFound` for unknown projects or jobs.
    pub async fn register_instance(
        &self,
        project_name: &str,
        job_name: &str,
        scheduled_at: DateTime<Utc>,
        kind: &str,
    ) -> Result<RegisteredInstance, RpcStatus> {
        let kind = InstanceKind::parse(kind).map_err(RpcStatus::failed_precondition)?;
        let project = self.project(project_name)?;
        let spec = self
            .jobs
            .get_by_name(job_name, &project)
            .await
            .map_err(|e| from_sync_error(&e, &format!("job {job_name} not found")))?;

        let record = self
            .instances
            .register(&project, &spec, scheduled_at, kind)
            .map_err(|e| {
                from_sync_error(&e, &format!("failed to register instance of job {job_name}"))
            })?;

        Ok(RegisteredInstance {
            project: to_project_wire(&project),
            job: to_job_wire(&spec),
            instance: record,
        })
    }

    /// Run statuses for one job, fetched from the external scheduler.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown projects, `Internal` on scheduler failure.
    pub async fn job_status(
        &self,
        project_name: &str,
        job_name: &str,
    ) -> Result<Vec<JobStatusWire>, RpcStatus> {
        let project = self.project(project_name)?;
        let statuses = self
            .scheduler
            .job_status(&project, job_name)
            .await
            .map_err(|e| from_sync_error(&e, &format!("failed to fetch status of {job_name}")))?;
        Ok(statuses
            .into_iter()
            .map(|s| JobStatusWire {
                state: s.state,
                scheduled_at: s.scheduled_at,
            })
            .collect())
    }

    /// Compute the data window for a run scheduled at `scheduled_at`.
    /// All three window parameters are required.
    ///
    /// # Errors
    ///
    /// `FailedPrecondition` when any parameter is empty, `Internal` for
    /// unparseable values.
    pub fn get_window(
        &self,
        scheduled_at: DateTime<Utc>,
        size: &str,
        offset: &str,
        truncate_to: &str,
    ) -> Result<WindowWire, RpcStatus> {
        if size.is_empty() || offset.is_empty() || truncate_to.is_empty() {
            return Err(RpcStatus::failed_precondition(
                "window size, offset and truncate_to must be provided",
            ));
        }
        let window = TaskWindow {
            size: size.to_string(),
            offset: offset.to_string(),
            truncate_to: truncate_to.to_string(),
        }
        .prepare()
        .map_err(RpcStatus::internal)?;

        Ok(WindowWire {
            start: window.start(scheduled_at),
            end: window.end(scheduled_at),
        })
    }

    /// Store a project secret. The value arrives base-64 encoded and is
    /// decoded before storage; an empty decoded value is an error.
    ///
    /// # Errors
    ///
    /// `Internal` for empty or undecodable values and storage failures.
    pub fn register_secret(
        &self,
        project_name: &str,
        secret_name: &str,
        value: &str,
    ) -> Result<RegisterAck, RpcStatus> {
        if value.is_empty() {
            return Err(RpcStatus::internal("empty value for secret"));
        }
        let decoded = BASE64
            .decode(value)
            .map_err(|e| RpcStatus::internal(format!("{e}: failed to decode base64 string")))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|e| RpcStatus::internal(format!("{e}: secret value is not valid utf-8")))?;
        if decoded.is_empty() {
            return Err(RpcStatus::internal("empty value for secret"));
        }

        let project = self.project(project_name)?;
        self.secrets
            .save(
                &project,
                &SecretItem {
                    name: secret_name.to_string(),
                    value: decoded,
                },
            )
            .map_err(|e| from_store_error(&e, &format!("failed to save secret {secret_name}")))?;
        Ok(RegisterAck {
            success: true,
            message: String::new(),
        })
    }

    /// Materialize one new resource.
    ///
    /// # Errors
    ///
    /// Status-mapped resource errors; see [`from_resource_error`].
    pub async fn create_resource(
        &self,
        ctx: &CancellationToken,
        project_name: &str,
        resource: &ResourceWire,
    ) -> Result<RegisterAck, RpcStatus> {
        let project = self.project(project_name)?;
        let spec = self.resources.from_wire(resource).map_err(|e| {
            from_resource_error(&e, &format!("failed to parse resource {}", resource.name))
        })?;
        let progress = self.progress_observer.clone();
        self.resources
            .create_resource(ctx, &project, &[spec], progress.as_deref())
            .await
            .map_err(|e| {
                from_resource_error(&e, &format!("failed to create resource {}", resource.name))
            })?;
        Ok(RegisterAck {
            success: true,
            message: String::new(),
        })
    }

    /// Update one existing resource.
    ///
    /// # Errors
    ///
    /// Status-mapped resource errors; see [`from_resource_error`].
    pub async fn update_resource(
        &self,
        ctx: &CancellationToken,
        project_name: &str,
        resource: &ResourceWire,
    ) -> Result<RegisterAck, RpcStatus> {
        let project = self.project(project_name)?;
        let spec = self.resources.from_wire(resource).map_err(|e| {
            from_resource_error(&e, &format!("failed to parse resource {}", resource.name))
        })?;
        let progress = self.progress_observer.clone();
        self.resources
            .update_resource(ctx, &project, &[spec], progress.as_deref())
            .await
            .map_err(|e| {
                from_resource_error(&e, &format!("failed to update resource {}", resource.name))
            })?;
        Ok(RegisterAck {
            success: true,
            message: String::new(),
        })
    }

    /// Fetch one persisted resource in wire form.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown projects, datastores, or resources.
    pub fn read_resource(
        &self,
        project_name: &str,
        datastore_name: &str,
        resource_name: &str,
    ) -> Result<ResourceWire, RpcStatus> {
        let project = self.project(project_name)?;
        let spec = self
            .resources
            .read_resource(&project, datastore_name, resource_name)
            .map_err(|e| {
                from_resource_error(&e, &format!("failed to read resource {resource_name}"))
            })?;
        self.resources.to_wire(&spec).map_err(|e| {
            from_resource_error(&e, &format!("failed to adapt resource {resource_name}"))
        })
    }

    /// Server-streaming resource deploy: update the full submitted set,
    /// emitting one ack per resource onto `ack_tx`.
    ///
    /// # Errors
    ///
    /// Already-acked items stay acked; the returned status closes the
    /// stream with every remaining failure.
    pub async fn deploy_resource_specification(
        &self,
        ctx: &CancellationToken,
        project_name: &str,
        resources: Vec<ResourceWire>,
        ack_tx: UnboundedSender<ResourceAck>,
    ) -> Result<(), RpcStatus> {
        let project = self.project(project_name)?;

        let mut specs = Vec::with_capacity(resources.len());
        for wire in &resources {
            let spec = self.resources.from_wire(wire).map_err(|e| {
                from_resource_error(&e, &format!("cannot adapt resource {}", wire.name))
            })?;
            specs.push(spec);
        }

        let mut chain = ObserverChain::new();
        chain.join_optional(self.progress_observer.clone());
        chain.join(Arc::new(ResourceObserver::new(ack_tx)));

        self.resources
            .update_resource(ctx, &project, &specs, Some(&chain))
            .await
            .map_err(|e| from_resource_error(&e, "failed to update resources"))?;
        Ok(())
    }

    /// Every persisted resource of one datastore, in wire form.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown projects or datastores.
    pub fn list_resource_specification(
        &self,
        project_name: &str,
        datastore_name: &str,
    ) -> Result<Vec<ResourceWire>, RpcStatus> {
        let project = self.project(project_name)?;
        let specs = self
            .resources
            .get_all(&project, datastore_name)
            .map_err(|e| {
                from_resource_error(
                    &e,
                    &format!("failed to retrieve resources for project {project_name}"),
                )
            })?;
        specs
            .iter()
            .map(|spec| {
                self.resources.to_wire(spec).map_err(|e| {
                    from_resource_error(&e, &format!("failed to adapt resource {}", spec.name))
                })
            })
            .collect()
    }
}
