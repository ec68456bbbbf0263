//! Job sync engine: persistence, resolution, compilation, and
//! reconciliation against the scheduler's artifact storage.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use lodestar_state::{
    ArtifactStore, ArtifactStoreFactory, SpecStore, SpecStoreFactory, StoreError,
};
use lodestar_types::{AggregateError, CompiledJob, Event, JobSpec, Observer, Project};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::compiler::Compiler;
use crate::dependency::DependencyResolver;
use crate::errors::{Result, SyncError};
use crate::priority::PriorityResolver;

/// Delay before the single retry of a failed artifact-store save/delete.
const STORE_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Optional sink for post-priority spec metadata. When absent the publish
/// step of a sync is skipped silently.
pub trait MetadataPublisher: Send + Sync {
    /// Publish the fully-resolved specs of one project.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on publish failure; captured into the sync
    /// batch's aggregate, never fatal.
    fn publish(&self, project: &Project, specs: &[JobSpec]) -> Result<()>;
}

/// Orchestrates the job spec lifecycle for a project.
///
/// Holds only factories and resolvers; store handles are acquired per call
/// and released on every exit path. Cheap to clone behind `Arc`s.
pub struct JobService {
    spec_factory: Arc<dyn SpecStoreFactory>,
    artifact_factory: Arc<dyn ArtifactStoreFactory>,
    compiler: Arc<dyn Compiler>,
    dependency_resolver: Arc<DependencyResolver>,
    priority_resolver: PriorityResolver,
    metadata_publisher: Option<Arc<dyn MetadataPublisher>>,
}

impl JobService {
    #[must_use]
    pub fn new(
        spec_factory: Arc<dyn SpecStoreFactory>,
        artifact_factory: Arc<dyn ArtifactStoreFactory>,
        compiler: Arc<dyn Compiler>,
        dependency_resolver: Arc<DependencyResolver>,
        priority_resolver: PriorityResolver,
        metadata_publisher: Option<Arc<dyn MetadataPublisher>>,
    ) -> Self {
        Self {
            spec_factory,
            artifact_factory,
            compiler,
            dependency_resolver,
            priority_resolver,
            metadata_publisher,
        }
    }

    /// Validate and persist a single spec into the project's spec store.
    /// Overwrites any existing spec of the same name.
    ///
    /// # Errors
    ///
    /// [`SyncError::Validation`] for structural violations,
    /// [`SyncError::Store`] on storage failure.
    pub async fn create(&self, spec: &JobSpec, project: &Project) -> Result<()> {
        spec.validate().map_err(SyncError::Validation)?;
        let store = self.spec_factory.open(project)?;
        let spec = spec.clone();
        run_blocking(move || store.save(&spec)).await?;
        Ok(())
    }

    /// Fetch one spec by name.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] for unknown names.
    pub async fn get_by_name(&self, name: &str, project: &Project) -> Result<JobSpec> {
        let store = self.spec_factory.open(project)?;
        let owned = name.to_string();
        run_blocking(move || store.get_by_name(&owned))
            .await?
            .ok_or_else(|| SyncError::not_found("job spec", name))
    }

    /// Every spec in the project.
    ///
    /// # Errors
    ///
    /// [`SyncError::Store`] on storage failure.
    pub async fn get_all(&self, project: &Project) -> Result<Vec<JobSpec>> {
        let store = self.spec_factory.open(project)?;
        Ok(run_blocking(move || store.all()).await?)
    }

    /// Delete every spec not named in `to_keep`, emitting one
    /// [`Event::JobRemoteDelete`] per deletion. Idempotent; per-item
    /// failures are aggregated and partial deletion is allowed.
    ///
    /// # Errors
    ///
    /// [`SyncError::Aggregate`] when any deletion failed.
    pub async fn keep_only(
        &self,
        project: &Project,
        to_keep: &[JobSpec],
        observer: Option<Arc<dyn Observer>>,
    ) -> Result<()> {
        let store = self.spec_factory.open(project)?;
        let keep: HashSet<String> = to_keep.iter().map(|s| s.name.clone()).collect();

        let outcomes = run_blocking(move || -> std::result::Result<_, StoreError> {
            let mut outcomes: Vec<(String, Option<String>)> = Vec::new();
            let specs = store.all()?;
            for spec in specs {
                if keep.contains(&spec.name) {
                    continue;
                }
                let error = store.delete(&spec.name).err().map(|e| e.to_string());
                outcomes.push((spec.name, error));
            }
            Ok(outcomes)
        })
        .await?;

        let mut failures = AggregateError::new();
        for (name, error) in outcomes {
            if let Some(err) = &error {
                failures.push(format!("failed to delete spec {name}: {err}"));
            }
            notify(
                observer.as_deref(),
                &Event::JobRemoteDelete { name, error },
            );
        }
        failures.into_result().map_err(SyncError::Aggregate)
    }

    /// Reconcile the project's compiled artifacts with its current spec
    /// set: resolve dependencies and priorities, compile and upload every
    /// spec, delete orphans, and publish metadata when configured.
    ///
    /// Dependency failures are batched across the whole spec set and abort
    /// the run before compilation. Compile/upload/delete failures are
    /// per-item: captured, reported on `observer`, and surfaced together
    /// at the end.
    ///
    /// # Errors
    ///
    /// [`SyncError::Aggregate`] with every per-item failure,
    /// [`SyncError::Cycle`] for a cyclic dependency graph,
    /// [`SyncError::Cancelled`] when `ctx` fires mid-run.
    pub async fn sync(
        &self,
        ctx: &CancellationToken,
        project: &Project,
        observer: Option<Arc<dyn Observer>>,
    ) -> Result<()> {
        let spec_store = self.spec_factory.open(project)?;
        let specs = {
            let store = spec_store.clone();
            run_blocking(move || store.all()).await?
        };
        tracing::info!(project = %project.name, specs = specs.len(), "starting job sync");
        check_cancelled(ctx, AggregateError::new())?;

        let resolved = self
            .resolve_all(ctx, project, &spec_store, specs, observer.clone())
            .await?;
        check_cancelled(ctx, AggregateError::new())?;

        let prioritized = self.priority_resolver.resolve(resolved)?;

        let artifact_store = self.artifact_factory.open(project)?;
        let mut failures = AggregateError::new();

        let uploads_cancelled = self
            .upload_all(
                ctx,
                project,
                &artifact_store,
                &prioritized,
                observer.as_deref(),
                &mut failures,
            )
            .await;
        if uploads_cancelled {
            return Err(SyncError::Cancelled(failures));
        }

        let deletes_cancelled = delete_orphans(
            ctx,
            &artifact_store,
            &prioritized,
            observer.as_deref(),
            &mut failures,
        )
        .await?;
        if deletes_cancelled {
            return Err(SyncError::Cancelled(failures));
        }

        if let Some(publisher) = &self.metadata_publisher {
            if let Err(e) = publisher.publish(project, &prioritized) {
                failures.push(format!("failed to publish metadata: {e}"));
            }
        }

        let result = failures.into_result().map_err(SyncError::Aggregate);
        match &result {
            Ok(()) => tracing::info!(project = %project.name, "job sync complete"),
            Err(e) => tracing::warn!(project = %project.name, "job sync finished with failures: {e}"),
        }
        result
    }

    /// Resolve dependencies and priorities for the whole project and
    /// return the compile output for `spec` without writing anything.
    ///
    /// # Errors
    ///
    /// Propagates resolution, cycle, and compile errors;
    /// [`SyncError::NotFound`] when `spec` is not part of the project.
    pub async fn dump(&self, project: &Project, spec: &JobSpec) -> Result<CompiledJob> {
        let store = self.spec_factory.open(project)?;
        let resolver = self.dependency_resolver.clone();
        let project_owned = project.clone();

        let resolved = run_blocking(move || -> Result<_> {
            let mut resolved = Vec::new();
            for s in store.all()? {
                resolved.push(resolver.resolve(&project_owned, store.as_ref(), &s, None)?);
            }
            Ok(resolved)
        })
        .await?;

        let prioritized = self.priority_resolver.resolve(resolved)?;
        let target = prioritized
            .into_iter()
            .find(|s| s.name == spec.name)
            .ok_or_else(|| SyncError::not_found("job spec", &spec.name))?;
        self.compiler.compile(project, &target)
    }

    /// Dependency-resolve every spec on a bounded blocking pool.
    ///
    /// All specs are attempted; non-structural failures are batched into
    /// one aggregate. A cycle aborts after the in-flight tasks drain.
    async fn resolve_all(
        &self,
        ctx: &CancellationToken,
        project: &Project,
        store: &Arc<dyn SpecStore>,
        specs: Vec<JobSpec>,
        observer: Option<Arc<dyn Observer>>,
    ) -> Result<Vec<JobSpec>> {
        let semaphore = Arc::new(Semaphore::new(worker_pool_size()));
        let mut join_set: JoinSet<(usize, Result<JobSpec>)> = JoinSet::new();
        let mut slots: Vec<Option<Result<JobSpec>>> = std::iter::repeat_with(|| None)
            .take(specs.len())
            .collect();
        let mut cancelled = false;

        for (idx, spec) in specs.into_iter().enumerate() {
            if ctx.is_cancelled() {
                cancelled = true;
                break;
            }
            let permit = acquire(&semaphore).await?;
            let resolver = self.dependency_resolver.clone();
            let store = store.clone();
            let project = project.clone();
            let observer = observer.clone();
            join_set.spawn_blocking(move || {
                let _permit = permit;
                let result = resolver.resolve(&project, store.as_ref(), &spec, observer.as_deref());
                (idx, result)
            });
        }

        let mut failures = AggregateError::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(join_err) => {
                    failures.push(format!("dependency resolution task panicked: {join_err}"));
                }
            }
        }

        // Report failures in input order; a cycle is structural and wins.
        let mut resolved = Vec::with_capacity(slots.len());
        for slot in slots.into_iter().flatten() {
            match slot {
                Ok(spec) => resolved.push(spec),
                Err(err @ SyncError::Cycle { .. }) => return Err(err),
                Err(err) => failures.push(err),
            }
        }

        if cancelled {
            return Err(SyncError::Cancelled(failures));
        }
        failures.into_result().map_err(SyncError::Aggregate)?;
        Ok(resolved)
    }

    /// Compile and upload every prioritized spec on a bounded pool,
    /// emitting one [`Event::JobUpload`] per spec. Returns whether the
    /// stage was cut short by cancellation.
    async fn upload_all(
        &self,
        ctx: &CancellationToken,
        project: &Project,
        artifacts: &Arc<dyn ArtifactStore>,
        specs: &[JobSpec],
        observer: Option<&dyn Observer>,
        failures: &mut AggregateError,
    ) -> bool {
        let semaphore = Arc::new(Semaphore::new(worker_pool_size()));
        let mut join_set: JoinSet<(String, Option<String>)> = JoinSet::new();
        let mut cancelled = false;

        for spec in specs {
            if ctx.is_cancelled() {
                cancelled = true;
                break;
            }
            let Ok(permit) = acquire(&semaphore).await else {
                cancelled = true;
                break;
            };
            let compiler = self.compiler.clone();
            let artifacts = artifacts.clone();
            let project = project.clone();
            let spec = spec.clone();
            join_set.spawn(async move {
                let _permit = permit;
                let name = spec.name.clone();
                let outcome = match compiler.compile(&project, &spec) {
                    Ok(job) => save_with_retry(artifacts.as_ref(), &job)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                (name, outcome.err())
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, error)) => {
                    if let Some(err) = &error {
                        failures.push(format!("failed to upload {name}: {err}"));
                    }
                    notify(observer, &Event::JobUpload { name, error });
                }
                Err(join_err) => failures.push(format!("upload task panicked: {join_err}")),
            }
        }
        cancelled
    }
}

/// Delete every artifact whose name has no live spec, emitting one
/// [`Event::JobRemoteDelete`] per deletion.
///
/// Listing failure is fatal (orphans can't be computed); per-item delete
/// failures are captured.
async fn delete_orphans(
    ctx: &CancellationToken,
    artifacts: &Arc<dyn ArtifactStore>,
    specs: &[JobSpec],
    observer: Option<&dyn Observer>,
    failures: &mut AggregateError,
) -> Result<bool> {
    let live: HashSet<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    let stored = artifacts.list_names().await?;

    let mut join_set: JoinSet<(String, Option<String>)> = JoinSet::new();
    let mut cancelled = false;
    for name in stored {
        if live.contains(name.as_str()) {
            continue;
        }
        if ctx.is_cancelled() {
            cancelled = true;
            break;
        }
        let artifacts = artifacts.clone();
        join_set.spawn(async move {
            let outcome = delete_with_retry(artifacts.as_ref(), &name).await;
            (name, outcome.err().map(|e| e.to_string()))
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((name, error)) => {
                if let Some(err) = &error {
                    failures.push(format!("failed to delete {name}: {err}"));
                }
                notify(observer, &Event::JobRemoteDelete { name, error });
            }
            Err(join_err) => failures.push(format!("orphan delete task panicked: {join_err}")),
        }
    }
    Ok(cancelled)
}

/// Save an artifact, retrying once after a short backoff.
async fn save_with_retry(store: &dyn ArtifactStore, job: &CompiledJob) -> Result<()> {
    if let Err(first) = store.save(job).await {
        tracing::warn!(job = job.name, "artifact save failed, retrying once: {first}");
        tokio::time::sleep(STORE_RETRY_BACKOFF).await;
        store.save(job).await?;
    }
    Ok(())
}

/// Delete an artifact, retrying once after a short backoff. A missing
/// artifact is reported immediately; retrying can't bring it back.
async fn delete_with_retry(store: &dyn ArtifactStore, name: &str) -> Result<()> {
    match store.delete(name).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Err(e.into()),
        Err(first) => {
            tracing::warn!(artifact = name, "artifact delete failed, retrying once: {first}");
            tokio::time::sleep(STORE_RETRY_BACKOFF).await;
            Ok(store.delete(name).await?)
        }
    }
}

/// Worker pool bound for parallel stages: one slot per CPU.
fn worker_pool_size() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

async fn acquire(semaphore: &Arc<Semaphore>) -> Result<tokio::sync::OwnedSemaphorePermit> {
    semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| SyncError::Cancelled(AggregateError::new()))
}

/// Run a synchronous store operation on the blocking pool.
async fn run_blocking<T, E, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    E: Into<SyncError> + Send + 'static,
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(Into::into),
        Err(join_err) => Err(SyncError::Internal(format!(
            "store task panicked: {join_err}"
        ))),
    }
}

fn check_cancelled(ctx: &CancellationToken, partial: AggregateError) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(SyncError::Cancelled(partial));
    }
    Ok(())
}

fn notify(observer: Option<&dyn Observer>, event: &Event) {
    if let Some(observer) = observer {
        observer.notify(event);
    }
}
