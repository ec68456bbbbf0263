//! Command implementations over a locally-wired runtime service.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use lodestar_datastore::warehouse::{testing::MemDatasetBackend, WarehouseDatastore};
use lodestar_datastore::{DatastoreRegistry, ResourceService};
use lodestar_engine::scheduler::testing::FixedScheduler;
use lodestar_engine::{
    DependencyResolver, InstanceService, JobService, ManifestCompiler, PriorityResolver,
};
use lodestar_server::{DeployAck, JobSpecWire, ProjectWire, RpcStatus, RuntimeService};
use lodestar_state::fs::FsArtifactRoot;
use lodestar_state::memory::MemResourceStoreFactory;
use lodestar_state::SqliteWorkspace;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Wire a [`RuntimeService`] over the local workspace database and
/// artifact directory.
///
/// Resource materialization runs against an in-process warehouse backend;
/// pointing it at a real warehouse is deployment configuration, not CLI
/// concern.
pub fn build_service(db: &Path, artifacts_dir: &Path) -> Result<RuntimeService> {
    let workspace = SqliteWorkspace::open(db)
        .with_context(|| format!("failed to open workspace database {}", db.display()))?;
    let workspace = Arc::new(workspace);

    let jobs = Arc::new(JobService::new(
        workspace.clone(),
        Arc::new(FsArtifactRoot::new(artifacts_dir)),
        Arc::new(ManifestCompiler::new()),
        Arc::new(DependencyResolver::with_registry(
            workspace.clone(),
            workspace.clone(),
        )),
        PriorityResolver::new(),
        None,
    ));

    let mut drivers = DatastoreRegistry::new();
    drivers.add(Arc::new(WarehouseDatastore::new(Arc::new(
        MemDatasetBackend::new(),
    ))));
    let resources = Arc::new(ResourceService::new(
        Arc::new(drivers),
        Arc::new(MemResourceStoreFactory::new()),
    ));

    Ok(RuntimeService::new(
        env!("CARGO_PKG_VERSION"),
        jobs,
        resources,
        workspace.clone(),
        workspace.clone(),
        Arc::new(InstanceService::new(workspace)),
        Arc::new(FixedScheduler::default()),
        None,
    ))
}

pub fn register_project(service: &RuntimeService, name: &str) -> Result<()> {
    let ack = service
        .register_project(&ProjectWire {
            name: name.to_string(),
            config: BTreeMap::new(),
        })
        .map_err(status_err)?;
    println!("{}", ack.message);
    Ok(())
}

pub fn list_projects(service: &RuntimeService) -> Result<()> {
    for project in service.list_projects().map_err(status_err)? {
        println!("{}", project.name);
    }
    Ok(())
}

pub async fn deploy(service: &RuntimeService, project: &str, path: &Path) -> Result<()> {
    let jobs = load_job_specs(path)?;
    if jobs.is_empty() {
        bail!("no job specs found under {}", path.display());
    }
    tracing::info!(project, jobs = jobs.len(), "deploying job specifications");

    let (tx, mut rx) = mpsc::unbounded_channel::<DeployAck>();
    let printer = tokio::spawn(async move {
        while let Some(ack) = rx.recv().await {
            let mark = if ack.success { "ok" } else { "failed" };
            if ack.message.is_empty() {
                println!("[{mark}] {}", ack.job_name);
            } else {
                println!("[{mark}] {}: {}", ack.job_name, ack.message);
            }
        }
    });

    let outcome = service
        .deploy_job_specification(&CancellationToken::new(), project, jobs, tx)
        .await;
    printer.await.ok();
    outcome.map_err(status_err)
}

pub async fn list(service: &RuntimeService, project: &str) -> Result<()> {
    for job in service
        .list_job_specification(project)
        .await
        .map_err(status_err)?
    {
        println!("{} ({})", job.name, job.interval);
    }
    Ok(())
}

pub async fn dump(service: &RuntimeService, project: &str, job: &str) -> Result<()> {
    let dump = service
        .dump_job_specification(project, job)
        .await
        .map_err(status_err)?;
    print!("{}", dump.content);
    Ok(())
}

fn load_job_specs(path: &Path) -> Result<Vec<JobSpecWire>> {
    let mut jobs = Vec::new();
    let entries = std::fs::read_dir(path)
        .with_context(|| format!("failed to read spec directory {}", path.display()))?;
    for entry in entries {
        let entry = entry?;
        let file = entry.path();
        let extension = file.extension().and_then(|ext| ext.to_str());
        if !matches!(extension, Some("yaml" | "yml")) {
            continue;
        }
        let content = std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let job: JobSpecWire = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse job spec {}", file.display()))?;
        jobs.push(job);
    }
    jobs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(jobs)
}

fn status_err(status: RpcStatus) -> anyhow::Error {
    anyhow::anyhow!("{status}")
}
