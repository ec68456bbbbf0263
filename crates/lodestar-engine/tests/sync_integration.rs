//! End-to-end scenarios for the job sync engine against in-memory stores.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use lodestar_engine::{
    DependencyResolver, JobService, ManifestCompiler, MetadataPublisher, PriorityResolver,
    SyncError,
};
use lodestar_state::memory::{MemArtifactStoreFactory, MemSpecStoreFactory};
use lodestar_state::{ArtifactStore, SpecStore};
use lodestar_types::progress::testing::RecordingObserver;
use lodestar_types::{Event, JobDependency, JobSpec, Project, Schedule, Task};
use tokio_util::sync::CancellationToken;

fn job_spec(name: &str) -> JobSpec {
    JobSpec {
        version: 1,
        name: name.to_string(),
        owner: "lodestar".to_string(),
        schedule: Schedule {
            start_date: Utc.with_ymd_and_hms(2020, 12, 2, 0, 0, 0).unwrap(),
            end_date: None,
            interval: "@daily".to_string(),
        },
        task: Task {
            kind: "bq2bq".to_string(),
            ..Task::default()
        },
        assets: BTreeMap::new(),
        dependencies: BTreeMap::new(),
    }
}

fn with_dependency(mut spec: JobSpec, upstream: &str) -> JobSpec {
    spec.dependencies
        .insert(upstream.to_string(), JobDependency::default());
    spec
}

struct Harness {
    service: JobService,
    spec_factory: Arc<MemSpecStoreFactory>,
    artifact_factory: Arc<MemArtifactStoreFactory>,
    project: Project,
}

impl Harness {
    fn new() -> Self {
        let spec_factory = Arc::new(MemSpecStoreFactory::new());
        let artifact_factory = Arc::new(MemArtifactStoreFactory::new());
        let service = JobService::new(
            spec_factory.clone(),
            artifact_factory.clone(),
            Arc::new(ManifestCompiler::new()),
            Arc::new(DependencyResolver::new()),
            PriorityResolver::new(),
            None,
        );
        Self {
            service,
            spec_factory,
            artifact_factory,
            project: Project::new("proj").unwrap(),
        }
    }

    fn seed_specs(&self, specs: impl IntoIterator<Item = JobSpec>) {
        let store = self.spec_factory.store_for(&self.project);
        for spec in specs {
            store.save(&spec).unwrap();
        }
    }

    async fn seed_artifacts(&self, names: &[&str]) {
        let store = self.artifact_factory.store_for(&self.project);
        for name in names {
            store
                .save(&lodestar_types::CompiledJob {
                    name: (*name).to_string(),
                    contents: Vec::new(),
                })
                .await
                .unwrap();
        }
    }
}

fn upload_events(events: &[Event]) -> Vec<(&str, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::JobUpload { name, error } => Some((name.as_str(), error.is_none())),
            _ => None,
        })
        .collect()
}

fn delete_events(events: &[Event]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::JobRemoteDelete { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn fresh_deploy_uploads_single_job() {
    let h = Harness::new();
    h.service
        .create(&job_spec("test"), &h.project)
        .await
        .unwrap();

    let observer = Arc::new(RecordingObserver::new());
    h.service
        .sync(&CancellationToken::new(), &h.project, Some(observer.clone()))
        .await
        .unwrap();

    let artifacts = h.artifact_factory.store_for(&h.project);
    assert_eq!(artifacts.names(), ["test"]);

    let manifest = String::from_utf8(artifacts.contents("test").unwrap()).unwrap();
    assert!(manifest.contains("priority: 10000"));

    let events = observer.events();
    assert_eq!(upload_events(&events), [("test", true)]);
    assert!(delete_events(&events).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn orphaned_artifacts_are_deleted() {
    let h = Harness::new();
    h.seed_specs([job_spec("test")]);
    h.seed_artifacts(&["test", "test2"]).await;

    let observer = Arc::new(RecordingObserver::new());
    h.service
        .sync(&CancellationToken::new(), &h.project, Some(observer.clone()))
        .await
        .unwrap();

    let artifacts = h.artifact_factory.store_for(&h.project);
    assert_eq!(artifacts.names(), ["test"]);
    assert_eq!(artifacts.deleted_names(), ["test2"]);

    let events = observer.events();
    assert_eq!(upload_events(&events), [("test", true)]);
    assert_eq!(delete_events(&events), ["test2"]);
}

#[tokio::test]
async fn dependency_failures_are_batched() {
    let h = Harness::new();
    h.seed_specs([
        with_dependency(job_spec("test"), "ghost-a"),
        with_dependency(job_spec("test-2"), "ghost-b"),
    ]);
    h.seed_artifacts(&["untouched"]).await;

    let observer = Arc::new(RecordingObserver::new());
    let err = h
        .service
        .sync(&CancellationToken::new(), &h.project, Some(observer.clone()))
        .await
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("2 errors occurred:"), "got: {msg}");
    assert!(msg.contains("ghost-a"));
    assert!(msg.contains("ghost-b"));

    // Compilation never ran; the store is untouched.
    let artifacts = h.artifact_factory.store_for(&h.project);
    assert_eq!(artifacts.names(), ["untouched"]);

    let unknown: Vec<_> = observer
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::JobUnknownDependencyUsed { .. }))
        .collect();
    assert_eq!(unknown.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_spec_set_deletes_every_artifact() {
    let h = Harness::new();
    h.seed_artifacts(&["test", "test2"]).await;

    let observer = Arc::new(RecordingObserver::new());
    h.service
        .sync(&CancellationToken::new(), &h.project, Some(observer.clone()))
        .await
        .unwrap();

    let artifacts = h.artifact_factory.store_for(&h.project);
    assert!(artifacts.names().is_empty());

    let mut deleted = delete_events(&observer.events())
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    deleted.sort();
    assert_eq!(deleted, ["test", "test2"]);
}

#[tokio::test]
async fn poisoned_job_does_not_block_the_batch() {
    let h = Harness::new();
    h.seed_specs([job_spec("healthy"), job_spec("poisoned")]);
    h.artifact_factory
        .store_for(&h.project)
        .fail_save("poisoned", "disk full");

    let observer = Arc::new(RecordingObserver::new());
    let err = h
        .service
        .sync(&CancellationToken::new(), &h.project, Some(observer.clone()))
        .await
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("1 errors occurred:"), "got: {msg}");
    assert!(msg.contains("poisoned"));

    // The healthy job still made it through.
    let artifacts = h.artifact_factory.store_for(&h.project);
    assert_eq!(artifacts.names(), ["healthy"]);

    let events = observer.events();
    let mut uploads = upload_events(&events);
    uploads.sort_unstable();
    assert_eq!(uploads, [("healthy", true), ("poisoned", false)]);
}

#[tokio::test]
async fn cycle_aborts_before_compilation() {
    let h = Harness::new();
    h.seed_specs([
        with_dependency(job_spec("test"), "test-2"),
        with_dependency(job_spec("test-2"), "test"),
    ]);

    let err = h
        .service
        .sync(&CancellationToken::new(), &h.project, None)
        .await
        .unwrap_err();
    match err {
        SyncError::Cycle { nodes } => {
            assert_eq!(nodes, vec!["test".to_string(), "test-2".to_string()]);
        }
        other => panic!("expected cycle error, got {other}"),
    }

    assert!(h.artifact_factory.store_for(&h.project).names().is_empty());
}

#[tokio::test]
async fn keep_only_deletes_the_rest_and_is_idempotent() {
    let h = Harness::new();
    h.seed_specs([job_spec("test-1"), job_spec("test-2")]);

    let observer = Arc::new(RecordingObserver::new());
    h.service
        .keep_only(&h.project, &[job_spec("test-2")], Some(observer.clone()))
        .await
        .unwrap();

    let store = h.spec_factory.store_for(&h.project);
    assert_eq!(store.deleted_names(), ["test-1"]);
    let remaining: Vec<String> = store.all().unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(remaining, ["test-2"]);
    assert_eq!(delete_events(&observer.events()), ["test-1"]);

    // Second application: same state, no new events.
    let observer2 = Arc::new(RecordingObserver::new());
    h.service
        .keep_only(&h.project, &[job_spec("test-2")], Some(observer2.clone()))
        .await
        .unwrap();
    assert_eq!(store.deleted_names(), ["test-1"]);
    assert!(observer2.events().is_empty());
}

#[tokio::test]
async fn dump_compiles_without_writing() {
    let h = Harness::new();
    h.seed_specs([job_spec("test")]);

    let compiled = h.service.dump(&h.project, &job_spec("test")).await.unwrap();
    assert_eq!(compiled.name, "test");
    let rendered = String::from_utf8(compiled.contents).unwrap();
    assert!(rendered.contains("priority: 10000"));

    assert!(h.artifact_factory.store_for(&h.project).names().is_empty());
}

#[tokio::test]
async fn dump_of_unknown_spec_is_not_found() {
    let h = Harness::new();
    let err = h
        .service
        .dump(&h.project, &job_spec("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound { .. }));
}

#[tokio::test]
async fn cancelled_context_stops_the_run() {
    let h = Harness::new();
    h.seed_specs([job_spec("test")]);
    h.seed_artifacts(&["orphan"]).await;

    let ctx = CancellationToken::new();
    ctx.cancel();
    let err = h.service.sync(&ctx, &h.project, None).await.unwrap_err();
    assert!(matches!(err, SyncError::Cancelled(_)));

    // Nothing was uploaded or deleted.
    let artifacts = h.artifact_factory.store_for(&h.project);
    assert_eq!(artifacts.names(), ["orphan"]);
}

#[tokio::test]
async fn create_rejects_invalid_specs() {
    let h = Harness::new();
    let mut bad = job_spec("test");
    bad.schedule.interval = "whenever".to_string();
    let err = h.service.create(&bad, &h.project).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    assert!(h.spec_factory.store_for(&h.project).all().unwrap().is_empty());
}

#[tokio::test]
async fn get_by_name_and_get_all() {
    let h = Harness::new();
    h.seed_specs([job_spec("test-1"), job_spec("test-2")]);

    let got = h.service.get_by_name("test-1", &h.project).await.unwrap();
    assert_eq!(got.name, "test-1");

    let err = h.service.get_by_name("ghost", &h.project).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound { .. }));

    assert_eq!(h.service.get_all(&h.project).await.unwrap().len(), 2);
}

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<(String, i32)>)>>,
}

impl MetadataPublisher for RecordingPublisher {
    fn publish(
        &self,
        project: &Project,
        specs: &[JobSpec],
    ) -> Result<(), SyncError> {
        self.published.lock().unwrap().push((
            project.name.to_string(),
            specs
                .iter()
                .map(|s| (s.name.clone(), s.task.priority))
                .collect(),
        ));
        Ok(())
    }
}

#[tokio::test]
async fn metadata_publisher_sees_post_priority_specs() {
    let spec_factory = Arc::new(MemSpecStoreFactory::new());
    let artifact_factory = Arc::new(MemArtifactStoreFactory::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let service = JobService::new(
        spec_factory.clone(),
        artifact_factory,
        Arc::new(ManifestCompiler::new()),
        Arc::new(DependencyResolver::new()),
        PriorityResolver::new(),
        Some(publisher.clone()),
    );
    let project = Project::new("proj").unwrap();
    spec_factory.store_for(&project).save(&job_spec("test")).unwrap();

    service
        .sync(&CancellationToken::new(), &project, None)
        .await
        .unwrap();

    let published = publisher.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "proj");
    assert_eq!(published[0].1, [("test".to_string(), 10_000)]);
}

#[tokio::test]
async fn repeated_sync_converges() {
    let h = Harness::new();
    h.seed_specs([job_spec("test")]);

    let ctx = CancellationToken::new();
    h.service.sync(&ctx, &h.project, None).await.unwrap();
    let first = h.artifact_factory.store_for(&h.project).contents("test");

    let observer = Arc::new(RecordingObserver::new());
    h.service
        .sync(&ctx, &h.project, Some(observer.clone()))
        .await
        .unwrap();
    let second = h.artifact_factory.store_for(&h.project).contents("test");

    assert_eq!(first, second);
    // Re-upload is acked, but nothing is deleted on a converged store.
    assert_eq!(upload_events(&observer.events()), [("test", true)]);
    assert!(delete_events(&observer.events()).is_empty());
}
