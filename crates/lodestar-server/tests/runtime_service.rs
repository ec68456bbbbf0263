//! Boundary-operation scenarios over in-memory stores.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use lodestar_datastore::warehouse::{testing::MemDatasetBackend, WarehouseDatastore, WAREHOUSE};
use lodestar_datastore::{DatastoreRegistry, ResourceService};
use lodestar_engine::scheduler::testing::FixedScheduler;
use lodestar_engine::{
    DependencyResolver, InstanceService, JobService, ManifestCompiler, PriorityResolver,
};
use lodestar_server::{
    DeployAck, JobSpecWire, ProjectWire, RuntimeService, StatusCode, TaskWire,
};
use lodestar_state::memory::{
    MemArtifactStoreFactory, MemRegistry, MemResourceStoreFactory, MemSpecStoreFactory,
};
use lodestar_state::{ArtifactStore, ProjectStore};
use lodestar_types::{ResourceWire, TaskWindow};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Harness {
    service: RuntimeService,
    registry: Arc<MemRegistry>,
    artifact_factory: Arc<MemArtifactStoreFactory>,
    backend: Arc<MemDatasetBackend>,
}

fn harness() -> Harness {
    let spec_factory = Arc::new(MemSpecStoreFactory::new());
    let artifact_factory = Arc::new(MemArtifactStoreFactory::new());
    let registry = Arc::new(MemRegistry::new());
    let backend = Arc::new(MemDatasetBackend::new());

    let jobs = Arc::new(JobService::new(
        spec_factory,
        artifact_factory.clone(),
        Arc::new(ManifestCompiler::new()),
        Arc::new(DependencyResolver::new()),
        PriorityResolver::new(),
        None,
    ));

    let mut drivers = DatastoreRegistry::new();
    drivers.add(Arc::new(WarehouseDatastore::new(backend.clone())));
    let resources = Arc::new(ResourceService::new(
        Arc::new(drivers),
        Arc::new(MemResourceStoreFactory::new()),
    ));

    let scheduler = Arc::new(FixedScheduler::with_runs(vec![(
        "success",
        Utc.with_ymd_and_hms(2021, 2, 25, 6, 0, 0).unwrap(),
    )]));

    let service = RuntimeService::new(
        "0.3.1",
        jobs,
        resources,
        registry.clone(),
        registry.clone(),
        Arc::new(InstanceService::new(registry.clone())),
        scheduler,
        None,
    );

    Harness {
        service,
        registry,
        artifact_factory,
        backend,
    }
}

fn job_wire(name: &str) -> JobSpecWire {
    JobSpecWire {
        version: 1,
        name: name.to_string(),
        owner: "lodestar".to_string(),
        start_date: "2020-12-02".to_string(),
        end_date: None,
        interval: "@daily".to_string(),
        task: TaskWire {
            name: "bq2bq".to_string(),
            config: BTreeMap::new(),
            window: TaskWindow::default(),
        },
        assets: BTreeMap::new(),
        dependencies: Vec::new(),
    }
}

fn resource_wire(name: &str) -> ResourceWire {
    ResourceWire {
        version: 1,
        name: name.to_string(),
        datastore: WAREHOUSE.to_string(),
        kind: "dataset".to_string(),
        spec: serde_json::json!({"location": "EU"}),
        assets: BTreeMap::new(),
        labels: BTreeMap::new(),
    }
}

fn register_proj(h: &Harness) {
    h.service
        .register_project(&ProjectWire {
            name: "proj".to_string(),
            config: BTreeMap::new(),
        })
        .unwrap();
}

fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

#[tokio::test(flavor = "multi_thread")]
async fn deploy_streams_acks_and_orphan_notices() {
    let h = harness();
    register_proj(&h);

    // A leftover artifact from a previous deploy becomes an orphan.
    let project = h.registry.get_by_name("proj").unwrap();
    h.artifact_factory
        .store_for(&project)
        .save(&lodestar_types::CompiledJob {
            name: "stale".to_string(),
            contents: Vec::new(),
        })
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    h.service
        .deploy_job_specification(
            &CancellationToken::new(),
            "proj",
            vec![job_wire("test"), job_wire("test-2")],
            tx,
        )
        .await
        .unwrap();

    let acks: Vec<DeployAck> = drain(&mut rx);
    let uploads: Vec<&DeployAck> = acks.iter().filter(|a| a.ack).collect();
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().all(|a| a.success));

    let notices: Vec<&DeployAck> = acks.iter().filter(|a| !a.ack).collect();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].job_name, "stale");

    assert_eq!(
        h.artifact_factory.store_for(&project).names(),
        ["test", "test-2"]
    );
}

#[tokio::test]
async fn deploy_drops_jobs_missing_from_the_submitted_set() {
    let h = harness();
    register_proj(&h);

    let ctx = CancellationToken::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    h.service
        .deploy_job_specification(&ctx, "proj", vec![job_wire("test"), job_wire("old")], tx)
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    h.service
        .deploy_job_specification(&ctx, "proj", vec![job_wire("test")], tx)
        .await
        .unwrap();

    let listed = h.service.list_job_specification("proj").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "test");

    // One spec-delete notice and one artifact orphan notice for "old".
    let notices = drain(&mut rx)
        .into_iter()
        .filter(|a| !a.ack && a.job_name == "old")
        .count();
    assert_eq!(notices, 2);
}

#[tokio::test]
async fn deploy_unknown_project_is_not_found() {
    let h = harness();
    let (tx, _rx) = mpsc::unbounded_channel();
    let status = h
        .service
        .deploy_job_specification(&CancellationToken::new(), "ghost", vec![], tx)
        .await
        .unwrap_err();
    assert_eq!(status.code, StatusCode::NotFound);
}

#[tokio::test]
async fn deploy_invalid_interval_fails_precondition() {
    let h = harness();
    register_proj(&h);

    let mut bad = job_wire("test");
    bad.interval = "whenever".to_string();
    let (tx, _rx) = mpsc::unbounded_channel();
    let status = h
        .service
        .deploy_job_specification(&CancellationToken::new(), "proj", vec![bad], tx)
        .await
        .unwrap_err();
    assert_eq!(status.code, StatusCode::FailedPrecondition);
}

#[tokio::test]
async fn dump_returns_rendered_manifest() {
    let h = harness();
    register_proj(&h);
    let (tx, _rx) = mpsc::unbounded_channel();
    h.service
        .deploy_job_specification(&CancellationToken::new(), "proj", vec![job_wire("test")], tx)
        .await
        .unwrap();

    let dump = h.service.dump_job_specification("proj", "test").await.unwrap();
    assert!(dump.success);
    assert!(dump.content.contains("name: test"));
    assert!(dump.content.contains("priority: 10000"));

    let status = h
        .service
        .dump_job_specification("proj", "ghost")
        .await
        .unwrap_err();
    assert_eq!(status.code, StatusCode::NotFound);
}

#[tokio::test]
async fn window_requires_all_three_parameters() {
    let h = harness();
    let scheduled = Utc.with_ymd_and_hms(2021, 2, 25, 6, 0, 0).unwrap();

    for (size, offset, truncate) in [("", "0", "d"), ("24h", "", "d"), ("24h", "0", "")] {
        let status = h
            .service
            .get_window(scheduled, size, offset, truncate)
            .unwrap_err();
        assert_eq!(status.code, StatusCode::FailedPrecondition);
    }

    let window = h.service.get_window(scheduled, "24h", "0", "d").unwrap();
    assert_eq!(window.end, Utc.with_ymd_and_hms(2021, 2, 25, 0, 0, 0).unwrap());
    assert_eq!(window.start, Utc.with_ymd_and_hms(2021, 2, 24, 0, 0, 0).unwrap());
}

#[tokio::test]
async fn secret_round_trips_through_base64() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    let h = harness();
    register_proj(&h);

    let status = h.service.register_secret("proj", "key", "").unwrap_err();
    assert_eq!(status.code, StatusCode::Internal);

    let encoded_empty = STANDARD.encode("");
    let status = h
        .service
        .register_secret("proj", "key", &encoded_empty)
        .unwrap_err();
    assert_eq!(status.code, StatusCode::Internal);

    let encoded = STANDARD.encode("hunter2");
    h.service.register_secret("proj", "key", &encoded).unwrap();

    let project = h.registry.get_by_name("proj").unwrap();
    let stored = lodestar_state::SecretStore::get_by_name(h.registry.as_ref(), &project, "key")
        .unwrap()
        .unwrap();
    assert_eq!(stored.value, "hunter2");
}

#[tokio::test]
async fn instance_registration_and_job_status() {
    let h = harness();
    register_proj(&h);
    let (tx, _rx) = mpsc::unbounded_channel();
    h.service
        .deploy_job_specification(&CancellationToken::new(), "proj", vec![job_wire("test")], tx)
        .await
        .unwrap();

    let scheduled = Utc.with_ymd_and_hms(2021, 2, 25, 6, 0, 0).unwrap();
    let registered = h
        .service
        .register_instance("proj", "test", scheduled, "task")
        .await
        .unwrap();
    assert_eq!(registered.job.name, "test");
    assert_eq!(registered.instance.scheduled_at, scheduled);

    let status = h
        .service
        .register_instance("proj", "test", scheduled, "sensor")
        .await
        .unwrap_err();
    assert_eq!(status.code, StatusCode::FailedPrecondition);

    let statuses = h.service.job_status("proj", "test").await.unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, "success");
}

#[tokio::test]
async fn resource_deploy_streams_acks() {
    let h = harness();
    register_proj(&h);
    let ctx = CancellationToken::new();

    h.service
        .create_resource(&ctx, "proj", &resource_wire("analytics.events"))
        .await
        .unwrap();
    assert_eq!(h.backend.dataset_keys(), ["analytics.events"]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    h.service
        .deploy_resource_specification(
            &ctx,
            "proj",
            vec![resource_wire("analytics.events")],
            tx,
        )
        .await
        .unwrap();

    let acks = drain(&mut rx);
    assert_eq!(acks.len(), 1);
    assert!(acks[0].success && acks[0].ack);
    assert_eq!(acks[0].resource_name, "analytics.events");

    let listed = h
        .service
        .list_resource_specification("proj", WAREHOUSE)
        .unwrap();
    assert_eq!(listed.len(), 1);

    let read = h
        .service
        .read_resource("proj", WAREHOUSE, "analytics.events")
        .unwrap();
    assert_eq!(read.spec["location"], "EU");
}

#[tokio::test]
async fn resource_with_bad_name_fails_precondition() {
    let h = harness();
    register_proj(&h);

    let status = h
        .service
        .create_resource(
            &CancellationToken::new(),
            "proj",
            &resource_wire("not-a-dataset"),
        )
        .await
        .unwrap_err();
    assert_eq!(status.code, StatusCode::FailedPrecondition);
}

#[tokio::test]
async fn list_projects_reflects_registrations() {
    let h = harness();
    assert!(h.service.list_projects().unwrap().is_empty());
    register_proj(&h);
    let projects = h.service.list_projects().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "proj");
    assert_eq!(h.service.version(), "0.3.1");
}
