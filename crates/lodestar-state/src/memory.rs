//! In-memory store implementations.
//!
//! Shared by unit and integration tests across the workspace, and usable
//! as a scratch backend for local experimentation. Each fake also records
//! enough call history for tests to assert on interactions (delete
//! counts, saved artifacts) without a mocking framework.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use lodestar_types::{CompiledJob, InstanceRecord, JobSpec, Project, ResourceSpec, SecretItem};

use crate::error::{self, StoreError};
use crate::stores::{
    ArtifactStore, ArtifactStoreFactory, InstanceStore, ProjectStore, ResourceStore,
    ResourceStoreFactory, SecretStore, SpecStore, SpecStoreFactory,
};

fn lock<T>(mutex: &Mutex<T>) -> error::Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| StoreError::LockPoisoned)
}

/// In-memory [`SpecStore`] with a recorded delete history.
#[derive(Default)]
pub struct MemSpecStore {
    specs: Mutex<BTreeMap<String, JobSpec>>,
    deleted: Mutex<Vec<String>>,
}

impl MemSpecStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with `specs`, keyed by name.
    #[must_use]
    pub fn with_specs(specs: impl IntoIterator<Item = JobSpec>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.specs.lock().expect("fresh lock");
            for spec in specs {
                guard.insert(spec.name.clone(), spec);
            }
        }
        store
    }

    /// Names deleted so far, in call order.
    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.lock().expect("delete history lock").clone()
    }
}

impl SpecStore for MemSpecStore {
    fn all(&self) -> error::Result<Vec<JobSpec>> {
        Ok(lock(&self.specs)?.values().cloned().collect())
    }

    fn save(&self, spec: &JobSpec) -> error::Result<()> {
        lock(&self.specs)?.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn get_by_name(&self, name: &str) -> error::Result<Option<JobSpec>> {
        Ok(lock(&self.specs)?.get(name).cloned())
    }

    fn delete(&self, name: &str) -> error::Result<()> {
        if lock(&self.specs)?.remove(name).is_none() {
            return Err(StoreError::not_found("job spec", name));
        }
        lock(&self.deleted)?.push(name.to_string());
        Ok(())
    }
}

/// Factory returning the same shared [`MemSpecStore`] per project.
#[derive(Default)]
pub struct MemSpecStoreFactory {
    stores: Mutex<BTreeMap<String, Arc<MemSpecStore>>>,
}

impl MemSpecStoreFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The store handle for `project`, creating it on first use.
    pub fn store_for(&self, project: &Project) -> Arc<MemSpecStore> {
        self.stores
            .lock()
            .expect("factory lock")
            .entry(project.name.to_string())
            .or_insert_with(|| Arc::new(MemSpecStore::new()))
            .clone()
    }
}

impl SpecStoreFactory for MemSpecStoreFactory {
    fn open(&self, project: &Project) -> error::Result<Arc<dyn SpecStore>> {
        Ok(self.store_for(project))
    }
}

/// In-memory [`ArtifactStore`] with optional per-name failure injection.
#[derive(Default)]
pub struct MemArtifactStore {
    artifacts: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_saves: Mutex<BTreeMap<String, String>>,
    deleted: Mutex<Vec<String>>,
}

impl MemArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with artifact names mapping to empty contents.
    #[must_use]
    pub fn with_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.artifacts.lock().expect("fresh lock");
            for name in names {
                guard.insert(name.to_string(), Vec::new());
            }
        }
        store
    }

    /// Make every save of `name` fail with `message`.
    pub fn fail_save(&self, name: &str, message: &str) {
        self.fail_saves
            .lock()
            .expect("failure injection lock")
            .insert(name.to_string(), message.to_string());
    }

    /// Current artifact names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.artifacts
            .lock()
            .expect("artifact lock")
            .keys()
            .cloned()
            .collect()
    }

    /// Stored contents for `name`, if present.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.artifacts.lock().expect("artifact lock").get(name).cloned()
    }

    /// Names deleted so far, in call order.
    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.lock().expect("delete history lock").clone()
    }
}

#[async_trait]
impl ArtifactStore for MemArtifactStore {
    async fn list_names(&self) -> error::Result<Vec<String>> {
        Ok(lock(&self.artifacts)?.keys().cloned().collect())
    }

    async fn save(&self, job: &CompiledJob) -> error::Result<()> {
        if let Some(message) = lock(&self.fail_saves)?.get(&job.name) {
            return Err(StoreError::Io(std::io::Error::other(message.clone())));
        }
        lock(&self.artifacts)?.insert(job.name.clone(), job.contents.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> error::Result<()> {
        if lock(&self.artifacts)?.remove(name).is_none() {
            return Err(StoreError::not_found("artifact", name));
        }
        lock(&self.deleted)?.push(name.to_string());
        Ok(())
    }
}

/// Factory returning the same shared [`MemArtifactStore`] per project.
#[derive(Default)]
pub struct MemArtifactStoreFactory {
    stores: Mutex<BTreeMap<String, Arc<MemArtifactStore>>>,
}

impl MemArtifactStoreFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The store handle for `project`, creating it on first use.
    pub fn store_for(&self, project: &Project) -> Arc<MemArtifactStore> {
        self.stores
            .lock()
            .expect("factory lock")
            .entry(project.name.to_string())
            .or_insert_with(|| Arc::new(MemArtifactStore::new()))
            .clone()
    }
}

impl ArtifactStoreFactory for MemArtifactStoreFactory {
    fn open(&self, project: &Project) -> error::Result<Arc<dyn ArtifactStore>> {
        Ok(self.store_for(project))
    }
}

/// In-memory [`ProjectStore`], [`SecretStore`], and [`InstanceStore`].
#[derive(Default)]
pub struct MemRegistry {
    projects: Mutex<BTreeMap<String, Project>>,
    secrets: Mutex<BTreeMap<(String, String), SecretItem>>,
    instances: Mutex<Vec<(String, InstanceRecord)>>,
}

impl MemRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered instance records, in call order.
    pub fn instances(&self) -> Vec<(String, InstanceRecord)> {
        self.instances.lock().expect("instance lock").clone()
    }
}

impl ProjectStore for MemRegistry {
    fn save(&self, project: &Project) -> error::Result<()> {
        lock(&self.projects)?.insert(project.name.to_string(), project.clone());
        Ok(())
    }

    fn get_by_name(&self, name: &str) -> error::Result<Project> {
        lock(&self.projects)?
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("project", name))
    }

    fn all(&self) -> error::Result<Vec<Project>> {
        Ok(lock(&self.projects)?.values().cloned().collect())
    }
}

impl SecretStore for MemRegistry {
    fn save(&self, project: &Project, secret: &SecretItem) -> error::Result<()> {
        lock(&self.secrets)?.insert(
            (project.name.to_string(), secret.name.clone()),
            secret.clone(),
        );
        Ok(())
    }

    fn get_by_name(&self, project: &Project, name: &str) -> error::Result<Option<SecretItem>> {
        Ok(lock(&self.secrets)?
            .get(&(project.name.to_string(), name.to_string()))
            .cloned())
    }
}

impl InstanceStore for MemRegistry {
    fn save(&self, project: &Project, record: &InstanceRecord) -> error::Result<()> {
        lock(&self.instances)?.push((project.name.to_string(), record.clone()));
        Ok(())
    }
}

/// In-memory [`ResourceStore`] and factory.
#[derive(Default)]
pub struct MemResourceStore {
    resources: Mutex<BTreeMap<String, ResourceSpec>>,
}

impl MemResourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceStore for MemResourceStore {
    fn save(&self, spec: &ResourceSpec) -> error::Result<()> {
        lock(&self.resources)?.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn get_by_name(&self, name: &str) -> error::Result<Option<ResourceSpec>> {
        Ok(lock(&self.resources)?.get(name).cloned())
    }

    fn all(&self, datastore: &str) -> error::Result<Vec<ResourceSpec>> {
        Ok(lock(&self.resources)?
            .values()
            .filter(|spec| spec.datastore == datastore)
            .cloned()
            .collect())
    }
}

/// Factory returning the same shared [`MemResourceStore`] per project.
#[derive(Default)]
pub struct MemResourceStoreFactory {
    stores: Mutex<BTreeMap<String, Arc<MemResourceStore>>>,
}

impl MemResourceStoreFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The store handle for `project`, creating it on first use.
    pub fn store_for(&self, project: &Project) -> Arc<MemResourceStore> {
        self.stores
            .lock()
            .expect("factory lock")
            .entry(project.name.to_string())
            .or_insert_with(|| Arc::new(MemResourceStore::new()))
            .clone()
    }
}

impl ResourceStoreFactory for MemResourceStoreFactory {
    fn open(&self, project: &Project) -> error::Result<Arc<dyn ResourceStore>> {
        Ok(self.store_for(project))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use lodestar_types::{Schedule, Task};

    use super::*;

    fn spec(name: &str) -> JobSpec {
        JobSpec {
            version: 1,
            name: name.to_string(),
            owner: "lodestar".to_string(),
            schedule: Schedule {
                start_date: Utc.with_ymd_and_hms(2020, 12, 2, 0, 0, 0).unwrap(),
                end_date: None,
                interval: "@daily".to_string(),
            },
            task: Task::default(),
            assets: BTreeMap::new(),
            dependencies: BTreeMap::new(),
        }
    }

    #[test]
    fn spec_store_records_deletes() {
        let store = MemSpecStore::with_specs([spec("test-1"), spec("test-2")]);
        store.delete("test-1").unwrap();
        assert_eq!(store.deleted_names(), ["test-1"]);
        assert!(store.delete("test-1").unwrap_err().is_not_found());
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn artifact_store_failure_injection() {
        let store = MemArtifactStore::new();
        store.fail_save("poisoned", "disk full");

        let ok = CompiledJob {
            name: "test".into(),
            contents: b"x".to_vec(),
        };
        store.save(&ok).await.unwrap();

        let bad = CompiledJob {
            name: "poisoned".into(),
            contents: b"y".to_vec(),
        };
        let err = store.save(&bad).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(store.names(), ["test"]);
    }

    #[test]
    fn factories_share_state_per_project() {
        let factory = MemSpecStoreFactory::new();
        let project = Project::new("proj").unwrap();

        let first = factory.open(&project).unwrap();
        first.save(&spec("test")).unwrap();

        let second = factory.open(&project).unwrap();
        assert_eq!(second.all().unwrap().len(), 1);
    }
}
