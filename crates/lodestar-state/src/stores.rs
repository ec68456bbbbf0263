//! Store trait definitions.
//!
//! These traits are the seams between the sync engines and their backing
//! storage. Spec-side stores are synchronous (local database access, run
//! on blocking threads by the engines); the artifact store is asynchronous
//! because it fronts the external scheduler's storage.

use std::sync::Arc;

use async_trait::async_trait;
use lodestar_types::{CompiledJob, InstanceRecord, JobSpec, Project, ResourceSpec, SecretItem};

use crate::error;

/// Per-project persistence of raw job specifications.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn SpecStore>`.
pub trait SpecStore: Send + Sync {
    /// Enumerate every spec in the project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn all(&self) -> error::Result<Vec<JobSpec>>;

    /// Insert or overwrite a spec, keyed by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn save(&self, spec: &JobSpec) -> error::Result<()>;

    /// Fetch one spec by name. `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn get_by_name(&self, name: &str) -> error::Result<Option<JobSpec>>;

    /// Delete one spec by name. Deleting an absent name is an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure or
    /// when the name is unknown.
    fn delete(&self, name: &str) -> error::Result<()>;
}

/// Request-scoped constructor for [`SpecStore`] handles.
///
/// The engines acquire a handle per call and release it on every exit
/// path; nothing is cached across calls.
pub trait SpecStoreFactory: Send + Sync {
    /// Open a handle onto `project`'s spec storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) when storage can't be
    /// reached.
    fn open(&self, project: &Project) -> error::Result<Arc<dyn SpecStore>>;
}

/// Per-project persistence of compiled artifacts, durable under the
/// external scheduler's view.
///
/// Saves with distinct names must be safe to issue concurrently. Storage
/// is idempotent-by-name: re-uploading an artifact replaces it.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Names of every artifact currently stored for the project.
    async fn list_names(&self) -> error::Result<Vec<String>>;

    /// Write an artifact, overwriting any previous content under its name.
    async fn save(&self, job: &CompiledJob) -> error::Result<()>;

    /// Remove the artifact stored under `name`.
    async fn delete(&self, name: &str) -> error::Result<()>;
}

/// Request-scoped constructor for [`ArtifactStore`] handles.
pub trait ArtifactStoreFactory: Send + Sync {
    /// Open a handle onto `project`'s artifact storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) when storage can't be
    /// reached.
    fn open(&self, project: &Project) -> error::Result<Arc<dyn ArtifactStore>>;
}

/// Registry of projects known to the control plane.
pub trait ProjectStore: Send + Sync {
    /// Insert or overwrite a project, keyed by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn save(&self, project: &Project) -> error::Result<()>;

    /// Fetch a project by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) for
    /// unknown names.
    fn get_by_name(&self, name: &str) -> error::Result<Project>;

    /// Every registered project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn all(&self) -> error::Result<Vec<Project>>;
}

/// Per-project secret storage. Values arrive already decoded.
pub trait SecretStore: Send + Sync {
    /// Insert or overwrite a secret, keyed by name within the project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn save(&self, project: &Project, secret: &SecretItem) -> error::Result<()>;

    /// Fetch a secret by name. `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn get_by_name(&self, project: &Project, name: &str) -> error::Result<Option<SecretItem>>;
}

/// Per-project persistence of resource specifications.
pub trait ResourceStore: Send + Sync {
    /// Insert or overwrite a resource spec, keyed by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn save(&self, spec: &ResourceSpec) -> error::Result<()>;

    /// Fetch one resource spec by name. `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn get_by_name(&self, name: &str) -> error::Result<Option<ResourceSpec>>;

    /// Every resource spec for one datastore.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn all(&self, datastore: &str) -> error::Result<Vec<ResourceSpec>>;
}

/// Request-scoped constructor for [`ResourceStore`] handles.
pub trait ResourceStoreFactory: Send + Sync {
    /// Open a handle onto `project`'s resource storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) when storage can't be
    /// reached.
    fn open(&self, project: &Project) -> error::Result<Arc<dyn ResourceStore>>;
}

/// Per-project persistence of execution-instance records.
pub trait InstanceStore: Send + Sync {
    /// Append an instance record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn save(&self, project: &Project, record: &InstanceRecord) -> error::Result<()>;
}
