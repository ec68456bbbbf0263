//! Resource sync engine: validation, persistence, and materialization of
//! datastore resources across registered drivers.

use std::sync::Arc;

use lodestar_state::ResourceStoreFactory;
use lodestar_types::{AggregateError, Event, Observer, Project, ResourceSpec};
use tokio_util::sync::CancellationToken;

use crate::errors::{ResourceError, Result};
use crate::DatastoreRegistry;

/// Whether a batch materializes new resources or updates existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Apply {
    Create,
    Update,
}

/// Orchestrates resource batches against the driver registry.
///
/// Batches continue past individual failures; every per-item error is
/// captured and surfaced in one aggregate at the end.
pub struct ResourceService {
    registry: Arc<DatastoreRegistry>,
    store_factory: Arc<dyn ResourceStoreFactory>,
}

impl ResourceService {
    #[must_use]
    pub fn new(
        registry: Arc<DatastoreRegistry>,
        store_factory: Arc<dyn ResourceStoreFactory>,
    ) -> Self {
        Self {
            registry,
            store_factory,
        }
    }

    /// Materialize a batch of new resources, emitting one
    /// [`Event::ResourceUpdated`] per spec.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Aggregate`] with every per-item failure;
    /// [`ResourceError::Cancelled`] when `ctx` fires mid-batch.
    pub async fn create_resource(
        &self,
        ctx: &CancellationToken,
        project: &Project,
        specs: &[ResourceSpec],
        observer: Option<&dyn Observer>,
    ) -> Result<()> {
        self.apply_batch(ctx, project, specs, observer, Apply::Create)
            .await
    }

    /// Update a batch of existing resources, emitting one
    /// [`Event::ResourceUpdated`] per spec.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Aggregate`] with every per-item failure;
    /// [`ResourceError::Cancelled`] when `ctx` fires mid-batch.
    pub async fn update_resource(
        &self,
        ctx: &CancellationToken,
        project: &Project,
        specs: &[ResourceSpec],
        observer: Option<&dyn Observer>,
    ) -> Result<()> {
        self.apply_batch(ctx, project, specs, observer, Apply::Update)
            .await
    }

    /// Fetch one persisted resource spec.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotFound`] for unknown datastores or names.
    pub fn read_resource(
        &self,
        project: &Project,
        datastore_name: &str,
        name: &str,
    ) -> Result<ResourceSpec> {
        self.registry.get(datastore_name)?;
        let store = self.store_factory.open(project)?;
        store
            .get_by_name(name)?
            .ok_or_else(|| ResourceError::not_found("resource", name))
    }

    /// Every persisted resource spec for one datastore.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotFound`] for unknown datastores,
    /// [`ResourceError::Store`] on storage failure.
    pub fn get_all(&self, project: &Project, datastore_name: &str) -> Result<Vec<ResourceSpec>> {
        self.registry.get(datastore_name)?;
        let store = self.store_factory.open(project)?;
        Ok(store.all(datastore_name)?)
    }

    /// Parse a wire message through the adapter of the driver it names.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotFound`] for unknown datastores,
    /// [`ResourceError::Adapter`] on malformed payloads.
    pub fn from_wire(&self, wire: &lodestar_types::ResourceWire) -> Result<ResourceSpec> {
        self.registry.get(&wire.datastore)?.adapter().from_wire(wire)
    }

    /// Render a spec through the adapter of the driver it names.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotFound`] for unknown datastores,
    /// [`ResourceError::Adapter`] on malformed payloads.
    pub fn to_wire(&self, spec: &ResourceSpec) -> Result<lodestar_types::ResourceWire> {
        self.registry.get(&spec.datastore)?.adapter().to_wire(spec)
    }

    async fn apply_batch(
        &self,
        ctx: &CancellationToken,
        project: &Project,
        specs: &[ResourceSpec],
        observer: Option<&dyn Observer>,
        mode: Apply,
    ) -> Result<()> {
        let store = self.store_factory.open(project)?;
        let mut failures = AggregateError::new();

        for spec in specs {
            if ctx.is_cancelled() {
                return Err(ResourceError::Cancelled);
            }

            let outcome = self.apply_one(project, store.as_ref(), spec, mode).await;
            let error = outcome.err().map(|e| e.to_string());
            if let Some(err) = &error {
                failures.push(format!("failed to sync {}: {err}", spec.name));
            }
            if let Some(observer) = observer {
                observer.notify(&Event::ResourceUpdated {
                    spec: spec.clone(),
                    error,
                });
            }
        }

        failures.into_result().map_err(ResourceError::Aggregate)
    }

    async fn apply_one(
        &self,
        project: &Project,
        store: &dyn lodestar_state::ResourceStore,
        spec: &ResourceSpec,
        mode: Apply,
    ) -> Result<()> {
        let driver = self.registry.get(&spec.datastore)?;
        driver.validate(spec)?;

        let mut spec = spec.clone();
        if mode == Apply::Create {
            for (key, value) in driver.default_assets() {
                spec.assets.entry(key).or_insert(value);
            }
        }

        store.save(&spec)?;
        match mode {
            Apply::Create => driver.create(project, &spec).await,
            Apply::Update => driver.update(project, &spec).await,
        }
    }
}
