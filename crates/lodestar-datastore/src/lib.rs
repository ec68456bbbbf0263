//! Resource sync engine for the Lodestar control plane.
//!
//! Datastore resources (warehouse datasets and the like) are validated,
//! persisted, and materialized through pluggable drivers selected by the
//! spec's `datastore` field.

pub mod errors;
pub mod service;
pub mod warehouse;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use lodestar_types::{Project, ResourceSpec, ResourceWire};

pub use errors::ResourceError;
pub use service::ResourceService;

use errors::Result;

/// Pure conversions between the three representations of a resource:
/// human-facing YAML text, the versioned wire message, and the internal
/// domain form.
///
/// `from_wire(to_wire(r))` must be identity on recognized fields; unknown
/// wire fields are ignored but logged.
pub trait SpecAdapter: Send + Sync {
    /// Render the textual YAML form.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Adapter`] when the spec payload is
    /// malformed for this datastore.
    fn to_yaml(&self, spec: &ResourceSpec) -> Result<String>;

    /// Parse the textual YAML form.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Adapter`] on malformed documents or names.
    fn from_yaml(&self, text: &str) -> Result<ResourceSpec>;

    /// Render the versioned wire message.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Adapter`] when the spec payload is
    /// malformed for this datastore.
    fn to_wire(&self, spec: &ResourceSpec) -> Result<ResourceWire>;

    /// Parse the versioned wire message.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Adapter`] on malformed payloads or names.
    fn from_wire(&self, wire: &ResourceWire) -> Result<ResourceSpec>;
}

/// A pluggable driver handling validation, adaptation, and
/// materialization of resources for one backing system.
#[async_trait]
pub trait Datastorer: Send + Sync {
    /// Registry key; matched against `ResourceSpec::datastore`.
    fn name(&self) -> &'static str;

    /// The driver's representation adapter.
    fn adapter(&self) -> &dyn SpecAdapter;

    /// Check the driver-specific constraints, including the name format.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Validation`] for violations.
    fn validate(&self, spec: &ResourceSpec) -> Result<()>;

    /// Assets attached to freshly created resources unless overridden.
    fn default_assets(&self) -> BTreeMap<String, String>;

    /// Materialize a new resource in the backing datastore.
    async fn create(&self, project: &Project, spec: &ResourceSpec) -> Result<()>;

    /// Update an existing resource in the backing datastore.
    async fn update(&self, project: &Project, spec: &ResourceSpec) -> Result<()>;
}

/// Name-keyed set of registered datastore drivers.
#[derive(Default)]
pub struct DatastoreRegistry {
    drivers: BTreeMap<&'static str, Arc<dyn Datastorer>>,
}

impl DatastoreRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under its own name. Last registration wins.
    pub fn add(&mut self, driver: Arc<dyn Datastorer>) {
        self.drivers.insert(driver.name(), driver);
    }

    /// Look up a driver.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] for unregistered names.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Datastorer>> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| ResourceError::not_found("datastore", name))
    }
}
