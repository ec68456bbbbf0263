//! Warehouse dataset driver.
//!
//! Resources named `project_name.dataset_name` describing datasets in the
//! analytical warehouse. Materialization goes through the
//! [`DatasetBackend`] capability; the control plane itself only validates,
//! converts, and persists.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use lodestar_types::{Project, ResourceKind, ResourceSpec, ResourceWire};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{ResourceError, Result};
use crate::{Datastorer, SpecAdapter};

/// Registry name of this driver.
pub const WAREHOUSE: &str = "warehouse";

static DATASET_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\w-]+)\.(\w+)$").expect("valid dataset name regex"));

/// Dataset attributes the warehouse understands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Default table expiration in hours; zero means no expiry.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub table_expiration: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Internal domain form of a dataset resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    /// Warehouse project token parsed from the resource name.
    pub project: String,
    /// Dataset token parsed from the resource name.
    pub dataset: String,
    pub metadata: DatasetMetadata,
}

impl DatasetSpec {
    /// Extract the typed form from a generic resource spec.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Validation`] for malformed names and
    /// [`ResourceError::Adapter`] for malformed payloads.
    pub fn from_resource(spec: &ResourceSpec) -> Result<Self> {
        let (project, dataset) = parse_dataset_name(&spec.name)?;
        let metadata = parse_metadata(&spec.spec);
        Ok(Self {
            project,
            dataset,
            metadata,
        })
    }
}

/// Split a `project_name.dataset_name` resource name into its tokens.
///
/// # Errors
///
/// Returns [`ResourceError::Validation`] when the name doesn't match.
pub fn parse_dataset_name(name: &str) -> Result<(String, String)> {
    let captures = DATASET_NAME_RE.captures(name).ok_or_else(|| {
        ResourceError::validation(format!(
            "invalid resource name {name:?}, for example 'project_name.dataset_name'"
        ))
    })?;
    Ok((captures[1].to_string(), captures[2].to_string()))
}

/// Pull the recognized metadata fields out of a spec payload, logging any
/// keys this driver doesn't understand.
fn parse_metadata(payload: &serde_json::Value) -> DatasetMetadata {
    let mut metadata = DatasetMetadata::default();
    let Some(map) = payload.as_object() else {
        return metadata;
    };
    for (key, value) in map {
        match key.as_str() {
            "description" => {
                metadata.description = value.as_str().unwrap_or_default().to_string();
            }
            "location" => {
                metadata.location = value.as_str().unwrap_or_default().to_string();
            }
            "table_expiration" => {
                metadata.table_expiration = value.as_i64().unwrap_or_default();
            }
            unknown => {
                tracing::warn!(field = unknown, "ignoring unknown dataset spec field");
            }
        }
    }
    metadata
}

fn metadata_payload(metadata: &DatasetMetadata) -> Result<serde_json::Value> {
    serde_json::to_value(metadata).map_err(|e| ResourceError::adapter(e.to_string()))
}

/// Textual YAML document for a dataset resource.
#[derive(Debug, Serialize, Deserialize)]
struct DatasetDoc {
    version: i32,
    name: String,
    #[serde(rename = "type")]
    kind: ResourceKind,
    #[serde(default)]
    spec: DatasetMetadata,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

/// Conversions between dataset representations.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatasetAdapter;

impl SpecAdapter for DatasetAdapter {
    fn to_yaml(&self, spec: &ResourceSpec) -> Result<String> {
        let dataset = DatasetSpec::from_resource(spec)?;
        let doc = DatasetDoc {
            version: spec.version,
            name: spec.name.clone(),
            kind: spec.kind.clone(),
            spec: dataset.metadata,
            labels: spec.labels.clone(),
        };
        serde_yaml::to_string(&doc).map_err(|e| ResourceError::adapter(e.to_string()))
    }

    fn from_yaml(&self, text: &str) -> Result<ResourceSpec> {
        let doc: DatasetDoc =
            serde_yaml::from_str(text).map_err(|e| ResourceError::adapter(e.to_string()))?;
        parse_dataset_name(&doc.name)?;
        Ok(ResourceSpec {
            version: doc.version,
            name: doc.name,
            kind: doc.kind,
            datastore: WAREHOUSE.to_string(),
            spec: metadata_payload(&doc.spec)?,
            assets: BTreeMap::new(),
            labels: doc.labels,
        })
    }

    fn to_wire(&self, spec: &ResourceSpec) -> Result<ResourceWire> {
        let dataset = DatasetSpec::from_resource(spec)?;
        Ok(ResourceWire {
            version: spec.version,
            name: spec.name.clone(),
            datastore: WAREHOUSE.to_string(),
            kind: spec.kind.as_str().to_string(),
            spec: metadata_payload(&dataset.metadata)?,
            assets: spec.assets.clone(),
            labels: spec.labels.clone(),
        })
    }

    fn from_wire(&self, wire: &ResourceWire) -> Result<ResourceSpec> {
        parse_dataset_name(&wire.name)?;
        let kind = ResourceKind::parse(&wire.kind).map_err(ResourceError::Adapter)?;
        let metadata = parse_metadata(&wire.spec);
        Ok(ResourceSpec {
            version: wire.version,
            name: wire.name.clone(),
            kind,
            datastore: WAREHOUSE.to_string(),
            spec: metadata_payload(&metadata)?,
            assets: wire.assets.clone(),
            labels: wire.labels.clone(),
        })
    }
}

/// Capability the warehouse exposes for dataset materialization.
#[async_trait]
pub trait DatasetBackend: Send + Sync {
    /// Create a dataset; fails when it already exists.
    async fn create_dataset(&self, project: &Project, dataset: &DatasetSpec) -> Result<()>;

    /// Update an existing dataset's metadata.
    async fn update_dataset(&self, project: &Project, dataset: &DatasetSpec) -> Result<()>;
}

/// Dataset driver registered under [`WAREHOUSE`].
pub struct WarehouseDatastore {
    backend: Arc<dyn DatasetBackend>,
    adapter: DatasetAdapter,
}

impl WarehouseDatastore {
    #[must_use]
    pub fn new(backend: Arc<dyn DatasetBackend>) -> Self {
        Self {
            backend,
            adapter: DatasetAdapter,
        }
    }
}

#[async_trait]
impl Datastorer for WarehouseDatastore {
    fn name(&self) -> &'static str {
        WAREHOUSE
    }

    fn adapter(&self) -> &dyn SpecAdapter {
        &self.adapter
    }

    fn validate(&self, spec: &ResourceSpec) -> Result<()> {
        parse_dataset_name(&spec.name).map(|_| ())
    }

    fn default_assets(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    async fn create(&self, project: &Project, spec: &ResourceSpec) -> Result<()> {
        let dataset = DatasetSpec::from_resource(spec)?;
        self.backend.create_dataset(project, &dataset).await
    }

    async fn update(&self, project: &Project, spec: &ResourceSpec) -> Result<()> {
        let dataset = DatasetSpec::from_resource(spec)?;
        self.backend.update_dataset(project, &dataset).await
    }
}

pub mod testing {
    //! In-memory warehouse backend for tests and local runs.

    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::{async_trait, DatasetBackend, DatasetSpec, Project, ResourceError, Result};

    /// Holds created datasets in a map keyed by `project.dataset`.
    #[derive(Default)]
    pub struct MemDatasetBackend {
        datasets: Mutex<BTreeMap<String, DatasetSpec>>,
    }

    impl MemDatasetBackend {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of the stored dataset keys, sorted.
        pub fn dataset_keys(&self) -> Vec<String> {
            self.datasets
                .lock()
                .expect("dataset lock")
                .keys()
                .cloned()
                .collect()
        }

        /// The stored spec for `key`, if any.
        pub fn get(&self, key: &str) -> Option<DatasetSpec> {
            self.datasets.lock().expect("dataset lock").get(key).cloned()
        }

        fn key(dataset: &DatasetSpec) -> String {
            format!("{}.{}", dataset.project, dataset.dataset)
        }
    }

    #[async_trait]
    impl DatasetBackend for MemDatasetBackend {
        async fn create_dataset(&self, _: &Project, dataset: &DatasetSpec) -> Result<()> {
            let key = Self::key(dataset);
            let mut datasets = self.datasets.lock().expect("dataset lock");
            if datasets.contains_key(&key) {
                return Err(ResourceError::Backend(format!(
                    "dataset {key} already exists"
                )));
            }
            datasets.insert(key, dataset.clone());
            Ok(())
        }

        async fn update_dataset(&self, _: &Project, dataset: &DatasetSpec) -> Result<()> {
            let key = Self::key(dataset);
            let mut datasets = self.datasets.lock().expect("dataset lock");
            if !datasets.contains_key(&key) {
                return Err(ResourceError::Backend(format!("dataset {key} does not exist")));
            }
            datasets.insert(key, dataset.clone());
            Ok(())
        }
    }
}
