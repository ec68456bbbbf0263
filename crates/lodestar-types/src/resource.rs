//! Datastore resource specifications and their wire form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of datastore object a resource describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Dataset,
    Table,
    View,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Table => "table",
            Self::View => "view",
        }
    }

    /// Parse the lowercase wire form.
    ///
    /// # Errors
    ///
    /// Returns the offending string for unknown kinds.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "dataset" => Ok(Self::Dataset),
            "table" => Ok(Self::Table),
            "view" => Ok(Self::View),
            other => Err(format!("unknown resource kind {other:?}")),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specification of an external datastore object (e.g. a warehouse
/// dataset). `spec` holds the datastore-specific payload; drivers parse it
/// into their typed internal form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub version: i32,
    pub name: String,
    pub kind: ResourceKind,
    /// Name of the registered datastore driver handling this resource.
    pub datastore: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub spec: serde_json::Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Versioned wire message for a resource, as persisted and exchanged at
/// the system boundary. Field names match the textual YAML form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceWire {
    pub version: i32,
    pub name: String,
    pub datastore: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub spec: serde_json::Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}
