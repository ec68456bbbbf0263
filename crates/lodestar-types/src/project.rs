//! Projects: top-level tenants owning job specs, resources, and secrets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Non-empty project identifier, unique process-wide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectName(String);

impl ProjectName {
    /// Create a project name. Returns `None` for empty or blank input.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            None
        } else {
            Some(Self(name))
        }
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named namespace with free-form configuration.
///
/// Passed by value into every core operation; the engines never cache it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: ProjectName,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

impl Project {
    /// Create a project with an empty config map.
    ///
    /// Returns `None` when `name` is blank.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Option<Self> {
        Some(Self {
            name: ProjectName::new(name)?,
            config: BTreeMap::new(),
        })
    }
}

/// A secret stored for a project, decoded from its wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretItem {
    pub name: String,
    pub value: String,
}
