//! Persistence seams for the Lodestar control plane.
//!
//! Store traits and request-scoped factories, with three families of
//! implementations: a `SQLite`-backed workspace, a filesystem artifact
//! store, and in-memory fakes shared by tests across the workspace.

pub mod error;
pub mod fs;
pub mod memory;
pub mod sqlite;
pub mod stores;

pub use error::StoreError;
pub use fs::{FsArtifactRoot, FsArtifactStore};
pub use sqlite::SqliteWorkspace;
pub use stores::{
    ArtifactStore, ArtifactStoreFactory, InstanceStore, ProjectStore, ResourceStore,
    ResourceStoreFactory, SecretStore, SpecStore, SpecStoreFactory,
};
