//! Shared domain model for the Lodestar control plane.
//!
//! Pure data types used across the engine, state, and server crates. Kept
//! free of I/O so every other crate can depend on it without cycles.

pub mod error;
pub mod instance;
pub mod job;
pub mod progress;
pub mod project;
pub mod resource;
pub mod window;

pub use error::AggregateError;
pub use instance::{InstanceKind, InstanceRecord};
pub use job::{CompiledJob, DependencyKind, JobDependency, JobSpec, Schedule, Task};
pub use progress::{Event, Observer, ObserverChain};
pub use project::{Project, ProjectName, SecretItem};
pub use resource::{ResourceKind, ResourceSpec, ResourceWire};
pub use window::{TaskWindow, TruncateTo};
