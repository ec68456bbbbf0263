//! Job sync engine for the Lodestar control plane.
//!
//! Takes a project's job specifications through dependency resolution,
//! priority assignment, compilation, and reconciliation against the
//! external scheduler's artifact storage, reporting per-job progress on
//! an observer chain.

pub mod compiler;
pub mod dependency;
pub mod errors;
pub mod instance;
pub mod priority;
pub mod scheduler;
pub mod service;

pub use compiler::{Compiler, ManifestCompiler};
pub use dependency::DependencyResolver;
pub use errors::SyncError;
pub use instance::InstanceService;
pub use priority::{PriorityResolver, MAX_PRIORITY_WEIGHT, WEIGHT_STRIDE};
pub use scheduler::{JobRunStatus, SchedulerUnit};
pub use service::{JobService, MetadataPublisher};
