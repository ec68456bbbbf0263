//! Boundary service for the Lodestar control plane.
//!
//! Transport-agnostic handlers for the deploy/list/dump/status operations,
//! wire DTOs, status-code mapping, and the observers that bridge engine
//! progress events onto ack streams.

pub mod observer;
pub mod service;
pub mod status;
pub mod wire;

pub use observer::{JobSyncObserver, ResourceObserver};
pub use service::{RegisterAck, RegisteredInstance, RuntimeService};
pub use status::{RpcStatus, StatusCode};
pub use wire::{
    DeployAck, DumpWire, JobSpecWire, JobStatusWire, ProjectWire, ResourceAck, TaskWire,
    WindowWire,
};
