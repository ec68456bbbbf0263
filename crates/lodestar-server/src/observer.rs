//! Observers bridging engine progress events onto ack streams.
//!
//! Sends are non-blocking (unbounded channel); a dropped receiver is
//! logged and otherwise ignored, never propagated to the engine.

use lodestar_types::{Event, Observer};
use tokio::sync::mpsc::UnboundedSender;

use crate::wire::{DeployAck, ResourceAck};

/// Streams job deploy acks: one per upload, one notice per delete or
/// unknown-dependency report.
pub struct JobSyncObserver {
    tx: UnboundedSender<DeployAck>,
}

impl JobSyncObserver {
    #[must_use]
    pub fn new(tx: UnboundedSender<DeployAck>) -> Self {
        Self { tx }
    }

    fn send(&self, ack: DeployAck) {
        if self.tx.send(ack).is_err() {
            tracing::warn!("deploy ack receiver dropped, discarding ack");
        }
    }
}

impl Observer for JobSyncObserver {
    fn notify(&self, event: &Event) {
        match event {
            Event::JobUpload { name, error } => self.send(DeployAck {
                success: error.is_none(),
                ack: true,
                job_name: name.clone(),
                message: error.clone().unwrap_or_default(),
            }),
            Event::JobRemoteDelete { name, error } => self.send(DeployAck {
                success: error.is_none(),
                ack: false,
                job_name: name.clone(),
                message: event.to_string(),
            }),
            Event::JobUnknownDependencyUsed { job, .. } => self.send(DeployAck {
                success: false,
                ack: false,
                job_name: job.clone(),
                message: event.to_string(),
            }),
            Event::ResourceUpdated { .. } => {}
        }
    }
}

/// Streams resource deploy acks.
pub struct ResourceObserver {
    tx: UnboundedSender<ResourceAck>,
}

impl ResourceObserver {
    #[must_use]
    pub fn new(tx: UnboundedSender<ResourceAck>) -> Self {
        Self { tx }
    }
}

impl Observer for ResourceObserver {
    fn notify(&self, event: &Event) {
        let Event::ResourceUpdated { spec, error } = event else {
            return;
        };
        let ack = ResourceAck {
            success: error.is_none(),
            ack: true,
            resource_name: spec.name.clone(),
            message: error.clone().unwrap_or_default(),
        };
        if self.tx.send(ack).is_err() {
            tracing::warn!("resource ack receiver dropped, discarding ack");
        }
    }
}
