//! Progress events and the observer fan-out used by the sync engines.

use std::sync::Arc;

use crate::resource::ResourceSpec;

/// Tagged progress event emitted during a sync batch.
///
/// Errors are carried as preformatted strings so events remain cloneable
/// and can be streamed to remote observers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A compiled job was uploaded to the scheduler's storage (or failed to).
    JobUpload {
        name: String,
        error: Option<String>,
    },
    /// An orphaned artifact was deleted from the scheduler's storage.
    JobRemoteDelete {
        name: String,
        error: Option<String>,
    },
    /// A job referenced an upstream that is not registered anywhere.
    JobUnknownDependencyUsed { job: String, dependency: String },
    /// A resource was materialized in its datastore (or failed to).
    ResourceUpdated {
        spec: ResourceSpec,
        error: Option<String>,
    },
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::JobUpload { name, error: None } => write!(f, "uploaded: {name}"),
            Self::JobUpload {
                name,
                error: Some(err),
            } => write!(f, "uploading: {name}, failed with error: {err}"),
            Self::JobRemoteDelete { name, error: None } => write!(f, "deleted: {name}"),
            Self::JobRemoteDelete {
                name,
                error: Some(err),
            } => write!(f, "deleting: {name}, failed with error: {err}"),
            Self::JobUnknownDependencyUsed { job, dependency } => {
                write!(f, "could not find registered job {dependency}, used in {job}")
            }
            Self::ResourceUpdated { spec, error: None } => write!(f, "updated: {}", spec.name),
            Self::ResourceUpdated {
                spec,
                error: Some(err),
            } => write!(f, "updating: {}, failed with error: {err}", spec.name),
        }
    }
}

/// A sink for progress events.
///
/// Implementations must not block the notifying engine; enqueue or stream
/// instead. Failures stay inside the observer (log, don't propagate).
pub trait Observer: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Fan-out observer delivering each event to every joined observer in
/// join order.
#[derive(Default, Clone)]
pub struct ObserverChain {
    observers: Vec<Arc<dyn Observer>>,
}

impl ObserverChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observer to the chain.
    pub fn join(&mut self, observer: Arc<dyn Observer>) {
        self.observers.push(observer);
    }

    /// Append an observer only when one is present.
    pub fn join_optional(&mut self, observer: Option<Arc<dyn Observer>>) {
        if let Some(observer) = observer {
            self.join(observer);
        }
    }
}

impl Observer for ObserverChain {
    fn notify(&self, event: &Event) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }
}

impl std::fmt::Debug for ObserverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverChain")
            .field("observers", &self.observers.len())
            .finish()
    }
}

pub mod testing {
    //! Recording observer for assertions in engine and server tests.

    use std::sync::Mutex;

    use super::{Event, Observer};

    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingObserver {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().expect("recording lock").clone()
        }
    }

    impl Observer for RecordingObserver {
        fn notify(&self, event: &Event) {
            self.events.lock().expect("recording lock").push(event.clone());
        }
    }
}
