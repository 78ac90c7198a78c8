//! Error types used by the registries, the bus and the reconciliation services.
//!
//! - [`RegistryError`]: registration-time failures (duplicate names, concurrent modification).
//! - [`ListenerError`]: returned by event consumers and module hooks.
//! - [`StoreError`]: raised by a [`Repository`](crate::Repository) backend.
//! - [`ReconcileError`]: raised while a service brings its local cache in line with the store.
//! - [`TransportError`]: raised by a [`ClusterTopic`](crate::ClusterTopic) on publish.
//! - [`NodeError`]: node assembly and shutdown failures.
//!
//! Every enum provides `as_label` (stable snake_case, for logs/metrics).

use std::time::Duration;

use thiserror::Error;

/// # Registration-time errors.
///
/// Fatal to the registering code path; callers are expected to surface them.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An event descriptor with this name is already registered.
    #[error("event `{name}` is already registered")]
    DuplicateEvent {
        /// Conflicting event name.
        name: String,
    },

    /// A module with this name is already registered.
    #[error("module `{name}` is already registered")]
    DuplicateModule {
        /// Conflicting module name.
        name: String,
    },

    /// Registration attempted while the registry is being iterated.
    #[error("registry modified during iteration")]
    ConcurrentModification,
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use clusterbus::RegistryError;
    ///
    /// let err = RegistryError::DuplicateModule { name: "billing".into() };
    /// assert_eq!(err.as_label(), "registry_duplicate_module");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::DuplicateEvent { .. } => "registry_duplicate_event",
            RegistryError::DuplicateModule { .. } => "registry_duplicate_module",
            RegistryError::ConcurrentModification => "registry_concurrent_modification",
        }
    }
}

/// # Error returned by an event consumer or a module hook.
///
/// The bus logs it and moves on to the next consumer; it never reaches the emitter.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// The consumer failed while handling the payload.
    #[error("listener failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The consumer refused the payload (e.g. missing static data).
    #[error("listener rejected payload: {reason}")]
    Rejected {
        /// Why the payload was refused.
        reason: String,
    },
}

impl ListenerError {
    /// Convenience constructor for [`ListenerError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        ListenerError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ListenerError::Fail { .. } => "listener_failed",
            ListenerError::Rejected { .. } => "listener_rejected",
        }
    }
}

/// # Persistence-layer errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Backend-specific detail.
        reason: String,
    },

    /// A row exists but could not be decoded.
    #[error("row {id} in `{table}` is malformed: {reason}")]
    Malformed {
        /// Table name.
        table: &'static str,
        /// Row id.
        id: i64,
        /// Decoding detail.
        reason: String,
    },
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Unavailable { .. } => "store_unavailable",
            StoreError::Malformed { .. } => "store_malformed",
        }
    }
}

/// # Errors raised while reconciling a local cache against the store.
///
/// A failed reconciliation leaves this node's cache stale until the next
/// ADD/RELOAD message for the same entity or a full reload at startup.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Reading the row failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A listener row names an event that is not in the registry.
    #[error("unknown event `{name}`")]
    UnknownEvent {
        /// Event name from the row.
        name: String,
    },

    /// A listener row names a consumer that is not in the catalog.
    #[error("unknown consumer `{name}`")]
    UnknownConsumer {
        /// Consumer name from the row.
        name: String,
    },

    /// The consumer expects a different payload type than the event carries.
    #[error("consumer `{consumer}` expects `{expected}` but event `{event}` carries `{found}`")]
    PayloadMismatch {
        /// Event name.
        event: String,
        /// Consumer name.
        consumer: String,
        /// Payload type the consumer accepts.
        expected: &'static str,
        /// Payload type the event carries.
        found: &'static str,
    },
}

impl ReconcileError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReconcileError::Store(e) => e.as_label(),
            ReconcileError::UnknownEvent { .. } => "reconcile_unknown_event",
            ReconcileError::UnknownConsumer { .. } => "reconcile_unknown_consumer",
            ReconcileError::PayloadMismatch { .. } => "reconcile_payload_mismatch",
        }
    }
}

/// # Cluster transport errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No node is subscribed to the topic (the message was dropped).
    #[error("no subscribers on topic `{topic}`")]
    NoSubscribers {
        /// Topic name.
        topic: String,
    },

    /// The transport is shut down.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::NoSubscribers { .. } => "transport_no_subscribers",
            TransportError::Closed => "transport_closed",
        }
    }
}

/// # Node lifecycle errors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum NodeError {
    /// Assembling the node failed (e.g. two modules with the same name).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Background tasks did not stop within the grace period.
    #[error("shutdown grace {grace:?} exceeded")]
    GraceExceeded {
        /// Configured grace period.
        grace: Duration,
    },

    /// Installing the OS signal handlers failed.
    #[error("signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

impl NodeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            NodeError::Registry(e) => e.as_label(),
            NodeError::GraceExceeded { .. } => "node_grace_exceeded",
            NodeError::Signal(_) => "node_signal",
        }
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn std::any::Any + Send> = Box::new("static");
        let other: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*borrowed), "static");
        assert_eq!(panic_message(&*other), "unknown panic");
    }

    #[test]
    fn test_store_error_label_passes_through_reconcile() {
        let err: ReconcileError = StoreError::Unavailable {
            reason: "down".into(),
        }
        .into();
        assert_eq!(err.as_label(), "store_unavailable");
        assert_eq!(err.to_string(), "store unavailable: down");
    }

    #[test]
    fn test_listener_fail_constructor() {
        let err = ListenerError::fail("boom");
        assert_eq!(err, ListenerError::Fail { error: "boom".into() });
        assert_eq!(err.as_label(), "listener_failed");
    }
}
