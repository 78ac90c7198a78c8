//! # Reconciliation services.
//!
//! Each service owns one node-local cache that mirrors one table:
//!
//! | Service                  | Table            | Cached as                         |
//! |--------------------------|------------------|-----------------------------------|
//! | [`SchedulerService`]     | scheduler        | live timer tasks                  |
//! | [`EventListenerService`] | event_listener   | registrations on the [`EventBus`] |
//! | [`FormService`]          | form             | `Arc<FormDef>` snapshots          |
//!
//! The dispatcher talks to them through the reconciler traits below so that the
//! routing table can be exercised with fakes.
//!
//! [`EventBus`]: crate::EventBus

mod catalog;
mod form;
mod listener;
mod scheduler;

pub use catalog::ConsumerCatalog;
pub use form::{FieldDef, FieldKind, FormDef, FormService};
pub use listener::{EventListenerService, ListenerDef};
pub use scheduler::{MIN_INTERVAL, SchedulerDef, SchedulerService};

use async_trait::async_trait;

use crate::error::ReconcileError;

/// Timer cache operations reachable from cluster messages.
#[async_trait]
pub trait SchedulerReconciler: Send + Sync + 'static {
    async fn load_from_db(&self, id: i64) -> Result<(), ReconcileError>;
    async fn remove(&self, id: i64) -> Result<(), ReconcileError>;
    async fn remove_and_load_from_db(&self, id: i64) -> Result<(), ReconcileError>;
}

/// Listener cache operations reachable from cluster messages.
#[async_trait]
pub trait ListenerReconciler: Send + Sync + 'static {
    async fn load_from_db(&self, id: i64) -> Result<(), ReconcileError>;
    async fn unregister_event_listener(&self, id: i64) -> Result<(), ReconcileError>;
    async fn remove_and_load_from_db(&self, id: i64) -> Result<(), ReconcileError>;
}

/// Form cache operations reachable from cluster messages.
#[async_trait]
pub trait FormReconciler: Send + Sync + 'static {
    async fn add_form(&self, id: i64) -> Result<(), ReconcileError>;
    async fn reload_form(&self, id: i64) -> Result<(), ReconcileError>;
    async fn remove_form(&self, id: i64) -> Result<(), ReconcileError>;
}

#[async_trait]
impl SchedulerReconciler for SchedulerService {
    async fn load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
        SchedulerService::load_from_db(self, id).await
    }

    async fn remove(&self, id: i64) -> Result<(), ReconcileError> {
        SchedulerService::remove(self, id).await
    }

    async fn remove_and_load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
        SchedulerService::remove_and_load_from_db(self, id).await
    }
}

#[async_trait]
impl ListenerReconciler for EventListenerService {
    async fn load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
        EventListenerService::load_from_db(self, id).await
    }

    async fn unregister_event_listener(&self, id: i64) -> Result<(), ReconcileError> {
        EventListenerService::unregister_event_listener(self, id).await
    }

    async fn remove_and_load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
        EventListenerService::remove_and_load_from_db(self, id).await
    }
}

#[async_trait]
impl FormReconciler for FormService {
    async fn add_form(&self, id: i64) -> Result<(), ReconcileError> {
        FormService::add_form(self, id).await
    }

    async fn reload_form(&self, id: i64) -> Result<(), ReconcileError> {
        FormService::reload_form(self, id).await
    }

    async fn remove_form(&self, id: i64) -> Result<(), ReconcileError> {
        FormService::remove_form(self, id).await
    }
}
