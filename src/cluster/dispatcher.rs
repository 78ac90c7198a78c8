//! # Cluster dispatcher - routes cluster messages to the reconciliation services.
//!
//! ## Routing
//! ```text
//! SCHEDULER_ADD          → scheduler.load_from_db(id)
//! SCHEDULER_REMOVE       → scheduler.remove(id)
//! SCHEDULER_RELOAD       → scheduler.remove_and_load_from_db(id)
//! EVENT_LISTENER_ADD     → listeners.load_from_db(id)
//! EVENT_LISTENER_REMOVE  → listeners.unregister_event_listener(id)
//! EVENT_LISTENER_RELOAD  → listeners.remove_and_load_from_db(id)
//! FORM_ADD               → forms.add_form(id)
//! FORM_RELOAD            → forms.reload_form(id)
//! FORM_REMOVE            → forms.remove_form(id)
//! ```
//!
//! ## Rules
//! - Messages from one subscription are handled one at a time, in arrival order.
//! - A failing or panicking handler is logged and never stops the listener loop.
//! - Lagged subscriptions log the number of skipped messages and keep going.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cluster::{ClusterEvent, ClusterEventType, ClusterTopic, Delivery};
use crate::error::{ReconcileError, panic_message};
use crate::services::{FormReconciler, ListenerReconciler, SchedulerReconciler};

/// Result of handling one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The local cache now matches the store.
    Applied,
    /// The handler returned an error (label from [`ReconcileError::as_label`]).
    Failed(&'static str),
    /// The handler panicked.
    Panicked(String),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

/// Per-node router from cluster messages to local caches.
pub struct ClusterDispatcher {
    node_id: Arc<str>,
    scheduler: Arc<dyn SchedulerReconciler>,
    listeners: Arc<dyn ListenerReconciler>,
    forms: Arc<dyn FormReconciler>,
}

impl ClusterDispatcher {
    pub fn new(
        node_id: impl Into<Arc<str>>,
        scheduler: Arc<dyn SchedulerReconciler>,
        listeners: Arc<dyn ListenerReconciler>,
        forms: Arc<dyn FormReconciler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            node_id: node_id.into(),
            scheduler,
            listeners,
            forms,
        })
    }

    /// Handles one message. Errors and panics are logged and reported, never propagated.
    pub async fn on_message(&self, event: &ClusterEvent) -> Outcome {
        debug!(node = %self.node_id, event = %event, "cluster message received");

        match AssertUnwindSafe(self.route(event)).catch_unwind().await {
            Ok(Ok(())) => Outcome::Applied,
            Ok(Err(e)) => {
                warn!(
                    node = %self.node_id,
                    event = %event,
                    error = %e,
                    label = e.as_label(),
                    "cluster message not applied"
                );
                Outcome::Failed(e.as_label())
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                error!(node = %self.node_id, event = %event, panic = %msg, "cluster handler panicked");
                Outcome::Panicked(msg)
            }
        }
    }

    async fn route(&self, event: &ClusterEvent) -> Result<(), ReconcileError> {
        let id = event.entity_id;
        match event.event_type {
            ClusterEventType::SchedulerAdd => self.scheduler.load_from_db(id).await,
            ClusterEventType::SchedulerRemove => self.scheduler.remove(id).await,
            ClusterEventType::SchedulerReload => self.scheduler.remove_and_load_from_db(id).await,
            ClusterEventType::EventListenerAdd => self.listeners.load_from_db(id).await,
            ClusterEventType::EventListenerRemove => self.listeners.unregister_event_listener(id).await,
            ClusterEventType::EventListenerReload => self.listeners.remove_and_load_from_db(id).await,
            ClusterEventType::FormAdd => self.forms.add_form(id).await,
            ClusterEventType::FormReload => self.forms.reload_form(id).await,
            ClusterEventType::FormRemove => self.forms.remove_form(id).await,
        }
    }

    /// Subscribes to `topic` and handles its messages until `token` is cancelled
    /// or the topic closes.
    ///
    /// The subscription is opened before this returns, so messages published
    /// afterwards are not missed.
    pub fn spawn_listener(self: Arc<Self>, topic: &dyn ClusterTopic, token: CancellationToken) -> JoinHandle<()> {
        let mut subscription = topic.subscribe();
        let topic_name = topic.name().to_string();

        tokio::spawn(async move {
            info!(node = %self.node_id, topic = %topic_name, "cluster listener started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = subscription.next() => match next {
                        Some(Delivery::Message(ev)) => {
                            self.on_message(&ev).await;
                        }
                        Some(Delivery::Lagged(skipped)) => {
                            warn!(node = %self.node_id, skipped, "cluster listener lagged; messages lost");
                        }
                        None => break,
                    }
                }
            }
            info!(node = %self.node_id, topic = %topic_name, "cluster listener stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::LocalTopic;
    use crate::error::StoreError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Fake {
        log: Log,
    }

    impl Fake {
        fn record(&self, call: &str, id: i64) -> Result<(), ReconcileError> {
            match id {
                -1 => panic!("boom"),
                -2 => Err(StoreError::Unavailable { reason: "down".into() }.into()),
                _ => {
                    self.log.lock().unwrap().push(format!("{call}({id})"));
                    Ok(())
                }
            }
        }
    }

    #[async_trait]
    impl SchedulerReconciler for Fake {
        async fn load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
            self.record("scheduler.load_from_db", id)
        }
        async fn remove(&self, id: i64) -> Result<(), ReconcileError> {
            self.record("scheduler.remove", id)
        }
        async fn remove_and_load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
            self.record("scheduler.remove_and_load_from_db", id)
        }
    }

    #[async_trait]
    impl ListenerReconciler for Fake {
        async fn load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
            self.record("listeners.load_from_db", id)
        }
        async fn unregister_event_listener(&self, id: i64) -> Result<(), ReconcileError> {
            self.record("listeners.unregister_event_listener", id)
        }
        async fn remove_and_load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
            self.record("listeners.remove_and_load_from_db", id)
        }
    }

    #[async_trait]
    impl FormReconciler for Fake {
        async fn add_form(&self, id: i64) -> Result<(), ReconcileError> {
            self.record("forms.add_form", id)
        }
        async fn reload_form(&self, id: i64) -> Result<(), ReconcileError> {
            self.record("forms.reload_form", id)
        }
        async fn remove_form(&self, id: i64) -> Result<(), ReconcileError> {
            self.record("forms.remove_form", id)
        }
    }

    fn dispatcher() -> (Arc<ClusterDispatcher>, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let fake = Arc::new(Fake { log: log.clone() });
        (
            ClusterDispatcher::new("test", fake.clone(), fake.clone(), fake),
            log,
        )
    }

    #[tokio::test]
    async fn test_routing_table() {
        let (d, log) = dispatcher();
        for (i, kind) in ClusterEventType::ALL.into_iter().enumerate() {
            let outcome = d.on_message(&ClusterEvent::new(kind, i as i64)).await;
            assert!(outcome.is_applied());
        }

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "scheduler.load_from_db(0)",
                "scheduler.remove(1)",
                "scheduler.remove_and_load_from_db(2)",
                "listeners.load_from_db(3)",
                "listeners.unregister_event_listener(4)",
                "listeners.remove_and_load_from_db(5)",
                "forms.add_form(6)",
                "forms.reload_form(7)",
                "forms.remove_form(8)",
            ]
        );
    }

    #[tokio::test]
    async fn test_error_and_panic_are_contained() {
        let (d, log) = dispatcher();
        let failed = d
            .on_message(&ClusterEvent::new(ClusterEventType::FormAdd, -2))
            .await;
        assert_eq!(failed, Outcome::Failed("store_unavailable"));

        let panicked = d
            .on_message(&ClusterEvent::new(ClusterEventType::SchedulerAdd, -1))
            .await;
        assert_eq!(panicked, Outcome::Panicked("boom".into()));

        let ok = d
            .on_message(&ClusterEvent::new(ClusterEventType::FormAdd, 1))
            .await;
        assert!(ok.is_applied());
        assert_eq!(*log.lock().unwrap(), vec!["forms.add_form(1)"]);
    }

    async fn wait_for(log: &Log, entry: &str) {
        for _ in 0..200 {
            if log.lock().unwrap().iter().any(|e| e == entry) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{entry} never applied");
    }

    #[tokio::test]
    async fn test_listener_keeps_applying_after_lag() {
        let (d, log) = dispatcher();
        let topic = LocalTopic::new("small", 1);
        let token = CancellationToken::new();
        let handle = Arc::clone(&d).spawn_listener(&topic, token.clone());

        // The listener task has not been polled yet; two of these overflow its buffer.
        for id in 1..=3 {
            topic
                .publish(ClusterEvent::new(ClusterEventType::FormAdd, id))
                .unwrap();
        }
        wait_for(&log, "forms.add_form(3)").await;

        topic
            .publish(ClusterEvent::new(ClusterEventType::FormAdd, 4))
            .unwrap();
        wait_for(&log, "forms.add_form(4)").await;

        assert_eq!(*log.lock().unwrap(), vec!["forms.add_form(3)", "forms.add_form(4)"]);
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_listener_stops_on_cancel() {
        let (d, _log) = dispatcher();
        let topic = LocalTopic::new("t", 4);
        let token = CancellationToken::new();
        let handle = Arc::clone(&d).spawn_listener(&topic, token.clone());
        assert_eq!(topic.subscriber_count(), 1);

        token.cancel();
        handle.await.unwrap();
    }
}
