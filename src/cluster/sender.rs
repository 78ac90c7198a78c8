//! # Cluster event sender.
//!
//! Entry point for code that has just changed a scheduler, listener or form row and
//! needs every node to pick the change up.
//!
//! - **cluster-aware**: publish on the topic; every node, the sender included,
//!   reconciles when its dispatcher receives the message.
//! - **local**: no topic; the message is handed straight to this node's dispatcher.

use std::sync::Arc;

use tracing::debug;

use crate::cluster::{Action, ClusterDispatcher, ClusterEvent, ClusterEventType, ClusterTopic, Outcome, Subsystem};
use crate::error::TransportError;

#[derive(Clone)]
enum Route {
    Topic(Arc<dyn ClusterTopic>),
    Local(Arc<ClusterDispatcher>),
}

/// Publishes cluster events, or applies them locally on a single node.
#[derive(Clone)]
pub struct ClusterEventSender {
    route: Route,
}

impl ClusterEventSender {
    /// Sender that publishes on `topic`.
    pub fn cluster(topic: Arc<dyn ClusterTopic>) -> Self {
        Self {
            route: Route::Topic(topic),
        }
    }

    /// Sender that applies events on `dispatcher` directly.
    pub fn local(dispatcher: Arc<ClusterDispatcher>) -> Self {
        Self {
            route: Route::Local(dispatcher),
        }
    }

    pub fn is_cluster_aware(&self) -> bool {
        matches!(self.route, Route::Topic(_))
    }

    /// Sends one event.
    ///
    /// In local mode the event has been applied when this returns; a failed or
    /// panicked handler is logged by the dispatcher and does not fail the send.
    pub async fn send(&self, event: ClusterEvent) -> Result<(), TransportError> {
        match &self.route {
            Route::Topic(topic) => {
                let reached = topic.publish(event)?;
                debug!(event = %event, topic = topic.name(), reached, "cluster event published");
            }
            Route::Local(dispatcher) => {
                if let Outcome::Applied = dispatcher.on_message(&event).await {
                    debug!(event = %event, "cluster event applied locally");
                }
            }
        }
        Ok(())
    }

    /// Sends `subsystem`/`action` for entity `id`.
    pub async fn notify(&self, subsystem: Subsystem, action: Action, id: i64) -> Result<(), TransportError> {
        self.send(ClusterEvent::new(ClusterEventType::new(subsystem, action), id))
            .await
    }
}
