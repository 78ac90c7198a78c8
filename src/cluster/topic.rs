//! # Cluster topic.
//!
//! [`ClusterTopic`] is the publish/subscribe seam between nodes. Every subscriber,
//! including the publishing node's own, receives every published message.
//!
//! A subscription is a plain [`Stream`](futures::Stream) of [`Delivery`] items, so a
//! transport is free to back it with whatever client it uses.
//!
//! [`LocalTopic`] implements it with a `tokio::sync::broadcast` channel, which is
//! enough for nodes that share a process (tests, demos, single-binary deployments).
//! Slow subscribers can lag; the dispatcher logs and skips lost messages.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::cluster::ClusterEvent;
use crate::config::Config;
use crate::error::TransportError;

/// One item read from a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Message(ClusterEvent),
    /// The subscriber fell behind; this many messages were dropped for it.
    Lagged(u64),
}

/// Messages of one subscriber, in publish order. Ends when the topic closes.
pub type Subscription = BoxStream<'static, Delivery>;

/// Broadcast channel shared by all nodes of a cluster.
pub trait ClusterTopic: Send + Sync + 'static {
    /// Topic name.
    fn name(&self) -> &str;

    /// Publishes to every subscriber. Returns the number of subscribers reached.
    fn publish(&self, event: ClusterEvent) -> Result<usize, TransportError>;

    /// Opens a new subscription starting at the next published message.
    ///
    /// The subscription is registered when this returns, before the stream is polled.
    fn subscribe(&self) -> Subscription;
}

/// In-process topic.
#[derive(Clone, Debug)]
pub struct LocalTopic {
    name: Arc<str>,
    tx: broadcast::Sender<ClusterEvent>,
}

impl LocalTopic {
    /// Creates a topic that buffers up to `capacity` messages per subscriber (min 1).
    pub fn new(name: impl Into<Arc<str>>, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            tx,
        }
    }

    /// Creates a topic named and sized from config.
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.topic.as_str(), cfg.topic_capacity_clamped())
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ClusterTopic for LocalTopic {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, event: ClusterEvent) -> Result<usize, TransportError> {
        self.tx.send(event).map_err(|_| TransportError::NoSubscribers {
            topic: self.name.to_string(),
        })
    }

    fn subscribe(&self) -> Subscription {
        stream::unfold(self.tx.subscribe(), |mut rx| async move {
            let item = match rx.recv().await {
                Ok(event) => Delivery::Message(event),
                Err(RecvError::Lagged(skipped)) => Delivery::Lagged(skipped),
                Err(RecvError::Closed) => return None,
            };
            Some((item, rx))
        })
        .boxed()
    }
}
