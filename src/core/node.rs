//! # Node: one process of the cluster, wiring every component together.
//!
//! ## Architecture
//! ```text
//! NodeBuilder::build()
//!   EventRegistry ◄── ApplicationEvents::register + with_events(..)
//!   EventBus      ◄── ModuleRegistry::wire_lifecycle (module hooks)
//!   SchedulerService / EventListenerService / FormService  (over Stores)
//!   ClusterDispatcher (routes to the three services)
//!   ClusterEventSender (topic publish | local apply)
//!
//! Node::start()
//!   dispatcher.spawn_listener(topic, runtime_token.child_token())
//!
//! Node::load_all()
//!   scheduler.load_all ─► listeners.load_all ─► forms.load_all ─► emit APPLICATION_STARTED
//!
//! Node::shutdown()
//!   runtime_token.cancel() ─► timers + cluster listener stop ─► wait up to cfg.grace
//! ```
//!
//! ## Example
//! ```rust
//! use clusterbus::{Action, Config, Node, Subsystem};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { cluster_aware: false, ..Config::default() };
//!     let node = Node::builder(cfg).build()?;
//!     node.start().await;
//!     let report = node.load_all().await;
//!     assert!(report.is_clean());
//!
//!     node.sender().notify(Subsystem::Form, Action::Add, 1).await?;
//!     node.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cluster::{ClusterDispatcher, ClusterEventSender, ClusterTopic},
    config::Config,
    error::{NodeError, ReconcileError},
    events::{ApplicationEvents, ApplicationStarted, EventBus, EventRegistry},
    modules::ModuleRegistry,
    services::{EventListenerService, FormService, SchedulerService},
};

use super::builder::NodeBuilder;

/// Outcome of [`Node::load_all`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Armed timers.
    pub schedulers: usize,
    /// Registered listener rows.
    pub listeners: usize,
    /// Cached forms.
    pub forms: usize,
    /// Failures, in load order. A failed table keeps whatever it loaded before failing.
    pub errors: Vec<ReconcileError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One node of the cluster.
pub struct Node {
    cfg: Config,
    events: ApplicationEvents,
    registry: Arc<EventRegistry>,
    bus: Arc<EventBus>,
    modules: Arc<ModuleRegistry>,
    scheduler: Arc<SchedulerService>,
    listeners: Arc<EventListenerService>,
    forms: Arc<FormService>,
    dispatcher: Arc<ClusterDispatcher>,
    topic: Option<Arc<dyn ClusterTopic>>,
    sender: ClusterEventSender,
    runtime_token: CancellationToken,
    listener_task: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Returns a builder for a node with the given configuration.
    pub fn builder(cfg: Config) -> NodeBuilder {
        NodeBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn new_internal(
        cfg: Config,
        events: ApplicationEvents,
        registry: Arc<EventRegistry>,
        bus: Arc<EventBus>,
        modules: Arc<ModuleRegistry>,
        scheduler: Arc<SchedulerService>,
        listeners: Arc<EventListenerService>,
        forms: Arc<FormService>,
        dispatcher: Arc<ClusterDispatcher>,
        topic: Option<Arc<dyn ClusterTopic>>,
        sender: ClusterEventSender,
        runtime_token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            events,
            registry,
            bus,
            modules,
            scheduler,
            listeners,
            forms,
            dispatcher,
            topic,
            sender,
            runtime_token,
            listener_task: Mutex::new(None),
        }
    }

    /// Subscribes the dispatcher to the cluster topic.
    ///
    /// Returns `false` if the node is not cluster-aware or was already started.
    pub async fn start(&self) -> bool {
        let Some(topic) = &self.topic else {
            info!(node = %self.cfg.node_id, "not cluster-aware; cluster events apply locally");
            return false;
        };

        let mut task = self.listener_task.lock().await;
        if task.is_some() {
            return false;
        }
        let handle = Arc::clone(&self.dispatcher)
            .spawn_listener(topic.as_ref(), self.runtime_token.child_token());
        *task = Some(handle);
        true
    }

    /// Brings every local cache in line with the store, then emits `APPLICATION_STARTED`.
    ///
    /// A failing table does not stop the others from loading.
    pub async fn load_all(&self) -> LoadReport {
        let mut report = LoadReport::default();

        match self.scheduler.load_all().await {
            Ok(n) => report.schedulers = n,
            Err(e) => report.errors.push(e),
        }
        match self.listeners.load_all().await {
            Ok(n) => report.listeners = n,
            Err(e) => {
                report.listeners = self.listeners.len().await;
                report.errors.push(e);
            }
        }
        match self.forms.load_all().await {
            Ok(n) => report.forms = n,
            Err(e) => report.errors.push(e),
        }

        for e in &report.errors {
            warn!(node = %self.cfg.node_id, error = %e, label = e.as_label(), "startup load incomplete");
        }
        info!(
            node = %self.cfg.node_id,
            schedulers = report.schedulers,
            listeners = report.listeners,
            forms = report.forms,
            "startup load finished"
        );

        self.bus.emit(
            &self.events.application_started,
            &ApplicationStarted {
                node_id: self.cfg.node_id.clone(),
            },
        );
        report
    }

    /// Stops timers and the cluster listener, waiting up to `cfg.grace`.
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        info!(node = %self.cfg.node_id, "shutdown requested");
        self.runtime_token.cancel();

        let task = self.listener_task.lock().await.take();
        let scheduler = Arc::clone(&self.scheduler);
        let drain = async move {
            scheduler.cancel_all().await;
            if let Some(task) = task {
                let _ = task.await;
            }
        };

        let grace = self.cfg.grace;
        match tokio::time::timeout(grace, drain).await {
            Ok(()) => {
                info!(node = %self.cfg.node_id, "node stopped");
                Ok(())
            }
            Err(_) => {
                warn!(node = %self.cfg.node_id, ?grace, "shutdown grace exceeded");
                Err(NodeError::GraceExceeded { grace })
            }
        }
    }

    /// Starts the node, loads all tables, then runs until an OS termination signal
    /// (`SIGINT`, `SIGTERM`, `SIGQUIT`; Ctrl-C off Unix).
    pub async fn run_until_signal(&self) -> Result<LoadReport, NodeError> {
        self.start().await;
        let report = self.load_all().await;
        termination_signal().await?;
        self.shutdown().await?;
        Ok(report)
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn events(&self) -> &ApplicationEvents {
        &self.events
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    pub fn scheduler(&self) -> &Arc<SchedulerService> {
        &self.scheduler
    }

    pub fn listeners(&self) -> &Arc<EventListenerService> {
        &self.listeners
    }

    pub fn forms(&self) -> &Arc<FormService> {
        &self.forms
    }

    pub fn dispatcher(&self) -> &Arc<ClusterDispatcher> {
        &self.dispatcher
    }

    pub fn sender(&self) -> &ClusterEventSender {
        &self.sender
    }

    /// The cluster topic, if cluster-aware.
    pub fn topic(&self) -> Option<&Arc<dyn ClusterTopic>> {
        self.topic.as_ref()
    }

    /// Token cancelled by [`Node::shutdown`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.runtime_token.clone()
    }
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut streams = [SignalKind::interrupt(), SignalKind::terminate(), SignalKind::quit()]
        .into_iter()
        .map(signal)
        .collect::<std::io::Result<Vec<_>>>()?;
    futures::future::select_all(streams.iter_mut().map(|s| Box::pin(s.recv()))).await;
    Ok(())
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
