use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    cluster::{ClusterDispatcher, ClusterEventSender, ClusterTopic, LocalTopic},
    config::Config,
    error::NodeError,
    events::{ApplicationEvents, EventBus, EventRegistry},
    modules::{Module, ModuleRegistry},
    services::{ConsumerCatalog, EventListenerService, FormService, SchedulerService},
    store::{MemoryStores, Stores},
};

use super::node::Node;

type EventSetup = Box<dyn FnOnce(&mut EventRegistry) + Send>;

/// Builder for a [`Node`].
pub struct NodeBuilder {
    cfg: Config,
    stores: Option<Stores>,
    topic: Option<Arc<dyn ClusterTopic>>,
    modules: Vec<Arc<dyn Module>>,
    consumers: ConsumerCatalog,
    event_setup: Vec<EventSetup>,
}

impl NodeBuilder {
    /// Creates a builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            stores: None,
            topic: None,
            modules: Vec::new(),
            consumers: ConsumerCatalog::new(),
            event_setup: Vec::new(),
        }
    }

    /// Sets the tables the node reconciles against.
    ///
    /// Without this the node gets private in-memory tables.
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Sets the cluster topic. Nodes of one cluster must share it.
    ///
    /// A cluster-aware node built without a topic gets a private [`LocalTopic`].
    /// Ignored when `cluster_aware` is false.
    pub fn with_topic(mut self, topic: Arc<dyn ClusterTopic>) -> Self {
        self.topic = Some(topic);
        self
    }

    /// Adds a module.
    pub fn with_module(mut self, module: Arc<dyn Module>) -> Self {
        self.modules.push(module);
        self
    }

    /// Sets the consumers available to listener rows.
    pub fn with_consumers(mut self, consumers: ConsumerCatalog) -> Self {
        self.consumers = consumers;
        self
    }

    /// Registers extra application events next to the canonical ones.
    ///
    /// Runs after the canonical events are registered, so it may also override them.
    pub fn with_events(mut self, setup: impl FnOnce(&mut EventRegistry) + Send + 'static) -> Self {
        self.event_setup.push(Box::new(setup));
        self
    }

    /// Assembles the node. Nothing runs until [`Node::start`] / [`Node::load_all`].
    ///
    /// Fails if two modules share a name.
    pub fn build(self) -> Result<Arc<Node>, NodeError> {
        let mut registry = EventRegistry::new();
        let events = ApplicationEvents::register(&mut registry);
        for setup in self.event_setup {
            setup(&mut registry);
        }
        let registry = Arc::new(registry);

        let bus = Arc::new(EventBus::new());
        let runtime_token = CancellationToken::new();

        let modules = ModuleRegistry::new();
        for module in self.modules {
            modules.register(module)?;
        }
        modules.wire_lifecycle(&bus, &events);

        let stores = self.stores.unwrap_or_else(|| MemoryStores::new().stores());

        let scheduler = SchedulerService::new(
            stores.schedulers,
            Arc::clone(&bus),
            events.scheduler_executed.clone(),
            runtime_token.clone(),
            self.cfg.master,
        );
        let listeners = EventListenerService::new(
            stores.listeners,
            Arc::clone(&bus),
            Arc::clone(&registry),
            Arc::new(self.consumers),
        );
        let forms = FormService::new(stores.forms);

        let dispatcher = ClusterDispatcher::new(
            self.cfg.node_id.as_str(),
            scheduler.clone(),
            listeners.clone(),
            forms.clone(),
        );

        let topic: Option<Arc<dyn ClusterTopic>> = if self.cfg.cluster_aware {
            Some(
                self.topic
                    .unwrap_or_else(|| Arc::new(LocalTopic::from_config(&self.cfg))),
            )
        } else {
            None
        };
        let sender = match &topic {
            Some(topic) => ClusterEventSender::cluster(Arc::clone(topic)),
            None => ClusterEventSender::local(Arc::clone(&dispatcher)),
        };

        Ok(Arc::new(Node::new_internal(
            self.cfg,
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
        )))
    }
}
