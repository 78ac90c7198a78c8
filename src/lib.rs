//! # clusterbus
//!
//! **clusterbus** is the event and extension fabric of a multi-node business application.
//!
//! It provides typed application events with an in-process publish/subscribe bus, an
//! ordered registry of pluggable modules, and cluster-wide propagation of scheduler,
//! event-listener and form changes so that every node converges on the state of the
//! shared store.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │  Node                                                    │
//!                 │                                                          │
//!  app services ──┼─► EventBus::emit ──► listeners (module hooks,            │
//!                 │        ▲               dynamic listener rows)            │
//!                 │        │                                                 │
//!                 │  SchedulerService timers (SCHEDULER_EXECUTED)            │
//!                 │                                                          │
//!                 │  ClusterDispatcher ──► SchedulerService                  │
//!                 │        ▲           ──► EventListenerService ──► EventBus │
//!                 │        │           ──► FormService                       │
//!                 └────────┼─────────────────────────────────────────────────┘
//!                          │ subscribe
//!              ┌───────────┴───────────┐        publish        ┌───────────────────┐
//!              │     ClusterTopic      │◄──────────────────────┤ ClusterEventSender│
//!              └───────────┬───────────┘                       └───────────────────┘
//!                          ▼
//!                 other nodes' ClusterDispatcher
//! ```
//!
//! ### Propagation
//! ```text
//! admin edits row 5 ──► store commit ──► sender.notify(Scheduler, Reload, 5)
//!   topic ──► every node: dispatcher.on_message(SCHEDULER_RELOAD(5))
//!                         └─► scheduler.remove_and_load_from_db(5)
//!                               ├─ evict timer 5
//!                               └─ re-read row 5 ─► arm timer (or stay evicted if gone)
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                              |
//! |-------------------|----------------------------------------------------------------|-------------------------------------------------|
//! | **Events**        | Typed descriptors, name registry, isolated synchronous fan-out | [`EventDescriptor`], [`EventRegistry`], [`EventBus`] |
//! | **Modules**       | Ordinal-ordered plug-ins reacting to lifecycle events          | [`Module`], [`ModuleRegistry`]                  |
//! | **Reconciliation**| Node-local caches re-read from the store on change             | [`SchedulerService`], [`EventListenerService`], [`FormService`] |
//! | **Cluster**       | Change messages over a shared topic                            | [`ClusterEvent`], [`ClusterTopic`], [`ClusterDispatcher`] |
//! | **Persistence**   | Row access seam with an in-memory backend                      | [`Repository`], [`MemoryRepository`]            |
//! | **Configuration** | Node settings, from code or `CLUSTERBUS_*` env vars            | [`Config`]                                      |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use clusterbus::{BasicModule, Config, Node, UserEvent};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { cluster_aware: false, ..Config::default() };
//!     let node = Node::builder(cfg)
//!         .with_module(Arc::new(BasicModule::new("core", 0)))
//!         .build()?;
//!
//!     node.bus().register_listener(&node.events().user_created, |ev: &UserEvent| {
//!         println!("welcome {}", ev.email);
//!         Ok(())
//!     });
//!
//!     node.start().await;
//!     node.load_all().await;
//!     let out = node.bus().emit(
//!         &node.events().user_created,
//!         &UserEvent { user_id: 1, email: "ada@example.com".into() },
//!     );
//!     assert_eq!(out.failed, 0);
//!
//!     node.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod cluster;
mod config;
mod core;
mod error;
mod events;
mod modules;
mod services;
mod store;

// ---- Public re-exports ----

pub use cluster::{
    Action, ClusterDispatcher, ClusterEvent, ClusterEventSender, ClusterEventType, ClusterTopic,
    Delivery, LocalTopic, Outcome, Subscription, Subsystem,
};
pub use config::{Config, DEFAULT_TOPIC};
pub use core::{LoadReport, Node, NodeBuilder};
pub use error::{ListenerError, NodeError, ReconcileError, RegistryError, StoreError, TransportError};
pub use events::{
    ApplicationEvents, ApplicationStarted, ErasedDescriptor, EventBus, EventDescriptor, EventRegistry,
    FanOut, ListenerId, ListenerMeta, OrganizationEvent, ScheduledRun, UserEvent, UserRoleEvent,
};
pub use modules::{BasicModule, Module, ModuleRegistry, ModuleView};
pub use services::{
    ConsumerCatalog, EventListenerService, FieldDef, FieldKind, FormDef, FormReconciler, FormService,
    ListenerDef, ListenerReconciler, MIN_INTERVAL, SchedulerDef, SchedulerReconciler, SchedulerService,
};
pub use store::{MemoryRepository, MemoryStores, Repository, Row, Stores};
