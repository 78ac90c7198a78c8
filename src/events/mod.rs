//! Application events: descriptors, registry and the synchronous bus.
//!
//! This module groups the event **data model** and the **bus** used by services and
//! modules to react to application events.
//!
//! ## Contents
//! - [`EventDescriptor`], [`ErasedDescriptor`] typed / type-erased `(payload, name)` keys
//! - [`EventRegistry`] name → descriptor map, built once at startup
//! - [`EventBus`] per-name listener lists with isolated synchronous fan-out
//! - [`ApplicationEvents`] the canonical platform events and their payloads
//!
//! ## Quick reference
//! - **Publishers**: application services, `SchedulerService` timers (`SCHEDULER_EXECUTED`),
//!   `Node::load_all` (`APPLICATION_STARTED`).
//! - **Consumers**: module lifecycle hooks (via `ModuleRegistry::wire_lifecycle`) and
//!   dynamic listener rows (via `EventListenerService`).

mod application;
mod bus;
mod descriptor;
mod registry;

pub use application::{
    ApplicationEvents, ApplicationStarted, OrganizationEvent, ScheduledRun, UserEvent,
    UserRoleEvent,
};
pub(crate) use bus::ErasedConsumer;
pub use bus::{EventBus, FanOut, ListenerId, ListenerMeta};
pub use descriptor::{ErasedDescriptor, EventDescriptor};
pub use registry::EventRegistry;
