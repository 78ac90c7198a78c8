//! # Synchronous in-process event bus.
//!
//! [`EventBus`] keeps one listener list per event name and fans an emitted payload out
//! to every listener of that name, **on the calling thread**, in registration order.
//!
//! ## Architecture
//! ```text
//! emit(descriptor, &payload)
//!     │  (read lock: snapshot listeners for descriptor.name, release lock)
//!     │
//!     ├──► listener 1 ──► Ok
//!     ├──► listener 2 ──► Err(ListenerError) → logged, counted, continue
//!     ├──► listener 3 ──► panic             → caught, logged, counted, continue
//!     └──► listener N ──► Ok
//!     ▼
//!  FanOut { delivered, failed }
//! ```
//!
//! ## Rules
//! - **Synchronous**: no queueing, no backpressure; listener work extends the emitter's latency.
//! - **Isolation**: a failing or panicking listener never stops the fan-out and never reaches
//!   the emitter.
//! - **Registration order**: listeners run in the order they were registered; no priorities.
//! - **Re-entrancy**: the listener list is snapshotted before invocation, so a listener may
//!   (un)register listeners or emit other events.
//!
//! **Warning**: `AssertUnwindSafe` is used to catch listener panics; a listener that panics
//! while holding a lock on shared state may leave that state inconsistent.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{trace, warn};

use crate::error::{ListenerError, panic_message};
use crate::events::descriptor::{ErasedDescriptor, EventDescriptor};

/// Type-erased consumer stored by the bus.
pub(crate) type ErasedConsumer = Arc<dyn Fn(&dyn Any) -> Result<(), ListenerError> + Send + Sync>;

/// Identity of a single listener registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Optional metadata attached to a registration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerMeta {
    /// Id of the database row that configured this listener, if any.
    pub source_id: Option<i64>,
    /// Human-readable label used in logs.
    pub label: Option<Arc<str>>,
}

impl ListenerMeta {
    /// Metadata for a listener backed by a database row.
    pub fn from_source(id: i64) -> Self {
        Self {
            source_id: Some(id),
            label: None,
        }
    }

    /// Attaches a label.
    pub fn with_label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Result of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned `Err`, panicked, or expected another payload type.
    pub failed: usize,
}

impl FanOut {
    /// Total number of listeners invoked.
    pub fn total(&self) -> usize {
        self.delivered + self.failed
    }
}

struct Registration {
    id: ListenerId,
    meta: ListenerMeta,
    payload: TypeId,
    consumer: ErasedConsumer,
}

/// Per-event-name listener lists with synchronous, isolated fan-out.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<Arc<str>, Vec<Arc<Registration>>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `consumer` for the event described by `descriptor`.
    pub fn register_listener<T, F>(&self, descriptor: &EventDescriptor<T>, consumer: F) -> ListenerId
    where
        T: 'static,
        F: Fn(&T) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.register_listener_with(descriptor, ListenerMeta::default(), consumer)
    }

    /// Registers `consumer` with identifying metadata (e.g. the backing row id).
    pub fn register_listener_with<T, F>(
        &self,
        descriptor: &EventDescriptor<T>,
        meta: ListenerMeta,
        consumer: F,
    ) -> ListenerId
    where
        T: 'static,
        F: Fn(&T) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let erased: ErasedConsumer = Arc::new(move |payload: &dyn Any| {
            match payload.downcast_ref::<T>() {
                Some(p) => consumer(p),
                None => Err(ListenerError::Rejected {
                    reason: format!("expected payload {}", std::any::type_name::<T>()),
                }),
            }
        });
        self.register_erased(&descriptor.erased(), meta, erased)
    }

    /// Registers an already type-erased consumer.
    ///
    /// The caller guarantees `consumer` accepts the payload type of `descriptor`.
    pub(crate) fn register_erased(
        &self,
        descriptor: &ErasedDescriptor,
        meta: ListenerMeta,
        consumer: ErasedConsumer,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Arc::new(Registration {
            id,
            meta,
            payload: descriptor.payload_type(),
            consumer,
        });

        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners
            .entry(Arc::from(descriptor.name()))
            .or_default()
            .push(registration);
        trace!(event = descriptor.name(), listener = id.0, "listener registered");
        id
    }

    /// Removes one registration of the given event. Returns `false` if it was not present.
    pub fn unregister_listener<T: 'static>(&self, descriptor: &EventDescriptor<T>, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = listeners.get_mut(descriptor.name()) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(descriptor.name());
        }
        removed
    }

    /// Removes a registration by id, whatever event it is attached to.
    pub fn unregister(&self, id: ListenerId) -> bool {
        self.retain_where(|r| r.id != id) > 0
    }

    /// Removes every registration whose metadata carries `source_id`. Returns how many were removed.
    pub fn unregister_source(&self, source_id: i64) -> usize {
        self.retain_where(|r| r.meta.source_id != Some(source_id))
    }

    fn retain_where(&self, keep: impl Fn(&Registration) -> bool) -> usize {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        listeners.retain(|_, list| {
            let before = list.len();
            list.retain(|r| keep(&**r));
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }

    /// Emits `payload` to every listener of `descriptor`, synchronously and in registration order.
    ///
    /// Never fails: listener errors and panics are logged and counted in the returned [`FanOut`].
    pub fn emit<T: 'static>(&self, descriptor: &EventDescriptor<T>, payload: &T) -> FanOut {
        let snapshot: Vec<Arc<Registration>> = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            match listeners.get(descriptor.name()) {
                Some(list) => list.clone(),
                None => return FanOut::default(),
            }
        };

        let mut out = FanOut::default();
        for reg in snapshot {
            if reg.payload != TypeId::of::<T>() {
                warn!(
                    event = descriptor.name(),
                    listener = reg.id.0,
                    "listener skipped: payload type mismatch"
                );
                out.failed += 1;
                continue;
            }

            let result = catch_unwind(AssertUnwindSafe(|| (reg.consumer)(payload as &dyn Any)));
            match result {
                Ok(Ok(())) => out.delivered += 1,
                Ok(Err(err)) => {
                    warn!(
                        event = descriptor.name(),
                        listener = reg.id.0,
                        source_id = reg.meta.source_id,
                        label = reg.meta.label.as_deref(),
                        error = %err,
                        kind = err.as_label(),
                        "listener failed"
                    );
                    out.failed += 1;
                }
                Err(panic) => {
                    warn!(
                        event = descriptor.name(),
                        listener = reg.id.0,
                        source_id = reg.meta.source_id,
                        label = reg.meta.label.as_deref(),
                        panic = %panic_message(&*panic),
                        "listener panicked"
                    );
                    out.failed += 1;
                }
            }
        }
        out
    }

    /// Number of listeners registered under `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        listeners.get(event).map_or(0, Vec::len)
    }

    /// Registrations under `event`, in invocation order.
    pub fn registrations(&self, event: &str) -> Vec<(ListenerId, ListenerMeta)> {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        listeners
            .get(event)
            .map(|list| list.iter().map(|r| (r.id, r.meta.clone())).collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventBus")
            .field("events", &listeners.len())
            .field("listeners", &listeners.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}
