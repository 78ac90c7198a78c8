//! # Event-listener service - dynamic bus registrations reconciled against listener rows.
//!
//! A listener row says "when event `event_name` fires, call consumer `consumer` with
//! these `static_data` strings". This service keeps exactly one bus registration per row.
//!
//! ```text
//! load_from_db(id) ──► repo.find(id)
//!                        ├─ None                 → unregister(id)
//!                        ├─ same def registered  → no-op
//!                        └─ new/changed def      → unregister(id)
//!                                                  → registry.lookup(event_name)   (UnknownEvent)
//!                                                  → catalog.bind(consumer, ...)   (UnknownConsumer / PayloadMismatch)
//!                                                  → bus.register_erased(meta.source_id = id)
//! ```
//!
//! ## Rules
//! - At most **one** bus registration per row id.
//! - A row that no longer resolves loses its previous registration; it is not kept stale.
//! - `unregister_event_listener` of an unknown id is a no-op.
//! - `load_all` also drops registrations whose row is no longer in the table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ReconcileError;
use crate::events::{EventBus, EventRegistry, ListenerId, ListenerMeta};
use crate::services::ConsumerCatalog;
use crate::store::{Repository, Row};

/// A dynamic listener row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerDef {
    pub id: i64,
    /// Registered event name, e.g. `USER_CREATED`.
    pub event_name: String,
    /// Consumer name in the [`ConsumerCatalog`].
    pub consumer: String,
    /// Extra arguments handed to the consumer on every call.
    pub static_data: Vec<String>,
}

impl Row for ListenerDef {
    fn id(&self) -> i64 {
        self.id
    }
}

struct Active {
    def: ListenerDef,
    listener: ListenerId,
}

/// Registry of row-backed bus listeners on this node.
pub struct EventListenerService {
    repo: Arc<dyn Repository<ListenerDef>>,
    bus: Arc<EventBus>,
    events: Arc<EventRegistry>,
    catalog: Arc<ConsumerCatalog>,
    active: RwLock<HashMap<i64, Active>>,
}

impl EventListenerService {
    pub fn new(
        repo: Arc<dyn Repository<ListenerDef>>,
        bus: Arc<EventBus>,
        events: Arc<EventRegistry>,
        catalog: Arc<ConsumerCatalog>,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            bus,
            events,
            catalog,
            active: RwLock::new(HashMap::new()),
        })
    }

    /// Reads row `id` and registers, re-registers or drops its bus listener to match.
    pub async fn load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
        match self.repo.find(id).await? {
            Some(def) => self.apply(def).await,
            None => {
                debug!(listener_row = id, "row not found; treating as deleted");
                self.drop_registration(id).await;
                Ok(())
            }
        }
    }

    /// Drops the bus registration of row `id`, if any.
    pub async fn unregister_event_listener(&self, id: i64) -> Result<(), ReconcileError> {
        self.drop_registration(id).await;
        Ok(())
    }

    /// Drops the registration of row `id` and loads the row again.
    pub async fn remove_and_load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
        self.drop_registration(id).await;
        self.load_from_db(id).await
    }

    /// Brings the registrations in line with the whole table: rows gone from the store
    /// are dropped, every present row is applied.
    ///
    /// Rows that fail to resolve are skipped; the first such error is returned after
    /// all other rows have been applied.
    pub async fn load_all(&self) -> Result<usize, ReconcileError> {
        let rows = self.repo.all().await?;
        let present: HashSet<i64> = rows.iter().map(|d| d.id).collect();
        let stale: Vec<i64> = {
            let active = self.active.read().await;
            active.keys().copied().filter(|id| !present.contains(id)).collect()
        };
        for id in stale {
            debug!(listener_row = id, "row gone from table; dropping registration");
            self.drop_registration(id).await;
        }

        let mut first_err = None;
        for def in rows {
            if let Err(e) = self.apply(def).await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(self.len().await),
        }
    }

    /// Returns true if row `id` currently has a bus registration.
    pub async fn is_registered(&self, id: i64) -> bool {
        self.active.read().await.contains_key(&id)
    }

    /// Returns the definition row `id` is registered with.
    pub async fn definition(&self, id: i64) -> Option<ListenerDef> {
        self.active.read().await.get(&id).map(|a| a.def.clone())
    }

    /// Sorted ids of registered rows.
    pub async fn registered_ids(&self) -> Vec<i64> {
        let active = self.active.read().await;
        let mut ids: Vec<i64> = active.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn len(&self) -> usize {
        self.active.read().await.len()
    }

    async fn apply(&self, def: ListenerDef) -> Result<(), ReconcileError> {
        let id = def.id;
        let mut active = self.active.write().await;
        if active.get(&id).is_some_and(|a| a.def == def) {
            debug!(listener_row = id, "listener already registered with this definition");
            return Ok(());
        }

        if let Some(old) = active.remove(&id) {
            self.bus.unregister(old.listener);
        }

        let event = self
            .events
            .lookup(&def.event_name)
            .ok_or_else(|| ReconcileError::UnknownEvent {
                name: def.event_name.clone(),
            })?;
        let consumer = self.catalog.bind(&def.consumer, event, &def.static_data)?;

        let meta = ListenerMeta::from_source(id).with_label(def.consumer.as_str());
        let listener = self.bus.register_erased(event, meta, consumer);
        info!(
            listener_row = id,
            event = %def.event_name,
            consumer = %def.consumer,
            "listener registered"
        );
        active.insert(id, Active { def, listener });
        Ok(())
    }

    async fn drop_registration(&self, id: i64) {
        let removed = self.active.write().await.remove(&id);
        if let Some(old) = removed {
            self.bus.unregister(old.listener);
            info!(listener_row = id, "listener unregistered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ApplicationEvents, UserEvent};
    use crate::store::MemoryRepository;
    use std::sync::Mutex;

    struct Fixture {
        repo: Arc<MemoryRepository<ListenerDef>>,
        bus: Arc<EventBus>,
        events: ApplicationEvents,
        svc: Arc<EventListenerService>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let mut reg = EventRegistry::new();
        let events = ApplicationEvents::register(&mut reg);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut catalog = ConsumerCatalog::new();
        let sink = Arc::clone(&seen);
        catalog.register("record", move |ev: &UserEvent, data: &[String]| {
            sink.lock().unwrap().push(format!("{}:{}", ev.email, data.join(",")));
            Ok(())
        });

        let repo = Arc::new(MemoryRepository::new("event_listener"));
        let bus = Arc::new(EventBus::new());
        let svc = EventListenerService::new(
            repo.clone(),
            Arc::clone(&bus),
            Arc::new(reg),
            Arc::new(catalog),
        );
        Fixture {
            repo,
            bus,
            events,
            svc,
            seen,
        }
    }

    fn row(id: i64, event: &str, data: &[&str]) -> ListenerDef {
        ListenerDef {
            id,
            event_name: event.to_string(),
            consumer: "record".to_string(),
            static_data: data.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn user(email: &str) -> UserEvent {
        UserEvent {
            user_id: 1,
            email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn test_load_registers_once() {
        let f = fixture();
        f.repo.upsert(row(4, "USER_CREATED", &["hi"]));
        f.svc.load_from_db(4).await.unwrap();
        f.svc.load_from_db(4).await.unwrap();

        assert_eq!(f.bus.listener_count("USER_CREATED"), 1);
        f.bus.emit(&f.events.user_created, &user("a@x"));
        assert_eq!(*f.seen.lock().unwrap(), vec!["a@x:hi".to_string()]);
    }

    #[tokio::test]
    async fn test_registration_carries_source_id() {
        let f = fixture();
        f.repo.upsert(row(8, "USER_CREATED", &[]));
        f.svc.load_from_db(8).await.unwrap();

        let regs = f.bus.registrations("USER_CREATED");
        assert_eq!(regs.len(), 1);
        assert_eq!(regs[0].1.source_id, Some(8));
    }

    #[tokio::test]
    async fn test_reload_moves_listener_to_new_event() {
        let f = fixture();
        f.repo.upsert(row(2, "USER_CREATED", &[]));
        f.svc.load_from_db(2).await.unwrap();

        f.repo.upsert(row(2, "USER_DELETED", &[]));
        f.svc.remove_and_load_from_db(2).await.unwrap();
        assert_eq!(f.bus.listener_count("USER_CREATED"), 0);
        assert_eq!(f.bus.listener_count("USER_DELETED"), 1);
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_noop() {
        let f = fixture();
        f.svc.unregister_event_listener(42).await.unwrap();
        assert_eq!(f.svc.len().await, 0);
    }

    #[tokio::test]
    async fn test_deleted_row_drops_registration() {
        let f = fixture();
        f.repo.upsert(row(3, "USER_CREATED", &[]));
        f.svc.load_from_db(3).await.unwrap();
        f.repo.delete(3);
        f.svc.load_from_db(3).await.unwrap();
        assert!(!f.svc.is_registered(3).await);
        assert_eq!(f.bus.listener_count("USER_CREATED"), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_rows_are_rejected() {
        let f = fixture();
        f.repo.upsert(row(1, "NO_SUCH_EVENT", &[]));
        let err = f.svc.load_from_db(1).await.unwrap_err();
        assert_eq!(err.as_label(), "reconcile_unknown_event");

        f.repo.upsert(ListenerDef {
            consumer: "missing".into(),
            ..row(2, "USER_CREATED", &[])
        });
        let err = f.svc.load_from_db(2).await.unwrap_err();
        assert_eq!(err.as_label(), "reconcile_unknown_consumer");

        f.repo.upsert(row(3, "ORGANIZATION_CREATED", &[]));
        let err = f.svc.load_from_db(3).await.unwrap_err();
        assert_eq!(err.as_label(), "reconcile_payload_mismatch");
        assert_eq!(f.svc.len().await, 0);
    }

    #[tokio::test]
    async fn test_broken_update_drops_old_registration() {
        let f = fixture();
        f.repo.upsert(row(5, "USER_CREATED", &[]));
        f.svc.load_from_db(5).await.unwrap();

        f.repo.upsert(row(5, "NO_SUCH_EVENT", &[]));
        assert!(f.svc.load_from_db(5).await.is_err());
        assert_eq!(f.bus.listener_count("USER_CREATED"), 0);
    }

    #[tokio::test]
    async fn test_load_all_drops_deleted_rows() {
        let f = fixture();
        f.repo.upsert(row(1, "USER_CREATED", &["one"]));
        f.repo.upsert(row(2, "USER_CREATED", &["two"]));
        assert_eq!(f.svc.load_all().await.unwrap(), 2);

        f.repo.delete(2);
        assert_eq!(f.svc.load_all().await.unwrap(), 1);
        assert_eq!(f.svc.registered_ids().await, vec![1]);

        f.bus.emit(&f.events.user_created, &user("a@x"));
        assert_eq!(*f.seen.lock().unwrap(), vec!["a@x:one".to_string()]);
    }

    #[tokio::test]
    async fn test_load_all_applies_valid_rows_and_reports_first_error() {
        let f = fixture();
        f.repo.upsert(row(1, "USER_CREATED", &[]));
        f.repo.upsert(row(2, "NO_SUCH_EVENT", &[]));
        f.repo.upsert(row(3, "USER_DELETED", &[]));

        let err = f.svc.load_all().await.unwrap_err();
        assert_eq!(err.as_label(), "reconcile_unknown_event");
        assert_eq!(f.svc.registered_ids().await, vec![1, 3]);
    }
}
