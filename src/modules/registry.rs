//! # Module registry - ordinal-ordered, name-indexed.
//!
//! Keeps every registered [`Module`] in two structures that always agree:
//! - an ordinal-sorted sequence (ties keep registration order),
//! - a name → module map.
//!
//! ## Architecture
//! ```text
//! register(module) ──► [writer mutex] ──► active views? ──yes──► Err(ConcurrentModification)
//!                                              │no
//!                                              ▼
//!                                 duplicate name? ──yes──► Err(DuplicateModule)
//!                                              │no
//!                                              ▼
//!                           insert into sorted seq + name map
//!
//! Bus ── USER_CREATED ──► lifecycle listener ──► for m in snapshot(): m.on_user_created()
//! ```
//!
//! ## Rules
//! - Writers are serialized; a duplicate name is rejected, never half-applied.
//! - [`ModuleRegistry::iter_by_ordinal`] hands out a live view, not a copy. While any view is
//!   alive, `register` fails fast with [`RegistryError::ConcurrentModification`].
//! - Modules are never unregistered.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use tracing::{debug, info, warn};

use crate::error::{ListenerError, RegistryError, panic_message};
use crate::events::{ApplicationEvents, EventBus, EventDescriptor, ListenerId, ListenerMeta};
use crate::modules::module::Module;

struct Entry {
    ordinal: i32,
    seq: u64,
    module: Arc<dyn Module>,
}

#[derive(Default)]
struct Modules {
    by_ordinal: Vec<Entry>,
    by_name: HashMap<String, Arc<dyn Module>>,
    next_seq: u64,
}

/// Registry of pluggable modules.
#[derive(Default)]
pub struct ModuleRegistry {
    writer: Mutex<()>,
    modules: RwLock<Modules>,
    active_views: AtomicUsize,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a module and returns it.
    ///
    /// ### Errors
    /// - [`RegistryError::DuplicateModule`] if the name is taken.
    /// - [`RegistryError::ConcurrentModification`] if a [`ModuleView`] is alive.
    pub fn register(&self, module: Arc<dyn Module>) -> Result<Arc<dyn Module>, RegistryError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.active_views.load(Ordering::Acquire) > 0 {
            return Err(RegistryError::ConcurrentModification);
        }

        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        let name = module.name().to_string();
        if modules.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateModule { name });
        }

        let ordinal = module.ordinal();
        let seq = modules.next_seq;
        modules.next_seq += 1;

        let pos = modules
            .by_ordinal
            .partition_point(|e| (e.ordinal, e.seq) < (ordinal, seq));
        modules.by_ordinal.insert(
            pos,
            Entry {
                ordinal,
                seq,
                module: Arc::clone(&module),
            },
        );
        modules.by_name.insert(name.clone(), Arc::clone(&module));

        info!(module = %name, ordinal, "module registered");
        Ok(module)
    }

    /// Looks up a module by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Module>> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        modules.by_name.get(name).cloned()
    }

    /// Returns a live view of the modules in ascending ordinal order.
    ///
    /// Do not register modules while holding the view: `register` will fail.
    pub fn iter_by_ordinal(&self) -> ModuleView<'_> {
        self.active_views.fetch_add(1, Ordering::AcqRel);
        let guard = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        ModuleView {
            guard,
            active_views: &self.active_views,
        }
    }

    /// Returns the modules whose name is in `names`, in ordinal order.
    ///
    /// Unknown names are ignored.
    pub fn filter_by_names(&self, names: &[&str]) -> Vec<Arc<dyn Module>> {
        self.iter_by_ordinal()
            .iter()
            .filter(|m| names.iter().any(|n| *n == m.name()))
            .cloned()
            .collect()
    }

    /// Copies the modules out, in ordinal order.
    pub fn snapshot(&self) -> Vec<Arc<dyn Module>> {
        self.iter_by_ordinal().iter().cloned().collect()
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        modules.by_name.len()
    }

    /// Returns true if no module is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes the six module lifecycle hooks to their events on `bus`.
    ///
    /// Call once during node initialization.
    pub fn wire_lifecycle(self: &Arc<Self>, bus: &EventBus, events: &ApplicationEvents) -> Vec<ListenerId> {
        vec![
            self.hook(bus, &events.user_created, |m, e| m.on_user_created(e)),
            self.hook(bus, &events.user_deleted, |m, e| m.on_user_deleted(e)),
            self.hook(bus, &events.organization_created, |m, e| {
                m.on_organization_created(e)
            }),
            self.hook(bus, &events.organization_deleted, |m, e| {
                m.on_organization_deleted(e)
            }),
            self.hook(bus, &events.user_role_created, |m, e| m.on_user_role_created(e)),
            self.hook(bus, &events.user_role_deleted, |m, e| m.on_user_role_deleted(e)),
        ]
    }

    fn hook<T: 'static>(
        self: &Arc<Self>,
        bus: &EventBus,
        descriptor: &EventDescriptor<T>,
        call: fn(&dyn Module, &T) -> Result<(), ListenerError>,
    ) -> ListenerId {
        let me = Arc::clone(self);
        let event = descriptor.name().to_string();
        let meta = ListenerMeta::default().with_label(format!("modules:{event}"));
        bus.register_listener_with(descriptor, meta, move |payload: &T| {
            me.dispatch(&event, |m| call(m, payload))
        })
    }

    /// Runs `call` on every module in ordinal order, isolating failures per module.
    ///
    /// Hooks run on a snapshot with no lock held, so a hook may look modules up,
    /// emit further lifecycle events or register modules.
    fn dispatch(
        &self,
        event: &str,
        call: impl Fn(&dyn Module) -> Result<(), ListenerError>,
    ) -> Result<(), ListenerError> {
        let mut failed = 0usize;
        for module in self.snapshot() {
            match catch_unwind(AssertUnwindSafe(|| call(module.as_ref()))) {
                Ok(Ok(())) => debug!(event, module = module.name(), "module hook done"),
                Ok(Err(err)) => {
                    warn!(event, module = module.name(), error = %err, "module hook failed");
                    failed += 1;
                }
                Err(panic) => {
                    warn!(
                        event,
                        module = module.name(),
                        panic = %panic_message(&*panic),
                        "module hook panicked"
                    );
                    failed += 1;
                }
            }
        }

        match failed {
            0 => Ok(()),
            n => Err(ListenerError::fail(format!("{n} module hook(s) failed on {event}"))),
        }
    }
}

/// Live, ordinal-ordered view over a [`ModuleRegistry`].
///
/// Holds a read lock; registration fails while any view exists.
pub struct ModuleView<'a> {
    guard: RwLockReadGuard<'a, Modules>,
    active_views: &'a AtomicUsize,
}

impl ModuleView<'_> {
    /// Iterates modules in ascending ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Module>> + '_ {
        self.guard.by_ordinal.iter().map(|e| &e.module)
    }

    /// Module names in ordinal order.
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.guard.by_ordinal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.by_ordinal.is_empty()
    }
}

impl Drop for ModuleView<'_> {
    fn drop(&mut self) {
        self.active_views.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventRegistry, OrganizationEvent, UserEvent};
    use crate::modules::module::BasicModule;
    use std::sync::Mutex as StdMutex;

    fn basic(name: &str, ordinal: i32) -> Arc<dyn Module> {
        Arc::new(BasicModule::new(name, ordinal))
    }

    #[test]
    fn test_iterates_by_ordinal() {
        let reg = ModuleRegistry::new();
        for (name, ord) in [("thirty", 30), ("ten", 10), ("twenty", 20)] {
            reg.register(basic(name, ord)).unwrap();
        }
        let view = reg.iter_by_ordinal();
        let ordinals: Vec<i32> = view.iter().map(|m| m.ordinal()).collect();
        assert_eq!(ordinals, vec![10, 20, 30]);
    }

    #[test]
    fn test_equal_ordinals_keep_registration_order() {
        let reg = ModuleRegistry::new();
        reg.register(basic("first", 5)).unwrap();
        reg.register(basic("second", 5)).unwrap();
        reg.register(basic("zero", 0)).unwrap();
        assert_eq!(reg.iter_by_ordinal().names(), vec!["zero", "first", "second"]);
    }

    #[test]
    fn test_lookup_present_and_missing() {
        let reg = ModuleRegistry::new();
        reg.register(basic("foo", 1)).unwrap();
        assert_eq!(reg.lookup("foo").map(|m| m.ordinal()), Some(1));
        assert!(reg.lookup("missing").is_none());
    }

    #[test]
    fn test_duplicate_rejected_structures_consistent() {
        let reg = ModuleRegistry::new();
        reg.register(basic("foo", 1)).unwrap();
        let err = reg.register(basic("foo", 2)).err().expect("duplicate rejected");
        assert_eq!(err, RegistryError::DuplicateModule { name: "foo".into() });
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.iter_by_ordinal().len(), 1);
        assert_eq!(reg.lookup("foo").map(|m| m.ordinal()), Some(1));
    }

    #[test]
    fn test_register_during_iteration_fails_fast() {
        let reg = ModuleRegistry::new();
        reg.register(basic("a", 1)).unwrap();
        {
            let _view = reg.iter_by_ordinal();
            let err = reg.register(basic("b", 2)).err().expect("view is alive");
            assert_eq!(err, RegistryError::ConcurrentModification);
        }
        reg.register(basic("b", 2)).expect("view dropped");
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_filter_by_names_keeps_ordinal_order() {
        let reg = ModuleRegistry::new();
        reg.register(basic("c", 3)).unwrap();
        reg.register(basic("a", 1)).unwrap();
        reg.register(basic("b", 2)).unwrap();
        let names: Vec<String> = reg
            .filter_by_names(&["c", "a", "nope"])
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    struct Recording {
        name: &'static str,
        ordinal: i32,
        log: Arc<StdMutex<Vec<String>>>,
        fail: bool,
    }

    impl Module for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn ordinal(&self) -> i32 {
            self.ordinal
        }

        fn on_user_created(&self, ev: &UserEvent) -> Result<(), ListenerError> {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, ev.user_id));
            if self.fail {
                return Err(ListenerError::fail("nope"));
            }
            Ok(())
        }

        fn on_organization_deleted(&self, ev: &OrganizationEvent) -> Result<(), ListenerError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:org-{}", self.name, ev.organization_id));
            Ok(())
        }
    }

    #[test]
    fn test_lifecycle_hooks_run_in_ordinal_order_and_isolate_failures() {
        let mut events_reg = EventRegistry::new();
        let events = ApplicationEvents::register(&mut events_reg);
        let bus = EventBus::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let reg = ModuleRegistry::new();
        for (name, ordinal, fail) in [("late", 20, false), ("early", 10, true)] {
            reg.register(Arc::new(Recording {
                name,
                ordinal,
                log: Arc::clone(&log),
                fail,
            }))
            .unwrap();
        }
        let ids = reg.wire_lifecycle(&bus, &events);
        assert_eq!(ids.len(), 6);

        let out = bus.emit(
            &events.user_created,
            &UserEvent {
                user_id: 42,
                email: "a@b.c".into(),
            },
        );
        assert_eq!(out.failed, 1, "failing hook is reported once per emit");

        bus.emit(
            &events.organization_deleted,
            &OrganizationEvent {
                organization_id: 3,
                name: "acme".into(),
            },
        );

        assert_eq!(
            *log.lock().unwrap(),
            vec!["early:42", "late:42", "early:org-3", "late:org-3"]
        );
    }

    struct Spawner {
        registry: Arc<ModuleRegistry>,
    }

    impl Module for Spawner {
        fn name(&self) -> &str {
            "spawner"
        }

        fn ordinal(&self) -> i32 {
            1
        }

        fn on_user_created(&self, ev: &UserEvent) -> Result<(), ListenerError> {
            assert!(self.registry.lookup("spawner").is_some());
            self.registry
                .register(basic(&format!("child-{}", ev.user_id), 2))
                .map(|_| ())
                .map_err(|e| ListenerError::fail(e.to_string()))
        }
    }

    #[test]
    fn test_hooks_run_without_registry_lock() {
        let mut events_reg = EventRegistry::new();
        let events = ApplicationEvents::register(&mut events_reg);
        let bus = EventBus::new();
        let reg = ModuleRegistry::new();
        reg.register(Arc::new(Spawner {
            registry: Arc::clone(&reg),
        }))
        .unwrap();
        reg.wire_lifecycle(&bus, &events);

        let out = bus.emit(
            &events.user_created,
            &UserEvent {
                user_id: 7,
                email: "a@b.c".into(),
            },
        );
        assert_eq!(out.failed, 0);
        assert_eq!(reg.iter_by_ordinal().names(), vec!["spawner", "child-7"]);
    }

    #[test]
    fn test_default_hooks_succeed() {
        let mut events_reg = EventRegistry::new();
        let events = ApplicationEvents::register(&mut events_reg);
        let bus = EventBus::new();
        let reg = ModuleRegistry::new();
        reg.register(basic("plain", 1)).unwrap();
        reg.wire_lifecycle(&bus, &events);

        let out = bus.emit(
            &events.user_role_created,
            &crate::events::UserRoleEvent {
                user_id: 1,
                role_id: 2,
                organization_id: None,
            },
        );
        assert_eq!(out, crate::events::FanOut { delivered: 1, failed: 0 });
    }
}
