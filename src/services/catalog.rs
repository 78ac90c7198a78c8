//! # Consumer catalog.
//!
//! Listener rows name their consumer by string. The catalog maps those names to typed
//! consumer functions registered by the application at startup, and binds a row's
//! static data into a bus-ready consumer.
//!
//! A consumer receives the event payload plus the `static_data` strings of its row:
//! ```rust
//! use clusterbus::{ConsumerCatalog, UserEvent};
//!
//! let mut catalog = ConsumerCatalog::new();
//! catalog.register("welcome_mail", |ev: &UserEvent, data: &[String]| {
//!     let _template = data.first().map(String::as_str).unwrap_or("default");
//!     let _to = &ev.email;
//!     Ok(())
//! });
//! assert!(catalog.contains("welcome_mail"));
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::{ListenerError, ReconcileError};
use crate::events::{ErasedConsumer, ErasedDescriptor};

type Factory = Arc<dyn Fn(Arc<[String]>) -> ErasedConsumer + Send + Sync>;

struct Entry {
    payload: TypeId,
    payload_name: &'static str,
    factory: Factory,
}

/// Named, typed consumers available to listener rows.
#[derive(Default)]
pub struct ConsumerCatalog {
    entries: HashMap<String, Entry>,
}

impl ConsumerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a consumer under `name`. A later registration with the same name wins.
    pub fn register<T, F>(&mut self, name: &str, consumer: F)
    where
        T: 'static,
        F: Fn(&T, &[String]) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let consumer = Arc::new(consumer);
        let factory: Factory = Arc::new(move |data: Arc<[String]>| -> ErasedConsumer {
            let consumer = Arc::clone(&consumer);
            Arc::new(move |payload: &dyn Any| match payload.downcast_ref::<T>() {
                Some(p) => consumer(p, &data),
                None => Err(ListenerError::Rejected {
                    reason: format!("expected payload {}", std::any::type_name::<T>()),
                }),
            })
        });

        let entry = Entry {
            payload: TypeId::of::<T>(),
            payload_name: std::any::type_name::<T>(),
            factory,
        };
        if self.entries.insert(name.to_string(), entry).is_some() {
            warn!(consumer = name, "consumer re-registered; previous one replaced");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Sorted consumer names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the consumer for `name`, bound to `static_data`, after checking it
    /// accepts the payload type of `event`.
    pub(crate) fn bind(
        &self,
        name: &str,
        event: &ErasedDescriptor,
        static_data: &[String],
    ) -> Result<ErasedConsumer, ReconcileError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ReconcileError::UnknownConsumer {
                name: name.to_string(),
            })?;

        if entry.payload != event.payload_type() {
            return Err(ReconcileError::PayloadMismatch {
                event: event.name().to_string(),
                consumer: name.to_string(),
                expected: entry.payload_name,
                found: event.payload_type_name(),
            });
        }
        Ok((entry.factory)(Arc::from(static_data)))
    }
}

impl fmt::Debug for ConsumerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerCatalog")
            .field("consumers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventRegistry;

    struct Created(i64);
    struct Other;

    #[test]
    fn test_bind_passes_static_data() {
        let mut reg = EventRegistry::new();
        let created = reg.register::<Created>("CREATED");

        let mut catalog = ConsumerCatalog::new();
        catalog.register("check", |ev: &Created, data: &[String]| {
            if ev.0 == 1 && data == ["x".to_string(), "y".to_string()] {
                Ok(())
            } else {
                Err(ListenerError::fail("unexpected input"))
            }
        });

        let consumer = catalog
            .bind("check", &created.erased(), &["x".into(), "y".into()])
            .unwrap();
        assert!(consumer(&Created(1)).is_ok());
        assert!(consumer(&Created(2)).is_err());
    }

    #[test]
    fn test_unknown_consumer() {
        let mut reg = EventRegistry::new();
        let created = reg.register::<Created>("CREATED");
        let catalog = ConsumerCatalog::new();
        let err = catalog.bind("nope", &created.erased(), &[]).err().unwrap();
        assert_eq!(err.as_label(), "reconcile_unknown_consumer");
    }

    #[test]
    fn test_payload_mismatch_rejected() {
        let mut reg = EventRegistry::new();
        let created = reg.register::<Created>("CREATED");
        let mut catalog = ConsumerCatalog::new();
        catalog.register("other", |_: &Other, _: &[String]| Ok(()));

        let err = catalog.bind("other", &created.erased(), &[]).err().unwrap();
        assert!(matches!(err, ReconcileError::PayloadMismatch { .. }));
    }

    #[test]
    fn test_names_sorted() {
        let mut catalog = ConsumerCatalog::new();
        catalog.register("b", |_: &Other, _: &[String]| Ok(()));
        catalog.register("a", |_: &Other, _: &[String]| Ok(()));
        assert_eq!(catalog.names(), vec!["a", "b"]);
    }
}
