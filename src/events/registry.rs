//! # Event registry: event name → descriptor.
//!
//! [`EventRegistry`] is built once at process start and then shared (usually behind an
//! `Arc`) with everything that needs to resolve events by name, e.g. the dynamic
//! listener service.
//!
//! ## Rules
//! - `register` takes `&mut self`: registration can only happen while the registry is
//!   still exclusively owned, i.e. during initialization.
//! - `lookup` takes `&self`: after initialization it is a plain concurrent read.
//! - Registering a name twice **overwrites** the earlier descriptor (a warning is logged).
//!   Use [`EventRegistry::try_register`] to reject duplicates instead.

use std::collections::HashMap;

use tracing::warn;

use crate::error::RegistryError;
use crate::events::descriptor::{ErasedDescriptor, EventDescriptor};

/// Name-indexed registry of event descriptors.
#[derive(Default, Debug)]
pub struct EventRegistry {
    by_name: HashMap<String, ErasedDescriptor>,
}

impl EventRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an event with payload type `T` under `name`.
    ///
    /// A previous descriptor with the same name is replaced; `lookup` returns the
    /// most recently registered one.
    pub fn register<T: 'static>(&mut self, name: &str) -> EventDescriptor<T> {
        let descriptor = EventDescriptor::<T>::new(name);
        if let Some(prev) = self.by_name.insert(name.to_string(), descriptor.erased()) {
            warn!(
                event = name,
                previous_payload = prev.payload_type_name(),
                payload = std::any::type_name::<T>(),
                "event descriptor overwritten"
            );
        }
        descriptor
    }

    /// Registers an event, failing if the name is already taken.
    pub fn try_register<T: 'static>(
        &mut self,
        name: &str,
    ) -> Result<EventDescriptor<T>, RegistryError> {
        if self.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateEvent {
                name: name.to_string(),
            });
        }
        Ok(self.register(name))
    }

    /// Looks up a descriptor by name.
    pub fn lookup(&self, name: &str) -> Option<&ErasedDescriptor> {
        self.by_name.get(name)
    }

    /// Looks up a descriptor by name, returning it only if the payload type is `T`.
    pub fn lookup_typed<T: 'static>(&self, name: &str) -> Option<EventDescriptor<T>> {
        self.lookup(name).and_then(ErasedDescriptor::typed)
    }

    /// Returns all registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered events.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns true if no event is registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
