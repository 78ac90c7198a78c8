//! # Typed event descriptors.
//!
//! An [`EventDescriptor<T>`] pairs a unique event name with the payload type `T`.
//! Descriptors are created once by [`EventRegistry::register`](crate::EventRegistry::register)
//! and then only cloned; they are never mutated.
//!
//! [`ErasedDescriptor`] is the same pair with the payload type erased to a [`TypeId`],
//! which is what name-based lookup returns.
//!
//! ## Equality
//! Both types compare and hash over `(payload TypeId, name)`, so two descriptors with the
//! same name but different payload types are different keys.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Immutable `(payload type, name)` pair identifying a kind of application event.
pub struct EventDescriptor<T> {
    name: Arc<str>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: 'static> EventDescriptor<T> {
    pub(crate) fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            _payload: PhantomData,
        }
    }

    /// Returns the event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type-erased form of this descriptor.
    pub fn erased(&self) -> ErasedDescriptor {
        ErasedDescriptor {
            name: Arc::clone(&self.name),
            payload: TypeId::of::<T>(),
            payload_name: type_name::<T>(),
        }
    }
}

// Manual impls: derives would require `T: Clone`/`T: PartialEq`.
impl<T> Clone for EventDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            _payload: PhantomData,
        }
    }
}

impl<T> PartialEq for EventDescriptor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for EventDescriptor<T> {}

impl<T: 'static> Hash for EventDescriptor<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        TypeId::of::<T>().hash(state);
        self.name.hash(state);
    }
}

impl<T> fmt::Debug for EventDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDescriptor")
            .field("name", &self.name)
            .field("payload", &type_name::<T>())
            .finish()
    }
}

/// Event descriptor with the payload type erased.
///
/// Returned by [`EventRegistry::lookup`](crate::EventRegistry::lookup); use
/// [`ErasedDescriptor::typed`] to recover an [`EventDescriptor<T>`].
#[derive(Clone, Debug)]
pub struct ErasedDescriptor {
    name: Arc<str>,
    payload: TypeId,
    payload_name: &'static str,
}

impl ErasedDescriptor {
    /// Returns the event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the payload [`TypeId`].
    pub fn payload_type(&self) -> TypeId {
        self.payload
    }

    /// Returns the payload type name (diagnostics only).
    pub fn payload_type_name(&self) -> &'static str {
        self.payload_name
    }

    /// Returns `true` if the payload type is `T`.
    pub fn carries<T: 'static>(&self) -> bool {
        self.payload == TypeId::of::<T>()
    }

    /// Recovers the typed descriptor if the payload type is `T`.
    pub fn typed<T: 'static>(&self) -> Option<EventDescriptor<T>> {
        self.carries::<T>()
            .then(|| EventDescriptor::new(Arc::clone(&self.name)))
    }
}

impl PartialEq for ErasedDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload && self.name == other.name
    }
}

impl Eq for ErasedDescriptor {}

impl Hash for ErasedDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.hash(state);
        self.name.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_erased_equality_includes_payload_type() {
        let a = EventDescriptor::<u32>::new("X").erased();
        let b = EventDescriptor::<String>::new("X").erased();
        let c = EventDescriptor::<u32>::new("X").erased();
        assert_ne!(a, b);
        assert_eq!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_typed_round_trip_checks_type() {
        let erased = EventDescriptor::<u64>::new("COUNT").erased();
        assert!(erased.typed::<u64>().is_some());
        assert!(erased.typed::<i64>().is_none());
        assert_eq!(erased.typed::<u64>().map(|d| d.name().to_string()).as_deref(), Some("COUNT"));
    }
}
