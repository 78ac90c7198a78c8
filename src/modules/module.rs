//! # Pluggable module trait.
//!
//! A [`Module`] is a named unit with an ordinal that decides its position in iteration.
//! It reacts to six core lifecycle events through hook methods; every hook defaults to
//! `Ok(())`, so a module only overrides what it cares about.
//!
//! ## Example
//! ```rust
//! use clusterbus::{ListenerError, Module, UserEvent};
//!
//! struct Audit;
//!
//! impl Module for Audit {
//!     fn name(&self) -> &str { "audit" }
//!     fn ordinal(&self) -> i32 { 100 }
//!
//!     fn on_user_created(&self, ev: &UserEvent) -> Result<(), ListenerError> {
//!         println!("user {} created", ev.user_id);
//!         Ok(())
//!     }
//! }
//! ```

use crate::error::ListenerError;
use crate::events::{OrganizationEvent, UserEvent, UserRoleEvent};

/// Named, ordinal-ordered extension unit.
///
/// Hooks run synchronously on the thread that emitted the lifecycle event,
/// in ascending ordinal order across modules. An `Err` or panic from one hook is
/// logged and the remaining modules still run.
pub trait Module: Send + Sync + 'static {
    /// Unique module name.
    fn name(&self) -> &str;

    /// Position in iteration order (ascending).
    fn ordinal(&self) -> i32;

    /// Called on `USER_CREATED`.
    fn on_user_created(&self, _ev: &UserEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called on `USER_DELETED`.
    fn on_user_deleted(&self, _ev: &UserEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called on `ORGANIZATION_CREATED`.
    fn on_organization_created(&self, _ev: &OrganizationEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called on `ORGANIZATION_DELETED`.
    fn on_organization_deleted(&self, _ev: &OrganizationEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called on `USER_ROLE_CREATED`.
    fn on_user_role_created(&self, _ev: &UserRoleEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called on `USER_ROLE_DELETED`.
    fn on_user_role_deleted(&self, _ev: &UserRoleEvent) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Hook-less module defined by name and ordinal only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicModule {
    name: String,
    ordinal: i32,
}

impl BasicModule {
    /// Creates a module that only contributes a name and a position.
    pub fn new(name: impl Into<String>, ordinal: i32) -> Self {
        Self {
            name: name.into(),
            ordinal,
        }
    }
}

impl Module for BasicModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }
}
