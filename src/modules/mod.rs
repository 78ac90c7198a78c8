//! # Pluggable modules.
//!
//! - [`Module`] trait with six lifecycle hooks (user / organization / user-role, created / deleted)
//! - [`BasicModule`] hook-less module (name + ordinal)
//! - [`ModuleRegistry`] ordinal-ordered, name-indexed registry, wired to the bus by
//!   [`ModuleRegistry::wire_lifecycle`]

mod module;
mod registry;

pub use module::{BasicModule, Module};
pub use registry::{ModuleRegistry, ModuleView};
