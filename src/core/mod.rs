//! Node assembly and lifecycle.
//!
//! The public API of this module is [`Node`], its [`NodeBuilder`] and [`LoadReport`].
//!
//! Internal modules:
//! - [`builder`]: wires registry, bus, modules, services, dispatcher and sender;
//! - [`node`]: start, startup load, graceful shutdown and signal handling.

mod builder;
mod node;

pub use builder::NodeBuilder;
pub use node::{LoadReport, Node};
