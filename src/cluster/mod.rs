//! # Cluster propagation.
//!
//! ```text
//!  node A                                   topic                          node B
//! ┌──────────────────────┐   publish   ┌──────────────┐   subscribe   ┌──────────────────────┐
//! │ ClusterEventSender   ├────────────►│ ClusterTopic ├──────────────►│ ClusterDispatcher    │
//! └──────────────────────┘             └──────┬───────┘               │  → Scheduler/Listener│
//!            ┌────────────────────────────────┘ (self-delivery)       │    /Form service     │
//!            ▼                                                        └──────────────────────┘
//!  node A ClusterDispatcher → services
//! ```
//!
//! - [`ClusterEvent`] / [`ClusterEventType`]: wire message (kind + entity id)
//! - [`ClusterTopic`] / [`LocalTopic`]: pub/sub seam and its in-process implementation
//! - [`ClusterDispatcher`]: routes each message to the owning service
//! - [`ClusterEventSender`]: publishes, or applies locally when not cluster-aware

mod dispatcher;
mod event;
mod sender;
mod topic;

pub use dispatcher::{ClusterDispatcher, Outcome};
pub use event::{Action, ClusterEvent, ClusterEventType, Subsystem};
pub use sender::ClusterEventSender;
pub use topic::{ClusterTopic, Delivery, LocalTopic, Subscription};
