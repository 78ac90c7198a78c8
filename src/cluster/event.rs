//! # Cluster messages.
//!
//! A [`ClusterEvent`] names one entity of one subsystem and what happened to it.
//! It carries only the id: receivers re-read the row from the store.
//!
//! Wire form (JSON):
//! ```json
//! {"event_type":"SCHEDULER_ADD","entity_id":5}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Subsystem a message targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Subsystem {
    Scheduler,
    EventListener,
    Form,
}

/// What happened to the entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Add,
    Remove,
    Reload,
}

/// The nine cluster message kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterEventType {
    SchedulerAdd,
    SchedulerRemove,
    SchedulerReload,
    EventListenerAdd,
    EventListenerRemove,
    EventListenerReload,
    FormAdd,
    FormReload,
    FormRemove,
}

impl ClusterEventType {
    /// Every kind, grouped by subsystem.
    pub const ALL: [ClusterEventType; 9] = [
        ClusterEventType::SchedulerAdd,
        ClusterEventType::SchedulerRemove,
        ClusterEventType::SchedulerReload,
        ClusterEventType::EventListenerAdd,
        ClusterEventType::EventListenerRemove,
        ClusterEventType::EventListenerReload,
        ClusterEventType::FormAdd,
        ClusterEventType::FormReload,
        ClusterEventType::FormRemove,
    ];

    /// Builds the kind for a subsystem/action pair.
    pub fn new(subsystem: Subsystem, action: Action) -> Self {
        match (subsystem, action) {
            (Subsystem::Scheduler, Action::Add) => ClusterEventType::SchedulerAdd,
            (Subsystem::Scheduler, Action::Remove) => ClusterEventType::SchedulerRemove,
            (Subsystem::Scheduler, Action::Reload) => ClusterEventType::SchedulerReload,
            (Subsystem::EventListener, Action::Add) => ClusterEventType::EventListenerAdd,
            (Subsystem::EventListener, Action::Remove) => ClusterEventType::EventListenerRemove,
            (Subsystem::EventListener, Action::Reload) => ClusterEventType::EventListenerReload,
            (Subsystem::Form, Action::Add) => ClusterEventType::FormAdd,
            (Subsystem::Form, Action::Remove) => ClusterEventType::FormRemove,
            (Subsystem::Form, Action::Reload) => ClusterEventType::FormReload,
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        match self {
            ClusterEventType::SchedulerAdd
            | ClusterEventType::SchedulerRemove
            | ClusterEventType::SchedulerReload => Subsystem::Scheduler,
            ClusterEventType::EventListenerAdd
            | ClusterEventType::EventListenerRemove
            | ClusterEventType::EventListenerReload => Subsystem::EventListener,
            ClusterEventType::FormAdd | ClusterEventType::FormReload | ClusterEventType::FormRemove => {
                Subsystem::Form
            }
        }
    }

    pub fn action(&self) -> Action {
        match self {
            ClusterEventType::SchedulerAdd
            | ClusterEventType::EventListenerAdd
            | ClusterEventType::FormAdd => Action::Add,
            ClusterEventType::SchedulerRemove
            | ClusterEventType::EventListenerRemove
            | ClusterEventType::FormRemove => Action::Remove,
            ClusterEventType::SchedulerReload
            | ClusterEventType::EventListenerReload
            | ClusterEventType::FormReload => Action::Reload,
        }
    }

    /// Returns the wire name (e.g. `SCHEDULER_ADD`).
    pub fn as_label(&self) -> &'static str {
        match self {
            ClusterEventType::SchedulerAdd => "SCHEDULER_ADD",
            ClusterEventType::SchedulerRemove => "SCHEDULER_REMOVE",
            ClusterEventType::SchedulerReload => "SCHEDULER_RELOAD",
            ClusterEventType::EventListenerAdd => "EVENT_LISTENER_ADD",
            ClusterEventType::EventListenerRemove => "EVENT_LISTENER_REMOVE",
            ClusterEventType::EventListenerReload => "EVENT_LISTENER_RELOAD",
            ClusterEventType::FormAdd => "FORM_ADD",
            ClusterEventType::FormReload => "FORM_RELOAD",
            ClusterEventType::FormRemove => "FORM_REMOVE",
        }
    }
}

impl fmt::Display for ClusterEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Message exchanged between nodes over the cluster topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub event_type: ClusterEventType,
    pub entity_id: i64,
}

impl ClusterEvent {
    pub fn new(event_type: ClusterEventType, entity_id: i64) -> Self {
        Self {
            event_type,
            entity_id,
        }
    }
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.event_type, self.entity_id)
    }
}
