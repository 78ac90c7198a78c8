//! # Canonical application events.
//!
//! The platform emits a fixed set of events from its core services. They are
//! registered in one go by [`ApplicationEvents::register`], which returns the typed
//! descriptors for direct use and leaves the registry able to resolve them by name
//! (dynamic listener rows refer to events by name only).
//!
//! | name                   | payload          |
//! |------------------------|------------------|
//! | `USER_CREATED`         | [`UserEvent`]          |
//! | `USER_MODIFIED`        | [`UserEvent`]          |
//! | `USER_DELETED`         | [`UserEvent`]          |
//! | `USER_LOGGED_IN`       | [`UserEvent`]          |
//! | `ORGANIZATION_CREATED` | [`OrganizationEvent`]  |
//! | `ORGANIZATION_MODIFIED`| [`OrganizationEvent`]  |
//! | `ORGANIZATION_DELETED` | [`OrganizationEvent`]  |
//! | `USER_ROLE_CREATED`    | [`UserRoleEvent`]      |
//! | `USER_ROLE_MODIFIED`   | [`UserRoleEvent`]      |
//! | `USER_ROLE_DELETED`    | [`UserRoleEvent`]      |
//! | `SCHEDULER_EXECUTED`   | [`ScheduledRun`]       |
//! | `APPLICATION_STARTED`  | [`ApplicationStarted`] |

use std::time::SystemTime;

use crate::events::descriptor::EventDescriptor;
use crate::events::registry::EventRegistry;

/// Payload of user lifecycle events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserEvent {
    /// Id of the affected user.
    pub user_id: i64,
    /// Login email at the time of the event.
    pub email: String,
}

/// Payload of organization lifecycle events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrganizationEvent {
    /// Id of the affected organization.
    pub organization_id: i64,
    /// Display name at the time of the event.
    pub name: String,
}

/// Payload of user-role lifecycle events.
///
/// `organization_id` is `None` for global roles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRoleEvent {
    /// User the role is granted to or taken from.
    pub user_id: i64,
    /// Granted role.
    pub role_id: i64,
    /// Scope of the grant.
    pub organization_id: Option<i64>,
}

/// Emitted each time a live scheduler timer fires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledRun {
    /// Scheduler row id.
    pub scheduler_id: i64,
    /// Free-form data configured on the row.
    pub event_data: String,
    /// Wall-clock time of the firing.
    pub fired_at: SystemTime,
}

/// Emitted once after a node finished its startup load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationStarted {
    /// [`Config::node_id`](crate::Config::node_id) of the node that finished loading.
    pub node_id: String,
}

/// Typed descriptors of the canonical application events.
///
/// Field `foo_bar` is the descriptor of event `FOO_BAR`; see the table above for payloads.
#[derive(Clone, Debug)]
pub struct ApplicationEvents {
    pub user_created: EventDescriptor<UserEvent>,
    pub user_modified: EventDescriptor<UserEvent>,
    pub user_deleted: EventDescriptor<UserEvent>,
    pub user_logged_in: EventDescriptor<UserEvent>,
    pub organization_created: EventDescriptor<OrganizationEvent>,
    pub organization_modified: EventDescriptor<OrganizationEvent>,
    pub organization_deleted: EventDescriptor<OrganizationEvent>,
    pub user_role_created: EventDescriptor<UserRoleEvent>,
    pub user_role_modified: EventDescriptor<UserRoleEvent>,
    pub user_role_deleted: EventDescriptor<UserRoleEvent>,
    pub scheduler_executed: EventDescriptor<ScheduledRun>,
    pub application_started: EventDescriptor<ApplicationStarted>,
}

impl ApplicationEvents {
    /// Registers every canonical event into `registry`.
    pub fn register(registry: &mut EventRegistry) -> Self {
        Self {
            user_created: registry.register("USER_CREATED"),
            user_modified: registry.register("USER_MODIFIED"),
            user_deleted: registry.register("USER_DELETED"),
            user_logged_in: registry.register("USER_LOGGED_IN"),
            organization_created: registry.register("ORGANIZATION_CREATED"),
            organization_modified: registry.register("ORGANIZATION_MODIFIED"),
            organization_deleted: registry.register("ORGANIZATION_DELETED"),
            user_role_created: registry.register("USER_ROLE_CREATED"),
            user_role_modified: registry.register("USER_ROLE_MODIFIED"),
            user_role_deleted: registry.register("USER_ROLE_DELETED"),
            scheduler_executed: registry.register("SCHEDULER_EXECUTED"),
            application_started: registry.register("APPLICATION_STARTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_resolvable_by_name() {
        let mut reg = EventRegistry::new();
        let events = ApplicationEvents::register(&mut reg);
        assert_eq!(reg.len(), 12);
        assert!(reg.lookup("USER_CREATED").is_some_and(|d| d.carries::<UserEvent>()));
        assert!(
            reg.lookup("SCHEDULER_EXECUTED")
                .is_some_and(|d| d.carries::<ScheduledRun>())
        );
        assert_eq!(
            reg.lookup_typed::<OrganizationEvent>("ORGANIZATION_DELETED"),
            Some(events.organization_deleted)
        );
    }
}
