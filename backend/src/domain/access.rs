//! Roles, callers and the capability table.
//!
//! Authorisation is a pure lookup: each (role, capability) pair maps to a
//! [`Grant`], and ownership-scoped grants are resolved against the resource
//! being touched. The admission facade consults the table before any store
//! mutation, so a denied caller never changes state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Role attached to an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Walk-in customer joining queues.
    Customer,
    /// Operator owning one or more places.
    PlaceAdmin,
    /// Platform operator with access to every place.
    SuperAdmin,
}

impl Role {
    /// Stable wire identifier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::PlaceAdmin => "place_admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "place_admin" => Ok(Self::PlaceAdmin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(ParseRoleError(other.to_owned())),
        }
    }
}

/// Authenticated identity on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    user_id: UserId,
    role: Role,
}

impl Caller {
    /// Build a caller from an already-authenticated identity.
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Shorthand for a customer caller.
    pub const fn customer(user_id: UserId) -> Self {
        Self::new(user_id, Role::Customer)
    }

    /// Shorthand for a place admin caller.
    pub const fn place_admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::PlaceAdmin)
    }

    /// Shorthand for a super admin caller.
    pub const fn super_admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::SuperAdmin)
    }

    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub const fn role(&self) -> Role {
        self.role
    }
}

/// Action classes guarded by the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Register a new place.
    RegisterPlace,
    /// Take a ticket in a queue.
    JoinQueue,
    /// Leave the queue with one's own ticket.
    LeaveOwnTicket,
    /// Call, requeue, cancel, complete, toggle or create queues.
    OperateQueue,
    /// Read queue status, statistics and ticket positions.
    ViewQueue,
    /// Read per-place analytics.
    ViewAnalytics,
}

impl Capability {
    const fn as_str(self) -> &'static str {
        match self {
            Self::RegisterPlace => "register_place",
            Self::JoinQueue => "join_queue",
            Self::LeaveOwnTicket => "leave_own_ticket",
            Self::OperateQueue => "operate_queue",
            Self::ViewQueue => "view_queue",
            Self::ViewAnalytics => "view_analytics",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a capability lookup before ownership is considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Always,
    Never,
    /// Granted when the caller owns the place the resource belongs to.
    IfPlaceOwner,
    /// Granted when the caller holds the ticket.
    IfTicketHolder,
}

/// The resource an action touches, carrying the identities ownership checks
/// compare against.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// No resource-level scoping (e.g. joining or registering a place).
    Unscoped,
    /// A place or anything inside it.
    Place { owner: &'a UserId },
    /// A ticket, with the place it belongs to.
    Ticket {
        holder: &'a UserId,
        place_owner: &'a UserId,
    },
}

/// Look up the grant for a role and capability.
pub const fn grant(role: Role, capability: Capability) -> Grant {
    use Capability as C;
    match (role, capability) {
        (_, C::JoinQueue | C::ViewQueue) => Grant::Always,
        (_, C::LeaveOwnTicket) => Grant::IfTicketHolder,
        (Role::Customer, C::RegisterPlace | C::OperateQueue | C::ViewAnalytics) => Grant::Never,
        (Role::PlaceAdmin, C::RegisterPlace) => Grant::Always,
        (Role::PlaceAdmin, C::OperateQueue | C::ViewAnalytics) => Grant::IfPlaceOwner,
        (Role::SuperAdmin, C::RegisterPlace | C::OperateQueue | C::ViewAnalytics) => Grant::Always,
    }
}

/// Reason an authorisation check failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{role} may not {capability}")]
pub struct AccessDenied {
    pub role: Role,
    pub capability: Capability,
}

/// Resolve whether `caller` may exercise `capability` on `resource`.
///
/// # Examples
/// ```
/// use smartqueue::domain::{Caller, Capability, Resource, UserId, authorize};
///
/// let owner = UserId::random();
/// let admin = Caller::place_admin(owner);
/// assert!(authorize(&admin, Capability::OperateQueue, Resource::Place { owner: &owner }).is_ok());
///
/// let stranger = Caller::place_admin(UserId::random());
/// assert!(authorize(&stranger, Capability::OperateQueue, Resource::Place { owner: &owner }).is_err());
/// ```
pub fn authorize(
    caller: &Caller,
    capability: Capability,
    resource: Resource<'_>,
) -> Result<(), AccessDenied> {
    let allowed = match grant(caller.role(), capability) {
        Grant::Always => true,
        Grant::Never => false,
        Grant::IfPlaceOwner => match resource {
            Resource::Place { owner } | Resource::Ticket { place_owner: owner, .. } => {
                owner == caller.user_id()
            }
            Resource::Unscoped => false,
        },
        Grant::IfTicketHolder => match resource {
            Resource::Ticket { holder, .. } => holder == caller.user_id(),
            Resource::Place { .. } | Resource::Unscoped => false,
        },
    };

    if allowed {
        Ok(())
    } else {
        Err(AccessDenied {
            role: caller.role(),
            capability,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Role::Customer, Capability::JoinQueue, Grant::Always)]
    #[case(Role::Customer, Capability::OperateQueue, Grant::Never)]
    #[case(Role::Customer, Capability::ViewAnalytics, Grant::Never)]
    #[case(Role::PlaceAdmin, Capability::OperateQueue, Grant::IfPlaceOwner)]
    #[case(Role::PlaceAdmin, Capability::LeaveOwnTicket, Grant::IfTicketHolder)]
    #[case(Role::SuperAdmin, Capability::OperateQueue, Grant::Always)]
    #[case(Role::SuperAdmin, Capability::LeaveOwnTicket, Grant::IfTicketHolder)]
    fn capability_table(#[case] role: Role, #[case] capability: Capability, #[case] expected: Grant) {
        assert_eq!(grant(role, capability), expected);
    }

    #[rstest]
    fn ticket_holder_may_leave() {
        let holder = UserId::random();
        let owner = UserId::random();
        let caller = Caller::customer(holder);
        let resource = Resource::Ticket {
            holder: &holder,
            place_owner: &owner,
        };
        assert!(authorize(&caller, Capability::LeaveOwnTicket, resource).is_ok());
    }

    #[rstest]
    fn super_admin_may_not_leave_for_others() {
        let holder = UserId::random();
        let owner = UserId::random();
        let caller = Caller::super_admin(UserId::random());
        let resource = Resource::Ticket {
            holder: &holder,
            place_owner: &owner,
        };
        let err = authorize(&caller, Capability::LeaveOwnTicket, resource).expect_err("denied");
        assert_eq!(err.to_string(), "super_admin may not leave_own_ticket");
    }

    #[rstest]
    fn place_owner_may_operate_ticket_in_own_place() {
        let holder = UserId::random();
        let owner = UserId::random();
        let caller = Caller::place_admin(owner);
        let resource = Resource::Ticket {
            holder: &holder,
            place_owner: &owner,
        };
        assert!(authorize(&caller, Capability::OperateQueue, resource).is_ok());
    }

    #[rstest]
    fn unscoped_ownership_grants_are_denied() {
        let caller = Caller::place_admin(UserId::random());
        assert!(authorize(&caller, Capability::ViewAnalytics, Resource::Unscoped).is_err());
    }

    #[rstest]
    #[case("customer", Role::Customer)]
    #[case("place_admin", Role::PlaceAdmin)]
    #[case("super_admin", Role::SuperAdmin)]
    fn parses_role_names(#[case] raw: &str, #[case] expected: Role) {
        assert_eq!(raw.parse::<Role>(), Ok(expected));
    }

    #[rstest]
    fn rejects_unknown_roles() {
        assert!("owner".parse::<Role>().is_err());
    }
}
