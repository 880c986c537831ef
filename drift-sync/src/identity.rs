//! The identity provider interface.
//!
//! The sync core consumes the host application's session as "current user
//! + organization": outgoing messages are stamped with it and storage is
//! routed by organization. How authentication happens is the host's
//! business.

use drift_types::{OrgId, UserId};
use serde::{Deserialize, Serialize};

/// The authenticated user, as the sync core sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// User id.
    pub id: UserId,
    /// The user's organization.
    pub organization_id: OrgId,
}

/// Supplies the current user, if any.
pub trait IdentityProvider: Send + Sync {
    /// The currently authenticated user, or `None` when signed out.
    fn current_user(&self) -> Option<UserIdentity>;
}

/// An identity provider with a fixed user (tests, single-user tools).
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    user: Option<UserIdentity>,
}

impl StaticIdentity {
    /// A provider that always returns the given user.
    #[must_use]
    pub fn new(id: UserId, organization_id: OrgId) -> Self {
        Self {
            user: Some(UserIdentity {
                id,
                organization_id,
            }),
        }
    }

    /// A provider with nobody signed in.
    #[must_use]
    pub fn signed_out() -> Self {
        Self { user: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserIdentity> {
        self.user
    }
}
