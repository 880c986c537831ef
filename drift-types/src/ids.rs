//! Identifier types used throughout the drift core.
//!
//! Uses UUID v7 for time-ordered, globally unique identifiers. The
//! timestamp-plus-random composition also makes these safe to use as
//! correlation keys (message acknowledgments) without coordination.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new identifier with the current timestamp.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parses an identifier from a string.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for an organization (tenant). Cached entities and
    /// offline queues are partitioned by organization.
    OrgId
}

uuid_id! {
    /// Unique identifier for a user. Stamped on outgoing messages and
    /// recorded as the modifier of entity snapshots.
    UserId
}

uuid_id! {
    /// Unique identifier for a wire message. Acknowledgments correlate to
    /// their original message by echoing this id.
    MessageId
}

uuid_id! {
    /// Unique identifier for a queued offline action. UUID v7 ordering
    /// matches append order, so ids double as a FIFO tiebreaker.
    ActionId
}
