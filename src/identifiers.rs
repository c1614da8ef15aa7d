//! Type-safe identifiers for chat entities.
//!
//! Newtype wrappers prevent mixing a room id with a message id or a user id
//! at compile time. All numeric ids deserialize transparently from the
//! integers the server sends. User ids are signed: the chat's system users
//! (Community is `-1`, Feeds is `-2`) have negative ids.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Numeric Identifiers
// ============================================================================

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident($repr:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            /// Wraps a raw id.
            #[inline]
            #[must_use]
            pub const fn new(id: $repr) -> Self {
                Self(id)
            }

            /// Returns the raw id.
            #[inline]
            #[must_use]
            pub const fn get(&self) -> $repr {
                self.0
            }
        }

        impl From<$repr> for $name {
            #[inline]
            fn from(id: $repr) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id! {
    /// Chat room id.
    RoomId(u64)
}

numeric_id! {
    /// Chat message id.
    MessageId(u64)
}

numeric_id! {
    /// Chat user id.
    UserId(i64)
}

impl RoomId {
    /// Returns the key this room uses in live frames (`r<id>`).
    #[inline]
    #[must_use]
    pub fn frame_key(&self) -> String {
        format!("r{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Handle returned by `on`, used to remove a listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generates a new random subscription id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
