//! Identity and ordering types for Tether.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// UUID v4 format (16 bytes).
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create a new random id.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Create an id from raw bytes.
            pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
                uuid::Uuid::from_slice(bytes).ok().map(Self)
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
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

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

entity_id! {
    /// A unique identifier for a user.
    UserId
}

entity_id! {
    /// A unique identifier for a conversation between two users.
    ConversationId
}

entity_id! {
    /// A unique identifier for a message within a conversation.
    ///
    /// Outgoing messages carry a locally assigned id until the backend
    /// echoes the real one; the placeholder is replaced, never duplicated.
    MessageId
}

entity_id! {
    /// A unique identifier for an engagement target (a post or complaint).
    TargetId
}

entity_id! {
    /// A unique identifier for a follow edge / follow request.
    RequestId
}

entity_id! {
    /// A unique identifier for a comment on an engagement target.
    CommentId
}

/// A monotonically increasing marker for polling scopes.
///
/// Assigned by the scheduler when a scope starts. Responses tagged with a
/// generation older than the scope's current one are discarded unreconciled.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Generation(u64);

impl Generation {
    /// Create a new Generation with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this Generation.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The generation before any scope has started.
    pub fn zero() -> Self {
        Self(0)
    }

    /// The next generation.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Generation({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_roundtrip() {
        let original = UserId::new();
        let restored = UserId::from_bytes(original.as_uuid().as_bytes()).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn ids_are_random() {
        assert_ne!(MessageId::new(), MessageId::new());
        assert_ne!(TargetId::new(), TargetId::new());
    }

    #[test]
    fn id_from_invalid_length_fails() {
        assert!(ConversationId::from_bytes(&[0u8; 8]).is_none());
        assert!(ConversationId::from_bytes(&[0u8; 32]).is_none());
    }

    #[test]
    fn generation_ordering() {
        let g1 = Generation::new(1);
        let g2 = g1.next();
        assert!(g1 < g2);
        assert_eq!(g2.value(), 2);
    }

    #[test]
    fn generation_saturates() {
        let g = Generation::new(u64::MAX);
        assert_eq!(g.next().value(), u64::MAX);
    }
}
