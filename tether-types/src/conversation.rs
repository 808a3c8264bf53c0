//! Conversation and message types.

use crate::ids::{ConversationId, MessageId, UserId};
use serde::{Deserialize, Serialize};

/// A direct-message conversation between two mutually-following users.
///
/// Created lazily on the first message attempt; never deleted by the
/// engine (deletion is a backend-owned soft operation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Backend-assigned id.
    pub id: ConversationId,
    /// The two participants. Order carries no meaning.
    pub participants: [UserId; 2],
    /// Creation time, unix epoch milliseconds (backend clock).
    pub created_at: u64,
    /// Last message or read activity, unix epoch milliseconds.
    pub last_activity_at: u64,
    /// Cached pointer to the most recent message, if any.
    pub last_message: Option<MessageId>,
}

impl Conversation {
    /// Whether the given user takes part in this conversation.
    pub fn involves(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }

    /// The participant that is not `user`, if `user` takes part at all.
    pub fn other_participant(&self, user: UserId) -> Option<UserId> {
        if self.participants[0] == user {
            Some(self.participants[1])
        } else if self.participants[1] == user {
            Some(self.participants[0])
        } else {
            None
        }
    }
}

/// A message within exactly one conversation. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Backend-assigned id, or a locally assigned temporary id while the
    /// send is in flight.
    pub id: MessageId,
    /// The conversation this message belongs to.
    pub conversation: ConversationId,
    /// The author.
    pub sender: UserId,
    /// The message body.
    pub body: String,
    /// Send time, unix epoch milliseconds (backend clock once echoed).
    pub sent_at: u64,
    /// Whether the recipient has read this message.
    pub read: bool,
    /// When the recipient read it, unix epoch milliseconds.
    pub read_at: Option<u64>,
}

/// One page of a backend listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items on this page, in backend order.
    pub items: Vec<T>,
    /// Whether more pages follow.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// A single page holding everything.
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: false,
        }
    }
}
