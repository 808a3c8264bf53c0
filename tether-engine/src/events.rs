//! Reconciliation event hooks.
//!
//! UI layers subscribe to an [`EventHub`] for redraw decisions. Events are
//! emitted only from the reconciliation path, so a poll-driven update and
//! a user-initiated action raise the same signals. Emission never blocks:
//! a hub with no subscribers drops events.

use tether_types::{ConversationId, RelationshipStatus, TargetId, UserId};
use tokio::sync::broadcast;

/// Default buffered capacity for event subscribers.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// A reconciliation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A reaction mutation settled against the authoritative aggregate.
    ReactionSettled {
        /// The mutated target.
        target: TargetId,
    },
    /// A vote settled against the authoritative aggregate.
    VoteSettled {
        /// The mutated target.
        target: TargetId,
    },
    /// A comment append or removal settled.
    CommentSettled {
        /// The mutated target.
        target: TargetId,
    },
    /// A poll refresh delivered messages this client had not seen.
    MessageArrived {
        /// The conversation that grew.
        conversation: ConversationId,
        /// How many unseen messages arrived.
        new_messages: usize,
    },
    /// The conversation list changed (new conversation or new activity).
    ConversationListUpdated {
        /// The list owner.
        user: UserId,
    },
    /// A follow edge changed state.
    RelationshipChanged {
        /// The edge's follower side.
        follower: UserId,
        /// The edge's followee side.
        followee: UserId,
        /// The canonical status from the follower's perspective.
        status: RelationshipStatus,
    },
}

/// Broadcast hub for [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventHub {
    /// Create a hub with the given subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe for events. Slow subscribers may observe lagged gaps,
    /// never blocked emitters.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        // No subscribers is fine; the engine does not require listeners.
        let _ = self.tx.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
