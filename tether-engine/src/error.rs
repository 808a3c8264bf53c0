//! Engine errors.

use crate::backend::BackendError;
use tether_core::{EdgeTransition, TransitionError};
use tether_types::{ConversationId, RequestId, TargetId, UserId};
use thiserror::Error;

/// Errors surfaced by engine operations.
///
/// `InvalidTransition`, `NotMutual` and the other precondition variants
/// are returned synchronously and never retried automatically. `Network`
/// on an optimistic mutation means the local state has already been rolled
/// back; the caller may retry user-visibly. `StaleGeneration` marks a poll
/// result that arrived for a cancelled scope and was dropped unreconciled;
/// the scheduler never surfaces it to users.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An illegal relationship state change was attempted.
    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    /// A user cannot follow themselves.
    #[error("user {0} cannot follow themselves")]
    SelfFollow(UserId),

    /// The request id is not known to this client.
    #[error("unknown follow request {0}")]
    UnknownRequest(RequestId),

    /// Only the followee of a request may accept or reject it.
    #[error("user {user} is not the recipient of follow request {request}")]
    NotRequestRecipient {
        /// The request being decided.
        request: RequestId,
        /// The user who tried to decide it.
        user: UserId,
    },

    /// Messaging attempted without a mutual follow.
    #[error("users {a} and {b} do not mutually follow each other")]
    NotMutual {
        /// One participant.
        a: UserId,
        /// The other participant.
        b: UserId,
    },

    /// One vote per user per target; this user already voted.
    #[error("user already voted on target {0}")]
    AlreadyVoted(TargetId),

    /// Message or comment bodies must not be empty or whitespace-only.
    #[error("body is empty")]
    EmptyBody,

    /// The conversation is not known to this client.
    #[error("unknown conversation {0}")]
    UnknownConversation(ConversationId),

    /// A relationship mutation failed at the backend. Local state is
    /// unchanged; the attempted transition is preserved for retry.
    #[error("relationship {attempted:?} failed: {source}")]
    RelationshipOperationFailed {
        /// The transition that was being applied.
        attempted: EdgeTransition,
        /// The underlying backend failure.
        #[source]
        source: BackendError,
    },

    /// Backend unreachable or rejected the call. For optimistic mutations
    /// the rollback has already happened when this is returned.
    #[error("network failure: {0}")]
    Network(#[from] BackendError),

    /// A poll result arrived for a cancelled scope and was discarded.
    #[error("stale poll generation")]
    StaleGeneration,
}
