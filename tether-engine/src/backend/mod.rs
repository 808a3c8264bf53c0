//! Abstract backend contract.
//!
//! The engine treats the backend as an opaque authoritative store reached
//! through this trait; the shape of the contract is normative, the
//! transport is not. Production implementations wrap HTTP or whatever the
//! deployment uses; tests use [`MockBackend`].

mod mock;

pub use mock::MockBackend;

use async_trait::async_trait;
use tether_types::{
    Comment, CommentId, Conversation, ConversationId, FollowEdge, Message, Page,
    ReactionAggregate, ReactionKind, RelationshipStatus, RequestId, TargetId, User, UserId,
    VoteAggregate, VoteChoice,
};
use thiserror::Error;

/// Backend call failures.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Backend unreachable.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// Backend answered with a non-success status.
    #[error("backend returned status {0}")]
    Status(u16),

    /// Backend understood the call and refused it.
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

/// The authoritative store the engine synchronizes against.
///
/// Every mutating engine operation forwards here; the engine only commits
/// relationship state after these calls confirm, and reconciles optimistic
/// engagement state against the aggregates these calls return.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Create a follow request from `follower` to `followee`.
    async fn request_follow(
        &self,
        follower: UserId,
        followee: UserId,
    ) -> Result<FollowEdge, BackendError>;

    /// Accept a pending follow request.
    async fn accept_follow(&self, request: RequestId) -> Result<FollowEdge, BackendError>;

    /// Reject a pending follow request. Returns whether an edge was removed.
    async fn reject_follow(&self, request: RequestId) -> Result<bool, BackendError>;

    /// Withdraw an accepted follow. Returns whether an edge was removed.
    async fn unfollow(&self, follower: UserId, followee: UserId) -> Result<bool, BackendError>;

    /// The canonical relationship view from `a`'s perspective.
    async fn relationship_status(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<RelationshipStatus, BackendError>;

    /// Toggle `user`'s reaction of `kind` on `target`; returns the
    /// authoritative aggregate as seen by `user`.
    async fn toggle_reaction(
        &self,
        target: TargetId,
        kind: ReactionKind,
        user: UserId,
    ) -> Result<ReactionAggregate, BackendError>;

    /// Cast `user`'s vote on `target`; rejected when the user has voted.
    async fn cast_vote(
        &self,
        target: TargetId,
        choice: VoteChoice,
        user: UserId,
    ) -> Result<VoteAggregate, BackendError>;

    /// Append a comment; returns it with its backend-assigned id.
    async fn add_comment(
        &self,
        target: TargetId,
        author: UserId,
        body: &str,
    ) -> Result<Comment, BackendError>;

    /// Remove a comment; returns the new comment count.
    async fn remove_comment(
        &self,
        target: TargetId,
        comment: CommentId,
        user: UserId,
    ) -> Result<u32, BackendError>;

    /// Page through `user`'s conversations, most recent activity first.
    async fn list_conversations(
        &self,
        user: UserId,
        page: u32,
        size: u32,
    ) -> Result<Page<Conversation>, BackendError>;

    /// Page through a conversation's messages, oldest first.
    async fn get_messages(
        &self,
        conversation: ConversationId,
        page: u32,
        size: u32,
    ) -> Result<Page<Message>, BackendError>;

    /// Send a message; returns it with backend-assigned id and send time.
    async fn send_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        body: &str,
    ) -> Result<Message, BackendError>;

    /// Mark all of `user`'s unread messages in the conversation as read.
    async fn mark_messages_read(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<bool, BackendError>;

    /// Count of messages in the conversation unread by `user`.
    async fn unread_count(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<u32, BackendError>;

    /// Find the conversation for the unordered pair, creating it if absent.
    async fn find_or_create_conversation(
        &self,
        user: UserId,
        other: UserId,
    ) -> Result<Conversation, BackendError>;

    /// Fetch a user's current record (display name, avatar, last-active).
    async fn get_user(&self, user: UserId) -> Result<Option<User>, BackendError>;
}
