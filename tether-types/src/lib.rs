//! # tether-types
//!
//! Domain types for the Tether social sync engine.
//!
//! This crate provides the foundational types used across all Tether crates:
//! - [`UserId`], [`ConversationId`], [`MessageId`], [`TargetId`],
//!   [`RequestId`], [`CommentId`], [`Generation`] - identity and ordering types
//! - [`FollowEdge`], [`RelationshipStatus`] - relationship data
//! - [`Conversation`], [`Message`], [`Page`] - messaging data
//! - [`ReactionAggregate`], [`VoteAggregate`], [`CommentThread`] - engagement data
//! - [`User`], [`SessionContext`] - identity context

#![warn(missing_docs)]
#![warn(clippy::all)]

mod conversation;
mod engagement;
mod ids;
mod relationship;
mod user;

pub use conversation::{Conversation, Message, Page};
pub use engagement::{
    Comment, CommentThread, ReactionAggregate, ReactionKind, VoteAggregate, VoteChoice,
};
pub use ids::{
    CommentId, ConversationId, Generation, MessageId, RequestId, TargetId, UserId,
};
pub use relationship::{FollowEdge, FollowEdgeState, FollowRequest, RelationshipStatus};
pub use user::{SessionContext, User};
