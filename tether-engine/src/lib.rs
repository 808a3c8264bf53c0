//! # tether-engine
//!
//! Client-side synchronization engine for a poll-only social backend.
//!
//! The engine keeps a local view of three domains and reconciles each
//! against the backend with a different strategy:
//!
//! - **Relationships** ([`RelationshipGraph`]): the follow state machine.
//!   Mutations are confirmed-then-committed; an illegal transition never
//!   reaches the wire.
//! - **Engagement** ([`EngagementSync`]): reactions, votes and comments.
//!   Mutations are optimistic and fully reversible; outcomes settle in
//!   arrival order against the backend's authoritative aggregates.
//! - **Conversations** ([`ConversationGateway`]): direct messages, gated
//!   on a live mutual follow and merged by message identity.
//!
//! A [`PollingScheduler`] feeds the caches in the background, with
//! generation tokens guarding every reconciliation against scope changes
//! that happened while a fetch was in flight.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_engine::{Engine, EngineConfig, MockBackend};
//! use tether_types::{SessionContext, UserId};
//!
//! # async fn demo() -> Result<(), tether_engine::EngineError> {
//! let me = UserId::new();
//! let engine = Engine::new(
//!     MockBackend::new(),
//!     SessionContext::new(me),
//!     EngineConfig::default(),
//! );
//!
//! let them = UserId::new();
//! engine.follow(them).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod conversation;
pub mod engagement;
pub mod error;
pub mod events;
pub mod polling;
pub mod relationship;

pub use backend::{Backend, BackendError, MockBackend};
pub use conversation::ConversationGateway;
pub use engagement::EngagementSync;
pub use error::EngineError;
pub use events::{EngineEvent, EventHub, DEFAULT_EVENT_CAPACITY};
pub use polling::{PollConfig, PollScope, PollingScheduler, ScopeKind};
pub use relationship::RelationshipGraph;

use std::sync::Arc;
use tether_types::{
    Comment, CommentId, Conversation, ConversationId, FollowEdge, FollowRequest, Generation,
    Message, ReactionAggregate, ReactionKind, RelationshipStatus, RequestId, SessionContext,
    TargetId, UserId, VoteAggregate, VoteChoice,
};

/// Wall-clock time as unix epoch milliseconds. Local timestamps are
/// provisional; backend echoes replace them.
pub(crate) fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Engine-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Polling cadence and behavior.
    pub poll: PollConfig,
    /// Buffer capacity for event subscribers. Zero means the default.
    pub event_capacity: usize,
}

impl EngineConfig {
    /// Set the polling configuration.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Set the event subscriber buffer capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// One user's session over the whole engine.
///
/// Thin facade that wires the four components to one backend and one
/// event hub and binds them to the session user. The components are also
/// exposed directly for callers that act on behalf of explicit users
/// (multi-account clients, tests).
pub struct Engine<B> {
    ctx: SessionContext,
    events: EventHub,
    graph: Arc<RelationshipGraph<B>>,
    engagement: Arc<EngagementSync<B>>,
    gateway: Arc<ConversationGateway<B>>,
    scheduler: Arc<PollingScheduler<B>>,
}

impl<B: Backend> Engine<B> {
    /// Wire an engine over the backend for one session.
    pub fn new(backend: B, ctx: SessionContext, config: EngineConfig) -> Self {
        let backend = Arc::new(backend);
        let capacity = if config.event_capacity == 0 {
            DEFAULT_EVENT_CAPACITY
        } else {
            config.event_capacity
        };
        let events = EventHub::new(capacity);

        let graph = Arc::new(RelationshipGraph::new(
            Arc::clone(&backend),
            events.clone(),
        ));
        let engagement = Arc::new(EngagementSync::new(Arc::clone(&backend), events.clone()));
        let gateway = Arc::new(ConversationGateway::new(
            Arc::clone(&backend),
            Arc::clone(&graph),
            events.clone(),
        ));
        let scheduler = Arc::new(PollingScheduler::new(
            backend,
            Arc::clone(&graph),
            Arc::clone(&gateway),
            config.poll,
        ));

        Self {
            ctx,
            events,
            graph,
            engagement,
            gateway,
            scheduler,
        }
    }

    /// The session this engine acts as.
    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    /// Subscribe to reconciliation events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// The relationship component.
    pub fn relationships(&self) -> &Arc<RelationshipGraph<B>> {
        &self.graph
    }

    /// The engagement component.
    pub fn engagement(&self) -> &Arc<EngagementSync<B>> {
        &self.engagement
    }

    /// The conversation component.
    pub fn conversations(&self) -> &Arc<ConversationGateway<B>> {
        &self.gateway
    }

    /// The polling component.
    pub fn polling(&self) -> &Arc<PollingScheduler<B>> {
        &self.scheduler
    }

    // --- relationship convenience, bound to the session user ---

    /// Ask to follow another user.
    pub async fn follow(&self, user: UserId) -> Result<FollowEdge, EngineError> {
        self.graph.request_follow(&self.ctx, user).await
    }

    /// Accept a pending follow request addressed to the session user.
    pub async fn accept(&self, request: RequestId) -> Result<FollowEdge, EngineError> {
        self.graph.accept_request(&self.ctx, request).await
    }

    /// Reject a pending follow request addressed to the session user.
    pub async fn reject(&self, request: RequestId) -> Result<(), EngineError> {
        self.graph.reject_request(&self.ctx, request).await
    }

    /// Withdraw an accepted follow.
    pub async fn unfollow(&self, user: UserId) -> Result<(), EngineError> {
        self.graph.unfollow(&self.ctx, user).await
    }

    /// Pending follow requests addressed to the session user.
    pub fn pending_requests(&self) -> Vec<FollowRequest> {
        self.graph.pending_requests(self.ctx.user_id)
    }

    /// Cached status of the session user's relationship with `user`.
    pub fn status_with(&self, user: UserId) -> RelationshipStatus {
        self.graph.status(self.ctx.user_id, user)
    }

    // --- engagement convenience ---

    /// Toggle the session user's reaction on a target.
    pub async fn toggle_reaction(
        &self,
        target: TargetId,
        kind: ReactionKind,
    ) -> Result<ReactionAggregate, EngineError> {
        self.engagement.toggle_reaction(&self.ctx, target, kind).await
    }

    /// Cast the session user's one vote on a target.
    pub async fn cast_vote(
        &self,
        target: TargetId,
        choice: VoteChoice,
    ) -> Result<VoteAggregate, EngineError> {
        self.engagement.cast_vote(&self.ctx, target, choice).await
    }

    /// Comment on a target.
    pub async fn comment(
        &self,
        target: TargetId,
        body: &str,
    ) -> Result<Comment, EngineError> {
        self.engagement.add_comment(&self.ctx, target, body).await
    }

    /// Remove one of the session user's comments.
    pub async fn remove_comment(
        &self,
        target: TargetId,
        comment: CommentId,
    ) -> Result<(), EngineError> {
        self.engagement.remove_comment(&self.ctx, target, comment).await
    }

    // --- conversation convenience ---

    /// Open (find or create) the conversation with another user.
    pub async fn open_conversation(&self, other: UserId) -> Result<Conversation, EngineError> {
        self.gateway.open_conversation(&self.ctx, other).await
    }

    /// Send a direct message.
    pub async fn send_message(
        &self,
        conversation: ConversationId,
        body: &str,
    ) -> Result<Message, EngineError> {
        self.gateway.send_message(&self.ctx, conversation, body).await
    }

    /// Mark a conversation read for the session user.
    pub async fn mark_read(&self, conversation: ConversationId) -> Result<usize, EngineError> {
        self.gateway.mark_read(&self.ctx, conversation).await
    }

    // --- polling convenience ---

    /// Start (or replace) a polling scope.
    pub fn watch(&self, scope: PollScope) -> Generation {
        self.scheduler.start(scope)
    }

    /// Mark the UI surface hidden or visible.
    pub fn set_hidden(&self, hidden: bool) {
        self.scheduler.set_hidden(hidden);
    }

    /// Stop all polling.
    pub fn stop_polling(&self) {
        self.scheduler.stop_all();
    }
}
