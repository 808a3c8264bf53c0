//! Optimistic engagement state (reactions, votes, comments).
//!
//! Every mutation here is speculative: the local guess becomes visible
//! immediately, the backend call follows, and the outcome settles through
//! the target's [`Overlay`]s. Success replaces the guess with the
//! authoritative aggregate; failure removes just that guess from the
//! overlay's pending ledger, leaving other in-flight guesses visible.
//! A late success that arrives after a newer one has settled is discarded
//! and logged, never surfaced.
//!
//! The per-target mutex is held only while mutating the overlays, never
//! across the backend call, so concurrent mutations on one target overlap
//! on the wire and settle in arrival order.

use crate::backend::Backend;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventHub};
use crate::now_ms;
use dashmap::DashMap;
use std::sync::Arc;
use tether_core::engagement;
use tether_core::{Overlay, Settled};
use tether_types::{
    Comment, CommentId, CommentThread, ReactionAggregate, ReactionKind, SessionContext, TargetId,
    VoteAggregate, VoteChoice,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Speculative state for one engagement target.
#[derive(Debug)]
struct TargetState {
    reactions: Overlay<ReactionAggregate>,
    vote: Overlay<VoteAggregate>,
    comments: Overlay<CommentThread>,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            reactions: Overlay::new(ReactionAggregate::default()),
            vote: Overlay::new(VoteAggregate::default()),
            comments: Overlay::new(CommentThread::default()),
        }
    }
}

/// Reversible engagement counters, keyed by target.
pub struct EngagementSync<B> {
    backend: Arc<B>,
    targets: DashMap<TargetId, Arc<Mutex<TargetState>>>,
    events: EventHub,
}

impl<B: Backend> EngagementSync<B> {
    /// Create an engagement store over the given backend.
    pub fn new(backend: Arc<B>, events: EventHub) -> Self {
        Self {
            backend,
            targets: DashMap::new(),
            events,
        }
    }

    fn target(&self, id: TargetId) -> Arc<Mutex<TargetState>> {
        self.targets.entry(id).or_default().clone()
    }

    /// Toggle the session user's reaction on a target.
    ///
    /// Free toggle: the same kind cancels, a different kind moves the
    /// contribution. Returns the visible aggregate after settlement.
    pub async fn toggle_reaction(
        &self,
        ctx: &SessionContext,
        target: TargetId,
        kind: ReactionKind,
    ) -> Result<ReactionAggregate, EngineError> {
        let state = self.target(target);
        let ticket = {
            let mut state = state.lock().await;
            state
                .reactions
                .apply(move |agg| engagement::toggle_reaction(agg, kind))
        };

        let result = self.backend.toggle_reaction(target, kind, ctx.user_id).await;

        let mut state = state.lock().await;
        match result {
            Ok(authoritative) => {
                match state.reactions.on_success(&ticket, authoritative) {
                    Settled::Applied => self.events.emit(EngineEvent::ReactionSettled { target }),
                    Settled::Superseded => {
                        debug!(%target, seq = ticket.seq(), "late reaction outcome discarded")
                    }
                }
                Ok(state.reactions.visible().clone())
            }
            Err(source) => {
                if state.reactions.on_failure(ticket) == Settled::Superseded {
                    debug!(%target, "late reaction failure discarded");
                }
                Err(EngineError::Network(source))
            }
        }
    }

    /// Cast the session user's one vote on a target.
    ///
    /// Votes are permanent: a second cast fails locally before any network
    /// call, and there is no un-vote transition.
    pub async fn cast_vote(
        &self,
        ctx: &SessionContext,
        target: TargetId,
        choice: VoteChoice,
    ) -> Result<VoteAggregate, EngineError> {
        let state = self.target(target);
        let ticket = {
            let mut state = state.lock().await;
            if state.vote.visible().has_voted() {
                return Err(EngineError::AlreadyVoted(target));
            }
            state.vote.apply(move |agg| engagement::cast_vote(agg, choice))
        };

        let result = self.backend.cast_vote(target, choice, ctx.user_id).await;

        let mut state = state.lock().await;
        match result {
            Ok(authoritative) => {
                match state.vote.on_success(&ticket, authoritative) {
                    Settled::Applied => self.events.emit(EngineEvent::VoteSettled { target }),
                    Settled::Superseded => {
                        debug!(%target, seq = ticket.seq(), "late vote outcome discarded")
                    }
                }
                Ok(*state.vote.visible())
            }
            Err(source) => {
                if state.vote.on_failure(ticket) == Settled::Superseded {
                    debug!(%target, "late vote failure discarded");
                }
                Err(EngineError::Network(source))
            }
        }
    }

    /// Append a comment by the session user.
    ///
    /// The comment appears immediately under a temporary id and is swapped
    /// in place for the backend's echoed comment on confirmation.
    pub async fn add_comment(
        &self,
        ctx: &SessionContext,
        target: TargetId,
        body: &str,
    ) -> Result<Comment, EngineError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(EngineError::EmptyBody);
        }

        let placeholder = Comment {
            id: CommentId::new(),
            author: ctx.user_id,
            body: body.to_string(),
            created_at: now_ms(),
        };
        let temp_id = placeholder.id;

        let state = self.target(target);
        let ticket = {
            let mut state = state.lock().await;
            state
                .comments
                .apply(move |thread| engagement::append_comment(thread, placeholder.clone()))
        };

        let result = self.backend.add_comment(target, ctx.user_id, body).await;

        let mut state = state.lock().await;
        match result {
            Ok(echoed) => {
                let resolved =
                    engagement::resolve_comment(state.comments.visible(), temp_id, echoed.clone());
                match state.comments.on_success(&ticket, resolved) {
                    Settled::Applied => self.events.emit(EngineEvent::CommentSettled { target }),
                    Settled::Superseded => {
                        debug!(%target, seq = ticket.seq(), "late comment outcome discarded")
                    }
                }
                Ok(echoed)
            }
            Err(source) => {
                if state.comments.on_failure(ticket) == Settled::Superseded {
                    debug!(%target, "late comment failure discarded");
                }
                Err(EngineError::Network(source))
            }
        }
    }

    /// Remove a comment authored by the session user.
    pub async fn remove_comment(
        &self,
        ctx: &SessionContext,
        target: TargetId,
        comment: CommentId,
    ) -> Result<(), EngineError> {
        let state = self.target(target);
        let ticket = {
            let mut state = state.lock().await;
            state
                .comments
                .apply(move |thread| engagement::remove_comment(thread, comment))
        };

        let result = self
            .backend
            .remove_comment(target, comment, ctx.user_id)
            .await;

        let mut state = state.lock().await;
        match result {
            Ok(_count) => {
                // The backend echoes only a count; the speculative removal
                // is the confirmed thread.
                let confirmed = state.comments.visible().clone();
                match state.comments.on_success(&ticket, confirmed) {
                    Settled::Applied => self.events.emit(EngineEvent::CommentSettled { target }),
                    Settled::Superseded => {
                        debug!(%target, seq = ticket.seq(), "late removal outcome discarded")
                    }
                }
                Ok(())
            }
            Err(source) => {
                if state.comments.on_failure(ticket) == Settled::Superseded {
                    debug!(%target, "late removal failure discarded");
                }
                Err(EngineError::Network(source))
            }
        }
    }

    /// Seed or refresh a target with authoritative poll data.
    ///
    /// Each overlay is skipped while it has a mutation in flight; the
    /// speculative value stays visible until that mutation settles.
    pub async fn prime(
        &self,
        target: TargetId,
        reactions: ReactionAggregate,
        vote: VoteAggregate,
        comments: CommentThread,
    ) {
        let state = self.target(target);
        let mut state = state.lock().await;
        state.reactions.reconcile(reactions);
        state.vote.reconcile(vote);
        state.comments.reconcile(comments);
    }

    /// The visible (possibly speculative) reaction aggregate for a target.
    pub async fn reaction_state(&self, target: TargetId) -> ReactionAggregate {
        self.target(target).lock().await.reactions.visible().clone()
    }

    /// The visible (possibly speculative) vote aggregate for a target.
    pub async fn vote_state(&self, target: TargetId) -> VoteAggregate {
        *self.target(target).lock().await.vote.visible()
    }

    /// The visible (possibly speculative) comment thread for a target.
    pub async fn comments(&self, target: TargetId) -> CommentThread {
        self.target(target).lock().await.comments.visible().clone()
    }
}
