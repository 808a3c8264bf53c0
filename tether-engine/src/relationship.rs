//! Client-side relationship graph.
//!
//! Caches directed follow edges and the user directory, and drives every
//! relationship mutation through the transition table in `tether-core`
//! before it reaches the backend. Relationship mutations are NOT
//! optimistic: the local edge only changes after the backend confirms.
//! A failed mutation therefore needs no rollback; the caller may retry.
//!
//! Mutations on the same user pair are serialized through a per-pair lock
//! so two racing calls cannot both pass the transition check.

use crate::backend::Backend;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventHub};
use crate::now_ms;
use dashmap::DashMap;
use std::sync::Arc;
use tether_core::relationship::{self, Applied, EdgeTransition};
use tether_types::{
    FollowEdge, FollowEdgeState, FollowRequest, RelationshipStatus, RequestId, SessionContext,
    User, UserId,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Local cache of follow edges, pending requests and known users.
pub struct RelationshipGraph<B> {
    backend: Arc<B>,
    /// Directed edges keyed (follower, followee). Absent means NONE.
    edges: DashMap<(UserId, UserId), FollowEdge>,
    /// Request ids learned from direct backend responses. Edges
    /// synthesized from status polls never enter this index, so a request
    /// can only be decided through an id the backend actually issued.
    requests: DashMap<RequestId, (UserId, UserId)>,
    users: DashMap<UserId, User>,
    pair_locks: DashMap<(UserId, UserId), Arc<Mutex<()>>>,
    events: EventHub,
}

impl<B: Backend> RelationshipGraph<B> {
    /// Create a graph over the given backend.
    pub fn new(backend: Arc<B>, events: EventHub) -> Self {
        Self {
            backend,
            edges: DashMap::new(),
            requests: DashMap::new(),
            users: DashMap::new(),
            pair_locks: DashMap::new(),
            events,
        }
    }

    fn pair_lock(&self, a: UserId, b: UserId) -> Arc<Mutex<()>> {
        // Normalized key: both directions of a pair share one lock.
        let key = tether_core::conversation::pair_key(a, b);
        self.pair_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The cached state of the directed edge `follower` -> `followee`.
    pub fn edge_state(&self, follower: UserId, followee: UserId) -> FollowEdgeState {
        self.edges
            .get(&(follower, followee))
            .map(|e| e.state)
            .unwrap_or_default()
    }

    /// The cached canonical status from `a`'s perspective.
    pub fn status(&self, a: UserId, b: UserId) -> RelationshipStatus {
        relationship::status_of(self.edge_state(a, b), self.edge_state(b, a))
    }

    /// Whether `a` and `b` mutually follow, per the cache. Recomputed from
    /// the two directed edges on every call.
    pub fn is_mutual(&self, a: UserId, b: UserId) -> bool {
        relationship::is_mutual(self.edge_state(a, b), self.edge_state(b, a))
    }

    /// Pending requests addressed to `user`, from direct backend responses.
    pub fn pending_requests(&self, user: UserId) -> Vec<FollowRequest> {
        let mut pending: Vec<FollowRequest> = self
            .requests
            .iter()
            .filter(|entry| entry.value().1 == user)
            .filter_map(|entry| {
                let (follower, followee) = *entry.value();
                let edge = self.edges.get(&(follower, followee))?;
                (edge.state == FollowEdgeState::Requested).then(|| FollowRequest {
                    id: edge.id,
                    follower,
                    followee,
                    created_at: edge.updated_at,
                })
            })
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    /// Ask to follow `followee` as the session user.
    ///
    /// Legal only from NONE; the edge becomes REQUESTED after the backend
    /// confirms. Self-follows are refused before any network call.
    pub async fn request_follow(
        &self,
        ctx: &SessionContext,
        followee: UserId,
    ) -> Result<FollowEdge, EngineError> {
        let follower = ctx.user_id;
        if follower == followee {
            return Err(EngineError::SelfFollow(follower));
        }

        let lock = self.pair_lock(follower, followee);
        let _guard = lock.lock().await;

        relationship::apply(self.edge_state(follower, followee), EdgeTransition::Request)?;

        let edge = self
            .backend
            .request_follow(follower, followee)
            .await
            .map_err(|source| EngineError::RelationshipOperationFailed {
                attempted: EdgeTransition::Request,
                source,
            })?;
        self.store_edge(edge.clone(), true);
        Ok(edge)
    }

    /// Accept a pending follow request addressed to the session user.
    ///
    /// Idempotent: accepting an already-accepted edge succeeds without a
    /// backend call. Accepting never creates the reverse edge.
    pub async fn accept_request(
        &self,
        ctx: &SessionContext,
        request: RequestId,
    ) -> Result<FollowEdge, EngineError> {
        let (follower, followee) = self.resolve_request(request)?;
        if ctx.user_id != followee {
            return Err(EngineError::NotRequestRecipient {
                request,
                user: ctx.user_id,
            });
        }

        let lock = self.pair_lock(follower, followee);
        let _guard = lock.lock().await;

        let applied = relationship::apply(
            self.edge_state(follower, followee),
            EdgeTransition::Accept,
        )?;
        if let Applied::Unchanged(_) = applied {
            if let Some(edge) = self.edges.get(&(follower, followee)) {
                return Ok(edge.clone());
            }
        }

        let edge = self
            .backend
            .accept_follow(request)
            .await
            .map_err(|source| EngineError::RelationshipOperationFailed {
                attempted: EdgeTransition::Accept,
                source,
            })?;
        self.store_edge(edge.clone(), true);
        Ok(edge)
    }

    /// Reject a pending follow request addressed to the session user.
    pub async fn reject_request(
        &self,
        ctx: &SessionContext,
        request: RequestId,
    ) -> Result<(), EngineError> {
        let (follower, followee) = self.resolve_request(request)?;
        if ctx.user_id != followee {
            return Err(EngineError::NotRequestRecipient {
                request,
                user: ctx.user_id,
            });
        }

        let lock = self.pair_lock(follower, followee);
        let _guard = lock.lock().await;

        relationship::apply(self.edge_state(follower, followee), EdgeTransition::Reject)?;

        self.backend
            .reject_follow(request)
            .await
            .map_err(|source| EngineError::RelationshipOperationFailed {
                attempted: EdgeTransition::Reject,
                source,
            })?;
        self.clear_edge(follower, followee);
        Ok(())
    }

    /// Withdraw the session user's accepted follow of `followee`.
    pub async fn unfollow(
        &self,
        ctx: &SessionContext,
        followee: UserId,
    ) -> Result<(), EngineError> {
        let follower = ctx.user_id;
        let lock = self.pair_lock(follower, followee);
        let _guard = lock.lock().await;

        relationship::apply(self.edge_state(follower, followee), EdgeTransition::Unfollow)?;

        self.backend
            .unfollow(follower, followee)
            .await
            .map_err(|source| EngineError::RelationshipOperationFailed {
                attempted: EdgeTransition::Unfollow,
                source,
            })?;
        self.clear_edge(follower, followee);
        Ok(())
    }

    /// Fetch the authoritative status for the pair and fold it into the
    /// cache. Used by the polling scheduler and available directly.
    pub async fn refresh_status(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<RelationshipStatus, EngineError> {
        let status = self.backend.relationship_status(a, b).await?;
        self.reconcile_status(a, b, status);
        Ok(status)
    }

    /// Fold an authoritative pair status into the cached edges.
    pub fn reconcile_status(&self, a: UserId, b: UserId, status: RelationshipStatus) {
        let (outgoing, incoming) = relationship::edges_of(status);
        self.reconcile_edge(a, b, outgoing);
        self.reconcile_edge(b, a, incoming);
    }

    /// Store an authoritative user record.
    pub fn reconcile_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Fetch a user from the backend and cache it.
    pub async fn refresh_user(&self, id: UserId) -> Result<Option<User>, EngineError> {
        let user = self.backend.get_user(id).await?;
        if let Some(ref u) = user {
            self.reconcile_user(u.clone());
        }
        Ok(user)
    }

    /// The cached record for a user, if known.
    pub fn user(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|u| u.clone())
    }

    fn resolve_request(&self, request: RequestId) -> Result<(UserId, UserId), EngineError> {
        self.requests
            .get(&request)
            .map(|pair| *pair)
            .ok_or(EngineError::UnknownRequest(request))
    }

    /// Single write sink for backend-confirmed edges.
    fn store_edge(&self, edge: FollowEdge, track_request: bool) {
        let follower = edge.follower;
        let followee = edge.followee;
        let previous = self
            .edges
            .insert((follower, followee), edge.clone())
            .map(|e| e.state);
        if track_request {
            self.requests.insert(edge.id, (follower, followee));
        }
        if previous != Some(edge.state) {
            self.emit_changed(follower, followee);
        }
    }

    fn clear_edge(&self, follower: UserId, followee: UserId) {
        if let Some((_, edge)) = self.edges.remove(&(follower, followee)) {
            self.requests.remove(&edge.id);
            self.emit_changed(follower, followee);
        }
    }

    /// Fold one authoritative directed-edge state into the cache. Edges
    /// created here carry a synthesized id and are never tracked as
    /// decidable requests.
    fn reconcile_edge(&self, follower: UserId, followee: UserId, state: FollowEdgeState) {
        let key = (follower, followee);
        let previous = self.edge_state(follower, followee);
        if previous == state {
            return;
        }
        debug!(%follower, %followee, ?previous, ?state, "edge reconciled from poll");

        if state == FollowEdgeState::None {
            if let Some((_, edge)) = self.edges.remove(&key) {
                self.requests.remove(&edge.id);
            }
        } else if let Some(mut edge) = self.edges.get_mut(&key) {
            edge.state = state;
            edge.updated_at = now_ms();
        } else {
            self.edges.insert(
                key,
                FollowEdge {
                    id: RequestId::new(),
                    follower,
                    followee,
                    state,
                    updated_at: now_ms(),
                },
            );
        }
        self.emit_changed(follower, followee);
    }

    fn emit_changed(&self, follower: UserId, followee: UserId) {
        self.events.emit(EngineEvent::RelationshipChanged {
            follower,
            followee,
            status: self.status(follower, followee),
        });
    }
}
