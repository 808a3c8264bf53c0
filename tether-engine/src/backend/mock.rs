//! Mock backend for testing.
//!
//! Plays the authoritative store in memory, applying the same rules the
//! production backend is expected to apply (follow transition table,
//! reaction toggles, one vote per user, mutuality gating for messaging).
//! Also captures calls and supports single-shot failure injection so tests
//! can exercise rollback paths.

use super::{Backend, BackendError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tether_core::relationship;
use tether_types::{
    Comment, CommentId, Conversation, ConversationId, FollowEdge, FollowEdgeState, Message,
    MessageId, Page, ReactionAggregate, ReactionKind, RelationshipStatus, RequestId, TargetId,
    User, UserId, VoteAggregate, VoteChoice,
};

/// Deterministic epoch base for mock-assigned timestamps.
const CLOCK_BASE_MS: u64 = 1_700_000_000_000;

/// Mock backend for testing.
#[derive(Debug, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<MockBackendInner>>,
}

#[derive(Debug, Default)]
struct MockBackendInner {
    users: HashMap<UserId, User>,
    edges: HashMap<(UserId, UserId), FollowEdge>,
    conversations: HashMap<ConversationId, Conversation>,
    pairs: HashMap<(UserId, UserId), ConversationId>,
    messages: HashMap<ConversationId, Vec<Message>>,
    targets: HashMap<TargetId, TargetRecord>,
    calls: Vec<String>,
    fail_next: Option<String>,
    ticks: u64,
}

#[derive(Debug, Default, Clone)]
struct TargetRecord {
    reactions: HashMap<UserId, ReactionKind>,
    votes: HashMap<UserId, VoteChoice>,
    comments: Vec<Comment>,
}

impl MockBackendInner {
    /// Record the call and consume any injected failure.
    fn begin(&mut self, op: &str) -> Result<(), BackendError> {
        self.calls.push(op.to_string());
        if let Some(error) = self.fail_next.take() {
            return Err(BackendError::Unreachable(error));
        }
        Ok(())
    }

    /// Monotonic mock clock, epoch milliseconds.
    fn now(&mut self) -> u64 {
        self.ticks += 1;
        CLOCK_BASE_MS + self.ticks
    }

    fn edge_state(&self, follower: UserId, followee: UserId) -> FollowEdgeState {
        self.edges
            .get(&(follower, followee))
            .map(|e| e.state)
            .unwrap_or_default()
    }

    fn is_mutual(&self, a: UserId, b: UserId) -> bool {
        relationship::is_mutual(self.edge_state(a, b), self.edge_state(b, a))
    }

    fn find_edge_mut(&mut self, request: RequestId) -> Option<&mut FollowEdge> {
        self.edges.values_mut().find(|e| e.id == request)
    }

    fn reaction_aggregate(&self, target: TargetId, user: UserId) -> ReactionAggregate {
        let mut agg = ReactionAggregate::default();
        if let Some(record) = self.targets.get(&target) {
            for kind in record.reactions.values() {
                *agg.counts.entry(*kind).or_insert(0) += 1;
            }
            agg.my_reaction = record.reactions.get(&user).copied();
        }
        agg
    }

    fn vote_aggregate(&self, target: TargetId, user: UserId) -> VoteAggregate {
        let mut agg = VoteAggregate::default();
        if let Some(record) = self.targets.get(&target) {
            for choice in record.votes.values() {
                match choice {
                    VoteChoice::Yes => agg.yes += 1,
                    VoteChoice::No => agg.no += 1,
                }
            }
            agg.my_vote = record.votes.get(&user).copied();
        }
        agg
    }
}

impl MockBackend {
    /// Create an empty mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user record.
    pub fn insert_user(&self, user: User) {
        let mut inner = self.inner.lock().unwrap();
        inner.users.insert(user.id, user);
    }

    /// Register a bare user with just an id and display name.
    pub fn insert_user_named(&self, id: UserId, name: &str) {
        self.insert_user(User {
            id,
            display_name: name.to_string(),
            avatar: None,
            last_active_at: CLOCK_BASE_MS,
        });
    }

    /// Names of all calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Cause the next backend call (of any kind) to fail.
    pub fn fail_next(&self, error: &str) {
        self.inner.lock().unwrap().fail_next = Some(error.to_string());
    }

    /// Number of messages the backend holds for a conversation.
    pub fn message_count(&self, conversation: ConversationId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .messages
            .get(&conversation)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Clone for MockBackend {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn request_follow(
        &self,
        follower: UserId,
        followee: UserId,
    ) -> Result<FollowEdge, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("request_follow")?;

        if inner.edge_state(follower, followee) != FollowEdgeState::None {
            return Err(BackendError::Rejected("follow already exists".into()));
        }
        let now = inner.now();
        let edge = FollowEdge {
            id: RequestId::new(),
            follower,
            followee,
            state: FollowEdgeState::Requested,
            updated_at: now,
        };
        inner.edges.insert((follower, followee), edge.clone());
        Ok(edge)
    }

    async fn accept_follow(&self, request: RequestId) -> Result<FollowEdge, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("accept_follow")?;

        let now = inner.now();
        let edge = inner
            .find_edge_mut(request)
            .ok_or_else(|| BackendError::Rejected("unknown follow request".into()))?;
        match edge.state {
            FollowEdgeState::Requested => {
                edge.state = FollowEdgeState::Accepted;
                edge.updated_at = now;
                Ok(edge.clone())
            }
            // Idempotent re-accept.
            FollowEdgeState::Accepted => Ok(edge.clone()),
            FollowEdgeState::None => Err(BackendError::Rejected("request not pending".into())),
        }
    }

    async fn reject_follow(&self, request: RequestId) -> Result<bool, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("reject_follow")?;

        let key = inner
            .edges
            .iter()
            .find(|(_, e)| e.id == request && e.state == FollowEdgeState::Requested)
            .map(|(k, _)| *k);
        Ok(match key {
            Some(k) => {
                inner.edges.remove(&k);
                true
            }
            None => false,
        })
    }

    async fn unfollow(&self, follower: UserId, followee: UserId) -> Result<bool, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("unfollow")?;

        if inner.edge_state(follower, followee) == FollowEdgeState::Accepted {
            inner.edges.remove(&(follower, followee));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn relationship_status(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<RelationshipStatus, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("relationship_status")?;
        Ok(relationship::status_of(
            inner.edge_state(a, b),
            inner.edge_state(b, a),
        ))
    }

    async fn toggle_reaction(
        &self,
        target: TargetId,
        kind: ReactionKind,
        user: UserId,
    ) -> Result<ReactionAggregate, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("toggle_reaction")?;

        let record = inner.targets.entry(target).or_default();
        match record.reactions.get(&user) {
            Some(current) if *current == kind => {
                record.reactions.remove(&user);
            }
            _ => {
                record.reactions.insert(user, kind);
            }
        }
        Ok(inner.reaction_aggregate(target, user))
    }

    async fn cast_vote(
        &self,
        target: TargetId,
        choice: VoteChoice,
        user: UserId,
    ) -> Result<VoteAggregate, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("cast_vote")?;

        let record = inner.targets.entry(target).or_default();
        if record.votes.contains_key(&user) {
            return Err(BackendError::Rejected("user already voted".into()));
        }
        record.votes.insert(user, choice);
        Ok(inner.vote_aggregate(target, user))
    }

    async fn add_comment(
        &self,
        target: TargetId,
        author: UserId,
        body: &str,
    ) -> Result<Comment, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("add_comment")?;

        let now = inner.now();
        let comment = Comment {
            id: CommentId::new(),
            author,
            body: body.to_string(),
            created_at: now,
        };
        inner
            .targets
            .entry(target)
            .or_default()
            .comments
            .push(comment.clone());
        Ok(comment)
    }

    async fn remove_comment(
        &self,
        target: TargetId,
        comment: CommentId,
        _user: UserId,
    ) -> Result<u32, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("remove_comment")?;

        let record = inner.targets.entry(target).or_default();
        record.comments.retain(|c| c.id != comment);
        Ok(record.comments.len() as u32)
    }

    async fn list_conversations(
        &self,
        user: UserId,
        page: u32,
        size: u32,
    ) -> Result<Page<Conversation>, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("list_conversations")?;

        let mut all: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.involves(user))
            .cloned()
            .collect();
        all.sort_by(|x, y| y.last_activity_at.cmp(&x.last_activity_at));

        let start = (page as usize) * (size as usize);
        let end = (start + size as usize).min(all.len());
        let items = if start < all.len() {
            all[start..end].to_vec()
        } else {
            Vec::new()
        };
        Ok(Page {
            items,
            has_more: end < all.len(),
        })
    }

    async fn get_messages(
        &self,
        conversation: ConversationId,
        page: u32,
        size: u32,
    ) -> Result<Page<Message>, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("get_messages")?;

        let all = inner.messages.get(&conversation).cloned().unwrap_or_default();
        let start = (page as usize) * (size as usize);
        let end = (start + size as usize).min(all.len());
        let items = if start < all.len() {
            all[start..end].to_vec()
        } else {
            Vec::new()
        };
        Ok(Page {
            items,
            has_more: end < all.len(),
        })
    }

    async fn send_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        body: &str,
    ) -> Result<Message, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("send_message")?;

        let conv = inner
            .conversations
            .get(&conversation)
            .cloned()
            .ok_or_else(|| BackendError::Rejected("unknown conversation".into()))?;
        if !inner.is_mutual(conv.participants[0], conv.participants[1]) {
            return Err(BackendError::Rejected("participants not mutual".into()));
        }

        let now = inner.now();
        let message = Message {
            id: MessageId::new(),
            conversation,
            sender,
            body: body.to_string(),
            sent_at: now,
            read: false,
            read_at: None,
        };
        inner
            .messages
            .entry(conversation)
            .or_default()
            .push(message.clone());
        if let Some(c) = inner.conversations.get_mut(&conversation) {
            c.last_activity_at = now;
            c.last_message = Some(message.id);
        }
        Ok(message)
    }

    async fn mark_messages_read(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<bool, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("mark_messages_read")?;

        let now = inner.now();
        let mut changed = false;
        if let Some(messages) = inner.messages.get_mut(&conversation) {
            for message in messages.iter_mut() {
                if message.sender != user && !message.read {
                    message.read = true;
                    message.read_at = Some(now);
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    async fn unread_count(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<u32, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("unread_count")?;

        Ok(inner
            .messages
            .get(&conversation)
            .map(|msgs| msgs.iter().filter(|m| m.sender != user && !m.read).count() as u32)
            .unwrap_or(0))
    }

    async fn find_or_create_conversation(
        &self,
        user: UserId,
        other: UserId,
    ) -> Result<Conversation, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("find_or_create_conversation")?;

        if !inner.is_mutual(user, other) {
            return Err(BackendError::Rejected("participants not mutual".into()));
        }

        let key = tether_core::conversation::pair_key(user, other);
        if let Some(id) = inner.pairs.get(&key) {
            if let Some(conv) = inner.conversations.get(id) {
                return Ok(conv.clone());
            }
        }

        let now = inner.now();
        let conv = Conversation {
            id: ConversationId::new(),
            participants: [user, other],
            created_at: now,
            last_activity_at: now,
            last_message: None,
        };
        inner.pairs.insert(key, conv.id);
        inner.conversations.insert(conv.id, conv.clone());
        Ok(conv)
    }

    async fn get_user(&self, user: UserId) -> Result<Option<User>, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("get_user")?;
        Ok(inner.users.get(&user).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_accept_builds_one_directed_edge() {
        let backend = MockBackend::new();
        let a = UserId::new();
        let b = UserId::new();

        let edge = backend.request_follow(a, b).await.unwrap();
        assert_eq!(edge.state, FollowEdgeState::Requested);
        assert_eq!(
            backend.relationship_status(a, b).await.unwrap(),
            RelationshipStatus::RequestSent
        );

        let accepted = backend.accept_follow(edge.id).await.unwrap();
        assert_eq!(accepted.state, FollowEdgeState::Accepted);
        assert_eq!(
            backend.relationship_status(a, b).await.unwrap(),
            RelationshipStatus::Following
        );
        // Accept never auto-creates the reverse edge: from B's side there
        // is no outgoing follow and no pending incoming request.
        assert_eq!(
            backend.relationship_status(b, a).await.unwrap(),
            RelationshipStatus::NotFollowing
        );
    }

    #[tokio::test]
    async fn duplicate_request_is_rejected() {
        let backend = MockBackend::new();
        let a = UserId::new();
        let b = UserId::new();

        backend.request_follow(a, b).await.unwrap();
        let err = backend.request_follow(a, b).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }

    #[tokio::test]
    async fn reaction_toggle_cancels_on_repeat() {
        let backend = MockBackend::new();
        let target = TargetId::new();
        let user = UserId::new();

        let agg = backend
            .toggle_reaction(target, ReactionKind::Like, user)
            .await
            .unwrap();
        assert_eq!(agg.total(), 1);
        assert_eq!(agg.my_reaction, Some(ReactionKind::Like));

        let agg = backend
            .toggle_reaction(target, ReactionKind::Like, user)
            .await
            .unwrap();
        assert_eq!(agg.total(), 0);
        assert_eq!(agg.my_reaction, None);
    }

    #[tokio::test]
    async fn second_vote_is_rejected() {
        let backend = MockBackend::new();
        let target = TargetId::new();
        let user = UserId::new();

        backend
            .cast_vote(target, VoteChoice::Yes, user)
            .await
            .unwrap();
        let err = backend
            .cast_vote(target, VoteChoice::No, user)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }

    #[tokio::test]
    async fn conversation_requires_mutual_follow() {
        let backend = MockBackend::new();
        let a = UserId::new();
        let b = UserId::new();

        let err = backend.find_or_create_conversation(a, b).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }

    #[tokio::test]
    async fn fail_next_affects_exactly_one_call() {
        let backend = MockBackend::new();
        backend.fail_next("boom");

        let err = backend
            .relationship_status(UserId::new(), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unreachable(_)));

        backend
            .relationship_status(UserId::new(), UserId::new())
            .await
            .unwrap();
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let backend = MockBackend::new();
        let clone = backend.clone();
        let a = UserId::new();
        let b = UserId::new();

        backend.request_follow(a, b).await.unwrap();
        assert_eq!(
            clone.relationship_status(a, b).await.unwrap(),
            RelationshipStatus::RequestSent
        );
    }
}
