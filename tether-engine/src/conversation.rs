//! Mutual-follow-gated direct messaging.
//!
//! The gateway caches conversations and their message sequences, enforces
//! the mutuality gate before any message leaves the client, and keeps
//! message order authoritative: order is assigned by the backend, the
//! local view only appends placeholders at the tail until they are echoed.
//!
//! Mutuality is re-checked from the live relationship cache on every send,
//! not captured at conversation creation: either party can unfollow at any
//! time, which closes the conversation to new messages without deleting
//! its history.

use crate::backend::Backend;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventHub};
use crate::now_ms;
use crate::relationship::RelationshipGraph;
use dashmap::DashMap;
use std::sync::Arc;
use tether_core::conversation::{self, pair_key};
use tether_types::{Conversation, ConversationId, Message, MessageId, SessionContext, UserId};
use tokio::sync::Mutex;
use tracing::debug;

/// Conversation and message cache with the mutuality gate.
pub struct ConversationGateway<B> {
    backend: Arc<B>,
    graph: Arc<RelationshipGraph<B>>,
    conversations: DashMap<ConversationId, Conversation>,
    /// Normalized participant pair to conversation id.
    pairs: DashMap<(UserId, UserId), ConversationId>,
    messages: DashMap<ConversationId, Vec<Message>>,
    pair_locks: DashMap<(UserId, UserId), Arc<Mutex<()>>>,
    events: EventHub,
}

impl<B: Backend> ConversationGateway<B> {
    /// Create a gateway over the given backend and relationship cache.
    pub fn new(backend: Arc<B>, graph: Arc<RelationshipGraph<B>>, events: EventHub) -> Self {
        Self {
            backend,
            graph,
            conversations: DashMap::new(),
            pairs: DashMap::new(),
            messages: DashMap::new(),
            pair_locks: DashMap::new(),
            events,
        }
    }

    /// Whether the pair may exchange messages right now.
    pub fn can_message(&self, a: UserId, b: UserId) -> bool {
        self.graph.is_mutual(a, b)
    }

    /// The cached conversation record, if known.
    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.conversations.get(&id).map(|c| c.clone())
    }

    /// Cached conversations involving `user`, most recent activity first.
    pub fn conversations_for(&self, user: UserId) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| c.involves(user))
            .map(|c| c.clone())
            .collect();
        list.sort_by(|x, y| y.last_activity_at.cmp(&x.last_activity_at));
        list
    }

    /// The cached message sequence for a conversation, backend order.
    pub fn messages(&self, conversation: ConversationId) -> Vec<Message> {
        self.messages
            .get(&conversation)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Unread count for `user` from the cached messages.
    pub fn unread(&self, conversation: ConversationId, user: UserId) -> usize {
        self.messages
            .get(&conversation)
            .map(|m| conversation::unread_count(&m, user))
            .unwrap_or(0)
    }

    /// Find or create the conversation with `other`.
    ///
    /// Refused locally without a mutual follow; idempotent per pair.
    pub async fn open_conversation(
        &self,
        ctx: &SessionContext,
        other: UserId,
    ) -> Result<Conversation, EngineError> {
        let user = ctx.user_id;
        if !self.graph.is_mutual(user, other) {
            return Err(EngineError::NotMutual { a: user, b: other });
        }

        let key = pair_key(user, other);
        let lock = self.pair_lock(key);
        let _guard = lock.lock().await;

        if let Some(id) = self.pairs.get(&key).map(|id| *id) {
            if let Some(conv) = self.conversations.get(&id) {
                return Ok(conv.clone());
            }
        }

        let conv = self.backend.find_or_create_conversation(user, other).await?;
        self.pairs.insert(key, conv.id);
        self.conversations.insert(conv.id, conv.clone());
        self.messages.entry(conv.id).or_default();
        self.events.emit(EngineEvent::ConversationListUpdated { user });
        Ok(conv)
    }

    /// Send a message as the session user.
    ///
    /// The message appears immediately as a tail placeholder and is swapped
    /// for the backend's echo on confirmation; a failed send removes the
    /// placeholder entirely.
    pub async fn send_message(
        &self,
        ctx: &SessionContext,
        conversation: ConversationId,
        body: &str,
    ) -> Result<Message, EngineError> {
        let sender = ctx.user_id;
        let conv = self
            .conversation(conversation)
            .ok_or(EngineError::UnknownConversation(conversation))?;
        let other = conv
            .other_participant(sender)
            .ok_or(EngineError::UnknownConversation(conversation))?;

        // The gate is live state, not the state at conversation creation.
        if !self.graph.is_mutual(sender, other) {
            return Err(EngineError::NotMutual { a: sender, b: other });
        }

        let body = body.trim();
        if body.is_empty() {
            return Err(EngineError::EmptyBody);
        }

        let placeholder = Message {
            id: MessageId::new(),
            conversation,
            sender,
            body: body.to_string(),
            sent_at: now_ms(),
            read: false,
            read_at: None,
        };
        let temp_id = placeholder.id;
        self.messages
            .entry(conversation)
            .or_default()
            .push(placeholder);

        match self.backend.send_message(conversation, sender, body).await {
            Ok(echoed) => {
                if let Some(mut messages) = self.messages.get_mut(&conversation) {
                    conversation::resolve_placeholder(&mut messages, temp_id, echoed.clone());
                }
                if let Some(mut conv) = self.conversations.get_mut(&conversation) {
                    conv.last_activity_at = echoed.sent_at;
                    conv.last_message = Some(echoed.id);
                }
                self.events
                    .emit(EngineEvent::ConversationListUpdated { user: sender });
                Ok(echoed)
            }
            Err(source) => {
                if let Some(mut messages) = self.messages.get_mut(&conversation) {
                    conversation::drop_placeholder(&mut messages, temp_id);
                }
                Err(EngineError::Network(source))
            }
        }
    }

    /// Mark everything unread by the session user as read.
    ///
    /// A conversation with nothing unread is a local no-op and issues no
    /// backend call. Returns how many messages changed.
    pub async fn mark_read(
        &self,
        ctx: &SessionContext,
        conversation: ConversationId,
    ) -> Result<usize, EngineError> {
        let reader = ctx.user_id;
        if self.unread(conversation, reader) == 0 {
            return Ok(0);
        }

        self.backend.mark_messages_read(conversation, reader).await?;
        let changed = self
            .messages
            .get_mut(&conversation)
            .map(|mut m| conversation::mark_read(&mut m, reader, now_ms()))
            .unwrap_or(0);
        Ok(changed)
    }

    /// Fold a fetched message page into the cache.
    ///
    /// Emits [`EngineEvent::MessageArrived`] when the page contains
    /// messages from the other participant that the viewer had not seen.
    pub fn reconcile_messages(
        &self,
        viewer: UserId,
        conversation: ConversationId,
        fetched: &[Message],
    ) {
        let local = self.messages(conversation);
        let merge = conversation::merge_messages(&local, fetched);

        let new_messages = merge
            .new_ids
            .iter()
            .filter(|id| {
                merge
                    .messages
                    .iter()
                    .any(|m| m.id == **id && m.sender != viewer)
            })
            .count();
        self.messages.insert(conversation, merge.messages);

        if new_messages > 0 {
            debug!(%conversation, new_messages, "poll delivered new messages");
            self.events.emit(EngineEvent::MessageArrived {
                conversation,
                new_messages,
            });
        }
    }

    /// Fold a fetched conversation page into the cache.
    ///
    /// Emits [`EngineEvent::ConversationListUpdated`] only when something
    /// actually changed (new conversation, or new activity on a known one).
    pub fn reconcile_conversations(&self, user: UserId, fetched: &[Conversation]) {
        let mut changed = false;
        for conv in fetched {
            let known = self.conversations.get(&conv.id).map(|c| c.clone());
            if known.as_ref() != Some(conv) {
                changed = true;
            }
            self.pairs.insert(
                pair_key(conv.participants[0], conv.participants[1]),
                conv.id,
            );
            self.conversations.insert(conv.id, conv.clone());
        }
        if changed {
            self.events.emit(EngineEvent::ConversationListUpdated { user });
        }
    }

    fn pair_lock(&self, key: (UserId, UserId)) -> Arc<Mutex<()>> {
        self.pair_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    struct Fixture {
        gateway: ConversationGateway<MockBackend>,
        graph: Arc<RelationshipGraph<MockBackend>>,
        backend: MockBackend,
        events: EventHub,
        a: UserId,
        b: UserId,
    }

    fn ctx(user: UserId) -> SessionContext {
        SessionContext::new(user)
    }

    /// Two users, not yet following each other.
    fn fixture() -> Fixture {
        let backend = MockBackend::new();
        let events = EventHub::default();
        let graph = Arc::new(RelationshipGraph::new(
            Arc::new(backend.clone()),
            events.clone(),
        ));
        let gateway = ConversationGateway::new(
            Arc::new(backend.clone()),
            Arc::clone(&graph),
            events.clone(),
        );
        Fixture {
            gateway,
            graph,
            backend,
            events,
            a: UserId::new(),
            b: UserId::new(),
        }
    }

    /// Two users with a confirmed mutual follow.
    async fn mutual_fixture() -> Fixture {
        let f = fixture();
        let req = f.graph.request_follow(&ctx(f.a), f.b).await.unwrap();
        f.graph.accept_request(&ctx(f.b), req.id).await.unwrap();
        let req = f.graph.request_follow(&ctx(f.b), f.a).await.unwrap();
        f.graph.accept_request(&ctx(f.a), req.id).await.unwrap();
        f
    }

    #[tokio::test]
    async fn messaging_requires_mutual_follow() {
        let f = fixture();
        let err = f.gateway.open_conversation(&ctx(f.a), f.b).await.unwrap_err();
        assert!(matches!(err, EngineError::NotMutual { .. }));
        // Refused before any conversation call reached the backend.
        assert!(!f
            .backend
            .calls()
            .contains(&"find_or_create_conversation".to_string()));
    }

    #[tokio::test]
    async fn one_way_follow_is_not_enough() {
        let f = fixture();
        let req = f.graph.request_follow(&ctx(f.a), f.b).await.unwrap();
        f.graph.accept_request(&ctx(f.b), req.id).await.unwrap();

        assert!(!f.gateway.can_message(f.a, f.b));
        assert!(f
            .gateway
            .open_conversation(&ctx(f.a), f.b)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn open_conversation_is_idempotent_per_pair() {
        let f = mutual_fixture().await;
        let first = f.gateway.open_conversation(&ctx(f.a), f.b).await.unwrap();
        let second = f.gateway.open_conversation(&ctx(f.b), f.a).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn sent_message_is_echoed_into_the_cache() {
        let f = mutual_fixture().await;
        let conv = f.gateway.open_conversation(&ctx(f.a), f.b).await.unwrap();

        let sent = f
            .gateway
            .send_message(&ctx(f.a), conv.id, "hello")
            .await
            .unwrap();
        let messages = f.gateway.messages(conv.id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, sent.id);
        assert_eq!(messages[0].body, "hello");

        let updated = f.gateway.conversation(conv.id).unwrap();
        assert_eq!(updated.last_message, Some(sent.id));
    }

    #[tokio::test]
    async fn unread_then_mark_read_round_trip() {
        let f = mutual_fixture().await;
        let conv = f.gateway.open_conversation(&ctx(f.a), f.b).await.unwrap();

        f.gateway
            .send_message(&ctx(f.a), conv.id, "one")
            .await
            .unwrap();
        f.gateway
            .send_message(&ctx(f.a), conv.id, "two")
            .await
            .unwrap();

        assert_eq!(f.gateway.unread(conv.id, f.b), 2);
        assert_eq!(f.gateway.unread(conv.id, f.a), 0);

        let changed = f.gateway.mark_read(&ctx(f.b), conv.id).await.unwrap();
        assert_eq!(changed, 2);
        assert_eq!(f.gateway.unread(conv.id, f.b), 0);

        // Nothing unread: no further backend call.
        let calls_before = f.backend.calls().len();
        assert_eq!(f.gateway.mark_read(&ctx(f.b), conv.id).await.unwrap(), 0);
        assert_eq!(f.backend.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn failed_send_removes_the_placeholder() {
        let f = mutual_fixture().await;
        let conv = f.gateway.open_conversation(&ctx(f.a), f.b).await.unwrap();

        f.backend.fail_next("offline");
        let err = f
            .gateway
            .send_message(&ctx(f.a), conv.id, "lost")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Network(_)));
        assert!(f.gateway.messages(conv.id).is_empty());
        assert_eq!(f.backend.message_count(conv.id), 0);
    }

    #[tokio::test]
    async fn empty_message_body_is_refused_locally() {
        let f = mutual_fixture().await;
        let conv = f.gateway.open_conversation(&ctx(f.a), f.b).await.unwrap();

        let err = f
            .gateway
            .send_message(&ctx(f.a), conv.id, "  \n ")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyBody));
        assert!(f.gateway.messages(conv.id).is_empty());
    }

    #[tokio::test]
    async fn send_to_unknown_conversation_is_refused() {
        let f = mutual_fixture().await;
        let err = f
            .gateway
            .send_message(&ctx(f.a), ConversationId::new(), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownConversation(_)));
    }

    #[tokio::test]
    async fn unfollow_closes_the_conversation_to_new_messages() {
        let f = mutual_fixture().await;
        let conv = f.gateway.open_conversation(&ctx(f.a), f.b).await.unwrap();
        f.gateway
            .send_message(&ctx(f.a), conv.id, "while mutual")
            .await
            .unwrap();

        f.graph.unfollow(&ctx(f.b), f.a).await.unwrap();
        let err = f
            .gateway
            .send_message(&ctx(f.a), conv.id, "after unfollow")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotMutual { .. }));

        // History survives; only new sends are gated.
        assert_eq!(f.gateway.messages(conv.id).len(), 1);
    }

    #[tokio::test]
    async fn reconcile_reports_only_other_senders_as_new() {
        let f = mutual_fixture().await;
        let conv = f.gateway.open_conversation(&ctx(f.a), f.b).await.unwrap();
        let mut rx = f.events.subscribe();

        let from_b = Message {
            id: MessageId::new(),
            conversation: conv.id,
            sender: f.b,
            body: "ping".into(),
            sent_at: 1,
            read: false,
            read_at: None,
        };
        let from_a = Message {
            id: MessageId::new(),
            conversation: conv.id,
            sender: f.a,
            body: "own echo".into(),
            sent_at: 2,
            read: false,
            read_at: None,
        };
        f.gateway
            .reconcile_messages(f.a, conv.id, &[from_b.clone(), from_a]);

        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::MessageArrived {
                conversation: conv.id,
                new_messages: 1,
            }
        );
        assert_eq!(f.gateway.messages(conv.id).len(), 2);

        // Reconciling the same page again raises nothing.
        f.gateway
            .reconcile_messages(f.a, conv.id, &f.gateway.messages(conv.id));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconcile_conversations_signals_changes_once() {
        let f = mutual_fixture().await;
        let conv = f.gateway.open_conversation(&ctx(f.a), f.b).await.unwrap();
        let mut rx = f.events.subscribe();

        let mut touched = conv.clone();
        touched.last_activity_at += 100;
        f.gateway.reconcile_conversations(f.a, &[touched.clone()]);
        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::ConversationListUpdated { user: f.a }
        );

        // Identical page: silence.
        f.gateway.reconcile_conversations(f.a, &[touched]);
        assert!(rx.try_recv().is_err());
    }
}
