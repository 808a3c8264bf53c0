//! Generation-guarded polling.
//!
//! The backend is poll-only: nothing is pushed to the client. The
//! scheduler runs one background task per scope kind (conversation list,
//! active conversation, one relationship pair, one user's presence), each
//! tagged with the [`Generation`] that was current when it started.
//! Starting or stopping a scope advances the kind's generation, so any
//! in-flight fetch that resolves afterwards is detected as stale and
//! discarded without touching local state. This is what keeps a fast
//! conversation switch from replaying the old conversation's messages
//! into the new view.
//!
//! Polls never overlap: each task awaits its own fetch inline and skips
//! missed ticks rather than bunching them.

use crate::backend::Backend;
use crate::conversation::ConversationGateway;
use crate::error::EngineError;
use crate::relationship::RelationshipGraph;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_core::GenerationCounter;
use tether_types::{ConversationId, Generation, UserId};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Polling cadence and behavior.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between poll ticks for every scope.
    pub interval: Duration,
    /// Skip ticks while the surface is hidden (backgrounded tab or app).
    pub pause_when_hidden: bool,
    /// Page size for list and message fetches.
    pub page_size: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            pause_when_hidden: true,
            page_size: 50,
        }
    }
}

impl PollConfig {
    /// Set the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set whether hidden surfaces pause polling.
    pub fn with_pause_when_hidden(mut self, pause: bool) -> Self {
        self.pause_when_hidden = pause;
        self
    }

    /// Set the fetch page size.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }
}

/// What one polling task watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollScope {
    /// The viewer's conversation list.
    ConversationList {
        /// The list owner.
        user: UserId,
    },
    /// The messages of the conversation currently on screen.
    ActiveConversation {
        /// The session user viewing the conversation.
        viewer: UserId,
        /// The conversation on screen.
        conversation: ConversationId,
    },
    /// The canonical status of one user pair.
    Relationship {
        /// One side of the pair.
        a: UserId,
        /// The other side.
        b: UserId,
    },
    /// One user's directory record (display name, avatar, last-active).
    Presence {
        /// The watched user.
        user: UserId,
    },
}

/// Scope family; one polling task and one generation counter per kind.
/// Starting a scope replaces the running scope of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// [`PollScope::ConversationList`].
    ConversationList,
    /// [`PollScope::ActiveConversation`].
    ActiveConversation,
    /// [`PollScope::Relationship`].
    Relationship,
    /// [`PollScope::Presence`].
    Presence,
}

impl PollScope {
    /// The scope's family.
    pub fn kind(&self) -> ScopeKind {
        match self {
            PollScope::ConversationList { .. } => ScopeKind::ConversationList,
            PollScope::ActiveConversation { .. } => ScopeKind::ActiveConversation,
            PollScope::Relationship { .. } => ScopeKind::Relationship,
            PollScope::Presence { .. } => ScopeKind::Presence,
        }
    }
}

/// Background poller that feeds the graph and gateway caches.
pub struct PollingScheduler<B> {
    backend: Arc<B>,
    graph: Arc<RelationshipGraph<B>>,
    gateway: Arc<ConversationGateway<B>>,
    config: PollConfig,
    hidden: AtomicBool,
    generations: DashMap<ScopeKind, GenerationCounter>,
    tasks: Mutex<HashMap<ScopeKind, JoinHandle<()>>>,
}

impl<B: Backend> PollingScheduler<B> {
    /// Create a scheduler feeding the given caches.
    pub fn new(
        backend: Arc<B>,
        graph: Arc<RelationshipGraph<B>>,
        gateway: Arc<ConversationGateway<B>>,
        config: PollConfig,
    ) -> Self {
        Self {
            backend,
            graph,
            gateway,
            config,
            hidden: AtomicBool::new(false),
            generations: DashMap::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start polling a scope, replacing any running scope of the same kind.
    ///
    /// Returns the generation the new task is tagged with; results from
    /// the replaced task resolve against an advanced counter and are
    /// dropped unreconciled.
    pub fn start(self: &Arc<Self>, scope: PollScope) -> Generation {
        let kind = scope.kind();
        let generation = self.advance(kind);
        debug!(?kind, generation = generation.value(), "poll scope started");

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let period = scheduler.config.interval;
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                if scheduler.config.pause_when_hidden && scheduler.is_hidden() {
                    continue;
                }
                match scheduler.poll_once(&scope, generation).await {
                    Ok(()) => {}
                    // The scope was replaced under us; stop quietly.
                    Err(EngineError::StaleGeneration) => break,
                    Err(error) => {
                        debug!(?kind, %error, "poll tick failed, will retry")
                    }
                }
            }
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(previous) = tasks.insert(kind, handle) {
                previous.abort();
            }
        }
        generation
    }

    /// Stop the running scope of this kind and invalidate its generation.
    pub fn stop(&self, kind: ScopeKind) {
        self.advance(kind);
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(handle) = tasks.remove(&kind) {
                handle.abort();
            }
        }
    }

    /// Stop every running scope.
    pub fn stop_all(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for (kind, handle) in tasks.drain() {
                self.advance(kind);
                handle.abort();
            }
        }
    }

    /// Mark the surface hidden or visible.
    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::Relaxed);
    }

    /// Whether the surface is currently hidden.
    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::Relaxed)
    }

    /// Run one poll of the scope, reconciling only if `generation` is
    /// still current for the scope's kind after the fetch resolves.
    ///
    /// A stale result returns [`EngineError::StaleGeneration`] with local
    /// state untouched; the run loop treats that as a quiet exit.
    pub async fn poll_once(
        &self,
        scope: &PollScope,
        generation: Generation,
    ) -> Result<(), EngineError> {
        match scope {
            PollScope::ConversationList { user } => {
                let page = self
                    .backend
                    .list_conversations(*user, 0, self.config.page_size)
                    .await?;
                self.guard(scope.kind(), generation)?;
                self.gateway.reconcile_conversations(*user, &page.items);
            }
            PollScope::ActiveConversation {
                viewer,
                conversation,
            } => {
                let page = self
                    .backend
                    .get_messages(*conversation, 0, self.config.page_size)
                    .await?;
                self.guard(scope.kind(), generation)?;
                self.gateway
                    .reconcile_messages(*viewer, *conversation, &page.items);
            }
            PollScope::Relationship { a, b } => {
                let status = self.backend.relationship_status(*a, *b).await?;
                self.guard(scope.kind(), generation)?;
                self.graph.reconcile_status(*a, *b, status);
            }
            PollScope::Presence { user } => {
                let record = self.backend.get_user(*user).await?;
                self.guard(scope.kind(), generation)?;
                if let Some(user) = record {
                    self.graph.reconcile_user(user);
                }
            }
        }
        Ok(())
    }

    /// The generation currently in effect for a scope kind.
    pub fn current_generation(&self, kind: ScopeKind) -> Generation {
        self.generations
            .get(&kind)
            .map(|c| c.current())
            .unwrap_or_else(Generation::zero)
    }

    fn advance(&self, kind: ScopeKind) -> Generation {
        self.generations.entry(kind).or_default().advance()
    }

    fn guard(&self, kind: ScopeKind, generation: Generation) -> Result<(), EngineError> {
        let current = self
            .generations
            .get(&kind)
            .map(|c| c.is_current(generation))
            .unwrap_or(false);
        if current {
            Ok(())
        } else {
            debug!(?kind, generation = generation.value(), "stale poll discarded");
            Err(EngineError::StaleGeneration)
        }
    }
}

impl<B> Drop for PollingScheduler<B> {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.lock() {
            for handle in tasks.values() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::events::EventHub;
    use tether_types::RelationshipStatus;

    struct Fixture {
        scheduler: Arc<PollingScheduler<MockBackend>>,
        graph: Arc<RelationshipGraph<MockBackend>>,
        gateway: Arc<ConversationGateway<MockBackend>>,
        backend: MockBackend,
        a: UserId,
        b: UserId,
    }

    fn fixture() -> Fixture {
        let backend = MockBackend::new();
        let events = EventHub::default();
        let graph = Arc::new(RelationshipGraph::new(
            Arc::new(backend.clone()),
            events.clone(),
        ));
        let gateway = Arc::new(ConversationGateway::new(
            Arc::new(backend.clone()),
            Arc::clone(&graph),
            events.clone(),
        ));
        let scheduler = Arc::new(PollingScheduler::new(
            Arc::new(backend.clone()),
            Arc::clone(&graph),
            Arc::clone(&gateway),
            PollConfig::default().with_interval(Duration::from_millis(100)),
        ));
        Fixture {
            scheduler,
            graph,
            gateway,
            backend,
            a: UserId::new(),
            b: UserId::new(),
        }
    }

    /// Make the pair mutual directly on the backend, bypassing the caches.
    async fn make_mutual(backend: &MockBackend, a: UserId, b: UserId) {
        let req = backend.request_follow(a, b).await.unwrap();
        backend.accept_follow(req.id).await.unwrap();
        let req = backend.request_follow(b, a).await.unwrap();
        backend.accept_follow(req.id).await.unwrap();
    }

    #[tokio::test]
    async fn relationship_poll_folds_status_into_the_graph() {
        let f = fixture();
        make_mutual(&f.backend, f.a, f.b).await;

        let scope = PollScope::Relationship { a: f.a, b: f.b };
        let generation = f.scheduler.start(scope.clone());
        f.scheduler.poll_once(&scope, generation).await.unwrap();

        assert!(f.graph.is_mutual(f.a, f.b));
        f.scheduler.stop_all();
    }

    #[tokio::test]
    async fn replaced_scope_discards_its_late_result() {
        let f = fixture();
        make_mutual(&f.backend, f.a, f.b).await;

        let old_scope = PollScope::Relationship { a: f.a, b: f.b };
        let old_generation = f.scheduler.start(old_scope.clone());

        // The user navigated elsewhere; a different pair is now watched.
        f.scheduler.start(PollScope::Relationship {
            a: f.a,
            b: UserId::new(),
        });

        let err = f
            .scheduler
            .poll_once(&old_scope, old_generation)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StaleGeneration));
        // The stale result never touched the cache.
        assert_eq!(f.graph.status(f.a, f.b), RelationshipStatus::NotFollowing);
        f.scheduler.stop_all();
    }

    #[tokio::test]
    async fn stopping_a_scope_invalidates_its_generation() {
        let f = fixture();
        let scope = PollScope::Presence { user: f.a };
        let generation = f.scheduler.start(scope.clone());
        f.scheduler.stop(ScopeKind::Presence);

        let err = f.scheduler.poll_once(&scope, generation).await.unwrap_err();
        assert!(matches!(err, EngineError::StaleGeneration));
    }

    #[tokio::test]
    async fn conversation_poll_delivers_messages_sent_elsewhere() {
        let f = fixture();
        make_mutual(&f.backend, f.a, f.b).await;
        let conv = f
            .backend
            .find_or_create_conversation(f.a, f.b)
            .await
            .unwrap();
        f.gateway.reconcile_conversations(f.a, &[conv.clone()]);

        // Another device of b sends while we are watching.
        f.backend.send_message(conv.id, f.b, "from afar").await.unwrap();

        let scope = PollScope::ActiveConversation {
            viewer: f.a,
            conversation: conv.id,
        };
        let generation = f.scheduler.start(scope.clone());
        f.scheduler.poll_once(&scope, generation).await.unwrap();

        let messages = f.gateway.messages(conv.id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "from afar");
        assert_eq!(f.gateway.unread(conv.id, f.a), 1);
        f.scheduler.stop_all();
    }

    #[tokio::test]
    async fn presence_poll_updates_the_directory() {
        let f = fixture();
        f.backend.insert_user_named(f.a, "ada");

        let scope = PollScope::Presence { user: f.a };
        let generation = f.scheduler.start(scope.clone());
        f.scheduler.poll_once(&scope, generation).await.unwrap();

        assert_eq!(f.graph.user(f.a).unwrap().display_name, "ada");
        f.scheduler.stop_all();
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_polls_on_its_own() {
        let f = fixture();
        make_mutual(&f.backend, f.a, f.b).await;
        let conv = f
            .backend
            .find_or_create_conversation(f.a, f.b)
            .await
            .unwrap();

        f.scheduler.start(PollScope::ConversationList { user: f.a });
        tokio::time::sleep(Duration::from_millis(250)).await;

        let list = f.gateway.conversations_for(f.a);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, conv.id);
        f.scheduler.stop_all();
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_surface_pauses_polling() {
        let f = fixture();
        make_mutual(&f.backend, f.a, f.b).await;
        f.backend
            .find_or_create_conversation(f.a, f.b)
            .await
            .unwrap();

        f.scheduler.set_hidden(true);
        f.scheduler.start(PollScope::ConversationList { user: f.a });
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(f.gateway.conversations_for(f.a).is_empty());

        // Visibility returns; the next tick reconciles.
        f.scheduler.set_hidden(false);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(f.gateway.conversations_for(f.a).len(), 1);
        f.scheduler.stop_all();
    }
}
