//! Pure conversation helpers: unread tracking, read marking and the
//! identity-diff merge used by both direct sends and poll refreshes.
//!
//! Message order inside a conversation is assigned by the backend and is
//! never re-derived locally; merges append unseen messages in the order
//! the backend returned them and replace placeholders in place.

use tether_types::{Message, MessageId, UserId};

/// Normalized key for the unordered pair of conversation participants.
///
/// Both `(a, b)` and `(b, a)` map to the same key, which keeps
/// get-or-create idempotent per pair.
pub fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Count of messages not authored by `user` that are still unread.
pub fn unread_count(messages: &[Message], user: UserId) -> usize {
    messages
        .iter()
        .filter(|m| m.sender != user && !m.read)
        .count()
}

/// Mark all unread messages not authored by `reader` as read at `now_ms`.
///
/// Returns the number of messages that changed; zero means the call was a
/// no-op and nothing needs to be persisted.
pub fn mark_read(messages: &mut [Message], reader: UserId, now_ms: u64) -> usize {
    let mut changed = 0;
    for message in messages.iter_mut() {
        if message.sender != reader && !message.read {
            message.read = true;
            message.read_at = Some(now_ms);
            changed += 1;
        }
    }
    changed
}

/// Result of merging a fetched message page into the local view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMerge {
    /// The merged sequence, backend order preserved.
    pub messages: Vec<Message>,
    /// Ids that were not present locally before the merge.
    pub new_ids: Vec<MessageId>,
}

/// Merge a backend-fetched page into the locally held sequence.
///
/// The diff is by identity (ids), not deep equality: a message the local
/// view already holds is replaced with the fetched copy (read flags may
/// have changed server-side) without counting as new content; unseen ids
/// are appended and reported so the caller can raise a new-content signal.
/// Local-only messages (in-flight placeholders) are kept at the tail.
pub fn merge_messages(local: &[Message], fetched: &[Message]) -> MessageMerge {
    let mut merged: Vec<Message> = Vec::with_capacity(fetched.len());
    let mut new_ids = Vec::new();

    for message in fetched {
        if !local.iter().any(|m| m.id == message.id) {
            new_ids.push(message.id);
        }
        merged.push(message.clone());
    }

    // Keep placeholders that the backend has not echoed yet.
    for message in local {
        if !merged.iter().any(|m| m.id == message.id) {
            merged.push(message.clone());
        }
    }

    MessageMerge { messages: merged, new_ids }
}

/// Replace the placeholder carrying `temp_id` with the backend's echoed
/// message, keeping its insertion position. If the placeholder is gone the
/// echoed message is appended, never duplicated.
pub fn resolve_placeholder(messages: &mut Vec<Message>, temp_id: MessageId, echoed: Message) {
    if messages.iter().any(|m| m.id == echoed.id) {
        // A poll refresh already delivered the real message.
        messages.retain(|m| m.id != temp_id);
        return;
    }
    match messages.iter_mut().find(|m| m.id == temp_id) {
        Some(slot) => *slot = echoed,
        None => messages.push(echoed),
    }
}

/// Drop the placeholder carrying `temp_id` (send rollback).
pub fn drop_placeholder(messages: &mut Vec<Message>, temp_id: MessageId) {
    messages.retain(|m| m.id != temp_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::ConversationId;

    fn message(conversation: ConversationId, sender: UserId, body: &str, read: bool) -> Message {
        Message {
            id: MessageId::new(),
            conversation,
            sender,
            body: body.to_string(),
            sent_at: 1_700_000_000_000,
            read,
            read_at: None,
        }
    }

    #[test]
    fn pair_key_is_order_independent() {
        let a = UserId::new();
        let b = UserId::new();
        assert_eq!(pair_key(a, b), pair_key(b, a));
    }

    #[test]
    fn unread_counts_only_other_senders() {
        let conv = ConversationId::new();
        let me = UserId::new();
        let them = UserId::new();
        let messages = vec![
            message(conv, them, "hi", false),
            message(conv, them, "there", false),
            message(conv, me, "hello", false),
        ];
        assert_eq!(unread_count(&messages, me), 2);
        assert_eq!(unread_count(&messages, them), 1);
    }

    #[test]
    fn mark_read_sets_flags_and_reports_changes() {
        let conv = ConversationId::new();
        let me = UserId::new();
        let them = UserId::new();
        let mut messages = vec![
            message(conv, them, "a", false),
            message(conv, them, "b", true),
            message(conv, me, "c", false),
        ];

        let changed = mark_read(&mut messages, me, 42);
        assert_eq!(changed, 1);
        assert!(messages[0].read);
        assert_eq!(messages[0].read_at, Some(42));
        // Own messages are untouched.
        assert!(!messages[2].read);

        // Second pass is a no-op.
        assert_eq!(mark_read(&mut messages, me, 43), 0);
    }

    #[test]
    fn merge_reports_unseen_ids_only() {
        let conv = ConversationId::new();
        let them = UserId::new();
        let known = message(conv, them, "old", false);
        let fresh = message(conv, them, "new", false);

        let merge = merge_messages(&[known.clone()], &[known.clone(), fresh.clone()]);
        assert_eq!(merge.new_ids, vec![fresh.id]);
        assert_eq!(merge.messages.len(), 2);
    }

    #[test]
    fn merge_keeps_local_placeholder_at_tail() {
        let conv = ConversationId::new();
        let them = UserId::new();
        let me = UserId::new();
        let server = message(conv, them, "server", false);
        let placeholder = message(conv, me, "pending", false);

        let merge = merge_messages(&[placeholder.clone()], &[server.clone()]);
        assert_eq!(merge.messages.last().unwrap().id, placeholder.id);
        assert_eq!(merge.new_ids, vec![server.id]);
    }

    #[test]
    fn merge_replaces_known_copy_with_fetched_one() {
        let conv = ConversationId::new();
        let them = UserId::new();
        let mut local = message(conv, them, "x", false);
        let mut fetched = local.clone();
        fetched.read = true;
        local.read = false;

        let merge = merge_messages(&[local], &[fetched.clone()]);
        assert!(merge.new_ids.is_empty());
        assert!(merge.messages[0].read);
    }

    #[test]
    fn resolve_placeholder_keeps_position() {
        let conv = ConversationId::new();
        let me = UserId::new();
        let placeholder = message(conv, me, "draft", false);
        let after = message(conv, me, "later", false);
        let mut messages = vec![placeholder.clone(), after.clone()];

        let mut echoed = placeholder.clone();
        echoed.id = MessageId::new();
        echoed.sent_at = 99;
        resolve_placeholder(&mut messages, placeholder.id, echoed.clone());

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, echoed.id);
        assert_eq!(messages[1].id, after.id);
    }

    #[test]
    fn resolve_after_poll_echo_does_not_duplicate() {
        let conv = ConversationId::new();
        let me = UserId::new();
        let placeholder = message(conv, me, "draft", false);
        let mut echoed = placeholder.clone();
        echoed.id = MessageId::new();

        // Poll delivered the real message while the send was settling.
        let mut messages = vec![echoed.clone(), placeholder.clone()];
        resolve_placeholder(&mut messages, placeholder.id, echoed.clone());

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, echoed.id);
    }

    #[test]
    fn drop_placeholder_removes_only_target() {
        let conv = ConversationId::new();
        let me = UserId::new();
        let keep = message(conv, me, "keep", false);
        let gone = message(conv, me, "gone", false);
        let mut messages = vec![keep.clone(), gone.clone()];

        drop_placeholder(&mut messages, gone.id);
        assert_eq!(messages, vec![keep]);
    }
}
