//! Pure aggregate rules for reactions, votes and comments.
//!
//! These functions compute the local guess of the rule the backend is
//! expected to apply. The engine applies them through an
//! [`Overlay`](crate::overlay::Overlay) and later replaces the guess with
//! the backend's authoritative aggregate.

use tether_types::{
    Comment, CommentId, CommentThread, ReactionAggregate, ReactionKind, VoteAggregate,
    VoteChoice,
};

/// Apply the reaction toggle rule.
///
/// Selecting the same kind again cancels it; selecting a different kind
/// moves the user's contribution from the old kind to the new one. Counts
/// for kinds that reach zero are removed so the total stays the sum of
/// present entries.
pub fn toggle_reaction(agg: &ReactionAggregate, kind: ReactionKind) -> ReactionAggregate {
    let mut next = agg.clone();

    if let Some(previous) = next.my_reaction.take() {
        decrement(&mut next, previous);
        if previous == kind {
            return next;
        }
    }

    *next.counts.entry(kind).or_insert(0) += 1;
    next.my_reaction = Some(kind);
    next
}

fn decrement(agg: &mut ReactionAggregate, kind: ReactionKind) {
    if let Some(count) = agg.counts.get_mut(&kind) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            agg.counts.remove(&kind);
        }
    }
}

/// Apply a vote. Preconditions (one vote per user per target) are checked
/// by the caller before applying; this function only adds the tally.
pub fn cast_vote(agg: &VoteAggregate, choice: VoteChoice) -> VoteAggregate {
    let mut next = *agg;
    match choice {
        VoteChoice::Yes => next.yes += 1,
        VoteChoice::No => next.no += 1,
    }
    next.my_vote = Some(choice);
    next
}

/// Append a comment (with its locally assigned temporary id) to the thread.
pub fn append_comment(thread: &CommentThread, comment: Comment) -> CommentThread {
    let mut next = thread.clone();
    next.entries.push(comment);
    next
}

/// Replace the placeholder carrying `temp_id` with the backend's echoed
/// comment, in place. If the placeholder is gone (rolled back or already
/// resolved), the echoed comment is appended instead so it is never lost.
pub fn resolve_comment(
    thread: &CommentThread,
    temp_id: CommentId,
    echoed: Comment,
) -> CommentThread {
    let mut next = thread.clone();
    match next.entries.iter_mut().find(|c| c.id == temp_id) {
        Some(slot) => *slot = echoed,
        None => next.entries.push(echoed),
    }
    next
}

/// Remove a comment by id. Removing an absent id leaves the thread as is.
pub fn remove_comment(thread: &CommentThread, id: CommentId) -> CommentThread {
    let mut next = thread.clone();
    next.entries.retain(|c| c.id != id);
    next
}
