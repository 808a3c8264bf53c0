//! Engagement aggregate types: reactions, votes, comments.
//!
//! The backend owns the authoritative values; the engine holds only the
//! in-flight speculative overlay (see `tether-core::overlay`). Totals are
//! never stored, always recomputed from per-kind counts, to avoid drift.

use crate::ids::{CommentId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kinds of reaction a user can leave on a target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    /// Plain approval.
    Like,
    /// Strong approval.
    Love,
    /// Amusement.
    Laugh,
    /// Sympathy.
    Sad,
    /// Outrage.
    Angry,
}

/// Per-target reaction counts plus the calling user's own reaction.
///
/// At most one reaction per user per target; selecting the same kind again
/// cancels it, selecting another kind moves the contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReactionAggregate {
    /// Count per reaction kind. Kinds with a zero count are absent.
    pub counts: BTreeMap<ReactionKind, u32>,
    /// The calling user's reaction, if any.
    pub my_reaction: Option<ReactionKind>,
}

impl ReactionAggregate {
    /// Total reactions, recomputed as the sum of per-kind counts.
    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// Count for one kind (zero if absent).
    pub fn count(&self, kind: ReactionKind) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

/// A yes/no vote choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    /// In favour.
    Yes,
    /// Against.
    No,
}

/// Per-target vote tallies plus the calling user's own vote.
///
/// One vote per user per target; votes are not togglable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VoteAggregate {
    /// Yes tally.
    pub yes: u32,
    /// No tally.
    pub no: u32,
    /// The calling user's vote, if cast.
    pub my_vote: Option<VoteChoice>,
}

impl VoteAggregate {
    /// Total votes, recomputed from the tallies.
    pub fn total(&self) -> u32 {
        self.yes + self.no
    }

    /// Whether the calling user has already voted.
    pub fn has_voted(&self) -> bool {
        self.my_vote.is_some()
    }
}

/// A comment on an engagement target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Backend-assigned id, or a locally assigned temporary id while the
    /// append is in flight.
    pub id: CommentId,
    /// The author.
    pub author: UserId,
    /// The comment body.
    pub body: String,
    /// Creation time, unix epoch milliseconds (backend clock once echoed).
    pub created_at: u64,
}

/// The cached comment sequence for one target, in backend order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommentThread {
    /// The comments, oldest first.
    pub entries: Vec<Comment>,
}

impl CommentThread {
    /// The comment count surfaced to the UI.
    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_total_is_sum_of_counts() {
        let mut agg = ReactionAggregate::default();
        agg.counts.insert(ReactionKind::Like, 3);
        agg.counts.insert(ReactionKind::Angry, 2);
        assert_eq!(agg.total(), 5);
        assert_eq!(agg.count(ReactionKind::Like), 3);
        assert_eq!(agg.count(ReactionKind::Sad), 0);
    }

    #[test]
    fn vote_total_and_flag() {
        let agg = VoteAggregate {
            yes: 4,
            no: 1,
            my_vote: Some(VoteChoice::Yes),
        };
        assert_eq!(agg.total(), 5);
        assert!(agg.has_voted());
        assert!(!VoteAggregate::default().has_voted());
    }
}
