//! Follow-edge transition table and status derivation.
//!
//! This module provides the pure, side-effect-free rules for the follow
//! state machine. The only legal edge transitions are
//! NONE -> REQUESTED -> ACCEPTED, REQUESTED -> NONE (reject) and
//! ACCEPTED -> NONE (unfollow). Accepting an already-accepted edge is a
//! no-op success, not an error.
//!
//! The actual backend calls are issued by `tether-engine`, which consults
//! this table before every mutation. This enables instant unit testing of
//! the state machine without network mocks.

use tether_types::{FollowEdgeState, RelationshipStatus};
use thiserror::Error;

/// A requested change to one directed follow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeTransition {
    /// Follower asks to follow (NONE -> REQUESTED).
    Request,
    /// Followee accepts a pending request (REQUESTED -> ACCEPTED).
    Accept,
    /// Followee rejects a pending request (REQUESTED -> NONE).
    Reject,
    /// Follower withdraws an accepted follow (ACCEPTED -> NONE).
    Unfollow,
}

/// An illegal relationship state change was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition {attempted:?} from edge state {from:?}")]
pub struct TransitionError {
    /// The edge state the transition was attempted from.
    pub from: FollowEdgeState,
    /// The transition that was attempted.
    pub attempted: EdgeTransition,
}

/// The result of a legal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The edge moved to a new state.
    Changed(FollowEdgeState),
    /// The edge was already in the target state (idempotent success).
    Unchanged(FollowEdgeState),
}

impl Applied {
    /// The edge state after the transition.
    pub fn state(&self) -> FollowEdgeState {
        match self {
            Applied::Changed(s) | Applied::Unchanged(s) => *s,
        }
    }
}

/// Apply a transition to an edge state, or fail with [`TransitionError`].
///
/// This is a pure function; the caller is responsible for only committing
/// the result after backend confirmation.
pub fn apply(from: FollowEdgeState, transition: EdgeTransition) -> Result<Applied, TransitionError> {
    use EdgeTransition::*;
    use FollowEdgeState::*;

    match (from, transition) {
        (None, Request) => Ok(Applied::Changed(Requested)),
        (Requested, Accept) => Ok(Applied::Changed(Accepted)),
        // Re-accepting an accepted edge is a no-op success.
        (Accepted, Accept) => Ok(Applied::Unchanged(Accepted)),
        (Requested, Reject) => Ok(Applied::Changed(None)),
        (Accepted, Unfollow) => Ok(Applied::Changed(None)),
        (from, attempted) => Err(TransitionError { from, attempted }),
    }
}

/// Derive the canonical status from the two directed edges, seen from the
/// owner of the outgoing edge.
pub fn status_of(outgoing: FollowEdgeState, incoming: FollowEdgeState) -> RelationshipStatus {
    use FollowEdgeState::*;

    match (outgoing, incoming) {
        (Accepted, Accepted) => RelationshipStatus::Mutual,
        (Accepted, _) => RelationshipStatus::Following,
        (Requested, _) => RelationshipStatus::RequestSent,
        (None, Requested) => RelationshipStatus::RequestReceived,
        (None, _) => RelationshipStatus::NotFollowing,
    }
}

/// True iff both directed edges are accepted. Derived, never stored:
/// either party can unfollow at any time, so this must be recomputed on
/// every relevant read.
pub fn is_mutual(outgoing: FollowEdgeState, incoming: FollowEdgeState) -> bool {
    outgoing == FollowEdgeState::Accepted && incoming == FollowEdgeState::Accepted
}

/// Map the canonical status back onto the directed edge pair.
///
/// Used when reconciling a backend `relationship_status` poll: the five
/// canonical states correspond to exactly one edge pair each.
pub fn edges_of(status: RelationshipStatus) -> (FollowEdgeState, FollowEdgeState) {
    use FollowEdgeState::*;

    match status {
        RelationshipStatus::NotFollowing => (None, None),
        RelationshipStatus::RequestSent => (Requested, None),
        RelationshipStatus::RequestReceived => (None, Requested),
        RelationshipStatus::Following => (Accepted, None),
        RelationshipStatus::Mutual => (Accepted, Accepted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FollowEdgeState::*;

    #[test]
    fn request_from_none_is_legal() {
        let applied = apply(None, EdgeTransition::Request).unwrap();
        assert_eq!(applied, Applied::Changed(Requested));
    }

    #[test]
    fn request_while_pending_is_illegal() {
        let err = apply(Requested, EdgeTransition::Request).unwrap_err();
        assert_eq!(err.from, Requested);
        assert_eq!(err.attempted, EdgeTransition::Request);
    }

    #[test]
    fn request_while_following_is_illegal() {
        assert!(apply(Accepted, EdgeTransition::Request).is_err());
    }

    #[test]
    fn accept_moves_requested_to_accepted() {
        let applied = apply(Requested, EdgeTransition::Accept).unwrap();
        assert_eq!(applied.state(), Accepted);
    }

    #[test]
    fn re_accept_is_noop_success() {
        let applied = apply(Accepted, EdgeTransition::Accept).unwrap();
        assert_eq!(applied, Applied::Unchanged(Accepted));
    }

    #[test]
    fn accept_without_request_is_illegal() {
        assert!(apply(None, EdgeTransition::Accept).is_err());
    }

    #[test]
    fn reject_clears_pending_request() {
        let applied = apply(Requested, EdgeTransition::Reject).unwrap();
        assert_eq!(applied.state(), None);
    }

    #[test]
    fn reject_of_accepted_edge_is_illegal() {
        assert!(apply(Accepted, EdgeTransition::Reject).is_err());
    }

    #[test]
    fn unfollow_clears_accepted_edge() {
        let applied = apply(Accepted, EdgeTransition::Unfollow).unwrap();
        assert_eq!(applied.state(), None);
    }

    #[test]
    fn unfollow_of_pending_request_is_illegal() {
        assert!(apply(Requested, EdgeTransition::Unfollow).is_err());
        assert!(apply(None, EdgeTransition::Unfollow).is_err());
    }

    #[test]
    fn status_is_mutual_iff_both_accepted() {
        assert_eq!(status_of(Accepted, Accepted), RelationshipStatus::Mutual);
        assert_eq!(status_of(Accepted, None), RelationshipStatus::Following);
        assert_eq!(status_of(Accepted, Requested), RelationshipStatus::Following);
        assert_eq!(status_of(Requested, None), RelationshipStatus::RequestSent);
        assert_eq!(status_of(None, Requested), RelationshipStatus::RequestReceived);
        assert_eq!(status_of(None, None), RelationshipStatus::NotFollowing);
    }

    #[test]
    fn mutuality_requires_both_directions() {
        assert!(is_mutual(Accepted, Accepted));
        assert!(!is_mutual(Accepted, None));
        assert!(!is_mutual(Accepted, Requested));
        assert!(!is_mutual(None, Accepted));
    }

    #[test]
    fn canonical_status_maps_back_to_edges() {
        for status in [
            RelationshipStatus::NotFollowing,
            RelationshipStatus::RequestSent,
            RelationshipStatus::RequestReceived,
            RelationshipStatus::Following,
            RelationshipStatus::Mutual,
        ] {
            let (outgoing, incoming) = edges_of(status);
            assert_eq!(status_of(outgoing, incoming), status);
        }
    }
}
