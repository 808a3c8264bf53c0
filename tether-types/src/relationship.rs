//! Follow-edge and relationship types.

use crate::ids::{RequestId, UserId};
use serde::{Deserialize, Serialize};

/// State of one directed follow edge from follower to followee.
///
/// Legal transitions are None -> Requested -> Accepted, Requested -> None
/// (reject) and Accepted -> None (unfollow). The transition table lives in
/// `tether-core`; this is pure data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FollowEdgeState {
    /// No relationship in this direction.
    #[default]
    None,
    /// A follow request is pending the followee's decision.
    Requested,
    /// The followee accepted; the follower follows the followee.
    Accepted,
}

/// A directed follow relation `(follower, followee)` with its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
    /// Backend-assigned id; also identifies the request while pending.
    pub id: RequestId,
    /// The user who follows (or asked to follow).
    pub follower: UserId,
    /// The user being followed.
    pub followee: UserId,
    /// Current edge state.
    pub state: FollowEdgeState,
    /// Last state change, unix epoch milliseconds (backend clock).
    pub updated_at: u64,
}

/// A REQUESTED edge exposed to its recipient as an actionable item.
///
/// Accepting flips the edge to ACCEPTED and does not create the reverse
/// edge; mutuality requires an independent second request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRequest {
    /// The pending edge's id.
    pub id: RequestId,
    /// Who asked.
    pub follower: UserId,
    /// Who decides.
    pub followee: UserId,
    /// When the request was made, unix epoch milliseconds.
    pub created_at: u64,
}

/// The canonical combined view of both directed edges between two users,
/// always from the perspective of the first user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    /// No outgoing follow and no incoming request.
    NotFollowing,
    /// Our follow request is pending the other user's decision.
    RequestSent,
    /// The other user's follow request is pending our decision.
    RequestReceived,
    /// We follow them; they do not follow us back.
    Following,
    /// Both directed edges are accepted. Precondition for messaging.
    Mutual,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_state_defaults_to_none() {
        assert_eq!(FollowEdgeState::default(), FollowEdgeState::None);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&RelationshipStatus::RequestReceived).unwrap();
        assert_eq!(json, "\"request_received\"");
    }
}
