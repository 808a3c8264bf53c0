//! User and session types.

use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// A user as seen by the engine: a read-only cached copy of the backend's
/// authoritative record, keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Backend-assigned id.
    pub id: UserId,
    /// Display name.
    pub display_name: String,
    /// Avatar reference (URL or storage key), if set.
    pub avatar: Option<String>,
    /// Last activity seen by the backend, unix epoch milliseconds.
    pub last_active_at: u64,
}

/// The calling user's identity, threaded explicitly into every engine call
/// instead of living in ambient global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// The authenticated user.
    pub user_id: UserId,
    /// Opaque auth token forwarded to the backend transport, if any.
    /// Token issuance is out of scope for the engine.
    pub auth_token: Option<String>,
}

impl SessionContext {
    /// A session for the given user with no token.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            auth_token: None,
        }
    }
}
