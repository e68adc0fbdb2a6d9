//! Identity values observed from the IdP and the DataBackend.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque user identifier shared by both providers.
///
/// The token exchange endpoint mints DataBackend tokens whose embedded user
/// id is the IdP user id, so the two can be compared directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identity reported by one provider's own session machinery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "user_id", rename_all = "snake_case")]
pub enum IdentityState {
    #[default]
    Absent,
    Present(UserId),
}

impl IdentityState {
    pub fn present(id: impl Into<UserId>) -> Self {
        IdentityState::Present(id.into())
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            IdentityState::Absent => None,
            IdentityState::Present(id) => Some(id),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, IdentityState::Present(_))
    }
}

impl fmt::Display for IdentityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityState::Absent => f.write_str("absent"),
            IdentityState::Present(id) => write!(f, "present({})", id),
        }
    }
}

/// Combined identity as dependent UI should see it.
///
/// `NotReady` covers every state where the IdP says someone is signed in (or
/// a stale DataBackend session is being torn down) but the DataBackend has
/// not caught up yet. It must not be rendered as "signed out".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "user_id", rename_all = "snake_case")]
pub enum Readiness {
    SignedOut,
    NotReady,
    Ready(UserId),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }
}
