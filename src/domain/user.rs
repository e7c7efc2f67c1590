use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Stands in for the user segment of local keys while signed out.
pub(crate) const ANONYMOUS: &str = "anon";

/// Opaque identifier handed out by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(DomainError::validation("user_id", "must not be empty"));
        }
        // Ends up as a document path segment.
        if raw.contains('/') || raw.chars().any(char::is_whitespace) {
            return Err(DomainError::validation(
                "user_id",
                "must not contain '/' or whitespace",
            ));
        }
        if raw == ANONYMOUS {
            return Err(DomainError::validation("user_id", "is reserved"));
        }
        Ok(Self(raw))
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

/// Signed-in identity as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: UserId,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl AuthUser {
    pub fn new(uid: UserId) -> Self {
        Self {
            uid,
            display_name: None,
            email: None,
            photo_url: None,
        }
    }
}

/// Snapshot of the auth provider: who is signed in, and whether the
/// initial resolution is still running.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthState {
    pub user: Option<AuthUser>,
    pub loading: bool,
}

impl AuthState {
    pub fn uid(&self) -> Option<&UserId> {
        self.user.as_ref().map(|user| &user.uid)
    }
}
