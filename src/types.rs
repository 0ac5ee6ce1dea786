//! Identity, role and session snapshot types shared by the gate and its
//! collaborators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Opaque principal reference issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The authenticated principal of the current session.
///
/// Owned by the session source; the gate only ever reads clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: IdentityId::new(id),
            email: Some(email.into()),
        }
    }

    pub fn without_email(id: impl Into<String>) -> Self {
        Self {
            id: IdentityId::new(id),
            email: None,
        }
    }
}

/// Privilege level held in the identity's profile row.
///
/// The hosted backend stores `standard` as `user`; both spellings parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(rename = "user", alias = "standard")]
    Standard,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Standard, Role::Admin, Role::SuperAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standard => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Parse a role column value. Unrecognised values carry no privilege.
    pub fn from_column(value: &str) -> Role {
        value.parse().unwrap_or(Role::Standard)
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" | "standard" => Ok(Role::Standard),
            "admin" => Ok(Role::Admin),
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the session source currently knows about the caller.
///
/// `Unresolved` is distinct from `Resolved(None)`: the first means the
/// session has not been restored yet, the second that there is no session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unresolved,
    Resolved(Option<Identity>),
}

impl SessionState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, SessionState::Resolved(_))
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Resolved(identity) => identity.as_ref(),
            SessionState::Unresolved => None,
        }
    }
}

/// Session lifecycle transition that produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// Initial value before the session has been restored.
    Initial,
    /// Restoration finished (with or without a session).
    Restored,
    Established,
    Refreshed,
    Cleared,
}

/// Snapshot published by a session source on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Incremented on each published transition.
    pub version: u64,
    pub event: SessionEvent,
    pub state: SessionState,
}

impl SessionSnapshot {
    pub fn initial() -> Self {
        Self {
            version: 0,
            event: SessionEvent::Initial,
            state: SessionState::Unresolved,
        }
    }
}
