//! Session source contract and an in-memory implementation.
//!
//! The session source owns the identity lifecycle. It publishes a
//! [`SessionSnapshot`] on a watch channel for every transition (restored,
//! established, refreshed, cleared), the same way the workbench session
//! manager notifies its subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{LookupError, SessionError};
use crate::types::{Identity, IdentityId, Role, SessionEvent, SessionSnapshot, SessionState};

/// Role lookups against the profile row store.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Resolve the role held by `identity`.
    ///
    /// A missing profile row is `LookupError::ProfileMissing`, which callers
    /// treat as "no privileged role". Anything that prevents an answer is
    /// `LookupError::Unreachable`.
    async fn role_of(&self, identity: &Identity) -> Result<Role, LookupError>;
}

/// Asynchronous provider of the current authenticated identity.
#[async_trait]
pub trait SessionSource: RoleDirectory {
    /// Latest published state.
    fn current_identity(&self) -> SessionState;

    /// Receiver that yields on every lifecycle transition.
    fn subscribe(&self) -> watch::Receiver<SessionSnapshot>;

    async fn sign_out(&self) -> Result<(), SessionError>;
}

pub type SessionWatcher = watch::Receiver<SessionSnapshot>;

#[derive(Debug, Clone)]
enum ProfileRow {
    Present(Role),
    Unreachable(String),
}

#[derive(Default)]
struct Profiles {
    rows: HashMap<IdentityId, ProfileRow>,
    delays: HashMap<IdentityId, Duration>,
}

/// In-process session source backed by a watch channel.
///
/// Profile rows, lookup latency and lookup failures are configurable per
/// identity, and every `role_of` call is counted.
pub struct MemorySessionSource {
    sender: watch::Sender<SessionSnapshot>,
    profiles: Mutex<Profiles>,
    lookups: AtomicUsize,
}

impl MemorySessionSource {
    pub fn new() -> Self {
        let (sender, _rx) = watch::channel(SessionSnapshot::initial());
        Self {
            sender,
            profiles: Mutex::new(Profiles::default()),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Restoration finished and found no session.
    pub fn resolve_absent(&self) {
        self.publish(SessionEvent::Restored, SessionState::Resolved(None));
    }

    /// Restoration finished and found a persisted session.
    pub fn restore(&self, identity: Identity) {
        self.publish(SessionEvent::Restored, SessionState::Resolved(Some(identity)));
    }

    pub fn establish(&self, identity: Identity) {
        self.publish(
            SessionEvent::Established,
            SessionState::Resolved(Some(identity)),
        );
    }

    /// Token refresh: same identity, new snapshot version.
    pub fn refresh(&self) {
        let state = self.sender.borrow().state.clone();
        self.publish(SessionEvent::Refreshed, state);
    }

    pub fn clear(&self) {
        self.publish(SessionEvent::Cleared, SessionState::Resolved(None));
    }

    pub fn set_role(&self, id: impl Into<IdentityId>, role: Role) {
        self.with_profiles(|p| {
            p.rows.insert(id.into(), ProfileRow::Present(role));
        });
    }

    pub fn remove_profile(&self, id: &IdentityId) {
        self.with_profiles(|p| {
            p.rows.remove(id);
        });
    }

    pub fn fail_lookups_for(&self, id: impl Into<IdentityId>, reason: impl Into<String>) {
        self.with_profiles(|p| {
            p.rows.insert(id.into(), ProfileRow::Unreachable(reason.into()));
        });
    }

    pub fn delay_lookups_for(&self, id: impl Into<IdentityId>, delay: Duration) {
        self.with_profiles(|p| {
            p.delays.insert(id.into(), delay);
        });
    }

    /// Number of `role_of` calls served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn publish(&self, event: SessionEvent, state: SessionState) {
        self.sender.send_modify(|snap| {
            snap.version += 1;
            snap.event = event;
            snap.state = state;
        });
        tracing::debug!(?event, "session transition published");
    }

    fn with_profiles<R>(&self, f: impl FnOnce(&mut Profiles) -> R) -> R {
        let mut guard = match self.profiles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl Default for MemorySessionSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleDirectory for MemorySessionSource {
    async fn role_of(&self, identity: &Identity) -> Result<Role, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let delay = self.with_profiles(|p| p.delays.get(&identity.id).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        // Read the row after the delay so a role change during a slow
        // lookup is observed, as a real row store would.
        let row = self.with_profiles(|p| p.rows.get(&identity.id).cloned());
        match row {
            Some(ProfileRow::Present(role)) => Ok(role),
            Some(ProfileRow::Unreachable(reason)) => Err(LookupError::Unreachable(reason)),
            None => Err(LookupError::ProfileMissing(identity.id.to_string())),
        }
    }
}

#[async_trait]
impl SessionSource for MemorySessionSource {
    fn current_identity(&self) -> SessionState {
        self.sender.borrow().state.clone()
    }

    fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.sender.subscribe()
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        self.clear();
        Ok(())
    }
}
