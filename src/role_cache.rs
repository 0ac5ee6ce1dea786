//! Process-wide role cache with a get-or-fetch contract.
//!
//! One slot per identity. A slot is a `tokio::sync::OnceCell`, so concurrent
//! callers for the same identity wait on a single fetch instead of racing
//! their own. Failed fetches leave the slot empty and the next caller retries.
//! Slots are removed only on sign-out or an explicit role change.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OnceCell;

use crate::error::LookupError;
use crate::session::RoleDirectory;
use crate::types::{Identity, IdentityId, Role};

type Slot = Arc<OnceCell<Role>>;

#[derive(Default)]
pub struct RoleCache {
    slots: Mutex<HashMap<IdentityId, Slot>>,
}

impl RoleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Return the cached role, or run `fetch` if no fetch for this identity
    /// is already in flight. Writes are idempotent.
    pub async fn get_or_fetch<F, Fut>(&self, id: &IdentityId, fetch: F) -> Result<Role, LookupError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Role, LookupError>>,
    {
        let slot = {
            let mut slots = self.lock();
            Arc::clone(slots.entry(id.clone()).or_default())
        };
        slot.get_or_try_init(fetch).await.copied()
    }

    pub async fn role_of(
        &self,
        directory: &dyn RoleDirectory,
        identity: &Identity,
    ) -> Result<Role, LookupError> {
        self.get_or_fetch(&identity.id, || directory.role_of(identity))
            .await
    }

    pub fn peek(&self, id: &IdentityId) -> Option<Role> {
        self.lock().get(id).and_then(|slot| slot.get().copied())
    }

    /// Drop the slot for `id`. A fetch already in flight finishes into the
    /// detached slot and is never read again.
    pub fn invalidate(&self, id: &IdentityId) {
        if self.lock().remove(id).is_some() {
            tracing::debug!(identity = %id, "role cache entry invalidated");
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IdentityId, Slot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
