//! GateDriver: runs the [`AccessGate`] against live collaborators.
//!
//! One task, one loop. Session snapshots, path changes, the mount signal and
//! handle commands arrive on channels; role lookups are polled in-task from a
//! `FuturesUnordered`, so nothing runs concurrently with the state machine
//! and no lookup can be applied out of order with the input that issued it.
//!
//! ```text
//!  SessionSource ─watch─┐
//!  router path ───watch─┤                 ┌──► Navigator::redirect
//!  mount signal ──watch─┼──► GateDriver ──┼──► watch<GateState> (GateHandle)
//!  GateHandle ────mpsc──┘       │         └──► RoleCache::role_of (in-task)
//!                               ▼
//!                          AccessGate
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::config::GateConfig;
use crate::error::{GateError, LookupError, SessionError};
use crate::gate::{AccessGate, GateCommand, GateInput, GateState, LookupTicket};
use crate::navigation::Navigator;
use crate::role_cache::RoleCache;
use crate::session::SessionSource;
use crate::types::{IdentityId, Role, SessionEvent, SessionSnapshot};

type LookupFuture = BoxFuture<'static, (LookupTicket, Result<Role, LookupError>)>;

enum DriverCommand {
    InvalidateRole(IdentityId),
    SignOut(oneshot::Sender<Result<(), SessionError>>),
}

/// Readiness signal for the protected UI, plus the two user-driven actions
/// that reach back into the gate.
#[derive(Clone)]
pub struct GateHandle {
    state: watch::Receiver<GateState>,
    commands: mpsc::UnboundedSender<DriverCommand>,
}

impl GateHandle {
    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    /// Protected screens render only while this is true.
    pub fn is_allowed(&self) -> bool {
        self.state().is_allowed()
    }

    pub fn watch(&self) -> watch::Receiver<GateState> {
        self.state.clone()
    }

    /// Wait until the gate reaches `Allow` or a redirect.
    pub async fn settled(&self) -> Result<GateState, GateError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(GateState::is_terminal)
            .await
            .map_err(|_| GateError::DriverStopped)?;
        Ok(*state)
    }

    /// The identity's role changed; drop the cached role and re-check.
    pub fn invalidate_role(&self, id: IdentityId) -> Result<(), GateError> {
        self.commands
            .send(DriverCommand::InvalidateRole(id))
            .map_err(|_| GateError::DriverStopped)
    }

    pub async fn sign_out(&self) -> Result<(), GateError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(DriverCommand::SignOut(tx))
            .map_err(|_| GateError::DriverStopped)?;
        rx.await.map_err(|_| GateError::DriverStopped)??;
        Ok(())
    }
}

pub struct GateDriver<S: SessionSource + 'static> {
    gate: AccessGate,
    source: Arc<S>,
    cache: Arc<RoleCache>,
    navigator: Arc<dyn Navigator>,
    path: watch::Receiver<String>,
    mounted: watch::Receiver<bool>,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    state: watch::Sender<GateState>,
    current_identity: Option<IdentityId>,
}

impl<S: SessionSource + 'static> GateDriver<S> {
    pub fn new(
        config: &GateConfig,
        source: Arc<S>,
        cache: Arc<RoleCache>,
        navigator: Arc<dyn Navigator>,
        path: watch::Receiver<String>,
        mounted: watch::Receiver<bool>,
    ) -> (Self, GateHandle) {
        let gate = AccessGate::new(config, path.borrow().clone());
        let (state_tx, state_rx) = watch::channel(GateState::Unmounted);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let driver = Self {
            gate,
            source,
            cache,
            navigator,
            path,
            mounted,
            commands: cmd_rx,
            state: state_tx,
            current_identity: None,
        };
        let handle = GateHandle {
            state: state_rx,
            commands: cmd_tx,
        };
        (driver, handle)
    }

    /// Run until the handle, the router or the session source goes away.
    pub async fn run(mut self) {
        let mut session = self.source.subscribe();
        let mut lookups: FuturesUnordered<LookupFuture> = FuturesUnordered::new();

        // Seed in dependency order; the gate itself refuses to check
        // anything until the mount input arrives.
        let path = self.path.borrow_and_update().clone();
        self.apply(GateInput::PathChanged(path), &mut lookups);
        let snapshot = session.borrow_and_update().clone();
        self.on_session(snapshot, &mut lookups);
        if *self.mounted.borrow_and_update() {
            self.apply(GateInput::Mounted, &mut lookups);
        }

        loop {
            tokio::select! {
                changed = session.changed() => {
                    if changed.is_err() {
                        debug!("session source closed; gate driver stopping");
                        break;
                    }
                    let snapshot = session.borrow_and_update().clone();
                    self.on_session(snapshot, &mut lookups);
                }
                changed = self.path.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let path = self.path.borrow_and_update().clone();
                    self.apply(GateInput::PathChanged(path), &mut lookups);
                }
                changed = self.mounted.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let input = if *self.mounted.borrow_and_update() {
                        GateInput::Mounted
                    } else {
                        GateInput::Unmounted
                    };
                    self.apply(input, &mut lookups);
                }
                Some((ticket, outcome)) = lookups.next(), if !lookups.is_empty() => {
                    self.apply(GateInput::RoleResolved { ticket, outcome }, &mut lookups);
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("gate handle dropped; gate driver stopping");
                        break;
                    };
                    self.on_command(command, &mut lookups).await;
                }
            }
        }
    }

    fn on_session(&mut self, snapshot: SessionSnapshot, lookups: &mut FuturesUnordered<LookupFuture>) {
        let next = snapshot.state.identity().map(|i| i.id.clone());
        if snapshot.event == SessionEvent::Cleared || next.is_none() {
            if let Some(previous) = self.current_identity.take() {
                self.cache.invalidate(&previous);
            }
        }
        self.current_identity = next;
        debug!(version = snapshot.version, event = ?snapshot.event, "session snapshot received");
        self.apply(GateInput::Session(snapshot.state), lookups);
    }

    async fn on_command(&mut self, command: DriverCommand, lookups: &mut FuturesUnordered<LookupFuture>) {
        match command {
            DriverCommand::InvalidateRole(id) => {
                self.cache.invalidate(&id);
                self.apply(GateInput::RoleInvalidated(id), lookups);
            }
            DriverCommand::SignOut(reply) => {
                if let Some(id) = &self.current_identity {
                    self.cache.invalidate(id);
                }
                let result = self.source.sign_out().await;
                if let Err(err) = &result {
                    tracing::warn!(error = %err, "sign-out failed");
                }
                let _ = reply.send(result);
            }
        }
    }

    fn apply(&mut self, input: GateInput, lookups: &mut FuturesUnordered<LookupFuture>) {
        let step = self.gate.handle(input);
        for command in step.commands {
            match command {
                GateCommand::LookupRole { ticket, identity } => {
                    let source = Arc::clone(&self.source);
                    let cache = Arc::clone(&self.cache);
                    lookups.push(Box::pin(async move {
                        let outcome = cache.role_of(source.as_ref(), &identity).await;
                        (ticket, outcome)
                    }));
                }
                GateCommand::Navigate(navigation) => {
                    info!(to = %navigation.to, "navigating away from protected area");
                    self.navigator.redirect(&navigation);
                }
            }
        }
        self.state.send_if_modified(|current| {
            if *current == step.state {
                false
            } else {
                *current = step.state;
                true
            }
        });
    }
}
