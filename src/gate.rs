//! AccessGate: the admin area's access-control state machine.
//!
//! The gate is sans-IO: it consumes [`GateInput`]s (mount signal, requested
//! path, session snapshots, role results) and returns a [`Step`] carrying the
//! new [`GateState`] plus the [`GateCommand`]s the caller must perform (role
//! lookups, navigations). The async wiring lives in [`crate::driver`]; the
//! server-side one-shot evaluation lives in [`crate::request`].
//!
//! ```text
//!   Unmounted ──mount──► Resolving ──┬──► Allow
//!       ▲                    │        ├──► RedirectToLogin
//!       └──────unmount───────┘        └──► RedirectToForbidden
//! ```
//!
//! Ordering rules enforced here:
//!
//! - nothing is checked before the mount signal;
//! - exempt paths never look at identity or role;
//! - at most one role lookup per identity is outstanding, tagged with a
//!   [`LookupTicket`]; results whose ticket is no longer current are dropped;
//! - a redirect is issued once per (target, requested path) until the gate
//!   leaves the redirect state.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::error::LookupError;
use crate::navigation::Navigation;
use crate::paths::{PathClass, PathClassifier};
use crate::policy::RolePolicy;
use crate::types::{Identity, IdentityId, Role, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// Runtime has not signalled readiness; render nothing.
    Unmounted,
    /// Waiting on session restoration or a role lookup; render a neutral
    /// loading indicator.
    Resolving,
    Allow,
    RedirectToLogin,
    RedirectToForbidden,
}

impl GateState {
    pub fn decision(&self) -> GateDecision {
        match self {
            GateState::Unmounted | GateState::Resolving => GateDecision::Pending,
            GateState::Allow => GateDecision::Allow,
            GateState::RedirectToLogin => GateDecision::RedirectToLogin,
            GateState::RedirectToForbidden => GateDecision::RedirectToForbidden,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, GateState::Allow)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GateState::Unmounted | GateState::Resolving)
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateState::Unmounted => "unmounted",
            GateState::Resolving => "resolving",
            GateState::Allow => "allow",
            GateState::RedirectToLogin => "redirect_to_login",
            GateState::RedirectToForbidden => "redirect_to_forbidden",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Pending,
    Allow,
    RedirectToLogin,
    RedirectToForbidden,
}

/// Identifies one issued role lookup. Monotonic for the gate's lifetime, so
/// results from an earlier mount cycle can never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupTicket(u64);

impl LookupTicket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum GateInput {
    Mounted,
    Unmounted,
    PathChanged(String),
    Session(SessionState),
    RoleResolved {
        ticket: LookupTicket,
        outcome: Result<Role, LookupError>,
    },
    /// The identity's role changed; forget what this mount cycle learned.
    RoleInvalidated(IdentityId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateCommand {
    LookupRole {
        ticket: LookupTicket,
        identity: Identity,
    },
    Navigate(Navigation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub state: GateState,
    pub commands: Vec<GateCommand>,
}

impl Step {
    pub fn lookups(&self) -> impl Iterator<Item = (LookupTicket, &Identity)> {
        self.commands.iter().filter_map(|c| match c {
            GateCommand::LookupRole { ticket, identity } => Some((*ticket, identity)),
            GateCommand::Navigate(_) => None,
        })
    }

    pub fn navigations(&self) -> impl Iterator<Item = &Navigation> {
        self.commands.iter().filter_map(|c| match c {
            GateCommand::Navigate(n) => Some(n),
            GateCommand::LookupRole { .. } => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleVerdict {
    Admitted,
    Denied,
    /// Lookup failed; deny and send to login. Not sticky across paths.
    FailedClosed,
}

#[derive(Debug, Clone)]
struct PendingLookup {
    ticket: LookupTicket,
    identity: IdentityId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IssuedRedirect {
    to: String,
    from: String,
}

/// Everything learned between a mount and the matching unmount.
#[derive(Debug, Default)]
struct MountCycle {
    verdicts: HashMap<IdentityId, RoleVerdict>,
    pending: Option<PendingLookup>,
    issued: Option<IssuedRedirect>,
}

pub struct AccessGate {
    classifier: PathClassifier,
    policy: RolePolicy,
    login_path: String,
    forbidden_path: String,
    path: String,
    session: SessionState,
    mount: Option<MountCycle>,
    next_ticket: u64,
    state: GateState,
}

impl AccessGate {
    pub fn new(config: &GateConfig, path: impl Into<String>) -> Self {
        Self {
            classifier: PathClassifier::new(config),
            policy: config.policy.clone(),
            login_path: config.login_path.clone(),
            forbidden_path: config.forbidden_path.clone(),
            path: path.into(),
            session: SessionState::Unresolved,
            mount: None,
            next_ticket: 0,
            state: GateState::Unmounted,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn decision(&self) -> GateDecision {
        self.state.decision()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_class(&self) -> PathClass {
        self.classifier.classify(&self.path)
    }

    /// Ticket of the lookup the gate is currently waiting on, if any.
    pub fn pending_lookup(&self) -> Option<LookupTicket> {
        self.mount
            .as_ref()
            .and_then(|m| m.pending.as_ref())
            .map(|p| p.ticket)
    }

    pub fn handle(&mut self, input: GateInput) -> Step {
        match input {
            GateInput::Mounted => {
                if self.mount.is_none() {
                    debug!("gate mounted");
                    self.mount = Some(MountCycle::default());
                }
            }
            GateInput::Unmounted => {
                if self.mount.take().is_some() {
                    debug!("gate unmounted; mount cycle discarded");
                }
            }
            GateInput::PathChanged(path) => {
                if path != self.path {
                    if let Some(cycle) = self.mount.as_mut() {
                        cycle.verdicts.retain(|_, v| *v != RoleVerdict::FailedClosed);
                    }
                    self.path = path;
                }
            }
            GateInput::Session(session) => self.apply_session(session),
            GateInput::RoleResolved { ticket, outcome } => self.apply_role(ticket, outcome),
            GateInput::RoleInvalidated(id) => {
                if let Some(cycle) = self.mount.as_mut() {
                    cycle.verdicts.remove(&id);
                    if cycle.pending.as_ref().is_some_and(|p| p.identity == id) {
                        cycle.pending = None;
                    }
                }
            }
        }
        self.evaluate()
    }

    fn apply_session(&mut self, session: SessionState) {
        let next_id = session.identity().map(|i| i.id.clone());
        if let Some(cycle) = self.mount.as_mut() {
            if let Some(pending) = &cycle.pending {
                if Some(&pending.identity) != next_id.as_ref() {
                    warn!(
                        identity = %pending.identity,
                        ticket = pending.ticket.0,
                        "identity changed during role lookup; result will be discarded"
                    );
                    cycle.pending = None;
                }
            }
            if session == SessionState::Resolved(None) {
                cycle.verdicts.clear();
            }
        }
        self.session = session;
    }

    fn apply_role(&mut self, ticket: LookupTicket, outcome: Result<Role, LookupError>) {
        let Some(cycle) = self.mount.as_mut() else {
            debug!(ticket = ticket.0, "role result after unmount discarded");
            return;
        };
        let current = cycle.pending.as_ref().is_some_and(|p| p.ticket == ticket);
        if !current {
            warn!(ticket = ticket.0, "stale role result discarded");
            return;
        }
        let Some(pending) = cycle.pending.take() else {
            return;
        };

        let verdict = match outcome {
            Ok(role) if self.policy.admits(role) => RoleVerdict::Admitted,
            Ok(role) => {
                debug!(identity = %pending.identity, %role, "role not admitted");
                RoleVerdict::Denied
            }
            Err(LookupError::ProfileMissing(_)) => {
                debug!(identity = %pending.identity, "no profile row; treating as unprivileged");
                RoleVerdict::Denied
            }
            Err(err) => {
                warn!(identity = %pending.identity, error = %err, "role lookup failed; failing closed");
                RoleVerdict::FailedClosed
            }
        };
        cycle.verdicts.insert(pending.identity, verdict);
    }

    fn evaluate(&mut self) -> Step {
        let class = self.classifier.classify(&self.path);
        let mut commands = Vec::new();

        let state = match self.mount.as_mut() {
            None => GateState::Unmounted,
            Some(_) if class != PathClass::Guarded => GateState::Allow,
            Some(cycle) => match &self.session {
                SessionState::Unresolved => GateState::Resolving,
                SessionState::Resolved(None) => GateState::RedirectToLogin,
                SessionState::Resolved(Some(identity)) => match cycle.verdicts.get(&identity.id) {
                    Some(RoleVerdict::Admitted) => GateState::Allow,
                    Some(RoleVerdict::Denied) => GateState::RedirectToForbidden,
                    Some(RoleVerdict::FailedClosed) => GateState::RedirectToLogin,
                    None => {
                        let waiting = cycle
                            .pending
                            .as_ref()
                            .is_some_and(|p| p.identity == identity.id);
                        if !waiting {
                            self.next_ticket += 1;
                            let ticket = LookupTicket(self.next_ticket);
                            debug!(identity = %identity.id, ticket = ticket.0, "role lookup issued");
                            cycle.pending = Some(PendingLookup {
                                ticket,
                                identity: identity.id.clone(),
                            });
                            commands.push(GateCommand::LookupRole {
                                ticket,
                                identity: identity.clone(),
                            });
                        }
                        GateState::Resolving
                    }
                },
            },
        };

        if let Some(cycle) = self.mount.as_mut() {
            let target = match state {
                GateState::RedirectToLogin => Some(&self.login_path),
                GateState::RedirectToForbidden => Some(&self.forbidden_path),
                _ => None,
            };
            match target {
                Some(to) => {
                    let redirect = IssuedRedirect {
                        to: to.clone(),
                        from: self.path.clone(),
                    };
                    if cycle.issued.as_ref() != Some(&redirect) {
                        info!(from = %self.path, to = %to, "gate redirect issued");
                        commands.push(GateCommand::Navigate(Navigation::replace(to.clone())));
                        cycle.issued = Some(redirect);
                    }
                }
                None => cycle.issued = None,
            }
        }

        if state != self.state {
            debug!(from = %self.state, to = %state, path = %self.path, "gate transition");
            self.state = state;
        }
        Step { state, commands }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gate(path: &str) -> AccessGate {
        AccessGate::new(&GateConfig::default(), path)
    }

    fn admin() -> Identity {
        Identity::new("u-admin", "admin@electrostore.com")
    }

    fn shopper() -> Identity {
        Identity::new("u-shopper", "shopper@example.com")
    }

    fn session(identity: Option<Identity>) -> GateInput {
        GateInput::Session(SessionState::Resolved(identity))
    }

    fn only_lookup(step: &Step) -> LookupTicket {
        let lookups: Vec<_> = step.lookups().collect();
        assert_eq!(lookups.len(), 1, "expected one lookup, got {:?}", step.commands);
        lookups[0].0
    }

    #[test]
    fn nothing_happens_before_mount() {
        let mut g = gate("/admin/products");
        let step = g.handle(session(Some(admin())));
        assert_eq!(step.state, GateState::Unmounted);
        assert!(step.commands.is_empty());
        assert_eq!(g.decision(), GateDecision::Pending);
    }

    #[test]
    fn mount_first_then_unresolved_is_resolving() {
        let mut g = gate("/admin");
        let step = g.handle(GateInput::Mounted);
        assert_eq!(step.state, GateState::Resolving);
        assert!(step.commands.is_empty());
    }

    #[test]
    fn session_before_mount_is_applied_on_mount() {
        let mut g = gate("/admin");
        g.handle(session(None));
        let step = g.handle(GateInput::Mounted);
        assert_eq!(step.state, GateState::RedirectToLogin);
        assert_eq!(step.navigations().count(), 1);
    }

    #[test]
    fn absent_identity_redirects_to_login_once() {
        let mut g = gate("/admin/orders");
        g.handle(GateInput::Mounted);
        let step = g.handle(session(None));
        assert_eq!(step.state, GateState::RedirectToLogin);
        assert_eq!(
            step.commands,
            vec![GateCommand::Navigate(Navigation::replace("/admin/login"))]
        );

        // Equivalent notifications do not re-issue.
        for _ in 0..3 {
            let again = g.handle(session(None));
            assert_eq!(again.state, GateState::RedirectToLogin);
            assert!(again.commands.is_empty());
        }
    }

    #[test]
    fn admin_allowed_after_single_lookup() {
        let mut g = gate("/admin");
        g.handle(GateInput::Mounted);
        let step = g.handle(session(Some(admin())));
        assert_eq!(step.state, GateState::Resolving);
        let ticket = only_lookup(&step);

        // Re-renders while the lookup is outstanding do not duplicate it.
        assert!(g.handle(session(Some(admin()))).commands.is_empty());
        assert!(g.handle(GateInput::Mounted).commands.is_empty());

        let step = g.handle(GateInput::RoleResolved {
            ticket,
            outcome: Ok(Role::Admin),
        });
        assert_eq!(step.state, GateState::Allow);
        assert!(step.commands.is_empty());

        assert!(g.handle(session(Some(admin()))).commands.is_empty());
        assert!(g.state().is_allowed());
    }

    #[test]
    fn standard_role_is_forbidden_once() {
        let mut g = gate("/admin/settings");
        g.handle(GateInput::Mounted);
        let ticket = only_lookup(&g.handle(session(Some(shopper()))));
        let step = g.handle(GateInput::RoleResolved {
            ticket,
            outcome: Ok(Role::Standard),
        });
        assert_eq!(step.state, GateState::RedirectToForbidden);
        assert_eq!(
            step.navigations().cloned().collect::<Vec<_>>(),
            vec![Navigation::replace("/admin/unauthorized")]
        );

        let again = g.handle(session(Some(shopper())));
        assert_eq!(again.state, GateState::RedirectToForbidden);
        assert!(again.commands.is_empty());
    }

    #[test]
    fn missing_profile_is_forbidden() {
        let mut g = gate("/admin");
        g.handle(GateInput::Mounted);
        let ticket = only_lookup(&g.handle(session(Some(shopper()))));
        let step = g.handle(GateInput::RoleResolved {
            ticket,
            outcome: Err(LookupError::ProfileMissing("u-shopper".into())),
        });
        assert_eq!(step.state, GateState::RedirectToForbidden);
    }

    #[test]
    fn lookup_failure_fails_closed_to_login() {
        let mut g = gate("/admin");
        g.handle(GateInput::Mounted);
        let ticket = only_lookup(&g.handle(session(Some(admin()))));
        let step = g.handle(GateInput::RoleResolved {
            ticket,
            outcome: Err(LookupError::Unreachable("429".into())),
        });
        assert_eq!(step.state, GateState::RedirectToLogin);
        assert_eq!(
            step.navigations().cloned().collect::<Vec<_>>(),
            vec![Navigation::replace("/admin/login")]
        );
    }

    #[test]
    fn failed_lookup_is_retried_on_next_navigation() {
        let mut g = gate("/admin");
        g.handle(GateInput::Mounted);
        let ticket = only_lookup(&g.handle(session(Some(admin()))));
        g.handle(GateInput::RoleResolved {
            ticket,
            outcome: Err(LookupError::Unreachable("timeout".into())),
        });

        assert_eq!(
            g.handle(GateInput::PathChanged("/admin/login".into())).state,
            GateState::Allow
        );
        let step = g.handle(GateInput::PathChanged("/admin".into()));
        assert_eq!(step.state, GateState::Resolving);
        let retry = only_lookup(&step);
        assert_ne!(retry, ticket);
    }

    #[test]
    fn settled_verdict_survives_navigation_without_new_lookup() {
        let mut g = gate("/admin");
        g.handle(GateInput::Mounted);
        let ticket = only_lookup(&g.handle(session(Some(admin()))));
        g.handle(GateInput::RoleResolved {
            ticket,
            outcome: Ok(Role::Admin),
        });

        for path in ["/admin/orders", "/admin/login", "/admin/users"] {
            let step = g.handle(GateInput::PathChanged(path.into()));
            assert_eq!(step.state, GateState::Allow);
            assert_eq!(step.lookups().count(), 0);
        }
    }

    #[test]
    fn stale_result_after_identity_switch_is_discarded() {
        let mut g = gate("/admin");
        g.handle(GateInput::Mounted);
        let old = only_lookup(&g.handle(session(Some(admin()))));

        // Logged out and back in as someone else before the lookup settled.
        g.handle(session(None));
        let step = g.handle(session(Some(shopper())));
        let new = only_lookup(&step);
        assert_ne!(old, new);

        let step = g.handle(GateInput::RoleResolved {
            ticket: old,
            outcome: Ok(Role::Admin),
        });
        assert_eq!(step.state, GateState::Resolving);
        assert!(step.commands.is_empty());
        assert_eq!(g.pending_lookup(), Some(new));

        let step = g.handle(GateInput::RoleResolved {
            ticket: new,
            outcome: Ok(Role::Standard),
        });
        assert_eq!(step.state, GateState::RedirectToForbidden);
    }

    #[test]
    fn sign_out_forgets_verdicts() {
        let mut g = gate("/admin");
        g.handle(GateInput::Mounted);
        let t1 = only_lookup(&g.handle(session(Some(admin()))));
        g.handle(GateInput::RoleResolved {
            ticket: t1,
            outcome: Ok(Role::Admin),
        });
        assert_eq!(g.handle(session(None)).state, GateState::RedirectToLogin);

        let step = g.handle(session(Some(admin())));
        assert_eq!(step.state, GateState::Resolving);
        only_lookup(&step);
    }

    #[test]
    fn role_invalidation_triggers_fresh_lookup() {
        let mut g = gate("/admin");
        g.handle(GateInput::Mounted);
        let t1 = only_lookup(&g.handle(session(Some(admin()))));
        g.handle(GateInput::RoleResolved {
            ticket: t1,
            outcome: Ok(Role::Admin),
        });

        let step = g.handle(GateInput::RoleInvalidated(admin().id));
        let t2 = only_lookup(&step);
        let step = g.handle(GateInput::RoleResolved {
            ticket: t2,
            outcome: Ok(Role::Standard),
        });
        assert_eq!(step.state, GateState::RedirectToForbidden);
    }

    #[test]
    fn redirect_reissued_after_leaving_and_reentering() {
        let mut g = gate("/admin");
        g.handle(GateInput::Mounted);
        assert_eq!(g.handle(session(None)).navigations().count(), 1);

        // Router lands on the login screen, then the user tries again.
        assert_eq!(
            g.handle(GateInput::PathChanged("/admin/login".into())).state,
            GateState::Allow
        );
        let step = g.handle(GateInput::PathChanged("/admin".into()));
        assert_eq!(step.navigations().count(), 1);
    }

    #[test]
    fn new_guarded_path_gets_its_own_redirect() {
        let mut g = gate("/admin");
        g.handle(GateInput::Mounted);
        g.handle(session(None));
        let step = g.handle(GateInput::PathChanged("/admin/products".into()));
        assert_eq!(step.navigations().count(), 1);
    }

    #[test]
    fn unmount_discards_in_flight_lookup() {
        let mut g = gate("/admin");
        g.handle(GateInput::Mounted);
        let t1 = only_lookup(&g.handle(session(Some(admin()))));
        assert_eq!(g.handle(GateInput::Unmounted).state, GateState::Unmounted);

        let step = g.handle(GateInput::RoleResolved {
            ticket: t1,
            outcome: Ok(Role::Admin),
        });
        assert_eq!(step.state, GateState::Unmounted);

        // A new mount cycle looks the role up again under a new ticket.
        let step = g.handle(GateInput::Mounted);
        let t2 = only_lookup(&step);
        assert!(t2 > t1);
    }

    #[test]
    fn public_path_allowed_without_checks() {
        let mut g = gate("/products/9");
        let step = g.handle(GateInput::Mounted);
        assert_eq!(step.state, GateState::Allow);
        assert!(step.commands.is_empty());
    }

    #[test]
    fn narrowed_policy_forbids_plain_admin() {
        let config = GateConfig::default().with_policy(RolePolicy::parse("super_admin").unwrap());
        let mut g = AccessGate::new(&config, "/admin");
        g.handle(GateInput::Mounted);
        let ticket = only_lookup(&g.handle(session(Some(admin()))));
        let step = g.handle(GateInput::RoleResolved {
            ticket,
            outcome: Ok(Role::Admin),
        });
        assert_eq!(step.state, GateState::RedirectToForbidden);
    }

    fn arb_session() -> impl Strategy<Value = SessionState> {
        prop_oneof![
            Just(SessionState::Unresolved),
            Just(SessionState::Resolved(None)),
            "[a-z]{1,6}".prop_map(|id| SessionState::Resolved(Some(Identity::without_email(id)))),
        ]
    }

    fn arb_outcome() -> impl Strategy<Value = Result<Role, LookupError>> {
        prop_oneof![
            Just(Ok(Role::Standard)),
            Just(Ok(Role::Admin)),
            Just(Ok(Role::SuperAdmin)),
            Just(Err(LookupError::Unreachable("down".into()))),
            Just(Err(LookupError::ProfileMissing("x".into()))),
        ]
    }

    proptest! {
        #[test]
        fn exempt_paths_always_allow_with_zero_lookups(
            sessions in proptest::collection::vec(arb_session(), 0..6),
            exit in prop_oneof![Just("/admin/login"), Just("/admin/unauthorized")],
        ) {
            let mut g = gate(exit);
            let step = g.handle(GateInput::Mounted);
            prop_assert_eq!(step.state, GateState::Allow);
            prop_assert!(step.commands.is_empty());
            for s in sessions {
                let step = g.handle(GateInput::Session(s));
                prop_assert_eq!(step.state, GateState::Allow);
                prop_assert!(step.commands.is_empty());
            }
        }

        #[test]
        fn only_admitted_roles_reach_allow(outcome in arb_outcome()) {
            let mut g = gate("/admin/content");
            g.handle(GateInput::Mounted);
            let step = g.handle(session(Some(Identity::without_email("p"))));
            let ticket = step.lookups().next().map(|(t, _)| t).unwrap();
            let admitted = matches!(outcome, Ok(Role::Admin) | Ok(Role::SuperAdmin));
            let failed = matches!(outcome, Err(LookupError::Unreachable(_)));
            let step = g.handle(GateInput::RoleResolved { ticket, outcome });
            prop_assert_eq!(step.state.is_allowed(), admitted);
            if failed {
                prop_assert_eq!(step.state, GateState::RedirectToLogin);
            }
        }

        #[test]
        fn repeated_identical_sessions_issue_one_lookup(repeats in 1usize..10) {
            let mut g = gate("/admin");
            g.handle(GateInput::Mounted);
            let mut lookups = 0;
            for _ in 0..repeats {
                lookups += g.handle(session(Some(admin()))).lookups().count();
            }
            prop_assert_eq!(lookups, 1);
        }
    }
}
