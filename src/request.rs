//! One-shot evaluation for a single request whose identity is already known,
//! as on the server where each request carries its own session.

use crate::config::GateConfig;
use crate::gate::{AccessGate, GateDecision, GateInput};
use crate::role_cache::RoleCache;
use crate::session::RoleDirectory;
use crate::types::{Identity, SessionState};

/// Run the gate to a terminal decision for `path`.
///
/// Role lookups go through `cache`, so concurrent requests for the same
/// identity share one fetch.
pub async fn decide_request(
    config: &GateConfig,
    roles: &dyn RoleDirectory,
    cache: &RoleCache,
    path: &str,
    identity: Option<Identity>,
) -> GateDecision {
    let mut gate = AccessGate::new(config, path);
    gate.handle(GateInput::Mounted);
    let mut step = gate.handle(GateInput::Session(SessionState::Resolved(identity)));

    loop {
        let next = step
            .lookups()
            .next()
            .map(|(ticket, identity)| (ticket, identity.clone()));
        let Some((ticket, identity)) = next else {
            break;
        };
        let outcome = cache.role_of(roles, &identity).await;
        step = gate.handle(GateInput::RoleResolved { ticket, outcome });
    }
    gate.decision()
}
