//! Server-side admin gate.
//!
//! Every request into the admin area resolves its own identity from the
//! session token, then runs the shared gate state machine to a terminal
//! decision. Exempt and public paths skip identity resolution entirely.
//!
//! The role is read fresh on every request. The server gets no signal when a
//! profile's role changes, so nothing is cached across requests.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use storefront_gate::{decide_request, GateDecision, Identity, RoleCache};
use tracing::{debug, warn};

use crate::cookies::access_token;
use crate::state::AppState;

pub async fn admin_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !state.classifier.classify(&path).requires_identity() {
        return next.run(request).await;
    }

    // Body is not Sync; nothing borrowed from the request may live across an await.
    let token = access_token(request.headers());
    let identity = resolve_identity(&state, token).await;
    let decision = decide_request(
        &state.gate,
        state.roles.as_ref(),
        &RoleCache::new(),
        &path,
        identity,
    )
    .await;
    debug!(%path, ?decision, "admin gate decision");

    match decision {
        GateDecision::Allow => next.run(request).await,
        GateDecision::RedirectToForbidden => {
            Redirect::temporary(&state.gate.forbidden_path).into_response()
        }
        // A request always settles; anything else fails closed.
        GateDecision::RedirectToLogin | GateDecision::Pending => {
            Redirect::temporary(&state.gate.login_path).into_response()
        }
    }
}

/// An unreachable identity provider is treated as no session.
async fn resolve_identity(state: &AppState, token: Option<String>) -> Option<Identity> {
    let token = token?;
    match state.auth.identity_for_token(&token).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!(error = %err, "could not resolve session; treating as signed out");
            None
        }
    }
}
