//! Router construction for the storefront gate server.

use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::admin_gate;
use crate::state::AppState;

/// Build the full axum router. The admin gate wraps every route and the
/// fallback; it only acts on guarded admin paths.
pub fn build_router(state: AppState) -> Router {
    let login_path = state.gate.login_path.clone();
    let forbidden_path = state.gate.forbidden_path.clone();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/callback", get(handlers::auth_callback))
        .route("/auth/sign-out", post(handlers::sign_out))
        .route(&login_path, get(handlers::login_page))
        .route(&forbidden_path, get(handlers::unauthorized_page))
        .fallback(handlers::admin_or_not_found)
        .layer(axum_mw::from_fn_with_state(state.clone(), admin_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
