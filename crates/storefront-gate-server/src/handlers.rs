//! HTTP handlers for the auth flow and the placeholder admin screens.

use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cookies::{access_token, cleared_cookies, cookie, session_cookies, CODE_VERIFIER_COOKIE};
use crate::error::ErrorResponse;
use crate::state::AppState;

/// Where a failed code exchange lands.
pub const CALLBACK_ERROR_PATH: &str = "/auth/sign-in?error=auth_callback_error";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub page: &'static str,
    pub path: String,
}

// ============================================================================
// Health
// ============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Auth flow
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
}

/// GET /auth/callback?code=...
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response {
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return Redirect::temporary(&state.landing_url).into_response();
    };
    let verifier = cookie(&headers, CODE_VERIFIER_COOKIE);

    match state.auth.exchange_code(&code, verifier.as_deref()).await {
        Ok(session) => {
            info!(identity = %session.identity.id, "session established from auth callback");
            let cookies: Vec<_> = session_cookies(&session, state.secure_cookies)
                .into_iter()
                .map(|c| (SET_COOKIE, c))
                .collect();
            (
                AppendHeaders(cookies),
                Redirect::temporary(&state.landing_url),
            )
                .into_response()
        }
        Err(err) => {
            error!(error = %err, "code exchange failed");
            Redirect::temporary(CALLBACK_ERROR_PATH).into_response()
        }
    }
}

/// POST /auth/sign-out
///
/// Cookies are always cleared, even if the provider cannot be reached.
pub async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = access_token(&headers) {
        if let Err(err) = state.auth.revoke(&token).await {
            warn!(error = %err, "session revoke failed");
        }
    }

    let cookies: Vec<_> = cleared_cookies(state.secure_cookies)
        .into_iter()
        .map(|c| (SET_COOKIE, c))
        .collect();
    (AppendHeaders(cookies), Redirect::to(&state.gate.login_path)).into_response()
}

// ============================================================================
// Admin pages
// ============================================================================

pub async fn login_page(uri: Uri) -> Json<PageResponse> {
    Json(PageResponse {
        page: "login",
        path: uri.path().to_string(),
    })
}

pub async fn unauthorized_page(uri: Uri) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(PageResponse {
            page: "unauthorized",
            path: uri.path().to_string(),
        }),
    )
        .into_response()
}

/// Fallback. Anything under the admin prefix that got past the gate is an
/// admin screen; everything else is not served here.
pub async fn admin_or_not_found(State(state): State<AppState>, uri: Uri) -> Response {
    if state.classifier.classify(uri.path()).requires_identity() {
        return Json(PageResponse {
            page: "admin",
            path: uri.path().to_string(),
        })
        .into_response();
    }
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("no route for {}", uri.path()),
        }),
    )
        .into_response()
}
