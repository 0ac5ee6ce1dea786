//! Session token transport: `sb-*` cookies or an `Authorization: Bearer`
//! header.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;

use crate::backend::ProviderSession;

pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";
pub const REFRESH_TOKEN_COOKIE: &str = "sb-refresh-token";
pub const CODE_VERIFIER_COOKIE: &str = "sb-code-verifier";

pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// Bearer header wins over the cookie.
pub fn access_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from);
    bearer.or_else(|| cookie(headers, ACCESS_TOKEN_COOKIE))
}

fn set_cookie(name: &str, value: &str, max_age: Option<u64>, secure: bool) -> String {
    let mut s = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax");
    if let Some(age) = max_age {
        s.push_str(&format!("; Max-Age={age}"));
    }
    if secure {
        s.push_str("; Secure");
    }
    s
}

pub fn session_cookies(session: &ProviderSession, secure: bool) -> Vec<String> {
    let mut cookies = vec![set_cookie(
        ACCESS_TOKEN_COOKIE,
        &session.access_token,
        session.expires_in,
        secure,
    )];
    if let Some(refresh) = &session.refresh_token {
        cookies.push(set_cookie(REFRESH_TOKEN_COOKIE, refresh, None, secure));
    }
    cookies
}

pub fn cleared_cookies(secure: bool) -> Vec<String> {
    [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE]
        .into_iter()
        .map(|name| set_cookie(name, "", Some(0), secure))
        .collect()
}
