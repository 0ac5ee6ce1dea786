//! Hosted backend adapter: identity provider (`/auth/v1`) and the profile
//! row store (`/rest/v1/profiles`), spoken to over HTTP with reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use storefront_gate::{Identity, IdentityId, LookupError, Role, RoleDirectory, SessionError};
use tracing::{debug, warn};
use url::Url;

use crate::config::ServerConfig;

/// Provider-side timeout. Anything slower fails closed at the gate.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Session returned by the identity provider after a code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub identity: Identity,
}

/// Identity-provider operations the server needs beyond role lookups.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// `Ok(None)` when the token is missing, expired or revoked.
    async fn identity_for_token(&self, access_token: &str) -> Result<Option<Identity>, SessionError>;

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<ProviderSession, SessionError>;

    async fn revoke(&self, access_token: &str) -> Result<(), SessionError>;
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: String,
    email: Option<String>,
}

impl From<UserBody> for Identity {
    fn from(user: UserBody) -> Self {
        Identity {
            id: IdentityId::new(user.id),
            email: user.email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    user: UserBody,
}

#[derive(Debug, Serialize)]
struct PkceExchange<'a> {
    auth_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_verifier: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ProfileRoleRow {
    role: Option<String>,
}

pub struct HostedBackend {
    client: Client,
    base: Url,
    anon_key: String,
    service_key: String,
}

impl HostedBackend {
    pub fn new(
        mut base: Url,
        anon_key: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        // Url::join drops the last segment unless the base ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base,
            anon_key: anon_key.into(),
            service_key: service_key.into(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.backend_url.clone(),
            config.anon_key.clone(),
            config.service_key.clone(),
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    pub fn user_url(&self) -> Result<Url, url::ParseError> {
        self.endpoint("auth/v1/user")
    }

    pub fn token_url(&self) -> Result<Url, url::ParseError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "pkce");
        Ok(url)
    }

    pub fn logout_url(&self) -> Result<Url, url::ParseError> {
        self.endpoint("auth/v1/logout")
    }

    pub fn profile_url(&self, id: &IdentityId) -> Result<Url, url::ParseError> {
        let mut url = self.endpoint("rest/v1/profiles")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{id}"))
            .append_pair("select", "role");
        Ok(url)
    }

    fn with_user_token(&self, builder: RequestBuilder, access_token: &str) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }
}

fn provider_error(err: impl std::fmt::Display) -> SessionError {
    SessionError::ProviderUnreachable(err.to_string())
}

/// Map profile rows to a role. No row is a missing profile; a null role
/// column is an unprivileged user.
fn role_from_rows(id: &IdentityId, rows: Vec<ProfileRoleRow>) -> Result<Role, LookupError> {
    match rows.into_iter().next() {
        None => Err(LookupError::ProfileMissing(id.to_string())),
        Some(row) => Ok(row
            .role
            .as_deref()
            .map(Role::from_column)
            .unwrap_or(Role::Standard)),
    }
}

fn lookup_status_error(status: StatusCode) -> LookupError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        LookupError::Unreachable("rate limited by row store".into())
    } else {
        LookupError::Unreachable(format!("row store answered {status}"))
    }
}

#[async_trait]
impl RoleDirectory for HostedBackend {
    async fn role_of(&self, identity: &Identity) -> Result<Role, LookupError> {
        let url = self
            .profile_url(&identity.id)
            .map_err(|e| LookupError::Unreachable(e.to_string()))?;
        let response = self
            .client
            .get(url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| LookupError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(identity = %identity.id, %status, "profile lookup rejected");
            return Err(lookup_status_error(status));
        }
        let rows: Vec<ProfileRoleRow> = response
            .json()
            .await
            .map_err(|e| LookupError::Unreachable(e.to_string()))?;
        role_from_rows(&identity.id, rows)
    }
}

#[async_trait]
impl AuthBackend for HostedBackend {
    async fn identity_for_token(&self, access_token: &str) -> Result<Option<Identity>, SessionError> {
        let url = self.user_url().map_err(provider_error)?;
        let response = self
            .with_user_token(self.client.get(url), access_token)
            .send()
            .await
            .map_err(provider_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("access token rejected by identity provider");
                Ok(None)
            }
            status if status.is_success() => {
                let user: UserBody = response.json().await.map_err(provider_error)?;
                Ok(Some(user.into()))
            }
            status => Err(SessionError::ProviderUnreachable(format!(
                "identity provider answered {status}"
            ))),
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<ProviderSession, SessionError> {
        let url = self.token_url().map_err(provider_error)?;
        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&PkceExchange {
                auth_code: code,
                code_verifier,
            })
            .send()
            .await
            .map_err(provider_error)?;

        let status = response.status();
        if status.is_client_error() {
            return Err(SessionError::Rejected(format!("code exchange answered {status}")));
        }
        if !status.is_success() {
            return Err(SessionError::ProviderUnreachable(format!(
                "code exchange answered {status}"
            )));
        }
        let body: TokenBody = response.json().await.map_err(provider_error)?;
        Ok(ProviderSession {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in,
            identity: body.user.into(),
        })
    }

    async fn revoke(&self, access_token: &str) -> Result<(), SessionError> {
        let url = self.logout_url().map_err(provider_error)?;
        let response = self
            .with_user_token(self.client.post(url), access_token)
            .send()
            .await
            .map_err(provider_error)?;

        match response.status() {
            // Already expired or revoked.
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(SessionError::ProviderUnreachable(format!(
                "logout answered {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HostedBackend {
        HostedBackend::new(Url::parse(base).unwrap(), "anon", "service").unwrap()
    }

    #[test]
    fn endpoints_keep_base_path() {
        let b = backend("https://gw.example.com/project-a");
        assert_eq!(
            b.user_url().unwrap().as_str(),
            "https://gw.example.com/project-a/auth/v1/user"
        );
        assert_eq!(
            b.token_url().unwrap().as_str(),
            "https://gw.example.com/project-a/auth/v1/token?grant_type=pkce"
        );
    }

    #[test]
    fn profile_url_filters_by_id_and_selects_role() {
        let b = backend("https://abc.backend.example/");
        let url = b.profile_url(&IdentityId::new("7f0c")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.backend.example/rest/v1/profiles?id=eq.7f0c&select=role"
        );
    }

    #[test]
    fn empty_rows_mean_missing_profile() {
        let id = IdentityId::new("u1");
        assert_eq!(
            role_from_rows(&id, vec![]),
            Err(LookupError::ProfileMissing("u1".into()))
        );
    }

    #[test]
    fn role_column_mapping() {
        let id = IdentityId::new("u1");
        let rows = |role: Option<&str>| {
            vec![ProfileRoleRow {
                role: role.map(String::from),
            }]
        };
        assert_eq!(role_from_rows(&id, rows(Some("super_admin"))), Ok(Role::SuperAdmin));
        assert_eq!(role_from_rows(&id, rows(Some("user"))), Ok(Role::Standard));
        assert_eq!(role_from_rows(&id, rows(None)), Ok(Role::Standard));
        assert_eq!(role_from_rows(&id, rows(Some("owner"))), Ok(Role::Standard));
    }

    #[test]
    fn rate_limit_is_unreachable() {
        assert!(lookup_status_error(StatusCode::TOO_MANY_REQUESTS).fails_closed_to_login());
        assert!(lookup_status_error(StatusCode::INTERNAL_SERVER_ERROR).fails_closed_to_login());
    }

    #[test]
    fn token_body_parses_provider_shape() {
        let body: TokenBody = serde_json::from_str(
            r#"{"access_token":"at","token_type":"bearer","expires_in":3600,
                "refresh_token":"rt","user":{"id":"u1","email":"a@b.c","role":"authenticated"}}"#,
        )
        .unwrap();
        assert_eq!(body.access_token, "at");
        let identity: Identity = body.user.into();
        assert_eq!(identity, Identity::new("u1", "a@b.c"));
    }

    #[test]
    fn pkce_body_omits_missing_verifier() {
        let json = serde_json::to_string(&PkceExchange {
            auth_code: "c",
            code_verifier: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"auth_code":"c"}"#);
    }
}
