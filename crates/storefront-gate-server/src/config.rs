//! ServerConfig: read once at startup.
//!
//! Env vars:
//!   STOREFRONT_BIND_ADDR          — listen address (default: 0.0.0.0:3000)
//!   STOREFRONT_BACKEND_URL        — hosted backend base URL (required)
//!   STOREFRONT_BACKEND_ANON_KEY   — public API key (required)
//!   STOREFRONT_BACKEND_SERVICE_KEY — key used for profile lookups (default: anon key)
//!   STOREFRONT_SITE_URL           — landing URL after sign-in (default: site root)
//!   STOREFRONT_DATABASE_URL       — direct Postgres URL (`database` feature only)
//!
//! Gate paths and admitted roles come from [`GateConfig::from_env`].

use storefront_gate::GateConfig;
use url::Url;

use crate::error::ServerError;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub backend_url: Url,
    pub anon_key: String,
    pub service_key: String,
    pub site_url: Option<Url>,
    pub database_url: Option<String>,
    pub gate: GateConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerError> {
        let backend_url = parse_url(
            "STOREFRONT_BACKEND_URL",
            &required("STOREFRONT_BACKEND_URL")?,
        )?;
        let anon_key = required("STOREFRONT_BACKEND_ANON_KEY")?;
        let service_key = optional("STOREFRONT_BACKEND_SERVICE_KEY").unwrap_or_else(|| anon_key.clone());
        let site_url = optional("STOREFRONT_SITE_URL")
            .map(|v| parse_url("STOREFRONT_SITE_URL", &v))
            .transpose()?;

        Ok(Self {
            bind_addr: optional("STOREFRONT_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            backend_url,
            anon_key,
            service_key,
            site_url,
            database_url: optional("STOREFRONT_DATABASE_URL"),
            gate: GateConfig::from_env()?,
        })
    }

    /// Where a successful sign-in lands.
    pub fn landing_url(&self) -> String {
        self.site_url
            .as_ref()
            .map(Url::to_string)
            .unwrap_or_else(|| "/".to_string())
    }
}

fn required(key: &'static str) -> Result<String, ServerError> {
    optional(key).ok_or(ServerError::MissingEnv(key))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ServerError> {
    Url::parse(value).map_err(|e| ServerError::InvalidEnv {
        name,
        reason: e.to_string(),
    })
}
