//! GateConfig: where the administrative area lives and who may enter it.
//!
//! Loaded once at startup from environment variables, falling back to the
//! storefront's fixed paths.

use serde::Serialize;

use crate::error::ConfigError;
use crate::policy::RolePolicy;

pub const DEFAULT_ADMIN_PREFIX: &str = "/admin";
pub const DEFAULT_LOGIN_PATH: &str = "/admin/login";
pub const DEFAULT_FORBIDDEN_PATH: &str = "/admin/unauthorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateConfig {
    pub admin_prefix: String,
    pub login_path: String,
    pub forbidden_path: String,
    pub policy: RolePolicy,
}

impl GateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let policy = match std::env::var("STOREFRONT_ADMIN_ROLES") {
            Ok(list) => RolePolicy::parse(&list)?,
            Err(_) => RolePolicy::default(),
        };
        let config = Self {
            admin_prefix: env_or("STOREFRONT_ADMIN_PREFIX", DEFAULT_ADMIN_PREFIX),
            login_path: env_or("STOREFRONT_LOGIN_PATH", DEFAULT_LOGIN_PATH),
            forbidden_path: env_or("STOREFRONT_FORBIDDEN_PATH", DEFAULT_FORBIDDEN_PATH),
            policy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject layouts that could loop: both exit paths must be absolute,
    /// distinct, and inside the admin prefix so they classify as exempt.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("admin_prefix", &self.admin_prefix),
            ("login_path", &self.login_path),
            ("forbidden_path", &self.forbidden_path),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::RelativePath {
                    name,
                    value: value.clone(),
                });
            }
        }

        let prefix = self.admin_prefix.trim_end_matches('/');
        for (name, value) in [
            ("login_path", &self.login_path),
            ("forbidden_path", &self.forbidden_path),
        ] {
            let under = value
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1);
            if !under {
                return Err(ConfigError::OutsidePrefix {
                    name,
                    value: value.clone(),
                    prefix: self.admin_prefix.clone(),
                });
            }
        }

        if self.login_path.trim_end_matches('/') == self.forbidden_path.trim_end_matches('/') {
            return Err(ConfigError::DuplicateExitPath(self.login_path.clone()));
        }
        Ok(())
    }

    pub fn with_policy(mut self, policy: RolePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            forbidden_path: DEFAULT_FORBIDDEN_PATH.to_string(),
            policy: RolePolicy::default(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
