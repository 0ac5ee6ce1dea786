use std::sync::Arc;

use storefront_gate::{GateConfig, PathClassifier, RoleDirectory};

use crate::backend::AuthBackend;
use crate::config::ServerConfig;

/// Shared state for every handler and the gate middleware.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<GateConfig>,
    pub classifier: Arc<PathClassifier>,
    pub auth: Arc<dyn AuthBackend>,
    pub roles: Arc<dyn RoleDirectory>,
    pub landing_url: String,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(
        gate: GateConfig,
        auth: Arc<dyn AuthBackend>,
        roles: Arc<dyn RoleDirectory>,
        landing_url: impl Into<String>,
    ) -> Self {
        let landing_url = landing_url.into();
        Self {
            classifier: Arc::new(PathClassifier::new(&gate)),
            gate: Arc::new(gate),
            auth,
            roles,
            secure_cookies: landing_url.starts_with("https://"),
            landing_url,
        }
    }

    pub fn from_config(
        config: &ServerConfig,
        auth: Arc<dyn AuthBackend>,
        roles: Arc<dyn RoleDirectory>,
    ) -> Self {
        Self::new(config.gate.clone(), auth, roles, config.landing_url())
    }
}
