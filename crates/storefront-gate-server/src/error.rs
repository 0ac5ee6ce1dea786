use serde::Serialize;
use storefront_gate::ConfigError;
use thiserror::Error;

/// Startup failures. Request-time problems never surface as errors: the gate
/// answers them with redirects.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error(transparent)]
    Gate(#[from] ConfigError),
}

/// JSON body for non-redirect error responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_missing_env() {
        assert_eq!(
            ServerError::MissingEnv("STOREFRONT_BACKEND_URL").to_string(),
            "missing environment variable STOREFRONT_BACKEND_URL"
        );
    }

    #[test]
    fn gate_config_errors_pass_through() {
        let err: ServerError = ConfigError::DuplicateExitPath("/admin/login".into()).into();
        assert_eq!(
            err.to_string(),
            "login and forbidden paths must differ (both /admin/login)"
        );
    }
}
