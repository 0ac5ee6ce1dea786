use thiserror::Error;

/// Failure of a role lookup against the row store.
///
/// The two variants recover differently: a missing profile row means the
/// identity simply holds no privileged role, while an unreachable store means
/// the gate cannot know and must fail closed to the login path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("row store unreachable: {0}")]
    Unreachable(String),

    #[error("no profile row for identity {0}")]
    ProfileMissing(String),
}

impl LookupError {
    /// True when the gate must send the caller back to authenticate.
    pub fn fails_closed_to_login(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("identity provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("session rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be an absolute path, got {value:?}")]
    RelativePath { name: &'static str, value: String },

    #[error("{name} ({value}) must sit under the admin prefix {prefix}")]
    OutsidePrefix {
        name: &'static str,
        value: String,
        prefix: String,
    },

    #[error("login and forbidden paths must differ (both {0})")]
    DuplicateExitPath(String),

    #[error("admitted role set is invalid: {0}")]
    AdmittedRoles(String),

    #[error("unknown role {0:?}")]
    UnknownRole(String),
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("gate driver stopped")]
    DriverStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_fails_closed_to_login() {
        assert!(LookupError::Unreachable("timeout".into()).fails_closed_to_login());
    }

    #[test]
    fn missing_profile_does_not_send_to_login() {
        assert!(!LookupError::ProfileMissing("u1".into()).fails_closed_to_login());
    }

    #[test]
    fn display_lookup_errors() {
        assert_eq!(
            LookupError::Unreachable("429 Too Many Requests".into()).to_string(),
            "row store unreachable: 429 Too Many Requests"
        );
        assert_eq!(
            LookupError::ProfileMissing("u1".into()).to_string(),
            "no profile row for identity u1"
        );
    }

    #[test]
    fn gate_error_wraps_transparently() {
        let e: GateError = LookupError::Unreachable("down".into()).into();
        assert_eq!(e.to_string(), "row store unreachable: down");
    }

    #[test]
    fn display_config_outside_prefix() {
        let e = ConfigError::OutsidePrefix {
            name: "login_path",
            value: "/login".into(),
            prefix: "/admin".into(),
        };
        assert_eq!(
            e.to_string(),
            "login_path (/login) must sit under the admin prefix /admin"
        );
    }
}
