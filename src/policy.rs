//! Role classification policy.
//!
//! Kept apart from the gate so the admitted role set can grow without
//! touching transition logic.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    Authorized,
    Unauthorized,
}

/// The set of roles admitted into the administrative area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    admitted: BTreeSet<Role>,
}

impl RolePolicy {
    /// Build a policy from an explicit admitted set.
    ///
    /// `standard` can never be admitted and the set cannot be empty.
    pub fn new(admitted: impl IntoIterator<Item = Role>) -> Result<Self, ConfigError> {
        let admitted: BTreeSet<Role> = admitted.into_iter().collect();
        if admitted.is_empty() {
            return Err(ConfigError::AdmittedRoles("no role admitted".into()));
        }
        if admitted.contains(&Role::Standard) {
            return Err(ConfigError::AdmittedRoles(
                "standard users cannot be admitted".into(),
            ));
        }
        Ok(Self { admitted })
    }

    /// Parse a comma separated list such as `admin,super_admin`.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let roles = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<Role>)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(roles)
    }

    pub fn classify(&self, role: Role) -> Authorization {
        if self.admitted.contains(&role) {
            Authorization::Authorized
        } else {
            Authorization::Unauthorized
        }
    }

    pub fn admits(&self, role: Role) -> bool {
        self.classify(role) == Authorization::Authorized
    }

    pub fn admitted(&self) -> impl Iterator<Item = Role> + '_ {
        self.admitted.iter().copied()
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self {
            admitted: BTreeSet::from([Role::Admin, Role::SuperAdmin]),
        }
    }
}

/// Classify against the default admitted set (`admin`, `super_admin`).
pub fn classify(role: Role) -> Authorization {
    match role {
        Role::Admin | Role::SuperAdmin => Authorization::Authorized,
        Role::Standard => Authorization::Unauthorized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_admits_admin_and_super_admin() {
        let p = RolePolicy::default();
        assert_eq!(p.classify(Role::Admin), Authorization::Authorized);
        assert_eq!(p.classify(Role::SuperAdmin), Authorization::Authorized);
        assert_eq!(p.classify(Role::Standard), Authorization::Unauthorized);
    }

    #[test]
    fn free_classify_matches_default_policy() {
        let p = RolePolicy::default();
        for role in Role::ALL {
            assert_eq!(classify(role), p.classify(role));
        }
    }

    #[test]
    fn narrowed_policy() {
        let p = RolePolicy::parse("super_admin").unwrap();
        assert!(!p.admits(Role::Admin));
        assert!(p.admits(Role::SuperAdmin));
    }

    #[test]
    fn rejects_standard_and_empty() {
        assert!(RolePolicy::parse("admin, user").is_err());
        assert!(RolePolicy::parse(" , ").is_err());
        assert!(matches!(
            RolePolicy::parse("admin,owner"),
            Err(ConfigError::UnknownRole(_))
        ));
    }
}
