//! Request path classification.

use serde::{Deserialize, Serialize};

use crate::config::GateConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathClass {
    /// Outside the administrative prefix; the gate has nothing to say.
    Public,
    /// Login and forbidden screens. Never checked, so redirects cannot loop.
    Exempt,
    /// Everything else under the administrative prefix.
    Guarded,
}

impl PathClass {
    pub fn requires_identity(&self) -> bool {
        matches!(self, PathClass::Guarded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathClassifier {
    prefix: String,
    exempt: [String; 2],
}

impl PathClassifier {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            prefix: normalize(&config.admin_prefix).to_string(),
            exempt: [
                normalize(&config.login_path).to_string(),
                normalize(&config.forbidden_path).to_string(),
            ],
        }
    }

    pub fn classify(&self, path: &str) -> PathClass {
        let path = normalize(path);
        if self.exempt.iter().any(|e| e == path) {
            return PathClass::Exempt;
        }
        let under_prefix = self.prefix == "/"
            || path == self.prefix
            || path
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'));
        if under_prefix {
            PathClass::Guarded
        } else {
            PathClass::Public
        }
    }
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self::new(&GateConfig::default())
    }
}

/// Drop query and fragment, then any trailing slashes (root stays `/`).
pub fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
