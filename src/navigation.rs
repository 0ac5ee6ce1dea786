//! Routing-layer seam: the gate only ever replaces the current entry.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    /// Replace the current history entry so back does not re-enter the gate.
    Replace,
    Push,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    pub to: String,
    pub mode: NavigationMode,
}

impl Navigation {
    pub fn replace(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            mode: NavigationMode::Replace,
        }
    }
}

pub trait Navigator: Send + Sync {
    fn redirect(&self, navigation: &Navigation);
}

/// Navigator that records every redirect it is asked to perform.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    issued: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> Vec<Navigation> {
        match self.issued.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count_to(&self, path: &str) -> usize {
        self.issued().iter().filter(|n| n.to == path).count()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, navigation: &Navigation) {
        let mut guard = match self.issued.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(navigation.clone());
    }
}
