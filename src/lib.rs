//! Admin access gate for the storefront console.
//!
//! Decides, for every navigation into the administrative area, whether the
//! caller may proceed, must authenticate first, or lacks the privilege.
//!
//! - **AccessGate**: explicit state machine (`Unmounted`, `Resolving`,
//!   `Allow`, `RedirectToLogin`, `RedirectToForbidden`)
//! - **SessionSource**: contract for the identity provider's session
//!   lifecycle and profile role lookups
//! - **RolePolicy**: which roles are admitted
//! - **RoleCache**: process-wide, single-flight role cache
//! - **GateDriver**: async wiring of the gate to a session source, router
//!   and navigator
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use storefront_gate::{GateConfig, GateDriver, MemorySessionSource, RecordingNavigator, RoleCache};
//! use tokio::sync::watch;
//!
//! let source = MemorySessionSource::shared();
//! let (path_tx, path_rx) = watch::channel("/admin".to_string());
//! let (mount_tx, mount_rx) = watch::channel(false);
//! let (driver, handle) = GateDriver::new(
//!     &GateConfig::default(),
//!     source.clone(),
//!     RoleCache::shared(),
//!     Arc::new(RecordingNavigator::new()),
//!     path_rx,
//!     mount_rx,
//! );
//! tokio::spawn(driver.run());
//! mount_tx.send(true)?;
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod gate;
pub mod navigation;
pub mod paths;
pub mod policy;
pub mod request;
pub mod role_cache;
pub mod session;
pub mod types;

pub use config::GateConfig;
pub use driver::{GateDriver, GateHandle};
pub use error::{ConfigError, GateError, LookupError, SessionError};
pub use gate::{AccessGate, GateCommand, GateDecision, GateInput, GateState, LookupTicket, Step};
pub use navigation::{Navigation, NavigationMode, Navigator, RecordingNavigator};
pub use paths::{PathClass, PathClassifier};
pub use policy::{classify, Authorization, RolePolicy};
pub use request::decide_request;
pub use role_cache::RoleCache;
pub use session::{MemorySessionSource, RoleDirectory, SessionSource, SessionWatcher};
pub use types::{Identity, IdentityId, Role, SessionEvent, SessionSnapshot, SessionState};
