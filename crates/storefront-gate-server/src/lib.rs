//! HTTP front for the storefront admin gate.
//!
//! Server-rendered requests into the admin area go through [`middleware::admin_gate`],
//! which runs the same gate state machine as interactive clients. The auth
//! callback and sign-out endpoints manage the session cookies the gate reads.

pub mod backend;
pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod middleware;
#[cfg(feature = "database")]
pub mod pg;
pub mod router;
pub mod state;

pub use backend::{AuthBackend, HostedBackend, ProviderSession};
pub use config::ServerConfig;
pub use error::{ErrorResponse, ServerError};
pub use router::build_router;
pub use state::AppState;
