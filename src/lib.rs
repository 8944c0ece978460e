//! Envoy external processor that authenticates requests by API key and
//! enforces a fixed per-user request quota.

// Core subsystems
pub mod auth;
pub mod ext_proc;
pub mod quota;

// Plumbing
pub mod config;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use auth::KeyStore;
pub use config::FilterConfig;
pub use ext_proc::{ExtProcService, StreamProcessor};
pub use lifecycle::Shutdown;
pub use quota::QuotaTracker;
