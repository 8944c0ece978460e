//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Key store → Quota tracker → Service → Metrics → Listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting streams → Drain in-flight → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: key file and listener errors are fatal, metrics errors are logged
//! - Listener binds last, so Envoy only connects once keys are loaded

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::StartupError;
