//! Network subsystem.
//!
//! # Data Flow
//! ```text
//! Envoy (gRPC client)
//!     → server.rs (TCP listener, HTTP/2, gRPC routing)
//!     → ExternalProcessorServer → ExtProcService::process
//! ```
//!
//! # Design Decisions
//! - Plain TCP: TLS termination is left to the deployment (sidecar network)
//! - Graceful shutdown: stop accepting, let open streams finish

pub mod server;

pub use server::{bind, serve, ServerError};
