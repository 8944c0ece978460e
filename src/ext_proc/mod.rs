//! Envoy external processing (ext_proc) subsystem.
//!
//! # Data Flow
//! ```text
//! Envoy opens Process stream
//!     → service.rs (admission, spawn worker per stream)
//!     → processor.rs (per-event dispatch)
//!         request headers: x-api-key → KeyStore → QuotaTracker
//!         other events:    pass through
//!     → response.rs (continue | immediate response)
//!     → back to Envoy on the same stream
//! ```
//!
//! # Design Decisions
//! - A deny ends the stream; nothing further is read
//! - No lock is held across a network await
//! - Wire types are declared by hand in proto.rs with upstream field tags

pub mod processor;
pub mod proto;
pub mod response;
pub mod service;

pub use processor::{Decision, Event, StreamError, StreamOutcome, StreamProcessor};
pub use response::{Denial, Phase};
pub use service::ExtProcService;
