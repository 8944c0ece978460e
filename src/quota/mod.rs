//! Quota enforcement subsystem.
//!
//! # Data Flow
//! ```text
//! Authenticated request (username)
//!     → tracker.rs (check_and_increment against the threshold)
//!     → allowed: counter +1, request continues
//!     → refused: counter untouched, request denied with 429
//! ```
//!
//! # Design Decisions
//! - Counters live in memory only and are never reset
//! - Only the atomic check-and-increment is exposed, never the raw map
//! - Sharded locking: one user's burst does not block other users

pub mod tracker;

pub use tracker::{QuotaDecision, QuotaTracker};

/// Requests allowed per username for the lifetime of the process.
pub const DEFAULT_MAX_REQUESTS_PER_USER: u64 = 5;
