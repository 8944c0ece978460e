//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     key file → key_store.rs (parse lines) → KeyStore (immutable, Arc-shared)
//!
//! Per request:
//!     x-api-key header value → KeyStore::resolve → username | unauthorized
//! ```
//!
//! # Design Decisions
//! - Keys are loaded once; no hot reload
//! - Malformed lines are skipped, never fatal
//! - No normalization: keys and usernames compare byte for byte

pub mod key_store;

pub use key_store::{KeyStore, KeyStoreError};

/// Request header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";
