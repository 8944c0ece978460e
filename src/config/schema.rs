//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the filter.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::quota::DEFAULT_MAX_REQUESTS_PER_USER;

/// Root configuration for the external processor.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FilterConfig {
    /// Listener configuration (bind address, admission control).
    pub listener: ListenerConfig,

    /// Where the API key file lives.
    pub keys: KeysConfig,

    /// Per-user quota settings.
    pub quota: QuotaConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9000").
    pub bind_address: String,

    /// Maximum concurrent processing streams. `None` leaves streams unbounded.
    pub max_concurrent_streams: Option<usize>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9000".to_string(),
            max_concurrent_streams: None,
        }
    }
}

/// API key file location.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct KeysConfig {
    /// Path to the `API_KEY,USERNAME` file.
    pub path: Option<PathBuf>,
}

/// Quota configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Requests allowed per username for the lifetime of the process.
    pub max_requests_per_user: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_requests_per_user: DEFAULT_MAX_REQUESTS_PER_USER,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("text" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
