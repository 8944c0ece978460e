//! Startup orchestration.
//!
//! Builds the key store, quota tracker and service from a validated
//! configuration, starts the metrics exporter, binds the listener and serves
//! until shutdown. Key and listener failures are fatal; a metrics exporter
//! that cannot start is logged and the filter serves without it.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::auth::{KeyStore, KeyStoreError};
use crate::config::{FilterConfig, ObservabilityConfig};
use crate::ext_proc::{ExtProcService, StreamProcessor};
use crate::net::{self, ServerError};
use crate::observability::metrics;
use crate::quota::QuotaTracker;

/// Fatal errors raised before or while serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("KEY_FILE environment variable not set (or pass --key-file / keys.path)")]
    MissingKeyFile,

    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Load the key file named by the configuration.
pub fn load_keys(config: &FilterConfig) -> Result<KeyStore, StartupError> {
    let path: &PathBuf = config.keys.path.as_ref().ok_or(StartupError::MissingKeyFile)?;
    Ok(KeyStore::load(path)?)
}

/// Wire the processing pipeline around an already-loaded key store.
pub fn build_service(config: &FilterConfig, keys: KeyStore) -> ExtProcService {
    let processor = StreamProcessor::new(
        Arc::new(keys),
        Arc::new(QuotaTracker::new()),
        config.quota.max_requests_per_user,
    );
    ExtProcService::new(processor, config.listener.max_concurrent_streams)
}

/// Start the Prometheus exporter if enabled. Returns whether it is running.
pub fn start_metrics(config: &ObservabilityConfig) -> bool {
    if !config.metrics_enabled {
        return false;
    }

    let Ok(addr) = config.metrics_address.parse() else {
        tracing::error!(
            metrics_address = %config.metrics_address,
            "Failed to parse metrics address"
        );
        return false;
    };

    match metrics::init_metrics(addr) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(metrics_address = %addr, error = %e, "Failed to start metrics exporter");
            false
        }
    }
}

/// Run the filter until `shutdown` resolves.
pub async fn run<F>(config: FilterConfig, shutdown: F) -> Result<(), StartupError>
where
    F: Future<Output = ()>,
{
    let keys = load_keys(&config)?;
    let service = build_service(&config, keys);

    start_metrics(&config.observability);

    let listener = net::bind(&config.listener).await?;
    net::serve(listener, service, shutdown).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_path_is_fatal() {
        let err = load_keys(&FilterConfig::default()).unwrap_err();
        assert!(matches!(err, StartupError::MissingKeyFile));
    }

    #[test]
    fn test_unreadable_key_file_is_fatal() {
        let mut config = FilterConfig::default();
        config.keys.path = Some("/definitely/not/here/keys.csv".into());

        let err = load_keys(&config).unwrap_err();
        assert!(matches!(err, StartupError::KeyStore(KeyStoreError::Open { .. })));
    }

    #[tokio::test]
    async fn test_run_fails_before_binding_without_keys() {
        let mut config = FilterConfig::default();
        config.observability.metrics_enabled = false;

        let err = run(config, std::future::ready(())).await.unwrap_err();
        assert!(matches!(err, StartupError::MissingKeyFile));
    }

    #[tokio::test]
    async fn test_metrics_address_in_use_is_not_fatal() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ObservabilityConfig {
            metrics_enabled: true,
            metrics_address: occupied.local_addr().unwrap().to_string(),
            ..ObservabilityConfig::default()
        };

        assert!(!start_metrics(&config));
    }

    #[tokio::test]
    async fn test_run_serves_when_metrics_cannot_start() {
        let path = std::env::temp_dir().join(format!("auth-extproc-startup-{}.csv", uuid::Uuid::new_v4()));
        std::fs::write(&path, "abc123,alice\n").unwrap();

        let mut config = FilterConfig::default();
        config.keys.path = Some(path.clone());
        config.listener.bind_address = "127.0.0.1:0".to_string();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "not-an-address".to_string();

        let result = run(config, std::future::ready(())).await;
        std::fs::remove_file(&path).unwrap_or_default();

        assert!(result.is_ok(), "startup failed: {:?}", result.err());
    }

    #[test]
    fn test_disabled_metrics_are_not_started() {
        let config = ObservabilityConfig {
            metrics_enabled: false,
            ..ObservabilityConfig::default()
        };
        assert!(!start_metrics(&config));
    }
}
