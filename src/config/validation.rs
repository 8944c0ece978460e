//! Configuration validation.
//!
//! Serde handles the syntactic checks; this pass checks value ranges and
//! formats and reports every problem found, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::FilterConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a valid socket address")]
    InvalidBindAddress(String),

    #[error("listener.max_concurrent_streams must be greater than zero")]
    ZeroStreamLimit,

    #[error("quota.max_requests_per_user must be greater than zero")]
    ZeroQuota,

    #[error("observability.log_format {0:?} must be \"text\" or \"json\"")]
    UnknownLogFormat(String),

    #[error("observability.metrics_address {0:?} is not a valid socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &FilterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.listener.max_concurrent_streams == Some(0) {
        errors.push(ValidationError::ZeroStreamLimit);
    }

    if config.quota.max_requests_per_user == 0 {
        errors.push(ValidationError::ZeroQuota);
    }

    let observability = &config.observability;
    if !matches!(observability.log_format.as_str(), "text" | "json") {
        errors.push(ValidationError::UnknownLogFormat(
            observability.log_format.clone(),
        ));
    }

    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&FilterConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = FilterConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.listener.max_concurrent_streams = Some(0);
        config.quota.max_requests_per_user = 0;
        config.observability.log_format = "yaml".into();
        config.observability.metrics_address = "nope".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::ZeroQuota));
        assert!(errors.contains(&ValidationError::ZeroStreamLimit));
    }

    #[test]
    fn test_metrics_address_ignored_when_disabled() {
        let mut config = FilterConfig::default();
        config.observability.metrics_enabled = false;
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());
    }
}
