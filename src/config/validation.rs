//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check addresses and engine host URLs are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProviderConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProviderConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("resolver.scheme must be http or https, got '{0}'")]
    UnsupportedScheme(String),

    #[error("engine.host must start with unix:// or tcp://, got '{0}'")]
    UnsupportedEngineHost(String),

    #[error("scaling.default_min ({min}) exceeds scaling.default_max ({max})")]
    InvertedBounds { min: u64, max: u64 },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ProviderConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.timeouts.write_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.write_secs" });
    }
    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.connect_ms" });
    }
    if config.resolver.function_port == 0 {
        errors.push(ValidationError::Zero { field: "resolver.function_port" });
    }

    if !matches!(config.resolver.scheme.as_str(), "http" | "https") {
        errors.push(ValidationError::UnsupportedScheme(config.resolver.scheme.clone()));
    }

    let host = &config.engine.host;
    if !(host.starts_with("unix://") || host.starts_with("tcp://")) {
        errors.push(ValidationError::UnsupportedEngineHost(host.clone()));
    }

    if config.scaling.default_min > config.scaling.default_max {
        errors.push(ValidationError::InvertedBounds {
            min: config.scaling.default_min,
            max: config.scaling.default_max,
        });
    }
    if config.scaling.min_label.is_empty() {
        errors.push(ValidationError::Empty("scaling.min_label"));
    }
    if config.scaling.max_label.is_empty() {
        errors.push(ValidationError::Empty("scaling.max_label"));
    }

    if config.auth.enabled && config.auth.token.is_empty() {
        errors.push(ValidationError::Empty("auth.token"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
