//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (timeouts > 0, limits > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::BridgeConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: {value:?} is not a valid socket address")]
    InvalidSocketAddr { field: &'static str, value: String },

    #[error("backend.address: {0:?} must be host:port")]
    InvalidBackendAddress(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("observability.log_level: unknown level {0:?}")]
    UnknownLogLevel(String),
}

pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidSocketAddr {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if !is_host_port(&config.backend.address) {
        errors.push(ValidationError::InvalidBackendAddress(
            config.backend.address.clone(),
        ));
    }

    let positive = [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.read_secs", config.timeouts.read_secs),
        ("timeouts.write_secs", config.timeouts.write_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("limits.max_upload_bytes", config.limits.max_upload_bytes as u64),
        ("limits.max_download_bytes", config.limits.max_download_bytes),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidSocketAddr {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Hostnames are resolved at connect time, so only the shape is checked here.
fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().map_or(false, |p| p != 0),
        None => false,
    }
}
