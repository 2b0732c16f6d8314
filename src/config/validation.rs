//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0 and at most a day, thresholds > 0)
//! - Check that related values agree (trip cap vs. trip factor)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use crate::config::schema::ClientConfig;

/// Upper bound for the background loop intervals.
pub const MAX_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("client_name must not be empty")]
    EmptyClientName,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{field} must be at most {max} ms")]
    IntervalTooLarge { field: &'static str, max: u64 },

    #[error("circuit_trip_max_timeout_secs ({max}) is below circuit_tripped_timeout_factor_secs ({factor})")]
    TripCapBelowFactor { max: u64, factor: u64 },

    #[error("max_connections_per_host ({per_host}) exceeds max_total_connections ({total})")]
    PoolSizing { per_host: usize, total: usize },
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.client_name.trim().is_empty() {
        errors.push(ValidationError::EmptyClientName);
    }

    let positive = [
        ("connection_failure_threshold", config.connection_failure_threshold as u64),
        ("circuit_tripped_timeout_factor_secs", config.circuit_tripped_timeout_factor_secs),
        ("circuit_trip_max_timeout_secs", config.circuit_trip_max_timeout_secs),
        ("failure_count_sliding_window_interval_ms", config.failure_count_sliding_window_interval_ms),
        ("ping_interval_ms", config.ping_interval_ms),
        ("ping_timeout_ms", config.ping_timeout_ms),
        ("list_of_servers_polling_interval_ms", config.list_of_servers_polling_interval_ms),
    ];
    for (name, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }

    let intervals = [
        ("ping_interval_ms", config.ping_interval_ms),
        ("list_of_servers_polling_interval_ms", config.list_of_servers_polling_interval_ms),
    ];
    for (field, value) in intervals {
        if value > MAX_INTERVAL_MS {
            errors.push(ValidationError::IntervalTooLarge {
                field,
                max: MAX_INTERVAL_MS,
            });
        }
    }

    if config.circuit_trip_max_timeout_secs < config.circuit_tripped_timeout_factor_secs {
        errors.push(ValidationError::TripCapBelowFactor {
            max: config.circuit_trip_max_timeout_secs,
            factor: config.circuit_tripped_timeout_factor_secs,
        });
    }

    if config.enable_connection_pool && config.max_connections_per_host > config.max_total_connections {
        errors.push(ValidationError::PoolSizing {
            per_host: config.max_connections_per_host,
            total: config.max_total_connections,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
