//! Configuration validation

use seatlink_api::{HEADER_SIZE, MAX_PAYLOAD_SIZE};

pub use seatlink_api::MIN_BUFFER_SIZE;
use thiserror::Error;

use crate::schema::RawConfig;

/// Largest useful queue: one maximal frame
pub const MAX_BUFFER_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("buffer_size {value} out of range ({min}..={max})")]
    BufferSizeOutOfRange { value: usize, min: usize, max: usize },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("socket_path cannot be empty")]
    EmptySocketPath,
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let daemon = &config.daemon;

    if let Some(size) = daemon.buffer_size
        && !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&size)
    {
        errors.push(ValidationError::BufferSizeOutOfRange {
            value: size,
            min: MIN_BUFFER_SIZE,
            max: MAX_BUFFER_SIZE,
        });
    }

    if daemon.max_clients == Some(0) {
        errors.push(ValidationError::Zero {
            field: "max_clients",
        });
    }

    if daemon.rate_limit_per_second == Some(0) {
        errors.push(ValidationError::Zero {
            field: "rate_limit_per_second",
        });
    }

    if daemon
        .socket_path
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty())
    {
        errors.push(ValidationError::EmptySocketPath);
    }

    errors
}
