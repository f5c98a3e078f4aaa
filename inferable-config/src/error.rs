//! Configuration errors.

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating client options.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No API secret was supplied.
    #[error("API secret is required (set INFERABLE_API_SECRET or pass it explicitly)")]
    MissingSecret,

    /// The endpoint is not an absolute HTTP(S) URL.
    #[error("invalid URL: {endpoint} ({reason})")]
    InvalidEndpoint {
        /// Rejected endpoint.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The explicit machine id failed validation.
    #[error(transparent)]
    InvalidMachineId(#[from] inferable_primitives::Error),

    /// A numeric option is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Option name.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Options could not be parsed from JSON.
    #[error("failed to parse client options: {0}")]
    Parse(#[from] serde_json::Error),
}
