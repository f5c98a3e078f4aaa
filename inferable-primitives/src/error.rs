//! Shared error definitions for client primitives.

use thiserror::Error;

/// Result alias used throughout the client runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The supplied machine identifier failed validation.
    #[error("invalid machine id `{id}`: {reason}")]
    InvalidMachineId {
        /// The offending identifier.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A service or function name failed validation.
    #[error("invalid {kind} name `{name}`: {reason}")]
    InvalidName {
        /// Which kind of name was validated ("service" or "function").
        kind: &'static str,
        /// The offending name.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}
