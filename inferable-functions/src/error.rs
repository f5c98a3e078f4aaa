//! Errors produced by function registration and dispatch.

use inferable_primitives::Error as PrimitiveError;
use thiserror::Error;

/// Result alias for function operations.
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Errors produced by function registration and invocation.
#[derive(Debug, Error)]
pub enum FunctionError {
    /// Function metadata failed validation.
    #[error("invalid function metadata: {0}")]
    InvalidMetadata(#[from] PrimitiveError),

    /// Function name collided with an existing registration.
    #[error("function with name '{name}' already registered for service '{service}'")]
    DuplicateFunction {
        /// Owning service.
        service: String,
        /// Name of the offending function.
        name: String,
    },

    /// The input type cannot be described as a record.
    #[error("function '{function}' argument must be a struct: {reason}")]
    UnsupportedInput {
        /// Name of the function being registered.
        function: String,
        /// What was found instead of a record.
        reason: String,
    },

    /// The input schema references an external definition.
    #[error(
        "schema for function '{function}' contains a $ref to an external definition. \
         this is currently not supported"
    )]
    UnsupportedReference {
        /// Name of the function being registered.
        function: String,
    },

    /// The generated schema could not be encoded.
    #[error("failed to encode schema for function '{function}': {reason}")]
    Schema {
        /// Name of the function being registered.
        function: String,
        /// Encoder error.
        reason: String,
    },

    /// Requested function does not exist.
    #[error("function not found: '{name}' in service '{service}'")]
    NotFound {
        /// Service that was searched.
        service: String,
        /// Name of the missing function.
        name: String,
    },

    /// The call input could not be decoded into the handler's input type.
    #[error("failed to decode input for function '{function}': {reason}")]
    Decode {
        /// Target function.
        function: String,
        /// Decoder error.
        reason: String,
    },

    /// The handler's return value could not be encoded as JSON.
    #[error("failed to encode result of function '{function}': {reason}")]
    Encode {
        /// Target function.
        function: String,
        /// Encoder error.
        reason: String,
    },
}

impl FunctionError {
    /// Returns `true` for errors raised while registering a function.
    #[must_use]
    pub const fn is_registration(&self) -> bool {
        matches!(
            self,
            Self::InvalidMetadata(_)
                | Self::DuplicateFunction { .. }
                | Self::UnsupportedInput { .. }
                | Self::UnsupportedReference { .. }
                | Self::Schema { .. }
        )
    }
}
