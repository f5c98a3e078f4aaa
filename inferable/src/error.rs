use inferable_config::ConfigError;
use inferable_functions::FunctionError;
use inferable_kernel::{ControlPlaneError, ServiceError};
use inferable_transport::TransportError;
use thiserror::Error;

/// Result alias for client operations.
pub type InferableResult<T> = Result<T, InferableError>;

/// Errors surfaced by [`crate::Inferable`].
#[derive(Debug, Error)]
pub enum InferableError {
    /// Options failed validation.
    #[error("invalid client options: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP transport could not be built.
    #[error("error creating client: {0}")]
    Transport(#[from] TransportError),

    /// The client was constructed outside a `tokio` runtime.
    #[error("the Inferable client must be created inside a tokio runtime")]
    NoRuntime,

    /// A service operation failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Local dispatch failed.
    #[error(transparent)]
    Function(#[from] FunctionError),

    /// The requested service does not exist.
    #[error("service with name '{service}' not found")]
    ServiceNotFound {
        /// Requested service name.
        service: String,
    },

    /// A control-plane request failed.
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    /// Definitions could not be encoded.
    #[error("failed to encode definitions: {0}")]
    Encode(#[from] serde_json::Error),
}
