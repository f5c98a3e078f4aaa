//! Core shared types for the Inferable client runtime.

#![warn(missing_docs, clippy::pedantic)]

mod call;
mod config;
mod error;
mod ids;
mod name;

/// Call messages and the result envelopes reported back for them.
pub use call::{CallMessage, ResultEnvelope, ResultMeta, ResultType};
/// Opaque per-function configuration forwarded to the control plane.
pub use config::{CacheConfig, FunctionConfig};
/// Error type and result alias shared across the SDK.
pub use error::{Error, Result};
/// Stable identifier attached to every outbound call.
pub use ids::MachineId;
/// Validation for service and function names.
pub use name::{validate_function_name, validate_service_name};

/// Name of the service created automatically for every client.
pub const DEFAULT_SERVICE: &str = "default";
