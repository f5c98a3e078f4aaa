//! Function registration and dispatch.
//!
//! Functions are registered against a service name together with a JSON
//! schema generated from their input type. Inbound calls are routed by name
//! through the [`dispatch::Dispatcher`], which decodes the input, invokes the
//! handler and classifies the outcome.

#![warn(missing_docs, clippy::pedantic)]

pub mod dispatch;
pub mod error;
pub mod registry;
pub mod schema;

pub use dispatch::{Dispatcher, Outcome};
pub use error::{FunctionError, FunctionResult};
pub use registry::{
    Function, FunctionDescription, FunctionMetadata, FunctionRegistry, Handler,
    RegisteredFunction, ServiceDescription,
};
pub use schema::InputSchema;

/// Re-exported for naming the bound. `#[derive(JsonSchema)]` expands to
/// `::schemars` paths, so deriving crates still depend on `schemars` directly.
pub use schemars::JsonSchema;
