//! Client SDK for hosting functions on the Inferable control plane.
//!
//! Register typed Rust functions against a service, start the service, and
//! the client polls the control plane for calls, runs them and reports the
//! results:
//!
//! ```no_run
//! use inferable::{ClientOptions, Function, FunctionMetadata, Inferable};
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct ReverseInput {
//!     message: String,
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Inferable::new(ClientOptions::from_env())?;
//! client.default_service().register_func(Function::infallible(
//!     FunctionMetadata::new("reverse")?.with_description("Reverses a message"),
//!     |input: ReverseInput| input.message.chars().rev().collect::<String>(),
//! ))?;
//! client.default_service().start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The building blocks are re-exported as modules for callers that need more
//! control.

#![warn(missing_docs, clippy::pedantic)]

mod client;
mod error;

pub use client::Inferable;
pub use error::{InferableError, InferableResult};

pub use inferable_config::ClientOptions;
pub use inferable_functions::{Function, FunctionMetadata, Outcome};
/// Input-type bound for handlers. Deriving it requires a direct `schemars`
/// dependency in the calling crate.
pub use inferable_functions::JsonSchema;
pub use inferable_kernel::{Service, ServiceState};
pub use inferable_primitives::{FunctionConfig, MachineId};

/// Shared identifiers, call and result types.
pub use inferable_primitives as primitives;

/// Client options and environment loading.
pub use inferable_config as config;

/// HTTP transport and the `Transport` seam.
pub use inferable_transport as transport;

/// Function registry, schemas and dispatch.
pub use inferable_functions as functions;

/// Service lifecycle, poll loop and heartbeat.
pub use inferable_kernel as kernel;

/// Tracing subscriber bootstrap (enabled by the `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use inferable_telemetry as telemetry;
