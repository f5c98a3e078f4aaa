//! Configuration for the Inferable client.
//!
//! [`ClientOptions`] carries every knob the client reads at construction:
//! endpoint, credentials, machine identity, and poll and heartbeat tuning.
//! Options can be built in code, read from the `INFERABLE_*` environment
//! variables, or parsed from JSON.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod options;

pub use error::{ConfigError, ConfigResult};
pub use options::{
    ClientOptions, DEFAULT_API_ENDPOINT, ENV_API_ENDPOINT, ENV_API_SECRET, ENV_MACHINE_ID,
};
