//! Hosts a `reverse` function on the default service until Ctrl-C.
//!
//! Requires `INFERABLE_API_SECRET`; `INFERABLE_API_ENDPOINT` and
//! `INFERABLE_MACHINE_ID` are optional.

use anyhow::{Context, Result};
use inferable::telemetry::{TelemetryConfig, init_tracing};
use inferable::{ClientOptions, Function, FunctionMetadata, Inferable};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize, JsonSchema)]
struct ReverseInput {
    /// Text to reverse.
    message: String,
}

fn reverse(input: ReverseInput) -> String {
    input.message.chars().rev().collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(&TelemetryConfig::default());

    let client = Inferable::new(ClientOptions::from_env()).context("failed to create client")?;
    client
        .server_ok()
        .await
        .context("control plane is not reachable")?;

    let service = client.default_service();
    service.register_func(Function::infallible(
        FunctionMetadata::new("reverse")?.with_description("Reverses a message"),
        reverse,
    ))?;
    service.start().await.context("failed to start service")?;
    info!(machine_id = %client.machine_id(), "serving; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    client.shutdown().await;
    Ok(())
}
