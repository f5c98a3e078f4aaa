//! Service runtime for the Inferable client.
//!
//! A [`Service`] announces its functions to the control plane, then polls for
//! pending calls on its own `tokio` task, dispatches each call through the
//! shared registry and reports the result. The [`Heartbeat`] keeps the machine
//! visible while services are idle.

#![warn(missing_docs, clippy::pedantic)]

mod control_plane;
mod heartbeat;
mod lifecycle;
mod poller;
mod service;
mod wire;

#[cfg(test)]
mod testing;

pub use control_plane::{
    CallBatch, ControlPlane, ControlPlaneError, ControlPlaneResult, Handshake, SDK_LANGUAGE,
    SDK_VERSION,
};
pub use heartbeat::{Heartbeat, HeartbeatConfig, run_heartbeat_loop};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleEvent, LifecycleResult, ServiceState};
pub use poller::{
    LoopExit, MessageFailure, PollConfig, PollCycle, PollError, PollResult, Poller, run_poll_loop,
};
pub use service::{Service, ServiceContext, ServiceDirectory, ServiceError, ServiceResult};
pub use wire::{
    FunctionRegistration, LiveResponse, PingRequest, RegisterMachineRequest,
    RegisterMachineResponse,
};
