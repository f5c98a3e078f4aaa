//! Typed client for the control-plane endpoints used by services.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use inferable_primitives::{CallMessage, MachineId, ResultEnvelope};
use inferable_transport::{
    FetchRequest, FetchResponse, Transport, TransportError, path_from_segments,
};
use thiserror::Error;
use tracing::debug;

use crate::wire::{LiveResponse, PingRequest, RegisterMachineRequest, RegisterMachineResponse};

/// Value sent as `X-Machine-SDK-Language`.
pub const SDK_LANGUAGE: &str = "rust";

/// Value sent as `X-Machine-SDK-Version`.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result alias for control-plane calls.
pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// Errors surfaced by [`ControlPlane`].
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// The request failed at the transport level or with an error status.
    #[error("{operation} failed: {source}")]
    Transport {
        /// Operation being performed.
        operation: &'static str,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },

    /// The response body did not have the expected shape.
    #[error("failed to parse {operation} response: {reason}")]
    Decode {
        /// Operation being performed.
        operation: &'static str,
        /// Decoder error.
        reason: String,
    },

    /// `/live` answered with something other than `ok`.
    #[error("unexpected status from /live: {status}")]
    Unhealthy {
        /// Status reported by the server.
        status: String,
    },
}

impl ControlPlaneError {
    fn transport(operation: &'static str) -> impl FnOnce(TransportError) -> Self {
        move |source| Self::Transport { operation, source }
    }

    fn decode(operation: &'static str) -> impl FnOnce(TransportError) -> Self {
        move |err| Self::Decode {
            operation,
            reason: err.to_string(),
        }
    }

    /// Returns the underlying transport error, if any.
    #[must_use]
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Outcome of the machine handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Cluster the machine was admitted to.
    pub cluster_id: String,
    /// Server-requested delay before the first poll.
    pub retry_after: Option<Duration>,
}

/// One page of pending calls.
#[derive(Debug, Clone, PartialEq)]
pub struct CallBatch {
    /// Calls in server order.
    pub calls: Vec<CallMessage>,
    /// Server-requested delay before the next poll.
    pub retry_after: Option<Duration>,
}

/// Issues control-plane requests on behalf of one machine.
#[derive(Clone)]
pub struct ControlPlane {
    transport: Arc<dyn Transport>,
    machine_id: MachineId,
}

impl fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlane")
            .field("transport", &"dyn Transport")
            .field("machine_id", &self.machine_id)
            .finish()
    }
}

impl ControlPlane {
    /// Creates a client over `transport` identifying as `machine_id`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, machine_id: MachineId) -> Self {
        Self {
            transport,
            machine_id,
        }
    }

    /// Returns the machine identifier sent with every request.
    #[must_use]
    pub fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    fn machine_request(&self, request: FetchRequest) -> FetchRequest {
        request
            .with_header("X-Machine-ID", self.machine_id.as_str())
            .with_header("X-Machine-SDK-Version", SDK_VERSION)
            .with_header("X-Machine-SDK-Language", SDK_LANGUAGE)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: FetchRequest,
    ) -> ControlPlaneResult<FetchResponse> {
        self.transport
            .fetch(self.machine_request(request))
            .await
            .map_err(ControlPlaneError::transport(operation))
    }

    /// Announces `request.service` and its functions.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Transport`] if the request fails and
    /// [`ControlPlaneError::Decode`] if the acknowledgement lacks a cluster id.
    pub async fn register_machine(
        &self,
        request: &RegisterMachineRequest,
    ) -> ControlPlaneResult<Handshake> {
        const OPERATION: &str = "machine registration";

        let fetch = FetchRequest::post("/machines")
            .with_json(request)
            .map_err(ControlPlaneError::transport(OPERATION))?;
        let response = self.send(OPERATION, fetch).await?;
        let body: RegisterMachineResponse =
            response.json().map_err(ControlPlaneError::decode(OPERATION))?;

        debug!(service = %request.service, cluster_id = %body.cluster_id, "machine registered");
        Ok(Handshake {
            cluster_id: body.cluster_id,
            retry_after: response.retry_after(),
        })
    }

    /// Fetches and acknowledges up to `limit` pending calls for `service`.
    ///
    /// An empty or `null` body is treated as an empty page.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Transport`] if the request fails and
    /// [`ControlPlaneError::Decode`] if the body is not a list of calls.
    pub async fn fetch_calls(
        &self,
        cluster_id: &str,
        service: &str,
        limit: usize,
    ) -> ControlPlaneResult<CallBatch> {
        const OPERATION: &str = "call poll";

        let path = path_from_segments(["clusters", cluster_id, "calls"])
            .map_err(ControlPlaneError::transport(OPERATION))?;
        let fetch = FetchRequest::get(path)
            .with_query("acknowledge", "true")
            .with_query("service", service)
            .with_query("status", "pending")
            .with_query("limit", limit.to_string());
        let response = self.send(OPERATION, fetch).await?;

        let calls = if response.body().iter().all(u8::is_ascii_whitespace) {
            Vec::new()
        } else {
            response
                .json::<Option<Vec<CallMessage>>>()
                .map_err(ControlPlaneError::decode(OPERATION))?
                .unwrap_or_default()
        };

        Ok(CallBatch {
            calls,
            retry_after: response.retry_after(),
        })
    }

    /// Reports the result of `call_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Transport`] if the request fails.
    pub async fn persist_result(
        &self,
        cluster_id: &str,
        call_id: &str,
        result: &ResultEnvelope,
    ) -> ControlPlaneResult<()> {
        const OPERATION: &str = "result persistence";

        let path = path_from_segments(["clusters", cluster_id, "calls", call_id, "result"])
            .map_err(ControlPlaneError::transport(OPERATION))?;
        let fetch = FetchRequest::post(path)
            .with_json(result)
            .map_err(ControlPlaneError::transport(OPERATION))?;
        self.send(OPERATION, fetch).await?;
        Ok(())
    }

    /// Checks that the control plane reports itself healthy.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Unhealthy`] for any status but `ok`, and
    /// transport or decode errors otherwise.
    pub async fn live(&self) -> ControlPlaneResult<()> {
        const OPERATION: &str = "liveness check";

        let response = self
            .transport
            .fetch(FetchRequest::get("/live"))
            .await
            .map_err(ControlPlaneError::transport(OPERATION))?;
        let body: LiveResponse = response.json().map_err(ControlPlaneError::decode(OPERATION))?;

        if body.status == "ok" {
            Ok(())
        } else {
            Err(ControlPlaneError::Unhealthy {
                status: body.status,
            })
        }
    }

    /// Sends a heartbeat listing the hosted services.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Transport`] if the request fails.
    pub async fn ping(&self, services: Vec<String>) -> ControlPlaneResult<()> {
        const OPERATION: &str = "heartbeat";

        let fetch = FetchRequest::post("/v2/ping")
            .with_json(&PingRequest { services })
            .map_err(ControlPlaneError::transport(OPERATION))?;
        self.send(OPERATION, fetch).await?;
        Ok(())
    }
}
