//! Lifecycle state machine for services.

use thiserror::Error;
use tracing::debug;

/// States a service can occupy during its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Service exists locally but has not been announced to the control plane.
    Unregistered,
    /// The machine handshake is in flight.
    Registering,
    /// The poll loop is running.
    Polling,
    /// Cancellation was requested and the poll loop is draining.
    Stopping,
    /// The poll loop has exited.
    Stopped,
}

impl ServiceState {
    /// Returns `true` while the service is registering or polling.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Registering | Self::Polling)
    }

    /// Returns `true` if the service may be started from this state.
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Unregistered | Self::Stopped)
    }
}

/// Events that trigger lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Begin the machine handshake.
    Register,
    /// Handshake succeeded and the poll loop was spawned.
    Registered,
    /// Handshake failed.
    HandshakeFailed,
    /// Cancellation requested.
    Stop,
    /// Poll loop exited after cancellation.
    Drained,
    /// Poll loop gave up after too many consecutive failures.
    Fail,
}

/// Lifecycle state manager for one service.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    service: String,
    state: ServiceState,
}

impl Lifecycle {
    /// Constructs a lifecycle controller for the named service.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            state: ServiceState::Unregistered,
        }
    }

    /// Returns the owning service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> ServiceState {
        self.state
    }

    /// Applies a lifecycle event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the supplied event is
    /// not allowed from the current state.
    pub fn transition(&mut self, event: LifecycleEvent) -> LifecycleResult<ServiceState> {
        let next = match (self.state, event) {
            (ServiceState::Unregistered | ServiceState::Stopped, LifecycleEvent::Register) => {
                Some(ServiceState::Registering)
            }
            (ServiceState::Registering, LifecycleEvent::Registered) => Some(ServiceState::Polling),
            (ServiceState::Registering, LifecycleEvent::HandshakeFailed) => {
                Some(ServiceState::Unregistered)
            }
            (ServiceState::Polling, LifecycleEvent::Stop) => Some(ServiceState::Stopping),
            (ServiceState::Stopping | ServiceState::Stopped, LifecycleEvent::Drained)
            | (ServiceState::Polling | ServiceState::Stopping, LifecycleEvent::Fail) => {
                Some(ServiceState::Stopped)
            }
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(LifecycleError::InvalidTransition {
                service: self.service.clone(),
                from: self.state,
                event,
            });
        };

        if next_state != self.state {
            debug!(
                service = %self.service,
                ?self.state,
                ?next_state,
                ?event,
                "service lifecycle transition"
            );
            self.state = next_state;
        }

        Ok(self.state)
    }
}

/// Errors emitted by the lifecycle controller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Transition was not permitted from the current state.
    #[error("invalid lifecycle transition from {from:?} via {event:?} for service '{service}'")]
    InvalidTransition {
        /// Service whose transition failed.
        service: String,
        /// State prior to the attempted transition.
        from: ServiceState,
        /// Event that triggered the failure.
        event: LifecycleEvent,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
