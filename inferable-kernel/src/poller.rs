//! Poll loop that fetches pending calls, dispatches them and reports results.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use inferable_functions::{Dispatcher, FunctionError};
use inferable_primitives::{CallMessage, ResultEnvelope};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::spawn_blocking;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::control_plane::{ControlPlane, ControlPlaneError};
use crate::lifecycle::{Lifecycle, LifecycleEvent};

/// Tuning for a service's poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    page_size: NonZeroUsize,
    initial_backoff: Duration,
    max_consecutive_failures: NonZeroUsize,
}

impl PollConfig {
    /// Creates a new configuration.
    #[must_use]
    pub const fn new(
        page_size: NonZeroUsize,
        initial_backoff: Duration,
        max_consecutive_failures: NonZeroUsize,
    ) -> Self {
        Self {
            page_size,
            initial_backoff,
            max_consecutive_failures,
        }
    }

    /// Returns the maximum number of calls fetched per cycle.
    #[must_use]
    pub const fn page_size(self) -> NonZeroUsize {
        self.page_size
    }

    /// Returns the wait before the first poll when the handshake does not
    /// request one.
    #[must_use]
    pub const fn initial_backoff(self) -> Duration {
        self.initial_backoff
    }

    /// Returns how many fetch failures in a row are tolerated.
    #[must_use]
    pub const fn max_consecutive_failures(self) -> NonZeroUsize {
        self.max_consecutive_failures
    }

    /// Overrides the initial backoff.
    #[must_use]
    pub const fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Overrides the failure limit.
    #[must_use]
    pub const fn with_max_consecutive_failures(mut self, limit: NonZeroUsize) -> Self {
        self.max_consecutive_failures = limit;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::InvalidConfig`] when the initial backoff is zero.
    pub fn validate(self) -> PollResult<()> {
        if self.initial_backoff.is_zero() {
            return Err(PollError::InvalidConfig(
                "initial backoff must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            page_size: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
            initial_backoff: Duration::from_secs(1),
            max_consecutive_failures: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Result alias for poll operations.
pub type PollResult<T> = Result<T, PollError>;

/// Errors produced by one poll cycle.
#[derive(Debug, Error)]
pub enum PollError {
    /// Poll configuration was invalid.
    #[error("invalid poll configuration: {0}")]
    InvalidConfig(&'static str),

    /// Pending calls could not be fetched.
    #[error("failed to poll calls: {0}")]
    Fetch(#[source] ControlPlaneError),

    /// Some calls in the batch could not be handled.
    #[error("failed to handle {} of {handled} call(s): {}", .failures.len(), summarize(.failures))]
    Messages {
        /// Number of calls in the batch.
        handled: usize,
        /// One entry per failed call.
        failures: Vec<MessageFailure>,
    },
}

fn summarize(failures: &[MessageFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure handling one call message.
#[derive(Debug, Error)]
pub enum MessageFailure {
    /// The call could not be dispatched.
    #[error("call {call_id}: {source}")]
    Dispatch {
        /// Call identifier.
        call_id: String,
        /// Dispatcher error.
        #[source]
        source: FunctionError,
    },

    /// The handler panicked or its task was cancelled.
    #[error("call {call_id}: handler aborted: {reason}")]
    Aborted {
        /// Call identifier.
        call_id: String,
        /// Join error reported by the runtime.
        reason: String,
    },

    /// The result could not be reported.
    #[error("call {call_id}: {source}")]
    Persist {
        /// Call identifier.
        call_id: String,
        /// Control-plane error.
        #[source]
        source: ControlPlaneError,
    },
}

impl MessageFailure {
    /// Returns the identifier of the failed call.
    #[must_use]
    pub fn call_id(&self) -> &str {
        match self {
            Self::Dispatch { call_id, .. }
            | Self::Aborted { call_id, .. }
            | Self::Persist { call_id, .. } => call_id,
        }
    }
}

/// Summary of a completed poll cycle.
#[derive(Debug)]
pub struct PollCycle {
    /// Server-requested delay before the next poll.
    pub retry_after: Option<Duration>,
    /// Number of calls in the batch.
    pub handled: usize,
    /// Calls that could not be handled.
    pub failures: Vec<MessageFailure>,
}

impl PollCycle {
    /// Converts per-message failures into a single error.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Messages`] if any call failed.
    pub fn into_result(self) -> PollResult<usize> {
        if self.failures.is_empty() {
            Ok(self.handled)
        } else {
            Err(PollError::Messages {
                handled: self.handled,
                failures: self.failures,
            })
        }
    }
}

/// Everything one service's poll loop needs.
#[derive(Debug, Clone)]
pub struct Poller {
    service: String,
    cluster_id: String,
    control_plane: ControlPlane,
    dispatcher: Dispatcher,
    config: PollConfig,
}

impl Poller {
    /// Creates a poller for `service` in `cluster_id`.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        cluster_id: impl Into<String>,
        control_plane: ControlPlane,
        dispatcher: Dispatcher,
        config: PollConfig,
    ) -> Self {
        Self {
            service: service.into(),
            cluster_id: cluster_id.into(),
            control_plane,
            dispatcher,
            config,
        }
    }

    /// Runs one fetch/dispatch/persist cycle.
    ///
    /// Every message in the batch is handled, in order, even when an earlier
    /// one fails.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Fetch`] when the batch could not be fetched.
    /// Per-message failures are reported in the returned [`PollCycle`].
    pub async fn poll_once(&self) -> PollResult<PollCycle> {
        let batch = self
            .control_plane
            .fetch_calls(&self.cluster_id, &self.service, self.config.page_size.get())
            .await
            .map_err(PollError::Fetch)?;

        let handled = batch.calls.len();
        let mut failures = Vec::new();

        for call in &batch.calls {
            let envelope = match self.dispatch(call).await {
                Ok(envelope) => envelope,
                Err(failure) => {
                    failures.push(failure);
                    continue;
                }
            };

            if let Err(source) = self
                .control_plane
                .persist_result(&self.cluster_id, &call.id, &envelope)
                .await
            {
                failures.push(MessageFailure::Persist {
                    call_id: call.id.clone(),
                    source,
                });
            }
        }

        if handled > 0 {
            debug!(service = %self.service, handled, failed = failures.len(), "poll cycle complete");
        }

        Ok(PollCycle {
            retry_after: batch.retry_after,
            handled,
            failures,
        })
    }

    // Handlers are synchronous; they run on the blocking pool so a slow one
    // only holds up this service's loop.
    async fn dispatch(&self, call: &CallMessage) -> Result<ResultEnvelope, MessageFailure> {
        let dispatcher = self.dispatcher.clone();
        let service = self.service.clone();
        let message = call.clone();

        match spawn_blocking(move || dispatcher.handle(&service, &message)).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(source)) => Err(MessageFailure::Dispatch {
                call_id: call.id.clone(),
                source,
            }),
            Err(err) => Err(MessageFailure::Aborted {
                call_id: call.id.clone(),
                reason: err.to_string(),
            }),
        }
    }
}

/// Why a poll loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Cancellation was requested.
    Cancelled,
    /// Too many fetches failed in a row.
    TooManyFailures(usize),
}

/// Runs the poll loop until cancelled or the failure limit is exceeded.
///
/// Each iteration waits the current backoff, which any `Retry-After` header
/// replaces, then runs one cycle. The wait is interrupted as soon as
/// `shutdown` flips to `true` or its sender is dropped.
pub async fn run_poll_loop(
    poller: Poller,
    initial_backoff: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> LoopExit {
    let service = poller.service.as_str();
    let max_failures = poller.config.max_consecutive_failures.get();
    let mut backoff = initial_backoff;
    let mut failures: usize = 0;

    info!(service, cluster_id = %poller.cluster_id, "service polling for calls");

    loop {
        if *shutdown.borrow() {
            return LoopExit::Cancelled;
        }

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return LoopExit::Cancelled;
                }
                continue;
            }
            () = sleep(backoff) => {}
        }

        match poller.poll_once().await {
            Ok(cycle) => {
                failures = 0;
                if let Some(retry_after) = cycle.retry_after {
                    backoff = retry_after;
                }
                if let Err(err) = cycle.into_result() {
                    warn!(service, %err, "poll cycle completed with failures");
                }
            }
            Err(err) => {
                failures += 1;
                warn!(service, %err, failures, "failed to poll");
                if failures > max_failures {
                    warn!(service, failures, "too many consecutive poll failures; stopping service");
                    return LoopExit::TooManyFailures(failures);
                }
            }
        }
    }
}

/// Spawned wrapper around [`run_poll_loop`] that records a self-stop in the
/// service lifecycle.
pub(crate) async fn drive_poll_loop(
    poller: Poller,
    initial_backoff: Duration,
    shutdown: watch::Receiver<bool>,
    lifecycle: Arc<Mutex<Lifecycle>>,
) -> LoopExit {
    let exit = run_poll_loop(poller, initial_backoff, shutdown).await;
    if matches!(exit, LoopExit::TooManyFailures(_)) {
        let mut lifecycle = lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = lifecycle.transition(LifecycleEvent::Fail) {
            warn!(?err, "failed to record poll loop exit");
        }
    }
    exit
}
