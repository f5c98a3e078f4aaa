//! Periodic heartbeat announcing the services hosted by this machine.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::control_plane::ControlPlane;

/// Heartbeat tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    interval: Duration,
}

impl HeartbeatConfig {
    /// Creates a configuration with the given ping interval.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Returns the ping interval.
    #[must_use]
    pub const fn interval(self) -> Duration {
        self.interval
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Pings the control plane every interval until `shutdown` fires.
///
/// The first ping goes out immediately. Failures are logged and never end the
/// loop. Zero intervals are clamped to one millisecond.
pub async fn run_heartbeat_loop<F>(
    control_plane: ControlPlane,
    config: HeartbeatConfig,
    services: F,
    mut shutdown: watch::Receiver<bool>,
) where
    F: Fn() -> Vec<String> + Send + Sync,
{
    let period = config.interval().max(Duration::from_millis(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = interval.tick() => {}
        }

        let names = services();
        match control_plane.ping(names).await {
            Ok(()) => debug!("heartbeat sent"),
            Err(err) => warn!(%err, "heartbeat failure"),
        }
    }
}

/// Owns a spawned heartbeat task.
#[derive(Debug)]
pub struct Heartbeat {
    shutdown: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Spawns the heartbeat on the current tokio runtime.
    #[must_use]
    pub fn spawn<F>(control_plane: ControlPlane, config: HeartbeatConfig, services: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        let (shutdown, rx) = watch::channel(false);
        let worker = tokio::spawn(run_heartbeat_loop(control_plane, config, services, rx));
        Self {
            shutdown,
            worker: Some(worker),
        }
    }

    /// Stops the heartbeat and waits for the task to exit.
    pub async fn stop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                warn!(?err, "heartbeat task ended abnormally");
            }
        }
    }

    /// Returns `true` while the task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use hyper::Method;
    use inferable_primitives::MachineId;
    use inferable_transport::TransportError;
    use serde_json::{Value, json};

    use crate::testing::MockTransport;

    fn control_plane(transport: &Arc<MockTransport>) -> ControlPlane {
        ControlPlane::new(transport.clone(), MachineId::new("rs-test").unwrap())
    }

    #[tokio::test]
    async fn pings_immediately_with_service_names() {
        let transport = MockTransport::new();
        transport.on_json(Method::POST, "/v2/ping", json!({}));

        let mut heartbeat = Heartbeat::spawn(
            control_plane(&transport),
            HeartbeatConfig::new(Duration::from_secs(60)),
            || vec!["default".to_owned(), "math".to_owned()],
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(heartbeat.is_running());
        heartbeat.stop().await;
        assert!(!heartbeat.is_running());

        let pings = transport.requests_to(&Method::POST, "/v2/ping");
        assert_eq!(pings.len(), 1);
        assert_eq!(pings[0].header("X-Machine-ID"), Some("rs-test"));
        let body: Value = serde_json::from_slice(pings[0].body().unwrap()).unwrap();
        assert_eq!(body, json!({ "services": ["default", "math"] }));
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_heartbeat() {
        let transport = MockTransport::new();
        transport.on(Method::POST, "/v2/ping", |_| {
            Err(TransportError::transport("connection refused"))
        });

        let mut heartbeat = Heartbeat::spawn(
            control_plane(&transport),
            HeartbeatConfig::new(Duration::from_millis(10)),
            Vec::new,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(heartbeat.is_running());
        heartbeat.stop().await;

        assert!(transport.requests_to(&Method::POST, "/v2/ping").len() >= 2);
    }
}
