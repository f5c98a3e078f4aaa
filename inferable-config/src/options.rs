//! Client options and their defaults.

use std::fmt;
use std::time::Duration;

use inferable_primitives::MachineId;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{ConfigError, ConfigResult};

/// Endpoint used when none is configured.
pub const DEFAULT_API_ENDPOINT: &str = "https://api.inferable.ai";

/// Environment variable holding the API endpoint.
pub const ENV_API_ENDPOINT: &str = "INFERABLE_API_ENDPOINT";
/// Environment variable holding the API secret.
pub const ENV_API_SECRET: &str = "INFERABLE_API_SECRET";
/// Environment variable holding an explicit machine id.
pub const ENV_MACHINE_ID: &str = "INFERABLE_MACHINE_ID";

/// Options accepted by the client constructor.
///
/// Durations are stored in milliseconds so the options can be loaded from
/// JSON with [`ClientOptions::from_json`].
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientOptions {
    api_endpoint: String,
    api_secret: String,
    machine_id: Option<String>,
    request_timeout_ms: u64,
    poll_page_size: usize,
    initial_poll_backoff_ms: u64,
    max_consecutive_poll_failures: usize,
    heartbeat_interval_ms: u64,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("api_endpoint", &self.api_endpoint)
            .field("machine_id", &self.machine_id)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("poll_page_size", &self.poll_page_size)
            .field("initial_poll_backoff_ms", &self.initial_poll_backoff_ms)
            .field("max_consecutive_poll_failures", &self.max_consecutive_poll_failures)
            .field("heartbeat_interval_ms", &self.heartbeat_interval_ms)
            .finish_non_exhaustive()
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.to_owned(),
            api_secret: String::new(),
            machine_id: None,
            request_timeout_ms: 30_000,
            poll_page_size: 10,
            initial_poll_backoff_ms: 1_000,
            max_consecutive_poll_failures: 50,
            heartbeat_interval_ms: 10_000,
        }
    }
}

impl ClientOptions {
    /// Creates options for the given secret with every other value defaulted.
    #[must_use]
    pub fn new(api_secret: impl Into<String>) -> Self {
        Self {
            api_secret: api_secret.into(),
            ..Self::default()
        }
    }

    /// Loads options from the process environment.
    ///
    /// Unset variables keep their defaults. The result is not validated.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads options from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut options = Self::default();
        if let Some(endpoint) = present(ENV_API_ENDPOINT) {
            options.api_endpoint = endpoint;
        }
        if let Some(secret) = present(ENV_API_SECRET) {
            options.api_secret = secret;
        }
        options.machine_id = present(ENV_MACHINE_ID);
        debug!(endpoint = %options.api_endpoint, "client options loaded from environment");
        options
    }

    /// Parses options from a JSON document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = endpoint.into();
        self
    }

    /// Sets the API secret.
    #[must_use]
    pub fn with_api_secret(mut self, secret: impl Into<String>) -> Self {
        self.api_secret = secret.into();
        self
    }

    /// Pins the machine id instead of deriving it from the host.
    #[must_use]
    pub fn with_machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets how many calls are fetched per poll.
    #[must_use]
    pub fn with_poll_page_size(mut self, page_size: usize) -> Self {
        self.poll_page_size = page_size;
        self
    }

    /// Sets the wait before the first poll.
    #[must_use]
    pub fn with_initial_poll_backoff(mut self, backoff: Duration) -> Self {
        self.initial_poll_backoff_ms = duration_ms(backoff);
        self
    }

    /// Sets how many poll failures in a row stop a service.
    #[must_use]
    pub fn with_max_consecutive_poll_failures(mut self, limit: usize) -> Self {
        self.max_consecutive_poll_failures = limit;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = duration_ms(interval);
        self
    }

    /// Returns the API endpoint.
    #[must_use]
    pub fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }

    /// Returns the API secret.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Returns the explicit machine id, if any.
    #[must_use]
    pub fn machine_id(&self) -> Option<&str> {
        self.machine_id.as_deref()
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the poll page size.
    #[must_use]
    pub fn poll_page_size(&self) -> usize {
        self.poll_page_size
    }

    /// Returns the wait before the first poll.
    #[must_use]
    pub fn initial_poll_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_poll_backoff_ms)
    }

    /// Returns the poll failure limit.
    #[must_use]
    pub fn max_consecutive_poll_failures(&self) -> usize {
        self.max_consecutive_poll_failures
    }

    /// Returns the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Resolves the machine id: the explicit one if set, otherwise the id
    /// derived from this host.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMachineId`] if the explicit id is invalid.
    pub fn resolve_machine_id(&self) -> ConfigResult<MachineId> {
        match &self.machine_id {
            Some(id) => Ok(MachineId::new(id.clone())?),
            None => Ok(MachineId::derive()),
        }
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: a missing secret, a malformed
    /// endpoint, an invalid machine id or a zero-valued limit.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.api_secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        validate_endpoint(&self.api_endpoint)?;
        if let Some(id) = &self.machine_id {
            MachineId::new(id.clone())?;
        }
        if self.request_timeout_ms == 0 {
            return Err(zero("requestTimeoutMs"));
        }
        if self.poll_page_size == 0 {
            return Err(zero("pollPageSize"));
        }
        if self.initial_poll_backoff_ms == 0 {
            return Err(zero("initialPollBackoffMs"));
        }
        if self.max_consecutive_poll_failures == 0 {
            return Err(zero("maxConsecutivePollFailures"));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(zero("heartbeatIntervalMs"));
        }
        Ok(())
    }
}

fn zero(field: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: "must be greater than zero",
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn validate_endpoint(endpoint: &str) -> ConfigResult<()> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        reason,
    };

    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(invalid("endpoint must start with http:// or https://".to_owned()));
    }
    Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = ClientOptions::new("secret");
        assert_eq!(options.api_endpoint(), DEFAULT_API_ENDPOINT);
        assert_eq!(options.request_timeout(), Duration::from_secs(30));
        assert_eq!(options.poll_page_size(), 10);
        assert_eq!(options.initial_poll_backoff(), Duration::from_secs(1));
        assert_eq!(options.max_consecutive_poll_failures(), 50);
        assert_eq!(options.heartbeat_interval(), Duration::from_secs(10));
        options.validate().unwrap();
    }

    #[test]
    fn environment_overrides_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_API_ENDPOINT, "http://localhost:4000"),
            (ENV_API_SECRET, "sk_test"),
            (ENV_MACHINE_ID, ""),
        ]);
        let options = ClientOptions::from_lookup(|key| vars.get(key).map(|v| (*v).to_owned()));

        assert_eq!(options.api_endpoint(), "http://localhost:4000");
        assert_eq!(options.api_secret(), "sk_test");
        assert_eq!(options.machine_id(), None);
    }

    #[test]
    fn json_keeps_defaults_for_missing_keys() {
        let options = ClientOptions::from_json(
            r#"{ "apiSecret": "s", "machineId": "worker-1", "pollPageSize": 25 }"#,
        )
        .unwrap();
        assert_eq!(options.poll_page_size(), 25);
        assert_eq!(options.machine_id(), Some("worker-1"));
        assert_eq!(options.api_endpoint(), DEFAULT_API_ENDPOINT);

        assert!(matches!(
            ClientOptions::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(matches!(
            ClientOptions::default().validate(),
            Err(ConfigError::MissingSecret)
        ));
        assert!(matches!(
            ClientOptions::new("s").with_api_endpoint("api.inferable.ai").validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            ClientOptions::new("s").with_machine_id("has space").validate(),
            Err(ConfigError::InvalidMachineId(_))
        ));
        assert!(matches!(
            ClientOptions::new("s").with_poll_page_size(0).validate(),
            Err(ConfigError::InvalidValue { field: "pollPageSize", .. })
        ));
    }

    #[test]
    fn machine_id_resolution() {
        let explicit = ClientOptions::new("s").with_machine_id("worker-1");
        assert_eq!(explicit.resolve_machine_id().unwrap().as_str(), "worker-1");

        let derived = ClientOptions::new("s").resolve_machine_id().unwrap();
        assert_eq!(derived, MachineId::derive());
        assert_ne!(derived.as_str(), "worker-1");
    }

    #[test]
    fn debug_hides_secret() {
        let options = ClientOptions::new("top-secret");
        assert!(!format!("{options:?}").contains("top-secret"));
    }
}
