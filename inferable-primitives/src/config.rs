//! Per-function configuration hints interpreted by the control plane.

use serde::{Deserialize, Serialize};

/// Result caching hint for a function.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// JSON path into the input used as the cache key.
    pub key_path: String,
    /// How long cached results stay valid.
    pub ttl_seconds: u64,
}

/// Opaque configuration bag attached to a registered function.
///
/// The client never interprets these values; they are forwarded verbatim in
/// the machine registration payload.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache: Option<CacheConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_count_on_stall: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requires_approval: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private: Option<bool>,
}

impl FunctionConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the caching hint.
    #[must_use]
    pub fn with_cache(mut self, key_path: impl Into<String>, ttl_seconds: u64) -> Self {
        self.cache = Some(CacheConfig {
            key_path: key_path.into(),
            ttl_seconds,
        });
        self
    }

    /// Sets the execution timeout enforced by the control plane.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Sets how many times a stalled call is re-issued.
    #[must_use]
    pub fn with_retry_count_on_stall(mut self, retries: u32) -> Self {
        self.retry_count_on_stall = Some(retries);
        self
    }

    /// Marks the function as requiring human approval before execution.
    #[must_use]
    pub fn with_requires_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = Some(requires_approval);
        self
    }

    /// Hides the function from discovery by other clients.
    #[must_use]
    pub fn with_private(mut self, private: bool) -> Self {
        self.private = Some(private);
        self
    }

    /// Returns the caching hint.
    #[must_use]
    pub fn cache(&self) -> Option<&CacheConfig> {
        self.cache.as_ref()
    }

    /// Returns the execution timeout.
    #[must_use]
    pub const fn timeout_seconds(&self) -> Option<u64> {
        self.timeout_seconds
    }

    /// Returns the stall retry count.
    #[must_use]
    pub const fn retry_count_on_stall(&self) -> Option<u32> {
        self.retry_count_on_stall
    }

    /// Returns the approval flag.
    #[must_use]
    pub const fn requires_approval(&self) -> Option<bool> {
        self.requires_approval
    }

    /// Returns the private flag.
    #[must_use]
    pub const fn private(&self) -> Option<bool> {
        self.private
    }
}
