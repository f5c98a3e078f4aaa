//! Tracing bootstrap for applications embedding the Inferable client.
//!
//! The client only emits `tracing` events; installing a subscriber is left to
//! the application. [`init_tracing`] installs a `fmt` subscriber filtered by
//! `RUST_LOG`, falling back to [`TelemetryConfig::default_filter`].

#![warn(missing_docs, clippy::pedantic)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,inferable=debug";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// Multi-line output with span context.
    Pretty,
}

/// Subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    default_filter: String,
    format: LogFormat,
    with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_FILTER.to_owned(),
            format: LogFormat::Compact,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Sets the directive used when `RUST_LOG` is unset.
    #[must_use]
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Controls whether the event target is printed.
    #[must_use]
    pub const fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Returns the fallback filter directive.
    #[must_use]
    pub fn default_filter(&self) -> &str {
        &self.default_filter
    }

    /// Returns the output format.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }

    fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_filter).map_err(|err| {
                TelemetryError::InvalidFilter {
                    filter: self.default_filter.clone(),
                    reason: err.to_string(),
                }
            }),
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The fallback filter directive did not parse.
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter {
        /// Rejected directive.
        filter: String,
        /// Parser error.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for a malformed fallback filter
/// and [`TelemetryError::Install`] if a subscriber is already set.
pub fn try_init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(config.with_target),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(config.with_target),
            )
            .try_init(),
    };

    installed.map_err(|err| TelemetryError::Install(err.to_string()))
}

/// Installs the global subscriber, ignoring the error if one already exists.
pub fn init_tracing(config: &TelemetryConfig) {
    if let Err(err) = try_init_tracing(config) {
        tracing::debug!(%err, "tracing subscriber not installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = TelemetryConfig::default()
            .with_default_filter("warn")
            .with_format(LogFormat::Pretty)
            .with_target(false);

        assert_eq!(config.default_filter(), "warn");
        assert_eq!(config.format(), LogFormat::Pretty);
        assert!(!config.with_target);
    }

    #[test]
    fn second_install_is_reported() {
        let config = TelemetryConfig::default();
        // Whichever test installs first wins; the second attempt must fail.
        let _ = try_init_tracing(&config);
        assert!(matches!(
            try_init_tracing(&config),
            Err(TelemetryError::Install(_))
        ));
        init_tracing(&config);
    }
}
