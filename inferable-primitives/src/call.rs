//! Call messages received from the control plane and the results sent back.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A unit of work issued by the control plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallMessage {
    /// Server-issued opaque identifier.
    pub id: String,
    /// Name of the target function.
    pub function: String,
    /// Raw JSON input for the function.
    #[serde(default)]
    pub input: Value,
}

impl CallMessage {
    /// Creates a call message.
    #[must_use]
    pub fn new(id: impl Into<String>, function: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            function: function.into(),
            input,
        }
    }
}

/// Outcome kind of a handled call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    /// The handler succeeded.
    Resolution,
    /// The handler reported a failure.
    Rejection,
}

/// Execution metadata attached to a result.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    /// Wall-clock execution time of the handler in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_execution_time: Option<u64>,
}

/// Normalized result persisted for a call message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    /// Success payload or stringified error.
    pub result: Value,
    /// Whether the call resolved or was rejected.
    pub result_type: ResultType,
    /// Execution metadata.
    #[serde(default)]
    pub meta: ResultMeta,
}

impl ResultEnvelope {
    /// Creates a resolution carrying the supplied payload.
    #[must_use]
    pub fn resolution(result: Value, elapsed: Duration) -> Self {
        Self::with_type(result, ResultType::Resolution, elapsed)
    }

    /// Creates a rejection carrying the supplied error description.
    #[must_use]
    pub fn rejection(reason: impl Into<String>, elapsed: Duration) -> Self {
        Self::with_type(Value::String(reason.into()), ResultType::Rejection, elapsed)
    }

    fn with_type(result: Value, result_type: ResultType, elapsed: Duration) -> Self {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        Self {
            result,
            result_type,
            meta: ResultMeta {
                function_execution_time: Some(millis),
            },
        }
    }

    /// Returns `true` if the call resolved.
    #[must_use]
    pub fn is_resolution(&self) -> bool {
        self.result_type == ResultType::Resolution
    }
}
