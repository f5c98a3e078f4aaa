//! Wire-level structures exchanged with the control plane.

use inferable_functions::FunctionDescription;
use inferable_primitives::FunctionConfig;
use serde::{Deserialize, Serialize};

/// Machine registration payload announcing one service and its functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterMachineRequest {
    /// Service being announced.
    pub service: String,
    /// Functions exposed by the service.
    pub functions: Vec<FunctionRegistration>,
}

impl RegisterMachineRequest {
    /// Builds the payload from registry descriptions.
    #[must_use]
    pub fn new(service: impl Into<String>, functions: &[FunctionDescription]) -> Self {
        Self {
            service: service.into(),
            functions: functions.iter().map(FunctionRegistration::from).collect(),
        }
    }
}

/// One function entry in [`RegisterMachineRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRegistration {
    /// Function name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input schema encoded as a JSON string.
    pub schema: String,
    /// Optional configuration hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<FunctionConfig>,
}

impl From<&FunctionDescription> for FunctionRegistration {
    fn from(description: &FunctionDescription) -> Self {
        Self {
            name: description.name.clone(),
            description: description.description.clone(),
            schema: description.schema.to_json_string(),
            config: description.config.clone(),
        }
    }
}

/// Machine registration acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMachineResponse {
    /// Cluster the machine was admitted to.
    pub cluster_id: String,
}

/// Liveness probe answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveResponse {
    /// `"ok"` when the control plane is healthy.
    pub status: String,
}

/// Heartbeat payload listing the services this machine hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    /// Service names.
    pub services: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use inferable_functions::InputSchema;
    use serde_json::json;

    #[test]
    fn registration_carries_schema_as_string() {
        let description = FunctionDescription {
            name: "reverse".to_owned(),
            description: None,
            schema: InputSchema::from_value(
                "reverse",
                json!({ "type": "object", "properties": { "message": { "type": "string" } } }),
            )
            .unwrap(),
            config: Some(FunctionConfig::new().with_timeout_seconds(5)),
        };

        let payload = serde_json::to_value(RegisterMachineRequest::new("default", &[description]))
            .unwrap();

        assert_eq!(payload["service"], "default");
        let function = &payload["functions"][0];
        assert_eq!(function["name"], "reverse");
        assert!(function.get("description").is_none());
        assert_eq!(function["config"], json!({ "timeoutSeconds": 5 }));

        let schema: serde_json::Value =
            serde_json::from_str(function["schema"].as_str().unwrap()).unwrap();
        assert_eq!(schema["properties"]["message"]["type"], "string");
    }

    #[test]
    fn registration_response_reads_cluster_id() {
        let response: RegisterMachineResponse =
            serde_json::from_value(json!({ "clusterId": "c-123" })).unwrap();
        assert_eq!(response.cluster_id, "c-123");
    }
}
