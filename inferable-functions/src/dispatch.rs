//! Routing of inbound calls to registered handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use inferable_primitives::{CallMessage, ResultEnvelope, ResultType};
use serde_json::Value;
use tracing::debug;

use crate::error::FunctionResult;
use crate::registry::FunctionRegistry;

/// Classified result of running a handler.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The handler returned a value.
    Resolution(Value),
    /// The handler reported a failure with the given message.
    Rejection(String),
}

impl Outcome {
    /// Returns the wire classification of this outcome.
    #[must_use]
    pub const fn result_type(&self) -> ResultType {
        match self {
            Self::Resolution(_) => ResultType::Resolution,
            Self::Rejection(_) => ResultType::Rejection,
        }
    }

    /// Wraps the outcome in a result envelope.
    #[must_use]
    pub fn into_envelope(self, elapsed: Duration) -> ResultEnvelope {
        match self {
            Self::Resolution(value) => ResultEnvelope::resolution(value, elapsed),
            Self::Rejection(message) => ResultEnvelope::rejection(message, elapsed),
        }
    }
}

/// Routes calls by `(service, function)` to the shared registry.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<FunctionRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry this dispatcher reads from.
    #[must_use]
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Invokes `function` in `service` with raw JSON input.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FunctionError::NotFound`] for unknown functions and
    /// propagates decode/encode failures.
    pub fn invoke(&self, service: &str, function: &str, input: Value) -> FunctionResult<Outcome> {
        self.registry.lookup(service, function)?.invoke(input)
    }

    /// Handles one call message and times the handler.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::invoke`]. Handler rejections are returned as a
    /// rejection envelope, not an error.
    pub fn handle(&self, service: &str, call: &CallMessage) -> FunctionResult<ResultEnvelope> {
        let function = self.registry.lookup(service, &call.function)?;

        let started = Instant::now();
        let outcome = function.invoke(call.input.clone())?;
        let elapsed = started.elapsed();

        debug!(
            service,
            call_id = %call.id,
            function = %call.function,
            result_type = ?outcome.result_type(),
            elapsed_ms = elapsed.as_millis(),
            "call handled"
        );
        Ok(outcome.into_envelope(elapsed))
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::FunctionError;
    use crate::registry::{Function, FunctionMetadata};

    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "PascalCase")]
    struct EchoInput {
        input: String,
    }

    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "PascalCase")]
    struct ReverseInput {
        input: String,
    }

    #[derive(Deserialize, JsonSchema)]
    struct DivideInput {
        a: f64,
        b: f64,
    }

    #[derive(Debug)]
    struct DivideByZero;

    impl fmt::Display for DivideByZero {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("cannot divide by zero")
        }
    }

    fn dispatcher() -> Dispatcher {
        let registry = Arc::new(FunctionRegistry::new());
        registry
            .register(
                "default",
                Function::infallible(FunctionMetadata::new("echo").unwrap(), |input: EchoInput| {
                    input.input
                }),
            )
            .unwrap();
        registry
            .register(
                "default",
                Function::infallible(
                    FunctionMetadata::new("reverse").unwrap(),
                    |input: ReverseInput| input.input.chars().rev().collect::<String>(),
                ),
            )
            .unwrap();
        registry
            .register(
                "math",
                Function::new(FunctionMetadata::new("divide").unwrap(), |input: DivideInput| {
                    if input.b == 0.0 {
                        Err(DivideByZero)
                    } else {
                        Ok(input.a / input.b)
                    }
                }),
            )
            .unwrap();
        Dispatcher::new(registry)
    }

    #[test]
    fn echo_returns_its_input_field() {
        let outcome = dispatcher()
            .invoke("default", "echo", json!({ "Input": "hello" }))
            .unwrap();
        assert_eq!(outcome, Outcome::Resolution(json!("hello")));

        let Outcome::Resolution(payload) = outcome else {
            panic!("echo resolves");
        };
        assert_eq!(serde_json::from_value::<String>(payload).unwrap(), "hello");
    }

    #[test]
    fn reverse_scenario() {
        let envelope = dispatcher()
            .handle(
                "default",
                &CallMessage::new("c1", "reverse", json!({ "Input": "Hello, Inferable!" })),
            )
            .unwrap();
        assert!(envelope.is_resolution());
        assert_eq!(envelope.result, json!("!elbarefnI ,olleH"));
        assert!(envelope.meta.function_execution_time.is_some());
    }

    #[test]
    fn handler_errors_become_rejections() {
        let dispatcher = dispatcher();

        let ok = dispatcher
            .handle("math", &CallMessage::new("c1", "divide", json!({ "a": 9, "b": 3 })))
            .unwrap();
        assert_eq!(ok.result_type, ResultType::Resolution);
        assert_eq!(ok.result, json!(3.0));

        let rejected = dispatcher
            .handle("math", &CallMessage::new("c2", "divide", json!({ "a": 1, "b": 0 })))
            .unwrap();
        assert_eq!(rejected.result_type, ResultType::Rejection);
        assert_eq!(rejected.result, json!("cannot divide by zero"));
    }

    #[test]
    fn unknown_function_is_not_found() {
        let err = dispatcher()
            .handle("default", &CallMessage::new("c1", "missing", json!({})))
            .expect_err("missing function");
        assert!(matches!(err, FunctionError::NotFound { ref name, .. } if name == "missing"));

        // Functions are scoped to their service.
        assert!(dispatcher().invoke("default", "divide", json!({ "a": 1, "b": 1 })).is_err());
    }

    #[test]
    fn malformed_input_is_decode_error() {
        let err = dispatcher()
            .invoke("default", "reverse", json!({ "Message": 1 }))
            .expect_err("bad input");
        assert!(matches!(err, FunctionError::Decode { .. }));
    }
}
