//! Runtime registry for function metadata, schemas and handlers.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use inferable_primitives::{FunctionConfig, validate_function_name, validate_service_name};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::dispatch::Outcome;
use crate::error::{FunctionError, FunctionResult};
use crate::schema::InputSchema;

/// Metadata describing a function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionMetadata {
    name: String,
    description: Option<String>,
    config: Option<FunctionConfig>,
}

impl FunctionMetadata {
    /// Creates metadata for the supplied function name.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::InvalidMetadata`] if the name is empty or
    /// contains unsupported characters.
    pub fn new(name: impl Into<String>) -> FunctionResult<Self> {
        let name = name.into();
        validate_function_name(&name)?;
        Ok(Self {
            name,
            description: None,
            config: None,
        })
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attaches configuration hints forwarded to the control plane.
    #[must_use]
    pub fn with_config(mut self, config: FunctionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the optional configuration.
    #[must_use]
    pub fn config(&self) -> Option<&FunctionConfig> {
        self.config.as_ref()
    }
}

/// Type-erased function body stored by the registry.
///
/// Implementations decode the raw JSON input into their own input type,
/// run, and classify the result.
pub trait Handler: Send + Sync {
    /// Invokes the function with raw JSON input.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::Decode`] when the input does not match the
    /// handler's input type and [`FunctionError::Encode`] when the returned
    /// value cannot be serialized. Failures reported by the function itself
    /// are an [`Outcome::Rejection`], not an error.
    fn call(&self, function: &str, input: Value) -> FunctionResult<Outcome>;
}

/// Wraps a typed closure so it can be stored behind `dyn Handler`.
struct TypedHandler<F, T, R, E> {
    handler: F,
    _phantom: PhantomData<fn(T) -> Result<R, E>>,
}

impl<F, T, R, E> TypedHandler<F, T, R, E> {
    fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, E> Handler for TypedHandler<F, T, R, E>
where
    F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
    T: DeserializeOwned,
    R: Serialize,
    E: fmt::Display,
{
    fn call(&self, function: &str, input: Value) -> FunctionResult<Outcome> {
        let input: T = serde_json::from_value(input).map_err(|err| FunctionError::Decode {
            function: function.to_owned(),
            reason: err.to_string(),
        })?;

        match (self.handler)(input) {
            Ok(value) => serde_json::to_value(&value)
                .map(Outcome::Resolution)
                .map_err(|err| FunctionError::Encode {
                    function: function.to_owned(),
                    reason: err.to_string(),
                }),
            Err(err) => Ok(Outcome::Rejection(err.to_string())),
        }
    }
}

/// A function ready to be registered: metadata, schema generator and
/// handler bound to one input type.
pub struct Function {
    metadata: FunctionMetadata,
    schema: fn(&str) -> FunctionResult<InputSchema>,
    handler: Arc<dyn Handler>,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl Function {
    /// Binds a fallible handler. `Err(e)` is reported as a rejection carrying
    /// `e.to_string()`.
    pub fn new<F, T, R, E>(metadata: FunctionMetadata, handler: F) -> Self
    where
        F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
        T: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        E: fmt::Display + 'static,
    {
        Self {
            metadata,
            schema: InputSchema::for_type::<T>,
            handler: Arc::new(TypedHandler::new(handler)),
        }
    }

    /// Binds a handler that always resolves.
    pub fn infallible<F, T, R>(metadata: FunctionMetadata, handler: F) -> Self
    where
        F: Fn(T) -> R + Send + Sync + 'static,
        T: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
    {
        Self::new(metadata, move |input: T| Ok::<R, Infallible>(handler(input)))
    }

    /// Returns the function metadata.
    #[must_use]
    pub fn metadata(&self) -> &FunctionMetadata {
        &self.metadata
    }
}

/// A function stored in the registry.
#[derive(Clone)]
pub struct RegisteredFunction {
    metadata: FunctionMetadata,
    schema: InputSchema,
    handler: Arc<dyn Handler>,
}

impl fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("metadata", &self.metadata)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl RegisteredFunction {
    /// Returns the associated metadata.
    #[must_use]
    pub fn metadata(&self) -> &FunctionMetadata {
        &self.metadata
    }

    /// Returns the generated input schema.
    #[must_use]
    pub fn schema(&self) -> &InputSchema {
        &self.schema
    }

    /// Executes the underlying handler.
    ///
    /// # Errors
    ///
    /// Propagates decode and encode failures from the handler.
    pub fn invoke(&self, input: Value) -> FunctionResult<Outcome> {
        self.handler.call(self.metadata.name(), input)
    }

    /// Returns a serializable description of this function.
    #[must_use]
    pub fn describe(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.metadata.name().to_owned(),
            description: self.metadata.description().map(str::to_owned),
            schema: self.schema.clone(),
            config: self.metadata.config().cloned(),
        }
    }
}

/// Serializable snapshot of a registered function.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionDescription {
    /// Function name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Generated input schema.
    pub schema: InputSchema,
    /// Optional configuration hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<FunctionConfig>,
}

/// Serializable snapshot of every function registered for one service.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServiceDescription {
    /// Service name.
    pub service: String,
    /// Functions sorted by name.
    pub functions: Vec<FunctionDescription>,
}

type ServiceTable = BTreeMap<String, BTreeMap<String, RegisteredFunction>>;

/// Registry of functions keyed by `(service, function)`.
#[derive(Default)]
pub struct FunctionRegistry {
    inner: RwLock<ServiceTable>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        let registered: BTreeMap<_, Vec<_>> = inner
            .iter()
            .map(|(service, functions)| (service.as_str(), functions.keys().collect()))
            .collect();
        f.debug_struct("FunctionRegistry")
            .field("registered", &registered)
            .finish()
    }
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, ServiceTable> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ServiceTable> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `service` known to the registry so it shows up in
    /// [`FunctionRegistry::describe_all`] before any function is registered.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::InvalidMetadata`] if the service name is
    /// invalid.
    pub fn add_service(&self, service: &str) -> FunctionResult<()> {
        validate_service_name(service)?;
        self.write().entry(service.to_owned()).or_default();
        Ok(())
    }

    /// Registers a function under `service`.
    ///
    /// Re-registering an existing name always fails, whatever the handler.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::DuplicateFunction`] if the name is taken, or
    /// any schema error produced for the function's input type.
    pub fn register(&self, service: &str, function: Function) -> FunctionResult<()> {
        validate_service_name(service)?;
        let Function {
            metadata,
            schema,
            handler,
        } = function;

        if self.contains(service, metadata.name()) {
            return Err(duplicate(service, metadata.name()));
        }

        let schema = schema(metadata.name())?;

        let mut inner = self.write();
        let functions = inner.entry(service.to_owned()).or_default();
        if functions.contains_key(metadata.name()) {
            return Err(duplicate(service, metadata.name()));
        }

        debug!(service, function = metadata.name(), "function registered");
        functions.insert(
            metadata.name().to_owned(),
            RegisteredFunction {
                metadata,
                schema,
                handler,
            },
        );
        Ok(())
    }

    /// Returns `true` if `(service, name)` is registered.
    #[must_use]
    pub fn contains(&self, service: &str, name: &str) -> bool {
        self.read()
            .get(service)
            .is_some_and(|functions| functions.contains_key(name))
    }

    /// Returns the function registered as `(service, name)`.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::NotFound`] when no such function exists.
    pub fn lookup(&self, service: &str, name: &str) -> FunctionResult<RegisteredFunction> {
        self.read()
            .get(service)
            .and_then(|functions| functions.get(name))
            .cloned()
            .ok_or_else(|| FunctionError::NotFound {
                service: service.to_owned(),
                name: name.to_owned(),
            })
    }

    /// Returns the number of functions registered for `service`.
    #[must_use]
    pub fn function_count(&self, service: &str) -> usize {
        self.read().get(service).map_or(0, BTreeMap::len)
    }

    /// Returns every known service name, sorted.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Describes the functions registered for `service`, sorted by name.
    #[must_use]
    pub fn describe(&self, service: &str) -> Vec<FunctionDescription> {
        self.read()
            .get(service)
            .map(|functions| functions.values().map(RegisteredFunction::describe).collect())
            .unwrap_or_default()
    }

    /// Describes every service, sorted by service name.
    #[must_use]
    pub fn describe_all(&self) -> Vec<ServiceDescription> {
        self.read()
            .iter()
            .map(|(service, functions)| ServiceDescription {
                service: service.clone(),
                functions: functions.values().map(RegisteredFunction::describe).collect(),
            })
            .collect()
    }
}

fn duplicate(service: &str, name: &str) -> FunctionError {
    FunctionError::DuplicateFunction {
        service: service.to_owned(),
        name: name.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    struct TestInput {
        a: i64,
        b: i64,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Item {
        g: i64,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct WithItems {
        items: Vec<Item>,
    }

    fn sum() -> Function {
        Function::infallible(
            FunctionMetadata::new("TestFunc")
                .unwrap()
                .with_description("Test function"),
            |input: TestInput| input.a + input.b,
        )
    }

    #[test]
    fn register_and_lookup() {
        let registry = FunctionRegistry::new();
        registry.register("TestService", sum()).unwrap();

        let function = registry.lookup("TestService", "TestFunc").unwrap();
        assert_eq!(function.metadata().description(), Some("Test function"));
        assert_eq!(
            function.invoke(json!({ "a": 2, "b": 3 })).unwrap(),
            Outcome::Resolution(json!(5))
        );
        assert_eq!(registry.function_count("TestService"), 1);
    }

    #[test]
    fn duplicate_registration_errors() {
        let registry = FunctionRegistry::new();
        registry.register("TestService", sum()).unwrap();

        let different_handler = Function::infallible(
            FunctionMetadata::new("TestFunc").unwrap(),
            |input: TestInput| input.a * input.b,
        );
        let err = registry
            .register("TestService", different_handler)
            .expect_err("duplicate registration should fail");

        assert!(matches!(
            err,
            FunctionError::DuplicateFunction { ref service, ref name }
                if service == "TestService" && name == "TestFunc"
        ));
        assert!(err.is_registration());

        // The same name under another service is a different record.
        registry.register("OtherService", sum()).unwrap();
    }

    #[test]
    fn schema_failure_is_not_stored() {
        let registry = FunctionRegistry::new();
        let err = registry
            .register(
                "svc",
                Function::infallible(FunctionMetadata::new("bad").unwrap(), |_: WithItems| 0),
            )
            .expect_err("$ref input must fail");

        assert!(matches!(err, FunctionError::UnsupportedReference { ref function } if function == "bad"));
        assert!(!registry.contains("svc", "bad"));
    }

    #[test]
    fn unknown_function_errors() {
        let registry = FunctionRegistry::new();
        let err = registry
            .lookup("default", "missing")
            .expect_err("unknown function should error");

        assert!(matches!(err, FunctionError::NotFound { name, .. } if name == "missing"));
    }

    #[test]
    fn invalid_metadata_errors() {
        let err = FunctionMetadata::new("").expect_err("empty name should error");
        assert!(matches!(err, FunctionError::InvalidMetadata(_)));

        let registry = FunctionRegistry::new();
        assert!(registry.add_service("bad service").is_err());
    }

    #[test]
    fn describe_all_lists_empty_services() {
        let registry = FunctionRegistry::new();
        registry.add_service("default").unwrap();
        registry.register("TestService", sum()).unwrap();

        let described = serde_json::to_value(registry.describe_all()).unwrap();
        assert_eq!(described[0]["service"], "TestService");
        assert_eq!(described[1]["service"], "default");
        assert_eq!(described[1]["functions"], json!([]));

        let function = &described[0]["functions"][0];
        assert_eq!(function["name"], "TestFunc");
        assert_eq!(function["description"], "Test function");
        assert_eq!(function["schema"]["required"], json!(["a", "b"]));
        assert!(function.get("config").is_none());
        assert_eq!(registry.services(), vec!["TestService", "default"]);
    }

    #[test]
    fn decode_failure_is_reported() {
        let registry = FunctionRegistry::new();
        registry.register("svc", sum()).unwrap();

        let err = registry
            .lookup("svc", "TestFunc")
            .unwrap()
            .invoke(json!({ "a": "two" }))
            .expect_err("bad input should fail");
        assert!(matches!(err, FunctionError::Decode { ref function, .. } if function == "TestFunc"));
    }
}
