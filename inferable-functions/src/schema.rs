//! Input schema generation for registered functions.
//!
//! Schemas are produced with `schemars` from the handler's input type and then
//! normalized into a self-contained JSON object schema. Nested types that
//! `schemars` would emit as `$ref` definitions are rejected: the control plane
//! receives the schema as an opaque string and has no way to resolve
//! references. A nested record is accepted only when its `JsonSchema` impl
//! inlines itself (`inline_schema() == true`).

use schemars::JsonSchema;
use schemars::generate::SchemaSettings;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{FunctionError, FunctionResult};

/// Keys removed from the root of every generated schema.
const STRIPPED_ROOT_KEYS: [&str; 5] = [
    "$schema",
    "title",
    "$defs",
    "definitions",
    "additionalProperties",
];

/// Self-contained JSON schema describing a function's input record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct InputSchema(Value);

impl InputSchema {
    /// Generates the schema for `T`, attributing failures to `function`.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::UnsupportedInput`] if `T` is not a record,
    /// [`FunctionError::UnsupportedReference`] if the schema needs external
    /// definitions, or [`FunctionError::Schema`] if encoding fails.
    pub fn for_type<T>(function: &str) -> FunctionResult<Self>
    where
        T: JsonSchema + ?Sized,
    {
        let generator = SchemaSettings::draft2020_12().into_generator();
        let schema = generator.into_root_schema_for::<T>();
        let value = serde_json::to_value(&schema).map_err(|err| FunctionError::Schema {
            function: function.to_owned(),
            reason: err.to_string(),
        })?;
        Self::from_value(function, value)
    }

    /// Validates and normalizes an already generated schema.
    ///
    /// # Errors
    ///
    /// Same as [`InputSchema::for_type`].
    pub fn from_value(function: &str, value: Value) -> FunctionResult<Self> {
        let Value::Object(mut root) = value else {
            return Err(unsupported(function, "schema is not an object schema"));
        };

        if root.get("type").and_then(Value::as_str) != Some("object") {
            let found = root.get("type").map_or_else(|| "untyped".to_owned(), Value::to_string);
            return Err(unsupported(function, &format!("input type is {found}")));
        }

        let has_properties = root.get("properties").is_some_and(Value::is_object);
        let open_map = root
            .get("additionalProperties")
            .is_some_and(|extra| extra != &Value::Bool(false));
        if !has_properties && open_map {
            return Err(unsupported(function, "maps are not supported as input"));
        }

        for key in STRIPPED_ROOT_KEYS {
            root.remove(key);
        }

        if contains_ref(&root) {
            return Err(FunctionError::UnsupportedReference {
                function: function.to_owned(),
            });
        }

        Ok(Self(Value::Object(root)))
    }

    /// Returns the schema as a JSON value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Returns the schema encoded as a compact JSON string, the form used in
    /// the machine registration payload.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        self.0.to_string()
    }

    /// Returns the names of required properties, in schema order.
    #[must_use]
    pub fn required(&self) -> Vec<&str> {
        self.0
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns the declared property names.
    #[must_use]
    pub fn properties(&self) -> Vec<&str> {
        self.0
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl From<InputSchema> for Value {
    fn from(schema: InputSchema) -> Self {
        schema.0
    }
}

fn unsupported(function: &str, reason: &str) -> FunctionError {
    FunctionError::UnsupportedInput {
        function: function.to_owned(),
        reason: reason.to_owned(),
    }
}

fn contains_ref(object: &Map<String, Value>) -> bool {
    object.iter().any(|(key, value)| key == "$ref" || value_contains_ref(value))
}

fn value_contains_ref(value: &Value) -> bool {
    match value {
        Value::Object(object) => contains_ref(object),
        Value::Array(items) => items.iter().any(value_contains_ref),
        _ => false,
    }
}
