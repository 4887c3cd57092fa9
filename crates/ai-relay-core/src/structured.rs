//! Schema-constrained calls.
//!
//! Wraps a request in a `json_schema` response format and decodes the reply
//! into a caller type. The parser is a pure function of the raw text, so the
//! engine stays schema-agnostic.

use ai_relay_types::{CallOptions, DecodeError, InvocationRequest, InvokeError, ResponseFormat};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::invoker::Invoker;

pub struct StructuredInvoker {
    invoker: Arc<Invoker>,
}

impl StructuredInvoker {
    pub fn new(invoker: Arc<Invoker>) -> Self {
        Self { invoker }
    }

    pub fn invoker(&self) -> &Arc<Invoker> {
        &self.invoker
    }

    /// Ask for a reply matching `schema` and decode it into `T`.
    pub async fn invoke_structured<T: DeserializeOwned>(
        &self,
        request: InvocationRequest,
        schema: Value,
        schema_name: &str,
        options: CallOptions,
    ) -> Result<T, InvokeError> {
        let parser = schema_parser::<T>(&schema, schema_name);
        let request = request
            .with_options(options)
            .with_response_format(ResponseFormat::json_schema(schema_name, schema));
        self.invoker.invoke(&request, parser).await
    }
}

/// Build the raw-text → `T` strategy for one schema.
///
/// Checks the top-level JSON type and, for object schemas, the `required`
/// keys before handing the value to serde.
pub fn schema_parser<T: DeserializeOwned>(
    schema: &Value,
    schema_name: &str,
) -> impl FnOnce(&str) -> Result<T, DecodeError> {
    let expected_type = schema.get("type").and_then(Value::as_str).map(str::to_string);
    let required: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let schema_name = schema_name.to_string();

    move |raw: &str| {
        let fail = |reason: String| DecodeError::new(&schema_name, raw, reason);

        let value: Value =
            serde_json::from_str(raw.trim()).map_err(|e| fail(format!("invalid JSON: {}", e)))?;

        if let Some(expected) = expected_type.as_deref() {
            if !matches_type(&value, expected) {
                return Err(fail(format!(
                    "expected top-level {}, got {}",
                    expected,
                    type_name(&value)
                )));
            }
        }

        if let Some(object) = value.as_object() {
            if let Some(missing) = required.iter().find(|key| !object.contains_key(key.as_str())) {
                return Err(fail(format!("missing required property '{}'", missing)));
            }
        }

        serde_json::from_value(value).map_err(|e| fail(e.to_string()))
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
