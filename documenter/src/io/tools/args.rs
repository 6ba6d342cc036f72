//! Argument validation at the dispatcher boundary.

use jsonschema::Draft;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ToolError;

/// Check `args` against `schema` and deserialize it.
///
/// Required fields are checked first so the failure names the field, then the full schema
/// (Draft 2020-12), then the typed deserialization.
pub fn parse_args<T: DeserializeOwned>(schema: &Value, args: &Value) -> Result<T, ToolError> {
    let object = args.as_object().ok_or_else(|| {
        ToolError::InvalidArguments("arguments must be a JSON object".to_string())
    })?;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if object.get(field).is_none_or(Value::is_null) {
                return Err(ToolError::MissingField(field.to_string()));
            }
        }
    }

    validate_schema(schema, args)?;

    serde_json::from_value(args.clone()).map_err(|err| ToolError::InvalidArguments(err.to_string()))
}

fn validate_schema(schema: &Value, instance: &Value) -> Result<(), ToolError> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| ToolError::InvalidArguments(format!("invalid tool schema: {err}")))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(ToolError::InvalidArguments(messages.join("; ")));
    }
    Ok(())
}
