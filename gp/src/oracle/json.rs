//! Pull a JSON object out of free-form model text

use serde_json::{Map, Value};
use tracing::debug;

use super::OracleError;

/// Parse the outermost `{...}` span of `text` as a JSON object
///
/// Models wrap JSON in prose or markdown fences often enough that the span
/// from the first `{` to the last `}` is what gets parsed.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, OracleError> {
    debug!(text_len = text.len(), "extract_json_object: called");
    let start = text
        .find('{')
        .ok_or_else(|| OracleError::OutputInvalid("no JSON object in response".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| OracleError::OutputInvalid("unterminated JSON object in response".to_string()))?;

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(OracleError::OutputInvalid(format!(
            "expected a JSON object, got {}",
            type_name(&other)
        ))),
        Err(e) => {
            debug!(error = %e, "extract_json_object: parse failed");
            Err(OracleError::OutputInvalid(format!("malformed JSON: {}", e)))
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
