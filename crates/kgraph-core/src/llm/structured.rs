//! Schema-constrained generation and embeddings
//!
//! The pipeline only talks to models through the two traits here, so the
//! distiller and archivist can be driven by scripted fakes in tests.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::client::LlmClient;
use super::types::Message;

/// Produces a JSON value that conforms to a caller-supplied JSON Schema
#[async_trait]
pub trait StructuredOutput: Send + Sync {
    /// Run one generation. A reply that is not JSON or does not validate
    /// against `schema` is an `Error::SchemaViolation`.
    async fn generate_structured(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
        schema: &Value,
    ) -> Result<Value>;
}

/// Maps text to a fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
impl StructuredOutput for LlmClient {
    async fn generate_structured(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
        schema: &Value,
    ) -> Result<Value> {
        let schema_text = serde_json::to_string_pretty(schema)?;
        let user = format!(
            "{user_prompt}\n\nRespond only with a JSON object that matches this JSON Schema:\n{schema_text}"
        );

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(user));

        let response = self
            .complete_with_fallback(messages, Some(("structured_output", schema)))
            .await?;

        parse_structured(&response.content, schema)
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.embed(text).await?;
        if embedding.vector.is_empty() {
            return Err(Error::EmbeddingFailed("empty vector".to_string()));
        }
        Ok(embedding.vector)
    }
}

/// Parse a raw model reply and validate it against `schema`
pub fn parse_structured(reply: &str, schema: &Value) -> Result<Value> {
    let json_text = extract_json_from_response(reply);
    let value: Value = serde_json::from_str(&json_text).map_err(|e| {
        warn!(error = %e, "Model reply is not valid JSON");
        Error::SchemaViolation(format!("reply is not valid JSON: {}", e))
    })?;

    validate_against_schema(schema, &value)?;
    debug!("Structured reply validated");
    Ok(value)
}

/// Validate `value` against a JSON Schema, collecting every violation
pub fn validate_against_schema(schema: &Value, value: &Value) -> Result<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| Error::InvalidInput(format!("invalid JSON Schema: {}", e)))?;

    let violations: Vec<String> = validator
        .iter_errors(value)
        .map(|e| e.to_string())
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::SchemaViolation(violations.join("; ")))
    }
}

/// Extract JSON from a response that might contain markdown or other text
fn extract_json_from_response(response: &str) -> String {
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    if let Some(start) = response.find("```") {
        let fence_end = start + 3;
        if let Some(newline) = response[fence_end..].find('\n') {
            let json_start = fence_end + newline + 1;
            if let Some(end) = response[json_start..].find("```") {
                return response[json_start..json_start + end].trim().to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}'))
        && start < end
    {
        return response[start..=end].to_string();
    }

    response.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "relationship_type": {"type": "string"},
                "justification": {"type": "string"}
            },
            "required": ["relationship_type", "justification"]
        })
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let reply = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json_from_response(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_from_generic_fence() {
        let reply = "```\n{\"a\": 2}\n```";
        assert_eq!(extract_json_from_response(reply), "{\"a\": 2}");
    }

    #[test]
    fn test_extract_json_from_prose() {
        let reply = "Sure! {\"a\": {\"b\": 3}} hope that helps";
        assert_eq!(extract_json_from_response(reply), "{\"a\": {\"b\": 3}}");
    }

    #[test]
    fn test_parse_structured_accepts_valid_reply() {
        let reply = r#"{"relationship_type": "confirms", "justification": "same figures"}"#;
        let value = parse_structured(reply, &schema()).unwrap();
        assert_eq!(value["relationship_type"], "confirms");
    }

    #[test]
    fn test_parse_structured_rejects_missing_field() {
        let reply = r#"{"relationship_type": "confirms"}"#;
        let err = parse_structured(reply, &schema()).unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(_)));
        assert!(err.to_string().contains("justification"));
    }

    #[test]
    fn test_parse_structured_rejects_non_json() {
        let err = parse_structured("I could not decide.", &schema()).unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(_)));
    }

    #[test]
    fn test_invalid_schema_is_input_error() {
        let err = validate_against_schema(&json!({"type": 12}), &json!({})).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
