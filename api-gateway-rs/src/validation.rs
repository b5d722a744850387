//! API Gateway Input Validation
//!
//! First line of defense for `POST /api/optimize-prompt`: content type,
//! JSON well-formedness and a JSON Schema for the body shape. The blank
//! prompt rule itself belongs to the relay so it holds for every caller.

use axum::http::HeaderMap;
use jsonschema::{Draft, JSONSchema};
use prompt_relay::OptimizationRequest;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;

/// Schema for the optimize request body
fn optimize_request_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "prompt": { "type": "string" },
            "requirements": { "type": ["string", "null"] }
        }
    })
}

/// Inbound optimize body; a missing prompt reads as empty
#[derive(Debug, Deserialize)]
struct OptimizeBody {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    requirements: Option<String>,
}

/// Compiled request validator, built once at start-up
pub struct RequestValidator {
    schema: JSONSchema,
}

impl RequestValidator {
    pub fn new() -> Result<Self, String> {
        let schema = optimize_request_schema();
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|e| format!("Invalid request schema: {}", e))?;
        Ok(Self { schema: compiled })
    }

    /// Validate and decode an optimize request body
    pub fn parse_optimize_request(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<OptimizationRequest, ApiError> {
        validate_content_type(headers, "application/json")?;

        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ApiError::invalid_request(format!("Invalid JSON: {}", e)))?;

        self.validate_schema(&value)?;

        let body: OptimizeBody = serde_json::from_value(value)
            .map_err(|e| ApiError::invalid_request(format!("Invalid request body: {}", e)))?;

        Ok(OptimizationRequest::new(body.prompt, body.requirements))
    }

    fn validate_schema(&self, value: &Value) -> Result<(), ApiError> {
        if let Err(errors) = self.schema.validate(value) {
            let details: Vec<String> = errors
                .map(|err| {
                    let path = err.instance_path.to_string();
                    if path.is_empty() {
                        err.to_string()
                    } else {
                        format!("{} at {}", err, path)
                    }
                })
                .collect();

            return Err(ApiError::invalid_request(if details.is_empty() {
                "Schema validation failed".to_string()
            } else {
                details.join("; ")
            }));
        }
        Ok(())
    }
}

/// Validate the Content-Type header
pub fn validate_content_type(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !content_type.starts_with(expected) {
        return Err(ApiError::ContentType(expected.to_string()));
    }

    Ok(())
}
