//! Upstream chat-completion data models
//!
//! Request types mirror what the model API accepts; the reply side is a
//! single tagged union with one recognized shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// A chat message in the outbound conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Outbound chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub do_sample: bool,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub stop: Vec<String>,
    pub repetition_penalty: f32,
}

/// Canonical `choices[0].message.content` envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ReplyMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

/// Any 2xx reply body from the model API
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UpstreamReply {
    Completion(ChatCompletionResponse),
    Unrecognized(Value),
}

impl UpstreamReply {
    /// Parse a raw reply body. Non-JSON bodies are a parse failure.
    pub fn from_body(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| RelayError::parse(format!("response body is not JSON: {}", e)))
    }

    /// Extract the generated text, refusing every shape but the canonical one
    pub fn into_content(self) -> Result<String> {
        match self {
            UpstreamReply::Completion(response) => {
                let choice = response
                    .choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| RelayError::parse("no choices returned"))?;
                choice
                    .message
                    .content
                    .ok_or_else(|| RelayError::parse("choices[0].message.content is missing"))
            }
            UpstreamReply::Unrecognized(value) => Err(RelayError::parse(format!(
                "expected choices[0].message.content, got {}",
                describe_shape(&value)
            ))),
        }
    }
}

fn describe_shape(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Value::Array(items) => format!("array of {} items", items.len()),
        Value::String(_) => "bare string".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Null => "null".to_string(),
    }
}
