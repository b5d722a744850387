// prompt-relay-rs/src/relay.rs
//
// Upstream relay: validate, sign, call the model API once, normalize
//
// Each call is an independent transaction:
// validating -> issuing credential -> calling upstream -> normalizing -> done.
// Any failure ends the transaction; nothing is retried and nothing persists.

use std::sync::Arc;
use std::time::Instant;

use relay_config::RelayConfig;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::credential::{Credential, CredentialIssuer};
use crate::error::{RelayError, Result};
use crate::models::{ChatCompletionRequest, ChatMessage, UpstreamReply};

/// Message returned when the prompt is missing or blank
pub const EMPTY_PROMPT_MESSAGE: &str = "Please provide the prompt to optimize";

/// A prompt to optimize plus optional extra requirements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub prompt: String,
    #[serde(default)]
    pub requirements: Option<String>,
}

impl OptimizationRequest {
    pub fn new(prompt: impl Into<String>, requirements: Option<String>) -> Self {
        Self {
            prompt: prompt.into(),
            requirements,
        }
    }

    /// Reject blank prompts; blank requirements count as absent
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(RelayError::validation(EMPTY_PROMPT_MESSAGE));
        }
        Ok(())
    }

    pub fn requirements(&self) -> Option<&str> {
        self.requirements
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// The user message: labeled sections when requirements are present
    pub fn user_text(&self) -> String {
        match self.requirements() {
            Some(requirements) => format!(
                "original prompt: {}\nrequirements: {}",
                self.prompt.trim(),
                requirements
            ),
            None => self.prompt.trim().to_string(),
        }
    }
}

/// Up to N optimized prompt variants, in upstream order.
///
/// Shorter than N when the model produced fewer usable lines; never padded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct CandidateSet(Vec<String>);

impl CandidateSet {
    /// Split on line breaks, trim, drop blank lines, keep the first `limit`
    pub fn from_text(text: &str, limit: usize) -> Self {
        Self(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .take(limit)
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Fixed optimizer instructions for `count` variants
pub fn system_directive(count: usize) -> String {
    format!(
        "You are an expert prompt engineer. Your task is to optimize the prompt the user \
provides so that it works better when sent to an AI model.

Rules:
1. Produce exactly {count} different optimized versions of the prompt
2. Put each version on its own line, without numbering, bullets or any other markup
3. Do not add explanations, headings or commentary of any kind

Optimization principles:
- Make the prompt more specific, explicit and instructive
- Add the context and background the task needs
- State the expected output format and quality bar
- Keep a natural, professional tone
- Keep the prompt concise but complete

Example input:
\"Write an article\"

Example output:
Write a 2000-word in-depth article built around one central argument, supported by concrete examples and data, ending with a summarizing paragraph
Write a clearly structured article with an introduction, three to four main points and a conclusion, arguing each point in detail with examples
Write a professional article that uses industry terminology and recent research data, keeps the reasoning rigorous and offers practical insights and advice"
    )
}

/// Stateless client for the upstream model API.
///
/// Shared across concurrent requests; the only shared state is the
/// read-only configuration and the signing key.
#[derive(Debug)]
pub struct PromptRelay {
    client: Client,
    config: Arc<RelayConfig>,
    issuer: CredentialIssuer,
}

impl PromptRelay {
    /// Build the HTTP client with the configured upstream timeout
    pub fn new(config: Arc<RelayConfig>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| RelayError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        let issuer = CredentialIssuer::new(&config.api_key);

        Ok(Self {
            client,
            config,
            issuer,
        })
    }

    pub fn issuer(&self) -> &CredentialIssuer {
        &self.issuer
    }

    /// Relay a prompt and optional requirements
    pub async fn relay(&self, prompt: &str, requirements: Option<&str>) -> Result<CandidateSet> {
        let request = OptimizationRequest::new(prompt, requirements.map(str::to_string));
        self.optimize(&request).await
    }

    /// Run one optimization transaction
    pub async fn optimize(&self, request: &OptimizationRequest) -> Result<CandidateSet> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("relay", %request_id, model = %self.config.model_name);

        async move {
            request.validate()?;

            let credential = self.issuer.issue()?;
            let body = self.build_request(request);

            let started = Instant::now();
            let content = self.call_upstream(&credential, &body).await?;
            let candidates = CandidateSet::from_text(&content, self.config.candidate_count);

            tracing::info!(
                candidates = candidates.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Prompt optimization completed"
            );
            if candidates.len() < self.config.candidate_count {
                tracing::warn!(
                    expected = self.config.candidate_count,
                    received = candidates.len(),
                    "Upstream returned fewer candidates than requested"
                );
            }

            Ok::<_, RelayError>(candidates)
        }
        .instrument(span)
        .await
    }

    /// Compose the outbound payload for a request
    pub fn build_request(&self, request: &OptimizationRequest) -> ChatCompletionRequest {
        let params = &self.config.generation;
        ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                ChatMessage::system(system_directive(self.config.candidate_count)),
                ChatMessage::user(request.user_text()),
            ],
            do_sample: params.do_sample,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            stream: false,
            stop: Vec::new(),
            repetition_penalty: params.repetition_penalty,
        }
    }

    // Single attempt, no retry
    async fn call_upstream(
        &self,
        credential: &Credential,
        body: &ChatCompletionRequest,
    ) -> Result<String> {
        tracing::debug!(url = %self.config.upstream_url, "Sending request to upstream model API");

        let response = self
            .client
            .post(&self.config.upstream_url)
            .header(header::AUTHORIZATION, credential.token())
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| self.transport_error(err))?;

        tracing::debug!(status = status.as_u16(), "Upstream responded");

        if !status.is_success() {
            tracing::error!(
                kind = "upstream",
                status = status.as_u16(),
                body = %text,
                "Upstream model API request failed"
            );
            return Err(RelayError::upstream(Some(status.as_u16()), text));
        }

        let reply = UpstreamReply::from_body(&text).map_err(|err| log_parse_failure(err, &text))?;

        if let UpstreamReply::Completion(completion) = &reply {
            if let Some(total) = completion.usage.as_ref().and_then(|u| u.total_tokens) {
                tracing::info!(total_tokens = total, "Upstream token usage");
            }
        }

        reply.into_content().map_err(|err| log_parse_failure(err, &text))
    }

    fn transport_error(&self, err: reqwest::Error) -> RelayError {
        if err.is_timeout() {
            tracing::error!(
                kind = "timeout",
                timeout_secs = self.config.upstream_timeout.as_secs(),
                "Upstream model API timed out"
            );
            RelayError::Timeout(self.config.upstream_timeout.as_secs())
        } else {
            let message = if err.is_connect() {
                format!("Connection failed: {}", err)
            } else {
                format!("Network error: {}", err)
            };
            tracing::error!(kind = "upstream", error = %message, "Upstream model API unreachable");
            RelayError::upstream(err.status().map(|s| s.as_u16()), message)
        }
    }
}

fn log_parse_failure(err: RelayError, body: &str) -> RelayError {
    tracing::error!(kind = "parse", error = %err, body = %body, "Upstream response shape not recognized");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
    use relay_config::ApiKey;
    use serde_json::json;
    use wiremock::http::HeaderName;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use crate::credential::Claims;

    fn test_config(upstream: &MockServer) -> RelayConfig {
        let mut config = RelayConfig::with_api_key(ApiKey::parse("test-id.test-secret").unwrap());
        config.upstream_url = format!("{}/api/paas/v4/chat/completions", upstream.uri());
        config.upstream_timeout = Duration::from_secs(5);
        config
    }

    fn relay_for(config: RelayConfig) -> PromptRelay {
        PromptRelay::new(Arc::new(config)).expect("Failed to build relay")
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-mock",
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": { "role": "assistant", "content": content }
            }],
            "usage": { "prompt_tokens": 20, "completion_tokens": 30, "total_tokens": 50 }
        })
    }

    async fn mount_reply(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/api/paas/v4/chat/completions"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[test]
    fn test_candidates_drop_blank_lines_and_truncate() {
        let set = CandidateSet::from_text("A\nB\n\nC\nD", 3);
        assert_eq!(set.as_slice(), ["A", "B", "C"]);
    }

    #[test]
    fn test_candidates_are_not_padded() {
        let set = CandidateSet::from_text("only one line", 3);
        assert_eq!(set.into_vec(), vec!["only one line".to_string()]);

        assert!(CandidateSet::from_text("\n  \n", 3).is_empty());
    }

    #[test]
    fn test_candidates_are_trimmed() {
        let set = CandidateSet::from_text("  first  \r\n\tsecond\n", 5);
        assert_eq!(set.as_slice(), ["first", "second"]);
    }

    #[test]
    fn test_user_text_labels_sections() {
        let plain = OptimizationRequest::new("write a poem", None);
        assert_eq!(plain.user_text(), "write a poem");

        let blank = OptimizationRequest::new("write a poem", Some("   ".to_string()));
        assert_eq!(blank.user_text(), "write a poem");

        let labeled = OptimizationRequest::new("write a poem", Some("about rust".to_string()));
        assert_eq!(
            labeled.user_text(),
            "original prompt: write a poem\nrequirements: about rust"
        );
    }

    #[test]
    fn test_system_directive_is_stable() {
        assert_eq!(system_directive(3), system_directive(3));
        assert!(system_directive(3).contains("exactly 3 different"));
        assert!(system_directive(5).contains("exactly 5 different"));
    }

    #[tokio::test]
    async fn test_relay_normalizes_canonical_reply() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            ResponseTemplate::new(200).set_body_json(completion("A\nB\n\nC\nD")),
        )
        .await;

        let relay = relay_for(test_config(&server));
        let candidates = relay.relay("write an article", None).await.unwrap();

        assert_eq!(candidates.as_slice(), ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_relay_sends_signed_credential_and_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/paas/v4/chat/completions"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("one\ntwo\nthree")))
            .expect(1)
            .mount(&server)
            .await;

        let relay = relay_for(test_config(&server));
        relay
            .relay("write an article", Some("for engineers"))
            .await
            .unwrap();

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];

        let token = request
            .headers
            .get(&HeaderName::from("authorization"))
            .unwrap()
            .last()
            .as_str();
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap()
        .claims;
        assert_eq!(claims.api_key, "test-id");
        assert_eq!(claims.exp - claims.timestamp, 3600);

        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["model"], relay_config::DEFAULT_MODEL_NAME);
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], system_directive(3));
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(
            body["messages"][1]["content"],
            "original prompt: write an article\nrequirements: for engineers"
        );
    }

    #[tokio::test]
    async fn test_blank_prompt_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("A")))
            .expect(0)
            .mount(&server)
            .await;

        let relay = relay_for(test_config(&server));

        for prompt in ["", "   ", "\n\t"] {
            let err = relay.relay(prompt, Some("requirements only")).await.unwrap_err();
            assert!(matches!(err, RelayError::Validation(_)));
            assert_eq!(err.to_string(), EMPTY_PROMPT_MESSAGE);
        }

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_reply_is_not_padded() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            ResponseTemplate::new(200).set_body_json(completion("only one line")),
        )
        .await;

        let relay = relay_for(test_config(&server));
        let candidates = relay.relay("prompt", None).await.unwrap();
        assert_eq!(candidates.as_slice(), ["only one line"]);
    }

    #[tokio::test]
    async fn test_unrecognized_shape_is_parse_error() {
        let server = MockServer::start().await;
        mount_reply(&server, ResponseTemplate::new(200).set_body_json(json!({ "foo": 1 }))).await;

        let relay = relay_for(test_config(&server));
        let err = relay.relay("prompt", None).await.unwrap_err();
        assert!(matches!(err, RelayError::Parse(_)));
    }

    #[tokio::test]
    async fn test_upstream_status_is_captured() {
        for status in [429u16, 500] {
            let server = MockServer::start().await;
            mount_reply(
                &server,
                ResponseTemplate::new(status).set_body_string("{\"error\":\"busy\"}"),
            )
            .await;

            let relay = relay_for(test_config(&server));
            let err = relay.relay("prompt", None).await.unwrap_err();
            match err {
                RelayError::Upstream { status: got, body } => {
                    assert_eq!(got, Some(status));
                    assert_eq!(body, "{\"error\":\"busy\"}");
                }
                other => panic!("expected Upstream error, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(completion("late"))
                .set_delay(Duration::from_secs(3)),
        )
        .await;

        let mut config = test_config(&server);
        config.upstream_timeout = Duration::from_secs(1);
        let relay = relay_for(config);

        let err = relay.relay("prompt", None).await.unwrap_err();
        assert!(matches!(err, RelayError::Timeout(1)));
        assert!(err.is_upstream_fault());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_upstream_error() {
        let server = MockServer::start().await;
        let mut config = test_config(&server);
        drop(server);
        config.upstream_url = "http://127.0.0.1:9/chat/completions".to_string();

        let relay = relay_for(config);
        let err = relay.relay("prompt", None).await.unwrap_err();
        assert!(matches!(err, RelayError::Upstream { status: None, .. }));
    }

    #[tokio::test]
    async fn test_candidate_count_is_configurable() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            ResponseTemplate::new(200).set_body_json(completion("1\n2\n3\n4\n5\n6")),
        )
        .await;

        let mut config = test_config(&server);
        config.candidate_count = 5;
        let relay = relay_for(config);

        let candidates = relay.relay("prompt", None).await.unwrap();
        assert_eq!(candidates.len(), 5);
    }
}
