use super::{ChatBackend, ChatMessage};
use async_trait::async_trait;
use fleet_core::{FleetError, FleetResult, LlmProvider, ModelConfig};
use reqwest::StatusCode;
use tracing::debug;

/// OpenAI-compatible chat completions backend.
///
/// Works with OpenAI, OpenRouter, Groq and any self-hosted server that
/// implements the `/v1/chat/completions` API.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Backend for the model described by `config`.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Model settings this backend was built with.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "fleet-supervisor")
        } else {
            request
        }
    }
}

/// Whether an HTTP status is worth retrying.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> FleetResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": messages,
        });

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| FleetError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let message = format!("chat API error {status}: {error_body}");
            return Err(if is_retryable_status(status) {
                FleetError::TransientReasoning(message)
            } else {
                FleetError::Reasoning(message)
            });
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| FleetError::Http(e.to_string()))?;
        debug!(model = %self.config.model_id, "Chat completion received");
        parse_openai_response(&resp_body)
    }
}

/// Extract the assistant text from a chat completions response body.
pub fn parse_openai_response(body: &serde_json::Value) -> FleetResult<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| FleetError::Reasoning(format!("response without message content: {body}")))
}
