//! Anthropic Claude client.

use super::{LlmHttpConfig, LlmProvider, LlmResponse, build_http_client};
use crate::models::TokenUsage;
use crate::{Error, ExtractionErrorKind, LlmFailure, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Anthropic Claude LLM client.
pub struct AnthropicClient {
    /// API key.
    api_key: Option<String>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// Maximum tokens per completion.
    max_tokens: u32,
    /// HTTP client.
    client: reqwest::Client,
}

impl AnthropicClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.anthropic.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "claude-sonnet-4-20250514";

    /// Creates a new Anthropic client from the environment.
    #[must_use]
    pub fn new() -> Self {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        Self {
            api_key,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            client: build_http_client(LlmHttpConfig::default()),
        }
    }

    /// Creates a client from engine configuration.
    #[must_use]
    pub fn from_config(config: &crate::config::LlmConfig) -> Self {
        let mut client = Self::new().with_model(config.model.clone());
        if let Some(key) = &config.api_key {
            client = client.with_api_key(key.clone());
        }
        if let Some(url) = &config.base_url {
            client = client.with_endpoint(url.clone());
        }
        client.max_tokens = config.max_tokens;
        client.client = build_http_client(LlmHttpConfig::from_config(config));
        client
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets HTTP client timeouts for LLM requests.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    fn provider_error(failure: LlmFailure, detail: impl Into<String>) -> Error {
        Error::Extraction {
            kind: ExtractionErrorKind::Provider(failure),
            detail: detail.into(),
        }
    }

    async fn request(&self, system: &str, user: &str) -> Result<LlmResponse> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            Self::provider_error(LlmFailure::Auth, "ANTHROPIC_API_KEY not set")
        })?;

        tracing::info!(provider = "anthropic", model = %self.model, "Making LLM request");

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: user.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let failure = if e.is_timeout() {
                    LlmFailure::Timeout
                } else {
                    LlmFailure::Other
                };
                tracing::error!(
                    provider = "anthropic",
                    model = %self.model,
                    error = %e,
                    is_timeout = e.is_timeout(),
                    is_connect = e.is_connect(),
                    "LLM request failed"
                );
                Self::provider_error(failure, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                provider = "anthropic",
                model = %self.model,
                status = %status,
                body = %body,
                "LLM API returned error status"
            );
            let failure = match status.as_u16() {
                429 => LlmFailure::RateLimited,
                401 | 403 => LlmFailure::Auth,
                408 | 504 => LlmFailure::Timeout,
                _ => LlmFailure::Other,
            };
            return Err(Self::provider_error(
                failure,
                format!("API returned status: {status} - {body}"),
            ));
        }

        let response: MessagesResponse = response.json().await.map_err(|e| {
            tracing::error!(
                provider = "anthropic",
                model = %self.model,
                error = %e,
                "Failed to parse LLM response"
            );
            Self::provider_error(LlmFailure::Other, e.to_string())
        })?;

        let usage = TokenUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        };

        // Extract text from first content block
        let text = response
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .map(|block| block.text)
            .ok_or_else(|| {
                Self::provider_error(LlmFailure::Other, "No text content in response")
            })?;

        Ok(LlmResponse {
            text,
            usage,
            model: self.model.clone(),
        })
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for AnthropicClient {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<LlmResponse> {
        self.request(system, user).await
    }
}

/// Request to the Messages API.
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

/// A message in the conversation.
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Response from the Messages API.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: UsageBlock,
}

/// A content block in the response.
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

/// Token usage reported by the API.
#[derive(Debug, Default, Deserialize)]
struct UsageBlock {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = AnthropicClient::new();
        assert_eq!(client.name(), "anthropic");
        assert_eq!(client.model, AnthropicClient::DEFAULT_MODEL);
    }

    #[test]
    fn test_client_configuration() {
        let client = AnthropicClient::new()
            .with_api_key("test-key")
            .with_endpoint("https://custom.endpoint")
            .with_model("claude-haiku-4");

        assert_eq!(client.api_key, Some("test-key".to_string()));
        assert_eq!(client.endpoint, "https://custom.endpoint");
        assert_eq!(client.model, "claude-haiku-4");
    }

    #[test]
    fn test_from_config() {
        let config = crate::config::LlmConfig {
            model: "claude-haiku-4".to_string(),
            api_key: Some("key".to_string()),
            base_url: Some("http://localhost:8080".to_string()),
            request_timeout_ms: 1_000,
            max_tokens: 128,
        };
        let client = AnthropicClient::from_config(&config);

        assert_eq!(client.model, "claude-haiku-4");
        assert_eq!(client.endpoint, "http://localhost:8080");
        assert_eq!(client.max_tokens, 128);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_failure() {
        let client = AnthropicClient {
            api_key: None,
            endpoint: AnthropicClient::DEFAULT_ENDPOINT.to_string(),
            model: AnthropicClient::DEFAULT_MODEL.to_string(),
            max_tokens: 16,
            client: reqwest::Client::new(),
        };

        let err = client.complete("system", "user").await.expect_err("no key");
        match err {
            Error::Extraction { kind, .. } => {
                assert_eq!(kind, ExtractionErrorKind::Provider(LlmFailure::Auth));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
