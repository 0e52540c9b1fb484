//! LLM client abstraction.
//!
//! Provides a unified async interface over generative-model providers
//! used by the semantic extraction strategy.

mod anthropic;

pub use anthropic::AnthropicClient;

use crate::models::TokenUsage;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A completion returned by a provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The text of the first content block.
    pub text: String,
    /// Token accounting reported by the provider.
    pub usage: TokenUsage,
    /// The model that served the request.
    pub model: String,
}

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for a system + user prompt pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    async fn complete(&self, system: &str, user: &str) -> Result<LlmResponse>;
}

/// HTTP client configuration for LLM providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl LlmHttpConfig {
    /// Builds HTTP settings from the engine's LLM configuration.
    #[must_use]
    pub const fn from_config(config: &crate::config::LlmConfig) -> Self {
        Self {
            timeout_ms: config.request_timeout_ms,
            connect_timeout_ms: 3_000,
        }
    }
}

/// Builds an HTTP client for LLM requests with configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build LLM HTTP client: {err}");
        reqwest::Client::new()
    })
}

/// Extracts JSON from LLM response text, handling markdown code blocks.
///
/// Models occasionally wrap structured output in ```` ```json ```` fences
/// or surround it with prose; this finds the payload either way.
#[must_use]
pub fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json marker)
    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        // Skip language identifier if present (e.g., "json\n")
        let after_marker = &trimmed[content_start..];
        let json_start = after_marker
            .find('{')
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle raw JSON (find first { to last })
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            return &trimmed[start..=end];
        }
    }

    // Handle JSON array payloads
    if let Some(start) = trimmed.find('[') {
        if let Some(end) = trimmed.rfind(']') {
            return &trimmed[start..=end];
        }
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_raw() {
        let response = r#"{"entities": []}"#;
        assert_eq!(extract_json_from_response(response), r#"{"entities": []}"#);
    }

    #[test]
    fn test_extract_json_markdown() {
        let response = "```json\n{\"entities\": []}\n```";
        let json = extract_json_from_response(response);
        assert!(json.contains("\"entities\""));
        assert!(!json.contains("```"));
    }

    #[test]
    fn test_extract_json_unmarked_fence() {
        let response = "```\n{\"entities\": []}\n```";
        assert_eq!(extract_json_from_response(response), r#"{"entities": []}"#);
    }

    #[test]
    fn test_extract_json_with_prose() {
        let response = "Here is the graph: {\"entities\": []} hope this helps";
        assert_eq!(extract_json_from_response(response), r#"{"entities": []}"#);
    }

    #[test]
    fn test_extract_json_array() {
        let response = r#"["a", "b"]"#;
        assert_eq!(extract_json_from_response(response), r#"["a", "b"]"#);
    }
}
