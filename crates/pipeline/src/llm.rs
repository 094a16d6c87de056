//! The generation capability: `LlmClient` trait and the Anthropic client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// Error type for LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Network or HTTP error.
    #[error("LLM network error: {0}")]
    Network(String),
    /// LLM API returned an error response.
    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// Failed to parse the LLM response envelope.
    #[error("LLM parse error: {0}")]
    Parse(String),
}

/// A message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
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

/// One completion call.
///
/// `stage` identifies which pipeline step is asking, so clients and logs can
/// tell concurrent calls apart.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub stage: Stage,
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: u32,
}

/// Trait for calling an LLM to get a text completion.
///
/// Implementations handle the specifics of the LLM API (Anthropic, OpenAI, etc.).
/// The pipeline handles prompt construction and response parsing; the
/// returned string is expected to be a JSON document.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

// -- AnthropicClient (feature-gated) --

#[cfg(feature = "anthropic")]
/// Reference LLM client implementation using the Anthropic Messages API.
///
/// Uses `ureq` for HTTP. Reads the API key from the `ANTHROPIC_API_KEY`
/// environment variable.
pub struct AnthropicClient {
    /// API key for authentication.
    pub api_key: String,
    /// Base URL (default: https://api.anthropic.com).
    pub base_url: String,
}

#[cfg(feature = "anthropic")]
impl AnthropicClient {
    /// Create a new AnthropicClient from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            LlmError::Network("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    /// Create a new AnthropicClient with an explicit API key.
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        // Anthropic takes the system prompt as a separate field.
        let system: Option<String> = request
            .messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.clone());

        let non_system: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": non_system,
        });
        if let Some(sys) = system {
            body["system"] = serde_json::Value::String(sys);
        }
        body
    }
}

#[cfg(feature = "anthropic")]
#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let api_key = self.api_key.clone();
        let base_url = self.base_url.clone();
        let body = Self::request_body(&request);

        // ureq is blocking; keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            let url = format!("{}/v1/messages", base_url);
            let agent = ureq::Agent::new_with_defaults();
            let response = agent
                .post(&url)
                .header("x-api-key", &api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .send_json(body);

            match response {
                Ok(resp) => {
                    let json: serde_json::Value = resp.into_body().read_json().map_err(|e| {
                        LlmError::Parse(format!("Failed to parse Anthropic response: {}", e))
                    })?;
                    json["content"]
                        .as_array()
                        .and_then(|arr| arr.first())
                        .and_then(|c| c["text"].as_str())
                        .map(|s| s.to_string())
                        .ok_or_else(|| {
                            LlmError::Parse("No text content in Anthropic response".to_string())
                        })
                }
                Err(ureq::Error::StatusCode(status)) => Err(LlmError::Api {
                    status,
                    message: format!("Anthropic API returned status {}", status),
                }),
                Err(e) => Err(LlmError::Network(e.to_string())),
            }
        })
        .await
        .map_err(|e| LlmError::Network(format!("Task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = LlmError::Api {
            status: 529,
            message: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "LLM API error (529): overloaded");
    }

    #[cfg(feature = "anthropic")]
    #[test]
    fn anthropic_body_lifts_system_prompt() {
        let request = CompletionRequest {
            stage: Stage::Solutions,
            messages: vec![Message::system("be terse"), Message::user("five ideas")],
            model: "claude-test".into(),
            max_tokens: 512,
        };
        let body = AnthropicClient::request_body(&request);
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"].as_array().map(|m| m.len()), Some(1));
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
