//! Completion client bound to a single API key

use std::time::Duration;

use common::Secret;
use tracing::debug;

use crate::error::{CallError, Result, classify_status};
use crate::types::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat};

/// Groq's OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Settings shared by every client regardless of which key it carries.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Chat-completion client holding one API key.
///
/// The underlying `reqwest::Client` is a cheap clone of a shared connection
/// pool, so building a new `CompletionClient` per key rotation costs nothing
/// beyond the key copy.
pub struct CompletionClient {
    http: reqwest::Client,
    api_key: Secret<String>,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(http: reqwest::Client, api_key: &str, settings: &CompletionSettings) -> Self {
        Self {
            http,
            api_key: Secret::new(api_key.to_owned()),
            endpoint: format!(
                "{}/chat/completions",
                settings.base_url.trim_end_matches('/')
            ),
            model: settings.model.clone(),
            timeout: settings.timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a single-turn prompt and require a JSON object reply.
    ///
    /// Returns the trimmed text of the first choice.
    pub async fn complete_json(&self, prompt: &str, temperature: f32) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature,
            response_format: Some(ResponseFormat::json_object()),
        };
        self.complete(&request).await
    }

    /// Send an arbitrary chat request and return the first choice's text.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallError::Unexpected(format!(
                        "completion request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    CallError::Unexpected(format!("completion request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let parsed = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| CallError::Unexpected(format!("invalid completion response: {e}")))?;

        let content = parsed
            .first_content()
            .ok_or_else(|| CallError::Unexpected("completion response had no content".into()))?
            .trim()
            .to_owned();
        debug!(model = %self.model, chars = content.len(), "completion received");
        Ok(content)
    }
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key)
            .finish()
    }
}
