//! Image captioning via a hosted image-to-text model

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use common::Secret;
use serde::Deserialize;
use tracing::{debug, error};

/// Hugging Face inference endpoint for BLIP large.
pub const DEFAULT_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/Salesforce/blip-image-captioning-large";

#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("uploaded image is empty")]
    EmptyImage,

    #[error("caption request failed: {0}")]
    Http(String),

    #[error("caption model returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("invalid caption response: {0}")]
    Malformed(String),
}

/// Produces a short description of an image.
///
/// Uses `Pin<Box<dyn Future>>` so the service can hold an `Arc<dyn Captioner>`.
pub trait Captioner: Send + Sync {
    fn caption(
        &self,
        image: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<String, CaptionError>> + Send + '_>>;
}

#[derive(Debug, Clone)]
pub struct CaptionSettings {
    pub endpoint: String,
    pub max_new_tokens: u32,
    pub timeout: Duration,
}

/// Calls an inference endpoint that takes a base64 image and answers with
/// `[{"generated_text": "..."}]`.
pub struct InferenceCaptioner {
    http: reqwest::Client,
    token: Option<Secret<String>>,
    settings: CaptionSettings,
}

/// Accepts both the list form and a bare object.
#[derive(Deserialize)]
#[serde(untagged)]
enum CaptionResponse {
    List(Vec<Generated>),
    Single(Generated),
}

#[derive(Deserialize)]
struct Generated {
    generated_text: String,
}

impl InferenceCaptioner {
    pub fn new(
        http: reqwest::Client,
        token: Option<Secret<String>>,
        settings: CaptionSettings,
    ) -> Self {
        Self {
            http,
            token,
            settings,
        }
    }

    async fn request(&self, image: Bytes) -> Result<String, CaptionError> {
        if image.is_empty() {
            return Err(CaptionError::EmptyImage);
        }

        let body = serde_json::json!({
            "inputs": STANDARD.encode(&image),
            "parameters": { "max_new_tokens": self.settings.max_new_tokens },
        });

        let mut request = self
            .http
            .post(&self.settings.endpoint)
            .timeout(self.settings.timeout)
            .json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        debug!(bytes = image.len(), "sending image for captioning");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CaptionError::Http(format!(
                    "timed out after {}s",
                    self.settings.timeout.as_secs()
                ))
            } else {
                CaptionError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), error = %message, "caption model error");
            return Err(CaptionError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let parsed = response
            .json::<CaptionResponse>()
            .await
            .map_err(|e| CaptionError::Malformed(e.to_string()))?;

        let generated = match parsed {
            CaptionResponse::List(items) => items.into_iter().next(),
            CaptionResponse::Single(item) => Some(item),
        }
        .ok_or_else(|| CaptionError::Malformed("empty result list".into()))?;

        Ok(generated.generated_text.trim().to_owned())
    }
}

impl Captioner for InferenceCaptioner {
    fn caption(
        &self,
        image: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<String, CaptionError>> + Send + '_>> {
        Box::pin(self.request(image))
    }
}
