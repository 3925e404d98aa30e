//! Error classification for completion API calls

/// Outcome of a failed completion call, classified for retry decisions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// Quota or rate limit hit for the bound key (HTTP 429)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The API answered with a non-rate-limit error status
    #[error("API error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Transport, timeout, or decoding failure
    #[error("{0}")]
    Unexpected(String),
}

impl CallError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CallError::RateLimited(_))
    }
}

/// Result alias for completion calls.
pub type Result<T> = std::result::Result<T, CallError>;

/// Classify a non-success HTTP response.
///
/// 429 is always a rate limit; every other status is a remote failure. The
/// message is taken from `error.message` in an OpenAI-style error body when
/// present, otherwise the raw body is used.
pub fn classify_status(status: u16, body: &str) -> CallError {
    let message = error_message(body);
    match status {
        429 => CallError::RateLimited(message),
        _ => CallError::Remote { status, message },
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                String::from("<no body>")
            } else {
                body.to_owned()
            }
        })
}
