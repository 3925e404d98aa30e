//! Intent extraction over the chat-completion API
//!
//! One completion call per attempt; the rotator decides whether a rate limit
//! gets another attempt on a different key.

use completion::{CallError, CompletionClient};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::prompt::{INTENT_TEMPLATE, TEXT_PLACEHOLDER};

const BOOL_FIELDS: [&str; 3] = ["listen_back", "want_to_call", "want_to_share"];
const NULLABLE_FIELDS: [&str; 3] = ["intent", "contact_option", "response"];

/// Structured intent returned to clients.
///
/// Always carries the six documented fields. Anything else the model sends
/// back is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IntentResult(Map<String, Value>);

impl IntentResult {
    /// Returned when the completion text holds no JSON object.
    pub fn unknown() -> Self {
        Self::sentinel("unknown")
    }

    /// Returned when the completion call failed for a reason other than a
    /// rate limit.
    pub fn error() -> Self {
        Self::sentinel("error")
    }

    fn sentinel(intent: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("intent".into(), Value::String(intent.into()));
        Self::from_object(fields)
    }

    /// Fill in any missing documented fields.
    pub fn from_object(mut fields: Map<String, Value>) -> Self {
        for name in BOOL_FIELDS {
            fields.entry(name).or_insert(Value::Bool(false));
        }
        for name in NULLABLE_FIELDS {
            fields.entry(name).or_insert(Value::Null);
        }
        Self(fields)
    }

    pub fn intent(&self) -> Option<&str> {
        self.0.get("intent").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

pub fn build_prompt(text: &str) -> String {
    INTENT_TEMPLATE.replacen(TEXT_PLACEHOLDER, text, 1)
}

/// Classify `text` with one completion call on `client`.
///
/// Rate limits are returned so the caller can move to another key. Every
/// other failure is logged and becomes the `error` sentinel.
pub async fn extract_intent(
    client: &CompletionClient,
    text: &str,
    temperature: f32,
) -> completion::Result<IntentResult> {
    match client.complete_json(&build_prompt(text), temperature).await {
        Ok(raw) => {
            debug!(raw = %raw, "completion text");
            let result = parse_intent(&raw);
            debug!(intent = ?result.intent(), "intent parsed");
            Ok(result)
        }
        Err(e @ CallError::RateLimited(_)) => Err(e),
        Err(e) => {
            error!(error = %e, "intent extraction failed");
            Ok(IntentResult::error())
        }
    }
}

/// Parse completion text into an `IntentResult`.
///
/// Tries the whole trimmed text first, then the span from the first `{` to
/// the last `}`. Never fails: unparseable text yields the `unknown` sentinel.
pub fn parse_intent(raw: &str) -> IntentResult {
    let raw = raw.trim();
    let parsed = parse_object(raw).or_else(|| embedded_object(raw).and_then(parse_object));
    match parsed {
        Some(fields) => IntentResult::from_object(fields),
        None => {
            warn!(chars = raw.len(), "no JSON object in completion text");
            IntentResult::unknown()
        }
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(fields) => Some(fields),
        _ => None,
    }
}

fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONTACTS_REPLY: &str = r#"{"intent": "list_contacts", "listen_back": true, "contact_option": null, "want_to_call": false, "want_to_share": false, "response": null}"#;

    fn sentinel_json(intent: &str) -> Value {
        json!({
            "intent": intent,
            "listen_back": false,
            "contact_option": null,
            "want_to_call": false,
            "want_to_share": false,
            "response": null,
        })
    }

    #[test]
    fn prompt_embeds_text_verbatim() {
        let prompt = build_prompt("Show me my contacts");
        assert!(prompt.contains(r#"Text: "Show me my contacts""#));
        assert!(!prompt.contains(TEXT_PLACEHOLDER));
    }

    #[test]
    fn prompt_with_empty_text() {
        assert!(build_prompt("").contains(r#"Text: """#));
    }

    #[test]
    fn strict_json_parses_to_contacts_intent() {
        let result = parse_intent(CONTACTS_REPLY);
        assert_eq!(
            result.into_value(),
            json!({
                "intent": "list_contacts",
                "listen_back": true,
                "contact_option": null,
                "want_to_call": false,
                "want_to_share": false,
                "response": null,
            })
        );
    }

    #[test]
    fn prose_wrapped_json_is_recovered() {
        let raw = r#"Sure! Here you go: {"intent": "ocr", "listen_back": false} Hope that helps."#;
        let result = parse_intent(raw);
        assert_eq!(result.intent(), Some("ocr"));
        assert_eq!(result.get("want_to_call"), Some(&Value::Bool(false)));
        assert_eq!(result.get("response"), Some(&Value::Null));
    }

    #[test]
    fn refusal_text_is_unknown() {
        assert_eq!(
            parse_intent("I cannot help with that").into_value(),
            sentinel_json("unknown")
        );
    }

    #[test]
    fn unbalanced_braces_are_unknown() {
        assert_eq!(parse_intent("} nothing {").intent(), Some("unknown"));
        assert_eq!(parse_intent("{ not json }").intent(), Some("unknown"));
    }

    #[test]
    fn non_object_json_is_unknown() {
        assert_eq!(parse_intent("[1, 2, 3]").intent(), Some("unknown"));
        assert_eq!(parse_intent("\"ocr\"").intent(), Some("unknown"));
    }

    #[test]
    fn missing_fields_are_filled() {
        let result = parse_intent(r#"{"intent": "navigation"}"#);
        assert_eq!(
            result.into_value(),
            json!({
                "intent": "navigation",
                "listen_back": false,
                "contact_option": null,
                "want_to_call": false,
                "want_to_share": false,
                "response": null,
            })
        );
    }

    #[test]
    fn missing_intent_becomes_null() {
        let result = parse_intent(r#"{"listen_back": true}"#);
        assert_eq!(result.get("intent"), Some(&Value::Null));
        assert_eq!(result.get("listen_back"), Some(&Value::Bool(true)));
    }

    #[test]
    fn off_template_values_and_extra_keys_pass_through() {
        let raw = r#"{"intent": "navigation", "listen_back": false, "contact_option": null, "want_to_call": false, "want_to_share": false, "response": "home", "confidence": 0.9}"#;
        let result = parse_intent(raw);
        assert_eq!(result.get("response"), Some(&json!("home")));
        assert_eq!(result.get("confidence"), Some(&json!(0.9)));
    }

    #[test]
    fn error_sentinel_shape() {
        assert_eq!(IntentResult::error().into_value(), sentinel_json("error"));
    }

    #[test]
    fn serializes_as_flat_object() {
        let text = serde_json::to_string(&IntentResult::unknown()).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, sentinel_json("unknown"));
    }

    mod remote {
        use super::*;
        use axum::http::StatusCode;
        use axum::routing::post;
        use completion::CompletionSettings;
        use std::time::Duration;
        use tokio::net::TcpListener;

        async fn start_mock(status: StatusCode, body: String) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let app = axum::Router::new().route(
                "/v1/chat/completions",
                post(move || {
                    let body = body.clone();
                    async move { (status, body) }
                }),
            );
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{addr}/v1")
        }

        fn client(base_url: String) -> CompletionClient {
            CompletionClient::new(
                reqwest::Client::new(),
                "gsk_test",
                &CompletionSettings {
                    base_url,
                    model: "test-model".into(),
                    timeout: Duration::from_secs(5),
                },
            )
        }

        fn completion_body(content: &str) -> String {
            json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
                .to_string()
        }

        #[tokio::test]
        async fn contacts_request_yields_contacts_intent() {
            let url = start_mock(StatusCode::OK, completion_body(CONTACTS_REPLY)).await;
            let result = extract_intent(&client(url), "Show me my contacts", 0.3)
                .await
                .unwrap();
            assert_eq!(result.intent(), Some("list_contacts"));
            assert_eq!(result.get("listen_back"), Some(&Value::Bool(true)));
        }

        #[tokio::test]
        async fn rate_limit_is_returned() {
            let url = start_mock(
                StatusCode::TOO_MANY_REQUESTS,
                r#"{"error":{"message":"Rate limit reached"}}"#.into(),
            )
            .await;
            let err = extract_intent(&client(url), "help", 0.3).await.unwrap_err();
            assert!(err.is_rate_limited());
        }

        #[tokio::test]
        async fn remote_failure_becomes_error_sentinel() {
            let url = start_mock(
                StatusCode::UNAUTHORIZED,
                r#"{"error":{"message":"Invalid API Key"}}"#.into(),
            )
            .await;
            let result = extract_intent(&client(url), "help", 0.3).await.unwrap();
            assert_eq!(result.into_value(), sentinel_json("error"));
        }

        #[tokio::test]
        async fn transport_failure_becomes_error_sentinel() {
            let result = extract_intent(&client("http://127.0.0.1:1/v1".into()), "help", 0.3)
                .await
                .unwrap();
            assert_eq!(result.intent(), Some("error"));
        }

        #[tokio::test]
        async fn prose_completion_yields_unknown() {
            let url = start_mock(StatusCode::OK, completion_body("I cannot help with that")).await;
            let result = extract_intent(&client(url), "hmm", 0.3).await.unwrap();
            assert_eq!(result.intent(), Some("unknown"));
        }
    }
}
