//! Chat-completion client for OpenAI-compatible APIs (Groq)
//!
//! A `CompletionClient` is bound to exactly one API key. Failures are
//! classified into `CallError` variants by HTTP status so callers can branch
//! on rate limits without inspecting error text:
//! - `RateLimited`: 429, recoverable by switching to another key
//! - `Remote`: any other non-2xx response from the API
//! - `Unexpected`: transport, timeout, or response decoding failures

pub mod client;
pub mod error;
pub mod types;

pub use client::{CompletionClient, CompletionSettings};
pub use error::{CallError, Result, classify_status};
pub use types::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat};
