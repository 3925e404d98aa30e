//! RESQ API
//!
//! HTTP backend for the RESQ assistive app:
//! 1. `/get_user_intent` classifies a spoken request into one of the app's
//!    intents through a chat-completion model
//! 2. `/caption` describes an uploaded image
//! 3. Completion calls rotate across a pool of API keys when one is rate
//!    limited

mod caption;
mod config;
mod error;
mod intent;
mod metrics;
mod prompt;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use completion::CompletionClient;
use key_pool::KeyRotator;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::caption::{Captioner, InferenceCaptioner};
use crate::config::Config;
use crate::error::ApiError;
use crate::intent::IntentResult;
use crate::metrics::ServiceMetrics;

/// Time allowed for in-flight requests to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest accepted request body (image uploads).
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    keys: Arc<KeyRotator<CompletionClient>>,
    captioner: Arc<dyn Captioner>,
    temperature: f32,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

#[derive(Debug, Deserialize)]
struct IntentRequest {
    #[serde(default, rename = "audioText")]
    audio_text: String,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/api-status", get(api_status_handler))
        .route("/get_user_intent", post(intent_handler))
        .route("/caption", post(caption_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs; LOG_LEVEL wins over RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting resq-api");

    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let (config_path, explicit) = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), explicit, "loading configuration");

    let mut config = Config::load_or_default(&config_path, explicit)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    config
        .resolve_secrets()
        .context("failed to resolve API keys")?;

    info!(
        listen_addr = %config.server.listen_addr,
        model = %config.completion.model,
        keys = config.api_keys.len(),
        caption_token = config.caption_token.is_some(),
        "configuration loaded"
    );

    let http = reqwest::Client::new();

    let settings = config.completion.settings();
    let completion_http = http.clone();
    let keys = KeyRotator::new(std::mem::take(&mut config.api_keys), move |key: &str| {
        CompletionClient::new(completion_http.clone(), key, &settings)
    })
    .context("no API keys found: set GROQ_API_KEY, GROQ_API_KEY1..N, or completion.api_keys_file")?;

    let captioner = InferenceCaptioner::new(
        http,
        config.caption_token.take(),
        config.caption.settings(),
    );

    let metrics = ServiceMetrics::new();
    let app_state = AppState {
        keys: Arc::new(keys),
        captioner: Arc::new(captioner),
        temperature: config.completion.temperature,
        metrics: metrics.clone(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts at signal receipt, not at server start.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => {
            warn!(
                remaining = metrics.in_flight.load(Ordering::Relaxed),
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// Welcome message plus the key pool position.
async fn home_handler(State(state): State<AppState>) -> Response {
    let mut guard = state.metrics.begin("/");
    let status = state.keys.status();
    let response = Json(serde_json::json!({
        "message": "Welcome to RESQ API",
        "available_keys": status.total_keys,
        "current_key": status.current_key(),
    }))
    .into_response();
    guard.finish(response.status().as_u16());
    response
}

async fn api_status_handler(State(state): State<AppState>) -> Response {
    let mut guard = state.metrics.begin("/api-status");
    let status = state.keys.status();
    let response = Json(serde_json::json!({
        "total_keys": status.total_keys,
        "current_key_index": status.current_key(),
        "keys_remaining": status.keys_remaining(),
    }))
    .into_response();
    guard.finish(response.status().as_u16());
    response
}

/// Body is read as raw bytes so a malformed payload gets the same
/// `{"detail"}` error shape as every other failure.
async fn intent_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let mut guard = state.metrics.begin("/get_user_intent");
    let response = match resolve_intent(&state, &body, &request_id()).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => e.into_response(),
    };
    guard.finish(response.status().as_u16());
    response
}

#[instrument(skip_all, fields(request_id = %request_id))]
async fn resolve_intent(
    state: &AppState,
    body: &[u8],
    request_id: &str,
) -> Result<IntentResult, ApiError> {
    let request: IntentRequest = serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "invalid intent request body");
        ApiError::Internal(e.to_string())
    })?;
    let text = request.audio_text.trim().to_owned();
    info!(text = %text, "processing intent request");

    let temperature = state.temperature;
    let result = state
        .keys
        .execute_with_retry(
            |client: Arc<CompletionClient>, text: String| async move {
                intent::extract_intent(&client, &text, temperature).await
            },
            text,
        )
        .await
        .map_err(|e| {
            error!(error = %e, "intent request failed");
            ApiError::from(e)
        })?;

    info!(intent = ?result.intent(), "intent resolved");
    Ok(result)
}

async fn caption_handler(State(state): State<AppState>, multipart: Multipart) -> Response {
    let mut guard = state.metrics.begin("/caption");
    let response = match caption_upload(&state, multipart, &request_id()).await {
        Ok(caption) => Json(serde_json::json!({ "caption": caption })).into_response(),
        Err(e) => e.into_response(),
    };
    guard.finish(response.status().as_u16());
    response
}

#[instrument(skip_all, fields(request_id = %request_id))]
async fn caption_upload(
    state: &AppState,
    mut multipart: Multipart,
    request_id: &str,
) -> Result<String, ApiError> {
    let image = read_file_field(&mut multipart).await?;
    info!(bytes = image.len(), "captioning image");
    let caption = state.captioner.caption(image).await.map_err(|e| {
        error!(error = %e, "captioning failed");
        ApiError::from(e)
    })?;
    info!(caption = %caption, "caption generated");
    Ok(caption)
}

/// Bytes of the multipart field named `file`.
async fn read_file_field(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            return field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()));
        }
    }
    Err(ApiError::BadRequest("missing multipart field `file`".into()))
}

/// Liveness plus request counters.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.keys.status();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
        "keys": {
            "total": status.total_keys,
            "current": status.current_key(),
        },
    }))
}

/// Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
