//! Gateway HTTP server: liveness, health, and the LINE webhook callback.

use crate::channels::{signature, LineChannel, WebhookBody};
use crate::config::{self, Config};
use crate::dispatch::{Dispatcher, PromptPolicy};
use crate::llm::OpenAiClient;
use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

const LIVENESS_PAGE: &str = "<p>Hello, World!</p>";
const PANIC_BODY: &str = "Something broke!";

/// Shared state for the gateway. Immutable after startup.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Channel secret for X-Line-Signature verification.
    pub channel_secret: String,
    pub dispatcher: Dispatcher,
}

impl GatewayState {
    /// Build state with the real LINE and OpenAI-compatible clients from config.
    pub fn from_config(config: Config) -> Result<Self> {
        let Some(channel_secret) = config::resolve_line_channel_secret(&config) else {
            anyhow::bail!(
                "refusing to start gateway without a channel secret (set channels.line.channelSecret or LINE_CHANNEL_SECRET)"
            );
        };
        let callback_path = normalize_path(&config.gateway.callback_path);
        if callback_path == "/" || callback_path == "/health" {
            anyhow::bail!("callback path {} collides with a built-in route", callback_path);
        }
        let access_token = config::resolve_line_access_token(&config);
        if access_token.is_none() {
            log::warn!("gateway: no LINE channel access token configured; replies will fail");
        }
        let line = LineChannel::new(access_token, Some(config.channels.line.api_base_url.clone()));
        let completion = OpenAiClient::new(
            Some(config.completion.base_url.clone()),
            config::resolve_completion_api_key(&config),
            config.completion.model.clone(),
        );
        let policy = PromptPolicy::from(&config.completion);
        Ok(Self {
            config: Arc::new(config),
            channel_secret,
            dispatcher: Dispatcher::new(Arc::new(completion), Arc::new(line), policy),
        })
    }
}

/// Routes: `GET /`, `GET /health`, `POST {callbackPath}`. Panics in handlers become `500 Something broke!`.
pub fn build_router(state: GatewayState) -> Router {
    let callback_path = normalize_path(&state.config.gateway.callback_path);
    Router::new()
        .route("/", get(liveness_http))
        .route("/health", get(health_http))
        .route(&callback_path, post(callback))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

fn normalize_path(path: &str) -> String {
    let p = path.trim();
    if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{}", p)
    }
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Startup fails without a channel secret, since every callback must be authenticated.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let port = config.gateway.port;
    let bind = config.gateway.bind.trim().to_string();
    let state = GatewayState::from_config(config)?;
    log::info!(
        "gateway: completion model {}, callback path {}",
        state.config.completion.model,
        state.config.gateway.callback_path
    );
    let app = build_router(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST /callback — verifies X-Line-Signature, dispatches the batch, returns one result per event.
async fn callback(State(state): State<GatewayState>, headers: HeaderMap, body: Bytes) -> Response {
    log::debug!("callback: received {}", String::from_utf8_lossy(&body));
    let provided = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided.is_empty() || !signature::verify_signature(&state.channel_secret, &body, provided) {
        log::info!("callback: invalid signature, check the channel secret");
        return StatusCode::BAD_REQUEST.into_response();
    }
    let batch: WebhookBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            log::info!("callback: malformed body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    match state.dispatcher.dispatch(&batch.events).await {
        Ok(results) => Json(results).into_response(),
        Err(e) => {
            log::error!("callback: dispatch failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET / returns a static page (liveness check for hosting platforms).
async fn liveness_http() -> Html<&'static str> {
    Html(LIVENESS_PAGE)
}

/// GET /health returns a simple health JSON (for uptime checks).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "channel": "line",
        "model": state.config.completion.model,
    }))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    log::error!("gateway: handler panicked: {}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        PANIC_BODY,
    )
        .into_response()
}
