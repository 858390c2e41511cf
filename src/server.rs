//! HTTP surface: metrics exposition, health probes and the GitLab webhook.

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::ConfigHandle;
use crate::controller::{Controller, WebhookEvent};
use crate::metrics::Registry;
use crate::providers::GitLabClient;

const GITLAB_TOKEN_HEADER: &str = "x-gitlab-token";

#[derive(Clone)]
pub struct AppState {
    pub config: ConfigHandle,
    pub controller: Arc<Controller>,
    pub registry: Arc<Registry>,
    pub gitlab: Arc<GitLabClient>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .route("/webhook", post(webhook))
        .with_state(state)
}

/// Serves until the listener fails or `shutdown` resolves.
pub async fn serve(
    listen_address: &str,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(listen_address)
        .await
        .with_context(|| format!("Failed to listen on {listen_address}"))?;
    info!("listening on {listen_address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.registry.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!("could not render metrics: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn live() -> StatusCode {
    StatusCode::OK
}

/// Ready once GitLab itself answers.
async fn ready(State(state): State<AppState>) -> StatusCode {
    if state.gitlab.is_reachable().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let config = state.config.snapshot();
    let webhook = &config.server.webhook;

    if !webhook.enabled {
        return StatusCode::NOT_FOUND;
    }

    if let Some(secret) = webhook.secret_token.as_deref() {
        let token = headers
            .get(GITLAB_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if token != Some(secret) {
            warn!("rejected webhook with a missing or invalid token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("could not decode webhook payload: {err}");
            return StatusCode::BAD_REQUEST;
        }
    };

    // GitLab disables hooks that keep failing, so other kinds are acknowledged
    let object_kind = payload
        .get("object_kind")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    if !WebhookEvent::handles(&object_kind) {
        debug!("ignoring webhook of kind {object_kind:?}");
        return StatusCode::ACCEPTED;
    }

    let event: WebhookEvent = match serde_json::from_value(payload) {
        Ok(event) => event,
        Err(err) => {
            warn!("could not decode {object_kind} webhook: {err}");
            return StatusCode::BAD_REQUEST;
        }
    };

    let controller = Arc::clone(&state.controller);
    tokio::spawn(async move { controller.process_event(event).await });

    StatusCode::ACCEPTED
}
