//! HTTP control plane (§4.M, §6): health, status, channel/session/metrics introspection, and
//! config reload. Modeled on the pack's own `serve` crate's composition — `AppState` behind an
//! `Arc`, `with_state`, one bearer-token extractor guarding every route but `/api/health`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{FromRequestParts, State};
use axum::http::{request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{async_trait, Json, Router};
use gateway::{AdapterState, AgentBridge, AttachmentHandler, ChannelManager, MetricsCollector, SecurityManager};
use serde::Serialize;
use tokio::sync::RwLock;

pub struct AppState {
    pub bridge: Arc<AgentBridge>,
    pub manager: Arc<ChannelManager>,
    pub metrics: Arc<MetricsCollector>,
    pub security: Arc<SecurityManager>,
    pub attachments: Arc<AttachmentHandler>,
    pub config: Arc<RwLock<config::GatewayConfig>>,
    pub config_path: PathBuf,
    pub auth_token: Option<String>,
    pub started_at: Instant,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/channels", get(channels))
        .route("/api/sessions", get(sessions))
        .route("/api/metrics", get(metrics))
        .route("/api/reload", post(reload))
        .with_state(state)
}

/// Bearer-token guard (mirrors the distilled spec's `HTTPBearer`+`Depends`, expressed as an
/// axum extractor). Absent when no `auth.token` is configured.
pub struct BearerAuth;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for BearerAuth {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.auth_token.as_ref() else {
            return Ok(BearerAuth);
        };
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        match header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) if token == expected => Ok(BearerAuth),
            _ => Err((StatusCode::UNAUTHORIZED, "missing or invalid bearer token")),
        }
    }
}

#[derive(Serialize)]
struct HealthCheck {
    name: String,
    ok: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
    timestamp: chrono::DateTime<chrono::Utc>,
    channels: std::collections::HashMap<String, String>,
    checks: Vec<HealthCheck>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let channel_states = state.manager.channel_states().await;
    let channels: std::collections::HashMap<String, String> = channel_states
        .iter()
        .map(|(name, s)| (name.clone(), adapter_state_label(*s).to_string()))
        .collect();

    let checks = vec![HealthCheck {
        name: "config_loaded".to_string(),
        ok: true,
    }];

    let any_reconnecting = channel_states.iter().any(|(_, s)| *s == AdapterState::Reconnecting);
    let any_stopped = channel_states.iter().any(|(_, s)| *s == AdapterState::Stopped);
    let status = if any_stopped {
        "degraded"
    } else if any_reconnecting {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now(),
        channels,
        checks,
    })
}

fn adapter_state_label(state: AdapterState) -> &'static str {
    match state {
        AdapterState::Created => "created",
        AdapterState::Started => "started",
        AdapterState::Connected => "connected",
        AdapterState::Reconnecting => "reconnecting",
        AdapterState::Stopped => "stopped",
    }
}

#[derive(Serialize)]
struct StatusResponse {
    uptime_seconds: u64,
    active_sessions: usize,
    registered_channels: usize,
}

async fn status(_auth: BearerAuth, State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_sessions: state.bridge.get_active_session_count().await,
        registered_channels: state.manager.channel_names().await.len(),
    })
}

#[derive(Serialize)]
struct ChannelsResponse {
    channels: std::collections::HashMap<String, String>,
}

async fn channels(_auth: BearerAuth, State(state): State<Arc<AppState>>) -> Json<ChannelsResponse> {
    let channels = state
        .manager
        .channel_states()
        .await
        .into_iter()
        .map(|(name, s)| (name, adapter_state_label(s).to_string()))
        .collect();
    Json(ChannelsResponse { channels })
}

#[derive(Serialize)]
struct SessionsResponse {
    count: usize,
    sessions: Vec<gateway_types::ChannelSession>,
}

async fn sessions(_auth: BearerAuth, State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    let sessions = state.bridge.list_sessions().await;
    Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    })
}

async fn metrics(_auth: BearerAuth, State(state): State<Arc<AppState>>) -> Json<gateway::MetricsSummary> {
    Json(state.metrics.summary())
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn reload(_auth: BearerAuth, State(state): State<Arc<AppState>>) -> Response {
    match config::load(Some(&state.config_path)) {
        Ok(new_config) => {
            let old_config = state.config.read().await.clone();
            state.security.reload_config(&new_config);
            let newly_appeared = state.manager.apply_config_change(&old_config, &new_config).await;
            if !newly_appeared.is_empty() {
                crate::register_and_start_new_channels(
                    &state.manager,
                    &new_config,
                    &state.attachments,
                    &state.metrics,
                    &newly_appeared,
                )
                .await;
            }
            *state.config.write().await = new_config;
            Json(ReloadResponse { success: true, error: None }).into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err, "config reload failed, keeping prior configuration");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ReloadResponse {
                    success: false,
                    error: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}
