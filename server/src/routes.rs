use std::sync::atomic::Ordering;

use axum::{extract::State, Json};
use serde::Serialize;
use speech_api::{promote_voice, ClientError, Voice};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::AppState;

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub active_sessions: u64,
    pub uptime_seconds: u64,
}

pub async fn health_check() -> &'static str {
    "ok"
}

/// Exchange the server's API key for a scoped access token the client can
/// use against the synthesis endpoint.
pub async fn issue_token(State(state): State<AppState>) -> Result<Json<TokenResponse>, ApiError> {
    state.count_request();
    match state.tokens.issue_token().await {
        Ok(token) => Ok(Json(TokenResponse { token })),
        Err(e) => {
            warn!("Token error: {e}");
            Err(ApiError::Unauthorized)
        }
    }
}

pub async fn list_voices(State(state): State<AppState>) -> Result<Json<Vec<Voice>>, ApiError> {
    state.count_request();
    let mut voices = state.voices.list_voices().await.map_err(|e| {
        let details = match e {
            ClientError::Upstream { details, .. } => details,
            other => other.to_string(),
        };
        ApiError::Upstream {
            message: "Failed to fetch voices".to_string(),
            details,
        }
    })?;

    if promote_voice(&mut voices, &state.config.default_voice_name) {
        info!("promoted {} to default voice", state.config.default_voice_name);
    }
    Ok(Json(voices))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    // Get CPU usage (average across all cores)
    let cpu_usage = system.global_cpu_info().cpu_usage();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    Json(MetricsResponse {
        cpu_usage_percent: cpu_usage,
        memory_used_mb: memory_used / 1024 / 1024,
        memory_total_mb: memory_total / 1024 / 1024,
        memory_usage_percent,
        request_count: state.request_count.load(Ordering::Relaxed),
        active_sessions: state.active_sessions.load(Ordering::Relaxed),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("No such route".to_string())
}
