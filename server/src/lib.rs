pub mod config;
pub mod error;
pub mod routes;
pub mod validation;
pub mod ws;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use playback_core::AudioStreamSource;
use speech_api::{SpeechClient, TokenProvider, VoiceCatalog};
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<dyn TokenProvider>,
    pub voices: Arc<dyn VoiceCatalog>,
    pub audio: Arc<dyn AudioStreamSource>,
    pub request_count: Arc<AtomicU64>,
    pub active_sessions: Arc<AtomicU64>,
    pub started_at: Instant,
    pub config: ServerConfig,
}

impl AppState {
    /// State backed by a single upstream client for all three roles.
    pub fn new(client: SpeechClient, config: ServerConfig) -> Self {
        let client = Arc::new(client);
        Self::with_providers(client.clone(), client.clone(), client, config)
    }

    pub fn with_providers(
        tokens: Arc<dyn TokenProvider>,
        voices: Arc<dyn VoiceCatalog>,
        audio: Arc<dyn AudioStreamSource>,
        config: ServerConfig,
    ) -> Self {
        Self {
            tokens,
            voices,
            audio,
            request_count: Arc::new(AtomicU64::new(0)),
            active_sessions: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
            config,
        }
    }

    pub fn count_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let Some(ref allowed_origins) = config.cors_allowed_origins else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        return base.allow_origin(Any);
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

/// Build the full application: routes at the root and under `/api`, plus
/// tracing, rate limiting, timeout and CORS middleware.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    // Global rate limit: all clients share one bucket, which behaves the
    // same behind proxies where peer addresses are meaningless.
    let per_second = (config.rate_limit_per_minute / 60).max(1) as u64;
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(per_second)
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(&config))
        .into_inner();

    let api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/healthz", get(routes::health_check))
        .route("/token", post(routes::issue_token))
        .route("/voices", get(routes::list_voices))
        .route("/metrics", get(routes::metrics_endpoint))
        .route("/ws/speak", get(ws::speak_ws));

    let app = Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .fallback(routes::not_found)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state);

    Ok(app)
}
