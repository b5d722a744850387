// api-gateway-rs/src/lib.rs
// HTTP entry point of the prompt optimizer
//
// Routes:
// - POST /api/optimize-prompt  relay a prompt, answer { results: [..] }
// - GET  /api/health           liveness probe
// - GET  /                     service descriptor

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, HeaderValue, Method,
    },
    middleware,
    response::IntoResponse,
    routing::{get, post},
    BoxError, Json, Router,
};
use chrono::{SecondsFormat, Utc};
use prompt_relay::PromptRelay;
use relay_config::RelayConfig;
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error;
pub mod rate_limit;
pub mod telemetry;
pub mod validation;

use error::ApiError;
use rate_limit::{rate_limit_middleware, RateLimiter};
use validation::RequestValidator;

/// Optimize response body
#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub results: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// Shared gateway state, built once and handed to every handler
pub struct AppState {
    pub relay: PromptRelay,
    pub config: Arc<RelayConfig>,
    pub validator: RequestValidator,
    pub rate_limiter: RateLimiter,
    cors: CorsLayer,
}

impl AppState {
    pub fn new(config: Arc<RelayConfig>) -> Result<Self, BoxError> {
        let relay = PromptRelay::new(config.clone())?;
        let validator = RequestValidator::new()?;
        let rate_limiter = RateLimiter::new(config.rate_limit);
        let cors = cors_layer(&config)?;

        Ok(Self {
            relay,
            config,
            validator,
            rate_limiter,
            cors,
        })
    }
}

fn cors_layer(config: &RelayConfig) -> Result<CorsLayer, BoxError> {
    let origin: AllowOrigin = if config.allowed_origins.is_empty() {
        if config.environment.is_production() {
            tracing::warn!("ALLOWED_ORIGIN is not set, accepting requests from any origin");
        }
        Any.into()
    } else {
        let origins = config
            .allowed_origins
            .iter()
            .map(|origin| HeaderValue::from_str(origin))
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]))
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = state.cors.clone();
    let body_limit = state.config.body_limit_bytes;

    Router::new()
        .route("/", get(root_handler))
        .route("/api/health", get(health_handler))
        .route("/api/optimize-prompt", post(optimize_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "Prompt Optimizer API",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.config.model_name,
        "endpoints": [
            "POST /api/optimize-prompt",
            "GET /api/health"
        ]
    }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

async fn optimize_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<OptimizeResponse>, ApiError> {
    let body = body?;
    let request = state.validator.parse_optimize_request(&headers, &body)?;

    let candidates = state.relay.optimize(&request).await.map_err(|err| {
        tracing::warn!(kind = err.kind(), error = %err, "Optimize request failed");
        ApiError::from_relay(err, state.config.environment)
    })?;

    Ok(Json(OptimizeResponse {
        results: candidates.into_vec(),
    }))
}
