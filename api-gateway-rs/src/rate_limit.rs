// Rate Limiting Module using a simple in-memory fixed window per client IP.
// Limiter state is owned by `AppState`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use relay_config::RateLimitConfig;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::AppState;

// Entries beyond this count trigger a sweep of expired windows
const SWEEP_THRESHOLD: usize = 10_000;

// Per-client rate limit tracking
#[derive(Clone, Debug)]
struct RateLimitInfo {
    count: u32,
    window_start: Instant,
}

/// Fixed-window limiter keyed by client address
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: RwLock<HashMap<String, RateLimitInfo>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Count one request for `client`; `Err` carries seconds until the window resets
    pub async fn check(&self, client: &str) -> Result<(), u64> {
        self.check_at(client, Instant::now()).await
    }

    pub async fn check_at(&self, client: &str, now: Instant) -> Result<(), u64> {
        let window = self.config.window;
        let mut map = self.clients.write().await;

        if map.len() >= SWEEP_THRESHOLD {
            map.retain(|_, info| now.duration_since(info.window_start) < window);
        }

        let entry = map.entry(client.to_string()).or_insert_with(|| RateLimitInfo {
            count: 0,
            window_start: now,
        });

        // Reset window if expired
        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.config.max_requests {
            let remaining = window.saturating_sub(now.duration_since(entry.window_start));
            return Err(remaining.as_secs().max(1));
        }

        entry.count += 1;
        Ok(())
    }

    /// Requests counted for `client` in the window that contains `now`
    pub async fn current_count(&self, client: &str, now: Instant) -> u32 {
        let map = self.clients.read().await;
        map.get(client)
            .filter(|info| now.duration_since(info.window_start) < self.config.window)
            .map(|info| info.count)
            .unwrap_or(0)
    }
}

// Connection address first, then the first X-Forwarded-For hop
fn client_key(req: &Request<Body>) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    forwarded_for(req.headers()).unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Middleware applying the limiter to everything under `/api/`
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !req.uri().path().starts_with("/api/") {
        return next.run(req).await;
    }

    let client = client_key(&req);

    if let Err(retry_after_secs) = state.rate_limiter.check(&client).await {
        tracing::warn!(%client, path = %req.uri().path(), "Rate limit exceeded");
        return ApiError::RateLimited { retry_after_secs }.into_response();
    }

    next.run(req).await
}
