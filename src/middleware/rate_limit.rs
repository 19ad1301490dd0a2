// src/middleware/rate_limit.rs
use crate::kv::KvStore;
use crate::models::ErrorBody;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(60);

/// Fixed-window counter persisted per client identity. The window resets
/// wholesale at `reset_at`, so a client can burst up to 2N-1 requests
/// across a boundary; that is a documented limitation, not a bug.
#[derive(Debug, Serialize, Deserialize)]
struct RateLimitWindow {
    count: i64,
    reset_at: i64,
}

#[derive(Debug)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_secs: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KvStore>, max_requests: u32) -> Self {
        Self { kv, max_requests }
    }

    async fn load_window(&self, key: &str, now_ms: i64) -> RateLimitWindow {
        let parsed = self
            .kv
            .get(key)
            .await
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str::<RateLimitWindow>(&raw).ok());

        match parsed {
            // Absent, expired, or structurally invalid all mean a fresh
            // window, never an error
            Some(w) if w.reset_at > now_ms && w.count >= 0 => w,
            _ => RateLimitWindow {
                count: 0,
                reset_at: now_ms + WINDOW.as_millis() as i64,
            },
        }
    }

    pub async fn allow(&self, client_id: &str) -> RateLimitDecision {
        let key = format!("ratelimit:{}", client_id);
        let now = chrono::Utc::now().timestamp_millis();
        let mut window = self.load_window(&key, now).await;

        let remaining_ms = (window.reset_at - now).max(0) as u64;
        if window.count >= self.max_requests as i64 {
            // Persist unchanged so the window keeps expiring on schedule
            self.persist(&key, &window, remaining_ms).await;
            return RateLimitDecision {
                allowed: false,
                retry_after_secs: remaining_ms.div_ceil(1000).max(1),
            };
        }

        window.count += 1;
        self.persist(&key, &window, WINDOW.as_millis() as u64).await;
        RateLimitDecision {
            allowed: true,
            retry_after_secs: 0,
        }
    }

    async fn persist(&self, key: &str, window: &RateLimitWindow, ttl_ms: u64) {
        if let Ok(raw) = serde_json::to_string(window) {
            let ttl = Duration::from_millis(ttl_ms.max(1000));
            if let Err(e) = self.kv.put(key, &raw, Some(ttl)).await {
                tracing::warn!("rate limit window write failed: {}", e);
            }
        }
    }
}

/// Extract client identity from the trusted proxy header chain.
pub fn extract_client_id(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // First hop is the client's original address
            if let Some(ip) = forwarded_str.split(',').next() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    "unknown".to_string()
}

fn is_limited(method: &Method, path: &str) -> bool {
    // Only unauthenticated public GET reads are limited; the root banner
    // and the metrics path are exempt, and mutations are gated by the
    // admin token instead
    *method == Method::GET && path.starts_with("/api/") && path != "/api/metrics"
}

pub async fn public_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !is_limited(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let client_id = extract_client_id(request.headers());
    let decision = state.rate_limiter.allow(&client_id).await;
    if decision.allowed {
        return next.run(request).await;
    }

    tracing::warn!(
        "rate limit exceeded for client {} on {}",
        client_id,
        request.uri().path()
    );
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, decision.retry_after_secs.to_string())],
        Json(ErrorBody {
            error: "rate limit exceeded".to_string(),
        }),
    )
        .into_response()
}
