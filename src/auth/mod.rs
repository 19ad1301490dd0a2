// src/auth/mod.rs
use crate::kv::KvStore;
use crate::middleware::rate_limit::extract_client_id;
use crate::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::StatusCode};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const AUDIT_KEY: &str = "audit:auth";
const AUDIT_CAP: usize = 50;
const AUDIT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Bearer-token gate for mutation endpoints. Rejections carry no detail
/// beyond 401; failed attempts are recorded fire-and-forget for audit.
#[derive(Debug)]
pub struct AdminToken;

/// Constant-time comparison to prevent timing attacks. A missing or
/// non-Bearer header never matches.
fn token_matches(provided: Option<&str>, expected: &str) -> bool {
    use subtle::ConstantTimeEq;
    match provided {
        Some(token) => token.as_bytes().ct_eq(expected.as_bytes()).into(),
        None => false,
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminToken
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let state = parts
            .extensions
            .get::<Arc<AppState>>()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
            .clone();

        let provided = parts
            .headers
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));

        if token_matches(provided, &state.config.admin_token) {
            Ok(AdminToken)
        } else {
            let client = extract_client_id(&parts.headers);
            tracing::warn!("rejected admin request from {}", client);
            let kv = state.kv.clone();
            tokio::spawn(async move {
                record_failure(kv, client).await;
            });
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Append a failed attempt to the capped audit log. Best effort: the 401
/// is never delayed or failed on account of this write.
async fn record_failure(kv: Arc<dyn KvStore>, client: String) {
    let mut entries: Vec<serde_json::Value> = kv
        .get(AUDIT_KEY)
        .await
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    entries.insert(
        0,
        json!({
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "client": client,
        }),
    );
    entries.truncate(AUDIT_CAP);

    if let Ok(raw) = serde_json::to_string(&entries) {
        if let Err(e) = kv.put(AUDIT_KEY, &raw, Some(AUDIT_TTL)).await {
            tracing::warn!("audit write failed: {}", e);
        }
    }
}
