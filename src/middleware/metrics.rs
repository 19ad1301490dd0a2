// src/middleware/metrics.rs
use crate::AppState;
use axum::{extract::Request, extract::State, middleware::Next, response::Response};
use std::sync::Arc;

/// Count every request through the reconciler before handling it.
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    state.metrics.record_request().await;
    next.run(request).await
}
