// src/routes.rs
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{admin, api};
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ==================
        // PUBLIC READ API (always 200 with best-available data)
        // ==================
        .route("/", get(api::service_info))
        .route("/api/status", get(api::get_status))
        .route("/api/uptime", get(api::get_uptime))
        .route("/api/pulse", get(api::get_pulse))
        .route("/api/sync", get(api::get_sync))
        .route("/api/tools", get(api::get_tools))
        .route("/api/health", get(api::get_health))
        .route("/api/health/trend", get(api::get_trend))
        .route("/api/changelog", get(api::get_changelog))
        .route("/api/stats", get(api::get_stats))
        .route("/api/history", get(api::get_history))
        .route("/api/metrics", get(api::get_metrics))
        // ==================
        // ADMIN WRITE API (bearer token)
        // ==================
        .route("/api/presence", post(admin::update_presence))
        .route("/api/history", post(admin::append_history))
        .with_state(state.clone())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit::public_rate_limit,
        ))
        // Outermost of the two: every request is counted, including the
        // ones the rate limiter turns away
        .layer(axum::middleware::from_fn_with_state(
            state,
            crate::middleware::metrics::track_requests,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
