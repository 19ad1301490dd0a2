// src/handlers/api.rs
use crate::models::*;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Service banner, also the 200 for uptime probes. Exempt from rate
/// limiting.
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "fleetpulse".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            "/api/status".to_string(),
            "/api/uptime".to_string(),
            "/api/pulse".to_string(),
            "/api/sync".to_string(),
            "/api/tools".to_string(),
            "/api/health".to_string(),
            "/api/health/trend".to_string(),
            "/api/changelog".to_string(),
            "/api/stats".to_string(),
            "/api/history".to_string(),
            "/api/metrics".to_string(),
        ],
    })
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (record, online) = state.presence().current().await;
    Json(StatusResponse {
        online,
        state: record.as_ref().map(|r| r.state.clone()),
        message: record.as_ref().and_then(|r| r.message.clone()),
        last_seen: record.map(|r| r.timestamp),
    })
}

pub async fn get_uptime(State(state): State<Arc<AppState>>) -> Json<UptimeResponse> {
    let (record, online) = state.presence().current().await;
    Json(UptimeResponse {
        up: online,
        since: record.map(|r| r.timestamp),
    })
}

pub async fn get_pulse(State(state): State<Arc<AppState>>) -> Json<PulseResponse> {
    let (_, online) = state.presence().current().await;
    Json(PulseResponse {
        pulse: if online { "alive" } else { "quiet" }.to_string(),
    })
}

/// Everything a client needs in one round trip. Always 200: a missing
/// fleet snapshot degrades to UNKNOWN here, only /api/health surfaces it.
pub async fn get_sync(State(state): State<Arc<AppState>>) -> Json<SyncResponse> {
    let (record, online) = state.presence().current().await;
    let registry = state.registry();
    let fleet_status = match state.health().fleet_snapshot(&registry).await {
        Ok(snapshot) => snapshot.status,
        Err(_) => FleetStatus::Unknown,
    };
    let history = state.history().read(5).await;
    let metrics = state.metrics.snapshot().await;

    Json(SyncResponse {
        online,
        presence: record,
        fleet_status,
        history,
        metrics,
    })
}

pub async fn get_tools(State(state): State<Arc<AppState>>) -> Json<Vec<RegistryEntry>> {
    Json(state.registry().entries().await)
}

/// The one read path where upstream failure is visible: with no snapshot
/// of any age there is no safe verdict to report.
pub async fn get_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FleetHealthSnapshot>, StatusCode> {
    let registry = state.registry();
    state
        .health()
        .fleet_snapshot(&registry)
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}

pub async fn get_trend(State(state): State<Arc<AppState>>) -> Json<Vec<TrendRecord>> {
    let entries = state.registry().entries().await;
    let trend = state.trend();
    let records = join_all(entries.iter().map(|e| trend.record_for(e))).await;
    Json(records)
}

pub async fn get_changelog(State(state): State<Arc<AppState>>) -> Json<Vec<ChangelogEntry>> {
    let registry = state.registry();
    Json(state.changelog().entries(&registry).await)
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let entries = state.registry().entries().await;

    let mut by_criticality: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_tier: BTreeMap<String, usize> = BTreeMap::new();
    for entry in &entries {
        let criticality = serde_json::to_value(entry.criticality)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let tier = serde_json::to_value(entry.tier)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        *by_criticality.entry(criticality).or_default() += 1;
        *by_tier.entry(tier).or_default() += 1;
    }

    let history_entries = state.history().read(HISTORY_CAP).await.len();
    let (_, online) = state.presence().current().await;
    let metrics = state.metrics.snapshot().await;

    Json(StatsResponse {
        repos_total: entries.len(),
        by_criticality,
        by_tier,
        history_entries,
        online,
        metrics,
    })
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<HistoryEntry>> {
    let limit = crate::services::history::parse_limit(params.get("limit").map(String::as_str));
    Json(state.history().read(limit).await)
}

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsState> {
    Json(state.metrics.snapshot().await)
}
