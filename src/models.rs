// src/models.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

pub const HISTORY_CAP: usize = 20;

/// How much the fleet cares when this repo breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Ops,
    Infra,
    Core,
    Quality,
    Policy,
    Template,
}

/// One registered repo in the tool registry. Served deduplicated
/// (case-insensitive on `repo`, first occurrence wins) and sorted
/// lexicographically by `repo` so clients see a deterministic order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub repo: String,
    pub criticality: Criticality,
    pub tier: Tier,
    #[serde(default)]
    pub description: String,
}

/// Fleet-wide health verdict. The derived `Ord` follows variant order:
/// UNKNOWN < GREEN < YELLOW < RED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FleetStatus {
    Unknown,
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetRepoHealth {
    pub repo: String,
    pub criticality: Criticality,
    pub last_run: Option<String>,
    pub conclusion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetHealthSnapshot {
    pub status: FleetStatus,
    pub repos: Vec<FleetRepoHealth>,
    pub checked_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendRecord {
    pub repo: String,
    pub criticality: Criticality,
    pub last5: Vec<String>,
    pub direction: TrendDirection,
}

/// One activity-log entry. `hash` is caller-supplied or derived from the
/// timestamp so every entry stays referenceable without client input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: i64,
    pub desc: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub hash: String,
}

/// Best-effort request counters. Persisted and process-local copies are
/// reconciled by element-wise max, never summed or overwritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsState {
    pub requests_total: u64,
    pub kv_hits: u64,
    pub kv_misses: u64,
}

impl MetricsState {
    pub fn max_merge(&self, other: &MetricsState) -> MetricsState {
        MetricsState {
            requests_total: self.requests_total.max(other.requests_total),
            kv_hits: self.kv_hits.max(other.kv_hits),
            kv_misses: self.kv_misses.max(other.kv_misses),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub repo: String,
    pub sha: String,
    pub message: String,
    pub date: Option<String>,
}

// Request bodies

#[derive(Debug, Deserialize, Validate)]
pub struct PresenceUpdate {
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub state: String,
    #[validate(length(max = 280, message = "must be at most 280 characters"))]
    pub message: Option<String>,
    #[validate(range(min = 1, message = "must be positive"))]
    pub ttl_seconds: Option<u64>,
}

// Response types

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub online: bool,
    pub state: Option<String>,
    pub message: Option<String>,
    pub last_seen: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UptimeResponse {
    pub up: bool,
    pub since: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PulseResponse {
    pub pulse: String,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub online: bool,
    pub presence: Option<PresenceRecord>,
    pub fleet_status: FleetStatus,
    pub history: Vec<HistoryEntry>,
    pub metrics: MetricsState,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub repos_total: usize,
    pub by_criticality: BTreeMap<String, usize>,
    pub by_tier: BTreeMap<String, usize>,
    pub history_entries: usize,
    pub online: bool,
    pub metrics: MetricsState,
}

#[derive(Debug, Serialize)]
pub struct AppendResponse {
    pub appended: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
