// src/services/health.rs
use crate::kv::KvStore;
use crate::models::{FleetHealthSnapshot, FleetRepoHealth, FleetStatus, RegistryEntry};
use crate::services::cache::{CacheManager, STALE_TTL};
use crate::services::registry::RegistryService;
use crate::upstream::UpstreamClient;
use anyhow::anyhow;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const SNAPSHOT_KEY: &str = "health:snapshot";
const SNAPSHOT_TTL: Duration = Duration::from_secs(300); // 5 min freshness window
const RUN_TTL: Duration = Duration::from_secs(600); // 10 min per-repo lookup

/// No snapshot of any age and the upstream is down. The single condition
/// in the service that surfaces to callers (as 503): there is no safe
/// default verdict for fleet health.
#[derive(Debug)]
pub struct HealthUnavailable;

/// Per-repo latest-run lookup as persisted by the cache tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunRecord {
    conclusion: String,
    last_run: Option<String>,
}

/// Map a CI run conclusion to a severity verdict.
pub fn severity(conclusion: &str) -> FleetStatus {
    match conclusion {
        "success" => FleetStatus::Green,
        "unknown" => FleetStatus::Unknown,
        "failure" | "cancelled" | "timed_out" | "action_required" | "startup_failure"
        | "stale" => FleetStatus::Red,
        // in_progress, neutral, skipped, and anything unrecognized
        _ => FleetStatus::Yellow,
    }
}

/// Fold per-repo severities to the fleet-wide maximum, short-circuiting
/// the moment a RED repo is found. An empty fleet is UNKNOWN.
pub fn aggregate_status(repos: &[FleetRepoHealth]) -> FleetStatus {
    let mut worst = FleetStatus::Unknown;
    for repo in repos {
        let s = severity(&repo.conclusion);
        if s == FleetStatus::Red {
            return FleetStatus::Red;
        }
        worst = worst.max(s);
    }
    worst
}

fn is_fresh(checked_at: &str, ttl: Duration) -> bool {
    match chrono::DateTime::parse_from_rfc3339(checked_at) {
        Ok(ts) => {
            let age = chrono::Utc::now().signed_duration_since(ts);
            age.num_milliseconds() >= 0 && age.num_milliseconds() < ttl.as_millis() as i64
        }
        Err(_) => false,
    }
}

pub struct HealthService {
    kv: Arc<dyn KvStore>,
    cache: CacheManager,
    upstream: UpstreamClient,
}

impl HealthService {
    pub fn new(kv: Arc<dyn KvStore>, cache: CacheManager, upstream: UpstreamClient) -> Self {
        Self {
            kv,
            cache,
            upstream,
        }
    }

    /// The fleet health snapshot: fresh cached copy if one exists, else a
    /// recomputation, else the last snapshot regardless of its own age.
    pub async fn fleet_snapshot(
        &self,
        registry: &RegistryService,
    ) -> Result<FleetHealthSnapshot, HealthUnavailable> {
        if let Some(snapshot) = self.read_snapshot().await {
            if is_fresh(&snapshot.checked_at, SNAPSHOT_TTL) {
                return Ok(snapshot);
            }
        }

        match self.compute(registry).await {
            Ok(snapshot) => {
                self.persist_snapshot(&snapshot).await;
                Ok(snapshot)
            }
            Err(e) => {
                tracing::warn!("fleet health aggregation failed, serving last snapshot: {}", e);
                self.read_snapshot().await.ok_or(HealthUnavailable)
            }
        }
    }

    async fn compute(&self, registry: &RegistryService) -> Result<FleetHealthSnapshot, anyhow::Error> {
        let entries = registry
            .try_entries()
            .await
            .ok_or_else(|| anyhow!("registry unavailable"))?;

        // Per-repo lookups are independent, so run them concurrently
        let results = join_all(entries.iter().map(|e| self.repo_health(e))).await;
        let mut repos = Vec::with_capacity(results.len());
        for result in results {
            repos.push(result?);
        }

        Ok(FleetHealthSnapshot {
            status: aggregate_status(&repos),
            repos,
            checked_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn repo_health(&self, entry: &RegistryEntry) -> Result<FleetRepoHealth, anyhow::Error> {
        // No credential: report "unknown" without spending the call
        if !self.upstream.has_credential() {
            return Ok(FleetRepoHealth {
                repo: entry.repo.clone(),
                criticality: entry.criticality,
                last_run: None,
                conclusion: "unknown".to_string(),
            });
        }

        let key = format!("run:{}", entry.repo.to_lowercase());
        let loaded = self
            .cache
            .load(&key, RUN_TTL, STALE_TTL, || async {
                let run = self.upstream.latest_run(&entry.repo).await?;
                Ok(RunRecord {
                    conclusion: run.conclusion,
                    last_run: run.last_run,
                })
            })
            .await
            .ok_or_else(|| anyhow!("run lookup exhausted for {}", entry.repo))?;

        Ok(FleetRepoHealth {
            repo: entry.repo.clone(),
            criticality: entry.criticality,
            last_run: loaded.value.last_run,
            conclusion: loaded.value.conclusion,
        })
    }

    async fn read_snapshot(&self) -> Option<FleetHealthSnapshot> {
        let raw = self.kv.get(SNAPSHOT_KEY).await.ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }

    async fn persist_snapshot(&self, snapshot: &FleetHealthSnapshot) {
        // Long TTL: freshness comes from the embedded checked_at, and an
        // old snapshot is still the fallback of last resort
        if let Ok(raw) = serde_json::to_string(snapshot) {
            if let Err(e) = self.kv.put(SNAPSHOT_KEY, &raw, Some(STALE_TTL)).await {
                tracing::warn!("health snapshot write failed: {}", e);
            }
        }
    }
}
