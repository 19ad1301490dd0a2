// src/services/trend.rs
use crate::models::{RegistryEntry, TrendDirection, TrendRecord};
use crate::services::cache::{CacheManager, STALE_TTL};
use crate::upstream::UpstreamClient;
use std::time::Duration;

const CONCLUSIONS_TTL: Duration = Duration::from_secs(600); // 10 min
const WINDOW: usize = 5;

fn score(conclusion: &str) -> u32 {
    match conclusion {
        "success" => 2,
        "failure" | "cancelled" | "timed_out" | "action_required" | "startup_failure"
        | "stale" => 0,
        // neutral, skipped, in_progress, unknown, anything else
        _ => 1,
    }
}

/// Directional signal from up to 5 conclusions, newest first. Newest score
/// against oldest decides; a tie falls back to comparing the average of
/// the newer half (ceil(n/2) entries) against the rest.
pub fn direction(conclusions: &[String]) -> TrendDirection {
    match conclusions.len() {
        0 => return TrendDirection::Unknown,
        1 => return TrendDirection::Flat,
        _ => {}
    }

    let newest = score(&conclusions[0]);
    let oldest = score(&conclusions[conclusions.len() - 1]);
    if newest > oldest {
        return TrendDirection::Up;
    }
    if newest < oldest {
        return TrendDirection::Down;
    }

    let half = (conclusions.len() + 1) / 2;
    let avg = |slice: &[String]| {
        slice.iter().map(|c| score(c) as f64).sum::<f64>() / slice.len() as f64
    };
    let recent = avg(&conclusions[..half]);
    let earlier = avg(&conclusions[half..]);
    if recent > earlier {
        TrendDirection::Up
    } else if recent < earlier {
        TrendDirection::Down
    } else {
        TrendDirection::Flat
    }
}

pub struct TrendService {
    cache: CacheManager,
    upstream: UpstreamClient,
}

impl TrendService {
    pub fn new(cache: CacheManager, upstream: UpstreamClient) -> Self {
        Self { cache, upstream }
    }

    /// Last ≤5 conclusions for one repo, newest first. No credential or
    /// total cache exhaustion both degrade to an empty list, never an
    /// error.
    pub async fn conclusions(&self, repo: &str) -> Vec<String> {
        if !self.upstream.has_credential() {
            return Vec::new();
        }

        let key = format!("conclusions:{}", repo.to_lowercase());
        let loaded = self
            .cache
            .load(&key, CONCLUSIONS_TTL, STALE_TTL, || async {
                self.upstream.recent_conclusions(repo, WINDOW).await
            })
            .await;

        match loaded {
            Some(loaded) => loaded.value.into_iter().take(WINDOW).collect(),
            None => Vec::new(),
        }
    }

    pub async fn record_for(&self, entry: &RegistryEntry) -> TrendRecord {
        let last5 = self.conclusions(&entry.repo).await;
        TrendRecord {
            repo: entry.repo.clone(),
            criticality: entry.criticality,
            direction: direction(&last5),
            last5,
        }
    }
}
