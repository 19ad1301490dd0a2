// src/services/registry.rs
use crate::models::RegistryEntry;
use crate::services::cache::{CacheManager, STALE_TTL};
use crate::upstream::UpstreamClient;
use std::collections::HashSet;
use std::time::Duration;

const REGISTRY_KEY: &str = "registry";
const REGISTRY_TTL: Duration = Duration::from_secs(600); // 10 min

/// Tool registry: the list of repos the fleet tracks, fetched from a JSON
/// file in the configured registry repo.
pub struct RegistryService {
    cache: CacheManager,
    upstream: UpstreamClient,
    repo: String,
    path: String,
}

/// Dedup by case-insensitive repo identity (first occurrence wins), then
/// sort lexicographically by repo. Upstream ordering is not trusted.
pub fn normalize_entries(entries: Vec<RegistryEntry>) -> Vec<RegistryEntry> {
    let mut seen = HashSet::new();
    let mut unique: Vec<RegistryEntry> = entries
        .into_iter()
        .filter(|e| seen.insert(e.repo.to_lowercase()))
        .collect();
    unique.sort_by(|a, b| a.repo.cmp(&b.repo));
    unique
}

impl RegistryService {
    pub fn new(cache: CacheManager, upstream: UpstreamClient, repo: String, path: String) -> Self {
        Self {
            cache,
            upstream,
            repo,
            path,
        }
    }

    /// The registry, or `None` when primary cache, upstream, and stale
    /// shadow are all unavailable. Health aggregation needs to tell that
    /// apart from a genuinely empty registry.
    pub async fn try_entries(&self) -> Option<Vec<RegistryEntry>> {
        let loaded = self
            .cache
            .load(REGISTRY_KEY, REGISTRY_TTL, STALE_TTL, || async {
                let raw = self
                    .upstream
                    .registry_entries(&self.repo, &self.path)
                    .await?;
                Ok(normalize_entries(raw))
            })
            .await?;

        // Cached copies may predate a normalization change, so apply the
        // dedup/sort pass on the way out as well
        Some(normalize_entries(loaded.value))
    }

    /// The served registry. Exhaustion of all cache tiers degrades to an
    /// empty list, never an error.
    pub async fn entries(&self) -> Vec<RegistryEntry> {
        self.try_entries().await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Criticality, Tier};

    fn entry(repo: &str) -> RegistryEntry {
        RegistryEntry {
            repo: repo.to_string(),
            criticality: Criticality::Medium,
            tier: Tier::Core,
            description: String::new(),
        }
    }

    #[test]
    fn test_dedup_is_case_insensitive_first_wins() {
        let entries = vec![entry("acme/Deploy"), entry("acme/deploy"), entry("acme/site")];
        let normalized = normalize_entries(entries);
        assert_eq!(normalized.len(), 2);
        // First occurrence kept its original casing
        assert!(normalized.iter().any(|e| e.repo == "acme/Deploy"));
    }

    #[test]
    fn test_sorted_lexicographically() {
        let entries = vec![entry("acme/zeta"), entry("acme/alpha"), entry("acme/mid")];
        let normalized = normalize_entries(entries);
        let repos: Vec<&str> = normalized.iter().map(|e| e.repo.as_str()).collect();
        assert_eq!(repos, vec!["acme/alpha", "acme/mid", "acme/zeta"]);
    }

    #[test]
    fn test_empty_is_fine() {
        assert!(normalize_entries(Vec::new()).is_empty());
    }
}
