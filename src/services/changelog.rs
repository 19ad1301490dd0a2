// src/services/changelog.rs
use crate::models::ChangelogEntry;
use crate::services::cache::{CacheManager, STALE_TTL};
use crate::services::registry::RegistryService;
use crate::upstream::UpstreamClient;
use anyhow::anyhow;
use futures::future::join_all;
use std::time::Duration;

const CHANGELOG_KEY: &str = "changelog";
const CHANGELOG_TTL: Duration = Duration::from_secs(300); // 5 min
const COMMITS_PER_REPO: usize = 5;
const CHANGELOG_CAP: usize = 20;

/// Recent commits across the registry's repos, newest first, as one cached
/// dataset with the usual stale fallback.
pub struct ChangelogService {
    cache: CacheManager,
    upstream: UpstreamClient,
}

impl ChangelogService {
    pub fn new(cache: CacheManager, upstream: UpstreamClient) -> Self {
        Self { cache, upstream }
    }

    pub async fn entries(&self, registry: &RegistryService) -> Vec<ChangelogEntry> {
        let loaded = self
            .cache
            .load(CHANGELOG_KEY, CHANGELOG_TTL, STALE_TTL, || async {
                self.fetch(registry).await
            })
            .await;

        match loaded {
            Some(loaded) => loaded.value,
            None => Vec::new(),
        }
    }

    async fn fetch(&self, registry: &RegistryService) -> Result<Vec<ChangelogEntry>, anyhow::Error> {
        let repos = registry
            .try_entries()
            .await
            .ok_or_else(|| anyhow!("registry unavailable"))?;
        if repos.is_empty() {
            return Ok(Vec::new());
        }

        let lookups = repos
            .iter()
            .map(|e| self.upstream.recent_commits(&e.repo, COMMITS_PER_REPO));
        let results = join_all(lookups).await;

        let mut entries: Vec<ChangelogEntry> = Vec::new();
        let mut any_ok = false;
        for result in results {
            match result {
                Ok(mut commits) => {
                    any_ok = true;
                    entries.append(&mut commits);
                }
                Err(e) => tracing::warn!("changelog lookup failed: {}", e),
            }
        }
        // Every single lookup failing means the upstream is down; let the
        // stale fallback answer instead of caching an empty list
        if !any_ok {
            return Err(anyhow!("no changelog source reachable"));
        }

        // ISO-8601 strings sort chronologically; undated commits sink
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        entries.truncate(CHANGELOG_CAP);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KvStore, MemoryKv};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cached_changelog_served_without_upstream() {
        let kv = Arc::new(MemoryKv::new());
        let cached = serde_json::json!([
            {"repo": "acme/deploy", "sha": "abc1234", "message": "fix", "date": "2026-08-01T00:00:00Z"}
        ]);
        kv.put("changelog", &cached.to_string(), Some(CHANGELOG_TTL))
            .await
            .unwrap();

        let cache = CacheManager::new(kv.clone());
        let upstream = UpstreamClient::new("http://127.0.0.1:1".to_string(), None);
        let registry = RegistryService::new(
            cache.clone(),
            upstream.clone(),
            "acme/registry".to_string(),
            "registry.json".to_string(),
        );
        let changelog = ChangelogService::new(cache, upstream);

        let entries = changelog.entries(&registry).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sha, "abc1234");
    }

    #[tokio::test]
    async fn test_total_exhaustion_degrades_to_empty() {
        let kv = Arc::new(MemoryKv::new());
        let cache = CacheManager::new(kv);
        let upstream = UpstreamClient::new("http://127.0.0.1:1".to_string(), None);
        let registry = RegistryService::new(
            cache.clone(),
            upstream.clone(),
            "acme/registry".to_string(),
            "registry.json".to_string(),
        );
        let changelog = ChangelogService::new(cache, upstream);

        assert!(changelog.entries(&registry).await.is_empty());
    }
}
