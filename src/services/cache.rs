// src/services/cache.rs
use crate::kv::KvStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Long-lived shadow copy written beside every successful refresh; read
/// only when both the primary cache and the live upstream call fail.
pub const STALE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A value loaded through the cache. `cached` is false only when the value
/// came straight from the upstream fetch; a stale-shadow hit is reported as
/// cached, indistinguishable from a primary hit.
#[derive(Debug)]
pub struct Loaded<T> {
    pub value: T,
    pub cached: bool,
}

/// Read-through cache over the KV store with a fast-expiring primary key
/// and a slow-expiring stale shadow. Every upstream-backed dataset goes
/// through here. Malformed JSON in either tier is a miss, never an error.
#[derive(Clone)]
pub struct CacheManager {
    kv: Arc<dyn KvStore>,
}

impl CacheManager {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn stale_key(key: &str) -> String {
        format!("{}:stale", key)
    }

    async fn read_tier<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.kv.get(key).await.ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }

    /// Load `key`, refreshing from `fetch` on a primary miss. Returns
    /// `None` only when primary, upstream, and stale shadow all fail;
    /// callers substitute their documented empty/default shape (fleet
    /// health alone turns `None` into 503).
    pub async fn load<T, F, Fut>(
        &self,
        key: &str,
        ttl_primary: Duration,
        ttl_stale: Duration,
        fetch: F,
    ) -> Option<Loaded<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        if let Some(value) = self.read_tier::<T>(key).await {
            return Some(Loaded {
                value,
                cached: true,
            });
        }

        match fetch().await {
            Ok(value) => {
                if let Ok(raw) = serde_json::to_string(&value) {
                    if let Err(e) = self.kv.put(key, &raw, Some(ttl_primary)).await {
                        tracing::warn!("cache write failed for {}: {}", key, e);
                    }
                    if let Err(e) = self
                        .kv
                        .put(&Self::stale_key(key), &raw, Some(ttl_stale))
                        .await
                    {
                        tracing::warn!("stale shadow write failed for {}: {}", key, e);
                    }
                }
                Some(Loaded {
                    value,
                    cached: false,
                })
            }
            Err(e) => {
                tracing::warn!("upstream fetch failed for {}: {}", key, e);
                let value = self.read_tier::<T>(&Self::stale_key(key)).await?;
                Some(Loaded {
                    value,
                    cached: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn manager() -> (CacheManager, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        (CacheManager::new(kv.clone()), kv)
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_primary_hit_skips_fetch() {
        let (cache, kv) = manager();
        kv.put("k", "[1,2]", Some(TTL)).await.unwrap();

        let loaded = cache
            .load::<Vec<i64>, _, _>("k", TTL, STALE_TTL, || async {
                panic!("fetch must not run on a primary hit")
            })
            .await
            .unwrap();
        assert!(loaded.cached);
        assert_eq!(loaded.value, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_miss_fetches_and_writes_both_tiers() {
        let (cache, kv) = manager();

        let loaded = cache
            .load::<Vec<i64>, _, _>("k", TTL, STALE_TTL, || async { Ok(vec![3]) })
            .await
            .unwrap();
        assert!(!loaded.cached);
        assert_eq!(kv.get("k").await.unwrap(), Some("[3]".to_string()));
        assert_eq!(kv.get("k:stale").await.unwrap(), Some("[3]".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_failure_serves_stale() {
        let (cache, kv) = manager();
        kv.put("k:stale", "[7]", Some(STALE_TTL)).await.unwrap();

        let loaded = cache
            .load::<Vec<i64>, _, _>("k", TTL, STALE_TTL, || async {
                Err(anyhow::anyhow!("upstream down"))
            })
            .await
            .unwrap();
        // Stale content is returned unchanged and looks like a cache hit
        assert!(loaded.cached);
        assert_eq!(loaded.value, vec![7]);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_none() {
        let (cache, _kv) = manager();

        let loaded = cache
            .load::<Vec<i64>, _, _>("k", TTL, STALE_TTL, || async {
                Err(anyhow::anyhow!("upstream down"))
            })
            .await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_malformed_primary_is_a_miss() {
        let (cache, kv) = manager();
        kv.put("k", "{not json", Some(TTL)).await.unwrap();

        let loaded = cache
            .load::<Vec<i64>, _, _>("k", TTL, STALE_TTL, || async { Ok(vec![9]) })
            .await
            .unwrap();
        assert!(!loaded.cached);
        assert_eq!(loaded.value, vec![9]);
    }

    #[tokio::test]
    async fn test_malformed_stale_is_a_miss() {
        let (cache, kv) = manager();
        kv.put("k:stale", "{not json", Some(STALE_TTL)).await.unwrap();

        let loaded = cache
            .load::<Vec<i64>, _, _>("k", TTL, STALE_TTL, || async {
                Err(anyhow::anyhow!("upstream down"))
            })
            .await;
        assert!(loaded.is_none());
    }
}
