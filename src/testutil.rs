// src/testutil.rs
use crate::config::Config;
use crate::kv::{KvStore, MemoryKv};
use crate::middleware::rate_limit::RateLimiter;
use crate::services::cache::CacheManager;
use crate::services::metrics::MetricsReconciler;
use crate::upstream::UpstreamClient;
use crate::AppState;
use std::sync::Arc;

pub const TEST_ADMIN_TOKEN: &str = "integration-test-token";

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_token: TEST_ADMIN_TOKEN.to_string(),
        github_token: None,
        github_api_base: "http://127.0.0.1:1".to_string(),
        registry_repo: "acme/registry".to_string(),
        registry_path: "registry.json".to_string(),
        rate_limit_max: 60,
        presence_ttl_seconds: 1800,
    }
}

/// App state over an in-memory store, for tests that drive middleware or
/// extractors through a real router.
pub fn test_state(rate_limit_max: u32) -> Arc<AppState> {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let mut config = test_config();
    config.rate_limit_max = rate_limit_max;

    Arc::new(AppState {
        config,
        kv: kv.clone(),
        cache: CacheManager::new(kv.clone()),
        upstream: UpstreamClient::new("http://127.0.0.1:1".to_string(), None),
        rate_limiter: RateLimiter::new(kv.clone(), rate_limit_max),
        metrics: MetricsReconciler::new(kv),
    })
}
