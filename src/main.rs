// src/main.rs
mod auth;
mod config;
mod handlers;
mod kv;
mod middleware;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod testutil;
mod upstream;
mod utils;

use crate::config::Config;
use crate::kv::{KvStore, SqliteKv};
use crate::middleware::rate_limit::RateLimiter;
use crate::routes::create_router;
use crate::services::cache::CacheManager;
use crate::services::changelog::ChangelogService;
use crate::services::health::HealthService;
use crate::services::history::HistoryService;
use crate::services::metrics::MetricsReconciler;
use crate::services::presence::PresenceService;
use crate::services::registry::RegistryService;
use crate::services::trend::TrendService;
use crate::upstream::UpstreamClient;
use axum::Extension;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub config: Config,
    pub kv: Arc<dyn KvStore>,
    pub cache: CacheManager,
    pub upstream: UpstreamClient,
    pub rate_limiter: RateLimiter,
    pub metrics: MetricsReconciler,
}

// Services hold nothing but cheap clones, so handlers build them on
// demand instead of the state carrying one of each.
impl AppState {
    pub fn registry(&self) -> RegistryService {
        RegistryService::new(
            self.cache.clone(),
            self.upstream.clone(),
            self.config.registry_repo.clone(),
            self.config.registry_path.clone(),
        )
    }

    pub fn health(&self) -> HealthService {
        HealthService::new(self.kv.clone(), self.cache.clone(), self.upstream.clone())
    }

    pub fn trend(&self) -> TrendService {
        TrendService::new(self.cache.clone(), self.upstream.clone())
    }

    pub fn changelog(&self) -> ChangelogService {
        ChangelogService::new(self.cache.clone(), self.upstream.clone())
    }

    pub fn history(&self) -> HistoryService {
        HistoryService::new(self.kv.clone())
    }

    pub fn presence(&self) -> PresenceService {
        PresenceService::new(
            self.kv.clone(),
            Duration::from_secs(self.config.presence_ttl_seconds),
        )
    }
}

/// Validate critical security configuration
fn validate_security_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.admin_token.len() < 16 {
        return Err("ADMIN_TOKEN must be at least 16 characters long".into());
    }
    if config.github_token.is_none() {
        eprintln!("⚠️  WARNING: GITHUB_TOKEN is not set");
        eprintln!("   CI health and trends will report \"unknown\" without a credential");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetpulse=info,tower_http=info".into()),
        )
        .init();

    tracing::info!("🚀 Starting fleetpulse...");

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    validate_security_config(&config)?;

    tracing::info!("📊 Opening key-value store: {}", config.database_url);
    let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::connect(&config.database_url).await?);

    let cache = CacheManager::new(kv.clone());
    let upstream = UpstreamClient::new(config.github_api_base.clone(), config.github_token.clone());
    let rate_limiter = RateLimiter::new(kv.clone(), config.rate_limit_max);
    let metrics = MetricsReconciler::new(kv.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        kv,
        cache,
        upstream,
        rate_limiter,
        metrics,
    });

    let app = create_router(state.clone())
        .layer(Extension(state.clone()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server_addr()?;
    tracing::info!("✅ fleetpulse listening on {}", addr);
    tracing::info!("🔌 API: http://{}/api", addr);
    tracing::info!(
        "🛡️  Rate limit: {} requests / 60s per client",
        config.rate_limit_max
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
