// src/config.rs
use std::net::SocketAddr;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub admin_token: String,
    pub github_token: Option<String>,
    pub github_api_base: String,
    pub registry_repo: String,
    pub registry_path: String,
    pub rate_limit_max: u32,
    pub presence_ttl_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://fleetpulse.db".to_string()),
            host: std::env::var("HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            admin_token: std::env::var("ADMIN_TOKEN")
                .map_err(|_| "ADMIN_TOKEN environment variable must be set")?,
            github_token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            github_api_base: std::env::var("GITHUB_API_BASE")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            registry_repo: std::env::var("REGISTRY_REPO")
                .unwrap_or_else(|_| "fleet-ops/registry".to_string()),
            registry_path: std::env::var("REGISTRY_PATH")
                .unwrap_or_else(|_| "registry.json".to_string()),
            rate_limit_max: std::env::var("RATE_LIMIT_MAX")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            presence_ttl_seconds: std::env::var("PRESENCE_TTL_SECONDS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()?,
        })
    }

    pub fn server_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}
