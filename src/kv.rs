// src/kv.rs
use axum::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Narrow contract over the durable key-value store: get, put-with-TTL,
/// delete. No transactions, no compare-and-swap; every read-modify-write
/// sequence built on top of this is last-writer-wins.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    async fn put(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), anyhow::Error>;
    async fn delete(&self, key: &str) -> Result<(), anyhow::Error>;
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn expiry_for(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|t| now_ms() + t.as_millis() as i64)
}

/// SQLite-backed store: a single `kv` table with lazy expiry on read.
/// Expired rows are treated as absent and cleaned up opportunistically.
#[derive(Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    pub async fn connect(database_url: &str) -> Result<Self, anyhow::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Single connection: SQLite serializes writes anyway, and this keeps
        // in-memory databases (tests, dev) on one shared handle.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let row = sqlx::query("SELECT value, expires_at FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: Option<i64> = row.get("expires_at");
        if let Some(expires_at) = expires_at {
            if expires_at <= now_ms() {
                // Lazy expiry: drop the dead row and report a miss
                let _ = sqlx::query("DELETE FROM kv WHERE key = ?")
                    .bind(key)
                    .execute(&self.pool)
                    .await;
                return Ok(None);
            }
        }

        Ok(Some(row.get("value")))
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO kv (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expiry_for(ttl))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// In-memory store with the same lazy-expiry semantics; used by unit tests
/// and handy for local development without a database file.
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: Arc<RwLock<HashMap<String, (String, Option<i64>)>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((_, Some(expires_at))) if *expires_at <= now_ms() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), anyhow::Error> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value.to_string(), expiry_for(ttl)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}
