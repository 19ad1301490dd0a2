// src/services/presence.rs
use crate::kv::KvStore;
use crate::models::PresenceRecord;
use std::sync::Arc;
use std::time::Duration;

const PRESENCE_KEY: &str = "presence";
const ONLINE_THRESHOLD_MS: i64 = 10 * 60 * 1000;

/// Exactly at the threshold still counts as online; a missing or
/// unparseable last-seen is offline, never an error.
pub fn is_online(last_seen_ms: Option<i64>, now_ms: i64) -> bool {
    match last_seen_ms {
        Some(last_seen) => now_ms - last_seen <= ONLINE_THRESHOLD_MS,
        None => false,
    }
}

/// Online/offline derivation from a single last-seen timestamp. Four read
/// endpoints format the same boolean differently; there are only two
/// states and no transition history.
pub struct PresenceService {
    kv: Arc<dyn KvStore>,
    default_ttl: Duration,
}

impl PresenceService {
    pub fn new(kv: Arc<dyn KvStore>, default_ttl: Duration) -> Self {
        Self { kv, default_ttl }
    }

    pub async fn current(&self) -> (Option<PresenceRecord>, bool) {
        let record = self
            .kv
            .get(PRESENCE_KEY)
            .await
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str::<PresenceRecord>(&raw).ok());

        let now = chrono::Utc::now().timestamp_millis();
        let online = is_online(record.as_ref().map(|r| r.timestamp), now);
        (record, online)
    }

    /// Write a presence update with an explicit expiry so a forgotten
    /// update self-expires.
    pub async fn update(
        &self,
        state: String,
        message: Option<String>,
        ttl_seconds: Option<u64>,
    ) -> PresenceRecord {
        let record = PresenceRecord {
            state,
            message,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        let ttl = ttl_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_ttl);
        if let Ok(raw) = serde_json::to_string(&record) {
            if let Err(e) = self.kv.put(PRESENCE_KEY, &raw, Some(ttl)).await {
                tracing::warn!("presence write failed: {}", e);
            }
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    #[test]
    fn test_exactly_at_threshold_is_online() {
        let now = 1_000_000_000;
        assert!(is_online(Some(now - ONLINE_THRESHOLD_MS), now));
    }

    #[test]
    fn test_one_ms_past_threshold_is_offline() {
        let now = 1_000_000_000;
        assert!(!is_online(Some(now - ONLINE_THRESHOLD_MS - 1), now));
    }

    #[test]
    fn test_missing_last_seen_is_offline() {
        assert!(!is_online(None, 1_000_000_000));
    }

    #[tokio::test]
    async fn test_update_then_current() {
        let presence = PresenceService::new(Arc::new(MemoryKv::new()), Duration::from_secs(1800));
        presence
            .update("focused".to_string(), Some("shipping".to_string()), None)
            .await;
        let (record, online) = presence.current().await;
        assert!(online);
        let record = record.unwrap();
        assert_eq!(record.state, "focused");
        assert_eq!(record.message.as_deref(), Some("shipping"));
    }

    #[tokio::test]
    async fn test_no_record_is_offline() {
        let presence = PresenceService::new(Arc::new(MemoryKv::new()), Duration::from_secs(1800));
        let (record, online) = presence.current().await;
        assert!(record.is_none());
        assert!(!online);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_offline() {
        let kv = Arc::new(MemoryKv::new());
        kv.put("presence", "{not json", None).await.unwrap();
        let presence = PresenceService::new(kv, Duration::from_secs(1800));
        let (record, online) = presence.current().await;
        assert!(record.is_none());
        assert!(!online);
    }
}
