// src/services/history.rs
use crate::kv::KvStore;
use crate::models::{HistoryEntry, HISTORY_CAP};
use crate::utils::hash::entry_hash;
use serde_json::Value;
use std::sync::Arc;

const HISTORY_KEY: &str = "history";

/// Capped activity log in the KV store: prepend on append, truncate to 20,
/// re-normalize and re-sort on every read. The persisted shape has drifted
/// across versions, so nothing read back is trusted as-is.
pub struct HistoryService {
    kv: Arc<dyn KvStore>,
}

/// Coerce an arbitrary JSON value into a well-formed entry. Unusable
/// fields get defaults; a missing hash is derived from the timestamp.
pub fn normalize(value: &Value, now_ms: i64) -> HistoryEntry {
    let timestamp = value
        .get("timestamp")
        .and_then(|t| t.as_i64().or_else(|| t.as_f64().map(|f| f as i64)))
        .unwrap_or(now_ms);
    let desc = value
        .get("desc")
        .and_then(|d| d.as_str())
        .filter(|d| !d.is_empty())
        .unwrap_or("activity")
        .to_string();
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or("event")
        .to_string();
    let hash = value
        .get("hash")
        .and_then(|h| h.as_str())
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| entry_hash(timestamp));

    HistoryEntry {
        timestamp,
        desc,
        kind,
        hash,
    }
}

/// Parse a caller-supplied limit. Absent, non-numeric, or non-positive
/// values fall back to the cap; fractional values are floored; anything
/// above the cap clamps to it.
pub fn parse_limit(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return HISTORY_CAP;
    };
    let Ok(value) = raw.trim().parse::<f64>() else {
        return HISTORY_CAP;
    };
    if !value.is_finite() || value <= 0.0 {
        return HISTORY_CAP;
    }
    let floored = value.floor() as usize;
    if floored == 0 {
        return HISTORY_CAP;
    }
    floored.min(HISTORY_CAP)
}

impl HistoryService {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    async fn stored(&self) -> Vec<HistoryEntry> {
        let raw = self.kv.get(HISTORY_KEY).await.ok().flatten();
        let Some(raw) = raw else {
            return Vec::new();
        };
        // Malformed persisted state is an empty log, not an error
        let values: Vec<Value> = serde_json::from_str(&raw).unwrap_or_default();
        let now = chrono::Utc::now().timestamp_millis();
        values.iter().map(|v| normalize(v, now)).collect()
    }

    async fn persist(&self, entries: &[HistoryEntry]) {
        if let Ok(raw) = serde_json::to_string(entries) {
            if let Err(e) = self.kv.put(HISTORY_KEY, &raw, None).await {
                tracing::warn!("history write failed: {}", e);
            }
        }
    }

    /// Append entries (newest first) in one read-modify-write pass.
    /// Last-writer-wins under concurrent appends, by design.
    pub async fn append_many(&self, raw_entries: &[Value]) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let mut entries: Vec<HistoryEntry> =
            raw_entries.iter().map(|v| normalize(v, now)).collect();
        let appended = entries.len();

        let mut stored = self.stored().await;
        entries.append(&mut stored);
        entries.truncate(HISTORY_CAP);
        self.persist(&entries).await;
        appended
    }

    pub async fn append(&self, raw: &Value) -> usize {
        self.append_many(std::slice::from_ref(raw)).await
    }

    /// Read up to `limit` entries, newest first. Insertion order is not
    /// trusted: bulk merges can interleave timestamps, so the stored list
    /// is re-sorted by timestamp on every read.
    pub async fn read(&self, limit: usize) -> Vec<HistoryEntry> {
        let mut entries = self.stored().await;
        // Stable sort: duplicate timestamps keep their stored order
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit.min(HISTORY_CAP));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use serde_json::json;

    fn service() -> HistoryService {
        HistoryService::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn test_normalize_defaults() {
        let entry = normalize(&json!({}), 1_000);
        assert_eq!(entry.timestamp, 1_000);
        assert_eq!(entry.desc, "activity");
        assert_eq!(entry.kind, "event");
        assert_eq!(entry.hash, entry_hash(1_000));
    }

    #[test]
    fn test_normalize_keeps_supplied_fields() {
        let entry = normalize(
            &json!({"timestamp": 5, "desc": "deployed", "type": "deploy", "hash": "abc"}),
            1_000,
        );
        assert_eq!(entry.timestamp, 5);
        assert_eq!(entry.desc, "deployed");
        assert_eq!(entry.kind, "deploy");
        assert_eq!(entry.hash, "abc");
    }

    #[test]
    fn test_parse_limit_rules() {
        assert_eq!(parse_limit(None), 20);
        assert_eq!(parse_limit(Some("abc")), 20);
        assert_eq!(parse_limit(Some("0")), 20);
        assert_eq!(parse_limit(Some("-4")), 20);
        assert_eq!(parse_limit(Some("100")), 20);
        assert_eq!(parse_limit(Some("3.9")), 3);
        assert_eq!(parse_limit(Some("7")), 7);
    }

    #[tokio::test]
    async fn test_cap_at_twenty_entries() {
        let history = service();
        for i in 0..25 {
            history.append(&json!({"timestamp": i, "desc": "e"})).await;
        }
        let entries = history.read(100).await;
        assert_eq!(entries.len(), 20);
        // Newest first: timestamps 24 down to 5
        assert_eq!(entries[0].timestamp, 24);
        assert_eq!(entries[19].timestamp, 5);
    }

    #[tokio::test]
    async fn test_read_sorts_by_timestamp_desc() {
        let history = service();
        // Bulk append with interleaved timestamps
        let batch: Vec<Value> = vec![
            json!({"timestamp": 10}),
            json!({"timestamp": 30}),
            json!({"timestamp": 20}),
        ];
        history.append_many(&batch).await;
        let entries = history.read(20).await;
        let stamps: Vec<i64> = entries.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![30, 20, 10]);
    }

    #[tokio::test]
    async fn test_read_limit_clamps() {
        let history = service();
        for i in 0..10 {
            history.append(&json!({"timestamp": i})).await;
        }
        assert_eq!(history.read(3).await.len(), 3);
        assert_eq!(history.read(100).await.len(), 10);
    }

    #[tokio::test]
    async fn test_drifted_persisted_shape_is_renormalized() {
        let kv = Arc::new(MemoryKv::new());
        kv.put("history", r#"[{"timestamp": 9}, "garbage", {"desc": "old"}]"#, None)
            .await
            .unwrap();
        let history = HistoryService::new(kv);
        let entries = history.read(20).await;
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| !e.hash.is_empty()));
        assert!(entries.iter().any(|e| e.desc == "old"));
    }

    #[tokio::test]
    async fn test_corrupt_history_reads_empty() {
        let kv = Arc::new(MemoryKv::new());
        kv.put("history", "{not json", None).await.unwrap();
        let history = HistoryService::new(kv);
        assert!(history.read(20).await.is_empty());
    }
}
