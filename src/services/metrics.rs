// src/services/metrics.rs
use crate::kv::KvStore;
use crate::models::MetricsState;
use std::sync::Arc;
use tokio::sync::Mutex;

const METRICS_KEY: &str = "metrics";

/// Best-effort distributed request counters. The process-local state and
/// the persisted copy are reconciled by element-wise max on every request,
/// which keeps every counter monotonically non-decreasing without any
/// atomic primitive. Undercounting under concurrent writers is accepted;
/// do not add locking around the KV round-trip.
#[derive(Clone)]
pub struct MetricsReconciler {
    kv: Arc<dyn KvStore>,
    local: Arc<Mutex<MetricsState>>,
}

impl MetricsReconciler {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            local: Arc::new(Mutex::new(MetricsState::default())),
        }
    }

    async fn persisted(&self) -> Option<MetricsState> {
        let raw = self.kv.get(METRICS_KEY).await.ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }

    /// Called on every request: count it, classify the persisted read as a
    /// kv hit or miss, merge, and write the merged state back.
    pub async fn record_request(&self) {
        let persisted = self.persisted().await;

        let merged = {
            let mut local = self.local.lock().await;
            local.requests_total += 1;
            match persisted {
                Some(_) => local.kv_hits += 1,
                None => local.kv_misses += 1,
            }
            *local = local.max_merge(&persisted.unwrap_or_default());
            *local
        };

        if let Ok(raw) = serde_json::to_string(&merged) {
            if let Err(e) = self.kv.put(METRICS_KEY, &raw, None).await {
                tracing::warn!("metrics write failed: {}", e);
            }
        }
    }

    /// Current best-known counters: max-merge of the local and persisted
    /// copies, without counting the snapshot itself.
    pub async fn snapshot(&self) -> MetricsState {
        let persisted = self.persisted().await.unwrap_or_default();
        let local = *self.local.lock().await;
        local.max_merge(&persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    #[tokio::test]
    async fn test_first_request_is_a_miss() {
        let metrics = MetricsReconciler::new(Arc::new(MemoryKv::new()));
        metrics.record_request().await;
        let snap = metrics.snapshot().await;
        assert_eq!(snap.requests_total, 1);
        assert_eq!(snap.kv_misses, 1);
        assert_eq!(snap.kv_hits, 0);
    }

    #[tokio::test]
    async fn test_subsequent_requests_hit() {
        let metrics = MetricsReconciler::new(Arc::new(MemoryKv::new()));
        metrics.record_request().await;
        metrics.record_request().await;
        metrics.record_request().await;
        let snap = metrics.snapshot().await;
        assert_eq!(snap.requests_total, 3);
        assert_eq!(snap.kv_hits, 2);
        assert_eq!(snap.kv_misses, 1);
    }

    #[tokio::test]
    async fn test_recycled_instance_never_regresses_counters() {
        let kv: Arc<MemoryKv> = Arc::new(MemoryKv::new());
        let first = MetricsReconciler::new(kv.clone());
        for _ in 0..5 {
            first.record_request().await;
        }

        // Fresh local state, as after an instance recycle
        let second = MetricsReconciler::new(kv);
        second.record_request().await;
        let snap = second.snapshot().await;
        // Max-merge: the persisted totals survive the recycle
        assert!(snap.requests_total >= 5);
        assert!(snap.kv_hits >= 4);
    }

    #[tokio::test]
    async fn test_counters_monotonic_across_reads() {
        let metrics = MetricsReconciler::new(Arc::new(MemoryKv::new()));
        let mut previous = MetricsState::default();
        for _ in 0..10 {
            metrics.record_request().await;
            let snap = metrics.snapshot().await;
            assert!(snap.requests_total >= previous.requests_total);
            assert!(snap.kv_hits >= previous.kv_hits);
            assert!(snap.kv_misses >= previous.kv_misses);
            previous = snap;
        }
    }

    #[tokio::test]
    async fn test_corrupt_persisted_state_counts_as_miss() {
        let kv = Arc::new(MemoryKv::new());
        kv.put("metrics", "{not json", None).await.unwrap();
        let metrics = MetricsReconciler::new(kv);
        metrics.record_request().await;
        let snap = metrics.snapshot().await;
        assert_eq!(snap.kv_misses, 1);
    }
}
