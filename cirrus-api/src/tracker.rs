//! Request tracker: per-request ids, request/response body dumps, and the
//! progress registry used by streaming (long-running) handlers.
//!
//! Records live in an LRU ring bounded by count and are mirrored under
//! `/request/<id>` in the store; eviction removes both copies.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cirrus_kv::KvStore;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Retained request records.
pub const REQUEST_RING_CAPACITY: usize = 10_000;

/// How much of a body is dumped into the record.
pub const BODY_DUMP_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamPhase {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub time: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub request_id: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub request_body: String,
    #[serde(default)]
    pub response_body: String,
    #[serde(default)]
    pub progress: Vec<ProgressEntry>,
    #[serde(default)]
    pub phase: Option<StreamPhase>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

fn request_key(id: &str) -> String {
    format!("/request/{}", id)
}

#[derive(Clone)]
pub struct RequestTracker {
    store: KvStore,
    ring: Arc<Mutex<LruCache<String, RequestRecord>>>,
    counter: Arc<AtomicU64>,
    epoch_ms: i64,
}

impl RequestTracker {
    pub fn new(store: KvStore) -> Self {
        Self {
            store,
            ring: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(REQUEST_RING_CAPACITY).expect("ring capacity"),
            ))),
            counter: Arc::new(AtomicU64::new(0)),
            epoch_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Mint a monotonic-unique request id, honoring a caller-supplied
    /// candidate when it is unused.
    pub async fn assign_id(&self, candidate: Option<&str>) -> String {
        if let Some(c) = candidate {
            if !c.is_empty() && !self.ring.lock().await.contains(c) {
                return c.to_string();
            }
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.epoch_ms, n)
    }

    /// Store or replace a record, persisting it and dropping the evicted
    /// record (if any) from the store too.
    pub async fn record(&self, record: RequestRecord) -> Result<()> {
        let key = request_key(&record.request_id);
        self.store.put(&key, &serde_json::to_string(&record)?).await?;

        let evicted = {
            let mut ring = self.ring.lock().await;
            ring.push(record.request_id.clone(), record)
        };
        if let Some((evicted_id, _)) = evicted {
            if !self.ring.lock().await.contains(&evicted_id) {
                self.store.delete(&request_key(&evicted_id)).await?;
            }
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<RequestRecord> {
        if let Some(record) = self.ring.lock().await.peek(id) {
            return Ok(record.clone());
        }
        match self.store.get(&request_key(id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(CoreError::NotFound(format!("request '{}' not found", id))),
        }
    }

    /// All retained records, newest first.
    pub async fn list(&self) -> Vec<RequestRecord> {
        let ring = self.ring.lock().await;
        let mut records: Vec<RequestRecord> = ring.iter().map(|(_, r)| r.clone()).collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let removed = self.ring.lock().await.pop(id).is_some();
        let stored = self.store.delete(&request_key(id)).await?;
        if !removed && !stored {
            return Err(CoreError::NotFound(format!("request '{}' not found", id)));
        }
        Ok(())
    }

    pub async fn clear(&self) -> Result<u64> {
        self.ring.lock().await.clear();
        Ok(self.store.delete_prefix("/request/").await?)
    }

    // -------------------------------------------------------------------------
    // Streaming (long-running) requests
    // -------------------------------------------------------------------------

    /// Open a stream record; intermediate progress and the terminal phase
    /// are published under the returned id.
    pub async fn open_stream(&self, description: &str) -> String {
        let id = self.assign_id(None).await;
        let record = RequestRecord {
            request_id: id.clone(),
            method: "STREAM".to_string(),
            path: description.to_string(),
            status: None,
            request_body: String::new(),
            response_body: String::new(),
            progress: vec![],
            phase: Some(StreamPhase::Running),
            started_at: Utc::now(),
            ended_at: None,
        };
        if let Err(e) = self.record(record).await {
            debug!("stream record failed: {}", e);
        }
        id
    }

    pub async fn stream_progress(&self, id: &str, message: &str) {
        if let Ok(mut record) = self.get(id).await {
            record.progress.push(ProgressEntry {
                time: Utc::now(),
                message: message.to_string(),
            });
            if let Err(e) = self.record(record).await {
                debug!("stream progress failed: {}", e);
            }
        }
    }

    pub async fn close_stream(&self, id: &str, phase: StreamPhase, message: &str) {
        if let Ok(mut record) = self.get(id).await {
            record.phase = Some(phase);
            record.response_body = message.chars().take(BODY_DUMP_LIMIT).collect();
            record.ended_at = Some(Utc::now());
            if let Err(e) = self.record(record).await {
                debug!("stream close failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn tracker() -> RequestTracker {
        RequestTracker::new(KvStore::open_in_memory().await.unwrap())
    }

    fn record(id: &str) -> RequestRecord {
        RequestRecord {
            request_id: id.to_string(),
            method: "GET".into(),
            path: "/tumblebug/ns".into(),
            status: Some(200),
            request_body: String::new(),
            response_body: "[]".into(),
            progress: vec![],
            phase: None,
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_assign_id_monotonic_and_candidate() {
        let t = tracker().await;
        let a = t.assign_id(None).await;
        let b = t.assign_id(None).await;
        assert_ne!(a, b);

        // A fresh caller-supplied id is honored.
        assert_eq!(t.assign_id(Some("my-id")).await, "my-id");

        // A used one is not.
        t.record(record("my-id")).await.unwrap();
        assert_ne!(t.assign_id(Some("my-id")).await, "my-id");
    }

    #[tokio::test]
    async fn test_record_get_delete() {
        let t = tracker().await;
        t.record(record("r1")).await.unwrap();

        let got = t.get("r1").await.unwrap();
        assert_eq!(got.method, "GET");
        // Mirrored into the store.
        assert!(t.store.exists("/request/r1").await.unwrap());

        t.delete("r1").await.unwrap();
        assert!(t.get("r1").await.is_err());
        assert!(!t.store.exists("/request/r1").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let t = tracker().await;
        let mut r1 = record("r1");
        r1.started_at = Utc::now() - chrono::Duration::seconds(10);
        t.record(r1).await.unwrap();
        t.record(record("r2")).await.unwrap();

        let list = t.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].request_id, "r2");
    }

    #[tokio::test]
    async fn test_stream_lifecycle() {
        let t = tracker().await;
        let id = t.open_stream("vpn-create default/m1").await;

        t.stream_progress(&id, "dispatching").await;
        t.close_stream(&id, StreamPhase::Succeeded, "done").await;

        let record = t.get(&id).await.unwrap();
        assert_eq!(record.phase, Some(StreamPhase::Succeeded));
        assert_eq!(record.progress.len(), 1);
        assert_eq!(record.response_body, "done");
        assert!(record.ended_at.is_some());
    }
}
