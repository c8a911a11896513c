//! Durable queue of captured jobs.
//!
//! Every capture becomes a [`QueueItem`] before any remote call is made, so a
//! job survives network outages and daemon restarts. The queue keeps the
//! whole collection in memory behind an async mutex and writes it through a
//! [`QueueStore`] after every mutation.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use jobflow_core::JobRecord;
use jobflow_protocol::QueueStats;

use crate::error::{ServerError, ServerResult};

/// Failed attempts after which an item is given up on.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Synced items kept after compaction.
pub const DEFAULT_MAX_SYNCED: usize = 50;

/// Top-level key of the queue in the state document.
const QUEUE_KEY: &str = "queue";

/// Current time at the millisecond precision the store keeps.
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Lifecycle of a queue item.
///
/// `Synced` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Synced,
    Failed,
}

/// One captured job and its sync state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub data: JobRecord,
    pub status: QueueStatus,
    #[serde(
        rename = "timestamp",
        alias = "enqueuedAt",
        with = "chrono::serde::ts_milliseconds"
    )]
    pub enqueued_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retries: u32,
}

impl QueueItem {
    /// A fresh pending item with a time-ordered id.
    pub fn new(data: JobRecord) -> Self {
        Self {
            id: format!("job_{}", uuid::Uuid::now_v7().simple()),
            data,
            status: QueueStatus::Pending,
            enqueued_at: now_millis(),
            synced_at: None,
            retries: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == QueueStatus::Pending
    }

    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.status = QueueStatus::Synced;
        self.synced_at = Some(at.trunc_subsecs(3));
    }

    /// Counts a failed attempt.
    ///
    /// Returns true when this attempt exhausted the budget and the item is
    /// now `Failed`.
    pub fn record_failure(&mut self, max_retries: u32) -> bool {
        self.retries += 1;
        if self.retries >= max_retries {
            self.status = QueueStatus::Failed;
            true
        } else {
            false
        }
    }
}

/// Tallies items by status.
pub fn queue_stats(items: &[QueueItem]) -> QueueStats {
    let mut stats = QueueStats {
        total: items.len(),
        ..Default::default()
    };
    for item in items {
        match item.status {
            QueueStatus::Pending => stats.pending += 1,
            QueueStatus::Synced => stats.synced += 1,
            QueueStatus::Failed => stats.failed += 1,
        }
    }
    stats
}

/// Drops all but the `max_synced` most recent synced items.
///
/// Pending and failed items are never dropped and survivors keep their
/// order. Returns the number of items removed.
pub fn retain_recent_synced(items: &mut Vec<QueueItem>, max_synced: usize) -> usize {
    let mut synced: Vec<(usize, DateTime<Utc>)> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.status == QueueStatus::Synced)
        .map(|(index, item)| (index, item.enqueued_at))
        .collect();

    if synced.len() <= max_synced {
        return 0;
    }

    // Newest first; later insertion wins a timestamp tie.
    synced.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
    let keep: HashSet<usize> = synced.iter().take(max_synced).map(|(i, _)| *i).collect();

    let before = items.len();
    let mut index = 0;
    items.retain(|item| {
        let kept = item.status != QueueStatus::Synced || keep.contains(&index);
        index += 1;
        kept
    });
    before - items.len()
}

/// Whole-collection persistence for the queue.
pub trait QueueStore: Send + Sync {
    fn load(&self) -> ServerResult<Vec<QueueItem>>;

    fn save(&self, items: &[QueueItem]) -> ServerResult<()>;

    /// Human readable location, for logs.
    fn describe(&self) -> String;
}

/// Stores the queue under the `"queue"` key of a JSON document.
///
/// Other top-level keys (the browser scraper keeps `"savedJobs"` there) are
/// read back and written out untouched.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, message: impl Into<String>) -> ServerError {
        ServerError::storage(self.path.display().to_string(), message)
    }

    fn read_document(&self) -> ServerResult<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| self.storage_error(format!("failed to read: {e}")))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(self.storage_error("state document is not a JSON object")),
            Err(e) => Err(self.storage_error(format!("failed to parse: {e}"))),
        }
    }
}

impl QueueStore for JsonFileStore {
    fn load(&self) -> ServerResult<Vec<QueueItem>> {
        let mut document = self.read_document()?;
        let Some(queue) = document.remove(QUEUE_KEY) else {
            return Ok(Vec::new());
        };

        serde_json::from_value(queue)
            .map_err(|e| self.storage_error(format!("invalid queue entries: {e}")))
    }

    fn save(&self, items: &[QueueItem]) -> ServerResult<()> {
        let mut document = self.read_document()?;
        let queue = serde_json::to_value(items)
            .map_err(|e| self.storage_error(format!("failed to serialize queue: {e}")))?;
        document.insert(QUEUE_KEY.to_string(), queue);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&Value::Object(document))
            .map_err(|e| self.storage_error(format!("failed to serialize document: {e}")))?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;

        debug!(path = %self.path.display(), items = items.len(), "Saved queue");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Volatile store for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: StdMutex<Vec<QueueItem>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<QueueItem>) -> Self {
        Self {
            items: StdMutex::new(items),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Makes every following `save` fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// What was last saved.
    pub fn saved(&self) -> Vec<QueueItem> {
        self.items.lock().unwrap().clone()
    }
}

impl QueueStore for MemoryStore {
    fn load(&self) -> ServerResult<Vec<QueueItem>> {
        Ok(self.items.lock().unwrap().clone())
    }

    fn save(&self, items: &[QueueItem]) -> ServerResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ServerError::storage("memory", "save disabled"));
        }
        *self.items.lock().unwrap() = items.to_vec();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// The persisted queue.
///
/// Every read-modify-write holds the same async mutex, and the in-memory
/// copy only changes once the store accepted the new collection.
pub struct DurableQueue {
    store: Box<dyn QueueStore>,
    items: Mutex<Vec<QueueItem>>,
    max_synced: usize,
}

impl DurableQueue {
    /// Loads the queue from `store`.
    pub fn open(store: Box<dyn QueueStore>, max_synced: usize) -> ServerResult<Self> {
        let items = store.load()?;
        info!(
            store = %store.describe(),
            items = items.len(),
            max_synced,
            "Opened job queue"
        );
        Ok(Self {
            store,
            items: Mutex::new(items),
            max_synced,
        })
    }

    pub fn max_synced(&self) -> usize {
        self.max_synced
    }

    /// Validates `record` and appends it as a new pending item.
    pub async fn enqueue(&self, record: JobRecord) -> ServerResult<QueueItem> {
        record.validate()?;

        let item = QueueItem::new(record);
        let mut items = self.items.lock().await;
        let mut updated = items.clone();
        updated.push(item.clone());
        self.store.save(&updated)?;
        *items = updated;

        info!(id = %item.id, url = %item.data.url, "Job queued");
        Ok(item)
    }

    /// An owned copy of every item in insertion order.
    pub async fn snapshot(&self) -> Vec<QueueItem> {
        self.items.lock().await.clone()
    }

    /// Replaces the stored item that has `item.id`.
    pub async fn update_item(&self, item: &QueueItem) -> ServerResult<()> {
        let mut items = self.items.lock().await;
        let Some(index) = items.iter().position(|i| i.id == item.id) else {
            error!(id = %item.id, "Queue item vanished before its status could be saved");
            return Err(ServerError::item_not_found(&item.id));
        };

        let mut updated = items.clone();
        updated[index] = item.clone();
        self.store.save(&updated)?;
        *items = updated;

        debug!(id = %item.id, status = ?item.status, retries = item.retries, "Updated queue item");
        Ok(())
    }

    /// Applies the synced-item retention limit.
    ///
    /// Returns the number of items removed.
    pub async fn compact(&self) -> ServerResult<usize> {
        let mut items = self.items.lock().await;
        let mut updated = items.clone();
        let removed = retain_recent_synced(&mut updated, self.max_synced);
        if removed == 0 {
            return Ok(0);
        }

        self.store.save(&updated)?;
        *items = updated;
        info!(removed, kept = items.len(), "Compacted job queue");
        Ok(removed)
    }

    pub async fn stats(&self) -> QueueStats {
        queue_stats(&self.items.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn record(n: usize) -> JobRecord {
        JobRecord::new(format!("https://careers.example.com/jobs/{n}"))
            .with_title(format!("Job {n}"))
    }

    fn item_with(n: usize, status: QueueStatus, minutes: i64) -> QueueItem {
        let mut item = QueueItem::new(record(n));
        item.status = status;
        item.enqueued_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap()
            + Duration::minutes(minutes);
        item
    }

    fn open(items: Vec<QueueItem>) -> DurableQueue {
        DurableQueue::open(Box::new(MemoryStore::with_items(items)), DEFAULT_MAX_SYNCED).unwrap()
    }

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = QueueItem::new(record(1));
        let b = QueueItem::new(record(2));
        assert!(a.id.starts_with("job_"));
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, QueueStatus::Pending);
        assert_eq!(a.retries, 0);
        assert!(a.synced_at.is_none());
    }

    #[test]
    fn failure_budget() {
        let mut item = QueueItem::new(record(1));
        assert!(!item.record_failure(3));
        assert!(!item.record_failure(3));
        assert!(item.is_pending());
        assert!(item.record_failure(3));
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.retries, 3);
    }

    #[test]
    fn persisted_shape() {
        let json = r#"{
            "id": "job_1700000000000",
            "data": {"title": "SWE", "company": "Acme", "url": "https://acme.example/jobs/1"},
            "status": "synced",
            "timestamp": 1700000000000,
            "syncedAt": 1700000060000,
            "retries": 1
        }"#;
        let item: QueueItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.status, QueueStatus::Synced);
        assert_eq!(item.enqueued_at.timestamp(), 1_700_000_000);
        assert_eq!(item.synced_at.unwrap().timestamp(), 1_700_000_060);
        assert_eq!(item.data.company.as_deref(), Some("Acme"));

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["timestamp"], 1_700_000_000_000_i64);
        assert_eq!(value["syncedAt"], 1_700_000_060_000_i64);
    }

    #[test]
    fn retention_keeps_most_recent_synced() {
        let mut items: Vec<QueueItem> = (0..60)
            .map(|n| item_with(n, QueueStatus::Synced, n as i64))
            .collect();
        items.insert(10, item_with(100, QueueStatus::Pending, 5));
        items.insert(30, item_with(101, QueueStatus::Failed, 0));

        let removed = retain_recent_synced(&mut items, 50);
        assert_eq!(removed, 10);
        assert_eq!(items.len(), 52);

        let stats = queue_stats(&items);
        assert_eq!(stats.synced, 50);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 1);

        // The ten oldest synced items are gone.
        let oldest_kept = items
            .iter()
            .filter(|i| i.status == QueueStatus::Synced)
            .map(|i| i.enqueued_at)
            .min()
            .unwrap();
        assert_eq!(
            oldest_kept,
            DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(10)
        );

        // Survivors keep their relative order.
        let times: Vec<_> = items
            .iter()
            .filter(|i| i.status == QueueStatus::Synced)
            .map(|i| i.enqueued_at)
            .collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn retention_under_limit_is_noop() {
        let mut items = vec![
            item_with(1, QueueStatus::Synced, 0),
            item_with(2, QueueStatus::Failed, 1),
        ];
        assert_eq!(retain_recent_synced(&mut items, 50), 0);
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn enqueue_persists() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let queue = DurableQueue::open(Box::new(SharedStore(store.clone())), 50).unwrap();

        let item = queue.enqueue(record(1)).await.unwrap();
        assert_eq!(queue.snapshot().await, vec![item.clone()]);
        assert_eq!(store.saved(), vec![item]);
    }

    #[tokio::test]
    async fn enqueue_rejects_invalid_record() {
        let queue = open(vec![]);
        let err = queue.enqueue(JobRecord::default()).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidJob(_)));
        assert!(queue.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn failed_save_leaves_queue_unchanged() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let queue = DurableQueue::open(Box::new(SharedStore(store.clone())), 50).unwrap();

        store.set_fail_saves(true);
        assert!(queue.enqueue(record(1)).await.is_err());
        assert!(queue.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn update_item_replaces_by_id() {
        let queue = open(vec![]);
        let mut item = queue.enqueue(record(1)).await.unwrap();
        queue.enqueue(record(2)).await.unwrap();

        item.mark_synced(Utc::now());
        queue.update_item(&item).await.unwrap();

        let snapshot = queue.snapshot().await;
        assert_eq!(snapshot[0].status, QueueStatus::Synced);
        assert!(snapshot[0].synced_at.is_some());
        assert_eq!(snapshot[1].status, QueueStatus::Pending);
    }

    #[tokio::test]
    async fn update_unknown_item_is_not_found() {
        let queue = open(vec![]);
        let stray = QueueItem::new(record(1));
        let err = queue.update_item(&stray).await.unwrap_err();
        assert!(matches!(err, ServerError::ItemNotFound { .. }));
    }

    #[tokio::test]
    async fn stats_by_status() {
        let mut items: Vec<QueueItem> = (0..5)
            .map(|n| item_with(n, QueueStatus::Pending, n as i64))
            .collect();
        items.push(item_with(5, QueueStatus::Synced, 5));
        items.push(item_with(6, QueueStatus::Synced, 6));
        items.push(item_with(7, QueueStatus::Failed, 7));

        let stats = open(items).stats().await;
        assert_eq!(
            stats,
            QueueStats {
                total: 8,
                pending: 5,
                synced: 2,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn compact_applies_limit() {
        let items: Vec<QueueItem> = (0..5)
            .map(|n| item_with(n, QueueStatus::Synced, n as i64))
            .collect();
        let queue = DurableQueue::open(Box::new(MemoryStore::with_items(items)), 2).unwrap();

        assert_eq!(queue.compact().await.unwrap(), 3);
        assert_eq!(queue.stats().await.synced, 2);
        assert_eq!(queue.compact().await.unwrap(), 0);
    }

    #[test]
    fn file_store_preserves_other_collections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{"savedJobs": [{"title": "Kept"}], "queue": []}"#,
        )
        .unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.load().unwrap().is_empty());

        let item = QueueItem::new(record(1));
        store.save(std::slice::from_ref(&item)).unwrap();

        let document: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(document["savedJobs"][0]["title"], "Kept");
        assert_eq!(document["queue"][0]["id"], item.id.as_str());
        assert!(!path.with_extension("json.tmp").exists());

        assert_eq!(store.load().unwrap(), vec![item]);
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));
        assert!(store.load().unwrap().is_empty());

        store.save(&[]).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn file_store_rejects_corrupt_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "[1, 2").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(ServerError::Storage { .. })));
        // Never clobber a document we could not read.
        assert!(store.save(&[]).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1, 2");
    }

    #[tokio::test]
    async fn queue_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let queue = DurableQueue::open(Box::new(JsonFileStore::new(&path)), 50).unwrap();
        let item = queue.enqueue(record(1)).await.unwrap();
        drop(queue);

        let reopened = DurableQueue::open(Box::new(JsonFileStore::new(&path)), 50).unwrap();
        assert_eq!(reopened.snapshot().await, vec![item]);
    }

    /// Lets a test keep a handle on the store the queue owns.
    struct SharedStore(std::sync::Arc<MemoryStore>);

    impl QueueStore for SharedStore {
        fn load(&self) -> ServerResult<Vec<QueueItem>> {
            self.0.load()
        }

        fn save(&self, items: &[QueueItem]) -> ServerResult<()> {
            self.0.save(items)
        }

        fn describe(&self) -> String {
            self.0.describe()
        }
    }
}
