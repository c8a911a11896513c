//! Drains pending queue items into the sink.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use jobflow_protocol::SyncSummary;
use jobflow_sink::{AccessToken, AppendResponse, JobSink, SinkResult, TokenProvider};

use crate::error::ServerResult;
use crate::notify::{Notice, Notifier};
use crate::queue::{DEFAULT_MAX_RETRIES, DurableQueue, QueueItem, QueueStatus};

/// Sync engine settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Failed attempts before an item is marked failed.
    pub max_retries: u32,
    /// Whether the first token of a pass may prompt the user.
    pub interactive_auth: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            interactive_auth: true,
        }
    }
}

impl SyncConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_interactive_auth(mut self, interactive: bool) -> Self {
        self.interactive_auth = interactive;
        self
    }
}

enum Outcome {
    Synced,
    Retrying,
    Failed,
}

/// Moves pending items to the sink, one at a time.
pub struct SyncEngine {
    queue: Arc<DurableQueue>,
    tokens: Arc<TokenProvider>,
    sink: Arc<dyn JobSink>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    pass: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<DurableQueue>,
        tokens: Arc<TokenProvider>,
        sink: Arc<dyn JobSink>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        Self {
            queue,
            tokens,
            sink,
            notifier,
            config,
            pass: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &Arc<DurableQueue> {
        &self.queue
    }

    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    /// Runs one pass over every pending item.
    ///
    /// Items are independent: one that fails only costs itself a retry.
    /// The pass stops early only when no token can be obtained, leaving the
    /// remaining items untouched; the queue is still compacted. Concurrent
    /// calls run one after another.
    #[instrument(skip(self), fields(sink = %self.sink.name()))]
    pub async fn drain_pending(&self) -> ServerResult<SyncSummary> {
        let _pass = self.pass.lock().await;

        let pending: Vec<QueueItem> = self
            .queue
            .snapshot()
            .await
            .into_iter()
            .filter(QueueItem::is_pending)
            .collect();

        let mut summary = SyncSummary::default();
        if pending.is_empty() {
            debug!("No pending jobs");
        } else {
            info!(pending = pending.len(), "Syncing pending jobs");
        }

        let mut aborted = None;
        for item in pending {
            let token = match self.tokens.acquire(self.config.interactive_auth).await {
                Ok(token) => token,
                Err(e) => {
                    aborted = Some(e);
                    break;
                }
            };
            match self.process(item, token).await {
                Outcome::Synced => summary.succeeded += 1,
                Outcome::Retrying => summary.still_pending += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }

        if let Err(e) = self.queue.compact().await {
            warn!(error = %e, "Failed to compact queue");
        }

        if let Some(e) = aborted {
            warn!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                still_pending = summary.still_pending,
                error = %e,
                "Sync pass stopped without a token"
            );
            return Err(e.into());
        }

        if summary.processed() > 0 {
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                still_pending = summary.still_pending,
                "Sync pass finished"
            );
        }
        Ok(summary)
    }

    async fn process(&self, mut item: QueueItem, token: AccessToken) -> Outcome {
        let result = match self.sink.append(&item.data, &token).await {
            Err(e) if e.is_auth_expired() => {
                info!(id = %item.id, "Sink rejected the token, re-authorizing");
                self.retry_with_fresh_token(&item).await
            }
            other => other,
        };

        match result {
            Ok(_) => {
                item.mark_synced(Utc::now());
                if !self.persist(&item).await {
                    return Outcome::Retrying;
                }
                info!(id = %item.id, title = %item.data.display_title(), "Job synced");
                self.notifier.notify(&Notice::job_saved(&item.data));
                Outcome::Synced
            }
            Err(e) => {
                let exhausted = item.record_failure(self.config.max_retries);
                warn!(
                    id = %item.id,
                    retries = item.retries,
                    max_retries = self.config.max_retries,
                    error = %e,
                    "Failed to sync job"
                );
                if !self.persist(&item).await {
                    return Outcome::Retrying;
                }
                if exhausted {
                    error!(id = %item.id, retries = item.retries, "Giving up on job");
                    self.notifier.notify(&Notice::sync_failed(&item.data));
                    Outcome::Failed
                } else {
                    debug_assert_eq!(item.status, QueueStatus::Pending);
                    Outcome::Retrying
                }
            }
        }
    }

    /// The one retry after a rejected token.
    async fn retry_with_fresh_token(&self, item: &QueueItem) -> SinkResult<AppendResponse> {
        self.tokens.invalidate().await;
        let token = self.tokens.acquire(true).await?;
        self.sink.append(&item.data, &token).await
    }

    async fn persist(&self, item: &QueueItem) -> bool {
        match self.queue.update_item(item).await {
            Ok(()) => true,
            Err(e) => {
                error!(id = %item.id, error = %e, "Failed to record sync outcome");
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeIdentity, ScriptedSink};
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::queue::MemoryStore;
    use crate::ServerError;
    use jobflow_core::JobRecord;
    use jobflow_sink::SinkError;

    struct Harness {
        engine: SyncEngine,
        identity: Arc<FakeIdentity>,
        sink: Arc<ScriptedSink>,
        notifier: Arc<RecordingNotifier>,
    }

    impl Harness {
        fn new(identity: FakeIdentity, sink: ScriptedSink) -> Self {
            Self::with_items(identity, sink, vec![])
        }

        fn with_items(identity: FakeIdentity, sink: ScriptedSink, items: Vec<QueueItem>) -> Self {
            let identity = Arc::new(identity);
            let sink = Arc::new(sink);
            let notifier = Arc::new(RecordingNotifier::new());
            let queue = Arc::new(
                DurableQueue::open(Box::new(MemoryStore::with_items(items)), 50).unwrap(),
            );
            let engine = SyncEngine::new(
                queue,
                Arc::new(TokenProvider::new(identity.clone())),
                sink.clone(),
                notifier.clone(),
                SyncConfig::default(),
            );
            Self {
                engine,
                identity,
                sink,
                notifier,
            }
        }

        async fn enqueue(&self, title: &str, company: &str) -> QueueItem {
            self.engine
                .queue()
                .enqueue(
                    JobRecord::new(format!("https://acme.example/jobs/{title}"))
                        .with_title(title)
                        .with_company(company),
                )
                .await
                .unwrap()
        }

        async fn item(&self, id: &str) -> QueueItem {
            self.engine
                .queue()
                .snapshot()
                .await
                .into_iter()
                .find(|i| i.id == id)
                .unwrap()
        }
    }

    #[tokio::test]
    async fn successful_append_marks_synced_and_notifies() {
        let h = Harness::new(FakeIdentity::default(), ScriptedSink::default());
        let item = h.enqueue("SWE", "Acme").await;

        let summary = h.engine.drain_pending().await.unwrap();
        assert_eq!(
            summary,
            SyncSummary {
                succeeded: 1,
                failed: 0,
                still_pending: 0
            }
        );

        let stored = h.item(&item.id).await;
        assert_eq!(stored.status, QueueStatus::Synced);
        assert!(stored.synced_at.is_some());
        assert_eq!(stored.retries, 0);
        assert_eq!(
            h.notifier.notices(),
            vec![Notice::JobSaved {
                title: "SWE".into(),
                company: "Acme".into()
            }]
        );
    }

    #[tokio::test]
    async fn expired_token_is_renewed_once() {
        let h = Harness::new(
            FakeIdentity::default(),
            ScriptedSink::new(vec![
                Err(SinkError::auth_expired("revoked")),
                Ok(AppendResponse::default()),
            ]),
        );
        let item = h.enqueue("SWE", "Acme").await;

        let summary = h.engine.drain_pending().await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(h.item(&item.id).await.status, QueueStatus::Synced);

        assert_eq!(h.identity.removed(), 1);
        assert_eq!(h.identity.issued(), 2);
        let tokens: Vec<String> = h.sink.calls().into_iter().map(|(_, t)| t).collect();
        assert_eq!(tokens, vec!["token-1", "token-2"]);

        let notices = h.notifier.notices();
        assert_eq!(notices.len(), 1);
        assert!(matches!(notices[0], Notice::JobSaved { .. }));
    }

    #[tokio::test]
    async fn second_rejection_counts_as_failure() {
        let h = Harness::new(
            FakeIdentity::default(),
            ScriptedSink::always(|| SinkError::auth_expired("revoked"), 2),
        );
        let item = h.enqueue("SWE", "Acme").await;

        let summary = h.engine.drain_pending().await.unwrap();
        assert_eq!(summary.still_pending, 1);
        assert_eq!(h.sink.calls().len(), 2);

        let stored = h.item(&item.id).await;
        assert_eq!(stored.status, QueueStatus::Pending);
        assert_eq!(stored.retries, 1);
    }

    #[tokio::test]
    async fn persistent_errors_fail_after_three_passes() {
        let h = Harness::new(
            FakeIdentity::default(),
            ScriptedSink::always(|| SinkError::api("Sheets API error (500): backend"), 3),
        );
        let item = h.enqueue("SWE", "Acme").await;

        for pass in 1..=2 {
            let summary = h.engine.drain_pending().await.unwrap();
            assert_eq!(summary.still_pending, 1);
            let stored = h.item(&item.id).await;
            assert_eq!(stored.status, QueueStatus::Pending);
            assert_eq!(stored.retries, pass);
            assert!(h.notifier.notices().is_empty());
        }

        let summary = h.engine.drain_pending().await.unwrap();
        assert_eq!(summary.failed, 1);

        let stored = h.item(&item.id).await;
        assert_eq!(stored.status, QueueStatus::Failed);
        assert_eq!(stored.retries, 3);
        assert_eq!(
            h.notifier.notices(),
            vec![Notice::SyncFailed { title: "SWE".into() }]
        );

        // Terminal: later passes leave it alone.
        let summary = h.engine.drain_pending().await.unwrap();
        assert_eq!(summary.processed(), 0);
        assert_eq!(h.sink.calls().len(), 3);
        assert_eq!(h.notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_pass() {
        let h = Harness::new(
            FakeIdentity::default(),
            ScriptedSink::new(vec![
                Ok(AppendResponse::default()),
                Err(SinkError::network("connection reset")),
                Ok(AppendResponse::default()),
            ]),
        );
        let first = h.enqueue("One", "A").await;
        let second = h.enqueue("Two", "B").await;
        let third = h.enqueue("Three", "C").await;

        let summary = h.engine.drain_pending().await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.still_pending, 1);

        assert_eq!(h.item(&first.id).await.status, QueueStatus::Synced);
        assert_eq!(h.item(&second.id).await.retries, 1);
        assert_eq!(h.item(&third.id).await.status, QueueStatus::Synced);

        // Snapshot order.
        let urls: Vec<String> = h.sink.calls().into_iter().map(|(u, _)| u).collect();
        assert_eq!(
            urls,
            vec![
                "https://acme.example/jobs/One",
                "https://acme.example/jobs/Two",
                "https://acme.example/jobs/Three"
            ]
        );
        // One token for the whole pass.
        assert_eq!(h.identity.issued(), 1);
    }

    #[tokio::test]
    async fn no_token_leaves_items_untouched() {
        let h = Harness::new(FakeIdentity::refusing(), ScriptedSink::default());
        let item = h.enqueue("SWE", "Acme").await;

        let err = h.engine.drain_pending().await.unwrap_err();
        assert!(err.is_auth());
        assert!(matches!(err, ServerError::Sink(_)));

        let stored = h.item(&item.id).await;
        assert_eq!(stored.status, QueueStatus::Pending);
        assert_eq!(stored.retries, 0);
        assert!(h.sink.calls().is_empty());
        assert!(h.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn missing_token_still_compacts() {
        let mut items: Vec<QueueItem> = (0..60)
            .map(|n| {
                let mut item = QueueItem::new(JobRecord::new(format!("https://a.example/{n}")));
                item.mark_synced(Utc::now());
                item
            })
            .collect();
        items.push(QueueItem::new(JobRecord::new("https://a.example/pending")));
        let h = Harness::with_items(FakeIdentity::refusing(), ScriptedSink::default(), items);

        assert!(h.engine.drain_pending().await.unwrap_err().is_auth());

        let stats = h.engine.queue().stats().await;
        assert_eq!(stats.synced, 50);
        assert_eq!(stats.pending, 1);
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_queue_only_compacts() {
        let synced: Vec<QueueItem> = (0..55)
            .map(|n| {
                let mut item = QueueItem::new(JobRecord::new(format!("https://a.example/{n}")));
                item.mark_synced(Utc::now());
                item
            })
            .collect();
        let h = Harness::with_items(FakeIdentity::refusing(), ScriptedSink::default(), synced);

        let summary = h.engine.drain_pending().await.unwrap();
        assert_eq!(summary, SyncSummary::default());
        assert_eq!(h.engine.queue().stats().await.synced, 50);
        assert!(h.notifier.notices().is_empty());
        assert_eq!(h.identity.issued(), 0);
    }

    #[tokio::test]
    async fn retries_never_exceed_budget_while_pending() {
        let h = Harness::new(
            FakeIdentity::default(),
            ScriptedSink::always(|| SinkError::network("offline"), 20),
        );
        for n in 0..4 {
            h.enqueue(&format!("job{n}"), "Acme").await;
        }

        for _ in 0..5 {
            h.engine.drain_pending().await.unwrap();
            for item in h.engine.queue().snapshot().await {
                assert!(item.retries < 3 || item.status == QueueStatus::Failed);
            }
        }
        assert_eq!(h.engine.queue().stats().await.failed, 4);
    }

    #[tokio::test]
    async fn concurrent_passes_do_not_double_append() {
        let h = Arc::new(Harness::new(FakeIdentity::default(), ScriptedSink::default()));
        h.enqueue("SWE", "Acme").await;

        let a = {
            let h = h.clone();
            tokio::spawn(async move { h.engine.drain_pending().await.unwrap() })
        };
        let b = {
            let h = h.clone();
            tokio::spawn(async move { h.engine.drain_pending().await.unwrap() })
        };
        let total = a.await.unwrap().succeeded + b.await.unwrap().succeeded;

        assert_eq!(total, 1);
        assert_eq!(h.sink.calls().len(), 1);
    }
}
