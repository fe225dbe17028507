//! `EnrichmentWorker` — drives each killmail's enrichment row through
//! `pending -> processing -> {succeeded, failed}`, retrying from `failed`.
//! The actual fetch is delegated to an `EnrichmentSource` so this module
//! stays free of any particular HTTP client; `battlescope`'s binary crate
//! supplies the `reqwest`-backed implementation.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::ports::{EnrichmentStore, EventSink};

/// A source of killmail enrichment data (ship/character/corp/alliance
/// names, security status, etc.) — conceptually ESI, but never named here so
/// the worker can be driven in tests without network access.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    async fn fetch(&self, killmail_id: i64) -> Result<serde_json::Value>;
}

pub struct EnrichmentWorker<S, E> {
    store: S,
    source: E,
    event_sink: Arc<dyn EventSink>,
    batch_size: i64,
    /// Minimum spacing between successive source calls, enforced across the
    /// whole worker regardless of how many killmails are due.
    min_call_interval: StdDuration,
    last_call: Mutex<Instant>,
}

impl<S, E> EnrichmentWorker<S, E>
where
    S: EnrichmentStore,
    E: EnrichmentSource,
{
    pub fn new(
        store: S,
        source: E,
        event_sink: Arc<dyn EventSink>,
        batch_size: i64,
        min_call_interval: StdDuration,
    ) -> Self {
        Self {
            store,
            source,
            event_sink,
            batch_size,
            min_call_interval,
            last_call: Mutex::new(Instant::now() - min_call_interval),
        }
    }

    /// Processes up to `batch_size` due enrichments, pacing calls to the
    /// source no faster than `min_call_interval` apart. Returns how many
    /// succeeded.
    pub async fn run_once(&self) -> Result<usize> {
        let due = self.store.fetch_due(self.batch_size).await?;
        let mut succeeded = 0;

        for killmail_id in due {
            self.throttle().await;
            self.store.mark_processing(killmail_id).await?;

            match self.source.fetch(killmail_id).await {
                Ok(payload) => {
                    self.store.mark_succeeded(killmail_id, payload).await?;
                    self.event_sink.killmail_enriched(killmail_id);
                    succeeded += 1;
                }
                Err(err) => {
                    self.store.mark_failed(killmail_id, &err.to_string()).await?;
                }
            }
        }

        Ok(succeeded)
    }

    async fn throttle(&self) {
        let mut last_call = self.last_call.lock().await;
        let elapsed = last_call.elapsed();
        if elapsed < self.min_call_interval {
            tokio::time::sleep(self.min_call_interval - elapsed).await;
        }
        *last_call = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NullEventSink;
    use crate::types::KillmailEnrichment;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeEnrichmentStore {
        rows: StdMutex<HashMap<i64, KillmailEnrichment>>,
        due: StdMutex<Vec<i64>>,
    }

    #[async_trait]
    impl EnrichmentStore for FakeEnrichmentStore {
        async fn ensure_pending(&self, killmail_id: i64) -> Result<()> {
            self.due.lock().unwrap().push(killmail_id);
            Ok(())
        }

        async fn mark_processing(&self, _killmail_id: i64) -> Result<()> {
            Ok(())
        }

        async fn mark_succeeded(&self, killmail_id: i64, payload: serde_json::Value) -> Result<()> {
            self.rows.lock().unwrap().insert(
                killmail_id,
                KillmailEnrichment {
                    killmail_id,
                    status: crate::types::EnrichmentStatus::Succeeded,
                    payload: Some(payload),
                    error: None,
                    fetched_at: None,
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                },
            );
            Ok(())
        }

        async fn mark_failed(&self, killmail_id: i64, error: &str) -> Result<()> {
            self.rows.lock().unwrap().insert(
                killmail_id,
                KillmailEnrichment {
                    killmail_id,
                    status: crate::types::EnrichmentStatus::Failed,
                    payload: None,
                    error: Some(error.to_string()),
                    fetched_at: None,
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                },
            );
            Ok(())
        }

        async fn get(&self, killmail_id: i64) -> Result<Option<KillmailEnrichment>> {
            Ok(self.rows.lock().unwrap().get(&killmail_id).cloned())
        }

        async fn fetch_due(&self, limit: i64) -> Result<Vec<i64>> {
            let mut due = self.due.lock().unwrap();
            let n = (limit as usize).min(due.len());
            Ok(due.drain(..n).collect())
        }
    }

    struct AlwaysSucceedsSource;

    #[async_trait]
    impl EnrichmentSource for AlwaysSucceedsSource {
        async fn fetch(&self, killmail_id: i64) -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "killmail_id": killmail_id }))
        }
    }

    struct AlwaysFailsSource;

    #[async_trait]
    impl EnrichmentSource for AlwaysFailsSource {
        async fn fetch(&self, _killmail_id: i64) -> Result<serde_json::Value> {
            Err(crate::error::CoreError::Internal(anyhow::anyhow!(
                "source unavailable"
            )))
        }
    }

    #[tokio::test]
    async fn succeeding_source_marks_succeeded() {
        let store = FakeEnrichmentStore::default();
        store.ensure_pending(1).await.unwrap();
        let worker = EnrichmentWorker::new(
            store,
            AlwaysSucceedsSource,
            Arc::new(NullEventSink),
            10,
            StdDuration::from_millis(0),
        );
        let n = worker.run_once().await.unwrap();
        assert_eq!(n, 1);
        let row = worker.store.get(1).await.unwrap().unwrap();
        assert_eq!(row.status, crate::types::EnrichmentStatus::Succeeded);
    }

    #[tokio::test]
    async fn failing_source_marks_failed_without_erroring_the_batch() {
        let store = FakeEnrichmentStore::default();
        store.ensure_pending(1).await.unwrap();
        let worker = EnrichmentWorker::new(
            store,
            AlwaysFailsSource,
            Arc::new(NullEventSink),
            10,
            StdDuration::from_millis(0),
        );
        let n = worker.run_once().await.unwrap();
        assert_eq!(n, 0);
        let row = worker.store.get(1).await.unwrap().unwrap();
        assert_eq!(row.status, crate::types::EnrichmentStatus::Failed);
    }
}
