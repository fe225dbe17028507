//! Inbound killmail feed client. Long-polls a single endpoint that yields at
//! most one killmail per request, `null` meaning the queue is empty right
//! now. Respects a minimum poll interval and backs off exponentially on
//! transport errors.

use std::future::Future;
use std::time::Duration;

use battlescope_core::ingest::RawKillmail;

pub struct FeedClient {
    client: reqwest::Client,
    url: String,
    min_poll_interval: Duration,
}

impl FeedClient {
    pub fn new(url: impl Into<String>, min_poll_interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            min_poll_interval,
        }
    }

    /// Runs forever, calling `on_killmail` for each record the feed yields.
    /// Transport errors are logged and retried with exponential backoff,
    /// capped at 60s, resetting after a successful poll.
    pub async fn run<F, Fut>(&self, mut on_killmail: F)
    where
        F: FnMut(RawKillmail) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut backoff = self.min_poll_interval;
        loop {
            match self.poll_once().await {
                Ok(Some(raw)) => {
                    on_killmail(raw).await;
                    backoff = self.min_poll_interval;
                }
                Ok(None) => {
                    backoff = self.min_poll_interval;
                }
                Err(err) => {
                    tracing::warn!(error = %err, backoff_ms = backoff.as_millis(), "feed poll failed");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(60));
                    continue;
                }
            }
            tokio::time::sleep(self.min_poll_interval).await;
        }
    }

    async fn poll_once(&self) -> anyhow::Result<Option<RawKillmail>> {
        let resp = self.client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("feed returned HTTP {}", resp.status());
        }
        let parsed: Option<RawKillmail> = resp.json().await?;
        Ok(parsed)
    }
}
