//! Per-id enrichment fetch client, implementing `battlescope_core::EnrichmentSource`
//! against an HTTP endpoint. The worker's own throttle floor is the only
//! pacing this client is subject to — it does not inspect response headers.

use async_trait::async_trait;

use battlescope_core::{CoreError, EnrichmentSource, Result};

pub struct HttpEnrichmentSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEnrichmentSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl EnrichmentSource for HttpEnrichmentSource {
    async fn fetch(&self, killmail_id: i64) -> Result<serde_json::Value> {
        let url = format!("{}/{killmail_id}", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::Internal(e.into()))?;

        if !resp.status().is_success() {
            return Err(CoreError::Internal(anyhow::anyhow!(
                "enrichment source returned HTTP {} for killmail {killmail_id}",
                resp.status()
            )));
        }

        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| CoreError::Internal(e.into()))
    }
}
