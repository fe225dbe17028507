use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::PgPool;

use battlescope_core::{CoreError, EnrichmentStore, KillmailEnrichment, Result};

use crate::sqlx_types::PgEnrichmentRow;

pub struct PgEnrichmentStore {
    pool: PgPool,
}

impl PgEnrichmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrichmentStore for PgEnrichmentStore {
    async fn ensure_pending(&self, killmail_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO killmail_enrichments (killmail_id, status)
            VALUES ($1, 'pending')
            ON CONFLICT (killmail_id) DO NOTHING
            "#,
        )
        .bind(killmail_id)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;
        Ok(())
    }

    async fn mark_processing(&self, killmail_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE killmail_enrichments
            SET status = 'processing', updated_at = now()
            WHERE killmail_id = $1
            "#,
        )
        .bind(killmail_id)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;
        Ok(())
    }

    async fn mark_succeeded(&self, killmail_id: i64, payload: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE killmail_enrichments
            SET status = 'succeeded', payload = $2, error = NULL,
                fetched_at = now(), updated_at = now()
            WHERE killmail_id = $1
            "#,
        )
        .bind(killmail_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;
        Ok(())
    }

    async fn mark_failed(&self, killmail_id: i64, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE killmail_enrichments
            SET status = 'failed', error = $2, updated_at = now()
            WHERE killmail_id = $1
            "#,
        )
        .bind(killmail_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;
        Ok(())
    }

    async fn get(&self, killmail_id: i64) -> Result<Option<KillmailEnrichment>> {
        let row = sqlx::query_as::<_, PgEnrichmentRow>(
            r#"
            SELECT killmail_id, status, payload, error, fetched_at, created_at, updated_at
            FROM killmail_enrichments
            WHERE killmail_id = $1
            "#,
        )
        .bind(killmail_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        Ok(row.map(Into::into))
    }

    async fn fetch_due(&self, limit: i64) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT killmail_id
            FROM killmail_enrichments
            WHERE status IN ('pending', 'failed')
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        Ok(ids)
    }
}
