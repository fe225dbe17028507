use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use battlescope_core::{CoreError, KillmailEvent, KillmailStore, Result};

use crate::sqlx_types::PgKillmailEventRow;

pub struct PgKillmailStore {
    pool: PgPool,
}

impl PgKillmailStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KillmailStore for PgKillmailStore {
    async fn insert(&self, event: KillmailEvent) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO killmail_events (
                killmail_id, system_id, occurred_at, fetched_at,
                victim_alliance_id, victim_corp_id, victim_character_id, victim_ship_type_id,
                attacker_alliance_ids, attacker_corp_ids, attacker_character_ids,
                isk_value, zkb_url, processed_at, battle_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (killmail_id) DO NOTHING
            "#,
        )
        .bind(event.killmail_id)
        .bind(event.system_id)
        .bind(event.occurred_at)
        .bind(event.fetched_at)
        .bind(event.victim_alliance_id)
        .bind(event.victim_corp_id)
        .bind(event.victim_character_id)
        .bind(event.victim_ship_type_id)
        .bind(&event.attacker_alliance_ids)
        .bind(&event.attacker_corp_ids)
        .bind(&event.attacker_character_ids)
        .bind(&event.isk_value)
        .bind(&event.zkb_url)
        .bind(event.processed_at)
        .bind(event.battle_id)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::Duplicate(event.killmail_id));
        }
        Ok(())
    }

    async fn fetch_unprocessed(
        &self,
        limit: i64,
        max_occurred_at: DateTime<Utc>,
    ) -> Result<Vec<KillmailEvent>> {
        let rows = sqlx::query_as::<_, PgKillmailEventRow>(
            r#"
            SELECT killmail_id, system_id, occurred_at, fetched_at,
                   victim_alliance_id, victim_corp_id, victim_character_id, victim_ship_type_id,
                   attacker_alliance_ids, attacker_corp_ids, attacker_character_ids,
                   isk_value, zkb_url, processed_at, battle_id
            FROM killmail_events
            WHERE processed_at IS NULL AND occurred_at <= $1
            ORDER BY occurred_at, killmail_id
            LIMIT $2
            "#,
        )
        .bind(max_occurred_at)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn fetch_recent_for_backfill(
        &self,
        system_id: i64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<KillmailEvent>> {
        let rows = sqlx::query_as::<_, PgKillmailEventRow>(
            r#"
            SELECT killmail_id, system_id, occurred_at, fetched_at,
                   victim_alliance_id, victim_corp_id, victim_character_id, victim_ship_type_id,
                   attacker_alliance_ids, attacker_corp_ids, attacker_character_ids,
                   isk_value, zkb_url, processed_at, battle_id
            FROM killmail_events
            WHERE system_id = $1 AND occurred_at BETWEEN $2 AND $3
            ORDER BY occurred_at, killmail_id
            "#,
        )
        .bind(system_id)
        .bind(window_start)
        .bind(window_end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_processed(&self, killmail_ids: &[i64], battle_id: Option<Uuid>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE killmail_events
            SET processed_at = now(), battle_id = $2
            WHERE killmail_id = ANY($1)
            "#,
        )
        .bind(killmail_ids)
        .bind(battle_id)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;
        Ok(())
    }
}
