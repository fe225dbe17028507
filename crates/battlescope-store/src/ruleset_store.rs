use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::PgPool;

use battlescope_core::{CoreError, Result, Ruleset, RulesetPatch, RulesetStore};

use crate::sqlx_types::PgRulesetRow;

pub struct PgRulesetStore {
    pool: PgPool,
}

impl PgRulesetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RulesetStore for PgRulesetStore {
    async fn get(&self) -> Result<Ruleset> {
        let row = sqlx::query_as::<_, PgRulesetRow>(
            r#"
            SELECT min_pilots, tracked_alliance_ids, tracked_corp_ids,
                   tracked_system_ids, tracked_security_types, ignore_unlisted, updated_at
            FROM rulesets
            WHERE id = true
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        row.map(Into::into)
            .ok_or_else(|| CoreError::NotFound("ruleset singleton row missing".to_string()))
    }

    async fn update(&self, patch: RulesetPatch) -> Result<Ruleset> {
        let current = self.get().await?;
        let updated = current.apply(patch);

        let tracked_security_types: Vec<&'static str> = updated
            .tracked_security_types
            .iter()
            .map(|t| t.as_str())
            .collect();

        sqlx::query(
            r#"
            UPDATE rulesets
            SET min_pilots = $1,
                tracked_alliance_ids = $2,
                tracked_corp_ids = $3,
                tracked_system_ids = $4,
                tracked_security_types = $5,
                ignore_unlisted = $6,
                updated_at = $7
            WHERE id = true
            "#,
        )
        .bind(updated.min_pilots)
        .bind(&updated.tracked_alliance_ids)
        .bind(&updated.tracked_corp_ids)
        .bind(&updated.tracked_system_ids)
        .bind(&tracked_security_types)
        .bind(updated.ignore_unlisted)
        .bind(updated.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        Ok(updated)
    }
}
