//! `PgBattleStore` implements the `BattleStore` write port plus the read
//! queries an external API consumes. Read methods are plain inherent
//! `async fn`s rather than trait members — they're a declarative query
//! surface, not part of the clustering invariants `BattleStore` itself
//! protects.

use anyhow::anyhow;
use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use battlescope_core::engine::BattlePlan;
use battlescope_core::{BattleSpan, BattleStore, CoreError, KillmailEvent, Result};
use battlescope_types::{
    BattleDetail, BattleFilters, BattleSummary, Cursor, DashboardSummary, KillmailWithEnrichment,
    ParticipantView, RankedEntity,
};

use crate::sqlx_types::{encode_space_type, PgBattleRow, PgKillmailEventRow, PgParticipantRow};

pub struct PgBattleStore {
    pool: PgPool,
}

impl PgBattleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BattleStore for PgBattleStore {
    async fn create_battle(&self, plan: &BattlePlan) -> Result<Uuid> {
        let mut tx = self.pool.begin().await.map_err(|e| CoreError::Internal(anyhow!(e)))?;

        sqlx::query(
            r#"
            INSERT INTO battles (
                id, system_id, space_type, security_type,
                start_time, end_time, total_kills, total_isk_destroyed, zkill_related_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(plan.id)
        .bind(plan.system_id)
        .bind(encode_space_type(plan.space_type))
        .bind(plan.security_type.as_str())
        .bind(plan.start_time)
        .bind(plan.end_time)
        .bind(plan.total_kills)
        .bind(&plan.total_isk_destroyed)
        .bind(&plan.zkill_related_url)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        for killmail_id in &plan.killmail_ids {
            sqlx::query("INSERT INTO battle_killmails (battle_id, killmail_id) VALUES ($1, $2)")
                .bind(plan.id)
                .bind(killmail_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| CoreError::Internal(anyhow!(e)))?;
        }

        for p in &plan.participants {
            sqlx::query(
                r#"
                INSERT INTO battle_participants (
                    battle_id, character_id, alliance_id, corp_id, ship_type_id, side_id, is_victim
                )
                VALUES ($1, $2, $3, $4, $5, NULL, $6)
                ON CONFLICT (battle_id, character_id) DO NOTHING
                "#,
            )
            .bind(plan.id)
            .bind(p.character_id)
            .bind(p.alliance_id)
            .bind(p.corp_id)
            .bind(p.ship_type_id)
            .bind(p.is_victim)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::Internal(anyhow!(e)))?;
        }

        tx.commit().await.map_err(|e| CoreError::Internal(anyhow!(e)))?;
        Ok(plan.id)
    }

    async fn find_attribution_candidates(
        &self,
        system_id: i64,
        occurred_at: DateTime<Utc>,
        delta_minutes: i64,
    ) -> Result<Vec<BattleSpan>> {
        let delta_minutes = delta_minutes as i32;
        let rows: Vec<(Uuid, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, start_time, end_time
            FROM battles
            WHERE system_id = $1
              AND start_time - make_interval(mins => $3) <= $2
              AND $2 <= end_time + make_interval(mins => $3)
            ORDER BY abs(extract(epoch FROM (end_time - $2)))
            LIMIT 5
            "#,
        )
        .bind(system_id)
        .bind(occurred_at)
        .bind(delta_minutes)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        Ok(rows
            .into_iter()
            .map(|(id, start_time, end_time)| BattleSpan {
                id,
                start_time,
                end_time,
            })
            .collect())
    }

    async fn append_killmail(
        &self,
        battle_id: Uuid,
        event: &KillmailEvent,
        window_minutes: i64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| CoreError::Internal(anyhow!(e)))?;

        // Row lock serialises concurrent clusterer instances extending the
        // same battle, per the single-writer-per-battle invariant.
        let (start_time, end_time, total_isk): (DateTime<Utc>, DateTime<Utc>, BigDecimal) =
            sqlx::query_as(
                "SELECT start_time, end_time, total_isk_destroyed FROM battles WHERE id = $1 FOR UPDATE",
            )
            .bind(battle_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| CoreError::Internal(anyhow!(e)))?
            .ok_or_else(|| CoreError::NotFound(format!("battle {battle_id}")))?;

        let new_start = start_time.min(event.occurred_at);
        let new_end = end_time.max(event.occurred_at);

        // The row lock means this check is against live state, not the
        // possibly-stale candidate span the caller matched on — two
        // concurrent attributions can't both sneak a battle past its window.
        if new_end - new_start > chrono::Duration::minutes(window_minutes) {
            return Err(CoreError::InvariantViolation(format!(
                "attaching killmail {} to battle {battle_id} would stretch its span to {}m, past the {window_minutes}m window",
                event.killmail_id,
                (new_end - new_start).num_minutes(),
            )));
        }

        let added_isk = if event.isk_value < BigDecimal::zero() {
            BigDecimal::zero()
        } else {
            event.isk_value.clone()
        };

        sqlx::query(
            r#"
            UPDATE battles
            SET start_time = $2, end_time = $3,
                total_kills = total_kills + 1,
                total_isk_destroyed = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(battle_id)
        .bind(new_start)
        .bind(new_end)
        .bind(total_isk + added_isk)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        sqlx::query(
            "INSERT INTO battle_killmails (battle_id, killmail_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(battle_id)
        .bind(event.killmail_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        if let Some(character_id) = event.victim_character_id {
            upsert_participant(
                &mut tx,
                battle_id,
                character_id,
                event.victim_alliance_id,
                event.victim_corp_id,
                event.victim_ship_type_id,
                true,
            )
            .await?;
        }
        for &character_id in &event.attacker_character_ids {
            upsert_participant(&mut tx, battle_id, character_id, None, None, None, false).await?;
        }

        tx.commit().await.map_err(|e| CoreError::Internal(anyhow!(e)))?;
        Ok(())
    }
}

async fn upsert_participant(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    battle_id: Uuid,
    character_id: i64,
    alliance_id: Option<i64>,
    corp_id: Option<i64>,
    ship_type_id: Option<i64>,
    is_victim: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO battle_participants (battle_id, character_id, alliance_id, corp_id, ship_type_id, side_id, is_victim)
        VALUES ($1, $2, $3, $4, $5, NULL, $6)
        ON CONFLICT (battle_id, character_id) DO UPDATE SET
            alliance_id = COALESCE(EXCLUDED.alliance_id, battle_participants.alliance_id),
            corp_id = COALESCE(EXCLUDED.corp_id, battle_participants.corp_id),
            ship_type_id = COALESCE(EXCLUDED.ship_type_id, battle_participants.ship_type_id),
            is_victim = battle_participants.is_victim OR EXCLUDED.is_victim
        "#,
    )
    .bind(battle_id)
    .bind(character_id)
    .bind(alliance_id)
    .bind(corp_id)
    .bind(ship_type_id)
    .bind(is_victim)
    .execute(&mut **tx)
    .await
    .map_err(|e| CoreError::Internal(anyhow!(e)))?;
    Ok(())
}

impl PgBattleStore {
    pub async fn list_battles(
        &self,
        filters: &BattleFilters,
        cursor: Option<Cursor>,
        limit: i64,
    ) -> Result<(Vec<BattleSummary>, Option<Cursor>)> {
        let limit = limit.clamp(1, 100);

        // Filters are independently optional, so the predicate is built up
        // with `QueryBuilder` rather than a fixed positional query — every
        // pushed value stays a bound parameter, never interpolated text.
        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            r#"
            SELECT b.id, b.system_id, b.space_type, b.security_type,
                   b.start_time, b.end_time, b.total_kills, b.total_isk_destroyed,
                   b.zkill_related_url, b.created_at, b.updated_at
            FROM battles b
            WHERE 1 = 1
            "#,
        );
        if let Some(system_id) = filters.system_id {
            qb.push(" AND b.system_id = ").push_bind(system_id);
        }
        if let Some(space_type) = filters.space_type {
            qb.push(" AND b.space_type = ").push_bind(encode_space_type(space_type));
        }
        if let Some(security_type) = filters.security_type {
            qb.push(" AND b.security_type = ").push_bind(security_type.as_str());
        }
        if let Some(since) = filters.since {
            qb.push(" AND b.start_time >= ").push_bind(since);
        }
        if let Some(until) = filters.until {
            qb.push(" AND b.end_time <= ").push_bind(until);
        }
        if let Some(alliance_id) = filters.alliance_id {
            qb.push(" AND EXISTS (SELECT 1 FROM battle_participants p WHERE p.battle_id = b.id AND p.alliance_id = ")
                .push_bind(alliance_id)
                .push(")");
        }
        if let Some(corp_id) = filters.corp_id {
            qb.push(" AND EXISTS (SELECT 1 FROM battle_participants p WHERE p.battle_id = b.id AND p.corp_id = ")
                .push_bind(corp_id)
                .push(")");
        }
        if let Some(character_id) = filters.character_id {
            qb.push(" AND EXISTS (SELECT 1 FROM battle_participants p WHERE p.battle_id = b.id AND p.character_id = ")
                .push_bind(character_id)
                .push(")");
        }
        if let Some(cursor) = cursor {
            qb.push(" AND (b.start_time, b.id) < (")
                .push_bind(cursor.start_time)
                .push(", ")
                .push_bind(cursor.id)
                .push(")");
        }
        qb.push(" ORDER BY b.start_time DESC, b.id DESC LIMIT ").push_bind(limit + 1);

        let rows: Vec<PgBattleRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        let has_more = rows.len() as i64 > limit;
        let mut rows = rows;
        rows.truncate(limit as usize);

        let next_cursor = if has_more {
            rows.last().map(|r| Cursor {
                start_time: r.start_time,
                id: r.id,
            })
        } else {
            None
        };

        let items = rows
            .into_iter()
            .map(|r| {
                let battle: battlescope_core::Battle = r.into();
                BattleSummary {
                    id: battle.id,
                    system_id: battle.system_id,
                    space_type: battle.space_type,
                    security_type: battle.security_type,
                    start_time: battle.start_time,
                    end_time: battle.end_time,
                    total_kills: battle.total_kills,
                    total_isk_destroyed: battle.total_isk_destroyed,
                    zkill_related_url: battle.zkill_related_url,
                }
            })
            .collect();

        Ok((items, next_cursor))
    }

    pub async fn get_battle(&self, id: Uuid) -> Result<BattleDetail> {
        let battle_row: PgBattleRow = sqlx::query_as(
            r#"
            SELECT id, system_id, space_type, security_type, start_time, end_time,
                   total_kills, total_isk_destroyed, zkill_related_url, created_at, updated_at
            FROM battles WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?
        .ok_or_else(|| CoreError::NotFound(format!("battle {id}")))?;

        let killmail_rows: Vec<PgKillmailEventRow> = sqlx::query_as(
            r#"
            SELECT k.killmail_id, k.system_id, k.occurred_at, k.fetched_at,
                   k.victim_alliance_id, k.victim_corp_id, k.victim_character_id, k.victim_ship_type_id,
                   k.attacker_alliance_ids, k.attacker_corp_ids, k.attacker_character_ids,
                   k.isk_value, k.zkb_url, k.processed_at, k.battle_id
            FROM killmail_events k
            JOIN battle_killmails bk ON bk.killmail_id = k.killmail_id
            WHERE bk.battle_id = $1
            ORDER BY k.occurred_at, k.killmail_id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        let enrichment_rows: Vec<crate::sqlx_types::PgEnrichmentRow> = sqlx::query_as(
            r#"
            SELECT e.killmail_id, e.status, e.payload, e.error, e.fetched_at, e.created_at, e.updated_at
            FROM killmail_enrichments e
            JOIN battle_killmails bk ON bk.killmail_id = e.killmail_id
            WHERE bk.battle_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        let mut enrichment_by_id = std::collections::HashMap::new();
        for row in enrichment_rows {
            enrichment_by_id.insert(row.killmail_id, row);
        }

        let killmails = killmail_rows
            .into_iter()
            .map(|row| {
                let killmail_id = row.killmail_id;
                let event: KillmailEvent = row.into();
                let enrichment = enrichment_by_id.remove(&killmail_id).map(Into::into);
                KillmailWithEnrichment { event, enrichment }
            })
            .collect();

        let participant_rows: Vec<PgParticipantRow> = sqlx::query_as(
            r#"
            SELECT battle_id, character_id, alliance_id, corp_id, ship_type_id, side_id, is_victim
            FROM battle_participants WHERE battle_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        let participants = participant_rows
            .into_iter()
            .map(|r| ParticipantView {
                character_id: r.character_id,
                alliance_id: r.alliance_id,
                corp_id: r.corp_id,
                ship_type_id: r.ship_type_id,
                side_id: r.side_id,
                is_victim: r.is_victim,
            })
            .collect();

        let battle: battlescope_core::Battle = battle_row.into();
        Ok(BattleDetail {
            summary: BattleSummary {
                id: battle.id,
                system_id: battle.system_id,
                space_type: battle.space_type,
                security_type: battle.security_type,
                start_time: battle.start_time,
                end_time: battle.end_time,
                total_kills: battle.total_kills,
                total_isk_destroyed: battle.total_isk_destroyed,
                zkill_related_url: battle.zkill_related_url,
            },
            killmails,
            participants,
        })
    }

    pub async fn recent_killmails(
        &self,
        limit: i64,
        security_types: &[battlescope_core::SecurityType],
        tracked_only: bool,
    ) -> Result<Vec<KillmailEvent>> {
        let limit = limit.clamp(1, 200);
        let security_filter: Vec<&'static str> = security_types.iter().map(|t| t.as_str()).collect();

        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            r#"
            SELECT k.killmail_id, k.system_id, k.occurred_at, k.fetched_at,
                   k.victim_alliance_id, k.victim_corp_id, k.victim_character_id, k.victim_ship_type_id,
                   k.attacker_alliance_ids, k.attacker_corp_ids, k.attacker_character_ids,
                   k.isk_value, k.zkb_url, k.processed_at, k.battle_id
            FROM killmail_events k
            "#,
        );
        if !security_filter.is_empty() {
            qb.push(" JOIN battles b ON b.id = k.battle_id WHERE b.security_type = ANY(")
                .push_bind(security_filter)
                .push(")");
        } else {
            qb.push(" WHERE 1 = 1");
        }
        if tracked_only {
            qb.push(
                r#" AND EXISTS (
                    SELECT 1 FROM rulesets r
                    WHERE r.id = true
                      AND (
                        k.victim_alliance_id = ANY(r.tracked_alliance_ids)
                        OR k.victim_corp_id = ANY(r.tracked_corp_ids)
                        OR k.system_id = ANY(r.tracked_system_ids)
                        OR k.attacker_alliance_ids && r.tracked_alliance_ids
                        OR k.attacker_corp_ids && r.tracked_corp_ids
                      )
                )"#,
            );
        }
        qb.push(" ORDER BY k.occurred_at DESC LIMIT ").push_bind(limit);

        let rows: Vec<PgKillmailEventRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let (total_battles, total_killmails): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT count(*) FROM battles), (SELECT count(*) FROM killmail_events WHERE battle_id IS NOT NULL)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        let (unique_alliances, unique_corporations): (i64, i64) = sqlx::query_as(
            r#"
            SELECT count(DISTINCT alliance_id) FILTER (WHERE alliance_id IS NOT NULL),
                   count(DISTINCT corp_id) FILTER (WHERE corp_id IS NOT NULL)
            FROM battle_participants
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        let top_alliances: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT alliance_id, count(*) AS kills
            FROM battle_participants
            WHERE alliance_id IS NOT NULL
            GROUP BY alliance_id
            ORDER BY kills DESC
            LIMIT 10
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        let top_corporations: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT corp_id, count(*) AS kills
            FROM battle_participants
            WHERE corp_id IS NOT NULL
            GROUP BY corp_id
            ORDER BY kills DESC
            LIMIT 10
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        Ok(DashboardSummary {
            total_battles,
            total_killmails,
            unique_alliances,
            unique_corporations,
            top_alliances: top_alliances
                .into_iter()
                .map(|(id, kills)| RankedEntity { id, kills })
                .collect(),
            top_corporations: top_corporations
                .into_iter()
                .map(|(id, kills)| RankedEntity { id, kills })
                .collect(),
            generated_at: Utc::now(),
        })
    }

    /// Removes a battle's membership/participant rows and the battle itself;
    /// member killmails are left in place with `battle_id` cleared so they
    /// remain eligible for future clustering. Used for operator correction
    /// of a mis-clustered battle.
    pub async fn soft_delete_battle(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| CoreError::Internal(anyhow!(e)))?;

        sqlx::query("UPDATE killmail_events SET processed_at = NULL, battle_id = NULL WHERE battle_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::Internal(anyhow!(e)))?;
        sqlx::query("DELETE FROM battle_participants WHERE battle_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::Internal(anyhow!(e)))?;
        sqlx::query("DELETE FROM battle_killmails WHERE battle_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::Internal(anyhow!(e)))?;
        sqlx::query("DELETE FROM battles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::Internal(anyhow!(e)))?;

        tx.commit().await.map_err(|e| CoreError::Internal(anyhow!(e)))?;
        Ok(())
    }
}
