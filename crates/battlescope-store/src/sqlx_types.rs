//! SQLx row types for the BattleScope Postgres adapter.
//!
//! Each row struct derives `sqlx::FromRow` and converts into a core type.
//! This isolates `sqlx` dependencies in `battlescope-store`, keeping
//! `battlescope-core` free of it.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use battlescope_core::{
    Battle, BattleParticipant, EnrichmentStatus, KillmailEnrichment, KillmailEvent, Ruleset,
    SecurityType, SpaceType,
};

pub fn parse_space_type(s: &str) -> SpaceType {
    match s {
        "jspace" => SpaceType::Jspace,
        "pochven" => SpaceType::Pochven,
        _ => SpaceType::Kspace,
    }
}

pub fn encode_space_type(t: SpaceType) -> &'static str {
    match t {
        SpaceType::Kspace => "kspace",
        SpaceType::Jspace => "jspace",
        SpaceType::Pochven => "pochven",
    }
}

pub fn parse_security_type(s: &str) -> SecurityType {
    s.parse().unwrap_or(SecurityType::Nullsec)
}

pub fn parse_enrichment_status(s: &str) -> EnrichmentStatus {
    s.parse().unwrap_or(EnrichmentStatus::Pending)
}

#[derive(sqlx::FromRow)]
pub struct PgKillmailEventRow {
    pub killmail_id: i64,
    pub system_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub victim_alliance_id: Option<i64>,
    pub victim_corp_id: Option<i64>,
    pub victim_character_id: Option<i64>,
    pub victim_ship_type_id: Option<i64>,
    pub attacker_alliance_ids: Vec<i64>,
    pub attacker_corp_ids: Vec<i64>,
    pub attacker_character_ids: Vec<i64>,
    pub isk_value: BigDecimal,
    pub zkb_url: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub battle_id: Option<Uuid>,
}

impl From<PgKillmailEventRow> for KillmailEvent {
    fn from(r: PgKillmailEventRow) -> Self {
        KillmailEvent {
            killmail_id: r.killmail_id,
            system_id: r.system_id,
            occurred_at: r.occurred_at,
            fetched_at: r.fetched_at,
            victim_alliance_id: r.victim_alliance_id,
            victim_corp_id: r.victim_corp_id,
            victim_character_id: r.victim_character_id,
            victim_ship_type_id: r.victim_ship_type_id,
            attacker_alliance_ids: r.attacker_alliance_ids,
            attacker_corp_ids: r.attacker_corp_ids,
            attacker_character_ids: r.attacker_character_ids,
            isk_value: r.isk_value,
            zkb_url: r.zkb_url,
            processed_at: r.processed_at,
            battle_id: r.battle_id,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct PgEnrichmentRow {
    pub killmail_id: i64,
    pub status: String,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PgEnrichmentRow> for KillmailEnrichment {
    fn from(r: PgEnrichmentRow) -> Self {
        KillmailEnrichment {
            killmail_id: r.killmail_id,
            status: parse_enrichment_status(&r.status),
            payload: r.payload,
            error: r.error,
            fetched_at: r.fetched_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct PgBattleRow {
    pub id: Uuid,
    pub system_id: i64,
    pub space_type: String,
    pub security_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_kills: i64,
    pub total_isk_destroyed: BigDecimal,
    pub zkill_related_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PgBattleRow> for Battle {
    fn from(r: PgBattleRow) -> Self {
        Battle {
            id: r.id,
            system_id: r.system_id,
            space_type: parse_space_type(&r.space_type),
            security_type: parse_security_type(&r.security_type),
            start_time: r.start_time,
            end_time: r.end_time,
            total_kills: r.total_kills,
            total_isk_destroyed: r.total_isk_destroyed,
            zkill_related_url: r.zkill_related_url,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct PgParticipantRow {
    pub battle_id: Uuid,
    pub character_id: i64,
    pub alliance_id: Option<i64>,
    pub corp_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub side_id: Option<i64>,
    pub is_victim: bool,
}

impl From<PgParticipantRow> for BattleParticipant {
    fn from(r: PgParticipantRow) -> Self {
        BattleParticipant {
            battle_id: r.battle_id,
            character_id: r.character_id,
            alliance_id: r.alliance_id,
            corp_id: r.corp_id,
            ship_type_id: r.ship_type_id,
            side_id: r.side_id,
            is_victim: r.is_victim,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct PgRulesetRow {
    pub min_pilots: i64,
    pub tracked_alliance_ids: Vec<i64>,
    pub tracked_corp_ids: Vec<i64>,
    pub tracked_system_ids: Vec<i64>,
    pub tracked_security_types: Vec<String>,
    pub ignore_unlisted: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<PgRulesetRow> for Ruleset {
    fn from(r: PgRulesetRow) -> Self {
        Ruleset {
            min_pilots: r.min_pilots,
            tracked_alliance_ids: r.tracked_alliance_ids,
            tracked_corp_ids: r.tracked_corp_ids,
            tracked_system_ids: r.tracked_system_ids,
            tracked_security_types: r
                .tracked_security_types
                .iter()
                .map(|s| parse_security_type(s))
                .collect(),
            ignore_unlisted: r.ignore_unlisted,
            updated_at: r.updated_at,
        }
    }
}
