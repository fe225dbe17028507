//! DTOs at the read-API boundary. These shapes are what `battlescope-store`'s
//! query methods return and what a (not-yet-built) HTTP layer would
//! serialize — the API handlers themselves are out of scope here.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use battlescope_core::{KillmailEnrichment, KillmailEvent, SecurityType, SpaceType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BattleFilters {
    pub space_type: Option<SpaceType>,
    pub security_type: Option<SecurityType>,
    pub system_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub corp_id: Option<i64>,
    pub character_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Opaque pagination token, monotonic in `(start_time desc, id desc)`.
/// Encoded as base64 so it round-trips safely through a URL query string
/// without callers needing to know its internal shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub start_time: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn encode(&self) -> String {
        use base64::Engine;
        let raw = format!("{}|{}", self.start_time.to_rfc3339(), self.id);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw)
    }

    pub fn decode(token: &str) -> Option<Self> {
        use base64::Engine;
        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .ok()?;
        let raw = String::from_utf8(raw).ok()?;
        let (start_time, id) = raw.split_once('|')?;
        Some(Self {
            start_time: DateTime::parse_from_rfc3339(start_time).ok()?.with_timezone(&Utc),
            id: id.parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleSummary {
    pub id: Uuid,
    pub system_id: i64,
    pub space_type: SpaceType,
    pub security_type: SecurityType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_kills: i64,
    pub total_isk_destroyed: BigDecimal,
    pub zkill_related_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleDetail {
    pub summary: BattleSummary,
    pub killmails: Vec<KillmailWithEnrichment>,
    pub participants: Vec<ParticipantView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillmailWithEnrichment {
    pub event: KillmailEvent,
    pub enrichment: Option<KillmailEnrichment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantView {
    pub character_id: i64,
    pub alliance_id: Option<i64>,
    pub corp_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub side_id: Option<i64>,
    pub is_victim: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEntity {
    pub id: i64,
    pub kills: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_battles: i64,
    pub total_killmails: i64,
    pub unique_alliances: i64,
    pub unique_corporations: i64,
    pub top_alliances: Vec<RankedEntity>,
    pub top_corporations: Vec<RankedEntity>,
    pub generated_at: DateTime<Utc>,
}
