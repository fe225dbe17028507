//! Domain types shared by the engine, the clusterer service, and the store
//! adapters. Kept free of `sqlx` — row mapping lives in `battlescope-store`.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One combat event observed on the external feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillmailEvent {
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

impl KillmailEvent {
    /// The non-null alliance ids this killmail touches (victim ∪ attackers).
    pub fn alliance_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.attacker_alliance_ids.clone();
        if let Some(a) = self.victim_alliance_id {
            ids.push(a);
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for EnrichmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown enrichment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillmailEnrichment {
    pub killmail_id: i64,
    pub status: EnrichmentStatus,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Coarse spatial classification, derived once at battle creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceType {
    Kspace,
    Jspace,
    Pochven,
}

/// Finer classification, projected from `SpaceType` plus security status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityType {
    Highsec,
    Lowsec,
    Nullsec,
    Wormhole,
    Pochven,
}

impl SecurityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highsec => "highsec",
            Self::Lowsec => "lowsec",
            Self::Nullsec => "nullsec",
            Self::Wormhole => "wormhole",
            Self::Pochven => "pochven",
        }
    }
}

impl std::str::FromStr for SecurityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highsec" => Ok(Self::Highsec),
            "lowsec" => Ok(Self::Lowsec),
            "nullsec" => Ok(Self::Nullsec),
            "wormhole" => Ok(Self::Wormhole),
            "pochven" => Ok(Self::Pochven),
            other => Err(format!("unknown security type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battle {
    pub id: Uuid,
    pub system_id: i64,
    pub space_type: SpaceType,
    pub security_type: SecurityType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_kills: i64,
    pub total_isk_destroyed: BigDecimal,
    pub zkill_related_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleKillmail {
    pub battle_id: Uuid,
    pub killmail_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleParticipant {
    pub battle_id: Uuid,
    pub character_id: i64,
    pub alliance_id: Option<i64>,
    pub corp_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub side_id: Option<i64>,
    pub is_victim: bool,
}

/// Operator-configurable acceptance filter applied to each candidate battle.
/// A process-wide singleton; see `battlescope-core::ruleset` for the cached
/// snapshot wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    pub min_pilots: i64,
    pub tracked_alliance_ids: Vec<i64>,
    pub tracked_corp_ids: Vec<i64>,
    pub tracked_system_ids: Vec<i64>,
    pub tracked_security_types: Vec<SecurityType>,
    pub ignore_unlisted: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self {
            min_pilots: 1,
            tracked_alliance_ids: Vec::new(),
            tracked_corp_ids: Vec::new(),
            tracked_system_ids: Vec::new(),
            tracked_security_types: Vec::new(),
            ignore_unlisted: false,
            updated_at: Utc::now(),
        }
    }
}

/// Patch to the `Ruleset` singleton — all fields optional, admin-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesetPatch {
    pub min_pilots: Option<i64>,
    pub tracked_alliance_ids: Option<Vec<i64>>,
    pub tracked_corp_ids: Option<Vec<i64>>,
    pub tracked_system_ids: Option<Vec<i64>>,
    pub tracked_security_types: Option<Vec<SecurityType>>,
    pub ignore_unlisted: Option<bool>,
}

impl Ruleset {
    pub fn apply(&self, patch: RulesetPatch) -> Self {
        Self {
            min_pilots: patch.min_pilots.unwrap_or(self.min_pilots),
            tracked_alliance_ids: patch
                .tracked_alliance_ids
                .unwrap_or_else(|| self.tracked_alliance_ids.clone()),
            tracked_corp_ids: patch
                .tracked_corp_ids
                .unwrap_or_else(|| self.tracked_corp_ids.clone()),
            tracked_system_ids: patch
                .tracked_system_ids
                .unwrap_or_else(|| self.tracked_system_ids.clone()),
            tracked_security_types: patch
                .tracked_security_types
                .unwrap_or_else(|| self.tracked_security_types.clone()),
            ignore_unlisted: patch.ignore_unlisted.unwrap_or(self.ignore_unlisted),
            updated_at: Utc::now(),
        }
    }
}
