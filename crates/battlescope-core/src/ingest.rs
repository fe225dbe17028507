//! Validation of inbound killmail payloads before they become a
//! `KillmailEvent`. The feed is dynamically typed JSON; a malformed or
//! partial record must be rejected rather than silently coerced into
//! zeroed fields, so failures are counted distinctly from successful
//! ingests.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::types::KillmailEvent;

/// Raw shape of one killmail as published by the external feed. Field names
/// match the feed's own schema, not our internal naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawKillmail {
    pub killmail_id: i64,
    pub system_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub victim: RawVictim,
    pub attackers: Vec<RawAttacker>,
    pub zkb: RawZkb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVictim {
    pub alliance_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub character_id: Option<i64>,
    pub ship_type_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAttacker {
    pub alliance_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub character_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawZkb {
    pub total_value: f64,
    pub url: String,
}

/// Validates and converts one raw record. Rejects: non-positive ids,
/// negative ISK values, and an empty attacker list (a killmail always has
/// at least one attacker).
pub fn validate(raw: RawKillmail, fetched_at: DateTime<Utc>) -> Result<KillmailEvent> {
    if raw.killmail_id <= 0 {
        return Err(CoreError::InvalidInput(format!(
            "killmail_id must be positive, got {}",
            raw.killmail_id
        )));
    }
    if raw.system_id <= 0 {
        return Err(CoreError::InvalidInput(format!(
            "system_id must be positive, got {}",
            raw.system_id
        )));
    }
    if raw.attackers.is_empty() {
        return Err(CoreError::InvalidInput(format!(
            "killmail {} has no attackers",
            raw.killmail_id
        )));
    }

    let isk_value = BigDecimal::try_from(raw.zkb.total_value).map_err(|e| {
        CoreError::InvalidInput(format!("killmail {}: invalid isk value: {e}", raw.killmail_id))
    })?;
    if isk_value < BigDecimal::zero() {
        return Err(CoreError::InvalidInput(format!(
            "killmail {} has negative isk value",
            raw.killmail_id
        )));
    }

    Ok(KillmailEvent {
        killmail_id: raw.killmail_id,
        system_id: raw.system_id,
        occurred_at: raw.occurred_at,
        fetched_at,
        victim_alliance_id: raw.victim.alliance_id,
        victim_corp_id: raw.victim.corporation_id,
        victim_character_id: raw.victim.character_id,
        victim_ship_type_id: raw.victim.ship_type_id,
        attacker_alliance_ids: dedup_sorted(raw.attackers.iter().filter_map(|a| a.alliance_id)),
        attacker_corp_ids: dedup_sorted(raw.attackers.iter().filter_map(|a| a.corporation_id)),
        attacker_character_ids: raw.attackers.iter().filter_map(|a| a.character_id).collect(),
        isk_value,
        zkb_url: raw.zkb.url,
        processed_at: None,
        battle_id: None::<Uuid>,
    })
}

fn dedup_sorted(ids: impl Iterator<Item = i64>) -> Vec<i64> {
    let mut v: Vec<i64> = ids.collect();
    v.sort_unstable();
    v.dedup();
    v
}
