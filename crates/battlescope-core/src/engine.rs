//! The clustering engine — a pure, deterministic function from a batch of
//! killmail events to a set of battle plans plus an ignored set.
//!
//! No I/O, no clock reads, no randomness. `uuid::Uuid::new_v4()` is the only
//! impure call, used purely to label a plan before it is persisted — it does
//! not affect which killmails land in which plan, so determinism (equal
//! inputs ⇒ equal *groupings*) still holds.

use std::collections::{BTreeMap, HashSet};

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::space::{security_type_for, space_type_for_system, zkill_related_url};
use crate::types::{KillmailEvent, SecurityType, SpaceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterParams {
    pub window_minutes: i64,
    pub gap_max_minutes: i64,
    pub min_kills: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            window_minutes: 30,
            gap_max_minutes: 15,
            min_kills: 2,
        }
    }
}

/// A derived `(characterId, ...)` participant row, not yet a `BattleParticipant`
/// (no `battle_id` until the plan is assigned one at persistence time).
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantPlan {
    pub character_id: i64,
    pub alliance_id: Option<i64>,
    pub corp_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub is_victim: bool,
    /// `occurred_at` of the member killmail this participant row was most
    /// recently observed on — used to resolve `ship_type_id` to the latest
    /// occurrence when merging repeat appearances within one battle.
    last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BattlePlan {
    pub id: Uuid,
    pub system_id: i64,
    pub space_type: SpaceType,
    pub security_type: SecurityType,
    pub killmail_ids: Vec<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_kills: i64,
    pub total_isk_destroyed: BigDecimal,
    pub zkill_related_url: String,
    pub participants: Vec<ParticipantPlan>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterOutput {
    pub battles: Vec<BattlePlan>,
    pub ignored_killmail_ids: Vec<i64>,
}

/// `cluster(events, params) → {battles, ignoredKillmailIds}`
///
/// Deterministic: equal inputs (after canonical sort) yield equal outputs.
#[must_use]
pub fn cluster(events: &[KillmailEvent], params: ClusterParams) -> ClusterOutput {
    let mut by_system: BTreeMap<i64, Vec<&KillmailEvent>> = BTreeMap::new();
    for e in events {
        by_system.entry(e.system_id).or_default().push(e);
    }

    let mut output = ClusterOutput::default();
    for (_system_id, mut system_events) in by_system {
        system_events.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then(a.killmail_id.cmp(&b.killmail_id))
        });

        for raw_cluster in partition_system(&system_events, params) {
            if raw_cluster.len() < params.min_kills {
                output
                    .ignored_killmail_ids
                    .extend(raw_cluster.iter().map(|e| e.killmail_id));
                continue;
            }
            output.battles.push(build_plan(&raw_cluster));
        }
    }

    output
}

/// Sequential admission over one system's chronologically sorted events.
/// Returns the closed clusters in order.
fn partition_system<'a>(
    events: &[&'a KillmailEvent],
    params: ClusterParams,
) -> Vec<Vec<&'a KillmailEvent>> {
    let mut closed: Vec<Vec<&KillmailEvent>> = Vec::new();
    let mut current: Vec<&KillmailEvent> = Vec::new();
    let mut alliance_union: HashSet<i64> = HashSet::new();

    for &e in events {
        if current.is_empty() {
            current.push(e);
            alliance_union.extend(e.alliance_ids());
            continue;
        }

        let k0 = current[0];
        let kl = current[current.len() - 1];

        let window_ok =
            (e.occurred_at - k0.occurred_at).num_minutes() <= params.window_minutes;
        let gap_ok = (e.occurred_at - kl.occurred_at).num_minutes() <= params.gap_max_minutes;
        let alliance_link = e.alliance_ids().iter().any(|a| alliance_union.contains(a));

        if window_ok && (gap_ok || alliance_link) {
            current.push(e);
            alliance_union.extend(e.alliance_ids());
        } else {
            closed.push(std::mem::take(&mut current));
            current.push(e);
            alliance_union = e.alliance_ids().into_iter().collect();
        }
    }

    if !current.is_empty() {
        closed.push(current);
    }

    closed
}

fn build_plan(members: &[&KillmailEvent]) -> BattlePlan {
    let system_id = members[0].system_id;
    let start_time = members.iter().map(|e| e.occurred_at).min().unwrap();
    let end_time = members.iter().map(|e| e.occurred_at).max().unwrap();
    let total_isk_destroyed = members
        .iter()
        .fold(BigDecimal::zero(), |acc, e| acc + non_negative(&e.isk_value));

    let space_type = space_type_for_system(system_id);
    let security_type = security_type_for(space_type, None);

    let mut participants: BTreeMap<i64, ParticipantPlan> = BTreeMap::new();
    for e in members {
        if let Some(character_id) = e.victim_character_id {
            upsert_participant(
                &mut participants,
                character_id,
                e.victim_alliance_id,
                e.victim_corp_id,
                e.victim_ship_type_id,
                true,
                e.occurred_at,
            );
        }
        // The wire schema carries attacker alliance/corp/ship ids as
        // killmail-level sets, not per-attacker-character attribution, so
        // participant rows for attackers start with those fields unset.
        for &character_id in &e.attacker_character_ids {
            upsert_participant(
                &mut participants,
                character_id,
                None,
                None,
                None,
                false,
                e.occurred_at,
            );
        }
    }

    BattlePlan {
        id: Uuid::new_v4(),
        system_id,
        space_type,
        security_type,
        killmail_ids: members.iter().map(|e| e.killmail_id).collect(),
        start_time,
        end_time,
        total_kills: members.len() as i64,
        total_isk_destroyed,
        zkill_related_url: zkill_related_url(system_id, start_time),
        participants: participants.into_values().collect(),
    }
}

/// Invalid (negative) ISK values are tolerated by treating them as zero.
fn non_negative(value: &BigDecimal) -> BigDecimal {
    if *value < BigDecimal::zero() {
        BigDecimal::zero()
    } else {
        value.clone()
    }
}

#[allow(clippy::too_many_arguments)]
fn upsert_participant(
    participants: &mut BTreeMap<i64, ParticipantPlan>,
    character_id: i64,
    alliance_id: Option<i64>,
    corp_id: Option<i64>,
    ship_type_id: Option<i64>,
    is_victim: bool,
    occurred_at: DateTime<Utc>,
) {
    participants
        .entry(character_id)
        .and_modify(|p| {
            // The victim flag latches true once set; never cleared.
            p.is_victim = p.is_victim || is_victim;
            if occurred_at >= p.last_seen_at {
                p.last_seen_at = occurred_at;
                if ship_type_id.is_some() {
                    p.ship_type_id = ship_type_id;
                }
                if alliance_id.is_some() {
                    p.alliance_id = alliance_id;
                }
                if corp_id.is_some() {
                    p.corp_id = corp_id;
                }
            }
        })
        .or_insert(ParticipantPlan {
            character_id,
            alliance_id,
            corp_id,
            ship_type_id,
            is_victim,
            last_seen_at: occurred_at,
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const SYSTEM: i64 = 30000142;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn killmail(id: i64, system_id: i64, offset_minutes: i64) -> KillmailEvent {
        let occurred_at = base_time() + Duration::minutes(offset_minutes);
        KillmailEvent {
            killmail_id: id,
            system_id,
            occurred_at,
            fetched_at: occurred_at,
            victim_alliance_id: None,
            victim_corp_id: None,
            victim_character_id: Some(1000 + id),
            victim_ship_type_id: Some(600),
            attacker_alliance_ids: vec![],
            attacker_corp_ids: vec![],
            attacker_character_ids: vec![2000 + id],
            isk_value: BigDecimal::from(1_000_000),
            zkb_url: format!("https://zkillboard.com/kill/{id}/"),
            processed_at: None,
            battle_id: None,
        }
    }

    fn with_alliances(mut e: KillmailEvent, victim: i64, attacker: i64) -> KillmailEvent {
        e.victim_alliance_id = Some(victim);
        e.attacker_alliance_ids = vec![attacker];
        e
    }

    const PARAMS: ClusterParams = ClusterParams {
        window_minutes: 30,
        gap_max_minutes: 15,
        min_kills: 2,
    };

    #[test]
    fn empty_input_is_empty_output() {
        let out = cluster(&[], PARAMS);
        assert!(out.battles.is_empty());
        assert!(out.ignored_killmail_ids.is_empty());
    }

    #[test]
    fn single_event_below_threshold_is_ignored() {
        let events = vec![killmail(1, SYSTEM, 0)];
        let out = cluster(&events, PARAMS);
        assert!(out.battles.is_empty());
        assert_eq!(out.ignored_killmail_ids, vec![1]);
    }

    /// Scenario 1: same-system short burst.
    #[test]
    fn same_system_short_burst_clusters() {
        let events = vec![
            killmail(1, SYSTEM, 0),
            killmail(2, SYSTEM, 5),
            killmail(3, SYSTEM, 10),
        ];
        let out = cluster(&events, PARAMS);
        assert_eq!(out.battles.len(), 1);
        assert!(out.ignored_killmail_ids.is_empty());
        let battle = &out.battles[0];
        assert_eq!(battle.killmail_ids, vec![1, 2, 3]);
        assert_eq!(battle.start_time, base_time());
        assert_eq!(battle.end_time, base_time() + Duration::minutes(10));
    }

    /// Scenario 2: different systems never cluster.
    #[test]
    fn different_systems_never_cluster() {
        let events = vec![killmail(1, 30000142, 0), killmail(2, 30000143, 5)];
        let out = cluster(&events, PARAMS);
        assert!(out.battles.is_empty());
        let mut ignored = out.ignored_killmail_ids.clone();
        ignored.sort_unstable();
        assert_eq!(ignored, vec![1, 2]);
    }

    /// Scenario 3: gap exceeded, no alliance overlap ⇒ two battles.
    #[test]
    fn gap_exceeded_without_alliance_splits_into_two_battles() {
        let events = vec![
            with_alliances(killmail(1, SYSTEM, 0), 1, 2),
            with_alliances(killmail(2, SYSTEM, 5), 1, 2),
            with_alliances(killmail(3, SYSTEM, 25), 3, 4),
            with_alliances(killmail(4, SYSTEM, 30), 3, 4),
        ];
        let out = cluster(&events, PARAMS);
        assert_eq!(out.battles.len(), 2);
        assert_eq!(out.battles[0].killmail_ids, vec![1, 2]);
        assert_eq!(out.battles[1].killmail_ids, vec![3, 4]);
    }

    /// Scenario 4: gap exceeded but alliance bridge keeps them together.
    #[test]
    fn gap_exceeded_with_alliance_bridge_clusters() {
        let events = vec![
            with_alliances(killmail(1, SYSTEM, 0), 1, 2),
            with_alliances(killmail(2, SYSTEM, 20), 3, 1),
        ];
        let out = cluster(&events, PARAMS);
        assert_eq!(out.battles.len(), 1);
        assert_eq!(out.battles[0].killmail_ids, vec![1, 2]);
    }

    /// Scenario 5: window exceeded ⇒ never clusters, even with alliance link.
    #[test]
    fn window_exceeded_never_clusters() {
        let events = vec![
            with_alliances(killmail(1, SYSTEM, 0), 1, 2),
            with_alliances(killmail(2, SYSTEM, 35), 3, 1),
        ];
        let out = cluster(&events, PARAMS);
        assert!(out.battles.is_empty());
        let mut ignored = out.ignored_killmail_ids.clone();
        ignored.sort_unstable();
        assert_eq!(ignored, vec![1, 2]);
    }

    #[test]
    fn gap_boundary_exactly_admitted() {
        let events = vec![killmail(1, SYSTEM, 0), killmail(2, SYSTEM, 15)];
        let out = cluster(&events, PARAMS);
        assert_eq!(out.battles.len(), 1);
    }

    #[test]
    fn gap_boundary_one_tick_over_not_admitted_without_alliance() {
        let events = vec![
            with_alliances(killmail(1, SYSTEM, 0), 1, 2),
            with_alliances(killmail(2, SYSTEM, 16), 3, 4),
        ];
        let out = cluster(&events, PARAMS);
        assert!(out.battles.is_empty());
    }

    #[test]
    fn window_boundary_exactly_admitted() {
        // Gap (30 > 15) alone would reject this pair; the alliance link is
        // what keeps it inside the window ceiling, which is inclusive.
        let events = vec![
            with_alliances(killmail(1, SYSTEM, 0), 1, 2),
            with_alliances(killmail(2, SYSTEM, 30), 3, 1),
        ];
        let out = cluster(&events, PARAMS);
        assert_eq!(out.battles.len(), 1);
    }

    #[test]
    fn window_boundary_one_tick_over_never_admitted() {
        let events = vec![
            with_alliances(killmail(1, SYSTEM, 0), 1, 2),
            with_alliances(killmail(2, SYSTEM, 31), 3, 1),
        ];
        let out = cluster(&events, PARAMS);
        assert!(out.battles.is_empty());
    }

    #[test]
    fn identical_timestamps_ordered_by_killmail_id() {
        let mut events = vec![killmail(2, SYSTEM, 0), killmail(1, SYSTEM, 0)];
        events[0].occurred_at = base_time();
        events[1].occurred_at = base_time();
        let out = cluster(&events, PARAMS);
        assert_eq!(out.battles[0].killmail_ids, vec![1, 2]);
    }

    /// Three-way alliance chain: A-B, then B-C ⇒ all three cluster together
    /// even though A and C never co-occur directly. Needs a wider window
    /// than the default fixture, since two successive >gap hops consume more
    /// than `windowMinutes=30` would allow.
    #[test]
    fn three_way_alliance_chain_clusters() {
        let params = ClusterParams {
            window_minutes: 60,
            gap_max_minutes: 15,
            min_kills: 2,
        };
        let events = vec![
            with_alliances(killmail(1, SYSTEM, 0), 1, 2),
            with_alliances(killmail(2, SYSTEM, 20), 2, 3),
            with_alliances(killmail(3, SYSTEM, 40), 3, 4),
        ];
        let out = cluster(&events, params);
        assert_eq!(out.battles.len(), 1);
        assert_eq!(out.battles[0].killmail_ids, vec![1, 2, 3]);
    }

    #[test]
    fn multi_alliance_attackers_any_overlap_links() {
        let mut k1 = with_alliances(killmail(1, SYSTEM, 0), 1, 2);
        k1.attacker_alliance_ids = vec![2, 5, 6];
        let mut k2 = killmail(2, SYSTEM, 20);
        k2.victim_alliance_id = Some(9);
        k2.attacker_alliance_ids = vec![5];
        let out = cluster(&[k1, k2], PARAMS);
        assert_eq!(out.battles.len(), 1);
    }

    #[test]
    fn out_of_order_arrival_matches_in_order() {
        let in_order = vec![
            killmail(1, SYSTEM, 0),
            killmail(2, SYSTEM, 5),
            killmail(3, SYSTEM, 10),
        ];
        let mut shuffled = in_order.clone();
        shuffled.reverse();
        let out_in_order = cluster(&in_order, PARAMS);
        let out_shuffled = cluster(&shuffled, PARAMS);
        assert_eq!(
            out_in_order.battles[0].killmail_ids,
            out_shuffled.battles[0].killmail_ids
        );
    }

    #[test]
    fn window_splits_across_long_alliance_linked_engagement() {
        // Alliance-linked kills every 20 minutes would bridge forever on gap
        // alone, but the absolute window ceiling forces a split once the
        // span from the first member exceeds 30 minutes.
        let events = vec![
            with_alliances(killmail(1, SYSTEM, 0), 1, 2),
            with_alliances(killmail(2, SYSTEM, 20), 2, 1),
            with_alliances(killmail(3, SYSTEM, 40), 1, 2),
        ];
        let out = cluster(&events, PARAMS);
        assert_eq!(out.battles.len(), 1);
        assert_eq!(out.battles[0].killmail_ids, vec![1, 2]);
        // killmail 3 opens its own cluster but is alone, below min_kills.
        assert_eq!(out.ignored_killmail_ids, vec![3]);
    }

    #[test]
    fn null_alliances_only_gap_clusters() {
        let events = vec![killmail(1, SYSTEM, 0), killmail(2, SYSTEM, 10)];
        let out = cluster(&events, PARAMS);
        assert_eq!(out.battles.len(), 1);
    }

    #[test]
    fn participant_victim_flag_latches_and_ship_uses_latest() {
        let mut k1 = killmail(1, SYSTEM, 0);
        k1.victim_character_id = Some(42);
        k1.victim_ship_type_id = Some(100);
        k1.attacker_character_ids = vec![42]; // same character appears as attacker earlier
        let mut k2 = killmail(2, SYSTEM, 5);
        k2.victim_character_id = Some(99);
        k2.attacker_character_ids = vec![42];

        let out = cluster(&[k1, k2], PARAMS);
        let battle = &out.battles[0];
        let p = battle
            .participants
            .iter()
            .find(|p| p.character_id == 42)
            .unwrap();
        assert!(p.is_victim);
    }

    #[test]
    fn negative_isk_treated_as_zero() {
        let mut k1 = killmail(1, SYSTEM, 0);
        k1.isk_value = BigDecimal::from(-500);
        let k2 = killmail(2, SYSTEM, 5);
        let out = cluster(&[k1, k2], PARAMS);
        assert_eq!(out.battles[0].total_isk_destroyed, BigDecimal::from(1_000_000));
    }

    proptest::proptest! {
        #[test]
        fn permutation_invariant(seed in 0u64..1000) {
            use rand::{seq::SliceRandom, SeedableRng};
            let events: Vec<KillmailEvent> = (0..6)
                .map(|i| killmail(i + 1, SYSTEM, i * 7))
                .collect();
            let mut shuffled = events.clone();
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            shuffled.shuffle(&mut rng);

            let a = cluster(&events, PARAMS);
            let b = cluster(&shuffled, PARAMS);
            prop_assert_eq!(a.battles.len(), b.battles.len());
            for (ba, bb) in a.battles.iter().zip(b.battles.iter()) {
                prop_assert_eq!(&ba.killmail_ids, &bb.killmail_ids);
            }
            prop_assert_eq!(
                a.ignored_killmail_ids.iter().collect::<std::collections::HashSet<_>>(),
                b.ignored_killmail_ids.iter().collect::<std::collections::HashSet<_>>()
            );
        }
    }
}
