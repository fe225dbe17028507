//! `ClustererService` — the batch driver around the pure `engine::cluster`
//! function. Runs on a ticker (see the `battlescope` binary), generic over
//! the storage ports so it is unit-testable against in-memory fakes.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::engine::{self, BattlePlan, ClusterParams};
use crate::error::{CoreErrorKind, Result};
use crate::ports::{BattleStore, EventSink, KillmailStore, RulesetStore};
use crate::ruleset::RulesetCache;
use crate::types::Ruleset;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub battles_created: i64,
    pub battles_extended: i64,
    pub killmails_processed: i64,
    pub killmails_quarantined: i64,
    pub killmails_below_min_kills: i64,
    pub killmails_ruleset_rejected: i64,
}

pub struct ClustererService<K, B, R> {
    killmail_store: K,
    battle_store: B,
    ruleset_store: R,
    ruleset_cache: Arc<RulesetCache>,
    event_sink: Arc<dyn EventSink>,
    params: ClusterParams,
    /// A killmail is only considered for clustering once this much time has
    /// passed since it occurred, giving slow feeds a chance to land related
    /// kills before a decision is locked in.
    processing_delay: Duration,
    batch_size: i64,
}

impl<K, B, R> ClustererService<K, B, R>
where
    K: KillmailStore,
    B: BattleStore,
    R: RulesetStore,
{
    pub fn new(
        killmail_store: K,
        battle_store: B,
        ruleset_store: R,
        ruleset_cache: Arc<RulesetCache>,
        event_sink: Arc<dyn EventSink>,
        params: ClusterParams,
        processing_delay: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            killmail_store,
            battle_store,
            ruleset_store,
            ruleset_cache,
            event_sink,
            params,
            processing_delay,
            batch_size,
        }
    }

    /// One batch: fetch due killmails, attribute what can extend an existing
    /// battle, cluster the rest, filter through the ruleset, persist. The
    /// ruleset is read exactly once here and held for the whole batch.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<BatchStats> {
        let ruleset = self.ruleset_cache.refresh(&self.ruleset_store).await?;
        let cutoff = now - self.processing_delay;

        let due = self
            .killmail_store
            .fetch_unprocessed(self.batch_size, cutoff)
            .await?;
        if due.is_empty() {
            return Ok(BatchStats::default());
        }

        let mut stats = BatchStats::default();
        let mut fresh = Vec::new();

        for event in due {
            let candidates = self
                .battle_store
                .find_attribution_candidates(
                    event.system_id,
                    event.occurred_at,
                    self.params.gap_max_minutes,
                )
                .await?;

            let Some(target) = candidates.first() else {
                fresh.push(event);
                continue;
            };

            match self
                .battle_store
                .append_killmail(target.id, &event, self.params.window_minutes)
                .await
            {
                Ok(()) => {
                    self.killmail_store
                        .mark_processed(&[event.killmail_id], Some(target.id))
                        .await?;
                    self.event_sink.battle_updated(target.id);
                    stats.battles_extended += 1;
                    stats.killmails_processed += 1;
                }
                Err(err) if err.kind() == CoreErrorKind::InvariantViolation => {
                    tracing::error!(
                        killmail_id = event.killmail_id,
                        battle_id = %target.id,
                        error = %err,
                        "retroactive attribution would violate battle span invariant; quarantining killmail"
                    );
                    self.killmail_store
                        .mark_processed(&[event.killmail_id], None)
                        .await?;
                    stats.killmails_quarantined += 1;
                }
                Err(err) => return Err(err),
            }
        }

        // Other unprocessed killmails in the same systems, within the window
        // lookback, are pulled in too — an unattributed batch member can
        // only cluster correctly against the full neighbourhood, not just
        // the other members that happened to be due in this batch.
        let mut spans: BTreeMap<i64, (DateTime<Utc>, DateTime<Utc>)> = BTreeMap::new();
        for e in &fresh {
            let span = spans.entry(e.system_id).or_insert((e.occurred_at, e.occurred_at));
            span.0 = span.0.min(e.occurred_at);
            span.1 = span.1.max(e.occurred_at);
        }
        let mut seen: HashSet<i64> = fresh.iter().map(|e| e.killmail_id).collect();
        for (system_id, (min_occurred, max_occurred)) in spans {
            let window = Duration::minutes(self.params.window_minutes);
            let neighbours = self
                .killmail_store
                .fetch_recent_for_backfill(system_id, min_occurred - window, max_occurred + window)
                .await?;
            for e in neighbours {
                if e.processed_at.is_none() && seen.insert(e.killmail_id) {
                    fresh.push(e);
                }
            }
        }

        let output = engine::cluster(&fresh, self.params);

        for plan in output.battles {
            if !ruleset_admits(&ruleset, &plan) {
                self.killmail_store.mark_processed(&plan.killmail_ids, None).await?;
                stats.killmails_ruleset_rejected += plan.killmail_ids.len() as i64;
                continue;
            }
            let battle_id = self.battle_store.create_battle(&plan).await?;
            self.killmail_store
                .mark_processed(&plan.killmail_ids, Some(battle_id))
                .await?;
            self.event_sink.battle_detected(battle_id);
            stats.battles_created += 1;
            stats.killmails_processed += plan.killmail_ids.len() as i64;
        }

        if !output.ignored_killmail_ids.is_empty() {
            self.killmail_store
                .mark_processed(&output.ignored_killmail_ids, None)
                .await?;
        }
        stats.killmails_below_min_kills += output.ignored_killmail_ids.len() as i64;

        Ok(stats)
    }
}

/// Applies the cached `Ruleset` to one candidate battle plan. An empty
/// tracked-list means "don't filter on this dimension"; only
/// `ignore_unlisted` makes an empty list exclusionary.
fn ruleset_admits(ruleset: &Ruleset, plan: &BattlePlan) -> bool {
    if plan.total_kills < ruleset.min_pilots {
        return false;
    }

    let alliance_match = ruleset.tracked_alliance_ids.is_empty()
        || plan
            .participants
            .iter()
            .filter_map(|p| p.alliance_id)
            .any(|a| ruleset.tracked_alliance_ids.contains(&a));
    let corp_match = ruleset.tracked_corp_ids.is_empty()
        || plan
            .participants
            .iter()
            .filter_map(|p| p.corp_id)
            .any(|c| ruleset.tracked_corp_ids.contains(&c));
    let system_match =
        ruleset.tracked_system_ids.is_empty() || ruleset.tracked_system_ids.contains(&plan.system_id);
    let security_match = ruleset.tracked_security_types.is_empty()
        || ruleset.tracked_security_types.contains(&plan.security_type);

    if !ruleset.ignore_unlisted {
        return true;
    }

    alliance_match && corp_match && system_match && security_match
}
